//! curator CLI entry point

use clap::{Parser, Subcommand};
use curator::{
    annotate::Annotation,
    error::Result,
    ingest::ImportOutcome,
    registry::{ProjectFilter, ProjectSort, ProjectSortBy},
    workspace::open_workspace,
    Workspace,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "curator")]
#[command(version, about = "Local image-dataset management store", long_about = None)]
struct Cli {
    /// Base directory (defaults to ~/.curator)
    #[arg(short, long, global = true, env = "CURATOR_BASE_DIR")]
    base_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage projects
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Import image files into a project
    Import {
        /// Project name
        project: String,

        /// Paths of image files to import
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// List a project's images with derived file metadata
    Images {
        /// Project name
        project: String,
    },

    /// Rename an image (blob, catalog and sidecar move together)
    RenameImage {
        /// Project name
        project: String,
        /// Image id
        id: String,
        /// New filename
        new_filename: String,
    },

    /// Delete an image
    DeleteImage {
        /// Project name
        project: String,
        /// Image id
        id: String,
    },

    /// Process a project's raw images into normalized output
    Process {
        /// Project name
        project: String,
    },

    /// Fetch an annotation document by image filename
    Annotation {
        /// Project name
        project: String,
        /// Image filename
        filename: String,
    },

    /// Save an annotation document by image filename
    SaveAnnotation {
        /// Project name
        project: String,
        /// Image filename
        filename: String,
        /// Path to the JSON annotation document
        document: PathBuf,
    },

    /// Show a project's dataset history
    History {
        /// Project name
        project: String,
    },

    /// Show a project's raw sidecar metadata document
    Metadata {
        /// Project name
        project: String,
    },
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Create a new project
    Create {
        /// Project name
        name: String,
    },

    /// Rename a project
    Rename {
        /// Current name
        old: String,
        /// New name
        new: String,
    },

    /// Delete a project and all its data
    Delete {
        /// Project name
        name: String,

        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Archive a project
    Archive {
        /// Project name
        name: String,
    },

    /// Restore an archived project
    Restore {
        /// Project name
        name: String,
    },

    /// Update a project's last-accessed timestamp
    Touch {
        /// Project name
        name: String,
    },

    /// List projects
    List {
        /// Only archived projects
        #[arg(long, conflicts_with = "active")]
        archived: bool,

        /// Only active projects
        #[arg(long)]
        active: bool,

        /// Sort key
        #[arg(long, value_parser = ["name", "last-accessed", "created"], default_value = "name")]
        sort_by: String,

        /// Sort in descending order
        #[arg(long)]
        desc: bool,

        /// Limit the number of results
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let workspace = open_workspace(cli.base_dir.as_deref())?;

    match cli.command {
        Commands::Project { action } => {
            handle_project(&workspace, action, cli.json).await?;
        }

        Commands::Import { project, paths } => {
            let progress = start_progress_bar(paths.len(), "Importing images");
            let mut outcomes = Vec::with_capacity(paths.len());
            for path in &paths {
                outcomes.extend(
                    workspace
                        .import_images(&project, std::slice::from_ref(path))
                        .await?,
                );
                advance_progress(&progress);
            }
            finish_progress(progress, "Images imported");

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcomes)?);
            } else {
                print_import_outcomes(&outcomes);
            }
        }

        Commands::Images { project } => {
            let images = workspace.list_images(&project).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&images)?);
            } else {
                for image in &images {
                    let size = image
                        .size_bytes
                        .map(|s| format!("{} bytes", s))
                        .unwrap_or_else(|| "missing blob".to_string());
                    println!("{}  {}  ({})", image.record.id, image.record.filename, size);
                }
                println!("{} image(s)", images.len());
            }
        }

        Commands::RenameImage {
            project,
            id,
            new_filename,
        } => {
            let updated = workspace.rename_image(&project, &id, &new_filename).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&updated)?);
            } else {
                println!("✓ Renamed image {} to {}", updated.id, updated.filename);
            }
        }

        Commands::DeleteImage { project, id } => {
            let removed = workspace.delete_image(&project, &id).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&removed)?);
            } else {
                println!("✓ Deleted image {} ({})", removed.id, removed.filename);
            }
        }

        Commands::Process { project } => {
            let metadata = workspace.process_project(&project).await?;
            let errors = metadata.values().filter(|e| e.is_error()).count();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&metadata)?);
            } else {
                println!(
                    "✓ Processing complete: {} entries, {} error(s)",
                    metadata.len(),
                    errors
                );
            }
        }

        Commands::Annotation { project, filename } => {
            let annotation = workspace.get_annotation(&project, &filename).await?;
            println!("{}", serde_json::to_string_pretty(&annotation)?);
        }

        Commands::SaveAnnotation {
            project,
            filename,
            document,
        } => {
            let content = std::fs::read_to_string(&document)?;
            let annotation: Annotation = serde_json::from_str(&content)?;
            workspace
                .save_annotation(&project, &filename, &annotation)
                .await?;
            println!("✓ Saved annotation for {}", filename);
        }

        Commands::History { project } => {
            let history = workspace.history(&project).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&history)?);
            } else {
                for entry in &history {
                    println!(
                        "{}  {:6}  {}",
                        entry.timestamp, entry.action, entry.filename
                    );
                }
                println!("{} entr(ies)", history.len());
            }
        }

        Commands::Metadata { project } => {
            let metadata = workspace.raw_metadata(&project).await?;
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }
    }

    Ok(())
}

async fn handle_project(workspace: &Workspace, action: ProjectAction, json: bool) -> Result<()> {
    match action {
        ProjectAction::Create { name } => {
            let path = workspace.create_project(&name).await?;
            println!("✓ Created project '{}' at {}", name, path.display());
        }

        ProjectAction::Rename { old, new } => {
            let path = workspace.rename_project(&old, &new).await?;
            println!("✓ Renamed project '{}' to '{}' ({})", old, new, path.display());
        }

        ProjectAction::Delete { name, yes } => {
            if !yes {
                eprintln!("⚠️  This will delete project '{}' and ALL its data!", name);
                eprintln!("Run with --yes to confirm.");
                std::process::exit(1);
            }
            workspace.delete_project(&name).await?;
            println!("✓ Deleted project '{}'", name);
        }

        ProjectAction::Archive { name } => {
            workspace.set_project_archived(&name, true).await?;
            println!("✓ Archived project '{}'", name);
        }

        ProjectAction::Restore { name } => {
            workspace.set_project_archived(&name, false).await?;
            println!("✓ Restored project '{}'", name);
        }

        ProjectAction::Touch { name } => {
            let timestamp = workspace.touch_project(&name).await?;
            println!("✓ Touched project '{}' at {}", name, timestamp);
        }

        ProjectAction::List {
            archived,
            active,
            sort_by,
            desc,
            limit,
        } => {
            let filter = ProjectFilter {
                archived: if archived {
                    Some(true)
                } else if active {
                    Some(false)
                } else {
                    None
                },
            };
            let sort = ProjectSort {
                by: match sort_by.as_str() {
                    "last-accessed" => ProjectSortBy::LastAccessed,
                    "created" => ProjectSortBy::Created,
                    _ => ProjectSortBy::Name,
                },
                descending: desc,
                limit,
            };

            let projects = workspace.list_projects(&filter, &sort).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&projects)?);
            } else {
                for project in &projects {
                    let flag = if project.is_archived { " [archived]" } else { "" };
                    println!(
                        "{}{}  (last accessed: {})",
                        project.name,
                        flag,
                        project.last_accessed.as_deref().unwrap_or("never")
                    );
                }
                println!("{} project(s)", projects.len());
            }
        }
    }

    Ok(())
}

fn print_import_outcomes(outcomes: &[ImportOutcome]) {
    let imported = outcomes.iter().filter(|o| o.is_imported()).count();
    for outcome in outcomes {
        match outcome {
            ImportOutcome::Imported(image) => {
                println!("  {} -> {} ({})", image.source.display(), image.filename, image.id);
            }
            ImportOutcome::Failed(failure) => {
                println!("  ✗ {}: {}", failure.source.display(), failure.error);
            }
        }
    }
    println!(
        "\n✓ Import complete: {} imported, {} failed",
        imported,
        outcomes.len() - imported
    );
}

fn start_progress_bar(len: usize, message: &str) -> Option<ProgressBar> {
    if len == 0 {
        return None;
    }

    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}",
        )
        .unwrap()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

fn advance_progress(pb: &Option<ProgressBar>) {
    if let Some(pb) = pb {
        pb.inc(1);
    }
}

fn finish_progress(pb: Option<ProgressBar>, message: &str) {
    if let Some(pb) = pb {
        pb.finish_with_message(message.to_string());
    }
}
