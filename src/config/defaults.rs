//! Default values for configuration

/// Default JPEG quality for processed output
pub fn default_jpeg_quality() -> u8 {
    95
}

/// Default processed output extension
pub fn default_processed_extension() -> String {
    "jpg".to_string()
}

/// Default name of the projects directory under the base dir
pub fn default_projects_dir_name() -> String {
    "projects".to_string()
}
