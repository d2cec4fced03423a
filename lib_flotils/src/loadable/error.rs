use std::path::PathBuf;

use thiserror::Error;

/// # Settings Error
///
/// Failures while reading, parsing or writing settings files.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The path does not exist or is not a regular file.
    #[error("Settings file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The file exists but could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The content is not valid for the format (or not valid UTF-8).
    #[error("Failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// The file could not be created or written.
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The value could not be encoded in the target format.
    #[error("Failed to encode {}: {message}", path.display())]
    Encode { path: PathBuf, message: String },

    /// The file extension is neither json, yml nor yaml.
    #[error("Unsupported settings format for {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    /// The document parsed, but its top level is not a mapping.
    #[error("Settings in {} must be a mapping at the top level", path.display())]
    NotAMapping { path: PathBuf },
}

impl SettingsError {
    /// The file the error is about.
    pub fn path(&self) -> &std::path::Path {
        match self {
            SettingsError::NotFound { path }
            | SettingsError::Read { path, .. }
            | SettingsError::Parse { path, .. }
            | SettingsError::Write { path, .. }
            | SettingsError::Encode { path, .. }
            | SettingsError::UnsupportedFormat { path }
            | SettingsError::NotAMapping { path } => path,
        }
    }
}
