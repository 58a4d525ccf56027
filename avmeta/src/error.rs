use thiserror::Error;

#[derive(Error, Debug)]
pub enum AvMetaError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed document {path}: {reason}")]
    MalformedDocument { path: String, reason: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Export failed: {0}")]
    ExportWrite(String),

    #[error("{what} not found: {path}")]
    NotFound { what: String, path: String },

    #[error("Path conflict: {path}")]
    PathConflict { path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl AvMetaError {
    pub(crate) fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        AvMetaError::MalformedDocument {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(what: impl Into<String>, path: impl Into<String>) -> Self {
        AvMetaError::NotFound {
            what: what.into(),
            path: path.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AvMetaError>;
