use crate::error::{AvMetaError, Result};
use crate::media::MediaType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "avmeta.yaml";

pub const ENV_METADATA_DIR: &str = "AVMETA_METADATA_DIR";
pub const ENV_UPLOADS_ROOT: &str = "AVMETA_UPLOADS_ROOT";
pub const ENV_SCHEMA: &str = "AVMETA_SCHEMA";

/// What to do when a save targets a file that already exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnConflict {
    /// Replace the file; warn when it holds a different record
    #[default]
    Overwrite,
    /// Append `_1`, `_2`, ... to the file stem
    Suffix,
    Error,
}

/// Storage roots and schema location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub metadata_dir: PathBuf,
    pub uploads_root: PathBuf,
    /// Schema file; the built-in schema set is used when unset
    pub schema: Option<PathBuf>,
    pub on_conflict: OnConflict,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            metadata_dir: PathBuf::from("data/metadata_store"),
            uploads_root: PathBuf::from("data/uploads"),
            schema: None,
            on_conflict: OnConflict::default(),
        }
    }
}

impl Config {
    /// Load configuration: an explicit file (which must exist), else
    /// `avmeta.yaml` in the working directory if present, else defaults.
    /// Environment variables override file values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(AvMetaError::not_found("Config file", path.display().to_string()));
                }
                Self::from_file(path)?
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Config::default(),
        };
        Ok(config.with_env_from(|key| std::env::var(key).ok()))
    }

    /// Parse a config file. Relative paths inside it are taken relative to
    /// the file's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&content)
            .map_err(|e| AvMetaError::Config(format!("{}: {e}", path.display())))?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Ok(config.relative_to(base))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(content).map_err(|e| AvMetaError::Config(e.to_string()))
    }

    /// Apply overrides from an environment lookup
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(dir) = var(ENV_METADATA_DIR) {
            self.metadata_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var(ENV_UPLOADS_ROOT) {
            self.uploads_root = PathBuf::from(dir);
        }
        if let Some(schema) = var(ENV_SCHEMA) {
            self.schema = Some(PathBuf::from(schema));
        }
        self
    }

    fn relative_to(mut self, base: &Path) -> Self {
        let rebase = |p: &Path| {
            if p.is_relative() {
                base.join(p)
            } else {
                p.to_path_buf()
            }
        };
        self.metadata_dir = rebase(&self.metadata_dir);
        self.uploads_root = rebase(&self.uploads_root);
        self.schema = self.schema.as_deref().map(rebase);
        self
    }

    /// Folder holding uploaded media of one type
    pub fn upload_dir(&self, media_type: MediaType) -> PathBuf {
        self.uploads_root.join(media_type.as_str())
    }
}
