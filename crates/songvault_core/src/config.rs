//! Store location and context policy settings.

use crate::context::MergePolicy;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Dataset name used when none is configured.
pub const DEFAULT_STORE_NAME: &str = "SongVault";
/// File extension of the SQLite dataset.
pub const STORE_FILE_EXTENSION: &str = "sqlite3";

/// Where the durable store lives and how its contexts merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Absolute directory that holds the dataset file.
    pub directory: PathBuf,
    /// Dataset name; the file is `<directory>/<name>.sqlite3`.
    pub name: String,
    pub merge_policy: MergePolicy,
}

impl StoreConfig {
    /// Config for `directory` with the default name and merge policy.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            name: DEFAULT_STORE_NAME.to_string(),
            merge_policy: MergePolicy::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_merge_policy(mut self, merge_policy: MergePolicy) -> Self {
        self.merge_policy = merge_policy;
        self
    }

    pub fn database_path(&self) -> PathBuf {
        self.directory
            .join(format!("{}.{}", self.name, STORE_FILE_EXTENSION))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if name.contains(['/', '\\']) || Path::new(name).components().count() != 1 {
            return Err(ConfigError::InvalidName(self.name.clone()));
        }
        if !self.directory.is_absolute() {
            return Err(ConfigError::RelativeDirectory(self.directory.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    EmptyName,
    /// Name would escape the directory or name a path.
    InvalidName(String),
    RelativeDirectory(PathBuf),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "store name cannot be empty"),
            Self::InvalidName(name) => {
                write!(f, "store name `{name}` must not contain path separators")
            }
            Self::RelativeDirectory(directory) => write!(
                f,
                "store directory must be absolute, got `{}`",
                directory.display()
            ),
        }
    }
}

impl Error for ConfigError {}
