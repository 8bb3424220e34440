//! SQLite storage bootstrap and the shared store handle.
//!
//! # Responsibility
//! - Open and configure the SQLite connection backing every context.
//! - Apply schema migrations in deterministic order.
//! - Serialize physical reads/writes through one guarded connection.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - No context reads or writes entity rows before migrations succeed.

use crate::config::ConfigError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;
mod store;

pub use open::{open_db, open_db_in_memory};
pub use store::{Store, StoreLocation};
pub(crate) use store::StoreGuard;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
    /// The configured store location was rejected before opening.
    InvalidLocation(ConfigError),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "store directory error: {err}"),
            Self::InvalidLocation(err) => write!(f, "invalid store location: {err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::InvalidLocation(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<std::io::Error> for DbError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ConfigError> for DbError {
    fn from(value: ConfigError) -> Self {
        Self::InvalidLocation(value)
    }
}
