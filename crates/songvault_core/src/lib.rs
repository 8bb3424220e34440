//! Core persistence layer for SongVault.
//!
//! A shared SQLite store, a view context for the foreground, background
//! contexts for off-thread writes, and a merge coordinator that keeps every
//! context's cache converged with the store.

pub mod config;
pub mod context;
pub mod controller;
pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod service;

pub use config::{ConfigError, StoreConfig, DEFAULT_STORE_NAME};
pub use context::{
    BatchDeleteResult, ChangeOrigin, Context, ContextId, ContextQueue, ContextRole, MergeEvent,
    MergeOutcome, MergePolicy, PersistenceError, PersistenceResult, SubscriptionId,
};
pub use controller::PersistenceController;
pub use db::{DbError, Store, StoreLocation};
pub use logging::{default_log_level, init_logging, logging_status, LogSettings, LoggingError};
pub use model::{
    Attribute, Entity, EntityKind, NewSong, ObjectId, Song, User, ValidationError, Value,
    DEFAULT_USER_AGE,
};
pub use query::{BatchDeleteRequest, FetchRequest, Predicate, SortDescriptor};
pub use repo::{RepoError, RepoResult};
pub use service::LibraryService;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
