//! Object contexts and cross-context change propagation.
//!
//! # Responsibility
//! - `Context`: a read/write handle with its own cache of live entities.
//! - `MergeCoordinator`: delivers committed changes to every other context.
//! - `BackgroundExecutor`: runs fire-and-forget work on worker threads.
//!
//! # Invariants
//! - A context is only ever touched by the thread that owns it; other
//!   threads reach it through its inbox (`ContextQueue`).
//! - A context never merges its own save.
//! - After all pending merges are applied, every cache agrees with the store.

mod background;
mod changes;
mod coordinator;
mod live_query;
mod object_context;

pub use background::BackgroundExecutor;
pub use changes::{BatchDeleteResult, ChangeOrigin, MergeEvent, MergeOutcome, ObjectChanges};
pub use coordinator::{ContextQueue, MergeCoordinator};
pub use live_query::{ResultsListener, SubscriptionId};
pub use object_context::Context;

use crate::db::DbError;
use crate::model::{EntityKind, ObjectId, ValidationError};
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Errors surfaced at the context boundary.
#[derive(Debug)]
pub enum PersistenceError {
    /// The dataset failed to open or bootstrap.
    StoreOpen(DbError),
    /// A commit failed; pending changes are kept.
    Save(RepoError),
    /// A query failed.
    Fetch(RepoError),
    NotFound(ObjectId),
    DuplicateObject(ObjectId),
    Validation(ValidationError),
    WrongEntity {
        expected: EntityKind,
        found: EntityKind,
    },
}

impl Display for PersistenceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StoreOpen(err) => write!(f, "failed to open store: {err}"),
            Self::Save(err) => write!(f, "failed to save context: {err}"),
            Self::Fetch(err) => write!(f, "failed to fetch: {err}"),
            Self::NotFound(object_id) => write!(f, "object not found: {object_id}"),
            Self::DuplicateObject(object_id) => {
                write!(f, "object already registered: {object_id}")
            }
            Self::Validation(err) => write!(f, "{err}"),
            Self::WrongEntity { expected, found } => {
                write!(f, "expected a {expected} object, got a {found}")
            }
        }
    }
}

impl Error for PersistenceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StoreOpen(err) => Some(err),
            Self::Save(err) | Self::Fetch(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::NotFound(_) | Self::DuplicateObject(_) | Self::WrongEntity { .. } => None,
        }
    }
}

impl From<ValidationError> for PersistenceError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Process-unique context identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for ContextId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Whether a context serves the foreground or a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextRole {
    View,
    Background,
}

impl ContextRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Background => "background",
        }
    }
}

/// How incoming merges treat properties this context has edited but not saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Every incoming property overwrites the cached value and cancels the
    /// local pending edit of that property.
    #[default]
    IncomingPropertyWins,
    /// Properties with unsaved local edits keep the local value; all other
    /// incoming properties are applied.
    LocalPendingWins,
}

impl MergePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IncomingPropertyWins => "incoming_property_wins",
            Self::LocalPendingWins => "local_pending_wins",
        }
    }
}
