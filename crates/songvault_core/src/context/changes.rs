//! Change records exchanged between contexts.

use super::ContextId;
use crate::model::{Attribute, EntityKind, ObjectId, Value};

/// Who produced a merge event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// A context committed its pending changes.
    Save(ContextId),
    /// A context executed a store-level batch delete.
    BatchDelete(ContextId),
}

impl ChangeOrigin {
    pub fn context_id(self) -> ContextId {
        match self {
            Self::Save(context_id) | Self::BatchDelete(context_id) => context_id,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Save(_) => "save",
            Self::BatchDelete(_) => "batch_delete",
        }
    }
}

/// Properties of one object carried by a merge event.
///
/// Inserts carry a full snapshot, updates only the changed properties.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectChanges {
    pub object_id: ObjectId,
    pub properties: Vec<(Attribute, Value)>,
}

/// Record of one commit, consumed by every other live context.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeEvent {
    pub origin: ChangeOrigin,
    /// Store commit number; events from one store arrive in this order.
    pub commit_sequence: u64,
    pub inserted: Vec<ObjectChanges>,
    pub updated: Vec<ObjectChanges>,
    pub deleted: Vec<ObjectId>,
}

impl MergeEvent {
    /// Deletion-only event for a batch delete, which never has properties.
    pub fn from_batch_delete(
        executed_by: ContextId,
        commit_sequence: u64,
        deleted: Vec<ObjectId>,
    ) -> Self {
        Self {
            origin: ChangeOrigin::BatchDelete(executed_by),
            commit_sequence,
            inserted: Vec::new(),
            updated: Vec::new(),
            deleted,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Number of object identities touched.
    pub fn len(&self) -> usize {
        self.inserted.len() + self.updated.len() + self.deleted.len()
    }
}

/// Identities removed by one batch-delete commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchDeleteResult {
    pub deleted: Vec<ObjectId>,
    pub commit_sequence: u64,
}

impl BatchDeleteResult {
    pub fn count_of(&self, kind: EntityKind) -> usize {
        self.deleted
            .iter()
            .filter(|object_id| object_id.kind() == kind)
            .count()
    }

    pub fn into_merge_event(self, executed_by: ContextId) -> MergeEvent {
        MergeEvent::from_batch_delete(executed_by, self.commit_sequence, self.deleted)
    }
}

/// What one merge changed in the receiving context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    /// The event was this context's own save and was skipped.
    pub ignored: bool,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl MergeOutcome {
    pub(crate) fn ignored() -> Self {
        Self {
            ignored: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.deleted == 0
    }
}
