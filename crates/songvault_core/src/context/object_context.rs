//! Read/write context with its own cache of live entities.
//!
//! # Responsibility
//! - Track pending inserts, property-level updates and deletes.
//! - Commit pending work in one transaction and publish a merge event.
//! - Apply merge events from other contexts to the cache by identity.
//!
//! # Invariants
//! - An identity is cached at most once; fetch results never repeat one.
//! - Pending deletes hide an object from every read in this context.
//! - A failed save keeps every pending change.

use super::changes::{BatchDeleteResult, ChangeOrigin, MergeEvent, MergeOutcome, ObjectChanges};
use super::coordinator::{ContextMessage, ContextQueue, MergeCoordinator};
use super::live_query::{LiveQueries, ResultsListener, SubscriptionId};
use super::{ContextId, ContextRole, MergePolicy, PersistenceError, PersistenceResult};
use crate::db::{Store, StoreGuard};
use crate::model::{Attribute, Entity, EntityKind, ObjectId, Song, User, Value};
use crate::query::{BatchDeleteRequest, FetchRequest};
use crate::repo::{self, song_repo, RepoResult};
use log::{debug, error, info, warn};
use rusqlite::Connection;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct PendingChanges {
    inserted: BTreeSet<ObjectId>,
    updated: BTreeMap<ObjectId, BTreeSet<Attribute>>,
    deleted: BTreeSet<ObjectId>,
}

impl PendingChanges {
    fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    fn forget(&mut self, object_id: ObjectId) -> bool {
        let inserted = self.inserted.remove(&object_id);
        let updated = self.updated.remove(&object_id).is_some();
        let deleted = self.deleted.remove(&object_id);
        inserted || updated || deleted
    }
}

struct SavePlan {
    deleted: Vec<ObjectId>,
    inserted: Vec<Entity>,
    updated: Vec<ObjectChanges>,
}

/// A read/write handle over the shared store.
///
/// Owned by exactly one thread. Other threads schedule work onto it through
/// [`Context::queue`].
pub struct Context {
    id: ContextId,
    role: ContextRole,
    merge_policy: MergePolicy,
    store: Arc<Store>,
    coordinator: Arc<MergeCoordinator>,
    queue: ContextQueue,
    inbox: Receiver<ContextMessage>,
    cache: BTreeMap<ObjectId, Entity>,
    pending: PendingChanges,
    live_queries: LiveQueries,
}

impl Context {
    pub(crate) fn new(
        role: ContextRole,
        merge_policy: MergePolicy,
        store: Arc<Store>,
        coordinator: Arc<MergeCoordinator>,
    ) -> Self {
        let (queue, inbox) = coordinator.register();
        debug!(
            "event=context_open module=context status=ok context={} role={} policy={}",
            queue.context_id(),
            role.as_str(),
            merge_policy.as_str()
        );
        Self {
            id: queue.context_id(),
            role,
            merge_policy,
            store,
            coordinator,
            queue,
            inbox,
            cache: BTreeMap::new(),
            pending: PendingChanges::default(),
            live_queries: LiveQueries::default(),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn role(&self) -> ContextRole {
        self.role
    }

    pub fn merge_policy(&self) -> MergePolicy {
        self.merge_policy
    }

    /// Handle for scheduling work onto this context from any thread.
    pub fn queue(&self) -> ContextQueue {
        self.queue.clone()
    }

    pub fn has_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Cached instance, without consulting the store.
    pub fn cached(&self, object_id: ObjectId) -> Option<&Entity> {
        if self.pending.deleted.contains(&object_id) {
            return None;
        }
        self.cache.get(&object_id)
    }

    pub fn is_registered(&self, object_id: ObjectId) -> bool {
        self.cache.contains_key(&object_id)
    }

    /// Number of identities held in the cache.
    pub fn registered_objects(&self) -> usize {
        self.cache.len()
    }

    /// Registers a new object; it becomes durable on the next save.
    pub fn insert(&mut self, entity: impl Into<Entity>) -> PersistenceResult<ObjectId> {
        let entity = entity.into();
        entity.validate()?;
        let object_id = entity.object_id();
        if self.cache.contains_key(&object_id) || self.pending.deleted.contains(&object_id) {
            return Err(PersistenceError::DuplicateObject(object_id));
        }
        if let Some(song) = entity.as_song() {
            if !self.is_live(song.owner)? {
                return Err(PersistenceError::NotFound(song.owner));
            }
        }

        self.cache.insert(object_id, entity);
        self.pending.inserted.insert(object_id);
        self.refresh_live_queries();
        Ok(object_id)
    }

    /// Looks an object up in the cache, then in the store.
    pub fn object(&mut self, object_id: ObjectId) -> PersistenceResult<Option<Entity>> {
        if self.pending.deleted.contains(&object_id) || !self.ensure_registered(object_id)? {
            return Ok(None);
        }
        Ok(self.cache.get(&object_id).cloned())
    }

    pub fn user(&mut self, object_id: ObjectId) -> PersistenceResult<Option<User>> {
        expect_kind(object_id, EntityKind::User)?;
        Ok(self.object(object_id)?.and_then(Entity::into_user))
    }

    pub fn song(&mut self, object_id: ObjectId) -> PersistenceResult<Option<Song>> {
        expect_kind(object_id, EntityKind::Song)?;
        Ok(self.object(object_id)?.and_then(Entity::into_song))
    }

    /// Changes one property in memory; it becomes durable on the next save.
    pub fn set(
        &mut self,
        object_id: ObjectId,
        attribute: Attribute,
        value: impl Into<Value>,
    ) -> PersistenceResult<()> {
        if self.pending.deleted.contains(&object_id) || !self.ensure_registered(object_id)? {
            return Err(PersistenceError::NotFound(object_id));
        }
        let Some(current) = self.cache.get(&object_id) else {
            return Err(PersistenceError::NotFound(object_id));
        };

        let mut changed = current.clone();
        changed.set(attribute, value.into())?;
        changed.validate()?;
        if changed == *current {
            return Ok(());
        }
        if let (Attribute::Owner, Some(song)) = (attribute, changed.as_song()) {
            if !self.is_live(song.owner)? {
                return Err(PersistenceError::NotFound(song.owner));
            }
        }

        self.cache.insert(object_id, changed);
        if !self.pending.inserted.contains(&object_id) {
            self.pending
                .updated
                .entry(object_id)
                .or_default()
                .insert(attribute);
        }
        self.refresh_live_queries();
        Ok(())
    }

    /// Marks an object (and, for users, every song they own) for removal.
    pub fn delete(&mut self, object_id: ObjectId) -> PersistenceResult<()> {
        if self.pending.deleted.contains(&object_id) {
            return Ok(());
        }
        if !self.ensure_registered(object_id)? {
            return Err(PersistenceError::NotFound(object_id));
        }

        if object_id.kind() == EntityKind::User {
            let mut owned: BTreeSet<ObjectId> = if self.pending.inserted.contains(&object_id) {
                BTreeSet::new()
            } else {
                self.store
                    .read(|conn| song_repo::song_ids_owned_by(conn, object_id.uuid()))
                    .map_err(PersistenceError::Fetch)?
                    .into_iter()
                    .collect()
            };
            // Stored songs moved to another owner in this context survive.
            owned.retain(|song_id| {
                self.cache
                    .get(song_id)
                    .and_then(Entity::as_song)
                    .map_or(true, |song| song.owner == object_id)
            });
            owned.extend(
                self.cache
                    .values()
                    .filter_map(Entity::as_song)
                    .filter(|song| song.owner == object_id)
                    .map(|song| song.object_id),
            );
            for song_id in owned {
                self.mark_deleted(song_id);
            }
        }

        self.mark_deleted(object_id);
        self.refresh_live_queries();
        Ok(())
    }

    /// Runs `request` against the store merged with this context's cache.
    pub fn fetch(&mut self, request: &FetchRequest) -> PersistenceResult<Vec<Entity>> {
        let stored = self
            .store
            .read(|conn| repo::fetch_entities(conn, request))
            .map_err(PersistenceError::Fetch)?;

        let mut candidates = BTreeSet::new();
        for entity in stored {
            let object_id = entity.object_id();
            if self.pending.deleted.contains(&object_id) {
                continue;
            }
            candidates.insert(object_id);
            self.cache.entry(object_id).or_insert(entity);
        }
        candidates.extend(
            self.pending
                .inserted
                .iter()
                .chain(self.pending.updated.keys())
                .filter(|object_id| object_id.kind() == request.entity)
                .copied(),
        );
        // SQL matched owner paths against stored users; songs of owners edited
        // here must be re-checked against the cached owner.
        if request
            .predicate
            .as_ref()
            .is_some_and(|predicate| predicate.references_owner())
        {
            let edited_owners: BTreeSet<ObjectId> = self
                .pending
                .inserted
                .iter()
                .chain(self.pending.updated.keys())
                .filter(|object_id| object_id.kind() == EntityKind::User)
                .copied()
                .collect();
            for owner in &edited_owners {
                if self.pending.inserted.contains(owner) {
                    continue;
                }
                let stored_songs = self
                    .store
                    .read(|conn| song_repo::song_ids_owned_by(conn, owner.uuid()))
                    .map_err(PersistenceError::Fetch)?;
                for song_id in stored_songs {
                    if !self.pending.deleted.contains(&song_id) {
                        self.ensure_registered(song_id)?;
                    }
                }
            }
            if !edited_owners.is_empty() {
                candidates.extend(
                    self.cache
                        .values()
                        .filter_map(Entity::as_song)
                        .filter(|song| edited_owners.contains(&song.owner))
                        .map(|song| song.object_id)
                        .filter(|object_id| !self.pending.deleted.contains(object_id)),
                );
            }
        }

        let mut results = Vec::with_capacity(candidates.len());
        for object_id in candidates {
            let Some(entity) = self.cache.get(&object_id) else {
                continue;
            };
            let matches = match &request.predicate {
                Some(predicate) => {
                    predicate.evaluate(entity, &mut |owner| self.resolve_live(owner))
                }
                None => true,
            };
            if matches {
                results.push(entity.clone());
            }
        }

        results.sort_by(|left, right| request.compare(left, right));
        if let Some(limit) = request.limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    pub fn count(&mut self, request: &FetchRequest) -> PersistenceResult<usize> {
        if request.predicate.is_none() && request.is_valid() && !self.has_changes() {
            let stored = self
                .store
                .read(|conn| repo::count_entities(conn, request.entity))
                .map_err(PersistenceError::Fetch)?;
            return Ok(request.limit.map_or(stored, |limit| stored.min(limit)));
        }
        Ok(self.fetch(request)?.len())
    }

    /// Commits every pending change in one transaction.
    ///
    /// No-op without pending changes. On success the merge event is published
    /// to every other context before the store lock is released.
    pub fn save(&mut self) -> PersistenceResult<()> {
        if !self.has_changes() {
            return Ok(());
        }
        let started_at = Instant::now();
        let plan = self.build_save_plan()?;

        let mut guard = self.store.lock();
        let vanished = match commit_plan(&mut guard, &plan) {
            Ok(vanished) => vanished,
            Err(err) => {
                drop(guard);
                error!(
                    "event=context_save module=context status=error context={} role={} error={}",
                    self.id,
                    self.role.as_str(),
                    err
                );
                return Err(PersistenceError::Save(err));
            }
        };
        let commit_sequence = guard.next_commit_sequence();

        let SavePlan {
            deleted,
            inserted,
            mut updated,
        } = plan;
        updated.retain(|changes| !vanished.contains(&changes.object_id));
        let event = Arc::new(MergeEvent {
            origin: ChangeOrigin::Save(self.id),
            commit_sequence,
            inserted: inserted
                .iter()
                .map(|entity| ObjectChanges {
                    object_id: entity.object_id(),
                    properties: entity.properties(),
                })
                .collect(),
            updated,
            deleted,
        });
        let delivered = self.coordinator.publish(Arc::clone(&event));
        drop(guard);

        for object_id in &vanished {
            warn!(
                "event=context_save module=context status=skipped context={} object={} reason=row_deleted",
                self.id, object_id
            );
        }
        self.pending = PendingChanges::default();
        for object_id in event.deleted.iter().chain(&vanished) {
            self.cache.remove(object_id);
        }

        info!(
            "event=context_save module=context status=ok context={} role={} sequence={} inserted={} updated={} deleted={} delivered={} duration_ms={}",
            self.id,
            self.role.as_str(),
            commit_sequence,
            event.inserted.len(),
            event.updated.len(),
            event.deleted.len(),
            delivered,
            started_at.elapsed().as_millis()
        );
        self.refresh_live_queries();
        Ok(())
    }

    /// Discards pending changes and restores touched objects from the store.
    pub fn rollback(&mut self) -> PersistenceResult<()> {
        let touched: BTreeSet<ObjectId> = self
            .pending
            .updated
            .keys()
            .chain(&self.pending.deleted)
            .copied()
            .collect();
        let mut restored = Vec::with_capacity(touched.len());
        for object_id in touched {
            restored.push((object_id, self.load_from_store(object_id)?));
        }

        for object_id in std::mem::take(&mut self.pending.inserted) {
            self.cache.remove(&object_id);
        }
        for (object_id, entity) in restored {
            match entity {
                Some(entity) => {
                    self.cache.insert(object_id, entity);
                }
                None => {
                    self.cache.remove(&object_id);
                }
            }
        }
        self.pending = PendingChanges::default();
        debug!(
            "event=context_rollback module=context status=ok context={}",
            self.id
        );
        self.refresh_live_queries();
        Ok(())
    }

    /// Drops the whole cache and every pending change.
    pub fn reset(&mut self) {
        self.cache.clear();
        self.pending = PendingChanges::default();
        debug!("event=context_reset module=context status=ok context={}", self.id);
        self.refresh_live_queries();
    }

    /// Deletes matching rows directly in the store.
    ///
    /// Neither this context nor any other sees the deletion until the result
    /// is merged (see [`Context::merge_batch_delete`]).
    pub fn execute_batch_delete(
        &self,
        request: &BatchDeleteRequest,
    ) -> PersistenceResult<BatchDeleteResult> {
        self.execute_batch_deletes(std::slice::from_ref(request))
    }

    /// Runs several batch deletes, in order, as one commit.
    ///
    /// Either every request is applied or none is.
    pub fn execute_batch_deletes(
        &self,
        requests: &[BatchDeleteRequest],
    ) -> PersistenceResult<BatchDeleteResult> {
        let mut guard = self.store.lock();
        let deleted = match commit_batch_deletes(&mut guard, requests) {
            Ok(deleted) => deleted,
            Err(err) => {
                drop(guard);
                error!(
                    "event=batch_delete module=context status=error context={} requests={} error={}",
                    self.id,
                    requests.len(),
                    err
                );
                return Err(PersistenceError::Save(err));
            }
        };
        let commit_sequence = guard.next_commit_sequence();
        drop(guard);

        for request in requests {
            info!(
                "event=batch_delete module=context status=ok context={} entity={} sequence={} deleted={}",
                self.id,
                request.entity,
                commit_sequence,
                deleted
                    .iter()
                    .filter(|object_id| object_id.kind() == request.entity)
                    .count()
            );
        }
        Ok(BatchDeleteResult {
            deleted,
            commit_sequence,
        })
    }

    /// Merges a batch delete into this context, then publishes it to all
    /// other contexts.
    pub fn merge_batch_delete(&mut self, result: BatchDeleteResult) -> MergeOutcome {
        let event = Arc::new(result.into_merge_event(self.id));
        let outcome = self.merge_changes(&event);
        self.coordinator.publish(event);
        outcome
    }

    /// Applies another context's committed changes to this cache.
    pub fn merge_changes(&mut self, event: &MergeEvent) -> MergeOutcome {
        if event.origin == ChangeOrigin::Save(self.id) {
            return MergeOutcome::ignored();
        }

        let mut outcome = MergeOutcome::default();
        for changes in &event.inserted {
            match self.merge_object(changes, true) {
                Some(true) => outcome.inserted += 1,
                Some(false) => outcome.updated += 1,
                None => {}
            }
        }
        for changes in &event.updated {
            match self.merge_object(changes, false) {
                Some(true) => outcome.inserted += 1,
                Some(false) => outcome.updated += 1,
                None => {}
            }
        }
        for object_id in &event.deleted {
            outcome.deleted += self.evict(*object_id);
        }

        debug!(
            "event=merge_apply module=context status=ok context={} origin={} kind={} sequence={} inserted={} updated={} deleted={}",
            self.id,
            event.origin.context_id(),
            event.origin.as_str(),
            event.commit_sequence,
            outcome.inserted,
            outcome.updated,
            outcome.deleted
        );
        if !event.is_empty() {
            self.refresh_live_queries();
        }
        outcome
    }

    /// Applies every message already waiting in the inbox.
    ///
    /// Returns the number of messages handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.inbox.try_recv() {
            self.handle_message(message);
            handled += 1;
        }
        handled
    }

    /// Blocks up to `timeout` for the first message, then drains the inbox.
    pub fn wait_for_pending(&mut self, timeout: Duration) -> usize {
        match self.inbox.recv_timeout(timeout) {
            Ok(message) => {
                self.handle_message(message);
                1 + self.process_pending()
            }
            Err(_) => 0,
        }
    }

    /// Starts a live fetch. The listener is called with the initial results and
    /// again whenever an insert, edit, delete, save, merge, rollback or reset
    /// changes them.
    pub fn subscribe(
        &mut self,
        request: FetchRequest,
        listener: Option<ResultsListener>,
    ) -> PersistenceResult<SubscriptionId> {
        let results = self.fetch(&request)?;
        Ok(self.live_queries.insert(request, results, listener))
    }

    pub fn subscription_results(&self, subscription: SubscriptionId) -> Option<&[Entity]> {
        self.live_queries.results(subscription)
    }

    pub fn unsubscribe(&mut self, subscription: SubscriptionId) -> bool {
        self.live_queries.remove(subscription)
    }

    pub fn subscriptions(&self) -> usize {
        self.live_queries.len()
    }

    fn handle_message(&mut self, message: ContextMessage) {
        match message {
            ContextMessage::Merge(event) => {
                self.merge_changes(&event);
            }
            ContextMessage::Perform(work) => work(self),
        }
    }

    /// Returns `Some(true)` when the object was newly cached, `Some(false)`
    /// when a cached instance changed, `None` when nothing happened.
    fn merge_object(&mut self, changes: &ObjectChanges, is_snapshot: bool) -> Option<bool> {
        let object_id = changes.object_id;
        if self.pending.deleted.contains(&object_id) {
            return None;
        }

        if !self.cache.contains_key(&object_id) {
            let materialized = if is_snapshot {
                Entity::from_properties(object_id, &changes.properties)
                    .map(Some)
                    .map_err(PersistenceError::from)
            } else {
                self.load_from_store(object_id)
            };
            return match materialized {
                Ok(Some(entity)) => {
                    self.cache.insert(object_id, entity);
                    Some(true)
                }
                Ok(None) => None,
                Err(err) => {
                    warn!(
                        "event=merge_apply module=context status=skipped context={} object={} error={}",
                        self.id, object_id, err
                    );
                    None
                }
            };
        }
        let Some(entity) = self.cache.get_mut(&object_id) else {
            return None;
        };

        let mut changed = false;
        for (attribute, value) in &changes.properties {
            let locally_edited = self
                .pending
                .updated
                .get(&object_id)
                .is_some_and(|attributes| attributes.contains(attribute));
            if locally_edited && self.merge_policy == MergePolicy::LocalPendingWins {
                continue;
            }
            if entity.value(*attribute).as_ref() != Some(value) {
                if let Err(err) = entity.set(*attribute, value.clone()) {
                    warn!(
                        "event=merge_apply module=context status=skipped context={} object={} attribute={} error={}",
                        self.id, object_id, attribute, err
                    );
                    continue;
                }
                changed = true;
            }
            if locally_edited {
                if let Some(attributes) = self.pending.updated.get_mut(&object_id) {
                    attributes.remove(attribute);
                    if attributes.is_empty() {
                        self.pending.updated.remove(&object_id);
                    }
                }
            }
        }
        changed.then_some(false)
    }

    /// Removes an identity, plus the songs of a removed user, from cache and
    /// pending state. Returns how many identities this context knew about.
    fn evict(&mut self, object_id: ObjectId) -> usize {
        let mut removed = 0;
        if object_id.kind() == EntityKind::User {
            let owned: Vec<ObjectId> = self
                .cache
                .values()
                .filter_map(Entity::as_song)
                .filter(|song| song.owner == object_id)
                .map(|song| song.object_id)
                .collect();
            for song_id in owned {
                removed += self.evict(song_id);
            }
        }
        let cached = self.cache.remove(&object_id).is_some();
        let pending = self.pending.forget(object_id);
        if cached || pending {
            removed += 1;
        }
        removed
    }

    fn mark_deleted(&mut self, object_id: ObjectId) {
        self.pending.updated.remove(&object_id);
        if self.pending.inserted.remove(&object_id) {
            self.cache.remove(&object_id);
        } else {
            self.pending.deleted.insert(object_id);
        }
    }

    fn build_save_plan(&self) -> PersistenceResult<SavePlan> {
        let mut inserted = Vec::with_capacity(self.pending.inserted.len());
        for object_id in &self.pending.inserted {
            let entity = self
                .cache
                .get(object_id)
                .ok_or(PersistenceError::NotFound(*object_id))?;
            entity.validate()?;
            inserted.push(entity.clone());
        }
        // Owners before the songs that reference them.
        inserted.sort_by_key(Entity::kind);

        let mut updated = Vec::with_capacity(self.pending.updated.len());
        for (object_id, attributes) in &self.pending.updated {
            let entity = self
                .cache
                .get(object_id)
                .ok_or(PersistenceError::NotFound(*object_id))?;
            entity.validate()?;
            let properties: Vec<(Attribute, Value)> = attributes
                .iter()
                .filter_map(|attribute| entity.value(*attribute).map(|value| (*attribute, value)))
                .collect();
            if !properties.is_empty() {
                updated.push(ObjectChanges {
                    object_id: *object_id,
                    properties,
                });
            }
        }

        let mut deleted: Vec<ObjectId> = self.pending.deleted.iter().copied().collect();
        // Songs before their owners.
        deleted.sort_by_key(|object_id| std::cmp::Reverse(object_id.kind()));

        Ok(SavePlan {
            deleted,
            inserted,
            updated,
        })
    }

    fn refresh_live_queries(&mut self) {
        if self.live_queries.is_empty() {
            return;
        }
        for (subscription, request) in self.live_queries.requests() {
            let results = match self.fetch(&request) {
                Ok(results) => results,
                Err(err) => {
                    error!(
                        "event=live_query_refresh module=context status=error context={} entity={} error={}",
                        self.id, request.entity, err
                    );
                    Vec::new()
                }
            };
            self.live_queries.update(subscription, results);
        }
    }

    /// Loads into the cache if absent. Returns whether the object exists.
    fn ensure_registered(&mut self, object_id: ObjectId) -> PersistenceResult<bool> {
        if self.cache.contains_key(&object_id) {
            return Ok(true);
        }
        match self.load_from_store(object_id)? {
            Some(entity) => {
                self.cache.insert(object_id, entity);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn is_live(&self, object_id: ObjectId) -> PersistenceResult<bool> {
        if self.pending.deleted.contains(&object_id) {
            return Ok(false);
        }
        if self.cache.contains_key(&object_id) {
            return Ok(true);
        }
        Ok(self.load_from_store(object_id)?.is_some())
    }

    fn resolve_live(&self, object_id: ObjectId) -> Option<Entity> {
        if self.pending.deleted.contains(&object_id) {
            return None;
        }
        if let Some(entity) = self.cache.get(&object_id) {
            return Some(entity.clone());
        }
        self.load_from_store(object_id).ok().flatten()
    }

    fn load_from_store(&self, object_id: ObjectId) -> PersistenceResult<Option<Entity>> {
        self.store
            .read(|conn| repo::load_entity(conn, object_id))
            .map_err(PersistenceError::Fetch)
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.coordinator.unregister(self.id);
        debug!(
            "event=context_close module=context status=ok context={} role={} pending={}",
            self.id,
            self.role.as_str(),
            self.has_changes()
        );
    }
}

fn expect_kind(object_id: ObjectId, expected: EntityKind) -> PersistenceResult<()> {
    if object_id.kind() == expected {
        Ok(())
    } else {
        Err(PersistenceError::WrongEntity {
            expected,
            found: object_id.kind(),
        })
    }
}

fn commit_plan(guard: &mut StoreGuard<'_>, plan: &SavePlan) -> RepoResult<Vec<ObjectId>> {
    let tx = guard.transaction()?;
    let vanished = write_plan(&tx, plan)?;
    tx.commit()?;
    Ok(vanished)
}

/// Writes deletes, inserts and updates. Returns updated identities whose
/// rows no longer exist.
fn write_plan(conn: &Connection, plan: &SavePlan) -> RepoResult<Vec<ObjectId>> {
    for object_id in &plan.deleted {
        repo::delete_entity(conn, *object_id)?;
    }
    for entity in &plan.inserted {
        repo::insert_entity(conn, entity)?;
    }
    let mut vanished = Vec::new();
    for changes in &plan.updated {
        if !repo::update_entity(conn, changes.object_id, &changes.properties)? {
            vanished.push(changes.object_id);
        }
    }
    Ok(vanished)
}

fn commit_batch_deletes(
    guard: &mut StoreGuard<'_>,
    requests: &[BatchDeleteRequest],
) -> RepoResult<Vec<ObjectId>> {
    let tx = guard.transaction()?;
    let mut deleted = Vec::new();
    for request in requests {
        deleted.extend(repo::batch_delete(&tx, request)?);
    }
    tx.commit()?;
    Ok(deleted)
}
