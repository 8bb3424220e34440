//! Persistence stack owner: store, coordinator, view context, workers.
//!
//! # Responsibility
//! - Open the durable store and wire every context to one coordinator.
//! - Create background contexts and run fire-and-forget tasks on them.
//!
//! # Invariants
//! - Exactly one view context per controller.
//! - Dropping the controller joins every outstanding background task.

use crate::config::StoreConfig;
use crate::context::{
    BackgroundExecutor, Context, ContextQueue, ContextRole, MergeCoordinator, MergePolicy,
    PersistenceError, PersistenceResult,
};
use crate::db::{DbError, Store};
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;

pub struct PersistenceController {
    store: Arc<Store>,
    coordinator: Arc<MergeCoordinator>,
    merge_policy: MergePolicy,
    view_context: Context,
    executor: BackgroundExecutor,
}

impl PersistenceController {
    /// Opens (creating if needed) the file store described by `config`.
    ///
    /// # Errors
    /// - `StoreOpen` when the config is invalid or the store cannot be opened
    ///   or migrated.
    pub fn open(config: &StoreConfig) -> PersistenceResult<Self> {
        config
            .validate()
            .map_err(|err| PersistenceError::StoreOpen(DbError::from(err)))?;

        let path = config.database_path();
        let store = Store::open(&path).map_err(|err| {
            error!(
                "event=store_open module=controller status=error path={} error={}",
                path.display(),
                err
            );
            PersistenceError::StoreOpen(err)
        })?;
        info!(
            "event=store_open module=controller status=ok path={} policy={}",
            path.display(),
            config.merge_policy.as_str()
        );
        Ok(Self::with_store(Arc::new(store), config.merge_policy))
    }

    /// Private in-memory store with the default merge policy.
    pub fn open_in_memory() -> PersistenceResult<Self> {
        let store = Store::open_in_memory().map_err(PersistenceError::StoreOpen)?;
        Ok(Self::with_store(Arc::new(store), MergePolicy::default()))
    }

    pub fn with_store(store: Arc<Store>, merge_policy: MergePolicy) -> Self {
        let coordinator = Arc::new(MergeCoordinator::new());
        let view_context = Context::new(
            ContextRole::View,
            merge_policy,
            Arc::clone(&store),
            Arc::clone(&coordinator),
        );
        Self {
            store,
            coordinator,
            merge_policy,
            view_context,
            executor: BackgroundExecutor::new(),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<MergeCoordinator> {
        &self.coordinator
    }

    pub fn merge_policy(&self) -> MergePolicy {
        self.merge_policy
    }

    pub fn view_context(&self) -> &Context {
        &self.view_context
    }

    pub fn view_context_mut(&mut self) -> &mut Context {
        &mut self.view_context
    }

    /// Handle that schedules work onto the view context.
    pub fn main_queue(&self) -> ContextQueue {
        self.view_context.queue()
    }

    /// Saves the view context when it has pending changes.
    pub fn save_context(&mut self) -> PersistenceResult<()> {
        if !self.view_context.has_changes() {
            return Ok(());
        }
        self.view_context.save()
    }

    /// A fresh context over the same store, registered for merges.
    pub fn new_background_context(&self) -> Context {
        Context::new(
            ContextRole::Background,
            self.merge_policy,
            Arc::clone(&self.store),
            Arc::clone(&self.coordinator),
        )
    }

    /// Runs `work` on a new background context on a worker thread.
    ///
    /// The context is created (and registered) before this call returns and
    /// dropped when `work` finishes. Returns `false` when no worker could be
    /// started; `work` is not run in that case.
    pub fn perform_background_task<F>(&self, work: F) -> bool
    where
        F: FnOnce(&mut Context) + Send + 'static,
    {
        let mut context = self.new_background_context();
        self.executor.spawn(move || {
            context.process_pending();
            work(&mut context);
        })
    }

    /// Joins every outstanding background task.
    pub fn wait_for_background_tasks(&self) -> usize {
        self.executor.wait_idle()
    }

    /// Applies everything already queued for the view context.
    pub fn process_main_queue(&mut self) -> usize {
        self.view_context.process_pending()
    }

    /// Waits up to `timeout` for work on the view context, then drains it.
    pub fn wait_for_main_queue(&mut self, timeout: Duration) -> usize {
        self.view_context.wait_for_pending(timeout)
    }
}

impl Drop for PersistenceController {
    fn drop(&mut self) {
        self.executor.wait_idle();
        if self.view_context.has_changes() {
            info!(
                "event=controller_close module=controller status=ok unsaved_changes=true context={}",
                self.view_context.id()
            );
        }
    }
}
