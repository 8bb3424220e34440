//! Merge coordinator and per-context inbox handles.
//!
//! # Responsibility
//! - Register every live context's inbox at creation.
//! - Fan merge events out to all contexts except the originating one.
//!
//! # Invariants
//! - The coordinator never touches a context's cache; it only enqueues.
//! - Closed inboxes are pruned on the next publish.

use super::changes::MergeEvent;
use super::object_context::Context;
use super::ContextId;
use log::{debug, warn};
use parking_lot::Mutex;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

pub(crate) type ContextWork = Box<dyn FnOnce(&mut Context) + Send>;

/// Work item delivered to a context's inbox.
pub(crate) enum ContextMessage {
    Merge(Arc<MergeEvent>),
    Perform(ContextWork),
}

/// Cloneable handle that schedules work onto one context's thread.
#[derive(Clone)]
pub struct ContextQueue {
    context_id: ContextId,
    sender: Sender<ContextMessage>,
}

impl Debug for ContextQueue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextQueue")
            .field("context_id", &self.context_id)
            .finish()
    }
}

impl ContextQueue {
    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    /// Enqueues `work`; it runs the next time the owning thread drains the
    /// context's inbox. Returns `false` when the context is gone.
    pub fn perform<F>(&self, work: F) -> bool
    where
        F: FnOnce(&mut Context) + Send + 'static,
    {
        self.sender
            .send(ContextMessage::Perform(Box::new(work)))
            .is_ok()
    }

    pub(crate) fn deliver(&self, event: Arc<MergeEvent>) -> bool {
        self.sender.send(ContextMessage::Merge(event)).is_ok()
    }
}

/// Fans committed changes out to every other live context.
pub struct MergeCoordinator {
    inboxes: Mutex<Vec<ContextQueue>>,
    next_context_id: AtomicU64,
}

impl Default for MergeCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl MergeCoordinator {
    pub fn new() -> Self {
        Self {
            inboxes: Mutex::new(Vec::new()),
            next_context_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn register(&self) -> (ContextQueue, Receiver<ContextMessage>) {
        let context_id = ContextId::new(self.next_context_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = channel();
        let queue = ContextQueue { context_id, sender };
        self.inboxes.lock().push(queue.clone());
        (queue, receiver)
    }

    pub(crate) fn unregister(&self, context_id: ContextId) {
        self.inboxes
            .lock()
            .retain(|queue| queue.context_id != context_id);
    }

    /// Number of registered contexts.
    pub fn live_contexts(&self) -> usize {
        self.inboxes.lock().len()
    }

    /// Delivers `event` to every registered context except its origin.
    ///
    /// Returns the number of inboxes that accepted the event.
    pub fn publish(&self, event: Arc<MergeEvent>) -> usize {
        if event.is_empty() {
            return 0;
        }

        let origin = event.origin.context_id();
        let mut delivered = 0;
        let mut inboxes = self.inboxes.lock();
        inboxes.retain(|queue| {
            if queue.context_id == origin {
                return true;
            }
            if queue.deliver(Arc::clone(&event)) {
                delivered += 1;
                true
            } else {
                warn!(
                    "event=merge_publish module=context status=pruned context={}",
                    queue.context_id
                );
                false
            }
        });

        debug!(
            "event=merge_publish module=context status=ok origin={} kind={} sequence={} delivered={} objects={}",
            origin,
            event.origin.as_str(),
            event.commit_sequence,
            delivered,
            event.len()
        );
        delivered
    }
}
