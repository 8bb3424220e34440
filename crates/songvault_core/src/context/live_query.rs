//! Live fetch subscriptions bound to one context.
//!
//! A subscription stores its last result set. The owning context re-runs the
//! request after every save, merge, rollback or reset and calls the listener
//! only when the result set actually changed.

use crate::model::Entity;
use crate::query::FetchRequest;
use std::collections::BTreeMap;

/// Observer called with the current result set.
pub type ResultsListener = Box<dyn FnMut(&[Entity]) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Subscription {
    request: FetchRequest,
    results: Vec<Entity>,
    listener: Option<ResultsListener>,
}

#[derive(Default)]
pub(crate) struct LiveQueries {
    next_id: u64,
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
}

impl LiveQueries {
    /// Registers a subscription and notifies its listener with `results`.
    pub(crate) fn insert(
        &mut self,
        request: FetchRequest,
        results: Vec<Entity>,
        mut listener: Option<ResultsListener>,
    ) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        if let Some(listener) = listener.as_mut() {
            listener(&results);
        }
        self.subscriptions.insert(
            id,
            Subscription {
                request,
                results,
                listener,
            },
        );
        id
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        self.subscriptions.remove(&id).is_some()
    }

    pub(crate) fn results(&self, id: SubscriptionId) -> Option<&[Entity]> {
        self.subscriptions
            .get(&id)
            .map(|subscription| subscription.results.as_slice())
    }

    pub(crate) fn requests(&self) -> Vec<(SubscriptionId, FetchRequest)> {
        self.subscriptions
            .iter()
            .map(|(id, subscription)| (*id, subscription.request.clone()))
            .collect()
    }

    /// Stores fresh results. Returns `true` (and notifies) when they changed.
    pub(crate) fn update(&mut self, id: SubscriptionId, results: Vec<Entity>) -> bool {
        let Some(subscription) = self.subscriptions.get_mut(&id) else {
            return false;
        };
        if subscription.results == results {
            return false;
        }
        subscription.results = results;
        if let Some(listener) = subscription.listener.as_mut() {
            listener(&subscription.results);
        }
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::LiveQueries;
    use crate::model::{Entity, EntityKind, User};
    use crate::query::FetchRequest;
    use std::sync::{Arc, Mutex};

    #[test]
    fn listener_fires_on_insert_and_on_change_only() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let mut queries = LiveQueries::default();

        let id = queries.insert(
            FetchRequest::new(EntityKind::User),
            Vec::new(),
            Some(Box::new(move |results: &[Entity]| {
                sink.lock().unwrap().push(results.len());
            })),
        );

        let user = Entity::from(User::new("someone"));
        assert!(queries.update(id, vec![user.clone()]));
        assert!(!queries.update(id, vec![user]));
        assert_eq!(*calls.lock().unwrap(), vec![0, 1]);
    }

    #[test]
    fn removed_subscription_has_no_results() {
        let mut queries = LiveQueries::default();
        let id = queries.insert(FetchRequest::new(EntityKind::Song), Vec::new(), None);
        assert_eq!(queries.len(), 1);
        assert!(queries.remove(id));
        assert!(queries.results(id).is_none());
        assert!(queries.is_empty());
    }
}
