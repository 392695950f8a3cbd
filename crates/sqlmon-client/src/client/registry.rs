// Subscription registry: the single owner of live subscription lifetimes.
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sqlmon_transport::StreamCancel;

use crate::client::subscription::SubscriptionId;

/// Registry state for one live subscription.
///
/// The callback triple lives with the dispatch task, not here, so callbacks
/// can call back into the session (unsubscribe, status checks) without
/// re-entering the registry lock.
pub(crate) struct SubscriptionEntry {
    pub(crate) route: String,
    pub(crate) cancel: StreamCancel,
    /// Observed by the dispatch task; once set, no further frames are
    /// delivered for this subscription.
    pub(crate) cancelled: Arc<AtomicBool>,
}

/// In-memory map of subscription id to cancellation state.
///
/// Inbound dispatch, caller-initiated unsubscribes, and reconnect teardown
/// race on a preemptive runtime, so every mutation goes through one mutex.
#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<HashMap<SubscriptionId, SubscriptionEntry>>,
}

impl SubscriptionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, id: SubscriptionId, entry: SubscriptionEntry) {
        let mut map = self.lock();
        map.insert(id, entry);
        metrics::gauge!("sqlmon_client_active_subscriptions").set(map.len() as f64);
    }

    pub(crate) fn remove(&self, id: &SubscriptionId) -> Option<SubscriptionEntry> {
        let mut map = self.lock();
        let entry = map.remove(id);
        metrics::gauge!("sqlmon_client_active_subscriptions").set(map.len() as f64);
        entry
    }

    /// Drain every entry; used by disconnect and connection-loss teardown.
    pub(crate) fn remove_all(&self) -> Vec<(SubscriptionId, SubscriptionEntry)> {
        let mut map = self.lock();
        let drained = map.drain().collect();
        metrics::gauge!("sqlmon_client_active_subscriptions").set(0.0);
        drained
    }

    pub fn contains(&self, id: &SubscriptionId) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriptionId, SubscriptionEntry>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    fn entry(route: &str) -> SubscriptionEntry {
        let (cancel, _signal) = StreamCancel::new();
        SubscriptionEntry {
            route: route.to_string(),
            cancel,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn register_and_remove() {
        let registry = SubscriptionRegistry::new();
        let id = SubscriptionId::generate();
        registry.register(id.clone(), entry("qps/3"));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&id));

        let removed = registry.remove(&id).expect("entry");
        assert_eq!(removed.route, "qps/3");
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_unknown_is_none() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.remove(&SubscriptionId::from_raw("sub-0-missing")).is_none());
    }

    #[test]
    fn remove_all_drains_everything() {
        let registry = SubscriptionRegistry::new();
        registry.register(SubscriptionId::generate(), entry("qps/3"));
        registry.register(SubscriptionId::generate(), entry("cache-hit-rate/3"));
        let drained = registry.remove_all();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
        for (_, entry) in &drained {
            assert!(!entry.cancelled.load(Ordering::Acquire));
        }
    }
}
