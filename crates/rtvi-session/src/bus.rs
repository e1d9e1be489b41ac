use parking_lot::Mutex;
use rtvi_core::{EventKind, InboundEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Callback invoked for each delivered event. Must return quickly.
pub type EventCallback = Arc<dyn Fn(&InboundEvent) + Send + Sync>;

/// Identifies one subscription for [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

struct Subscriber {
    id: u64,
    kind: Option<EventKind>,
    callback: EventCallback,
}

/// Fans inbound events out to subscribers.
///
/// Subscribers run in registration order. Each publish works on a snapshot
/// of the subscriber list taken before the first callback runs, so a
/// callback that unsubscribes (itself or another) does not change who
/// receives the event in progress, only who receives the next one.
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Creates a bus with no subscribers.
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Receive every event of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> SubscriptionHandle
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        self.add(Some(kind), Arc::new(callback))
    }

    /// Receive every event regardless of kind.
    pub fn subscribe_all<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        self.add(None, Arc::new(callback))
    }

    fn add(&self, kind: Option<EventKind>, callback: EventCallback) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().push(Subscriber { id, kind, callback });
        SubscriptionHandle(id)
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut subs = self.subscribers.lock();
        let before = subs.len();
        subs.retain(|s| s.id != handle.0);
        subs.len() != before
    }

    /// Deliver `event` to its subscribers, returning how many were invoked.
    pub(crate) fn publish(&self, event: &InboundEvent) -> usize {
        let kind = event.kind();
        let targets: Vec<EventCallback> = self
            .subscribers
            .lock()
            .iter()
            .filter(|s| s.kind.map_or(true, |k| k == kind))
            .map(|s| Arc::clone(&s.callback))
            .collect();

        for callback in &targets {
            callback(event);
        }
        targets.len()
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.subscribers.lock().clear();
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
