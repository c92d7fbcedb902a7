//! In-process priority publish/subscribe bus.
//!
//! Producers publish a payload under an event type tag; every handler
//! subscribed to that tag runs synchronously on the publisher's thread, in
//! descending priority order. A handler that errors or panics is logged and
//! skipped; it never reaches the publisher or the other handlers.

use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Event payload. Its shape is a contract between publisher and subscribers.
pub type Payload = serde_json::Value;

/// A subscribed callback. Identity (for [`EventBus::unsubscribe`]) is the `Arc` allocation.
pub type Handler = Arc<dyn Fn(&Payload) -> anyhow::Result<()> + Send + Sync>;

/// Decides whether a filtered subscription sees a payload.
pub type Predicate = Arc<dyn Fn(&Payload) -> bool + Send + Sync>;

/// Wraps a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&Payload) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Token returned by `subscribe`, usable with [`EventBus::unsubscribe_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    priority: i32,
    handler: Handler,
    filter: Option<Predicate>,
}

impl Subscription {
    fn is_handler(&self, other: &Handler) -> bool {
        Arc::as_ptr(&self.handler) as *const () == Arc::as_ptr(other) as *const ()
    }
}

/// What happened to one subscription during a publish.
enum Dispatch {
    Delivered,
    Filtered,
    Failed(String),
}

/// The event bus. Construct one per process and share it with `Arc`.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<String, Vec<Subscription>>>,
    next_id: AtomicU64,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subscribers = self.subscribers.read();
        let counts: HashMap<&str, usize> = subscribers
            .iter()
            .map(|(k, v)| (k.as_str(), v.len()))
            .collect();
        f.debug_struct("EventBus").field("subscribers", &counts).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `event_type`.
    ///
    /// Higher priorities run first; equal priorities run in registration
    /// order. Registering the same handler twice makes it run twice.
    pub fn subscribe(
        &self,
        event_type: impl Into<String>,
        handler: Handler,
        priority: i32,
    ) -> SubscriptionId {
        self.insert(event_type.into(), handler, None, priority)
    }

    /// Registers `handler` so that it only runs for payloads matching `filter`.
    ///
    /// The original handler is stored next to the predicate, so
    /// [`unsubscribe`](Self::unsubscribe) with the same handler removes it.
    pub fn subscribe_filtered<P>(
        &self,
        event_type: impl Into<String>,
        handler: Handler,
        filter: P,
        priority: i32,
    ) -> SubscriptionId
    where
        P: Fn(&Payload) -> bool + Send + Sync + 'static,
    {
        self.insert(event_type.into(), handler, Some(Arc::new(filter)), priority)
    }

    fn insert(
        &self,
        event_type: String,
        handler: Handler,
        filter: Option<Predicate>,
        priority: i32,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let filtered = filter.is_some();
        let mut subscribers = self.subscribers.write();
        let list = subscribers.entry(event_type.clone()).or_default();
        list.push(Subscription {
            id,
            priority,
            handler,
            filter,
        });
        // `sort_by` is stable, so ties keep insertion order.
        list.sort_by(|a, b| b.priority.cmp(&a.priority));
        debug!(event_type = %event_type, subscription = %id, priority, filtered, "Subscribed");
        id
    }

    /// Removes every registration of `handler` (plain or filtered) for
    /// `event_type`. Returns how many were removed.
    pub fn unsubscribe(&self, event_type: &str, handler: &Handler) -> usize {
        self.remove_where(event_type, |sub| sub.is_handler(handler))
    }

    /// Removes the registration identified by `id`. Returns whether it existed.
    pub fn unsubscribe_id(&self, event_type: &str, id: SubscriptionId) -> bool {
        self.remove_where(event_type, |sub| sub.id == id) > 0
    }

    fn remove_where<F>(&self, event_type: &str, matches: F) -> usize
    where
        F: Fn(&Subscription) -> bool,
    {
        let mut subscribers = self.subscribers.write();
        let Some(list) = subscribers.get_mut(event_type) else {
            return 0;
        };
        let before = list.len();
        list.retain(|sub| !matches(sub));
        let removed = before - list.len();
        if list.is_empty() {
            subscribers.remove(event_type);
        }
        if removed > 0 {
            debug!(event_type, removed, "Unsubscribed");
        }
        removed
    }

    /// Publishes `payload` to every subscriber of `event_type`, logging the
    /// dispatch. See [`publish_with`](Self::publish_with).
    pub fn publish(&self, event_type: &str, payload: &Payload) -> usize {
        self.publish_with(event_type, payload, true)
    }

    /// Synchronously runs every current subscriber of `event_type`.
    ///
    /// The subscriber list is snapshotted up front: subscriptions added or
    /// removed by a handler take effect from the next publish. Handler errors
    /// and panics are logged and isolated.
    ///
    /// `log_event = false` drops the audit line, for high-frequency types.
    ///
    /// # Returns
    /// The number of handlers that ran to completion without error.
    pub fn publish_with(&self, event_type: &str, payload: &Payload, log_event: bool) -> usize {
        let snapshot: Vec<Subscription> = match self.subscribers.read().get(event_type) {
            Some(list) => list.clone(),
            None => Vec::new(),
        };

        if log_event {
            debug!(event_type, subscribers = snapshot.len(), payload = %payload, "Publishing event");
        }

        let mut delivered = 0;
        for sub in &snapshot {
            match Self::dispatch(sub, payload) {
                Dispatch::Delivered => delivered += 1,
                Dispatch::Filtered => {
                    trace!(event_type, subscription = %sub.id, "Payload rejected by filter");
                }
                Dispatch::Failed(reason) => {
                    error!(
                        event_type,
                        subscription = %sub.id,
                        priority = sub.priority,
                        error = %reason,
                        "Event handler failed"
                    );
                }
            }
        }
        delivered
    }

    fn dispatch(sub: &Subscription, payload: &Payload) -> Dispatch {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            if let Some(filter) = &sub.filter {
                if !filter(payload) {
                    return Ok(false);
                }
            }
            (sub.handler)(payload).map(|()| true)
        }));

        match outcome {
            Ok(Ok(true)) => Dispatch::Delivered,
            Ok(Ok(false)) => Dispatch::Filtered,
            Ok(Err(e)) => Dispatch::Failed(format!("{e:#}")),
            Err(panic) => Dispatch::Failed(format!("panicked: {}", panic_message(&*panic))),
        }
    }

    /// Number of registrations for `event_type`.
    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.subscribers
            .read()
            .get(event_type)
            .map_or(0, Vec::len)
    }

    /// Event types with at least one subscriber, sorted.
    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.subscribers.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// Drops the subscribers of one event type, or of all types when `None`.
    pub fn clear(&self, event_type: Option<&str>) {
        let mut subscribers = self.subscribers.write();
        match event_type {
            Some(event_type) => {
                subscribers.remove(event_type);
            }
            None => subscribers.clear(),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
