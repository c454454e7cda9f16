//! Subscriber tables and event broadcasting.
//!
//! Callbacks are never invoked while a table lock is held, so they may call
//! back into the subscription manager (or the state manager above it).

use super::types::{ChangeFeed, DropReason, FeedId, ListenerId, LogEvent, SubscriberId};
use crate::tag::Tag;
use crate::types::StateModificationRecord;
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

/// Returns false once the subscriber is gone.
type Delivery = Arc<dyn Fn(&StateModificationRecord) -> bool + Send + Sync>;

type Listener = Arc<dyn Fn(&LogEvent) + Send + Sync>;

/// A non-owning registration for one target type.
struct TargetSubscriber {
    id: SubscriberId,
    liveness: Weak<dyn Any + Send + Sync>,
    deliver: Delivery,
}

impl TargetSubscriber {
    fn is_alive(&self) -> bool {
        self.liveness.strong_count() > 0
    }
}

/// Manages targeted subscribers, global listeners and change feeds.
pub struct SubscriptionManager {
    /// Subscribers by target type tag.
    targets: RwLock<HashMap<Tag, Vec<TargetSubscriber>>>,
    /// Global "any change" listeners, in registration order.
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    /// Bounded change feeds.
    feeds: RwLock<HashMap<FeedId, Sender<LogEvent>>>,
    /// Counter for listener and feed ids.
    next_id: AtomicU64,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self {
            targets: RwLock::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
            feeds: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    // --- Targeted Subscribers ---

    /// Register `subscriber` for records targeting `target`.
    ///
    /// Only a weak reference is kept; `callback` receives the subscriber
    /// while it is alive. Returns false for an invalid tag or if the
    /// subscriber is already registered for `target`.
    pub fn subscribe<S, F>(&self, target: &Tag, subscriber: &Arc<S>, callback: F) -> bool
    where
        S: Send + Sync + 'static,
        F: Fn(&S, &StateModificationRecord) + Send + Sync + 'static,
    {
        if !target.is_valid() {
            warn!("Subscribe called with invalid target type tag");
            return false;
        }

        let id = SubscriberId::of(subscriber);
        let mut targets = self.targets.write();
        let list = targets.entry(target.clone()).or_default();
        list.retain(TargetSubscriber::is_alive);

        if list.iter().any(|s| s.id == id) {
            debug!(target = %target, "Subscriber already registered; ignoring");
            return false;
        }

        let weak = Arc::downgrade(subscriber);
        let liveness: Weak<dyn Any + Send + Sync> = weak.clone();
        let deliver: Delivery = Arc::new(move |record: &StateModificationRecord| match weak.upgrade() {
            Some(subscriber) => {
                callback(&subscriber, record);
                true
            }
            None => false,
        });

        list.push(TargetSubscriber {
            id,
            liveness,
            deliver,
        });
        debug!(target = %target, "Subscriber registered");
        true
    }

    /// Remove one registration.
    pub fn unsubscribe(&self, target: &Tag, id: SubscriberId) -> bool {
        let mut targets = self.targets.write();
        let Some(list) = targets.get_mut(target) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| s.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            targets.remove(target);
        }
        removed
    }

    /// Remove every registration of `id`. Returns how many were removed.
    pub fn unsubscribe_all(&self, id: SubscriberId) -> usize {
        let mut targets = self.targets.write();
        let mut removed = 0;
        for list in targets.values_mut() {
            let before = list.len();
            list.retain(|s| s.id != id);
            removed += before - list.len();
        }
        targets.retain(|_, list| !list.is_empty());
        removed
    }

    /// Prune every subscriber whose object has been dropped.
    pub fn cleanup_invalid_subscribers(&self) -> usize {
        let mut targets = self.targets.write();
        let mut removed = 0;
        for list in targets.values_mut() {
            let before = list.len();
            list.retain(TargetSubscriber::is_alive);
            removed += before - list.len();
        }
        targets.retain(|_, list| !list.is_empty());
        if removed > 0 {
            debug!(removed, "Cleaned up invalid subscribers");
        }
        removed
    }

    pub fn is_subscribed(&self, target: &Tag, id: SubscriberId) -> bool {
        self.targets
            .read()
            .get(target)
            .map_or(false, |list| list.iter().any(|s| s.id == id && s.is_alive()))
    }

    /// Number of live subscribers for `target`.
    pub fn subscriber_count(&self, target: &Tag) -> usize {
        self.targets
            .read()
            .get(target)
            .map_or(0, |list| list.iter().filter(|s| s.is_alive()).count())
    }

    /// Deliver `record` to the live subscribers of `target`.
    ///
    /// Dead subscribers are skipped and pruned afterwards. Returns the
    /// number of subscribers notified.
    pub fn notify_target(&self, target: &Tag, record: &StateModificationRecord) -> usize {
        let (deliveries, mut stale) = {
            let targets = self.targets.read();
            match targets.get(target) {
                Some(list) => {
                    let live: Vec<Delivery> = list
                        .iter()
                        .filter(|s| s.is_alive())
                        .map(|s| s.deliver.clone())
                        .collect();
                    let stale = live.len() != list.len();
                    (live, stale)
                }
                None => return 0,
            }
        };

        let mut notified = 0;
        for deliver in &deliveries {
            if deliver(record) {
                notified += 1;
            } else {
                stale = true;
            }
        }

        if stale {
            let mut targets = self.targets.write();
            if let Some(list) = targets.get_mut(target) {
                list.retain(TargetSubscriber::is_alive);
                if list.is_empty() {
                    targets.remove(target);
                }
            }
        }

        trace!(target = %target, notified, "Notified target subscribers");
        notified
    }

    // --- Global Listeners ---

    /// Register a callback for every log event.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&LogEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    // --- Change Feeds ---

    /// Open a bounded feed of log events. A feed that falls `buffer_size`
    /// events behind is dropped.
    pub fn watch(&self, buffer_size: usize) -> ChangeFeed {
        let id = FeedId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(buffer_size.max(1));
        self.feeds.write().insert(id, sender);
        ChangeFeed { id, receiver }
    }

    /// Close a feed.
    pub fn unwatch(&self, id: FeedId) -> bool {
        match self.feeds.write().remove(&id) {
            Some(sender) => {
                // Best effort
                let _ = sender.try_send(LogEvent::Dropped {
                    reason: DropReason::Unwatched,
                });
                true
            }
            None => false,
        }
    }

    pub fn feed_count(&self) -> usize {
        self.feeds.read().len()
    }

    // --- Broadcasting ---

    /// Send `event` to every global listener and change feed.
    pub fn broadcast(&self, event: &LogEvent) {
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in &listeners {
            listener(event);
        }

        let mut to_remove = Vec::new();
        {
            let feeds = self.feeds.read();
            for (id, sender) in feeds.iter() {
                match sender.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                        to_remove.push(*id);
                    }
                }
            }
        }

        if !to_remove.is_empty() {
            let mut feeds = self.feeds.write();
            for id in to_remove {
                if let Some(sender) = feeds.remove(&id) {
                    debug!(feed = id.0, "Dropping change feed");
                    // Might fail if the buffer is still full
                    let _ = sender.try_send(LogEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}
