//! Subscription types for log change notifications.

use crate::types::StateModificationRecord;
use std::sync::Arc;
use std::time::Duration;

/// Identity of a subscriber object: the address of its shared allocation.
///
/// Only meaningful while the subscriber is alive. Once it is dropped the
/// allocator may reuse the address for an unrelated subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(usize);

impl SubscriberId {
    pub fn of<S>(subscriber: &Arc<S>) -> Self {
        SubscriberId(Arc::as_ptr(subscriber) as *const () as usize)
    }
}

/// Handle for a global change listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Unique identifier for a change feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FeedId(pub u64);

/// Events delivered to global listeners and change feeds.
#[derive(Clone, Debug, PartialEq)]
pub enum LogEvent {
    /// A record entered the log.
    Recorded(StateModificationRecord),

    /// A record was unloaded.
    Unloaded(StateModificationRecord),

    /// The log was replaced from a save slot.
    Reloaded { record_count: usize },

    /// The feed was closed; no more events follow.
    Dropped { reason: DropReason },
}

impl LogEvent {
    /// The record carried by this event, if any.
    pub fn record(&self) -> Option<&StateModificationRecord> {
        match self {
            LogEvent::Recorded(record) | LogEvent::Unloaded(record) => Some(record),
            _ => None,
        }
    }
}

/// Reason a change feed was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// The consumer fell behind and the buffer filled.
    BufferOverflow,
    /// The feed was closed explicitly.
    Unwatched,
}

/// Receiving end of a bounded change feed.
pub struct ChangeFeed {
    pub id: FeedId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<LogEvent>,
}

impl ChangeFeed {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<LogEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<LogEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<LogEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain every event currently buffered.
    pub fn drain(&self) -> Vec<LogEvent> {
        self.receiver.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Operation;

    #[test]
    fn test_subscriber_id_by_allocation() {
        let a = Arc::new(1u8);
        let b = Arc::new(1u8);
        assert_eq!(SubscriberId::of(&a), SubscriberId::of(&a.clone()));
        assert_ne!(SubscriberId::of(&a), SubscriberId::of(&b));
    }

    #[test]
    fn test_event_record_accessor() {
        let record = StateModificationRecord::new(Operation::new("S", "Door"));
        assert_eq!(LogEvent::Recorded(record.clone()).record(), Some(&record));
        assert_eq!(LogEvent::Unloaded(record.clone()).record(), Some(&record));
        assert_eq!(LogEvent::Reloaded { record_count: 1 }.record(), None);
    }
}
