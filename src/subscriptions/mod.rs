//! Subscription system for log changes.
//!
//! Three ways to observe the log:
//! - Targeted subscribers: called synchronously with each record whose
//!   target type they registered for. Held weakly and pruned once dropped.
//! - Global listeners: called synchronously with every [`LogEvent`].
//! - Change feeds: bounded channels of [`LogEvent`]s; slow feeds are dropped.
//!
//! # Example
//!
//! ```ignore
//! let manager = SubscriptionManager::new();
//! let door = Arc::new(DoorView::default());
//!
//! manager.subscribe(&Tag::new("Door"), &door, |door: &DoorView, record| {
//!     door.refresh(record);
//! });
//!
//! let feed = manager.watch(256);
//! while let Ok(event) = feed.recv() {
//!     if let LogEvent::Dropped { .. } = event {
//!         break;
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{ChangeFeed, DropReason, FeedId, ListenerId, LogEvent, SubscriberId};
