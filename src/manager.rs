//! The state manager: the shared service that owns the modification log.

use crate::error::{Result, StateError};
use crate::persistence::SaveSlot;
use crate::records::ModificationLog;
use crate::state::StateParameterSet;
use crate::subscriptions::{
    ChangeFeed, FeedId, ListenerId, LogEvent, SubscriberId, SubscriptionManager,
};
use crate::tag::Tag;
use crate::types::{Operation, OperationId, StateModificationRecord};
use parking_lot::{ReentrantMutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// State manager configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StateManagerConfig {
    /// Directory holding save slots.
    pub save_dir: PathBuf,

    /// Slot used by `save_log` / `load_log`.
    pub slot_name: String,

    /// Capacity of each change feed created by `watch`.
    pub feed_buffer_size: usize,

    /// Load the slot (if present) when the manager opens.
    pub load_on_start: bool,

    /// Save the log on `shutdown`.
    pub save_on_shutdown: bool,
}

impl Default for StateManagerConfig {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("./state"),
            slot_name: "autosave".to_string(),
            feed_buffer_size: 1024,
            load_on_start: false,
            save_on_shutdown: false,
        }
    }
}

impl StateManagerConfig {
    /// Read a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        serde_json::from_slice(&bytes)
            .map_err(|e| StateError::Config(format!("{}: {}", path.as_ref().display(), e)))
    }
}

/// Owns the operation log, its aggregated snapshots and the subscriber
/// tables. Share it through an `Arc`.
///
/// Mutations and the notifications they trigger run under one re-entrant
/// write lock, so subscribers observe records in log order and callbacks
/// may record or unload further operations.
pub struct StateManager {
    config: StateManagerConfig,
    log: RwLock<ModificationLog>,
    subscriptions: SubscriptionManager,
    slot: SaveSlot,
    write_lock: ReentrantMutex<()>,
}

impl StateManager {
    /// Create a manager with an empty log.
    pub fn new(config: StateManagerConfig) -> Result<Self> {
        let slot = SaveSlot::new(&config.save_dir, config.slot_name.clone())?;
        Ok(Self {
            config,
            log: RwLock::new(ModificationLog::new()),
            subscriptions: SubscriptionManager::new(),
            slot,
            write_lock: ReentrantMutex::new(()),
        })
    }

    /// Create a shared manager, loading the save slot if configured.
    pub fn open(config: StateManagerConfig) -> Result<Arc<Self>> {
        let manager = Self::new(config)?;
        if manager.config.load_on_start {
            manager.load_log()?;
        }
        info!(slot = %manager.slot.name(), records = manager.record_count(), "State manager opened");
        Ok(Arc::new(manager))
    }

    pub fn config(&self) -> &StateManagerConfig {
        &self.config
    }

    // --- Recording ---

    /// Validate and append `operation`, fold it into its target's snapshot
    /// and notify subscribers.
    ///
    /// On a validation error nothing changes and nobody is notified.
    pub fn record_operation(&self, operation: Operation) -> Result<StateModificationRecord> {
        let _guard = self.write_lock.lock();

        let record = match self.log.write().record(operation) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Rejected operation");
                return Err(e);
            }
        };
        trace!(
            operation = %record.operation_id(),
            target = %record.target_type_tag(),
            "Recorded operation"
        );

        self.subscriptions
            .notify_target(record.target_type_tag(), &record);
        self.subscriptions
            .broadcast(&LogEvent::Recorded(record.clone()));
        Ok(record)
    }

    // --- Unloading ---

    /// Remove one operation. Returns false if it is not in the log.
    pub fn unload_operation(&self, id: &OperationId) -> bool {
        self.try_unload_operation(id).is_ok()
    }

    /// Like [`unload_operation`](Self::unload_operation), but returns the
    /// removed record or [`StateError::OperationNotFound`].
    pub fn try_unload_operation(&self, id: &OperationId) -> Result<StateModificationRecord> {
        let _guard = self.write_lock.lock();

        let removed = self.log.write().unload(id);
        let Some(record) = removed else {
            return Err(StateError::OperationNotFound(*id));
        };

        self.notify_removed(&record);
        Ok(record)
    }

    /// Remove every operation whose source type tag equals `source`.
    /// Returns how many were removed.
    pub fn unload_operations_by_source(&self, source: &Tag) -> usize {
        let _guard = self.write_lock.lock();

        let removed = self.log.write().unload_by_source(source);
        if removed.is_empty() {
            debug!(source = %source, "No operations to unload for source");
            return 0;
        }

        info!(source = %source, count = removed.len(), "Unloaded operations by source");
        for record in &removed {
            self.notify_removed(record);
        }
        removed.len()
    }

    /// Drop every record and snapshot. Listeners see a reload of zero records.
    pub fn clear(&self) {
        let _guard = self.write_lock.lock();
        let targets = {
            let mut log = self.log.write();
            let targets = log.target_types();
            log.clear();
            targets
        };
        self.notify_targets_reset(&targets);
        self.subscriptions
            .broadcast(&LogEvent::Reloaded { record_count: 0 });
    }

    // --- Queries ---

    /// The aggregated snapshot for `target`.
    ///
    /// A valid tag reads the incrementally maintained cache. The invalid tag
    /// aggregates the whole log and is slow.
    pub fn get_aggregated_modifications(&self, target: &Tag) -> StateParameterSet {
        self.log.read().aggregated(target)
    }

    /// Recompute a target's snapshot from the log, bypassing the cache.
    pub fn replay_target(&self, target: &Tag) -> StateParameterSet {
        self.log.read().replay_target(target)
    }

    /// Copy of the log in recording order.
    pub fn all_modifications(&self) -> Vec<StateModificationRecord> {
        self.log.read().records()
    }

    pub fn record_count(&self) -> usize {
        self.log.read().len()
    }

    pub fn find_record(&self, id: &OperationId) -> Option<StateModificationRecord> {
        self.log.read().find(id).cloned()
    }

    pub fn contains_operation(&self, id: &OperationId) -> bool {
        self.log.read().contains(id)
    }

    /// Records targeting `target`, in recording order.
    pub fn records_for_target(&self, target: &Tag) -> Vec<StateModificationRecord> {
        self.log.read().records_for_target(target)
    }

    /// Target types with at least one record.
    pub fn target_types(&self) -> Vec<Tag> {
        self.log.read().target_types()
    }

    // --- Subscriptions ---

    /// Subscribe `subscriber` to records targeting `target`.
    ///
    /// The manager holds the subscriber weakly; dropping the last `Arc`
    /// ends the subscription. Returns false for an invalid tag or a
    /// duplicate registration.
    pub fn subscribe_to_target_type<S, F>(&self, target: &Tag, subscriber: &Arc<S>, callback: F) -> bool
    where
        S: Send + Sync + 'static,
        F: Fn(&S, &StateModificationRecord) + Send + Sync + 'static,
    {
        self.subscriptions.subscribe(target, subscriber, callback)
    }

    pub fn unsubscribe_from_target_type<S>(&self, target: &Tag, subscriber: &Arc<S>) -> bool {
        self.subscriptions
            .unsubscribe(target, SubscriberId::of(subscriber))
    }

    /// Remove `subscriber` from every target type.
    pub fn unsubscribe_all<S>(&self, subscriber: &Arc<S>) -> usize {
        self.subscriptions
            .unsubscribe_all(SubscriberId::of(subscriber))
    }

    /// Prune registrations whose subscriber has been dropped.
    pub fn cleanup_invalid_subscribers(&self) -> usize {
        self.subscriptions.cleanup_invalid_subscribers()
    }

    pub fn is_subscribed<S>(&self, target: &Tag, subscriber: &Arc<S>) -> bool {
        self.subscriptions
            .is_subscribed(target, SubscriberId::of(subscriber))
    }

    pub fn subscriber_count(&self, target: &Tag) -> usize {
        self.subscriptions.subscriber_count(target)
    }

    // --- Global Events ---

    /// Call `listener` for every log event.
    pub fn on_any_changed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&LogEvent) + Send + Sync + 'static,
    {
        self.subscriptions.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.subscriptions.remove_listener(id)
    }

    /// Open a bounded change feed sized by `feed_buffer_size`.
    pub fn watch(&self) -> ChangeFeed {
        self.subscriptions.watch(self.config.feed_buffer_size)
    }

    /// Open a change feed with an explicit buffer size.
    pub fn watch_with_buffer(&self, buffer_size: usize) -> ChangeFeed {
        self.subscriptions.watch(buffer_size)
    }

    pub fn unwatch(&self, id: FeedId) -> bool {
        self.subscriptions.unwatch(id)
    }

    // --- Persistence ---

    pub fn save_slot(&self) -> &SaveSlot {
        &self.slot
    }

    /// Write the log to the configured save slot.
    pub fn save_log(&self) -> Result<()> {
        let records = self.all_modifications();
        self.slot.save(&records)
    }

    /// Replace the log with the save slot's contents and rebuild every
    /// snapshot. Returns false if the slot does not exist.
    ///
    /// Each affected target's subscribers receive that target's latest
    /// record so they re-pull their snapshot.
    pub fn load_log(&self) -> Result<bool> {
        let Some(records) = self.slot.load()? else {
            return Ok(false);
        };

        let _guard = self.write_lock.lock();
        let (targets, record_count) = {
            let mut log = self.log.write();
            let mut targets = log.target_types();
            let count = log.replace_all(records);
            for target in log.target_types() {
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
            (targets, count)
        };

        info!(slot = %self.slot.name(), records = record_count, "Reloaded modification log");
        self.notify_targets_reset(&targets);
        self.subscriptions
            .broadcast(&LogEvent::Reloaded { record_count });
        Ok(true)
    }

    /// Save the log if `save_on_shutdown` is set.
    pub fn shutdown(&self) -> Result<()> {
        if self.config.save_on_shutdown {
            self.save_log()?;
        }
        info!(records = self.record_count(), "State manager shut down");
        Ok(())
    }

    // --- Private Helpers ---

    fn notify_removed(&self, record: &StateModificationRecord) {
        trace!(
            operation = %record.operation_id(),
            target = %record.target_type_tag(),
            "Unloaded operation"
        );
        self.subscriptions
            .notify_target(record.target_type_tag(), record);
        self.subscriptions
            .broadcast(&LogEvent::Unloaded(record.clone()));
    }

    /// Tell each target's subscribers to re-pull after a bulk change. Targets
    /// that lost all their records are sent an empty placeholder record.
    fn notify_targets_reset(&self, targets: &[Tag]) {
        for target in targets {
            let latest = self.log.read().latest_for_target(target).cloned();
            let record = latest.unwrap_or_else(|| {
                StateModificationRecord::new(Operation::new(Tag::none(), target.clone()))
            });
            self.subscriptions.notify_target(target, &record);
        }
    }
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("slot", &self.slot.name())
            .field("records", &self.record_count())
            .finish()
    }
}
