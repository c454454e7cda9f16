//! Per-entity state view kept in sync with the state manager.
//!
//! A component owns a [`LayeredStateContainer`]. Its Default layer comes
//! from initialization data, its Persistent layer mirrors the manager's
//! aggregated snapshot for the component's target type, and the Temporary
//! and Override layers are local.

use crate::manager::StateManager;
use crate::state::{LayeredStateContainer, SchemaRegistry, StateCategories, StateLayer, StateParameterSet};
use crate::subscriptions::ListenerId;
use crate::tag::Tag;
use crate::types::StateModificationRecord;
use crate::values::{StateValue, ValueCell};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, trace};

/// Connection of a component to its state manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// `initialize` has not run yet.
    Uninitialized,
    /// Subscribed to the target type and mirroring its snapshot.
    Connected,
    /// Running on local layers only (no valid target type, or sync disabled).
    Unconnected,
    /// Torn down by `shutdown`.
    Disconnected,
}

/// Component configuration.
#[derive(Clone, Debug)]
pub struct ComponentConfig {
    /// Identity tags of the owning entity. The first valid one is the
    /// target type the component follows.
    pub identity_tags: Vec<Tag>,

    /// Applied to the Default layer on `initialize`.
    pub default_init: StateParameterSet,

    /// Follow the manager's snapshot for the target type.
    pub enable_global_sync: bool,
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            identity_tags: Vec::new(),
            default_init: StateParameterSet::new(),
            enable_global_sync: true,
        }
    }
}

type StateListener = Arc<dyn Fn(&EntityStateComponent) + Send + Sync>;

struct ComponentState {
    container: LayeredStateContainer,
    connection: ConnectionState,
    target: Tag,
}

/// State component for one entity.
pub struct EntityStateComponent {
    manager: Arc<StateManager>,
    config: ComponentConfig,
    state: Mutex<ComponentState>,
    listeners: RwLock<Vec<(ListenerId, StateListener)>>,
    next_listener: AtomicU64,
}

impl EntityStateComponent {
    pub fn new(
        manager: Arc<StateManager>,
        schema: Arc<dyn SchemaRegistry>,
        config: ComponentConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            manager,
            config,
            state: Mutex::new(ComponentState {
                container: LayeredStateContainer::new(schema),
                connection: ConnectionState::Uninitialized,
                target: Tag::none(),
            }),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        })
    }

    // --- Lifecycle ---

    /// Apply the default initialization data and connect to the manager.
    ///
    /// Without a valid identity tag the component stays unconnected; its
    /// local layers keep working. Calling this again is a no-op.
    pub fn initialize(self: &Arc<Self>) -> ConnectionState {
        let target = {
            let mut state = self.state.lock();
            if state.connection != ConnectionState::Uninitialized {
                return state.connection;
            }
            state
                .container
                .apply_init_data_to_layer(StateLayer::Default, &self.config.default_init);

            let target = self.resolve_target_type();
            state.target = target.clone();

            if !self.config.enable_global_sync {
                debug!(target = %target, "Global sync disabled; component runs locally");
                state.connection = ConnectionState::Unconnected;
                None
            } else if !target.is_valid() {
                error!("Entity has no valid identity tag; state component cannot connect");
                state.connection = ConnectionState::Unconnected;
                None
            } else {
                state.connection = ConnectionState::Connected;
                Some(target)
            }
        };

        if let Some(target) = &target {
            self.manager.subscribe_to_target_type(
                target,
                self,
                |component: &EntityStateComponent, record: &StateModificationRecord| {
                    component.handle_record(record);
                },
            );
            self.pull_from_manager();
            info!(target = %target, "State component connected");
        }

        self.notify_listeners();
        self.connection_state()
    }

    /// Unsubscribe from the manager. Local layers are kept.
    pub fn shutdown(self: &Arc<Self>) {
        let removed = self.manager.unsubscribe_all(self);
        let mut state = self.state.lock();
        state.connection = ConnectionState::Disconnected;
        debug!(target = %state.target, subscriptions = removed, "State component shut down");
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.lock().connection
    }

    pub fn is_global_sync_enabled(&self) -> bool {
        self.config.enable_global_sync
    }

    /// The target type this component follows: the first valid identity tag.
    pub fn target_type_tag(&self) -> Tag {
        let state = self.state.lock();
        if state.connection == ConnectionState::Uninitialized {
            return self.resolve_target_type();
        }
        state.target.clone()
    }

    pub fn manager(&self) -> &Arc<StateManager> {
        &self.manager
    }

    // --- Layer Mutation ---

    /// Rebuild the Default layer from `init`.
    pub fn apply_initialization_data(&self, init: &StateParameterSet) {
        self.mutate(|container| container.apply_init_data_to_layer(StateLayer::Default, init));
    }

    /// Reconcile the Temporary layer with `modifications`.
    pub fn apply_temporary_modifications(&self, modifications: &StateParameterSet) {
        self.mutate(|container| {
            container.apply_parameter_set_to_layer(StateLayer::Temporary, modifications)
        });
    }

    /// Reconcile the Override layer with `overrides`.
    pub fn apply_override(&self, overrides: &StateParameterSet) {
        self.mutate(|container| container.apply_parameter_set_to_layer(StateLayer::Override, overrides));
    }

    pub fn clear_state_layer(&self, layer: StateLayer) {
        self.mutate(|container| container.clear_layer(layer));
    }

    /// Re-pull the manager's snapshot into the Persistent layer.
    ///
    /// Returns false when the component is not connected.
    pub fn pull_from_manager(&self) -> bool {
        let target = {
            let state = self.state.lock();
            if state.connection != ConnectionState::Connected {
                return false;
            }
            state.target.clone()
        };

        let snapshot = self.manager.get_aggregated_modifications(&target);
        self.mutate(|container| {
            container.apply_parameter_set_to_layer(StateLayer::Persistent, &snapshot)
        });
        true
    }

    // --- Queries ---

    /// Copy of one layer.
    pub fn state_layer(&self, layer: StateLayer) -> StateCategories {
        self.state.lock().container.layer(layer).clone()
    }

    pub fn has_data_in_layer(&self, layer: StateLayer) -> bool {
        self.state.lock().container.has_data_in_layer(layer)
    }

    /// Copy of the merged view of all layers.
    pub fn effective_state(&self) -> StateCategories {
        self.state.lock().container.effective_state().clone()
    }

    /// The first effective value under `tag`.
    pub fn effective_state_param(&self, tag: &Tag) -> Option<ValueCell> {
        self.state.lock().container.effective_state().first_cell(tag)
    }

    /// The effective value of type `V` under `tag`.
    pub fn effective_value<V: StateValue>(&self, tag: &Tag) -> Option<V> {
        self.state
            .lock()
            .container
            .effective_state()
            .find_first_value::<V>(tag)
            .cloned()
    }

    /// Version of the layered container; bumps on every layer change.
    pub fn state_version(&self) -> u64 {
        self.state.lock().container.version()
    }

    // --- Change Listeners ---

    /// Call `listener` after every change to the component's layers.
    pub fn on_effective_state_changed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&EntityStateComponent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    pub fn remove_state_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    // --- Private Helpers ---

    fn resolve_target_type(&self) -> Tag {
        self.config
            .identity_tags
            .iter()
            .find(|tag| tag.is_valid())
            .cloned()
            .unwrap_or_default()
    }

    fn handle_record(&self, record: &StateModificationRecord) {
        trace!(
            operation = %record.operation_id(),
            target = %record.target_type_tag(),
            "State component received record"
        );
        self.pull_from_manager();
    }

    /// Apply `f` under the state lock, then notify listeners outside it.
    fn mutate(&self, f: impl FnOnce(&mut LayeredStateContainer)) {
        {
            let mut state = self.state.lock();
            f(&mut state.container);
        }
        self.notify_listeners();
    }

    fn notify_listeners(&self) {
        let listeners: Vec<StateListener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(self);
        }
    }
}

impl fmt::Debug for EntityStateComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EntityStateComponent")
            .field("target", &state.target)
            .field("connection", &state.connection)
            .field("version", &state.container.version())
            .finish()
    }
}
