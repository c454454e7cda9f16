//! Integration tests for the state manager and entity components.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tagstate::{
    register_value_type, ComponentConfig, ConnectionState, EntityStateComponent, ItemList,
    LogEvent, MapSchema, Operation, SchemaRegistry, StateLayer, StateManager, StateManagerConfig,
    StateModificationRecord, StateParameterSet, StateValue, Tag, Vector,
};
use tempfile::TempDir;

const INTERACTABLE: &str = "State.Interact.Interactable";

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn test_manager(dir: &TempDir) -> Arc<StateManager> {
    StateManager::open(StateManagerConfig {
        save_dir: dir.path().join("saves"),
        slot_name: "integration".to_string(),
        ..Default::default()
    })
    .unwrap()
}

fn door_schema() -> Arc<dyn SchemaRegistry> {
    Arc::new(
        MapSchema::new()
            .with_type::<bool>(INTERACTABLE)
            .with_type::<i64>("Stats.Health")
            .with_type::<Vector>("Transform.Spawn"),
    )
}

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<StateModificationRecord>>,
}

impl Recorder {
    fn count(&self) -> usize {
        self.seen.lock().len()
    }
}

// --- Realistic Workflow Tests ---

#[test]
fn test_door_scenario() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let manager = test_manager(&dir);
    let door = Tag::new("Door");
    let tag = Tag::new(INTERACTABLE);

    manager
        .record_operation(Operation::new("Source.Lever", "Door").with_modification(INTERACTABLE, true))
        .unwrap();
    let snapshot = manager.get_aggregated_modifications(&door);
    assert_eq!(snapshot.values(&tag).len(), 1);
    assert_eq!(snapshot.first_value::<bool>(&tag), Some(&true));

    let second = manager
        .record_operation(Operation::new("Source.Lever", "Door").with_modification(INTERACTABLE, false))
        .unwrap();
    let snapshot = manager.get_aggregated_modifications(&door);
    assert_eq!(snapshot.values(&tag).len(), 1);
    assert_eq!(snapshot.first_value::<bool>(&tag), Some(&false));

    assert!(manager.unload_operation(&second.operation_id()));
    let snapshot = manager.get_aggregated_modifications(&door);
    assert_eq!(snapshot.first_value::<bool>(&tag), Some(&true));
}

#[test]
fn test_component_follows_door_scenario() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let manager = test_manager(&dir);
    let component = EntityStateComponent::new(
        manager.clone(),
        door_schema(),
        ComponentConfig {
            identity_tags: vec![Tag::new("Door")],
            default_init: StateParameterSet::new()
                .with_value(INTERACTABLE, false)
                .with_value("Stats.Health", 100i64),
            ..Default::default()
        },
    );
    assert_eq!(component.initialize(), ConnectionState::Connected);

    let tag = Tag::new(INTERACTABLE);
    assert_eq!(component.effective_value::<bool>(&tag), Some(false));

    let open = manager
        .record_operation(Operation::new("Source.Lever", "Door").with_modification(INTERACTABLE, true))
        .unwrap();
    assert_eq!(component.effective_value::<bool>(&tag), Some(true));
    assert_eq!(
        component.effective_value::<i64>(&Tag::new("Stats.Health")),
        Some(100)
    );

    // Temporary beats Persistent, Override beats both.
    component.apply_temporary_modifications(&StateParameterSet::new().with_value(INTERACTABLE, false));
    assert_eq!(component.effective_value::<bool>(&tag), Some(false));
    component.clear_state_layer(StateLayer::Temporary);
    assert_eq!(component.effective_value::<bool>(&tag), Some(true));

    manager.unload_operation(&open.operation_id());
    assert_eq!(component.effective_value::<bool>(&tag), Some(false));
}

#[test]
fn test_components_share_target_snapshot() {
    let dir = TempDir::new().unwrap();
    let manager = test_manager(&dir);
    let config = ComponentConfig {
        identity_tags: vec![Tag::new("Door")],
        ..Default::default()
    };
    let front = EntityStateComponent::new(manager.clone(), door_schema(), config.clone());
    let back = EntityStateComponent::new(manager.clone(), door_schema(), config);
    front.initialize();
    back.initialize();
    assert_eq!(manager.subscriber_count(&Tag::new("Door")), 2);

    manager
        .record_operation(
            Operation::new("Source.Quest", "Door")
                .with_modification("Transform.Spawn", Vector::new(1.0, 2.0, 3.0)),
        )
        .unwrap();

    let spawn = Tag::new("Transform.Spawn");
    assert_eq!(front.effective_value::<Vector>(&spawn), Some(Vector::new(1.0, 2.0, 3.0)));
    assert_eq!(back.effective_value::<Vector>(&spawn), Some(Vector::new(1.0, 2.0, 3.0)));
}

#[test]
fn test_list_accumulation_across_operations() {
    let dir = TempDir::new().unwrap();
    let manager = test_manager(&dir);
    let journal = Tag::new("Quest.Journal");

    let mut ids = Vec::new();
    for entry in 1..=4i64 {
        let record = manager
            .record_operation(
                Operation::new("Source.Quest", "Player")
                    .with_modification("Quest.Journal", ItemList::new().with_item(entry)),
            )
            .unwrap();
        ids.push(record.operation_id());
    }

    let snapshot = manager.get_aggregated_modifications(&Tag::new("Player"));
    let list = snapshot.first_value::<ItemList>(&journal).unwrap();
    assert_eq!(list.values::<i64>().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4]);

    manager.unload_operation(&ids[1]);
    let snapshot = manager.get_aggregated_modifications(&Tag::new("Player"));
    let list = snapshot.first_value::<ItemList>(&journal).unwrap();
    assert_eq!(list.values::<i64>().copied().collect::<Vec<_>>(), vec![1, 3, 4]);
}

#[test]
fn test_unload_by_source_keeps_other_sources() {
    let dir = TempDir::new().unwrap();
    let manager = test_manager(&dir);

    manager
        .record_operation(Operation::new("Source.Chapter1", "Door").with_modification(INTERACTABLE, true))
        .unwrap();
    manager
        .record_operation(Operation::new("Source.Chapter2", "Door").with_modification("Stats.Health", 3i64))
        .unwrap();
    manager
        .record_operation(Operation::new("Source.Chapter1", "Npc").with_modification("Stats.Health", 9i64))
        .unwrap();

    assert_eq!(manager.unload_operations_by_source(&Tag::new("Source.Chapter1")), 2);
    assert_eq!(manager.record_count(), 1);

    let door = manager.get_aggregated_modifications(&Tag::new("Door"));
    assert!(!door.contains(&Tag::new(INTERACTABLE)));
    assert_eq!(door.first_value::<i64>(&Tag::new("Stats.Health")), Some(&3));
    assert!(manager.get_aggregated_modifications(&Tag::new("Npc")).is_empty());

    for target in manager.target_types() {
        assert_eq!(
            manager.get_aggregated_modifications(&target),
            manager.replay_target(&target)
        );
    }
}

// --- Subscription Tests ---

#[test]
fn test_subscriber_isolation() {
    let dir = TempDir::new().unwrap();
    let manager = test_manager(&dir);
    let doors = Arc::new(Recorder::default());
    let chests = Arc::new(Recorder::default());

    let record = |r: &Recorder, rec: &StateModificationRecord| r.seen.lock().push(rec.clone());
    manager.subscribe_to_target_type(&Tag::new("Door"), &doors, record);
    manager.subscribe_to_target_type(&Tag::new("Chest"), &chests, record);

    manager.record_operation(Operation::new("S", "Door")).unwrap();
    manager.record_operation(Operation::new("S", "Door")).unwrap();
    manager.record_operation(Operation::new("S", "Chest")).unwrap();

    assert_eq!(doors.count(), 2);
    assert_eq!(chests.count(), 1);
    assert!(doors
        .seen
        .lock()
        .iter()
        .all(|r| r.target_type_tag() == &Tag::new("Door")));
}

#[test]
fn test_duplicate_subscription_is_noop() {
    let dir = TempDir::new().unwrap();
    let manager = test_manager(&dir);
    let recorder = Arc::new(Recorder::default());
    let door = Tag::new("Door");

    let callback = |r: &Recorder, rec: &StateModificationRecord| r.seen.lock().push(rec.clone());
    assert!(manager.subscribe_to_target_type(&door, &recorder, callback));
    assert!(!manager.subscribe_to_target_type(&door, &recorder, callback));
    assert_eq!(manager.subscriber_count(&door), 1);

    manager.record_operation(Operation::new("S", "Door")).unwrap();
    assert_eq!(recorder.count(), 1);
}

#[test]
fn test_subscribers_see_records_in_order() {
    let dir = TempDir::new().unwrap();
    let manager = test_manager(&dir);
    let recorder = Arc::new(Recorder::default());
    manager.subscribe_to_target_type(&Tag::new("Door"), &recorder, |r: &Recorder, rec| {
        r.seen.lock().push(rec.clone())
    });

    let recorded: Vec<_> = (0..5i64)
        .map(|i| {
            manager
                .record_operation(Operation::new("S", "Door").with_modification("Stats.Health", i))
                .unwrap()
        })
        .collect();

    assert_eq!(*recorder.seen.lock(), recorded);
}

#[test]
fn test_dropped_subscriber_does_not_break_broadcast() {
    let dir = TempDir::new().unwrap();
    let manager = test_manager(&dir);
    let door = Tag::new("Door");
    let survivor = Arc::new(Recorder::default());

    {
        let transient = Arc::new(Recorder::default());
        manager.subscribe_to_target_type(&door, &transient, |r: &Recorder, rec| {
            r.seen.lock().push(rec.clone())
        });
    }
    manager.subscribe_to_target_type(&door, &survivor, |r: &Recorder, rec| {
        r.seen.lock().push(rec.clone())
    });

    manager.record_operation(Operation::new("S", "Door")).unwrap();
    assert_eq!(survivor.count(), 1);
    assert_eq!(manager.subscriber_count(&door), 1);
    assert_eq!(manager.cleanup_invalid_subscribers(), 0);
}

#[test]
fn test_global_listener_and_feed() {
    let dir = TempDir::new().unwrap();
    let manager = test_manager(&dir);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let listener = manager.on_any_changed(move |event| sink.lock().push(event.clone()));
    let feed = manager.watch();

    let record = manager.record_operation(Operation::new("S", "Door")).unwrap();
    manager.unload_operation(&record.operation_id());

    assert_eq!(
        *events.lock(),
        vec![LogEvent::Recorded(record.clone()), LogEvent::Unloaded(record.clone())]
    );
    assert_eq!(
        feed.drain(),
        vec![LogEvent::Recorded(record.clone()), LogEvent::Unloaded(record)]
    );

    assert!(manager.remove_listener(listener));
    manager.record_operation(Operation::new("S", "Door")).unwrap();
    assert_eq!(events.lock().len(), 2);
}

// --- Persistence Tests ---

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Reputation {
    faction: String,
    standing: i32,
}

impl StateValue for Reputation {
    const TYPE_NAME: &'static str = "Reputation";
}

#[test]
fn test_persistence_round_trip_with_custom_type() {
    init_tracing();
    assert!(register_value_type::<Reputation>());

    let dir = TempDir::new().unwrap();
    let manager = test_manager(&dir);
    manager
        .record_operation(
            Operation::new("Source.Quest", "Npc.Guard").with_modification(
                "Social.Reputation",
                Reputation {
                    faction: "Watch".to_string(),
                    standing: 12,
                },
            ),
        )
        .unwrap();
    manager
        .record_operation(
            Operation::new("Source.Quest", "Npc.Guard")
                .with_modification("Quest.Journal", ItemList::new().with_item(Vector::ONE)),
        )
        .unwrap();
    manager.save_log().unwrap();

    let reopened = StateManager::open(StateManagerConfig {
        load_on_start: true,
        ..manager.config().clone()
    })
    .unwrap();

    assert_eq!(reopened.all_modifications(), manager.all_modifications());
    let guard = Tag::new("Npc.Guard");
    assert_eq!(
        reopened.get_aggregated_modifications(&guard),
        manager.get_aggregated_modifications(&guard)
    );
    let reputation = reopened
        .get_aggregated_modifications(&guard)
        .first_value::<Reputation>(&Tag::new("Social.Reputation"))
        .cloned();
    assert_eq!(reputation.map(|r| r.standing), Some(12));
}

#[test]
fn test_reload_refreshes_connected_components() {
    let dir = TempDir::new().unwrap();
    let manager = test_manager(&dir);
    let component = EntityStateComponent::new(
        manager.clone(),
        door_schema(),
        ComponentConfig {
            identity_tags: vec![Tag::new("Door")],
            ..Default::default()
        },
    );
    component.initialize();

    manager
        .record_operation(Operation::new("S", "Door").with_modification(INTERACTABLE, true))
        .unwrap();
    manager.save_log().unwrap();

    manager.clear();
    assert_eq!(component.effective_value::<bool>(&Tag::new(INTERACTABLE)), None);

    assert!(manager.load_log().unwrap());
    assert_eq!(
        component.effective_value::<bool>(&Tag::new(INTERACTABLE)),
        Some(true)
    );
}
