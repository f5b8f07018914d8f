use std::sync::{Arc, Mutex};

use tactics::{
    ActionType, CombatAction, CombatEntity, CombatEvent, CombatStateMachine, EngineConfig, EntityId,
    EventBus, Position,
};

fn id(s: &str) -> EntityId {
    EntityId::from(s)
}

fn machine() -> CombatStateMachine {
    CombatStateMachine::new(EngineConfig { seed: Some(1), auto_advance_delay_ms: 0, ..EngineConfig::default() })
}

fn kinds(events: &[CombatEvent]) -> Vec<&'static str> {
    events
        .iter()
        .map(|e| match e {
            CombatEvent::CombatStarted { .. } => "combat_started",
            CombatEvent::CombatEnded { .. } => "combat_ended",
            CombatEvent::RoundStarted { .. } => "round_started",
            CombatEvent::TurnStarted { .. } => "turn_started",
            CombatEvent::TurnSkipped { .. } => "turn_skipped",
            CombatEvent::TurnEnded { .. } => "turn_ended",
            CombatEvent::EntityMoved { .. } => "entity_moved",
            CombatEvent::MoveDiscarded { .. } => "move_discarded",
            CombatEvent::ActionUsed { .. } => "action_used",
            CombatEvent::ReactionRequested { .. } => "reaction_requested",
            CombatEvent::ReactionResolved { .. } => "reaction_resolved",
            CombatEvent::ConditionApplied { .. } => "condition_applied",
            CombatEvent::ConditionRemoved { .. } => "condition_removed",
            CombatEvent::HitPointsChanged { .. } => "hit_points_changed",
        })
        .collect()
}

#[test]
fn events_arrive_in_transition_order() {
    let mut m = machine();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    m.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

    let mut downed = CombatEntity::new("b", "B").with_initiative(1);
    downed.is_dead = true;
    m.start_combat(vec![CombatEntity::new("a", "A").with_initiative(5), downed]).unwrap();
    m.move_entity(&id("a"), Position::default(), Position::new(1, 0, 0), false).unwrap();
    m.end_turn(&id("a")).unwrap();
    m.end_combat();

    let seen = seen.lock().unwrap();
    assert_eq!(
        kinds(&seen),
        [
            "combat_started",
            "round_started",
            "turn_started",
            "entity_moved",
            "turn_ended",
            "turn_started",
            "turn_skipped",
            "turn_ended",
            "round_started",
            "turn_started",
            "combat_ended",
        ]
    );
}

#[test]
fn every_subscriber_sees_every_event_until_it_leaves() {
    let mut m = machine();
    let first = Arc::new(Mutex::new(0usize));
    let second = Arc::new(Mutex::new(0usize));
    let (f, s) = (Arc::clone(&first), Arc::clone(&second));
    let keep = m.subscribe(move |_| *f.lock().unwrap() += 1);
    let leave = m.subscribe(move |_| *s.lock().unwrap() += 1);
    assert_ne!(keep, leave);

    m.start_combat(vec![CombatEntity::new("a", "A")]).unwrap();
    assert!(m.unsubscribe(leave));
    assert!(!m.unsubscribe(leave));
    m.end_turn(&id("a")).unwrap();

    assert_eq!(*first.lock().unwrap(), 6);
    assert_eq!(*second.lock().unwrap(), 3);
}

#[test]
fn channel_subscribers_receive_the_same_stream() {
    let mut bus = EventBus::new();
    let (_, mut rx) = bus.subscribe_channel();
    bus.publish(&CombatEvent::RoundStarted { round: 1 });
    bus.publish(&CombatEvent::RoundStarted { round: 2 });
    assert_eq!(rx.try_recv().unwrap(), CombatEvent::RoundStarted { round: 1 });
    assert_eq!(rx.try_recv().unwrap(), CombatEvent::RoundStarted { round: 2 });
    assert!(rx.try_recv().is_err());
    assert_eq!(bus.len(), 1);
}

#[test]
fn actions_report_their_targets() {
    let mut m = machine();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    m.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
    m.start_combat(vec![CombatEntity::new("a", "A")]).unwrap();
    m.use_action(&id("a"), &CombatAction::new("focus", "Focus", ActionType::Bonus), None).unwrap();

    let seen = seen.lock().unwrap();
    let used = seen.last().unwrap();
    assert_eq!(
        used,
        &CombatEvent::ActionUsed { entity_id: id("a"), action: "Focus".into(), targets: vec![id("a")], damage: 0 }
    );
}

#[test]
fn move_event_payload() {
    let event = CombatEvent::EntityMoved {
        entity_id: id("hero"),
        from: Position::new(0, 0, 0),
        to: Position::new(2, 1, 0),
        cost: 10,
    };
    insta::assert_json_snapshot!(event, @r###"
    {
      "type": "entity_moved",
      "entity_id": "hero",
      "from": {
        "x": 0,
        "y": 0,
        "z": 0
      },
      "to": {
        "x": 2,
        "y": 1,
        "z": 0
      },
      "cost": 10
    }
    "###);
}

#[test]
fn resolution_payload() {
    let event = CombatEvent::HitPointsChanged { entity_id: id("gob"), current: 3, temporary: 0 };
    insta::assert_json_snapshot!(event, @r###"
    {
      "type": "hit_points_changed",
      "entity_id": "gob",
      "current": 3,
      "temporary": 0
    }
    "###);
}
