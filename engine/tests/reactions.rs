use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use tactics::content::Catalog;
use tactics::{
    ActionType, CombatAction, CombatEntity, CombatError, DamageType, CombatEvent, CombatStateMachine, EngineConfig, EntityId, MoveOutcome,
    Phase, Position, ReactionId, ReactionOutcome,
};

fn id(s: &str) -> EntityId {
    EntityId::from(s)
}

fn goblin(key: &str, at: Position) -> CombatEntity {
    let catalog = Catalog::builtin().unwrap();
    CombatEntity::new(key, "Goblin")
        .with_initiative(10)
        .at(at)
        .with_action(catalog.action("scimitar").unwrap().clone())
        .with_action(catalog.action("shortbow").unwrap().clone())
}

fn hero() -> CombatEntity {
    CombatEntity::new("hero", "Hero").player().with_initiative(20).with_hp(100)
}

fn encounter(extra: Vec<CombatEntity>) -> (CombatStateMachine, Arc<Mutex<Vec<CombatEvent>>>) {
    let mut m = CombatStateMachine::new(EngineConfig { seed: Some(21), ..EngineConfig::default() });
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    m.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
    let mut roster = vec![hero()];
    roster.extend(extra);
    m.start_combat(roster).unwrap();
    (m, events)
}

fn provoke(m: &mut CombatStateMachine) -> Vec<ReactionId> {
    match m.move_entity(&id("hero"), Position::default(), Position::new(0, 3, 0), false).unwrap() {
        MoveOutcome::AwaitingReactions { requests } => requests,
        other => panic!("expected reactions, got {other:?}"),
    }
}

#[test]
fn leaving_reach_suspends_the_move_before_anything_changes() {
    let (mut m, _) = encounter(vec![goblin("gob", Position::new(1, 0, 0))]);
    let requests = provoke(&mut m);
    assert_eq!(requests.len(), 1);

    let hero = m.entity(&id("hero")).unwrap();
    assert_eq!(hero.position, Position::default());
    assert_eq!(hero.movement.remaining, 30);
    assert_eq!(m.phase(), Phase::ReactionPhase);
    assert!(m.is_awaiting_reactions());

    let request = m.pending_reactions().next().unwrap();
    assert_eq!(request.reacting_entity, id("gob"));
    assert_eq!(request.trigger_entity, id("hero"));
    let candidates: Vec<&str> = request.candidates.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(candidates, ["opportunity:scimitar"]);
}

#[test]
fn the_mover_waits_while_reactions_are_open() {
    let (mut m, _) = encounter(vec![goblin("gob", Position::new(1, 0, 0))]);
    provoke(&mut m);
    assert_eq!(m.end_turn(&id("hero")), Err(CombatError::AwaitingReactions));
    let err = m
        .move_entity(&id("hero"), Position::default(), Position::new(-1, 0, 0), false)
        .unwrap_err();
    assert_eq!(err, CombatError::AwaitingReactions);
}

#[test]
fn passing_lets_the_move_finish() {
    let (mut m, events) = encounter(vec![goblin("gob", Position::new(1, 0, 0))]);
    let requests = provoke(&mut m);

    assert_eq!(m.resolve_reaction(requests[0], None), ReactionOutcome::Cleared { move_applied: true });
    let hero = m.entity(&id("hero")).unwrap();
    assert_eq!(hero.position, Position::new(0, 3, 0));
    assert_eq!(hero.movement.remaining, 15);
    assert_eq!(m.phase(), Phase::ActionPhase);
    assert!(!m.is_awaiting_reactions());

    assert_eq!(m.resolve_reaction(requests[0], None), ReactionOutcome::Ignored);
    assert_eq!(m.timeout_reaction(requests[0]), ReactionOutcome::Ignored);

    let events = events.lock().unwrap();
    let resolved = events
        .iter()
        .filter(|e| matches!(e, CombatEvent::ReactionResolved { .. }))
        .count();
    assert_eq!(resolved, 1);
}

#[test]
fn an_opportunity_attack_spends_the_reaction_until_the_reactors_turn() {
    let (mut m, events) = encounter(vec![goblin("gob", Position::new(1, 0, 0))]);
    let requests = provoke(&mut m);
    let strike = m.pending_reactions().next().unwrap().candidates[0].clone();

    let outcome = m.resolve_reaction(requests[0], Some(&strike));
    assert_eq!(outcome, ReactionOutcome::Cleared { move_applied: true });
    assert!(m.entity(&id("gob")).unwrap().usage.reaction);
    assert!(m.log_tail(5).iter().any(|e| e.action == "Opportunity Attack (Scimitar)"));
    assert!(events.lock().unwrap().iter().any(|e| matches!(
        e,
        CombatEvent::ReactionResolved { action: Some(name), timed_out: false, .. } if name == "Opportunity Attack (Scimitar)"
    )));

    m.end_turn(&id("hero")).unwrap();
    assert_eq!(m.active_entity(), Some(&id("gob")));
    assert!(!m.entity(&id("gob")).unwrap().usage.reaction);
}

#[test]
fn a_move_that_is_no_longer_legal_is_discarded() {
    let (mut m, events) = encounter(vec![goblin("gob", Position::new(1, 0, 0))]);
    let requests = provoke(&mut m);
    let grappled = Catalog::builtin().unwrap().condition("grappled").unwrap().clone();
    m.apply_condition(&id("hero"), grappled).unwrap();

    assert_eq!(m.resolve_reaction(requests[0], None), ReactionOutcome::Cleared { move_applied: false });
    let hero = m.entity(&id("hero")).unwrap();
    assert_eq!(hero.position, Position::default());
    assert_eq!(hero.movement.remaining, 30);
    assert!(m.log_tail(1)[0].description.contains("cancelled"));
    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, CombatEvent::MoveDiscarded { entity_id, .. } if entity_id == &id("hero"))));

    m.end_turn(&id("hero")).unwrap();
}

#[test]
fn every_threat_must_clear_before_the_move() {
    let (mut m, _) = encounter(vec![
        goblin("gob-a", Position::new(1, 0, 0)),
        goblin("gob-b", Position::new(-1, 0, 0)),
    ]);
    let requests = provoke(&mut m);
    assert_eq!(requests.len(), 2);

    assert_eq!(m.resolve_reaction(requests[1], None), ReactionOutcome::Pending { remaining: 1 });
    assert_eq!(m.entity(&id("hero")).unwrap().position, Position::default());
    assert_eq!(m.resolve_reaction(requests[0], None), ReactionOutcome::Cleared { move_applied: true });
    assert_eq!(m.entity(&id("hero")).unwrap().position, Position::new(0, 3, 0));
}

#[test]
fn expired_requests_pass_silently() {
    let (mut m, events) = encounter(vec![goblin("gob", Position::new(1, 0, 0))]);
    let requests = provoke(&mut m);
    let logged = m.log().len();

    assert!(m.expire_reactions(Utc::now()).is_empty());
    let later = Utc::now() + Duration::milliseconds(30_001);
    assert_eq!(m.expire_reactions(later), requests);
    assert!(m.expire_reactions(later).is_empty());

    assert_eq!(m.entity(&id("hero")).unwrap().position, Position::new(0, 3, 0));
    assert!(!m.entity(&id("gob")).unwrap().usage.reaction);
    assert_eq!(m.log().len(), logged + 1);
    assert!(events.lock().unwrap().iter().any(|e| matches!(
        e,
        CombatEvent::ReactionResolved { action: None, timed_out: true, .. }
    )));
}

#[test]
fn a_reactor_that_lost_its_reaction_passes() {
    let (mut m, _) = encounter(vec![goblin("gob", Position::new(1, 0, 0))]);
    let requests = provoke(&mut m);
    let strike = m.pending_reactions().next().unwrap().candidates[0].clone();
    let stunned = Catalog::builtin().unwrap().condition("stunned").unwrap().clone();
    m.apply_condition(&id("gob"), stunned).unwrap();

    m.resolve_reaction(requests[0], Some(&strike));
    assert!(!m.entity(&id("gob")).unwrap().usage.reaction);
    assert_eq!(m.entity(&id("hero")).unwrap().hit_points.current, 100);
}

#[test]
fn allies_and_spent_reactions_do_not_provoke() {
    let ally = CombatEntity::new("ally", "Ally").player().at(Position::new(1, 0, 0));
    let mut tired = goblin("gob", Position::new(-1, 0, 0));
    tired.usage.reaction = true;
    let (mut m, _) = encounter(vec![ally, tired]);

    let outcome = m
        .move_entity(&id("hero"), Position::default(), Position::new(0, 3, 0), false)
        .unwrap();
    assert_eq!(outcome, MoveOutcome::Moved { cost: 15, remaining: 15 });
}

#[test]
fn ending_combat_drops_open_requests() {
    let (mut m, _) = encounter(vec![goblin("gob", Position::new(1, 0, 0))]);
    let requests = provoke(&mut m);
    let roster = m.end_combat();
    assert_eq!(roster.len(), 2);
    assert_eq!(m.pending_reactions().count(), 0);
    assert_eq!(m.resolve_reaction(requests[0], None), ReactionOutcome::Ignored);
}

#[test]
fn a_made_up_starting_point_is_rejected() {
    let (mut m, _) = encounter(vec![goblin("gob", Position::new(1, 0, 0))]);
    let err = m
        .move_entity(&id("hero"), Position::new(100, 100, 0), Position::new(101, 100, 0), false)
        .unwrap_err();
    assert_eq!(
        err,
        CombatError::WrongStartingPosition { actual: Position::default(), given: Position::new(100, 100, 0) }
    );
    assert_eq!(err.to_string(), "Entity is not at the starting position");

    let hero = m.entity(&id("hero")).unwrap();
    assert_eq!(hero.position, Position::default());
    assert_eq!(hero.movement.remaining, 30);
    assert_eq!(m.pending_reactions().count(), 0);

    // The honest move still provokes the goblin.
    assert_eq!(provoke(&mut m).len(), 1);
}

#[test]
fn a_reaction_that_was_not_offered_is_a_pass() {
    let (mut m, events) = encounter(vec![goblin("gob", Position::new(1, 0, 0))]);
    let requests = provoke(&mut m);
    let fireball = Catalog::builtin().unwrap().action("fireball").unwrap().clone();

    assert_eq!(m.resolve_reaction(requests[0], Some(&fireball)), ReactionOutcome::Cleared { move_applied: true });
    assert!(!m.entity(&id("gob")).unwrap().usage.reaction);
    assert_eq!(m.entity(&id("hero")).unwrap().hit_points.current, 100);
    assert!(events.lock().unwrap().iter().any(|e| matches!(
        e,
        CombatEvent::ReactionResolved { action: None, timed_out: false, .. }
    )));
}

fn thorns() -> CombatAction {
    CombatAction::new("thorns", "Thorns", ActionType::Reaction)
        .with_range(5)
        .with_damage("1d4+20", DamageType::Piercing)
}

fn brittle_hero_against_thorns(auto_advance_delay_ms: u64) -> (CombatStateMachine, Arc<Mutex<Vec<CombatEvent>>>) {
    let config = EngineConfig { seed: Some(4), auto_advance_delay_ms, ..EngineConfig::default() };
    let mut m = CombatStateMachine::new(config);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    m.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
    m.start_combat(vec![
        CombatEntity::new("hero", "Hero").player().with_initiative(20).with_hp(5),
        CombatEntity::new("bush", "Bush").with_initiative(10).at(Position::new(1, 0, 0)).with_action(thorns()),
    ])
    .unwrap();
    (m, events)
}

#[test]
fn a_mover_dropped_by_a_reaction_loses_the_rest_of_its_turn() {
    let (mut m, events) = brittle_hero_against_thorns(0);
    let requests = provoke(&mut m);
    assert_eq!(m.resolve_reaction(requests[0], Some(&thorns())), ReactionOutcome::Cleared { move_applied: false });

    assert!(m.entity(&id("hero")).unwrap().is_unconscious);
    assert_eq!(m.active_entity(), Some(&id("bush")));
    assert_eq!(m.phase(), Phase::ActionPhase);
    assert!(events.lock().unwrap().iter().any(|e| matches!(
        e,
        CombatEvent::TurnSkipped { entity_id } if entity_id == &id("hero")
    )));
}

#[test]
fn a_dropped_mover_waits_for_the_delayed_advance() {
    let (mut m, _) = brittle_hero_against_thorns(1_500);
    let requests = provoke(&mut m);
    m.resolve_reaction(requests[0], Some(&thorns()));

    assert_eq!(m.active_entity(), Some(&id("hero")));
    assert!(m.has_pending_skip());
    assert!(m.advance_skipped_turn());
    assert_eq!(m.active_entity(), Some(&id("bush")));
    assert!(!m.has_pending_skip());
}
