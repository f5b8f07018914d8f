//! Scripted skirmish: every combatant closes on the nearest foe and uses the
//! first action that reaches it. Opportunity attacks are always taken.

use anyhow::{Context, Result};
use tactics::content::Catalog;
use tactics::geometry;
use tactics::{CombatEntity, CombatStateMachine, EngineConfig, EntityId, MoveOutcome, Phase, Position};

pub fn run(config: EngineConfig, max_rounds: u32) -> Result<()> {
    let catalog = Catalog::builtin()?;
    let roster = catalog.demo_roster()?;

    let mut machine = CombatStateMachine::new(config);
    machine.subscribe(|event| match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(err) => tracing::warn!(%err, "failed to encode event"),
    });
    machine.start_combat(roster).context("demo roster rejected")?;

    while machine.phase() != Phase::Idle && machine.round() <= max_rounds {
        if one_side_down(&machine) {
            break;
        }
        let Some(active) = machine.active_entity().cloned() else {
            break;
        };
        take_turn(&mut machine, &active);
        // Falling to an opportunity attack can end the turn before we do.
        if machine.phase() != Phase::Idle && machine.active_entity() == Some(&active) {
            if machine.has_pending_skip() {
                machine.advance_skipped_turn();
            } else {
                machine.end_turn(&active)?;
            }
        }
    }

    let survivors = machine.end_combat();
    for e in &survivors {
        tracing::info!(entity = %e.id, hp = e.hit_points.current, dead = e.is_dead, "final state");
    }
    Ok(())
}

fn one_side_down(machine: &CombatStateMachine) -> bool {
    let standing = |players: bool| {
        machine
            .entities()
            .any(|e| e.is_player == players && !e.is_incapacitated())
    };
    !standing(true) || !standing(false)
}

fn nearest_foe(machine: &CombatStateMachine, me: &CombatEntity) -> Option<CombatEntity> {
    machine
        .entities()
        .filter(|e| e.is_hostile_to(me) && !e.is_incapacitated())
        .min_by(|a, b| {
            let da = me.position.distance(&a.position);
            let db = me.position.distance(&b.position);
            da.total_cmp(&db)
        })
        .cloned()
}

fn take_turn(machine: &mut CombatStateMachine, id: &EntityId) {
    for _ in 0..12 {
        let Some(me) = machine.entity(id).cloned() else {
            return;
        };
        if me.is_incapacitated() || me.usage.action {
            return;
        }
        let Some(foe) = nearest_foe(machine, &me) else {
            return;
        };

        for action in me.actions.iter().filter(|a| a.action_type == tactics::ActionType::Action) {
            if machine.use_action(id, action, Some(&foe.id)).is_ok() {
                return;
            }
        }

        let next = step_towards(me.position, foe.position);
        if next == foe.position || !step(machine, id, me.position, next) {
            return;
        }
    }
}

fn step_towards(from: Position, to: Position) -> Position {
    Position::new(
        from.x + (to.x - from.x).signum(),
        from.y + (to.y - from.y).signum(),
        from.z + (to.z - from.z).signum(),
    )
}

/// One cell of movement, taking every opportunity attack it provokes.
fn step(machine: &mut CombatStateMachine, id: &EntityId, from: Position, to: Position) -> bool {
    if geometry::movement_cost(&from, &to, false) == 0 {
        return false;
    }
    match machine.move_entity(id, from, to, false) {
        Ok(MoveOutcome::Moved { .. }) => true,
        Ok(MoveOutcome::AwaitingReactions { requests }) => {
            for request_id in requests {
                let choice = machine
                    .pending_reactions()
                    .find(|r| r.id == request_id)
                    .and_then(|r| r.candidates.first().cloned());
                machine.resolve_reaction(request_id, choice.as_ref());
            }
            machine.entity(id).is_some_and(|e| e.position == to)
        }
        Err(err) => {
            tracing::debug!(entity = %id, %err, "cannot move");
            false
        }
    }
}
