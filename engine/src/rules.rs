//! Stateless rule checks. Nothing here mutates an entity except
//! [`update_condition_durations`], which only prunes expired conditions.

use crate::AdMode;
use crate::combat::actions::ActionType;
use crate::conditions::{Condition, EconomySlot, RollType, Stat};
use crate::entity::CombatEntity;
use crate::geometry::{self, Position};

/// Melee threat radius in distance units.
pub const MELEE_REACH: i32 = 5;

/// Unused action economy may always be forfeited.
pub fn can_end_turn(_entity: &CombatEntity) -> bool {
    true
}

pub fn is_forbidden(entity: &CombatEntity, slot: EconomySlot) -> bool {
    entity.conditions.iter().any(|c| c.forbids(slot))
}

pub fn can_use_action(entity: &CombatEntity, action_type: ActionType) -> bool {
    if entity.is_incapacitated() || is_forbidden(entity, action_type.slot()) {
        return false;
    }
    match action_type {
        ActionType::Action => !entity.usage.action,
        ActionType::Bonus => !entity.usage.bonus_action,
        ActionType::Reaction => !entity.usage.reaction,
    }
}

pub fn can_move(entity: &CombatEntity, distance: u32) -> bool {
    if entity.is_incapacitated() || is_forbidden(entity, EconomySlot::Movement) {
        return false;
    }
    distance <= entity.movement.remaining
}

/// Speed granted at the start of the entity's turn.
pub fn effective_speed(entity: &CombatEntity) -> u32 {
    let speed = entity.movement.speed as i32 + get_modifier(entity, Stat::Speed);
    speed.max(0) as u32
}

/// Entities that may take an opportunity attack when `mover` goes from `from` to `to`.
pub fn triggers_opportunity_attack<'a>(
    mover: &CombatEntity,
    from: &Position,
    to: &Position,
    all_entities: impl IntoIterator<Item = &'a CombatEntity>,
) -> Vec<&'a CombatEntity> {
    all_entities
        .into_iter()
        .filter(|other| other.id != mover.id)
        .filter(|other| other.is_hostile_to(mover))
        .filter(|other| can_use_action(other, ActionType::Reaction))
        .filter(|other| {
            let reach_from = geometry::is_in_range(&other.position, from, MELEE_REACH);
            let reach_to = geometry::is_in_range(&other.position, to, MELEE_REACH);
            reach_from && !reach_to
        })
        .collect()
}

/// Prune conditions whose duration has run out by `current_round` and return them.
/// Evaluating the same round twice removes nothing the second time.
pub fn update_condition_durations(entity: &mut CombatEntity, current_round: u32) -> Vec<Condition> {
    let (kept, expired): (Vec<_>, Vec<_>) = entity
        .conditions
        .drain(..)
        .partition(|c| c.duration.is_active_at(current_round));
    entity.conditions = kept;
    expired
}

pub fn get_modifier(entity: &CombatEntity, stat: Stat) -> i32 {
    entity
        .conditions
        .iter()
        .filter_map(|c| c.effects.modifiers.get(&stat))
        .sum()
}

pub fn has_advantage(entity: &CombatEntity, roll: RollType) -> bool {
    entity.conditions.iter().any(|c| c.effects.advantage.contains(&roll))
}

pub fn has_disadvantage(entity: &CombatEntity, roll: RollType) -> bool {
    entity.conditions.iter().any(|c| c.effects.disadvantage.contains(&roll))
}

pub fn roll_mode(entity: &CombatEntity, roll: RollType) -> AdMode {
    AdMode::from_flags(has_advantage(entity, roll), has_disadvantage(entity, roll))
}

/// Mode for `attacker` swinging at `target`: the attacker's own attack effects
/// plus whatever the target's conditions grant to attacks against it.
pub fn attack_mode(attacker: &CombatEntity, target: &CombatEntity) -> AdMode {
    let advantage = has_advantage(attacker, RollType::Attack)
        || has_advantage(target, RollType::AttacksAgainst);
    let disadvantage = has_disadvantage(attacker, RollType::Attack)
        || has_disadvantage(target, RollType::AttacksAgainst);
    AdMode::from_flags(advantage, disadvantage)
}

pub fn calculate_ac(entity: &CombatEntity) -> i32 {
    (entity.armor_class + get_modifier(entity, Stat::ArmorClass)).max(1)
}

/// Touch actions need an adjacent target; everything else uses [`geometry::is_in_range`].
pub fn target_in_reach(range: i32, from: &Position, to: &Position) -> bool {
    if range == 0 {
        geometry::is_adjacent(from, to)
    } else {
        geometry::is_in_range(from, to, range)
    }
}
