use serde::{Deserialize, Serialize};

use crate::combat::actions::SavingThrowSpec;
use crate::conditions::{RollType, Stat};
use crate::entity::CombatEntity;
use crate::rules;
use crate::{D20Roll, Dice};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackOutcome {
    pub roll: D20Roll,
    pub ac: i32,
    pub hit: bool,
    pub crit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOutcome {
    pub roll: D20Roll,
    pub dc: i32,
    pub passed: bool,
}

/// Attack roll against the target's current AC. Natural 20 always hits and
/// crits; natural 1 always misses.
pub fn attack_roll(
    dice: &mut Dice,
    attacker: &CombatEntity,
    target: &CombatEntity,
    bonus: i32,
    mut log: impl FnMut(String),
) -> AttackOutcome {
    let mode = rules::attack_mode(attacker, target);
    let modifier = bonus + rules::get_modifier(attacker, Stat::AttackRoll);
    let roll = dice.d20_roll(mode).with_modifier(modifier);
    let ac = rules::calculate_ac(target);
    let hit = roll.nat20() || (!roll.nat1() && roll.total >= ac);
    let crit = roll.nat20();
    log(format!(
        "[ATTACK][{}] d20={:?} ({:?}) {:+} = {} vs AC {} → {}",
        attacker.name,
        roll.rolls,
        mode,
        modifier,
        roll.total,
        ac,
        if crit { "CRIT" } else if hit { "HIT" } else { "MISS" }
    ));
    AttackOutcome { roll, ac, hit, crit }
}

pub fn saving_throw(
    dice: &mut Dice,
    entity: &CombatEntity,
    spec: &SavingThrowSpec,
    mut log: impl FnMut(String),
) -> SaveOutcome {
    let mode = rules::roll_mode(entity, spec.ability.save_roll());
    let modifier = entity.save_bonus(spec.ability) + rules::get_modifier(entity, Stat::SavingThrow);
    let roll = dice.d20_roll(mode).with_modifier(modifier);
    let passed = roll.total >= spec.dc;
    log(format!(
        "[SAVE][{}] {:?} save DC {}: roll={} total={} → {}",
        entity.name,
        spec.ability,
        spec.dc,
        roll.roll,
        roll.total,
        if passed { "SUCCESS" } else { "FAIL" }
    ));
    SaveOutcome { roll, dc: spec.dc, passed }
}

/// Roll d20 + initiative modifier for every entity and store the result.
pub fn roll_initiative(dice: &mut Dice, entities: &mut [CombatEntity]) {
    for entity in entities.iter_mut() {
        let mode = rules::roll_mode(entity, RollType::Initiative);
        let modifier = entity.initiative_modifier + rules::get_modifier(entity, Stat::Initiative);
        entity.initiative = dice.d20_roll(mode).with_modifier(modifier).total;
    }
}
