use std::collections::{BTreeMap, BTreeSet};

use tactics::conditions::EconomySlot;
use tactics::rules;
use tactics::{
    ActionType, AdMode, CombatEntity, Condition, ConditionEffects, Position, RollType, Stat,
};

fn restrained() -> Condition {
    Condition::new("restrained", "Restrained").with_effects(ConditionEffects {
        advantage: BTreeSet::from([RollType::AttacksAgainst]),
        disadvantage: BTreeSet::from([RollType::Attack]),
        forbidden: BTreeSet::from([EconomySlot::Movement]),
        ..Default::default()
    })
}

fn modifiers(pairs: &[(Stat, i32)]) -> ConditionEffects {
    ConditionEffects { modifiers: BTreeMap::from_iter(pairs.iter().copied()), ..Default::default() }
}

#[test]
fn each_slot_is_spent_once() {
    let mut e = CombatEntity::new("a", "A");
    assert!(rules::can_use_action(&e, ActionType::Action));
    e.usage.action = true;
    assert!(!rules::can_use_action(&e, ActionType::Action));
    assert!(rules::can_use_action(&e, ActionType::Bonus));
    assert!(rules::can_use_action(&e, ActionType::Reaction));
}

#[test]
fn downed_entities_cannot_act_or_move() {
    let mut e = CombatEntity::new("a", "A");
    e.is_unconscious = true;
    assert!(!rules::can_use_action(&e, ActionType::Reaction));
    assert!(!rules::can_move(&e, 0));
    assert!(rules::can_end_turn(&e));
}

#[test]
fn forbidden_movement_blocks_every_step() {
    let e = CombatEntity::new("a", "A").with_condition(restrained());
    assert!(!rules::can_move(&e, 0));
    assert!(rules::can_use_action(&e, ActionType::Action));
}

#[test]
fn movement_is_limited_by_remaining_speed() {
    let mut e = CombatEntity::new("a", "A").with_speed(30);
    assert!(rules::can_move(&e, 30));
    assert!(!rules::can_move(&e, 35));
    e.movement.remaining = 10;
    assert!(!rules::can_move(&e, 15));
}

#[test]
fn modifiers_sum_across_conditions() {
    let e = CombatEntity::new("a", "A")
        .with_ac(15)
        .with_condition(Condition::new("shield", "Shield").with_effects(modifiers(&[(Stat::ArmorClass, 5)])))
        .with_condition(Condition::new("hex", "Hex").with_effects(modifiers(&[(Stat::ArmorClass, -2), (Stat::Speed, -10)])));
    assert_eq!(rules::get_modifier(&e, Stat::ArmorClass), 3);
    assert_eq!(rules::calculate_ac(&e), 18);
    assert_eq!(rules::effective_speed(&e), 20);
    assert_eq!(rules::get_modifier(&e, Stat::Initiative), 0);
}

#[test]
fn armor_class_never_drops_below_one() {
    let e = CombatEntity::new("a", "A")
        .with_ac(3)
        .with_condition(Condition::new("curse", "Curse").with_effects(modifiers(&[(Stat::ArmorClass, -10)])));
    assert_eq!(rules::calculate_ac(&e), 1);
}

#[test]
fn advantage_and_disadvantage_cancel() {
    let e = CombatEntity::new("a", "A").with_condition(restrained());
    assert!(rules::has_disadvantage(&e, RollType::Attack));
    assert_eq!(rules::roll_mode(&e, RollType::Attack), AdMode::Disadvantage);

    let attacker = CombatEntity::new("b", "B").player();
    assert_eq!(rules::attack_mode(&attacker, &e), AdMode::Advantage);
    assert_eq!(rules::attack_mode(&e, &e), AdMode::Normal);
}

#[test]
fn leaving_reach_provokes_only_hostile_ready_entities() {
    let mover = CombatEntity::new("hero", "Hero").player();
    let goblin = CombatEntity::new("goblin", "Goblin").at(Position::new(1, 0, 0));
    let ally = CombatEntity::new("ally", "Ally").player().at(Position::new(0, 1, 0));
    let mut spent = CombatEntity::new("orc", "Orc").at(Position::new(-1, 0, 0));
    spent.usage.reaction = true;
    let far = CombatEntity::new("archer", "Archer").at(Position::new(10, 0, 0));

    let from = Position::new(0, 0, 0);
    let to = Position::new(0, 3, 0);
    let roster = [mover.clone(), goblin, ally, spent, far];
    let threats = rules::triggers_opportunity_attack(&mover, &from, &to, roster.iter());
    let ids: Vec<&str> = threats.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["goblin"]);
}

#[test]
fn staying_in_reach_provokes_nothing() {
    let mover = CombatEntity::new("hero", "Hero").player();
    let goblin = CombatEntity::new("goblin", "Goblin").at(Position::new(1, 0, 0));
    let roster = [mover.clone(), goblin];
    let threats = rules::triggers_opportunity_attack(
        &mover,
        &Position::new(0, 0, 0),
        &Position::new(1, 1, 0),
        roster.iter(),
    );
    assert!(threats.is_empty());
}

#[test]
fn touch_needs_an_adjacent_target() {
    let a = Position::new(0, 0, 0);
    assert!(rules::target_in_reach(0, &a, &Position::new(1, 1, 0)));
    assert!(!rules::target_in_reach(0, &a, &Position::new(2, 0, 0)));
    assert!(rules::target_in_reach(-1, &a, &Position::new(50, 0, 0)));
    assert!(rules::target_in_reach(30, &a, &Position::new(6, 0, 0)));
}
