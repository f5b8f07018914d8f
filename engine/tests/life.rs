use tactics::CombatEntity;
use tactics::life::{apply_damage, grant_temporary_hp, heal};

fn noop_log(_: String) {}

#[test]
fn temporary_hp_absorbs_first() {
    let mut e = CombatEntity::new("a", "A").with_hp(10);
    e.hit_points.temporary = 4;
    let out = apply_damage(&mut e, 6, noop_log);
    assert_eq!(out.absorbed, 4);
    assert_eq!(out.taken, 2);
    assert_eq!(e.hit_points.current, 8);
    assert_eq!(e.hit_points.temporary, 0);
}

#[test]
fn monsters_die_at_zero() {
    let mut e = CombatEntity::new("g", "Goblin").with_hp(7);
    let out = apply_damage(&mut e, 20, noop_log);
    assert!(out.dropped);
    assert_eq!(out.taken, 7);
    assert_eq!(e.hit_points.current, 0);
    assert!(e.is_dead);
    assert!(!e.is_unconscious);
}

#[test]
fn player_characters_fall_unconscious_and_wake_on_healing() {
    let mut e = CombatEntity::new("p", "Hero").player().with_hp(12);
    let mut logs = Vec::new();
    apply_damage(&mut e, 12, |m| logs.push(m));
    assert!(e.is_unconscious);
    assert!(!e.is_dead);
    assert!(logs.iter().any(|l| l.contains("Unconscious")));

    let healed = heal(&mut e, 5, noop_log);
    assert_eq!(healed, 5);
    assert!(!e.is_unconscious);
    assert_eq!(e.hit_points.current, 5);
}

#[test]
fn healing_caps_at_max_and_skips_the_dead() {
    let mut e = CombatEntity::new("a", "A").with_hp(10);
    e.hit_points.current = 8;
    assert_eq!(heal(&mut e, 5, noop_log), 2);

    e.is_dead = true;
    e.hit_points.current = 0;
    assert_eq!(heal(&mut e, 5, noop_log), 0);
    assert_eq!(e.hit_points.current, 0);
}

#[test]
fn temporary_hp_keeps_the_larger_pool() {
    let mut e = CombatEntity::new("a", "A");
    grant_temporary_hp(&mut e, 5, noop_log);
    grant_temporary_hp(&mut e, 3, noop_log);
    assert_eq!(e.hit_points.temporary, 5);
    grant_temporary_hp(&mut e, 8, noop_log);
    assert_eq!(e.hit_points.temporary, 8);
}
