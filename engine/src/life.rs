use serde::{Deserialize, Serialize};

use crate::entity::CombatEntity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DamageOutcome {
    /// Soaked by temporary hit points.
    pub absorbed: i32,
    /// Taken from real hit points.
    pub taken: i32,
    /// The creature went from above 0 HP to 0 with this hit.
    pub dropped: bool,
}

/// Apply damage, temporary HP first. At 0 HP player characters fall
/// unconscious and everything else dies.
pub fn apply_damage(entity: &mut CombatEntity, dmg: i32, mut log: impl FnMut(String)) -> DamageOutcome {
    if entity.is_dead || dmg <= 0 {
        return DamageOutcome::default();
    }

    let hp = &mut entity.hit_points;
    let absorbed = dmg.min(hp.temporary);
    hp.temporary -= absorbed;
    let before = hp.current;
    hp.current = (hp.current - (dmg - absorbed)).max(0);
    let taken = before - hp.current;
    log(format!(
        "[DMG][{}] {} → {} (−{}, {} absorbed)",
        entity.name, before, hp.current, taken, absorbed
    ));

    let dropped = before > 0 && hp.current == 0;
    if dropped {
        if entity.is_player {
            entity.is_unconscious = true;
            log(format!("[STATE][{}] drops to 0 HP → Unconscious", entity.name));
        } else {
            entity.is_dead = true;
            log(format!("[STATE][{}] drops to 0 HP → Dead", entity.name));
        }
    }
    DamageOutcome { absorbed, taken, dropped }
}

/// Healing; wakes an unconscious creature. The dead stay dead.
pub fn heal(entity: &mut CombatEntity, amount: i32, mut log: impl FnMut(String)) -> i32 {
    if amount <= 0 || entity.is_dead {
        return 0;
    }
    let hp = &mut entity.hit_points;
    let before = hp.current;
    hp.current = (hp.current + amount).min(hp.max);
    let healed = hp.current - before;
    if entity.is_unconscious && entity.hit_points.current > 0 {
        entity.is_unconscious = false;
        log(format!(
            "[HEAL][{}] +{} HP ({} → {}) and regains consciousness",
            entity.name, healed, before, entity.hit_points.current
        ));
    } else {
        log(format!(
            "[HEAL][{}] +{} HP ({} → {})",
            entity.name, healed, before, entity.hit_points.current
        ));
    }
    healed
}

/// Temporary hit points do not stack; the larger pool wins.
pub fn grant_temporary_hp(entity: &mut CombatEntity, amount: i32, mut log: impl FnMut(String)) {
    if amount > entity.hit_points.temporary {
        entity.hit_points.temporary = amount;
        log(format!("[TEMP][{}] {} temporary HP", entity.name, amount));
    }
}
