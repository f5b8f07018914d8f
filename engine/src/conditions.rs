use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Roll categories that conditions can grant advantage or disadvantage on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollType {
    Attack,
    /// Attack rolls made *against* the affected creature.
    AttacksAgainst,
    AbilityCheck,
    Initiative,
    StrSave,
    DexSave,
    ConSave,
    IntSave,
    WisSave,
    ChaSave,
}

/// Numeric stats a condition may adjust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stat {
    ArmorClass,
    Speed,
    AttackRoll,
    DamageRoll,
    SavingThrow,
    AbilityCheck,
    Initiative,
}

/// Pieces of the per-turn economy a condition can take away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EconomySlot {
    Action,
    BonusAction,
    Reaction,
    Movement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationKind {
    Rounds,
    Minutes,
    Hours,
    Permanent,
}

pub const ROUNDS_PER_MINUTE: u32 = 10;
pub const ROUNDS_PER_HOUR: u32 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionDuration {
    pub kind: DurationKind,
    #[serde(default)]
    pub value: u32,
    /// Round on which the condition was applied.
    #[serde(default)]
    pub start_round: u32,
}

impl Default for ConditionDuration {
    fn default() -> Self {
        Self::permanent()
    }
}

impl ConditionDuration {
    pub fn permanent() -> Self {
        Self { kind: DurationKind::Permanent, value: 0, start_round: 0 }
    }

    pub fn rounds(value: u32) -> Self {
        Self { kind: DurationKind::Rounds, value, start_round: 0 }
    }

    pub fn minutes(value: u32) -> Self {
        Self { kind: DurationKind::Minutes, value, start_round: 0 }
    }

    pub fn hours(value: u32) -> Self {
        Self { kind: DurationKind::Hours, value, start_round: 0 }
    }

    /// Length measured in six-second rounds, `None` for permanent effects.
    pub fn length_in_rounds(&self) -> Option<u32> {
        match self.kind {
            DurationKind::Permanent => None,
            DurationKind::Rounds => Some(self.value),
            DurationKind::Minutes => Some(self.value.saturating_mul(ROUNDS_PER_MINUTE)),
            DurationKind::Hours => Some(self.value.saturating_mul(ROUNDS_PER_HOUR)),
        }
    }

    /// Pure function of the round number, so re-checking within one round is a no-op.
    pub fn is_active_at(&self, current_round: u32) -> bool {
        match self.length_in_rounds() {
            None => true,
            Some(len) => current_round.saturating_sub(self.start_round) < len,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConditionEffects {
    #[serde(default)]
    pub advantage: BTreeSet<RollType>,
    #[serde(default)]
    pub disadvantage: BTreeSet<RollType>,
    #[serde(default)]
    pub modifiers: BTreeMap<Stat, i32>,
    #[serde(default)]
    pub forbidden: BTreeSet<EconomySlot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub duration: ConditionDuration,
    #[serde(default)]
    pub effects: ConditionEffects,
}

impl Condition {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            description: String::new(),
            source: None,
            duration: ConditionDuration::permanent(),
            effects: ConditionEffects::default(),
        }
    }

    pub fn with_duration(mut self, duration: ConditionDuration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_effects(mut self, effects: ConditionEffects) -> Self {
        self.effects = effects;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Stamp a template copy with the round it takes effect.
    pub fn starting(&self, round: u32) -> Self {
        let mut c = self.clone();
        c.duration.start_round = round;
        c
    }

    pub fn forbids(&self, slot: EconomySlot) -> bool {
        self.effects.forbidden.contains(&slot)
    }
}

/// Attach a condition. An existing condition with the same key is replaced,
/// which refreshes its duration instead of stacking.
pub fn apply_condition(
    target_name: &str,
    conditions: &mut Vec<Condition>,
    condition: Condition,
    mut log: impl FnMut(String),
) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.key == condition.key) {
        log(format!("[COND][{}] {} refreshed", target_name, condition.name));
        *existing = condition;
        return;
    }
    log(format!("[COND][{}] gains {}", target_name, condition.name));
    conditions.push(condition);
}

/// Drop every condition with `key`; returns the removed ones.
pub fn remove_condition(
    target_name: &str,
    conditions: &mut Vec<Condition>,
    key: &str,
    mut log: impl FnMut(String),
) -> Vec<Condition> {
    let (removed, kept): (Vec<_>, Vec<_>) = conditions.drain(..).partition(|c| c.key == key);
    *conditions = kept;
    for c in &removed {
        log(format!("[COND][{}] is no longer {}", target_name, c.name));
    }
    removed
}
