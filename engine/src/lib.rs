use std::fmt;
use std::str::FromStr;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

pub mod checks;
pub mod combat;
pub mod conditions;
pub mod config;
pub mod content;
pub mod entity;
pub mod error;
pub mod events;
pub mod geometry;
pub mod life;
pub mod persistence;
pub mod rules;
pub mod runtime;

pub use combat::actions::{ActionType, AoeShape, AoeTemplate, CombatAction, SavingThrowSpec};
pub use combat::log::{CombatLog, CombatLogEntry};
pub use combat::reactions::{ReactionId, ReactionRequest, TriggerKind};
pub use combat::state::{CombatStateMachine, EncounterState, MoveOutcome, Phase, ReactionOutcome};
pub use conditions::{Condition, ConditionDuration, ConditionEffects, DurationKind, RollType, Stat};
pub use config::EngineConfig;
pub use entity::{CombatEntity, EntityId};
pub use error::{CombatError, FormulaError};
pub use events::{CombatEvent, EventBus, SubscriptionId};
pub use geometry::{Position, Vec3};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdMode { Normal, Advantage, Disadvantage }

impl AdMode {
    /// Both or neither flag set cancels out to a plain roll.
    pub fn from_flags(advantage: bool, disadvantage: bool) -> Self {
        match (advantage, disadvantage) {
            (true, false) => AdMode::Advantage,
            (false, true) => AdMode::Disadvantage,
            _ => AdMode::Normal,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ability { Str, Dex, Con, Int, Wis, Cha }

impl Ability {
    pub fn save_roll(self) -> RollType {
        match self {
            Ability::Str => RollType::StrSave,
            Ability::Dex => RollType::DexSave,
            Ability::Con => RollType::ConSave,
            Ability::Int => RollType::IntSave,
            Ability::Wis => RollType::WisSave,
            Ability::Cha => RollType::ChaSave,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageType {
    Bludgeoning, Piercing, Slashing, Fire, Cold, Lightning, Acid,
    Poison, Psychic, Radiant, Necrotic, Thunder, Force,
}

pub struct Dice { rng: ChaCha8Rng }

impl Dice {
    pub fn from_seed(seed: u64) -> Self {
        Self { rng: ChaCha8Rng::seed_from_u64(seed) }
    }

    pub fn from_entropy() -> Self {
        Self { rng: ChaCha8Rng::from_entropy() }
    }

    pub fn die(&mut self, sides: u32) -> u32 {
        self.rng.gen_range(1..=sides.max(1))
    }

    pub fn d20(&mut self, mode: AdMode) -> u8 {
        self.d20_roll(mode).roll
    }

    pub fn d20_roll(&mut self, mode: AdMode) -> D20Roll {
        let mut roll = || self.rng.gen_range(1..=20u8);
        let (rolls, kept) = match mode {
            AdMode::Normal => { let a = roll(); (vec![a], a) }
            AdMode::Advantage => { let a = roll(); let b = roll(); (vec![a, b], a.max(b)) }
            AdMode::Disadvantage => { let a = roll(); let b = roll(); (vec![a, b], a.min(b)) }
        };
        D20Roll { rolls, roll: kept, total: kept as i32, mode }
    }

    /// Roll a d20 honoring advantage and disadvantage flags.
    pub fn roll_d20(&mut self, advantage: bool, disadvantage: bool) -> D20Roll {
        self.d20_roll(AdMode::from_flags(advantage, disadvantage))
    }

    pub fn roll_dice(&mut self, dice: DamageDice) -> DamageRoll {
        let count = dice.count.min(DamageDice::MAX_COUNT);
        let rolls: Vec<u32> = (0..count).map(|_| self.die(dice.sides)).collect();
        let total = rolls
            .iter()
            .fold(0i32, |acc, r| acc.saturating_add_unsigned(*r))
            .saturating_add(dice.modifier);
        DamageRoll { rolls, modifier: dice.modifier, total }
    }

    /// Evaluate a `<count>d<sides>(+<modifier>)?` formula. Malformed input falls
    /// back to a single d4 instead of failing the action.
    pub fn roll_damage(&mut self, formula: &str) -> DamageRoll {
        match formula.parse::<DamageDice>() {
            Ok(dice) => self.roll_dice(dice),
            Err(err) => {
                tracing::warn!(formula, %err, "unparseable damage formula, rolling fallback die");
                self.roll_dice(DamageDice::FALLBACK)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct D20Roll {
    /// Every d20 that hit the table, in order.
    pub rolls: Vec<u8>,
    pub roll: u8,
    pub total: i32,
    pub mode: AdMode,
}

impl D20Roll {
    pub fn with_modifier(mut self, modifier: i32) -> Self {
        self.total = self.roll as i32 + modifier;
        self
    }

    pub fn nat20(&self) -> bool { self.roll == 20 }
    pub fn nat1(&self) -> bool { self.roll == 1 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageDice {
    pub count: u32,
    pub sides: u32,
    #[serde(default)]
    pub modifier: i32,
}

impl DamageDice {
    pub const FALLBACK: DamageDice = DamageDice { count: 1, sides: 4, modifier: 0 };
    pub const MAX_COUNT: u32 = 100;
    pub const MAX_SIDES: u32 = 1000;

    pub fn new(count: u32, sides: u32) -> Self {
        Self { count, sides, modifier: 0 }
    }

    pub fn min_total(&self) -> i32 {
        let count = self.count.min(Self::MAX_COUNT);
        i32::try_from(count).unwrap_or(i32::MAX).saturating_add(self.modifier)
    }

    pub fn max_total(&self) -> i32 {
        let faces = u64::from(self.count.min(Self::MAX_COUNT)) * u64::from(self.sides);
        i32::try_from(faces).unwrap_or(i32::MAX).saturating_add(self.modifier)
    }
}

impl FromStr for DamageDice {
    type Err = FormulaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let (count, rest) = compact
            .split_once(['d', 'D'])
            .ok_or_else(|| FormulaError::MissingDie(s.to_string()))?;
        let count: u32 = if count.is_empty() {
            1
        } else {
            count.parse().map_err(|_| FormulaError::BadCount(s.to_string()))?
        };

        let (sides, modifier) = match rest.find(['+', '-']) {
            Some(idx) => {
                let (sides, m) = rest.split_at(idx);
                let modifier: i32 = m.parse().map_err(|_| FormulaError::BadModifier(s.to_string()))?;
                (sides, modifier)
            }
            None => (rest, 0),
        };
        let sides: u32 = sides.parse().map_err(|_| FormulaError::BadSides(s.to_string()))?;
        if count == 0 || sides == 0 {
            return Err(FormulaError::Empty(s.to_string()));
        }
        if count > Self::MAX_COUNT || sides > Self::MAX_SIDES {
            return Err(FormulaError::TooLarge(s.to_string()));
        }
        Ok(DamageDice { count, sides, modifier })
    }
}

impl fmt::Display for DamageDice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.modifier {
            0 => write!(f, "{}d{}", self.count, self.sides),
            m => write!(f, "{}d{}{:+}", self.count, self.sides, m),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageRoll {
    pub rolls: Vec<u32>,
    pub modifier: i32,
    pub total: i32,
}
