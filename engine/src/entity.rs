use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Ability;
use crate::combat::actions::CombatAction;
use crate::conditions::Condition;
use crate::geometry::Position;

const DEFAULT_SPEED: u32 = 30;
const DEFAULT_HP: i32 = 10;
const DEFAULT_AC: i32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub speed: u32,
    pub remaining: u32,
    /// Distance units spent since this entity's turn started.
    #[serde(default)]
    pub used: u32,
    #[serde(default)]
    pub difficult_terrain: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitPoints {
    pub current: i32,
    pub max: i32,
    #[serde(default)]
    pub temporary: i32,
}

impl HitPoints {
    pub fn new(max: i32) -> Self {
        Self { current: max, max, temporary: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionUsage {
    pub action: bool,
    pub bonus_action: bool,
    pub reaction: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Vision {
    #[serde(default)]
    pub range: u32,
    #[serde(default)]
    pub darkvision: u32,
    #[serde(default)]
    pub passive_perception: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatEntity {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub initiative: i32,
    #[serde(default)]
    pub initiative_modifier: i32,
    #[serde(default)]
    pub position: Position,
    /// Degrees, counter-clockwise from +x.
    #[serde(default)]
    pub facing: f64,
    pub movement: Movement,
    pub hit_points: HitPoints,
    pub armor_class: i32,
    #[serde(default)]
    pub usage: ActionUsage,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub vision: Vision,
    #[serde(default)]
    pub is_player: bool,
    #[serde(default)]
    pub is_dead: bool,
    #[serde(default)]
    pub is_unconscious: bool,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default)]
    pub save_bonuses: BTreeMap<Ability, i32>,
    /// Stat-block actions available to this entity.
    #[serde(default)]
    pub actions: Vec<CombatAction>,
    /// Action id → first round the action may be used again.
    #[serde(default)]
    pub cooldowns: BTreeMap<String, u32>,
}

impl CombatEntity {
    pub fn new(id: impl Into<EntityId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            initiative: 0,
            initiative_modifier: 0,
            position: Position::default(),
            facing: 0.0,
            movement: Movement {
                speed: DEFAULT_SPEED,
                remaining: DEFAULT_SPEED,
                used: 0,
                difficult_terrain: false,
            },
            hit_points: HitPoints::new(DEFAULT_HP),
            armor_class: DEFAULT_AC,
            usage: ActionUsage::default(),
            conditions: Vec::new(),
            vision: Vision::default(),
            is_player: false,
            is_dead: false,
            is_unconscious: false,
            is_hidden: false,
            save_bonuses: BTreeMap::new(),
            actions: Vec::new(),
            cooldowns: BTreeMap::new(),
        }
    }

    pub fn player(mut self) -> Self {
        self.is_player = true;
        self
    }

    pub fn with_initiative(mut self, initiative: i32) -> Self {
        self.initiative = initiative;
        self
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn with_hp(mut self, max: i32) -> Self {
        self.hit_points = HitPoints::new(max);
        self
    }

    pub fn with_ac(mut self, ac: i32) -> Self {
        self.armor_class = ac;
        self
    }

    pub fn with_speed(mut self, speed: u32) -> Self {
        self.movement.speed = speed;
        self.movement.remaining = speed;
        self
    }

    pub fn with_save(mut self, ability: Ability, bonus: i32) -> Self {
        self.save_bonuses.insert(ability, bonus);
        self
    }

    pub fn with_action(mut self, action: CombatAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn is_incapacitated(&self) -> bool {
        self.is_dead || self.is_unconscious
    }

    pub fn is_hostile_to(&self, other: &CombatEntity) -> bool {
        self.is_player != other.is_player
    }

    pub fn has_condition(&self, key: &str) -> bool {
        self.conditions.iter().any(|c| c.key == key)
    }

    pub fn save_bonus(&self, ability: Ability) -> i32 {
        self.save_bonuses.get(&ability).copied().unwrap_or(0)
    }

    pub fn action(&self, id: &str) -> Option<&CombatAction> {
        self.actions.iter().find(|a| a.id == id)
    }
}
