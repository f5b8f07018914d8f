use std::fmt;

use serde::{Deserialize, Serialize};

use crate::checks::{AttackOutcome, SaveOutcome};
use crate::conditions::{Condition, EconomySlot};
use crate::entity::{CombatEntity, EntityId};
use crate::geometry::{self, Position, Vec3};
use crate::{Ability, DamageType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Action,
    Bonus,
    Reaction,
}

impl ActionType {
    pub fn slot(self) -> EconomySlot {
        match self {
            ActionType::Action => EconomySlot::Action,
            ActionType::Bonus => EconomySlot::BonusAction,
            ActionType::Reaction => EconomySlot::Reaction,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ActionType::Action => "action",
            ActionType::Bonus => "bonus",
            ActionType::Reaction => "reaction",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavingThrowSpec {
    pub ability: Ability,
    pub dc: i32,
    /// Successful saves still take half damage (fireball) instead of none.
    #[serde(default)]
    pub half_on_success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AoeShape {
    Sphere,
    Cube,
    Cylinder,
    Cone,
    Line,
}

impl AoeShape {
    /// Cones and lines emanate from the caster; other shapes are placed on a point.
    pub fn emanates_from_caster(self) -> bool {
        matches!(self, AoeShape::Cone | AoeShape::Line)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AoeTemplate {
    pub shape: AoeShape,
    pub size: f64,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub origin: Position,
    #[serde(default)]
    pub direction: Option<Vec3>,
}

impl AoeTemplate {
    pub fn new(shape: AoeShape, size: f64, origin: Position) -> Self {
        Self { shape, size, width: None, height: None, origin, direction: None }
    }

    pub fn with_direction(mut self, direction: Vec3) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn with_width(mut self, width: f64) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_height(mut self, height: f64) -> Self {
        self.height = Some(height);
        self
    }

    pub fn direction(&self) -> Vec3 {
        self.direction.unwrap_or(Vec3::X)
    }

    pub fn contains(&self, point: &Position) -> bool {
        geometry::aoe_contains(self, point)
    }

    /// Place the template for a cast from `caster` aimed at `aim`.
    pub fn anchored(&self, caster: Position, aim: Option<Position>) -> AoeTemplate {
        let mut placed = self.clone();
        if self.shape.emanates_from_caster() {
            placed.origin = caster;
            if let Some(aim) = aim {
                let towards = caster.offset_to(&aim);
                if towards.normalized().is_some() {
                    placed.direction = Some(towards);
                }
            }
        } else {
            placed.origin = aim.unwrap_or(caster);
        }
        placed
    }

    /// Ids of living entities inside the area, in iteration order.
    pub fn affected_entities<'a>(
        &self,
        entities: impl IntoIterator<Item = &'a CombatEntity>,
    ) -> Vec<EntityId> {
        entities
            .into_iter()
            .filter(|e| !e.is_dead && self.contains(&e.position))
            .map(|e| e.id.clone())
            .collect()
    }
}

/// Immutable action template; the state machine only ever borrows these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatAction {
    pub id: String,
    pub name: String,
    pub action_type: ActionType,
    /// Distance units; `-1` targets self, `0` is touch.
    #[serde(default = "self_range")]
    pub range: i32,
    #[serde(default)]
    pub damage: Option<String>,
    #[serde(default)]
    pub damage_type: Option<DamageType>,
    /// Present for attack-roll actions.
    #[serde(default)]
    pub attack_bonus: Option<i32>,
    #[serde(default)]
    pub saving_throw: Option<SavingThrowSpec>,
    #[serde(default)]
    pub aoe: Option<AoeTemplate>,
    #[serde(default)]
    pub applies_conditions: Vec<Condition>,
    /// Rounds before the action can be used again.
    #[serde(default)]
    pub cooldown: Option<u32>,
}

fn self_range() -> i32 {
    -1
}

impl CombatAction {
    pub fn new(id: impl Into<String>, name: impl Into<String>, action_type: ActionType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            action_type,
            range: self_range(),
            damage: None,
            damage_type: None,
            attack_bonus: None,
            saving_throw: None,
            aoe: None,
            applies_conditions: Vec::new(),
            cooldown: None,
        }
    }

    pub fn with_range(mut self, range: i32) -> Self {
        self.range = range;
        self
    }

    pub fn with_attack(mut self, bonus: i32, damage: impl Into<String>, damage_type: DamageType) -> Self {
        self.attack_bonus = Some(bonus);
        self.damage = Some(damage.into());
        self.damage_type = Some(damage_type);
        self
    }

    pub fn with_save(mut self, save: SavingThrowSpec) -> Self {
        self.saving_throw = Some(save);
        self
    }

    pub fn with_damage(mut self, damage: impl Into<String>, damage_type: DamageType) -> Self {
        self.damage = Some(damage.into());
        self.damage_type = Some(damage_type);
        self
    }

    pub fn with_aoe(mut self, aoe: AoeTemplate) -> Self {
        self.aoe = Some(aoe);
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.applies_conditions.push(condition);
        self
    }

    pub fn with_cooldown(mut self, rounds: u32) -> Self {
        self.cooldown = Some(rounds);
        self
    }

    /// Weapon attacks with reach of a single square.
    pub fn is_melee_attack(&self) -> bool {
        self.attack_bonus.is_some() && (0..=geometry::UNITS_PER_CELL).contains(&self.range)
    }

    /// The same strike, taken with a reaction when a foe leaves reach.
    pub fn as_opportunity_attack(&self) -> CombatAction {
        let mut oa = self.clone();
        oa.id = format!("opportunity:{}", self.id);
        oa.name = format!("Opportunity Attack ({})", self.name);
        oa.action_type = ActionType::Reaction;
        oa.cooldown = None;
        oa
    }
}

/// What one use of an action did to one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub target: EntityId,
    pub attack: Option<AttackOutcome>,
    pub save: Option<SaveOutcome>,
    pub damage: i32,
    pub conditions_applied: Vec<String>,
}

impl TargetOutcome {
    pub fn new(target: EntityId) -> Self {
        Self { target, attack: None, save: None, damage: 0, conditions_applied: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReport {
    pub actor: EntityId,
    pub action: String,
    pub outcomes: Vec<TargetOutcome>,
}

impl ActionReport {
    pub fn total_damage(&self) -> i32 {
        self.outcomes.iter().map(|o| o.damage).sum()
    }

    pub fn targets(&self) -> Vec<EntityId> {
        self.outcomes.iter().map(|o| o.target.clone()).collect()
    }
}
