//! Built-in conditions, actions and the demo roster, embedded at compile time.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use serde::Deserialize;

use crate::combat::actions::{ActionType, AoeTemplate, CombatAction, SavingThrowSpec};
use crate::conditions::{Condition, ConditionDuration};
use crate::entity::CombatEntity;
use crate::geometry::Position;
use crate::{Ability, DamageType};

pub fn builtin_sources() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("conditions", include_str!("../content/conditions.yaml")),
        ("actions", include_str!("../content/actions.yaml")),
        ("demo_roster", include_str!("../content/demo_roster.yaml")),
    ])
}

#[derive(Debug, Clone, Deserialize)]
struct ConditionRef {
    key: String,
    #[serde(default)]
    duration: Option<ConditionDuration>,
}

#[derive(Debug, Clone, Deserialize)]
struct ActionData {
    id: String,
    name: String,
    action_type: ActionType,
    #[serde(default = "self_range")]
    range: i32,
    #[serde(default)]
    damage: Option<String>,
    #[serde(default)]
    damage_type: Option<DamageType>,
    #[serde(default)]
    attack_bonus: Option<i32>,
    #[serde(default)]
    saving_throw: Option<SavingThrowSpec>,
    #[serde(default)]
    aoe: Option<AoeTemplate>,
    #[serde(default)]
    conditions: Vec<ConditionRef>,
    #[serde(default)]
    cooldown: Option<u32>,
}

fn self_range() -> i32 {
    -1
}

#[derive(Debug, Clone, Deserialize)]
struct EntityData {
    id: String,
    name: String,
    #[serde(default)]
    player: bool,
    #[serde(default)]
    initiative: i32,
    #[serde(default)]
    position: Position,
    hp: i32,
    ac: i32,
    #[serde(default = "default_speed")]
    speed: u32,
    #[serde(default)]
    saves: BTreeMap<Ability, i32>,
    #[serde(default)]
    actions: Vec<String>,
}

fn default_speed() -> u32 {
    30
}

/// Conditions and actions by key, in file order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub conditions: IndexMap<String, Condition>,
    pub actions: IndexMap<String, CombatAction>,
}

impl Catalog {
    pub fn builtin() -> Result<Self> {
        let sources = builtin_sources();
        let conditions = parse_conditions(sources["conditions"]).context("built-in conditions")?;
        let actions = parse_actions(sources["actions"], &conditions).context("built-in actions")?;
        Ok(Self { conditions, actions })
    }

    pub fn condition(&self, key: &str) -> Option<&Condition> {
        self.conditions.get(key)
    }

    pub fn action(&self, id: &str) -> Option<&CombatAction> {
        self.actions.get(id)
    }

    pub fn parse_roster(&self, text: &str) -> Result<Vec<CombatEntity>> {
        let raw: Vec<EntityData> = serde_yaml::from_str(text).context("failed to parse roster YAML")?;
        raw.into_iter().map(|e| self.build_entity(e)).collect()
    }

    pub fn demo_roster(&self) -> Result<Vec<CombatEntity>> {
        self.parse_roster(builtin_sources()["demo_roster"]).context("built-in demo roster")
    }

    fn build_entity(&self, data: EntityData) -> Result<CombatEntity> {
        let mut entity = CombatEntity::new(data.id, data.name)
            .with_initiative(data.initiative)
            .at(data.position)
            .with_hp(data.hp)
            .with_ac(data.ac)
            .with_speed(data.speed);
        if data.player {
            entity = entity.player();
        }
        for (ability, bonus) in data.saves {
            entity = entity.with_save(ability, bonus);
        }
        for id in &data.actions {
            let Some(action) = self.action(id) else {
                bail!("{} knows unknown action `{}`", entity.id, id);
            };
            entity = entity.with_action(action.clone());
        }
        Ok(entity)
    }
}

pub fn parse_conditions(text: &str) -> Result<IndexMap<String, Condition>> {
    let list: Vec<Condition> = serde_yaml::from_str(text).context("failed to parse conditions YAML")?;
    let mut out = IndexMap::with_capacity(list.len());
    for condition in list {
        if out.contains_key(&condition.key) {
            bail!("duplicate condition key `{}`", condition.key);
        }
        out.insert(condition.key.clone(), condition);
    }
    Ok(out)
}

/// Parse an action list, resolving condition keys against `conditions`.
pub fn parse_actions(text: &str, conditions: &IndexMap<String, Condition>) -> Result<IndexMap<String, CombatAction>> {
    let list: Vec<ActionData> = serde_yaml::from_str(text).context("failed to parse actions YAML")?;
    let mut out = IndexMap::with_capacity(list.len());
    for data in list {
        if out.contains_key(&data.id) {
            bail!("duplicate action id `{}`", data.id);
        }
        if let Some(formula) = &data.damage {
            formula
                .parse::<crate::DamageDice>()
                .with_context(|| format!("action `{}` has a bad damage formula", data.id))?;
        }

        let mut action = CombatAction::new(data.id.clone(), data.name, data.action_type).with_range(data.range);
        action.damage = data.damage;
        action.damage_type = data.damage_type;
        action.attack_bonus = data.attack_bonus;
        action.saving_throw = data.saving_throw;
        action.aoe = data.aoe;
        action.cooldown = data.cooldown;
        for r in data.conditions {
            let Some(template) = conditions.get(&r.key) else {
                bail!("action `{}` applies unknown condition `{}`", data.id, r.key);
            };
            let condition = match r.duration {
                Some(duration) => template.clone().with_duration(duration),
                None => template.clone(),
            };
            action = action.with_condition(condition);
        }
        out.insert(data.id, action);
    }
    Ok(out)
}
