//! Boundary to whatever stores entity state between encounters.
//!
//! The state machine pushes an [`EntityStateUpdate`] after every move and every
//! hit-point change. A failing store never blocks or rolls back the in-memory
//! transition; the machine logs the error and carries on.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{CombatEntity, EntityId, HitPoints};
use crate::geometry::Position;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityStateUpdate {
    pub session_id: Uuid,
    pub entity_id: EntityId,
    pub position: Position,
    pub facing: f64,
    pub current_hp: i32,
    pub updated_at: DateTime<Utc>,
}

impl EntityStateUpdate {
    pub fn of(session_id: Uuid, entity: &CombatEntity) -> Self {
        Self {
            session_id,
            entity_id: entity.id.clone(),
            position: entity.position,
            facing: entity.facing,
            current_hp: entity.hit_points.current,
            updated_at: Utc::now(),
        }
    }
}

/// What the store keeps for an entity. Conditions and initiative are not part
/// of it and come back defaulted on resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub facing: f64,
    pub current_hp: i32,
    pub max_hp: i32,
    #[serde(default)]
    pub armor_class: Option<i32>,
    #[serde(default)]
    pub speed: Option<u32>,
    #[serde(default)]
    pub is_player: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl EntitySnapshot {
    pub fn of(entity: &CombatEntity) -> Self {
        Self {
            id: entity.id.clone(),
            name: entity.name.clone(),
            position: entity.position,
            facing: entity.facing,
            current_hp: entity.hit_points.current,
            max_hp: entity.hit_points.max,
            armor_class: Some(entity.armor_class),
            speed: Some(entity.movement.speed),
            is_player: entity.is_player,
            updated_at: Some(Utc::now()),
        }
    }

    fn apply(&mut self, update: &EntityStateUpdate) {
        self.position = update.position;
        self.facing = update.facing;
        self.current_hp = update.current_hp;
        self.updated_at = Some(update.updated_at);
    }
}

impl From<EntitySnapshot> for CombatEntity {
    fn from(snapshot: EntitySnapshot) -> Self {
        let mut entity = CombatEntity::new(snapshot.id, snapshot.name).at(snapshot.position);
        if let Some(ac) = snapshot.armor_class {
            entity = entity.with_ac(ac);
        }
        if let Some(speed) = snapshot.speed {
            entity = entity.with_speed(speed);
        }
        entity.facing = snapshot.facing;
        entity.is_player = snapshot.is_player;
        entity.hit_points = HitPoints {
            current: snapshot.current_hp.clamp(0, snapshot.max_hp),
            max: snapshot.max_hp,
            temporary: 0,
        };
        if entity.hit_points.current == 0 {
            if entity.is_player {
                entity.is_unconscious = true;
            } else {
                entity.is_dead = true;
            }
        }
        entity
    }
}

pub trait EntityStore: Send {
    fn save_entity_state(&mut self, update: &EntityStateUpdate) -> Result<()>;

    fn load_roster(&self, session_id: Uuid) -> Result<Vec<EntitySnapshot>>;

    /// Store the full roster, e.g. when an encounter ends.
    fn save_roster(&mut self, session_id: Uuid, roster: &[EntitySnapshot]) -> Result<()>;
}

/// Rebuild combatants for a resumed session.
pub fn restore_roster(store: &dyn EntityStore, session_id: Uuid) -> Result<Vec<CombatEntity>> {
    let snapshots = store
        .load_roster(session_id)
        .with_context(|| format!("failed to load roster for session {}", session_id))?;
    Ok(snapshots.into_iter().map(CombatEntity::from).collect())
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    sessions: HashMap<Uuid, Vec<EntitySnapshot>>,
    /// Every update received, oldest first.
    pub updates: Vec<EntityStateUpdate>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntityStore for MemoryStore {
    fn save_entity_state(&mut self, update: &EntityStateUpdate) -> Result<()> {
        if let Some(snapshot) = self
            .sessions
            .get_mut(&update.session_id)
            .and_then(|roster| roster.iter_mut().find(|s| s.id == update.entity_id))
        {
            snapshot.apply(update);
        }
        self.updates.push(update.clone());
        Ok(())
    }

    fn load_roster(&self, session_id: Uuid) -> Result<Vec<EntitySnapshot>> {
        Ok(self.sessions.get(&session_id).cloned().unwrap_or_default())
    }

    fn save_roster(&mut self, session_id: Uuid, roster: &[EntitySnapshot]) -> Result<()> {
        self.sessions.insert(session_id, roster.to_vec());
        Ok(())
    }
}

/// One pretty-printed JSON document per session under `root`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, session_id: Uuid) -> PathBuf {
        self.root.join(format!("{}.json", session_id))
    }

    fn read(&self, session_id: Uuid) -> Result<Vec<EntitySnapshot>> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read roster JSON: {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse roster JSON: {}", path.display()))
    }

    fn write(&self, session_id: Uuid, roster: &[EntitySnapshot]) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create store dir: {}", self.root.display()))?;
        let path = self.path_for(session_id);
        let text = serde_json::to_string_pretty(roster)?;
        fs::write(&path, text).with_context(|| format!("failed to write roster JSON: {}", path.display()))
    }
}

impl EntityStore for JsonFileStore {
    fn save_entity_state(&mut self, update: &EntityStateUpdate) -> Result<()> {
        let mut roster = self.read(update.session_id)?;
        match roster.iter_mut().find(|s| s.id == update.entity_id) {
            Some(snapshot) => snapshot.apply(update),
            None => anyhow::bail!("entity {} is not stored for session {}", update.entity_id, update.session_id),
        }
        self.write(update.session_id, &roster)
    }

    fn load_roster(&self, session_id: Uuid) -> Result<Vec<EntitySnapshot>> {
        self.read(session_id)
    }

    fn save_roster(&mut self, session_id: Uuid, roster: &[EntitySnapshot]) -> Result<()> {
        self.write(session_id, roster)
    }
}
