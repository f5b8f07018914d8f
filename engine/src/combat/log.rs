use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;

pub const DEFAULT_LOG_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatLogEntry {
    pub timestamp: DateTime<Utc>,
    pub round: u32,
    pub actor: EntityId,
    pub action: String,
    #[serde(default)]
    pub targets: Vec<EntityId>,
    #[serde(default)]
    pub rolls: Vec<i32>,
    #[serde(default)]
    pub damage: Option<i32>,
    pub description: String,
    /// Advisory only; the engine itself never undoes anything.
    pub can_undo: bool,
}

impl CombatLogEntry {
    pub fn new(round: u32, actor: EntityId, action: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            round,
            actor,
            action: action.into(),
            targets: Vec::new(),
            rolls: Vec::new(),
            damage: None,
            description: description.into(),
            can_undo: false,
        }
    }

    pub fn undoable(mut self) -> Self {
        self.can_undo = true;
        self
    }
}

/// Append-only ring of the most recent entries.
#[derive(Debug, Clone)]
pub struct CombatLog {
    entries: VecDeque<CombatLogEntry>,
    capacity: usize,
}

impl Default for CombatLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl CombatLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { entries: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, entry: CombatLogEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CombatLogEntry> {
        self.entries.iter()
    }

    /// Last `n` entries, oldest first.
    pub fn tail(&self, n: usize) -> Vec<CombatLogEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
