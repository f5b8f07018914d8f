use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::combat::actions::CombatAction;
use crate::entity::EntityId;
use crate::geometry::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReactionId(pub Uuid);

impl ReactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    OpportunityAttack,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionRequest {
    pub id: ReactionId,
    pub trigger_entity: EntityId,
    pub reacting_entity: EntityId,
    pub trigger: TriggerKind,
    pub candidates: Vec<CombatAction>,
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    pub created_at: DateTime<Utc>,
}

impl ReactionRequest {
    pub fn deadline(&self) -> DateTime<Utc> {
        let millis = i64::try_from(self.timeout.as_millis()).unwrap_or(i64::MAX);
        self.created_at
            .checked_add_signed(chrono::Duration::milliseconds(millis))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline()
    }
}

/// A move held back while the reactions it provoked are decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMove {
    pub entity: EntityId,
    pub from: Position,
    pub to: Position,
    pub difficult_terrain: bool,
    pub requests: Vec<ReactionId>,
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
