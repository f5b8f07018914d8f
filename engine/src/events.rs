//! Encounter events and the synchronous subscriber registry.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::combat::reactions::{ReactionId, ReactionRequest};
use crate::entity::EntityId;
use crate::geometry::Position;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CombatEvent {
    CombatStarted {
        session_id: Uuid,
        turn_order: Vec<EntityId>,
    },
    CombatEnded {
        session_id: Uuid,
        round: u32,
    },
    RoundStarted {
        round: u32,
    },
    TurnStarted {
        round: u32,
        entity_id: EntityId,
    },
    /// The active entity cannot act and its turn will pass on its own.
    TurnSkipped {
        entity_id: EntityId,
    },
    TurnEnded {
        entity_id: EntityId,
    },
    EntityMoved {
        entity_id: EntityId,
        from: Position,
        to: Position,
        cost: u32,
    },
    MoveDiscarded {
        entity_id: EntityId,
        to: Position,
    },
    ActionUsed {
        entity_id: EntityId,
        action: String,
        targets: Vec<EntityId>,
        damage: i32,
    },
    ReactionRequested {
        request: ReactionRequest,
    },
    ReactionResolved {
        request_id: ReactionId,
        reacting_entity: EntityId,
        action: Option<String>,
        timed_out: bool,
    },
    ConditionApplied {
        entity_id: EntityId,
        key: String,
    },
    ConditionRemoved {
        entity_id: EntityId,
        key: String,
    },
    HitPointsChanged {
        entity_id: EntityId,
        current: i32,
        temporary: i32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&CombatEvent) + Send>;

/// Subscribers run synchronously, in registration order, for every event, in
/// the order the events were published.
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    subscribers: IndexMap<SubscriptionId, Subscriber>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&CombatEvent) + Send + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.insert(id, Box::new(subscriber));
        id
    }

    /// Forward events into a channel for consumers living on another task.
    pub fn subscribe_channel(&mut self) -> (SubscriptionId, mpsc::UnboundedReceiver<CombatEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(move |event| {
            if tx.send(event.clone()).is_err() {
                tracing::trace!("event receiver dropped");
            }
        });
        (id, rx)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.shift_remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn publish(&mut self, event: &CombatEvent) {
        for subscriber in self.subscribers.values_mut() {
            subscriber(event);
        }
    }
}
