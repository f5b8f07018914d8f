//! Cloneable async handle around a [`CombatStateMachine`].
//!
//! Every call locks the machine for the duration of one operation, so
//! operations stay serialized. The handle owns the timers: one sleep task per
//! reaction request that passes on that request when it fires, and a delayed
//! advance for the turns of entities that cannot act.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::time;
use tracing::debug;

use crate::combat::actions::{ActionReport, CombatAction};
use crate::combat::reactions::ReactionId;
use crate::combat::state::{CombatStateMachine, EncounterState, MoveOutcome, ReactionOutcome};
use crate::entity::{CombatEntity, EntityId};
use crate::error::CombatError;
use crate::events::{CombatEvent, SubscriptionId};
use crate::geometry::Position;

#[derive(Clone)]
pub struct EncounterHandle {
    inner: Arc<Mutex<CombatStateMachine>>,
}

impl EncounterHandle {
    pub fn new(machine: CombatStateMachine) -> Self {
        Self { inner: Arc::new(Mutex::new(machine)) }
    }

    pub async fn subscribe(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<CombatEvent>) {
        self.inner.lock().await.subscribe_channel()
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.lock().await.unsubscribe(id)
    }

    pub async fn state(&self) -> EncounterState {
        self.inner.lock().await.state().clone()
    }

    pub async fn entity(&self, id: &EntityId) -> Option<CombatEntity> {
        self.inner.lock().await.entity(id).cloned()
    }

    /// Run a read-only query against the locked machine.
    pub async fn inspect<R>(&self, f: impl FnOnce(&CombatStateMachine) -> R) -> R {
        let machine = self.inner.lock().await;
        f(&machine)
    }

    pub async fn start_combat(&self, entities: Vec<CombatEntity>) -> Result<(), CombatError> {
        let mut machine = self.inner.lock().await;
        machine.start_combat(entities)?;
        schedule_skip(&self.inner, &machine);
        Ok(())
    }

    pub async fn move_entity(
        &self,
        entity_id: &EntityId,
        from: Position,
        to: Position,
        difficult_terrain: bool,
    ) -> Result<MoveOutcome, CombatError> {
        let mut machine = self.inner.lock().await;
        let outcome = machine.move_entity(entity_id, from, to, difficult_terrain)?;
        if let MoveOutcome::AwaitingReactions { requests } = &outcome {
            let timeout = machine.config().reaction_timeout();
            for id in requests {
                self.spawn_reaction_timer(*id, timeout);
            }
        }
        Ok(outcome)
    }

    pub async fn use_action(
        &self,
        entity_id: &EntityId,
        action: &CombatAction,
        target_id: Option<&EntityId>,
    ) -> Result<ActionReport, CombatError> {
        self.inner.lock().await.use_action(entity_id, action, target_id)
    }

    pub async fn resolve_reaction(&self, request_id: ReactionId, action: Option<&CombatAction>) -> ReactionOutcome {
        let mut machine = self.inner.lock().await;
        let outcome = machine.resolve_reaction(request_id, action);
        schedule_skip(&self.inner, &machine);
        outcome
    }

    pub async fn end_turn(&self, entity_id: &EntityId) -> Result<(), CombatError> {
        let mut machine = self.inner.lock().await;
        machine.end_turn(entity_id)?;
        schedule_skip(&self.inner, &machine);
        Ok(())
    }

    pub async fn end_combat(&self) -> Vec<CombatEntity> {
        self.inner.lock().await.end_combat()
    }

    fn spawn_reaction_timer(&self, request_id: ReactionId, timeout: Duration) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            time::sleep(timeout).await;
            let mut machine = inner.lock().await;
            let outcome = machine.timeout_reaction(request_id);
            if outcome != ReactionOutcome::Ignored {
                debug!(request = %request_id, ?outcome, "reaction timed out");
                schedule_skip(&inner, &machine);
            }
        });
    }
}

/// Start the delayed advance when the active turn belongs to an entity that
/// cannot act. A stale timer finds a different turn and does nothing.
fn schedule_skip(inner: &Arc<Mutex<CombatStateMachine>>, machine: &CombatStateMachine) {
    if !machine.has_pending_skip() {
        return;
    }
    let delay = machine.config().auto_advance_delay();
    let mut turn = (machine.round(), machine.state().turn_index);
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        loop {
            time::sleep(delay).await;
            let mut machine = inner.lock().await;
            let current = (machine.round(), machine.state().turn_index);
            if current != turn || !machine.has_pending_skip() {
                break;
            }
            machine.advance_skipped_turn();
            if !machine.has_pending_skip() {
                break;
            }
            turn = (machine.round(), machine.state().turn_index);
        }
    });
}
