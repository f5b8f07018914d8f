//! The encounter state machine: sole owner and mutator of a combat roster.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::checks;
use crate::combat::actions::{ActionReport, ActionType, CombatAction, TargetOutcome};
use crate::combat::log::{CombatLog, CombatLogEntry};
use crate::combat::reactions::{PendingMove, ReactionId, ReactionRequest, TriggerKind};
use crate::conditions::{self, Condition, EconomySlot, Stat};
use crate::config::EngineConfig;
use crate::entity::{ActionUsage, CombatEntity, EntityId};
use crate::error::CombatError;
use crate::events::{CombatEvent, EventBus, SubscriptionId};
use crate::geometry::{self, Position};
use crate::life::{self, DamageOutcome};
use crate::persistence::{EntitySnapshot, EntityStateUpdate, EntityStore};
use crate::rules;
use crate::{DamageDice, DamageRoll, Dice};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    RoundStart,
    TurnStart,
    ActionPhase,
    ReactionPhase,
    TurnEnd,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterState {
    pub session_id: Uuid,
    pub round: u32,
    pub turn_index: usize,
    pub phase: Phase,
    pub turn_queue: Vec<EntityId>,
    pub active_entity: Option<EntityId>,
    /// The mover's turn is suspended until its reaction requests clear.
    pub awaiting_reactions: bool,
    pub last_updated: DateTime<Utc>,
}

impl EncounterState {
    fn idle() -> Self {
        Self {
            session_id: Uuid::nil(),
            round: 0,
            turn_index: 0,
            phase: Phase::Idle,
            turn_queue: Vec::new(),
            active_entity: None,
            awaiting_reactions: false,
            last_updated: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveOutcome {
    Moved { cost: u32, remaining: u32 },
    /// Nothing moved yet; the move completes once these requests are resolved.
    AwaitingReactions { requests: Vec<ReactionId> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReactionOutcome {
    /// Unknown or already resolved request.
    Ignored,
    /// Other requests from the same move are still open.
    Pending { remaining: usize },
    /// Last request resolved; reports whether the held move went through.
    Cleared { move_applied: bool },
}

pub struct CombatStateMachine {
    config: EngineConfig,
    state: EncounterState,
    roster: IndexMap<EntityId, CombatEntity>,
    reactions: IndexMap<ReactionId, ReactionRequest>,
    pending_move: Option<PendingMove>,
    pending_skip: bool,
    log: CombatLog,
    bus: EventBus,
    dice: Dice,
    store: Option<Box<dyn EntityStore>>,
}

impl Default for CombatStateMachine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl CombatStateMachine {
    pub fn new(config: EngineConfig) -> Self {
        let dice = match config.seed {
            Some(seed) => Dice::from_seed(seed),
            None => Dice::from_entropy(),
        };
        Self {
            log: CombatLog::with_capacity(config.log_capacity),
            config,
            state: EncounterState::idle(),
            roster: IndexMap::new(),
            reactions: IndexMap::new(),
            pending_move: None,
            pending_skip: false,
            bus: EventBus::new(),
            dice,
            store: None,
        }
    }

    pub fn with_store(mut self, store: impl EntityStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /* ---------------- subscribers ---------------- */

    pub fn subscribe(&mut self, subscriber: impl FnMut(&CombatEvent) + Send + 'static) -> SubscriptionId {
        self.bus.subscribe(subscriber)
    }

    pub fn subscribe_channel(&mut self) -> (SubscriptionId, mpsc::UnboundedReceiver<CombatEvent>) {
        self.bus.subscribe_channel()
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /* ---------------- read surface ---------------- */

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &EncounterState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn round(&self) -> u32 {
        self.state.round
    }

    pub fn session_id(&self) -> Uuid {
        self.state.session_id
    }

    pub fn active_entity(&self) -> Option<&EntityId> {
        self.state.active_entity.as_ref()
    }

    pub fn turn_queue(&self) -> &[EntityId] {
        &self.state.turn_queue
    }

    pub fn is_awaiting_reactions(&self) -> bool {
        self.state.awaiting_reactions
    }

    /// A downed entity's turn is waiting for [`Self::advance_skipped_turn`].
    pub fn has_pending_skip(&self) -> bool {
        self.pending_skip
    }

    pub fn entity(&self, id: &EntityId) -> Option<&CombatEntity> {
        self.roster.get(id)
    }

    /// Roster in turn order.
    pub fn entities(&self) -> impl Iterator<Item = &CombatEntity> {
        self.roster.values()
    }

    pub fn pending_reactions(&self) -> impl Iterator<Item = &ReactionRequest> {
        self.reactions.values()
    }

    pub fn pending_move(&self) -> Option<&PendingMove> {
        self.pending_move.as_ref()
    }

    pub fn log(&self) -> &CombatLog {
        &self.log
    }

    pub fn log_tail(&self, n: usize) -> Vec<CombatLogEntry> {
        self.log.tail(n)
    }

    /* ---------------- encounter lifecycle ---------------- */

    /// Order the roster by initiative (ties go to player characters) and open round one.
    pub fn start_combat(&mut self, entities: Vec<CombatEntity>) -> Result<(), CombatError> {
        if self.state.phase != Phase::Idle {
            return Err(CombatError::AlreadyActive);
        }
        if entities.is_empty() {
            return Err(CombatError::EmptyRoster);
        }

        let mut ordered = entities;
        ordered.sort_by(|a, b| {
            b.initiative
                .cmp(&a.initiative)
                .then_with(|| b.is_player.cmp(&a.is_player))
        });

        let mut roster = IndexMap::with_capacity(ordered.len());
        for entity in ordered {
            if roster.contains_key(&entity.id) {
                return Err(CombatError::DuplicateEntity(entity.id));
            }
            roster.insert(entity.id.clone(), entity);
        }

        let queue: Vec<EntityId> = roster.keys().cloned().collect();
        self.roster = roster;
        self.reactions.clear();
        self.pending_move = None;
        self.pending_skip = false;
        self.log.clear();
        self.state = EncounterState {
            session_id: Uuid::new_v4(),
            round: 1,
            turn_index: 0,
            phase: Phase::RoundStart,
            active_entity: queue.first().cloned(),
            turn_queue: queue.clone(),
            awaiting_reactions: false,
            last_updated: Utc::now(),
        };

        if let Some(store) = self.store.as_mut() {
            let snapshots: Vec<EntitySnapshot> = self.roster.values().map(EntitySnapshot::of).collect();
            if let Err(err) = store.save_roster(self.state.session_id, &snapshots) {
                warn!(session = %self.state.session_id, error = %err, "failed to store roster at start of combat");
            }
        }

        info!(session = %self.state.session_id, combatants = queue.len(), "combat started");
        self.emit(CombatEvent::CombatStarted {
            session_id: self.state.session_id,
            turn_order: queue,
        });
        self.start_round();
        Ok(())
    }

    /// Close the encounter from any phase. Open reaction requests are dropped and
    /// the roster is handed back (and stored, when a store is attached).
    pub fn end_combat(&mut self) -> Vec<CombatEntity> {
        if self.state.phase == Phase::Idle {
            return Vec::new();
        }

        let discarded = self.reactions.len();
        self.reactions.clear();
        self.pending_move = None;
        self.pending_skip = false;

        let session_id = self.state.session_id;
        let round = self.state.round;
        let roster: Vec<CombatEntity> = self.roster.drain(..).map(|(_, e)| e).collect();
        if let Some(store) = self.store.as_mut() {
            let snapshots: Vec<EntitySnapshot> = roster.iter().map(EntitySnapshot::of).collect();
            if let Err(err) = store.save_roster(session_id, &snapshots) {
                warn!(session = %session_id, error = %err, "failed to store roster at end of combat");
            }
        }

        self.state.phase = Phase::Idle;
        self.state.active_entity = None;
        self.state.turn_queue.clear();
        self.state.turn_index = 0;
        self.state.awaiting_reactions = false;
        self.touch();

        info!(session = %session_id, round, discarded_reactions = discarded, "combat ended");
        self.emit(CombatEvent::CombatEnded { session_id, round });
        roster
    }

    fn start_round(&mut self) {
        self.state.phase = Phase::RoundStart;
        let round = self.state.round;
        debug!(round, "round start");
        self.emit(CombatEvent::RoundStarted { round });

        let mut expired = Vec::new();
        for entity in self.roster.values_mut() {
            for condition in rules::update_condition_durations(entity, round) {
                expired.push((entity.id.clone(), condition.key));
            }
        }
        for (entity_id, key) in expired {
            debug!(entity = %entity_id, condition = %key, "condition expired");
            self.emit(CombatEvent::ConditionRemoved { entity_id, key });
        }

        self.start_turn();
    }

    fn start_turn(&mut self) {
        self.state.phase = Phase::TurnStart;
        let Some(id) = self.state.turn_queue.get(self.state.turn_index).cloned() else {
            return;
        };
        self.state.active_entity = Some(id.clone());
        self.touch();

        if self.roster.values().all(|e| e.is_incapacitated()) {
            warn!(session = %self.state.session_id, "no combatant is able to act");
            self.end_combat();
            return;
        }

        let incapacitated = match self.roster.get_mut(&id) {
            Some(entity) => {
                entity.usage = ActionUsage::default();
                entity.movement.remaining = rules::effective_speed(entity);
                entity.movement.used = 0;
                entity.movement.difficult_terrain = false;
                entity.is_incapacitated()
            }
            None => true,
        };

        debug!(round = self.state.round, entity = %id, "turn start");
        self.emit(CombatEvent::TurnStarted { round: self.state.round, entity_id: id.clone() });

        if incapacitated {
            self.pending_skip = true;
            self.emit(CombatEvent::TurnSkipped { entity_id: id });
            if self.config.auto_advance_delay_ms == 0 {
                self.advance_skipped_turn();
            }
            return;
        }

        self.state.phase = Phase::ActionPhase;
    }

    /// Pass the turn of an entity that cannot act. Returns false when no skip is pending.
    pub fn advance_skipped_turn(&mut self) -> bool {
        if !self.pending_skip {
            return false;
        }
        self.pending_skip = false;
        if let Some(id) = self.state.active_entity.clone() {
            self.emit(CombatEvent::TurnEnded { entity_id: id });
        }
        self.advance_turn();
        true
    }

    fn advance_turn(&mut self) {
        self.state.phase = Phase::TurnEnd;
        let len = self.state.turn_queue.len();
        if len == 0 {
            return;
        }
        self.state.turn_index = (self.state.turn_index + 1) % len;
        if self.state.turn_index == 0 {
            self.state.round += 1;
            self.start_round();
        } else {
            self.start_turn();
        }
    }

    pub fn end_turn(&mut self, entity_id: &EntityId) -> Result<(), CombatError> {
        self.ensure_active()?;
        let entity = self
            .roster
            .get(entity_id)
            .ok_or_else(|| CombatError::EntityNotFound(entity_id.clone()))?;
        if self.state.active_entity.as_ref() != Some(entity_id) {
            return Err(CombatError::NotYourTurn(entity_id.clone()));
        }
        if self.state.awaiting_reactions {
            return Err(CombatError::AwaitingReactions);
        }
        debug_assert!(rules::can_end_turn(entity));

        self.pending_skip = false;
        debug!(entity = %entity_id, "turn end");
        self.emit(CombatEvent::TurnEnded { entity_id: entity_id.clone() });
        self.advance_turn();
        Ok(())
    }

    /* ---------------- movement ---------------- */

    pub fn move_entity(
        &mut self,
        entity_id: &EntityId,
        from: Position,
        to: Position,
        difficult_terrain: bool,
    ) -> Result<MoveOutcome, CombatError> {
        self.ensure_active()?;
        let mover = self
            .roster
            .get(entity_id)
            .ok_or_else(|| CombatError::EntityNotFound(entity_id.clone()))?;
        if self.state.active_entity.as_ref() != Some(entity_id) {
            return Err(CombatError::NotYourTurn(entity_id.clone()));
        }
        if self.state.awaiting_reactions {
            return Err(CombatError::AwaitingReactions);
        }
        if mover.position != from {
            return Err(CombatError::WrongStartingPosition { actual: mover.position, given: from });
        }

        let cost = geometry::movement_cost(&from, &to, difficult_terrain);
        Self::check_move(mover, cost)?;

        let threats: Vec<(EntityId, Vec<CombatAction>)> =
            rules::triggers_opportunity_attack(mover, &from, &to, self.roster.values())
                .into_iter()
                .map(|reactor| (reactor.id.clone(), reaction_candidates(reactor)))
                .collect();

        if threats.is_empty() {
            let remaining = self.apply_move(entity_id, from, to, difficult_terrain, cost);
            return Ok(MoveOutcome::Moved { cost, remaining });
        }

        let now = Utc::now();
        let mut requests = Vec::with_capacity(threats.len());
        for (reactor, candidates) in threats {
            let request = ReactionRequest {
                id: ReactionId::new(),
                trigger_entity: entity_id.clone(),
                reacting_entity: reactor,
                trigger: TriggerKind::OpportunityAttack,
                candidates,
                timeout: self.config.reaction_timeout(),
                created_at: now,
            };
            requests.push(request.id);
            self.reactions.insert(request.id, request);
        }

        self.pending_move = Some(PendingMove {
            entity: entity_id.clone(),
            from,
            to,
            difficult_terrain,
            requests: requests.clone(),
        });
        self.state.awaiting_reactions = true;
        self.state.phase = Phase::ReactionPhase;
        self.touch();

        debug!(entity = %entity_id, threats = requests.len(), "move provokes reactions");
        for id in &requests {
            if let Some(request) = self.reactions.get(id).cloned() {
                self.emit(CombatEvent::ReactionRequested { request });
            }
        }
        Ok(MoveOutcome::AwaitingReactions { requests })
    }

    fn check_move(mover: &CombatEntity, cost: u32) -> Result<(), CombatError> {
        if rules::can_move(mover, cost) {
            return Ok(());
        }
        if mover.is_incapacitated() || rules::is_forbidden(mover, EconomySlot::Movement) {
            return Err(CombatError::MovementForbidden);
        }
        Err(CombatError::NotEnoughMovement { needed: cost, remaining: mover.movement.remaining })
    }

    fn apply_move(&mut self, entity_id: &EntityId, from: Position, to: Position, difficult: bool, cost: u32) -> u32 {
        let round = self.state.round;
        let Some(entity) = self.roster.get_mut(entity_id) else {
            return 0;
        };
        entity.movement.remaining = entity.movement.remaining.saturating_sub(cost);
        entity.movement.used += cost;
        entity.movement.difficult_terrain = difficult;
        entity.position = to;
        if let Some(heading) = from.heading_to(&to) {
            entity.facing = heading;
        }
        let remaining = entity.movement.remaining;
        let description = format!(
            "{} moves from ({}, {}, {}) to ({}, {}, {}) for {} ft, {} ft left",
            entity.name, from.x, from.y, from.z, to.x, to.y, to.z, cost, remaining
        );

        self.log.push(CombatLogEntry::new(round, entity_id.clone(), "Move", description).undoable());
        self.persist(entity_id);
        self.touch();
        self.emit(CombatEvent::EntityMoved { entity_id: entity_id.clone(), from, to, cost });
        remaining
    }

    /* ---------------- reactions ---------------- */

    /// Resolve one reaction request, with the reacting entity's chosen action or
    /// as a pass. Unknown and already-resolved ids are ignored.
    pub fn resolve_reaction(&mut self, request_id: ReactionId, action: Option<&CombatAction>) -> ReactionOutcome {
        self.finish_reaction(request_id, action, false)
    }

    /// Resolve every request whose timeout has elapsed at `now` as a pass.
    pub fn expire_reactions(&mut self, now: DateTime<Utc>) -> Vec<ReactionId> {
        let expired: Vec<ReactionId> = self
            .reactions
            .values()
            .filter(|r| r.is_expired(now))
            .map(|r| r.id)
            .collect();
        for id in &expired {
            self.finish_reaction(*id, None, true);
        }
        expired
    }

    /// Timer entry point: a silent pass for one request.
    pub fn timeout_reaction(&mut self, request_id: ReactionId) -> ReactionOutcome {
        self.finish_reaction(request_id, None, true)
    }

    fn finish_reaction(&mut self, request_id: ReactionId, action: Option<&CombatAction>, timed_out: bool) -> ReactionOutcome {
        let Some(request) = self.reactions.shift_remove(&request_id) else {
            return ReactionOutcome::Ignored;
        };

        let mut used = None;
        if let Some(action) = action {
            let reactor = self.roster.get(&request.reacting_entity);
            let offered = request.candidates.iter().any(|c| c.id == action.id);
            let able = reactor.is_some_and(|e| rules::can_use_action(e, ActionType::Reaction));
            let in_reach = action.range < 0
                || match (reactor, self.roster.get(&request.trigger_entity)) {
                    (Some(r), Some(t)) => rules::target_in_reach(action.range, &r.position, &t.position),
                    _ => false,
                };
            if !offered {
                warn!(entity = %request.reacting_entity, action = %action.name, "reaction was not offered, treating as pass");
            } else if !able {
                warn!(entity = %request.reacting_entity, action = %action.name, "reaction no longer available, treating as pass");
            } else if !in_reach {
                warn!(entity = %request.reacting_entity, action = %action.name, "trigger out of reach, treating as pass");
            } else {
                self.execute_action(&request.reacting_entity, action, ActionType::Reaction, Some(&request.trigger_entity), None);
                used = Some(action.name.clone());
            }
        }

        debug!(request = %request_id, timed_out, "reaction resolved");
        self.emit(CombatEvent::ReactionResolved {
            request_id,
            reacting_entity: request.reacting_entity.clone(),
            action: used,
            timed_out,
        });

        let Some(pending) = self.pending_move.as_mut() else {
            return ReactionOutcome::Cleared { move_applied: false };
        };
        pending.requests.retain(|id| *id != request_id);
        if !pending.requests.is_empty() {
            return ReactionOutcome::Pending { remaining: pending.requests.len() };
        }

        let Some(pending) = self.pending_move.take() else {
            return ReactionOutcome::Cleared { move_applied: false };
        };
        self.state.awaiting_reactions = false;
        self.state.phase = Phase::ActionPhase;
        self.touch();
        let move_applied = self.complete_pending_move(pending);
        self.skip_if_active_downed();
        ReactionOutcome::Cleared { move_applied }
    }

    /// A reaction can drop the creature whose turn it is; its turn then ends
    /// the same way as a turn that started incapacitated.
    fn skip_if_active_downed(&mut self) {
        if self.state.phase != Phase::ActionPhase || self.pending_skip {
            return;
        }
        let Some(id) = self.state.active_entity.clone() else {
            return;
        };
        if !self.roster.get(&id).is_some_and(|e| e.is_incapacitated()) {
            return;
        }
        self.pending_skip = true;
        self.emit(CombatEvent::TurnSkipped { entity_id: id });
        if self.config.auto_advance_delay_ms == 0 {
            self.advance_skipped_turn();
        }
    }

    /// Re-check and perform a move that was held for reactions.
    fn complete_pending_move(&mut self, pending: PendingMove) -> bool {
        let cost = geometry::movement_cost(&pending.from, &pending.to, pending.difficult_terrain);
        let still_active = self.state.active_entity.as_ref() == Some(&pending.entity);
        let allowed = self
            .roster
            .get(&pending.entity)
            .is_some_and(|mover| mover.position == pending.from && Self::check_move(mover, cost).is_ok());

        if still_active && allowed {
            self.apply_move(&pending.entity, pending.from, pending.to, pending.difficult_terrain, cost);
            return true;
        }

        let round = self.state.round;
        let description = format!("movement of {} to ({}, {}, {}) is cancelled", pending.entity, pending.to.x, pending.to.y, pending.to.z);
        self.log.push(CombatLogEntry::new(round, pending.entity.clone(), "Move", description));
        self.emit(CombatEvent::MoveDiscarded { entity_id: pending.entity, to: pending.to });
        false
    }

    /* ---------------- actions ---------------- */

    pub fn use_action(
        &mut self,
        entity_id: &EntityId,
        action: &CombatAction,
        target_id: Option<&EntityId>,
    ) -> Result<ActionReport, CombatError> {
        self.ensure_active()?;
        let actor = self
            .roster
            .get(entity_id)
            .ok_or_else(|| CombatError::EntityNotFound(entity_id.clone()))?;

        if action.action_type != ActionType::Reaction {
            if self.state.active_entity.as_ref() != Some(entity_id) {
                return Err(CombatError::NotYourTurn(entity_id.clone()));
            }
            if self.state.awaiting_reactions {
                return Err(CombatError::AwaitingReactions);
            }
        }
        if !rules::can_use_action(actor, action.action_type) {
            return Err(CombatError::CannotUse(action.action_type));
        }
        if let Some(&ready_round) = actor.cooldowns.get(&action.id) {
            if ready_round > self.state.round {
                return Err(CombatError::OnCooldown { ready_round });
            }
        }

        let aim = match target_id {
            Some(id) => Some(
                self.roster
                    .get(id)
                    .ok_or_else(|| CombatError::EntityNotFound(id.clone()))?
                    .position,
            ),
            None => None,
        };
        if let Some(aim) = aim {
            let placed_on_caster = action.aoe.as_ref().is_some_and(|a| a.shape.emanates_from_caster());
            if !placed_on_caster && !rules::target_in_reach(action.range, &actor.position, &aim) {
                return Err(CombatError::OutOfRange { range: action.range });
            }
        }

        Ok(self.execute_action(entity_id, action, action.action_type, target_id, aim))
    }

    /// Spend the slot and resolve the action. Validation is the caller's job.
    fn execute_action(
        &mut self,
        actor_id: &EntityId,
        action: &CombatAction,
        slot: ActionType,
        target_id: Option<&EntityId>,
        aim: Option<Position>,
    ) -> ActionReport {
        let round = self.state.round;
        let Some(actor) = self.roster.get_mut(actor_id) else {
            return ActionReport { actor: actor_id.clone(), action: action.name.clone(), outcomes: Vec::new() };
        };
        match slot {
            ActionType::Action => actor.usage.action = true,
            ActionType::Bonus => actor.usage.bonus_action = true,
            ActionType::Reaction => actor.usage.reaction = true,
        }
        if let Some(cooldown) = action.cooldown {
            actor.cooldowns.insert(action.id.clone(), round + cooldown);
        }
        let attacker = actor.clone();

        let aim = aim.or_else(|| target_id.and_then(|id| self.roster.get(id)).map(|t| t.position));
        let targets: Vec<EntityId> = match (&action.aoe, target_id) {
            (Some(template), _) => template
                .anchored(attacker.position, aim)
                .affected_entities(self.roster.values()),
            (None, Some(id)) => vec![id.clone()],
            (None, None) if action.range == -1 => vec![actor_id.clone()],
            (None, None) => Vec::new(),
        };

        let mut messages = Vec::new();
        let base_damage = action.damage.as_deref().map(|f| self.dice.roll_damage(f));
        let mut rolls: Vec<i32> = base_damage
            .iter()
            .flat_map(|d| d.rolls.iter().map(|r| *r as i32))
            .collect();

        let mut outcomes = Vec::with_capacity(targets.len());
        for target in &targets {
            let outcome = self.resolve_on_target(&attacker, action, target, base_damage.as_ref(), &mut messages);
            if let Some(attack) = &outcome.attack {
                rolls.push(attack.roll.roll as i32);
            }
            if let Some(save) = &outcome.save {
                rolls.push(save.roll.roll as i32);
            }
            outcomes.push(outcome);
        }

        let report = ActionReport { actor: actor_id.clone(), action: action.name.clone(), outcomes };
        let damage = report.total_damage();
        let description = if messages.is_empty() {
            format!("{} uses {}", attacker.name, action.name)
        } else {
            format!("{} uses {}: {}", attacker.name, action.name, messages.join("; "))
        };
        let mut entry = CombatLogEntry::new(round, actor_id.clone(), action.name.clone(), description);
        entry.targets = report.targets();
        entry.rolls = rolls;
        entry.damage = base_damage.map(|_| damage);
        self.log.push(entry);
        self.touch();

        debug!(actor = %actor_id, action = %action.name, %slot, damage, "action resolved");
        self.emit(CombatEvent::ActionUsed {
            entity_id: actor_id.clone(),
            action: action.name.clone(),
            targets: report.targets(),
            damage,
        });
        report
    }

    fn resolve_on_target(
        &mut self,
        attacker: &CombatEntity,
        action: &CombatAction,
        target_id: &EntityId,
        base_damage: Option<&DamageRoll>,
        messages: &mut Vec<String>,
    ) -> TargetOutcome {
        let mut outcome = TargetOutcome::new(target_id.clone());
        let Some(target) = self.roster.get(target_id) else {
            return outcome;
        };

        let mut lands = true;
        let mut crit = false;
        if let Some(bonus) = action.attack_bonus {
            let attack = checks::attack_roll(&mut self.dice, attacker, target, bonus, |m| messages.push(m));
            lands = attack.hit;
            crit = attack.crit;
            outcome.attack = Some(attack);
        }

        let mut full_effect = lands;
        let mut damage = base_damage.map(|d| d.total).unwrap_or(0);
        if lands {
            if let Some(spec) = &action.saving_throw {
                let save = checks::saving_throw(&mut self.dice, target, spec, |m| messages.push(m));
                if save.passed {
                    full_effect = false;
                    damage = if spec.half_on_success { damage / 2 } else { 0 };
                }
                outcome.save = Some(save);
            }
        } else {
            damage = 0;
        }

        if base_damage.is_some() && damage > 0 {
            if crit {
                damage += self.crit_bonus(action);
            }
            damage = (damage + rules::get_modifier(attacker, Stat::DamageRoll)).max(0);
        }

        if damage > 0 {
            let dealt = self.damage_entity(target_id, damage, messages);
            outcome.damage = dealt.absorbed + dealt.taken;
        }

        if full_effect {
            for condition in &action.applies_conditions {
                let stamped = condition.starting(self.state.round).with_source(attacker.id.as_str());
                if self.attach_condition(target_id, stamped, messages) {
                    outcome.conditions_applied.push(condition.key.clone());
                }
            }
        }
        outcome
    }

    /// Extra dice for a critical hit: the formula's dice again, without the modifier.
    fn crit_bonus(&mut self, action: &CombatAction) -> i32 {
        let dice = action
            .damage
            .as_deref()
            .and_then(|f| f.parse::<DamageDice>().ok())
            .unwrap_or(DamageDice::FALLBACK);
        let extra = self.dice.roll_dice(DamageDice { modifier: 0, ..dice });
        extra.total
    }

    fn damage_entity(&mut self, target_id: &EntityId, amount: i32, messages: &mut Vec<String>) -> DamageOutcome {
        let Some(target) = self.roster.get_mut(target_id) else {
            return DamageOutcome::default();
        };
        let dealt = life::apply_damage(target, amount, |m| messages.push(m));
        let (current, temporary) = (target.hit_points.current, target.hit_points.temporary);
        self.persist(target_id);
        self.emit(CombatEvent::HitPointsChanged { entity_id: target_id.clone(), current, temporary });
        dealt
    }

    fn attach_condition(&mut self, target_id: &EntityId, condition: Condition, messages: &mut Vec<String>) -> bool {
        let Some(target) = self.roster.get_mut(target_id) else {
            return false;
        };
        if target.is_dead {
            return false;
        }
        let key = condition.key.clone();
        conditions::apply_condition(&target.name, &mut target.conditions, condition, |m| messages.push(m));
        self.emit(CombatEvent::ConditionApplied { entity_id: target_id.clone(), key });
        true
    }

    /* ---------------- direct adjustments ---------------- */

    /// Attach a condition outside of an action (GM ruling, environment).
    pub fn apply_condition(&mut self, entity_id: &EntityId, condition: Condition) -> Result<(), CombatError> {
        if !self.roster.contains_key(entity_id) {
            return Err(CombatError::EntityNotFound(entity_id.clone()));
        }
        let mut messages = Vec::new();
        let stamped = condition.starting(self.state.round);
        self.attach_condition(entity_id, stamped, &mut messages);
        for m in messages {
            debug!("{}", m);
        }
        self.touch();
        Ok(())
    }

    pub fn remove_condition(&mut self, entity_id: &EntityId, key: &str) -> Result<bool, CombatError> {
        let entity = self
            .roster
            .get_mut(entity_id)
            .ok_or_else(|| CombatError::EntityNotFound(entity_id.clone()))?;
        let removed = conditions::remove_condition(&entity.name, &mut entity.conditions, key, |m| debug!("{}", m));
        if removed.is_empty() {
            return Ok(false);
        }
        self.touch();
        self.emit(CombatEvent::ConditionRemoved { entity_id: entity_id.clone(), key: key.to_string() });
        Ok(true)
    }

    pub fn apply_damage(&mut self, entity_id: &EntityId, amount: i32) -> Result<DamageOutcome, CombatError> {
        if !self.roster.contains_key(entity_id) {
            return Err(CombatError::EntityNotFound(entity_id.clone()));
        }
        let mut messages = Vec::new();
        let dealt = self.damage_entity(entity_id, amount, &mut messages);
        self.log.push(CombatLogEntry {
            damage: Some(dealt.absorbed + dealt.taken),
            ..CombatLogEntry::new(self.state.round, entity_id.clone(), "Damage", messages.join("; "))
        });
        self.touch();
        Ok(dealt)
    }

    pub fn heal(&mut self, entity_id: &EntityId, amount: i32) -> Result<i32, CombatError> {
        let entity = self
            .roster
            .get_mut(entity_id)
            .ok_or_else(|| CombatError::EntityNotFound(entity_id.clone()))?;
        let mut messages = Vec::new();
        let healed = life::heal(entity, amount, |m| messages.push(m));
        let (current, temporary) = (entity.hit_points.current, entity.hit_points.temporary);
        self.log.push(CombatLogEntry::new(self.state.round, entity_id.clone(), "Heal", messages.join("; ")));
        self.persist(entity_id);
        self.touch();
        self.emit(CombatEvent::HitPointsChanged { entity_id: entity_id.clone(), current, temporary });
        Ok(healed)
    }

    pub fn grant_temporary_hp(&mut self, entity_id: &EntityId, amount: i32) -> Result<(), CombatError> {
        let entity = self
            .roster
            .get_mut(entity_id)
            .ok_or_else(|| CombatError::EntityNotFound(entity_id.clone()))?;
        life::grant_temporary_hp(entity, amount, |m| debug!("{}", m));
        let (current, temporary) = (entity.hit_points.current, entity.hit_points.temporary);
        self.touch();
        self.emit(CombatEvent::HitPointsChanged { entity_id: entity_id.clone(), current, temporary });
        Ok(())
    }

    /// Roll initiative with the encounter's dice, for callers that do not
    /// bring their own values to [`Self::start_combat`].
    pub fn roll_initiative(&mut self, entities: &mut [CombatEntity]) {
        checks::roll_initiative(&mut self.dice, entities);
    }

    /* ---------------- plumbing ---------------- */

    fn ensure_active(&self) -> Result<(), CombatError> {
        if self.state.phase == Phase::Idle {
            return Err(CombatError::NoActiveEncounter);
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.state.last_updated = Utc::now();
    }

    fn emit(&mut self, event: CombatEvent) {
        self.bus.publish(&event);
    }

    /// Store failures are logged and swallowed; memory stays authoritative.
    fn persist(&mut self, entity_id: &EntityId) {
        let Some(store) = self.store.as_mut() else {
            return;
        };
        let Some(entity) = self.roster.get(entity_id) else {
            return;
        };
        let update = EntityStateUpdate::of(self.state.session_id, entity);
        if let Err(err) = store.save_entity_state(&update) {
            warn!(entity = %entity_id, error = %err, "failed to persist entity state");
        }
    }
}

/// Reactions an entity can offer when a foe leaves its reach: its own reaction
/// actions plus an opportunity attack for each melee attack it knows.
fn reaction_candidates(entity: &CombatEntity) -> Vec<CombatAction> {
    let own = entity
        .actions
        .iter()
        .filter(|a| a.action_type == ActionType::Reaction)
        .cloned();
    let opportunity = entity
        .actions
        .iter()
        .filter(|a| a.action_type != ActionType::Reaction && a.is_melee_attack())
        .map(CombatAction::as_opportunity_attack);
    own.chain(opportunity).collect()
}
