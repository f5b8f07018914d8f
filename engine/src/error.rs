use thiserror::Error;

use crate::combat::actions::ActionType;
use crate::entity::EntityId;
use crate::geometry::Position;

/// Validation failures returned by the state machine. None of these are fatal:
/// the encounter state is untouched when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CombatError {
    #[error("Entity not found")]
    EntityNotFound(EntityId),

    #[error("Not your turn")]
    NotYourTurn(EntityId),

    #[error("Cannot use {0}")]
    CannotUse(ActionType),

    #[error("Not enough movement")]
    NotEnoughMovement { needed: u32, remaining: u32 },

    #[error("Movement is not allowed")]
    MovementForbidden,

    #[error("Entity is not at the starting position")]
    WrongStartingPosition { actual: Position, given: Position },

    #[error("Awaiting reaction resolution")]
    AwaitingReactions,

    #[error("No active encounter")]
    NoActiveEncounter,

    #[error("Encounter already in progress")]
    AlreadyActive,

    #[error("Encounter needs at least one combatant")]
    EmptyRoster,

    #[error("Duplicate entity id {0}")]
    DuplicateEntity(EntityId),

    #[error("Target out of range")]
    OutOfRange { range: i32 },

    #[error("Action on cooldown until round {ready_round}")]
    OnCooldown { ready_round: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    #[error("formula `{0}` has no die separator")]
    MissingDie(String),
    #[error("formula `{0}` has an invalid die count")]
    BadCount(String),
    #[error("formula `{0}` has an invalid die size")]
    BadSides(String),
    #[error("formula `{0}` has an invalid modifier")]
    BadModifier(String),
    #[error("formula `{0}` rolls no dice")]
    Empty(String),
    #[error("formula `{0}` rolls more dice than the table allows")]
    TooLarge(String),
}
