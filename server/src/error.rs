//! Typed failures for request validation and server startup.
//!
//! A `Rejection` never reaches the client: the dispatcher logs it and the
//! requester simply observes no effect.

use shared::{ObjectId, ParticipantId, Role};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum Rejection {
    #[error("connection {connection} has no authority over actor {actor}")]
    AuthorityViolation { connection: u32, actor: u32 },

    #[error("authoritative field of participant {0} cannot be written by a connection")]
    ReadOnlyField(ParticipantId),

    #[error("participant {0} is not alive")]
    NotAlive(ParticipantId),

    #[error("participant {participant} has role {role:?}")]
    WrongRole { participant: ParticipantId, role: Role },

    #[error("participant {participant} is out of range of object {object}")]
    OutOfRange {
        participant: ParticipantId,
        object: ObjectId,
    },

    #[error("object {0} cannot be written by a connection")]
    ReadOnlyObject(ObjectId),

    #[error("no object with id {0}")]
    UnknownObject(ObjectId),

    #[error("no participant bound to connection {0}")]
    UnknownParticipant(u32),

    #[error("request has no effect")]
    NoChange,

    #[error("object {0} is mid-transition")]
    InTransition(ObjectId),

    #[error("match is not running")]
    MatchNotRunning,

    #[error("a match is already in progress")]
    MatchInProgress,

    #[error("exits are locked until every key is found")]
    ExitsLocked,

    #[error("participant is lit")]
    Lit,

    #[error("battery is empty")]
    BatteryEmpty,

    #[error("station {0} is busy")]
    StationBusy(ObjectId),
}

impl Rejection {
    /// Stale or duplicate requests are routine and only worth a debug line.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            Rejection::NoChange | Rejection::InTransition(_) | Rejection::MatchNotRunning
        )
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("network error: {0}")]
    Io(#[from] std::io::Error),

    #[error("packet encoding error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("invalid level file: {0}")]
    Level(#[from] serde_json::Error),
}
