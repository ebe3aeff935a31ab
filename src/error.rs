use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

/// Broad failure classes; callers that only need to branch on "what kind
/// of thing went wrong" match on this instead of every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    PollState,
    Authorization,
    Conflict,
    Validation,
    Storage,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("poll {0} does not exist")]
    PollNotFound(i64),

    #[error("option {option_id} does not belong to poll {poll_id}")]
    OptionNotFound { poll_id: i64, option_id: i64 },

    #[error("angler {0} does not exist")]
    AnglerNotFound(i64),

    #[error("poll {poll_id} does not open until {starts_at}")]
    PollNotYetOpen {
        poll_id: i64,
        starts_at: DateTime<Utc>,
    },

    #[error("poll {poll_id} closed at {closes_at}")]
    PollClosed {
        poll_id: i64,
        closes_at: DateTime<Utc>,
    },

    #[error("poll {0} has already opened and may no longer be edited")]
    PollAlreadyOpen(i64),

    #[error("angler {0} is not a member")]
    NotAMember(i64),

    #[error("angler {0} may not cast a vote on behalf of another angler")]
    ProxyNotAdmin(i64),

    #[error("dues for angler {voter_id} are not current")]
    DuesLapsed {
        voter_id: i64,
        paid_through: Option<NaiveDate>,
    },

    #[error("invalid poll: {0}")]
    InvalidPoll(String),

    #[error("option {option_id} has votes referencing it and may not be removed")]
    OptionHasVotes { option_id: i64 },

    #[error("vote uniqueness rejected an atomic upsert for poll {poll_id}, voter {voter_id}")]
    VoteConflict { poll_id: i64, voter_id: i64 },

    #[error("poll {0} was resolved concurrently but no resolution witness was found")]
    ResolutionConflict(i64),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// A store-level uniqueness rejection, distinguished so the engine can map
/// it onto its Conflict taxonomy instead of a generic storage failure.
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation),
        _ => false,
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::PollNotFound(_)
            | EngineError::OptionNotFound { .. }
            | EngineError::AnglerNotFound(_) => ErrorKind::NotFound,

            EngineError::PollNotYetOpen { .. }
            | EngineError::PollClosed { .. }
            | EngineError::PollAlreadyOpen(_) => ErrorKind::PollState,

            EngineError::NotAMember(_)
            | EngineError::ProxyNotAdmin(_)
            | EngineError::DuesLapsed { .. } => ErrorKind::Authorization,

            EngineError::VoteConflict { .. } | EngineError::ResolutionConflict(_) => {
                ErrorKind::Conflict
            }

            EngineError::InvalidPoll(_) | EngineError::OptionHasVotes { .. } => {
                ErrorKind::Validation
            }

            EngineError::Db(_) => ErrorKind::Storage,
        }
    }
}
