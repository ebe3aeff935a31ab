use chrono::{DateTime, NaiveDate, Utc};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollType {
    Generic,
    TournamentLocation,
}

impl PollType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollType::Generic => "generic",
            PollType::TournamentLocation => "tournament_location",
        }
    }

    pub fn parse(s: &str) -> Option<PollType> {
        match s {
            "generic" => Some(PollType::Generic),
            "tournament_location" => Some(PollType::TournamentLocation),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct Poll {
    pub id: i64,
    pub title: String,
    pub poll_type: PollType,
    pub event_id: Option<i64>,
    pub starts_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
    pub created_by: i64,
    pub time_created: DateTime<Utc>,
    pub resolved_option_id: Option<i64>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub options: Vec<PollOption>,
}

impl Poll {
    /// Open/closed is derived from the clock, never stored: [starts_at, closes_at).
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now < self.closes_at
    }

    pub fn is_closed(&self, now: DateTime<Utc>) -> bool {
        now >= self.closes_at
    }
}

#[derive(Debug)]
pub struct PollOption {
    pub id: i64,
    pub poll_id: i64,
    pub label: String,
    pub lake_id: Option<i64>,
    pub ramp_id: Option<i64>,
    pub event_start: Option<DateTime<Utc>>,
    pub event_end: Option<DateTime<Utc>>,
}

impl PollOption {
    /// The candidate lake/ramp/time triple; present on every option of a
    /// tournament_location poll, absent on generic poll options.
    pub fn payload(&self) -> Option<LocationPayload> {
        match (self.lake_id, self.ramp_id, self.event_start, self.event_end) {
            (Some(lake_id), Some(ramp_id), Some(event_start), Some(event_end)) => {
                Some(LocationPayload {
                    lake_id,
                    ramp_id,
                    event_start,
                    event_end,
                })
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationPayload {
    pub lake_id: i64,
    pub ramp_id: i64,
    pub event_start: DateTime<Utc>,
    pub event_end: DateTime<Utc>,
}

#[derive(Debug)]
pub struct PollVote {
    pub id: i64,
    pub poll_id: i64,
    pub option_id: i64,
    pub voter_id: i64,
    /// Set when an admin cast this vote on behalf of a different angler.
    pub cast_by_admin_id: Option<i64>,
    pub time_cast: DateTime<Utc>,
}

#[derive(Debug)]
pub struct Tournament {
    pub id: i64,
    pub event_id: Option<i64>,
    pub lake_id: i64,
    pub ramp_id: i64,
    pub poll_id: i64,
    pub event_start: DateTime<Utc>,
    pub event_end: DateTime<Utc>,
    pub completed: bool,
}

/// Membership data owned by the out-of-scope club system; read-only here.
#[derive(Debug)]
pub struct Angler {
    pub id: i64,
    pub name: String,
    pub member: bool,
    pub is_admin: bool,
    pub dues_paid_through: Option<NaiveDate>,
}

#[derive(Debug)]
pub struct OptionCount {
    pub option_id: i64,
    pub votes: i64,
}

#[derive(Debug)]
pub struct NewPoll {
    pub title: String,
    pub poll_type: PollType,
    pub event_id: Option<i64>,
    pub starts_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
    pub created_by: i64,
    pub options: Vec<NewPollOption>,
}

#[derive(Debug)]
pub struct NewPollOption {
    pub label: String,
    pub payload: Option<LocationPayload>,
}

impl NewPoll {
    /// The contract the admin-facing creation flow must satisfy: a vote
    /// window that actually opens before it closes, at least one option,
    /// and location payloads present iff this is a tournament_location poll.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.closes_at <= self.starts_at {
            return Err(EngineError::InvalidPoll(format!(
                "closes_at ({}) must be after starts_at ({})",
                self.closes_at, self.starts_at
            )));
        }

        if self.options.is_empty() {
            return Err(EngineError::InvalidPoll(
                "a poll must have at least one option".to_owned(),
            ));
        }

        for opt in &self.options {
            if opt.label.trim().is_empty() {
                return Err(EngineError::InvalidPoll(
                    "option labels may not be empty".to_owned(),
                ));
            }

            match (self.poll_type, &opt.payload) {
                (PollType::TournamentLocation, None) => {
                    return Err(EngineError::InvalidPoll(format!(
                        "option '{}' of a tournament_location poll needs a lake/ramp/time payload",
                        opt.label
                    )));
                }
                (PollType::Generic, Some(_)) => {
                    return Err(EngineError::InvalidPoll(format!(
                        "option '{}' of a generic poll may not carry a location payload",
                        opt.label
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }
}
