use chrono::{DateTime, Utc};
use evlog::meta;
use sqlx::SqlitePool;

use crate::db::model;
use crate::db::schema::PollVote;
use crate::engine::eligibility;
use crate::error::{is_unique_violation, EngineError};
use crate::runtime::get_logger;

/// Cast or replace a vote on behalf of `voter_id`, acting as `actor_id`.
///
/// One flow serves both self-votes (`actor_id == voter_id`) and admin proxy
/// votes; the only branch is the eligibility rule and the recorded
/// `cast_by_admin_id`. Preconditions are checked in order (poll exists,
/// poll is open, option belongs to the poll, anglers exist, actor may vote
/// as voter) and each failure is a distinct typed error.
pub async fn cast_vote(
    conn: &SqlitePool,
    poll_id: i64,
    voter_id: i64,
    option_id: i64,
    actor_id: i64,
) -> Result<PollVote, EngineError> {
    cast_vote_at(conn, poll_id, voter_id, option_id, actor_id, Utc::now()).await
}

pub async fn cast_vote_at(
    conn: &SqlitePool,
    poll_id: i64,
    voter_id: i64,
    option_id: i64,
    actor_id: i64,
    now: DateTime<Utc>,
) -> Result<PollVote, EngineError> {
    let poll = model::get_poll(conn, poll_id)
        .await?
        .ok_or(EngineError::PollNotFound(poll_id))?;

    // Open/closed is derived from the clock at call time; the window is
    // half-open, so a vote at exactly closes_at is already too late.
    if now < poll.starts_at {
        return Err(EngineError::PollNotYetOpen {
            poll_id,
            starts_at: poll.starts_at,
        });
    }
    if now >= poll.closes_at {
        return Err(EngineError::PollClosed {
            poll_id,
            closes_at: poll.closes_at,
        });
    }

    if !poll.options.iter().any(|o| o.id == option_id) {
        return Err(EngineError::OptionNotFound { poll_id, option_id });
    }

    let actor = model::get_angler(conn, actor_id)
        .await?
        .ok_or(EngineError::AnglerNotFound(actor_id))?;

    if actor_id == voter_id {
        eligibility::check_eligible(&actor, &actor, now.date_naive())?;
    } else {
        let voter = model::get_angler(conn, voter_id)
            .await?
            .ok_or(EngineError::AnglerNotFound(voter_id))?;
        eligibility::check_eligible(&actor, &voter, now.date_naive())?;
    }

    let cast_by_admin_id = (actor_id != voter_id).then_some(actor_id);

    let vote = match model::upsert_vote(conn, poll_id, option_id, voter_id, cast_by_admin_id, now)
        .await
    {
        Ok(v) => v,
        Err(e) => {
            if is_unique_violation(&e) {
                // The upsert's conflict target no longer matches the store's
                // uniqueness constraint. Logged as a defect, never retried.
                get_logger().error_with_err(
                    "Vote upsert hit a uniqueness violation; store constraint misconfigured.",
                    &e,
                    meta! {
                        "PollID" => poll_id,
                        "VoterID" => voter_id,
                    },
                );
                return Err(EngineError::VoteConflict { poll_id, voter_id });
            }
            return Err(e.into());
        }
    };

    get_logger().info("Vote recorded.", meta! {
        "PollID" => poll_id,
        "OptionID" => option_id,
        "VoterID" => voter_id,
        "ActorID" => actor_id,
    });

    Ok(vote)
}
