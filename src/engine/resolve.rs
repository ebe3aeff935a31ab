use chrono::{DateTime, Utc};
use evlog::meta;
use sqlx::SqlitePool;

use crate::db::model;
use crate::db::schema::{Poll, PollType};
use crate::engine::provision;
use crate::error::{is_unique_violation, EngineError};
use crate::runtime::get_logger;

pub enum ResolutionOutcome {
    /// The close time has not passed yet; nothing to do. Callers poll
    /// lazily, so this is an ordinary outcome, not an error.
    NotYetClosed { closes_at: DateTime<Utc> },
    Resolved(Resolution),
}

#[derive(Debug)]
pub struct Resolution {
    pub poll_id: i64,
    /// None when the poll closed with no votes at all.
    pub winning_option_id: Option<i64>,
    /// Set for tournament_location polls that produced a winner.
    pub tournament_id: Option<i64>,
    /// False when this call observed a resolution recorded earlier.
    pub newly_resolved: bool,
}

/// Tally a closed poll and, for tournament_location polls, materialize its
/// Tournament exactly once. Safe to call any number of times, from any
/// number of racing callers; losers of the witness claim return the
/// winner's recorded result.
pub async fn resolve_if_closed(
    conn: &SqlitePool,
    poll_id: i64,
) -> Result<ResolutionOutcome, EngineError> {
    resolve_if_closed_at(conn, poll_id, Utc::now()).await
}

pub async fn resolve_if_closed_at(
    conn: &SqlitePool,
    poll_id: i64,
    now: DateTime<Utc>,
) -> Result<ResolutionOutcome, EngineError> {
    let poll = model::get_poll(conn, poll_id)
        .await?
        .ok_or(EngineError::PollNotFound(poll_id))?;

    if !poll.is_closed(now) {
        return Ok(ResolutionOutcome::NotYetClosed {
            closes_at: poll.closes_at,
        });
    }

    if poll.resolved_at.is_some() {
        return Ok(ResolutionOutcome::Resolved(
            recorded_resolution(conn, &poll).await?,
        ));
    }

    // Tally, claim the witness, and provision in one transaction: "votes
    // tallied" and "tournament created" cannot diverge under a crash or a
    // concurrent retry.
    let mut tx = conn.begin().await?;

    let tally = model::tally_votes(&mut *tx, poll_id).await?;
    // tally_votes orders by count desc, then option id asc: the strict
    // maximum wins, and ties break to the earliest-created option.
    let winning_option_id = tally.first().map(|c| c.option_id);

    let claimed = model::mark_resolved(&mut *tx, poll_id, winning_option_id, now).await?;
    if !claimed {
        // Another resolver committed between our read and the claim.
        tx.rollback().await?;
        return lost_race(conn, poll_id).await;
    }

    let mut tournament_id = None;

    if poll.poll_type == PollType::TournamentLocation {
        if let Some(option_id) = winning_option_id {
            let option = model::get_option(&mut *tx, poll_id, option_id)
                .await?
                .ok_or(EngineError::OptionNotFound { poll_id, option_id })?;
            let payload = option.payload().ok_or_else(|| {
                EngineError::InvalidPoll(format!(
                    "winning option {} of tournament_location poll {} has no location payload",
                    option_id, poll_id
                ))
            })?;

            match provision::provision(&mut tx, poll_id, poll.event_id, &payload).await {
                Ok(id) => tournament_id = Some(id),
                Err(e) if is_unique_violation(&e) => {
                    // UNIQUE(poll_id) backstop fired: someone else provisioned.
                    tx.rollback().await?;
                    return lost_race(conn, poll_id).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    tx.commit().await?;

    get_logger().info("Poll resolved.", meta! {
        "PollID" => poll_id,
        "WinningOptionID" => winning_option_id.unwrap_or(-1),
        "Votes" => tally.iter().map(|c| c.votes).sum::<i64>(),
    });

    Ok(ResolutionOutcome::Resolved(Resolution {
        poll_id,
        winning_option_id,
        tournament_id,
        newly_resolved: true,
    }))
}

/// Build a Resolution from the stored witness without re-tallying.
async fn recorded_resolution(conn: &SqlitePool, poll: &Poll) -> Result<Resolution, EngineError> {
    let tournament_id = match poll.poll_type {
        PollType::TournamentLocation => model::get_tournament_for_poll(conn, poll.id)
            .await?
            .map(|t| t.id),
        PollType::Generic => None,
    };

    Ok(Resolution {
        poll_id: poll.id,
        winning_option_id: poll.resolved_option_id,
        tournament_id,
        newly_resolved: false,
    })
}

async fn lost_race(conn: &SqlitePool, poll_id: i64) -> Result<ResolutionOutcome, EngineError> {
    let poll = model::get_poll(conn, poll_id)
        .await?
        .ok_or(EngineError::PollNotFound(poll_id))?;

    if poll.resolved_at.is_none() {
        // The claim said someone resolved this poll, but no witness exists.
        return Err(EngineError::ResolutionConflict(poll_id));
    }

    Ok(ResolutionOutcome::Resolved(
        recorded_resolution(conn, &poll).await?,
    ))
}
