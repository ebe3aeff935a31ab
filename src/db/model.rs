use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{query, Executor, Row, Sqlite, SqlitePool};
use tokio_stream::StreamExt;

use crate::db::schema::{
    Angler, NewPoll, OptionCount, Poll, PollOption, PollType, PollVote, Tournament,
};
use crate::error::EngineError;

fn poll_from_row(row: &SqliteRow) -> Result<Poll, sqlx::Error> {
    let poll_type: String = row.try_get("poll_type")?;
    let poll_type = PollType::parse(&poll_type)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown poll_type '{}'", poll_type).into()))?;

    Ok(Poll {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        poll_type,
        event_id: row.try_get("event_id")?,
        starts_at: row.try_get("starts_at")?,
        closes_at: row.try_get("closes_at")?,
        created_by: row.try_get("created_by")?,
        time_created: row.try_get("time_created")?,
        resolved_option_id: row.try_get("resolved_option_id")?,
        resolved_at: row.try_get("resolved_at")?,
        options: Vec::new(),
    })
}

fn option_from_row(row: &SqliteRow) -> Result<PollOption, sqlx::Error> {
    Ok(PollOption {
        id: row.try_get("id")?,
        poll_id: row.try_get("poll_id")?,
        label: row.try_get("label")?,
        lake_id: row.try_get("lake_id")?,
        ramp_id: row.try_get("ramp_id")?,
        event_start: row.try_get("event_start")?,
        event_end: row.try_get("event_end")?,
    })
}

fn vote_from_row(row: &SqliteRow) -> Result<PollVote, sqlx::Error> {
    Ok(PollVote {
        id: row.try_get("id")?,
        poll_id: row.try_get("poll_id")?,
        option_id: row.try_get("option_id")?,
        voter_id: row.try_get("voter_id")?,
        cast_by_admin_id: row.try_get("cast_by_admin_id")?,
        time_cast: row.try_get("time_cast")?,
    })
}

fn tournament_from_row(row: &SqliteRow) -> Result<Tournament, sqlx::Error> {
    Ok(Tournament {
        id: row.try_get("id")?,
        event_id: row.try_get("event_id")?,
        lake_id: row.try_get("lake_id")?,
        ramp_id: row.try_get("ramp_id")?,
        poll_id: row.try_get("poll_id")?,
        event_start: row.try_get("event_start")?,
        event_end: row.try_get("event_end")?,
        completed: row.try_get("completed")?,
    })
}

fn angler_from_row(row: &SqliteRow) -> Result<Angler, sqlx::Error> {
    Ok(Angler {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        member: row.try_get("member")?,
        is_admin: row.try_get("is_admin")?,
        dues_paid_through: row.try_get("dues_paid_through")?,
    })
}

pub async fn add_angler(
    conn: &SqlitePool,
    name: &str,
    member: bool,
    is_admin: bool,
    dues_paid_through: Option<NaiveDate>,
) -> Result<Angler, sqlx::Error> {
    let row = query(
        "INSERT INTO angler (name, member, is_admin, dues_paid_through)
         VALUES (?, ?, ?, ?)
         RETURNING id;",
    )
    .bind(name)
    .bind(member)
    .bind(is_admin)
    .bind(dues_paid_through)
    .fetch_one(conn)
    .await?;

    Ok(Angler {
        id: row.try_get("id")?,
        name: name.to_owned(),
        member,
        is_admin,
        dues_paid_through,
    })
}

pub async fn get_angler(conn: &SqlitePool, id: i64) -> Result<Option<Angler>, sqlx::Error> {
    let row = query("SELECT * FROM angler WHERE id = ?;")
        .bind(id)
        .fetch_optional(conn)
        .await?;

    match row {
        None => Ok(None),
        Some(row) => Ok(Some(angler_from_row(&row)?)),
    }
}

pub async fn add_poll(conn: &SqlitePool, new: &NewPoll) -> Result<Poll, EngineError> {
    new.validate()?;

    let mut tx = conn.begin().await?;

    let time_created = Utc::now();
    let row = query(
        "INSERT INTO poll (title, poll_type, event_id, starts_at, closes_at, created_by, time_created)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         RETURNING id;",
    )
    .bind(&new.title)
    .bind(new.poll_type.as_str())
    .bind(new.event_id)
    .bind(new.starts_at)
    .bind(new.closes_at)
    .bind(new.created_by)
    .bind(time_created)
    .fetch_one(&mut *tx)
    .await?;
    let poll_id: i64 = row.try_get("id")?;

    let mut options = Vec::new();

    for opt in &new.options {
        let (lake_id, ramp_id, event_start, event_end) = match opt.payload {
            Some(p) => (
                Some(p.lake_id),
                Some(p.ramp_id),
                Some(p.event_start),
                Some(p.event_end),
            ),
            None => (None, None, None, None),
        };

        let row = query(
            "INSERT INTO poll_option (poll_id, label, lake_id, ramp_id, event_start, event_end)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING id;",
        )
        .bind(poll_id)
        .bind(&opt.label)
        .bind(lake_id)
        .bind(ramp_id)
        .bind(event_start)
        .bind(event_end)
        .fetch_one(&mut *tx)
        .await?;

        options.push(PollOption {
            id: row.try_get("id")?,
            poll_id,
            label: opt.label.clone(),
            lake_id,
            ramp_id,
            event_start,
            event_end,
        });
    }

    tx.commit().await?;

    Ok(Poll {
        id: poll_id,
        title: new.title.clone(),
        poll_type: new.poll_type,
        event_id: new.event_id,
        starts_at: new.starts_at,
        closes_at: new.closes_at,
        created_by: new.created_by,
        time_created,
        resolved_option_id: None,
        resolved_at: None,
        options,
    })
}

pub async fn get_poll(conn: &SqlitePool, id: i64) -> Result<Option<Poll>, sqlx::Error> {
    let row = query("SELECT * FROM poll WHERE id = ?;")
        .bind(id)
        .fetch_optional(conn)
        .await?;

    let mut poll = match row {
        None => return Ok(None),
        Some(row) => poll_from_row(&row)?,
    };

    let mut stream = query("SELECT * FROM poll_option WHERE poll_id = ? ORDER BY id;")
        .bind(id)
        .fetch(conn);

    while let Some(row) = stream.try_next().await? {
        poll.options.push(option_from_row(&row)?);
    }

    Ok(Some(poll))
}

pub async fn get_option<'e, E>(
    conn: E,
    poll_id: i64,
    option_id: i64,
) -> Result<Option<PollOption>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = query("SELECT * FROM poll_option WHERE id = ? AND poll_id = ?;")
        .bind(option_id)
        .bind(poll_id)
        .fetch_optional(conn)
        .await?;

    match row {
        None => Ok(None),
        Some(row) => Ok(Some(option_from_row(&row)?)),
    }
}

/// The single write path for votes: one atomic statement keyed on the
/// store's (poll_id, voter_id) uniqueness. The last committed writer for a
/// given voter wins; there is no read-before-write to race against.
pub async fn upsert_vote<'e, E>(
    conn: E,
    poll_id: i64,
    option_id: i64,
    voter_id: i64,
    cast_by_admin_id: Option<i64>,
    time_cast: DateTime<Utc>,
) -> Result<PollVote, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = query(
        "INSERT INTO poll_vote (poll_id, option_id, voter_id, cast_by_admin_id, time_cast)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT (poll_id, voter_id) DO UPDATE
             SET option_id        = excluded.option_id,
                 cast_by_admin_id = excluded.cast_by_admin_id,
                 time_cast        = excluded.time_cast
         RETURNING *;",
    )
    .bind(poll_id)
    .bind(option_id)
    .bind(voter_id)
    .bind(cast_by_admin_id)
    .bind(time_cast)
    .fetch_one(conn)
    .await?;

    vote_from_row(&row)
}

pub async fn get_vote(
    conn: &SqlitePool,
    poll_id: i64,
    voter_id: i64,
) -> Result<Option<PollVote>, sqlx::Error> {
    let row = query("SELECT * FROM poll_vote WHERE poll_id = ? AND voter_id = ?;")
        .bind(poll_id)
        .bind(voter_id)
        .fetch_optional(conn)
        .await?;

    match row {
        None => Ok(None),
        Some(row) => Ok(Some(vote_from_row(&row)?)),
    }
}

/// Vote counts per option, most votes first; ties order by option id so the
/// first row is always the deterministic winner.
pub async fn tally_votes<'e, E>(conn: E, poll_id: i64) -> Result<Vec<OptionCount>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = query(
        "SELECT option_id, COUNT(*) AS votes
         FROM poll_vote
         WHERE poll_id = ?
         GROUP BY option_id
         ORDER BY votes DESC, option_id ASC;",
    )
    .bind(poll_id)
    .fetch_all(conn)
    .await?;

    let mut counts = Vec::new();
    for row in &rows {
        counts.push(OptionCount {
            option_id: row.try_get("option_id")?,
            votes: row.try_get("votes")?,
        });
    }

    Ok(counts)
}

/// Claim the resolution witness. Returns false when another resolver
/// already claimed it; the conditional update is what serializes racing
/// `ResolveIfClosed` callers.
pub async fn mark_resolved<'e, E>(
    conn: E,
    poll_id: i64,
    winning_option_id: Option<i64>,
    resolved_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let r = query(
        "UPDATE poll
         SET resolved_option_id = ?, resolved_at = ?
         WHERE id = ? AND resolved_at IS NULL;",
    )
    .bind(winning_option_id)
    .bind(resolved_at)
    .bind(poll_id)
    .execute(conn)
    .await?;

    Ok(r.rows_affected() > 0)
}

pub async fn get_tournament_for_poll(
    conn: &SqlitePool,
    poll_id: i64,
) -> Result<Option<Tournament>, sqlx::Error> {
    let row = query("SELECT * FROM tournament WHERE poll_id = ?;")
        .bind(poll_id)
        .fetch_optional(conn)
        .await?;

    match row {
        None => Ok(None),
        Some(row) => Ok(Some(tournament_from_row(&row)?)),
    }
}

pub async fn list_closed_unresolved(
    conn: &SqlitePool,
    now: DateTime<Utc>,
) -> Result<Vec<Poll>, sqlx::Error> {
    let mut stream = query(
        "SELECT * FROM poll
         WHERE resolved_at IS NULL AND closes_at <= ?
         ORDER BY closes_at;",
    )
    .bind(now)
    .fetch(conn);

    let mut result = Vec::new();
    while let Some(row) = stream.try_next().await? {
        result.push(poll_from_row(&row)?);
    }

    for poll in &mut result {
        let mut stream = query("SELECT * FROM poll_option WHERE poll_id = ? ORDER BY id;")
            .bind(poll.id)
            .fetch(conn);

        while let Some(row) = stream.try_next().await? {
            poll.options.push(option_from_row(&row)?);
        }
    }

    Ok(result)
}

/// Admin edit of the vote window, allowed only while the poll has not yet
/// opened (which also means no votes can exist).
pub async fn reschedule_poll(
    conn: &SqlitePool,
    poll_id: i64,
    starts_at: DateTime<Utc>,
    closes_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    if closes_at <= starts_at {
        return Err(EngineError::InvalidPoll(format!(
            "closes_at ({}) must be after starts_at ({})",
            closes_at, starts_at
        )));
    }

    let poll = get_poll(conn, poll_id)
        .await?
        .ok_or(EngineError::PollNotFound(poll_id))?;

    if now >= poll.starts_at {
        return Err(EngineError::PollAlreadyOpen(poll_id));
    }

    query("UPDATE poll SET starts_at = ?, closes_at = ? WHERE id = ?;")
        .bind(starts_at)
        .bind(closes_at)
        .bind(poll_id)
        .execute(conn)
        .await?;

    Ok(())
}

/// Remove an option nothing has voted for. Options with votes are
/// immutable; the NOT EXISTS guard and the restrictive foreign key from
/// poll_vote both refuse to orphan a cast vote.
pub async fn remove_option(
    conn: &SqlitePool,
    poll_id: i64,
    option_id: i64,
) -> Result<(), EngineError> {
    let r = query(
        "DELETE FROM poll_option
         WHERE id = ? AND poll_id = ?
           AND NOT EXISTS (SELECT 1 FROM poll_vote WHERE option_id = poll_option.id);",
    )
    .bind(option_id)
    .bind(poll_id)
    .execute(conn)
    .await?;

    if r.rows_affected() > 0 {
        return Ok(());
    }

    match get_option(conn, poll_id, option_id).await? {
        Some(_) => Err(EngineError::OptionHasVotes { option_id }),
        None => Err(EngineError::OptionNotFound { poll_id, option_id }),
    }
}

/// Cascading delete in the order the restrictive foreign keys demand:
/// votes, then options, then the poll itself. A poll that has provisioned
/// a tournament is referenced by it and cannot be deleted.
pub async fn delete_poll(conn: &SqlitePool, poll_id: i64) -> Result<bool, sqlx::Error> {
    let mut tx = conn.begin().await?;

    query("DELETE FROM poll_vote WHERE poll_id = ?;")
        .bind(poll_id)
        .execute(&mut *tx)
        .await?;

    // resolved_option_id references poll_option; clear it before the options go.
    query("UPDATE poll SET resolved_option_id = NULL WHERE id = ?;")
        .bind(poll_id)
        .execute(&mut *tx)
        .await?;

    query("DELETE FROM poll_option WHERE poll_id = ?;")
        .bind(poll_id)
        .execute(&mut *tx)
        .await?;

    let r = query("DELETE FROM poll WHERE id = ?;")
        .bind(poll_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(r.rows_affected() > 0)
}
