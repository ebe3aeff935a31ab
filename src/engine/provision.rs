use sqlx::{query, Row, Sqlite, Transaction};

use crate::db::schema::LocationPayload;

/// Create the Tournament row the results subsystem will read, inside the
/// caller's tally transaction so the tally and the tournament commit or
/// roll back together. UNIQUE(poll_id) backstops the resolution engine's
/// own idempotency check.
pub async fn provision(
    tx: &mut Transaction<'_, Sqlite>,
    poll_id: i64,
    event_id: Option<i64>,
    payload: &LocationPayload,
) -> Result<i64, sqlx::Error> {
    let row = query(
        "INSERT INTO tournament (event_id, lake_id, ramp_id, poll_id, event_start, event_end, completed)
         VALUES (?, ?, ?, ?, ?, ?, FALSE)
         RETURNING id;",
    )
    .bind(event_id)
    .bind(payload.lake_id)
    .bind(payload.ramp_id)
    .bind(poll_id)
    .bind(payload.event_start)
    .bind(payload.event_end)
    .fetch_one(&mut **tx)
    .await?;

    row.try_get("id")
}
