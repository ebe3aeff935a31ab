use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

// Restrictive foreign keys throughout: deletion order is a caller contract
// (votes -> options -> poll), never an automatic cascade.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS angler (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        name              TEXT NOT NULL,
        member            INTEGER NOT NULL DEFAULT 0,
        is_admin          INTEGER NOT NULL DEFAULT 0,
        dues_paid_through TEXT
    );",
    "CREATE TABLE IF NOT EXISTS poll (
        id                 INTEGER PRIMARY KEY AUTOINCREMENT,
        title              TEXT NOT NULL,
        poll_type          TEXT NOT NULL CHECK (poll_type IN ('generic', 'tournament_location')),
        event_id           INTEGER,
        starts_at          TEXT NOT NULL,
        closes_at          TEXT NOT NULL,
        created_by         INTEGER NOT NULL REFERENCES angler (id),
        time_created       TEXT NOT NULL,
        resolved_option_id INTEGER REFERENCES poll_option (id),
        resolved_at        TEXT,
        CHECK (closes_at > starts_at)
    );",
    "CREATE TABLE IF NOT EXISTS poll_option (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        poll_id     INTEGER NOT NULL REFERENCES poll (id),
        label       TEXT NOT NULL,
        lake_id     INTEGER,
        ramp_id     INTEGER,
        event_start TEXT,
        event_end   TEXT
    );",
    "CREATE TABLE IF NOT EXISTS poll_vote (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        poll_id          INTEGER NOT NULL REFERENCES poll (id),
        option_id        INTEGER NOT NULL REFERENCES poll_option (id),
        voter_id         INTEGER NOT NULL REFERENCES angler (id),
        cast_by_admin_id INTEGER REFERENCES angler (id),
        time_cast        TEXT NOT NULL,
        UNIQUE (poll_id, voter_id)
    );",
    "CREATE TABLE IF NOT EXISTS tournament (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        event_id    INTEGER,
        lake_id     INTEGER NOT NULL,
        ramp_id     INTEGER NOT NULL,
        poll_id     INTEGER NOT NULL UNIQUE REFERENCES poll (id),
        event_start TEXT NOT NULL,
        event_end   TEXT NOT NULL,
        completed   INTEGER NOT NULL DEFAULT 0
    );",
    "CREATE INDEX IF NOT EXISTS idx_poll_option_poll ON poll_option (poll_id);",
    "CREATE INDEX IF NOT EXISTS idx_poll_vote_poll ON poll_vote (poll_id);",
    "CREATE INDEX IF NOT EXISTS idx_poll_vote_option ON poll_vote (option_id);",
];

pub struct DBClient {
    conn: SqlitePool,
}

impl DBClient {
    pub async fn new(url: &str) -> Result<DBClient, sqlx::Error> {
        let opts = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // A single pooled connection: SQLite allows one writer at a time
        // anyway, and it keeps :memory: databases alive for the pool's life.
        let conn = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        let client = DBClient { conn };
        client.init_schema().await?;

        Ok(client)
    }

    pub async fn open_in_memory() -> Result<DBClient, sqlx::Error> {
        DBClient::new("sqlite::memory:").await
    }

    pub fn conn(&self) -> &SqlitePool {
        &self.conn
    }

    async fn init_schema(&self) -> Result<(), sqlx::Error> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.conn).await?;
        }

        Ok(())
    }
}
