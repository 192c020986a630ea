//! Database layer: migrations, genesis, the command journal and the event table.

use std::str::FromStr;

use ledger_api::EventRecord;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::errors::{NodeError, Result};
use crate::host::{Command, Genesis};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    // Make sure the file is created if it doesn't exist yet.
    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);

    // An in-memory database lives and dies with its connection.
    let pool = if url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?
    };

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Genesis
// ─────────────────────────────────────────────────────────

pub async fn load_genesis(pool: &SqlitePool) -> Result<Option<Genesis>> {
    let row: Option<(String, String, String)> = sqlx::query_as(
        "SELECT oracle, fee_allowance, submission_fee FROM genesis WHERE id = 1",
    )
    .fetch_optional(pool)
    .await?;
    row.map(|(oracle, fee_allowance, submission_fee)| -> Result<Genesis> {
        Ok(Genesis {
            oracle,
            fee_allowance: parse_amount(&fee_allowance)?,
            submission_fee: parse_amount(&submission_fee)?,
        })
    })
    .transpose()
}

pub async fn save_genesis(pool: &SqlitePool, genesis: &Genesis) -> Result<()> {
    sqlx::query(
        "INSERT INTO genesis (id, oracle, fee_allowance, submission_fee) VALUES (1, ?1, ?2, ?3)",
    )
    .bind(&genesis.oracle)
    .bind(genesis.fee_allowance.to_string())
    .bind(genesis.submission_fee.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

fn parse_amount(value: &str) -> Result<i128> {
    value
        .parse()
        .map_err(|_| NodeError::Config(format!("stored amount {value:?} is not an integer")))
}

// ─────────────────────────────────────────────────────────
// Journal
// ─────────────────────────────────────────────────────────

/// An accepted command with the ledger time it ran at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JournalEntry {
    pub signature: String,
    pub command: Command,
    pub timestamp: u64,
}

/// Every accepted command, in the order it was applied.
pub async fn load_journal(pool: &SqlitePool) -> Result<Vec<JournalEntry>> {
    let rows: Vec<(String, String, i64)> =
        sqlx::query_as("SELECT signature, command_json, timestamp FROM journal ORDER BY id ASC")
            .fetch_all(pool)
            .await?;
    rows.into_iter()
        .map(|(signature, command, timestamp)| -> Result<JournalEntry> {
            Ok(JournalEntry {
                signature,
                command: serde_json::from_str(&command)?,
                timestamp: timestamp as u64,
            })
        })
        .collect()
}

pub async fn signature_used(pool: &SqlitePool, signature: &str) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM journal WHERE signature = ?1")
        .bind(signature)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// Record an accepted command together with the events it produced.
///
/// Both writes happen in one transaction: either the journal gains the entry
/// and all of `events`, or nothing is written.
pub async fn commit(pool: &SqlitePool, entry: &JournalEntry, events: &[EventRecord]) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO journal (signature, principal, command_json, timestamp)
        VALUES (?1, ?2, ?3, ?4)
        "#,
    )
    .bind(&entry.signature)
    .bind(entry.command.principal())
    .bind(serde_json::to_string(&entry.command)?)
    .bind(entry.timestamp as i64)
    .execute(&mut *tx)
    .await?;

    for record in events {
        sqlx::query(
            r#"
            INSERT INTO events
                (seq, kind, project_id, milestone_index, payload_json, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(record.seq as i64)
        .bind(record.event.kind().as_str())
        .bind(record.event.project_id().map(|id| id as i64))
        .bind(record.event.milestone_index().map(i64::from))
        .bind(serde_json::to_string(&record.event)?)
        .bind(record.timestamp as i64)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────

/// At most `limit` events with `seq > after`, oldest first.
pub async fn events_after(pool: &SqlitePool, after: u64, limit: u32) -> Result<Vec<EventRecord>> {
    let rows: Vec<(i64, i64, String)> = sqlx::query_as(
        "SELECT seq, timestamp, payload_json FROM events WHERE seq > ?1 ORDER BY seq ASC LIMIT ?2",
    )
    .bind(after as i64)
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(seq, timestamp, payload)| -> Result<EventRecord> {
            Ok(EventRecord {
                seq: seq as u64,
                timestamp: timestamp as u64,
                event: serde_json::from_str(&payload)?,
            })
        })
        .collect()
}

pub async fn last_event_seq(pool: &SqlitePool) -> Result<u64> {
    let (seq,): (i64,) = sqlx::query_as("SELECT COALESCE(MAX(seq), 0) FROM events")
        .fetch_one(pool)
        .await?;
    Ok(seq as u64)
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
