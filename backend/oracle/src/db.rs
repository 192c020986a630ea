//! Database layer: migrations, the verification audit log and the event
//! subscription cursor.

use std::str::FromStr;

use chrono::Utc;
use ledger_api::Amount;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use tracing::info;

use crate::errors::Result;

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

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
// Verification attempts
// ─────────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AttemptOutcome {
    Verified,
    CriteriaNotMet,
    AlreadyCompleted,
    UnknownCategory,
    FetchFailed,
    SubmissionFailed,
    EvaluationFailed,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Verified => "verified",
            AttemptOutcome::CriteriaNotMet => "criteria_not_met",
            AttemptOutcome::AlreadyCompleted => "already_completed",
            AttemptOutcome::UnknownCategory => "unknown_category",
            AttemptOutcome::FetchFailed => "fetch_failed",
            AttemptOutcome::SubmissionFailed => "submission_failed",
            AttemptOutcome::EvaluationFailed => "evaluation_failed",
        }
    }
}

/// One row to append to the audit log.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub project_id: u64,
    pub milestone_index: u32,
    pub category: Option<String>,
    pub outcome: AttemptOutcome,
    pub detail: Option<String>,
    pub evidence_ref: Option<String>,
    pub release_amount: Option<Amount>,
    /// Ledger reference of the accepted attestation, e.g. `event:12`.
    pub state_ref: Option<String>,
}

impl NewAttempt {
    pub fn new(project_id: u64, milestone_index: u32, outcome: AttemptOutcome) -> Self {
        Self {
            project_id,
            milestone_index,
            category: None,
            outcome,
            detail: None,
            evidence_ref: None,
            release_amount: None,
            state_ref: None,
        }
    }
}

/// A stored verification attempt.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AttemptRecord {
    pub id: i64,
    pub project_id: i64,
    pub milestone_index: i64,
    pub category: Option<String>,
    pub outcome: String,
    pub detail: Option<String>,
    pub evidence_ref: Option<String>,
    /// Decimal string; amounts do not fit SQLite integers in general.
    pub release_amount: Option<String>,
    pub state_ref: Option<String>,
    pub attempted_at: i64,
}

/// Append an attempt to the audit log. Returns the new row id.
pub async fn record_attempt(pool: &SqlitePool, attempt: &NewAttempt) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO verification_attempts
            (project_id, milestone_index, category, outcome, detail,
             evidence_ref, release_amount, state_ref, attempted_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(attempt.project_id as i64)
    .bind(i64::from(attempt.milestone_index))
    .bind(&attempt.category)
    .bind(attempt.outcome.as_str())
    .bind(&attempt.detail)
    .bind(&attempt.evidence_ref)
    .bind(attempt.release_amount.map(|a| a.to_string()))
    .bind(&attempt.state_ref)
    .bind(Utc::now().timestamp())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Whether this oracle has already seen the milestone accepted by the ledger.
pub async fn has_verified(pool: &SqlitePool, project_id: u64, milestone_index: u32) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        SELECT id FROM verification_attempts
        WHERE project_id = ?1 AND milestone_index = ?2
          AND outcome IN ('verified', 'already_completed')
        LIMIT 1
        "#,
    )
    .bind(project_id as i64)
    .bind(i64::from(milestone_index))
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

/// Most recent attempts first.
pub async fn get_attempts(pool: &SqlitePool, limit: i64) -> Result<Vec<AttemptRecord>> {
    let rows = sqlx::query_as::<_, AttemptRecord>(
        r#"
        SELECT id, project_id, milestone_index, category, outcome, detail,
               evidence_ref, release_amount, state_ref, attempted_at
        FROM verification_attempts
        ORDER BY id DESC
        LIMIT ?1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Every attempt for one project, oldest first.
pub async fn get_attempts_for_project(
    pool: &SqlitePool,
    project_id: u64,
) -> Result<Vec<AttemptRecord>> {
    let rows = sqlx::query_as::<_, AttemptRecord>(
        r#"
        SELECT id, project_id, milestone_index, category, outcome, detail,
               evidence_ref, release_amount, state_ref, attempted_at
        FROM verification_attempts
        WHERE project_id = ?1
        ORDER BY id ASC
        "#,
    )
    .bind(project_id as i64)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────
// Event subscription state
// ─────────────────────────────────────────────────────────

/// Sequence number of the last ledger event fully handled.
pub async fn get_cursor(pool: &SqlitePool) -> Result<u64> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT last_seq FROM event_cursor WHERE id = 1")
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(seq,)| seq.max(0) as u64).unwrap_or(0))
}

/// Advance the cursor (it never moves back) and drop dedup claims it now
/// covers, in one transaction.
pub async fn save_cursor(pool: &SqlitePool, last_seq: u64) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO event_cursor (id, last_seq) VALUES (1, ?1)
        ON CONFLICT (id) DO UPDATE SET last_seq = MAX(last_seq, excluded.last_seq)
        "#,
    )
    .bind(last_seq as i64)
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        "DELETE FROM seen_events WHERE seq <= (SELECT last_seq FROM event_cursor WHERE id = 1)",
    )
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

/// Claim an event by its dedup key. Returns `false` if it was already
/// claimed or the cursor has already passed it.
pub async fn mark_seen(pool: &SqlitePool, dedup_key: &str, seq: u64, kind: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO seen_events (dedup_key, seq, kind)
        SELECT ?1, ?2, ?3
        WHERE ?2 > (SELECT last_seq FROM event_cursor WHERE id = 1)
        "#,
    )
    .bind(dedup_key)
    .bind(seq as i64)
    .bind(kind)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
