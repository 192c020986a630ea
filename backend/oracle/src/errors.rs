//! Application-wide error types.

use ledger_api::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The evidence source was unreachable, timed out or answered badly.
    #[error("Evidence fetch failed: {0}")]
    ExternalFetch(String),

    /// Project metadata is not sufficient to evaluate a milestone.
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("No verification strategy for category {0:?}")]
    UnknownCategory(String),

    /// The ledger could not be reached or returned something unreadable.
    #[error("Ledger request failed: {0}")]
    Submission(String),

    /// The ledger processed the request and refused it.
    #[error("Ledger rejected request ({code}): {message}")]
    Rejected {
        kind: ErrorKind,
        code: String,
        message: String,
    },
}

impl OracleError {
    /// Another attestation won the race; nothing left to do.
    pub fn is_already_completed(&self) -> bool {
        matches!(self, OracleError::Rejected { code, .. } if code == "already_completed")
    }
}

pub type Result<T> = std::result::Result<T, OracleError>;
