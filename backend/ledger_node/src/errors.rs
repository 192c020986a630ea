//! Application-wide error types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ledger_api::{Amount, AuthError, ErrorBody, ErrorKind};
use milestone_escrow::Error as EscrowError;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{}", describe(.0))]
    Escrow(EscrowError),

    #[error("{0}")]
    Validation(String),

    #[error("missing signature header {0}")]
    Unsigned(&'static str),

    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("request was signed outside the accepted time window")]
    StaleSignature,

    #[error("request has already been processed")]
    Replayed,

    #[error("oracle fee balance {available} is below the submission fee {required}")]
    InsufficientFee { required: Amount, available: Amount },

    #[error("Escrow host error: {0}")]
    Host(String),

    #[error("{0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, NodeError>;

fn describe(e: &EscrowError) -> &'static str {
    match e {
        EscrowError::ProjectNotFound => "project not found",
        EscrowError::MilestoneNotFound => "milestone index out of range",
        EscrowError::AlreadyCompleted => "milestone already completed",
        EscrowError::InsufficientBalance => "escrow balance cannot cover the release",
        EscrowError::InvalidMilestones => "milestone percentages must be positive and sum to 100",
        EscrowError::NotAuthorized => "caller is not authorized for this operation",
        EscrowError::InvalidAmount => "amount must be positive",
        EscrowError::InactiveProject => "project is inactive",
        EscrowError::NothingToRelease => "milestone share rounds to nothing",
        EscrowError::ArithmeticOverflow => "amount overflows the ledger",
        EscrowError::InvalidProject => "project name, target or milestone titles are invalid",
        EscrowError::AlreadyInitialized => "escrow already initialized",
        EscrowError::NotInitialized => "escrow not initialized",
    }
}

/// Classification and stable code of an escrow rejection. `None` marks a
/// failure the caller cannot have caused.
fn classify(e: &EscrowError) -> Option<(ErrorKind, &'static str)> {
    Some(match e {
        EscrowError::ProjectNotFound => (ErrorKind::NotFound, "project_not_found"),
        EscrowError::MilestoneNotFound => (ErrorKind::NotFound, "index_out_of_range"),
        EscrowError::AlreadyCompleted => (ErrorKind::StateConflict, "already_completed"),
        EscrowError::InsufficientBalance => (ErrorKind::StateConflict, "insufficient_balance"),
        EscrowError::InactiveProject => (ErrorKind::StateConflict, "inactive_project"),
        EscrowError::NothingToRelease => (ErrorKind::StateConflict, "nothing_to_release"),
        EscrowError::NotAuthorized => (ErrorKind::Authorization, "unauthorized"),
        EscrowError::InvalidMilestones => (ErrorKind::Validation, "invalid_milestones"),
        EscrowError::InvalidAmount => (ErrorKind::Validation, "invalid_amount"),
        EscrowError::ArithmeticOverflow => (ErrorKind::Validation, "arithmetic_overflow"),
        EscrowError::InvalidProject => (ErrorKind::Validation, "validation"),
        EscrowError::AlreadyInitialized | EscrowError::NotInitialized => return None,
    })
}

fn status_of(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Authorization => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::StateConflict => StatusCode::CONFLICT,
    }
}

impl NodeError {
    fn classified(&self) -> Option<(ErrorKind, &'static str)> {
        match self {
            NodeError::Escrow(e) => classify(e),
            NodeError::Validation(_) => Some((ErrorKind::Validation, "validation")),
            NodeError::Unsigned(_) => Some((ErrorKind::Authorization, "missing_signature")),
            NodeError::Auth(_) => Some((ErrorKind::Authorization, "bad_signature")),
            NodeError::StaleSignature => Some((ErrorKind::Authorization, "stale_signature")),
            NodeError::Replayed => Some((ErrorKind::Authorization, "replayed")),
            NodeError::InsufficientFee { .. } => {
                Some((ErrorKind::StateConflict, "insufficient_fee_balance"))
            }
            _ => None,
        }
    }
}

impl IntoResponse for NodeError {
    fn into_response(self) -> Response {
        let (status, kind, code) = match (self.classified(), &self) {
            (Some((kind, code)), _) => (status_of(kind), Some(kind), code),
            (None, NodeError::Unavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, None, "unavailable")
            }
            (None, other) => {
                error!("Internal error: {other}");
                (StatusCode::INTERNAL_SERVER_ERROR, None, "internal")
            }
        };
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
                kind,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}
