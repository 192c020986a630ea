//! Request and response bodies of the ledger node's REST API.

use serde::{Deserialize, Serialize};

use crate::amount;
use crate::events::EventRecord;
use crate::types::{Amount, Milestone};

/// Coarse classification of every rejection.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or inconsistent input.
    Validation,
    /// Missing or bad signature, or the wrong principal for the operation.
    Authorization,
    /// Unknown project or milestone.
    NotFound,
    /// Valid request that the current state forbids.
    StateConflict,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Authorization => "authorization",
            Self::NotFound => "not_found",
            Self::StateConflict => "state_conflict",
        }
    }
}

/// Error payload. `kind` is absent for internal failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: Option<ErrorKind>,
    pub code: String,
}

/// Body of writes that carry nothing beyond the signed path.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyBody {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundRequest {
    #[serde(with = "amount")]
    pub amount: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOracleRequest {
    pub new_oracle: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeDepositRequest {
    #[serde(with = "amount")]
    pub amount: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub last_event_seq: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub project_id: u64,
    pub event_seq: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FundedResponse {
    pub project_id: u64,
    #[serde(with = "amount")]
    pub total_raised: Amount,
    pub event_seq: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifiedResponse {
    pub project_id: u64,
    pub milestone_index: u32,
    #[serde(with = "amount")]
    pub release_amount: Amount,
    pub event_seq: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeactivatedResponse {
    pub project_id: u64,
    #[serde(with = "amount")]
    pub undisbursed: Amount,
    pub event_seq: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProjectIdsResponse {
    pub count: usize,
    pub project_ids: Vec<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MilestonesResponse {
    pub project_id: u64,
    pub milestones: Vec<Milestone>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContributionResponse {
    pub project_id: u64,
    pub funder: String,
    #[serde(with = "amount")]
    pub amount: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OracleResponse {
    pub oracle: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    #[serde(with = "amount")]
    pub balance: Amount,
}

/// Holdings of one principal: escrow asset (payouts, unspent deposits) and
/// the fee asset that meters oracle submissions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub principal: String,
    #[serde(with = "amount")]
    pub balance: Amount,
    #[serde(with = "amount")]
    pub fee_balance: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventsResponse {
    pub count: usize,
    pub last_seq: u64,
    pub events: Vec<EventRecord>,
}
