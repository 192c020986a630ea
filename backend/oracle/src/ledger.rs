//! Client for the escrow ledger node.
//!
//! The oracle reads project state and submits milestone attestations signed
//! with its own key. Rejections come back as `{error, kind, code}` bodies and
//! are mapped onto [`OracleError::Rejected`] so callers can tell a benign
//! `already_completed` race from a real failure.

use std::time::Duration;

use async_trait::async_trait;
use ledger_api::wire::{
    AccountResponse, EmptyBody, EventsResponse, MilestonesResponse, OracleResponse,
    ProjectIdsResponse, VerifiedResponse,
};
use ledger_api::{Amount, Credential, ErrorBody, EventRecord, Milestone, Project};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::errors::{OracleError, Result};

/// An accepted attestation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub release_amount: Amount,
    /// Sequence number of the ledger event recording the release.
    pub event_seq: u64,
}

/// Balances the ledger holds for one principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Holdings {
    pub balance: Amount,
    /// Fee asset each accepted attestation draws down.
    pub fee_balance: Amount,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn project_ids(&self) -> Result<Vec<u64>>;

    async fn project(&self, project_id: u64) -> Result<Project>;

    async fn milestones(&self, project_id: u64) -> Result<Vec<Milestone>>;

    async fn oracle(&self) -> Result<String>;

    async fn holdings(&self, principal: &str) -> Result<Holdings>;

    /// Up to `limit` events with `seq > after`, in order.
    async fn events_since(&self, after: u64, limit: u32) -> Result<Vec<EventRecord>>;

    /// Attest a milestone as the client's own principal.
    async fn verify_milestone(&self, project_id: u64, milestone_index: u32) -> Result<Submitted>;
}

// ─────────────────────────────────────────────────────────
// HTTP client
// ─────────────────────────────────────────────────────────

pub struct HttpLedgerClient {
    client: Client,
    endpoint: String,
    credential: Credential,
}

impl HttpLedgerClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration, credential: Credential) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            credential,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.endpoint);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(transport_error(&url))?;
        decode(&url, response).await
    }

    /// Signed write. `path` is what the signature covers.
    pub(crate) async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{path}", self.endpoint);
        let body = serde_json::to_vec(body)?;
        let mut request = self
            .client
            .post(&url)
            .header("content-type", "application/json");
        for (name, value) in self.credential.sign_now("POST", path, &body).pairs() {
            request = request.header(name, value);
        }
        let response = request
            .body(body)
            .send()
            .await
            .map_err(transport_error(&url))?;
        decode(&url, response).await
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn project_ids(&self) -> Result<Vec<u64>> {
        let body: ProjectIdsResponse = self.get("/projects").await?;
        Ok(body.project_ids)
    }

    async fn project(&self, project_id: u64) -> Result<Project> {
        self.get(&format!("/projects/{project_id}")).await
    }

    async fn milestones(&self, project_id: u64) -> Result<Vec<Milestone>> {
        let body: MilestonesResponse = self
            .get(&format!("/projects/{project_id}/milestones"))
            .await?;
        Ok(body.milestones)
    }

    async fn oracle(&self) -> Result<String> {
        let body: OracleResponse = self.get("/oracle").await?;
        Ok(body.oracle)
    }

    async fn holdings(&self, principal: &str) -> Result<Holdings> {
        let body: AccountResponse = self.get(&format!("/accounts/{principal}")).await?;
        Ok(Holdings {
            balance: body.balance,
            fee_balance: body.fee_balance,
        })
    }

    async fn events_since(&self, after: u64, limit: u32) -> Result<Vec<EventRecord>> {
        let body: EventsResponse = self
            .get(&format!("/events?after={after}&limit={limit}"))
            .await?;
        Ok(body.events)
    }

    async fn verify_milestone(&self, project_id: u64, milestone_index: u32) -> Result<Submitted> {
        let path = format!("/projects/{project_id}/milestones/{milestone_index}/verify");
        let body: VerifiedResponse = self.post(&path, &EmptyBody {}).await?;
        debug!(
            "Ledger accepted milestone {milestone_index} of project {project_id} at seq {}",
            body.event_seq
        );
        Ok(Submitted {
            release_amount: body.release_amount,
            event_seq: body.event_seq,
        })
    }
}

fn transport_error(url: &str) -> impl FnOnce(reqwest::Error) -> OracleError + '_ {
    move |e| OracleError::Submission(format!("{url}: {e}"))
}

async fn decode<T: DeserializeOwned>(url: &str, response: Response) -> Result<T> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| OracleError::Submission(format!("{url}: {e}")))?;
    if !status.is_success() {
        return Err(rejection(status, &text));
    }
    serde_json::from_str(&text)
        .map_err(|e| OracleError::Submission(format!("{url}: unreadable response: {e}")))
}

/// Map an error response onto the taxonomy. Only classified ledger rejections
/// become [`OracleError::Rejected`]; anything else is a submission failure.
fn rejection(status: StatusCode, body: &str) -> OracleError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            error,
            kind: Some(kind),
            code,
        }) => OracleError::Rejected {
            kind,
            code,
            message: error,
        },
        _ => OracleError::Submission(format!("ledger answered {status}: {body}")),
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
