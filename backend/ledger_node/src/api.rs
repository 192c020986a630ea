//! Axum REST API handlers.
//!
//! Write routes map one-to-one onto escrow entry points. Every write is
//! signed: the principal in the signature headers is the caller, creator or
//! funder of the operation, and a signature is accepted only once.

use std::sync::Arc;

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Path, Query, Request, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use ledger_api::auth::{self, ISSUED_AT_HEADER, NONCE_HEADER, PRINCIPAL_HEADER, SIGNATURE_HEADER};
use ledger_api::wire::{
    AccountResponse, BalanceResponse, ContributionResponse, CreatedResponse, DeactivatedResponse,
    EmptyBody, EventsResponse, FeeDepositRequest, FundRequest, FundedResponse, HealthResponse,
    MilestonesResponse, OracleResponse, ProjectIdsResponse, UpdateOracleRequest, VerifiedResponse,
};
use ledger_api::{NewProject, Project};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::errors::{NodeError, Result};
use crate::host::Command;
use crate::ledger::Ledger;

const DEFAULT_EVENT_PAGE: u32 = 100;
const MAX_EVENT_PAGE: u32 = 1_000;

pub struct ApiState {
    pub ledger: Ledger,
    /// Accepted distance between `x-escrow-issued-at` and the node clock.
    pub signature_window_secs: u64,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/:id", get(get_project))
        .route("/projects/:id/milestones", get(get_milestones))
        .route("/projects/:id/contributions/:funder", get(get_contribution))
        .route("/projects/:id/fund", post(fund_project))
        .route("/projects/:id/milestones/:index/verify", post(verify_milestone))
        .route("/projects/:id/deactivate", post(deactivate_project))
        .route("/oracle", get(get_oracle).post(update_oracle))
        .route("/balance", get(get_balance))
        .route("/accounts/:principal", get(get_account))
        .route("/accounts/:principal/fees", post(deposit_fees))
        .route("/events", get(get_events))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Signed requests
// ─────────────────────────────────────────────────────────

/// A write whose body has been authenticated as coming from `principal`.
#[derive(Debug)]
pub struct Signed<T> {
    pub principal: String,
    pub signature: String,
    pub body: T,
}

#[async_trait]
impl<T: DeserializeOwned> FromRequest<Arc<ApiState>> for Signed<T> {
    type Rejection = NodeError;

    async fn from_request(req: Request, state: &Arc<ApiState>) -> Result<Self> {
        let (principal, signature, issued_at, nonce, method, path) = {
            let headers = req.headers();
            let header = |name: &'static str| -> Result<String> {
                headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
                    .ok_or(NodeError::Unsigned(name))
            };
            let issued_at: i64 = header(ISSUED_AT_HEADER)?
                .parse()
                .map_err(|_| NodeError::Unsigned(ISSUED_AT_HEADER))?;
            let nonce: u64 = header(NONCE_HEADER)?
                .parse()
                .map_err(|_| NodeError::Unsigned(NONCE_HEADER))?;
            (
                header(PRINCIPAL_HEADER)?,
                header(SIGNATURE_HEADER)?,
                issued_at,
                nonce,
                req.method().as_str().to_string(),
                req.uri().path().to_string(),
            )
        };

        let window_ms = i64::try_from(state.signature_window_secs)
            .unwrap_or(i64::MAX)
            .saturating_mul(1_000);
        if Utc::now().timestamp_millis().abs_diff(issued_at) > window_ms.unsigned_abs() {
            return Err(NodeError::StaleSignature);
        }

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| NodeError::Validation(format!("unreadable request body: {e}")))?;
        auth::verify(&principal, &signature, &method, &path, issued_at, nonce, &bytes)?;

        let raw: &[u8] = if bytes.is_empty() { b"{}" } else { &bytes };
        let body = serde_json::from_slice(raw)
            .map_err(|e| NodeError::Validation(format!("invalid request body: {e}")))?;
        Ok(Signed {
            principal,
            signature,
            body,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub after: u64,
    pub limit: Option<u32>,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health(State(state): State<Arc<ApiState>>) -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        last_event_seq: state.ledger.last_event_seq().await?,
    }))
}

/// `POST /projects`
pub async fn create_project(
    State(state): State<Arc<ApiState>>,
    signed: Signed<NewProject>,
) -> Result<Json<CreatedResponse>> {
    let creator = signed.principal;
    let applied = state
        .ledger
        .submit(
            &signed.signature,
            Command::CreateProject {
                creator: creator.clone(),
                project: signed.body,
            },
        )
        .await?;
    let project_id = applied.outcome.project_id()?;
    info!("Project {project_id} created by {creator}");
    Ok(Json(CreatedResponse {
        project_id,
        event_seq: applied.last_seq,
    }))
}

/// `POST /projects/:id/fund`
pub async fn fund_project(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<u64>,
    signed: Signed<FundRequest>,
) -> Result<Json<FundedResponse>> {
    let funder = signed.principal;
    let amount = signed.body.amount;
    let applied = state
        .ledger
        .submit(
            &signed.signature,
            Command::Fund {
                project_id,
                funder: funder.clone(),
                amount,
            },
        )
        .await?;
    let total_raised = applied.outcome.amount()?;
    info!("Project {project_id} funded {amount} by {funder} (total {total_raised})");
    Ok(Json(FundedResponse {
        project_id,
        total_raised,
        event_seq: applied.last_seq,
    }))
}

/// `POST /projects/:id/milestones/:index/verify`
pub async fn verify_milestone(
    State(state): State<Arc<ApiState>>,
    Path((project_id, milestone_index)): Path<(u64, u32)>,
    signed: Signed<EmptyBody>,
) -> Result<Json<VerifiedResponse>> {
    let applied = state
        .ledger
        .submit(
            &signed.signature,
            Command::Verify {
                project_id,
                milestone_index,
                caller: signed.principal,
            },
        )
        .await?;
    let release_amount = applied.outcome.amount()?;
    info!("Milestone {milestone_index} of project {project_id} verified; released {release_amount}");
    Ok(Json(VerifiedResponse {
        project_id,
        milestone_index,
        release_amount,
        event_seq: applied.last_seq,
    }))
}

/// `POST /projects/:id/deactivate`
pub async fn deactivate_project(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<u64>,
    signed: Signed<EmptyBody>,
) -> Result<Json<DeactivatedResponse>> {
    let applied = state
        .ledger
        .submit(
            &signed.signature,
            Command::Deactivate {
                project_id,
                caller: signed.principal,
            },
        )
        .await?;
    let undisbursed = applied.outcome.amount()?;
    if undisbursed > 0 {
        warn!("Project {project_id} deactivated with {undisbursed} undisbursed; balance is now stuck");
    } else {
        info!("Project {project_id} deactivated");
    }
    Ok(Json(DeactivatedResponse {
        project_id,
        undisbursed,
        event_seq: applied.last_seq,
    }))
}

/// `GET /oracle`
pub async fn get_oracle(State(state): State<Arc<ApiState>>) -> Result<Json<OracleResponse>> {
    let oracle = state.ledger.query(|host| host.oracle()).await?;
    Ok(Json(OracleResponse { oracle }))
}

/// `POST /oracle`
pub async fn update_oracle(
    State(state): State<Arc<ApiState>>,
    signed: Signed<UpdateOracleRequest>,
) -> Result<Json<OracleResponse>> {
    let new_oracle = signed.body.new_oracle;
    state
        .ledger
        .submit(
            &signed.signature,
            Command::UpdateOracle {
                caller: signed.principal.clone(),
                new_oracle: new_oracle.clone(),
            },
        )
        .await?;
    info!("Oracle rotated from {} to {new_oracle}", signed.principal);
    Ok(Json(OracleResponse { oracle: new_oracle }))
}

/// `GET /projects`
pub async fn list_projects(State(state): State<Arc<ApiState>>) -> Result<Json<ProjectIdsResponse>> {
    let project_ids = state.ledger.query(|host| Ok(host.project_ids())).await?;
    Ok(Json(ProjectIdsResponse {
        count: project_ids.len(),
        project_ids,
    }))
}

/// `GET /projects/:id`
pub async fn get_project(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<u64>,
) -> Result<Json<Project>> {
    Ok(Json(state.ledger.query(move |host| host.project(project_id)).await?))
}

/// `GET /projects/:id/milestones`
pub async fn get_milestones(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<u64>,
) -> Result<Json<MilestonesResponse>> {
    let milestones = state
        .ledger
        .query(move |host| host.milestones(project_id))
        .await?;
    Ok(Json(MilestonesResponse {
        project_id,
        milestones,
    }))
}

/// `GET /projects/:id/contributions/:funder`
pub async fn get_contribution(
    State(state): State<Arc<ApiState>>,
    Path((project_id, funder)): Path<(u64, String)>,
) -> Result<Json<ContributionResponse>> {
    let key = funder.clone();
    let amount = state
        .ledger
        .query(move |host| host.contribution(project_id, &key))
        .await?;
    Ok(Json(ContributionResponse {
        project_id,
        funder,
        amount,
    }))
}

/// `GET /balance`
pub async fn get_balance(State(state): State<Arc<ApiState>>) -> Result<Json<BalanceResponse>> {
    let balance = state.ledger.query(|host| host.contract_balance()).await?;
    Ok(Json(BalanceResponse { balance }))
}

/// `GET /accounts/:principal`
pub async fn get_account(
    State(state): State<Arc<ApiState>>,
    Path(principal): Path<String>,
) -> Result<Json<AccountResponse>> {
    let key = principal.clone();
    let holdings = state.ledger.query(move |host| Ok(host.holdings(&key))).await?;
    Ok(Json(AccountResponse {
        principal,
        balance: holdings.balance,
        fee_balance: holdings.fee_balance,
    }))
}

/// `POST /accounts/:principal/fees`
///
/// Tops up the fee balance of any principal; the payer is whoever signs.
pub async fn deposit_fees(
    State(state): State<Arc<ApiState>>,
    Path(principal): Path<String>,
    signed: Signed<FeeDepositRequest>,
) -> Result<Json<AccountResponse>> {
    let amount = signed.body.amount;
    let applied = state
        .ledger
        .submit(
            &signed.signature,
            Command::DepositFees {
                payer: signed.principal,
                account: principal.clone(),
                amount,
            },
        )
        .await?;
    let fee_balance = applied.outcome.amount()?;
    info!("Fee balance of {principal} topped up by {amount} to {fee_balance}");
    let key = principal.clone();
    let holdings = state.ledger.query(move |host| Ok(host.holdings(&key))).await?;
    Ok(Json(AccountResponse {
        principal,
        balance: holdings.balance,
        fee_balance,
    }))
}

/// `GET /events?after=<seq>&limit=<n>`
///
/// Returns committed events with `seq > after` in order, at most `limit`.
pub async fn get_events(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_EVENT_PAGE)
        .clamp(1, MAX_EVENT_PAGE);
    let last_seq = state.ledger.last_event_seq().await?;
    let events = state.ledger.events_after(query.after, limit).await?;
    Ok(Json(EventsResponse {
        count: events.len(),
        last_seq,
        events,
    }))
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
