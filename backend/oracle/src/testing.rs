//! Test fixtures: a real ledger node on a loopback port and a scripted
//! evidence provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use ledger_api::wire::{
    CreatedResponse, DeactivatedResponse, EmptyBody, FeeDepositRequest, FundRequest,
    FundedResponse, OracleResponse, UpdateOracleRequest,
};
use ledger_api::{Amount, Credential, EventRecord, Milestone, NewProject, Project, ProjectMetadata};
use ledger_node::api::{router, ApiState};
use ledger_node::host::Genesis;
use ledger_node::ledger::Ledger;

use crate::errors::{OracleError, Result};
use crate::evidence::{EvidenceSource, Feed, Measurement};
use crate::ledger::{Holdings, HttpLedgerClient, LedgerClient, Submitted};

/// Ledger node served from an in-memory database.
pub struct TestNode {
    pub endpoint: String,
    pub oracle: Credential,
    pub creator: Credential,
    pub funder: Credential,
}

impl TestNode {
    /// Start a node whose oracle holds `fee_allowance`; each attestation costs 1.
    pub async fn spawn(fee_allowance: Amount) -> Self {
        let oracle = Credential::from_seed([1; 32]);
        let pool = ledger_node::db::init_pool("sqlite::memory:").await.unwrap();
        let genesis = Genesis {
            oracle: oracle.principal(),
            fee_allowance,
            submission_fee: 1,
        };
        let ledger = Ledger::open(pool, Some(genesis)).await.unwrap();
        let app = router(Arc::new(ApiState {
            ledger,
            signature_window_secs: 300,
        }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            endpoint: format!("http://{addr}"),
            oracle,
            creator: Credential::from_seed([2; 32]),
            funder: Credential::from_seed([3; 32]),
        }
    }

    pub fn client_for(&self, credential: &Credential) -> HttpLedgerClient {
        HttpLedgerClient::new(&self.endpoint, Duration::from_secs(10), credential.clone()).unwrap()
    }

    /// Oracle-side client with an off switch and a verify counter.
    pub fn switchable(&self, credential: &Credential) -> Arc<Switchable> {
        Arc::new(Switchable {
            inner: self.client_for(credential),
            offline: AtomicBool::new(false),
            verify_calls: AtomicUsize::new(0),
        })
    }

    /// Create a project with the given percentages and metadata.
    pub async fn create(&self, percentages: &[u32], metadata: ProjectMetadata) -> u64 {
        let request = NewProject {
            name: "Village microgrid".to_string(),
            target: 10_000,
            milestone_titles: percentages.iter().map(|p| format!("{p}%")).collect(),
            milestone_percentages: percentages.to_vec(),
            metadata,
            ..NewProject::default()
        };
        let created: CreatedResponse = self
            .client_for(&self.creator)
            .post("/projects", &request)
            .await
            .unwrap();
        created.project_id
    }

    pub async fn fund(&self, project_id: u64, amount: Amount) {
        let _: FundedResponse = self
            .client_for(&self.funder)
            .post(&format!("/projects/{project_id}/fund"), &FundRequest { amount })
            .await
            .unwrap();
    }

    pub async fn deactivate(&self, project_id: u64) {
        let _: DeactivatedResponse = self
            .client_for(&self.creator)
            .post(&format!("/projects/{project_id}/deactivate"), &EmptyBody {})
            .await
            .unwrap();
    }

    pub async fn rotate_oracle(&self, new_oracle: &Credential) {
        let request = UpdateOracleRequest {
            new_oracle: new_oracle.principal(),
        };
        let _: OracleResponse = self
            .client_for(&self.oracle)
            .post("/oracle", &request)
            .await
            .unwrap();
    }

    pub async fn top_up_fees(&self, principal: &str, amount: Amount) {
        let _: serde_json::Value = self
            .client_for(&self.funder)
            .post(&format!("/accounts/{principal}/fees"), &FeeDepositRequest { amount })
            .await
            .unwrap();
    }

    pub async fn project_state(&self, project_id: u64) -> Project {
        self.client_for(&self.funder).project(project_id).await.unwrap()
    }

    pub async fn milestones(&self, project_id: u64) -> Vec<Milestone> {
        self.client_for(&self.funder).milestones(project_id).await.unwrap()
    }

    pub async fn events(&self) -> Vec<EventRecord> {
        self.client_for(&self.funder).events_since(0, 1_000).await.unwrap()
    }
}

/// Ledger client that can be taken offline and counts attestations.
pub struct Switchable {
    inner: HttpLedgerClient,
    pub offline: AtomicBool,
    pub verify_calls: AtomicUsize,
}

impl Switchable {
    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    fn online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(OracleError::Submission("ledger offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for Switchable {
    async fn project_ids(&self) -> Result<Vec<u64>> {
        self.online()?;
        self.inner.project_ids().await
    }

    async fn project(&self, project_id: u64) -> Result<Project> {
        self.online()?;
        self.inner.project(project_id).await
    }

    async fn milestones(&self, project_id: u64) -> Result<Vec<Milestone>> {
        self.online()?;
        self.inner.milestones(project_id).await
    }

    async fn oracle(&self) -> Result<String> {
        self.online()?;
        self.inner.oracle().await
    }

    async fn holdings(&self, principal: &str) -> Result<Holdings> {
        self.online()?;
        self.inner.holdings(principal).await
    }

    async fn events_since(&self, after: u64, limit: u32) -> Result<Vec<EventRecord>> {
        self.online()?;
        self.inner.events_since(after, limit).await
    }

    async fn verify_milestone(&self, project_id: u64, milestone_index: u32) -> Result<Submitted> {
        self.online()?;
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.verify_milestone(project_id, milestone_index).await
    }
}

/// Evidence source answering from a per-subject table.
#[derive(Default)]
pub struct ScriptedEvidence {
    readings: StdMutex<HashMap<String, std::result::Result<u64, String>>>,
    pub calls: AtomicUsize,
}

impl ScriptedEvidence {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, subject: &str, value: u64) {
        self.readings
            .lock()
            .unwrap()
            .insert(subject.to_string(), Ok(value));
    }

    pub fn fail(&self, subject: &str, reason: &str) {
        self.readings
            .lock()
            .unwrap()
            .insert(subject.to_string(), Err(reason.to_string()));
    }
}

#[async_trait]
impl EvidenceSource for ScriptedEvidence {
    async fn measure(&self, feed: Feed, subject: &str, metric: &str) -> Result<Measurement> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let reading = self.readings.lock().unwrap().get(subject).cloned();
        match reading {
            Some(Ok(value)) => Ok(Measurement {
                value,
                reference: format!("{}/{subject}/{metric}#{n}", feed.as_str()),
            }),
            Some(Err(reason)) => Err(OracleError::ExternalFetch(reason)),
            None => Err(OracleError::ExternalFetch(format!("no data for {subject}"))),
        }
    }
}

pub fn metadata(category: &str, subject: &str, thresholds: &[u64]) -> ProjectMetadata {
    ProjectMetadata {
        category: Some(category.to_string()),
        evidence_subject: Some(subject.to_string()),
        thresholds: thresholds.to_vec(),
    }
}
