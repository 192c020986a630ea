//! Verification attempts and the periodic sweep.
//!
//! Each attempt looks at the first incomplete milestone of an active project,
//! evaluates it with the project's strategy and, when the criteria are met,
//! submits the attestation to the ledger. Every attempt is appended to the
//! audit log whatever its outcome. One project failing never stops a sweep.

use std::sync::Arc;
use std::time::Duration;

use ledger_api::{Amount, Project};
use milestone_escrow::compute_release;
use sqlx::SqlitePool;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::db::{self, AttemptOutcome, NewAttempt};
use crate::errors::{OracleError, Result};
use crate::ledger::{Holdings, LedgerClient};
use crate::strategies::StrategyRegistry;

pub struct Verifier {
    pool: SqlitePool,
    ledger: Arc<dyn LedgerClient>,
    registry: StrategyRegistry,
    identity: String,
}

/// Tally of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub projects: usize,
    pub attempted: usize,
    pub verified: usize,
    pub failed: usize,
}

impl Verifier {
    pub fn new(
        pool: SqlitePool,
        ledger: Arc<dyn LedgerClient>,
        registry: StrategyRegistry,
        identity: String,
    ) -> Self {
        Self {
            pool,
            ledger,
            registry,
            identity,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn ledger(&self) -> &dyn LedgerClient {
        self.ledger.as_ref()
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Refuse to start unless this service is the ledger's current oracle.
    ///
    /// Returns the oracle's holdings; a zero fee balance means every
    /// attestation will be refused until someone tops it up.
    pub async fn preflight(&self) -> Result<Holdings> {
        let oracle = self.ledger.oracle().await?;
        if oracle != self.identity {
            return Err(OracleError::Config(format!(
                "ORACLE_SECRET_KEY signs as {} but the ledger's authorized oracle is {oracle}",
                self.identity
            )));
        }

        let holdings = self.ledger.holdings(&self.identity).await?;
        if holdings.fee_balance <= 0 {
            warn!(
                "Oracle {} has no fee balance at the ledger; attestations will be refused",
                self.identity
            );
        }
        info!(
            "Oracle {} confirmed with fee balance {}; strategies: {}",
            self.identity,
            holdings.fee_balance,
            self.registry.categories().join(", ")
        );
        Ok(holdings)
    }

    /// Attempt every active project once.
    pub async fn sweep(&self) -> Result<SweepSummary> {
        let ids = self.ledger.project_ids().await?;
        let mut summary = SweepSummary {
            projects: ids.len(),
            ..SweepSummary::default()
        };

        for project_id in ids {
            match self.attempt_project(project_id).await {
                Ok(Some(outcome)) => {
                    summary.attempted += 1;
                    match outcome {
                        AttemptOutcome::Verified | AttemptOutcome::AlreadyCompleted => {
                            summary.verified += 1
                        }
                        AttemptOutcome::FetchFailed
                        | AttemptOutcome::SubmissionFailed
                        | AttemptOutcome::EvaluationFailed => summary.failed += 1,
                        AttemptOutcome::CriteriaNotMet | AttemptOutcome::UnknownCategory => {}
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Could not inspect project {project_id}: {e}");
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Sweep finished: {} projects, {} attempted, {} verified, {} failed",
            summary.projects, summary.attempted, summary.verified, summary.failed
        );
        Ok(summary)
    }

    /// Attempt the first incomplete milestone of one project.
    ///
    /// Returns `Ok(None)` when there is nothing to attempt: the project is
    /// inactive, fully verified, already attested by this oracle, or has no
    /// funds a release could draw on yet.
    pub async fn attempt_project(&self, project_id: u64) -> Result<Option<AttemptOutcome>> {
        let project = self.ledger.project(project_id).await?;
        if !project.active {
            debug!("Project {project_id} is inactive; skipping");
            return Ok(None);
        }

        let milestones = self.ledger.milestones(project_id).await?;
        let Some((index, milestone)) = milestones.iter().enumerate().find(|(_, m)| !m.completed)
        else {
            debug!("Project {project_id} has no incomplete milestones");
            return Ok(None);
        };
        let index = index as u32;

        if db::has_verified(&self.pool, project_id, index).await? {
            debug!("Milestone {index} of project {project_id} already attested; skipping");
            return Ok(None);
        }

        if let Err(milestone_escrow::Error::NothingToRelease) =
            compute_release(project.funds_raised, milestone.percentage, Amount::MAX)
        {
            debug!("Project {project_id} has nothing to release yet");
            return Ok(None);
        }

        Ok(Some(self.attempt(&project, index).await))
    }

    async fn attempt(&self, project: &Project, index: u32) -> AttemptOutcome {
        let mut record = NewAttempt::new(project.id, index, AttemptOutcome::Verified);
        record.outcome = self.evaluate_and_submit(project, index, &mut record).await;

        if let Err(e) = db::record_attempt(&self.pool, &record).await {
            error!(
                "Failed to record {} attempt for project {} milestone {index}: {e}",
                record.outcome.as_str(),
                project.id
            );
        }
        record.outcome
    }

    async fn evaluate_and_submit(
        &self,
        project: &Project,
        index: u32,
        record: &mut NewAttempt,
    ) -> AttemptOutcome {
        let project_id = project.id;

        let strategy = match self.registry.resolve(&project.metadata) {
            Ok(strategy) => strategy,
            Err(e) => {
                warn!("Skipping project {project_id}: {e}");
                record.detail = Some(e.to_string());
                return AttemptOutcome::UnknownCategory;
            }
        };
        record.category = Some(strategy.category().to_string());

        let evaluation = match strategy.evaluate(project_id, index, &project.metadata).await {
            Ok(evaluation) => evaluation,
            Err(e) => {
                warn!("Could not evaluate project {project_id} milestone {index}: {e}");
                record.detail = Some(e.to_string());
                return match e {
                    OracleError::Evaluation(_) => AttemptOutcome::EvaluationFailed,
                    _ => AttemptOutcome::FetchFailed,
                };
            }
        };
        record.evidence_ref = Some(evaluation.evidence_ref.clone());

        if !evaluation.verified {
            let detail = format!(
                "measured {} below required {}",
                evaluation.measured.map_or("-".to_string(), |v| v.to_string()),
                evaluation.required.map_or("-".to_string(), |v| v.to_string()),
            );
            info!("Project {project_id} milestone {index} not met: {detail}");
            record.detail = Some(detail);
            return AttemptOutcome::CriteriaNotMet;
        }

        match self.ledger.verify_milestone(project_id, index).await {
            Ok(submitted) => {
                info!(
                    "Verified project {project_id} milestone {index}; released {} (event {})",
                    submitted.release_amount, submitted.event_seq
                );
                record.release_amount = Some(submitted.release_amount);
                record.state_ref = Some(format!("event:{}", submitted.event_seq));
                AttemptOutcome::Verified
            }
            Err(e) if e.is_already_completed() => {
                info!("Project {project_id} milestone {index} was already completed");
                record.detail = Some(e.to_string());
                AttemptOutcome::AlreadyCompleted
            }
            Err(e) => {
                error!("Ledger refused project {project_id} milestone {index}: {e}");
                record.detail = Some(e.to_string());
                AttemptOutcome::SubmissionFailed
            }
        }
    }
}

/// Sweep on a fixed interval until `cancel` fires. A sweep in progress always
/// runs to completion.
pub async fn run_sweeps(verifier: Arc<Verifier>, every: Duration, cancel: CancellationToken) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    info!("Sweep loop started (every {}s)", every.as_secs());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Sweep loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = verifier.sweep().await {
                    error!("Sweep failed: {e}");
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
