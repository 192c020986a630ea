//! Verification strategies keyed by project category.
//!
//! | Category        | Feed      | Metric               |
//! |-----------------|-----------|----------------------|
//! | `solar`         | imagery   | `panel_coverage_pct` |
//! | `construction`  | imagery   | `completion_pct`     |
//! | `energy-output` | telemetry | `energy_kwh`         |
//! | `manual-test`   | none      | always passes        |
//!
//! Threshold strategies pass when the measured value is at least the
//! milestone's threshold from the project metadata.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ledger_api::ProjectMetadata;

use crate::errors::{OracleError, Result};
use crate::evidence::{EvidenceSource, Feed};

pub const MANUAL_TEST: &str = "manual-test";

/// Result of checking one milestone against external evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub verified: bool,
    pub measured: Option<u64>,
    pub required: Option<u64>,
    pub evidence_ref: String,
}

#[async_trait]
pub trait VerificationStrategy: Send + Sync {
    fn category(&self) -> &str;

    async fn evaluate(
        &self,
        project_id: u64,
        milestone_index: u32,
        metadata: &ProjectMetadata,
    ) -> Result<Evaluation>;
}

// ─────────────────────────────────────────────────────────
// Threshold strategies
// ─────────────────────────────────────────────────────────

pub struct ThresholdStrategy {
    category: &'static str,
    feed: Feed,
    metric: &'static str,
    source: Arc<dyn EvidenceSource>,
}

impl ThresholdStrategy {
    pub fn solar(source: Arc<dyn EvidenceSource>) -> Self {
        Self {
            category: "solar",
            feed: Feed::Imagery,
            metric: "panel_coverage_pct",
            source,
        }
    }

    pub fn construction(source: Arc<dyn EvidenceSource>) -> Self {
        Self {
            category: "construction",
            feed: Feed::Imagery,
            metric: "completion_pct",
            source,
        }
    }

    pub fn energy_output(source: Arc<dyn EvidenceSource>) -> Self {
        Self {
            category: "energy-output",
            feed: Feed::Telemetry,
            metric: "energy_kwh",
            source,
        }
    }
}

#[async_trait]
impl VerificationStrategy for ThresholdStrategy {
    fn category(&self) -> &str {
        self.category
    }

    async fn evaluate(
        &self,
        project_id: u64,
        milestone_index: u32,
        metadata: &ProjectMetadata,
    ) -> Result<Evaluation> {
        let subject = metadata
            .evidence_subject
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                OracleError::Evaluation(format!("project {project_id} has no evidence subject"))
            })?;
        let required = metadata.threshold(milestone_index).ok_or_else(|| {
            OracleError::Evaluation(format!(
                "project {project_id} has no threshold for milestone {milestone_index}"
            ))
        })?;

        let measurement = self.source.measure(self.feed, subject, self.metric).await?;
        Ok(Evaluation {
            verified: measurement.value >= required,
            measured: Some(measurement.value),
            required: Some(required),
            evidence_ref: measurement.reference,
        })
    }
}

/// Always passes. Only registered outside production.
pub struct ManualTestStrategy;

#[async_trait]
impl VerificationStrategy for ManualTestStrategy {
    fn category(&self) -> &str {
        MANUAL_TEST
    }

    async fn evaluate(
        &self,
        project_id: u64,
        milestone_index: u32,
        _metadata: &ProjectMetadata,
    ) -> Result<Evaluation> {
        Ok(Evaluation {
            verified: true,
            measured: None,
            required: None,
            evidence_ref: format!("manual:{project_id}:{milestone_index}"),
        })
    }
}

// ─────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn VerificationStrategy>>,
    default_category: Option<String>,
}

impl StrategyRegistry {
    pub fn new(default_category: Option<String>) -> Self {
        Self {
            strategies: HashMap::new(),
            default_category,
        }
    }

    /// Registry with the built-in strategies, plus `manual-test` when allowed.
    pub fn with_builtin(
        source: Arc<dyn EvidenceSource>,
        default_category: Option<String>,
        allow_manual: bool,
    ) -> Self {
        let mut registry = Self::new(default_category);
        registry.register(Arc::new(ThresholdStrategy::solar(source.clone())));
        registry.register(Arc::new(ThresholdStrategy::construction(source.clone())));
        registry.register(Arc::new(ThresholdStrategy::energy_output(source)));
        if allow_manual {
            registry.register(Arc::new(ManualTestStrategy));
        }
        registry
    }

    pub fn register(&mut self, strategy: Arc<dyn VerificationStrategy>) {
        self.strategies
            .insert(strategy.category().to_string(), strategy);
    }

    /// Pick the strategy for a project, falling back to the default category.
    pub fn resolve(&self, metadata: &ProjectMetadata) -> Result<Arc<dyn VerificationStrategy>> {
        let category = metadata
            .category
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .or(self.default_category.as_deref())
            .ok_or_else(|| OracleError::UnknownCategory("<none>".to_string()))?;

        self.strategies
            .get(category)
            .cloned()
            .ok_or_else(|| OracleError::UnknownCategory(category.to_string()))
    }

    pub fn categories(&self) -> Vec<String> {
        let mut names: Vec<String> = self.strategies.keys().cloned().collect();
        names.sort();
        names
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
