use serde::{Deserialize, Serialize};

use crate::amount;

/// Asset quantity in the ledger's smallest unit.
pub type Amount = i128;

/// Free-form project attributes the oracle consults when judging evidence.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub evidence_subject: Option<String>,
    /// Empty, or one value per milestone.
    #[serde(default)]
    pub thresholds: Vec<u64>,
}

impl ProjectMetadata {
    pub fn threshold(&self, milestone_index: u32) -> Option<u64> {
        self.thresholds.get(milestone_index as usize).copied()
    }
}

/// Body of `POST /projects`. The creator is whoever signs the request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "amount")]
    pub target: Amount,
    pub milestone_titles: Vec<String>,
    pub milestone_percentages: Vec<u32>,
    #[serde(default)]
    pub metadata: ProjectMetadata,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub creator: String,
    #[serde(with = "amount")]
    pub target: Amount,
    #[serde(with = "amount")]
    pub funds_raised: Amount,
    #[serde(with = "amount")]
    pub funds_released: Amount,
    pub active: bool,
    pub created_at: u64,
    pub metadata: ProjectMetadata,
    pub milestone_count: u32,
}

impl Project {
    /// Raised but never released.
    pub fn undisbursed(&self) -> Amount {
        self.funds_raised - self.funds_released
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub title: String,
    pub percentage: u32,
    pub completed: bool,
    pub completed_at: Option<u64>,
}
