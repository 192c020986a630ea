use soroban_sdk::{contracttype, Address, String, Vec};

/// Free-form project attributes the oracle consults when judging evidence.
///
/// `thresholds` is either empty or holds one value per milestone.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProjectMetadata {
    pub category: Option<String>,
    pub evidence_subject: Option<String>,
    pub thresholds: Vec<u64>,
}

/// Fields fixed at creation (persistent storage, written once).
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProjectConfig {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub creator: Address,
    pub target: i128,
    pub created_at: u64,
    pub metadata: ProjectMetadata,
}

/// Fields that change on funding, release and deactivation.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProjectState {
    pub funds_raised: i128,
    pub funds_released: i128,
    pub active: bool,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Milestone {
    pub title: String,
    pub percentage: u32,
    pub completed: bool,
    pub completed_at: Option<u64>,
}

/// Read model returned by `get_project`, rebuilt from config and state.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub creator: Address,
    pub target: i128,
    pub funds_raised: i128,
    pub funds_released: i128,
    pub active: bool,
    pub created_at: u64,
    pub metadata: ProjectMetadata,
    pub milestone_count: u32,
}

impl Project {
    /// Raised but never released. Stuck in escrow once the project is inactive.
    pub fn undisbursed(&self) -> i128 {
        self.funds_raised - self.funds_released
    }
}
