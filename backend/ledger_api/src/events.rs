//! Ledger events as the node stores and serves them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::amount;
use crate::types::Amount;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ProjectCreated,
    Funded,
    MilestoneVerified,
    FundsReleased,
    OracleUpdated,
    ProjectDeactivated,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProjectCreated => "project_created",
            Self::Funded => "funded",
            Self::MilestoneVerified => "milestone_verified",
            Self::FundsReleased => "funds_released",
            Self::OracleUpdated => "oracle_updated",
            Self::ProjectDeactivated => "project_deactivated",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EscrowEvent {
    ProjectCreated {
        project_id: u64,
        creator: String,
        name: String,
        #[serde(with = "amount")]
        target: Amount,
        timestamp: u64,
    },
    Funded {
        project_id: u64,
        funder: String,
        #[serde(with = "amount")]
        amount: Amount,
        #[serde(with = "amount")]
        total_raised: Amount,
    },
    MilestoneVerified {
        project_id: u64,
        milestone_index: u32,
        title: String,
        timestamp: u64,
    },
    FundsReleased {
        project_id: u64,
        creator: String,
        #[serde(with = "amount")]
        amount: Amount,
        milestone_index: u32,
    },
    OracleUpdated {
        old: String,
        new: String,
    },
    ProjectDeactivated {
        project_id: u64,
        #[serde(with = "amount")]
        undisbursed: Amount,
    },
}

impl EscrowEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ProjectCreated { .. } => EventKind::ProjectCreated,
            Self::Funded { .. } => EventKind::Funded,
            Self::MilestoneVerified { .. } => EventKind::MilestoneVerified,
            Self::FundsReleased { .. } => EventKind::FundsReleased,
            Self::OracleUpdated { .. } => EventKind::OracleUpdated,
            Self::ProjectDeactivated { .. } => EventKind::ProjectDeactivated,
        }
    }

    pub fn project_id(&self) -> Option<u64> {
        match self {
            Self::ProjectCreated { project_id, .. }
            | Self::Funded { project_id, .. }
            | Self::MilestoneVerified { project_id, .. }
            | Self::FundsReleased { project_id, .. }
            | Self::ProjectDeactivated { project_id, .. } => Some(*project_id),
            Self::OracleUpdated { .. } => None,
        }
    }

    pub fn milestone_index(&self) -> Option<u32> {
        match self {
            Self::MilestoneVerified {
                milestone_index, ..
            }
            | Self::FundsReleased {
                milestone_index, ..
            } => Some(*milestone_index),
            _ => None,
        }
    }
}

/// An event with its position in the ledger-wide sequence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    /// Ledger time of the operation that produced the event.
    pub timestamp: u64,
    pub event: EscrowEvent,
}

impl EventRecord {
    /// Identity of the fact an event reports, for at-most-once handling.
    ///
    /// Facts that can happen once per project or milestone key on those IDs.
    /// Repeatable facts (funding, oracle rotation) key on the sequence number.
    pub fn dedup_key(&self) -> String {
        let kind = self.event.kind();
        match (&self.event, self.event.project_id()) {
            (EscrowEvent::Funded { .. } | EscrowEvent::OracleUpdated { .. }, _) | (_, None) => {
                format!("{kind}:seq:{}", self.seq)
            }
            (_, Some(project_id)) => match self.event.milestone_index() {
                Some(index) => format!("{kind}:{project_id}:{index}"),
                None => format!("{kind}:{project_id}:-"),
            },
        }
    }
}
