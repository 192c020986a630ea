//! Contract events.
//!
//! Every event is published under `(topic, project_id)` (oracle rotation uses
//! `(topic,)`) and carries `seq`, a contract-wide counter that starts at 1 and
//! never repeats. Off-chain readers page and dedup by it.

use soroban_sdk::{contracttype, symbol_short, Address, Env, String, Symbol};

use crate::storage;

pub const TOPIC_CREATED: Symbol = symbol_short!("created");
pub const TOPIC_FUNDED: Symbol = symbol_short!("funded");
pub const TOPIC_VERIFIED: Symbol = symbol_short!("verified");
pub const TOPIC_RELEASED: Symbol = symbol_short!("released");
pub const TOPIC_ORACLE: Symbol = symbol_short!("oracle");
pub const TOPIC_DEACTIVATED: Symbol = symbol_short!("inactive");

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProjectCreated {
    pub seq: u64,
    pub project_id: u64,
    pub creator: Address,
    pub name: String,
    pub target: i128,
    pub timestamp: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Funded {
    pub seq: u64,
    pub project_id: u64,
    pub funder: Address,
    pub amount: i128,
    pub total_raised: i128,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MilestoneVerified {
    pub seq: u64,
    pub project_id: u64,
    pub milestone_index: u32,
    pub title: String,
    pub timestamp: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FundsReleased {
    pub seq: u64,
    pub project_id: u64,
    pub creator: Address,
    pub amount: i128,
    pub milestone_index: u32,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OracleUpdated {
    pub seq: u64,
    pub old: Address,
    pub new: Address,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProjectDeactivated {
    pub seq: u64,
    pub project_id: u64,
    pub undisbursed: i128,
}

pub fn emit_project_created(
    env: &Env,
    project_id: u64,
    creator: Address,
    name: String,
    target: i128,
) {
    let data = ProjectCreated {
        seq: storage::next_event_seq(env),
        project_id,
        creator,
        name,
        target,
        timestamp: env.ledger().timestamp(),
    };
    env.events().publish((TOPIC_CREATED, project_id), data);
}

pub fn emit_funded(env: &Env, project_id: u64, funder: Address, amount: i128, total_raised: i128) {
    let data = Funded {
        seq: storage::next_event_seq(env),
        project_id,
        funder,
        amount,
        total_raised,
    };
    env.events().publish((TOPIC_FUNDED, project_id), data);
}

pub fn emit_milestone_verified(env: &Env, project_id: u64, milestone_index: u32, title: String) {
    let data = MilestoneVerified {
        seq: storage::next_event_seq(env),
        project_id,
        milestone_index,
        title,
        timestamp: env.ledger().timestamp(),
    };
    env.events().publish((TOPIC_VERIFIED, project_id), data);
}

pub fn emit_funds_released(
    env: &Env,
    project_id: u64,
    creator: Address,
    amount: i128,
    milestone_index: u32,
) {
    let data = FundsReleased {
        seq: storage::next_event_seq(env),
        project_id,
        creator,
        amount,
        milestone_index,
    };
    env.events().publish((TOPIC_RELEASED, project_id), data);
}

pub fn emit_oracle_updated(env: &Env, old: Address, new: Address) {
    let data = OracleUpdated {
        seq: storage::next_event_seq(env),
        old,
        new,
    };
    env.events().publish((TOPIC_ORACLE,), data);
}

pub fn emit_project_deactivated(env: &Env, project_id: u64, undisbursed: i128) {
    let data = ProjectDeactivated {
        seq: storage::next_event_seq(env),
        project_id,
        undisbursed,
    };
    env.events().publish((TOPIC_DEACTIVATED, project_id), data);
}
