//! # Storage
//!
//! ## Instance storage (contract-lifetime TTL)
//!
//! | Key            | Type      | Description                          |
//! |----------------|-----------|--------------------------------------|
//! | `ProjectCount` | `u64`     | Auto-increment project ID counter    |
//! | `OracleKey`    | `Address` | Sole identity allowed to verify      |
//! | `TokenKey`     | `Address` | Asset held in escrow                 |
//! | `EventSeq`     | `u64`     | Sequence of the last published event |
//!
//! ## Persistent storage (per-entry TTL)
//!
//! | Key                   | Type             | Description                 |
//! |-----------------------|------------------|-----------------------------|
//! | `ProjConfig(id)`      | `ProjectConfig`  | Fields fixed at creation    |
//! | `ProjState(id)`       | `ProjectState`   | Raised/released/active      |
//! | `Milestones(id)`      | `Vec<Milestone>` | Ordered milestone plan      |
//! | `Contribution(key)`   | `i128`           | Cumulative funder deposits  |

use soroban_sdk::{contracttype, Address, Env, Vec};

use crate::types::{Milestone, ProjectConfig, ProjectState};
use crate::Error;

/// Approximate ledgers per day (~5 seconds per ledger).
const DAY_IN_LEDGERS: u32 = 17_280;

const INSTANCE_BUMP_AMOUNT: u32 = 7 * DAY_IN_LEDGERS;
const INSTANCE_LIFETIME_THRESHOLD: u32 = DAY_IN_LEDGERS;

const PERSISTENT_BUMP_AMOUNT: u32 = 30 * DAY_IN_LEDGERS;
const PERSISTENT_LIFETIME_THRESHOLD: u32 = 7 * DAY_IN_LEDGERS;

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContributionKey {
    pub project_id: u64,
    pub funder: Address,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DataKey {
    ProjectCount,
    OracleKey,
    TokenKey,
    EventSeq,
    ProjConfig(u64),
    ProjState(u64),
    Milestones(u64),
    Contribution(ContributionKey),
}

fn bump_instance(env: &Env) {
    env.storage()
        .instance()
        .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
}

fn bump_persistent(env: &Env, key: &DataKey) {
    env.storage()
        .persistent()
        .extend_ttl(key, PERSISTENT_LIFETIME_THRESHOLD, PERSISTENT_BUMP_AMOUNT);
}

pub fn is_initialized(env: &Env) -> bool {
    env.storage().instance().has(&DataKey::OracleKey)
}

/// Reads, increments and stores the project counter.
/// Returns the pre-increment value as the new project's ID.
pub fn get_and_increment_project_id(env: &Env) -> u64 {
    bump_instance(env);
    let current = project_count(env);
    env.storage()
        .instance()
        .set(&DataKey::ProjectCount, &(current + 1));
    current
}

pub fn project_count(env: &Env) -> u64 {
    env.storage()
        .instance()
        .get(&DataKey::ProjectCount)
        .unwrap_or(0)
}

/// Allocates the sequence number for the next published event.
pub fn next_event_seq(env: &Env) -> u64 {
    let seq = last_event_seq(env) + 1;
    env.storage().instance().set(&DataKey::EventSeq, &seq);
    seq
}

pub fn last_event_seq(env: &Env) -> u64 {
    env.storage().instance().get(&DataKey::EventSeq).unwrap_or(0)
}

pub fn set_oracle(env: &Env, oracle: &Address) {
    env.storage().instance().set(&DataKey::OracleKey, oracle);
    bump_instance(env);
}

pub fn get_oracle(env: &Env) -> Result<Address, Error> {
    bump_instance(env);
    env.storage()
        .instance()
        .get(&DataKey::OracleKey)
        .ok_or(Error::NotInitialized)
}

pub fn set_token(env: &Env, token: &Address) {
    env.storage().instance().set(&DataKey::TokenKey, token);
    bump_instance(env);
}

pub fn get_token(env: &Env) -> Result<Address, Error> {
    env.storage()
        .instance()
        .get(&DataKey::TokenKey)
        .ok_or(Error::NotInitialized)
}

/// Write every record of a freshly created project.
pub fn save_project(
    env: &Env,
    config: &ProjectConfig,
    state: &ProjectState,
    milestones: &Vec<Milestone>,
) {
    let config_key = DataKey::ProjConfig(config.id);
    env.storage().persistent().set(&config_key, config);
    bump_persistent(env, &config_key);
    save_project_state(env, config.id, state);
    save_milestones(env, config.id, milestones);
}

pub fn load_project_config(env: &Env, id: u64) -> Result<ProjectConfig, Error> {
    let key = DataKey::ProjConfig(id);
    let config = env
        .storage()
        .persistent()
        .get(&key)
        .ok_or(Error::ProjectNotFound)?;
    bump_persistent(env, &key);
    Ok(config)
}

pub fn load_project_state(env: &Env, id: u64) -> Result<ProjectState, Error> {
    let key = DataKey::ProjState(id);
    let state = env
        .storage()
        .persistent()
        .get(&key)
        .ok_or(Error::ProjectNotFound)?;
    bump_persistent(env, &key);
    Ok(state)
}

pub fn save_project_state(env: &Env, id: u64, state: &ProjectState) {
    let key = DataKey::ProjState(id);
    env.storage().persistent().set(&key, state);
    bump_persistent(env, &key);
}

pub fn load_milestones(env: &Env, id: u64) -> Result<Vec<Milestone>, Error> {
    let key = DataKey::Milestones(id);
    let milestones = env
        .storage()
        .persistent()
        .get(&key)
        .ok_or(Error::ProjectNotFound)?;
    bump_persistent(env, &key);
    Ok(milestones)
}

pub fn save_milestones(env: &Env, id: u64, milestones: &Vec<Milestone>) {
    let key = DataKey::Milestones(id);
    env.storage().persistent().set(&key, milestones);
    bump_persistent(env, &key);
}

fn contribution_key(project_id: u64, funder: &Address) -> DataKey {
    DataKey::Contribution(ContributionKey {
        project_id,
        funder: funder.clone(),
    })
}

pub fn load_contribution(env: &Env, project_id: u64, funder: &Address) -> i128 {
    env.storage()
        .persistent()
        .get(&contribution_key(project_id, funder))
        .unwrap_or(0)
}

pub fn save_contribution(env: &Env, project_id: u64, funder: &Address, amount: i128) {
    let key = contribution_key(project_id, funder);
    env.storage().persistent().set(&key, &amount);
    bump_persistent(env, &key);
}
