//! # Milestone Escrow
//!
//! Soroban contract that holds project contributions in escrow and releases
//! them to the project creator one milestone at a time, when the trusted
//! oracle attests that the milestone was met.
//!
//! | Phase        | Entry Point(s)                                              |
//! |--------------|-------------------------------------------------------------|
//! | Bootstrap    | [`MilestoneEscrow::init`]                                   |
//! | Registration | [`MilestoneEscrow::create_project`]                         |
//! | Funding      | [`MilestoneEscrow::fund_project`]                           |
//! | Verification | [`MilestoneEscrow::verify_milestone`]                       |
//! | Lifecycle    | `deactivate_project`, `update_oracle`                       |
//! | Queries      | `get_project`, `get_milestones`, `get_contribution`, `get_all_project_ids`, `get_contract_balance`, `get_oracle`, `last_event_seq` |
//!
//! ## Release semantics
//!
//! A verified milestone releases `floor(funds_raised * percentage / 100)`
//! using the raised total *at the moment of verification*. Milestones may be
//! verified in any order. Funding that arrives between verifications therefore
//! increases the absolute size of later releases, and part of the escrow can
//! stay behind once every milestone is complete.
//!
//! Every entry point checks all of its preconditions before it writes or
//! transfers, and events are published last.

#![no_std]

use soroban_sdk::{contract, contracterror, contractimpl, token, Address, Env, String, Vec};

pub mod events;
pub mod release;
mod storage;
pub mod types;

#[cfg(test)]
mod invariants;
#[cfg(test)]
mod test;
#[cfg(test)]
mod test_events;
#[cfg(test)]
mod test_release;

pub use release::compute_release;
pub use types::{Milestone, Project, ProjectConfig, ProjectMetadata, ProjectState};

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    /// No project with the given ID.
    ProjectNotFound = 1,
    /// Milestone index is past the end of the plan.
    MilestoneNotFound = 2,
    /// The milestone was verified before.
    AlreadyCompleted = 3,
    /// The release exceeds what the escrow holds.
    InsufficientBalance = 4,
    /// Empty plan, mismatched lengths, a percentage outside 1..=100, a sum
    /// other than 100, or a threshold list of the wrong length.
    InvalidMilestones = 5,
    /// Caller is not the oracle (verify, rotation) or not the creator
    /// (deactivation).
    NotAuthorized = 6,
    /// Target or contribution is not strictly positive.
    InvalidAmount = 7,
    /// The project has been deactivated.
    InactiveProject = 8,
    /// The milestone's share of the raised total floors to zero.
    NothingToRelease = 9,
    /// A running total would leave the i128 range.
    ArithmeticOverflow = 10,
    /// Name is empty.
    InvalidProject = 11,
    AlreadyInitialized = 12,
    NotInitialized = 13,
}

#[contract]
pub struct MilestoneEscrow;

#[contractimpl]
impl MilestoneEscrow {
    /// Bind the escrow to its oracle and to the asset it holds. Callable once.
    pub fn init(env: Env, oracle: Address, token: Address) -> Result<(), Error> {
        if storage::is_initialized(&env) {
            return Err(Error::AlreadyInitialized);
        }
        storage::set_oracle(&env, &oracle);
        storage::set_token(&env, &token);
        Ok(())
    }

    /// Register a project and its milestone plan.
    ///
    /// `milestone_titles` and `milestone_percentages` are parallel lists; the
    /// percentages must each lie in 1..=100 and sum to exactly 100.
    /// Returns the new project ID (sequential from 0).
    #[allow(clippy::too_many_arguments)]
    pub fn create_project(
        env: Env,
        creator: Address,
        name: String,
        description: String,
        target: i128,
        milestone_titles: Vec<String>,
        milestone_percentages: Vec<u32>,
        metadata: ProjectMetadata,
    ) -> Result<u64, Error> {
        creator.require_auth();
        storage::get_oracle(&env)?;

        if name.len() == 0 {
            return Err(Error::InvalidProject);
        }
        if target <= 0 {
            return Err(Error::InvalidAmount);
        }
        let count = milestone_titles.len();
        if count == 0 || count != milestone_percentages.len() {
            return Err(Error::InvalidMilestones);
        }
        let mut total: u32 = 0;
        for percentage in milestone_percentages.iter() {
            if percentage == 0 || percentage > 100 {
                return Err(Error::InvalidMilestones);
            }
            total = total
                .checked_add(percentage)
                .ok_or(Error::InvalidMilestones)?;
        }
        if total != 100 {
            return Err(Error::InvalidMilestones);
        }
        if !metadata.thresholds.is_empty() && metadata.thresholds.len() != count {
            return Err(Error::InvalidMilestones);
        }

        let id = storage::get_and_increment_project_id(&env);
        let mut milestones = Vec::new(&env);
        for (title, percentage) in milestone_titles.iter().zip(milestone_percentages.iter()) {
            milestones.push_back(Milestone {
                title,
                percentage,
                completed: false,
                completed_at: None,
            });
        }
        let config = ProjectConfig {
            id,
            name: name.clone(),
            description,
            creator: creator.clone(),
            target,
            created_at: env.ledger().timestamp(),
            metadata,
        };
        let state = ProjectState {
            funds_raised: 0,
            funds_released: 0,
            active: true,
        };
        storage::save_project(&env, &config, &state, &milestones);

        events::emit_project_created(&env, id, creator, name, target);
        Ok(id)
    }

    /// Move `amount` of the escrow asset from `funder` into the contract and
    /// credit it to the project. Returns the new raised total.
    pub fn fund_project(
        env: Env,
        project_id: u64,
        funder: Address,
        amount: i128,
    ) -> Result<i128, Error> {
        funder.require_auth();

        let mut state = load_active_state(&env, project_id)?;
        if amount <= 0 {
            return Err(Error::InvalidAmount);
        }
        let total_raised = state
            .funds_raised
            .checked_add(amount)
            .ok_or(Error::ArithmeticOverflow)?;
        let contribution = storage::load_contribution(&env, project_id, &funder)
            .checked_add(amount)
            .ok_or(Error::ArithmeticOverflow)?;

        let token = token::Client::new(&env, &storage::get_token(&env)?);
        token.transfer(&funder, &env.current_contract_address(), &amount);

        state.funds_raised = total_raised;
        storage::save_project_state(&env, project_id, &state);
        storage::save_contribution(&env, project_id, &funder, contribution);

        events::emit_funded(&env, project_id, funder, amount, total_raised);
        Ok(total_raised)
    }

    /// Oracle attestation that milestone `milestone_index` was met.
    ///
    /// Marks it complete and pays the creator the milestone's share of the
    /// raised total. Returns the released amount.
    pub fn verify_milestone(
        env: Env,
        project_id: u64,
        milestone_index: u32,
        caller: Address,
    ) -> Result<i128, Error> {
        caller.require_auth();
        if caller != storage::get_oracle(&env)? {
            return Err(Error::NotAuthorized);
        }

        let mut state = load_active_state(&env, project_id)?;
        let mut milestones = storage::load_milestones(&env, project_id)?;
        let mut milestone = milestones
            .get(milestone_index)
            .ok_or(Error::MilestoneNotFound)?;
        if milestone.completed {
            return Err(Error::AlreadyCompleted);
        }

        let token = token::Client::new(&env, &storage::get_token(&env)?);
        let escrow = env.current_contract_address();
        let release = compute_release(state.funds_raised, milestone.percentage, token.balance(&escrow))?;
        let released_total = state
            .funds_released
            .checked_add(release)
            .ok_or(Error::ArithmeticOverflow)?;
        let config = storage::load_project_config(&env, project_id)?;

        milestone.completed = true;
        milestone.completed_at = Some(env.ledger().timestamp());
        milestones.set(milestone_index, milestone.clone());
        storage::save_milestones(&env, project_id, &milestones);
        state.funds_released = released_total;
        storage::save_project_state(&env, project_id, &state);

        token.transfer(&escrow, &config.creator, &release);

        events::emit_milestone_verified(&env, project_id, milestone_index, milestone.title);
        events::emit_funds_released(&env, project_id, config.creator, release, milestone_index);
        Ok(release)
    }

    /// Close a project to further funding and verification. Creator only.
    ///
    /// Returns the amount left in escrow for this project; it stays there.
    pub fn deactivate_project(env: Env, project_id: u64, caller: Address) -> Result<i128, Error> {
        caller.require_auth();
        let config = storage::load_project_config(&env, project_id)?;
        if caller != config.creator {
            return Err(Error::NotAuthorized);
        }
        let mut state = load_active_state(&env, project_id)?;

        state.active = false;
        storage::save_project_state(&env, project_id, &state);

        let undisbursed = state.funds_raised - state.funds_released;
        events::emit_project_deactivated(&env, project_id, undisbursed);
        Ok(undisbursed)
    }

    /// Hand the oracle role to `new_oracle`. Current oracle only.
    pub fn update_oracle(env: Env, new_oracle: Address, caller: Address) -> Result<(), Error> {
        caller.require_auth();
        let old = storage::get_oracle(&env)?;
        if caller != old {
            return Err(Error::NotAuthorized);
        }
        storage::set_oracle(&env, &new_oracle);
        events::emit_oracle_updated(&env, old, new_oracle);
        Ok(())
    }

    pub fn get_project(env: Env, project_id: u64) -> Result<Project, Error> {
        let config = storage::load_project_config(&env, project_id)?;
        let state = storage::load_project_state(&env, project_id)?;
        let milestones = storage::load_milestones(&env, project_id)?;
        Ok(Project {
            id: config.id,
            name: config.name,
            description: config.description,
            creator: config.creator,
            target: config.target,
            funds_raised: state.funds_raised,
            funds_released: state.funds_released,
            active: state.active,
            created_at: config.created_at,
            metadata: config.metadata,
            milestone_count: milestones.len(),
        })
    }

    pub fn get_milestones(env: Env, project_id: u64) -> Result<Vec<Milestone>, Error> {
        storage::load_milestones(&env, project_id)
    }

    /// Cumulative amount `funder` put into the project; zero if none.
    pub fn get_contribution(env: Env, project_id: u64, funder: Address) -> Result<i128, Error> {
        storage::load_project_config(&env, project_id)?;
        Ok(storage::load_contribution(&env, project_id, &funder))
    }

    pub fn get_all_project_ids(env: Env) -> Vec<u64> {
        let mut ids = Vec::new(&env);
        for id in 0..storage::project_count(&env) {
            ids.push_back(id);
        }
        ids
    }

    /// Escrow asset held by this contract, across every project.
    pub fn get_contract_balance(env: Env) -> Result<i128, Error> {
        let token = token::Client::new(&env, &storage::get_token(&env)?);
        Ok(token.balance(&env.current_contract_address()))
    }

    pub fn get_oracle(env: Env) -> Result<Address, Error> {
        storage::get_oracle(&env)
    }

    pub fn get_token(env: Env) -> Result<Address, Error> {
        storage::get_token(&env)
    }

    /// Sequence number of the most recent event, 0 before the first.
    pub fn last_event_seq(env: Env) -> u64 {
        storage::last_event_seq(&env)
    }
}

fn load_active_state(env: &Env, project_id: u64) -> Result<ProjectState, Error> {
    let state = storage::load_project_state(env, project_id)?;
    if !state.active {
        return Err(Error::InactiveProject);
    }
    Ok(state)
}
