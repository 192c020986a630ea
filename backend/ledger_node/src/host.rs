//! In-process host for the escrow contract.
//!
//! The soroban [`Env`] is single-threaded, so one dedicated thread owns it
//! together with the deployed escrow, its asset, the fee asset, and the
//! directory that maps principals to ledger addresses. Async code reaches it
//! through [`HostHandle::call`], which ships a closure to that thread and
//! awaits the reply.
//!
//! Signatures are checked before a command gets here, so the host runs with
//! every `require_auth` satisfied on the signer's behalf.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;

use ledger_api::{auth, Amount, EscrowEvent, EventRecord, Milestone, NewProject, Project, ProjectMetadata};
use milestone_escrow::events::{self as escrow_events, TOPIC_CREATED, TOPIC_DEACTIVATED, TOPIC_FUNDED, TOPIC_ORACLE, TOPIC_RELEASED, TOPIC_VERIFIED};
use milestone_escrow::{Error as EscrowError, MilestoneEscrow, MilestoneEscrowClient};
use serde::{Deserialize, Serialize};
use soroban_sdk::testutils::{Address as _, EnvTestConfig, Events as _, Ledger as _};
use soroban_sdk::token::{Client as TokenClient, StellarAssetClient};
use soroban_sdk::{Address, Env, String as SorobanString, Symbol, TryFromVal, TryIntoVal, Val, Vec as SorobanVec};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::errors::{NodeError, Result};

/// Parameters fixed when a ledger is first created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Genesis {
    pub oracle: String,
    /// Fee asset minted to the genesis oracle.
    pub fee_allowance: Amount,
    /// Fee asset burned from the oracle per accepted submission.
    pub submission_fee: Amount,
}

/// One state-changing operation, as journaled and replayed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    CreateProject {
        creator: String,
        project: NewProject,
    },
    Fund {
        project_id: u64,
        funder: String,
        #[serde(with = "ledger_api::amount")]
        amount: Amount,
    },
    Verify {
        project_id: u64,
        milestone_index: u32,
        caller: String,
    },
    Deactivate {
        project_id: u64,
        caller: String,
    },
    UpdateOracle {
        caller: String,
        new_oracle: String,
    },
    DepositFees {
        payer: String,
        account: String,
        #[serde(with = "ledger_api::amount")]
        amount: Amount,
    },
}

impl Command {
    /// The principal whose signature authorized the command.
    pub fn principal(&self) -> &str {
        match self {
            Self::CreateProject { creator, .. } => creator,
            Self::Fund { funder, .. } => funder,
            Self::Verify { caller, .. }
            | Self::Deactivate { caller, .. }
            | Self::UpdateOracle { caller, .. } => caller,
            Self::DepositFees { payer, .. } => payer,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Created(u64),
    Amount(Amount),
    Done,
}

impl Outcome {
    pub fn project_id(&self) -> Result<u64> {
        match self {
            Self::Created(id) => Ok(*id),
            other => Err(NodeError::Host(format!("expected a project id, got {other:?}"))),
        }
    }

    pub fn amount(&self) -> Result<Amount> {
        match self {
            Self::Amount(amount) => Ok(*amount),
            other => Err(NodeError::Host(format!("expected an amount, got {other:?}"))),
        }
    }
}

#[derive(Debug)]
pub struct Executed {
    pub outcome: Outcome,
    pub events: Vec<EventRecord>,
    pub last_seq: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Holdings {
    pub balance: Amount,
    pub fee_balance: Amount,
}

pub struct EscrowHost {
    env: Env,
    escrow: MilestoneEscrowClient<'static>,
    asset: TokenClient<'static>,
    asset_admin: StellarAssetClient<'static>,
    fee_asset: TokenClient<'static>,
    fee_admin: StellarAssetClient<'static>,
    submission_fee: Amount,
    accounts: HashMap<String, Address>,
    principals: BTreeMap<Address, String>,
    last_seq: u64,
}

impl EscrowHost {
    /// Deploy both assets and the escrow, and seed the oracle's fee balance.
    pub fn genesis(genesis: &Genesis) -> Result<Self> {
        auth::parse_principal(&genesis.oracle)
            .map_err(|e| NodeError::Config(format!("genesis oracle: {e}")))?;

        let env = Env::new_with_config(EnvTestConfig {
            capture_snapshot_at_drop: false,
        });
        env.mock_all_auths();

        let issuer = Address::generate(&env);
        let asset = env.register_stellar_asset_contract_v2(issuer.clone()).address();
        let fee_asset = env.register_stellar_asset_contract_v2(issuer).address();
        let escrow_id = env.register(MilestoneEscrow, ());

        let mut host = Self {
            escrow: MilestoneEscrowClient::new(&env, &escrow_id),
            asset: TokenClient::new(&env, &asset),
            asset_admin: StellarAssetClient::new(&env, &asset),
            fee_asset: TokenClient::new(&env, &fee_asset),
            fee_admin: StellarAssetClient::new(&env, &fee_asset),
            submission_fee: genesis.submission_fee,
            accounts: HashMap::new(),
            principals: BTreeMap::new(),
            last_seq: 0,
            env,
        };

        let oracle = host.address_of(&genesis.oracle);
        settle(host.escrow.try_init(&oracle, &host.asset.address))?;
        if genesis.fee_allowance > 0 {
            settle_token(
                host.fee_admin.try_mint(&oracle, &genesis.fee_allowance),
                "mint fee allowance",
            )?;
        }
        Ok(host)
    }

    /// Run one command at ledger time `timestamp`.
    ///
    /// A rejected command leaves the escrow and every balance as it found them.
    pub fn execute(&mut self, command: &Command, timestamp: u64) -> Result<Executed> {
        self.env.ledger().set_timestamp(timestamp);
        let outcome = match command {
            Command::CreateProject { creator, project } => {
                Outcome::Created(self.create_project(creator, project)?)
            }
            Command::Fund {
                project_id,
                funder,
                amount,
            } => Outcome::Amount(self.fund(*project_id, funder, *amount)?),
            Command::Verify {
                project_id,
                milestone_index,
                caller,
            } => Outcome::Amount(self.verify(*project_id, *milestone_index, caller)?),
            Command::Deactivate { project_id, caller } => {
                let caller = self.address_of(caller);
                Outcome::Amount(settle(self.escrow.try_deactivate_project(project_id, &caller))?)
            }
            Command::UpdateOracle { caller, new_oracle } => {
                self.update_oracle(caller, new_oracle)?;
                Outcome::Done
            }
            Command::DepositFees { account, amount, .. } => {
                Outcome::Amount(self.deposit_fees(account, *amount)?)
            }
        };
        let events = self.drain_events(timestamp)?;
        Ok(Executed {
            outcome,
            events,
            last_seq: self.last_seq,
        })
    }

    fn create_project(&mut self, creator: &str, project: &NewProject) -> Result<u64> {
        if project.name.trim().is_empty() {
            return Err(NodeError::Validation("project name must not be blank".to_string()));
        }
        let creator = self.address_of(creator);
        let mut titles = SorobanVec::new(&self.env);
        for title in &project.milestone_titles {
            titles.push_back(self.text_in(title));
        }
        let mut percentages = SorobanVec::new(&self.env);
        for percentage in &project.milestone_percentages {
            percentages.push_back(*percentage);
        }
        let metadata = self.metadata_in(&project.metadata);
        settle(self.escrow.try_create_project(
            &creator,
            &self.text_in(&project.name),
            &self.text_in(&project.description),
            &project.target,
            &titles,
            &percentages,
            &metadata,
        ))
    }

    /// Deposit gateway: mint the contribution to the funder, then move it
    /// into escrow. The mint is burned again if the escrow refuses it.
    fn fund(&mut self, project_id: u64, funder: &str, amount: Amount) -> Result<Amount> {
        let funder = self.address_of(funder);
        if amount <= 0 {
            return settle(self.escrow.try_fund_project(&project_id, &funder, &amount));
        }
        settle_token(self.asset_admin.try_mint(&funder, &amount), "mint deposit")?;
        match settle(self.escrow.try_fund_project(&project_id, &funder, &amount)) {
            Ok(total) => Ok(total),
            Err(e) => {
                settle_token(self.asset.try_burn(&funder, &amount), "return deposit")?;
                Err(e)
            }
        }
    }

    fn verify(&mut self, project_id: u64, milestone_index: u32, caller: &str) -> Result<Amount> {
        let caller = self.address_of(caller);
        let metered = self.check_fee(&caller)?;
        let released = settle(self.escrow.try_verify_milestone(&project_id, &milestone_index, &caller))?;
        if metered {
            self.charge_fee(&caller)?;
        }
        Ok(released)
    }

    fn update_oracle(&mut self, caller: &str, new_oracle: &str) -> Result<()> {
        auth::parse_principal(new_oracle)
            .map_err(|e| NodeError::Validation(format!("new oracle: {e}")))?;
        let caller = self.address_of(caller);
        let metered = self.check_fee(&caller)?;
        let new_oracle = self.address_of(new_oracle);
        settle(self.escrow.try_update_oracle(&new_oracle, &caller))?;
        if metered {
            self.charge_fee(&caller)?;
        }
        Ok(())
    }

    fn deposit_fees(&mut self, account: &str, amount: Amount) -> Result<Amount> {
        auth::parse_principal(account).map_err(|e| NodeError::Validation(format!("account: {e}")))?;
        if amount <= 0 {
            return Err(NodeError::Escrow(EscrowError::InvalidAmount));
        }
        let account = self.address_of(account);
        settle_token(self.fee_admin.try_mint(&account, &amount), "mint fees")?;
        Ok(self.fee_asset.balance(&account))
    }

    /// Oracle submissions are metered; anyone else is left for the escrow
    /// to turn away. Returns whether a fee applies.
    fn check_fee(&self, caller: &Address) -> Result<bool> {
        if self.submission_fee == 0 || *caller != settle(self.escrow.try_get_oracle())? {
            return Ok(false);
        }
        let available = self.fee_asset.balance(caller);
        if available < self.submission_fee {
            return Err(NodeError::InsufficientFee {
                required: self.submission_fee,
                available,
            });
        }
        Ok(true)
    }

    fn charge_fee(&self, caller: &Address) -> Result<()> {
        settle_token(self.fee_asset.try_burn(caller, &self.submission_fee), "charge fee")
    }

    // ── queries ──────────────────────────────────────────────────────

    pub fn project(&self, project_id: u64) -> Result<Project> {
        let p = settle(self.escrow.try_get_project(&project_id))?;
        Ok(Project {
            id: p.id,
            name: text(&p.name),
            description: text(&p.description),
            creator: self.principal_of(&p.creator)?,
            target: p.target,
            funds_raised: p.funds_raised,
            funds_released: p.funds_released,
            active: p.active,
            created_at: p.created_at,
            metadata: ProjectMetadata {
                category: p.metadata.category.as_ref().map(text),
                evidence_subject: p.metadata.evidence_subject.as_ref().map(text),
                thresholds: p.metadata.thresholds.iter().collect(),
            },
            milestone_count: p.milestone_count,
        })
    }

    pub fn milestones(&self, project_id: u64) -> Result<Vec<Milestone>> {
        let milestones = settle(self.escrow.try_get_milestones(&project_id))?;
        Ok(milestones
            .iter()
            .map(|m| Milestone {
                title: text(&m.title),
                percentage: m.percentage,
                completed: m.completed,
                completed_at: m.completed_at,
            })
            .collect())
    }

    pub fn contribution(&self, project_id: u64, funder: &str) -> Result<Amount> {
        match self.accounts.get(funder) {
            Some(address) => settle(self.escrow.try_get_contribution(&project_id, address)),
            None => settle(self.escrow.try_get_project(&project_id)).map(|_| 0),
        }
    }

    pub fn project_ids(&self) -> Vec<u64> {
        self.escrow.get_all_project_ids().iter().collect()
    }

    pub fn contract_balance(&self) -> Result<Amount> {
        settle(self.escrow.try_get_contract_balance())
    }

    pub fn oracle(&self) -> Result<String> {
        let oracle = settle(self.escrow.try_get_oracle())?;
        self.principal_of(&oracle)
    }

    pub fn holdings(&self, principal: &str) -> Holdings {
        match self.accounts.get(principal) {
            Some(address) => Holdings {
                balance: self.asset.balance(address),
                fee_balance: self.fee_asset.balance(address),
            },
            None => Holdings::default(),
        }
    }

    /// Sequence number of the escrow's latest event.
    pub fn last_event_seq(&self) -> u64 {
        self.escrow.last_event_seq()
    }

    // ── plumbing ─────────────────────────────────────────────────────

    /// Ledger address for `principal`, allocated on first sight.
    fn address_of(&mut self, principal: &str) -> Address {
        if let Some(address) = self.accounts.get(principal) {
            return address.clone();
        }
        let address = Address::generate(&self.env);
        self.accounts.insert(principal.to_string(), address.clone());
        self.principals.insert(address.clone(), principal.to_string());
        address
    }

    fn principal_of(&self, address: &Address) -> Result<String> {
        self.principals
            .get(address)
            .cloned()
            .ok_or_else(|| NodeError::Host("escrow returned an address outside the directory".to_string()))
    }

    fn text_in(&self, value: &str) -> SorobanString {
        SorobanString::from_str(&self.env, value)
    }

    fn metadata_in(&self, metadata: &ProjectMetadata) -> milestone_escrow::ProjectMetadata {
        let mut thresholds = SorobanVec::new(&self.env);
        for threshold in &metadata.thresholds {
            thresholds.push_back(*threshold);
        }
        milestone_escrow::ProjectMetadata {
            category: metadata.category.as_deref().map(|c| self.text_in(c)),
            evidence_subject: metadata.evidence_subject.as_deref().map(|s| self.text_in(s)),
            thresholds,
        }
    }

    /// Escrow events newer than the last one seen, oldest first.
    fn drain_events(&mut self, timestamp: u64) -> Result<Vec<EventRecord>> {
        let mut records = Vec::new();
        for (contract, topics, data) in self.env.events().all().iter() {
            if contract != self.escrow.address {
                continue;
            }
            let Some(topic) = topics.get(0) else {
                continue;
            };
            let topic = Symbol::try_from_val(&self.env, &topic)
                .map_err(|e| NodeError::Host(format!("unreadable event topic: {e:?}")))?;
            let (seq, event) = self.decode_event(topic, data)?;
            if seq > self.last_seq {
                records.push(EventRecord {
                    seq,
                    timestamp,
                    event,
                });
            }
        }
        records.sort_by_key(|r| r.seq);
        if let Some(last) = records.last() {
            self.last_seq = last.seq;
        }
        Ok(records)
    }

    fn decode_event(&self, topic: Symbol, data: Val) -> Result<(u64, EscrowEvent)> {
        if topic == TOPIC_CREATED {
            let e: escrow_events::ProjectCreated = self.decode(data)?;
            Ok((
                e.seq,
                EscrowEvent::ProjectCreated {
                    project_id: e.project_id,
                    creator: self.principal_of(&e.creator)?,
                    name: text(&e.name),
                    target: e.target,
                    timestamp: e.timestamp,
                },
            ))
        } else if topic == TOPIC_FUNDED {
            let e: escrow_events::Funded = self.decode(data)?;
            Ok((
                e.seq,
                EscrowEvent::Funded {
                    project_id: e.project_id,
                    funder: self.principal_of(&e.funder)?,
                    amount: e.amount,
                    total_raised: e.total_raised,
                },
            ))
        } else if topic == TOPIC_VERIFIED {
            let e: escrow_events::MilestoneVerified = self.decode(data)?;
            Ok((
                e.seq,
                EscrowEvent::MilestoneVerified {
                    project_id: e.project_id,
                    milestone_index: e.milestone_index,
                    title: text(&e.title),
                    timestamp: e.timestamp,
                },
            ))
        } else if topic == TOPIC_RELEASED {
            let e: escrow_events::FundsReleased = self.decode(data)?;
            Ok((
                e.seq,
                EscrowEvent::FundsReleased {
                    project_id: e.project_id,
                    creator: self.principal_of(&e.creator)?,
                    amount: e.amount,
                    milestone_index: e.milestone_index,
                },
            ))
        } else if topic == TOPIC_ORACLE {
            let e: escrow_events::OracleUpdated = self.decode(data)?;
            Ok((
                e.seq,
                EscrowEvent::OracleUpdated {
                    old: self.principal_of(&e.old)?,
                    new: self.principal_of(&e.new)?,
                },
            ))
        } else if topic == TOPIC_DEACTIVATED {
            let e: escrow_events::ProjectDeactivated = self.decode(data)?;
            Ok((
                e.seq,
                EscrowEvent::ProjectDeactivated {
                    project_id: e.project_id,
                    undisbursed: e.undisbursed,
                },
            ))
        } else {
            Err(NodeError::Host(format!("unknown escrow event topic {topic:?}")))
        }
    }

    fn decode<T: TryFromVal<Env, Val>>(&self, data: Val) -> Result<T>
    where
        T::Error: Debug,
    {
        data.try_into_val(&self.env)
            .map_err(|e| NodeError::Host(format!("unreadable event payload: {e:?}")))
    }
}

fn text(value: &SorobanString) -> String {
    let mut buf = vec![0u8; value.len() as usize];
    value.copy_into_slice(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

/// Flatten a contract `try_` result: escrow errors stay typed, anything else
/// means the host itself misbehaved.
fn settle<T, C: Debug, I: Debug>(result: std::result::Result<std::result::Result<T, C>, std::result::Result<EscrowError, I>>) -> Result<T> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(NodeError::Host(format!("unreadable contract result: {e:?}"))),
        Err(Ok(e)) => Err(NodeError::Escrow(e)),
        Err(Err(e)) => Err(NodeError::Host(format!("contract invocation aborted: {e:?}"))),
    }
}

fn settle_token<T, C: Debug, E: Debug, I: Debug>(
    result: std::result::Result<std::result::Result<T, C>, std::result::Result<E, I>>,
    action: &str,
) -> Result<T> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(NodeError::Host(format!("{action}: unreadable result {e:?}"))),
        Err(Ok(e)) => Err(NodeError::Host(format!("{action}: {e:?}"))),
        Err(Err(e)) => Err(NodeError::Host(format!("{action}: aborted {e:?}"))),
    }
}

type Job = Box<dyn FnOnce(&mut EscrowHost) + Send>;

/// Cloneable handle to the host thread. The thread exits when the last
/// handle is dropped.
#[derive(Clone)]
pub struct HostHandle {
    jobs: mpsc::UnboundedSender<Job>,
}

impl HostHandle {
    pub async fn spawn(genesis: Genesis) -> Result<Self> {
        let (jobs, mut queue) = mpsc::unbounded_channel::<Job>();
        let (ready_tx, ready_rx) = oneshot::channel();

        std::thread::Builder::new()
            .name("escrow-host".to_string())
            .spawn(move || {
                let mut host = match EscrowHost::genesis(&genesis) {
                    Ok(host) => {
                        let _ = ready_tx.send(Ok(()));
                        host
                    }
                    Err(e) => {
                        error!("Escrow genesis failed: {e}");
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                while let Some(job) = queue.blocking_recv() {
                    job(&mut host);
                }
                debug!("Escrow host stopped");
            })
            .map_err(|e| NodeError::Host(format!("failed to start escrow host: {e}")))?;

        ready_rx
            .await
            .map_err(|_| NodeError::Host("escrow host exited during genesis".to_string()))??;
        Ok(Self { jobs })
    }

    /// Run `f` on the host thread and return its result.
    pub async fn call<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut EscrowHost) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        self.jobs
            .send(Box::new(move |host| {
                let _ = reply.send(f(host));
            }))
            .map_err(|_| NodeError::Unavailable("escrow host stopped".to_string()))?;
        response
            .await
            .map_err(|_| NodeError::Unavailable("escrow host stopped".to_string()))
    }
}
