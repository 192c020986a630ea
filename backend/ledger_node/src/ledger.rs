//! Durable wrapper around the hosted escrow.
//!
//! Writes are serialized by a single mutex. Each command runs on the escrow
//! host, and the journal entry plus the events it produced are committed to
//! SQLite before the caller hears back. Reads go straight to the host.
//!
//! The host cannot roll back a command that already ran, so a failed commit
//! poisons the ledger: writes are refused until a restart replays the journal.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use ledger_api::EventRecord;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::db::{self, JournalEntry};
use crate::errors::{NodeError, Result};
use crate::host::{Command, EscrowHost, Genesis, HostHandle, Outcome};

pub struct Ledger {
    pool: SqlitePool,
    host: HostHandle,
    write: Mutex<()>,
    poisoned: AtomicBool,
}

/// Result of a committed command.
#[derive(Debug)]
pub struct Applied {
    pub outcome: Outcome,
    /// Sequence number of the newest event once the command is applied.
    pub last_seq: u64,
}

impl Ledger {
    /// Restore the ledger by replaying the journal, or start a new one from
    /// `genesis` when nothing has been persisted yet.
    pub async fn open(pool: SqlitePool, genesis: Option<Genesis>) -> Result<Self> {
        let genesis = match db::load_genesis(&pool).await? {
            Some(stored) => stored,
            None => {
                let genesis = genesis.ok_or_else(|| {
                    NodeError::Config(
                        "ORACLE_ADDRESS environment variable is required to start a new ledger"
                            .to_string(),
                    )
                })?;
                info!("Starting new ledger with oracle {}", genesis.oracle);
                db::save_genesis(&pool, &genesis).await?;
                genesis
            }
        };

        let host = HostHandle::spawn(genesis).await?;
        let journal = db::load_journal(&pool).await?;
        let entries = journal.len();
        let replayed = host.call(move |host| replay(host, journal)).await??;

        let stored = db::last_event_seq(&pool).await?;
        if replayed != stored {
            return Err(NodeError::Host(format!(
                "journal replay reached event {replayed} but {stored} events are stored"
            )));
        }
        info!("Restored ledger from {entries} journal entries up to event {stored}");

        Ok(Self {
            pool,
            host,
            write: Mutex::new(()),
            poisoned: AtomicBool::new(false),
        })
    }

    /// Run one signed command atomically and durably.
    ///
    /// A rejected command changes nothing; a signature is accepted once.
    pub async fn submit(&self, signature: &str, command: Command) -> Result<Applied> {
        let _guard = self.write.lock().await;
        if self.poisoned.load(Ordering::SeqCst) {
            return Err(NodeError::Unavailable(
                "ledger storage fell behind the escrow; restart the node to replay the journal"
                    .to_string(),
            ));
        }
        if db::signature_used(&self.pool, signature).await? {
            return Err(NodeError::Replayed);
        }

        let timestamp = Utc::now().timestamp().max(0) as u64;
        let job = command.clone();
        let executed = match self.host.call(move |host| host.execute(&job, timestamp)).await? {
            Ok(executed) => executed,
            Err(e @ NodeError::Host(_)) => {
                self.poison(&e);
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let entry = JournalEntry {
            signature: signature.to_string(),
            command,
            timestamp,
        };
        if let Err(e) = db::commit(&self.pool, &entry, &executed.events).await {
            self.poison(&e);
            return Err(e);
        }
        debug!(
            "Committed {} by {} with {} events",
            op_name(&entry.command),
            entry.command.principal(),
            executed.events.len()
        );

        Ok(Applied {
            outcome: executed.outcome,
            last_seq: executed.last_seq,
        })
    }

    /// Run a read against the host.
    pub async fn query<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&EscrowHost) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.host.call(move |host| f(host)).await?
    }

    /// Committed events with `seq > after`, at most `limit` of them.
    pub async fn events_after(&self, after: u64, limit: u32) -> Result<Vec<EventRecord>> {
        db::events_after(&self.pool, after, limit).await
    }

    pub async fn last_event_seq(&self) -> Result<u64> {
        db::last_event_seq(&self.pool).await
    }

    fn poison(&self, cause: &NodeError) {
        error!("Ledger poisoned, refusing writes until restart: {cause}");
        self.poisoned.store(true, Ordering::SeqCst);
    }
}

fn replay(host: &mut EscrowHost, journal: Vec<JournalEntry>) -> Result<u64> {
    let mut last_seq = 0;
    for entry in journal {
        let executed = host.execute(&entry.command, entry.timestamp).map_err(|e| {
            NodeError::Host(format!(
                "journal entry {} failed to replay: {e}",
                entry.signature
            ))
        })?;
        last_seq = executed.last_seq;
    }
    Ok(last_seq)
}

fn op_name(command: &Command) -> &'static str {
    match command {
        Command::CreateProject { .. } => "create_project",
        Command::Fund { .. } => "fund",
        Command::Verify { .. } => "verify",
        Command::Deactivate { .. } => "deactivate",
        Command::UpdateOracle { .. } => "update_oracle",
        Command::DepositFees { .. } => "deposit_fees",
    }
}
