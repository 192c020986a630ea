//! Ledger event subscription.
//!
//! Polls the ledger's event stream from the persisted cursor, logs every
//! event and reacts to funding with an immediate verification attempt. The
//! stream is at-least-once, so each event is first claimed in `seen_events`
//! by its dedup key and handled only if the claim is new.
//!
//! ## Resilience
//!
//! * Exponential back-off is applied when the ledger cannot be reached, up to
//!   [`MAX_BACKOFF_SECS`] seconds.
//! * The cursor only advances past events that were handled.
//! * Dedup claims at or below the cursor are pruned as it advances; the
//!   cursor itself keeps rejecting those events.

use std::sync::Arc;
use std::time::Duration;

use ledger_api::{EscrowEvent, EventRecord};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::db;
use crate::errors::Result;
use crate::verifier::Verifier;

const MAX_BACKOFF_SECS: u64 = 60;
const INITIAL_BACKOFF_SECS: u64 = 2;
const EVENTS_PER_PAGE: u32 = 100;

/// Follow the event stream until `cancel` fires.
pub async fn run(verifier: Arc<Verifier>, every: Duration, cancel: CancellationToken) {
    let mut cursor = match db::get_cursor(verifier.pool()).await {
        Ok(seq) => seq,
        Err(e) => {
            warn!("Could not load event cursor, starting from 0: {e}");
            0
        }
    };
    info!("Event subscription resuming after seq {cursor}");

    let mut delay = Duration::ZERO;
    let mut backoff = INITIAL_BACKOFF_SECS;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Event subscription shutting down");
                break;
            }
            _ = tokio::time::sleep(delay) => {
                match poll_once(&verifier, &mut cursor).await {
                    Ok(handled) => {
                        if handled > 0 {
                            debug!("Handled {handled} events; cursor now {cursor}");
                        }
                        backoff = INITIAL_BACKOFF_SECS;
                        delay = every;
                    }
                    Err(e) => {
                        warn!("Event poll failed (will retry in {backoff}s): {e}");
                        delay = Duration::from_secs(backoff);
                        backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
                    }
                }
            }
        }
    }
}

/// Fetch and handle one page of events. Returns how many new events were
/// handled; duplicates are skipped but still move the cursor.
pub async fn poll_once(verifier: &Verifier, cursor: &mut u64) -> Result<usize> {
    let events = verifier
        .ledger()
        .events_since(*cursor, EVENTS_PER_PAGE)
        .await?;

    let mut handled = 0;
    for record in events {
        if record.seq <= *cursor {
            continue;
        }
        let fresh = db::mark_seen(
            verifier.pool(),
            &record.dedup_key(),
            record.seq,
            record.event.kind().as_str(),
        )
        .await?;
        if fresh {
            handle(verifier, &record).await;
            handled += 1;
        } else {
            debug!("Duplicate event {} ignored", record.dedup_key());
        }
        *cursor = record.seq;
        db::save_cursor(verifier.pool(), *cursor).await?;
    }
    Ok(handled)
}

async fn handle(verifier: &Verifier, record: &EventRecord) {
    match &record.event {
        EscrowEvent::ProjectCreated {
            project_id, name, ..
        } => {
            info!("[{}] project {project_id} created: {name}", record.seq);
            trigger(verifier, *project_id).await;
        }
        EscrowEvent::Funded {
            project_id,
            amount,
            total_raised,
            ..
        } => {
            info!(
                "[{}] project {project_id} funded with {amount} (total {total_raised})",
                record.seq
            );
            trigger(verifier, *project_id).await;
        }
        EscrowEvent::MilestoneVerified {
            project_id,
            milestone_index,
            title,
            ..
        } => {
            info!(
                "[{}] project {project_id} milestone {milestone_index} verified: {title}",
                record.seq
            );
        }
        EscrowEvent::FundsReleased {
            project_id,
            creator,
            amount,
            milestone_index,
        } => {
            info!(
                "[{}] released {amount} to {creator} for project {project_id} milestone {milestone_index}",
                record.seq
            );
        }
        EscrowEvent::OracleUpdated { old, new } => {
            if new == verifier.identity() {
                info!("[{}] oracle rotated from {old} to this service", record.seq);
            } else {
                warn!(
                    "[{}] oracle rotated from {old} to {new}; this service can no longer attest",
                    record.seq
                );
            }
        }
        EscrowEvent::ProjectDeactivated {
            project_id,
            undisbursed,
        } => {
            info!(
                "[{}] project {project_id} deactivated with {undisbursed} undisbursed",
                record.seq
            );
        }
    }
}

async fn trigger(verifier: &Verifier, project_id: u64) {
    match verifier.attempt_project(project_id).await {
        Ok(Some(outcome)) => debug!(
            "Event-driven attempt on project {project_id}: {}",
            outcome.as_str()
        ),
        Ok(None) => {}
        Err(e) => warn!("Event-driven attempt on project {project_id} failed: {e}"),
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
