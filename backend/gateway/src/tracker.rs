//! Submission tracking.
//!
//! A submission moves through an explicit state machine:
//!
//! ```text
//! Idle ──► Pending ──► Resolved(Success)
//!             │   └──► Resolved(Failure)
//!             ├──► Unknown ──► (lookup again) ──► …
//!             └──► TimedOut
//! ```
//!
//! `Resolved(_)` and `TimedOut` are terminal. `Unknown` means the order
//! history had no record for the job yet; it is never reported as a failure.
//! [`resolve`] performs one lookup; [`track`] repeats lookups with bounded
//! exponential back-off.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::db;
use crate::errors::Result;
use crate::wallet::{IntentType, JobHandle, OrderFilter, OrderRecord, WalletService};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "outcome", rename_all = "snake_case")]
pub enum SubmissionState {
    Idle,
    Pending,
    Resolved(Outcome),
    Unknown,
    TimedOut,
}

impl SubmissionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved(_) | Self::TimedOut)
    }

    /// Storage form used in the submissions table.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Resolved(Outcome::Success) => "success",
            Self::Resolved(Outcome::Failure) => "failure",
            Self::Unknown => "unknown",
            Self::TimedOut => "timed_out",
        }
    }

    pub fn from_db(raw: &str) -> Self {
        match raw {
            "idle" => Self::Idle,
            "pending" => Self::Pending,
            "success" => Self::Resolved(Outcome::Success),
            "failure" => Self::Resolved(Outcome::Failure),
            "timed_out" => Self::TimedOut,
            _ => Self::Unknown,
        }
    }

    /// Map an order-history record (or its absence) onto a state.
    pub fn from_order(order: Option<&OrderRecord>) -> Self {
        match order.map(|o| o.status.to_ascii_uppercase()) {
            None => Self::Unknown,
            Some(status) => match status.as_str() {
                "SUCCESSFUL" | "SUCCESS" => Self::Resolved(Outcome::Success),
                "FAILED" | "REJECTED" => Self::Resolved(Outcome::Failure),
                "PENDING" | "IN_PROGRESS" => Self::Pending,
                _ => Self::Unknown,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    #[serde(flatten)]
    pub state: SubmissionState,
    pub order: Option<OrderRecord>,
    pub attempts: u32,
}

/// Look the job up once in the order history. The first matching record wins.
pub async fn resolve(
    wallet: &dyn WalletService,
    session: &str,
    job: &JobHandle,
    intent: IntentType,
) -> Result<Resolution> {
    let filter = OrderFilter {
        intent_id: job.clone(),
        intent_type: intent,
    };
    let order = wallet
        .get_orders_history(session, &filter)
        .await?
        .into_iter()
        .next();
    Ok(Resolution {
        state: SubmissionState::from_order(order.as_ref()),
        order,
        attempts: 1,
    })
}

/// Poll until the job reaches a terminal state or the attempt budget runs out.
///
/// Lookup errors count as attempts and are otherwise ignored; the wallet
/// service owns chain-level retries, so a failing history endpoint only
/// delays the answer.
pub async fn track(
    wallet: &dyn WalletService,
    session: &str,
    job: &JobHandle,
    intent: IntentType,
    policy: TrackerPolicy,
) -> Resolution {
    let mut delay = policy.initial_backoff;
    let mut last_order = None;

    for attempt in 1..=policy.max_attempts {
        tokio::time::sleep(delay).await;

        match resolve(wallet, session, job, intent).await {
            Ok(resolution) if resolution.state.is_terminal() => {
                return Resolution {
                    attempts: attempt,
                    ..resolution
                };
            }
            Ok(resolution) => last_order = resolution.order.or(last_order),
            Err(e) => warn!("Order lookup for job {job} failed (attempt {attempt}): {e}"),
        }

        delay = delay.saturating_mul(2).min(policy.max_backoff);
    }

    Resolution {
        state: SubmissionState::TimedOut,
        order: last_order,
        attempts: policy.max_attempts,
    }
}

pub struct TrackerState {
    pub pool: SqlitePool,
    pub wallet: Arc<dyn WalletService>,
    pub policy: TrackerPolicy,
}

/// Background task spawned after each accepted submission: track the job and
/// persist the final state to the ledger. The session token lives only for
/// the duration of this task.
pub async fn run(state: Arc<TrackerState>, session: String, job: JobHandle, intent: IntentType) {
    let resolution = track(state.wallet.as_ref(), &session, &job, intent, state.policy).await;
    info!(
        "Job {job} settled as {} after {} lookups",
        resolution.state.as_str(),
        resolution.attempts
    );

    match db::record_resolution(&state.pool, &job, &resolution).await {
        Ok(true) => {}
        Ok(false) => info!("Job {job} was already settled; ledger left unchanged"),
        Err(e) => error!("Failed to persist resolution for job {job}: {e}"),
    }
}
