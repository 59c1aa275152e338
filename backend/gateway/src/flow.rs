//! Build-and-submit orchestration.
//!
//! Every state-changing action runs the same three steps in order:
//! normalize the amount, build the envelope, submit it to the wallet service.
//! Input and configuration problems surface before anything is sent. Once a
//! job is accepted it is written to the ledger and a tracker task is spawned
//! to settle it; nothing here retries a submission.

use std::str::FromStr;
use std::sync::Arc;

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::amount;
use crate::api::ApiState;
use crate::calls::{envelope_for, hex_address, parse_address, CampaignCall, CreateCampaignArgs, RawTransactionEnvelope, SubmissionKind};
use crate::campaign::CampaignType;
use crate::db::{self, NewSubmission};
use crate::errors::{GatewayError, Result};
use crate::networks::{Network, TokenSymbol};
use crate::tracker::{self, Resolution, SubmissionState};
use crate::wallet::{IntentType, JobHandle, TokenTransferParams};

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCampaignRequest {
    pub network: String,
    pub token: String,
    pub sender: String,
    pub campaign_type: CampaignType,
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub description: String,
    pub recipient: String,
    /// Human amount; optional only for open-ended campaigns.
    #[serde(default)]
    pub goal: Option<String>,
    /// Unix seconds.
    pub deadline: u64,
    #[serde(default)]
    pub max_donors: Option<u64>,
}

/// Donation through the campaign page: token transfer plus ledger update.
#[derive(Debug, Clone, Deserialize)]
pub struct DonationRequest {
    pub network: String,
    pub token: String,
    pub sender: String,
    pub amount: String,
}

/// Direct `donate` / `updateCampaign` call on the contract.
#[derive(Debug, Clone, Deserialize)]
pub struct ContractCallRequest {
    pub network: String,
    pub token: String,
    pub sender: String,
    pub campaign_id: u64,
    pub amount: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransactionRequest {
    CreateCampaign(CreateCampaignRequest),
    Donate(ContractCallRequest),
    UpdateCampaign(ContractCallRequest),
}

#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub job_id: JobHandle,
    pub kind: SubmissionKind,
    pub network: Network,
    #[serde(flatten)]
    pub state: SubmissionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub envelope: Option<RawTransactionEnvelope>,
    /// False when the job was dispatched but could not be written to the ledger.
    pub recorded: bool,
}

/// The transfer job is always present once funds were sent; a failed
/// campaign update is reported alongside it rather than replacing it.
#[derive(Debug, Clone, Serialize)]
pub struct DonationReceipt {
    #[serde(with = "amount::dec_string")]
    pub amount: U256,
    pub transfer: Receipt,
    pub update: Option<Receipt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_error: Option<String>,
}

/// Network, token and sender shared by every request shape.
struct Target {
    network: Network,
    token: TokenSymbol,
    token_address: Address,
    sender: Address,
    decimals: u8,
}

async fn resolve_target(state: &ApiState, network: &str, token: &str, sender: &str) -> Result<Target> {
    let network = Network::from_str(network)?;
    let token = TokenSymbol::from_str(token)?;
    let token_address = network.token_address(token)?;
    let sender = parse_address(sender, "sender")?;
    let decimals = state.decimals.decimals(network, token).await?;
    Ok(Target {
        network,
        token,
        token_address,
        sender,
        decimals,
    })
}

// ─────────────────────────────────────────────────────────
// Call preparation
// ─────────────────────────────────────────────────────────

async fn prepare_create(state: &ApiState, req: &CreateCampaignRequest, now: i64) -> Result<(Target, CampaignCall)> {
    let target = resolve_target(state, &req.network, &req.token, &req.sender).await?;
    let recipient = parse_address(&req.recipient, "recipient")?;

    if req.name.trim().is_empty() {
        return Err(GatewayError::BadRequest("Campaign name is required".to_string()));
    }
    if req.deadline <= now.max(0) as u64 {
        return Err(GatewayError::BadRequest("Deadline must be in the future".to_string()));
    }

    let goal = match (req.campaign_type, req.goal.as_deref()) {
        (CampaignType::AnythingHelps, None) => U256::zero(),
        (CampaignType::AnythingHelps, Some(goal)) if amount::is_zero(goal) => U256::zero(),
        (_, Some(goal)) => amount::normalize(goal, target.decimals)?,
        (_, None) => {
            return Err(GatewayError::InvalidAmount(
                "A goal is required for this campaign type".to_string(),
            ))
        }
    };

    let max_donors = match req.max_donors {
        Some(0) | None if req.campaign_type.requires_max_donors() => {
            return Err(GatewayError::BadRequest(
                "max_donors must be positive for this campaign type".to_string(),
            ))
        }
        other => U256::from(other.unwrap_or(0)),
    };

    let call = CampaignCall::CreateCampaign(CreateCampaignArgs {
        token: target.token_address,
        campaign_type: req.campaign_type,
        name: req.name.trim().to_string(),
        image: req.image.clone(),
        description: req.description.clone(),
        recipient,
        goal,
        deadline: req.deadline,
        max_donors,
    });
    Ok((target, call))
}

async fn prepare_contract_call(
    state: &ApiState,
    req: &ContractCallRequest,
    direct_donation: bool,
) -> Result<(Target, CampaignCall)> {
    let target = resolve_target(state, &req.network, &req.token, &req.sender).await?;
    let units = amount::normalize(&req.amount, target.decimals)?;
    let campaign_id = U256::from(req.campaign_id);

    let call = if direct_donation {
        let campaign = state.campaigns.get_campaign(target.network, campaign_id).await?;
        ensure_accepted_token(&campaign.token, &target)?;
        campaign.check_donation(units, target.decimals)?;
        CampaignCall::Donate {
            campaign_id,
            amount: units,
        }
    } else {
        CampaignCall::UpdateCampaign {
            campaign_id,
            amount: units,
        }
    };
    Ok((target, call))
}

fn ensure_accepted_token(accepted: &Address, target: &Target) -> Result<()> {
    if !accepted.is_zero() && *accepted != target.token_address {
        return Err(GatewayError::Config(format!(
            "Campaign accepts {} on {}, not {}",
            hex_address(accepted),
            target.network,
            target.token.as_str()
        )));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Submission
// ─────────────────────────────────────────────────────────

fn submission_failure(e: GatewayError) -> GatewayError {
    match e {
        GatewayError::SubmissionFailed(_) => e,
        other => GatewayError::SubmissionFailed(other.to_string()),
    }
}

/// Write the accepted job to the ledger and start its tracker. The job is
/// already dispatched, so a ledger failure is logged and tracking goes ahead;
/// the return value says whether the row was written.
async fn record_and_track(
    state: &ApiState,
    session: &str,
    job: &JobHandle,
    kind: SubmissionKind,
    target: &Target,
    campaign_id: Option<U256>,
    units: Option<U256>,
) -> bool {
    let sender = hex_address(&target.sender);
    let inserted = db::insert_submission(
        &state.pool,
        &NewSubmission {
            job,
            kind,
            network: target.network.as_str(),
            sender: &sender,
            campaign_id: campaign_id.map(|id| id.to_string()),
            amount: units.map(|u| u.to_string()),
        },
    )
    .await;
    if let Err(e) = &inserted {
        error!("Job {job} was dispatched but could not be recorded: {e}");
    }

    let intent = match kind {
        SubmissionKind::TokenTransfer => IntentType::TokenTransfer,
        _ => IntentType::RawTransaction,
    };
    tokio::spawn(tracker::run(
        Arc::clone(&state.tracker),
        session.to_string(),
        job.clone(),
        intent,
    ));
    inserted.is_ok()
}

/// Build the envelope for `call`, dispatch it once and start tracking it.
async fn submit_call(state: &ApiState, session: &str, target: &Target, call: CampaignCall) -> Result<Receipt> {
    let envelope = envelope_for(target.network, target.sender, call.calldata())?;
    let kind = call.kind();

    let job = state
        .wallet
        .evm_raw_transaction(session, &envelope)
        .await
        .map_err(submission_failure)?;
    info!("{} submitted on {} as job {job}", kind.as_str(), target.network);

    let (campaign_id, units) = match &call {
        CampaignCall::CreateCampaign(args) => (None, Some(args.goal)),
        CampaignCall::Donate {
            campaign_id,
            amount,
        }
        | CampaignCall::UpdateCampaign {
            campaign_id,
            amount,
        } => (Some(*campaign_id), Some(*amount)),
    };
    let recorded = record_and_track(state, session, &job, kind, target, campaign_id, units).await;

    Ok(Receipt {
        job_id: job,
        kind,
        network: target.network,
        state: SubmissionState::Pending,
        envelope: Some(envelope),
        recorded,
    })
}

// ─────────────────────────────────────────────────────────
// Operations
// ─────────────────────────────────────────────────────────

pub async fn create_campaign(state: &ApiState, session: &str, req: &CreateCampaignRequest) -> Result<Receipt> {
    let (target, call) = prepare_create(state, req, chrono::Utc::now().timestamp()).await?;
    submit_call(state, session, &target, call).await
}

/// Single entry point for every contract call, dispatched on the request kind.
pub async fn execute(state: &ApiState, session: &str, req: &TransactionRequest) -> Result<Receipt> {
    let (target, call) = match req {
        TransactionRequest::CreateCampaign(create) => {
            prepare_create(state, create, chrono::Utc::now().timestamp()).await?
        }
        TransactionRequest::Donate(donate) => prepare_contract_call(state, donate, true).await?,
        TransactionRequest::UpdateCampaign(update) => prepare_contract_call(state, update, false).await?,
    };
    submit_call(state, session, &target, call).await
}

/// Transfer the donation to the campaign recipient, then record it on the
/// contract with `updateCampaign`.
pub async fn donate(state: &ApiState, session: &str, campaign_id: u64, req: &DonationRequest) -> Result<DonationReceipt> {
    let target = resolve_target(state, &req.network, &req.token, &req.sender).await?;
    let units = amount::normalize(&req.amount, target.decimals)?;
    let campaign_id = U256::from(campaign_id);

    let campaign = state.campaigns.get_campaign(target.network, campaign_id).await?;
    ensure_accepted_token(&campaign.token, &target)?;
    campaign.check_donation(units, target.decimals)?;

    let params = TokenTransferParams {
        amount: units.to_string(),
        recipient: hex_address(&campaign.recipient),
        token: hex_address(&target.token_address),
        caip2_id: target.network.config().caip2_id.to_string(),
    };
    let transfer_job = state
        .wallet
        .token_transfer(session, &params)
        .await
        .map_err(submission_failure)?;
    info!("Donation transfer for campaign {campaign_id} submitted as job {transfer_job}");
    let transfer_recorded = record_and_track(
        state,
        session,
        &transfer_job,
        SubmissionKind::TokenTransfer,
        &target,
        Some(campaign_id),
        Some(units),
    )
    .await;
    let transfer = Receipt {
        job_id: transfer_job,
        kind: SubmissionKind::TokenTransfer,
        network: target.network,
        state: SubmissionState::Pending,
        envelope: None,
        recorded: transfer_recorded,
    };

    let update_call = CampaignCall::UpdateCampaign {
        campaign_id,
        amount: units,
    };
    let (update, update_error) = match submit_call(state, session, &target, update_call).await {
        Ok(receipt) => (Some(receipt), None),
        Err(e) => {
            error!(
                "Transfer job {} sent but campaign update failed: {e}",
                transfer.job_id
            );
            (None, Some(e.to_string()))
        }
    };

    Ok(DonationReceipt {
        amount: units,
        transfer,
        update,
        update_error,
    })
}

/// One order-history lookup for a ledger entry; the result is persisted.
/// Resolved entries are returned as stored without a lookup.
pub async fn resolve_submission(state: &ApiState, session: &str, job_id: &str) -> Result<Resolution> {
    let row = db::get_submission(&state.pool, job_id)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("Submission {job_id}")))?;
    let stored = row.submission_state();
    if matches!(stored, SubmissionState::Resolved(_)) {
        return Ok(Resolution {
            state: stored,
            order: None,
            attempts: 0,
        });
    }

    let intent = if row.kind == SubmissionKind::TokenTransfer.as_str() {
        IntentType::TokenTransfer
    } else {
        IntentType::RawTransaction
    };

    let job = JobHandle(row.job_id);
    let resolution = tracker::resolve(state.wallet.as_ref(), session, &job, intent).await?;
    if db::record_resolution(&state.pool, &job, &resolution).await? {
        return Ok(resolution);
    }

    // The ledger kept an earlier terminal state; report that one.
    let current = db::get_submission(&state.pool, job.as_str())
        .await?
        .map(|r| r.submission_state())
        .unwrap_or(stored);
    Ok(Resolution {
        state: current,
        ..resolution
    })
}
