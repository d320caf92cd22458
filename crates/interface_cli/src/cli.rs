//! Command definitions and dispatch
//!
//! Each subcommand maps onto one `ClaimDecisionService` operation and
//! renders its result as JSON.

use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::info;

use core_kernel::{ClaimId, Money, UserId};
use domain_claims::{Actor, ClaimDecisionService, ClaimError, DecisionRequest, DecisionType};

/// Claims decision pipeline runner
#[derive(Debug, Parser)]
#[command(name = "claims-runner", version, about)]
pub struct Cli {
    /// Apply pending migrations before running the command
    #[arg(long, global = true)]
    pub migrate: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Command {
    /// Run the full pipeline on an extracted claim
    Process { claim_id: ClaimId },
    /// Dry-run auto-approval without writing anything
    Evaluate { claim_id: ClaimId },
    /// Run the validation rules and store the results
    Validate { claim_id: ClaimId },
    /// Scan the claimant's other claims for duplicates
    Duplicates { claim_id: ClaimId },
    /// List claims waiting for an agent, oldest first
    Queue {
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Print the audit trail of a claim
    Timeline { claim_id: ClaimId },
    /// Record an agent decision
    Decide {
        claim_id: ClaimId,
        #[arg(long, value_enum)]
        decision: DecisionArg,
        /// Deciding agent
        #[arg(long)]
        agent: UserId,
        /// Approved amount in the claim's currency; defaults to the total
        #[arg(long)]
        amount: Option<Decimal>,
        #[arg(long)]
        reason_code: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DecisionArg {
    Approve,
    Deny,
    Pend,
}

impl From<DecisionArg> for DecisionType {
    fn from(arg: DecisionArg) -> Self {
        match arg {
            DecisionArg::Approve => DecisionType::Approved,
            DecisionArg::Deny => DecisionType::Denied,
            DecisionArg::Pend => DecisionType::Pended,
        }
    }
}

impl Command {
    /// Runs the command and returns its JSON rendering
    pub async fn execute(self, service: &ClaimDecisionService) -> Result<Value, ClaimError> {
        match self {
            Command::Process { claim_id } => {
                let outcome = service.process_claim(claim_id).await?;
                info!(%claim_id, routing = ?outcome.routing, "Processed claim");
                to_json(&outcome)
            }
            Command::Evaluate { claim_id } => to_json(&service.evaluate_auto_approval(claim_id).await?),
            Command::Validate { claim_id } => to_json(&service.validate(claim_id).await?),
            Command::Duplicates { claim_id } => {
                let matches = service.find_duplicates(claim_id).await?;
                let claim = service.get_claim(claim_id).await?;
                Ok(json!({
                    "duplicate_score": claim.duplicate_score,
                    "matches": to_json(&matches)?,
                }))
            }
            Command::Queue { limit } => to_json(&service.review_queue(limit).await?),
            Command::Timeline { claim_id } => to_json(&service.timeline(claim_id).await?),
            Command::Decide {
                claim_id,
                decision,
                agent,
                amount,
                reason_code,
                notes,
            } => {
                let claim = service.get_claim(claim_id).await?;
                let mut request = DecisionRequest::new(decision.into());
                request.approved_amount =
                    amount.map(|amount| Money::new(amount, claim.total_amount.currency()));
                request.reason_code = reason_code;
                request.notes = notes;

                let outcome = service
                    .decide_claim(&claim, request, &Actor::agent(agent))
                    .await?;
                to_json(&outcome)
            }
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, ClaimError> {
    serde_json::to_value(value).map_err(|e| ClaimError::InvalidInput(e.to_string()))
}
