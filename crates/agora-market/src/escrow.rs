//! Escrow ledger engine
//!
//! Funding, release, and refund for per-job escrow accounts. Invariants:
//!
//! - Every balance mutation happens under the agent's row lock.
//! - Every escrow transition happens under the escrow's row lock.
//! - All writes of one operation commit in a single transaction, with the
//!   audit entry written inside that same transaction.
//! - Funded amounts are either fully in or fully out; no partial release.
//!
//! Two concurrent funds conflict on the escrow's unique job index and one
//! fails with a state conflict; two concurrent balance mutations on one
//! agent serialize on the agent row.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use agora_db::{Database, DbEscrowAccount, DbJob};
use agora_types::{
    AgoraError, AgoraResult, EscrowAction, EscrowStatus, JobStatus, RefundCause,
};

use crate::fees::FeeEngine;

#[derive(Clone)]
pub struct EscrowEngine {
    db: Arc<Database>,
    fees: FeeEngine,
}

impl EscrowEngine {
    pub fn new(db: Arc<Database>, fees: FeeEngine) -> Self {
        Self { db, fees }
    }

    pub fn fees(&self) -> &FeeEngine {
        &self.fees
    }

    /// Fund a job's escrow from the client's balance.
    ///
    /// Atomic: debit client, create funded escrow, audit, transition the job
    /// to `funded`. The caller enqueues the delivery deadline after commit.
    pub async fn fund(&self, job_id: Uuid, client_agent_id: Uuid) -> AgoraResult<DbEscrowAccount> {
        let mut tx = self.db.pg.begin().await.map_err(db_err)?;

        let job = self.db.job_repo().lock(&mut tx, job_id).await?;
        if job.client_agent_id != client_agent_id {
            return Err(AgoraError::Forbidden("only the client can fund the escrow".into()));
        }
        if job.status != JobStatus::Agreed.as_str() {
            return Err(AgoraError::Conflict(format!(
                "job must be agreed to fund, currently {}",
                job.status
            )));
        }
        let amount = job
            .agreed_price
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| AgoraError::Schema("job has no agreed price".into()))?;

        if self.db.escrow_repo().find_by_job(job_id).await?.is_some() {
            return Err(AgoraError::Conflict("escrow already exists for this job".into()));
        }

        // Lock the client's row before the balance check; this is what makes
        // concurrent funds on one balance safe.
        self.db.agent_repo().lock(&mut tx, client_agent_id).await?;
        self.db
            .agent_repo()
            .debit_balance(&mut tx, client_agent_id, amount)
            .await
            .map_err(|e| match e {
                agora_db::DbError::InsufficientBalance(_) => {
                    AgoraError::Conflict(format!("insufficient balance to fund {}", amount))
                }
                other => other.into(),
            })?;

        let now = Utc::now();
        let escrow = self
            .db
            .escrow_repo()
            .create_funded(
                &mut tx,
                &DbEscrowAccount {
                    escrow_id: Uuid::new_v4(),
                    job_id,
                    client_agent_id,
                    seller_agent_id: job.seller_agent_id,
                    amount,
                    status: EscrowStatus::Funded.as_str().to_string(),
                    funded_at: Some(now),
                    released_at: None,
                },
            )
            .await?;

        let escrow_repo = self.db.escrow_repo();
        escrow_repo
            .append_audit(
                &mut tx,
                escrow.escrow_id,
                EscrowAction::Created.as_str(),
                Some(client_agent_id),
                amount,
                None,
            )
            .await?;
        escrow_repo
            .append_audit(
                &mut tx,
                escrow.escrow_id,
                EscrowAction::Funded.as_str(),
                Some(client_agent_id),
                amount,
                None,
            )
            .await?;

        self.db
            .job_repo()
            .set_status(&mut tx, job_id, JobStatus::Funded.as_str())
            .await?;

        tx.commit().await.map_err(db_err)?;

        info!(job_id = %job_id, amount = %amount, "escrow funded");
        Ok(escrow)
    }

    /// Release a funded escrow to the seller.
    ///
    /// The seller is credited `amount - seller_share`; the client's base-fee
    /// share is debited from residual balance, never from escrow. If the
    /// client cannot cover their share the platform absorbs it rather than
    /// blocking completion.
    pub async fn release(&self, job_id: Uuid) -> AgoraResult<DbEscrowAccount> {
        let mut tx = self.db.pg.begin().await.map_err(db_err)?;

        let escrow = self.db.escrow_repo().lock_by_job(&mut tx, job_id).await?;
        if escrow.status != EscrowStatus::Funded.as_str() {
            return Err(AgoraError::Conflict(format!(
                "escrow must be funded to release, currently {}",
                escrow.status
            )));
        }

        let (client_fee, seller_fee) = self.fees.base_fee_shares(escrow.amount);
        let seller_payout = escrow.amount - seller_fee.amount;

        self.db.agent_repo().lock(&mut tx, escrow.seller_agent_id).await?;
        self.db
            .agent_repo()
            .credit_balance(&mut tx, escrow.seller_agent_id, seller_payout)
            .await?;

        let mut client_fee_collected = true;
        if client_fee.amount > Decimal::ZERO {
            let client = self.db.agent_repo().lock(&mut tx, escrow.client_agent_id).await?;
            if client.balance >= client_fee.amount {
                self.db
                    .agent_repo()
                    .debit_balance(&mut tx, escrow.client_agent_id, client_fee.amount)
                    .await?;
            } else {
                client_fee_collected = false;
                warn!(
                    job_id = %job_id,
                    share = %client_fee.amount,
                    "client cannot cover base fee share; absorbed"
                );
            }
        }

        let now = Utc::now();
        let escrow = self
            .db
            .escrow_repo()
            .set_status(&mut tx, escrow.escrow_id, EscrowStatus::Released.as_str(), Some(now))
            .await?;

        self.db
            .escrow_repo()
            .append_audit(
                &mut tx,
                escrow.escrow_id,
                EscrowAction::Released.as_str(),
                None,
                seller_payout,
                Some(&json!({
                    "seller_payout": seller_payout.to_string(),
                    "client_fee_share": client_fee.amount.to_string(),
                    "seller_fee_share": seller_fee.amount.to_string(),
                    "client_fee_collected": client_fee_collected,
                })),
            )
            .await?;

        let job = self.db.job_repo().lock(&mut tx, job_id).await?;
        if job.status != JobStatus::Verifying.as_str() {
            return Err(AgoraError::Conflict(format!(
                "job must be verifying to complete, currently {}",
                job.status
            )));
        }
        self.db
            .job_repo()
            .set_status(&mut tx, job_id, JobStatus::Completed.as_str())
            .await?;

        tx.commit().await.map_err(db_err)?;

        info!(job_id = %job_id, payout = %seller_payout, "escrow released");
        Ok(escrow)
    }

    /// Refund a funded escrow to the client.
    ///
    /// Symmetric to release: the client is credited `amount - client_share`
    /// and the seller's share is debited from their balance, absorbed if
    /// they cannot cover it. The job transitions to the terminal state the
    /// cause dictates unless it is already terminal.
    pub async fn refund(
        &self,
        job_id: Uuid,
        cause: RefundCause,
        actor_agent_id: Option<Uuid>,
    ) -> AgoraResult<DbEscrowAccount> {
        let mut tx = self.db.pg.begin().await.map_err(db_err)?;

        let escrow = self.db.escrow_repo().lock_by_job(&mut tx, job_id).await?;
        if escrow.status != EscrowStatus::Funded.as_str() {
            return Err(AgoraError::Conflict(format!(
                "escrow must be funded to refund, currently {}",
                escrow.status
            )));
        }

        let (client_fee, seller_fee) = self.fees.base_fee_shares(escrow.amount);
        let client_refund = escrow.amount - client_fee.amount;

        self.db.agent_repo().lock(&mut tx, escrow.client_agent_id).await?;
        self.db
            .agent_repo()
            .credit_balance(&mut tx, escrow.client_agent_id, client_refund)
            .await?;

        let mut seller_fee_collected = true;
        if seller_fee.amount > Decimal::ZERO {
            let seller = self.db.agent_repo().lock(&mut tx, escrow.seller_agent_id).await?;
            if seller.balance >= seller_fee.amount {
                self.db
                    .agent_repo()
                    .debit_balance(&mut tx, escrow.seller_agent_id, seller_fee.amount)
                    .await?;
            } else {
                seller_fee_collected = false;
                warn!(
                    job_id = %job_id,
                    share = %seller_fee.amount,
                    "seller cannot cover base fee share; absorbed"
                );
            }
        }

        let now = Utc::now();
        let escrow = self
            .db
            .escrow_repo()
            .set_status(&mut tx, escrow.escrow_id, EscrowStatus::Refunded.as_str(), Some(now))
            .await?;

        self.db
            .escrow_repo()
            .append_audit(
                &mut tx,
                escrow.escrow_id,
                EscrowAction::Refunded.as_str(),
                actor_agent_id,
                client_refund,
                Some(&json!({
                    "cause": cause.as_str(),
                    "client_refund": client_refund.to_string(),
                    "client_fee_share": client_fee.amount.to_string(),
                    "seller_fee_share": seller_fee.amount.to_string(),
                    "seller_fee_collected": seller_fee_collected,
                })),
            )
            .await?;

        let job = self.db.job_repo().lock(&mut tx, job_id).await?;
        let target = match cause {
            RefundCause::Cancelled | RefundCause::Deactivation => JobStatus::Cancelled,
            RefundCause::Failed | RefundCause::Deadline => JobStatus::Failed,
        };
        if !job_is_terminal(&job) {
            self.db
                .job_repo()
                .set_status(&mut tx, job_id, target.as_str())
                .await?;
        }

        tx.commit().await.map_err(db_err)?;

        info!(job_id = %job_id, cause = cause.as_str(), refund = %client_refund, "escrow refunded");
        Ok(escrow)
    }

    /// Mark a funded escrow disputed, preserving the funds and audit trail.
    /// Resolution mechanics are out of scope; the platform only records.
    pub async fn dispute(&self, job_id: Uuid, actor_agent_id: Uuid) -> AgoraResult<DbEscrowAccount> {
        let mut tx = self.db.pg.begin().await.map_err(db_err)?;

        let escrow = self.db.escrow_repo().lock_by_job(&mut tx, job_id).await?;
        if escrow.status != EscrowStatus::Funded.as_str() {
            return Err(AgoraError::Conflict(format!(
                "escrow must be funded to dispute, currently {}",
                escrow.status
            )));
        }

        let escrow = self
            .db
            .escrow_repo()
            .set_status(&mut tx, escrow.escrow_id, EscrowStatus::Disputed.as_str(), None)
            .await?;
        self.db
            .escrow_repo()
            .append_audit(
                &mut tx,
                escrow.escrow_id,
                EscrowAction::Disputed.as_str(),
                Some(actor_agent_id),
                escrow.amount,
                None,
            )
            .await?;

        self.db
            .job_repo()
            .set_status(&mut tx, job_id, JobStatus::Disputed.as_str())
            .await?;

        tx.commit().await.map_err(db_err)?;
        Ok(escrow)
    }
}

fn job_is_terminal(job: &DbJob) -> bool {
    job.status
        .parse::<JobStatus>()
        .map(|s| s.is_terminal())
        .unwrap_or(false)
}

fn db_err(e: sqlx::Error) -> AgoraError {
    AgoraError::Dependency(e.to_string())
}
