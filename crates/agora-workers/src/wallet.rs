//! Wallet watcher
//!
//! Deposits: every agent gets a unique receive address derived at a
//! strictly-increasing index by the wallet gateway (the master secret stays
//! in its secrets backend). A notified deposit is recorded idempotently by
//! tx hash, polled for confirmations, and credited to the agent's balance
//! in one transaction once the threshold is reached.
//!
//! Withdrawals: the requested amount is debited immediately, which is what
//! prevents a double-spend between request and broadcast. A processor
//! claims pending rows, broadcasts the net payout, and resolves to
//! completed or failed-with-refund.
//!
//! Startup reconciliation re-polls every confirming deposit and checks
//! every processing withdrawal against the chain, so no in-flight work is
//! orphaned by a crash.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use agora_db::{Database, DbDepositAddress, DbDepositTransaction, DbWithdrawalRequest};
use agora_types::{
    credits_from_usdc, round_credits, AgoraError, AgoraResult, DepositStatus, WithdrawalStatus,
};

use crate::chain::ChainClient;
use crate::ShutdownRx;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Minimum accepted deposit, in USDC.
    #[serde(default = "default_min_deposit")]
    pub min_deposit_usdc: Decimal,
    /// Confirmations required before crediting.
    #[serde(default = "default_confirmations")]
    pub confirmation_threshold: i32,
    /// Flat withdrawal fee, in credits.
    #[serde(default = "default_withdrawal_fee")]
    pub withdrawal_flat_fee: Decimal,
    /// Minimum withdrawal, in credits.
    #[serde(default = "default_min_withdrawal")]
    pub min_withdrawal: Decimal,
    /// Poll interval for confirmations and pending withdrawals.
    #[serde(default = "default_poll_secs")]
    pub poll_interval_secs: u64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            min_deposit_usdc: default_min_deposit(),
            confirmation_threshold: default_confirmations(),
            withdrawal_flat_fee: default_withdrawal_fee(),
            min_withdrawal: default_min_withdrawal(),
            poll_interval_secs: default_poll_secs(),
        }
    }
}

fn default_min_deposit() -> Decimal {
    dec!(1)
}

fn default_confirmations() -> i32 {
    12
}

fn default_withdrawal_fee() -> Decimal {
    dec!(0.50)
}

fn default_min_withdrawal() -> Decimal {
    dec!(1)
}

fn default_poll_secs() -> u64 {
    15
}

#[derive(Clone)]
pub struct WalletService {
    db: Arc<Database>,
    chain: Arc<dyn ChainClient>,
    config: WalletConfig,
}

impl WalletService {
    pub fn new(db: Arc<Database>, chain: Arc<dyn ChainClient>, config: WalletConfig) -> Self {
        Self { db, chain, config }
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    // =========================================================================
    // Deposit addresses
    // =========================================================================

    /// The agent's unique deposit address, created at the next derivation
    /// index if none exists yet.
    pub async fn get_or_create_deposit_address(&self, agent_id: Uuid) -> AgoraResult<DbDepositAddress> {
        if let Some(existing) = self.db.wallet_repo().find_address_by_agent(agent_id).await? {
            return Ok(existing);
        }

        let mut tx = self.db.pg.begin().await.map_err(dep)?;
        let index = self.db.wallet_repo().next_derivation_index(&mut tx).await?;
        let address = self.chain.derive_address(index).await?;

        let created = self
            .db
            .wallet_repo()
            .create_address(
                &mut tx,
                &DbDepositAddress {
                    deposit_address_id: Uuid::new_v4(),
                    agent_id,
                    address,
                    derivation_index: index,
                    created_at: chrono::Utc::now(),
                },
            )
            .await?;
        tx.commit().await.map_err(dep)?;

        info!(agent_id = %agent_id, index = index, "deposit address derived");
        Ok(created)
    }

    // =========================================================================
    // Deposits
    // =========================================================================

    /// Handle a deposit notification. Idempotent by tx hash: notifying the
    /// same transaction twice returns the existing record.
    pub async fn notify_deposit(&self, agent_id: Uuid, tx_hash: &str) -> AgoraResult<DbDepositTransaction> {
        let address = self
            .db
            .wallet_repo()
            .find_address_by_agent(agent_id)
            .await?
            .ok_or_else(|| AgoraError::NotFound("agent has no deposit address".into()))?;

        let transfer = self
            .chain
            .fetch_usdc_transfer(tx_hash)
            .await?
            .ok_or_else(|| AgoraError::Validation("transaction is not a USDC transfer".into()))?;

        if !transfer.to_address.eq_ignore_ascii_case(&address.address) {
            return Err(AgoraError::Validation(
                "transfer is not addressed to this agent".into(),
            ));
        }
        if transfer.amount_usdc < self.config.min_deposit_usdc {
            return Err(AgoraError::Validation(format!(
                "deposit below minimum of {} USDC",
                self.config.min_deposit_usdc
            )));
        }

        let amount_credits = credits_from_usdc(usdc_raw(transfer.amount_usdc));
        let deposit = self
            .db
            .wallet_repo()
            .insert_or_get_deposit(&DbDepositTransaction {
                deposit_tx_id: Uuid::new_v4(),
                agent_id,
                tx_hash: tx_hash.to_string(),
                amount_usdc: transfer.amount_usdc,
                amount_credits,
                confirmations: transfer.confirmations,
                status: DepositStatus::Confirming.as_str().to_string(),
                block_number: transfer.block_number,
                detected_at: chrono::Utc::now(),
                credited_at: None,
            })
            .await?;

        if deposit.status == DepositStatus::Confirming.as_str()
            && transfer.confirmations >= self.config.confirmation_threshold
        {
            return self.credit_deposit(&deposit, transfer.confirmations).await;
        }

        Ok(deposit)
    }

    /// Poll every unconfirmed deposit and credit those past the threshold.
    pub async fn poll_deposits(&self) -> AgoraResult<usize> {
        let deposits = self.db.wallet_repo().list_unconfirmed_deposits().await?;
        let mut credited = 0;

        for deposit in deposits {
            let status = match self.chain.tx_status(&deposit.tx_hash).await {
                Ok(Some(status)) => status,
                Ok(None) => {
                    warn!(tx_hash = %deposit.tx_hash, "deposit transaction vanished from chain");
                    continue;
                }
                Err(e) => {
                    warn!(tx_hash = %deposit.tx_hash, error = %e, "confirmation poll failed");
                    continue;
                }
            };

            if status.confirmations >= self.config.confirmation_threshold {
                if self.credit_deposit(&deposit, status.confirmations).await.is_ok() {
                    credited += 1;
                }
            } else {
                self.db
                    .wallet_repo()
                    .update_deposit_confirmations(
                        deposit.deposit_tx_id,
                        status.confirmations,
                        DepositStatus::Confirming.as_str(),
                        status.block_number,
                    )
                    .await?;
            }
        }

        Ok(credited)
    }

    /// Credit one confirmed deposit: balance credit and deposit transition
    /// commit together, and a deposit can be credited exactly once.
    async fn credit_deposit(
        &self,
        deposit: &DbDepositTransaction,
        confirmations: i32,
    ) -> AgoraResult<DbDepositTransaction> {
        let mut tx = self.db.pg.begin().await.map_err(dep)?;

        let credited = self
            .db
            .wallet_repo()
            .mark_deposit_credited(&mut tx, deposit.deposit_tx_id, confirmations)
            .await?;

        self.db.agent_repo().lock(&mut tx, deposit.agent_id).await?;
        self.db
            .agent_repo()
            .credit_balance(&mut tx, deposit.agent_id, deposit.amount_credits)
            .await?;

        tx.commit().await.map_err(dep)?;
        info!(
            agent_id = %deposit.agent_id,
            tx_hash = %deposit.tx_hash,
            credits = %deposit.amount_credits,
            "deposit credited"
        );
        Ok(credited)
    }

    // =========================================================================
    // Withdrawals
    // =========================================================================

    /// Request a withdrawal. The full amount is debited in the same
    /// transaction that records the request.
    pub async fn request_withdrawal(
        &self,
        agent_id: Uuid,
        amount: Decimal,
        destination_address: &str,
    ) -> AgoraResult<DbWithdrawalRequest> {
        if amount < self.config.min_withdrawal {
            return Err(AgoraError::Validation(format!(
                "minimum withdrawal is {}",
                self.config.min_withdrawal
            )));
        }
        let fee = self.config.withdrawal_flat_fee;
        let net_payout = round_credits(amount - fee);
        if net_payout <= Decimal::ZERO {
            return Err(AgoraError::Validation(format!(
                "withdrawal amount must exceed the {} fee",
                fee
            )));
        }
        if !is_plausible_address(destination_address) {
            return Err(AgoraError::Validation("destination_address is not a valid address".into()));
        }

        let mut tx = self.db.pg.begin().await.map_err(dep)?;
        self.db.agent_repo().lock(&mut tx, agent_id).await?;
        self.db
            .agent_repo()
            .debit_balance(&mut tx, agent_id, amount)
            .await
            .map_err(|e| match e {
                agora_db::DbError::InsufficientBalance(_) => {
                    AgoraError::Conflict(format!("insufficient balance to withdraw {}", amount))
                }
                other => other.into(),
            })?;

        let withdrawal = self
            .db
            .wallet_repo()
            .create_withdrawal(
                &mut tx,
                &DbWithdrawalRequest {
                    withdrawal_id: Uuid::new_v4(),
                    agent_id,
                    amount,
                    fee,
                    net_payout,
                    destination_address: destination_address.to_string(),
                    status: WithdrawalStatus::Pending.as_str().to_string(),
                    tx_hash: None,
                    requested_at: chrono::Utc::now(),
                    processed_at: None,
                    error_message: None,
                },
            )
            .await?;
        tx.commit().await.map_err(dep)?;

        info!(agent_id = %agent_id, amount = %amount, "withdrawal requested");
        Ok(withdrawal)
    }

    /// Claim and broadcast one pending withdrawal. Returns false when the
    /// queue is empty.
    pub async fn process_one_withdrawal(&self) -> AgoraResult<bool> {
        let Some(withdrawal) = self.db.wallet_repo().claim_pending_withdrawal().await? else {
            return Ok(false);
        };

        match self
            .chain
            .send_usdc(&withdrawal.destination_address, withdrawal.net_payout)
            .await
        {
            Ok(tx_hash) => {
                self.db
                    .wallet_repo()
                    .record_withdrawal_tx(withdrawal.withdrawal_id, &tx_hash)
                    .await?;
                info!(withdrawal_id = %withdrawal.withdrawal_id, tx_hash = %tx_hash, "withdrawal broadcast");
            }
            Err(e) => {
                error!(withdrawal_id = %withdrawal.withdrawal_id, error = %e, "withdrawal broadcast failed");
                self.fail_and_refund(&withdrawal, &e.to_string()).await?;
            }
        }
        Ok(true)
    }

    /// Resolve processing withdrawals whose transactions have confirmed.
    pub async fn poll_withdrawals(&self) -> AgoraResult<()> {
        for withdrawal in self.db.wallet_repo().list_processing_withdrawals().await? {
            let Some(tx_hash) = withdrawal.tx_hash.clone() else {
                continue;
            };
            match self.chain.tx_status(&tx_hash).await {
                Ok(Some(status)) if status.mined => {
                    self.db
                        .wallet_repo()
                        .complete_withdrawal(withdrawal.withdrawal_id)
                        .await?;
                    info!(withdrawal_id = %withdrawal.withdrawal_id, "withdrawal completed");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(withdrawal_id = %withdrawal.withdrawal_id, error = %e, "withdrawal poll failed");
                }
            }
        }
        Ok(())
    }

    /// Terminal failure: mark failed and refund the debited amount, in one
    /// transaction.
    async fn fail_and_refund(
        &self,
        withdrawal: &DbWithdrawalRequest,
        error: &str,
    ) -> AgoraResult<()> {
        let mut tx = self.db.pg.begin().await.map_err(dep)?;
        self.db
            .wallet_repo()
            .fail_withdrawal(&mut tx, withdrawal.withdrawal_id, error)
            .await?;
        self.db.agent_repo().lock(&mut tx, withdrawal.agent_id).await?;
        self.db
            .agent_repo()
            .credit_balance(&mut tx, withdrawal.agent_id, withdrawal.amount)
            .await?;
        tx.commit().await.map_err(dep)?;
        Ok(())
    }

    // =========================================================================
    // Recovery and the poll loop
    // =========================================================================

    /// Startup reconciliation: re-poll confirming deposits; resolve or
    /// requeue processing withdrawals against the chain.
    pub async fn reconcile(&self) -> AgoraResult<()> {
        let credited = self.poll_deposits().await?;
        info!(credited = credited, "deposit reconciliation complete");

        for withdrawal in self.db.wallet_repo().list_processing_withdrawals().await? {
            match &withdrawal.tx_hash {
                Some(tx_hash) => match self.chain.tx_status(tx_hash).await? {
                    Some(status) if status.mined => {
                        self.db
                            .wallet_repo()
                            .complete_withdrawal(withdrawal.withdrawal_id)
                            .await?;
                        info!(withdrawal_id = %withdrawal.withdrawal_id, "withdrawal resolved at boot");
                    }
                    _ => {
                        self.db
                            .wallet_repo()
                            .requeue_withdrawal(withdrawal.withdrawal_id)
                            .await?;
                        info!(withdrawal_id = %withdrawal.withdrawal_id, "withdrawal requeued at boot");
                    }
                },
                None => {
                    self.db
                        .wallet_repo()
                        .requeue_withdrawal(withdrawal.withdrawal_id)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Combined poller loop for deposits and withdrawals.
    pub async fn run(&self, mut shutdown: ShutdownRx) {
        info!("wallet watcher started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.poll_deposits().await {
                error!(error = %e, "deposit poll failed");
            }
            loop {
                match self.process_one_withdrawal().await {
                    Ok(true) => continue,
                    Ok(false) => break,
                    Err(e) => {
                        error!(error = %e, "withdrawal processing failed");
                        break;
                    }
                }
            }
            if let Err(e) = self.poll_withdrawals().await {
                error!(error = %e, "withdrawal poll failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)) => {}
                _ = shutdown.changed() => {}
            }
        }
        info!("wallet watcher shut down");
    }
}

/// Convert a USDC decimal to raw six-decimal units.
fn usdc_raw(amount: Decimal) -> u64 {
    (amount * dec!(1_000_000)).trunc().try_into().unwrap_or(0)
}

/// Hex address of the expected shape: 0x followed by 40 hex digits.
fn is_plausible_address(address: &str) -> bool {
    address.len() == 42
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit())
}

fn dep(e: sqlx::Error) -> AgoraError {
    AgoraError::Dependency(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_shape() {
        assert!(is_plausible_address("0x52908400098527886E0F7030069857D2E4169EE7"));
        assert!(!is_plausible_address("52908400098527886E0F7030069857D2E4169EE7"));
        assert!(!is_plausible_address("0x1234"));
        assert!(!is_plausible_address("0xZZ08400098527886E0F7030069857D2E4169EE7"));
    }

    #[test]
    fn usdc_conversion_to_raw() {
        assert_eq!(usdc_raw(dec!(1)), 1_000_000);
        assert_eq!(usdc_raw(dec!(12.345678)), 12_345_678);
        assert_eq!(usdc_raw(dec!(0.000001)), 1);
    }

    #[test]
    fn default_config_matches_policy() {
        let config = WalletConfig::default();
        assert_eq!(config.confirmation_threshold, 12);
        assert!(config.min_deposit_usdc > Decimal::ZERO);
    }
}
