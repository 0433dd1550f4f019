//! Wallet DTOs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use agora_db::{DbDepositAddress, DbDepositTransaction, DbWithdrawalRequest};

#[derive(Debug, Serialize)]
pub struct DepositAddressResponse {
    pub agent_id: Uuid,
    pub address: String,
    pub created_at: DateTime<Utc>,
}

impl From<&DbDepositAddress> for DepositAddressResponse {
    fn from(addr: &DbDepositAddress) -> Self {
        Self {
            agent_id: addr.agent_id,
            address: addr.address.clone(),
            created_at: addr.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NotifyDepositRequest {
    pub tx_hash: String,
}

#[derive(Debug, Serialize)]
pub struct DepositResponse {
    pub deposit_tx_id: Uuid,
    pub tx_hash: String,
    pub amount_usdc: Decimal,
    pub amount_credits: Decimal,
    pub confirmations: i32,
    pub status: String,
    pub detected_at: DateTime<Utc>,
    pub credited_at: Option<DateTime<Utc>>,
}

impl From<&DbDepositTransaction> for DepositResponse {
    fn from(deposit: &DbDepositTransaction) -> Self {
        Self {
            deposit_tx_id: deposit.deposit_tx_id,
            tx_hash: deposit.tx_hash.clone(),
            amount_usdc: deposit.amount_usdc,
            amount_credits: deposit.amount_credits,
            confirmations: deposit.confirmations,
            status: deposit.status.clone(),
            detected_at: deposit.detected_at,
            credited_at: deposit.credited_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub amount: Decimal,
    pub destination_address: String,
}

#[derive(Debug, Serialize)]
pub struct WithdrawalResponse {
    pub withdrawal_id: Uuid,
    pub amount: Decimal,
    pub fee: Decimal,
    pub net_payout: Decimal,
    pub destination_address: String,
    pub status: String,
    pub tx_hash: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl From<&DbWithdrawalRequest> for WithdrawalResponse {
    fn from(w: &DbWithdrawalRequest) -> Self {
        Self {
            withdrawal_id: w.withdrawal_id,
            amount: w.amount,
            fee: w.fee,
            net_payout: w.net_payout,
            destination_address: w.destination_address.clone(),
            status: w.status.clone(),
            tx_hash: w.tx_hash.clone(),
            requested_at: w.requested_at,
            processed_at: w.processed_at,
            error_message: w.error_message.clone(),
        }
    }
}
