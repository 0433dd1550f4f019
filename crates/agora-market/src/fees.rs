//! Fee calculation and charging
//!
//! Three fee categories, all configurable:
//!
//! 1. **Base marketplace fee** — a percentage of the agreed price, split
//!    50/50 between client and seller, applied when escrow resolves
//!    (release and refund both).
//! 2. **Verification fee** — charged to the client at verification time,
//!    scaling with sandbox CPU seconds, regardless of outcome. Charging on
//!    failure too keeps heavy scripts from being free to spam.
//! 3. **Storage fee** — charged to the seller at delivery, scaling with the
//!    serialized size of the deliverable.
//!
//! All amounts round half-up to two decimals.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use uuid::Uuid;

use agora_db::AgentRepo;
use agora_types::{round_credits, AgoraError, AgoraResult};

/// Fee rates and minimums.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Base marketplace fee as a fraction of the agreed price.
    pub base_percent: Decimal,
    /// Verification fee per sandbox CPU second.
    pub verification_per_cpu_second: Decimal,
    /// Minimum verification fee (also the flat fee for declarative suites).
    pub verification_minimum: Decimal,
    /// Storage fee per KiB of serialized deliverable.
    pub storage_per_kb: Decimal,
    /// Minimum storage fee.
    pub storage_minimum: Decimal,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            base_percent: dec!(0.01),
            verification_per_cpu_second: dec!(0.01),
            verification_minimum: dec!(0.05),
            storage_per_kb: dec!(0.001),
            storage_minimum: dec!(0.01),
        }
    }
}

/// One itemized fee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub fee_type: String,
    pub amount: Decimal,
    pub detail: String,
}

#[derive(Clone)]
pub struct FeeEngine {
    config: FeeConfig,
}

impl FeeEngine {
    pub fn new(config: FeeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeeConfig {
        &self.config
    }

    /// Base marketplace fee, split between the parties. Returns
    /// `(client_share, seller_share)`; the client absorbs any odd cent.
    pub fn base_fee_shares(&self, agreed_price: Decimal) -> (FeeBreakdown, FeeBreakdown) {
        let total = round_credits(agreed_price * self.config.base_percent);
        let seller_share = round_credits(total / dec!(2));
        let client_share = total - seller_share;

        let half_pct = self.config.base_percent * dec!(100) / dec!(2);
        (
            FeeBreakdown {
                fee_type: "base_client".into(),
                amount: client_share,
                detail: format!("marketplace fee (client share): {}% of {}", half_pct, agreed_price),
            },
            FeeBreakdown {
                fee_type: "base_seller".into(),
                amount: seller_share,
                detail: format!("marketplace fee (seller share): {}% of {}", half_pct, agreed_price),
            },
        )
    }

    /// Verification fee for a run that consumed `cpu_seconds`.
    pub fn verification_fee(&self, cpu_seconds: f64) -> FeeBreakdown {
        let computed = round_credits(
            Decimal::try_from(cpu_seconds).unwrap_or(Decimal::ZERO)
                * self.config.verification_per_cpu_second,
        );
        let amount = computed.max(self.config.verification_minimum);
        FeeBreakdown {
            fee_type: "verification".into(),
            amount,
            detail: format!(
                "verification compute: {:.1}s at {}/s (min {})",
                cpu_seconds, self.config.verification_per_cpu_second, self.config.verification_minimum
            ),
        }
    }

    /// Storage fee for a deliverable of `size_bytes`.
    pub fn storage_fee(&self, size_bytes: usize) -> FeeBreakdown {
        let kb = Decimal::from((size_bytes as u64).div_ceil(1024));
        let computed = round_credits(kb * self.config.storage_per_kb);
        let amount = computed.max(self.config.storage_minimum);
        FeeBreakdown {
            fee_type: "storage".into(),
            amount,
            detail: format!(
                "deliverable storage: {} bytes ({} KB) at {}/KB (min {})",
                size_bytes, kb, self.config.storage_per_kb, self.config.storage_minimum
            ),
        }
    }

    /// Deduct a fee from an agent's balance under its row lock. The caller
    /// owns the transaction; insufficient balance is a state conflict.
    pub async fn charge(
        &self,
        conn: &mut PgConnection,
        agents: &AgentRepo,
        agent_id: Uuid,
        fee: &FeeBreakdown,
    ) -> AgoraResult<Decimal> {
        agents.lock(conn, agent_id).await?;
        let balance = agents
            .debit_balance(conn, agent_id, fee.amount)
            .await
            .map_err(|e| match e {
                agora_db::DbError::InsufficientBalance(_) => AgoraError::Conflict(format!(
                    "insufficient balance for {} fee of {}",
                    fee.fee_type, fee.amount
                )),
                other => other.into(),
            })?;
        Ok(balance)
    }

    /// The published fee schedule, served by GET /fees so agents can price
    /// fees into their negotiation.
    pub fn schedule(&self) -> serde_json::Value {
        let pct = self.config.base_percent * dec!(100);
        serde_json::json!({
            "base_marketplace_fee": {
                "rate_percent": pct.to_string(),
                "split": "50/50 between client and seller",
                "charged_at": "escrow resolution (release and refund)",
            },
            "verification_compute_fee": {
                "rate_per_cpu_second": self.config.verification_per_cpu_second.to_string(),
                "minimum": self.config.verification_minimum.to_string(),
                "charged_to": "client",
                "charged_at": "each verify call, regardless of outcome",
            },
            "deliverable_storage_fee": {
                "rate_per_kb": self.config.storage_per_kb.to_string(),
                "minimum": self.config.storage_minimum.to_string(),
                "charged_to": "seller",
                "charged_at": "each deliver call",
            },
            "note": "The agreed price is not the total cost; both parties pay fees proportional to the resources they consume.",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> FeeEngine {
        FeeEngine::new(FeeConfig::default())
    }

    #[test]
    fn base_fee_splits_evenly_on_round_amounts() {
        let (client, seller) = engine().base_fee_shares(dec!(10.00));
        assert_eq!(client.amount, dec!(0.05));
        assert_eq!(seller.amount, dec!(0.05));
    }

    #[test]
    fn odd_cent_total_still_conserves() {
        // 1% of 12.50 rounds to 0.13; the shares differ by at most one cent
        // and always sum to the total.
        let (client, seller) = engine().base_fee_shares(dec!(12.50));
        assert_eq!(client.amount + seller.amount, dec!(0.13));
        assert!((client.amount - seller.amount).abs() <= dec!(0.01));
    }

    #[test]
    fn verification_fee_has_floor() {
        assert_eq!(engine().verification_fee(0.0).amount, dec!(0.05));
        assert_eq!(engine().verification_fee(1.0).amount, dec!(0.05));
        assert_eq!(engine().verification_fee(30.0).amount, dec!(0.30));
    }

    #[test]
    fn storage_fee_rounds_kb_up() {
        let e = engine();
        assert_eq!(e.storage_fee(10).amount, dec!(0.01));
        // 50 KiB -> 0.05
        assert_eq!(e.storage_fee(50 * 1024).amount, dec!(0.05));
        // 1 byte over 50 KiB still bills 51 KiB
        assert_eq!(e.storage_fee(50 * 1024 + 1).amount, dec!(0.06));
    }

    #[test]
    fn fee_conservation_across_shares() {
        for price in [dec!(0.01), dec!(1), dec!(99.99), dec!(1234.56), dec!(1_000_000)] {
            let (client, seller) = engine().base_fee_shares(price);
            let total = round_credits(price * dec!(0.01));
            assert_eq!(client.amount + seller.amount, total);
        }
    }
}
