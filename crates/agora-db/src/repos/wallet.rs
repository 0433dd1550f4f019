//! Wallet repository: deposit addresses, deposit transactions, withdrawals

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::{DbDepositAddress, DbDepositTransaction, DbError, DbResult, DbWithdrawalRequest};

pub struct WalletRepo {
    pool: PgPool,
}

impl WalletRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Deposit addresses
    // =========================================================================

    pub async fn find_address_by_agent(&self, agent_id: Uuid) -> DbResult<Option<DbDepositAddress>> {
        let addr = sqlx::query_as::<_, DbDepositAddress>(
            "SELECT * FROM deposit_addresses WHERE agent_id = $1",
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(addr)
    }

    pub async fn find_address(&self, address: &str) -> DbResult<Option<DbDepositAddress>> {
        let addr = sqlx::query_as::<_, DbDepositAddress>(
            "SELECT * FROM deposit_addresses WHERE address = $1",
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;
        Ok(addr)
    }

    /// The next strictly-increasing derivation index.
    pub async fn next_derivation_index(&self, conn: &mut PgConnection) -> DbResult<i64> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(derivation_index), -1) + 1 AS next FROM deposit_addresses",
        )
        .fetch_one(&mut *conn)
        .await?;
        let next: i64 = row.try_get("next")?;
        Ok(next)
    }

    pub async fn create_address(
        &self,
        conn: &mut PgConnection,
        address: &DbDepositAddress,
    ) -> DbResult<DbDepositAddress> {
        let created = sqlx::query_as::<_, DbDepositAddress>(
            r#"
            INSERT INTO deposit_addresses (deposit_address_id, agent_id, address, derivation_index)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(address.deposit_address_id)
        .bind(address.agent_id)
        .bind(&address.address)
        .bind(address.derivation_index)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DbError::Duplicate("deposit address already exists".into())
            }
            _ => DbError::from(e),
        })?;
        Ok(created)
    }

    // =========================================================================
    // Deposit transactions
    // =========================================================================

    /// Insert a detected deposit; if the tx_hash is already known, return
    /// the existing row so notification is idempotent.
    pub async fn insert_or_get_deposit(
        &self,
        deposit: &DbDepositTransaction,
    ) -> DbResult<DbDepositTransaction> {
        let inserted = sqlx::query_as::<_, DbDepositTransaction>(
            r#"
            INSERT INTO deposit_transactions
                (deposit_tx_id, agent_id, tx_hash, amount_usdc, amount_credits,
                 confirmations, status, block_number)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (tx_hash) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(deposit.deposit_tx_id)
        .bind(deposit.agent_id)
        .bind(&deposit.tx_hash)
        .bind(deposit.amount_usdc)
        .bind(deposit.amount_credits)
        .bind(deposit.confirmations)
        .bind(&deposit.status)
        .bind(deposit.block_number)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(row) => Ok(row),
            None => {
                let existing = sqlx::query_as::<_, DbDepositTransaction>(
                    "SELECT * FROM deposit_transactions WHERE tx_hash = $1",
                )
                .bind(&deposit.tx_hash)
                .fetch_one(&self.pool)
                .await?;
                Ok(existing)
            }
        }
    }

    pub async fn find_deposit_by_hash(&self, tx_hash: &str) -> DbResult<Option<DbDepositTransaction>> {
        let deposit = sqlx::query_as::<_, DbDepositTransaction>(
            "SELECT * FROM deposit_transactions WHERE tx_hash = $1",
        )
        .bind(tx_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(deposit)
    }

    pub async fn update_deposit_confirmations(
        &self,
        deposit_tx_id: Uuid,
        confirmations: i32,
        status: &str,
        block_number: Option<i64>,
    ) -> DbResult<DbDepositTransaction> {
        let deposit = sqlx::query_as::<_, DbDepositTransaction>(
            r#"
            UPDATE deposit_transactions
            SET confirmations = $2, status = $3, block_number = COALESCE($4, block_number)
            WHERE deposit_tx_id = $1
            RETURNING *
            "#,
        )
        .bind(deposit_tx_id)
        .bind(confirmations)
        .bind(status)
        .bind(block_number)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound("deposit not found".into()))?;
        Ok(deposit)
    }

    /// Mark a deposit credited, inside the transaction that credits the
    /// balance. Guarded on status so a deposit can be credited only once.
    pub async fn mark_deposit_credited(
        &self,
        conn: &mut PgConnection,
        deposit_tx_id: Uuid,
        confirmations: i32,
    ) -> DbResult<DbDepositTransaction> {
        let deposit = sqlx::query_as::<_, DbDepositTransaction>(
            r#"
            UPDATE deposit_transactions
            SET status = 'credited', confirmations = $2, credited_at = now()
            WHERE deposit_tx_id = $1 AND status IN ('pending', 'confirming')
            RETURNING *
            "#,
        )
        .bind(deposit_tx_id)
        .bind(confirmations)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::Duplicate("deposit already credited or failed".into()))?;
        Ok(deposit)
    }

    pub async fn list_unconfirmed_deposits(&self) -> DbResult<Vec<DbDepositTransaction>> {
        let deposits = sqlx::query_as::<_, DbDepositTransaction>(
            "SELECT * FROM deposit_transactions WHERE status IN ('pending', 'confirming') ORDER BY detected_at",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(deposits)
    }

    // =========================================================================
    // Withdrawals
    // =========================================================================

    /// Insert a withdrawal request inside the transaction that debits the
    /// agent's balance.
    pub async fn create_withdrawal(
        &self,
        conn: &mut PgConnection,
        withdrawal: &DbWithdrawalRequest,
    ) -> DbResult<DbWithdrawalRequest> {
        let created = sqlx::query_as::<_, DbWithdrawalRequest>(
            r#"
            INSERT INTO withdrawal_requests
                (withdrawal_id, agent_id, amount, fee, net_payout, destination_address, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending')
            RETURNING *
            "#,
        )
        .bind(withdrawal.withdrawal_id)
        .bind(withdrawal.agent_id)
        .bind(withdrawal.amount)
        .bind(withdrawal.fee)
        .bind(withdrawal.net_payout)
        .bind(&withdrawal.destination_address)
        .fetch_one(&mut *conn)
        .await?;
        Ok(created)
    }

    pub async fn find_withdrawal(&self, withdrawal_id: Uuid) -> DbResult<Option<DbWithdrawalRequest>> {
        let w = sqlx::query_as::<_, DbWithdrawalRequest>(
            "SELECT * FROM withdrawal_requests WHERE withdrawal_id = $1",
        )
        .bind(withdrawal_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(w)
    }

    pub async fn list_withdrawals_by_agent(
        &self,
        agent_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<DbWithdrawalRequest>> {
        let rows = sqlx::query_as::<_, DbWithdrawalRequest>(
            r#"
            SELECT * FROM withdrawal_requests
            WHERE agent_id = $1
            ORDER BY requested_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(agent_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Claim one pending withdrawal for processing. Skips rows other
    /// processors hold, so at most one worker owns a withdrawal at a time.
    pub async fn claim_pending_withdrawal(&self) -> DbResult<Option<DbWithdrawalRequest>> {
        let claimed = sqlx::query_as::<_, DbWithdrawalRequest>(
            r#"
            UPDATE withdrawal_requests
            SET status = 'processing'
            WHERE withdrawal_id = (
                SELECT withdrawal_id FROM withdrawal_requests
                WHERE status = 'pending'
                ORDER BY requested_at
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(claimed)
    }

    pub async fn record_withdrawal_tx(
        &self,
        withdrawal_id: Uuid,
        tx_hash: &str,
    ) -> DbResult<DbWithdrawalRequest> {
        let w = sqlx::query_as::<_, DbWithdrawalRequest>(
            r#"
            UPDATE withdrawal_requests SET tx_hash = $2
            WHERE withdrawal_id = $1 AND status = 'processing'
            RETURNING *
            "#,
        )
        .bind(withdrawal_id)
        .bind(tx_hash)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound("withdrawal not found or not processing".into()))?;
        Ok(w)
    }

    pub async fn complete_withdrawal(&self, withdrawal_id: Uuid) -> DbResult<DbWithdrawalRequest> {
        let w = sqlx::query_as::<_, DbWithdrawalRequest>(
            r#"
            UPDATE withdrawal_requests SET status = 'completed', processed_at = now()
            WHERE withdrawal_id = $1 AND status = 'processing'
            RETURNING *
            "#,
        )
        .bind(withdrawal_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound("withdrawal not found or not processing".into()))?;
        Ok(w)
    }

    /// Mark a withdrawal failed, inside the transaction that refunds the
    /// debited amount.
    pub async fn fail_withdrawal(
        &self,
        conn: &mut PgConnection,
        withdrawal_id: Uuid,
        error: &str,
    ) -> DbResult<DbWithdrawalRequest> {
        let w = sqlx::query_as::<_, DbWithdrawalRequest>(
            r#"
            UPDATE withdrawal_requests
            SET status = 'failed', processed_at = now(), error_message = $2
            WHERE withdrawal_id = $1 AND status IN ('pending', 'processing')
            RETURNING *
            "#,
        )
        .bind(withdrawal_id)
        .bind(error)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::NotFound("withdrawal not found or already terminal".into()))?;
        Ok(w)
    }

    /// Requeue a processing withdrawal whose broadcast never landed.
    pub async fn requeue_withdrawal(&self, withdrawal_id: Uuid) -> DbResult<DbWithdrawalRequest> {
        let w = sqlx::query_as::<_, DbWithdrawalRequest>(
            r#"
            UPDATE withdrawal_requests SET status = 'pending', tx_hash = NULL
            WHERE withdrawal_id = $1 AND status = 'processing'
            RETURNING *
            "#,
        )
        .bind(withdrawal_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound("withdrawal not found or not processing".into()))?;
        Ok(w)
    }

    pub async fn list_processing_withdrawals(&self) -> DbResult<Vec<DbWithdrawalRequest>> {
        let rows = sqlx::query_as::<_, DbWithdrawalRequest>(
            "SELECT * FROM withdrawal_requests WHERE status = 'processing' ORDER BY requested_at",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Sum of in-flight withdrawals for an agent, for balance displays.
    pub async fn pending_withdrawal_total(&self, agent_id: Uuid) -> DbResult<Decimal> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount), 0) AS total
            FROM withdrawal_requests
            WHERE agent_id = $1 AND status IN ('pending', 'processing')
            "#,
        )
        .bind(agent_id)
        .fetch_one(&self.pool)
        .await?;
        let total: Decimal = row.try_get("total")?;
        Ok(total)
    }
}
