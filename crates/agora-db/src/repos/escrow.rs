//! Escrow repository
//!
//! Escrow rows are created and transitioned only inside the ledger engine's
//! transactions. Audit entries are written through `append_audit` in the
//! same transaction as the state change they record; there is no update or
//! delete path.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{DbError, DbEscrowAccount, DbEscrowAuditEntry, DbResult};

pub struct EscrowRepo {
    pool: PgPool,
}

impl EscrowRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_job(&self, job_id: Uuid) -> DbResult<Option<DbEscrowAccount>> {
        let escrow = sqlx::query_as::<_, DbEscrowAccount>(
            "SELECT * FROM escrow_accounts WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(escrow)
    }

    /// Insert a funded escrow. The unique index on job_id makes a second
    /// concurrent fund fail here with a conflict.
    pub async fn create_funded(
        &self,
        conn: &mut PgConnection,
        escrow: &DbEscrowAccount,
    ) -> DbResult<DbEscrowAccount> {
        let created = sqlx::query_as::<_, DbEscrowAccount>(
            r#"
            INSERT INTO escrow_accounts
                (escrow_id, job_id, client_agent_id, seller_agent_id, amount, status, funded_at)
            VALUES ($1, $2, $3, $4, $5, 'funded', $6)
            RETURNING *
            "#,
        )
        .bind(escrow.escrow_id)
        .bind(escrow.job_id)
        .bind(escrow.client_agent_id)
        .bind(escrow.seller_agent_id)
        .bind(escrow.amount)
        .bind(escrow.funded_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DbError::Duplicate("escrow already exists for this job".into())
            }
            _ => DbError::from(e),
        })?;
        Ok(created)
    }

    /// Acquire the escrow row lock for a job inside an open transaction.
    pub async fn lock_by_job(
        &self,
        conn: &mut PgConnection,
        job_id: Uuid,
    ) -> DbResult<DbEscrowAccount> {
        let escrow = sqlx::query_as::<_, DbEscrowAccount>(
            "SELECT * FROM escrow_accounts WHERE job_id = $1 FOR UPDATE",
        )
        .bind(job_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::NotFound("escrow not found for this job".into()))?;
        Ok(escrow)
    }

    /// Transition an escrow's status under its held row lock.
    pub async fn set_status(
        &self,
        conn: &mut PgConnection,
        escrow_id: Uuid,
        status: &str,
        released_at: Option<DateTime<Utc>>,
    ) -> DbResult<DbEscrowAccount> {
        let escrow = sqlx::query_as::<_, DbEscrowAccount>(
            r#"
            UPDATE escrow_accounts
            SET status = $2, released_at = COALESCE($3, released_at)
            WHERE escrow_id = $1
            RETURNING *
            "#,
        )
        .bind(escrow_id)
        .bind(status)
        .bind(released_at)
        .fetch_one(&mut *conn)
        .await?;
        Ok(escrow)
    }

    /// Append to the immutable audit log, in the caller's transaction.
    pub async fn append_audit(
        &self,
        conn: &mut PgConnection,
        escrow_id: Uuid,
        action: &str,
        actor_agent_id: Option<Uuid>,
        amount: rust_decimal::Decimal,
        metadata: Option<&serde_json::Value>,
    ) -> DbResult<DbEscrowAuditEntry> {
        let entry = sqlx::query_as::<_, DbEscrowAuditEntry>(
            r#"
            INSERT INTO escrow_audit_log (audit_id, escrow_id, action, actor_agent_id, amount, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(escrow_id)
        .bind(action)
        .bind(actor_agent_id)
        .bind(amount)
        .bind(metadata)
        .fetch_one(&mut *conn)
        .await?;
        Ok(entry)
    }

    pub async fn list_audit(&self, escrow_id: Uuid) -> DbResult<Vec<DbEscrowAuditEntry>> {
        let entries = sqlx::query_as::<_, DbEscrowAuditEntry>(
            "SELECT * FROM escrow_audit_log WHERE escrow_id = $1 ORDER BY created_at",
        )
        .bind(escrow_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}
