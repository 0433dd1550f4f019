//! Agent repository
//!
//! Balance columns are only ever mutated through the `*_balance` helpers,
//! which require the caller to hold the agent's row lock inside an open
//! transaction.

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{DbAgent, DbError, DbResult};

const AGENT_COLUMNS: &str = "agent_id, public_key, display_name, description, endpoint_url, \
     capabilities, webhook_secret, reputation_as_seller, rating_count_as_seller, \
     reputation_as_client, rating_count_as_client, balance, status, agent_card, \
     external_identity_id, external_identity_handle, created_at, last_seen_at";

pub struct AgentRepo {
    pool: PgPool,
}

impl AgentRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, agent: &DbAgent) -> DbResult<DbAgent> {
        let created = sqlx::query_as::<_, DbAgent>(&format!(
            r#"
            INSERT INTO agents
                (agent_id, public_key, display_name, description, endpoint_url, capabilities,
                 webhook_secret, balance, status, agent_card, external_identity_id,
                 external_identity_handle)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {}
            "#,
            AGENT_COLUMNS
        ))
        .bind(agent.agent_id)
        .bind(&agent.public_key)
        .bind(&agent.display_name)
        .bind(&agent.description)
        .bind(&agent.endpoint_url)
        .bind(&agent.capabilities)
        .bind(&agent.webhook_secret)
        .bind(agent.balance)
        .bind(&agent.status)
        .bind(&agent.agent_card)
        .bind(&agent.external_identity_id)
        .bind(&agent.external_identity_handle)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DbError::Duplicate("public_key or external identity already registered".into())
            }
            _ => DbError::from(e),
        })?;
        Ok(created)
    }

    pub async fn find_by_id(&self, agent_id: Uuid) -> DbResult<Option<DbAgent>> {
        let agent = sqlx::query_as::<_, DbAgent>(&format!(
            "SELECT {} FROM agents WHERE agent_id = $1",
            AGENT_COLUMNS
        ))
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(agent)
    }

    pub async fn find_by_public_key(&self, public_key: &str) -> DbResult<Option<DbAgent>> {
        let agent = sqlx::query_as::<_, DbAgent>(&format!(
            "SELECT {} FROM agents WHERE public_key = $1",
            AGENT_COLUMNS
        ))
        .bind(public_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(agent)
    }

    pub async fn update_profile(
        &self,
        agent_id: Uuid,
        display_name: &str,
        description: &str,
        endpoint_url: &str,
        capabilities: &[String],
    ) -> DbResult<DbAgent> {
        let agent = sqlx::query_as::<_, DbAgent>(&format!(
            r#"
            UPDATE agents
            SET display_name = $2, description = $3, endpoint_url = $4, capabilities = $5
            WHERE agent_id = $1
            RETURNING {}
            "#,
            AGENT_COLUMNS
        ))
        .bind(agent_id)
        .bind(display_name)
        .bind(description)
        .bind(endpoint_url)
        .bind(capabilities)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound("agent not found".into()))?;
        Ok(agent)
    }

    pub async fn set_status(&self, agent_id: Uuid, status: &str) -> DbResult<DbAgent> {
        let agent = sqlx::query_as::<_, DbAgent>(&format!(
            "UPDATE agents SET status = $2 WHERE agent_id = $1 RETURNING {}",
            AGENT_COLUMNS
        ))
        .bind(agent_id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound("agent not found".into()))?;
        Ok(agent)
    }

    pub async fn set_agent_card(&self, agent_id: Uuid, card: &serde_json::Value) -> DbResult<()> {
        sqlx::query("UPDATE agents SET agent_card = $2 WHERE agent_id = $1")
            .bind(agent_id)
            .bind(card)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn touch_last_seen(&self, agent_id: Uuid) -> DbResult<()> {
        sqlx::query("UPDATE agents SET last_seen_at = now() WHERE agent_id = $1")
            .bind(agent_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Row-locked balance operations (in-transaction only)
    // =========================================================================

    /// Acquire the agent's row lock. Every balance mutation in the system
    /// starts here.
    pub async fn lock(&self, conn: &mut PgConnection, agent_id: Uuid) -> DbResult<DbAgent> {
        let agent = sqlx::query_as::<_, DbAgent>(&format!(
            "SELECT {} FROM agents WHERE agent_id = $1 FOR UPDATE",
            AGENT_COLUMNS
        ))
        .bind(agent_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::NotFound("agent not found".into()))?;
        Ok(agent)
    }

    /// Credit an agent's balance. Caller must hold the row lock.
    pub async fn credit_balance(
        &self,
        conn: &mut PgConnection,
        agent_id: Uuid,
        amount: Decimal,
    ) -> DbResult<Decimal> {
        if amount <= Decimal::ZERO {
            return Err(DbError::InvalidInput("credit amount must be positive".into()));
        }
        let (balance,): (Decimal,) = sqlx::query_as(
            "UPDATE agents SET balance = balance + $2 WHERE agent_id = $1 RETURNING balance",
        )
        .bind(agent_id)
        .bind(amount)
        .fetch_one(&mut *conn)
        .await?;
        Ok(balance)
    }

    /// Debit an agent's balance, failing if it would go negative. Caller
    /// must hold the row lock.
    pub async fn debit_balance(
        &self,
        conn: &mut PgConnection,
        agent_id: Uuid,
        amount: Decimal,
    ) -> DbResult<Decimal> {
        if amount <= Decimal::ZERO {
            return Err(DbError::InvalidInput("debit amount must be positive".into()));
        }
        let row: Option<(Decimal,)> = sqlx::query_as(
            r#"
            UPDATE agents SET balance = balance - $2
            WHERE agent_id = $1 AND balance >= $2
            RETURNING balance
            "#,
        )
        .bind(agent_id)
        .bind(amount)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(|(b,)| b).ok_or_else(|| {
            DbError::InsufficientBalance(format!("agent {} cannot cover {}", agent_id, amount))
        })
    }

    /// Store an updated reputation scalar and count for one role.
    pub async fn update_reputation(
        &self,
        conn: &mut PgConnection,
        agent_id: Uuid,
        as_seller: bool,
        average: Decimal,
        count: i32,
    ) -> DbResult<()> {
        let sql = if as_seller {
            "UPDATE agents SET reputation_as_seller = $2, rating_count_as_seller = $3 WHERE agent_id = $1"
        } else {
            "UPDATE agents SET reputation_as_client = $2, rating_count_as_client = $3 WHERE agent_id = $1"
        };
        sqlx::query(sql)
            .bind(agent_id)
            .bind(average)
            .bind(count)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}
