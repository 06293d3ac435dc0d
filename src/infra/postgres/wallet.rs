//! PostgreSQL implementation of [`WalletService`].
//!
//! Store credit is issued as a row in the shared `store_credits` table and
//! spent by the storefront, not by this engine. The unique index on
//! `return_id` makes issuance idempotent: a concurrent or retried finalize
//! finds the existing row and gets the original receipt back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::domain::{Money, ReturnId, UserId};
use crate::infra::{CreditReceipt, EngineError, Result, WalletService};

pub struct PgWalletService {
    pool: PgPool,
}

impl PgWalletService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WalletService for PgWalletService {
    async fn issue_store_credit(
        &self,
        user_id: UserId,
        amount: Money,
        return_id: ReturnId,
    ) -> Result<CreditReceipt> {
        sqlx::query(
            r#"
            INSERT INTO store_credits (id, user_id, amount, return_id, issued_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (return_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id.0)
        .bind(amount)
        .bind(return_id.0)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        // The conflict path returns whatever the first issuance wrote.
        let row: Option<(Uuid, Uuid, i64, DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, user_id, amount, issued_at FROM store_credits WHERE return_id = $1",
        )
        .bind(return_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let (receipt_id, owner, amount, issued_at) = row.ok_or_else(|| {
            EngineError::ExternalService(format!(
                "store credit for return {return_id} vanished after insert"
            ))
        })?;

        Ok(CreditReceipt {
            receipt_id,
            user_id: UserId::from_uuid(owner),
            amount,
            issued_at,
        })
    }
}
