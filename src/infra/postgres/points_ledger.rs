//! PostgreSQL implementation of [`PointsLedger`].
//!
//! Appends for one user are linearized by locking that user's
//! `points_accounts` row inside the transaction, so the balance-sufficiency
//! check can never pass against a stale balance. The balance itself is
//! recomputed from the entry history; the account row is only the lock
//! target and a maintained view.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::{FromRow, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{
    LedgerEntryId, NewLedgerEntry, OrderId, Page, PageResult, Points, PointsBalance,
    PointsLedgerEntry, ReturnId, UserId,
};
use crate::infra::{EngineError, PointsLedger, Result};

/// Ensure the user's account row exists and lock it for this transaction.
/// Returns the ledger-derived balance, which the caller must treat as the
/// truth for the duration of the lock.
pub(crate) async fn lock_points_account(
    tx: &mut Transaction<'_, Postgres>,
    user_id: UserId,
) -> Result<Points> {
    sqlx::query(
        r#"
        INSERT INTO points_accounts (user_id, current_balance, updated_at)
        VALUES ($1, 0, NOW())
        ON CONFLICT (user_id) DO NOTHING
        "#,
    )
    .bind(user_id.0)
    .execute(&mut **tx)
    .await?;

    sqlx::query_as::<_, (i64,)>(
        "SELECT current_balance FROM points_accounts WHERE user_id = $1 FOR UPDATE",
    )
    .bind(user_id.0)
    .fetch_one(&mut **tx)
    .await?;

    let derived: (i64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(amount), 0) FROM points_ledger WHERE user_id = $1",
    )
    .bind(user_id.0)
    .fetch_one(&mut **tx)
    .await?;

    Ok(derived.0)
}

/// PostgreSQL-backed points ledger.
pub struct PgPointsLedger {
    pool: PgPool,
}

impl PgPointsLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PointsLedger for PgPointsLedger {
    async fn append(&self, entry: NewLedgerEntry) -> Result<PointsLedgerEntry> {
        let mut tx = self.pool.begin().await?;

        let balance = lock_points_account(&mut tx, entry.user_id).await?;
        if entry.amount < 0 && balance + entry.amount < 0 {
            tx.rollback().await?;
            return Err(EngineError::InsufficientBalance {
                balance,
                requested: entry.amount.abs(),
            });
        }

        let record = PointsLedgerEntry {
            id: LedgerEntryId::new(),
            user_id: entry.user_id,
            amount: entry.amount,
            entry_type: entry.entry_type,
            description: entry.description,
            order_id: entry.order_id,
            return_id: entry.return_id,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO points_ledger (
                id, user_id, amount, entry_type, description,
                order_id, return_id, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id.0)
        .bind(record.user_id.0)
        .bind(record.amount)
        .bind(record.entry_type.as_str())
        .bind(&record.description)
        .bind(record.order_id.map(|o| o.0))
        .bind(record.return_id.map(|r| r.0))
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE points_accounts SET current_balance = $2, updated_at = NOW() WHERE user_id = $1",
        )
        .bind(record.user_id.0)
        .bind(balance + record.amount)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    async fn balance(&self, user_id: UserId) -> Result<PointsBalance> {
        let row: (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(amount), 0),
                   COALESCE(SUM(amount) FILTER (WHERE amount > 0), 0),
                   COALESCE(SUM(ABS(amount)) FILTER (WHERE entry_type = 'spent'), 0)
            FROM points_ledger
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.0)
        .fetch_one(&self.pool)
        .await?;

        Ok(PointsBalance {
            balance: row.0,
            total_earned: row.1,
            total_spent: row.2,
        })
    }

    async fn entries(&self, user_id: UserId, page: Page) -> Result<PageResult<PointsLedgerEntry>> {
        let total: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM points_ledger WHERE user_id = $1")
                .bind(user_id.0)
                .fetch_one(&self.pool)
                .await?;

        let rows = sqlx::query_as::<_, LedgerRow>(
            r#"
            SELECT id, user_id, amount, entry_type, description,
                   order_id, return_id, created_at
            FROM points_ledger
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id.0)
        .bind(page.limit as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let entries = rows
            .into_iter()
            .map(PointsLedgerEntry::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(PageResult::new(entries, total.0 as u64, page))
    }
}

#[derive(Debug, FromRow)]
struct LedgerRow {
    id: Uuid,
    user_id: Uuid,
    amount: i64,
    entry_type: String,
    description: String,
    order_id: Option<Uuid>,
    return_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<LedgerRow> for PointsLedgerEntry {
    type Error = EngineError;

    fn try_from(row: LedgerRow) -> Result<Self> {
        Ok(PointsLedgerEntry {
            id: LedgerEntryId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            amount: row.amount,
            entry_type: row.entry_type.parse().map_err(EngineError::Internal)?,
            description: row.description,
            order_id: row.order_id.map(OrderId::from_uuid),
            return_id: row.return_id.map(ReturnId::from_uuid),
            created_at: row.created_at,
        })
    }
}
