//! PostgreSQL implementation of [`ReturnsStore`].
//!
//! Concurrency control is a compare-and-swap on the status column: every
//! mutating statement carries `WHERE status = ANY(expected)` so two
//! concurrent decisions on the same return cannot both succeed. Grant claim
//! uniqueness rides on the `grant_claims` primary key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::{FromRow, Postgres, QueryBuilder, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::{
    GrantId, LedgerEntryId, NewLedgerEntry, OrderId, OrderItemId, PageResult, Return,
    ReturnId, ReturnItem, ReturnItemId, ReturnQuery, ReturnStatus, ReturnsSummary,
    TransitionUpdate, UserId,
};
use crate::infra::{EngineError, Result, ReturnsStore};

use super::points_ledger::lock_points_account;

/// PostgreSQL-backed returns store.
pub struct PgReturnsStore {
    pool: PgPool,
}

impl PgReturnsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_items(&self, return_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<ReturnItem>>> {
        let rows = sqlx::query_as::<_, ReturnItemRow>(
            r#"
            SELECT id, return_id, order_item_id, grant_id, unit_price, reason
            FROM return_items
            WHERE return_id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(return_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<ReturnItem>> = HashMap::new();
        for row in rows {
            grouped.entry(row.return_id).or_default().push(row.into());
        }
        Ok(grouped)
    }

    async fn load_return(&self, id: ReturnId) -> Result<Option<Return>> {
        let row = sqlx::query_as::<_, ReturnRow>(
            r#"
            SELECT id, order_id, user_id, status, reason, refund_amount,
                   refund_method, admin_notes, created_at, processed_at
            FROM returns
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut items = self.load_items(&[id.0]).await?;
        let mut ret: Return = row.try_into()?;
        ret.items = items.remove(&id.0).unwrap_or_default();
        Ok(Some(ret))
    }

    /// Classify a CAS miss: the return is either absent or in a status the
    /// caller did not expect.
    async fn classify_cas_miss(
        &self,
        id: ReturnId,
        to: ReturnStatus,
    ) -> EngineError {
        match self.load_return(id).await {
            Ok(Some(current)) => EngineError::InvalidTransition {
                return_id: id.to_string(),
                from: current.status,
                to,
            },
            Ok(None) => EngineError::not_found("return", id),
            Err(e) => e,
        }
    }
}

async fn release_claims(tx: &mut Transaction<'_, Postgres>, return_id: ReturnId) -> Result<()> {
    sqlx::query("DELETE FROM grant_claims WHERE return_id = $1")
        .bind(return_id.0)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &ReturnQuery) {
    builder.push(" WHERE 1=1");
    if let Some(user_id) = query.filter.user_id {
        builder.push(" AND user_id = ").push_bind(user_id.0);
    }
    if let Some(status) = query.filter.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(order_id) = query.filter.order_id {
        builder.push(" AND order_id = ").push_bind(order_id.0);
    }
    if let Some(from) = query.filter.created_from {
        builder.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = query.filter.created_to {
        builder.push(" AND created_at <= ").push_bind(to);
    }
}

#[async_trait]
impl ReturnsStore for PgReturnsStore {
    async fn insert_return(&self, ret: &Return) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO returns (
                id, order_id, user_id, status, reason, refund_amount,
                refund_method, admin_notes, created_at, processed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(ret.id.0)
        .bind(ret.order_id.0)
        .bind(ret.user_id.0)
        .bind(ret.status.as_str())
        .bind(&ret.reason)
        .bind(ret.refund_amount)
        .bind(ret.refund_method.as_str())
        .bind(&ret.admin_notes)
        .bind(ret.created_at)
        .bind(ret.processed_at)
        .execute(&mut *tx)
        .await?;

        for item in &ret.items {
            sqlx::query(
                r#"
                INSERT INTO return_items (
                    id, return_id, order_item_id, grant_id, unit_price, reason
                ) VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(item.id.0)
            .bind(ret.id.0)
            .bind(item.order_item_id.0)
            .bind(item.grant_id.0)
            .bind(item.unit_price)
            .bind(&item.reason)
            .execute(&mut *tx)
            .await?;

            let claim = sqlx::query(
                r#"
                INSERT INTO grant_claims (grant_id, return_id, order_id)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(item.grant_id.0)
            .bind(ret.id.0)
            .bind(ret.order_id.0)
            .execute(&mut *tx)
            .await;

            if let Err(e) = claim {
                if e.as_database_error()
                    .is_some_and(|d| d.is_unique_violation())
                {
                    return Err(EngineError::GrantAlreadyClaimed {
                        grant_id: item.grant_id.to_string(),
                    });
                }
                return Err(e.into());
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_return(&self, id: ReturnId) -> Result<Option<Return>> {
        self.load_return(id).await
    }

    async fn claimed_grants(&self, order_id: OrderId) -> Result<Vec<GrantId>> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT grant_id FROM grant_claims WHERE order_id = $1")
                .bind(order_id.0)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(g,)| GrantId::from_uuid(g)).collect())
    }

    async fn transition(
        &self,
        id: ReturnId,
        expected: &[ReturnStatus],
        update: TransitionUpdate,
    ) -> Result<Return> {
        let expected_strs: Vec<String> =
            expected.iter().map(|s| s.as_str().to_string()).collect();

        let mut tx = self.pool.begin().await?;

        let updated: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE returns
            SET status = $2,
                admin_notes = COALESCE($3, admin_notes),
                refund_method = COALESCE($4, refund_method),
                processed_at = COALESCE($5, processed_at)
            WHERE id = $1 AND status = ANY($6)
            RETURNING id
            "#,
        )
        .bind(id.0)
        .bind(update.to.as_str())
        .bind(update.admin_notes.as_deref())
        .bind(update.refund_method.map(|m| m.as_str()))
        .bind(update.processed_at)
        .bind(&expected_strs)
        .fetch_optional(&mut *tx)
        .await?;

        if updated.is_none() {
            tx.rollback().await?;
            return Err(self.classify_cas_miss(id, update.to).await);
        }

        if !update.to.claims_grants() {
            release_claims(&mut tx, id).await?;
        }

        tx.commit().await?;

        self.load_return(id)
            .await?
            .ok_or_else(|| EngineError::not_found("return", id))
    }

    async fn commit_refund(
        &self,
        id: ReturnId,
        processed_at: DateTime<Utc>,
        ledger_entry: Option<NewLedgerEntry>,
    ) -> Result<Return> {
        let mut tx = self.pool.begin().await?;

        let updated: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE returns
            SET status = $2, processed_at = $3
            WHERE id = $1 AND status = $4
            RETURNING user_id
            "#,
        )
        .bind(id.0)
        .bind(ReturnStatus::Refunded.as_str())
        .bind(processed_at)
        .bind(ReturnStatus::Approved.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        if updated.is_none() {
            tx.rollback().await?;
            // A lost race with another finalize surfaces as a conflict so the
            // service boundary retries into the idempotent no-op path.
            return match self.load_return(id).await? {
                Some(r) if r.status == ReturnStatus::Refunded => Err(
                    EngineError::ConcurrencyConflict(format!(
                        "return {id} was finalized concurrently"
                    )),
                ),
                Some(r) => Err(EngineError::InvalidTransition {
                    return_id: id.to_string(),
                    from: r.status,
                    to: ReturnStatus::Refunded,
                }),
                None => Err(EngineError::not_found("return", id)),
            };
        }

        if let Some(entry) = ledger_entry {
            // Serialize with other appends for this user, then write the
            // entry and roll the maintained balance forward.
            let balance = lock_points_account(&mut tx, entry.user_id).await?;
            sqlx::query(
                r#"
                INSERT INTO points_ledger (
                    id, user_id, amount, entry_type, description,
                    order_id, return_id, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(LedgerEntryId::new().0)
            .bind(entry.user_id.0)
            .bind(entry.amount)
            .bind(entry.entry_type.as_str())
            .bind(&entry.description)
            .bind(entry.order_id.map(|o| o.0))
            .bind(entry.return_id.map(|r| r.0))
            .bind(processed_at)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE points_accounts SET current_balance = $2, updated_at = NOW() WHERE user_id = $1",
            )
            .bind(entry.user_id.0)
            .bind(balance + entry.amount)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.load_return(id)
            .await?
            .ok_or_else(|| EngineError::not_found("return", id))
    }

    async fn list(&self, query: &ReturnQuery) -> Result<PageResult<Return>> {
        let mut count_builder = QueryBuilder::new("SELECT COUNT(*) FROM returns");
        push_filters(&mut count_builder, query);
        let total: (i64,) = count_builder
            .build_query_as()
            .fetch_one(&self.pool)
            .await?;

        let mut builder = QueryBuilder::new(
            "SELECT id, order_id, user_id, status, reason, refund_amount, \
             refund_method, admin_notes, created_at, processed_at FROM returns",
        );
        push_filters(&mut builder, query);
        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(query.page.limit as i64)
            .push(" OFFSET ")
            .push_bind(query.page.offset() as i64);

        let rows: Vec<ReturnRow> = builder.build_query_as().fetch_all(&self.pool).await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut items = self.load_items(&ids).await?;

        let returns = rows
            .into_iter()
            .map(|row| {
                let id = row.id;
                let mut ret: Return = row.try_into()?;
                ret.items = items.remove(&id).unwrap_or_default();
                Ok(ret)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(PageResult::new(returns, total.0 as u64, query.page))
    }

    async fn summary(&self) -> Result<ReturnsSummary> {
        let counts: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM returns GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut summary = ReturnsSummary::default();
        for (status, count) in counts {
            let status: ReturnStatus = status
                .parse()
                .map_err(EngineError::Internal)?;
            summary.set_count(status, count as u64);
        }

        let total: (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(refund_amount), 0) FROM returns WHERE status = $1",
        )
        .bind(ReturnStatus::Refunded.as_str())
        .fetch_one(&self.pool)
        .await?;
        summary.total_refunded_amount = total.0;

        Ok(summary)
    }
}

// ============================================================================
// Row types
// ============================================================================

#[derive(Debug, FromRow)]
struct ReturnRow {
    id: Uuid,
    order_id: Uuid,
    user_id: Uuid,
    status: String,
    reason: String,
    refund_amount: i64,
    refund_method: String,
    admin_notes: Option<String>,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<ReturnRow> for Return {
    type Error = EngineError;

    fn try_from(row: ReturnRow) -> Result<Self> {
        Ok(Return {
            id: ReturnId::from_uuid(row.id),
            order_id: OrderId::from_uuid(row.order_id),
            user_id: UserId::from_uuid(row.user_id),
            status: row.status.parse().map_err(EngineError::Internal)?,
            reason: row.reason,
            refund_amount: row.refund_amount,
            refund_method: row.refund_method.parse().map_err(EngineError::Internal)?,
            admin_notes: row.admin_notes,
            created_at: row.created_at,
            processed_at: row.processed_at,
            items: Vec::new(),
        })
    }
}

#[derive(Debug, FromRow)]
struct ReturnItemRow {
    id: Uuid,
    return_id: Uuid,
    order_item_id: Uuid,
    grant_id: Uuid,
    unit_price: i64,
    reason: Option<String>,
}

impl From<ReturnItemRow> for ReturnItem {
    fn from(row: ReturnItemRow) -> Self {
        ReturnItem {
            id: ReturnItemId::from_uuid(row.id),
            return_id: ReturnId::from_uuid(row.return_id),
            order_item_id: OrderItemId::from_uuid(row.order_item_id),
            grant_id: GrantId::from_uuid(row.grant_id),
            unit_price: row.unit_price,
            reason: row.reason,
        }
    }
}
