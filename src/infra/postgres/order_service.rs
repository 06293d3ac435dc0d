//! PostgreSQL implementation of [`OrderService`].
//!
//! The marketplace and this engine share a database; orders, order items,
//! and license key grants are read directly from the storefront's tables.
//! Strictly read-only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::{
    GrantId, LicenseKeyGrant, Order, OrderId, OrderItem, OrderItemId, ProductId, UserId,
};
use crate::infra::{EngineError, OrderService, Result};

pub struct PgOrderService {
    pool: PgPool,
}

impl PgOrderService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderService for PgOrderService {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, customer_id, status, total_amount, points_used,
                   points_earned, discount_amount, created_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let item_rows = sqlx::query_as::<_, OrderItemRow>(
            r#"
            SELECT id, order_id, product_id, product_name, unit_price, quantity
            FROM order_items
            WHERE order_id = $1
            ORDER BY id
            "#,
        )
        .bind(order_id.0)
        .fetch_all(&self.pool)
        .await?;

        let grant_rows: Vec<(Uuid, Uuid, String)> = sqlx::query_as(
            r#"
            SELECT g.id, g.order_item_id, g.license_key
            FROM license_key_grants g
            JOIN order_items i ON i.id = g.order_item_id
            WHERE i.order_id = $1
            ORDER BY g.id
            "#,
        )
        .bind(order_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut grants: HashMap<Uuid, Vec<LicenseKeyGrant>> = HashMap::new();
        for (id, order_item_id, key) in grant_rows {
            grants.entry(order_item_id).or_default().push(LicenseKeyGrant {
                id: GrantId::from_uuid(id),
                key,
            });
        }

        Ok(item_rows
            .into_iter()
            .map(|row| {
                let item_grants = grants.remove(&row.id).unwrap_or_default();
                OrderItem {
                    id: OrderItemId::from_uuid(row.id),
                    order_id: OrderId::from_uuid(row.order_id),
                    product_id: ProductId::from_uuid(row.product_id),
                    product_name: row.product_name,
                    unit_price: row.unit_price,
                    quantity: row.quantity as u32,
                    grants: item_grants,
                }
            })
            .collect())
    }
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    customer_id: Uuid,
    status: String,
    total_amount: i64,
    points_used: i64,
    points_earned: i64,
    discount_amount: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = EngineError;

    fn try_from(row: OrderRow) -> Result<Self> {
        Ok(Order {
            id: OrderId::from_uuid(row.id),
            customer_id: UserId::from_uuid(row.customer_id),
            status: row.status.parse().map_err(EngineError::Internal)?,
            total_amount: row.total_amount,
            points_used: row.points_used,
            points_earned: row.points_earned,
            discount_amount: row.discount_amount,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    product_name: String,
    unit_price: i64,
    quantity: i32,
}
