use async_trait::async_trait;
use chowline_core::order::{Order, OrderRepository};
use chowline_core::{DeliveryError, DeliveryResult};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::storage_error;

pub struct StoreOrderRepository {
    pool: PgPool,
}

impl StoreOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    vendor_id: Uuid,
    status: String,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = DeliveryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            user_id: row.user_id,
            vendor_id: row.vendor_id,
            status: row.status.parse()?,
            delivered_at: row.delivered_at,
            cancelled_at: row.cancelled_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl OrderRepository for StoreOrderRepository {
    async fn find_order(&self, id: Uuid) -> DeliveryResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT id, user_id, vendor_id, status, delivered_at, cancelled_at, updated_at FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(Order::try_from).transpose()
    }

    /// Delivery only owns the status columns; the rest of the order row is
    /// left alone.
    async fn save_order(&self, order: &Order) -> DeliveryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, delivered_at = $3, cancelled_at = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(order.id)
        .bind(order.status.as_str())
        .bind(order.delivered_at)
        .bind(order.cancelled_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(DeliveryError::OrderNotFound(order.id));
        }
        Ok(())
    }
}
