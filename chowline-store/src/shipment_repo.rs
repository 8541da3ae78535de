use async_trait::async_trait;
use chowline_core::{DeliveryError, DeliveryResult};
use chowline_quote::Quote;
use chowline_shipment::{Shipment, ShipmentRepository, ShipmentStatus, TrackingEvent};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::quote_repo::{lock_quote, save_quote_state};
use crate::storage_error;

const LIVE_ORDER_INDEX: &str = "shipments_live_order_idx";

const SHIPMENT_COLUMNS: &str = "id, order_id, quote_id, provider, tracking_number, status, cost, \
    currency, courier_name, service_type, label_url, estimated_delivery_at, delivered_at, \
    failure_reason, created_at, updated_at";

pub struct StoreShipmentRepository {
    pool: PgPool,
}

impl StoreShipmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ShipmentRow {
    id: Uuid,
    order_id: Uuid,
    quote_id: Uuid,
    provider: String,
    tracking_number: String,
    status: String,
    cost: Decimal,
    currency: String,
    courier_name: Option<String>,
    service_type: Option<String>,
    label_url: Option<String>,
    estimated_delivery_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ShipmentRow> for Shipment {
    type Error = DeliveryError;

    fn try_from(row: ShipmentRow) -> Result<Self, Self::Error> {
        Ok(Shipment {
            id: row.id,
            order_id: row.order_id,
            quote_id: row.quote_id,
            provider: row.provider.parse()?,
            tracking_number: row.tracking_number,
            status: row.status.parse()?,
            cost: row.cost,
            currency: row.currency,
            courier_name: row.courier_name,
            service_type: row.service_type,
            label_url: row.label_url,
            estimated_delivery_at: row.estimated_delivery_at,
            delivered_at: row.delivered_at,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TrackingEventRow {
    id: Uuid,
    shipment_id: Uuid,
    status: String,
    provider_status: Option<String>,
    description: Option<String>,
    location: Option<String>,
    occurred_at: DateTime<Utc>,
    raw: Option<Value>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TrackingEventRow> for TrackingEvent {
    type Error = DeliveryError;

    fn try_from(row: TrackingEventRow) -> Result<Self, Self::Error> {
        Ok(TrackingEvent {
            id: row.id,
            shipment_id: row.shipment_id,
            status: row.status.parse()?,
            provider_status: row.provider_status,
            description: row.description,
            location: row.location,
            occurred_at: row.occurred_at,
            raw: row.raw,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl ShipmentRepository for StoreShipmentRepository {
    async fn create_from_quote(&self, quote_id: Uuid, shipment: &Shipment, now: DateTime<Utc>) -> DeliveryResult<Quote> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let live: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM shipments WHERE order_id = $1 AND status <> 'CANCELLED' FOR UPDATE",
        )
        .bind(shipment.order_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage_error)?;

        if live.is_some() {
            return Err(DeliveryError::ShipmentAlreadyExists(shipment.order_id));
        }

        let mut quote = lock_quote(&mut tx, quote_id).await?;
        let consumed = quote.mark_used(shipment.id, now);
        save_quote_state(&mut tx, &quote).await?;
        if let Err(e) = consumed {
            // Keep whatever the quote learned (e.g. that it expired).
            tx.commit().await.map_err(storage_error)?;
            return Err(e);
        }

        let inserted = sqlx::query(&format!(
            "INSERT INTO shipments ({SHIPMENT_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"
        ))
        .bind(shipment.id)
        .bind(shipment.order_id)
        .bind(shipment.quote_id)
        .bind(shipment.provider.as_str())
        .bind(&shipment.tracking_number)
        .bind(shipment.status.as_str())
        .bind(shipment.cost)
        .bind(&shipment.currency)
        .bind(&shipment.courier_name)
        .bind(&shipment.service_type)
        .bind(&shipment.label_url)
        .bind(shipment.estimated_delivery_at)
        .bind(shipment.delivered_at)
        .bind(&shipment.failure_reason)
        .bind(shipment.created_at)
        .bind(shipment.updated_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.constraint() == Some(LIVE_ORDER_INDEX) => {
                return Err(DeliveryError::ShipmentAlreadyExists(shipment.order_id));
            }
            Err(e) => return Err(storage_error(e)),
        }

        tx.commit().await.map_err(storage_error)?;
        info!("Shipment {} stored for order {}", shipment.tracking_number, shipment.order_id);
        Ok(quote)
    }

    async fn find_shipment(&self, id: Uuid) -> DeliveryResult<Option<Shipment>> {
        let row = sqlx::query_as::<_, ShipmentRow>(&format!(
            "SELECT {SHIPMENT_COLUMNS} FROM shipments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(Shipment::try_from).transpose()
    }

    async fn find_by_tracking(&self, tracking_number: &str) -> DeliveryResult<Option<Shipment>> {
        let row = sqlx::query_as::<_, ShipmentRow>(&format!(
            "SELECT {SHIPMENT_COLUMNS} FROM shipments WHERE tracking_number = $1"
        ))
        .bind(tracking_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(Shipment::try_from).transpose()
    }

    async fn find_active_for_order(&self, order_id: Uuid) -> DeliveryResult<Option<Shipment>> {
        let row = sqlx::query_as::<_, ShipmentRow>(&format!(
            "SELECT {SHIPMENT_COLUMNS} FROM shipments WHERE order_id = $1 AND status <> 'CANCELLED'"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(Shipment::try_from).transpose()
    }

    async fn record_transition(
        &self,
        expected: ShipmentStatus,
        updated: &Shipment,
        event: &TrackingEvent,
    ) -> DeliveryResult<bool> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let result = sqlx::query(
            r#"
            UPDATE shipments
            SET status = $3, delivered_at = $4, failure_reason = $5, updated_at = $6
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(updated.id)
        .bind(expected.as_str())
        .bind(updated.status.as_str())
        .bind(updated.delivered_at)
        .bind(&updated.failure_reason)
        .bind(updated.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO tracking_events
                (id, shipment_id, status, provider_status, description, location, occurred_at, raw, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(event.id)
        .bind(event.shipment_id)
        .bind(event.status.as_str())
        .bind(&event.provider_status)
        .bind(&event.description)
        .bind(&event.location)
        .bind(event.occurred_at)
        .bind(&event.raw)
        .bind(event.created_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;
        Ok(true)
    }

    async fn tracking_events(&self, shipment_id: Uuid) -> DeliveryResult<Vec<TrackingEvent>> {
        let rows = sqlx::query_as::<_, TrackingEventRow>(
            r#"
            SELECT id, shipment_id, status, provider_status, description, location, occurred_at, raw, created_at
            FROM tracking_events
            WHERE shipment_id = $1
            ORDER BY seq
            "#,
        )
        .bind(shipment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.into_iter().map(TrackingEvent::try_from).collect()
    }
}
