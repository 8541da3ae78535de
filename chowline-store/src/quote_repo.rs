use async_trait::async_trait;
use chowline_core::{DeliveryError, DeliveryResult};
use chowline_quote::{Quote, QuoteRepository, Selection};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::storage_error;

pub struct StoreQuoteRepository {
    pool: PgPool,
}

impl StoreQuoteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lock the row, run the transition, and write back whatever state it
    /// left, even when it failed (a quote found expired stays expired).
    async fn transition<T>(
        &self,
        id: Uuid,
        apply: impl FnOnce(&mut Quote) -> DeliveryResult<T> + Send,
    ) -> DeliveryResult<Quote> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        let mut quote = lock_quote(&mut tx, id).await?;
        let result = apply(&mut quote);
        save_quote_state(&mut tx, &quote).await?;
        tx.commit().await.map_err(storage_error)?;
        result.map(|_| quote)
    }
}

pub(crate) const QUOTE_COLUMNS: &str = "id, provider, provider_quote_id, provider_request_token, \
    courier_id, courier_name, service_code, service_type, fee, currency, insurance_fee, \
    origin, destination, manifest, raw_response, status, selected_by, selection_reason, \
    selected_at, confirmed_at, used_at, shipment_id, estimated_delivery_at, expires_at, \
    created_at, updated_at";

#[derive(sqlx::FromRow)]
pub(crate) struct QuoteRow {
    id: Uuid,
    provider: String,
    provider_quote_id: Option<String>,
    provider_request_token: Option<String>,
    courier_id: Option<String>,
    courier_name: Option<String>,
    service_code: Option<String>,
    service_type: Option<String>,
    fee: Decimal,
    currency: String,
    insurance_fee: Option<Decimal>,
    origin: Value,
    destination: Value,
    manifest: Value,
    raw_response: Option<Value>,
    status: String,
    selected_by: Option<String>,
    selection_reason: Option<String>,
    selected_at: Option<DateTime<Utc>>,
    confirmed_at: Option<DateTime<Utc>>,
    used_at: Option<DateTime<Utc>>,
    shipment_id: Option<Uuid>,
    estimated_delivery_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<QuoteRow> for Quote {
    type Error = DeliveryError;

    fn try_from(row: QuoteRow) -> Result<Self, Self::Error> {
        Ok(Quote {
            id: row.id,
            provider: row.provider.parse()?,
            provider_quote_id: row.provider_quote_id,
            provider_request_token: row.provider_request_token,
            courier_id: row.courier_id,
            courier_name: row.courier_name,
            service_code: row.service_code,
            service_type: row.service_type,
            fee: row.fee,
            currency: row.currency,
            insurance_fee: row.insurance_fee,
            origin: serde_json::from_value(row.origin).map_err(storage_error)?,
            destination: serde_json::from_value(row.destination).map_err(storage_error)?,
            manifest: serde_json::from_value(row.manifest).map_err(storage_error)?,
            raw_response: row.raw_response.unwrap_or(Value::Null),
            status: row.status.parse()?,
            selected_by: row.selected_by,
            selection_reason: row.selection_reason,
            selected_at: row.selected_at,
            confirmed_at: row.confirmed_at,
            used_at: row.used_at,
            shipment_id: row.shipment_id,
            estimated_delivery_at: row.estimated_delivery_at,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(crate) async fn lock_quote(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> DeliveryResult<Quote> {
    let row = sqlx::query_as::<_, QuoteRow>(&format!(
        "SELECT {QUOTE_COLUMNS} FROM delivery_quotes WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(storage_error)?;

    row.ok_or(DeliveryError::QuoteNotFound(id))?.try_into()
}

pub(crate) async fn save_quote_state(tx: &mut Transaction<'_, Postgres>, quote: &Quote) -> DeliveryResult<()> {
    sqlx::query(
        r#"
        UPDATE delivery_quotes
        SET status = $2, selected_by = $3, selection_reason = $4, selected_at = $5,
            confirmed_at = $6, used_at = $7, shipment_id = $8, updated_at = $9
        WHERE id = $1
        "#,
    )
    .bind(quote.id)
    .bind(quote.status.as_str())
    .bind(&quote.selected_by)
    .bind(&quote.selection_reason)
    .bind(quote.selected_at)
    .bind(quote.confirmed_at)
    .bind(quote.used_at)
    .bind(quote.shipment_id)
    .bind(quote.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(storage_error)?;
    Ok(())
}

#[async_trait]
impl QuoteRepository for StoreQuoteRepository {
    async fn insert_quote(&self, quote: &Quote) -> DeliveryResult<()> {
        sqlx::query(&format!(
            "INSERT INTO delivery_quotes ({QUOTE_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26)"
        ))
        .bind(quote.id)
        .bind(quote.provider.as_str())
        .bind(&quote.provider_quote_id)
        .bind(&quote.provider_request_token)
        .bind(&quote.courier_id)
        .bind(&quote.courier_name)
        .bind(&quote.service_code)
        .bind(&quote.service_type)
        .bind(quote.fee)
        .bind(&quote.currency)
        .bind(quote.insurance_fee)
        .bind(Json(&quote.origin))
        .bind(Json(&quote.destination))
        .bind(Json(&quote.manifest))
        .bind(&quote.raw_response)
        .bind(quote.status.as_str())
        .bind(&quote.selected_by)
        .bind(&quote.selection_reason)
        .bind(quote.selected_at)
        .bind(quote.confirmed_at)
        .bind(quote.used_at)
        .bind(quote.shipment_id)
        .bind(quote.estimated_delivery_at)
        .bind(quote.expires_at)
        .bind(quote.created_at)
        .bind(quote.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn get_quote(&self, id: Uuid) -> DeliveryResult<Option<Quote>> {
        let row = sqlx::query_as::<_, QuoteRow>(&format!(
            "SELECT {QUOTE_COLUMNS} FROM delivery_quotes WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(Quote::try_from).transpose()
    }

    async fn select_quote(&self, id: Uuid, selection: Selection, now: DateTime<Utc>) -> DeliveryResult<Quote> {
        self.transition(id, |q| q.select(selection, now)).await
    }

    async fn cancel_quote(&self, id: Uuid, now: DateTime<Utc>) -> DeliveryResult<Quote> {
        self.transition(id, |q| q.cancel(now)).await
    }

    async fn expire_quote(&self, id: Uuid, now: DateTime<Utc>) -> DeliveryResult<Quote> {
        self.transition(id, |q| Ok(q.expire(now))).await
    }

    async fn expire_stale_quotes(&self, now: DateTime<Utc>) -> DeliveryResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE delivery_quotes
            SET status = 'EXPIRED', updated_at = $1
            WHERE status IN ('PENDING', 'SELECTED')
              AND expires_at IS NOT NULL
              AND expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(result.rows_affected())
    }
}
