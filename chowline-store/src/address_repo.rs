use async_trait::async_trait;
use chowline_core::address::{Address, AddressBook, CachedAddressCode};
use chowline_core::{DeliveryError, DeliveryResult};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::storage_error;

const ADDRESS_COLUMNS: &str = "id, contact_name, phone, email, line1, city, state, postal_code, \
    country, latitude, longitude, provider_codes";

pub struct StoreAddressBook {
    pool: PgPool,
}

impl StoreAddressBook {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct AddressRow {
    id: Uuid,
    contact_name: String,
    phone: Option<String>,
    email: Option<String>,
    line1: String,
    city: Option<String>,
    state: Option<String>,
    postal_code: Option<String>,
    country: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    provider_codes: Value,
}

impl TryFrom<AddressRow> for Address {
    type Error = DeliveryError;

    fn try_from(row: AddressRow) -> Result<Self, Self::Error> {
        Ok(Address {
            id: row.id,
            contact_name: row.contact_name,
            phone: row.phone.map(Into::into),
            email: row.email.map(Into::into),
            line1: row.line1,
            city: row.city,
            state: row.state,
            postal_code: row.postal_code,
            country: row.country,
            latitude: row.latitude,
            longitude: row.longitude,
            provider_codes: serde_json::from_value(row.provider_codes).map_err(storage_error)?,
        })
    }
}

#[async_trait]
impl AddressBook for StoreAddressBook {
    async fn get_address(&self, id: Uuid) -> DeliveryResult<Option<Address>> {
        let row = sqlx::query_as::<_, AddressRow>(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM addresses WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(Address::try_from).transpose()
    }

    async fn update_provider_address_code(&self, id: Uuid, code: CachedAddressCode) -> DeliveryResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let row = sqlx::query_as::<_, AddressRow>(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM addresses WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage_error)?;

        let mut address = Address::try_from(row.ok_or(DeliveryError::AddressNotFound(id))?)?;
        address.remember_code(code);

        sqlx::query("UPDATE addresses SET provider_codes = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(Json(&address.provider_codes))
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;
        Ok(())
    }
}
