use async_trait::async_trait;
use chowline_core::checkout::{Cart, CartLine, CheckoutReader};
use chowline_core::DeliveryResult;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::storage_error;

pub struct StoreCheckoutReader {
    pool: PgPool,
}

impl StoreCheckoutReader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    name: String,
    description: Option<String>,
    quantity: i32,
    unit_price: Decimal,
    unit_weight_kg: Option<Decimal>,
    currency: String,
}

#[async_trait]
impl CheckoutReader for StoreCheckoutReader {
    async fn get_cart_for_vendor(&self, user_id: Uuid, vendor_id: Uuid) -> DeliveryResult<Option<Cart>> {
        let rows = sqlx::query_as::<_, CartItemRow>(
            r#"
            SELECT name, description, quantity, unit_price, unit_weight_kg, currency
            FROM cart_items
            WHERE user_id = $1 AND vendor_id = $2 AND quantity > 0
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .bind(vendor_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        let Some(currency) = rows.first().map(|r| r.currency.clone()) else {
            return Ok(None);
        };

        let items = rows
            .into_iter()
            .map(|r| CartLine {
                name: r.name,
                description: r.description,
                quantity: u32::try_from(r.quantity).unwrap_or(0),
                unit_price: r.unit_price,
                unit_weight_kg: r.unit_weight_kg,
            })
            .collect();

        Ok(Some(Cart { user_id, vendor_id, currency, items }))
    }

    async fn get_vendor_address(&self, vendor_id: Uuid) -> DeliveryResult<Option<Uuid>> {
        let address_id: Option<Option<Uuid>> =
            sqlx::query_scalar("SELECT address_id FROM vendors WHERE id = $1")
                .bind(vendor_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error)?;

        Ok(address_id.flatten())
    }
}
