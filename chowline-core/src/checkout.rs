use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::DeliveryResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    pub name: String,
    pub description: Option<String>,
    pub quantity: u32,
    pub unit_price: Decimal,
    /// Kilograms; menus rarely carry this, so sizing falls back to a default.
    pub unit_weight_kg: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub user_id: Uuid,
    pub vendor_id: Uuid,
    pub currency: String,
    pub items: Vec<CartLine>,
}

/// Read access to carts and vendors, both owned by other services.
#[async_trait]
pub trait CheckoutReader: Send + Sync {
    async fn get_cart_for_vendor(&self, user_id: Uuid, vendor_id: Uuid) -> DeliveryResult<Option<Cart>>;

    /// Address id of the vendor's pickup location.
    async fn get_vendor_address(&self, vendor_id: Uuid) -> DeliveryResult<Option<Uuid>>;
}
