use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{DeliveryError, DeliveryResult};

/// Customer-facing order status. Owned by the order service; delivery only
/// moves it through the delivery-related states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    ReadyForPickup,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::ReadyForPickup => "READY_FOR_PICKUP",
            OrderStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DeliveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "PENDING" => OrderStatus::Pending,
            "CONFIRMED" => OrderStatus::Confirmed,
            "PREPARING" => OrderStatus::Preparing,
            "READY_FOR_PICKUP" => OrderStatus::ReadyForPickup,
            "OUT_FOR_DELIVERY" => OrderStatus::OutForDelivery,
            "DELIVERED" => OrderStatus::Delivered,
            "CANCELLED" => OrderStatus::Cancelled,
            other => return Err(DeliveryError::Storage(format!("unknown order status {other}"))),
        })
    }
}

/// The slice of an order that delivery reads and writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub vendor_id: Uuid,
    pub status: OrderStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(user_id: Uuid, vendor_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            vendor_id,
            status: OrderStatus::Confirmed,
            delivered_at: None,
            cancelled_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Move to `status`, stamping the matching timestamp. Returns false when
    /// the order is already there.
    pub fn update_status(&mut self, status: OrderStatus, now: DateTime<Utc>) -> bool {
        if self.status == status {
            return false;
        }
        match status {
            OrderStatus::Delivered => self.delivered_at = Some(now),
            OrderStatus::Cancelled => self.cancelled_at = Some(now),
            _ => {}
        }
        self.status = status;
        self.updated_at = now;
        true
    }
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_order(&self, id: Uuid) -> DeliveryResult<Option<Order>>;

    async fn save_order(&self, order: &Order) -> DeliveryResult<()>;
}

/// Push/SSE fan-out lives elsewhere; delivery only asks for a message to go out.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_order_update(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        status: OrderStatus,
        message: &str,
    ) -> DeliveryResult<()>;
}
