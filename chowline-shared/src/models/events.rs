use uuid::Uuid;

/// Published to the notification topic whenever a delivery moves an order
/// into a new customer-visible status.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderUpdateEvent {
    pub user_id: Uuid,
    pub order_id: Uuid,
    pub status: String,
    pub message: String,
    pub timestamp: i64,
}
