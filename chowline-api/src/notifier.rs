use async_trait::async_trait;
use chowline_core::order::{Notifier, OrderStatus};
use chowline_core::DeliveryResult;
use uuid::Uuid;

/// Stand-in when no broker is configured: notifications only reach the log.
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_order_update(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        status: OrderStatus,
        message: &str,
    ) -> DeliveryResult<()> {
        tracing::info!(%user_id, %order_id, %status, message, "Order update notification");
        Ok(())
    }
}
