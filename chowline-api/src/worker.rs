use chowline_shipment::DeliveryService;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

/// Periodically flips quotes past their expiry to EXPIRED. Lazy checks at use
/// time still apply between sweeps.
pub async fn start_quote_expiry_worker(delivery: DeliveryService, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Quote expiry worker started, sweeping every {:?}", every);

    loop {
        ticker.tick().await;
        if let Err(e) = delivery.expire_stale_quotes().await {
            error!("Quote expiry sweep failed: {}", e);
        }
    }
}
