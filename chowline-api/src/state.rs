use chowline_shipment::DeliveryService;
use chowline_store::app_config::RateLimitSettings;
use chowline_store::RedisClient;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub delivery: DeliveryService,
    /// Rate limiting is skipped when no redis is configured.
    pub redis: Option<Arc<RedisClient>>,
    pub rate_limit: RateLimitSettings,
}

impl AppState {
    pub fn new(delivery: DeliveryService) -> Self {
        Self {
            delivery,
            redis: None,
            rate_limit: RateLimitSettings::default(),
        }
    }

    pub fn with_redis(mut self, redis: Arc<RedisClient>, rate_limit: RateLimitSettings) -> Self {
        self.redis = Some(redis);
        self.rate_limit = rate_limit;
        self
    }
}
