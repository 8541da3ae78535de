use chowline_providers::{InternationalConfig, RegionalConfig, RetryPolicy};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    /// Without a database the service keeps everything in memory.
    pub database: Option<DatabaseConfig>,
    pub redis: Option<RedisConfig>,
    pub kafka: Option<KafkaConfig>,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_notification_topic")]
    pub notification_topic: String,
}

fn default_notification_topic() -> String {
    "order.updates".to_string()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DeliveryConfig {
    pub request_timeout_secs: u64,
    pub retry: RetrySettings,
    pub breaker: BreakerSettings,
    pub quote_sweep_interval_secs: u64,
    /// Accept callbacks from providers with no webhook secret configured.
    pub allow_unsigned_webhooks: bool,
    pub rate_limit: RateLimitSettings,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            retry: RetrySettings::default(),
            breaker: BreakerSettings::default(),
            quote_sweep_interval_secs: 60,
            allow_unsigned_webhooks: false,
            rate_limit: RateLimitSettings::default(),
        }
    }
}

impl DeliveryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 200, max_delay_ms: 2000 }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: usize,
    pub reset_timeout_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self { failure_threshold: 5, reset_timeout_secs: 30 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitSettings {
    pub requests: i64,
    pub window_secs: i64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self { requests: 100, window_secs: 60 }
    }
}

/// Missing provider sections fall back to the in-process mock provider.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProvidersConfig {
    pub regional: Option<RegionalConfig>,
    pub international: Option<InternationalConfig>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. CHOWLINE__PROVIDERS__REGIONAL__API_KEY
            .add_source(config::Environment::with_prefix("CHOWLINE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse("[server]\nport = 8080\n");
        assert_eq!(config.server.port, 8080);
        assert!(config.database.is_none());
        assert!(config.providers.regional.is_none());
        assert_eq!(config.delivery.request_timeout(), Duration::from_secs(10));
        assert!(!config.delivery.allow_unsigned_webhooks);
        assert_eq!(config.delivery.retry.policy().max_attempts, 3);
    }

    #[test]
    fn test_provider_sections() {
        let config = parse(
            r#"
            [server]
            port = 8080

            [delivery]
            request_timeout_secs = 4
            [delivery.retry]
            max_attempts = 5

            [providers.regional]
            base_url = "https://regional.example.test/v1"
            api_key = "sk_test"
            webhook_secret = "whsec"

            [providers.international]
            base_url = "https://intl.example.test"
            auth_url = "https://auth.example.test/oauth/v2/token"
            customer_id = "cust_1"
            client_id = "id"
            client_secret = "secret"
            scope = "eats.deliveries"
            "#,
        );
        assert_eq!(config.delivery.request_timeout_secs, 4);
        assert_eq!(config.delivery.retry.max_attempts, 5);
        assert_eq!(config.delivery.retry.base_delay_ms, 200);
        let regional = config.providers.regional.unwrap();
        assert_eq!(regional.webhook_secret.as_deref(), Some("whsec"));
        assert!(config.providers.international.unwrap().webhook_secret.is_none());
    }
}
