use anyhow::Context;
use chowline_api::{app, notifier::LogNotifier, worker, AppState};
use chowline_core::order::Notifier;
use chowline_core::ProviderId;
use chowline_providers::{
    CircuitBreaker, DeliveryProvider, InternationalClient, ProviderRegistry, RegionalClient, ResilientProvider,
    UnconfiguredProvider,
};
use chowline_shipment::{DeliveryService, MemoryStore};
use chowline_store::app_config::{Config, DeliveryConfig};
use chowline_store::{
    DbClient, EventProducer, KafkaNotifier, RedisClient, StoreAddressBook, StoreCheckoutReader, StoreOrderRepository,
    StoreQuoteRepository, StoreShipmentRepository,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chowline_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Chowline delivery API on port {}", config.server.port);

    let providers = build_providers(&config)?;
    let notifier = build_notifier(&config)?;

    let delivery = match &config.database {
        Some(db_config) => {
            let db = DbClient::new(&db_config.url, db_config.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            let pool = db.pool.clone();
            DeliveryService::new(
                providers,
                Arc::new(StoreQuoteRepository::new(pool.clone())),
                Arc::new(StoreShipmentRepository::new(pool.clone())),
                Arc::new(StoreOrderRepository::new(pool.clone())),
                Arc::new(StoreAddressBook::new(pool.clone())),
                Arc::new(StoreCheckoutReader::new(pool)),
                notifier,
            )
        }
        None => {
            tracing::warn!("No database configured, keeping delivery state in memory");
            DeliveryService::in_memory(providers, Arc::new(MemoryStore::new()), notifier)
        }
    };

    let mut state = AppState::new(delivery.clone());
    if let Some(redis_config) = &config.redis {
        let redis = RedisClient::new(&redis_config.url)
            .await
            .context("Failed to create Redis client")?;
        state = state.with_redis(Arc::new(redis), config.delivery.rate_limit.clone());
    }

    tokio::spawn(worker::start_quote_expiry_worker(
        delivery,
        Duration::from_secs(config.delivery.quote_sweep_interval_secs.max(1)),
    ));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state).into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

fn resilient(name: &str, inner: Arc<dyn DeliveryProvider>, settings: &DeliveryConfig) -> Arc<dyn DeliveryProvider> {
    let breaker = CircuitBreaker::new(
        name,
        settings.breaker.failure_threshold,
        Duration::from_secs(settings.breaker.reset_timeout_secs),
    );
    Arc::new(ResilientProvider::new(inner, settings.retry.policy(), breaker))
}

fn build_providers(config: &Config) -> anyhow::Result<ProviderRegistry> {
    let settings = &config.delivery;
    let allow_unsigned = settings.allow_unsigned_webhooks;

    let regional: Arc<dyn DeliveryProvider> = match &config.providers.regional {
        Some(c) => {
            let client = RegionalClient::new(c, settings.request_timeout(), allow_unsigned)?;
            resilient("regional", Arc::new(client), settings)
        }
        None => {
            tracing::warn!("No regional provider configured, regional delivery is unavailable");
            Arc::new(UnconfiguredProvider::new(ProviderId::Regional))
        }
    };

    let international: Arc<dyn DeliveryProvider> = match &config.providers.international {
        Some(c) => {
            let client = InternationalClient::new(c, settings.request_timeout(), allow_unsigned)?;
            resilient("international", Arc::new(client), settings)
        }
        None => {
            tracing::warn!("No international provider configured, international delivery is unavailable");
            Arc::new(UnconfiguredProvider::new(ProviderId::International))
        }
    };

    Ok(ProviderRegistry::new(regional, international)?)
}

fn build_notifier(config: &Config) -> anyhow::Result<Arc<dyn Notifier>> {
    match &config.kafka {
        Some(kafka) => {
            let producer = EventProducer::new(&kafka.brokers).context("Failed to create Kafka producer")?;
            Ok(Arc::new(KafkaNotifier::new(producer, kafka.notification_topic.clone())))
        }
        None => {
            tracing::warn!("No Kafka configured, order notifications go to the log only");
            Ok(Arc::new(LogNotifier))
        }
    }
}
