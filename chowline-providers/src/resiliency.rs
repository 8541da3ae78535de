use async_trait::async_trait;
use chowline_core::address::Address;
use chowline_core::{DeliveryError, DeliveryResult, ProviderCapabilities, ProviderId};
use chowline_quote::{ProviderQuote, Quote};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{CreatedShipment, DeliveryProvider, ProviderTracking, QuoteRequest, ValidatedAddress, WebhookEvent};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Per-provider breaker. Trips after `failure_threshold` consecutive outage
/// errors and lets a single probe through once `reset_timeout` has passed.
pub struct CircuitBreaker {
    pub name: String,
    state: RwLock<CircuitState>,
    failure_count: AtomicUsize,
    failure_threshold: usize,
    reset_timeout: Duration,
    last_failure: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(name: &str, threshold: usize, timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicUsize::new(0),
            failure_threshold: threshold.max(1),
            reset_timeout: timeout,
            last_failure: RwLock::new(None),
        }
    }

    pub async fn state(&self) -> CircuitState {
        *self.state.read().await
    }

    pub async fn check(&self) -> bool {
        let state = *self.state.read().await;
        match state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let last_fail = *self.last_failure.read().await;
                match last_fail {
                    Some(instant) if instant.elapsed() >= self.reset_timeout => {
                        *self.state.write().await = CircuitState::HalfOpen;
                        info!(breaker = %self.name, "Circuit breaker moving to half-open");
                        true
                    }
                    _ => false,
                }
            }
        }
    }

    pub async fn record_success(&self) {
        let mut state = self.state.write().await;
        if *state == CircuitState::HalfOpen {
            *state = CircuitState::Closed;
            info!(breaker = %self.name, "Circuit breaker recovered to closed");
        }
        self.failure_count.store(0, Ordering::SeqCst);
    }

    pub async fn record_failure(&self) {
        let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.write().await;

        if count >= self.failure_threshold || *state == CircuitState::HalfOpen {
            *state = CircuitState::Open;
            *self.last_failure.write().await = Some(Instant::now());
            error!(breaker = %self.name, failures = count, "Circuit breaker tripped to open");
        }
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Wraps a provider with the breaker and, for reads and quotes, retries.
/// Shipment creation and cancellation are attempted once.
pub struct ResilientProvider {
    inner: Arc<dyn DeliveryProvider>,
    policy: RetryPolicy,
    breaker: CircuitBreaker,
}

impl ResilientProvider {
    pub fn new(inner: Arc<dyn DeliveryProvider>, policy: RetryPolicy, breaker: CircuitBreaker) -> Self {
        Self { inner, policy, breaker }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn guarded<T, F, Fut>(&self, operation: &'static str, retry: bool, call: F) -> DeliveryResult<T>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = DeliveryResult<T>> + Send,
        T: Send,
    {
        let attempts = if retry { self.policy.max_attempts.max(1) } else { 1 };
        let mut attempt = 1;

        loop {
            if !self.breaker.check().await {
                return Err(DeliveryError::ProviderUnavailable(format!(
                    "circuit open for {}",
                    self.breaker.name
                )));
            }

            match call().await {
                Ok(value) => {
                    self.breaker.record_success().await;
                    return Ok(value);
                }
                Err(e) if e.is_retryable() => {
                    self.breaker.record_failure().await;
                    if attempt >= attempts {
                        return Err(e);
                    }
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        provider = %self.inner.id(),
                        operation,
                        attempt,
                        ?delay,
                        error = %e,
                        "Provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl DeliveryProvider for ResilientProvider {
    fn id(&self) -> ProviderId {
        self.inner.id()
    }

    fn capabilities(&self) -> &'static ProviderCapabilities {
        self.inner.capabilities()
    }

    async fn validate_address(&self, address: &Address) -> DeliveryResult<ValidatedAddress> {
        self.guarded("validate_address", true, move || self.inner.validate_address(address))
            .await
    }

    async fn get_quote(&self, request: &QuoteRequest) -> DeliveryResult<ProviderQuote> {
        self.guarded("get_quote", true, move || self.inner.get_quote(request)).await
    }

    async fn create_shipment(&self, quote: &Quote, order_id: Uuid) -> DeliveryResult<CreatedShipment> {
        self.guarded("create_shipment", false, move || self.inner.create_shipment(quote, order_id))
            .await
    }

    async fn track_shipment(&self, tracking_number: &str) -> DeliveryResult<ProviderTracking> {
        self.guarded("track_shipment", true, move || self.inner.track_shipment(tracking_number))
            .await
    }

    async fn cancel_shipment(&self, tracking_number: &str) -> DeliveryResult<bool> {
        self.guarded("cancel_shipment", false, move || self.inner.cancel_shipment(tracking_number))
            .await
    }

    fn signature_header(&self) -> &'static str {
        self.inner.signature_header()
    }

    fn verify_webhook(&self, body: &[u8], signature: Option<&str>) -> DeliveryResult<()> {
        self.inner.verify_webhook(body, signature)
    }

    fn parse_webhook(&self, body: &[u8]) -> DeliveryResult<WebhookEvent> {
        self.inner.parse_webhook(body)
    }
}
