use async_trait::async_trait;
use chowline_core::DeliveryResult;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Quote, Selection};

/// Persistence for quotes. Every transition runs `Quote`'s state machine
/// under the store's own lock or transaction, so concurrent callers see a
/// single winner.
#[async_trait]
pub trait QuoteRepository: Send + Sync {
    async fn insert_quote(&self, quote: &Quote) -> DeliveryResult<()>;

    async fn get_quote(&self, id: Uuid) -> DeliveryResult<Option<Quote>>;

    async fn select_quote(
        &self,
        id: Uuid,
        selection: Selection,
        now: DateTime<Utc>,
    ) -> DeliveryResult<Quote>;

    async fn cancel_quote(&self, id: Uuid, now: DateTime<Utc>) -> DeliveryResult<Quote>;

    async fn expire_quote(&self, id: Uuid, now: DateTime<Utc>) -> DeliveryResult<Quote>;

    /// Flip every non-terminal quote past its expiry to EXPIRED. Returns how
    /// many changed.
    async fn expire_stale_quotes(&self, now: DateTime<Utc>) -> DeliveryResult<u64>;
}
