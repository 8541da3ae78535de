pub mod provider;
pub mod address;
pub mod order;
pub mod checkout;

pub use provider::{select_provider, ProviderCapabilities, ProviderId, Workflow};

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Address not serviceable: {0}")]
    AddressNotServiceable(String),
    #[error("No courier available for this route")]
    NoCourierAvailable,
    #[error("Provider authentication failed: {0}")]
    ProviderAuthFailure(String),
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("Quote not found: {0}")]
    QuoteNotFound(Uuid),
    #[error("Quote expired: {0}")]
    QuoteExpired(Uuid),
    #[error("Quote already used: {0}")]
    QuoteAlreadyUsed(Uuid),
    #[error("Quote must be confirmed with the provider before use: {0}")]
    QuoteNotConfirmed(Uuid),
    #[error("Invalid quote transition from {from} to {to}")]
    InvalidQuoteTransition { from: String, to: String },

    #[error("Shipment already exists for order {0}")]
    ShipmentAlreadyExists(Uuid),
    #[error("Invalid shipment transition from {from} to {to}")]
    InvalidShipmentTransition { from: String, to: String },
    #[error("Shipment not found: {0}")]
    ShipmentNotFound(String),
    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),
    #[error("Address not found: {0}")]
    AddressNotFound(Uuid),
    #[error("No cart for vendor {0}")]
    CartNotFound(Uuid),

    #[error("Webhook signature invalid")]
    WebhookSignatureInvalid,
    #[error("Unrecognized provider status: {0}")]
    UnrecognizedProviderStatus(String),
    #[error("Malformed provider payload: {0}")]
    MalformedPayload(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl DeliveryError {
    /// Provider outages are the only failures worth retrying; everything else
    /// will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::ProviderUnavailable(_))
    }

    /// Validation and selection failures that belong to the caller.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DeliveryError::AddressNotServiceable(_)
                | DeliveryError::NoCourierAvailable
                | DeliveryError::UnsupportedProvider(_)
                | DeliveryError::QuoteNotFound(_)
                | DeliveryError::QuoteExpired(_)
                | DeliveryError::QuoteAlreadyUsed(_)
                | DeliveryError::QuoteNotConfirmed(_)
                | DeliveryError::InvalidQuoteTransition { .. }
                | DeliveryError::ShipmentAlreadyExists(_)
                | DeliveryError::ShipmentNotFound(_)
                | DeliveryError::OrderNotFound(_)
                | DeliveryError::AddressNotFound(_)
                | DeliveryError::CartNotFound(_)
                | DeliveryError::InvalidShipmentTransition { .. }
        )
    }
}

impl From<serde_json::Error> for DeliveryError {
    fn from(err: serde_json::Error) -> Self {
        DeliveryError::MalformedPayload(err.to_string())
    }
}

pub type DeliveryResult<T> = Result<T, DeliveryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(DeliveryError::ProviderUnavailable("timeout".into()).is_retryable());
        assert!(!DeliveryError::NoCourierAvailable.is_retryable());
        assert!(DeliveryError::QuoteExpired(Uuid::new_v4()).is_client_error());
        assert!(!DeliveryError::ProviderAuthFailure("401".into()).is_client_error());
        assert!(!DeliveryError::Storage("pool closed".into()).is_client_error());
    }
}
