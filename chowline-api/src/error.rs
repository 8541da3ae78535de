use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chowline_core::DeliveryError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    Anyhow(anyhow::Error),
}

/// HTTP status for each delivery failure.
pub fn status_for(err: &DeliveryError) -> StatusCode {
    match err {
        DeliveryError::AddressNotServiceable(_) | DeliveryError::NoCourierAvailable => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        DeliveryError::QuoteExpired(_) => StatusCode::GONE,
        DeliveryError::QuoteAlreadyUsed(_)
        | DeliveryError::QuoteNotConfirmed(_)
        | DeliveryError::InvalidQuoteTransition { .. }
        | DeliveryError::ShipmentAlreadyExists(_)
        | DeliveryError::InvalidShipmentTransition { .. } => StatusCode::CONFLICT,
        DeliveryError::QuoteNotFound(_)
        | DeliveryError::ShipmentNotFound(_)
        | DeliveryError::OrderNotFound(_)
        | DeliveryError::AddressNotFound(_) => StatusCode::NOT_FOUND,
        DeliveryError::CartNotFound(_)
        | DeliveryError::UnsupportedProvider(_)
        | DeliveryError::MalformedPayload(_)
        | DeliveryError::UnrecognizedProviderStatus(_) => StatusCode::BAD_REQUEST,
        DeliveryError::WebhookSignatureInvalid => StatusCode::UNAUTHORIZED,
        DeliveryError::ProviderAuthFailure(_) => StatusCode::BAD_GATEWAY,
        DeliveryError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        DeliveryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Anyhow(err) => match err.downcast_ref::<DeliveryError>() {
                Some(delivery) => {
                    let status = status_for(delivery);
                    if status.is_server_error() || status == StatusCode::BAD_GATEWAY {
                        tracing::error!(error = %delivery, "Delivery request failed");
                    }
                    if status == StatusCode::INTERNAL_SERVER_ERROR {
                        (status, "Internal Server Error".to_string())
                    } else {
                        (status, delivery.to_string())
                    }
                }
                None => {
                    tracing::error!("Internal Server Error: {}", err);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
                }
            },
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Anyhow(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_delivery_errors_map_to_client_statuses() {
        assert_eq!(status_for(&DeliveryError::QuoteExpired(Uuid::new_v4())), StatusCode::GONE);
        assert_eq!(status_for(&DeliveryError::QuoteAlreadyUsed(Uuid::new_v4())), StatusCode::CONFLICT);
        assert_eq!(status_for(&DeliveryError::NoCourierAvailable), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            status_for(&DeliveryError::ProviderUnavailable("timeout".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_storage_detail_is_not_leaked() {
        let response = AppError::from(DeliveryError::Storage("pool timed out".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = AppError::from(DeliveryError::QuoteNotFound(Uuid::nil())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
