use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use chowline_core::{DeliveryError, ProviderId};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/delivery/{provider}", post(handle_delivery_webhook))
}

/// POST /v1/webhooks/delivery/{provider}
///
/// Always answers 200. Failures are logged and change no state.
async fn handle_delivery_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    let provider = match provider.parse::<ProviderId>() {
        Ok(provider) => provider,
        Err(e) => {
            tracing::warn!(error = %e, "Callback for unknown delivery provider");
            return acknowledged();
        }
    };

    let signature = headers
        .get(state.delivery.signature_header(provider))
        .and_then(|v| v.to_str().ok());

    match state.delivery.process_webhook(provider, signature, &body).await {
        Ok(outcome) => {
            tracing::info!(%provider, ?outcome, "Delivery callback processed");
        }
        Err(DeliveryError::WebhookSignatureInvalid) => {
            tracing::warn!(%provider, "Rejected delivery callback with invalid signature");
        }
        Err(e) => {
            tracing::error!(%provider, error = %e, "Failed to process delivery callback");
        }
    }

    acknowledged()
}

fn acknowledged() -> Json<Value> {
    Json(json!({ "success": true }))
}
