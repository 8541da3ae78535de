use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chowline_shipment::{Shipment, ShipmentTrackingView};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/delivery/shipments", post(create_shipment))
        .route("/v1/delivery/shipments/{tracking}", get(track_shipment))
        .route("/v1/delivery/shipments/{tracking}/cancel", post(cancel_shipment))
}

#[derive(Debug, Deserialize)]
pub struct CreateShipmentRequest {
    pub quote_id: Uuid,
    pub order_id: Uuid,
}

/// POST /v1/delivery/shipments
async fn create_shipment(
    State(state): State<AppState>,
    Json(req): Json<CreateShipmentRequest>,
) -> Result<(StatusCode, Json<Shipment>), AppError> {
    let shipment = state.delivery.create_shipment(req.quote_id, req.order_id).await?;
    Ok((StatusCode::CREATED, Json(shipment)))
}

/// GET /v1/delivery/shipments/{tracking}
async fn track_shipment(
    State(state): State<AppState>,
    Path(tracking): Path<String>,
) -> Result<Json<ShipmentTrackingView>, AppError> {
    Ok(Json(state.delivery.track_shipment(&tracking).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelShipmentRequest {
    pub reason: Option<String>,
}

/// POST /v1/delivery/shipments/{tracking}/cancel
///
/// The body is optional.
async fn cancel_shipment(
    State(state): State<AppState>,
    Path(tracking): Path<String>,
    body: Bytes,
) -> Result<Json<Shipment>, AppError> {
    let req = if body.is_empty() {
        CancelShipmentRequest::default()
    } else {
        serde_json::from_slice::<CancelShipmentRequest>(&body)
            .map_err(|e| AppError::ValidationError(format!("invalid body: {e}")))?
    };
    Ok(Json(state.delivery.cancel_shipment(&tracking, req.reason).await?))
}
