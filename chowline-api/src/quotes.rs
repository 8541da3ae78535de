use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chowline_core::ProviderCapabilities;
use chowline_quote::Quote;
use chowline_shipment::QuoteRequestInput;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/delivery/providers", get(provider_for_country))
        .route("/v1/delivery/quotes", post(request_quote))
        .route("/v1/delivery/quotes/{id}", get(get_quote))
        .route("/v1/delivery/quotes/{id}/accept", post(accept_quote))
        .route("/v1/delivery/quotes/{id}/cancel", post(cancel_quote))
}

#[derive(Debug, Deserialize)]
pub struct ProviderQuery {
    pub country: String,
}

/// GET /v1/delivery/providers?country=NG
async fn provider_for_country(
    State(state): State<AppState>,
    Query(query): Query<ProviderQuery>,
) -> Result<Json<&'static ProviderCapabilities>, AppError> {
    if query.country.trim().is_empty() {
        return Err(AppError::ValidationError("country is required".to_string()));
    }
    Ok(Json(state.delivery.capabilities(&query.country)))
}

/// POST /v1/delivery/quotes
async fn request_quote(
    State(state): State<AppState>,
    Json(input): Json<QuoteRequestInput>,
) -> Result<(StatusCode, Json<Quote>), AppError> {
    let quote = state.delivery.request_quote(input).await?;
    Ok((StatusCode::CREATED, Json(quote)))
}

/// GET /v1/delivery/quotes/{id}
async fn get_quote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Quote>, AppError> {
    Ok(Json(state.delivery.get_quote(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct AcceptQuoteRequest {
    pub selected_by: String,
    pub reason: Option<String>,
}

/// POST /v1/delivery/quotes/{id}/accept
async fn accept_quote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AcceptQuoteRequest>,
) -> Result<Json<Quote>, AppError> {
    if req.selected_by.trim().is_empty() {
        return Err(AppError::ValidationError("selected_by is required".to_string()));
    }
    Ok(Json(state.delivery.accept_quote(id, &req.selected_by, req.reason).await?))
}

/// POST /v1/delivery/quotes/{id}/cancel
async fn cancel_quote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Quote>, AppError> {
    Ok(Json(state.delivery.cancel_quote(id).await?))
}
