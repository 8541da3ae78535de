use chowline_core::{DeliveryError, DeliveryResult};
use reqwest::StatusCode;
use std::time::Duration;

/// Shared client for provider calls, bounded by the configured timeout.
pub fn build_client(timeout: Duration) -> DeliveryResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(5)))
        .user_agent(concat!("chowline/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| DeliveryError::ProviderUnavailable(format!("http client: {e}")))
}

pub(crate) fn transport_error(err: reqwest::Error) -> DeliveryError {
    DeliveryError::ProviderUnavailable(err.to_string())
}

/// Read the body and sort failures into the delivery taxonomy. `on_rejected`
/// decides what a plain 4xx means for the call at hand.
pub(crate) async fn read_json(
    response: reqwest::Response,
    on_rejected: impl FnOnce(String) -> DeliveryError,
) -> DeliveryResult<serde_json::Value> {
    let status = response.status();
    let text = response.text().await.map_err(transport_error)?;

    if status.is_success() {
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        return Ok(serde_json::from_str(&text)?);
    }

    let message = error_message(&text).unwrap_or_else(|| format!("HTTP {status}"));
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            DeliveryError::ProviderAuthFailure(message)
        }
        StatusCode::TOO_MANY_REQUESTS => DeliveryError::ProviderUnavailable(message),
        s if s.is_server_error() => DeliveryError::ProviderUnavailable(message),
        _ => on_rejected(message),
    })
}

fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "error", "detail"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_prefers_message_field() {
        assert_eq!(
            error_message(r#"{"status":"failed","message":"Invalid address"}"#).as_deref(),
            Some("Invalid address")
        );
        assert_eq!(error_message(r#"{"error":"boom"}"#).as_deref(), Some("boom"));
        assert_eq!(error_message("<html>"), None);
    }
}
