//! HTTP client utilities shared by the provider adapters.
//!
//! Maps transport failures and non-success responses onto the error taxonomy:
//! 401/403 are authentication failures, other 4xx are rejections, 429 and 5xx
//! are transient.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, ClientBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::core::provider::Provider;
use crate::error::{GateError, Result};

/// Default timeout for submit and status calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for content downloads.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(300);

/// TCP connect timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest provider error body quoted in an error message.
const MAX_ERROR_BODY: usize = 500;

/// Build a configured HTTP client.
///
/// Per-request timeouts are set by callers; the client only bounds connects.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn build_client() -> Result<Client> {
    ClientBuilder::new()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(format!("vidgate/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| GateError::Config(format!("failed to build HTTP client: {e}")))
}

/// Classify a `reqwest` send/read failure.
#[must_use]
pub fn transport_error(provider: Provider, err: &reqwest::Error, timeout: Duration) -> GateError {
    if err.is_timeout() {
        GateError::RequestTimeout {
            provider: provider.cli_name().to_string(),
            seconds: timeout.as_secs(),
        }
    } else {
        GateError::Network {
            provider: provider.cli_name().to_string(),
            message: err.to_string(),
        }
    }
}

/// Pass successful responses through; turn the rest into a [`GateError`].
pub async fn check_status(provider: Provider, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = parse_retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    Err(error_for_status(provider, status, &body, retry_after))
}

/// Map a non-success status and body to an error.
#[must_use]
pub fn error_for_status(
    provider: Provider,
    status: StatusCode,
    body: &str,
    retry_after: Option<Duration>,
) -> GateError {
    let provider_name = provider.cli_name().to_string();
    let message = extract_error_message(body)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("no body").to_string());
    let code = status.as_u16();

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GateError::AuthInvalid {
            provider: provider_name,
            reason: format!("HTTP {code}: {message}"),
        },
        StatusCode::TOO_MANY_REQUESTS => GateError::RateLimited {
            provider: provider_name,
            retry_after,
            message,
        },
        s if s.is_server_error() => GateError::ProviderUnavailable {
            provider: provider_name,
            status_code: Some(code),
            message,
        },
        _ => GateError::ProviderRejected {
            provider: provider_name,
            status_code: Some(code),
            message,
        },
    }
}

/// Decode a JSON body, reporting malformed payloads as `ParseResponse`.
pub async fn read_json<T: DeserializeOwned>(
    provider: Provider,
    response: Response,
    timeout: Duration,
) -> Result<T> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| transport_error(provider, &e, timeout))?;
    serde_json::from_slice(&bytes).map_err(|e| GateError::ParseResponse {
        provider: provider.cli_name().to_string(),
        message: e.to_string(),
    })
}

/// Pull the human-readable message out of a provider error body.
///
/// Understands `{"error": {"message": ..}}`, `{"error": ".."}`,
/// `{"message": ..}` and `{"detail": ..}`; falls back to the raw text.
#[must_use]
pub fn extract_error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let candidates = [
            value.pointer("/error/message"),
            value.get("error"),
            value.get("message"),
            value.get("detail"),
        ];
        for candidate in candidates.into_iter().flatten() {
            if let Some(text) = candidate.as_str() {
                return Some(text.to_string());
            }
        }
    }
    Some(truncate(trimmed, MAX_ERROR_BODY))
}

/// Parse a `Retry-After` header given in seconds.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
