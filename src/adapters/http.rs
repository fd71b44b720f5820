//! Shared HTTP plumbing for network adapters.
//!
//! Maps transport and status failures onto [`SourceError`]: connection
//! problems, timeouts, 408/429 and 5xx are transient; anything else that
//! is not a success is treated as a malformed (non-retryable) response.

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use super::SourceError;

const USER_AGENT: &str = concat!("squadgraph/", env!("CARGO_PKG_VERSION"));

/// Build a client with the crate's User-Agent and a request timeout
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, SourceError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| SourceError::Unavailable(format!("failed to build HTTP client: {}", e)))
}

/// Classify a non-success status code
pub fn status_error(status: StatusCode, url: &str) -> SourceError {
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        SourceError::Unavailable(format!("{} returned {}", url, status))
    } else {
        SourceError::Malformed(format!("{} returned {}", url, status))
    }
}

/// GET a URL and return the body as text
pub async fn get_text(client: &reqwest::Client, url: &str) -> Result<String, SourceError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| SourceError::Unavailable(format!("GET {} failed: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(status_error(status, url));
    }

    response
        .text()
        .await
        .map_err(|e| SourceError::Unavailable(format!("reading body of {} failed: {}", url, e)))
}

/// GET a URL and decode the body as JSON
pub async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> Result<T, SourceError> {
    let body = get_text(client, url).await?;
    serde_json::from_str(&body)
        .map_err(|e| SourceError::Malformed(format!("{} is not valid JSON: {}", url, e)))
}
