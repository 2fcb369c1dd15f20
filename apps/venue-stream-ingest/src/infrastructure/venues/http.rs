//! Shared HTTP plumbing for market discovery and REST polling.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::USER_AGENT;
use serde::de::DeserializeOwned;

use crate::application::ports::FetchError;

/// User agent presented to the futures venues' REST and WebSocket endpoints.
pub const SCANNER_USER_AGENT: &str = "crypto-futures-arbitrage-scanner/1.0";

/// Desktop browser user agent, required by venues that reject unknown clients.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Build the HTTP client shared by one supervisor.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(timeout).build()
}

/// Join a base URL and a path without doubling the separator.
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}{path}", base.trim_end_matches('/'))
}

/// GET a URL and return the raw body.
///
/// Any non-2xx status is reported as [`FetchError::Status`].
pub async fn get_bytes(
    client: &Client,
    url: &str,
    user_agent: Option<&str>,
) -> Result<Vec<u8>, FetchError> {
    let mut request = client.get(url);
    if let Some(agent) = user_agent {
        request = request.header(USER_AGENT, agent);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }

    Ok(response.bytes().await?.to_vec())
}

/// GET a URL and decode the JSON body.
pub async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    user_agent: Option<&str>,
) -> Result<T, FetchError> {
    let body = get_bytes(client, url, user_agent).await?;
    Ok(serde_json::from_slice(&body)?)
}
