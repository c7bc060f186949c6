//! Pinata HTTP client: pin, fetch, pin-status.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::Deserialize;
use serde_json::Value;

use anchora_core::retry::{retry, RetryPolicy};

use crate::error::IpfsError;

/// Configuration for the pinning client.
#[derive(Debug, Clone)]
pub struct PinataConfig {
    /// Pinning API base URL (e.g. `https://api.pinata.cloud`).
    pub api_url: String,
    /// Public gateway base URL used for content reads.
    pub gateway_url: String,
    /// Bearer token (Pinata JWT).
    pub jwt: String,
    /// Token-bucket budget for all calls, per minute.
    pub rate_per_minute: u32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Backoff policy for transient failures.
    pub retry: RetryPolicy,
}

impl PinataConfig {
    /// Configuration with Pinata production endpoints and default limits.
    pub fn new(jwt: impl Into<String>) -> Self {
        Self {
            api_url: "https://api.pinata.cloud".to_string(),
            gateway_url: "https://gateway.pinata.cloud".to_string(),
            jwt: jwt.into(),
            rate_per_minute: 60,
            timeout_secs: 30,
            retry: RetryPolicy::default(),
        }
    }
}

/// Rate-limited pinning client. `Send + Sync`; share via `Arc`.
pub struct PinataClient {
    client: reqwest::Client,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    api_url: String,
    gateway_url: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for PinataClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinataClient")
            .field("api_url", &self.api_url)
            .field("gateway_url", &self.gateway_url)
            .finish()
    }
}

#[derive(Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

#[derive(Deserialize)]
struct PinListResponse {
    count: u64,
}

impl PinataClient {
    /// Build a client from configuration.
    pub fn new(config: PinataConfig) -> Result<Self, IpfsError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", config.jwt))
                .map_err(|_| IpfsError::Config("invalid characters in JWT".to_string()))?,
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| IpfsError::Config(format!("failed to build HTTP client: {e}")))?;

        let rate = NonZeroU32::new(config.rate_per_minute)
            .ok_or_else(|| IpfsError::Config("rate_per_minute must be positive".to_string()))?;
        let limiter = RateLimiter::direct(Quota::per_minute(rate));

        Ok(Self {
            client,
            limiter,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            gateway_url: config.gateway_url.trim_end_matches('/').to_string(),
            retry: config.retry,
        })
    }

    /// Pin a JSON document, returning its CID.
    ///
    /// The upload is tagged with the current timestamp and the serialized
    /// size so pins remain auditable from the Pinata console.
    pub async fn pin_json(&self, content: &Value, name: &str) -> Result<String, IpfsError> {
        self.limiter.until_ready().await;

        let endpoint = format!("{}/pinning/pinJSONToIPFS", self.api_url);
        let size = content.to_string().len();
        let body = serde_json::json!({
            "pinataContent": content,
            "pinataMetadata": {
                "name": name,
                "keyvalues": {
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                    "size": size.to_string(),
                }
            }
        });

        retry(&self.retry, IpfsError::is_retryable, || async {
            let resp = self
                .client
                .post(&endpoint)
                .json(&body)
                .send()
                .await
                .map_err(|e| transport_error(&endpoint, e))?;
            let resp = check_status(&endpoint, resp).await?;
            let parsed: PinResponse = resp.json().await.map_err(|e| IpfsError::Deserialization {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;
            Ok(parsed.ipfs_hash)
        })
        .await
    }

    /// Fetch pinned JSON through the gateway.
    ///
    /// `Ok(None)` means the gateway answered 4xx (unknown or gone CID); 5xx
    /// and transport failures surface as retryable errors.
    pub async fn get_json(&self, cid: &str) -> Result<Option<Value>, IpfsError> {
        self.limiter.until_ready().await;

        let endpoint = format!("{}/ipfs/{}", self.gateway_url, cid);
        retry(&self.retry, IpfsError::is_retryable, || async {
            let resp = self
                .client
                .get(&endpoint)
                .send()
                .await
                .map_err(|e| transport_error(&endpoint, e))?;
            let status = resp.status();
            if status.is_server_error() || status.as_u16() == 429 {
                return Err(IpfsError::Retryable {
                    endpoint: endpoint.clone(),
                    reason: format!("HTTP {status}"),
                });
            }
            if status.is_client_error() {
                return Ok(None);
            }
            let value: Value = resp.json().await.map_err(|e| IpfsError::Deserialization {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;
            Ok(Some(value))
        })
        .await
    }

    /// Whether the service still holds a pin for `cid`.
    pub async fn is_pinned(&self, cid: &str) -> Result<bool, IpfsError> {
        self.limiter.until_ready().await;

        let endpoint = format!(
            "{}/data/pinList?status=pinned&hashContains={}",
            self.api_url, cid
        );
        retry(&self.retry, IpfsError::is_retryable, || async {
            let resp = self
                .client
                .get(&endpoint)
                .send()
                .await
                .map_err(|e| transport_error(&endpoint, e))?;
            let resp = check_status(&endpoint, resp).await?;
            let parsed: PinListResponse =
                resp.json().await.map_err(|e| IpfsError::Deserialization {
                    endpoint: endpoint.clone(),
                    reason: e.to_string(),
                })?;
            Ok(parsed.count > 0)
        })
        .await
    }
}

/// Map a reqwest failure onto the retryable bucket.
fn transport_error(endpoint: &str, e: reqwest::Error) -> IpfsError {
    let reason = if e.is_timeout() {
        "request timed out".to_string()
    } else {
        e.to_string()
    };
    IpfsError::Retryable {
        endpoint: endpoint.to_string(),
        reason,
    }
}

/// Split a response by status: 2xx passes through, 5xx/429 are retryable,
/// other 4xx are permanent.
async fn check_status(
    endpoint: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, IpfsError> {
    let status = resp.status();
    if status.is_server_error() || status.as_u16() == 429 {
        return Err(IpfsError::Retryable {
            endpoint: endpoint.to_string(),
            reason: format!("HTTP {status}"),
        });
    }
    if status.is_client_error() {
        let body = resp.text().await.unwrap_or_default();
        return Err(IpfsError::Permanent {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body: truncate(&body, 256),
        });
    }
    Ok(resp)
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = PinataConfig::new("jwt-token");
        assert_eq!(config.api_url, "https://api.pinata.cloud");
        assert_eq!(config.rate_per_minute, 60);
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn zero_rate_is_rejected() {
        let mut config = PinataConfig::new("jwt-token");
        config.rate_per_minute = 0;
        assert!(PinataClient::new(config).is_err());
    }

    #[test]
    fn trailing_slashes_are_trimmed() {
        let mut config = PinataConfig::new("jwt-token");
        config.api_url = "https://api.pinata.cloud/".into();
        config.gateway_url = "https://gateway.pinata.cloud///".into();
        let client = PinataClient::new(config).unwrap();
        assert_eq!(client.api_url, "https://api.pinata.cloud");
        assert_eq!(client.gateway_url, "https://gateway.pinata.cloud");
    }
}
