//! HTTP geolocation lookup
//!
//! Speaks the ipinfo.io JSON API (`GET {base}/{ip}/json`). Only `city` and
//! `region` are read from the response.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

/// Fields of a lookup response; either may be absent
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GeoResponse {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

/// How a lookup failed
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("request timed out")]
    Timeout,
    #[error("invalid response body: {0}")]
    Parse(String),
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for LookupError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LookupError::Timeout
        } else if e.is_decode() {
            LookupError::Parse(e.to_string())
        } else if e.is_connect() || e.is_request() || e.is_status() || e.is_body() {
            LookupError::Transport(e.to_string())
        } else {
            LookupError::Other(e.to_string())
        }
    }
}

/// Resolve an IP to an optional `{city, region}` pair
#[async_trait]
pub trait GeoLookup: Send + Sync {
    async fn lookup(&self, ip: &str) -> Result<GeoResponse, LookupError>;
}

/// ipinfo.io compatible lookup client
#[derive(Clone)]
pub struct IpInfoClient {
    client: Client,
    base_url: String,
}

impl IpInfoClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("uriwatch/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client for geolocation lookups")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, ip: &str) -> String {
        format!("{}/{}/json", self.base_url, ip)
    }
}

#[async_trait]
impl GeoLookup for IpInfoClient {
    async fn lookup(&self, ip: &str) -> Result<GeoResponse, LookupError> {
        let response = self
            .client
            .get(self.url_for(ip))
            .send()
            .await?
            .error_for_status()?;

        let body = response.bytes().await?;
        serde_json::from_slice::<GeoResponse>(&body).map_err(|e| LookupError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_trims_trailing_slash() {
        let client = IpInfoClient::new("https://ipinfo.io/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.url_for("8.8.8.8"), "https://ipinfo.io/8.8.8.8/json");
    }

    #[test]
    fn test_response_fields_are_optional() {
        let parsed: GeoResponse =
            serde_json::from_str(r#"{"ip": "8.8.8.8", "city": "Mountain View", "bogon": false}"#)
                .unwrap();
        assert_eq!(parsed.city.as_deref(), Some("Mountain View"));
        assert_eq!(parsed.region, None);
    }

    #[test]
    fn test_non_object_response_is_rejected() {
        assert!(serde_json::from_str::<GeoResponse>(r#""rate limited""#).is_err());
        assert!(serde_json::from_str::<GeoResponse>("<html>").is_err());
    }
}
