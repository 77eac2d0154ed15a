use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error};

use crate::geo::cache::{GeoCache, GeoEntry};
use crate::geo::client::{GeoLookup, LookupError};

const MISSING_CITY: &str = "Error retrieving city";
const MISSING_REGION: &str = "Error retrieving region";

/// A failed resolution, rendered as the text embedded in alerts
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Connection timed out for ip {ip}")]
    Timeout { ip: String },
    #[error("Invalid parse format for ip {ip}")]
    Parse { ip: String },
    #[error("Client error: {detail}")]
    Transport { ip: String, detail: String },
    #[error("Unknown exception: \"{detail}\" for {ip}")]
    Unknown { ip: String, detail: String },
}

impl ResolveError {
    fn from_lookup(ip: &str, err: LookupError) -> Self {
        let ip = ip.to_string();
        match err {
            LookupError::Timeout => ResolveError::Timeout { ip },
            LookupError::Parse(_) => ResolveError::Parse { ip },
            LookupError::Transport(detail) => ResolveError::Transport { ip, detail },
            LookupError::Other(detail) => ResolveError::Unknown { ip, detail },
        }
    }
}

/// Cached IP geolocation
pub struct GeoResolver {
    lookup: Arc<dyn GeoLookup>,
    cache: GeoCache,
}

impl GeoResolver {
    pub fn new(lookup: Arc<dyn GeoLookup>) -> Self {
        Self::with_cache(lookup, GeoCache::new())
    }

    pub fn with_cache(lookup: Arc<dyn GeoLookup>, cache: GeoCache) -> Self {
        Self { lookup, cache }
    }

    pub fn cache(&self) -> &GeoCache {
        &self.cache
    }

    /// Resolve `ip`, hitting the lookup service only when the cache has no
    /// fully populated entry.
    ///
    /// A successful lookup is cached even when a field had to be filled with
    /// a placeholder, so such an IP is never looked up again.
    pub async fn resolve(&self, ip: &str) -> Result<GeoEntry, ResolveError> {
        if let Some(entry) = self.cache.get(ip).await {
            if entry.is_resolved() {
                debug!("Geolocation cache hit for {}", ip);
                return Ok(entry);
            }
        }

        let response = self
            .lookup
            .lookup(ip)
            .await
            .map_err(|e| ResolveError::from_lookup(ip, e))?;

        let entry = GeoEntry {
            city: Some(response.city.unwrap_or_else(|| MISSING_CITY.to_string())),
            region: Some(response.region.unwrap_or_else(|| MISSING_REGION.to_string())),
        };
        self.cache.insert(ip, entry.clone()).await;

        Ok(entry)
    }

    /// Resolve `ip` to the text shown in an alert. Never fails: errors are
    /// logged and their description is returned instead.
    pub async fn describe(&self, ip: &str) -> String {
        match self.resolve(ip).await {
            Ok(entry) => entry.display(),
            Err(e) => {
                let message = e.to_string();
                error!("{}", message);
                message
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::client::GeoResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted lookup that records how often it was called
    struct ScriptedLookup {
        responses: Mutex<Vec<Result<GeoResponse, LookupError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedLookup {
        fn new(responses: Vec<Result<GeoResponse, LookupError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GeoLookup for ScriptedLookup {
        async fn lookup(&self, _ip: &str) -> Result<GeoResponse, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Err(LookupError::Other("script exhausted".to_string()))
            } else {
                responses.remove(0)
            }
        }
    }

    fn found(city: Option<&str>, region: Option<&str>) -> Result<GeoResponse, LookupError> {
        Ok(GeoResponse {
            city: city.map(str::to_string),
            region: region.map(str::to_string),
        })
    }

    #[tokio::test]
    async fn test_second_resolve_is_served_from_cache() {
        let lookup = ScriptedLookup::new(vec![found(Some("Berlin"), Some("Land Berlin"))]);
        let resolver = GeoResolver::new(lookup.clone());

        let first = resolver.describe("1.2.3.4").await;
        let second = resolver.describe("1.2.3.4").await;

        assert_eq!(first, "Berlin, Land Berlin");
        assert_eq!(first, second);
        assert_eq!(lookup.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_region_is_cached_as_placeholder() {
        let lookup = ScriptedLookup::new(vec![found(Some("Paris"), None)]);
        let resolver = GeoResolver::new(lookup.clone());

        assert_eq!(resolver.describe("5.6.7.8").await, "Paris, Error retrieving region");
        assert_eq!(
            resolver.cache().get("5.6.7.8").await,
            Some(GeoEntry::new("Paris", "Error retrieving region"))
        );
        assert_eq!(resolver.describe("5.6.7.8").await, "Paris, Error retrieving region");
        assert_eq!(lookup.calls(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_described_and_not_cached() {
        let lookup = ScriptedLookup::new(vec![
            Err(LookupError::Timeout),
            Err(LookupError::Parse("expected value".to_string())),
            Err(LookupError::Transport("HTTP status server error (502 Bad Gateway)".to_string())),
            Err(LookupError::Other("boom".to_string())),
        ]);
        let resolver = GeoResolver::new(lookup.clone());

        assert_eq!(resolver.describe("9.9.9.9").await, "Connection timed out for ip 9.9.9.9");
        assert_eq!(resolver.describe("9.9.9.9").await, "Invalid parse format for ip 9.9.9.9");
        assert_eq!(
            resolver.describe("9.9.9.9").await,
            "Client error: HTTP status server error (502 Bad Gateway)"
        );
        assert_eq!(
            resolver.describe("9.9.9.9").await,
            "Unknown exception: \"boom\" for 9.9.9.9"
        );
        assert_eq!(lookup.calls(), 4);
        assert!(!resolver.cache().contains("9.9.9.9"));
    }

    #[tokio::test]
    async fn test_empty_field_is_refetched() {
        let lookup = ScriptedLookup::new(vec![
            found(Some(""), Some("Bavaria")),
            found(Some("Munich"), Some("Bavaria")),
        ]);
        let resolver = GeoResolver::new(lookup.clone());

        assert_eq!(resolver.describe("2.2.2.2").await, ", Bavaria");
        assert_eq!(resolver.describe("2.2.2.2").await, "Munich, Bavaria");
        assert_eq!(resolver.describe("2.2.2.2").await, "Munich, Bavaria");
        assert_eq!(lookup.calls(), 2);
    }

    #[tokio::test]
    async fn test_resolve_returns_typed_error() {
        let lookup = ScriptedLookup::new(vec![Err(LookupError::Timeout)]);
        let resolver = GeoResolver::new(lookup);

        assert!(matches!(
            resolver.resolve("3.3.3.3").await,
            Err(ResolveError::Timeout { ref ip }) if ip == "3.3.3.3"
        ));
    }
}
