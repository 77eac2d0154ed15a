use moka::future::Cache;

/// Resolved location of a single IP
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoEntry {
    pub city: Option<String>,
    pub region: Option<String>,
}

impl GeoEntry {
    pub fn new(city: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            city: Some(city.into()),
            region: Some(region.into()),
        }
    }

    /// Both fields present and non-empty; such entries are never fetched again
    pub fn is_resolved(&self) -> bool {
        matches!((&self.city, &self.region), (Some(c), Some(r)) if !c.is_empty() && !r.is_empty())
    }

    /// `"{city}, {region}"`
    pub fn display(&self) -> String {
        format!(
            "{}, {}",
            self.city.as_deref().unwrap_or_default(),
            self.region.as_deref().unwrap_or_default()
        )
    }
}

/// IP -> location cache, keyed by the raw IP string.
///
/// Entries never expire and there is no capacity bound.
#[derive(Clone)]
pub struct GeoCache {
    entries: Cache<String, GeoEntry>,
}

impl GeoCache {
    pub fn new() -> Self {
        Self {
            entries: Cache::builder().name("geo-cache").build(),
        }
    }

    pub async fn get(&self, ip: &str) -> Option<GeoEntry> {
        self.entries.get(ip).await
    }

    pub async fn insert(&self, ip: &str, entry: GeoEntry) {
        self.entries.insert(ip.to_string(), entry).await;
    }

    pub fn contains(&self, ip: &str) -> bool {
        self.entries.contains_key(ip)
    }
}

impl Default for GeoCache {
    fn default() -> Self {
        Self::new()
    }
}
