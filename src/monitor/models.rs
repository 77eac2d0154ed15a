//! Data models for access log monitoring

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Set of request paths considered sensitive enough to alert on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedUris {
    uris: HashSet<String>,
}

impl WatchedUris {
    pub fn new<I, S>(uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            uris: uris.into_iter().map(Into::into).collect(),
        }
    }

    /// The built-in watch list
    pub fn default_uris() -> Vec<String> {
        ["/", "/api/config", "/identity/connect/token", "/api/sync"]
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Exact, case-sensitive membership test
    pub fn contains(&self, uri: &str) -> bool {
        self.uris.contains(uri)
    }

    pub fn len(&self) -> usize {
        self.uris.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }
}

impl Default for WatchedUris {
    fn default() -> Self {
        Self::new(Self::default_uris())
    }
}

/// A log field passed through verbatim.
///
/// Strings render without quotes, every other JSON value renders as written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawField(pub Value);

impl fmt::Display for RawField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

impl From<&str> for RawField {
    fn from(s: &str) -> Self {
        Self(Value::String(s.to_string()))
    }
}

impl From<i64> for RawField {
    fn from(n: i64) -> Self {
        Self(Value::from(n))
    }
}

/// One retained log line: a watched URI requested by a client
#[derive(Debug, Clone, PartialEq)]
pub struct AccessHit {
    pub uri: String,
    pub client_ip: String,
    pub ts: RawField,
    pub status: RawField,
}

/// Per-IP summary of the watched URI hits seen in one batch
#[derive(Debug, Clone, PartialEq)]
pub struct AccessSummary {
    /// Timestamp of the first retained line for this IP
    pub first_access: RawField,

    /// Matched URIs in log order, duplicates retained
    pub uris: Vec<String>,

    /// Status of the most recent retained line
    pub status: RawField,
}

impl AccessSummary {
    fn from_hit(hit: AccessHit) -> Self {
        Self {
            first_access: hit.ts,
            uris: vec![hit.uri],
            status: hit.status,
        }
    }

    fn absorb(&mut self, hit: AccessHit) {
        self.uris.push(hit.uri);
        self.status = hit.status;
    }
}

/// IP -> summary mapping that iterates in first-match order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    entries: Vec<(String, AccessSummary)>,
    index: HashMap<String, usize>,
}

impl Aggregation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a hit into the summary of its IP, creating the summary on first sight
    pub fn record(&mut self, hit: AccessHit) {
        match self.index.get(&hit.client_ip) {
            Some(&pos) => self.entries[pos].1.absorb(hit),
            None => {
                self.index.insert(hit.client_ip.clone(), self.entries.len());
                let ip = hit.client_ip.clone();
                self.entries.push((ip, AccessSummary::from_hit(hit)));
            }
        }
    }

    /// Insert a prepared summary, replacing any summary already held for `ip`
    pub fn insert(&mut self, ip: impl Into<String>, summary: AccessSummary) {
        let ip = ip.into();
        match self.index.get(&ip) {
            Some(&pos) => self.entries[pos].1 = summary,
            None => {
                self.index.insert(ip.clone(), self.entries.len());
                self.entries.push((ip, summary));
            }
        }
    }

    pub fn get(&self, ip: &str) -> Option<&AccessSummary> {
        self.index.get(ip).map(|&pos| &self.entries[pos].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AccessSummary)> {
        self.entries.iter().map(|(ip, s)| (ip.as_str(), s))
    }

    pub fn ips(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(ip, _)| ip.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(uri: &str, ip: &str, ts: &str, status: i64) -> AccessHit {
        AccessHit {
            uri: uri.to_string(),
            client_ip: ip.to_string(),
            ts: ts.into(),
            status: status.into(),
        }
    }

    #[test]
    fn test_raw_field_display() {
        assert_eq!(RawField::from("2024-01-01T00:00:00Z").to_string(), "2024-01-01T00:00:00Z");
        assert_eq!(RawField::from(404_i64).to_string(), "404");
        assert_eq!(RawField(serde_json::json!(1712345678.25)).to_string(), "1712345678.25");
    }

    #[test]
    fn test_record_keeps_first_access_and_last_status() {
        let mut agg = Aggregation::new();
        agg.record(hit("/api/config", "1.2.3.4", "T1", 200));
        agg.record(hit("/api/config", "1.2.3.4", "T2", 401));

        let summary = agg.get("1.2.3.4").unwrap();
        assert_eq!(summary.first_access, RawField::from("T1"));
        assert_eq!(summary.uris, vec!["/api/config", "/api/config"]);
        assert_eq!(summary.status, RawField::from(401_i64));
    }

    #[test]
    fn test_iteration_follows_first_match_order() {
        let mut agg = Aggregation::new();
        agg.record(hit("/", "9.9.9.9", "T1", 200));
        agg.record(hit("/", "1.1.1.1", "T2", 200));
        agg.record(hit("/api/sync", "9.9.9.9", "T3", 200));

        let ips: Vec<&str> = agg.ips().collect();
        assert_eq!(ips, vec!["9.9.9.9", "1.1.1.1"]);
    }

    #[test]
    fn test_ip_keys_are_not_canonicalized() {
        let mut agg = Aggregation::new();
        agg.record(hit("/", "::ffff:1.2.3.4", "T1", 200));
        agg.record(hit("/", "1.2.3.4", "T2", 200));
        assert_eq!(agg.len(), 2);
    }

    #[test]
    fn test_watched_uris_exact_match() {
        let watched = WatchedUris::default();
        assert_eq!(watched.len(), 4);
        assert!(watched.contains("/"));
        assert!(watched.contains("/api/config"));
        assert!(!watched.contains("/api/config/"));
        assert!(!watched.contains("/API/CONFIG"));
    }
}
