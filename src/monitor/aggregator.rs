//! Per-IP aggregation of watched URI hits
//!
//! A batch of raw lines is parsed one line at a time. Bad lines are
//! reported and skipped; they never abort the batch.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::monitor::models::{AccessHit, Aggregation, RawField, WatchedUris};

/// Why a single log line could not be used
#[derive(Debug, Error)]
pub enum LineError {
    #[error("malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("field '{0}' is not a usable value")]
    InvalidField(&'static str),
}

#[derive(Debug, Deserialize)]
struct LogRecord {
    request: RequestInfo,
    #[serde(default)]
    ts: Option<RawField>,
    #[serde(default)]
    status: Option<RawField>,
}

#[derive(Debug, Deserialize)]
struct RequestInfo {
    uri: Value,
    #[serde(default)]
    client_ip: Option<Value>,
}

/// Groups watched URI hits by client IP
#[derive(Debug, Clone, Default)]
pub struct LogAggregator {
    watched: WatchedUris,
}

impl LogAggregator {
    pub fn new(watched: WatchedUris) -> Self {
        Self { watched }
    }

    pub fn watched(&self) -> &WatchedUris {
        &self.watched
    }

    /// Parse one line.
    ///
    /// Returns `Ok(None)` for well-formed lines whose URI is not watched.
    /// The URI is checked before the other fields are inspected, so an
    /// unwatched line never produces an error for a missing or odd field.
    /// A URI that is not a string never matches.
    pub fn parse_line(&self, line: &str) -> Result<Option<AccessHit>, LineError> {
        let record: LogRecord = serde_json::from_str(line)?;

        let uri = match record.request.uri {
            Value::String(uri) if self.watched.contains(&uri) => uri,
            _ => return Ok(None),
        };

        let client_ip = match record.request.client_ip {
            None | Some(Value::Null) => return Err(LineError::MissingField("request.client_ip")),
            Some(Value::String(ip)) => ip,
            Some(Value::Array(_)) | Some(Value::Object(_)) => {
                return Err(LineError::InvalidField("request.client_ip"))
            }
            Some(other) => other.to_string(),
        };
        let ts = record.ts.ok_or(LineError::MissingField("ts"))?;
        let status = record.status.ok_or(LineError::MissingField("status"))?;

        Ok(Some(AccessHit {
            uri,
            client_ip,
            ts,
            status,
        }))
    }

    /// Aggregate a batch of lines in file order
    pub fn aggregate<I, S>(&self, lines: I) -> Aggregation
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut aggregation = Aggregation::new();
        let mut skipped = 0usize;

        for line in lines {
            match self.parse_line(line.as_ref()) {
                Ok(Some(hit)) => aggregation.record(hit),
                Ok(None) => {}
                Err(e) => {
                    skipped += 1;
                    warn!("Skipping unusable line in monitored log file: {}", e);
                }
            }
        }

        debug!(
            "Aggregated {} IPs ({} lines skipped)",
            aggregation.len(),
            skipped
        );
        aggregation
    }
}
