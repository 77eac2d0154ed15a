//! Access log monitoring
//!
//! This module owns everything that touches the monitored file: the
//! incremental tailer with rotation detection and the aggregator that
//! groups watched URI hits per client IP.

pub mod aggregator;
pub mod models;
pub mod tailer;

pub use aggregator::{LineError, LogAggregator};
pub use models::{AccessHit, AccessSummary, Aggregation, RawField, WatchedUris};
pub use tailer::{FileTailer, TailError};
