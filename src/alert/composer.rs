//! Alert message composition
//!
//! One line per IP, in aggregation order. The composed set is bounded by
//! the notification channel's message size limit.

use tracing::warn;

use crate::geo::GeoResolver;
use crate::monitor::{AccessSummary, Aggregation};

/// Telegram rejects messages longer than this many characters
pub const MAX_MESSAGE_CHARS: usize = 4096;

pub const TRUNCATION_NOTICE: &str =
    "Other IPs were detected but message was too long. Only last access is being displayed";

const UNKNOWN_URIS: &str = "Unknown uris were accessed";

pub struct MessageComposer {
    max_chars: usize,
}

impl MessageComposer {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    /// Resolve every IP and build its alert line.
    ///
    /// When the combined length exceeds the limit, only the last line is
    /// kept, followed by a truncation notice. An empty aggregation yields no
    /// lines at all.
    pub async fn compose(&self, aggregation: &Aggregation, resolver: &GeoResolver) -> Vec<String> {
        let mut lines = Vec::with_capacity(aggregation.len());
        for (ip, summary) in aggregation.iter() {
            let location = resolver.describe(ip).await;
            lines.push(format_line(ip, &location, summary));
        }
        self.bound(lines)
    }

    fn bound(&self, mut lines: Vec<String>) -> Vec<String> {
        let total: usize = lines.iter().map(|l| l.chars().count()).sum();
        if total <= self.max_chars {
            return lines;
        }

        warn!(
            "Alert for {} IPs is {} characters (limit {}), keeping only the last IP",
            lines.len(),
            total,
            self.max_chars
        );
        let mut bounded = lines.split_off(lines.len() - 1);
        bounded.push(TRUNCATION_NOTICE.to_string());
        bounded
    }

    /// Join composed lines into the single payload handed to the notifier
    pub fn join(lines: &[String]) -> String {
        lines.join(" ")
    }
}

impl Default for MessageComposer {
    fn default() -> Self {
        Self::new(MAX_MESSAGE_CHARS)
    }
}

fn format_line(ip: &str, location: &str, summary: &AccessSummary) -> String {
    let mut line = format!(
        "Ip {} ({}) accessed at {} and returned status {}.\n",
        ip, location, summary.first_access, summary.status
    );
    if summary.uris.is_empty() {
        line.push_str(UNKNOWN_URIS);
    } else {
        line.push_str(&format!("Accessed uris: {}.", quoted_list(&summary.uris)));
    }
    line
}

/// `['/a', '/b']`
fn quoted_list(uris: &[String]) -> String {
    let items: Vec<String> = uris.iter().map(|u| format!("'{u}'")).collect();
    format!("[{}]", items.join(", "))
}
