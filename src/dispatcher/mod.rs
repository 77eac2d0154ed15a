//! Event loop driving the monitoring pipeline
//!
//! Change tokens posted by the [`FileWatcher`] are queued on an unbounded
//! channel. The dispatcher waits for at least one token, drains whatever else
//! is pending, then runs exactly one pass:
//! tail -> aggregate -> resolve -> compose -> send.
//!
//! Passes never overlap and are never cancelled half-way; shutdown is only
//! observed while idle.

pub mod watcher;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::alert::{MessageComposer, Notifier, TelegramNotifier};
use crate::config::Config;
use crate::geo::{GeoResolver, IpInfoClient};
use crate::monitor::{FileTailer, LogAggregator, TailError};

pub use watcher::{ChangeEvent, FileWatcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// Waiting for a change token
    Idle,
    /// A pass is in progress
    Draining,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("monitored file unavailable after {failures} consecutive failed passes")]
    FileUnavailable {
        failures: u32,
        #[source]
        last: TailError,
    },
    #[error("change queue closed, the watcher is gone")]
    QueueClosed,
}

/// Outcome of one pipeline pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub lines_read: usize,
    pub ips_alerted: usize,
    pub sent: bool,
}

pub struct Dispatcher {
    tailer: FileTailer,
    aggregator: LogAggregator,
    resolver: GeoResolver,
    composer: MessageComposer,
    notifier: Arc<dyn Notifier>,
    state: DispatcherState,
    max_tail_failures: u32,
    tail_failures: u32,
}

impl Dispatcher {
    pub fn new(
        tailer: FileTailer,
        aggregator: LogAggregator,
        resolver: GeoResolver,
        composer: MessageComposer,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            tailer,
            aggregator,
            resolver,
            composer,
            notifier,
            state: DispatcherState::Idle,
            max_tail_failures: 3,
            tail_failures: 0,
        }
    }

    /// Build the production pipeline: ipinfo lookups and Telegram delivery
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let tailer = if config.monitor.start_at_end {
            FileTailer::at_end(&config.monitor.log_path).await?
        } else {
            FileTailer::new(&config.monitor.log_path)
        };
        let lookup = IpInfoClient::new(&config.geo.base_url, config.geo.timeout())?;
        let notifier = TelegramNotifier::from_config(&config.telegram)?;

        Ok(Self::new(
            tailer,
            LogAggregator::new(config.monitor.watched_uris()),
            GeoResolver::new(Arc::new(lookup)),
            MessageComposer::default(),
            Arc::new(notifier),
        )
        .with_max_tail_failures(config.monitor.max_tail_failures))
    }

    /// Consecutive failed passes tolerated before [`run`](Self::run) gives up
    pub fn with_max_tail_failures(mut self, max: u32) -> Self {
        self.max_tail_failures = max.max(1);
        self
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    pub fn tailer(&self) -> &FileTailer {
        &self.tailer
    }

    pub fn resolver(&self) -> &GeoResolver {
        &self.resolver
    }

    /// Process change tokens until shutdown is signalled or the loop fails.
    ///
    /// The receiver is borrowed so the caller can stop the watcher before
    /// the queue is dropped.
    pub async fn run(
        &mut self,
        events: &mut mpsc::UnboundedReceiver<ChangeEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), DispatchError> {
        info!("Main started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                token = events.recv() => {
                    if token.is_none() {
                        return Err(DispatchError::QueueClosed);
                    }
                }
            }

            let mut coalesced = 1usize;
            while events.try_recv().is_ok() {
                coalesced += 1;
            }
            info!("New access found ({} change events)", coalesced);

            match self.run_pass().await {
                Ok(report) => {
                    self.tail_failures = 0;
                    debug!(
                        "Pass finished: {} lines, {} IPs, sent: {}",
                        report.lines_read, report.ips_alerted, report.sent
                    );
                }
                Err(e) => {
                    self.tail_failures += 1;
                    error!(
                        "Pass abandoned ({}/{} consecutive failures): {}",
                        self.tail_failures, self.max_tail_failures, e
                    );
                    if self.tail_failures >= self.max_tail_failures {
                        return Err(DispatchError::FileUnavailable {
                            failures: self.tail_failures,
                            last: e,
                        });
                    }
                }
            }
        }

        info!("Shutdown requested, dispatcher stopping");
        Ok(())
    }

    /// Run one full pass over whatever was appended since the previous one
    pub async fn run_pass(&mut self) -> Result<PassReport, TailError> {
        self.state = DispatcherState::Draining;
        let result = self.pass().await;
        self.state = DispatcherState::Idle;
        result
    }

    async fn pass(&mut self) -> Result<PassReport, TailError> {
        let lines = self.tailer.poll().await?;
        let mut report = PassReport {
            lines_read: lines.len(),
            ..PassReport::default()
        };

        let aggregation = self.aggregator.aggregate(&lines);
        if aggregation.is_empty() {
            return Ok(report);
        }
        report.ips_alerted = aggregation.len();

        let messages = self.composer.compose(&aggregation, &self.resolver).await;
        if messages.is_empty() {
            return Ok(report);
        }

        let text = MessageComposer::join(&messages);
        match self.notifier.send(&text).await {
            Ok(()) => report.sent = true,
            Err(e) => error!("Failed to send alert: {:#}", e),
        }

        Ok(report)
    }
}
