//! The sampling loop
//!
//! Pulls one snapshot at a time from the stats stream, derives metrics,
//! appends the row and logs a one-line summary. A failure on one tick
//! never takes the loop down on its own: unusable samples are skipped,
//! row appends are retried a bounded number of times, and a closed
//! stream triggers a bounded reconnect with exponential backoff.

use crate::derive::derive;
use crate::error::{ConnectError, StreamError};
use crate::models::StatsSnapshot;
use crate::source::{StatsSource, StatsStream};
use crate::writer::RecordWriter;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Reconnect policy after the stream drops mid-run
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Backoff before the first reconnect attempt
    pub initial_backoff: Duration,
    /// Upper bound for the doubling backoff
    pub max_backoff: Duration,
    /// Attempts before the monitor gives up and stops
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

/// Configuration for one monitoring run, built once at startup.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Target container id or name
    pub container_id: String,
    /// Dataset file the rows are appended to
    pub output_path: PathBuf,
    /// Attempts for a single row append before escalating to fatal
    pub write_retries: u32,
    /// Delay between row append attempts
    pub write_retry_delay: Duration,
    pub reconnect: ReconnectConfig,
}

impl MonitorConfig {
    pub fn new(container_id: impl Into<String>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            container_id: container_id.into(),
            output_path: output_path.into(),
            write_retries: 3,
            write_retry_delay: Duration::from_millis(200),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Lifecycle of a monitoring session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Disconnected,
    Connected,
    Streaming,
    Stopped,
}

/// Orchestrates sampling for a single container.
///
/// The monitor owns its worker task rather than being one: `start`
/// spawns the loop and hands back the join handle, and shutdown is
/// signalled over a broadcast channel checked before every blocking
/// pull.
pub struct Monitor {
    source: Arc<dyn StatsSource>,
    writer: RecordWriter,
    config: MonitorConfig,
    state: MonitorState,
    stream: Option<Box<dyn StatsStream>>,
}

impl Monitor {
    pub fn new(source: Arc<dyn StatsSource>, config: MonitorConfig) -> Self {
        let writer = RecordWriter::new(&config.output_path);
        Self {
            source,
            writer,
            config,
            state: MonitorState::Disconnected,
            stream: None,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Validate the container and open its stats stream.
    ///
    /// Failure here is fatal for the caller; the container id is part
    /// of the error so the diagnostic names it.
    pub async fn connect(&mut self) -> Result<(), ConnectError> {
        let stream = self.source.open(&self.config.container_id).await?;
        self.stream = Some(stream);
        self.state = MonitorState::Connected;
        info!(
            container_id = %self.config.container_id,
            path = %self.writer.path().display(),
            "Connected; samples will be appended to the dataset file"
        );
        Ok(())
    }

    /// Spawn the sample loop on its own task and return its handle.
    ///
    /// The resolved value is the number of rows appended over the run.
    pub fn start(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<Result<u64>> {
        tokio::spawn(async move {
            let mut monitor = self;
            monitor.run(shutdown).await
        })
    }

    /// Run the loop until shutdown, stream exhaustion or a fatal
    /// persistence failure. Returns the number of rows appended.
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> Result<u64> {
        let mut stream = self
            .stream
            .take()
            .context("monitor started before connect")?;
        self.state = MonitorState::Streaming;
        info!(container_id = %self.config.container_id, "Streaming container stats");

        let mut rows = 0u64;
        loop {
            let next = tokio::select! {
                _ = shutdown.recv() => {
                    info!(container_id = %self.config.container_id, "Shutting down monitor loop");
                    break;
                }
                next = stream.next_sample() => next,
            };

            match next {
                Ok(sample) => {
                    if self.record(&sample).await? {
                        rows += 1;
                    }
                }
                Err(StreamError::Parse(e)) => {
                    warn!(error = %e, "Skipping malformed stats record");
                }
                Err(e) => {
                    warn!(error = %e, "Stats stream interrupted");
                    self.state = MonitorState::Disconnected;
                    match self.reconnect(&mut shutdown).await {
                        Some(reopened) => {
                            stream = reopened;
                            self.state = MonitorState::Streaming;
                        }
                        None => break,
                    }
                }
            }
        }

        self.state = MonitorState::Stopped;
        info!(container_id = %self.config.container_id, rows, "Monitor stopped");
        Ok(rows)
    }

    /// Derive and persist one sample. Returns whether a row was written.
    ///
    /// A derivation failure skips the sample; an append failure is
    /// retried `write_retries` times and then escalated, since silent
    /// metric loss is worse than stopping.
    async fn record(&self, sample: &StatsSnapshot) -> Result<bool> {
        let record = match derive(sample) {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    container_id = %self.config.container_id,
                    error = %e,
                    "Skipping sample with unusable stats"
                );
                return Ok(false);
            }
        };

        let mut attempt = 0u32;
        loop {
            match self.writer.append(&record) {
                Ok(()) => break,
                Err(e) if attempt < self.config.write_retries => {
                    attempt += 1;
                    warn!(
                        error = %e,
                        attempt,
                        max = self.config.write_retries,
                        "Row append failed, retrying"
                    );
                    tokio::time::sleep(self.config.write_retry_delay).await;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("failed to append row to {}", self.writer.path().display())
                    });
                }
            }
        }

        info!(
            container_id = %self.config.container_id,
            "CPU {:.2}%, Memory {:.2}% (usage {:.1} MB / limit {:.1} MB), Network in {:.1} KB, out {:.1} KB",
            record.cpu_percent,
            record.memory_percent,
            record.memory_usage_mb,
            record.memory_limit_mb,
            record.network_in_kb,
            record.network_out_kb,
        );
        Ok(true)
    }

    /// Reopen the stats stream with exponential backoff.
    ///
    /// Returns None when the attempts are exhausted or shutdown fires
    /// while waiting.
    async fn reconnect(
        &self,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Option<Box<dyn StatsStream>> {
        let mut backoff = self.config.reconnect.initial_backoff;

        for attempt in 1..=self.config.reconnect.max_attempts {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Shutdown requested during reconnect");
                    return None;
                }
                _ = tokio::time::sleep(backoff) => {}
            }

            match self.source.open(&self.config.container_id).await {
                Ok(stream) => {
                    info!(attempt, "Reconnected to stats stream");
                    return Some(stream);
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        attempt,
                        max = self.config.reconnect.max_attempts,
                        "Reconnect attempt failed"
                    );
                    backoff = (backoff * 2).min(self.config.reconnect.max_backoff);
                }
            }
        }

        info!(
            container_id = %self.config.container_id,
            "Stream closed and reconnect attempts exhausted"
        );
        None
    }
}
