//! Raw stats acquisition from the container runtime
//!
//! This module provides the seam between the monitoring loop and the
//! runtime: a source validates a container and opens its stats stream,
//! a stream yields one snapshot per runtime tick. The production
//! implementation talks to the Docker Engine HTTP API.

mod docker;

pub use docker::{DockerStatsSource, SourceConfig, DEFAULT_ENDPOINT};

use crate::error::{ConnectError, StreamError};
use crate::models::StatsSnapshot;

pub use async_trait::async_trait;

/// A runtime capable of streaming per-container stats.
#[async_trait]
pub trait StatsSource: Send + Sync {
    /// Validate the container and open its stats stream.
    async fn open(&self, container_id: &str) -> Result<Box<dyn StatsStream>, ConnectError>;
}

/// A lazy, unbounded, ordered sequence of stats snapshots.
///
/// `next_sample` blocks until the runtime emits the next tick and must
/// be assumed to block indefinitely; the tick interval is determined by
/// the runtime (typically ~1s) and is not a contract of this trait.
#[async_trait]
pub trait StatsStream: Send + Sync {
    async fn next_sample(&mut self) -> Result<StatsSnapshot, StreamError>;
}
