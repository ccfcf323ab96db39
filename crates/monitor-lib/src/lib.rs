//! Core library for the container stats monitor
//!
//! This crate provides:
//! - Stats acquisition from the Docker Engine HTTP API
//! - Metric derivation (CPU, memory, network)
//! - Append-only dataset persistence
//! - The monitoring loop tying them together

pub mod derive;
pub mod error;
pub mod models;
pub mod monitor;
pub mod source;
pub mod writer;

pub use error::{ConnectError, DeriveError, StreamError};
pub use models::{MetricsRecord, StatsSnapshot};
pub use monitor::{Monitor, MonitorConfig, MonitorState, ReconnectConfig};
pub use source::{DockerStatsSource, SourceConfig, StatsSource, StatsStream, DEFAULT_ENDPOINT};
pub use writer::{RecordWriter, COLUMNS, DELIMITER};
