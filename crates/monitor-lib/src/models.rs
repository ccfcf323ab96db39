//! Core data models for the stats monitor

use serde::Deserialize;
use std::collections::HashMap;

/// One snapshot from the engine's per-container stats stream.
///
/// The engine reports the previous CPU counters alongside the current
/// ones on every tick, so no sample history is kept on our side; a
/// snapshot is dropped as soon as its row has been derived.
#[derive(Debug, Clone, Deserialize)]
pub struct StatsSnapshot {
    /// Container name as reported by the engine (usually `/`-prefixed)
    pub name: String,
    /// Instant this snapshot was taken, RFC 3339
    pub read: String,
    /// Instant of the preceding snapshot, RFC 3339
    pub preread: String,
    pub cpu_stats: CpuStats,
    /// Counters from the preceding tick; zeroed on the first tick
    #[serde(default)]
    pub precpu_stats: CpuStats,
    pub memory_stats: MemoryStats,
    /// Per-interface byte counters; absent for host-network containers
    #[serde(default)]
    pub networks: HashMap<String, NetworkStats>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CpuStats {
    pub cpu_usage: CpuUsage,
    /// Cumulative host CPU time; the engine omits it on the first tick's
    /// previous-counters block
    pub system_cpu_usage: Option<u64>,
    pub online_cpus: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CpuUsage {
    /// Cumulative container CPU time in nanoseconds
    pub total_usage: u64,
    /// Per-CPU breakdown; older engines report this instead of `online_cpus`
    pub percpu_usage: Option<Vec<u64>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryStats {
    pub usage: Option<u64>,
    /// 0 means the container runs without a memory limit
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkStats {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// One derived output row.
///
/// Values are numeric throughout; formatting to the dataset's string
/// representation happens only in the writer. Field order here defines
/// the column order of the dataset file.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsRecord {
    pub name: String,
    pub read: String,
    pub preread: String,
    pub cpu_percent: f64,
    pub memory_usage_mb: f64,
    pub memory_limit_mb: f64,
    pub memory_percent: f64,
    pub network_in_kb: f64,
    pub network_out_kb: f64,
}
