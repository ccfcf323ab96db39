//! Metric derivation from raw stats snapshots
//!
//! Pure computations over a single snapshot:
//! - CPU utilization from the current/previous counter deltas
//! - Memory usage, limit and utilization in MB
//! - Network byte counters in KB, summed across interfaces

use crate::error::DeriveError;
use crate::models::{MetricsRecord, StatsSnapshot};
use tracing::warn;

const BYTES_PER_MB: f64 = 1_048_576.0;
const BYTES_PER_KB: f64 = 1024.0;

/// Derive one output record from one snapshot.
pub fn derive(sample: &StatsSnapshot) -> Result<MetricsRecord, DeriveError> {
    check_timestamps(sample);

    let cpu_percent = cpu_percent(sample)?;
    let (memory_usage_mb, memory_limit_mb, memory_percent) = memory(sample)?;
    let (network_in_kb, network_out_kb) = network(sample);

    Ok(MetricsRecord {
        name: sample.name.clone(),
        read: sample.read.clone(),
        preread: sample.preread.clone(),
        cpu_percent,
        memory_usage_mb,
        memory_limit_mb,
        memory_percent,
        network_in_kb,
        network_out_kb,
    })
}

/// CPU utilization over the last tick, scaled by the online CPU count.
///
/// A non-positive delta on either counter means the value is undefined
/// for this tick (first sample, idle host clock, restarted counter) and
/// reports as 0.0 rather than failing.
fn cpu_percent(sample: &StatsSnapshot) -> Result<f64, DeriveError> {
    let online_cpus = online_cpus(sample)?;

    let system = sample
        .cpu_stats
        .system_cpu_usage
        .ok_or(DeriveError::MissingField("cpu_stats.system_cpu_usage"))?;
    // The first tick carries no previous system counter.
    let pre_system = sample.precpu_stats.system_cpu_usage.unwrap_or(0);

    let cpu_delta = sample
        .cpu_stats
        .cpu_usage
        .total_usage
        .saturating_sub(sample.precpu_stats.cpu_usage.total_usage);
    let system_delta = system.saturating_sub(pre_system);

    if cpu_delta > 0 && system_delta > 0 {
        Ok(cpu_delta as f64 / system_delta as f64 * f64::from(online_cpus) * 100.0)
    } else {
        Ok(0.0)
    }
}

/// Number of CPUs available to the container.
///
/// Modern engines report `online_cpus` directly; older ones only ship
/// the per-CPU usage list, which has one entry per CPU.
fn online_cpus(sample: &StatsSnapshot) -> Result<u32, DeriveError> {
    if let Some(n) = sample.cpu_stats.online_cpus {
        if n > 0 {
            return Ok(n);
        }
    }

    match &sample.cpu_stats.cpu_usage.percpu_usage {
        Some(per_cpu) if !per_cpu.is_empty() => Ok(per_cpu.len() as u32),
        _ => Err(DeriveError::MissingField("cpu_stats.online_cpus")),
    }
}

fn memory(sample: &StatsSnapshot) -> Result<(f64, f64, f64), DeriveError> {
    let usage = sample
        .memory_stats
        .usage
        .ok_or(DeriveError::MissingField("memory_stats.usage"))?;
    let limit = sample
        .memory_stats
        .limit
        .ok_or(DeriveError::MissingField("memory_stats.limit"))?;

    let usage_mb = usage as f64 / BYTES_PER_MB;
    let limit_mb = limit as f64 / BYTES_PER_MB;
    // An unlimited container reports limit 0; utilization is defined as
    // 0.0 there, never a division fault.
    let percent = if limit == 0 {
        0.0
    } else {
        usage_mb / limit_mb * 100.0
    };

    Ok((usage_mb, limit_mb, percent))
}

/// Byte counters summed across every interface the engine reports.
///
/// A container without any network (host networking, none driver) has
/// no counters and reports 0.0 on both directions.
fn network(sample: &StatsSnapshot) -> (f64, f64) {
    let rx: u64 = sample.networks.values().map(|n| n.rx_bytes).sum();
    let tx: u64 = sample.networks.values().map(|n| n.tx_bytes).sum();
    (rx as f64 / BYTES_PER_KB, tx as f64 / BYTES_PER_KB)
}

/// The engine stamps both instants; a preread after read means it
/// produced an inconsistent snapshot worth flagging.
fn check_timestamps(sample: &StatsSnapshot) {
    if let (Ok(read), Ok(preread)) = (
        chrono::DateTime::parse_from_rfc3339(&sample.read),
        chrono::DateTime::parse_from_rfc3339(&sample.preread),
    ) {
        if preread > read {
            warn!(
                name = %sample.name,
                read = %sample.read,
                preread = %sample.preread,
                "Snapshot timestamps out of order"
            );
        }
    }
}
