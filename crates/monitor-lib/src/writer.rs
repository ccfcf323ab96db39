//! Append-only persistence of derived metrics
//!
//! One delimited text row per sample, with a header row written exactly
//! once when the target file is empty. The file is never read back or
//! rewritten; rows from earlier runs stay untouched across restarts.

use crate::models::MetricsRecord;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Column order of the dataset file. Rows are written in exactly this
/// order; `MetricsRecord` fields mirror it.
pub const COLUMNS: [&str; 9] = [
    "name",
    "read",
    "preread",
    "cpu",
    "memory_usage",
    "memory_limit",
    "memory_percent",
    "network_in",
    "network_out",
];

/// Field separator. Values are written unquoted and must not contain it;
/// container names and RFC 3339 timestamps never do.
pub const DELIMITER: &str = ";";

/// Appends derived metric rows to a dataset file.
///
/// Assumes a single writer process per path; concurrent writers are not
/// supported.
pub struct RecordWriter {
    path: PathBuf,
}

impl RecordWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, prefixed by the header iff the file is empty
    /// at the time of the write.
    ///
    /// The full output is built as one string before any byte hits the
    /// file, and the handle is opened, flushed and closed within this
    /// call, so a failure never leaves a torn row behind.
    pub fn append(&self, record: &MetricsRecord) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut out = String::new();
        if file.metadata()?.len() == 0 {
            out.push_str(&COLUMNS.join(DELIMITER));
            out.push('\n');
        }
        out.push_str(&format_row(record));
        out.push('\n');

        file.write_all(out.as_bytes())?;
        file.flush()
    }
}

/// Serialize one record into a delimited row, without the newline.
///
/// Percentages are fixed to two decimals here, at the persistence
/// boundary; the other values keep the default float rendering.
pub fn format_row(record: &MetricsRecord) -> String {
    [
        record.name.clone(),
        record.read.clone(),
        record.preread.clone(),
        format!("{:.2}", record.cpu_percent),
        record.memory_usage_mb.to_string(),
        record.memory_limit_mb.to_string(),
        format!("{:.2}", record.memory_percent),
        record.network_in_kb.to_string(),
        record.network_out_kb.to_string(),
    ]
    .join(DELIMITER)
}
