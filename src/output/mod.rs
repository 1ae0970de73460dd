//! Output formatting for status reports.

pub mod json;
pub mod plain;
pub mod table;

use chrono::DateTime;

use crate::record::WorkerStatus;
use crate::server::reporter::StatusReport;
use crate::signals::describe_signal;

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Colored table output (default).
    #[default]
    Table,
    /// JSON output.
    Json,
    /// Plain text output (tab-separated, no colors).
    Plain,
}

/// Table display options.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableOptions {
    /// Use ASCII borders instead of Unicode.
    pub ascii: bool,
}

/// Format and print a status report.
pub fn print_report(report: &StatusReport, format: OutputFormat, options: TableOptions) {
    match format {
        OutputFormat::Table => table::print_table(report, options),
        OutputFormat::Json => json::print_json(report),
        OutputFormat::Plain => plain::print_plain(report),
    }
}

/// `idle`, `busy`, or the terminating signal by name.
pub(crate) fn status_label(status: WorkerStatus) -> String {
    match status {
        WorkerStatus::Terminated(signum) => describe_signal(signum),
        other => other.to_string(),
    }
}

/// Bytes as MiB with one decimal, or `-` when unknown.
pub(crate) fn format_mib(bytes: Option<u64>) -> String {
    match bytes {
        Some(b) => format!("{:.1}", b as f64 / (1024.0 * 1024.0)),
        None => "-".to_string(),
    }
}

/// Epoch seconds as a UTC timestamp.
pub(crate) fn format_spawn(epoch_secs: u64) -> String {
    i64::try_from(epoch_secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Empty fields render as `-`.
pub(crate) fn or_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::collections::HashMap;

    use crate::process::MemoryUsage;
    use crate::record::{WorkerRecord, WorkerStatus};
    use crate::server::reporter::StatusReport;

    pub fn sample_report() -> StatusReport {
        let mut busy = WorkerRecord::new(101, 1_700_000_000);
        busy.requests = 7;
        busy.status = WorkerStatus::Busy;
        busy.method = "GET".to_string();
        busy.uri = "/foo".to_string();
        busy.host = "localhost:8080".to_string();

        let mut idle = WorkerRecord::new(102, 1_700_000_100);
        idle.requests = 2;

        let mut gone = WorkerRecord::new(103, 1_700_000_200);
        gone.requests = 1;
        gone.status = WorkerStatus::Terminated(15);

        let mut memory = HashMap::new();
        memory.insert(
            101,
            MemoryUsage {
                virtual_bytes: 200 * 1024 * 1024,
                resident_bytes: 12 * 1024 * 1024 + 512 * 1024,
            },
        );

        StatusReport::from_records(vec![busy, idle, gone], &memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_label() {
        assert_eq!(status_label(WorkerStatus::Idle), "idle");
        assert_eq!(status_label(WorkerStatus::Busy), "busy");
        assert_eq!(status_label(WorkerStatus::Terminated(15)), "SIGTERM (15)");
    }

    #[test]
    fn test_format_mib() {
        assert_eq!(format_mib(Some(12 * 1024 * 1024 + 512 * 1024)), "12.5");
        assert_eq!(format_mib(None), "-");
    }

    #[test]
    fn test_format_spawn() {
        assert_eq!(format_spawn(0), "1970-01-01 00:00:00");
        assert_eq!(format_spawn(1_700_000_000), "2023-11-14 22:13:20");
        assert_eq!(format_spawn(u64::MAX), "-");
    }
}
