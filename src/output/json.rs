//! JSON output for status reports.

use crate::server::reporter::StatusReport;

/// Print a status report as pretty JSON, in the same shape the endpoint serves.
pub fn print_json(report: &StatusReport) {
    let json = serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string());
    println!("{}", json);
}
