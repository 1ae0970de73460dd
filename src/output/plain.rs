//! Plain text output for status reports.

use crate::output::{format_mib, or_dash, status_label};
use crate::server::reporter::StatusReport;

/// Print a status report as plain text (tab-separated, no colors).
pub fn print_plain(report: &StatusReport) {
    print!("{}", render_plain(report));
}

/// One header line, then one line per worker.
pub fn render_plain(report: &StatusReport) -> String {
    let mut out = String::from("PID\tSTATUS\tREQUESTS\tMETHOD\tURI\tHOST\tLAST_SPAWN\tRSS\tVSS\n");
    for worker in &report.workers {
        let record = &worker.record;
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
            record.pid,
            status_label(record.status),
            record.requests,
            or_dash(&record.method),
            or_dash(&record.uri),
            or_dash(&record.host),
            record.last_spawn,
            format_mib(worker.rss),
            format_mib(worker.vss),
        ));
    }
    out
}
