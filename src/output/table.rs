//! Colored table output for status reports.

use comfy_table::{
    Cell, CellAlignment, ContentArrangement, Table,
    presets::{ASCII_FULL, UTF8_FULL},
};

use crate::output::{TableOptions, format_mib, format_spawn, or_dash, status_label};
use crate::server::reporter::StatusReport;
use crate::theme::{Semantic, Themed, ThemedCell};

/// Print a status report as a colored table followed by a summary line.
pub fn print_table(report: &StatusReport, options: TableOptions) {
    println!("{}", render_table(report, options));
}

/// Render the table and summary without printing.
pub fn render_table(report: &StatusReport, options: TableOptions) -> String {
    if report.workers.is_empty() {
        return "No workers registered.".to_string();
    }

    let mut table = Table::new();
    if options.ascii {
        table.load_preset(ASCII_FULL);
    } else {
        table.load_preset(UTF8_FULL);
    }
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "PID", "Status", "Requests", "Method", "URI", "Host", "Spawned", "RSS MiB", "VSS MiB",
    ]);

    for worker in &report.workers {
        let record = &worker.record;
        table.add_row(vec![
            Cell::new(record.pid).themed(Semantic::Pid),
            Cell::new(status_label(record.status)).themed(record.status.into()),
            Cell::new(record.requests)
                .themed(Semantic::Count)
                .set_alignment(CellAlignment::Right),
            Cell::new(or_dash(&record.method)),
            Cell::new(or_dash(&record.uri)),
            Cell::new(or_dash(&record.host)).themed(Semantic::Muted),
            Cell::new(format_spawn(record.last_spawn)),
            Cell::new(format_mib(worker.rss)).set_alignment(CellAlignment::Right),
            Cell::new(format_mib(worker.vss)).set_alignment(CellAlignment::Right),
        ]);
    }

    format!("{table}\n{}", summary(report))
}

fn summary(report: &StatusReport) -> String {
    format!(
        "{} {}: {} busy, {} idle, {} terminated, {} requests served",
        report.workers.len().count(),
        if report.workers.len() == 1 { "worker" } else { "workers" },
        report.busy_workers.count(),
        report.idle_workers.count(),
        report.terminated_workers.count(),
        report.total_accesses.count(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::fixtures::sample_report;
    use crate::server::reporter::StatusReport;
    use crate::theme::disable_colors;

    #[test]
    fn test_render_table_empty() {
        let report = StatusReport::from_records(Vec::new(), &Default::default());
        assert_eq!(
            render_table(&report, TableOptions::default()),
            "No workers registered."
        );
    }

    #[test]
    #[serial_test::serial(colors)]
    fn test_render_table_with_workers() {
        disable_colors();
        let rendered = render_table(&sample_report(), TableOptions { ascii: true });

        assert!(rendered.contains("101"));
        assert!(rendered.contains("busy"));
        assert!(rendered.contains("/foo"));
        assert!(rendered.contains("SIGTERM (15)"));
        assert!(rendered.contains("12.5"));
        assert!(rendered.contains("3 workers: 1 busy, 1 idle, 1 terminated, 10 requests served"));
    }
}
