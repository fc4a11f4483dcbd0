//! Output formatting for run summaries

use clap::ValueEnum;
use kscaler::{RunSummary, WorkloadOutcome, WorkloadReport};

/// Output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Columnar table (default)
    #[default]
    Table,
    /// JSON
    Json,
}

/// Column headers of the summary table
pub const SUMMARY_HEADERS: &[&str] = &["KIND", "NAME", "FROM", "TO", "STATUS", "DETAIL"];

/// One table row per workload report
pub fn summary_rows(summary: &RunSummary) -> Vec<Vec<String>> {
    summary.reports().map(report_row).collect()
}

fn report_row(report: &WorkloadReport) -> Vec<String> {
    let (from, to, detail) = match &report.outcome {
        WorkloadOutcome::Scaled { from, to } => (from.to_string(), to.to_string(), String::new()),
        WorkloadOutcome::Failed { stage, error } => {
            ("-".to_string(), "-".to_string(), format!("{}: {}", stage, error))
        }
        WorkloadOutcome::NeedsAttention {
            checkpoint,
            stage,
            error,
        } => (
            checkpoint.to_string(),
            "-".to_string(),
            format!("checkpoint recorded, {}: {}", stage, error),
        ),
        WorkloadOutcome::Cancelled { stage } => (
            "-".to_string(),
            "-".to_string(),
            format!("cancelled before {}", stage),
        ),
    };
    vec![
        report.kind.to_string(),
        report.name.clone(),
        from,
        to,
        report.outcome.status().to_string(),
        detail,
    ]
}

/// Render rows as a column-aligned table with headers.
///
/// Trailing padding is trimmed from every line.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let num_cols = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(num_cols) {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let format_line = |cells: Vec<&str>| -> String {
        let padded: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:<width$}", cell, width = w)
            })
            .collect();
        padded.join("  ").trim_end().to_string()
    };

    let mut lines = vec![format_line(headers.to_vec())];
    for row in rows {
        lines.push(format_line(row.iter().map(String::as_str).collect()));
    }
    lines.join("\n")
}

/// Print rows as a column-aligned table with headers.
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    println!("{}", render_table(headers, rows));
}

#[cfg(test)]
mod tests {
    use super::*;
    use kscaler::{KindSummary, ScaleDirection, ScaleStage, WorkloadKind};

    fn summary() -> RunSummary {
        RunSummary {
            namespace: "staging".to_string(),
            direction: ScaleDirection::Down,
            kinds: vec![
                KindSummary {
                    kind: WorkloadKind::Deployment,
                    namespace: "staging".to_string(),
                    reports: vec![
                        WorkloadReport {
                            kind: WorkloadKind::Deployment,
                            name: "web".to_string(),
                            outcome: WorkloadOutcome::Scaled { from: 3, to: 0 },
                        },
                        WorkloadReport {
                            kind: WorkloadKind::Deployment,
                            name: "api".to_string(),
                            outcome: WorkloadOutcome::Failed {
                                stage: ScaleStage::RecordCheckpoint,
                                error: "forbidden".to_string(),
                            },
                        },
                    ],
                },
                KindSummary {
                    kind: WorkloadKind::StatefulSet,
                    namespace: "staging".to_string(),
                    reports: vec![WorkloadReport {
                        kind: WorkloadKind::StatefulSet,
                        name: "db".to_string(),
                        outcome: WorkloadOutcome::NeedsAttention {
                            checkpoint: 1,
                            stage: ScaleStage::ApplyScale,
                            error: "conflict".to_string(),
                        },
                    }],
                },
            ],
            stopped: None,
        }
    }

    #[test]
    fn test_summary_rows_cover_every_workload() {
        let rows = summary_rows(&summary());
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], ["Deployment", "web", "3", "0", "scaled", ""]);
        assert_eq!(
            rows[1],
            ["Deployment", "api", "-", "-", "failed", "record-checkpoint: forbidden"]
        );
        assert_eq!(rows[2][0], "StatefulSet");
        assert_eq!(rows[2][2], "1");
        assert_eq!(rows[2][4], "needs-attention");
        assert!(rows[2][5].starts_with("checkpoint recorded"));
    }

    #[test]
    fn test_render_table_aligns_columns() {
        let rows = vec![
            vec!["Deployment".to_string(), "web".to_string()],
            vec!["StatefulSet".to_string(), "db".to_string()],
        ];
        let table = render_table(&["KIND", "NAME"], &rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "KIND         NAME");
        assert_eq!(lines[1], "Deployment   web");
        assert_eq!(lines[2], "StatefulSet  db");
    }

    #[test]
    fn test_render_table_headers_only() {
        assert_eq!(render_table(SUMMARY_HEADERS, &[]), "KIND  NAME  FROM  TO  STATUS  DETAIL");
    }
}
