//! Single-file analysis: the profile, statistics and preview of one table.

use anyhow::Result;
use log::info;
use serde::Serialize;

use crate::{
    cli::AnalyzeArgs,
    config::{Settings, Thresholds},
    data,
    frame::Table,
    inference::{self, ColumnInfo, ColumnKind, ColumnSummary, TableProfile},
    io_utils,
    stats::{self, CorrelationPair, SummaryStats},
    table::{TextTable, print_section},
};

#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub row_count: usize,
    pub col_count: usize,
    pub columns_meta: TableProfile,
    pub column_info: Vec<ColumnInfo>,
    pub summary_stats: Vec<SummaryStats>,
    pub correlations: Vec<CorrelationPair>,
    pub preview: Preview,
}

pub fn analyze(table: &Table, thresholds: &Thresholds, preview_rows: usize) -> AnalysisReport {
    let (table, profile) = inference::classify(table, thresholds);
    let numeric = profile.names_of_kind(ColumnKind::Numeric);
    AnalysisReport {
        row_count: table.row_count(),
        col_count: table.column_count(),
        column_info: inference::column_info(&table),
        summary_stats: stats::summary_stats(&table, &profile),
        correlations: stats::correlations(&table, &numeric, thresholds),
        preview: Preview {
            headers: table.column_names(),
            rows: table.head(preview_rows),
        },
        columns_meta: profile,
    }
}

fn profile_table(profile: &TableProfile) -> TextTable {
    let mut table = TextTable::new(["column", "kind", "distinct", "summary"]);
    for meta in profile.columns() {
        let summary = match &meta.summary {
            ColumnSummary::Numeric {
                mean,
                std,
                min,
                max,
            } => format!(
                "mean={} std={} min={} max={}",
                data::format_significant(*mean, 4),
                std.map(|s| data::format_significant(s, 4))
                    .unwrap_or_else(|| "-".to_string()),
                data::format_number(*min),
                data::format_number(*max)
            ),
            ColumnSummary::Categorical { top_values } => top_values
                .iter()
                .take(3)
                .map(|v| format!("{} ({})", v.value, v.count))
                .collect::<Vec<_>>()
                .join(", "),
            ColumnSummary::Datetime { min, max } => format!("{min} .. {max}"),
            ColumnSummary::Empty => String::new(),
        };
        table.push_row(vec![
            meta.name.clone(),
            meta.kind().to_string(),
            meta.distinct_count.to_string(),
            summary,
        ]);
    }
    table
}

pub fn execute(args: &AnalyzeArgs, settings: &Settings) -> Result<()> {
    let options = crate::load_options(&args.input_options, settings)?;
    let table = io_utils::read_table(&args.input, &options)?;
    let report = analyze(&table, &settings.thresholds, args.preview);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{}: {} rows × {} columns\n",
            args.input.display(),
            report.row_count,
            report.col_count
        );
        print_section("Columns", &profile_table(&report.columns_meta));
        print_section("Summary statistics", &stats::summary_table(&report.summary_stats));
        print_section("Correlations", &stats::correlation_table(&report.correlations));
        print_section(
            "Preview",
            &TextTable::new(report.preview.headers.clone()).with_rows(report.preview.rows.clone()),
        );
    }
    info!(
        "Analyzed {} column(s) across {} row(s)",
        report.col_count, report.row_count
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Column;

    #[test]
    fn report_combines_profile_stats_and_preview() {
        let amounts = (1..=8).map(|i| Some(i as f64 * 1.5)).collect::<Vec<_>>();
        let doubled = (1..=8).map(|i| Some(i as f64 * 3.0)).collect::<Vec<_>>();
        let table = Table::new(vec![
            Column::numbers("amount", &amounts),
            Column::numbers("doubled", &doubled),
            Column::text(
                "region",
                &[Some("N"), Some("S"), Some("N"), None, Some("S"), Some("N"), Some("N"), Some("S")],
            ),
        ])
        .unwrap();
        let report = analyze(&table, &Thresholds::default(), 5);
        assert_eq!((report.row_count, report.col_count), (8, 3));
        assert_eq!(report.summary_stats.len(), 2);
        assert_eq!(report.correlations.len(), 1);
        assert_eq!(report.preview.rows.len(), 5);
        assert_eq!(report.columns_meta.kind_of("region"), Some(ColumnKind::Categorical));
        assert_eq!(report.column_info[2].missing, 1);

        let rendered = profile_table(&report.columns_meta).render();
        assert!(rendered.contains("N (4), S (3)"));
    }
}
