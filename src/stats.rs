use anyhow::{Context, Result, bail};
use itertools::Itertools;
use log::info;
use serde::Serialize;

use crate::{
    cli::StatsArgs,
    config::{Settings, Thresholds},
    data::{self, round2},
    error::BlendError,
    frame::{ColumnData, Table},
    inference::{self, ColumnKind, TableProfile},
    io_utils,
    table::{TextTable, print_section},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationPair {
    pub x: String,
    pub y: String,
    pub r: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub column: String,
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std: Option<f64>,
    pub min: f64,
    pub max: f64,
    pub q1: f64,
    pub q3: f64,
    pub missing: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Pearson correlations between every pair of the given numeric columns,
/// computed on rows where both values are present. Only pairs with
/// `|r| >= correlation_threshold` are kept, strongest first.
pub fn correlations(
    table: &Table,
    numeric_columns: &[String],
    thresholds: &Thresholds,
) -> Vec<CorrelationPair> {
    let series = numeric_columns
        .iter()
        .filter_map(|name| match &table.column(name)?.data {
            ColumnData::Number(values) => Some((name, values)),
            _ => None,
        })
        .collect::<Vec<_>>();

    let mut pairs = series
        .iter()
        .tuple_combinations()
        .filter_map(|((x_name, xs), (y_name, ys))| {
            let r = pearson(xs, ys)?;
            (r.abs() >= thresholds.correlation_threshold).then(|| CorrelationPair {
                x: (*x_name).clone(),
                y: (*y_name).clone(),
                r,
            })
        })
        .collect::<Vec<_>>();
    pairs.sort_by(|a, b| b.r.abs().total_cmp(&a.r.abs()));
    pairs.truncate(thresholds.max_correlation_pairs);
    pairs
}

fn pearson(xs: &[Option<f64>], ys: &[Option<f64>]) -> Option<f64> {
    let (x, y): (Vec<f64>, Vec<f64>) = xs
        .iter()
        .zip(ys)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .unzip();
    if x.len() < 2 {
        return None;
    }
    let mean_x = data::mean(&x)?;
    let mean_y = data::mean(&y)?;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(&y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    let r = cov / (var_x.sqrt() * var_y.sqrt());
    r.is_finite().then_some(r.clamp(-1.0, 1.0))
}

/// Descriptive statistics for every column the profile classifies as
/// numeric, rounded to two decimals. Columns without values are skipped.
pub fn summary_stats(table: &Table, profile: &TableProfile) -> Vec<SummaryStats> {
    profile
        .names_of_kind(ColumnKind::Numeric)
        .into_iter()
        .filter_map(|name| {
            let column = table.column(&name)?;
            let mut values = column.data.numbers()?;
            if values.is_empty() {
                return None;
            }
            values.sort_by(f64::total_cmp);
            Some(SummaryStats {
                count: values.len(),
                mean: round2(data::mean(&values)?),
                median: round2(data::quantile_sorted(&values, 0.5)?),
                std: data::std_dev(&values).map(round2),
                min: round2(values[0]),
                max: round2(values[values.len() - 1]),
                q1: round2(data::quantile_sorted(&values, 0.25)?),
                q3: round2(data::quantile_sorted(&values, 0.75)?),
                missing: column.data.missing_count(),
                column: name,
            })
        })
        .collect()
}

/// Paired non-missing points of two numeric columns, downsampled with a
/// fixed stride so at most `max_points` remain.
pub fn sample_points(
    table: &Table,
    x: &str,
    y: &str,
    max_points: usize,
) -> Result<Vec<Point>, BlendError> {
    let xs = numeric_values(table, x)?;
    let ys = numeric_values(table, y)?;
    let points = xs
        .iter()
        .zip(ys)
        .filter_map(|(x, y)| Some(Point { x: (*x)?, y: (*y)? }))
        .collect::<Vec<_>>();
    if max_points == 0 || points.len() <= max_points {
        return Ok(points);
    }
    let stride = points.len().div_ceil(max_points);
    Ok(points.into_iter().step_by(stride).take(max_points).collect())
}

fn numeric_values<'a>(table: &'a Table, name: &str) -> Result<&'a [Option<f64>], BlendError> {
    match table.column(name).map(|column| &column.data) {
        Some(ColumnData::Number(values)) => Ok(values.as_slice()),
        _ => {
            let numeric = table
                .columns()
                .iter()
                .filter(|c| matches!(c.data, ColumnData::Number(_)))
                .map(|c| c.name.clone())
                .collect::<Vec<_>>();
            Err(BlendError::column_not_found(name, "numeric columns", &numeric))
        }
    }
}

pub fn summary_rows(stats: &[SummaryStats]) -> Vec<Vec<String>> {
    let opt = |value: Option<f64>| value.map(data::format_number).unwrap_or_default();
    stats
        .iter()
        .map(|s| {
            vec![
                s.column.clone(),
                s.count.to_string(),
                data::format_number(s.mean),
                data::format_number(s.median),
                opt(s.std),
                data::format_number(s.min),
                data::format_number(s.max),
                data::format_number(s.q1),
                data::format_number(s.q3),
                s.missing.to_string(),
            ]
        })
        .collect()
}

pub fn summary_table(stats: &[SummaryStats]) -> TextTable {
    TextTable::new([
        "column", "count", "mean", "median", "std", "min", "max", "q1", "q3", "missing",
    ])
    .with_rows(summary_rows(stats))
}

pub fn correlation_table(pairs: &[CorrelationPair]) -> TextTable {
    TextTable::new(["x", "y", "r"]).with_rows(
        pairs
            .iter()
            .map(|p| vec![p.x.clone(), p.y.clone(), format!("{:.4}", p.r)])
            .collect(),
    )
}

#[derive(Debug, Serialize)]
struct StatsReport<'a> {
    summary_stats: &'a [SummaryStats],
    correlations: &'a [CorrelationPair],
    #[serde(skip_serializing_if = "Option::is_none")]
    scatter: Option<&'a [Point]>,
}

pub fn execute(args: &StatsArgs, settings: &Settings) -> Result<()> {
    let options = crate::load_options(&args.input_options, settings)?;
    let table = io_utils::read_table(&args.input, &options)?;
    let thresholds = &settings.thresholds;
    let (table, profile) = inference::classify(&table, thresholds);

    let stats = summary_stats(&table, &profile);
    let numeric = profile.names_of_kind(ColumnKind::Numeric);
    let pairs = correlations(&table, &numeric, thresholds);
    let scatter = match args.scatter.as_slice() {
        [] => None,
        [x, y] => Some(
            sample_points(&table, x, y, thresholds.max_sample_points)
                .with_context(|| format!("Sampling points for {x} vs {y}"))?,
        ),
        _ => bail!("--scatter expects exactly two column names"),
    };

    if args.json {
        let report = StatsReport {
            summary_stats: &stats,
            correlations: &pairs,
            scatter: scatter.as_deref(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_section("Summary statistics", &summary_table(&stats));
        print_section("Correlations", &correlation_table(&pairs));
        if let Some(points) = &scatter {
            let rows = points
                .iter()
                .map(|p| vec![data::format_number(p.x), data::format_number(p.y)])
                .collect();
            print_section(
                "Sampled points",
                &TextTable::new([args.scatter[0].as_str(), args.scatter[1].as_str()])
                    .with_rows(rows),
            );
        }
    }
    info!(
        "Computed statistics for {} numeric column(s) and {} correlated pair(s)",
        stats.len(),
        pairs.len()
    );
    Ok(())
}
