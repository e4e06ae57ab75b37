//! The cleaning pipeline.
//!
//! [`clean`] runs a fixed sequence of stages over a private working copy of
//! the input: date detection, missing-value handling, duplicate removal,
//! categorical standardization, date reformatting, outlier capping and
//! normalization. Each stage that changes data appends to the returned
//! [`ActionLog`]; the final entry is always a `summary`.

use std::{collections::HashSet, fmt::Write as _};

use chrono::{
    NaiveDateTime,
    format::{Item, StrftimeItems},
};
use log::{debug, info};

use crate::{
    audit::ActionLog,
    config::{CleanConfig, Normalization, NumericStrategy, OutlierMethod, Thresholds},
    data::{self, format_significant},
    error::{BlendError, Result},
    frame::{ColumnData, Table},
    inference::detect_datetimes,
};

#[derive(Debug, Clone)]
pub struct CleanResult {
    pub table: Table,
    pub log: ActionLog,
}

/// Working column sets produced by the local classification stage.
#[derive(Debug, Default)]
struct ColumnSets {
    numeric: Vec<String>,
    categorical: Vec<String>,
    dates: Vec<String>,
}

pub fn clean(table: &Table, config: &CleanConfig, thresholds: &Thresholds) -> Result<CleanResult> {
    let original_rows = table.row_count();
    let original_cols = table.column_count();
    let mut log = ActionLog::new();

    let mut work = table.trim_column_names();
    let dedup_indices = resolve_dedup_subset(&work, config.dedup_subset.as_deref())?;

    let sets = classify_working_columns(&mut work, thresholds, &mut log);
    debug!(
        "Cleaning {} numeric, {} categorical, {} date column(s)",
        sets.numeric.len(),
        sets.categorical.len(),
        sets.dates.len()
    );

    work = handle_missing(work, &sets, config, &mut log);
    work = remove_duplicates(work, dedup_indices.as_deref(), config, &mut log);
    standardise_categoricals(&mut work, &sets.categorical, &mut log);
    if let Some(pattern) = &config.date_format {
        format_dates(&mut work, &sets.dates, pattern, &mut log);
    }
    match config.outlier_method {
        OutlierMethod::Iqr => cap_outliers_iqr(&mut work, &sets.numeric, thresholds, &mut log),
        OutlierMethod::Zscore => {
            cap_outliers_zscore(&mut work, &sets.numeric, thresholds, &mut log)
        }
        OutlierMethod::None => {}
    }
    match config.normalize {
        Normalization::Minmax => normalize_minmax(&mut work, &sets.numeric, &mut log),
        Normalization::Zscore => normalize_zscore(&mut work, &sets.numeric, &mut log),
        Normalization::None => {}
    }

    let rows_removed = original_rows - work.row_count();
    let summary = format!(
        "Original: {original_rows} rows × {original_cols} cols → Cleaned: {} rows × {} cols ({rows_removed} rows removed)",
        work.row_count(),
        work.column_count()
    );
    info!("{summary}");
    log.record("summary", None, summary);

    Ok(CleanResult { table: work, log })
}

fn resolve_dedup_subset(table: &Table, subset: Option<&[String]>) -> Result<Option<Vec<usize>>> {
    let Some(subset) = subset else {
        return Ok(None);
    };
    let indices = subset
        .iter()
        .map(|name| {
            table
                .column_index(name)
                .ok_or_else(|| BlendError::column_not_found(name, "input", &table.column_names()))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(indices))
}

fn classify_working_columns(
    work: &mut Table,
    thresholds: &Thresholds,
    log: &mut ActionLog,
) -> ColumnSets {
    let mut sets = ColumnSets::default();
    let mut converted = Vec::new();
    for (idx, column) in work.columns().iter().enumerate() {
        match &column.data {
            ColumnData::Number(_) => sets.numeric.push(column.name.clone()),
            ColumnData::DateTime(_) => sets.dates.push(column.name.clone()),
            ColumnData::Text(values) => {
                match detect_datetimes(values, thresholds.cleaner_datetime_parse_success) {
                    Some(parsed) => {
                        log.record(
                            "parse_date",
                            Some(&column.name),
                            format!(
                                "Parsed as datetime ({}/{} valid)",
                                parsed.parsed, parsed.present
                            ),
                        );
                        sets.dates.push(column.name.clone());
                        converted.push((idx, ColumnData::DateTime(parsed.values)));
                    }
                    None => sets.categorical.push(column.name.clone()),
                }
            }
        }
    }
    for (idx, data) in converted {
        work.replace_data(idx, data);
    }
    sets
}

fn handle_missing(
    mut work: Table,
    sets: &ColumnSets,
    config: &CleanConfig,
    log: &mut ActionLog,
) -> Table {
    for name in &sets.numeric {
        let Some(idx) = work.column_index(name) else {
            continue;
        };
        let data = &work.columns()[idx].data;
        let missing = data.missing_count();
        if missing == 0 {
            continue;
        }
        let present = data.numbers().unwrap_or_default();
        let (action, fill) = match config.numeric_strategy {
            NumericStrategy::Mean => ("impute_mean", data::mean(&present)),
            NumericStrategy::Median => ("impute_median", data::median(&present)),
            NumericStrategy::Drop => {
                let keep = missing_mask(data);
                work = work.retain_rows(&keep);
                log.record(
                    "drop_missing",
                    Some(name),
                    format!("Dropped {missing} rows with missing values"),
                );
                continue;
            }
        };
        let Some(fill) = fill else {
            continue;
        };
        if let ColumnData::Number(values) = data {
            let filled = values.iter().map(|v| Some(v.unwrap_or(fill))).collect();
            work.replace_data(idx, ColumnData::Number(filled));
            let label = if action == "impute_mean" { "mean" } else { "median" };
            log.record(
                action,
                Some(name),
                format!(
                    "Filled {missing} missing with {label}={}",
                    format_significant(fill, 4)
                ),
            );
        }
    }

    for name in &sets.categorical {
        let Some(idx) = work.column_index(name) else {
            continue;
        };
        let ColumnData::Text(values) = &work.columns()[idx].data else {
            continue;
        };
        let missing = values.iter().filter(|v| v.is_none()).count();
        if missing == 0 {
            continue;
        }
        let filled = values
            .iter()
            .map(|v| Some(v.clone().unwrap_or_else(|| config.categorical_fill.clone())))
            .collect();
        work.replace_data(idx, ColumnData::Text(filled));
        log.record(
            "fill_categorical",
            Some(name),
            format!("Filled {missing} missing with '{}'", config.categorical_fill),
        );
    }

    for name in &sets.dates {
        let Some(idx) = work.column_index(name) else {
            continue;
        };
        let data = &work.columns()[idx].data;
        let missing = data.missing_count();
        if missing > 0 {
            let keep = missing_mask(data);
            work = work.retain_rows(&keep);
            log.record(
                "drop_missing_dates",
                Some(name),
                format!("Dropped {missing} rows with unparseable dates"),
            );
        }
    }
    work
}

fn missing_mask(data: &ColumnData) -> Vec<bool> {
    (0..data.len()).map(|row| !data.is_missing(row)).collect()
}

fn remove_duplicates(
    work: Table,
    subset: Option<&[usize]>,
    config: &CleanConfig,
    log: &mut ActionLog,
) -> Table {
    let all_columns = (0..work.column_count()).collect::<Vec<_>>();
    let key_columns = subset.unwrap_or(&all_columns);
    let mut seen = HashSet::with_capacity(work.row_count());
    let keep = (0..work.row_count())
        .map(|row| seen.insert(work.row_key(row, key_columns)))
        .collect::<Vec<_>>();
    let removed = keep.iter().filter(|keep| !**keep).count();
    if removed == 0 {
        return work;
    }
    let mut detail = format!("Removed {removed} duplicate rows");
    if let Some(names) = &config.dedup_subset {
        let _ = write!(detail, " (key: {names:?})");
    }
    log.record("remove_duplicates", None, detail);
    work.retain_rows(&keep)
}

fn standardise_categoricals(work: &mut Table, columns: &[String], log: &mut ActionLog) {
    for name in columns {
        let Some(idx) = work.column_index(name) else {
            continue;
        };
        let data = &work.columns()[idx].data;
        let ColumnData::Text(values) = data else {
            continue;
        };
        let before = data.distinct_count();
        let standardised = ColumnData::Text(
            values
                .iter()
                .map(|v| v.as_deref().map(|s| data::title_case(s.trim())))
                .collect(),
        );
        let after = standardised.distinct_count();
        work.replace_data(idx, standardised);
        if after < before {
            log.record(
                "standardise_categorical",
                Some(name),
                format!("Title-cased & trimmed; unique values {before}→{after}"),
            );
        }
    }
}

fn format_dates(work: &mut Table, columns: &[String], pattern: &str, log: &mut ActionLog) {
    let items = StrftimeItems::new(pattern).collect::<Vec<_>>();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        debug!("Skipping date reformatting: invalid format '{pattern}'");
        return;
    }
    for name in columns {
        let Some(idx) = work.column_index(name) else {
            continue;
        };
        let ColumnData::DateTime(values) = &work.columns()[idx].data else {
            continue;
        };
        let Some(formatted) = render_dates(values, &items) else {
            debug!("Skipping date reformatting for '{name}'");
            continue;
        };
        work.replace_data(idx, ColumnData::Text(formatted));
        log.record("format_date", Some(name), format!("Reformatted to {pattern}"));
    }
}

fn render_dates(values: &[Option<NaiveDateTime>], items: &[Item<'_>]) -> Option<Vec<Option<String>>> {
    values
        .iter()
        .map(|value| match value {
            Some(dt) => {
                let mut out = String::new();
                write!(out, "{}", dt.format_with_items(items.iter()))
                    .ok()
                    .map(|_| Some(out))
            }
            None => Some(None),
        })
        .collect()
}

/// Applies `f` to every present value of a numeric column.
fn map_numbers(work: &mut Table, idx: usize, f: impl Fn(f64) -> f64) {
    if let ColumnData::Number(values) = &work.columns()[idx].data {
        let mapped = values.iter().map(|v| v.map(&f)).collect();
        work.replace_data(idx, ColumnData::Number(mapped));
    }
}

fn present_numbers(work: &Table, name: &str) -> Option<(usize, Vec<f64>)> {
    let idx = work.column_index(name)?;
    let values = work.columns()[idx].data.numbers()?;
    Some((idx, values))
}

fn cap_outliers_iqr(work: &mut Table, columns: &[String], thresholds: &Thresholds, log: &mut ActionLog) {
    for name in columns {
        let Some((idx, mut values)) = present_numbers(work, name) else {
            continue;
        };
        values.sort_by(f64::total_cmp);
        let (Some(q1), Some(q3)) = (
            data::quantile_sorted(&values, 0.25),
            data::quantile_sorted(&values, 0.75),
        ) else {
            continue;
        };
        let iqr = q3 - q1;
        if iqr == 0.0 {
            continue;
        }
        let lower = q1 - thresholds.iqr_factor * iqr;
        let upper = q3 + thresholds.iqr_factor * iqr;
        let outliers = values.iter().filter(|v| **v < lower || **v > upper).count();
        if outliers == 0 {
            continue;
        }
        map_numbers(work, idx, |v| v.clamp(lower, upper));
        log.record(
            "cap_outliers_iqr",
            Some(name),
            format!(
                "Capped {outliers} outliers to [{}, {}]",
                format_significant(lower, 4),
                format_significant(upper, 4)
            ),
        );
    }
}

fn cap_outliers_zscore(
    work: &mut Table,
    columns: &[String],
    thresholds: &Thresholds,
    log: &mut ActionLog,
) {
    let threshold = thresholds.zscore_threshold;
    for name in columns {
        let Some((idx, values)) = present_numbers(work, name) else {
            continue;
        };
        let (Some(mean), Some(std)) = (data::mean(&values), data::std_dev(&values)) else {
            continue;
        };
        if std == 0.0 {
            continue;
        }
        let outliers = values
            .iter()
            .filter(|v| ((**v - mean) / std).abs() > threshold)
            .count();
        if outliers == 0 {
            continue;
        }
        let lower = mean - threshold * std;
        let upper = mean + threshold * std;
        map_numbers(work, idx, |v| v.clamp(lower, upper));
        log.record(
            "cap_outliers_zscore",
            Some(name),
            format!("Capped {outliers} outliers (|z|>{threshold:?})"),
        );
    }
}

fn normalize_minmax(work: &mut Table, columns: &[String], log: &mut ActionLog) {
    for name in columns {
        let Some((idx, values)) = present_numbers(work, name) else {
            continue;
        };
        if values.is_empty() {
            continue;
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;
        if range == 0.0 {
            continue;
        }
        map_numbers(work, idx, |v| (v - min) / range);
        log.record(
            "normalize_minmax",
            Some(name),
            format!(
                "Scaled to [0, 1] (original range [{}, {}])",
                format_significant(min, 4),
                format_significant(max, 4)
            ),
        );
    }
}

fn normalize_zscore(work: &mut Table, columns: &[String], log: &mut ActionLog) {
    for name in columns {
        let Some((idx, values)) = present_numbers(work, name) else {
            continue;
        };
        let (Some(mean), Some(std)) = (data::mean(&values), data::std_dev(&values)) else {
            continue;
        };
        if std == 0.0 {
            continue;
        }
        map_numbers(work, idx, |v| (v - mean) / std);
        log.record(
            "normalize_zscore",
            Some(name),
            format!(
                "Z-score normalised (μ={}, σ={})",
                format_significant(mean, 4),
                format_significant(std, 4)
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Column;

    fn numbers(table: &Table, name: &str) -> Vec<Option<f64>> {
        match &table.column(name).unwrap().data {
            ColumnData::Number(values) => values.clone(),
            other => panic!("expected numbers, got {}", other.kind_name()),
        }
    }

    fn texts(table: &Table, name: &str) -> Vec<Option<String>> {
        match &table.column(name).unwrap().data {
            ColumnData::Text(values) => values.clone(),
            other => panic!("expected text, got {}", other.kind_name()),
        }
    }

    fn run(table: &Table, config: &CleanConfig) -> CleanResult {
        clean(table, config, &Thresholds::default()).expect("clean")
    }

    #[test]
    fn iqr_caps_single_outlier() {
        let table = Table::new(vec![Column::numbers(
            "x",
            &[Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(100.0)],
        )])
        .unwrap();
        let result = run(&table, &CleanConfig::default());
        assert_eq!(
            numbers(&result.table, "x"),
            vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(7.0)]
        );
        let entry = result.log.find("cap_outliers_iqr").expect("logged");
        assert_eq!(entry.detail, "Capped 1 outliers to [-1, 7]");
        assert_eq!(entry.column.as_deref(), Some("x"));
    }

    #[test]
    fn median_imputation_fills_and_logs() {
        let table = Table::new(vec![
            Column::numbers("id", &[Some(1.0), Some(2.0), Some(3.0), Some(4.0)]),
            Column::numbers("age", &[Some(30.0), None, Some(40.0), Some(20.0)]),
        ])
        .unwrap();
        let config = CleanConfig {
            outlier_method: OutlierMethod::None,
            ..CleanConfig::default()
        };
        let result = run(&table, &config);
        assert_eq!(
            numbers(&result.table, "age"),
            vec![Some(30.0), Some(30.0), Some(40.0), Some(20.0)]
        );
        assert_eq!(
            result.log.find("impute_median").unwrap().detail,
            "Filled 1 missing with median=30"
        );
    }

    #[test]
    fn drop_strategy_removes_rows() {
        let table = Table::new(vec![
            Column::numbers("a", &[Some(1.0), None, Some(3.0)]),
            Column::text("b", &[Some("x"), Some("y"), Some("z")]),
        ])
        .unwrap();
        let config = CleanConfig {
            numeric_strategy: NumericStrategy::Drop,
            outlier_method: OutlierMethod::None,
            ..CleanConfig::default()
        };
        let result = run(&table, &config);
        assert_eq!(result.table.row_count(), 2);
        assert!(result.log.find("drop_missing").is_some());
        assert!(result.log.find("summary").unwrap().detail.contains("(1 rows removed)"));
    }

    #[test]
    fn categorical_missing_is_filled_with_literal() {
        let table = Table::new(vec![Column::text("city", &[Some("Oslo"), None])]).unwrap();
        let result = run(&table, &CleanConfig::default());
        assert_eq!(
            texts(&result.table, "city"),
            vec![Some("Oslo".to_string()), Some("Unknown".to_string())]
        );
        assert_eq!(
            result.log.find("fill_categorical").unwrap().detail,
            "Filled 1 missing with 'Unknown'"
        );
    }

    #[test]
    fn standardization_merges_variants() {
        let table = Table::new(vec![Column::text(
            "city",
            &[Some("ny"), Some(" NY"), Some("New york")],
        )])
        .unwrap();
        let result = run(&table, &CleanConfig::default());
        assert_eq!(
            texts(&result.table, "city"),
            vec![
                Some("Ny".to_string()),
                Some("Ny".to_string()),
                Some("New York".to_string())
            ]
        );
        assert_eq!(
            result.log.find("standardise_categorical").unwrap().detail,
            "Title-cased & trimmed; unique values 3→2"
        );
    }

    #[test]
    fn standardization_without_merges_is_silent() {
        let table =
            Table::new(vec![Column::text("city", &[Some("oslo"), Some("bergen")])]).unwrap();
        let result = run(&table, &CleanConfig::default());
        assert_eq!(result.log.actions(), vec!["summary"]);
        assert_eq!(texts(&result.table, "city")[0].as_deref(), Some("Oslo"));
    }

    #[test]
    fn unparseable_dates_drop_rows_and_reformat() {
        let table = Table::new(vec![
            Column::text(
                "when",
                &[Some("2024-01-05"), Some("garbage"), Some("03/04/2024")],
            ),
            Column::numbers("v", &[Some(1.0), Some(2.0), Some(3.0)]),
        ])
        .unwrap();
        let config = CleanConfig {
            date_format: Some("%d.%m.%Y".to_string()),
            ..CleanConfig::default()
        };
        let result = run(&table, &config);
        assert_eq!(
            result.log.actions(),
            vec!["parse_date", "drop_missing_dates", "format_date", "summary"]
        );
        assert_eq!(
            result.log.find("parse_date").unwrap().detail,
            "Parsed as datetime (2/3 valid)"
        );
        assert_eq!(
            texts(&result.table, "when"),
            vec![Some("05.01.2024".to_string()), Some("04.03.2024".to_string())]
        );
    }

    #[test]
    fn invalid_date_format_is_skipped() {
        let table =
            Table::new(vec![Column::text("when", &[Some("2024-01-05"), Some("2024-01-06")])])
                .unwrap();
        let config = CleanConfig {
            date_format: Some("%Q".to_string()),
            ..CleanConfig::default()
        };
        let result = run(&table, &config);
        assert!(result.log.find("format_date").is_none());
        assert!(matches!(
            result.table.column("when").unwrap().data,
            ColumnData::DateTime(_)
        ));
    }

    #[test]
    fn duplicates_on_subset_keep_first() {
        let table = Table::new(vec![
            Column::numbers("id", &[Some(1.0), Some(1.0), Some(2.0)]),
            Column::text("note", &[Some("a"), Some("b"), Some("c")]),
        ])
        .unwrap();
        let config = CleanConfig {
            dedup_subset: Some(vec!["id".to_string()]),
            outlier_method: OutlierMethod::None,
            ..CleanConfig::default()
        };
        let result = run(&table, &config);
        assert_eq!(
            texts(&result.table, "note"),
            vec![Some("A".to_string()), Some("C".to_string())]
        );
        assert_eq!(
            result.log.find("remove_duplicates").unwrap().detail,
            "Removed 1 duplicate rows (key: [\"id\"])"
        );
    }

    #[test]
    fn unknown_dedup_column_is_rejected() {
        let table = Table::new(vec![Column::numbers("id", &[Some(1.0)])]).unwrap();
        let config = CleanConfig {
            dedup_subset: Some(vec!["nope".to_string()]),
            ..CleanConfig::default()
        };
        let err = clean(&table, &config, &Thresholds::default()).unwrap_err();
        assert!(matches!(err, BlendError::ColumnNotFound { .. }));
    }

    #[test]
    fn zscore_capping_and_normalization() {
        let mut values = vec![Some(10.0); 20];
        values.push(Some(1000.0));
        values[0] = Some(11.0);
        let ids: Vec<Option<f64>> = (0..values.len()).map(|i| Some(i as f64)).collect();
        let table = Table::new(vec![
            Column::numbers("id", &ids),
            Column::numbers("v", &values),
        ])
        .unwrap();
        let config = CleanConfig {
            outlier_method: OutlierMethod::Zscore,
            normalize: Normalization::Zscore,
            ..CleanConfig::default()
        };
        let result = run(&table, &config);
        assert_eq!(
            result.log.find("cap_outliers_zscore").unwrap().detail,
            "Capped 1 outliers (|z|>3.0)"
        );
        let normalized = result.table.column("v").unwrap().data.numbers().unwrap();
        let mean = data::mean(&normalized).unwrap();
        let std = data::std_dev(&normalized).unwrap();
        assert!(mean.abs() < 1e-9);
        assert!((std - 1.0).abs() < 1e-9);
    }

    #[test]
    fn minmax_skips_constant_columns() {
        let table = Table::new(vec![
            Column::numbers("flat", &[Some(2.0), Some(2.0)]),
            Column::numbers("span", &[Some(2.0), Some(6.0)]),
        ])
        .unwrap();
        let config = CleanConfig {
            normalize: Normalization::Minmax,
            ..CleanConfig::default()
        };
        let result = run(&table, &config);
        assert_eq!(numbers(&result.table, "flat"), vec![Some(2.0), Some(2.0)]);
        assert_eq!(numbers(&result.table, "span"), vec![Some(0.0), Some(1.0)]);
        assert_eq!(result.log.actions(), vec!["normalize_minmax", "summary"]);
    }
}
