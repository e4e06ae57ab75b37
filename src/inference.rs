//! Column type inference.
//!
//! [`classify`] assigns every column one of four semantic kinds and computes
//! the matching summary. Text columns that mostly parse as dates are converted
//! to datetime storage in the returned table so later stages can work with
//! parsed values.

use std::{collections::HashMap, fmt};

use chrono::NaiveDateTime;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    config::Thresholds,
    data::{self, DATETIME_DISPLAY_FORMAT, DateParse},
    frame::{Column, ColumnData, Table},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Datetime,
    Empty,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Numeric => "numeric",
            ColumnKind::Categorical => "categorical",
            ColumnKind::Datetime => "datetime",
            ColumnKind::Empty => "empty",
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

/// Kind-specific payload of [`ColumnMetadata`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", rename_all = "lowercase")]
pub enum ColumnSummary {
    Numeric {
        mean: f64,
        /// Sample standard deviation; absent with fewer than two values.
        std: Option<f64>,
        min: f64,
        max: f64,
    },
    Categorical {
        top_values: Vec<ValueCount>,
    },
    Datetime {
        min: String,
        max: String,
    },
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    pub distinct_count: usize,
    #[serde(flatten)]
    pub summary: ColumnSummary,
}

impl ColumnMetadata {
    pub fn kind(&self) -> ColumnKind {
        match self.summary {
            ColumnSummary::Numeric { .. } => ColumnKind::Numeric,
            ColumnSummary::Categorical { .. } => ColumnKind::Categorical,
            ColumnSummary::Datetime { .. } => ColumnKind::Datetime,
            ColumnSummary::Empty => ColumnKind::Empty,
        }
    }
}

/// Ordered column name → metadata mapping for one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableProfile {
    columns: Vec<ColumnMetadata>,
}

impl TableProfile {
    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    pub fn get(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|meta| meta.name == name)
    }

    pub fn kind_of(&self, name: &str) -> Option<ColumnKind> {
        self.get(name).map(ColumnMetadata::kind)
    }

    pub fn names_of_kind(&self, kind: ColumnKind) -> Vec<String> {
        self.columns
            .iter()
            .filter(|meta| meta.kind() == kind)
            .map(|meta| meta.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Display-oriented description of a column's storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub dtype: String,
    pub distinct: usize,
    pub sample: Vec<String>,
    pub missing: usize,
}

/// Classifies every column, returning the table with date-like text columns
/// converted to datetime storage together with the per-column metadata.
pub fn classify(table: &Table, thresholds: &Thresholds) -> (Table, TableProfile) {
    let mut classified = table.clone();
    let mut columns = Vec::with_capacity(table.column_count());

    for (idx, column) in table.columns().iter().enumerate() {
        let present = column.data.len() - column.data.missing_count();
        if present == 0 {
            columns.push(ColumnMetadata {
                name: column.name.clone(),
                distinct_count: 0,
                summary: ColumnSummary::Empty,
            });
            continue;
        }

        if let ColumnData::Text(values) = &column.data
            && let Some(parsed) = detect_datetimes(values, thresholds.datetime_parse_success)
        {
            let data = ColumnData::DateTime(parsed.values);
            columns.push(datetime_metadata(&column.name, &data));
            classified.replace_data(idx, data);
            debug!(
                "Column '{}' parsed as datetime ({}/{} valid)",
                column.name, parsed.parsed, parsed.present
            );
            continue;
        }

        let metadata = match &column.data {
            ColumnData::Number(_) => numeric_metadata(column, present, thresholds),
            ColumnData::DateTime(_) => datetime_metadata(&column.name, &column.data),
            ColumnData::Text(_) => categorical_metadata(column, thresholds),
        };
        debug!("Column '{}' classified as {}", column.name, metadata.kind());
        columns.push(metadata);
    }

    (classified, TableProfile { columns })
}

pub fn profile(table: &Table, thresholds: &Thresholds) -> TableProfile {
    classify(table, thresholds).1
}

pub fn column_info(table: &Table) -> Vec<ColumnInfo> {
    table
        .columns()
        .iter()
        .map(|column| {
            let dtype = match column.data {
                ColumnData::Number(_) => ColumnKind::Numeric,
                ColumnData::DateTime(_) => ColumnKind::Datetime,
                ColumnData::Text(_) => ColumnKind::Categorical,
            };
            let sample = (0..column.data.len())
                .filter(|row| !column.data.is_missing(*row))
                .take(3)
                .map(|row| column.data.display(row))
                .collect();
            ColumnInfo {
                name: column.name.clone(),
                dtype: dtype.to_string(),
                distinct: column.data.distinct_count(),
                sample,
                missing: column.data.missing_count(),
            }
        })
        .collect()
}

pub(crate) struct ParsedDates {
    pub values: Vec<Option<NaiveDateTime>>,
    pub parsed: usize,
    pub present: usize,
}

/// Parses a text column as datetimes. Returns `None` unless strictly more than
/// `min_success` of the non-missing cells parse; unparsed cells become missing.
pub(crate) fn detect_datetimes(values: &[Option<String>], min_success: f64) -> Option<ParsedDates> {
    let mut parsed = Vec::with_capacity(values.len());
    let mut present = 0usize;
    let mut successes = 0usize;
    for value in values {
        let Some(raw) = value else {
            parsed.push(None);
            continue;
        };
        present += 1;
        match data::parse_datetime(raw) {
            DateParse::Parsed(dt) => {
                successes += 1;
                parsed.push(Some(dt));
            }
            DateParse::Unparsed { .. } => parsed.push(None),
        }
    }
    if present == 0 || (successes as f64) <= present as f64 * min_success {
        return None;
    }
    Some(ParsedDates {
        values: parsed,
        parsed: successes,
        present,
    })
}

fn numeric_metadata(column: &Column, present: usize, thresholds: &Thresholds) -> ColumnMetadata {
    let distinct = column.data.distinct_count();
    let ratio = distinct as f64 / present as f64;
    if distinct <= thresholds.categorical_max_unique && ratio < thresholds.categorical_unique_ratio
    {
        return categorical_metadata(column, thresholds);
    }
    let values = column.data.numbers().unwrap_or_default();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    ColumnMetadata {
        name: column.name.clone(),
        distinct_count: distinct,
        summary: ColumnSummary::Numeric {
            mean: data::mean(&values).unwrap_or_default(),
            std: data::std_dev(&values),
            min,
            max,
        },
    }
}

fn categorical_metadata(column: &Column, thresholds: &Thresholds) -> ColumnMetadata {
    ColumnMetadata {
        name: column.name.clone(),
        distinct_count: column.data.distinct_count(),
        summary: ColumnSummary::Categorical {
            top_values: top_values(&column.data, thresholds.top_n_categories),
        },
    }
}

fn datetime_metadata(name: &str, data: &ColumnData) -> ColumnMetadata {
    let (min, max) = match data {
        ColumnData::DateTime(values) => {
            let present = values.iter().flatten();
            (present.clone().min().copied(), present.max().copied())
        }
        _ => (None, None),
    };
    let render = |value: Option<NaiveDateTime>| {
        value
            .map(|dt| dt.format(DATETIME_DISPLAY_FORMAT).to_string())
            .unwrap_or_default()
    };
    ColumnMetadata {
        name: name.to_string(),
        distinct_count: data.distinct_count(),
        summary: ColumnSummary::Datetime {
            min: render(min),
            max: render(max),
        },
    }
}

/// Value counts ordered by count descending; equal counts keep the order in
/// which the values were first seen.
pub fn top_values(data: &ColumnData, limit: usize) -> Vec<ValueCount> {
    let mut order: Vec<ValueCount> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for row in 0..data.len() {
        if data.is_missing(row) {
            continue;
        }
        let key = data.key(row);
        match positions.get(&key) {
            Some(position) => order[*position].count += 1,
            None => {
                positions.insert(key, order.len());
                order.push(ValueCount {
                    value: data.display(row),
                    count: 1,
                });
            }
        }
    }
    order.sort_by(|a, b| b.count.cmp(&a.count));
    order.truncate(limit);
    order
}
