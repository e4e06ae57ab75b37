//! In-memory table model.
//!
//! A [`Table`] is an ordered list of named [`Column`]s of equal length. Each
//! column stores values of exactly one storage kind ([`ColumnData`]) with
//! `None` as the missing marker. Every transformation in the crate takes a
//! `&Table` and returns a new one.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;

use crate::{
    data::{self, Value},
    error::{BlendError, Result},
};

const MISSING_KEY: &str = "\u{0}";
const KEY_SEPARATOR: &str = "\u{1f}";

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Number(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
    DateTime(Vec<Option<NaiveDateTime>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Number(values) => values.len(),
            ColumnData::Text(values) => values.len(),
            ColumnData::DateTime(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ColumnData::Number(_) => "number",
            ColumnData::Text(_) => "text",
            ColumnData::DateTime(_) => "datetime",
        }
    }

    pub fn same_kind(&self, other: &ColumnData) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            ColumnData::Number(values) => values[row].is_none(),
            ColumnData::Text(values) => values[row].is_none(),
            ColumnData::DateTime(values) => values[row].is_none(),
        }
    }

    pub fn missing_count(&self) -> usize {
        (0..self.len()).filter(|row| self.is_missing(*row)).count()
    }

    pub fn value(&self, row: usize) -> Option<Value> {
        match self {
            ColumnData::Number(values) => values[row].map(Value::Number),
            ColumnData::Text(values) => values[row].clone().map(Value::Text),
            ColumnData::DateTime(values) => values[row].map(Value::DateTime),
        }
    }

    /// Rendered cell; missing cells render as an empty string.
    pub fn display(&self, row: usize) -> String {
        self.value(row)
            .map(|value| value.as_display())
            .unwrap_or_default()
    }

    /// Hashable identity of a cell. Missing cells share one key so they
    /// compare equal to each other and to nothing else.
    pub fn key(&self, row: usize) -> String {
        match self.value(row) {
            Some(Value::Number(n)) if n == 0.0 => "0".to_string(),
            Some(value) => value.as_display(),
            None => MISSING_KEY.to_string(),
        }
    }

    pub fn distinct_count(&self) -> usize {
        (0..self.len())
            .filter(|row| !self.is_missing(*row))
            .map(|row| self.key(row))
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn numbers(&self) -> Option<Vec<f64>> {
        match self {
            ColumnData::Number(values) => Some(values.iter().flatten().copied().collect()),
            _ => None,
        }
    }

    pub fn take(&self, rows: &[Option<usize>]) -> ColumnData {
        fn pick<T: Clone>(values: &[Option<T>], rows: &[Option<usize>]) -> Vec<Option<T>> {
            rows.iter()
                .map(|row| row.and_then(|idx| values[idx].clone()))
                .collect()
        }
        match self {
            ColumnData::Number(values) => ColumnData::Number(pick(values, rows)),
            ColumnData::Text(values) => ColumnData::Text(pick(values, rows)),
            ColumnData::DateTime(values) => ColumnData::DateTime(pick(values, rows)),
        }
    }


    /// Builds a column from raw text cells: numeric when every non-missing
    /// cell parses as a number, text otherwise.
    pub fn from_raw(cells: Vec<String>) -> ColumnData {
        let present = cells
            .iter()
            .filter(|cell| !data::is_missing_token(cell))
            .collect::<Vec<_>>();
        let numeric =
            !present.is_empty() && present.iter().all(|cell| data::parse_number(cell).is_some());
        if numeric {
            ColumnData::Number(
                cells
                    .iter()
                    .map(|cell| {
                        if data::is_missing_token(cell) {
                            None
                        } else {
                            data::parse_number(cell)
                        }
                    })
                    .collect(),
            )
        } else {
            ColumnData::Text(
                cells
                    .into_iter()
                    .map(|cell| (!data::is_missing_token(&cell)).then_some(cell))
                    .collect(),
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn numbers(name: &str, values: &[Option<f64>]) -> Self {
        Self::new(name, ColumnData::Number(values.to_vec()))
    }

    pub fn text(name: &str, values: &[Option<&str>]) -> Self {
        Self::new(
            name,
            ColumnData::Text(values.iter().map(|v| v.map(str::to_string)).collect()),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let rows = columns.first().map(|c| c.data.len()).unwrap_or(0);
        let mut seen = HashSet::new();
        for column in &columns {
            if column.data.len() != rows {
                return Err(BlendError::RaggedColumns {
                    column: column.name.clone(),
                    expected: rows,
                    found: column.data.len(),
                });
            }
            if !seen.insert(column.name.as_str()) {
                return Err(BlendError::DuplicateColumn(column.name.clone()));
            }
        }
        Ok(Self { columns, rows })
    }

    /// Builds a table from a header row and raw string records, trimming and
    /// de-duplicating header names the way the loader does.
    pub fn from_records(headers: &[String], records: &[Vec<String>]) -> Result<Self> {
        let names = unique_header_names(headers);
        let columns = names
            .into_iter()
            .enumerate()
            .map(|(idx, name)| {
                let cells = records
                    .iter()
                    .map(|record| record.get(idx).cloned().unwrap_or_default())
                    .collect();
                Column::new(name, ColumnData::from_raw(cells))
            })
            .collect();
        Table::new(columns)
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Like [`Table::column`] but reports the available columns on a miss.
    pub fn require_column(&self, name: &str, table: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| BlendError::column_not_found(name, table, &self.column_names()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn replace_data(&mut self, index: usize, data: ColumnData) {
        debug_assert_eq!(data.len(), self.rows);
        self.columns[index].data = data;
    }

    /// New table holding the given rows in order; `None` produces an
    /// all-missing row.
    pub fn take_rows(&self, rows: &[Option<usize>]) -> Table {
        Table {
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.data.take(rows)))
                .collect(),
            rows: rows.len(),
        }
    }

    pub fn retain_rows(&self, keep: &[bool]) -> Table {
        let rows = keep
            .iter()
            .enumerate()
            .filter(|(_, keep)| **keep)
            .map(|(idx, _)| Some(idx))
            .collect::<Vec<_>>();
        self.take_rows(&rows)
    }

    pub fn trim_column_names(&self) -> Table {
        let names = unique_header_names(&self.column_names());
        let mut trimmed = self.clone();
        for (column, name) in trimmed.columns.iter_mut().zip(names) {
            column.name = name;
        }
        trimmed
    }

    /// Renames columns per `mapping` (old → new). Unknown names are ignored.
    pub fn rename_columns(&self, mapping: &HashMap<String, String>) -> Result<Table> {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let name = mapping.get(&c.name).cloned().unwrap_or_else(|| c.name.clone());
                Column::new(name, c.data.clone())
            })
            .collect();
        Table::new(columns)
    }

    /// Composite key over the given column indices for one row.
    pub fn row_key(&self, row: usize, columns: &[usize]) -> String {
        columns
            .iter()
            .map(|idx| self.columns[*idx].data.key(row))
            .collect::<Vec<_>>()
            .join(KEY_SEPARATOR)
    }

    pub fn display_row(&self, row: usize) -> Vec<String> {
        self.columns.iter().map(|c| c.data.display(row)).collect()
    }

    pub fn head(&self, n: usize) -> Vec<Vec<String>> {
        (0..self.rows.min(n)).map(|row| self.display_row(row)).collect()
    }
}

/// Trims header names, names blank headers after their position, and
/// suffixes repeats with `.1`, `.2`, ...
pub fn unique_header_names(headers: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    headers
        .iter()
        .enumerate()
        .map(|(idx, raw)| {
            let trimmed = raw.trim();
            let base = if trimmed.is_empty() {
                format!("Unnamed: {idx}")
            } else {
                trimmed.to_string()
            };
            let mut candidate = base.clone();
            let mut counter = 1usize;
            while seen.contains(&candidate) {
                candidate = format!("{base}.{counter}");
                counter += 1;
            }
            seen.insert(candidate.clone());
            candidate
        })
        .collect()
}
