use std::{
    collections::{HashMap, HashSet},
    fmt,
    str::FromStr,
};

use clap::ValueEnum;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::{BlendError, Result},
    frame::{Column, ColumnData, Table},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Outer,
}

impl JoinType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "inner",
            JoinType::Left => "left",
            JoinType::Right => "right",
            JoinType::Outer => "outer",
        }
    }

    pub fn names() -> Vec<&'static str> {
        vec!["inner", "left", "right", "outer"]
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JoinType {
    type Err = BlendError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inner" => Ok(JoinType::Inner),
            "left" => Ok(JoinType::Left),
            "right" => Ok(JoinType::Right),
            "outer" | "full" => Ok(JoinType::Outer),
            _ => Err(BlendError::InvalidJoinType(value.to_string())),
        }
    }
}

/// One join between the accumulated table and an incoming one.
#[derive(Debug, Clone)]
pub struct JoinSpec<'a> {
    pub left_keys: &'a [String],
    pub right_keys: &'a [String],
    pub join_type: JoinType,
    /// Appended to right-hand column names that collide with the left.
    pub right_suffix: &'a str,
    pub left_label: &'a str,
    pub right_label: &'a str,
}

/// Hash join of `right` into `left`.
///
/// Keys with the same name on both sides collapse into a single output column;
/// differently named keys are both kept. Inner and left joins keep the left
/// row order (and right order within one left row), right joins keep the
/// right order, outer joins append unmatched right rows after the left join.
pub fn join(left: &Table, right: &Table, spec: &JoinSpec<'_>) -> Result<Table> {
    let left_indices = key_indices(left, spec.left_keys, spec.left_label)?;
    let right_indices = key_indices(right, spec.right_keys, spec.right_label)?;
    validate_key_types(left, right, &left_indices, &right_indices)?;

    let pairs = match spec.join_type {
        JoinType::Right => right_major_pairs(left, right, &left_indices, &right_indices),
        kind => left_major_pairs(left, right, &left_indices, &right_indices, kind),
    };
    debug!(
        "{} join {} x {} rows on {:?} produced {} row(s)",
        spec.join_type,
        left.row_count(),
        right.row_count(),
        spec.left_keys,
        pairs.len()
    );

    let shared: HashMap<usize, usize> = left_indices
        .iter()
        .zip(&right_indices)
        .filter(|(l, r)| left.columns()[**l].name == right.columns()[**r].name)
        .map(|(l, r)| (*l, *r))
        .collect();
    let dropped_right: HashSet<usize> = shared.values().copied().collect();
    assemble(left, right, &pairs, &shared, &dropped_right, spec.right_suffix)
}

/// Cartesian product of both tables, left row order major.
pub fn cross_join(left: &Table, right: &Table, right_suffix: &str) -> Result<Table> {
    let pairs = (0..left.row_count())
        .flat_map(|l| (0..right.row_count()).map(move |r| (Some(l), Some(r))))
        .collect::<Vec<_>>();
    assemble(
        left,
        right,
        &pairs,
        &HashMap::new(),
        &HashSet::new(),
        right_suffix,
    )
}

fn key_indices(table: &Table, keys: &[String], label: &str) -> Result<Vec<usize>> {
    keys.iter()
        .map(|name| {
            table
                .column_index(name)
                .ok_or_else(|| BlendError::column_not_found(name, label, &table.column_names()))
        })
        .collect()
}

fn validate_key_types(
    left: &Table,
    right: &Table,
    left_indices: &[usize],
    right_indices: &[usize],
) -> Result<()> {
    for (l_idx, r_idx) in left_indices.iter().zip(right_indices) {
        let left_column = &left.columns()[*l_idx];
        let right_column = &right.columns()[*r_idx];
        if !left_column.data.same_kind(&right_column.data) {
            return Err(BlendError::KeyTypeMismatch {
                left_column: left_column.name.clone(),
                left_kind: left_column.data.kind_name(),
                right_column: right_column.name.clone(),
                right_kind: right_column.data.kind_name(),
            });
        }
    }
    Ok(())
}

type RowPair = (Option<usize>, Option<usize>);

fn lookup(table: &Table, key_indices: &[usize]) -> HashMap<String, Vec<usize>> {
    let mut map: HashMap<String, Vec<usize>> = HashMap::new();
    for row in 0..table.row_count() {
        map.entry(table.row_key(row, key_indices))
            .or_default()
            .push(row);
    }
    map
}

fn left_major_pairs(
    left: &Table,
    right: &Table,
    left_indices: &[usize],
    right_indices: &[usize],
    kind: JoinType,
) -> Vec<RowPair> {
    let right_lookup = lookup(right, right_indices);
    let mut matched_right = vec![false; right.row_count()];
    let mut pairs = Vec::new();
    for l in 0..left.row_count() {
        match right_lookup.get(&left.row_key(l, left_indices)) {
            Some(bucket) => {
                for r in bucket {
                    matched_right[*r] = true;
                    pairs.push((Some(l), Some(*r)));
                }
            }
            None if kind != JoinType::Inner => pairs.push((Some(l), None)),
            None => {}
        }
    }
    if kind == JoinType::Outer {
        pairs.extend(
            matched_right
                .iter()
                .enumerate()
                .filter(|(_, matched)| !**matched)
                .map(|(r, _)| (None, Some(r))),
        );
    }
    pairs
}

fn right_major_pairs(
    left: &Table,
    right: &Table,
    left_indices: &[usize],
    right_indices: &[usize],
) -> Vec<RowPair> {
    let left_lookup = lookup(left, left_indices);
    let mut pairs = Vec::new();
    for r in 0..right.row_count() {
        match left_lookup.get(&right.row_key(r, right_indices)) {
            Some(bucket) => pairs.extend(bucket.iter().map(|l| (Some(*l), Some(r)))),
            None => pairs.push((None, Some(r))),
        }
    }
    pairs
}

fn assemble(
    left: &Table,
    right: &Table,
    pairs: &[RowPair],
    shared_keys: &HashMap<usize, usize>,
    dropped_right: &HashSet<usize>,
    right_suffix: &str,
) -> Result<Table> {
    let left_rows = pairs.iter().map(|(l, _)| *l).collect::<Vec<_>>();
    let right_rows = pairs.iter().map(|(_, r)| *r).collect::<Vec<_>>();

    let mut columns = Vec::with_capacity(left.column_count() + right.column_count());
    let mut seen: HashSet<String> = HashSet::new();
    for (idx, column) in left.columns().iter().enumerate() {
        let mut data = column.data.take(&left_rows);
        if let Some(r_idx) = shared_keys.get(&idx) {
            let fallback = right.columns()[*r_idx].data.take(&right_rows);
            data = coalesce(data, fallback);
        }
        seen.insert(column.name.clone());
        columns.push(Column::new(column.name.clone(), data));
    }
    for (idx, column) in right.columns().iter().enumerate() {
        if dropped_right.contains(&idx) {
            continue;
        }
        let name = output_name(&column.name, right_suffix, &seen);
        seen.insert(name.clone());
        columns.push(Column::new(name, column.data.take(&right_rows)));
    }
    Table::new(columns)
}

fn output_name(name: &str, suffix: &str, seen: &HashSet<String>) -> String {
    if !seen.contains(name) {
        return name.to_string();
    }
    let base = format!("{name}{suffix}");
    let mut candidate = base.clone();
    let mut counter = 1usize;
    while seen.contains(&candidate) {
        candidate = format!("{base}_{counter}");
        counter += 1;
    }
    candidate
}

fn coalesce(primary: ColumnData, fallback: ColumnData) -> ColumnData {
    fn fill<T>(primary: Vec<Option<T>>, fallback: Vec<Option<T>>) -> Vec<Option<T>> {
        primary
            .into_iter()
            .zip(fallback)
            .map(|(p, f)| p.or(f))
            .collect()
    }
    match (primary, fallback) {
        (ColumnData::Number(p), ColumnData::Number(f)) => ColumnData::Number(fill(p, f)),
        (ColumnData::Text(p), ColumnData::Text(f)) => ColumnData::Text(fill(p, f)),
        (ColumnData::DateTime(p), ColumnData::DateTime(f)) => ColumnData::DateTime(fill(p, f)),
        (primary, _) => primary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customers() -> Table {
        Table::new(vec![
            Column::numbers("customer_id", &[Some(1.0), Some(2.0), Some(3.0)]),
            Column::text("name", &[Some("Bo"), Some("Al"), Some("Cy")]),
        ])
        .unwrap()
    }

    fn orders() -> Table {
        Table::new(vec![
            Column::numbers("customer_id", &[Some(3.0), Some(1.0), Some(4.0), Some(1.0)]),
            Column::numbers("amount", &[Some(30.0), Some(10.0), Some(40.0), Some(11.0)]),
        ])
        .unwrap()
    }

    fn spec<'a>(keys: &'a [String], join_type: JoinType) -> JoinSpec<'a> {
        JoinSpec {
            left_keys: keys,
            right_keys: keys,
            join_type,
            right_suffix: "_2",
            left_label: "left",
            right_label: "right",
        }
    }

    fn column_values(table: &Table, name: &str) -> Vec<String> {
        let column = table.column(name).expect("column");
        (0..table.row_count()).map(|r| column.data.display(r)).collect()
    }

    #[test]
    fn inner_join_preserves_left_order() {
        let keys = vec!["customer_id".to_string()];
        let joined = join(&customers(), &orders(), &spec(&keys, JoinType::Inner)).unwrap();
        assert_eq!(joined.column_names(), vec!["customer_id", "name", "amount"]);
        assert_eq!(column_values(&joined, "name"), vec!["Bo", "Bo", "Cy"]);
        assert_eq!(column_values(&joined, "amount"), vec!["10", "11", "30"]);
    }

    #[test]
    fn left_join_keeps_unmatched_rows() {
        let keys = vec!["customer_id".to_string()];
        let joined = join(&customers(), &orders(), &spec(&keys, JoinType::Left)).unwrap();
        assert_eq!(joined.row_count(), 4);
        assert_eq!(column_values(&joined, "amount"), vec!["10", "11", "", "30"]);
    }

    #[test]
    fn right_join_follows_right_order_and_fills_keys() {
        let keys = vec!["customer_id".to_string()];
        let joined = join(&customers(), &orders(), &spec(&keys, JoinType::Right)).unwrap();
        assert_eq!(column_values(&joined, "customer_id"), vec!["3", "1", "4", "1"]);
        assert_eq!(column_values(&joined, "name"), vec!["Cy", "Bo", "", "Bo"]);
    }

    #[test]
    fn outer_join_appends_unmatched_right_rows() {
        let keys = vec!["customer_id".to_string()];
        let joined = join(&customers(), &orders(), &spec(&keys, JoinType::Outer)).unwrap();
        assert_eq!(joined.row_count(), 5);
        assert_eq!(
            column_values(&joined, "customer_id"),
            vec!["1", "1", "2", "3", "4"]
        );
    }

    #[test]
    fn differently_named_keys_are_both_kept() {
        let people = customers()
            .rename_columns(&HashMap::from([("customer_id".to_string(), "id".to_string())]))
            .unwrap();
        let left_keys = vec!["customer_id".to_string()];
        let right_keys = vec!["id".to_string()];
        let joined = join(
            &orders(),
            &people,
            &JoinSpec {
                left_keys: &left_keys,
                right_keys: &right_keys,
                join_type: JoinType::Inner,
                right_suffix: "_people",
                left_label: "orders",
                right_label: "people",
            },
        )
        .unwrap();
        assert_eq!(
            joined.column_names(),
            vec!["customer_id", "amount", "id", "name"]
        );
        assert_eq!(joined.row_count(), 3);
    }

    #[test]
    fn colliding_columns_get_suffix() {
        let keys = vec!["customer_id".to_string()];
        let joined = join(&customers(), &customers(), &spec(&keys, JoinType::Inner)).unwrap();
        assert_eq!(joined.column_names(), vec!["customer_id", "name", "name_2"]);
    }

    #[test]
    fn key_kind_mismatch_is_rejected() {
        let text_keys = Table::new(vec![Column::text(
            "customer_id",
            &[Some("1"), Some("x")],
        )])
        .unwrap();
        let keys = vec!["customer_id".to_string()];
        let err = join(&customers(), &text_keys, &spec(&keys, JoinType::Inner)).unwrap_err();
        assert!(matches!(err, BlendError::KeyTypeMismatch { .. }));
    }

    #[test]
    fn cross_join_multiplies_rows() {
        let joined = cross_join(&customers(), &orders(), "_orders").unwrap();
        assert_eq!(joined.row_count(), 12);
        assert_eq!(
            joined.column_names(),
            vec!["customer_id", "name", "customer_id_orders", "amount"]
        );
    }

    #[test]
    fn join_type_parsing_rejects_unknown_names() {
        assert_eq!("LEFT".parse::<JoinType>().unwrap(), JoinType::Left);
        assert!(matches!(
            "sideways".parse::<JoinType>(),
            Err(BlendError::InvalidJoinType(_))
        ));
    }
}
