//! Merge planning and execution.
//!
//! Two modes share the same join kernel ([`crate::join`]):
//!
//! - **Flat mode** ([`merge_flat`]): every table carries the same key columns
//!   and the tables are joined left to right in input order.
//! - **Relationship mode** ([`merge_relationships`]): relationship edges are
//!   consumed through a worklist. Starting from the source table of the first
//!   edge, each pass joins the first queued edge that connects the merged set
//!   to an unmerged table. Tables no edge can reach are cross-joined with a
//!   warning, or rejected when the fallback is disabled.
//!
//! Inputs are validated before the first join, and any failure aborts the
//! whole merge.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use itertools::Itertools;
use log::{debug, info};
use serde::Serialize;

use crate::{
    audit::ActionLog,
    error::{BlendError, MissingKeys, Result},
    frame::Table,
    join::{self, JoinSpec, JoinType},
    relationships::Relationship,
};

const RESULT_LABEL: &str = "merged result";

/// Column renames per table name, old name → new name.
pub type Renames = HashMap<String, HashMap<String, String>>;

#[derive(Debug, Clone, PartialEq)]
pub struct NamedTable {
    pub name: String,
    pub table: Table,
}

impl NamedTable {
    pub fn new(name: impl Into<String>, table: Table) -> Self {
        Self {
            name: name.into(),
            table,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FlatMergeRequest {
    pub keys: Vec<String>,
    pub join_type: JoinType,
    pub renames: Renames,
}

#[derive(Debug, Clone)]
pub struct RelationshipMergeRequest {
    pub join_type: JoinType,
    pub renames: Renames,
    /// Cross-join tables that no relationship reaches instead of failing.
    pub allow_cross_join: bool,
}

impl Default for RelationshipMergeRequest {
    fn default() -> Self {
        Self {
            join_type: JoinType::Inner,
            renames: Renames::new(),
            allow_cross_join: true,
        }
    }
}

/// One executed join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeStep {
    pub table: String,
    pub keys: Vec<String>,
    /// Join type name, or `cross` for a fallback cartesian join.
    pub join: String,
    pub rows_before: usize,
    pub rows_after: usize,
    pub columns_after: usize,
}

#[derive(Debug, Clone)]
pub struct MergeResult {
    pub table: Table,
    pub plan: Vec<MergeStep>,
    pub log: ActionLog,
}

impl MergeResult {
    fn unchanged(table: Table) -> Self {
        let mut log = ActionLog::new();
        log.record("skip", None, "Only one table — no merge needed");
        Self {
            table,
            plan: Vec::new(),
            log,
        }
    }
}

/// Outcome of a trial merge of two tables.
#[derive(Debug, Clone, Serialize)]
pub struct MergePreview {
    pub rows: usize,
    pub cols: usize,
    pub columns: Vec<String>,
    pub preview: Vec<Vec<String>>,
    pub left_rows: usize,
    pub right_rows: usize,
    pub left_unmatched: usize,
}

/// Column names present in every table, sorted.
pub fn find_common_columns(tables: &[NamedTable]) -> Vec<String> {
    let Some((first, rest)) = tables.split_first() else {
        return Vec::new();
    };
    let mut common = first
        .table
        .column_names()
        .into_iter()
        .filter(|name| rest.iter().all(|other| other.table.contains(name)))
        .collect::<Vec<_>>();
    common.sort();
    common.dedup();
    common
}

pub fn merge_flat(tables: &[NamedTable], request: &FlatMergeRequest) -> Result<MergeResult> {
    match tables {
        [] => return Err(BlendError::NoTables),
        [only] => return Ok(MergeResult::unchanged(only.table.clone())),
        _ => {}
    }

    let mut log = ActionLog::new();
    let tables = apply_renames(tables, &request.renames, &mut log)?;
    if request.keys.is_empty() {
        return Err(BlendError::NoMergeKeys {
            common: find_common_columns(&tables),
        });
    }
    validate_flat_keys(&tables, &request.keys)?;

    let mut result = tables[0].table.clone();
    let mut plan = Vec::with_capacity(tables.len() - 1);
    for (position, incoming) in tables.iter().enumerate().skip(1) {
        let suffix = format!("_{}", position + 1);
        let spec = JoinSpec {
            left_keys: &request.keys,
            right_keys: &request.keys,
            join_type: request.join_type,
            right_suffix: &suffix,
            left_label: RESULT_LABEL,
            right_label: &incoming.name,
        };
        let rows_before = result.row_count();
        result = join::join(&result, &incoming.table, &spec)?;
        log.record(
            "merge",
            None,
            format!(
                "Merged {} ({} rows) into result ({rows_before} rows) on {:?} ({} join) → {} rows",
                incoming.name,
                incoming.table.row_count(),
                request.keys,
                request.join_type,
                result.row_count()
            ),
        );
        plan.push(MergeStep {
            table: incoming.name.clone(),
            keys: request.keys.clone(),
            join: request.join_type.to_string(),
            rows_before,
            rows_after: result.row_count(),
            columns_after: result.column_count(),
        });
    }

    finish(result, plan, log)
}

pub fn merge_relationships(
    tables: &[NamedTable],
    edges: &[Relationship],
    request: &RelationshipMergeRequest,
) -> Result<MergeResult> {
    match tables {
        [] => return Err(BlendError::NoTables),
        [only] => return Ok(MergeResult::unchanged(only.table.clone())),
        _ => {}
    }
    let Some(first_edge) = edges.first() else {
        return Err(BlendError::NoRelationships);
    };

    let mut log = ActionLog::new();
    let tables = apply_renames(tables, &request.renames, &mut log)?;
    let by_name: HashMap<&str, &NamedTable> =
        tables.iter().map(|t| (t.name.as_str(), t)).collect();
    validate_edges(&by_name, edges)?;

    let seed = first_edge.from_table.as_str();
    if !request.allow_cross_join {
        let unreachable = unreachable_tables(&tables, edges, seed);
        if !unreachable.is_empty() {
            return Err(BlendError::AmbiguousMergeTarget { unreachable });
        }
    }

    let mut merger = FrontierMerge::seeded(table_named(&by_name, seed)?, log, request.join_type);
    let mut queue: VecDeque<&Relationship> = edges.iter().collect();
    // Every pass merges one table, so this bound is never reached on valid input.
    let limit = 2 * edges.len() + 5;
    let mut passes = 0usize;

    loop {
        merger.drop_settled_edges(&mut queue);
        if queue.is_empty() {
            break;
        }
        passes += 1;
        if passes > limit {
            return Err(BlendError::MergeIterationLimit {
                limit,
                remaining: queue.len(),
            });
        }

        let straddling = queue
            .iter()
            .position(|edge| merger.is_merged(&edge.from_table) != merger.is_merged(&edge.to_table));
        match straddling.and_then(|position| queue.remove(position)) {
            Some(edge) => merger.join_edge(edge, &by_name)?,
            None => {
                let Some(edge) = queue.front() else {
                    break;
                };
                let target = table_named(&by_name, &edge.from_table)?;
                merger.cross_join(target)?;
            }
        }
    }

    for table in &tables {
        if !merger.is_merged(&table.name) {
            merger.cross_join(table)?;
        }
    }

    finish(merger.result, merger.plan, merger.log)
}

/// Trial merge of two tables on shared keys; neither input is modified.
pub fn preview_merge(
    left: &NamedTable,
    right: &NamedTable,
    keys: &[String],
    join_type: JoinType,
    renames: &Renames,
    preview_rows: usize,
) -> Result<MergePreview> {
    let mut scratch = ActionLog::new();
    let renamed = apply_renames(&[left.clone(), right.clone()], renames, &mut scratch)?;
    let (l, r) = (&renamed[0], &renamed[1]);
    validate_flat_keys(&renamed, keys)?;

    let spec = JoinSpec {
        left_keys: keys,
        right_keys: keys,
        join_type,
        right_suffix: "_right",
        left_label: &l.name,
        right_label: &r.name,
    };
    let merged = join::join(&l.table, &r.table, &spec)?;

    let left_unmatched = if join_type == JoinType::Inner {
        0
    } else {
        let left_idx = key_positions(&l.table, keys);
        let right_idx = key_positions(&r.table, keys);
        let right_keys: HashSet<String> = (0..r.table.row_count())
            .map(|row| r.table.row_key(row, &right_idx))
            .collect();
        (0..l.table.row_count())
            .filter(|row| !right_keys.contains(&l.table.row_key(*row, &left_idx)))
            .count()
    };

    Ok(MergePreview {
        rows: merged.row_count(),
        cols: merged.column_count(),
        columns: merged.column_names(),
        preview: merged.head(preview_rows),
        left_rows: left.table.row_count(),
        right_rows: right.table.row_count(),
        left_unmatched,
    })
}

/// Mutable state of one relationship-mode merge.
struct FrontierMerge {
    result: Table,
    merged: HashSet<String>,
    /// `(table, column)` → name of that column in `result`.
    origins: HashMap<(String, String), String>,
    plan: Vec<MergeStep>,
    log: ActionLog,
    join_type: JoinType,
}

impl FrontierMerge {
    fn seeded(seed: &NamedTable, log: ActionLog, join_type: JoinType) -> Self {
        let origins = seed
            .table
            .column_names()
            .into_iter()
            .map(|column| ((seed.name.clone(), column.clone()), column))
            .collect();
        Self {
            result: seed.table.clone(),
            merged: HashSet::from([seed.name.clone()]),
            origins,
            plan: Vec::new(),
            log,
            join_type,
        }
    }

    fn is_merged(&self, table: &str) -> bool {
        self.merged.contains(table)
    }

    fn drop_settled_edges(&mut self, queue: &mut VecDeque<&Relationship>) {
        let merged = &self.merged;
        let log = &mut self.log;
        queue.retain(|edge| {
            let settled = merged.contains(&edge.from_table) && merged.contains(&edge.to_table);
            if settled {
                log.record(
                    "skip_edge",
                    None,
                    format!(
                        "Skipped {}.{} → {}.{}: both tables already merged",
                        edge.from_table, edge.from_column, edge.to_table, edge.to_column
                    ),
                );
            }
            !settled
        });
    }

    fn join_edge(&mut self, edge: &Relationship, by_name: &HashMap<&str, &NamedTable>) -> Result<()> {
        let (merged_side, incoming) = if self.is_merged(&edge.from_table) {
            ((&edge.from_table, &edge.from_column), (&edge.to_table, &edge.to_column))
        } else {
            ((&edge.to_table, &edge.to_column), (&edge.from_table, &edge.from_column))
        };
        let target = table_named(by_name, incoming.0)?;
        let left_key = self.resolve_result_column(merged_side.0, merged_side.1)?;
        let left_keys = vec![left_key];
        let right_keys = vec![incoming.1.clone()];
        let suffix = format!("_{}", target.name);
        let spec = JoinSpec {
            left_keys: &left_keys,
            right_keys: &right_keys,
            join_type: self.join_type,
            right_suffix: &suffix,
            left_label: RESULT_LABEL,
            right_label: &target.name,
        };

        let rows_before = self.result.row_count();
        let columns_before = self.result.column_count();
        self.result = join::join(&self.result, &target.table, &spec)?;
        let coalesced = left_keys[0] == right_keys[0];
        self.record_origins(
            target,
            columns_before,
            coalesced.then(|| (right_keys[0].as_str(), left_keys[0].as_str())),
        );
        let keys = if coalesced {
            left_keys.clone()
        } else {
            vec![format!("{}={}", left_keys[0], right_keys[0])]
        };
        self.log.record(
            "merge",
            None,
            format!(
                "Merged {} ({} rows) into result ({rows_before} rows) on {keys:?} ({} join) → {} rows",
                target.name,
                target.table.row_count(),
                self.join_type,
                self.result.row_count()
            ),
        );
        self.merged.insert(target.name.clone());
        self.plan.push(MergeStep {
            table: target.name.clone(),
            keys,
            join: self.join_type.to_string(),
            rows_before,
            rows_after: self.result.row_count(),
            columns_after: self.result.column_count(),
        });
        Ok(())
    }

    fn cross_join(&mut self, target: &NamedTable) -> Result<()> {
        let rows_before = self.result.row_count();
        let columns_before = self.result.column_count();
        let suffix = format!("_{}", target.name);
        self.result = join::cross_join(&self.result, &target.table, &suffix)?;
        self.record_origins(target, columns_before, None);
        self.log.warn(
            "cross_join_fallback",
            Some(&target.name),
            format!(
                "No relationship connects {} to the merged tables; cross-joined {} rows into result ({rows_before} rows) → {} rows",
                target.name,
                target.table.row_count(),
                self.result.row_count()
            ),
        );
        self.merged.insert(target.name.clone());
        self.plan.push(MergeStep {
            table: target.name.clone(),
            keys: Vec::new(),
            join: "cross".to_string(),
            rows_before,
            rows_after: self.result.row_count(),
            columns_after: self.result.column_count(),
        });
        Ok(())
    }

    /// Maps the columns of a freshly joined `target` onto the columns appended
    /// after `columns_before`. A key merged into an existing result column is
    /// given as `(target key, result column)`.
    fn record_origins(
        &mut self,
        target: &NamedTable,
        columns_before: usize,
        coalesced: Option<(&str, &str)>,
    ) {
        let mut appended = self.result.column_names().split_off(columns_before).into_iter();
        for column in target.table.column_names() {
            let result_name = match coalesced {
                Some((key, into)) if key == column => Some(into.to_string()),
                _ => appended.next(),
            };
            if let Some(result_name) = result_name {
                self.origins.insert((target.name.clone(), column), result_name);
            }
        }
    }

    /// Name of `table.column` inside the accumulated result; it differs from
    /// `column` when the column collided during an earlier join.
    fn resolve_result_column(&self, table: &str, column: &str) -> Result<String> {
        self.origins
            .get(&(table.to_string(), column.to_string()))
            .cloned()
            .ok_or_else(|| {
                BlendError::column_not_found(column, RESULT_LABEL, &self.result.column_names())
            })
    }
}

fn finish(result: Table, plan: Vec<MergeStep>, mut log: ActionLog) -> Result<MergeResult> {
    let summary = format!(
        "Final merged dataset: {} rows × {} columns",
        result.row_count(),
        result.column_count()
    );
    info!("{summary}");
    log.record("summary", None, summary);
    Ok(MergeResult {
        table: result,
        plan,
        log,
    })
}

pub(crate) fn apply_renames(
    tables: &[NamedTable],
    renames: &Renames,
    log: &mut ActionLog,
) -> Result<Vec<NamedTable>> {
    if let Some(unknown) = renames
        .keys()
        .find(|name| !tables.iter().any(|t| &t.name == *name))
    {
        return Err(BlendError::UnknownTable(unknown.clone()));
    }
    tables
        .iter()
        .map(|named| {
            let Some(mapping) = renames.get(&named.name).filter(|m| !m.is_empty()) else {
                return Ok(named.clone());
            };
            let table = named.table.rename_columns(mapping)?;
            let ordered: BTreeMap<_, _> = mapping.iter().collect();
            log.record(
                "column_mapping",
                None,
                format!(
                    "{}: renamed {}",
                    named.name,
                    ordered
                        .iter()
                        .map(|(old, new)| format!("{old}→{new}"))
                        .join(", ")
                ),
            );
            Ok(NamedTable::new(named.name.clone(), table))
        })
        .collect()
}

fn validate_flat_keys(tables: &[NamedTable], keys: &[String]) -> Result<()> {
    let missing = tables
        .iter()
        .filter_map(|named| {
            let absent = keys
                .iter()
                .filter(|key| !named.table.contains(key))
                .cloned()
                .collect::<Vec<_>>();
            (!absent.is_empty()).then(|| MissingKeys {
                table: named.name.clone(),
                keys: absent,
                available: named.table.column_names(),
            })
        })
        .collect::<Vec<_>>();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(BlendError::MissingMergeKeys(missing))
    }
}

fn table_named<'a>(by_name: &HashMap<&str, &'a NamedTable>, name: &str) -> Result<&'a NamedTable> {
    by_name
        .get(name)
        .copied()
        .ok_or_else(|| BlendError::UnknownTable(name.to_string()))
}

fn validate_edges(by_name: &HashMap<&str, &NamedTable>, edges: &[Relationship]) -> Result<()> {
    for edge in edges {
        for (table, column) in [
            (&edge.from_table, &edge.from_column),
            (&edge.to_table, &edge.to_column),
        ] {
            table_named(by_name, table)?.table.require_column(column, table)?;
        }
    }
    debug!("Validated {} relationship edge(s)", edges.len());
    Ok(())
}

/// Input tables with no undirected edge path to `seed`, in input order.
fn unreachable_tables(tables: &[NamedTable], edges: &[Relationship], seed: &str) -> Vec<String> {
    let mut reached: HashSet<&str> = HashSet::from([seed]);
    let mut frontier = vec![seed];
    while let Some(current) = frontier.pop() {
        for edge in edges {
            let neighbour = if edge.from_table == current {
                edge.to_table.as_str()
            } else if edge.to_table == current {
                edge.from_table.as_str()
            } else {
                continue;
            };
            if reached.insert(neighbour) {
                frontier.push(neighbour);
            }
        }
    }
    tables
        .iter()
        .filter(|t| !reached.contains(t.name.as_str()))
        .map(|t| t.name.clone())
        .collect()
}

fn key_positions(table: &Table, keys: &[String]) -> Vec<usize> {
    keys.iter()
        .filter_map(|key| table.column_index(key))
        .collect()
}
