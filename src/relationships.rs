//! Cross-table relationship discovery.
//!
//! Relationships are advisory: a shared key-like column name with matching
//! kinds on both sides is proposed as a foreign key → primary key edge.

use std::collections::BTreeSet;

use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    inference::{ColumnKind, TableProfile},
    keys::looks_like_key,
};

pub const NAME_MATCH_CONFIDENCE: f64 = 0.9;

/// Directed edge `from_table.from_column` (foreign key) → `to_table.to_column`
/// (primary key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub confidence: f64,
    pub reason: String,
}

impl Relationship {
    /// Edge built from explicit user input.
    pub fn manual(from_table: &str, from_column: &str, to_table: &str, to_column: &str) -> Self {
        Self {
            from_table: from_table.to_string(),
            from_column: from_column.to_string(),
            to_table: to_table.to_string(),
            to_column: to_column.to_string(),
            confidence: 1.0,
            reason: "Supplied manually".to_string(),
        }
    }

    /// Endpoint pair ordered so that `(a, b)` and `(b, a)` compare equal.
    fn endpoint_key(&self) -> ((String, String), (String, String)) {
        let from = (self.from_table.clone(), self.from_column.clone());
        let to = (self.to_table.clone(), self.to_column.clone());
        if from <= to { (from, to) } else { (to, from) }
    }
}

/// Metadata of one named input table.
#[derive(Debug, Clone)]
pub struct ProfiledTable {
    pub name: String,
    pub profile: TableProfile,
}

fn relatable_name(name: &str) -> bool {
    looks_like_key(name) || name.trim().to_lowercase().ends_with("_code")
}

pub fn resolve_relationships(tables: &[ProfiledTable]) -> Vec<Relationship> {
    let mut seen = BTreeSet::new();
    let mut relationships = Vec::new();

    for (left, right) in tables.iter().tuple_combinations() {
        for left_meta in left.profile.columns() {
            let Some(right_meta) = right.profile.get(&left_meta.name) else {
                continue;
            };
            let kind = left_meta.kind();
            if kind != right_meta.kind() || kind == ColumnKind::Empty {
                debug!(
                    "Skipping '{}' between {} and {}: kinds {} vs {}",
                    left_meta.name,
                    left.name,
                    right.name,
                    kind,
                    right_meta.kind()
                );
                continue;
            }
            if !relatable_name(&left_meta.name) {
                continue;
            }

            let (primary, foreign) = if right_meta.distinct_count > left_meta.distinct_count {
                ((right, right_meta), (left, left_meta))
            } else {
                ((left, left_meta), (right, right_meta))
            };
            let relationship = Relationship {
                from_table: foreign.0.name.clone(),
                from_column: foreign.1.name.clone(),
                to_table: primary.0.name.clone(),
                to_column: primary.1.name.clone(),
                confidence: NAME_MATCH_CONFIDENCE,
                reason: format!(
                    "Shared {kind} column '{}' ({} distinct in {}, {} in {})",
                    left_meta.name,
                    primary.1.distinct_count,
                    primary.0.name,
                    foreign.1.distinct_count,
                    foreign.0.name
                ),
            };
            if seen.insert(relationship.endpoint_key()) {
                relationships.push(relationship);
            }
        }
    }

    relationships.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    relationships
}
