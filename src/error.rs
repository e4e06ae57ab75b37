//! Typed failures raised by the core (inference, cleaning, merging).
//!
//! Command handlers wrap these in `anyhow` with file context; library callers
//! can match on the variants directly.

use thiserror::Error;

use crate::join::JoinType;

pub type Result<T, E = BlendError> = std::result::Result<T, E>;

/// Keys requested for a merge that a particular input table does not carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingKeys {
    pub table: String,
    pub keys: Vec<String>,
    pub available: Vec<String>,
}

#[derive(Debug, Error)]
pub enum BlendError {
    #[error(
        "Column '{column}' not found in {table}. Available columns: {names}",
        names = .available.join(", ")
    )]
    ColumnNotFound {
        column: String,
        table: String,
        available: Vec<String>,
    },
    #[error(
        "Invalid join type '{0}'. Must be one of: {names}",
        names = JoinType::names().join(", ")
    )]
    InvalidJoinType(String),
    #[error("No tables to merge")]
    NoTables,
    #[error("No merge keys specified{hint}", hint = common_hint(.common))]
    NoMergeKeys { common: Vec<String> },
    #[error("No relationships supplied for a relationship merge")]
    NoRelationships,
    #[error("Merge key(s) not found: {missing}", missing = describe_missing(.0))]
    MissingMergeKeys(Vec<MissingKeys>),
    #[error(
        "Type mismatch for join key '{left_column}' ({left_kind}) vs '{right_column}' ({right_kind})"
    )]
    KeyTypeMismatch {
        left_column: String,
        left_kind: &'static str,
        right_column: String,
        right_kind: &'static str,
    },
    #[error("Table exceeds the maximum of {limit} rows. Please use a smaller file.")]
    RowLimitExceeded { limit: usize },
    #[error(
        "Tables {names} are not reachable through any relationship and cross-join fallback is disabled",
        names = .unreachable.join(", ")
    )]
    AmbiguousMergeTarget { unreachable: Vec<String> },
    #[error("Relationship merge did not settle within {limit} passes ({remaining} edge(s) left)")]
    MergeIterationLimit { limit: usize, remaining: usize },
    #[error("Relationship references unknown table '{0}'")]
    UnknownTable(String),
    #[error("Column '{column}' has {found} value(s); expected {expected}")]
    RaggedColumns {
        column: String,
        expected: usize,
        found: usize,
    },
    #[error("Duplicate column name '{0}'")]
    DuplicateColumn(String),
}

impl BlendError {
    pub fn column_not_found(column: &str, table: &str, available: &[String]) -> Self {
        BlendError::ColumnNotFound {
            column: column.to_string(),
            table: table.to_string(),
            available: available.to_vec(),
        }
    }
}

fn common_hint(common: &[String]) -> String {
    if common.is_empty() {
        String::new()
    } else {
        format!(" (columns shared by all tables: {})", common.join(", "))
    }
}

fn describe_missing(missing: &[MissingKeys]) -> String {
    missing
        .iter()
        .map(|entry| {
            format!(
                "{:?} missing from {} (available columns: {:?})",
                entry.keys, entry.table, entry.available
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_not_found_lists_available_columns() {
        let err = BlendError::column_not_found(
            "amount",
            "orders",
            &["id".to_string(), "total".to_string()],
        );
        let message = err.to_string();
        assert!(message.contains("'amount'"));
        assert!(message.contains("id, total"));
    }

    #[test]
    fn invalid_join_type_enumerates_valid_choices() {
        let message = BlendError::InvalidJoinType("sideways".into()).to_string();
        assert!(message.contains("inner, left, right, outer"), "{message}");
    }

    #[test]
    fn missing_keys_name_each_table() {
        let err = BlendError::MissingMergeKeys(vec![MissingKeys {
            table: "CSV #2".into(),
            keys: vec!["customer_id".into()],
            available: vec!["id".into()],
        }]);
        let message = err.to_string();
        assert!(message.contains("CSV #2"));
        assert!(message.contains("customer_id"));
    }
}
