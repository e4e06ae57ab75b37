use serde::{Deserialize, Serialize};

use crate::{
    frame::{ColumnData, Table},
    inference::{ColumnKind, TableProfile},
};

const PRIMARY_KEY_RATIO: f64 = 0.95;
const HIGH_UNIQUENESS_RATIO: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Primary,
    Candidate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyCandidate {
    pub column: String,
    pub key_type: KeyType,
    pub uniqueness_ratio: f64,
    pub reason: String,
}

/// `id`, `*id` and `*_key` names.
pub fn looks_like_key(name: &str) -> bool {
    let lowered = name.trim().to_lowercase();
    lowered == "id" || lowered.ends_with("id") || lowered.ends_with("_key")
}

/// Flags columns that look like primary or candidate keys, in column order.
///
/// A column can be reported twice: once by the name rule and once by the
/// uniqueness rule.
pub fn detect_candidate_keys(table: &Table, profile: &TableProfile) -> Vec<KeyCandidate> {
    let rows = table.row_count();
    let mut candidates = Vec::new();
    if rows == 0 {
        return candidates;
    }

    for column in table.columns() {
        let distinct = match profile.get(&column.name) {
            Some(meta) if meta.kind() == ColumnKind::Empty => continue,
            Some(meta) => meta.distinct_count,
            None if column.data.missing_count() == rows => continue,
            None => column.data.distinct_count(),
        };
        let ratio = distinct as f64 / rows as f64;
        let numeric = matches!(column.data, ColumnData::Number(_));
        let percent = ratio * 100.0;

        if numeric && looks_like_key(&column.name) {
            let (key_type, reason) = if ratio > PRIMARY_KEY_RATIO {
                (
                    KeyType::Primary,
                    format!("Key-like name with {percent:.1}% unique values"),
                )
            } else {
                (
                    KeyType::Candidate,
                    format!("Key-like name, {percent:.1}% unique; possible foreign key"),
                )
            };
            candidates.push(KeyCandidate {
                column: column.name.clone(),
                key_type,
                uniqueness_ratio: ratio,
                reason,
            });
        }

        if numeric && ratio > HIGH_UNIQUENESS_RATIO {
            candidates.push(KeyCandidate {
                column: column.name.clone(),
                key_type: KeyType::Candidate,
                uniqueness_ratio: ratio,
                reason: format!("High uniqueness ({percent:.1}% unique values)"),
            });
        }
    }
    candidates
}
