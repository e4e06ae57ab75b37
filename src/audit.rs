use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Info,
    Warning,
}

/// One action taken by the cleaner or merge planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub action: String,
    pub column: Option<String>,
    pub detail: String,
    #[serde(default)]
    pub level: LogLevel,
}

/// Append-only audit trail for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionLog {
    entries: Vec<LogEntry>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, action: &str, column: Option<&str>, detail: impl Into<String>) {
        self.push(action, column, detail.into(), LogLevel::Info);
    }

    pub fn warn(&mut self, action: &str, column: Option<&str>, detail: impl Into<String>) {
        let detail = detail.into();
        log::warn!("{action}: {detail}");
        self.push(action, column, detail, LogLevel::Warning);
    }

    fn push(&mut self, action: &str, column: Option<&str>, detail: String, level: LogLevel) {
        log::debug!("{action} [{}] {detail}", column.unwrap_or("-"));
        self.entries.push(LogEntry {
            action: action.to_string(),
            column: column.map(str::to_string),
            detail,
            level,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn actions(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.action.as_str()).collect()
    }

    pub fn find(&self, action: &str) -> Option<&LogEntry> {
        self.entries.iter().find(|e| e.action == action)
    }

    pub fn has_warnings(&self) -> bool {
        self.entries.iter().any(|e| e.level == LogLevel::Warning)
    }

    pub fn render_rows(&self) -> Vec<Vec<String>> {
        self.entries
            .iter()
            .map(|entry| {
                vec![
                    match entry.level {
                        LogLevel::Info => "info".to_string(),
                        LogLevel::Warning => "WARNING".to_string(),
                    },
                    entry.action.clone(),
                    entry.column.clone().unwrap_or_default(),
                    entry.detail.clone(),
                ]
            })
            .collect()
    }

    pub fn headers() -> Vec<String> {
        ["level", "action", "column", "detail"]
            .iter()
            .map(|h| h.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_keep_insertion_order_and_level() {
        let mut log = ActionLog::new();
        log.record("impute_median", Some("age"), "Filled 2 missing with median=30");
        log.warn("cross_join_fallback", None, "stores is unreachable");
        assert_eq!(log.actions(), vec!["impute_median", "cross_join_fallback"]);
        assert!(log.has_warnings());
        assert_eq!(log.render_rows()[1][0], "WARNING");
    }

    #[test]
    fn serializes_as_plain_list() {
        let mut log = ActionLog::new();
        log.record("summary", None, "done");
        let json = serde_json::to_string(&log).unwrap();
        assert_eq!(
            json,
            r#"[{"action":"summary","column":null,"detail":"done","level":"info"}]"#
        );
    }
}
