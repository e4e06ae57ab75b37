//! Aligned plain-text rendering for terminal output.

use std::borrow::Cow;
use std::fmt::Write as _;

/// Column-aligned text table. Cells that parse as numbers are right-aligned.
#[derive(Debug, Clone, Default)]
pub struct TextTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn with_rows(mut self, rows: Vec<Vec<String>>) -> Self {
        self.rows = rows;
        self
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn render(&self) -> String {
        let column_count = self.headers.len();
        let mut widths = self
            .headers
            .iter()
            .map(|h| display_width(h).max(1))
            .collect::<Vec<_>>();
        for row in &self.rows {
            for (idx, cell) in row.iter().enumerate().take(column_count) {
                widths[idx] = widths[idx].max(display_width(&sanitize_cell(cell)));
            }
        }

        let mut output = String::new();
        let _ = writeln!(output, "{}", format_row(&self.headers, &widths, false));
        let rule = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
        let _ = writeln!(output, "{}", format_row(&rule, &widths, false));
        for row in &self.rows {
            let _ = writeln!(output, "{}", format_row(row, &widths, true));
        }
        output
    }

    pub fn print(&self) {
        print!("{}", self.render());
    }

    pub fn eprint(&self) {
        eprint!("{}", self.render());
    }
}

/// Prints a titled section; empty tables print a placeholder line.
pub fn print_section(title: &str, table: &TextTable) {
    println!("{title}");
    if table.is_empty() {
        println!("(none)");
    } else {
        table.print();
    }
    println!();
}

fn format_row(values: &[String], widths: &[usize], align_numbers: bool) -> String {
    let mut cells = Vec::with_capacity(widths.len());
    for (idx, width) in widths.iter().enumerate() {
        let value = values.get(idx).map(String::as_str).unwrap_or_default();
        let sanitized = sanitize_cell(value);
        let padding = " ".repeat(width.saturating_sub(display_width(&sanitized)));
        if align_numbers && looks_numeric(&sanitized) {
            cells.push(format!("{padding}{sanitized}"));
        } else {
            cells.push(format!("{sanitized}{padding}"));
        }
    }
    cells.join("  ").trim_end().to_string()
}

fn looks_numeric(value: &str) -> bool {
    !value.is_empty() && value.parse::<f64>().is_ok()
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_align_and_numbers_right_justify() {
        let table = TextTable::new(["column", "mean"]).with_rows(vec![
            vec!["amount".to_string(), "12.5".to_string()],
            vec!["qty".to_string(), "3".to_string()],
        ]);
        let rendered = table.render();
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "column  mean");
        assert_eq!(lines[1], "------  ----");
        assert_eq!(lines[2], "amount  12.5");
        assert_eq!(lines[3], "qty        3");
    }

    #[test]
    fn control_characters_are_flattened() {
        let table = TextTable::new(["note"]).with_rows(vec![vec!["a\nb".to_string()]]);
        assert!(table.render().contains("a b"));
    }
}
