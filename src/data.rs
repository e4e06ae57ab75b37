use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub const DATETIME_DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const MISSING_TOKENS: &[&str] = &[
    "na", "n/a", "nan", "-nan", "null", "none", "#n/a", "<na>",
];

/// A single non-missing cell. Missing cells are `None` wherever a
/// `Option<Value>` appears.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
            Value::DateTime(dt) => dt.format(DATETIME_DISPLAY_FORMAT).to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Outcome of one datetime parse attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateParse {
    Parsed(NaiveDateTime),
    Unparsed { reason: &'static str },
}

impl DateParse {
    pub fn parsed(self) -> Option<NaiveDateTime> {
        match self {
            DateParse::Parsed(dt) => Some(dt),
            DateParse::Unparsed { .. } => None,
        }
    }
}

pub fn is_missing_token(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return true;
    }
    let lowered = trimmed.to_ascii_lowercase();
    MISSING_TOKENS.contains(&lowered.as_str())
}

pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|value| !value.is_nan())
}

/// Parses a date or timestamp in any of the common layouts, reading
/// ambiguous slash dates month first.
pub fn parse_datetime(raw: &str) -> DateParse {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
        "%Y/%m/%d %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
        "%m/%d/%Y %I:%M %p",
        "%d/%m/%Y %H:%M:%S",
        "%m-%d-%Y %H:%M:%S",
    ];
    const DATE_FORMATS: &[&str] = &[
        "%Y-%m-%d",
        "%m/%d/%Y",
        "%Y/%m/%d",
        "%m-%d-%Y",
        "%Y.%m.%d",
        "%m.%d.%Y",
        "%d/%m/%Y",
        "%d-%m-%Y",
        "%b %d, %Y",
        "%B %d, %Y",
        "%b %d %Y",
        "%B %d %Y",
        "%d %b %Y",
        "%d %B %Y",
        "%d-%b-%Y",
    ];

    let value = raw.trim();
    if value.is_empty() {
        return DateParse::Unparsed { reason: "empty" };
    }
    if !value.chars().any(|c| c.is_ascii_digit()) {
        return DateParse::Unparsed {
            reason: "no digits",
        };
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return DateParse::Parsed(parsed.naive_local());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return DateParse::Parsed(parsed);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return DateParse::Parsed(parsed.and_time(chrono::NaiveTime::MIN));
        }
    }
    DateParse::Unparsed {
        reason: "unrecognized layout",
    }
}

pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

/// Formats with `digits` significant digits, switching to exponent notation
/// for very large or small magnitudes.
pub fn format_significant(value: f64, digits: usize) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return value.to_string();
    }
    let digits = digits.max(1);
    let scientific = format!("{:.*e}", digits - 1, value);
    let exponent = scientific
        .rsplit_once('e')
        .and_then(|(_, exp)| exp.parse::<i32>().ok())
        .unwrap_or(0);
    if exponent < -4 || exponent >= digits as i32 {
        let (mantissa, _) = scientific.split_once('e').unwrap_or((&scientific, ""));
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{sign}{:02}",
            strip_trailing_zeros(mantissa),
            exponent.abs()
        )
    } else {
        let decimals = (digits as i32 - 1 - exponent).max(0) as usize;
        strip_trailing_zeros(&format!("{value:.decimals$}"))
    }
}

fn strip_trailing_zeros(text: &str) -> String {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text.to_string()
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Upper-cases the first letter of every alphabetic run and lower-cases the
/// rest, so `"new york"` and `"NEW YORK"` both become `"New York"`.
pub fn title_case(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let mut previous_cased = false;
    for ch in value.chars() {
        if ch.is_alphabetic() {
            if previous_cased {
                output.extend(ch.to_lowercase());
            } else {
                output.extend(ch.to_uppercase());
            }
            previous_cased = true;
        } else {
            output.push(ch);
            previous_cased = false;
        }
    }
    output
}

/// Linear-interpolated quantile of an ascending slice.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sample standard deviation (n - 1 denominator).
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = mean(values)?;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0);
    Some(variance.max(0.0).sqrt())
}

pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    quantile_sorted(&sorted, 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn parse_datetime_reads_slash_dates_month_first() {
        assert_eq!(
            parse_datetime("03/04/2024"),
            DateParse::Parsed(ymd(2024, 3, 4))
        );
        assert_eq!(
            parse_datetime("13/04/2024"),
            DateParse::Parsed(ymd(2024, 4, 13))
        );
    }

    #[test]
    fn parse_datetime_supports_iso_and_named_months() {
        assert_eq!(
            parse_datetime("2024-05-06"),
            DateParse::Parsed(ymd(2024, 5, 6))
        );
        assert_eq!(
            parse_datetime("May 6, 2024"),
            DateParse::Parsed(ymd(2024, 5, 6))
        );
        let with_time = parse_datetime("2024-05-06T14:30:00").parsed().unwrap();
        assert_eq!(with_time.format("%H:%M").to_string(), "14:30");
        assert!(parse_datetime("2024-05-06T14:30:00Z").parsed().is_some());
    }

    #[test]
    fn parse_datetime_reports_reason_for_failures() {
        assert!(matches!(
            parse_datetime("Chicago"),
            DateParse::Unparsed { reason: "no digits" }
        ));
        assert!(matches!(
            parse_datetime("A-1234"),
            DateParse::Unparsed { .. }
        ));
    }

    #[test]
    fn missing_tokens_are_case_insensitive() {
        assert!(is_missing_token("  "));
        assert!(is_missing_token("N/A"));
        assert!(is_missing_token("null"));
        assert!(!is_missing_token("0"));
    }

    #[test]
    fn title_case_capitalizes_each_word() {
        assert_eq!(title_case("ny"), "Ny");
        assert_eq!(title_case("NY"), "Ny");
        assert_eq!(title_case("New york"), "New York");
        assert_eq!(title_case("o'neil"), "O'Neil");
    }

    #[test]
    fn format_significant_matches_general_notation() {
        assert_eq!(format_significant(7.0, 4), "7");
        assert_eq!(format_significant(-1.0, 4), "-1");
        assert_eq!(format_significant(3.14159, 4), "3.142");
        assert_eq!(format_significant(123456.0, 4), "1.235e+05");
        assert_eq!(format_significant(0.00001234, 4), "1.234e-05");
    }

    #[test]
    fn quantiles_interpolate_linearly() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 100.0];
        assert_eq!(quantile_sorted(&sorted, 0.25), Some(2.0));
        assert_eq!(quantile_sorted(&sorted, 0.75), Some(4.0));
        assert_eq!(quantile_sorted(&[1.0, 2.0], 0.5), Some(1.5));
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
    }

    #[test]
    fn std_dev_uses_sample_denominator() {
        let std = std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((std - 2.138089935299395).abs() < 1e-12);
        assert_eq!(std_dev(&[1.0]), None);
    }

    #[test]
    fn numbers_display_without_trailing_fraction() {
        assert_eq!(Value::Number(3.0).as_display(), "3");
        assert_eq!(Value::Number(2.5).as_display(), "2.5");
        assert_eq!(
            Value::DateTime(ymd(2024, 1, 2)).as_display(),
            "2024-01-02 00:00:00"
        );
    }
}
