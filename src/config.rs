//! Immutable configuration values passed explicitly into every core call.
//!
//! [`Settings`] groups the classification [`Thresholds`], the default
//! [`CleanConfig`] and the merge defaults. It can be loaded from a YAML file;
//! absent keys fall back to the built-in defaults, and command-line flags
//! override whatever the file provides.

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::join::JoinType;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Thresholds {
    /// Numeric columns below this distinct/non-missing ratio may be categorical.
    pub categorical_unique_ratio: f64,
    pub categorical_max_unique: usize,
    pub top_n_categories: usize,
    pub correlation_threshold: f64,
    pub max_correlation_pairs: usize,
    pub max_sample_points: usize,
    pub datetime_parse_success: f64,
    pub cleaner_datetime_parse_success: f64,
    pub iqr_factor: f64,
    pub zscore_threshold: f64,
    pub max_rows: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            categorical_unique_ratio: 0.3,
            categorical_max_unique: 30,
            top_n_categories: 15,
            correlation_threshold: 0.5,
            max_correlation_pairs: 4,
            max_sample_points: 500,
            datetime_parse_success: 0.7,
            cleaner_datetime_parse_success: 0.6,
            iqr_factor: 1.5,
            zscore_threshold: 3.0,
            max_rows: 500_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NumericStrategy {
    Mean,
    #[default]
    Median,
    Drop,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutlierMethod {
    #[default]
    Iqr,
    Zscore,
    None,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    Minmax,
    Zscore,
    #[default]
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CleanConfig {
    pub numeric_strategy: NumericStrategy,
    pub categorical_fill: String,
    /// `None` deduplicates on the whole row.
    pub dedup_subset: Option<Vec<String>>,
    pub outlier_method: OutlierMethod,
    pub normalize: Normalization,
    /// chrono `strftime` pattern applied to parsed date columns.
    pub date_format: Option<String>,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            numeric_strategy: NumericStrategy::default(),
            categorical_fill: "Unknown".to_string(),
            dedup_subset: None,
            outlier_method: OutlierMethod::default(),
            normalize: Normalization::default(),
            date_format: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MergeDefaults {
    pub join_type: JoinType,
    pub allow_cross_join: bool,
}

impl Default for MergeDefaults {
    fn default() -> Self {
        Self {
            join_type: JoinType::Inner,
            allow_cross_join: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub thresholds: Thresholds,
    pub cleaning: CleanConfig,
    pub merge: MergeDefaults,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening settings file {path:?}"))?;
        let reader = BufReader::new(file);
        let settings = serde_yaml::from_reader(reader)
            .with_context(|| format!("Parsing settings YAML {path:?}"))?;
        Ok(settings)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Settings::load(path),
            None => Ok(Settings::default()),
        }
    }
}
