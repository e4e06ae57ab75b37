use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{
    config::{Normalization, NumericStrategy, OutlierMethod},
    join::JoinType,
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Infer column types, clean, and relationship-merge CSV tables",
    long_about = None
)]
pub struct Cli {
    /// YAML settings file with thresholds, cleaning and merge defaults
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Profile a CSV file: column kinds, summary statistics, correlations and a preview
    Analyze(AnalyzeArgs),
    /// Run the cleaning pipeline and write the cleaned table
    Clean(CleanArgs),
    /// List columns that look like primary or candidate keys
    Keys(KeysArgs),
    /// Propose key relationships between two or more CSV files
    Relate(RelateArgs),
    /// Merge CSV files on shared keys or on relationships
    Merge(MergeArgs),
    /// Produce summary statistics and correlations for numeric columns
    Stats(StatsArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct InputOptions {
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Reject inputs with more data rows than this (overrides the configured cap)
    #[arg(long = "max-rows")]
    pub max_rows: Option<usize>,
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Input CSV file to analyze ('-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    #[command(flatten)]
    pub input_options: InputOptions,
    /// Number of rows to include in the preview
    #[arg(long, default_value_t = 5)]
    pub preview: usize,
    /// Emit the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct CleanArgs {
    /// Input CSV file to clean ('-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Output file for the cleaned table (stdout when omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    #[command(flatten)]
    pub input_options: InputOptions,
    /// How to treat missing numeric values
    #[arg(long = "numeric-strategy", value_enum)]
    pub numeric_strategy: Option<NumericStrategy>,
    /// Literal used to fill missing categorical values
    #[arg(long = "fill")]
    pub categorical_fill: Option<String>,
    /// Columns that identify duplicates (defaults to the whole row)
    #[arg(long = "dedup-on", value_delimiter = ',')]
    pub dedup_on: Vec<String>,
    /// Outlier capping method
    #[arg(long = "outliers", value_enum)]
    pub outliers: Option<OutlierMethod>,
    /// Normalization applied to numeric columns
    #[arg(long, value_enum)]
    pub normalize: Option<Normalization>,
    /// strftime pattern used to rewrite parsed date columns (e.g. %Y-%m-%d)
    #[arg(long = "date-format")]
    pub date_format: Option<String>,
    /// Write the action log as JSON to this file instead of printing it
    #[arg(long = "log")]
    pub log: Option<PathBuf>,
    /// Delimiter for the output file
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
}

#[derive(Debug, Args)]
pub struct KeysArgs {
    /// Input CSV file ('-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    #[command(flatten)]
    pub input_options: InputOptions,
    /// Emit candidates as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct RelateArgs {
    /// Input CSV files; each table is named after its file stem
    #[arg(short = 'i', long = "input", required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,
    #[command(flatten)]
    pub input_options: InputOptions,
    /// Emit relationships as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct MergeArgs {
    /// Input CSV files in merge order; each table is named after its file stem
    #[arg(short = 'i', long = "input", required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,
    /// Output file for the merged table (stdout when omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    #[command(flatten)]
    pub input_options: InputOptions,
    /// Shared key columns for a flat merge
    #[arg(long = "on", value_delimiter = ',')]
    pub on: Vec<String>,
    /// Relationship edge `table.column=table.column` (foreign key first); repeatable
    #[arg(long = "relationship", action = clap::ArgAction::Append)]
    pub relationships: Vec<String>,
    /// Infer relationships between the inputs and merge along them
    #[arg(long)]
    pub infer: bool,
    /// Join type (inner, left, right, outer)
    #[arg(long = "how", value_parser = parse_join_type)]
    pub how: Option<JoinType>,
    /// Column rename `table:old=new` applied before joining; repeatable
    #[arg(long = "rename", action = clap::ArgAction::Append)]
    pub renames: Vec<String>,
    /// Fail instead of cross-joining tables no relationship reaches
    #[arg(long = "no-cross-join")]
    pub no_cross_join: bool,
    /// Print a trial merge of the first two inputs with this many rows instead of merging
    #[arg(long)]
    pub preview: Option<usize>,
    /// Write the merge plan and log as JSON to this file instead of printing them
    #[arg(long = "log")]
    pub log: Option<PathBuf>,
    /// Delimiter for the output file
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Input CSV file ('-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    #[command(flatten)]
    pub input_options: InputOptions,
    /// Print downsampled paired points for two numeric columns (`x,y`)
    #[arg(long, value_delimiter = ',', num_args = 2)]
    pub scatter: Vec<String>,
    /// Emit statistics as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

pub fn parse_join_type(value: &str) -> Result<JoinType, String> {
    value.parse::<JoinType>().map_err(|err| err.to_string())
}
