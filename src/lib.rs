pub mod analyze;
pub mod audit;
pub mod cleaning;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod frame;
pub mod inference;
pub mod io_utils;
pub mod join;
pub mod keys;
pub mod merge;
pub mod relationships;
pub mod stats;
pub mod table;

use std::{
    collections::HashSet,
    env,
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use log::{LevelFilter, debug, info};
use serde::Serialize;

use crate::{
    audit::ActionLog,
    cli::{Cli, CleanArgs, Commands, InputOptions, KeysArgs, MergeArgs, RelateArgs},
    config::Settings,
    io_utils::LoadOptions,
    merge::{
        FlatMergeRequest, MergeStep, NamedTable, RelationshipMergeRequest, Renames,
    },
    relationships::{ProfiledTable, Relationship},
    table::TextTable,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_blend", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let settings = Settings::load_or_default(cli.config.as_deref())?;
    match cli.command {
        Commands::Analyze(args) => analyze::execute(&args, &settings),
        Commands::Clean(args) => handle_clean(&args, &settings),
        Commands::Keys(args) => handle_keys(&args, &settings),
        Commands::Relate(args) => handle_relate(&args, &settings),
        Commands::Merge(args) => handle_merge(&args, &settings),
        Commands::Stats(args) => stats::execute(&args, &settings),
    }
}

pub(crate) fn load_options(options: &InputOptions, settings: &Settings) -> Result<LoadOptions> {
    Ok(LoadOptions {
        delimiter: options.delimiter,
        encoding: io_utils::resolve_encoding(options.input_encoding.as_deref())?,
        max_rows: Some(options.max_rows.unwrap_or(settings.thresholds.max_rows)),
    })
}

fn handle_clean(args: &CleanArgs, settings: &Settings) -> Result<()> {
    let options = load_options(&args.input_options, settings)?;
    let table = io_utils::read_table(&args.input, &options)?;

    let mut config = settings.cleaning.clone();
    if let Some(strategy) = args.numeric_strategy {
        config.numeric_strategy = strategy;
    }
    if let Some(fill) = &args.categorical_fill {
        config.categorical_fill = fill.clone();
    }
    if !args.dedup_on.is_empty() {
        config.dedup_subset = Some(args.dedup_on.clone());
    }
    if let Some(method) = args.outliers {
        config.outlier_method = method;
    }
    if let Some(normalize) = args.normalize {
        config.normalize = normalize;
    }
    if args.date_format.is_some() {
        config.date_format = args.date_format.clone();
    }
    debug!("Cleaning configuration: {config:?}");

    let result = cleaning::clean(&table, &config, &settings.thresholds)
        .with_context(|| format!("Cleaning {:?}", args.input))?;
    write_output(&result.table, args.output.as_deref(), args.output_delimiter)?;
    report_log(args.log.as_deref(), &result.log, None)?;
    info!(
        "Cleaned {} row(s) into {} row(s)",
        table.row_count(),
        result.table.row_count()
    );
    Ok(())
}

fn handle_keys(args: &KeysArgs, settings: &Settings) -> Result<()> {
    let options = load_options(&args.input_options, settings)?;
    let table = io_utils::read_table(&args.input, &options)?;
    let profile = inference::profile(&table, &settings.thresholds);
    let candidates = keys::detect_candidate_keys(&table, &profile);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&candidates)?);
    } else {
        let rows = candidates
            .iter()
            .map(|c| {
                vec![
                    c.column.clone(),
                    match c.key_type {
                        keys::KeyType::Primary => "primary".to_string(),
                        keys::KeyType::Candidate => "candidate".to_string(),
                    },
                    format!("{:.4}", c.uniqueness_ratio),
                    c.reason.clone(),
                ]
            })
            .collect::<Vec<_>>();
        table::print_section(
            "Key candidates",
            &TextTable::new(["column", "key_type", "uniqueness", "reason"]).with_rows(rows),
        );
    }
    info!("Found {} key candidate(s)", candidates.len());
    Ok(())
}

fn handle_relate(args: &RelateArgs, settings: &Settings) -> Result<()> {
    let tables = load_named_tables(&args.inputs, &args.input_options, settings)?;
    let relationships = infer_relationships(&tables, settings);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&relationships)?);
    } else {
        table::print_section("Relationships", &relationship_table(&relationships));
    }
    info!(
        "Proposed {} relationship(s) across {} table(s)",
        relationships.len(),
        tables.len()
    );
    Ok(())
}

fn handle_merge(args: &MergeArgs, settings: &Settings) -> Result<()> {
    let tables = load_named_tables(&args.inputs, &args.input_options, settings)?;
    let renames = parse_renames(&args.renames)?;
    let join_type = args.how.unwrap_or(settings.merge.join_type);

    if let Some(rows) = args.preview {
        let [left, right, ..] = tables.as_slice() else {
            bail!("--preview needs at least two inputs");
        };
        let preview = merge::preview_merge(left, right, &args.on, join_type, &renames, rows)?;
        println!("{}", serde_json::to_string_pretty(&preview)?);
        return Ok(());
    }

    let relationship_mode = args.infer || !args.relationships.is_empty();
    let result = if relationship_mode {
        let mut edges = args
            .relationships
            .iter()
            .map(|spec| parse_relationship(spec))
            .collect::<Result<Vec<_>>>()?;
        if args.infer {
            let renamed = merge::apply_renames(&tables, &renames, &mut ActionLog::new())?;
            let inferred = infer_relationships(&renamed, settings);
            info!("Inferred {} relationship(s)", inferred.len());
            edges.extend(inferred);
        }
        let request = RelationshipMergeRequest {
            join_type,
            renames,
            allow_cross_join: settings.merge.allow_cross_join && !args.no_cross_join,
        };
        merge::merge_relationships(&tables, &edges, &request)?
    } else {
        let request = FlatMergeRequest {
            keys: args.on.clone(),
            join_type,
            renames,
        };
        merge::merge_flat(&tables, &request)?
    };

    write_output(&result.table, args.output.as_deref(), args.output_delimiter)?;
    report_log(args.log.as_deref(), &result.log, Some(&result.plan))?;
    info!(
        "Merged {} table(s) into {} row(s) × {} column(s)",
        tables.len(),
        result.table.row_count(),
        result.table.column_count()
    );
    Ok(())
}

fn infer_relationships(tables: &[NamedTable], settings: &Settings) -> Vec<Relationship> {
    let profiled = tables
        .iter()
        .map(|named| ProfiledTable {
            name: named.name.clone(),
            profile: inference::profile(&named.table, &settings.thresholds),
        })
        .collect::<Vec<_>>();
    relationships::resolve_relationships(&profiled)
}

fn relationship_table(relationships: &[Relationship]) -> TextTable {
    TextTable::new(["from", "to", "confidence", "reason"]).with_rows(
        relationships
            .iter()
            .map(|r| {
                vec![
                    format!("{}.{}", r.from_table, r.from_column),
                    format!("{}.{}", r.to_table, r.to_column),
                    format!("{:.2}", r.confidence),
                    r.reason.clone(),
                ]
            })
            .collect(),
    )
}

/// Loads every input and names it after its file stem, suffixing repeats.
fn load_named_tables(
    inputs: &[PathBuf],
    options: &InputOptions,
    settings: &Settings,
) -> Result<Vec<NamedTable>> {
    let load = load_options(options, settings)?;
    let mut taken = HashSet::new();
    inputs
        .iter()
        .enumerate()
        .map(|(idx, path)| {
            let table = io_utils::read_table(path, &load)?;
            let stem = table_name(path);
            let name = if taken.contains(&stem) {
                format!("{stem}_{}", idx + 1)
            } else {
                stem
            };
            taken.insert(name.clone());
            debug!("Loaded {:?} as table '{name}'", path);
            Ok(NamedTable::new(name, table))
        })
        .collect()
}

fn table_name(path: &Path) -> String {
    if io_utils::is_dash(path) {
        return "stdin".to_string();
    }
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Parses `table.column=table.column`, foreign key side first.
fn parse_relationship(spec: &str) -> Result<Relationship> {
    let (from, to) = spec
        .split_once('=')
        .ok_or_else(|| anyhow!("Relationship '{spec}' must look like table.column=table.column"))?;
    let (from_table, from_column) = parse_endpoint(from)?;
    let (to_table, to_column) = parse_endpoint(to)?;
    Ok(Relationship::manual(
        from_table, from_column, to_table, to_column,
    ))
}

fn parse_endpoint(side: &str) -> Result<(&str, &str)> {
    side.trim()
        .split_once('.')
        .filter(|(table, column)| !table.is_empty() && !column.is_empty())
        .ok_or_else(|| anyhow!("Relationship endpoint '{side}' must look like table.column"))
}

/// Parses repeated `table:old=new` arguments into per-table rename maps.
fn parse_renames(specs: &[String]) -> Result<Renames> {
    let mut renames = Renames::new();
    for spec in specs {
        let (table, mapping) = spec
            .split_once(':')
            .ok_or_else(|| anyhow!("Rename '{spec}' must look like table:old=new"))?;
        let (old, new) = mapping
            .split_once('=')
            .ok_or_else(|| anyhow!("Rename '{spec}' must look like table:old=new"))?;
        renames
            .entry(table.trim().to_string())
            .or_default()
            .insert(old.trim().to_string(), new.trim().to_string());
    }
    Ok(renames)
}

fn write_output(table: &frame::Table, output: Option<&Path>, delimiter: Option<u8>) -> Result<()> {
    let delimiter = delimiter.unwrap_or_else(|| {
        io_utils::resolve_output_delimiter(output, io_utils::DEFAULT_CSV_DELIMITER)
    });
    io_utils::write_table(table, output, delimiter)
        .with_context(|| format!("Writing output to {}", describe_output(output)))
}

fn describe_output(output: Option<&Path>) -> String {
    match output {
        Some(path) if !io_utils::is_dash(path) => format!("{path:?}"),
        _ => "stdout".to_string(),
    }
}

#[derive(Serialize)]
struct LogReport<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    plan: Option<&'a [MergeStep]>,
    log: &'a ActionLog,
}

/// Writes the log as JSON to `path`, or prints it to stderr so it never mixes
/// with table output on stdout.
fn report_log(path: Option<&Path>, log: &ActionLog, plan: Option<&[MergeStep]>) -> Result<()> {
    match path {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Creating log file {path:?}"))?;
            serde_json::to_writer_pretty(BufWriter::new(file), &LogReport { plan, log })
                .with_context(|| format!("Writing log to {path:?}"))?;
        }
        None => TextTable::new(ActionLog::headers())
            .with_rows(log.render_rows())
            .eprint(),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relationship_specs_parse_both_endpoints() {
        let edge = parse_relationship("orders.customer_id = customers.id").unwrap();
        assert_eq!(edge.from_table, "orders");
        assert_eq!(edge.from_column, "customer_id");
        assert_eq!(edge.to_table, "customers");
        assert_eq!(edge.to_column, "id");
        assert!(parse_relationship("orders.customer_id").is_err());
        assert!(parse_relationship("orders=customers.id").is_err());
    }

    #[test]
    fn renames_group_by_table() {
        let renames = parse_renames(&[
            "orders:cust=customer_id".to_string(),
            "orders:amt=amount".to_string(),
            "stores: city = town".to_string(),
        ])
        .unwrap();
        assert_eq!(renames["orders"].len(), 2);
        assert_eq!(renames["stores"]["city"], "town");
        assert!(parse_renames(&["orders".to_string()]).is_err());
    }

    #[test]
    fn table_names_come_from_file_stems() {
        assert_eq!(table_name(Path::new("data/orders.csv")), "orders");
        assert_eq!(table_name(Path::new("-")), "stdin");
    }
}
