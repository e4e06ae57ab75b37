//! I/O utilities for loading and writing tables as delimited text.
//!
//! All file I/O in csv-blend flows through this module:
//!
//! - **Delimiter resolution**: extension-based auto-detection (`.csv` → comma,
//!   `.tsv` → tab) with manual override support.
//! - **Encoding**: input decoding via `encoding_rs`, defaulting to UTF-8.
//! - **Admission control**: the configured row cap is enforced while reading,
//!   before any analysis runs.
//! - **stdin/stdout**: the `-` path convention routes through standard streams.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};
use log::debug;

use crate::{error::BlendError, frame::Table};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

/// How to read one input table.
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
    pub max_rows: Option<usize>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            encoding: UTF_8,
            max_rows: None,
        }
    }
}

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn resolve_output_delimiter(path: Option<&Path>, fallback: u8) -> u8 {
    match path.and_then(|p| p.extension()).and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        Some(ext) if ext.eq_ignore_ascii_case("csv") => DEFAULT_CSV_DELIMITER,
        _ => fallback,
    }
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(false);
    builder.from_reader(reader)
}

pub fn open_input(path: &Path) -> Result<Box<dyn Read>> {
    if is_dash(path) {
        Ok(Box::new(std::io::stdin().lock()))
    } else {
        Ok(Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
        )))
    }
}

pub fn open_csv_writer(path: Option<&Path>, delimiter: u8) -> Result<csv::Writer<Box<dyn Write>>> {
    let writer: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(std::io::stdout()),
    };
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    Ok(builder.from_writer(writer))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

/// Reads a whole delimited source into a [`Table`]. Fails with
/// [`BlendError::RowLimitExceeded`] as soon as the row cap is passed.
pub fn read_table_from<R: Read>(
    reader: R,
    delimiter: u8,
    encoding: &'static Encoding,
    max_rows: Option<usize>,
) -> Result<Table> {
    let mut reader = open_csv_reader(reader, delimiter);
    let header_record = reader.byte_headers().context("Reading header row")?.clone();
    let headers = decode_record(&header_record, encoding)?;
    let mut records = Vec::new();
    for (row_idx, record) in reader.byte_records().enumerate() {
        if let Some(limit) = max_rows
            && row_idx >= limit
        {
            return Err(BlendError::RowLimitExceeded { limit }.into());
        }
        let record = record.with_context(|| format!("Reading row {}", row_idx + 2))?;
        records.push(decode_record(&record, encoding)?);
    }
    debug!(
        "Read {} row(s) across {} column(s)",
        records.len(),
        headers.len()
    );
    Ok(Table::from_records(&headers, &records)?)
}

pub fn read_table(path: &Path, options: &LoadOptions) -> Result<Table> {
    let delimiter = resolve_input_delimiter(path, options.delimiter);
    let reader = open_input(path)?;
    read_table_from(reader, delimiter, options.encoding, options.max_rows)
        .with_context(|| format!("Loading table from {path:?}"))
}

pub fn write_table_to<W: Write>(writer: &mut csv::Writer<W>, table: &Table) -> Result<()> {
    writer
        .write_record(table.column_names())
        .context("Writing header row")?;
    for row in 0..table.row_count() {
        writer
            .write_record(table.display_row(row))
            .with_context(|| format!("Writing row {}", row + 2))?;
    }
    writer.flush().context("Flushing table output")?;
    Ok(())
}

pub fn write_table(table: &Table, path: Option<&Path>, delimiter: u8) -> Result<()> {
    let mut writer = open_csv_writer(path, delimiter)?;
    write_table_to(&mut writer, table)
}
