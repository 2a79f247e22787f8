use std::io::Cursor;
use std::path::Path;

use encoding_rs::GBK;
use polars::prelude::*;

use crate::error::{FlowError, Result};

/// Read a CSV file with all columns as String dtype.
/// Trims whitespace from column names.
pub fn read_csv_as_strings(path: &Path) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0)) // all columns as String
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    trim_column_names(df)
}

/// Read the first column of a header-less CSV file, skipping nulls and blanks.
pub fn read_single_column(path: &Path) -> Result<Vec<String>> {
    let df = CsvReadOptions::default()
        .with_has_header(false)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    let first = df
        .get_columns()
        .first()
        .ok_or_else(|| FlowError::InvalidData(format!("{} has no columns", path.display())))?;
    Ok(first
        .str()?
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect())
}

/// A legacy-encoded CSV decoded to a string frame, plus how many malformed
/// lines were dropped on the way in.
pub struct LegacyCsv {
    pub frame: DataFrame,
    pub bad_lines: usize,
}

/// Read a GBK-encoded CSV file, tolerating malformed lines.
///
/// Quoted fields may span physical lines. Records with more fields than the
/// header, or with a quote left open at end of file, are dropped and counted
/// instead of failing the read. Short records are padded with empty fields.
pub fn read_gbk_csv_lossy(path: &Path) -> Result<LegacyCsv> {
    let bytes = std::fs::read(path)?;
    let (text, _, had_errors) = GBK.decode(&bytes);
    if had_errors {
        tracing::debug!(path = %path.display(), "undecodable GBK sequences replaced");
    }

    let mut records = split_records(&text).into_iter();
    let header = records
        .next()
        .ok_or_else(|| FlowError::InvalidData(format!("{} is empty", path.display())))?;
    let expected = field_count(&header)
        .ok_or_else(|| FlowError::InvalidData(format!("{} has a malformed header", path.display())))?;

    let mut cleaned = String::with_capacity(text.len());
    cleaned.push_str(&header);
    cleaned.push('\n');
    let mut bad_lines = 0;
    for record in records {
        match field_count(&record) {
            Some(n) if n <= expected => {
                cleaned.push_str(&record);
                for _ in n..expected {
                    cleaned.push(',');
                }
                cleaned.push('\n');
            }
            _ => bad_lines += 1,
        }
    }

    let frame = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(Cursor::new(cleaned.into_bytes()))
        .finish()?;

    Ok(LegacyCsv {
        frame: trim_column_names(frame)?,
        bad_lines,
    })
}

/// Group physical lines into CSV records, joining lines while a quoted
/// field is open. Blank lines between records are skipped.
fn split_records(text: &str) -> Vec<String> {
    let mut records = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for line in text.lines() {
        if !in_quotes && line.trim().is_empty() {
            continue;
        }
        if in_quotes {
            current.push('\n');
        }
        current.push_str(line);
        in_quotes ^= line.matches('"').count() % 2 == 1;
        if !in_quotes {
            records.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        records.push(current);
    }
    records
}

/// Count comma-separated fields outside double quotes.
/// Returns `None` when a quoted field is left open.
fn field_count(record: &str) -> Option<usize> {
    let mut in_quotes = false;
    let mut fields = 1;
    for c in record.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields += 1,
            _ => {}
        }
    }
    (!in_quotes).then_some(fields)
}

/// Write a frame as UTF-8 CSV with header, creating parent directories.
pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut file = std::fs::File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}

pub fn require_columns(df: &DataFrame, required: &[&str]) -> Result<()> {
    for &col_name in required {
        if df.column(col_name).is_err() {
            return Err(FlowError::MissingColumn(col_name.to_string()));
        }
    }
    Ok(())
}

/// Parse an administrative code cell such as `"110101"`, `" 110101 "` or
/// `"110101.0"` into an integer.
pub fn parse_code(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let digits = match raw.split_once('.') {
        Some((int_part, frac)) if frac.chars().all(|c| c == '0') => int_part,
        Some(_) => return None,
        None => raw,
    };
    digits.parse().ok()
}

fn trim_column_names(mut df: DataFrame) -> Result<DataFrame> {
    let trimmed: Vec<String> = df
        .get_column_names_str()
        .iter()
        .map(|c| c.trim().trim_start_matches('\u{feff}').to_string())
        .collect();
    df.set_column_names(trimmed.as_slice())?;
    Ok(df)
}
