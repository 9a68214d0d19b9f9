//! Snapshot loading and field normalization for the roster cleanser.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use roster_core::{RawRecord, COLUMNS};
use thiserror::Error;
use tracing::{info, warn};

mod literal;
mod normalize;
#[cfg(test)]
mod test_support;

pub use literal::{parse_list_literal, LiteralError};
pub use normalize::{
    ascii_clean, filter_identifiers, is_track_id, normalize_date, normalize_name, normalize_record, normalize_records,
    parse_identifier_list, parse_list_field, split_identifiers, IdentifierSplit, NormalizeReport,
    TRACK_ID_LEN,
};

pub const CRATE_NAME: &str = "roster-source";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("source file not found: {}", path.display())]
    SourceNotFound { path: PathBuf },
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("source schema is missing required columns: {}", missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },
    #[error("malformed csv near line {line}: {source}")]
    Malformed {
        line: u64,
        #[source]
        source: csv::Error,
    },
    #[error("row at line {line} has {found} cells but the header has {expected}")]
    RaggedRow {
        line: u64,
        expected: usize,
        found: usize,
    },
}

/// Reads a snapshot file into raw rows.
pub async fn load(path: impl AsRef<Path>) -> Result<Vec<RawRecord>, LoadError> {
    let path = path.as_ref();
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(LoadError::SourceNotFound {
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(LoadError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let records = parse_snapshot(&bytes)?;
    info!(path = %path.display(), rows = records.len(), "read source snapshot");
    Ok(records)
}

/// Parses snapshot bytes. Invalid UTF-8 is replaced rather than rejected.
pub fn parse_snapshot(bytes: &[u8]) -> Result<Vec<RawRecord>, LoadError> {
    let decoded = decode(bytes);
    let text = decoded
        .strip_prefix('\u{feff}')
        .unwrap_or(decoded.as_ref());

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|source| LoadError::Malformed { line: 1, source })?
        .clone();
    if headers.iter().all(str::is_empty) {
        return Ok(Vec::new());
    }

    let positions = column_positions(&headers)?;

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result.map_err(|source| LoadError::Malformed {
            line: source.position().map(|p| p.line()).unwrap_or_default(),
            source,
        })?;
        if row.iter().all(str::is_empty) {
            warn!(
                line = row.position().map(|p| p.line()).unwrap_or_default(),
                "skipping row with no values"
            );
            continue;
        }
        if row.len() > headers.len() {
            return Err(LoadError::RaggedRow {
                line: row.position().map(|p| p.line()).unwrap_or_default(),
                expected: headers.len(),
                found: row.len(),
            });
        }
        let cells = positions.map(|pos| row.get(pos).and_then(text_or_none));
        records.push(RawRecord::from_cells(cells));
    }
    Ok(records)
}

fn decode(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(err) => {
            warn!(
                valid_up_to = err.valid_up_to(),
                "source is not valid UTF-8; decoding with replacement characters"
            );
            String::from_utf8_lossy(bytes)
        }
    }
}

fn column_positions(headers: &csv::StringRecord) -> Result<[usize; 13], LoadError> {
    let mut positions = [0usize; 13];
    let mut missing = Vec::new();
    for (slot, column) in positions.iter_mut().zip(COLUMNS) {
        match headers.iter().position(|h| h == column) {
            Some(pos) => *slot = pos,
            None => missing.push(column.to_string()),
        }
    }
    if !missing.is_empty() {
        return Err(LoadError::SchemaMismatch { missing });
    }

    let extra = headers
        .iter()
        .filter(|h| !COLUMNS.contains(h))
        .collect::<Vec<_>>();
    if !extra.is_empty() {
        warn!(columns = ?extra, "ignoring unknown source columns");
    }
    Ok(positions)
}

fn text_or_none(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
