//! Initial-state table.
//!
//! Comma-separated text with a header row naming at least `start_location` and
//! `start_speed` (any order, other columns ignored). Blank lines and lines starting with
//! `#` are skipped. Every data row becomes one unit.

use std::path::Path;

use crate::error::{Error, Result};
use crate::unit::InitialState;

const LOCATION: &str = "start_location";
const SPEED: &str = "start_speed";

/// Parse the table from text.
pub fn parse_initial_states(text: &str) -> Result<Vec<InitialState>> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty() && !l.starts_with('#'));

    let (header_line, header) = lines.next().ok_or(Error::InitialData {
        line: 0,
        reason: "missing header row".into(),
    })?;
    let columns: Vec<String> = header
        .split(',')
        .map(|c| c.trim().trim_matches('"').to_ascii_lowercase())
        .collect();
    let find = |name: &str| {
        columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| Error::InitialData {
                line: header_line,
                reason: format!("header lacks a `{name}` column"),
            })
    };
    let loc_col = find(LOCATION)?;
    let speed_col = find(SPEED)?;

    let mut out = Vec::new();
    for (line, row) in lines {
        let fields: Vec<&str> = row.split(',').map(str::trim).collect();
        let field = |col: usize, name: &str| -> Result<f64> {
            let raw = fields.get(col).ok_or_else(|| Error::InitialData {
                line,
                reason: format!("missing `{name}` value"),
            })?;
            let v: f64 = raw.trim_matches('"').parse().map_err(|_| Error::InitialData {
                line,
                reason: format!("`{name}` is not a number: {raw:?}"),
            })?;
            if v.is_finite() {
                Ok(v)
            } else {
                Err(Error::InitialData {
                    line,
                    reason: format!("`{name}` must be finite"),
                })
            }
        };
        out.push(InitialState {
            location: field(loc_col, LOCATION)?,
            speed: field(speed_col, SPEED)?,
        });
    }
    tracing::debug!(units = out.len(), "initial states parsed");
    Ok(out)
}

/// Read and parse the table from a file.
pub fn read_initial_states(path: impl AsRef<Path>) -> Result<Vec<InitialState>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_initial_states(&text)
}
