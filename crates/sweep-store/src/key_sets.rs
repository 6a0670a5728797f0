//! Key-set files: seed lists and per-round `FSA_LDU{n}.json` candidates.
//!
//! Accepted inputs for [`load_keys`]:
//! - JSON array of key strings
//! - JSON array of `{ "postal_code": .., "totalcount": .. }` objects
//! - CSV with a `postal_code` column (first column otherwise)
//! - plain text, one key per line

use crate::csv::parse_rows;
use crate::error::{Result, StoreError};
use crate::raw::write_atomic;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use sweep_core::{KeyError, SearchKey, CAP_SENTINEL};
use tracing::{debug, info, warn};

/// Which rows of a tabular key file to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFilter {
    /// Every key
    All,
    /// Only rows whose `totalcount` is the cap sentinel. Files without a
    /// count column are taken whole.
    CappedOnly,
}

/// Keys loaded from a file plus the entries that failed to parse.
#[derive(Debug, Default)]
pub struct LoadedKeys {
    /// Parsed keys in file order
    pub keys: Vec<SearchKey>,
    /// Rejected entries
    pub rejected: Vec<(String, KeyError)>,
}

impl LoadedKeys {
    fn push(&mut self, raw: &str) {
        match SearchKey::parse(raw) {
            Ok(key) => self.keys.push(key),
            Err(e) => {
                warn!(key = raw, error = %e, "skipping unparseable key");
                self.rejected.push((raw.to_string(), e));
            }
        }
    }
}

/// Load keys from a seed or summary file.
pub fn load_keys(path: &Path, filter: KeyFilter) -> Result<LoadedKeys> {
    let contents = fs::read_to_string(path).map_err(StoreError::io(path))?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let loaded = match extension.as_deref() {
        Some("json") => load_json(path, &contents, filter)?,
        Some("csv") => load_csv(path, &contents, filter)?,
        _ => {
            let mut loaded = LoadedKeys::default();
            for line in contents.lines().map(str::trim).filter(|l| !l.is_empty()) {
                loaded.push(line);
            }
            loaded
        }
    };

    info!(
        path = %path.display(),
        keys = loaded.keys.len(),
        rejected = loaded.rejected.len(),
        "loaded keys"
    );
    Ok(loaded)
}

fn load_json(path: &Path, contents: &str, filter: KeyFilter) -> Result<LoadedKeys> {
    let value: Value = serde_json::from_str(contents).map_err(StoreError::json(path))?;
    let Value::Array(items) = value else {
        return Err(StoreError::UnsupportedFormat {
            path: path.display().to_string(),
            reason: "expected a JSON array".to_string(),
        });
    };

    let mut loaded = LoadedKeys::default();
    for item in items {
        match item {
            Value::String(raw) => loaded.push(&raw),
            Value::Object(map) => {
                let Some(raw) = map.get("postal_code").and_then(Value::as_str) else {
                    continue;
                };
                let capped = map.get("totalcount").and_then(Value::as_i64) == Some(CAP_SENTINEL);
                if filter == KeyFilter::All || capped {
                    loaded.push(raw);
                }
            }
            other => {
                return Err(StoreError::UnsupportedFormat {
                    path: path.display().to_string(),
                    reason: format!("unexpected array element {other}"),
                })
            }
        }
    }
    Ok(loaded)
}

fn load_csv(path: &Path, contents: &str, filter: KeyFilter) -> Result<LoadedKeys> {
    let mut rows = parse_rows(contents).into_iter();
    let Some(header) = rows.next() else {
        return Ok(LoadedKeys::default());
    };

    let key_col = header.iter().position(|h| h.trim() == "postal_code");
    let count_col = header.iter().position(|h| h.trim() == "totalcount");
    if filter == KeyFilter::CappedOnly && count_col.is_none() {
        warn!(path = %path.display(), "no totalcount column, using all keys");
    }

    let mut loaded = LoadedKeys::default();
    if key_col.is_none() {
        // headerless file: the first row is data
        if let Some(raw) = header.first() {
            loaded.push(raw);
        }
    }
    let key_col = key_col.unwrap_or(0);

    for row in rows {
        let Some(raw) = row.get(key_col) else {
            continue;
        };
        if filter == KeyFilter::CappedOnly {
            if let Some(col) = count_col {
                let count = row.get(col).and_then(|c| c.trim().parse::<i64>().ok());
                if count != Some(CAP_SENTINEL) {
                    continue;
                }
            }
        }
        loaded.push(raw);
    }
    Ok(loaded)
}

/// Write a key set as a JSON array of compact keys to `<dir>/<name>.json`.
pub fn write_key_set(dir: &Path, name: &str, keys: &[SearchKey]) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(StoreError::io(dir))?;
    let path = dir.join(format!("{name}.json"));
    let contents = serde_json::to_vec(keys).map_err(StoreError::json(&path))?;
    write_atomic(&path, &contents)?;
    debug!(path = %path.display(), count = keys.len(), "saved key set");
    Ok(path)
}

/// Read a key set written by [`write_key_set`].
pub fn read_key_set(path: &Path) -> Result<Vec<SearchKey>> {
    let contents = fs::read(path).map_err(StoreError::io(path))?;
    serde_json::from_slice(&contents).map_err(StoreError::json(path))
}
