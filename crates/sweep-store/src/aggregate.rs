//! Summary and detail projections of the raw store.
//!
//! The summary has one row per searched key. The detail table has one row per
//! physician, deduplicated by the configured identifier (first seen wins,
//! in sorted file order), with phone fields normalised.

use crate::csv::write_row;
use crate::error::{Result, StoreError};
use crate::raw::{write_atomic, RawStore};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use sweep_core::{DetailRecord, QueryResult, SearchKey, StorageConfig};
use tracing::{info, warn};

/// Summary file name.
pub const SUMMARY_FILE: &str = "summary.csv";

/// Detail file name.
pub const DETAILS_FILE: &str = "details.csv";

/// Field names and markers used while projecting detail records.
#[derive(Debug, Clone)]
pub struct AggregateOptions {
    /// Unique identifier field
    pub id_field: String,
    /// Fields normalised as phone numbers
    pub phone_fields: Vec<String>,
    /// Value for phone fields that cannot be normalised
    pub unformattable_marker: String,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self::from(&StorageConfig::default())
    }
}

impl From<&StorageConfig> for AggregateOptions {
    fn from(config: &StorageConfig) -> Self {
        Self {
            id_field: config.id_field.clone(),
            phone_fields: config.phone_fields.clone(),
            unformattable_marker: config.unformattable_marker.clone(),
        }
    }
}

/// One summary row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    /// Searched key
    pub postal_code: SearchKey,
    /// Reported count (`-1` = capped)
    pub totalcount: i64,
}

/// Deduplicated detail rows with the union of their columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailTable {
    /// Column names in first-seen order
    pub columns: Vec<String>,
    /// Rows after deduplication and phone normalisation
    pub rows: Vec<DetailRecord>,
}

impl DetailTable {
    /// Render a row as CSV cells aligned with `columns`.
    #[must_use]
    pub fn cells(&self, row: &DetailRecord) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| row.get(column).map(render_cell).unwrap_or_default())
            .collect()
    }
}

/// Both projections of the raw store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregate {
    /// One row per key, sorted by key
    pub summary: Vec<SummaryRow>,
    /// Deduplicated detail rows
    pub details: DetailTable,
    /// Detail rows seen before deduplication
    pub detail_rows_seen: usize,
    /// Record files that could not be read
    pub skipped_files: Vec<PathBuf>,
}

/// Scan the raw store and build both projections.
///
/// Unreadable or malformed record files are logged and skipped.
pub fn aggregate(store: &RawStore, options: &AggregateOptions) -> Result<Aggregate> {
    let files = store.record_files()?;
    info!(count = files.len(), root = %store.root().display(), "aggregating raw records");

    let mut results = Vec::with_capacity(files.len());
    let mut skipped_files = Vec::new();
    for path in files {
        match RawStore::read_record(&path) {
            Ok(result) => results.push(result),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable record");
                skipped_files.push(path);
            }
        }
    }

    let mut tables = aggregate_results(results, options);
    tables.skipped_files = skipped_files;
    Ok(tables)
}

/// Build both projections from results in the given order.
pub fn aggregate_results<I>(results: I, options: &AggregateOptions) -> Aggregate
where
    I: IntoIterator<Item = QueryResult>,
{
    let mut summary: HashMap<SearchKey, i64> = HashMap::new();
    let mut seen_ids = HashSet::new();
    let mut details = DetailTable::default();
    let mut known_columns = HashSet::new();
    let mut detail_rows_seen = 0;

    for result in results {
        summary
            .entry(result.postal_code.clone())
            .or_insert(result.totalcount);

        for mut record in result.results {
            detail_rows_seen += 1;
            if let Some(id) = record.id(&options.id_field) {
                if !seen_ids.insert(id) {
                    continue;
                }
            }

            normalise_phones(&mut record, options);
            for field in record.fields() {
                if known_columns.insert(field.to_string()) {
                    details.columns.push(field.to_string());
                }
            }
            details.rows.push(record);
        }
    }

    let mut summary: Vec<SummaryRow> = summary
        .into_iter()
        .map(|(postal_code, totalcount)| SummaryRow {
            postal_code,
            totalcount,
        })
        .collect();
    summary.sort_by(|a, b| a.postal_code.cmp(&b.postal_code));

    Aggregate {
        summary,
        details,
        detail_rows_seen,
        skipped_files: Vec::new(),
    }
}

fn normalise_phones(record: &mut DetailRecord, options: &AggregateOptions) {
    for field in &options.phone_fields {
        let Some(value) = record.get(field) else {
            continue;
        };
        let raw = match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        let formatted = format_phone(&raw).unwrap_or_else(|| options.unformattable_marker.clone());
        record.set(field, Value::String(formatted));
    }
}

/// Format a phone number as `(NNN) NNN-NNNN`.
///
/// Returns `None` unless exactly ten digits remain after stripping every
/// non-digit character.
#[must_use]
pub fn format_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() != 10 {
        return None;
    }
    Some(format!(
        "({}) {}-{}",
        &digits[..3],
        &digits[3..6],
        &digits[6..]
    ))
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Paths written by [`write_outputs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    /// `summary.csv`
    pub summary: PathBuf,
    /// `details.csv`, absent when there were no detail rows
    pub details: Option<PathBuf>,
}

/// Write `summary.csv` and `details.csv` into `dir`.
pub fn write_outputs(dir: &Path, tables: &Aggregate) -> Result<OutputPaths> {
    fs::create_dir_all(dir).map_err(StoreError::io(dir))?;

    let summary_path = dir.join(SUMMARY_FILE);
    let mut buf = Vec::new();
    write_row(&mut buf, &["postal_code", "totalcount"]).map_err(StoreError::io(&summary_path))?;
    for row in &tables.summary {
        write_row(
            &mut buf,
            &[row.postal_code.to_string(), row.totalcount.to_string()],
        )
        .map_err(StoreError::io(&summary_path))?;
    }
    write_atomic(&summary_path, &buf)?;
    info!(path = %summary_path.display(), rows = tables.summary.len(), "saved summary");

    if tables.details.rows.is_empty() {
        info!("no detail records found");
        return Ok(OutputPaths {
            summary: summary_path,
            details: None,
        });
    }

    let details_path = dir.join(DETAILS_FILE);
    let mut buf = Vec::new();
    write_row(&mut buf, tables.details.columns.as_slice())
        .map_err(StoreError::io(&details_path))?;
    for row in &tables.details.rows {
        write_row(&mut buf, tables.details.cells(row).as_slice())
            .map_err(StoreError::io(&details_path))?;
    }
    write_atomic(&details_path, &buf)?;
    info!(
        path = %details_path.display(),
        rows = tables.details.rows.len(),
        "saved details"
    );

    Ok(OutputPaths {
        summary: summary_path,
        details: Some(details_path),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn record(value: Value) -> DetailRecord {
        match value {
            Value::Object(map) => DetailRecord(map),
            _ => panic!("test record must be an object"),
        }
    }

    fn result(key: &str, totalcount: i64, rows: Vec<DetailRecord>) -> QueryResult {
        QueryResult {
            postal_code: SearchKey::parse(key).expect("valid key"),
            totalcount,
            results: rows,
            extra: Map::new(),
        }
    }

    #[test]
    fn test_format_phone() {
        assert_eq!(format_phone("416-555-1234").as_deref(), Some("(416) 555-1234"));
        assert_eq!(format_phone("(416) 555-1234").as_deref(), Some("(416) 555-1234"));
        assert_eq!(format_phone("416.555.1234 ").as_deref(), Some("(416) 555-1234"));
        assert_eq!(format_phone("12345"), None);
        assert_eq!(format_phone("1-416-555-1234"), None);
        assert_eq!(format_phone(""), None);
    }

    #[test]
    fn test_duplicate_ids_keep_first_seen() {
        let first = record(json!({
            "cpsonumber": "CPSO-1",
            "name": "First",
            "phonenumber": "416-555-1234"
        }));
        let second = record(json!({
            "cpsonumber": "CPSO-1",
            "name": "Second",
            "phonenumber": "905-555-0000"
        }));
        let tables = aggregate_results(
            vec![
                result("K1A0", 1, vec![first]),
                result("K1A1", 1, vec![second]),
            ],
            &AggregateOptions::default(),
        );

        assert_eq!(tables.detail_rows_seen, 2);
        assert_eq!(tables.details.rows.len(), 1);
        let kept = &tables.details.rows[0];
        assert_eq!(kept.get("name"), Some(&json!("First")));
        assert_eq!(kept.get("phonenumber"), Some(&json!("(416) 555-1234")));
    }

    #[test]
    fn test_unformattable_phones_are_marked() {
        let row = record(json!({"cpsonumber": "7", "phonenumber": "12345", "fax": null}));
        let tables = aggregate_results(
            vec![result("K1A0", 1, vec![row])],
            &AggregateOptions::default(),
        );
        let kept = &tables.details.rows[0];
        assert_eq!(kept.get("phonenumber"), Some(&json!("UNFORMATTABLE")));
        assert_eq!(kept.get("fax"), Some(&json!("UNFORMATTABLE")));
    }

    #[test]
    fn test_summary_one_row_per_key_sorted() {
        let tables = aggregate_results(
            vec![
                result("K1A1", 3, Vec::new()),
                result("K1A0", -1, Vec::new()),
                result("K1A1", 4, Vec::new()),
            ],
            &AggregateOptions::default(),
        );
        assert_eq!(
            tables.summary,
            vec![
                SummaryRow {
                    postal_code: SearchKey::parse("K1A0").expect("key"),
                    totalcount: -1,
                },
                SummaryRow {
                    postal_code: SearchKey::parse("K1A1").expect("key"),
                    totalcount: 3,
                },
            ]
        );
    }

    #[test]
    fn test_columns_are_union_in_first_seen_order() {
        let a = record(json!({"cpsonumber": "1", "name": "A"}));
        let b = record(json!({"cpsonumber": "2", "city": "Ottawa", "name": "B"}));
        let tables = aggregate_results(
            vec![result("K1A0", 2, vec![a, b])],
            &AggregateOptions::default(),
        );
        assert_eq!(tables.details.columns, vec!["cpsonumber", "name", "city"]);
        let cells = tables.details.cells(&tables.details.rows[0]);
        assert_eq!(cells, vec!["1", "A", ""]);
    }

    #[test]
    fn test_rows_without_id_are_kept() {
        let a = record(json!({"name": "A"}));
        let b = record(json!({"name": "A"}));
        let tables = aggregate_results(
            vec![result("K1A0", 2, vec![a, b])],
            &AggregateOptions::default(),
        );
        assert_eq!(tables.details.rows.len(), 2);
    }
}
