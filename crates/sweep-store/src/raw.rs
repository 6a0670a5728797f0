//! Raw record persistence.
//!
//! Layout: `<root>/<partition>/raw/<K1A+0B>+<doctor type>+<last name>.json`.
//! A record that exists on disk is complete; writes go through a temp file and
//! a rename so an interrupted run never leaves a truncated record behind.

use crate::error::{Result, StoreError};
use std::fs;
use std::path::{Path, PathBuf};
use sweep_core::{QueryResult, SearchKey, SearchParams};
use tracing::debug;
use walkdir::WalkDir;

const RAW_DIR: &str = "raw";

/// Filesystem store of raw query records.
#[derive(Debug, Clone)]
pub struct RawStore {
    root: PathBuf,
}

impl RawStore {
    /// Create a store rooted at `root`. Nothing is created until the first
    /// write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one partition's records.
    #[must_use]
    pub fn partition_dir(&self, partition: &str) -> PathBuf {
        self.root.join(partition).join(RAW_DIR)
    }

    /// Path of the record for `key` searched with `params`.
    #[must_use]
    pub fn record_path(&self, partition: &str, key: &SearchKey, params: &SearchParams) -> PathBuf {
        let file_name = format!(
            "{}+{}+{}.json",
            key.file_stem(),
            params.doctor_type.label(),
            encode_label(params.last_name_label())
        );
        self.partition_dir(partition).join(file_name)
    }

    /// Load a previously persisted record, if any.
    pub fn load(
        &self,
        partition: &str,
        key: &SearchKey,
        params: &SearchParams,
    ) -> Result<Option<QueryResult>> {
        let path = self.record_path(partition, key, params);
        if !path.is_file() {
            return Ok(None);
        }
        Self::read_record(&path).map(Some)
    }

    /// Persist one query result, replacing any previous record for the same
    /// key and parameters.
    pub fn append(
        &self,
        partition: &str,
        params: &SearchParams,
        result: &QueryResult,
    ) -> Result<PathBuf> {
        let path = self.record_path(partition, result.key(), params);
        let dir = self.partition_dir(partition);
        fs::create_dir_all(&dir).map_err(StoreError::io(&dir))?;

        let contents = serde_json::to_vec_pretty(result).map_err(StoreError::json(&path))?;
        write_atomic(&path, &contents)?;

        debug!(
            key = %result.key(),
            path = %path.display(),
            "persisted raw record"
        );
        Ok(path)
    }

    /// Read and decode one record file.
    pub fn read_record(path: &Path) -> Result<QueryResult> {
        let contents = fs::read(path).map_err(StoreError::io(path))?;
        serde_json::from_slice(&contents).map_err(StoreError::json(path))
    }

    /// All record files across partitions, in sorted path order.
    pub fn record_files(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(3).max_depth(3) {
            let entry = entry?;
            let path = entry.path();
            let in_raw_dir = path
                .parent()
                .and_then(Path::file_name)
                .is_some_and(|name| name == RAW_DIR);
            let is_json = path.extension().and_then(|ext| ext.to_str()) == Some("json");
            if entry.file_type().is_file() && in_raw_dir && is_json {
                files.push(path.to_path_buf());
            }
        }

        files.sort();
        Ok(files)
    }
}

/// Write `contents` to a sibling temp file, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, contents).map_err(StoreError::io(&tmp))?;
    fs::rename(&tmp, path).map_err(StoreError::io(path))
}

/// Percent-encode every byte except ASCII alphanumerics, `-` and `_`, so
/// distinct labels always give distinct, portable file names.
fn encode_label(label: &str) -> String {
    let mut encoded = String::with_capacity(label.len());
    for byte in label.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}
