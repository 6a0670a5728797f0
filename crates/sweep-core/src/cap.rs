//! Capped result detection.
//!
//! The registry never returns more than a fixed number of rows. When a search
//! matches more, it reports `totalcount == -1` instead of the real count, and
//! the key has to be refined into longer prefixes.
//!
//! The decision is made on the sentinel alone. Keys carry their true length,
//! so no string-length heuristic is needed to tell ranks apart.

use crate::query::QueryResult;
use crate::types::SearchKey;
use serde::{Deserialize, Serialize};

/// `totalcount` value the registry uses for a truncated result.
pub const CAP_SENTINEL: i64 = -1;

/// Classification of a query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completeness {
    /// All matches were returned
    Complete,
    /// The server truncated the result
    Capped,
}

/// Stateless classifier for query results.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapDetector;

impl CapDetector {
    /// Create a detector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Classify a single result.
    #[must_use]
    pub fn classify(&self, result: &QueryResult) -> Completeness {
        Self::classify_count(result.totalcount)
    }

    /// Classify a raw `totalcount` value.
    #[must_use]
    pub fn classify_count(totalcount: i64) -> Completeness {
        if totalcount == CAP_SENTINEL {
            Completeness::Capped
        } else {
            Completeness::Complete
        }
    }

    /// Keys of all capped results, in input order.
    pub fn capped_keys<'a, I>(&self, results: I) -> Vec<SearchKey>
    where
        I: IntoIterator<Item = &'a QueryResult>,
    {
        results
            .into_iter()
            .filter(|result| self.classify(result) == Completeness::Capped)
            .map(|result| result.postal_code.clone())
            .collect()
    }
}
