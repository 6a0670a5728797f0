//! Sweep Store - Durable results for postcode-sweep.
//!
//! Every successful registry query is written as one JSON file; nothing else
//! is kept in memory between runs. This crate owns that layout and the
//! projections built from it.
//!
//! # Architecture
//!
//! - **Raw store** ([`raw`]): one file per (key, doctor type, last name), grouped
//!   by key-set partition
//! - **Key sets** ([`key_sets`]): `FSA_LDU{n}.json` round files and seed loading
//! - **Aggregation** ([`aggregate`]): summary and deduplicated detail tables
//! - **CSV** ([`csv`]): minimal CSV reading and writing
//! - **Errors** ([`error`]): store-specific error types
//!
//! # Example
//!
//! ```rust,no_run
//! use sweep_store::{aggregate, AggregateOptions, RawStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RawStore::new("data");
//! let tables = aggregate::aggregate(&store, &AggregateOptions::default())?;
//! sweep_store::write_outputs(std::path::Path::new("results"), &tables)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod aggregate;
pub mod csv;
pub mod error;
pub mod key_sets;
pub mod raw;

// Re-export commonly used types
pub use aggregate::{
    format_phone, write_outputs, Aggregate, AggregateOptions, DetailTable, OutputPaths, SummaryRow,
};
pub use error::{Result, StoreError};
pub use key_sets::{load_keys, read_key_set, write_key_set, KeyFilter, LoadedKeys};
pub use raw::RawStore;
