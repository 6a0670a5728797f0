//! Sweep Core - Foundation crate for the postcode-sweep registry scraper.
//!
//! This crate provides the types every other sweep crate depends on: postal
//! code search keys, the per-rank refinement alphabets, key expansion, capped
//! result detection, and configuration.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - `SearchKey`, `Rank`, and search parameters
//! - [`keygen`] - One-rank key expansion over fixed alphabets
//! - [`query`] - Query results and opaque detail records
//! - [`cap`] - Classification of capped (truncated) query results
//!
//! # Example
//!
//! ```rust
//! use sweep_core::{KeyGenerator, Rank, SearchKey};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let generator = KeyGenerator::default();
//! let fsa = SearchKey::parse("K1A")?;
//! let children = generator.expand(&fsa, Rank::One.number())?;
//! assert_eq!(children.len(), 10);
//! assert_eq!(children[0].as_str(), "K1A0");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod cap;
pub mod config;
pub mod error;
pub mod keygen;
pub mod query;
pub mod types;

// Re-export commonly used types
pub use cap::{CapDetector, Completeness, CAP_SENTINEL};
pub use config::{AppConfig, RegistryConfig, ScanningConfig, StorageConfig};
pub use error::{ConfigError, ConfigResult, KeyError};
pub use keygen::{Alphabets, Expansion, KeyGenerator, DIGITS, LETTERS};
pub use query::{DetailRecord, QueryResult};
pub use types::{DoctorType, Rank, SearchKey, SearchParams, FSA_LEN, MAX_KEY_LEN};
