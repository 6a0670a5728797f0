//! Sweep Scanner - Registry fetching and capped-key refinement.
//!
//! This crate queries the physician registry one postal-code prefix at a
//! time and refines every prefix whose result was capped by the server into
//! longer prefixes, until each result is complete or the full postal code is
//! reached.
//!
//! # Features
//!
//! - Randomized pause before every request to stay under the informal rate limit
//! - Exponential backoff for transient failures and HTTP 429
//! - Non-retryable handling of payloads that can never be decoded
//! - Idempotent resume: keys already in the raw store are not fetched again
//! - Bounded concurrency and cooperative cancellation
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sweep_core::{AppConfig, SearchKey, SearchParams};
//! use sweep_scanner::{HttpSession, RateLimitedFetcher, RefinementLoop};
//! use sweep_store::RawStore;
//!
//! let config = AppConfig::load()?;
//! let session = HttpSession::new(&config.registry, &config.scanning)?;
//! let store = Arc::new(RawStore::new(&config.storage.data_dir));
//! let fetcher = Arc::new(RateLimitedFetcher::new(session, store, &config));
//!
//! let report = RefinementLoop::new(fetcher)
//!     .with_criteria_dir(&config.storage.criteria_dir)
//!     .run(&[SearchKey::parse("K1A")?], &SearchParams::default())
//!     .await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod backoff;
pub mod error;
pub mod fetcher;
pub mod orchestrator;
pub mod session;

// Re-export commonly used types
pub use backoff::{Backoff, RequestPacing, Sleeper, TokioSleeper};
pub use error::{Result, ScanError};
pub use fetcher::{parse_payload, RateLimitedFetcher};
pub use orchestrator::{DroppedKey, FailedKey, RefinementLoop, RoundReport, RunReport};
pub use session::{HttpSession, SearchForm, Session, SessionResponse};
