//! Rate-limited, retrying fetch of a single search key.

use crate::backoff::{Backoff, RequestPacing, Sleeper, TokioSleeper};
use crate::error::{Result, ScanError};
use crate::session::{SearchForm, Session, SessionResponse};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use sweep_core::{AppConfig, QueryResult, RegistryConfig, SearchKey, SearchParams};
use sweep_store::RawStore;
use tracing::{debug, info, warn};

const HTTP_OK: u16 = 200;
const HTTP_TOO_MANY_REQUESTS: u16 = 429;

/// Fetches one key at a time from the registry.
///
/// Every attempt is preceded by a random pause drawn from the configured
/// pacing range. Retryable failures back off exponentially; a successful
/// payload is persisted to the raw store before it is returned.
pub struct RateLimitedFetcher<S, Z = TokioSleeper> {
    session: S,
    sleeper: Z,
    store: Arc<RawStore>,
    registry: RegistryConfig,
    pacing: RequestPacing,
    max_retries: u32,
    initial_backoff: Duration,
}

impl<S: Session> RateLimitedFetcher<S> {
    /// Create a fetcher that sleeps on the tokio timer.
    pub fn new(session: S, store: Arc<RawStore>, config: &AppConfig) -> Self {
        Self::with_sleeper(session, TokioSleeper, store, config)
    }
}

impl<S: Session, Z: Sleeper> RateLimitedFetcher<S, Z> {
    /// Create a fetcher with a custom sleeper.
    pub fn with_sleeper(session: S, sleeper: Z, store: Arc<RawStore>, config: &AppConfig) -> Self {
        let (min, max) = config.scanning.delay_range();
        Self {
            session,
            sleeper,
            store,
            registry: config.registry.clone(),
            pacing: RequestPacing::new(min, max),
            max_retries: config.scanning.max_retries,
            initial_backoff: config.scanning.initial_backoff(),
        }
    }

    /// The raw store results are persisted to.
    #[must_use]
    pub fn store(&self) -> &Arc<RawStore> {
        &self.store
    }

    /// Fetch `key` and persist the payload under `partition`.
    ///
    /// # Errors
    /// - `UnparseablePayload` if the body cannot be decoded (not retried)
    /// - `MaxRetriesExceeded` once the retry budget is spent
    /// - `Store` if the payload cannot be persisted
    pub async fn fetch(
        &self,
        key: &SearchKey,
        params: &SearchParams,
        partition: &str,
    ) -> Result<QueryResult> {
        let form = SearchForm::build(key, params, &self.registry);
        let mut backoff = Backoff::new(self.initial_backoff, self.max_retries);
        let mut established = false;

        loop {
            let pause = self.pacing.sample();
            self.sleeper.sleep(pause).await;

            let error = match self.attempt(key, &form, &mut established).await {
                Ok(result) => {
                    self.store.append(partition, params, &result)?;
                    info!(
                        key = %key,
                        totalcount = result.totalcount,
                        rows = result.results.len(),
                        attempts = backoff.attempts() + 1,
                        "fetched key"
                    );
                    return Ok(result);
                }
                Err(e) if !e.is_retryable() => {
                    warn!(key = %key, error = %e, "fetch failed, not retrying");
                    return Err(e);
                }
                Err(e) => e,
            };

            match backoff.on_failure() {
                Some(delay) => {
                    warn!(
                        key = %key,
                        attempt = backoff.attempts(),
                        max_attempts = backoff.max_attempts(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "fetch failed, backing off"
                    );
                    self.sleeper.sleep(delay).await;
                }
                None => {
                    warn!(
                        key = %key,
                        attempts = backoff.attempts(),
                        error = %error,
                        "giving up on key"
                    );
                    return Err(ScanError::MaxRetriesExceeded {
                        key: key.clone(),
                        attempts: backoff.attempts(),
                        last_error: error.to_string(),
                    });
                }
            }
        }
    }

    async fn attempt(
        &self,
        key: &SearchKey,
        form: &SearchForm,
        established: &mut bool,
    ) -> Result<QueryResult> {
        if !*established {
            self.session.establish().await?;
            *established = true;
            debug!(key = %key, "session established");
        }

        let SessionResponse { status, body } = self.session.search(form).await?;
        match status {
            HTTP_OK => parse_payload(key, &body),
            HTTP_TOO_MANY_REQUESTS => Err(ScanError::RateLimited),
            other => Err(ScanError::HttpStatus(other)),
        }
    }
}

/// Decode a search response body into a [`QueryResult`] for `key`.
///
/// Bodies with raw control characters inside strings can never be decoded
/// and fail with `UnparseablePayload`. Other decode failures are treated as
/// a truncated transfer and reported as transient.
pub fn parse_payload(key: &SearchKey, body: &str) -> Result<QueryResult> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Ok(QueryResult::from_payload(key.clone(), map)),
        Ok(other) => Err(ScanError::UnparseablePayload {
            key: key.clone(),
            message: format!("expected a JSON object, got {}", json_kind(&other)),
        }),
        Err(e) if e.to_string().contains("control character") => {
            Err(ScanError::UnparseablePayload {
                key: key.clone(),
                message: e.to_string(),
            })
        }
        Err(e) => Err(ScanError::TransientNetwork(format!(
            "malformed response body: {e}"
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
