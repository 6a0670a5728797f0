//! Refinement loop over capped search keys.
//!
//! This module provides the `RefinementLoop` which drives the
//! `Seed -> Rank1 -> Rank2 -> Rank3 -> Done` state machine: every capped key
//! of one round is expanded by one character and its children are fetched in
//! the next round, until no key is capped or the deepest rank is reached.

use crate::backoff::{Sleeper, TokioSleeper};
use crate::error::Result;
use crate::fetcher::RateLimitedFetcher;
use crate::session::Session;
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use sweep_core::{
    CapDetector, Completeness, KeyGenerator, QueryResult, Rank, SearchKey, SearchParams,
};
use sweep_store::{write_key_set, RawStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A key that could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedKey {
    /// Key that failed
    pub key: SearchKey,
    /// Final error
    pub error: String,
}

/// A key rejected before fetching (wrong length for its rank).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedKey {
    /// Rejected key
    pub key: SearchKey,
    /// Why it was rejected
    pub reason: String,
}

/// Outcome of one pass over a key set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoundReport {
    /// Partition (key-set name) the round wrote to
    pub partition: String,
    /// Refinement rank, if the round was part of a refinement run
    pub rank: Option<Rank>,
    /// Keys scheduled in this round
    pub candidates: usize,
    /// Keys fetched from the registry
    pub fetched: usize,
    /// Keys already present in the raw store
    pub cached: usize,
    /// Keys whose result was complete
    pub complete: usize,
    /// Keys whose result was capped, sorted
    pub capped: Vec<SearchKey>,
    /// Keys that failed, sorted by key
    pub failed: Vec<FailedKey>,
    /// Keys not attempted because the run was cancelled
    pub skipped: usize,
}

/// Outcome of a whole refinement run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run ended
    pub finished_at: DateTime<Utc>,
    /// One entry per executed round
    pub rounds: Vec<RoundReport>,
    /// Keys rejected by the length filter
    pub dropped: Vec<DroppedKey>,
    /// Keys still capped at the deepest rank
    pub saturated: Vec<SearchKey>,
    /// Whether the run stopped early on cancellation
    pub cancelled: bool,
}

impl RunReport {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            rounds: Vec::new(),
            dropped: Vec::new(),
            saturated: Vec::new(),
            cancelled: false,
        }
    }

    /// All failed keys across rounds.
    pub fn failed(&self) -> impl Iterator<Item = &FailedKey> {
        self.rounds.iter().flat_map(|round| round.failed.iter())
    }

    /// Total number of registry fetches.
    #[must_use]
    pub fn total_fetched(&self) -> usize {
        self.rounds.iter().map(|round| round.fetched).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Stage {
    Seed,
    Rank(Rank),
    Done,
}

/// Round-boundary state: the current stage and the keys it will expand.
#[derive(Debug)]
struct RefinementState {
    stage: Stage,
    frontier: Vec<SearchKey>,
}

impl RefinementState {
    fn new(seeds: &[SearchKey]) -> Self {
        Self {
            stage: Stage::Seed,
            frontier: seeds.to_vec(),
        }
    }

    /// Leave `Seed` at the rank that expands keys of the seeds' length.
    fn start(&mut self, max_rank: Rank) {
        let start = self
            .frontier
            .first()
            .and_then(|seed| Rank::ALL.into_iter().find(|r| r.input_len() == seed.len()))
            .unwrap_or(Rank::One);
        self.stage = if start <= max_rank {
            Stage::Rank(start)
        } else {
            Stage::Done
        };
    }

    /// Move past `rank` given its capped keys. Returns the keys that cannot
    /// be refined further.
    fn advance(&mut self, rank: Rank, capped: Vec<SearchKey>, max_rank: Rank) -> Vec<SearchKey> {
        if capped.is_empty() {
            self.stage = Stage::Done;
            self.frontier.clear();
            return Vec::new();
        }
        match rank.next().filter(|next| *next <= max_rank) {
            Some(next) => {
                self.stage = Stage::Rank(next);
                self.frontier = capped;
                Vec::new()
            }
            None => {
                self.stage = Stage::Done;
                self.frontier.clear();
                capped
            }
        }
    }
}

enum KeyOutcome {
    Fetched(QueryResult),
    Cached(QueryResult),
    Failed(FailedKey),
    Skipped,
}

/// Drives capped keys through successive ranks.
pub struct RefinementLoop<S, Z = TokioSleeper> {
    fetcher: Arc<RateLimitedFetcher<S, Z>>,
    store: Arc<RawStore>,
    generator: KeyGenerator,
    detector: CapDetector,
    criteria_dir: Option<PathBuf>,
    max_concurrent_fetches: usize,
    max_rank: Rank,
    cancel: CancellationToken,
}

impl<S: Session, Z: Sleeper> RefinementLoop<S, Z> {
    /// Create a loop around `fetcher`, sharing its raw store.
    #[must_use]
    pub fn new(fetcher: Arc<RateLimitedFetcher<S, Z>>) -> Self {
        let store = fetcher.store().clone();
        Self {
            fetcher,
            store,
            generator: KeyGenerator::default(),
            detector: CapDetector::new(),
            criteria_dir: None,
            max_concurrent_fetches: 1,
            max_rank: Rank::Three,
            cancel: CancellationToken::new(),
        }
    }

    /// Write each round's candidates to `<dir>/FSA_LDU{n}.json`.
    #[must_use]
    pub fn with_criteria_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.criteria_dir = Some(dir.into());
        self
    }

    /// Set the maximum number of in-flight fetches.
    #[must_use]
    pub fn with_max_concurrent_fetches(mut self, max: usize) -> Self {
        self.max_concurrent_fetches = max.max(1);
        self
    }

    /// Stop refining after `rank`.
    #[must_use]
    pub fn with_max_rank(mut self, rank: Rank) -> Self {
        self.max_rank = rank;
        self
    }

    /// Use `token` to stop the run early.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run the refinement state machine from `seeds`.
    ///
    /// Seeds are only expanded, never fetched themselves. Keys whose length
    /// does not fit the current rank are dropped and reported. Failed keys
    /// are reported and do not stop the run; only a store failure does.
    pub async fn run(&self, seeds: &[SearchKey], params: &SearchParams) -> Result<RunReport> {
        let mut report = RunReport::new();
        let mut state = RefinementState::new(seeds);
        state.start(self.max_rank);

        while let Stage::Rank(rank) = state.stage.clone() {
            if self.cancel.is_cancelled() {
                info!(rank = rank.number(), "run cancelled before round");
                report.cancelled = true;
                break;
            }

            let expansion = self.generator.expand_all(&state.frontier, rank);
            report
                .dropped
                .extend(expansion.dropped.into_iter().map(|(key, e)| DroppedKey {
                    key,
                    reason: e.to_string(),
                }));

            if expansion.children.is_empty() {
                info!(rank = rank.number(), "no candidates left");
                state.stage = Stage::Done;
                break;
            }

            let partition = rank.key_set_name();
            if let Some(dir) = &self.criteria_dir {
                write_key_set(dir, &partition, &expansion.children)?;
            }

            info!(
                rank = rank.number(),
                parents = state.frontier.len(),
                candidates = expansion.children.len(),
                "starting round"
            );
            let mut round = self.scan(&partition, &expansion.children, params).await?;
            round.rank = Some(rank);
            let capped = round.capped.clone();
            let stopped = round.skipped > 0;
            report.rounds.push(round);

            if stopped {
                report.cancelled = true;
                break;
            }

            let saturated = state.advance(rank, capped, self.max_rank);
            if !saturated.is_empty() {
                warn!(
                    rank = rank.number(),
                    count = saturated.len(),
                    "keys still capped at deepest rank"
                );
                report.saturated = saturated;
            }
        }

        report.finished_at = Utc::now();
        info!(
            rounds = report.rounds.len(),
            fetched = report.total_fetched(),
            failed = report.failed().count(),
            dropped = report.dropped.len(),
            cancelled = report.cancelled,
            "run finished"
        );
        Ok(report)
    }

    /// Fetch every key once into `partition`, reusing stored records.
    pub async fn scan(
        &self,
        partition: &str,
        keys: &[SearchKey],
        params: &SearchParams,
    ) -> Result<RoundReport> {
        let mut round = RoundReport {
            partition: partition.to_string(),
            candidates: keys.len(),
            ..RoundReport::default()
        };
        let mut futures = FuturesUnordered::new();

        for key in keys {
            futures.push(self.process_key(partition, key, params));

            // Respect concurrency limit
            while futures.len() >= self.max_concurrent_fetches {
                if let Some(outcome) = futures.next().await {
                    self.record(&mut round, outcome?);
                }
            }
        }

        while let Some(outcome) = futures.next().await {
            self.record(&mut round, outcome?);
        }

        round.capped.sort();
        round.failed.sort_by(|a, b| a.key.cmp(&b.key));
        info!(
            partition,
            fetched = round.fetched,
            cached = round.cached,
            complete = round.complete,
            capped = round.capped.len(),
            failed = round.failed.len(),
            "round finished"
        );
        Ok(round)
    }

    fn record(&self, round: &mut RoundReport, outcome: KeyOutcome) {
        let result = match outcome {
            KeyOutcome::Fetched(result) => {
                round.fetched += 1;
                result
            }
            KeyOutcome::Cached(result) => {
                round.cached += 1;
                result
            }
            KeyOutcome::Failed(failed) => {
                round.failed.push(failed);
                return;
            }
            KeyOutcome::Skipped => {
                round.skipped += 1;
                return;
            }
        };

        match self.detector.classify(&result) {
            Completeness::Complete => round.complete += 1,
            Completeness::Capped => round.capped.push(result.postal_code),
        }
    }

    async fn process_key(
        &self,
        partition: &str,
        key: &SearchKey,
        params: &SearchParams,
    ) -> Result<KeyOutcome> {
        if self.cancel.is_cancelled() {
            return Ok(KeyOutcome::Skipped);
        }

        match self.store.load(partition, key, params) {
            Ok(Some(result)) => {
                debug!(key = %key, partition, "already stored, skipping fetch");
                return Ok(KeyOutcome::Cached(result));
            }
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "stored record unreadable, refetching"),
        }

        let fetched = tokio::select! {
            () = self.cancel.cancelled() => return Ok(KeyOutcome::Skipped),
            fetched = self.fetcher.fetch(key, params, partition) => fetched,
        };

        match fetched {
            Ok(result) => Ok(KeyOutcome::Fetched(result)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(key = %key, error = %e, "key failed");
                Ok(KeyOutcome::Failed(FailedKey {
                    key: key.clone(),
                    error: e.to_string(),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(raw: &[&str]) -> Vec<SearchKey> {
        raw.iter()
            .map(|k| SearchKey::parse(k).expect("valid test key"))
            .collect()
    }

    #[test]
    fn test_state_starts_at_seed_length() {
        let mut state = RefinementState::new(&keys(&["K1A"]));
        assert_eq!(state.stage, Stage::Seed);
        state.start(Rank::Three);
        assert_eq!(state.stage, Stage::Rank(Rank::One));

        let mut state = RefinementState::new(&keys(&["K1A0B"]));
        state.start(Rank::Three);
        assert_eq!(state.stage, Stage::Rank(Rank::Three));

        let mut state = RefinementState::new(&keys(&["K1A0"]));
        state.start(Rank::One);
        assert_eq!(state.stage, Stage::Done);
    }

    #[test]
    fn test_state_advances_on_capped_keys() {
        let mut state = RefinementState::new(&keys(&["K1A"]));
        state.start(Rank::Three);

        let saturated = state.advance(Rank::One, keys(&["K1A0"]), Rank::Three);
        assert!(saturated.is_empty());
        assert_eq!(state.stage, Stage::Rank(Rank::Two));
        assert_eq!(state.frontier, keys(&["K1A0"]));

        let saturated = state.advance(Rank::Two, Vec::new(), Rank::Three);
        assert!(saturated.is_empty());
        assert_eq!(state.stage, Stage::Done);
    }

    #[test]
    fn test_state_reports_saturated_keys_at_max_rank() {
        let mut state = RefinementState::new(&keys(&["K1A0B"]));
        state.start(Rank::Three);
        let saturated = state.advance(Rank::Three, keys(&["K1A0B1"]), Rank::Three);
        assert_eq!(saturated, keys(&["K1A0B1"]));
        assert_eq!(state.stage, Stage::Done);

        let mut state = RefinementState::new(&keys(&["K1A"]));
        state.start(Rank::One);
        let saturated = state.advance(Rank::One, keys(&["K1A0"]), Rank::One);
        assert_eq!(saturated, keys(&["K1A0"]));
        assert_eq!(state.stage, Stage::Done);
    }
}
