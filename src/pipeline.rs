//! # Ingest pipeline
//! One run: `Fetching → Merging → Enriching → Ranking → Persisting → Done`.
//!
//! Only a fetch failure (after retries) or a persist failure ends a run
//! early, and neither touches the collection file. Cancellation is honoured
//! up to the moment persisting starts; after that the write completes.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::sync::watch;

use crate::clock::{Clock, SystemClock};
use crate::config::IngestConfig;
use crate::enrich::ai_adapter::build_client_from_config;
use crate::enrich::Enricher;
use crate::error::{FetchError, RunError};
use crate::ingest::merge::merge;
use crate::ingest::providers::rss::RssFeed;
use crate::ingest::rank::{rank_and_trim, survival_floor};
use crate::ingest::types::{CandidateRecord, EnrichedRecord, FeedSource};
use crate::ingest::{ensure_metrics_described, MAX_ITEMS};
use crate::store::CollectionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Idle,
    Fetching,
    Merging,
    Enriching,
    Ranking,
    Persisting,
    Done,
    Failed,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStage::Idle => "idle",
            RunStage::Fetching => "fetching",
            RunStage::Merging => "merging",
            RunStage::Enriching => "enriching",
            RunStage::Ranking => "ranking",
            RunStage::Persisting => "persisting",
            RunStage::Done => "done",
            RunStage::Failed => "failed",
        }
    }
}

/// Counts reported by a successful run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunSummary {
    /// Items parsed from the feed.
    pub fetched: usize,
    /// New links present in the persisted collection.
    pub added: usize,
    /// Records cut by the capacity bound.
    pub dropped: usize,
    /// New records that got a generated short title.
    pub enriched: usize,
    /// New records stored with their original headline.
    pub fallback: usize,
    /// Collection size after the run.
    pub total: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub max_items: usize,
    /// Extra fetch attempts after the first failure.
    pub fetch_retries: u8,
    /// Base delay; doubles per attempt.
    pub fetch_backoff: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_items: MAX_ITEMS,
            fetch_retries: 2,
            fetch_backoff: Duration::from_millis(500),
        }
    }
}

// ------------------------------------------------------------
// Cancellation
// ------------------------------------------------------------

/// Caller side of a run's cancellation channel.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

/// Run side of the cancellation channel.
#[derive(Debug, Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), CancelSignal(rx))
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self(rx)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    async fn cancelled(&mut self) {
        loop {
            if *self.0.borrow_and_update() {
                return;
            }
            if self.0.changed().await.is_err() {
                // sender gone without cancelling
                std::future::pending::<()>().await;
            }
        }
    }
}

async fn guarded<F: Future>(
    cancel: &mut CancelSignal,
    stage: RunStage,
    fut: F,
) -> Result<F::Output, RunError> {
    if cancel.is_cancelled() {
        return Err(RunError::Cancelled(stage.as_str()));
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RunError::Cancelled(stage.as_str())),
        out = fut => Ok(out),
    }
}

// ------------------------------------------------------------
// Pipeline
// ------------------------------------------------------------

pub struct Pipeline {
    source: Arc<dyn FeedSource>,
    store: CollectionStore,
    enricher: Enricher,
    clock: Arc<dyn Clock>,
    opts: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn FeedSource>,
        store: CollectionStore,
        enricher: Enricher,
        clock: Arc<dyn Clock>,
        opts: PipelineOptions,
    ) -> Self {
        Self {
            source,
            store,
            enricher,
            clock,
            opts,
        }
    }

    /// Wire the live RSS source, provider client and file store from config.
    /// Fails on a bad feed URL or a missing provider credential.
    pub fn from_config(cfg: &IngestConfig) -> anyhow::Result<Self> {
        let source = RssFeed::from_url(
            &cfg.feed_url,
            &cfg.user_agent,
            Duration::from_secs(cfg.fetch_timeout_secs),
        )
        .context("configuring feed source")?;
        let client = build_client_from_config(&cfg.ai).context("configuring enrichment")?;
        let enricher = Enricher::new(
            client,
            cfg.ai.concurrency,
            Duration::from_secs(cfg.ai.call_timeout_secs),
        );
        Ok(Self::new(
            Arc::new(source),
            CollectionStore::new(&cfg.store_path),
            enricher,
            Arc::new(SystemClock),
            PipelineOptions {
                max_items: cfg.max_items,
                fetch_retries: cfg.fetch_retries,
                fetch_backoff: Duration::from_millis(cfg.fetch_backoff_ms),
            },
        ))
    }

    pub fn store(&self) -> &CollectionStore {
        &self.store
    }

    pub async fn run_once(&self) -> Result<RunSummary, RunError> {
        self.run_with_cancel(CancelSignal::never()).await
    }

    pub async fn run_with_cancel(&self, mut cancel: CancelSignal) -> Result<RunSummary, RunError> {
        ensure_metrics_described();
        let started_at = self.clock.now();
        tracing::info!(
            target: "ingest",
            source = self.source.name(),
            provider = self.enricher.provider_name(),
            store = %self.store.path().display(),
            "run started"
        );

        let result = self.run_stages(&mut cancel, started_at).await;
        match &result {
            Ok(s) => {
                counter!("ingest_runs_total", "outcome" => "ok").increment(1);
                gauge!("ingest_pipeline_last_run_ts").set(s.finished_at.timestamp() as f64);
                tracing::info!(
                    target: "ingest",
                    fetched = s.fetched,
                    added = s.added,
                    dropped = s.dropped,
                    enriched = s.enriched,
                    fallback = s.fallback,
                    total = s.total,
                    "run done"
                );
            }
            Err(e) => {
                counter!("ingest_runs_total", "outcome" => "failed").increment(1);
                enter(RunStage::Failed);
                tracing::error!(target: "ingest", stage = e.stage(), error = %e, "run failed");
            }
        }
        result
    }

    async fn run_stages(
        &self,
        cancel: &mut CancelSignal,
        started_at: DateTime<Utc>,
    ) -> Result<RunSummary, RunError> {
        enter(RunStage::Fetching);
        let (fetched, existing) = guarded(cancel, RunStage::Fetching, async {
            tokio::join!(self.fetch_with_retry(), self.store.load())
        })
        .await?;
        let candidates = fetched?;
        let fetched_count = candidates.len();

        enter(RunStage::Merging);
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled(RunStage::Merging.as_str()));
        }
        let merged = merge(existing, candidates);
        if merged.stored_duplicates > 0 {
            tracing::warn!(
                target: "ingest",
                duplicates = merged.stored_duplicates,
                "stored collection had repeated links, kept first"
            );
        }
        let new_links: HashSet<String> = merged.new_ones.iter().map(|c| c.link.clone()).collect();

        // a full collection can rule out old candidates before any provider call
        let floor = survival_floor(&merged.existing, self.opts.max_items);
        let (to_enrich, doomed): (Vec<CandidateRecord>, Vec<CandidateRecord>) = merged
            .new_ones
            .into_iter()
            .partition(|c| floor.map_or(true, |f| c.published_at > f));
        if !doomed.is_empty() {
            tracing::debug!(
                target: "ingest",
                count = doomed.len(),
                "new items too old for a full collection, not enriched"
            );
        }

        enter(RunStage::Enriching);
        let mut enriched = guarded(
            cancel,
            RunStage::Enriching,
            self.enricher.enrich_all(to_enrich),
        )
        .await?;
        enriched
            .records
            .extend(doomed.into_iter().map(EnrichedRecord::fallback));

        enter(RunStage::Ranking);
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled(RunStage::Ranking.as_str()));
        }
        let ranked = rank_and_trim(merged.existing, enriched.records, self.opts.max_items);
        let added = ranked
            .records
            .iter()
            .filter(|r| new_links.contains(&r.link))
            .count();

        // last chance to cancel; from here the write runs to completion
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled(RunStage::Persisting.as_str()));
        }
        enter(RunStage::Persisting);
        self.store.persist(&ranked.records).await?;

        counter!("ingest_items_added_total").increment(added as u64);
        counter!("ingest_items_dropped_total").increment(ranked.dropped as u64);
        enter(RunStage::Done);

        Ok(RunSummary {
            fetched: fetched_count,
            added,
            dropped: ranked.dropped,
            enriched: enriched.enriched,
            fallback: enriched.fallback,
            total: ranked.records.len(),
            started_at,
            finished_at: self.clock.now(),
        })
    }

    async fn fetch_with_retry(&self) -> Result<Vec<CandidateRecord>, FetchError> {
        let max_attempts = u32::from(self.opts.fetch_retries) + 1;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.source.fetch_latest(self.clock.as_ref()).await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    counter!("ingest_fetch_errors_total").increment(1);
                    if attempt >= max_attempts || !is_retryable(&e) {
                        return Err(e);
                    }
                    let wait = self.opts.fetch_backoff * (1u32 << (attempt - 1).min(10));
                    tracing::warn!(
                        target: "ingest",
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "feed fetch failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

fn enter(stage: RunStage) {
    tracing::debug!(target: "ingest", stage = stage.as_str(), "stage");
}

/// Network errors, 5xx and 429 are worth another attempt; a malformed feed
/// or a bad URL will not get better by asking again.
fn is_retryable(e: &FetchError) -> bool {
    match e {
        FetchError::Http(_) => true,
        FetchError::Status { status, .. } => *status >= 500 || *status == 429,
        FetchError::Parse(_) | FetchError::InvalidUrl { .. } => false,
    }
}
