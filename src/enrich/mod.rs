//! Enrichment stage: short title + note for each new record.
//!
//! At most `concurrency` provider calls run at once. Permits are taken in
//! input order before each task is spawned, so queued work starts FIFO.
//! Every failure (error, timeout, malformed reply, even a panicking task)
//! degrades that one record to its original headline; the stage itself
//! cannot fail.

pub mod ai_adapter;

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::error::EnrichmentError;
use crate::ingest::types::{CandidateRecord, EnrichedRecord, EnrichmentStatus};
use ai_adapter::DynAiClient;

#[derive(Debug, Default)]
pub struct EnrichOutcome {
    /// Same order as the input.
    pub records: Vec<EnrichedRecord>,
    pub enriched: usize,
    pub fallback: usize,
}

pub struct Enricher {
    client: DynAiClient,
    concurrency: usize,
    call_timeout: Duration,
}

impl Enricher {
    pub fn new(client: DynAiClient, concurrency: usize, call_timeout: Duration) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
            call_timeout,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.client.provider_name()
    }

    /// Enrich every record and wait for all of them.
    pub async fn enrich_all(&self, new_ones: Vec<CandidateRecord>) -> EnrichOutcome {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut in_flight = InFlight(Vec::with_capacity(new_ones.len()));

        for rec in new_ones {
            let permit = semaphore.clone().acquire_owned().await;
            let backup = rec.clone();
            let handle = spawn_enrichment(permit, self.client.clone(), rec, self.call_timeout);
            in_flight.0.push((backup, handle));
        }

        let mut outcome = EnrichOutcome {
            records: Vec::with_capacity(in_flight.0.len()),
            ..EnrichOutcome::default()
        };
        for (backup, handle) in in_flight.0.iter_mut() {
            let rec = match handle.await {
                Ok(rec) => rec,
                Err(e) => {
                    let err = EnrichmentError::Aborted(e.to_string());
                    tracing::warn!(target: "enrich", link = %backup.link, error = %err, "enrichment fell back");
                    counter!("enrich_fallback_total").increment(1);
                    EnrichedRecord::fallback(backup.clone())
                }
            };
            match rec.enrichment_status {
                EnrichmentStatus::Enriched => outcome.enriched += 1,
                EnrichmentStatus::FallbackOriginal => outcome.fallback += 1,
            }
            outcome.records.push(rec);
        }
        outcome
    }
}

/// Spawned tasks of one stage; aborted if the stage future is dropped.
struct InFlight(Vec<(CandidateRecord, JoinHandle<EnrichedRecord>)>);

impl Drop for InFlight {
    fn drop(&mut self) {
        for (_, h) in &self.0 {
            h.abort();
        }
    }
}

/// Run one enrichment while holding `permit`. Without a permit the record
/// is not sent to the provider and keeps its headline.
fn spawn_enrichment(
    permit: Result<OwnedSemaphorePermit, AcquireError>,
    client: DynAiClient,
    rec: CandidateRecord,
    timeout: Duration,
) -> JoinHandle<EnrichedRecord> {
    tokio::spawn(async move {
        let permit = match permit {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(target: "enrich", link = %rec.link, error = %e, "no worker slot, keeping headline");
                counter!("enrich_fallback_total").increment(1);
                return EnrichedRecord::fallback(rec);
            }
        };
        let out = enrich_one(client, rec, timeout).await;
        drop(permit);
        out
    })
}

async fn enrich_one(client: DynAiClient, rec: CandidateRecord, timeout: Duration) -> EnrichedRecord {
    counter!("enrich_calls_total").increment(1);
    let t0 = Instant::now();
    let res = match tokio::time::timeout(timeout, client.enrich(&rec)).await {
        Ok(r) => r,
        Err(_) => Err(EnrichmentError::Timeout(timeout)),
    };
    histogram!("enrich_call_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

    match res {
        Ok(ai) => EnrichedRecord::enriched(rec, ai.short_title, ai.note),
        Err(e) => {
            if matches!(e, EnrichmentError::Disabled) {
                tracing::debug!(target: "enrich", link = %rec.link, "enrichment disabled, keeping headline");
            } else {
                tracing::warn!(target: "enrich", link = %rec.link, error = %e, "enrichment fell back");
            }
            counter!("enrich_fallback_total").increment(1);
            EnrichedRecord::fallback(rec)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ai_adapter::{AiClient, AiEnrichment, DisabledClient, EnrichFuture};
    use super::*;
    use chrono::DateTime;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cand(link: &str) -> CandidateRecord {
        CandidateRecord {
            raw_title: format!("{link} headline"),
            display_title: format!("{link} headline"),
            source_publisher: None,
            link: link.into(),
            published_at: DateTime::from_timestamp(1_000, 0).unwrap(),
            description: None,
            author: None,
            tags: vec![],
        }
    }

    /// Fails for links containing "bad", hangs for "slow", panics for "boom".
    struct Scripted {
        current: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
    }

    impl Scripted {
        fn new(delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                delay: Duration::from_millis(delay_ms),
            })
        }
    }

    impl AiClient for Scripted {
        fn enrich<'a>(&'a self, record: &'a CandidateRecord) -> EnrichFuture<'a> {
            Box::pin(async move {
                let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                if record.link.contains("slow") {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
                tokio::time::sleep(self.delay).await;
                self.current.fetch_sub(1, Ordering::SeqCst);
                if record.link.contains("boom") {
                    panic!("provider blew up");
                }
                if record.link.contains("bad") {
                    return Err(EnrichmentError::Provider("500".into()));
                }
                Ok(AiEnrichment {
                    short_title: format!("short {}", record.link),
                    note: "note".into(),
                })
            })
        }
        fn provider_name(&self) -> &'static str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn never_exceeds_concurrency_and_keeps_order() {
        let client = Scripted::new(20);
        let enricher = Enricher::new(client.clone(), 2, Duration::from_secs(5));
        let input: Vec<_> = (0..7).map(|i| cand(&format!("l{i}"))).collect();

        let out = enricher.enrich_all(input).await;
        assert!(client.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(client.peak.load(Ordering::SeqCst), 2);
        let links: Vec<_> = out.records.iter().map(|r| r.link.clone()).collect();
        assert_eq!(links, (0..7).map(|i| format!("l{i}")).collect::<Vec<_>>());
        assert_eq!(out.enriched, 7);
        assert_eq!(out.fallback, 0);
    }

    #[tokio::test]
    async fn failures_are_isolated() {
        let enricher = Enricher::new(Scripted::new(1), 2, Duration::from_secs(5));
        let out = enricher
            .enrich_all(vec![cand("good"), cand("bad"), cand("boom"), cand("fine")])
            .await;

        assert_eq!(out.enriched, 2);
        assert_eq!(out.fallback, 2);
        let bad = &out.records[1];
        assert_eq!(bad.enrichment_status, EnrichmentStatus::FallbackOriginal);
        assert_eq!(bad.short_title.as_deref(), Some(bad.display_title.as_str()));
        assert!(bad.note.is_none());
        assert_eq!(out.records[2].enrichment_status, EnrichmentStatus::FallbackOriginal);
        assert_eq!(out.records[3].short_title.as_deref(), Some("short fine"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_an_ordinary_fallback() {
        let enricher = Enricher::new(Scripted::new(1), 1, Duration::from_secs(2));
        let out = enricher.enrich_all(vec![cand("slow"), cand("ok")]).await;
        assert_eq!(out.records[0].enrichment_status, EnrichmentStatus::FallbackOriginal);
        assert_eq!(out.records[1].enrichment_status, EnrichmentStatus::Enriched);
    }

    #[tokio::test]
    async fn disabled_client_keeps_headlines() {
        let enricher = Enricher::new(Arc::new(DisabledClient), 2, Duration::from_secs(1));
        let out = enricher.enrich_all(vec![cand("a"), cand("b")]).await;
        assert_eq!(out.fallback, 2);
        assert!(out
            .records
            .iter()
            .all(|r| r.short_title.as_deref() == Some(r.display_title.as_str())));
    }

    #[tokio::test]
    async fn empty_input_is_a_no_op() {
        let enricher = Enricher::new(Arc::new(DisabledClient), 2, Duration::from_secs(1));
        let out = enricher.enrich_all(vec![]).await;
        assert!(out.records.is_empty());
    }

    #[tokio::test]
    async fn closed_pool_falls_back_without_calling_provider() {
        let client = Scripted::new(1);
        let semaphore = Arc::new(Semaphore::new(1));
        semaphore.close();
        let permit = semaphore.clone().acquire_owned().await;
        assert!(permit.is_err());

        let rec = spawn_enrichment(permit, client.clone(), cand("l0"), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(rec.enrichment_status, EnrichmentStatus::FallbackOriginal);
        assert_eq!(rec.short_title.as_deref(), Some("l0 headline"));
        assert_eq!(client.peak.load(Ordering::SeqCst), 0);
    }
}
