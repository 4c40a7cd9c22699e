// tests/common/mod.rs
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use parking_lot::Mutex;

use fuchupo_news::ai_adapter::{AiClient, AiEnrichment, EnrichFuture};
use fuchupo_news::clock::{Clock, FixedClock};
use fuchupo_news::enrich::Enricher;
use fuchupo_news::{
    CandidateRecord, CollectionStore, EnrichmentError, FeedSource, FetchError, Pipeline,
    PipelineOptions,
};

pub const NOW: i64 = 1_750_000_000;

pub fn cand(link: &str, ts: i64) -> CandidateRecord {
    CandidateRecord {
        raw_title: format!("{link} headline - Paper"),
        display_title: format!("{link} headline"),
        source_publisher: Some("Paper".to_string()),
        link: link.to_string(),
        published_at: DateTime::from_timestamp(ts, 0).unwrap(),
        description: None,
        author: None,
        tags: vec![],
    }
}

/// Feed that replays a script of responses; the last one repeats.
pub struct ScriptedFeed {
    script: Mutex<VecDeque<Result<Vec<CandidateRecord>, FetchError>>>,
    last: Vec<CandidateRecord>,
    pub calls: AtomicUsize,
}

impl ScriptedFeed {
    pub fn ok(items: Vec<CandidateRecord>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            last: items,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn with_script(
        script: Vec<Result<Vec<CandidateRecord>, FetchError>>,
        then: Vec<CandidateRecord>,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            last: then,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl FeedSource for ScriptedFeed {
    async fn fetch_latest(&self, _clock: &dyn Clock) -> Result<Vec<CandidateRecord>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().pop_front() {
            Some(r) => r,
            None => Ok(self.last.clone()),
        }
    }
    fn name(&self) -> &str {
        "scripted"
    }
}

/// AI stub: records every link it is asked about; fails for links containing
/// "fail", stalls for links containing "stall".
#[derive(Default)]
pub struct RecordingAi {
    pub seen: Mutex<Vec<String>>,
}

impl AiClient for RecordingAi {
    fn enrich<'a>(&'a self, record: &'a CandidateRecord) -> EnrichFuture<'a> {
        Box::pin(async move {
            self.seen.lock().push(record.link.clone());
            if record.link.contains("stall") {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if record.link.contains("fail") {
                return Err(EnrichmentError::Provider("upstream 500".into()));
            }
            Ok(AiEnrichment {
                short_title: format!("AI {}", record.link),
                note: format!("note for {}", record.link),
            })
        })
    }
    fn provider_name(&self) -> &'static str {
        "recording"
    }
}

pub fn pipeline(
    feed: Arc<dyn FeedSource>,
    ai: Arc<RecordingAi>,
    path: &Path,
    opts: PipelineOptions,
) -> Pipeline {
    Pipeline::new(
        feed,
        CollectionStore::new(path),
        Enricher::new(ai, 2, Duration::from_secs(5)),
        Arc::new(FixedClock::at_unix(NOW)),
        opts,
    )
}

pub fn quick_opts() -> PipelineOptions {
    PipelineOptions {
        fetch_retries: 0,
        fetch_backoff: Duration::from_millis(1),
        ..PipelineOptions::default()
    }
}
