// src/lib.rs
// Public library surface for the CLI and integration tests.

pub mod clock;
pub mod config;
pub mod enrich;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod store;

// ---- Re-exports for stable public API ----
pub use enrich::ai_adapter;
pub use error::{EnrichmentError, FetchError, PersistenceError, RunError, StoreReadError};
pub use ingest::types::{CandidateRecord, EnrichedRecord, EnrichmentStatus, FeedSource};
pub use ingest::MAX_ITEMS;
pub use pipeline::{cancel_pair, CancelHandle, CancelSignal, Pipeline, PipelineOptions, RunStage, RunSummary};
pub use store::CollectionStore;
