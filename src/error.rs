//! Error taxonomy for one ingest run.
//!
//! Only [`FetchError`] and [`PersistenceError`] ever abort a run. Store read
//! problems and per-item enrichment failures are recovered where they happen
//! and only show up as warnings and summary counts.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Retrieving or parsing the source feed failed. Fatal to the run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("malformed feed: {0}")]
    Parse(String),

    #[error("invalid feed url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// The prior collection could not be read. Logged and treated as empty.
#[derive(Debug, Error)]
pub enum StoreReadError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt collection in {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A single enrichment call failed. Always degrades to the original title.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("enrichment disabled")]
    Disabled,

    #[error("enrichment call timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("provider returned HTTP {0}")]
    Status(u16),

    #[error("malformed reply: {0}")]
    MalformedReply(String),

    #[error("reply field `{0}` is empty")]
    EmptyField(&'static str),

    #[error("enrichment task aborted: {0}")]
    Aborted(String),
}

/// Writing the final collection failed. Fatal; the previous file stays intact.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serializing collection: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("persist task did not complete: {0}")]
    Interrupted(String),
}

/// Outcome of a failed run, tagged with the stage that failed.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("fetch stage failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("persist stage failed: {0}")]
    Persist(#[from] PersistenceError),

    #[error("run cancelled during {0}")]
    Cancelled(&'static str),
}

impl RunError {
    /// Name of the stage the run died in, for diagnostics and metric labels.
    pub fn stage(&self) -> &'static str {
        match self {
            RunError::Fetch(_) => "fetching",
            RunError::Persist(_) => "persisting",
            RunError::Cancelled(stage) => stage,
        }
    }
}
