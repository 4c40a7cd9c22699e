//! Collection file I/O.
//!
//! The file is a pretty-printed JSON array of [`EnrichedRecord`], newest
//! first. Readers always see a complete file: writes go to a temp file in
//! the same directory which is then renamed over the target.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{PersistenceError, StoreReadError};
use crate::ingest::types::EnrichedRecord;

#[derive(Debug, Clone)]
pub struct CollectionStore {
    path: PathBuf,
}

impl CollectionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the collection. A missing or blank file is an empty collection.
    ///
    /// Individual entries that do not deserialize (or have a blank link) are
    /// skipped with a warning; only a file that is not a JSON array at all
    /// is reported as corrupt.
    pub async fn try_load(&self) -> Result<Vec<EnrichedRecord>, StoreReadError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreReadError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        let values: Vec<serde_json::Value> =
            serde_json::from_str(&raw).map_err(|source| StoreReadError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        let mut out = Vec::with_capacity(values.len());
        for (idx, v) in values.into_iter().enumerate() {
            match serde_json::from_value::<EnrichedRecord>(v) {
                Ok(mut rec) if !rec.link.trim().is_empty() => {
                    if rec.raw_title.is_empty() {
                        rec.raw_title = rec.display_title.clone();
                    }
                    out.push(rec);
                }
                Ok(_) => {
                    tracing::warn!(target: "store", index = idx, "stored record without link dropped");
                }
                Err(e) => {
                    tracing::warn!(target: "store", index = idx, error = %e, "unreadable stored record dropped");
                }
            }
        }
        Ok(out)
    }

    /// Like [`try_load`](Self::try_load), but a read failure degrades to an
    /// empty collection.
    pub async fn load(&self) -> Vec<EnrichedRecord> {
        match self.try_load().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(target: "store", error = %e, "prior collection unreadable, starting empty");
                Vec::new()
            }
        }
    }

    /// Replace the collection file atomically.
    ///
    /// The write runs on a blocking task that is not tied to the caller's
    /// future: once started it finishes (or fails without touching the
    /// target) even if the caller is dropped.
    pub async fn persist(&self, records: &[EnrichedRecord]) -> Result<(), PersistenceError> {
        let bytes = encode(records)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| PersistenceError::Interrupted(e.to_string()))?
    }
}

/// Serialized form of a collection (2-space indent, trailing newline).
pub fn encode(records: &[EnrichedRecord]) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec_pretty(records)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Write `bytes` to a sibling temp file, fsync, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let io_err = |source: io::Error| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(io_err)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "collection.json".to_string());
    let tmp = parent.join(format!(".{file_name}.tmp-{}", std::process::id()));

    let result = (|| -> io::Result<()> {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(io_err(e));
    }
    Ok(())
}
