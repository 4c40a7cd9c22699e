// src/ingest/rank.rs
//! Newest-first ordering and the capacity cut.
//!
//! Ties on `published_at` keep their input order (stable sort). The pipeline
//! feeds stored records first, then new ones in fetch order, so a rerun over
//! an unchanged collection reproduces it exactly.

use chrono::{DateTime, Utc};

use crate::ingest::types::EnrichedRecord;
use crate::ingest::MAX_ITEMS;

#[derive(Debug, Default)]
pub struct Ranked {
    pub records: Vec<EnrichedRecord>,
    /// Records cut by the capacity bound (oldest first to go).
    pub dropped: usize,
}

/// Sort `existing ++ new_ones` by `published_at` descending and keep at most
/// `cap` records. `cap` is clamped to [`MAX_ITEMS`].
pub fn rank_and_trim(
    existing: Vec<EnrichedRecord>,
    new_ones: Vec<EnrichedRecord>,
    cap: usize,
) -> Ranked {
    let cap = cap.min(MAX_ITEMS);
    let mut records = existing;
    records.extend(new_ones);
    records.sort_by(|a, b| b.published_at.cmp(&a.published_at));

    let dropped = records.len().saturating_sub(cap);
    records.truncate(cap);
    Ranked { records, dropped }
}

/// Timestamp at or below which a new record cannot make the cut.
///
/// With at least `cap` stored records, every new record no newer than the
/// `cap`-th newest stored one sorts after all of them (stored records win
/// ties), so it is always trimmed. `None` while the collection has room.
pub fn survival_floor(existing: &[EnrichedRecord], cap: usize) -> Option<DateTime<Utc>> {
    let cap = cap.min(MAX_ITEMS);
    if cap == 0 || existing.len() < cap {
        return None;
    }
    let mut stamps: Vec<DateTime<Utc>> = existing.iter().map(|r| r.published_at).collect();
    stamps.sort_unstable_by(|a, b| b.cmp(a));
    Some(stamps[cap - 1])
}
