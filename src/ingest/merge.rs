// src/ingest/merge.rs
//! Link-identity merge of freshly fetched candidates into the stored
//! collection. Links are compared byte-for-byte: no case folding, no URL
//! canonicalisation, no title similarity.

use std::collections::HashSet;

use crate::ingest::types::{CandidateRecord, EnrichedRecord};

#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Candidates whose link is not in the collection, in fetch order.
    pub new_ones: Vec<CandidateRecord>,
    /// Stored records, untouched apart from duplicate removal.
    pub existing: Vec<EnrichedRecord>,
    /// Candidates dropped because they repeated a link (stored or earlier in the batch).
    pub already_known: usize,
    /// Stored records dropped because an earlier stored record had the same link.
    pub stored_duplicates: usize,
}

pub fn merge(existing: Vec<EnrichedRecord>, candidates: Vec<CandidateRecord>) -> MergeOutcome {
    let mut seen: HashSet<String> = HashSet::with_capacity(existing.len() + candidates.len());

    let mut kept = Vec::with_capacity(existing.len());
    let mut stored_duplicates = 0usize;
    for rec in existing {
        if seen.insert(rec.link.clone()) {
            kept.push(rec);
        } else {
            stored_duplicates += 1;
        }
    }

    let mut new_ones = Vec::new();
    let mut already_known = 0usize;
    for c in candidates {
        if seen.insert(c.link.clone()) {
            new_ones.push(c);
        } else {
            already_known += 1;
        }
    }

    MergeOutcome {
        new_ones,
        existing: kept,
        already_known,
        stored_duplicates,
    }
}
