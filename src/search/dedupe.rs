//! Collapses duplicate records by content hash.
//!
//! Both upstreams index largely the same editions, keyed by the same
//! 32-hex content hash. Records sharing a hash are collapsed to one, with
//! the api source's record winning the tie (it carries richer metadata such
//! as cover URLs). Records without a hash are kept untouched: the upstream
//! data gives no safe way to tell two hash-less entries apart, so they are
//! never merged, even when title and author happen to match.

use std::collections::HashMap;

use crate::record::BookRecord;

/// Deduplicates by content hash (case-insensitive). Hashed records come
/// first in first-seen order, then hash-less records in their original
/// relative order. Idempotent.
#[must_use]
pub fn dedupe(records: Vec<BookRecord>) -> Vec<BookRecord> {
    let mut order: Vec<String> = Vec::new();
    let mut by_hash: HashMap<String, BookRecord> = HashMap::new();
    let mut hashless: Vec<BookRecord> = Vec::new();

    for record in records {
        let key = record.content_hash.to_ascii_lowercase();
        if key.is_empty() {
            hashless.push(record);
            continue;
        }
        match by_hash.entry(key) {
            std::collections::hash_map::Entry::Vacant(slot) => {
                order.push(slot.key().clone());
                slot.insert(record);
            }
            std::collections::hash_map::Entry::Occupied(mut slot) => {
                if record.source.dedup_rank() < slot.get().source.dedup_rank() {
                    slot.insert(record);
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| by_hash.remove(&key))
        .chain(hashless)
        .collect()
}
