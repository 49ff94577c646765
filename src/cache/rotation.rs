//! Cache Rotation Policy
//!
//! Decides which entries to evict before a write so that, after the
//! write, a pool holds at most `max_size` entries. Eviction happens before
//! the new entry lands, so capacity is never exceeded, not even briefly.
//! No I/O happens here.

/// Number of entries to evict from a pool of `len` entries before one
/// more is written
///
/// `max_size == 0` means the pool is disabled; nothing is ever written,
/// so nothing is evicted either.
pub fn evict_count(len: usize, max_size: usize) -> usize {
    if max_size == 0 || len < max_size {
        0
    } else {
        len - max_size + 1
    }
}

/// Entries to evict from `existing` (sorted oldest first) to make room
/// for exactly one new entry
pub fn rotate<T>(existing: &[T], max_size: usize) -> &[T] {
    &existing[..evict_count(existing.len(), max_size)]
}
