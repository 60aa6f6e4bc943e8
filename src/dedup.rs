//! Duplicate suppression for providers that re-log the same message when a
//! session file is rewritten. Scope is a single session file; the set is
//! never shared across files.

use std::collections::HashSet;
use std::hash::{BuildHasher, BuildHasherDefault, Hasher};

type FingerprintHasher = BuildHasherDefault<std::collections::hash_map::DefaultHasher>;

/// Bounded set of 64-bit fingerprints.
#[derive(Debug)]
pub struct MessageDeduper {
    seen: HashSet<u64>,
    capacity: usize,
}

impl MessageDeduper {
    pub fn init(capacity: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a fingerprint. Returns `false` when it was already present (or
    /// the set is full, so a re-processed tail cannot grow it unboundedly).
    pub fn mark(&mut self, fingerprint: u64) -> bool {
        if self.seen.contains(&fingerprint) {
            return false;
        }
        if self.seen.len() >= self.capacity {
            return false;
        }
        self.seen.insert(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Fingerprint for a `(message id, request id)` pair. The two halves are
/// hashed independently and xor-combined, so a swapped pair still collides
/// with itself but not with unrelated ids sharing a concatenation.
pub fn message_fingerprint(message_id: &str, request_id: &str) -> u64 {
    hash_str(message_id) ^ hash_str(request_id)
}

fn hash_str(text: &str) -> u64 {
    // Fixed-seed hasher: fingerprints must be stable within a run but never
    // leave the process.
    let mut hasher = FingerprintHasher::default().build_hasher();
    hasher.write(text.as_bytes());
    hasher.finish()
}
