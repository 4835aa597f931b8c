//! Duplicate-delivery guard for the webhook ingest. Mirrors the shape of `middleware::rate_limit::RateLimitLayer`:
//! a `parking_lot::Mutex`-guarded map, insert-and-check on the hot path,
//! `cleanup` called from a background tick rather than on every
//! request.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct DedupSet {
    ttl: Duration,
    seen: Arc<Mutex<HashMap<String, Instant>>>,
}

impl DedupSet {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns `true` if `transaction_id` was already recorded within the
    /// TTL window — the caller should respond 200 `duplicate:true` without
    /// re-running the matcher. Always records the id, first-seen or not.
    pub fn check_and_insert(&self, transaction_id: &str) -> bool {
        let mut seen = self.seen.lock();
        let now = Instant::now();
        if let Some(first_seen) = seen.get(transaction_id) {
            if now.duration_since(*first_seen) < self.ttl {
                return true;
            }
        }
        seen.insert(transaction_id.to_string(), now);
        false
    }

    /// Periodic cleanup of expired entries — expected to run on a 60s
    /// background tick, not inline per request.
    pub fn cleanup(&self) {
        let mut seen = self.seen.lock();
        let ttl = self.ttl;
        let now = Instant::now();
        seen.retain(|_, first_seen| now.duration_since(*first_seen) < ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_insert_within_ttl_is_duplicate() {
        let set = DedupSet::new(Duration::from_secs(300));
        assert!(!set.check_and_insert("tx1"));
        assert!(set.check_and_insert("tx1"));
    }

    #[test]
    fn cleanup_evicts_expired_entries() {
        let set = DedupSet::new(Duration::from_millis(1));
        set.check_and_insert("tx1");
        std::thread::sleep(Duration::from_millis(5));
        set.cleanup();
        assert!(!set.check_and_insert("tx1"));
    }
}
