//! Authoritative, concurrency-safe credit counters keyed by server-issued token identity.

use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};

/// Per-token allowance and consumption.
///
/// `used` is an atomic counter so that `Use` is lock-free once the entry exists;
/// `allowance` is immutable after `Register` and needs no synchronization.
struct Entry {
    allowance: i64,
    used: AtomicI64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("token not found")]
    TokenNotFound,
    #[error("allowance exhausted")]
    Exhausted,
    #[error("allowance must be positive, got {0}")]
    InvalidAllowance(i64),
}

/// Sharded concurrent map of TokenID -> allowance entry.
///
/// Register-if-absent is the only composed operation and is performed under
/// `dashmap`'s per-shard entry API, which is atomic with respect to other readers
/// and writers of the same shard.
#[derive(Default)]
pub struct CounterStore {
    entries: DashMap<String, Entry>,
}

impl CounterStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Idempotent. First call creates the entry; re-registration for the same
    /// token id is a no-op and does not update the stored allowance.
    pub fn register(&self, token_id: &str, allowance: i64) -> Result<(), StoreError> {
        if allowance <= 0 {
            return Err(StoreError::InvalidAllowance(allowance));
        }
        self.entries.entry(token_id.to_string()).or_insert_with(|| Entry {
            allowance,
            used: AtomicI64::new(0),
        });
        Ok(())
    }

    /// Attempts to consume one credit. `claimed_allowance` is accepted for interface
    /// symmetry with the signed token claims but has no effect: the stored allowance
    /// is always authoritative (see Open Question (a) in `DESIGN.md`).
    pub fn r#use(&self, token_id: &str, _claimed_allowance: i64) -> Result<i64, StoreError> {
        let entry = self
            .entries
            .get(token_id)
            .ok_or(StoreError::TokenNotFound)?;
        loop {
            let used = entry.used.load(Ordering::Acquire);
            let next = used + 1;
            if next > entry.allowance {
                return Err(StoreError::Exhausted);
            }
            if entry
                .used
                .compare_exchange(used, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(entry.allowance - next);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn register_is_idempotent() {
        let store = CounterStore::new();
        store.register("t1", 3).unwrap();
        store.register("t1", 99).unwrap();
        assert_eq!(store.r#use("t1", 3).unwrap(), 2);
        assert_eq!(store.r#use("t1", 3).unwrap(), 1);
        assert_eq!(store.r#use("t1", 3).unwrap(), 0);
        assert_eq!(store.r#use("t1", 3), Err(StoreError::Exhausted));
    }

    #[test]
    fn use_on_unregistered_token_is_not_found() {
        let store = CounterStore::new();
        assert_eq!(store.r#use("ghost", 1), Err(StoreError::TokenNotFound));
    }

    #[test]
    fn register_rejects_non_positive_allowance() {
        let store = CounterStore::new();
        assert!(store.register("t1", 0).is_err());
        assert!(store.register("t1", -1).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn no_overdraw_under_concurrent_use() {
        let store = Arc::new(CounterStore::new());
        store.register("t1", 3).unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move { store.r#use("t1", 3) }));
        }
        let mut remainders = Vec::new();
        let mut exhausted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(remaining) => remainders.push(remaining),
                Err(StoreError::Exhausted) => exhausted += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        remainders.sort_unstable();
        assert_eq!(remainders, vec![0, 1, 2]);
        assert_eq!(exhausted, 1);
    }
}
