//! Core throttle implementation.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::decision::{Decision, Usage};
use super::entry::ThrottleEntry;
use super::key::BucketKey;
use super::policy::{ceil_secs, Policy};

/// The in-memory, fixed-window request throttle.
///
/// This struct is thread-safe and can be shared across multiple tasks. The
/// lookup-and-increment of [`Throttle::admit`] runs under the map's entry
/// lock, so concurrent requests for one key cannot exceed the cap. State is
/// process-local and starts empty on every restart.
#[derive(Debug, Default)]
pub struct Throttle {
    /// Live entries indexed by bucket key
    entries: DashMap<BucketKey, ThrottleEntry>,
}

impl Throttle {
    /// Create an empty throttle.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Decide whether to admit a request for `key` under `policy`.
    pub fn admit(&self, key: &BucketKey, policy: Policy) -> Decision {
        self.admit_at(key, policy, Instant::now())
    }

    /// Decide whether to admit a request for `key` arriving at `now`.
    pub fn admit_at(&self, key: &BucketKey, policy: Policy, now: Instant) -> Decision {
        let limit = policy.max_requests();
        let window = policy.window();

        let decision = match self.entries.entry(key.clone()) {
            Entry::Vacant(vacant) => {
                debug!(key = %key, limit, window = ?window, "Opening throttle window");
                let entry = vacant.insert(ThrottleEntry::open(now, window));
                Decision::Admit {
                    limit,
                    remaining: entry.remaining(limit),
                    resets_in: window,
                }
            }
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.is_expired(now) {
                    debug!(key = %key, limit, window = ?window, "Reopening expired throttle window");
                    *entry = ThrottleEntry::open(now, window);
                    Decision::Admit {
                        limit,
                        remaining: entry.remaining(limit),
                        resets_in: window,
                    }
                } else if entry.record() > limit {
                    debug!(key = %key, count = entry.count, limit, "Throttle limit exceeded");
                    Decision::reject(limit, entry.resets_in(now))
                } else {
                    Decision::Admit {
                        limit,
                        remaining: entry.remaining(limit),
                        resets_in: entry.resets_in(now),
                    }
                }
            }
        };

        trace!(key = %key, admitted = decision.is_admitted(), "Throttle decision");
        decision
    }

    /// Report the usage of `key` under `policy` without counting a request.
    pub fn usage(&self, key: &BucketKey, policy: Policy) -> Usage {
        self.usage_at(key, policy, Instant::now())
    }

    /// Report the usage of `key` at `now` without counting a request.
    pub fn usage_at(&self, key: &BucketKey, policy: Policy, now: Instant) -> Usage {
        let limit = policy.max_requests();

        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Usage {
                count: entry.count,
                limit,
                remaining: entry.remaining(limit),
                resets_in_secs: ceil_secs(entry.resets_in(now)),
            },
            _ => Usage {
                count: 0,
                limit,
                remaining: limit,
                resets_in_secs: policy.window_secs_ceil(),
            },
        }
    }

    /// Remove every expired entry, returning how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Remove every entry expired at `now`, returning how many were removed.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let live = !entry.is_expired(now);
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }

    /// Get the current count for a key, if it has an entry.
    ///
    /// Expired entries that have not been swept are still reported.
    pub fn count(&self, key: &BucketKey) -> Option<u32> {
        self.entries.get(key).map(|entry| entry.count)
    }

    /// Clear all entries.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Get the number of physically stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn per_minute(max: u32) -> Policy {
        Policy::from_millis(max, 60_000).unwrap()
    }

    #[test]
    fn test_throttle_creation() {
        let throttle = Throttle::new();
        assert!(throttle.is_empty());
    }

    #[test]
    fn test_first_request_opens_window() {
        let throttle = Throttle::new();
        let key = BucketKey::new("lookup", "10.0.0.1");
        let now = Instant::now();

        let decision = throttle.admit_at(&key, per_minute(3), now);

        assert_eq!(
            decision,
            Decision::Admit {
                limit: 3,
                remaining: 2,
                resets_in: secs(60),
            }
        );
        assert_eq!(throttle.count(&key), Some(1));
        assert_eq!(throttle.len(), 1);
    }

    #[test]
    fn test_rejects_after_limit_then_reopens() {
        let throttle = Throttle::new();
        let key = BucketKey::new("lookup", "10.0.0.1");
        let policy = per_minute(3);
        let t0 = Instant::now();

        assert!(throttle.admit_at(&key, policy, t0).is_admitted());
        assert!(throttle.admit_at(&key, policy, t0 + secs(1)).is_admitted());
        assert!(throttle.admit_at(&key, policy, t0 + secs(2)).is_admitted());

        let rejected = throttle.admit_at(&key, policy, t0 + secs(3));
        assert_eq!(rejected.retry_after_secs(), Some(57));

        let reopened = throttle.admit_at(&key, policy, t0 + secs(61));
        assert!(reopened.is_admitted());
        assert_eq!(reopened.remaining(), 2);
        assert_eq!(throttle.count(&key), Some(1));
    }

    #[test]
    fn test_window_resets_exactly_at_window_end() {
        let throttle = Throttle::new();
        let key = BucketKey::new("lookup", "10.0.0.1");
        let policy = per_minute(1);
        let t0 = Instant::now();

        assert!(throttle.admit_at(&key, policy, t0).is_admitted());
        assert!(!throttle.admit_at(&key, policy, t0 + Duration::from_millis(59_999)).is_admitted());
        assert!(throttle.admit_at(&key, policy, t0 + secs(60)).is_admitted());
    }

    #[test]
    fn test_limit_holds_for_many_requests() {
        let throttle = Throttle::new();
        let key = BucketKey::new("auth_login", "10.0.0.1");
        let policy = per_minute(10);
        let t0 = Instant::now();

        let admitted = (0..50)
            .filter(|i| {
                throttle
                    .admit_at(&key, policy, t0 + Duration::from_millis(*i * 100))
                    .is_admitted()
            })
            .count();

        assert_eq!(admitted, 10);
    }

    #[test]
    fn test_retry_after_is_bounded_by_window() {
        let throttle = Throttle::new();
        let key = BucketKey::new("lookup", "10.0.0.1");
        let policy = Policy::from_millis(1, 2_500).unwrap();
        let t0 = Instant::now();

        throttle.admit_at(&key, policy, t0);
        for offset_ms in [0, 1, 500, 1_000, 2_499] {
            let decision = throttle.admit_at(&key, policy, t0 + Duration::from_millis(offset_ms));
            let retry = decision.retry_after_secs().unwrap();
            assert!(retry <= policy.window_secs_ceil(), "retry {} at {}ms", retry, offset_ms);
        }
    }

    #[test]
    fn test_identities_are_isolated() {
        let throttle = Throttle::new();
        let a = BucketKey::new("lookup", "10.0.0.1");
        let b = BucketKey::new("lookup", "10.0.0.2");
        let policy = per_minute(1);
        let now = Instant::now();

        assert!(throttle.admit_at(&a, policy, now).is_admitted());
        assert!(throttle.admit_at(&b, policy, now).is_admitted());
        assert!(!throttle.admit_at(&a, policy, now).is_admitted());
        assert_eq!(throttle.count(&b), Some(1));
    }

    #[test]
    fn test_scopes_are_isolated() {
        let throttle = Throttle::new();
        let login = BucketKey::new("auth_login", "10.0.0.1");
        let lookup = BucketKey::new("lookup", "10.0.0.1");
        let policy = per_minute(1);
        let now = Instant::now();

        assert!(throttle.admit_at(&login, policy, now).is_admitted());
        assert!(throttle.admit_at(&lookup, policy, now).is_admitted());
    }

    #[test]
    fn test_usage_does_not_count() {
        let throttle = Throttle::new();
        let key = BucketKey::new("lookup", "10.0.0.1");
        let policy = per_minute(5);
        let t0 = Instant::now();

        let usage = throttle.usage_at(&key, policy, t0);
        assert_eq!(usage.count, 0);
        assert_eq!(usage.remaining, 5);
        assert_eq!(usage.resets_in_secs, 60);

        throttle.admit_at(&key, policy, t0);
        throttle.admit_at(&key, policy, t0);

        let usage = throttle.usage_at(&key, policy, t0 + secs(10));
        assert_eq!(usage.count, 2);
        assert_eq!(usage.remaining, 3);
        assert_eq!(usage.resets_in_secs, 50);
        assert_eq!(throttle.count(&key), Some(2));

        let usage = throttle.usage_at(&key, policy, t0 + secs(60));
        assert_eq!(usage.count, 0);
    }

    #[test]
    fn test_sweep_removes_expired_entries() {
        let throttle = Throttle::new();
        let policy = per_minute(3);
        let t0 = Instant::now();

        for i in 0..100 {
            let key = BucketKey::new("lookup", &format!("10.0.0.{}", i));
            throttle.admit_at(&key, policy, t0);
        }
        assert_eq!(throttle.len(), 100);

        assert_eq!(throttle.sweep_at(t0 + secs(30)), 0);
        assert_eq!(throttle.len(), 100);

        assert_eq!(throttle.sweep_at(t0 + secs(61)), 100);
        assert!(throttle.is_empty());
    }

    #[test]
    fn test_sweep_keeps_live_entries() {
        let throttle = Throttle::new();
        let policy = per_minute(3);
        let t0 = Instant::now();

        throttle.admit_at(&BucketKey::new("lookup", "old"), policy, t0);
        throttle.admit_at(&BucketKey::new("lookup", "new"), policy, t0 + secs(45));

        assert_eq!(throttle.sweep_at(t0 + secs(60)), 1);
        assert_eq!(throttle.count(&BucketKey::new("lookup", "new")), Some(1));
    }

    #[test]
    fn test_clear() {
        let throttle = Throttle::new();
        throttle.admit(&BucketKey::new("lookup", "10.0.0.1"), per_minute(1));
        assert_eq!(throttle.len(), 1);

        throttle.clear();
        assert!(throttle.is_empty());
    }

    #[test]
    fn test_concurrent_admissions_respect_limit() {
        let throttle = Arc::new(Throttle::new());
        let key = BucketKey::new("support_ticket", "10.0.0.1");
        let policy = per_minute(25);
        let now = Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let throttle = Arc::clone(&throttle);
                let key = key.clone();
                std::thread::spawn(move || {
                    (0..20)
                        .filter(|_| throttle.admit_at(&key, policy, now).is_admitted())
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 25);
        assert_eq!(throttle.count(&key), Some(160));
    }
}
