//! Throttle trait for abstracting the counter store.

use async_trait::async_trait;

use super::decision::{Decision, Usage};
use super::key::BucketKey;
use super::policy::Policy;
use super::limiter::Throttle;

/// Trait for throttle implementations.
///
/// The HTTP layer only talks to this trait, so a store shared between
/// instances could replace the in-process [`Throttle`] without touching
/// handlers.
#[async_trait]
pub trait ThrottleBackend: Send + Sync {
    /// Count a request for `key` and decide whether to admit it.
    async fn admit(&self, key: &BucketKey, policy: Policy) -> Decision;

    /// Report the usage of `key` without counting a request.
    async fn usage(&self, key: &BucketKey, policy: Policy) -> Usage;
}

#[async_trait]
impl ThrottleBackend for Throttle {
    async fn admit(&self, key: &BucketKey, policy: Policy) -> Decision {
        Throttle::admit(self, key, policy)
    }

    async fn usage(&self, key: &BucketKey, policy: Policy) -> Usage {
        Throttle::usage(self, key, policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_throttle_through_trait_object() {
        let backend: Arc<dyn ThrottleBackend> = Arc::new(Throttle::new());
        let key = BucketKey::new("donation_checkout", "10.0.0.1");
        let policy = Policy::from_millis(1, 60_000).unwrap();

        assert!(backend.admit(&key, policy).await.is_admitted());
        assert!(!backend.admit(&key, policy).await.is_admitted());

        let usage = backend.usage(&key, policy).await;
        assert_eq!(usage.count, 2);
        assert_eq!(usage.remaining, 0);
    }
}
