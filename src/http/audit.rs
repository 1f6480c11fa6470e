//! Audit trail for throttle rejections.
//!
//! Events go to the `audit` tracing target so they can be routed separately
//! from operational logs with a filter such as `audit=info`.

use tracing::warn;
use uuid::Uuid;

use crate::throttle::{BucketKey, Decision};

/// Record a rejected request and return the audit event id.
pub fn record_rejection(key: &BucketKey, decision: &Decision, path: &str) -> Uuid {
    let event_id = Uuid::new_v4();
    warn!(
        target: "audit",
        event_id = %event_id,
        scope = %key.scope,
        identity = %key.identity,
        shared_bucket = key.is_unknown_identity(),
        path,
        limit = decision.limit(),
        retry_after_secs = decision.retry_after_secs().unwrap_or(0),
        "Request throttled"
    );
    event_id
}
