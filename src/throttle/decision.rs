//! Throttle outcomes.

use serde::Serialize;
use std::time::Duration;

use super::policy::ceil_secs;

/// Outcome of a single [`Throttle::admit`](super::Throttle::admit) call.
///
/// A rejection is ordinary control flow: the caller stops processing and
/// hands `retry_after_secs` back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed
    Admit {
        /// The policy's cap
        limit: u32,
        /// Requests still admitted in this window
        remaining: u32,
        /// Time until the window resets
        resets_in: Duration,
    },
    /// The request exceeded the cap
    Reject {
        /// The policy's cap
        limit: u32,
        /// Whole seconds until the window resets, rounded up
        retry_after_secs: u64,
        /// Time until the window resets
        resets_in: Duration,
    },
}

impl Decision {
    pub(crate) fn reject(limit: u32, resets_in: Duration) -> Self {
        Decision::Reject {
            limit,
            retry_after_secs: ceil_secs(resets_in),
            resets_in,
        }
    }

    /// Whether the request was admitted.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admit { .. })
    }

    /// The cap of the policy that produced this decision.
    pub fn limit(&self) -> u32 {
        match *self {
            Decision::Admit { limit, .. } | Decision::Reject { limit, .. } => limit,
        }
    }

    /// Requests still admitted in this window; zero once rejected.
    pub fn remaining(&self) -> u32 {
        match *self {
            Decision::Admit { remaining, .. } => remaining,
            Decision::Reject { .. } => 0,
        }
    }

    /// Time until the window resets.
    pub fn resets_in(&self) -> Duration {
        match *self {
            Decision::Admit { resets_in, .. } | Decision::Reject { resets_in, .. } => resets_in,
        }
    }

    /// Retry hint for rejected requests.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match *self {
            Decision::Admit { .. } => None,
            Decision::Reject {
                retry_after_secs, ..
            } => Some(retry_after_secs),
        }
    }
}

/// A bucket's usage, read without counting a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Usage {
    /// Requests counted in the current window
    pub count: u32,
    /// The policy's cap
    pub limit: u32,
    /// Requests still admitted in this window
    pub remaining: u32,
    /// Whole seconds until the window resets, rounded up
    pub resets_in_secs: u64,
}
