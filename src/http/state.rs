//! State shared by every handler and route middleware.

use std::sync::Arc;

use crate::throttle::{PolicyRegistry, ThrottleBackend};

/// Shared application state for handlers.
#[derive(Clone)]
pub struct AppState {
    /// Counter store every throttled route admits through
    pub throttle: Arc<dyn ThrottleBackend>,
    /// Named policies, claimed by routes at construction
    pub policies: Arc<PolicyRegistry>,
    /// Whether proxy headers decide the client identity
    pub trust_forwarded_headers: bool,
}

impl AppState {
    /// Bundle the counter store, the policy registry and the identity setting.
    pub fn new(
        throttle: Arc<dyn ThrottleBackend>,
        policies: Arc<PolicyRegistry>,
        trust_forwarded_headers: bool,
    ) -> Self {
        Self {
            throttle,
            policies,
            trust_forwarded_headers,
        }
    }
}
