//! Per-route throttle middleware.
//!
//! Each throttled route carries a [`RouteThrottle`] naming its policy. The
//! middleware counts the request before the handler runs and answers 429
//! without calling the handler once the client's window is used up.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{error, instrument, trace};

use super::audit;
use super::error::{ApiError, RateLimitHeaders};
use super::identity::client_identity;
use super::state::AppState;
use crate::error::Result;
use crate::throttle::{BucketKey, Decision, Policy};

/// Throttle settings of one route: the shared state plus the policy it runs under.
#[derive(Clone)]
pub struct RouteThrottle {
    state: AppState,
    scope: &'static str,
}

impl RouteThrottle {
    /// Bind a route to the policy named `scope`.
    ///
    /// Fails when the policy table has no such policy, so a route can never
    /// be mounted without a limit.
    pub fn new(state: &AppState, scope: &'static str) -> Result<Self> {
        state.policies.require(scope)?;
        Ok(Self {
            state: state.clone(),
            scope,
        })
    }

    /// Name of the policy this route runs under.
    pub fn scope(&self) -> &'static str {
        self.scope
    }
}

/// Count the request against `policy` for `key`, short-circuiting on rejection.
pub(crate) async fn admit_or_reject(
    state: &AppState,
    key: &BucketKey,
    policy: Policy,
    path: &str,
) -> std::result::Result<Decision, ApiError> {
    let decision = state.throttle.admit(key, policy).await;
    if decision.is_admitted() {
        trace!(key = %key, remaining = decision.remaining(), "Request admitted");
        Ok(decision)
    } else {
        audit::record_rejection(key, &decision, path);
        Err(ApiError::too_many_requests(&decision))
    }
}

/// Middleware admitting each request through the route's policy before the handler runs.
#[instrument(skip_all, fields(scope = tracing::field::Empty, path = %request.uri().path()))]
pub async fn enforce(
    State(route): State<RouteThrottle>,
    request: Request,
    next: Next,
) -> std::result::Result<Response, ApiError> {
    tracing::Span::current().record("scope", route.scope);
    let state = &route.state;
    let policy = state.policies.get(route.scope).ok_or_else(|| {
        error!(scope = route.scope, "Throttled route has no policy");
        ApiError::internal("throttle policy unavailable")
    })?;

    let identity = client_identity(
        request.headers(),
        request.extensions(),
        state.trust_forwarded_headers,
    );
    let key = BucketKey::new(route.scope, &identity);
    let path = request.uri().path().to_string();

    let decision = admit_or_reject(state, &key, policy, &path).await?;

    let mut response = next.run(request).await;
    RateLimitHeaders::from_decision(&decision).apply_if_absent(response.headers_mut());
    Ok(response)
}
