//! Route table of the HTTP service.

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;

use super::handlers::{admit, health, usage};
use super::middleware::{enforce, RouteThrottle};
use super::state::AppState;
use crate::error::Result;
use crate::throttle::policy::{HEALTH, LOOKUP};

/// Build the router with every route behind its own throttle policy.
///
/// Fails if the policy table lacks a policy a route names.
pub fn app_router(state: AppState) -> Result<Router> {
    let health_limit = RouteThrottle::new(&state, HEALTH)?;
    let lookup_limit = RouteThrottle::new(&state, LOOKUP)?;

    let router = Router::new()
        .route(
            "/health",
            get(health).route_layer(from_fn_with_state(health_limit, enforce)),
        )
        .route(
            "/v1/throttle/usage",
            get(usage).route_layer(from_fn_with_state(lookup_limit.clone(), enforce)),
        )
        .route(
            "/v1/throttle/admit",
            post(admit).route_layer(from_fn_with_state(lookup_limit, enforce)),
        )
        .with_state(state);

    Ok(router)
}
