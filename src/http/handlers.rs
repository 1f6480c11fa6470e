//! HTTP handlers. Each runs behind its route's throttle middleware.

use axum::extract::{Query, State};
use axum::http::Uri;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::ApiError;
use super::identity::ClientIdentity;
use super::middleware::admit_or_reject;
use super::state::AppState;
use crate::error::QuillgateError;
use crate::throttle::{BucketKey, Policy, Usage};

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    pub policy: String,
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub policy: String,
    pub identity: String,
    #[serde(flatten)]
    pub usage: Usage,
}

/// GET /v1/throttle/usage?policy=<name> - the caller's usage, not counted
pub async fn usage(
    State(state): State<AppState>,
    ClientIdentity(identity): ClientIdentity,
    Query(query): Query<UsageQuery>,
) -> Result<Json<UsageResponse>, ApiError> {
    let policy = lookup_policy(&state, &query.policy)?;
    let key = BucketKey::new(&query.policy, &identity);
    let usage = state.throttle.usage(&key, policy).await;

    Ok(Json(UsageResponse {
        policy: key.scope,
        identity: key.identity,
        usage,
    }))
}

/// Body of an admit call. The request is always counted against the
/// caller's own identity; any other fields are ignored.
#[derive(Debug, Deserialize)]
pub struct AdmitRequest {
    pub policy: String,
}

#[derive(Debug, Serialize)]
pub struct AdmitResponse {
    pub admitted: bool,
    pub policy: String,
    pub identity: String,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after_secs: u64,
}

/// POST /v1/throttle/admit - count one request against a named policy
///
/// Lets handlers running outside this process ask for admission before
/// doing their work. Rejections answer 429 like any throttled route.
pub async fn admit(
    State(state): State<AppState>,
    ClientIdentity(identity): ClientIdentity,
    uri: Uri,
    Json(req): Json<AdmitRequest>,
) -> Result<Json<AdmitResponse>, ApiError> {
    let policy = lookup_policy(&state, &req.policy)?;
    let key = BucketKey::new(&req.policy, &identity);

    let decision = admit_or_reject(&state, &key, policy, uri.path()).await?;

    Ok(Json(AdmitResponse {
        admitted: true,
        limit: decision.limit(),
        remaining: decision.remaining(),
        reset_after_secs: crate::throttle::policy::ceil_secs(decision.resets_in()),
        policy: key.scope,
        identity: key.identity,
    }))
}

fn lookup_policy(state: &AppState, name: &str) -> Result<Policy, ApiError> {
    state
        .policies
        .get(name)
        .ok_or_else(|| QuillgateError::UnknownPolicy(name.to_string()).into())
}
