//! HTTP error responses and the rate-limit header contract.
//!
//! Every error answers with a JSON `{ "error", "message" }` body; throttle
//! rejections add `retry_after` to the body plus `Retry-After` and the
//! `X-RateLimit-*` headers.

use axum::http::header::{HeaderName, HeaderValue, RETRY_AFTER};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::QuillgateError;
use crate::throttle::policy::ceil_secs;
use crate::throttle::Decision;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// The `X-RateLimit-*` / `Retry-After` header set describing a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub limit: u32,
    pub remaining: u32,
    /// Unix timestamp (seconds) at which the window resets
    pub reset_at: i64,
    pub retry_after: Option<u64>,
}

impl RateLimitHeaders {
    /// Describe `decision`, converting its reset delay to a Unix timestamp.
    pub fn from_decision(decision: &Decision) -> Self {
        let reset_in = i64::try_from(ceil_secs(decision.resets_in())).unwrap_or(i64::MAX);
        Self {
            limit: decision.limit(),
            remaining: decision.remaining(),
            reset_at: chrono::Utc::now().timestamp().saturating_add(reset_in),
            retry_after: decision.retry_after_secs(),
        }
    }

    /// Write the headers, replacing any already present.
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(self.reset_at));
        if let Some(retry_after) = self.retry_after {
            headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
        }
    }

    /// Apply unless the response already describes a (more specific) decision.
    pub fn apply_if_absent(&self, headers: &mut HeaderMap) {
        if !headers.contains_key(X_RATELIMIT_LIMIT) {
            self.apply(headers);
        }
    }
}

/// An error answered to the client as a JSON body.
#[derive(Debug)]
pub struct ApiError {
    error: &'static str,
    message: String,
    status: StatusCode,
    rate_limit: Option<RateLimitHeaders>,
}

impl ApiError {
    /// An error with a short `error` label, a status and a detail message.
    pub fn new(error: &'static str, status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            error,
            status,
            message: message.into(),
            rate_limit: None,
        }
    }

    /// 400, for malformed input such as an invalid policy.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("Bad request", StatusCode::BAD_REQUEST, message)
    }

    /// 404, for a policy name the table does not define.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("Not found", StatusCode::NOT_FOUND, message)
    }

    /// 500
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("Internal error", StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// A rejection from the throttle, carrying its retry hint.
    pub fn too_many_requests(decision: &Decision) -> Self {
        let headers = RateLimitHeaders::from_decision(decision);
        let retry_after = headers.retry_after.unwrap_or(0);
        Self {
            error: "Too many requests",
            message: format!("Rate limit exceeded, try again in {} seconds", retry_after),
            status: StatusCode::TOO_MANY_REQUESTS,
            rate_limit: Some(headers),
        }
    }

    /// Status code the response will carry.
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<QuillgateError> for ApiError {
    fn from(err: QuillgateError) -> Self {
        match err {
            QuillgateError::UnknownPolicy(name) => {
                ApiError::not_found(format!("unknown throttle policy: {name}"))
            }
            QuillgateError::Policy(msg) => ApiError::bad_request(msg),
            other => ApiError::internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.rate_limit.and_then(|h| h.retry_after) {
            Some(retry_after) => json!({
                "error": self.error,
                "message": self.message,
                "retry_after": retry_after,
            }),
            None => json!({
                "error": self.error,
                "message": self.message,
            }),
        };

        let mut response = (self.status, Json(body)).into_response();
        if let Some(headers) = self.rate_limit {
            headers.apply(response.headers_mut());
        }
        response
    }
}
