//! Client identity: the key a request is throttled under.
//!
//! Proxy headers are honoured only when the service is configured to trust
//! them. `X-Real-IP` is taken as set by the proxy; from `X-Forwarded-For`
//! only the last element is used, since that is the hop the trusted proxy
//! appended and earlier elements are whatever the client sent.

use std::convert::Infallible;
use std::net::SocketAddr;

use async_trait::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap};

use super::state::AppState;
use crate::throttle::UNKNOWN_IDENTITY;

/// The identity a request is throttled under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity(pub String);

/// Resolve the client identity of a request.
///
/// Order: `X-Real-IP`, last `X-Forwarded-For` element (both only when
/// `trust_forwarded` is set), socket peer address, then the shared
/// [`UNKNOWN_IDENTITY`].
pub fn client_identity(headers: &HeaderMap, extensions: &Extensions, trust_forwarded: bool) -> String {
    if trust_forwarded {
        if let Some(real_ip) = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return real_ip.to_string();
        }

        if let Some(last_hop) = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return last_hop.to_string();
        }
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
}

#[async_trait]
impl FromRequestParts<AppState> for ClientIdentity {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(ClientIdentity(client_identity(
            &parts.headers,
            &parts.extensions,
            state.trust_forwarded_headers,
        )))
    }
}
