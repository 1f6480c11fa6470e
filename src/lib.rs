//! Quillgate - request throttling for the journaling reminder service
//!
//! This crate implements the per-client, fixed-window request throttle that
//! every externally reachable operation of the journaling application admits
//! through, along with the HTTP middleware and 429 response contract that
//! apply it to routes.

pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod throttle;
