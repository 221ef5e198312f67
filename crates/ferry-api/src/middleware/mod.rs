//! HTTP middleware for inbound request authentication.
pub mod auth;
