//! Client for the upstream project-management service.
//!
//! The upstream is an old RPC-over-HTTP API: paginated list methods, a
//! hard request-rate budget, and several generations of response shapes.
//! This module hides all of that behind [`UpstreamClient::fetch_all`]:
//! callers get normalized rows or a typed [`crate::error::UpstreamError`].

mod api_types;
mod client;
mod rate_limit;
mod retry;

pub use client::UpstreamClient;
