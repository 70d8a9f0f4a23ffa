//! Cloudflare API access
//!
//! This module provides the HTTP client used to read and replace managed
//! list contents through the Cloudflare v4 REST API.

pub mod client;

pub use client::{ApiError, ApiResponse, CloudflareClient, RemoteList};
