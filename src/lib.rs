//! cf-list-sync - Synchronize Cloudflare managed IP lists from external feeds
//!
//! This crate reconciles the membership of Cloudflare account-level IP lists
//! against external source feeds: fetch each feed, diff it against the
//! list's current members, and replace the membership in bounded batches
//! while respecting the API's rate limits.

pub mod api;
pub mod config;
pub mod error;
pub mod report;
pub mod source;
pub mod sync;
