//! List synchronization engine
//!
//! This module contains the core reconciliation machinery:
//!
//! - [`retry`]: configurable retry policy with exponential backoff and jitter
//! - [`planner`]: diff-and-chunk planning between current and desired sets
//! - [`executor`]: batch push with adaptive rate-limit throttling
//! - [`driver`]: the sequential per-target reconciliation pass

pub mod driver;
pub mod executor;
pub mod planner;
pub mod retry;

pub use driver::{Reconciler, RunReport, TargetOutcome, TargetReport};
pub use executor::{BatchSyncExecutor, ThrottleState};
pub use planner::{plan, SyncPlan};
pub use retry::RetryPolicy;
