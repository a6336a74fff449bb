//! Bounded-concurrency job limiter with exponential-backoff retries.
//!
//! [`Limiter`] admits at most N jobs at a time in submission order, and hands
//! each admitted job to [`run_with_retry`], which can also be used on its own.
pub mod config;
pub mod error;
pub mod limiter;
pub mod retry;
pub mod task;

mod queue;
mod state;

pub use config::LimiterConfig;
pub use error::LimiterError;
pub use limiter::{Limiter, LimiterBuilder};
pub use retry::{run_with_retry, with_retry, Backoff, RetryConfig};
pub use task::{JobHandle, JobId, JobStatus};
