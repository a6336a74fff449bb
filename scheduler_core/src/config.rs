//! Limiter settings read from the environment.
//!
//! | variable                 | meaning                         | default |
//! |--------------------------|---------------------------------|---------|
//! | `LIMITER_CONCURRENCY`    | max jobs in flight              | 4       |
//! | `RETRY_MAX_RETRIES`      | retries after the first attempt | 3       |
//! | `RETRY_INITIAL_DELAY_MS` | first backoff delay             | 1000    |
//! | `RETRY_MAX_DELAY_MS`     | backoff ceiling                 | 30000   |
//! | `RETRY_BACKOFF_FACTOR`   | delay multiplier per retry      | 2       |
//!
//! A default retry config is only set when at least one `RETRY_*` variable is
//! present, otherwise jobs run without retry unless the caller asks for it.

use std::{str::FromStr, time::Duration};

use crate::{error::LimiterError, limiter::Limiter, retry::RetryConfig};

pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct LimiterConfig {
    pub concurrency: usize,
    pub retry: Option<RetryConfig>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retry: None,
        }
    }
}

impl LimiterConfig {
    pub fn from_env() -> Result<Self, LimiterError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<L>(lookup: L) -> Result<Self, LimiterError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let concurrency = match parse::<i64, _>(&lookup, "LIMITER_CONCURRENCY")? {
            Some(value) => usize::try_from(value)
                .ok()
                .filter(|c| *c >= 1)
                .ok_or_else(|| {
                    LimiterError::InvalidArgument(format!("LIMITER_CONCURRENCY must be >= 1, got {}", value))
                })?,
            None => DEFAULT_CONCURRENCY,
        };

        let retry = RetryConfig {
            max_retries: parse(&lookup, "RETRY_MAX_RETRIES")?,
            initial_delay: parse(&lookup, "RETRY_INITIAL_DELAY_MS")?.map(Duration::from_millis),
            max_delay: parse(&lookup, "RETRY_MAX_DELAY_MS")?.map(Duration::from_millis),
            backoff_factor: parse(&lookup, "RETRY_BACKOFF_FACTOR")?,
        };
        let retry = (retry != RetryConfig::default()).then_some(retry);
        if let Some(retry) = &retry {
            retry.validate()?;
        }

        Ok(Self { concurrency, retry })
    }

    pub fn build(&self) -> Result<Limiter, LimiterError> {
        let builder = Limiter::builder(self.concurrency);
        match self.retry {
            Some(retry) => builder.default_retry(retry).build(),
            None => builder.build(),
        }
    }
}

fn parse<T, L>(lookup: &L, key: &str) -> Result<Option<T>, LimiterError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    L: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| LimiterError::Config(format!("{}={:?}: {}", key, raw, e))),
        _ => Ok(None),
    }
}
