use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::LimiterError;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1_000);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Retry settings as given by a caller. Every field is optional, whatever is
/// left out falls back to the library defaults when the config is resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: Option<u32>,
    #[serde(rename = "initial_delay_ms", with = "millis")]
    pub initial_delay: Option<Duration>,
    #[serde(rename = "max_delay_ms", with = "millis")]
    pub max_delay: Option<Duration>,
    pub backoff_factor: Option<f64>,
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = Some(factor);
        self
    }

    pub fn validate(&self) -> Result<(), LimiterError> {
        if let Some(factor) = self.backoff_factor {
            if !factor.is_finite() || factor < 1.0 {
                return Err(LimiterError::InvalidArgument(format!(
                    "backoff factor must be a finite number >= 1, got {}",
                    factor
                )));
            }
        }

        let initial = self.initial_delay.unwrap_or(DEFAULT_INITIAL_DELAY);
        let max = self.max_delay.unwrap_or(DEFAULT_MAX_DELAY);
        if initial > max {
            return Err(LimiterError::InvalidArgument(format!(
                "initial delay {:?} is larger than max delay {:?}",
                initial, max
            )));
        }

        Ok(())
    }

    /// Fills the missing fields with the library defaults.
    ///
    /// A factor below 1 (or NaN) is treated as 1 and the initial delay is
    /// capped by the max delay, so the delay never shrinks and never exceeds
    /// the ceiling even for configs that skipped [`RetryConfig::validate`].
    pub fn resolve(&self) -> Backoff {
        let max_delay = self.max_delay.unwrap_or(DEFAULT_MAX_DELAY);
        Backoff {
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            initial_delay: self.initial_delay.unwrap_or(DEFAULT_INITIAL_DELAY).min(max_delay),
            max_delay,
            multiplier: self.backoff_factor.unwrap_or(DEFAULT_BACKOFF_FACTOR).max(1.0),
        }
    }
}

/// A fully resolved retry policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Backoff {
    pub fn next_delay(&self, current: Duration) -> Duration {
        let nanos = (current.as_nanos() as f64 * self.multiplier).round();
        // overflowing products saturate to the ceiling
        if nanos >= u64::MAX as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(nanos as u64).min(self.max_delay)
    }

    /// The sleeps taken between attempts when every attempt fails, one per retry.
    pub fn delays(self) -> impl Iterator<Item = Duration> {
        std::iter::successors(Some(self.initial_delay), move |delay| {
            Some(self.next_delay(*delay))
        })
        .take(self.max_retries as usize)
    }
}

/// Runs `op`, retrying failures with exponential backoff.
///
/// Without a config, or with `max_retries == 0`, `op` is invoked exactly once.
/// Otherwise it gets up to `max_retries + 1` attempts and the error of the last
/// one is returned as is, earlier errors are dropped.
pub async fn run_with_retry<F, Fut, T, E>(mut op: F, config: Option<&RetryConfig>) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let backoff = match config.map(RetryConfig::resolve) {
        Some(backoff) if backoff.max_retries > 0 => backoff,
        _ => return op().await,
    };

    let mut delay = backoff.initial_delay;
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt == backoff.max_retries => return Err(err),
            Err(_) => {
                tokio::time::sleep(delay).await;
                delay = backoff.next_delay(delay);
                attempt += 1;
            }
        }
    }
}

pub type RetryFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send>>;

/// Wraps `op` into a reusable operation that retries with `config` every time
/// it is called. An empty config means the library defaults, i.e. 3 retries.
pub fn with_retry<F, Fut, T, E>(
    op: F,
    config: RetryConfig,
) -> impl Fn() -> RetryFuture<T, E> + Clone + Send + Sync + 'static
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let op = Arc::new(op);
    move || -> RetryFuture<T, E> {
        let op = Arc::clone(&op);
        Box::pin(async move { run_with_retry(|| op(), Some(&config)).await })
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(delay) => {
                serializer.serialize_some(&u64::try_from(delay.as_millis()).unwrap_or(u64::MAX))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
