use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use scheduler_core::{with_retry, Limiter, LimiterConfig, LimiterError, RetryConfig};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

const NETWORK_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Serialize)]
pub struct ApiData {
    pub id: String,
    pub data: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to fetch data for ID: {0}")]
    Unavailable(String),
}

async fn fetch_data(id: String, should_fail: bool) -> Result<ApiData, FetchError> {
    info!(id = %id, "fetching data");
    tokio::time::sleep(NETWORK_DELAY).await;

    if should_fail {
        warn!(id = %id, "request failed");
        return Err(FetchError::Unavailable(id));
    }

    Ok(ApiData { data: format!("Data for {}", id), id })
}

fn to_json(data: &[ApiData]) -> String {
    serde_json::to_string(data).unwrap_or_else(|e| format!("<unprintable: {}>", e))
}

pub async fn run(config: &LimiterConfig) -> Result<(), LimiterError> {
    basic_limiting(config.concurrency).await?;
    retry_walkthrough().await;
    combined(config).await?;
    Ok(())
}

async fn basic_limiting(concurrency: usize) -> Result<(), LimiterError> {
    info!(concurrency, "=== basic concurrency limiting ===");
    let limiter = Limiter::new(concurrency)?;

    let handles: Vec<_> = (1..=5)
        .map(|i| limiter.submit_with_default(move || fetch_data(i.to_string(), false)))
        .collect();

    let mut results = vec![];
    for handle in handles {
        match handle.await {
            Ok(data) => results.push(data),
            Err(e) => warn!(error = %e, "job failed"),
        }
    }
    info!(results = %to_json(&results), "basic results");
    Ok(())
}

async fn retry_walkthrough() {
    info!("=== retry mechanism ===");
    let attempts = Arc::new(AtomicU32::new(0));

    let counter = attempts.clone();
    let retryable = with_retry(
        move || {
            // only the first attempt fails
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            fetch_data("retry-test".to_string(), attempt == 1)
        },
        RetryConfig::new()
            .max_retries(3)
            .initial_delay(Duration::from_millis(500))
            .backoff_factor(2.0),
    );

    match retryable().await {
        Ok(data) => info!(attempts = attempts.load(Ordering::SeqCst), data = %data.data, "retry result"),
        Err(e) => warn!(error = %e, "retry walkthrough gave up"),
    }
}

async fn combined(config: &LimiterConfig) -> Result<(), LimiterError> {
    info!("=== combined limiting and retries ===");
    let retry = config.retry.unwrap_or_else(|| {
        RetryConfig::new()
            .max_retries(2)
            .initial_delay(Duration::from_millis(500))
            .max_delay(Duration::from_millis(5_000))
            .backoff_factor(2.0)
    });
    let limiter = Limiter::with_default_retry(2, retry)?;

    let jobs = [
        ("reliable-1", false),
        ("unreliable-1", true),
        ("reliable-2", false),
        ("unreliable-2", true),
    ];
    let handles: Vec<_> = jobs
        .iter()
        .map(|&(id, fails)| (id, limiter.submit_with_default(move || fetch_data(id.to_string(), fails))))
        .collect();

    let mut succeeded = 0;
    for (id, handle) in handles {
        match handle.await {
            Ok(_) => succeeded += 1,
            Err(e) => warn!(id, error = %e, "job failed even after retries"),
        }
    }
    info!(succeeded, total = jobs.len(), "combined results");
    Ok(())
}
