use std::time::Duration;

use reqwest::Client;
use scheduler_core::{JobHandle, Limiter, LimiterConfig, LimiterError, RetryConfig};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

const DEFAULT_API_URL: &str = "https://jsonplaceholder.typicode.com";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Request for {url} failed with status: {status}")]
    StatusError { url: String, status: u16 },
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct Post {
    pub id: u32,
    pub title: String,
}

#[derive(Clone)]
struct Api {
    base_url: String,
    client: Client,
}

impl Api {
    fn new(base_url: String) -> Self {
        Self { base_url, client: Client::new() }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: String) -> Result<T, FetchError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::StatusError { url, status: response.status().as_u16() });
        }

        Ok(response.json::<T>().await?)
    }

    fn fetch_user(&self, limiter: &Limiter, id: u32) -> JobHandle<User, FetchError> {
        let api = self.clone();
        limiter.submit_with_default(move || {
            let api = api.clone();
            async move { api.get::<User>(format!("users/{}", id)).await }
        })
    }

    fn fetch_post(&self, limiter: &Limiter, id: u32) -> JobHandle<Post, FetchError> {
        let api = self.clone();
        limiter.submit_with_default(move || {
            let api = api.clone();
            async move { api.get::<Post>(format!("posts/{}", id)).await }
        })
    }
}

pub async fn run(config: &LimiterConfig) -> Result<(), LimiterError> {
    let base_url = std::env::var("DEMO_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
    let api = Api::new(base_url);

    // fall back to the settings the fetch workload was tuned with
    let retry = config.retry.unwrap_or_else(|| {
        RetryConfig::new()
            .max_retries(2)
            .initial_delay(Duration::from_millis(300))
            .max_delay(Duration::from_millis(3_000))
            .backoff_factor(2.0)
    });
    let limiter = Limiter::with_default_retry(config.concurrency, retry)?;

    info!(concurrency = limiter.concurrency(), "=== fetching users ===");
    let users: Vec<_> = (1..=10).map(|id| api.fetch_user(&limiter, id)).collect();
    let mut fetched = 0;
    for handle in users {
        match handle.await {
            Ok(user) => {
                info!(id = user.id, name = %user.name, "fetched user");
                fetched += 1;
            }
            Err(e) => warn!(error = %e, "user fetch failed"),
        }
    }
    info!(fetched, "users done");

    info!(concurrency = limiter.concurrency(), "=== fetching posts ===");
    let posts: Vec<_> = (1..=5).map(|id| api.fetch_post(&limiter, id)).collect();
    for handle in posts {
        match handle.await {
            Ok(post) => {
                let title: String = post.title.chars().take(30).collect();
                info!(id = post.id, title = %title, "fetched post");
            }
            Err(e) => warn!(error = %e, "post fetch failed"),
        }
    }

    info!("=== mixed workload ===");
    let user = api.fetch_user(&limiter, 1);
    let post = api.fetch_post(&limiter, 1);
    let other_user = api.fetch_user(&limiter, 2);

    report(1, user.await.map(|u| u.name));
    report(2, post.await.map(|p| p.title));
    report(3, other_user.await.map(|u| u.name));

    Ok(())
}

fn report(task: usize, result: Result<String, FetchError>) {
    match result {
        Ok(summary) => info!(task, summary = %summary, "success"),
        Err(e) => warn!(task, error = %e, "failed"),
    }
}
