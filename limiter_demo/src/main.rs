use dotenv::dotenv;
use scheduler_core::LimiterConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod http;
mod simulated;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {

    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = LimiterConfig::from_env().map_err(|e|
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
    )?;

    // which workload to run
    let mode = std::env::var("DEMO_MODE").unwrap_or_else(|_| "simulated".to_string());
    info!(mode = %mode, concurrency = config.concurrency, "starting limiter demo");

    let res = match mode.as_str() {
        "simulated" => simulated::run(&config).await,
        "http" => http::run(&config).await,
        other => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("unknown DEMO_MODE {:?}, expected \"simulated\" or \"http\"", other),
            ))
        }
    };

    res.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    Ok(())
}
