//! wspserve: a read-only HTTP query frontend over a tree of fixed-schema
//! time-series files.
//!
//! Usage:
//!   wspserve --data-root <path> --bind-addr 127.0.0.1:8080

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = wspserve::config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    wspserve::server::run(config).await
}
