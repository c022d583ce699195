#![doc = include_str!("../README.md")]

mod app;

use app::{
    config::{AppConfig, CliArgs},
    telemetry::{self, init_telemetry},
};
use clap::Parser;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = AppConfig::try_from(args)?;

    let providers = init_telemetry()?;

    #[cfg(feature = "tracing")]
    tracing::info!(
        short_id_attempts = config.identity.short_id.max_attempts,
        username_attempts = config.identity.username.max_attempts,
        connection_attempts = config.identity.connection.max_attempts,
        breaker_threshold = config.identity.breaker.failure_threshold,
        "snippy {}",
        env!("CARGO_PKG_VERSION"),
    );

    let result = app::run(config, telemetry::observer()).await;
    providers.shutdown();
    result
}
