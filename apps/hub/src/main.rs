//! Smart hub entry point.

mod app;
mod config;
mod console;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting smart hub");

    let config = config::Config::load()?;
    tracing::info!(
        host = %config.host,
        command_port = config.command_port,
        telemetry_port = config.telemetry_port,
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(app::run(config));
    // The console's stdin read may still be parked on a blocking thread.
    rt.shutdown_background();
    result?;

    tracing::info!("hub shut down cleanly");
    Ok(())
}
