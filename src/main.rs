//! Focusdns - Entry point.
//!
//! This binary runs the interception engine against a tun descriptor
//! inherited from the host platform: it loads the blocklist from the
//! configuration, establishes a session for the configured duration,
//! and sinkholes every blocked DNS query until the timer expires or the
//! process is interrupted.

use std::borrow::Cow;

use anyhow::{Context, Result};
use tracing::info;

use focusdns::config::Config;
use focusdns::network::tun::FdTunProvider;
use focusdns::session::{SessionController, StartOutcome, unix_time_ms};

async fn run() -> Result<()> {
    let config_path = std::env::var("CONFIG_PATH")
        .map(Cow::Owned)
        .unwrap_or(Cow::Borrowed("config.toml"));
    let config = Config::load(config_path.as_ref()).context("Failed to load configuration")?;

    focusdns::metrics::init(&config.metrics).context("Failed to initialize metrics")?;
    if config.metrics.enabled {
        info!("Metrics enabled on {}", config.metrics.listen);
    }

    info!("Starting focusdns interception engine...");
    info!("Upstream resolver: {}", config.upstream_resolver);
    info!("Blocklist entries: {}", config.blocklist.len());
    info!(
        "Session duration: {} minutes",
        config.session_duration_secs / 60
    );

    let fd = config
        .tun
        .fd
        .context("tun.fd must be set: pass the tun descriptor inherited from the host")?;
    // Safety: the host platform opened this descriptor for us and hands
    // over ownership through the configuration.
    let provider = unsafe { FdTunProvider::from_raw_fd(fd) };

    let mut controller =
        SessionController::new(provider, config.tun_config(), config.session_settings());

    let end_time_ms = unix_time_ms() + config.session_duration_secs * 1000;
    let outcome = controller
        .start(config.rules(), end_time_ms)
        .await
        .context("Failed to start interception session")?;

    let StartOutcome::Started(monitor) = outcome else {
        info!("Blocklist is empty, nothing to intercept.");
        return Ok(());
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down...");
            controller.stop().await;
        }
        reason = monitor.wait() => {
            info!(?reason, "Session ended");
        }
    }

    info!("Shutdown complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    run().await
}
