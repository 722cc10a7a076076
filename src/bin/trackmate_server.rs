//! trackmate_server - activity detection HTTP service
//!
//! This daemon:
//! 1. Loads configuration (file + env, then CLI overrides)
//! 2. Loads the perception backends and the secondary inference client
//! 3. Serves the activity API until Ctrl-C

use anyhow::Result;
use clap::Parser;
use std::sync::{mpsc, Arc};

use trackmate::api::{ApiConfig, ApiServer};
use trackmate::config::TrackmateConfig;
use trackmate::Engine;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Host to bind to (overrides server.addr).
    #[arg(long, env = "TRACKMATE_HOST")]
    host: Option<String>,
    /// Port to bind to (overrides server.addr).
    #[arg(long, env = "TRACKMATE_PORT")]
    port: Option<u16>,
    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let mut config = TrackmateConfig::load()?;
    config.override_addr(args.host.as_deref(), args.port)?;

    let engine = Arc::new(Engine::from_config(&config)?);
    log::info!(
        "detectors: hands={} objects={}",
        engine.perception().hand_backend(),
        engine.perception().object_backend()
    );
    if config.secondary.enabled {
        log::info!(
            "secondary fallback: {} ({}), timeout {:?}",
            config.secondary.ollama.url,
            config.secondary.ollama.model,
            config.secondary.timeout
        );
    }
    log::info!(
        "proximity threshold {}px, escalation below {:.2}",
        config.thresholds.proximity_px,
        config.thresholds.escalation_confidence
    );

    let api_handle = ApiServer::new(
        ApiConfig {
            addr: config.addr.clone(),
            ..ApiConfig::default()
        },
        engine,
    )
    .spawn()?;
    log::info!("activity api listening on http://{}", api_handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("trackmate_server waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;

    Ok(())
}
