//! chitra-cam - camera emulation daemon
//!
//! Serves still images from a directory over TCP as if they were live
//! camera frames. Runs until Ctrl-C or until the image set is exhausted
//! with `repeat` disabled.

use chitra_cam::{AppConfig, Error, ImageFileServer, Result};
use std::env;

/// Parse config path from command line arguments.
///
/// Supports:
/// - `chitra-cam <path>` (positional)
/// - `chitra-cam --config <path>` (flag-based)
/// - `chitra-cam -c <path>` (short flag)
///
/// Defaults to `/etc/chitra-cam.toml` if not specified.
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    // Look for --config or -c flag
    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    // Fall back to first positional argument (if it doesn't start with -)
    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    // Default path
    "/etc/chitra-cam.toml".to_string()
}

fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("chitra-cam v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = parse_config_path();
    log::info!("Using config: {}", config_path);
    let config = AppConfig::from_file(&config_path)?;
    config.server.validate()?;

    log::info!("Image root: {}", config.server.image_root.display());
    log::info!("Listening port: {}", config.server.port);
    log::info!(
        "Frame rate ceiling: {:.1} fps, repeat: {}",
        config.server.frame_rate,
        config.server.repeat
    );

    let mut server = ImageFileServer::new(config.server);

    // Set up shutdown signal handler
    let stop = server.stop_handle();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        stop.request_stop();
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    server.start()?;
    log::info!("chitra-cam running. Press Ctrl-C to stop.");

    server.wait_for_stop();
    log::info!("chitra-cam stopped");
    Ok(())
}
