//! Configuration for the chitra-cam daemon
//!
//! Loads configuration from a TOML file with the parameters needed to run
//! the image file server.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Image file server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Root directory scanned recursively for `.jpg`/`.png` files
    pub image_root: PathBuf,

    /// Restart the enumeration once every image has been served
    pub repeat: bool,

    /// TCP port to listen on (loopback only)
    pub port: u16,

    /// Upper bound on a single socket read or write, in bytes
    pub chunk_size: usize,

    /// Per-connection read timeout in seconds
    pub client_read_timeout_secs: f64,

    /// Maximum frequency at which `get_frame` requests are answered,
    /// emulating a camera streaming at a fixed rate
    pub frame_rate: f64,

    /// Skip any file whose absolute path contains one of these substrings
    #[serde(default)]
    pub skip_path_substrings: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log output (stdout, stderr, or file path)
    pub output: String,
}

impl ServerConfig {
    /// Per-connection read timeout as a [`Duration`].
    pub fn client_read_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.client_read_timeout_secs)
    }

    /// Reject parameter combinations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.frame_rate > 0.0) {
            return Err(Error::Config(
                "frame_rate must be greater than 0".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(Error::Config(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if !(self.client_read_timeout_secs > 0.0) {
            return Err(Error::Config(
                "client_read_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use chitra_cam::config::AppConfig;
    ///
    /// let config = AppConfig::from_file("chitra-cam.toml")?;
    /// # Ok::<(), chitra_cam::Error>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| Error::Config(e.to_string()))?;
        Ok(config)
    }

    /// Default configuration for serving a local image directory.
    ///
    /// Suitable for testing and development. Deployments should use a
    /// proper TOML configuration file.
    pub fn local_defaults() -> Self {
        Self {
            server: ServerConfig {
                image_root: PathBuf::from("images"),
                repeat: true,
                port: 6008,
                chunk_size: 6000,
                client_read_timeout_secs: 4.0,
                frame_rate: 30.0,
                skip_path_substrings: Vec::new(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                output: "stdout".to_string(),
            },
        }
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, contents)?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::local_defaults()
    }
}
