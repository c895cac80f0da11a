//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::keyboard::DEFAULT_INACTIVITY_WINDOW;

/// Environment variable overriding the IPC socket path
pub const SOCKET_VAR: &str = "SCAN_CAPTURE_SOCKET";
/// Environment variable overriding the wedge inactivity window, in ms
pub const INACTIVITY_VAR: &str = "SCAN_CAPTURE_INACTIVITY_MS";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Longest gap between scanner keystrokes before the buffer is dropped
    pub inactivity_window: Duration,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration using `lookup` to read variables
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let home = lookup("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("scan-capture");

        let socket_path = lookup(SOCKET_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("capture.sock"));

        let inactivity_window = match lookup(INACTIVITY_VAR) {
            Some(raw) => {
                let ms: u64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{INACTIVITY_VAR} must be an integer, got {raw:?}"))?;
                if ms == 0 {
                    bail!("{INACTIVITY_VAR} must be greater than zero");
                }
                Duration::from_millis(ms)
            }
            None => DEFAULT_INACTIVITY_WINDOW,
        };

        Ok(Self {
            socket_path,
            data_dir,
            inactivity_window,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}
