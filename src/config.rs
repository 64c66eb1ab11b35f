//! Tunable pipeline constants, loaded from `~/.config/segdl/config.toml`.
//!
//! Every field has a reference default from the design; the program runs
//! correctly with zero configuration present.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bytes per accounting/transfer chunk.
    pub chunk_size: u64,
    /// Capacity of the bounded producer/consumer queue.
    pub queue_capacity: usize,
    /// Minimum bytes a single worker must own before another worker is spun up.
    pub min_bytes_per_connection: u64,
    /// Range worker connect timeout, in seconds.
    pub connect_timeout_secs: u64,
    /// Range worker read (low-speed) timeout, in seconds.
    pub read_timeout_secs: u64,
    /// Writer dequeue timeout, in seconds.
    pub writer_dequeue_timeout_secs: u64,
    /// Overall run timeout, in seconds.
    pub overall_run_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: crate::chunk::DEFAULT_CHUNK_SIZE,
            queue_capacity: 1_000,
            min_bytes_per_connection: 1_048_576,
            connect_timeout_secs: 25,
            read_timeout_secs: 20,
            writer_dequeue_timeout_secs: 120,
            overall_run_timeout_secs: 86_400,
        }
    }
}

impl Config {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn writer_dequeue_timeout(&self) -> Duration {
        Duration::from_secs(self.writer_dequeue_timeout_secs)
    }

    pub fn overall_run_timeout(&self) -> Duration {
        Duration::from_secs(self.overall_run_timeout_secs)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("segdl")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Loads configuration from disk, writing a default file if none exists yet.
/// Falls back to `Config::default()` if the XDG directories can't be resolved
/// at all (e.g. `$HOME` unset) so the downloader still runs.
pub fn load_or_init() -> Config {
    match load_or_init_inner() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(error = %e, "falling back to default config");
            Config::default()
        }
    }
}

fn load_or_init_inner() -> Result<Config> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = Config::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!(path = %path.display(), "created default config");
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: Config = toml::from_str(&data)?;
    Ok(cfg)
}
