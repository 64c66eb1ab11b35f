//! CLI surface: `<cmd> <URL|URL-LIST-FILE> [MAX-CONCURRENT-CONNECTIONS]`.
//!
//! Argument parsing itself is small on purpose — the coordinator is the
//! real core — but a real entry point still needs it.

use crate::config;
use crate::coordinator;
use crate::url_model;
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs;
use std::path::Path;

#[derive(Debug, Parser)]
#[command(name = "segdl")]
#[command(about = "segdl: resumable, parallel-range HTTP downloader", long_about = None)]
pub struct Cli {
    /// A direct URL, or the path to a file listing mirror URLs (one per line).
    pub target: String,

    /// Maximum number of concurrent range connections.
    #[arg(default_value_t = 1)]
    pub max_concurrent_connections: usize,
}

impl Cli {
    pub fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init();
        tracing::debug!(?cfg, "loaded config");

        let urls = resolve_urls(&cli.target)?;
        if urls.is_empty() {
            bail!("URL list file names no usable URLs");
        }

        let cwd = std::env::current_dir().context("failed to resolve current directory")?;
        let destination = url_model::destination_path(&cwd, &urls[0]);

        coordinator::run(&cfg, &urls, cli.max_concurrent_connections, &destination)?;
        Ok(())
    }
}

/// If `target` names an existing regular file, reads it as a mirror list
/// (one URL per line, blanks skipped, whitespace trimmed); otherwise treats
/// `target` as a single URL. Every URL is stripped of Unicode format
/// characters before use.
fn resolve_urls(target: &str) -> Result<Vec<String>> {
    let path = Path::new(target);
    if path.is_file() {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read URL list file: {target}"))?;
        Ok(contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(url_model::strip_format_chars)
            .collect())
    } else if path.is_dir() {
        bail!("{target} is a directory, not a URL or a URL list file");
    } else {
        Ok(vec![url_model::strip_format_chars(target)])
    }
}
