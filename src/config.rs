//! Configuration file loading and merging with CLI flags.
//!
//! Precedence: explicit CLI flag, then config file, then built-in default.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use imgbulk_core::{ClientOptions, DEFAULT_WORKERS, FilterSpec, RunOptions};
use serde::Deserialize;

use crate::cli::Args;

/// TOML-backed file configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Default output root.
    pub output_dir: Option<PathBuf>,
    /// Default worker count (same range as CLI).
    pub threads: Option<u8>,
    /// Default cap on URLs in the download history.
    pub limit: Option<usize>,
    /// Disable the adult filter by default.
    pub adult_filter_off: Option<bool>,
    /// Search animated GIFs only by default.
    pub animated_gif: Option<bool>,
    /// Default extra query filters.
    pub filters: Option<String>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// HTTP read timeout in seconds.
    pub read_timeout_secs: Option<u64>,
    /// Delay before each results page request, in milliseconds.
    pub page_delay_ms: Option<u64>,
    /// Pause between keywords in file-list mode, in seconds.
    pub keyword_pause_secs: Option<u64>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(threads) = self.threads
            && !(1..=100).contains(&threads)
        {
            bail!("Invalid config value for `threads`: {threads}. Expected range: 1..=100");
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;

        if let Some(delay) = self.page_delay_ms
            && delay > 60_000
        {
            bail!("Invalid config value for `page_delay_ms`: {delay}. Expected range: 0..=60000");
        }
        if let Some(pause) = self.keyword_pause_secs
            && pause > 3600
        {
            bail!(
                "Invalid config value for `keyword_pause_secs`: {pause}. Expected range: 0..=3600"
            );
        }
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/imgbulk/config.toml`
/// 2. `$HOME/.config/imgbulk/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("imgbulk")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("imgbulk")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file.
///
/// An explicit path must exist; the default path is optional.
pub fn load_file_config(explicit: Option<&Path>) -> Result<Option<FileConfig>> {
    if let Some(path) = explicit {
        return read_file_config(path).map(Some);
    }
    match resolve_default_config_path() {
        Some(path) if path.is_file() => read_file_config(&path).map(Some),
        _ => Ok(None),
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let config: FileConfig = toml::from_str(raw)?;
    config.validate()?;
    Ok(config)
}

/// Effective settings after merging CLI flags over the config file.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Session and directory settings.
    pub run: RunOptions,
    /// HTTP client settings.
    pub client: ClientOptions,
}

impl Settings {
    /// Merges `args` over `file` over defaults.
    #[must_use]
    pub fn resolve(args: &Args, file: Option<&FileConfig>) -> Self {
        let file = file.cloned().unwrap_or_default();
        let defaults = RunOptions::default();
        let client_defaults = ClientOptions::default();

        let filters = FilterSpec {
            extra: args
                .filters
                .clone()
                .or(file.filters)
                .filter(|filters| !filters.is_empty()),
            animated_only: args.animated_gif || file.animated_gif.unwrap_or(false),
        };

        let run = RunOptions {
            output_root: args
                .output
                .clone()
                .or(file.output_dir)
                .unwrap_or(defaults.output_root),
            workers: args
                .threads
                .or(file.threads)
                .map_or(DEFAULT_WORKERS, usize::from),
            limit: args.limit.or(file.limit),
            filters,
            page_delay: file
                .page_delay_ms
                .map_or(defaults.page_delay, Duration::from_millis),
            keyword_pause: file
                .keyword_pause_secs
                .map_or(defaults.keyword_pause, Duration::from_secs),
            snapshot_each_keyword: args.search_file,
        };

        let client = ClientOptions {
            connect_timeout: file
                .connect_timeout_secs
                .map_or(client_defaults.connect_timeout, Duration::from_secs),
            read_timeout: file
                .read_timeout_secs
                .map_or(client_defaults.read_timeout, Duration::from_secs),
            adult_filter_off: args.adult_filter_off || file.adult_filter_off.unwrap_or(false),
            ..client_defaults
        };

        Self { run, client }
    }
}
