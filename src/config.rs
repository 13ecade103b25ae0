// src/config.rs
use crate::debuginfo;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Defaults for `analyze`, taken from the environment. Command-line flags win.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub parallel: usize,
    pub debuginfod: bool,
    pub debuginfod_servers: Vec<String>,
    pub debuginfod_cache: Option<PathBuf>,
    pub debuginfod_timeout_secs: u64,
    pub debuginfod_retries: u32,
    pub debuginfod_max_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            parallel: default_parallelism(),
            debuginfod: false,
            debuginfod_servers: vec![debuginfo::DEFAULT_SERVER_URL.to_string()],
            debuginfod_cache: None,
            debuginfod_timeout_secs: debuginfo::DEFAULT_TIMEOUT.as_secs(),
            debuginfod_retries: debuginfo::DEFAULT_RETRIES,
            debuginfod_max_size: debuginfo::DEFAULT_MAX_FILE_SIZE,
        }
    }
}

pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source. Unset or empty
    /// variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Config::default();

        if let Some(v) = get("ELFGUARD_PARALLEL") {
            config.parallel = v
                .parse()
                .with_context(|| format!("ELFGUARD_PARALLEL is not a number: {}", v))?;
        }
        if let Some(v) = get("ELFGUARD_DEBUGINFOD") {
            config.debuginfod = parse_bool(&v)
                .with_context(|| format!("ELFGUARD_DEBUGINFOD is not a boolean: {}", v))?;
        }
        if let Some(v) = get("DEBUGINFOD_URLS") {
            config.debuginfod_servers = parse_url_list(&v);
        }
        if let Some(v) = get("ELFGUARD_DEBUGINFOD_CACHE") {
            config.debuginfod_cache = Some(PathBuf::from(v));
        }
        if let Some(v) = get("ELFGUARD_DEBUGINFOD_TIMEOUT") {
            config.debuginfod_timeout_secs = v
                .parse()
                .with_context(|| format!("ELFGUARD_DEBUGINFOD_TIMEOUT is not a number of seconds: {}", v))?;
        }
        if let Some(v) = get("ELFGUARD_DEBUGINFOD_RETRIES") {
            config.debuginfod_retries = v
                .parse()
                .with_context(|| format!("ELFGUARD_DEBUGINFOD_RETRIES is not a number: {}", v))?;
        }
        if let Some(v) = get("ELFGUARD_DEBUGINFOD_MAX_SIZE") {
            config.debuginfod_max_size = v
                .parse()
                .with_context(|| format!("ELFGUARD_DEBUGINFOD_MAX_SIZE is not a byte count: {}", v))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.parallel < 1 {
            bail!("parallelism must be at least 1");
        }
        if self.debuginfod_retries < 1 {
            bail!("debuginfod retries must be at least 1");
        }
        Ok(())
    }

    pub fn debuginfo_options(&self) -> debuginfo::Options {
        debuginfo::Options {
            servers: self.debuginfod_servers.clone(),
            cache_dir: self.debuginfod_cache.clone(),
            timeout: Duration::from_secs(self.debuginfod_timeout_secs),
            max_attempts: self.debuginfod_retries,
            max_file_size: self.debuginfod_max_size,
            ..debuginfo::Options::default()
        }
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow::anyhow!("expected true or false")),
    }
}

/// Split a server list on commas and whitespace, dropping empty items.
pub fn parse_url_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
