// src/debuginfo/mod.rs
//! Fetching separate debug files from debuginfod servers, with a local cache.

pub mod enhance;
pub mod retry;

pub use self::enhance::{dwarf_producers, enhance};
pub use self::retry::{RetryPolicy, RetryState, Sleeper, TokioSleeper};

use dashmap::DashMap;
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_SERVER_URL: &str = "https://debuginfod.elfutils.org";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 2 * 1024 * 1024 * 1024;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum DebugInfoError {
    #[error("no debuginfod servers configured")]
    NoServers,
    #[error("invalid build id: {0:?}")]
    InvalidBuildId(String),
    #[error("server returned {code}")]
    Status { code: u16, retryable: bool },
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("debug file exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cancelled")]
    Cancelled,
    #[error("debug symbols not found on any server for build id {0}")]
    Exhausted(String),
}

impl DebugInfoError {
    /// Whether the same server is worth asking again.
    pub fn is_retryable(&self) -> bool {
        match self {
            DebugInfoError::Status { retryable, .. } => *retryable,
            DebugInfoError::Network(_) | DebugInfoError::Io(_) => true,
            _ => false,
        }
    }
}

fn is_non_retryable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 400 | 403 | 404 | 405 | 410)
}

#[derive(Debug, Clone)]
pub struct Options {
    pub servers: Vec<String>,
    /// Defaults to [`default_cache_dir`] when unset.
    pub cache_dir: Option<PathBuf>,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub max_file_size: u64,
    pub backoff_base: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            servers: vec![DEFAULT_SERVER_URL.to_string()],
            cache_dir: None,
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_RETRIES,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }
}

/// `$XDG_CACHE_HOME/elfguard/debuginfo`, else `~/.cache/elfguard/debuginfo`.
pub fn default_cache_dir() -> Option<PathBuf> {
    let base = match std::env::var_os("XDG_CACHE_HOME") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => home::home_dir()?.join(".cache"),
    };
    Some(base.join(env!("CARGO_PKG_NAME")).join("debuginfo"))
}

/// Cache location for `build_id`: the first two hex digits become a subdirectory.
pub fn cache_path(cache_dir: &Path, build_id: &str) -> PathBuf {
    match (build_id.get(..2), build_id.get(2..)) {
        (Some(prefix), Some(rest)) if build_id.len() >= 2 => {
            cache_dir.join(prefix).join(format!("{}.debug", rest))
        }
        _ => cache_dir.join(format!("{}.debug", build_id)),
    }
}

fn validate_build_id(build_id: &str) -> Result<String, DebugInfoError> {
    if build_id.is_empty() || !build_id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(DebugInfoError::InvalidBuildId(build_id.to_string()));
    }
    Ok(build_id.to_ascii_lowercase())
}

fn user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// debuginfod client. Cheap to share behind an `Arc` across scan workers.
pub struct Client {
    servers: Vec<String>,
    cache_dir: PathBuf,
    http: reqwest::Client,
    policy: RetryPolicy,
    max_file_size: u64,
    sleeper: Arc<dyn Sleeper>,
    inflight: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl Client {
    pub fn new(options: Options) -> Result<Self, DebugInfoError> {
        let servers: Vec<String> = options
            .servers
            .iter()
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if servers.is_empty() {
            return Err(DebugInfoError::NoServers);
        }

        let cache_dir = match options.cache_dir {
            Some(dir) => dir,
            None => default_cache_dir().ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "cannot determine a cache directory",
                )
            })?,
        };
        std::fs::create_dir_all(&cache_dir)?;

        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent(user_agent())
            .build()?;

        tracing::debug!(
            "debuginfod client ready: servers={:?} cache={}",
            servers,
            cache_dir.display()
        );

        Ok(Self {
            servers,
            cache_dir,
            http,
            policy: RetryPolicy {
                max_attempts: options.max_attempts.max(1),
                base_delay: options.backoff_base,
            },
            max_file_size: options.max_file_size,
            sleeper: Arc::new(TokioSleeper),
            inflight: DashMap::new(),
        })
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn cache_path(&self, build_id: &str) -> PathBuf {
        cache_path(&self.cache_dir, build_id)
    }

    /// Local path of the debug file for `build_id`, downloading it on a cache miss.
    /// Concurrent calls for the same id share one download.
    pub async fn fetch_debug_info(&self, build_id: &str, cancel: &CancellationToken) -> Result<PathBuf, DebugInfoError> {
        let build_id = validate_build_id(build_id)?;
        let dest = self.cache_path(&build_id);
        if dest.is_file() {
            tracing::debug!("using cached debug symbols for {}", build_id);
            return Ok(dest);
        }

        let lock = self
            .inflight
            .entry(build_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();

        let guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            guard = lock.lock() => Some(guard),
        };
        let result = match guard {
            None => Err(DebugInfoError::Cancelled),
            Some(_guard) if dest.is_file() => {
                tracing::debug!("debug symbols for {} fetched by another worker", build_id);
                Ok(dest.clone())
            }
            Some(_guard) => self.fetch_uncached(&build_id, &dest, cancel).await,
        };

        // last one out removes the entry (map + our clone)
        self.inflight
            .remove_if(&build_id, |_, m| Arc::strong_count(m) <= 2);
        result
    }

    async fn fetch_uncached(&self, build_id: &str, dest: &Path, cancel: &CancellationToken) -> Result<PathBuf, DebugInfoError> {
        for server in &self.servers {
            let attempt = retry::run(&self.policy, self.sleeper.as_ref(), cancel, |_| {
                self.fetch_from_server(server, build_id, dest)
            })
            .await;
            match attempt {
                Ok(()) => {
                    tracing::debug!("fetched debug symbols for {} from {}", build_id, server);
                    return Ok(dest.to_path_buf());
                }
                Err(DebugInfoError::Cancelled) => return Err(DebugInfoError::Cancelled),
                Err(err) => tracing::debug!("server {} failed for {}: {}", server, build_id, err),
            }
        }
        Err(DebugInfoError::Exhausted(build_id.to_string()))
    }

    async fn fetch_from_server(&self, server: &str, build_id: &str, dest: &Path) -> Result<(), DebugInfoError> {
        let url = format!("{}/buildid/{}/debuginfo", server, build_id);
        let mut response = self.http.get(&url).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(DebugInfoError::Status {
                code: status.as_u16(),
                retryable: !is_non_retryable(status),
            });
        }
        if response.content_length().is_some_and(|len| len > self.max_file_size) {
            return Err(DebugInfoError::TooLarge {
                limit: self.max_file_size,
            });
        }

        let dir = dest.parent().unwrap_or(&self.cache_dir).to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        let tmp = blocking(move || tempfile::NamedTempFile::new_in(dir)).await?;
        // the path half unlinks the file on drop unless persisted
        let (file, tmp_path) = tmp.into_parts();
        let mut file = tokio::fs::File::from_std(file);
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            written += chunk.len() as u64;
            if written > self.max_file_size {
                return Err(DebugInfoError::TooLarge {
                    limit: self.max_file_size,
                });
            }
            file.write_all(&chunk).await?;
        }
        file.sync_all().await?;
        drop(file);

        let dest = dest.to_path_buf();
        blocking(move || tmp_path.persist(dest).map_err(|e| e.error)).await?;
        Ok(())
    }
}

/// Run blocking cache I/O off the async worker threads.
async fn blocking<T, F>(f: F) -> std::io::Result<T>
where
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(std::io::Error::other)?
}
