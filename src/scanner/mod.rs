// src/scanner/mod.rs
//! File discovery and the bounded worker pool that turns paths into [`FileResult`]s.

pub mod result;

pub use self::result::{BuildInfo, FileResult};

use crate::binary::{self, ElfBinary, ParseError};
use crate::debuginfo::{self, DebugInfoError};
use crate::rules::{self, Rule, suggestions};
use crate::toolchain;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

pub struct ScanOptions {
    /// Maximum number of files analyzed at once. Zero is treated as one.
    pub workers: usize,
    pub rules: Vec<&'static Rule>,
    pub debuginfo: Option<Arc<debuginfo::Client>>,
    pub cancel: CancellationToken,
}

struct Context {
    rules: Vec<&'static Rule>,
    debuginfo: Option<Arc<debuginfo::Client>>,
    cancel: CancellationToken,
}

pub struct Scanner {
    workers: usize,
    ctx: Arc<Context>,
}

impl Scanner {
    pub fn new(options: ScanOptions) -> Self {
        Self {
            workers: options.workers.max(1),
            ctx: Arc::new(Context {
                rules: options.rules,
                debuginfo: options.debuginfo,
                cancel: options.cancel,
            }),
        }
    }

    /// Discover files under `paths` and analyze them in the background.
    ///
    /// One result is sent per discovered file, in completion order. The
    /// receiver yields `None` once every worker has finished. Files whose
    /// analysis is interrupted by cancellation produce no result.
    pub fn scan_paths(&self, paths: Vec<PathBuf>, recursive: bool) -> mpsc::Receiver<FileResult> {
        let (tx, rx) = mpsc::channel(self.workers * 2);
        let workers = self.workers;
        let ctx = self.ctx.clone();

        tokio::spawn(async move {
            let files = match tokio::task::spawn_blocking(move || discover(&paths, recursive)).await {
                Ok(files) => files,
                Err(e) => {
                    tracing::warn!("file discovery task failed: {}", e);
                    return;
                }
            };
            tracing::debug!("collected {} files to scan with {} workers", files.len(), workers);
            dispatch(ctx, files, workers, tx).await;
        });

        rx
    }
}

async fn dispatch(ctx: Arc<Context>, files: Vec<PathBuf>, workers: usize, tx: mpsc::Sender<FileResult>) {
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut tasks = JoinSet::new();

    for path in files {
        let permit = tokio::select! {
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = ctx.cancel.cancelled() => break,
        };

        let ctx = ctx.clone();
        let tx = tx.clone();
        tasks.spawn(async move {
            let _permit = permit;
            if let Some(result) = scan_file(&ctx, path).await {
                let _ = tx.send(result).await;
            }
        });
    }

    // the receiver closes once the last worker's sender clone is gone
    drop(tx);
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::warn!("scan worker failed: {}", e);
        }
    }
}

/// Expand `paths` into the list of files to analyze.
///
/// A file path is taken as is. A directory contributes its regular files,
/// either immediate children or the whole subtree. Inaccessible inputs are
/// logged and skipped.
pub fn discover(paths: &[PathBuf], recursive: bool) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        let meta = match std::fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!("failed to collect files from {}: {}", path.display(), e);
                continue;
            }
        };
        if !meta.is_dir() {
            files.push(path.clone());
            continue;
        }

        let mut walker = WalkDir::new(path).min_depth(1).sort_by_file_name();
        if !recursive {
            walker = walker.max_depth(1);
        }
        for entry in walker {
            match entry {
                Ok(entry) if entry.path().is_file() => files.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => tracing::warn!("failed to walk {}: {}", path.display(), e),
            }
        }
    }
    files
}

enum Loaded {
    Done(FileResult),
    Parsed { binary: ElfBinary, sha256: String },
}

fn load(path: &Path) -> Loaded {
    tracing::debug!("scanning file {}", path.display());
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!("failed to read {}: {}", path.display(), e);
            return Loaded::Done(FileResult::failed(path, String::new(), format!("failed to read file: {}", e)));
        }
    };
    let sha256 = format!("{:x}", Sha256::digest(&data));

    match binary::parse(&data) {
        Ok(mut binary) => {
            toolchain::detect_binary(&mut binary);
            Loaded::Parsed { binary, sha256 }
        }
        Err(ParseError::UnsupportedFormat) => {
            tracing::debug!("skipping unsupported format {}", path.display());
            Loaded::Done(FileResult::unsupported(path, sha256))
        }
        Err(e) => {
            tracing::warn!("failed to analyze {}: {}", path.display(), e);
            Loaded::Done(FileResult::failed(path, sha256, e))
        }
    }
}

async fn scan_file(ctx: &Arc<Context>, path: PathBuf) -> Option<FileResult> {
    if ctx.cancel.is_cancelled() {
        return None;
    }

    let load_path = path.clone();
    let (mut binary, sha256) = match tokio::task::spawn_blocking(move || load(&load_path)).await {
        Ok(Loaded::Parsed { binary, sha256 }) => (binary, sha256),
        Ok(Loaded::Done(result)) => return Some(result),
        Err(e) => return Some(FileResult::failed(&path, String::new(), e)),
    };

    if let Some(client) = &ctx.debuginfo {
        if !binary.build_id.is_empty() {
            binary = match enhance(client, binary, &ctx.cancel).await {
                Some(binary) => binary,
                None => return None,
            };
        }
    }

    let ctx = ctx.clone();
    let (task_path, task_sha256) = (path.clone(), sha256.clone());
    let evaluated = tokio::task::spawn_blocking(move || {
        let cancel = &ctx.cancel;
        let mut findings = rules::check_until(&ctx.rules, &binary, || cancel.is_cancelled())?;
        suggestions::decorate(&mut findings, &binary.toolchain);
        Some(FileResult::analyzed(&task_path, task_sha256, &binary, findings))
    })
    .await;

    evaluation_outcome(&path, sha256, evaluated)
}

/// A crashed evaluation still reports the file, as an error.
fn evaluation_outcome(path: &Path, sha256: String, evaluated: Result<Option<FileResult>, JoinError>) -> Option<FileResult> {
    match evaluated {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!("rule evaluation failed for {}: {}", path.display(), e);
            Some(FileResult::failed(path, sha256, format!("rule evaluation failed: {}", e)))
        }
    }
}

/// Try to improve `binary` with downloaded debug symbols. Returns `None` only
/// when cancelled; every other failure leaves the binary as it was.
async fn enhance(client: &debuginfo::Client, binary: ElfBinary, cancel: &CancellationToken) -> Option<ElfBinary> {
    let build_id = binary.build_id.clone();
    let debug_path = match client.fetch_debug_info(&build_id, cancel).await {
        Ok(path) => path,
        Err(DebugInfoError::Cancelled) => return None,
        Err(e) => {
            tracing::debug!("no debug symbols for {}: {}", build_id, e);
            return Some(binary);
        }
    };

    let original = binary.clone();
    let enhanced = tokio::task::spawn_blocking(move || {
        let mut binary = binary;
        debuginfo::enhance(&mut binary, &debug_path).map(|()| binary)
    })
    .await;

    Some(enhancement_outcome(&build_id, original, enhanced))
}

/// The enhanced binary, or `original` when enhancement failed or crashed.
fn enhancement_outcome(
    build_id: &str,
    original: ElfBinary,
    enhanced: Result<anyhow::Result<ElfBinary>, JoinError>,
) -> ElfBinary {
    match enhanced {
        Ok(Ok(binary)) => binary,
        Ok(Err(e)) => {
            tracing::debug!("failed to enhance with debug symbols for {}: {:#}", build_id, e);
            original
        }
        Err(e) => {
            tracing::warn!("debug symbol enhancement crashed for {}: {}", build_id, e);
            original
        }
    }
}
