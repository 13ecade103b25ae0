// src/cli/analyze.rs
use crate::cli::{EXIT_FINDINGS, EXIT_SUCCESS, ElfguardCli, input};
use crate::config::{Config, parse_url_list};
use crate::debuginfo;
use crate::report::{self, AggregatedReport, Invocation, OutputFormat, ReportOptions, SarifReport};
use crate::rules::{self, Rule, TargetFilter};
use crate::scanner::{FileResult, ScanOptions, Scanner};
use anyhow::{Context, Result, anyhow, bail};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(clap::Args, Debug, Clone, Default)]
pub struct AnalyzeArgs {
    /// Files or directories to analyze
    pub paths: Vec<PathBuf>,

    /// Read paths from a file, one per line ("-" for stdin)
    #[arg(short, long, value_name = "FILE", conflicts_with = "paths")]
    pub input: Option<String>,

    /// Number of files analyzed in parallel [default: number of CPUs]
    #[arg(short, long)]
    pub parallel: Option<usize>,

    /// Recurse into subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Comma separated rule ids to run instead of the default set
    #[arg(long, value_delimiter = ',')]
    pub rules: Vec<String>,

    /// Only run rules available for these platforms, e.g. "amd64,arm64:v8.3"
    #[arg(long)]
    pub target_platform: Option<String>,

    /// Only run rules available for these compilers, e.g. "gcc:9.0,clang"
    #[arg(long)]
    pub target_compiler: Option<String>,

    /// Print toolchain upgrades and flags that would fix the failures
    #[arg(long)]
    pub aggregate: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Also write a SARIF 2.1.0 report to this file
    #[arg(long, value_name = "FILE")]
    pub sarif: Option<PathBuf>,

    #[arg(long)]
    pub include_passed: bool,

    #[arg(long)]
    pub include_skipped: bool,

    /// Exit with 0 even when checks fail
    #[arg(long)]
    pub exit_zero: bool,

    /// Fetch debug symbols from debuginfod servers
    #[arg(long)]
    pub debuginfod: bool,

    /// Comma separated debuginfod server URLs
    #[arg(long)]
    pub debuginfod_servers: Option<String>,

    #[arg(long, value_name = "DIR")]
    pub debuginfod_cache: Option<PathBuf>,

    /// HTTP timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub debuginfod_timeout: Option<u64>,

    /// Attempts per server
    #[arg(long, value_name = "N")]
    pub debuginfod_retries: Option<u32>,

    /// Largest debug file accepted, in bytes
    #[arg(long, value_name = "BYTES")]
    pub debuginfod_max_size: Option<u64>,
}

impl AnalyzeArgs {
    fn report_options(&self) -> ReportOptions {
        ReportOptions {
            include_passed: self.include_passed,
            include_skipped: self.include_skipped,
        }
    }

    /// Environment defaults overridden by whatever was given on the command line.
    pub fn merge_config(&self, base: &Config) -> Result<Config> {
        let mut config = base.clone();
        if let Some(parallel) = self.parallel {
            config.parallel = parallel;
        }
        config.debuginfod |= self.debuginfod;
        if let Some(servers) = &self.debuginfod_servers {
            config.debuginfod_servers = parse_url_list(servers);
        }
        if let Some(cache) = &self.debuginfod_cache {
            config.debuginfod_cache = Some(cache.clone());
        }
        if let Some(timeout) = self.debuginfod_timeout {
            config.debuginfod_timeout_secs = timeout;
        }
        if let Some(retries) = self.debuginfod_retries {
            config.debuginfod_retries = retries;
        }
        if let Some(max_size) = self.debuginfod_max_size {
            config.debuginfod_max_size = max_size;
        }
        config.validate()?;
        Ok(config)
    }

    /// Positional paths, or the contents of `--input`.
    pub fn resolve_paths(&self) -> Result<Vec<PathBuf>> {
        match &self.input {
            Some(_) if !self.paths.is_empty() => {
                bail!("--input and positional paths are mutually exclusive")
            }
            Some(source) => {
                let paths = input::read_paths(source)?;
                if paths.is_empty() {
                    bail!("no paths found in input");
                }
                Ok(paths)
            }
            None if self.paths.is_empty() => bail!("no paths specified"),
            None => Ok(self.paths.clone()),
        }
    }
}

/// Resolve `--rules` (or the default set) and narrow it with the target filters.
pub fn select_rules(
    ids: &[String],
    target_platform: Option<&str>,
    target_compiler: Option<&str>,
) -> Result<Vec<&'static Rule>> {
    let ids: Vec<&str> = ids.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).collect();
    let mut selected = if ids.is_empty() {
        rules::default_rules()
    } else {
        ids.iter()
            .map(|id| rules::find(id).ok_or_else(|| anyhow!("unknown rule {:?}", id)))
            .collect::<Result<Vec<_>>>()?
    };

    let filter = TargetFilter::parse(target_platform.unwrap_or(""), target_compiler.unwrap_or(""))?;
    if !filter.is_empty() {
        selected = filter.filter_rules(selected);
        if selected.is_empty() {
            bail!("no rules match the specified target filter");
        }
    }
    Ok(selected)
}

impl ElfguardCli {
    pub async fn handle_analyze_command(&self, args: AnalyzeArgs, argv: Vec<String>) -> Result<u8> {
        let mut invocation = Invocation::start(argv);

        let selected = select_rules(
            &args.rules,
            args.target_platform.as_deref(),
            args.target_compiler.as_deref(),
        )?;
        let paths = args.resolve_paths()?;
        let config = args.merge_config(&self.config)?;

        let debuginfo = if config.debuginfod {
            let client = debuginfo::Client::new(config.debuginfo_options())
                .context("failed to set up debuginfod client")?;
            Some(Arc::new(client))
        } else {
            None
        };

        let cancel = CancellationToken::new();
        let token = cancel.child_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupted, stopping scan");
                cancel.cancel();
            }
        });

        tracing::info!(
            "starting scan of {} paths with {} rules (recursive: {})",
            paths.len(),
            selected.len(),
            args.recursive
        );
        let scanner = Scanner::new(ScanOptions {
            workers: config.parallel,
            rules: selected,
            debuginfo,
            cancel: token,
        });
        let mut rx = scanner.scan_paths(paths, args.recursive);
        let options = args.report_options();

        let streaming = !args.aggregate && args.sarif.is_none() && args.format == OutputFormat::Text;
        let mut total_failed = 0;

        if streaming {
            let stdout = std::io::stdout();
            while let Some(result) = rx.recv().await {
                if result.skipped {
                    continue;
                }
                total_failed += result.failed_rules();
                let mut out = stdout.lock();
                report::text::write_text(std::slice::from_ref(&result), &options, &mut out)?;
            }
        } else {
            let mut results: Vec<FileResult> = Vec::new();
            while let Some(result) = rx.recv().await {
                if !result.skipped {
                    total_failed += result.failed_rules();
                    results.push(result);
                }
            }
            results.sort_by(|a, b| a.path.cmp(&b.path));

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            if args.aggregate {
                write!(out, "{}", AggregatedReport::from_results(&results))?;
            } else {
                report::write_report(args.format, &results, &options, &mut out)?;
            }
            out.flush()?;

            if let Some(sarif_path) = &args.sarif {
                invocation.finish(total_failed == 0);
                let sarif = SarifReport::from_results(&results, &invocation, &options);
                let mut file = std::fs::File::create(sarif_path)
                    .with_context(|| format!("failed to create SARIF file {}", sarif_path.display()))?;
                sarif.write(&mut file).context("failed to write SARIF report")?;
                tracing::info!("SARIF report saved to {}", sarif_path.display());
            }
        }

        tracing::info!("scan finished, {} failed checks", total_failed);
        if total_failed > 0 && !args.exit_zero {
            return Ok(EXIT_FINDINGS);
        }
        Ok(EXIT_SUCCESS)
    }
}
