// src/cli/mod.rs
use crate::config::Config;
use anyhow::Result;
use clap::Subcommand;

mod analyze;
mod input;
mod list_rules;
mod logging;

pub use analyze::{AnalyzeArgs, select_rules};
pub use input::{parse_paths, read_paths};
pub use list_rules::render_rule_list;
pub use logging::{LOG_LEVELS, filter_directive, init_tracing};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FINDINGS: u8 = 1;
pub const EXIT_ERROR: u8 = 2;

#[derive(Subcommand)]
pub enum Commands {
    /// Check binaries for security hardening features
    Analyze(AnalyzeArgs),
    /// List the available rules
    ListRules,
}

pub struct ElfguardCli {
    config: Config,
}

impl ElfguardCli {
    pub fn new() -> Result<Self> {
        Ok(Self {
            config: Config::from_env()?,
        })
    }

    pub fn with_config(config: Config) -> Self {
        Self { config }
    }

    /// Run `command` and return the process exit code. Errors are
    /// configuration problems and map to [`EXIT_ERROR`].
    pub async fn handle_command(&self, command: Commands, argv: Vec<String>) -> Result<u8> {
        match command {
            Commands::Analyze(args) => self.handle_analyze_command(args, argv).await,
            Commands::ListRules => self.handle_list_rules_command(),
        }
    }
}
