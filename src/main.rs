use clap::Parser;
use elfguard::cli::{Commands, EXIT_ERROR, ElfguardCli, init_tracing};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "elfguard", version)]
#[command(about = "Check ELF binaries for compiler and linker hardening")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level: none, debug, info, warn, error (RUST_LOG takes precedence)
    #[arg(long, global = true, default_value = "error")]
    log_level: String,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true, value_name = "FILE")]
    log: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli.log_level, cli.log.as_deref()) {
        eprintln!("Error: {:#}", e);
        return ExitCode::from(EXIT_ERROR);
    }

    let app = match ElfguardCli::new() {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let argv: Vec<String> = std::env::args().skip(1).collect();
    match app.handle_command(cli.command, argv).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
