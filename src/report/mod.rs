// src/report/mod.rs
//! Rendering scan results: text lines, JSON, SARIF and the fleet summary.

pub mod aggregate;
pub mod json;
pub mod sarif;
pub mod text;

pub use self::aggregate::AggregatedReport;
pub use self::sarif::{Invocation, SarifReport};

use crate::rules::{Finding, Status};
use crate::scanner::FileResult;
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Which findings reach the output. Failures are always kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    pub include_passed: bool,
    pub include_skipped: bool,
}

impl ReportOptions {
    pub fn keeps(&self, finding: &Finding) -> bool {
        match finding.status {
            Status::Failed => true,
            Status::Passed => self.include_passed,
            Status::Skipped => self.include_skipped,
        }
    }
}

pub fn write_report<W: Write>(
    format: OutputFormat,
    results: &[FileResult],
    options: &ReportOptions,
    out: &mut W,
) -> io::Result<()> {
    match format {
        OutputFormat::Text => text::write_text(results, options, out),
        OutputFormat::Json => json::write_json(results, options, out),
    }
}
