// src/report/text.rs
use super::ReportOptions;
use crate::rules::Status;
use crate::scanner::FileResult;
use std::io::{self, Write};

/// One line per finding: `FAIL = pie @ /usr/bin/foo: Not PIE <suggestion>`.
pub fn write_text<W: Write>(results: &[FileResult], options: &ReportOptions, out: &mut W) -> io::Result<()> {
    for result in results {
        let path = result.path_str();
        if let Some(err) = &result.error {
            writeln!(out, "ERROR = {}: {}", path, err)?;
            continue;
        }

        for finding in result.findings.iter().filter(|f| options.keeps(f)) {
            let tag = match finding.status {
                Status::Passed => "PASS",
                Status::Failed => "FAIL",
                Status::Skipped => "SKIP",
            };
            match &finding.suggestion {
                Some(suggestion) if finding.status == Status::Failed => writeln!(
                    out,
                    "{} = {} @ {}: {} {}",
                    tag, finding.rule_id, path, finding.message, suggestion
                )?,
                _ => writeln!(out, "{} = {} @ {}: {}", tag, finding.rule_id, path, finding.message)?,
            }
        }
    }
    Ok(())
}
