// src/report/json.rs
use super::ReportOptions;
use crate::scanner::FileResult;
use serde::Serialize;
use std::io::{self, Write};

#[derive(Serialize)]
struct JsonReport {
    tool: &'static str,
    version: &'static str,
    results: Vec<FileResult>,
}

pub fn write_json<W: Write>(results: &[FileResult], options: &ReportOptions, out: &mut W) -> io::Result<()> {
    let results = results
        .iter()
        .map(|r| {
            let mut r = r.clone();
            r.findings.retain(|f| options.keeps(f));
            r
        })
        .collect();
    let report = JsonReport {
        tool: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        results,
    };
    serde_json::to_writer_pretty(&mut *out, &report)?;
    writeln!(out)
}
