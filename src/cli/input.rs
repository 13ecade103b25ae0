// src/cli/input.rs
use anyhow::{Context, Result};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

/// Read one path per line from `source`, or from stdin when it is `-`.
/// Blank lines and `#` comments are ignored.
pub fn read_paths(source: &str) -> Result<Vec<PathBuf>> {
    if source == "-" {
        let stdin = std::io::stdin();
        return parse_paths(stdin.lock()).context("failed to read paths from stdin");
    }
    let file = std::fs::File::open(source)
        .with_context(|| format!("failed to open input file {}", source))?;
    parse_paths(BufReader::new(file)).with_context(|| format!("failed to read input file {}", source))
}

pub fn parse_paths<R: BufRead>(reader: R) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        paths.push(PathBuf::from(line));
    }
    Ok(paths)
}
