// src/report/aggregate.rs
//! Fleet-wide summary: which toolchain upgrades and flags would fix the failures.

use crate::rules::{CompilerRequirement, Status, find};
use crate::scanner::FileResult;
use crate::toolchain::{Compiler, Version};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write as _};

type PathSet = BTreeSet<String>;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AggregatedReport {
    /// compiler -> required version -> binaries
    pub upgrades: BTreeMap<Compiler, BTreeMap<Version, PathSet>>,
    /// flag -> binaries
    pub flags: BTreeMap<&'static str, PathSet>,
    /// Analyzed binaries without a single failed finding, sorted.
    pub passed_all: Vec<String>,
}

impl AggregatedReport {
    pub fn from_results(results: &[FileResult]) -> Self {
        let mut agg = AggregatedReport::default();
        for result in results.iter().filter(|r| r.error.is_none() && !r.skipped) {
            agg.add(result);
        }
        agg.passed_all.sort();
        agg
    }

    fn add(&mut self, result: &FileResult) {
        let path = result.path_str();
        let detected = result.build.toolchain.compiler;

        let failed: Vec<_> = result
            .findings
            .iter()
            .filter(|f| f.status == Status::Failed)
            .collect();
        if failed.is_empty() {
            self.passed_all.push(path);
            return;
        }

        for finding in failed {
            let Some(rule) = find(&finding.rule_id) else {
                continue;
            };
            for (compiler, req) in &rule.applicability.compilers {
                if detected.is_known() && *compiler != detected {
                    continue;
                }
                self.add_requirement(*compiler, req, &path);
            }
        }
    }

    fn add_requirement(&mut self, compiler: Compiler, req: &CompilerRequirement, path: &str) {
        let version = if req.default_version.is_zero() {
            req.min_version
        } else {
            req.default_version
        };
        if !version.is_zero() {
            self.upgrades
                .entry(compiler)
                .or_default()
                .entry(version)
                .or_default()
                .insert(path.to_string());
        }
        if !req.flag.is_empty() {
            self.flags.entry(req.flag).or_default().insert(path.to_string());
        }
    }

    /// Highest required version for `compiler`, with every binary that needs an upgrade.
    fn highest(&self, compiler: Compiler) -> Option<(Version, PathSet)> {
        let versions = self.upgrades.get(&compiler)?;
        let (highest, _) = versions.iter().next_back()?;
        let paths = versions.values().flatten().cloned().collect();
        Some((*highest, paths))
    }
}

fn write_upgrade(out: &mut String, label: &str, paths: &PathSet) -> fmt::Result {
    writeln!(out, "  {}:", label)?;
    for path in paths {
        writeln!(out, "    {}", path)?;
    }
    writeln!(out)
}

impl fmt::Display for AggregatedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();

        let gcc = self.highest(Compiler::Gcc);
        let clang = self.highest(Compiler::Clang);
        let rustc = self.highest(Compiler::Rustc);

        if gcc.is_some() || clang.is_some() || rustc.is_some() {
            out.push_str("Ensure minimum toolchain version (prerequisite). The following features require at least these compiler versions:\n\n");
            match (&gcc, &clang) {
                (Some((gv, gp)), Some((cv, cp))) if gp == cp => {
                    write_upgrade(&mut out, &format!("GCC {}+ or Clang {}+", gv, cv), gp)?;
                }
                _ => {
                    for (compiler, entry) in [(Compiler::Gcc, &gcc), (Compiler::Clang, &clang)] {
                        if let Some((version, paths)) = entry {
                            write_upgrade(&mut out, &format!("{} {}+", compiler.display_name(), version), paths)?;
                        }
                    }
                }
            }
            if let Some((version, paths)) = &rustc {
                write_upgrade(&mut out, &format!("{} {}+", Compiler::Rustc.display_name(), version), paths)?;
            }
        }

        if !self.flags.is_empty() {
            let with_findings: PathSet = self.flags.values().flatten().cloned().collect();
            let (universal, partial): (Vec<_>, Vec<_>) = self
                .flags
                .iter()
                .partition(|(_, paths)| paths.len() == with_findings.len());

            out.push_str("Add following flags, even with the correct toolchain, these flags must be explicitly added:\n\n");
            if !universal.is_empty() {
                let flags: Vec<&str> = universal.iter().map(|(flag, _)| **flag).collect();
                writeln!(out, "  {}", flags.join(" "))?;
            }
            for (flag, paths) in partial {
                let paths: Vec<&str> = paths.iter().map(String::as_str).collect();
                writeln!(out, "  {}", flag)?;
                writeln!(out, "    Only: {}", paths.join(", "))?;
            }
            out.push('\n');
        }

        if !self.passed_all.is_empty() {
            writeln!(
                out,
                "Fully hardened ({} binaries): {}",
                self.passed_all.len(),
                self.passed_all.join(", ")
            )?;
        }

        if out.is_empty() {
            out.push_str("No binaries analyzed.\n");
        }
        f.write_str(&out)
    }
}
