// src/rules/filter.rs
//! Narrowing the rule set to what a given fleet of targets can actually satisfy.

use super::{Applicability, Rule};
use crate::binary::{Architecture, Isa};
use crate::toolchain::{Compiler, Version};
use anyhow::{Context, Result, anyhow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformTarget {
    pub architecture: Architecture,
    pub max_isa: Option<Isa>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilerTarget {
    pub compiler: Compiler,
    pub max_version: Option<Version>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetFilter {
    pub platforms: Vec<PlatformTarget>,
    pub compilers: Vec<CompilerTarget>,
}

impl TargetFilter {
    /// Parse comma separated `name[:version]` lists, e.g. `arm64:v8.3` and `gcc:9.0`.
    pub fn parse(platforms: &str, compilers: &str) -> Result<Self> {
        let mut filter = TargetFilter::default();

        for item in split_list(platforms) {
            let (name, isa) = split_target(item);
            let architecture = name
                .parse::<Architecture>()
                .map_err(|e| anyhow!("invalid target platform {:?}: {}", item, e))?;
            let max_isa = isa
                .map(|s| s.parse::<Isa>())
                .transpose()
                .map_err(|e| anyhow!("invalid ISA in {:?}: {}", item, e))?;
            filter.platforms.push(PlatformTarget {
                architecture,
                max_isa,
            });
        }

        for item in split_list(compilers) {
            let (name, version) = split_target(item);
            let compiler = name
                .parse::<Compiler>()
                .map_err(|e| anyhow!("invalid target compiler {:?}: {}", item, e))?;
            let max_version = version
                .map(|s| s.parse::<Version>())
                .transpose()
                .with_context(|| format!("invalid compiler version in {:?}", item))?;
            filter.compilers.push(CompilerTarget {
                compiler,
                max_version,
            });
        }

        Ok(filter)
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty() && self.compilers.is_empty()
    }

    pub fn matches(&self, applicability: &Applicability) -> bool {
        let platform = &applicability.platform;
        for target in &self.platforms {
            if !platform.architecture.matches(target.architecture) {
                return false;
            }
            if let Some(max_isa) = &target.max_isa {
                if platform.min_isa.major > 0 && !max_isa.is_at_least(&platform.min_isa) {
                    return false;
                }
            }
        }

        for target in &self.compilers {
            let Some(req) = applicability.compilers.get(&target.compiler) else {
                return false;
            };
            if let Some(max_version) = &target.max_version {
                if req.min_version.major > 0 && !max_version.is_at_least(&req.min_version) {
                    return false;
                }
            }
        }

        true
    }

    /// Keep the rules this filter matches, preserving order.
    pub fn filter_rules<'a>(&self, rules: Vec<&'a Rule>) -> Vec<&'a Rule> {
        if self.is_empty() {
            return rules;
        }
        rules
            .into_iter()
            .filter(|r| self.matches(&r.applicability))
            .collect()
    }
}

fn split_list(s: &str) -> impl Iterator<Item = &str> {
    s.split(',').map(str::trim).filter(|p| !p.is_empty())
}

fn split_target(item: &str) -> (&str, Option<&str>) {
    match item.split_once(':') {
        Some((name, version)) => (name.trim(), Some(version.trim())),
        None => (item, None),
    }
}
