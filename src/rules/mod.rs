// src/rules/mod.rs
//! Hardening rules: applicability model, evaluation and remediation text.

pub mod checks;
pub mod filter;
pub mod registry;
pub mod suggestions;

pub use self::filter::{CompilerTarget, PlatformTarget, TargetFilter};
pub use self::registry::{DEFAULT_PRESET, all, default_rules, find};
pub use self::suggestions::{build_suggestion, decorate};

use crate::binary::{Architecture, ElfBinary, Platform};
use crate::toolchain::{Compiler, Version};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passed,
    Failed,
    Skipped,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Passed => "passed",
            Status::Failed => "failed",
            Status::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleResult {
    pub status: Status,
    pub message: String,
}

impl RuleResult {
    pub fn passed(message: impl Into<String>) -> Self {
        Self {
            status: Status::Passed,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Status::Failed,
            message: message.into(),
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            status: Status::Skipped,
            message: message.into(),
        }
    }
}

/// Outcome of one rule against one binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub rule_id: String,
    pub name: String,
    pub status: Status,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Finding {
    pub fn new(rule: &Rule, result: RuleResult) -> Self {
        Self {
            rule_id: rule.id.to_string(),
            name: rule.name.to_string(),
            status: result.status,
            message: result.message,
            suggestion: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilerRequirement {
    pub min_version: Version,
    /// Version from which the feature is on without any flag; zero when never.
    pub default_version: Version,
    pub flag: &'static str,
}

impl CompilerRequirement {
    pub const fn new(min_version: Version, flag: &'static str) -> Self {
        Self {
            min_version,
            default_version: Version::new(0, 0),
            flag,
        }
    }

    pub const fn with_default(min_version: Version, default_version: Version, flag: &'static str) -> Self {
        Self {
            min_version,
            default_version,
            flag,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applicability {
    pub platform: Platform,
    pub compilers: BTreeMap<Compiler, CompilerRequirement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicabilityResult {
    Applicable,
    NotApplicableArchitecture,
    NotApplicableCompiler,
}

impl Applicability {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            compilers: BTreeMap::new(),
        }
    }

    pub fn compiler(mut self, compiler: Compiler, requirement: CompilerRequirement) -> Self {
        self.compilers.insert(compiler, requirement);
        self
    }

    pub fn check(&self, architecture: Architecture, compiler: Compiler) -> ApplicabilityResult {
        if !architecture.matches(self.platform.architecture) {
            return ApplicabilityResult::NotApplicableArchitecture;
        }
        if compiler.is_known() && !self.compilers.is_empty() && !self.compilers.contains_key(&compiler) {
            return ApplicabilityResult::NotApplicableCompiler;
        }
        ApplicabilityResult::Applicable
    }
}

pub fn check_applicability(applicability: &Applicability, binary: &ElfBinary) -> ApplicabilityResult {
    applicability.check(binary.architecture, binary.toolchain.compiler)
}

/// A registered hardening check. Rules are plain data plus a pure function.
pub struct Rule {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub applicability: Applicability,
    pub(crate) check: fn(&ElfBinary) -> RuleResult,
}

impl Rule {
    pub fn execute(&self, binary: &ElfBinary) -> RuleResult {
        (self.check)(binary)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// Evaluate `rules` in order. Inapplicable rules become Skipped findings.
pub fn check(rules: &[&Rule], binary: &ElfBinary) -> Vec<Finding> {
    check_until(rules, binary, || false).unwrap_or_default()
}

/// Like [`check`], but gives up and returns `None` as soon as `cancelled` reports true.
pub fn check_until(
    rules: &[&Rule],
    binary: &ElfBinary,
    cancelled: impl Fn() -> bool,
) -> Option<Vec<Finding>> {
    let mut findings = Vec::with_capacity(rules.len());
    for rule in rules {
        if cancelled() {
            return None;
        }
        let result = match check_applicability(&rule.applicability, binary) {
            ApplicabilityResult::Applicable => rule.execute(binary),
            ApplicabilityResult::NotApplicableArchitecture => RuleResult::skipped(format!(
                "rule not applicable to {} architecture",
                binary.architecture
            )),
            ApplicabilityResult::NotApplicableCompiler => RuleResult::skipped(format!(
                "rule not applicable to {} binaries",
                binary.toolchain.compiler
            )),
        };
        findings.push(Finding::new(rule, result));
    }
    Some(findings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::Isa;

    fn arm_only() -> Applicability {
        Applicability::new(Platform::new(Architecture::ALL_ARM, Isa::default()))
            .compiler(Compiler::Gcc, CompilerRequirement::new(Version::new(10, 1), "-mbranch-protection=standard"))
    }

    #[test]
    fn test_architecture_applicability_is_mask_overlap() {
        let rule_masks = [
            Architecture::ALL_X86,
            Architecture::ALL_ARM,
            Architecture::ARM64,
            Platform::ALL.architecture,
            Architecture::RISCV.union(Architecture::MIPS),
        ];
        for bit in 0..8 {
            let arch = Architecture(1 << bit);
            for mask in rule_masks {
                let app = Applicability::new(Platform::new(mask, Isa::default()));
                let inapplicable = app.check(arch, Compiler::Unknown) == ApplicabilityResult::NotApplicableArchitecture;
                assert_eq!(inapplicable, arch.0 & mask.0 == 0);
            }
        }
    }

    #[test]
    fn test_compiler_applicability() {
        let app = arm_only();
        assert_eq!(app.check(Architecture::ARM64, Compiler::Gcc), ApplicabilityResult::Applicable);
        assert_eq!(app.check(Architecture::ARM64, Compiler::Unknown), ApplicabilityResult::Applicable);
        assert_eq!(
            app.check(Architecture::ARM64, Compiler::Rustc),
            ApplicabilityResult::NotApplicableCompiler
        );
        let open = Applicability::new(Platform::ALL);
        assert_eq!(open.check(Architecture::AMD64, Compiler::Rustc), ApplicabilityResult::Applicable);
    }

    #[test]
    fn test_architecture_checked_before_compiler() {
        let app = arm_only();
        assert_eq!(
            app.check(Architecture::AMD64, Compiler::Rustc),
            ApplicabilityResult::NotApplicableArchitecture
        );
    }
}
