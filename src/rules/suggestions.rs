// src/rules/suggestions.rs
//! Remediation hints for failed findings, tailored to the detected toolchain.

use super::{Applicability, Finding, Status, find};
use crate::toolchain::{Compiler, Toolchain};

pub fn build_suggestion(toolchain: &Toolchain, applicability: &Applicability) -> String {
    if toolchain.compiler.is_known() {
        compiler_suggestion(toolchain, applicability)
    } else {
        generic_suggestion(applicability)
    }
}

fn generic_suggestion(applicability: &Applicability) -> String {
    let options: Vec<String> = Compiler::KNOWN
        .iter()
        .filter_map(|c| applicability.compilers.get(c).map(|req| (c, req)))
        .filter(|(_, req)| !req.flag.is_empty())
        .map(|(c, req)| format!("{} {}+ with \"{}\"", c.display_name(), req.min_version, req.flag))
        .collect();

    if options.is_empty() {
        "Toolchain not detected (binary likely stripped).".to_string()
    } else {
        format!(
            "Toolchain not detected (binary likely stripped), use {}.",
            options.join(" or ")
        )
    }
}

fn compiler_suggestion(toolchain: &Toolchain, applicability: &Applicability) -> String {
    let compiler = toolchain.compiler;
    let Some(req) = applicability.compilers.get(&compiler) else {
        let alternative = if compiler == Compiler::Gcc {
            Compiler::Clang
        } else {
            Compiler::Gcc
        };
        return match applicability.compilers.get(&alternative) {
            Some(alt) => format!(
                "Feature requires {} {}+. Consider switching or use alternatives.",
                alternative, alt.min_version
            ),
            None => "Feature not supported by detected compilers.".to_string(),
        };
    };

    let version = toolchain.version;
    let flag = req.flag;

    if version.is_zero() {
        return format!("Requires {} {}+ with \"{}\".", compiler, req.min_version, flag);
    }
    if !version.is_at_least(&req.min_version) {
        return format!(
            "Requires {} {}+ (you have {} {}), update and use \"{}\".",
            compiler, req.min_version, compiler, version, flag
        );
    }
    if req.default_version.is_zero() {
        return format!("Use \"{}\".", flag);
    }
    if !version.is_at_least(&req.default_version) {
        return format!("Use \"{}\" (default in {} {}+).", flag, compiler, req.default_version);
    }
    format!(
        "Should be enabled by default in {} {}+. Check build configuration or use \"{}\".",
        compiler, req.default_version, flag
    )
}

/// Attach a suggestion to every failed finding whose rule is registered.
pub fn decorate(findings: &mut [Finding], toolchain: &Toolchain) {
    for finding in findings.iter_mut().filter(|f| f.status == Status::Failed) {
        if let Some(rule) = find(&finding.rule_id) {
            finding.suggestion = Some(build_suggestion(toolchain, &rule.applicability));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::Platform;
    use crate::rules::CompilerRequirement;
    use crate::toolchain::Version;

    fn canary() -> Applicability {
        Applicability::new(Platform::ALL)
            .compiler(
                Compiler::Gcc,
                CompilerRequirement::new(Version::new(4, 9), "-fstack-protector-strong"),
            )
            .compiler(
                Compiler::Clang,
                CompilerRequirement::new(Version::new(3, 5), "-fstack-protector-strong"),
            )
    }

    fn clash_protection() -> Applicability {
        Applicability::new(Platform::ALL).compiler(
            Compiler::Gcc,
            CompilerRequirement::with_default(
                Version::new(8, 0),
                Version::new(12, 0),
                "-fstack-clash-protection",
            ),
        )
    }

    fn gcc(major: u32, minor: u32) -> Toolchain {
        Toolchain::new(Compiler::Gcc, Version::new(major, minor))
    }

    #[test]
    fn test_unknown_compiler_lists_options() {
        let s = build_suggestion(&Toolchain::default(), &canary());
        assert_eq!(
            s,
            "Toolchain not detected (binary likely stripped), use GCC 4.9+ with \"-fstack-protector-strong\" or Clang 3.5+ with \"-fstack-protector-strong\"."
        );
    }

    #[test]
    fn test_below_minimum() {
        let s = build_suggestion(&gcc(4, 8), &canary());
        assert!(s.contains("Requires gcc 4.9+"));
        assert!(s.contains("you have gcc 4.8"));
    }

    #[test]
    fn test_between_minimum_and_default() {
        let s = build_suggestion(&gcc(10, 0), &clash_protection());
        assert_eq!(s, "Use \"-fstack-clash-protection\" (default in gcc 12.0+).");
    }

    #[test]
    fn test_no_default_version() {
        let app = Applicability::new(Platform::ALL).compiler(
            Compiler::Clang,
            CompilerRequirement::new(Version::new(7, 0), "-fsanitize=safe-stack"),
        );
        let clang = Toolchain::new(Compiler::Clang, Version::new(15, 0));
        assert_eq!(build_suggestion(&clang, &app), "Use \"-fsanitize=safe-stack\".");
    }

    #[test]
    fn test_unsupported_compiler_names_alternative() {
        let app = Applicability::new(Platform::ALL).compiler(
            Compiler::Clang,
            CompilerRequirement::new(Version::new(3, 7), "-fsanitize=cfi"),
        );
        let s = build_suggestion(&gcc(12, 0), &app);
        assert!(s.contains("requires clang 3.7+"));
    }

    #[test]
    fn test_at_or_above_default() {
        let s = build_suggestion(&gcc(14, 0), &clash_protection());
        assert!(s.starts_with("Should be enabled by default in gcc 12.0+"));
    }

    #[test]
    fn test_empty_requirements() {
        let app = Applicability::new(Platform::ALL);
        assert_eq!(
            build_suggestion(&gcc(12, 0), &app),
            "Feature not supported by detected compilers."
        );
    }

    #[test]
    fn test_unknown_version_never_prints_zero() {
        let s = build_suggestion(&Toolchain::new(Compiler::Gcc, Version::default()), &canary());
        assert_eq!(s, "Requires gcc 4.9+ with \"-fstack-protector-strong\".");
        assert!(!s.contains("0.0"));
    }

    #[test]
    fn test_decorate_only_touches_failures() {
        let pie = find("pie").unwrap();
        let mut findings = vec![
            Finding::new(pie, crate::rules::RuleResult::failed("Not PIE")),
            Finding::new(pie, crate::rules::RuleResult::passed("PIE enabled")),
        ];
        decorate(&mut findings, &gcc(5, 4));
        assert_eq!(
            findings[0].suggestion.as_deref(),
            Some("Use \"-fPIE -pie\" (default in gcc 6.1+).")
        );
        assert!(findings[1].suggestion.is_none());
    }
}
