// src/rules/checks/paths.rs
use super::{require_exec_or_dyn, v};
use crate::binary::{ElfBinary, Platform};
use crate::rules::{Applicability, CompilerRequirement as Req, Rule, RuleResult};
use crate::toolchain::Compiler;
use goblin::elf::dynamic::{DT_RPATH, DT_RUNPATH};
use std::path::Path;

pub const NO_INSECURE_RPATH: &str = "no-insecure-rpath";
pub const NO_INSECURE_RUNPATH: &str = "no-insecure-runpath";

const WORLD_WRITABLE: [&str; 3] = ["/tmp", "/var/tmp", "/dev/shm"];

pub fn no_insecure_rpath() -> Rule {
    Rule {
        id: NO_INSECURE_RPATH,
        name: "Secure RPATH",
        description: "Checks DT_RPATH for relative, empty or world-writable search directories that would let an attacker plant libraries.",
        applicability: Applicability::new(Platform::ALL)
            .compiler(Compiler::Gcc, Req::new(v(4, 1), "-Wl,-rpath,/absolute/path"))
            .compiler(Compiler::Clang, Req::new(v(3, 4), "-Wl,-rpath,/absolute/path"))
            .compiler(
                Compiler::Rustc,
                Req::new(v(1, 0), "-C link-arg=-rpath -C link-arg=/absolute/path"),
            ),
        check: check_rpath,
    }
}

pub fn no_insecure_runpath() -> Rule {
    let flag = "-Wl,--enable-new-dtags -Wl,-rpath,/absolute/path";
    Rule {
        id: NO_INSECURE_RUNPATH,
        name: "Secure RUNPATH",
        description: "Checks DT_RUNPATH for relative, empty or world-writable search directories that would let an attacker plant libraries.",
        applicability: Applicability::new(Platform::ALL)
            .compiler(Compiler::Gcc, Req::with_default(v(4, 1), v(6, 1), flag))
            .compiler(Compiler::Clang, Req::with_default(v(3, 4), v(4, 0), flag))
            .compiler(
                Compiler::Rustc,
                Req::new(
                    v(1, 74),
                    "-C link-arg=--enable-new-dtags -C link-arg=-rpath -C link-arg=/absolute/path",
                ),
            ),
        check: check_runpath,
    }
}

fn check_rpath(binary: &ElfBinary) -> RuleResult {
    check_search_path(binary, DT_RPATH, "RPATH")
}

fn check_runpath(binary: &ElfBinary) -> RuleResult {
    check_search_path(binary, DT_RUNPATH, "RUNPATH")
}

fn check_search_path(binary: &ElfBinary, tag: u64, label: &str) -> RuleResult {
    if let Some(skip) = require_exec_or_dyn(binary) {
        return skip;
    }
    let value = binary.dyn_string(tag);
    if value.is_empty() {
        return RuleResult::passed(format!("No {} set", label));
    }
    let insecure = find_insecure_paths(&value);
    if insecure.is_empty() {
        RuleResult::passed(format!("{} secure", label))
    } else {
        RuleResult::failed(format!("Insecure {}: {}", label, insecure.join(", ")))
    }
}

/// Colon separated entries that are unsafe. Empty entries are reported once.
pub fn find_insecure_paths(search_path: &str) -> Vec<String> {
    let mut insecure = Vec::new();
    let mut seen_empty = false;
    for entry in search_path.split(':') {
        if !is_insecure_path(entry) {
            continue;
        }
        if entry.is_empty() {
            if !seen_empty {
                insecure.push("(empty)".to_string());
                seen_empty = true;
            }
        } else {
            insecure.push(entry.to_string());
        }
    }
    insecure
}

fn is_insecure_path(entry: &str) -> bool {
    // empty means the current working directory
    if entry.is_empty() {
        return true;
    }
    if !entry.starts_with('/') && !entry.starts_with('$') {
        return true;
    }
    if entry.starts_with("$ORIGIN") && entry.contains("..") {
        // $ORIGIN/../lib{,64} is the usual co-installed layout
        let base = Path::new(entry).file_name().and_then(|n| n.to_str());
        if !matches!(base, Some("lib") | Some("lib64")) {
            return true;
        }
    }
    WORLD_WRITABLE
        .iter()
        .any(|ww| entry == *ww || entry.starts_with(&format!("{}/", ww)))
}
