// src/rules/checks/mod.rs
pub mod cpu;
pub mod instrumentation;
pub mod memory;
pub mod paths;

use super::RuleResult;
use crate::binary::ElfBinary;
use crate::toolchain::Version;
use goblin::elf::header::{ET_DYN, ET_EXEC};

pub(crate) const fn v(major: u32, minor: u32) -> Version {
    Version::new(major, minor)
}

/// Skip result for anything that is neither an executable nor a shared object.
pub(crate) fn require_exec_or_dyn(binary: &ElfBinary) -> Option<RuleResult> {
    if binary.e_type == ET_EXEC || binary.e_type == ET_DYN {
        None
    } else {
        Some(RuleResult::skipped("Not an executable or shared library"))
    }
}

pub(crate) fn any_symbol(binary: &ElfBinary, pred: impl Fn(&str) -> bool) -> bool {
    binary.all_symbols().any(|s| pred(&s.name))
}
