// src/rules/checks/memory.rs
//! Linker-level memory layout hardening: PIE, ASLR, RELRO, NX and friends.

use super::{require_exec_or_dyn, v};
use crate::binary::{ElfBinary, Platform};
use crate::rules::{Applicability, CompilerRequirement as Req, Rule, RuleResult};
use crate::toolchain::Compiler;
use goblin::elf::dynamic::{
    DF_1_NODUMP, DF_1_NOOPEN, DF_1_NOW, DF_BIND_NOW, DT_BIND_NOW, DT_FLAGS, DT_FLAGS_1, DT_TEXTREL,
};
use goblin::elf::header::{ET_DYN, ET_EXEC};
use goblin::elf::program_header::{PF_W, PF_X, PT_GNU_RELRO, PT_GNU_STACK, PT_LOAD};

pub const PIE: &str = "pie";
pub const ASLR: &str = "aslr";
pub const RELRO: &str = "relro";
pub const FULL_RELRO: &str = "full-relro";
pub const NX_BIT: &str = "nx-bit";
pub const SEPARATE_CODE: &str = "separate-code";
pub const STACK_LIMIT: &str = "stack-limit";
pub const NO_DLOPEN: &str = "no-dlopen";
pub const NO_DUMP: &str = "no-dump";

const PAGE_SIZE: u64 = 4096;

pub fn pie() -> Rule {
    Rule {
        id: PIE,
        name: "Position Independent Executable",
        description: "Checks that executables are linked as PIE so the kernel can load them at a random base address.",
        applicability: Applicability::new(Platform::ALL)
            .compiler(Compiler::Gcc, Req::with_default(v(4, 1), v(6, 1), "-fPIE -pie"))
            .compiler(Compiler::Clang, Req::with_default(v(3, 4), v(4, 0), "-fPIE -pie"))
            .compiler(Compiler::Rustc, Req::with_default(v(1, 26), v(1, 26), "-C relocation-model=pie")),
        check: check_pie,
    }
}

fn check_pie(binary: &ElfBinary) -> RuleResult {
    match binary.e_type {
        ET_EXEC => RuleResult::failed("Not PIE"),
        ET_DYN if binary.is_pie() => RuleResult::passed("PIE enabled"),
        ET_DYN => RuleResult::skipped("Shared library, PIE not applicable"),
        _ => RuleResult::skipped("Not an executable or shared library"),
    }
}

pub fn aslr() -> Rule {
    let flag = "-fPIE -pie -z noexecstack";
    Rule {
        id: ASLR,
        name: "ASLR Compatibility",
        description: "Checks that the binary can be fully randomized: PIE, a non-executable stack and no text relocations.",
        applicability: Applicability::new(Platform::ALL)
            .compiler(Compiler::Gcc, Req::with_default(v(4, 1), v(6, 1), flag))
            .compiler(Compiler::Clang, Req::with_default(v(3, 4), v(4, 0), flag))
            .compiler(Compiler::Rustc, Req::with_default(v(1, 0), v(1, 26), "-C relocation-model=pie")),
        check: check_aslr,
    }
}

fn check_aslr(binary: &ElfBinary) -> RuleResult {
    match binary.e_type {
        ET_EXEC => return RuleResult::failed("Not ASLR compatible, not PIE"),
        ET_DYN => {}
        _ => return RuleResult::skipped("Not an executable or shared library"),
    }
    if !binary.is_pie() {
        return RuleResult::skipped("Shared library, ASLR not applicable");
    }

    let nx_stack = binary
        .first_segment(PT_GNU_STACK)
        .is_some_and(|s| s.flags & PF_X == 0);
    if !nx_stack {
        return RuleResult::failed("Not ASLR compatible, executable stack");
    }
    if binary.has_dyn_tag(DT_TEXTREL) {
        return RuleResult::failed("Not ASLR compatible, text relocations present");
    }
    RuleResult::passed("ASLR compatible")
}

pub fn relro() -> Rule {
    Rule {
        id: RELRO,
        name: "Partial RELRO",
        description: "Checks for a GNU_RELRO segment, which makes relocation data read-only after the dynamic loader is done with it.",
        applicability: Applicability::new(Platform::ALL)
            .compiler(Compiler::Gcc, Req::with_default(v(4, 1), v(6, 1), "-Wl,-z,relro"))
            .compiler(Compiler::Clang, Req::with_default(v(3, 4), v(3, 9), "-Wl,-z,relro"))
            .compiler(
                Compiler::Rustc,
                Req::with_default(v(1, 21), v(1, 21), "-C link-arg=-z -C link-arg=relro"),
            ),
        check: check_relro,
    }
}

fn check_relro(binary: &ElfBinary) -> RuleResult {
    if let Some(skip) = require_exec_or_dyn(binary) {
        return skip;
    }
    if binary.first_segment(PT_GNU_RELRO).is_some() {
        RuleResult::passed("RELRO enabled")
    } else {
        RuleResult::failed("RELRO not enabled")
    }
}

pub fn full_relro() -> Rule {
    Rule {
        id: FULL_RELRO,
        name: "Full RELRO",
        description: "Checks for RELRO combined with immediate binding, so the whole GOT becomes read-only before main runs.",
        applicability: Applicability::new(Platform::ALL)
            .compiler(Compiler::Gcc, Req::with_default(v(4, 1), v(6, 1), "-Wl,-z,relro,-z,now"))
            .compiler(Compiler::Clang, Req::with_default(v(3, 4), v(4, 0), "-Wl,-z,relro,-z,now"))
            .compiler(
                Compiler::Rustc,
                Req::with_default(
                    v(1, 21),
                    v(1, 21),
                    "-C link-arg=-z -C link-arg=relro -C link-arg=-z -C link-arg=now",
                ),
            ),
        check: check_full_relro,
    }
}

fn check_full_relro(binary: &ElfBinary) -> RuleResult {
    if let Some(skip) = require_exec_or_dyn(binary) {
        return skip;
    }
    if binary.first_segment(PT_GNU_RELRO).is_none() {
        return RuleResult::failed("Full RELRO not enabled, no RELRO segment");
    }
    let bind_now = binary.has_dyn_tag(DT_BIND_NOW)
        || binary.has_dyn_flag(DT_FLAGS, DF_BIND_NOW)
        || binary.has_dyn_flag(DT_FLAGS_1, DF_1_NOW);
    if bind_now {
        RuleResult::passed("Full RELRO enabled")
    } else {
        RuleResult::failed("Full RELRO not enabled, partial RELRO only")
    }
}

pub fn nx_bit() -> Rule {
    Rule {
        id: NX_BIT,
        name: "Non-Executable Stack",
        description: "Checks that the GNU_STACK segment is not executable, so injected stack data cannot run as code.",
        applicability: Applicability::new(Platform::ALL)
            .compiler(Compiler::Gcc, Req::with_default(v(3, 4), v(3, 4), "-z noexecstack"))
            .compiler(Compiler::Clang, Req::with_default(v(1, 0), v(1, 0), "-z noexecstack"))
            .compiler(
                Compiler::Rustc,
                Req::with_default(v(1, 0), v(1, 0), "-C link-arg=-Wl,-z,noexecstack"),
            ),
        check: check_nx_bit,
    }
}

fn check_nx_bit(binary: &ElfBinary) -> RuleResult {
    if let Some(skip) = require_exec_or_dyn(binary) {
        return skip;
    }
    match binary.first_segment(PT_GNU_STACK) {
        Some(stack) if stack.flags & PF_X == 0 => RuleResult::passed("NX enabled, stack non-executable"),
        Some(_) => RuleResult::failed("NX not enabled, stack executable"),
        None => RuleResult::failed("NX status unknown, no stack segment"),
    }
}

pub fn separate_code() -> Rule {
    Rule {
        id: SEPARATE_CODE,
        name: "Separate Code Segments",
        description: "Checks that executable and writable PT_LOAD segments never share a page, which shrinks the set of gadgets mapped executable.",
        applicability: Applicability::new(Platform::ALL)
            .compiler(Compiler::Gcc, Req::with_default(v(8, 1), v(8, 1), "-Wl,-z,separate-code"))
            .compiler(Compiler::Clang, Req::with_default(v(6, 0), v(6, 0), "-Wl,-z,separate-code"))
            .compiler(
                Compiler::Rustc,
                Req::new(v(1, 31), "-C link-arg=-z -C link-arg=separate-code"),
            ),
        check: check_separate_code,
    }
}

fn check_separate_code(binary: &ElfBinary) -> RuleResult {
    if let Some(skip) = require_exec_or_dyn(binary) {
        return skip;
    }

    let mut code_pages = Vec::new();
    let mut data_pages = Vec::new();
    for seg in binary.segments_of(PT_LOAD) {
        let start = seg.offset / PAGE_SIZE;
        let end = seg
            .offset
            .saturating_add(seg.filesz)
            .saturating_add(PAGE_SIZE - 1)
            / PAGE_SIZE;
        if seg.flags & PF_X != 0 {
            code_pages.push((start, end));
        }
        if seg.flags & PF_W != 0 {
            data_pages.push((start, end));
        }
    }

    if code_pages.is_empty() {
        return RuleResult::skipped("No code segments found");
    }

    let overlap = code_pages.iter().any(|code| {
        data_pages
            .iter()
            .any(|data| code.0 < data.1 && code.1 > data.0)
    });
    if overlap {
        RuleResult::failed("Code and data share pages")
    } else {
        RuleResult::passed("Code and data separated")
    }
}

pub fn stack_limit() -> Rule {
    Rule {
        id: STACK_LIMIT,
        name: "Explicit Stack Size Limit",
        description: "Checks whether GNU_STACK carries an explicit size, bounding how deep the main thread stack can grow.",
        applicability: Applicability::new(Platform::ALL)
            .compiler(Compiler::Gcc, Req::new(v(4, 1), "-Wl,-z,stack-size=<bytes>"))
            .compiler(Compiler::Clang, Req::new(v(3, 4), "-Wl,-z,stack-size=<bytes>")),
        check: check_stack_limit,
    }
}

fn check_stack_limit(binary: &ElfBinary) -> RuleResult {
    if let Some(skip) = require_exec_or_dyn(binary) {
        return skip;
    }
    let size = binary.first_segment(PT_GNU_STACK).map(|s| s.memsz).unwrap_or(0);
    if size > 0 {
        RuleResult::passed(format!("Explicit stack limit set ({} bytes)", size))
    } else {
        RuleResult::failed("No explicit stack limit")
    }
}

pub fn no_dlopen() -> Rule {
    Rule {
        id: NO_DLOPEN,
        name: "Disallow dlopen",
        description: "Checks that a shared library refuses to be loaded through dlopen(), limiting library injection.",
        applicability: Applicability::new(Platform::ALL)
            .compiler(Compiler::Gcc, Req::new(v(4, 1), "-Wl,-z,nodlopen"))
            .compiler(Compiler::Clang, Req::new(v(3, 4), "-Wl,-z,nodlopen"))
            .compiler(Compiler::Rustc, Req::new(v(1, 0), "-C link-arg=-z -C link-arg=nodlopen")),
        check: check_no_dlopen,
    }
}

fn check_no_dlopen(binary: &ElfBinary) -> RuleResult {
    if binary.e_type != ET_DYN {
        return RuleResult::skipped("Not a shared library, dlopen protection not applicable");
    }
    if binary.is_pie() {
        return RuleResult::skipped("PIE executable, dlopen protection not applicable");
    }
    if binary.has_dyn_flag(DT_FLAGS_1, DF_1_NOOPEN) {
        RuleResult::passed("dlopen disabled")
    } else {
        RuleResult::failed("dlopen not disabled")
    }
}

pub fn no_dump() -> Rule {
    Rule {
        id: NO_DUMP,
        name: "Core Dump Protection",
        description: "Checks for DF_1_NODUMP, which keeps the object out of core dumps and so keeps secrets in memory off disk.",
        applicability: Applicability::new(Platform::ALL)
            .compiler(Compiler::Gcc, Req::new(v(4, 1), "-Wl,-z,nodump"))
            .compiler(Compiler::Clang, Req::new(v(3, 4), "-Wl,-z,nodump")),
        check: check_no_dump,
    }
}

fn check_no_dump(binary: &ElfBinary) -> RuleResult {
    if let Some(skip) = require_exec_or_dyn(binary) {
        return skip;
    }
    if binary.has_dyn_flag(DT_FLAGS_1, DF_1_NODUMP) {
        RuleResult::passed("Core dumps disabled")
    } else {
        RuleResult::failed("Core dumps not explicitly disabled")
    }
}
