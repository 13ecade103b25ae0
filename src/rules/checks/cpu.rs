// src/rules/checks/cpu.rs
//! CPU-assisted control flow protection advertised through GNU property notes.

use super::v;
use crate::binary::notes::{
    GNU_PROPERTY_AARCH64_FEATURE_1_AND, GNU_PROPERTY_AARCH64_FEATURE_1_BTI,
    GNU_PROPERTY_AARCH64_FEATURE_1_PAC, GNU_PROPERTY_X86_FEATURE_1_AND,
    GNU_PROPERTY_X86_FEATURE_1_IBT, GNU_PROPERTY_X86_FEATURE_1_SHSTK,
};
use crate::binary::{ElfBinary, Platform};
use crate::rules::{Applicability, CompilerRequirement as Req, Rule, RuleResult};
use crate::toolchain::Compiler;
use goblin::elf::section_header::SHT_SYMTAB;

pub const ARM_BRANCH_PROTECTION: &str = "arm-branch-protection";
pub const ARM_BTI: &str = "arm-bti";
pub const ARM_MTE: &str = "arm-mte";
pub const ARM_PAC: &str = "arm-pac";
pub const X86_CET_IBT: &str = "x86-cet-ibt";
pub const X86_CET_SHSTK: &str = "x86-cet-shstk";
pub const X86_RETPOLINE: &str = "x86-retpoline";

const MEMTAG_NOTE_SECTION: &str = ".note.android.memtag";

fn has_bti(binary: &ElfBinary) -> bool {
    binary.has_gnu_property(GNU_PROPERTY_AARCH64_FEATURE_1_AND, GNU_PROPERTY_AARCH64_FEATURE_1_BTI)
}

fn has_pac(binary: &ElfBinary) -> bool {
    binary.has_gnu_property(GNU_PROPERTY_AARCH64_FEATURE_1_AND, GNU_PROPERTY_AARCH64_FEATURE_1_PAC)
}

fn has_ibt(binary: &ElfBinary) -> bool {
    binary.has_gnu_property(GNU_PROPERTY_X86_FEATURE_1_AND, GNU_PROPERTY_X86_FEATURE_1_IBT)
}

fn has_shstk(binary: &ElfBinary) -> bool {
    binary.has_gnu_property(GNU_PROPERTY_X86_FEATURE_1_AND, GNU_PROPERTY_X86_FEATURE_1_SHSTK)
}

fn arm_applicability(platform: Platform, flag: &'static str) -> Applicability {
    Applicability::new(platform)
        .compiler(Compiler::Gcc, Req::new(v(10, 1), flag))
        .compiler(Compiler::Clang, Req::new(v(12, 0), flag))
}

fn cet_applicability() -> Applicability {
    Applicability::new(Platform::ALL_X86)
        .compiler(Compiler::Gcc, Req::new(v(8, 1), "-fcf-protection=full"))
        .compiler(Compiler::Clang, Req::new(v(10, 0), "-fcf-protection=full"))
}

pub fn arm_branch_protection() -> Rule {
    Rule {
        id: ARM_BRANCH_PROTECTION,
        name: "ARM Branch Protection",
        description: "Checks that both BTI and PAC are advertised, i.e. the binary was built with standard AArch64 branch protection.",
        applicability: arm_applicability(Platform::ARM64_V8_5, "-mbranch-protection=standard"),
        check: check_arm_branch_protection,
    }
}

fn check_arm_branch_protection(binary: &ElfBinary) -> RuleResult {
    match (has_pac(binary), has_bti(binary)) {
        (true, true) => RuleResult::passed("ARM branch protection enabled (PAC+BTI)"),
        (true, false) => RuleResult::failed("ARM branch protection partial, BTI missing"),
        (false, true) => RuleResult::failed(
            "ARM branch protection partial, PAC missing (libc may lack PAC support)",
        ),
        (false, false) => RuleResult::failed("ARM branch protection not enabled"),
    }
}

pub fn arm_bti() -> Rule {
    Rule {
        id: ARM_BTI,
        name: "ARM Branch Target Identification",
        description: "Checks for the AArch64 BTI property, which restricts where indirect branches may land.",
        applicability: arm_applicability(Platform::ARM64_V8_5, "-mbranch-protection=bti"),
        check: |binary| {
            if has_bti(binary) {
                RuleResult::passed("ARM BTI enabled")
            } else {
                RuleResult::failed("ARM BTI not enabled")
            }
        },
    }
}

pub fn arm_pac() -> Rule {
    Rule {
        id: ARM_PAC,
        name: "ARM Pointer Authentication",
        description: "Checks for the AArch64 PAC property, meaning return addresses are signed and verified.",
        applicability: arm_applicability(Platform::ARM64_V8_3, "-mbranch-protection=pac-ret"),
        check: |binary| {
            if has_pac(binary) {
                RuleResult::passed("ARM PAC enabled")
            } else {
                RuleResult::failed("ARM PAC not enabled")
            }
        },
    }
}

pub fn arm_mte() -> Rule {
    Rule {
        id: ARM_MTE,
        name: "ARM Memory Tagging Extension",
        description: "Checks for the memtag note emitted when heap and stack tagging are requested on AArch64.",
        applicability: Applicability::new(Platform::ARM64_V8_5).compiler(
            Compiler::Clang,
            Req::new(v(12, 0), "-march=armv8.5-a+memtag -fsanitize=memtag"),
        ),
        check: |binary| {
            if binary.has_section(MEMTAG_NOTE_SECTION) {
                RuleResult::passed("ARM MTE enabled")
            } else {
                RuleResult::failed("ARM MTE not enabled")
            }
        },
    }
}

pub fn x86_cet_ibt() -> Rule {
    Rule {
        id: X86_CET_IBT,
        name: "x86 CET - Indirect Branch Tracking",
        description: "Checks for the CET IBT property, which requires ENDBR landing pads on indirect branch targets.",
        applicability: cet_applicability(),
        check: |binary| {
            if has_ibt(binary) {
                RuleResult::passed("CET IBT enabled")
            } else {
                RuleResult::failed("CET IBT not enabled")
            }
        },
    }
}

pub fn x86_cet_shstk() -> Rule {
    Rule {
        id: X86_CET_SHSTK,
        name: "x86 CET - Shadow Stack",
        description: "Checks for the CET shadow stack property, which keeps a hardware protected copy of return addresses.",
        applicability: cet_applicability(),
        check: |binary| {
            if has_shstk(binary) {
                RuleResult::passed("CET Shadow Stack enabled")
            } else {
                RuleResult::failed("CET Shadow Stack not enabled")
            }
        },
    }
}

pub fn x86_retpoline() -> Rule {
    Rule {
        id: X86_RETPOLINE,
        name: "x86 Retpoline",
        description: "Checks for retpoline thunks that mitigate Spectre v2 branch target injection.",
        applicability: Applicability::new(Platform::ALL_X86)
            .compiler(
                Compiler::Gcc,
                Req::new(v(7, 3), "-mindirect-branch=thunk -mfunction-return=thunk"),
            )
            .compiler(Compiler::Clang, Req::new(v(6, 0), "-mretpoline")),
        check: check_x86_retpoline,
    }
}

fn check_x86_retpoline(binary: &ElfBinary) -> RuleResult {
    if has_ibt(binary) {
        return RuleResult::skipped("CET IBT enabled, retpoline not needed");
    }
    if !binary.has_section_type(SHT_SYMTAB) {
        return RuleResult::skipped("Stripped binary, retpoline detection limited");
    }

    let flavour = binary.all_symbols().find_map(|s| {
        if s.name.contains("__x86_indirect_thunk") || s.name.contains("__x86_return_thunk") {
            Some("GCC")
        } else if s.name.contains("__llvm_retpoline") {
            Some("LLVM")
        } else {
            None
        }
    });
    match flavour {
        Some(kind) => RuleResult::passed(format!("Retpoline enabled ({})", kind)),
        None => RuleResult::failed("Retpoline not enabled"),
    }
}
