// src/rules/checks/instrumentation.rs
//! Compiler instrumentation detected through runtime support symbols.

use super::{any_symbol, v};
use crate::binary::{ElfBinary, LibC, Platform};
use crate::rules::{Applicability, CompilerRequirement as Req, Rule, RuleResult};
use crate::toolchain::Compiler;
use goblin::elf::section_header::SHT_SYMTAB;
use std::collections::HashSet;

pub const ASAN: &str = "asan";
pub const UBSAN: &str = "ubsan";
pub const SAFE_STACK: &str = "safe-stack";
pub const CFI: &str = "cfi";
pub const STACK_CANARY: &str = "stack-canary";
pub const FORTIFY_SOURCE: &str = "fortify-source";
pub const STRIPPED: &str = "stripped";

const CFI_CROSS_DSO_SYMBOLS: [&str; 3] = ["__cfi_check", "__cfi_slowpath", "__cfi_init"];
const CANARY_SYMBOLS: [&str; 3] = ["__stack_chk_fail", "__stack_smash_handler", "__intel_security_cookie"];

/// libc functions with a bounds-checked `_chk` twin.
const FORTIFIABLE: [(&str, &str); 24] = [
    ("fgets", "__fgets_chk"),
    ("fread", "__fread_chk"),
    ("gets", "__gets_chk"),
    ("memcpy", "__memcpy_chk"),
    ("memmove", "__memmove_chk"),
    ("memset", "__memset_chk"),
    ("pread", "__pread_chk"),
    ("read", "__read_chk"),
    ("realpath", "__realpath_chk"),
    ("recv", "__recv_chk"),
    ("recvfrom", "__recvfrom_chk"),
    ("snprintf", "__snprintf_chk"),
    ("sprintf", "__sprintf_chk"),
    ("stpcpy", "__stpcpy_chk"),
    ("stpncpy", "__stpncpy_chk"),
    ("strcat", "__strcat_chk"),
    ("strcpy", "__strcpy_chk"),
    ("strncat", "__strncat_chk"),
    ("strncpy", "__strncpy_chk"),
    ("vsnprintf", "__vsnprintf_chk"),
    ("vsprintf", "__vsprintf_chk"),
    ("wcscat", "__wcscat_chk"),
    ("wcscpy", "__wcscpy_chk"),
    ("wcsncpy", "__wcsncpy_chk"),
];

fn prefix_rule(binary: &ElfBinary, prefix: &str, feature: &str) -> RuleResult {
    if any_symbol(binary, |name| name.starts_with(prefix)) {
        RuleResult::passed(format!("{} enabled", feature))
    } else {
        RuleResult::failed(format!("{} not enabled", feature))
    }
}

pub fn asan() -> Rule {
    Rule {
        id: ASAN,
        name: "Address Sanitizer",
        description: "Detects AddressSanitizer instrumentation. Useful for test builds; production binaries normally should not carry it.",
        applicability: Applicability::new(Platform::ALL)
            .compiler(Compiler::Gcc, Req::new(v(5, 1), "-fsanitize=address"))
            .compiler(Compiler::Clang, Req::new(v(3, 4), "-fsanitize=address")),
        check: |binary| prefix_rule(binary, "__asan_", "ASan"),
    }
}

pub fn ubsan() -> Rule {
    Rule {
        id: UBSAN,
        name: "Undefined Behavior Sanitizer",
        description: "Detects UndefinedBehaviorSanitizer runtime hooks such as overflow and bounds checks.",
        applicability: Applicability::new(Platform::ALL)
            .compiler(Compiler::Gcc, Req::new(v(5, 1), "-fsanitize=undefined"))
            .compiler(Compiler::Clang, Req::new(v(3, 4), "-fsanitize=undefined")),
        check: |binary| prefix_rule(binary, "__ubsan_", "UBSan"),
    }
}

pub fn safe_stack() -> Rule {
    Rule {
        id: SAFE_STACK,
        name: "SafeStack",
        description: "Detects Clang SafeStack, which moves unsafe stack objects to a separate stack away from return addresses.",
        applicability: Applicability::new(Platform::ALL)
            .compiler(Compiler::Clang, Req::new(v(3, 7), "-fsanitize=safe-stack")),
        check: |binary| prefix_rule(binary, "__safestack_", "SafeStack"),
    }
}

pub fn cfi() -> Rule {
    Rule {
        id: CFI,
        name: "Control Flow Integrity",
        description: "Detects Clang CFI, which validates indirect call targets against their expected type.",
        applicability: Applicability::new(Platform::ALL).compiler(
            Compiler::Clang,
            Req::new(v(6, 0), "-fsanitize=cfi -flto -fvisibility=hidden"),
        ),
        check: check_cfi,
    }
}

fn check_cfi(binary: &ElfBinary) -> RuleResult {
    let cross_dso = binary
        .dynamic_symbols
        .iter()
        .any(|s| CFI_CROSS_DSO_SYMBOLS.iter().any(|c| s.name.contains(c)));
    if cross_dso {
        return RuleResult::passed("CFI enabled (cross-DSO mode)");
    }
    if binary.symbols.is_empty() {
        return RuleResult::skipped("Stripped binary, CFI detection limited");
    }
    let jump_tables = binary
        .symbols
        .iter()
        .any(|s| s.name.ends_with(".cfi") || s.name.starts_with("__typeid__"));
    if jump_tables {
        RuleResult::passed("CFI enabled")
    } else {
        RuleResult::failed("CFI not enabled")
    }
}

pub fn stack_canary() -> Rule {
    let flag = "-fstack-protector-strong";
    Rule {
        id: STACK_CANARY,
        name: "Stack Canary Protection",
        description: "Checks for stack protector references, which detect stack buffer overflows before a function returns.",
        applicability: Applicability::new(Platform::ALL)
            .compiler(Compiler::Gcc, Req::with_default(v(4, 9), v(4, 9), flag))
            .compiler(Compiler::Clang, Req::with_default(v(3, 5), v(3, 5), flag)),
        check: check_stack_canary,
    }
}

fn check_stack_canary(binary: &ElfBinary) -> RuleResult {
    if any_symbol(binary, |name| CANARY_SYMBOLS.iter().any(|c| name.contains(c))) {
        RuleResult::passed("Stack canary enabled")
    } else {
        RuleResult::failed("Stack canary not enabled")
    }
}

pub fn fortify_source() -> Rule {
    let flag = "-D_FORTIFY_SOURCE=3 -O1";
    Rule {
        id: FORTIFY_SOURCE,
        name: "FORTIFY_SOURCE",
        description: "Checks whether glibc string and memory calls were replaced by their bounds-checked _chk variants.",
        applicability: Applicability::new(Platform::ALL)
            .compiler(Compiler::Gcc, Req::new(v(12, 1), flag))
            .compiler(Compiler::Clang, Req::new(v(12, 0), flag)),
        check: check_fortify_source,
    }
}

fn check_fortify_source(binary: &ElfBinary) -> RuleResult {
    if binary.libc == LibC::Musl {
        return RuleResult::skipped("musl libc, FORTIFY_SOURCE not supported");
    }

    let names: HashSet<&str> = binary.all_symbols().map(|s| s.name.as_str()).collect();
    let fortified = FORTIFIABLE.iter().filter(|(_, chk)| names.contains(chk)).count();
    let unfortified = FORTIFIABLE.iter().filter(|(plain, _)| names.contains(plain)).count();

    match (fortified, unfortified) {
        (0, 0) => RuleResult::skipped("No fortifiable functions detected"),
        (0, _) => RuleResult::failed("FORTIFY_SOURCE not enabled"),
        (f, 0) => RuleResult::passed(format!("FORTIFY_SOURCE enabled ({} fortified)", f)),
        (f, u) => RuleResult::passed(format!(
            "FORTIFY_SOURCE enabled ({} fortified, {} unfortified)",
            f, u
        )),
    }
}

pub fn stripped() -> Rule {
    Rule {
        id: STRIPPED,
        name: "Stripped Binary",
        description: "Checks that the symbol table and debug sections were removed, which makes reverse engineering harder.",
        applicability: Applicability::new(Platform::ALL)
            .compiler(Compiler::Gcc, Req::new(v(3, 0), "-s"))
            .compiler(Compiler::Clang, Req::new(v(1, 0), "-s"))
            .compiler(Compiler::Rustc, Req::new(v(1, 59), "-C strip=symbols")),
        check: check_stripped,
    }
}

fn check_stripped(binary: &ElfBinary) -> RuleResult {
    let has_symtab = binary.has_section_type(SHT_SYMTAB);
    let has_debug = binary
        .sections
        .iter()
        .any(|s| s.name.starts_with(".debug_") || s.name.starts_with(".zdebug_"));

    match (has_symtab, has_debug) {
        (false, false) => RuleResult::passed("Fully stripped"),
        (true, true) => RuleResult::failed("Not stripped, has symbols and debug info"),
        (true, false) => RuleResult::failed("Not stripped, has symbols"),
        (false, true) => RuleResult::failed("Partially stripped, has debug info"),
    }
}
