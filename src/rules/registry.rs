// src/rules/registry.rs
use super::Rule;
use super::checks::{cpu, instrumentation as instr, memory, paths};
use once_cell::sync::Lazy;

/// Rules enabled when the user does not pass `--rules`.
pub const DEFAULT_PRESET: [&str; 10] = [
    memory::ASLR,
    instr::FORTIFY_SOURCE,
    memory::FULL_RELRO,
    paths::NO_INSECURE_RPATH,
    paths::NO_INSECURE_RUNPATH,
    memory::NX_BIT,
    memory::PIE,
    memory::RELRO,
    memory::SEPARATE_CODE,
    instr::STACK_CANARY,
];

static REGISTRY: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        cpu::arm_bti(),
        cpu::arm_branch_protection(),
        cpu::arm_mte(),
        cpu::arm_pac(),
        instr::asan(),
        memory::aslr(),
        instr::cfi(),
        instr::fortify_source(),
        memory::full_relro(),
        memory::nx_bit(),
        memory::no_dlopen(),
        memory::no_dump(),
        paths::no_insecure_rpath(),
        paths::no_insecure_runpath(),
        memory::pie(),
        memory::relro(),
        instr::safe_stack(),
        memory::separate_code(),
        instr::stack_canary(),
        memory::stack_limit(),
        instr::stripped(),
        instr::ubsan(),
        cpu::x86_cet_ibt(),
        cpu::x86_cet_shstk(),
        cpu::x86_retpoline(),
    ]
});

/// Every registered rule, in registry order.
pub fn all() -> &'static [Rule] {
    REGISTRY.as_slice()
}

pub fn find(id: &str) -> Option<&'static Rule> {
    REGISTRY.iter().find(|r| r.id == id)
}

pub fn default_rules() -> Vec<&'static Rule> {
    DEFAULT_PRESET.iter().filter_map(|id| find(id)).collect()
}
