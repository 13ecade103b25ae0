// tests/rules_tests.rs
mod common;

use common::*;
use elfguard::binary::{self, Architecture, ElfBinary, Isa, Platform};
use elfguard::rules::{self, Applicability, ApplicabilityResult, CompilerRequirement, Finding, Status};
use elfguard::toolchain::{self, Compiler, Version};

fn parse(builder: &ElfBuilder) -> ElfBinary {
    let mut bin = binary::parse(&builder.build()).expect("valid ELF");
    toolchain::detect_binary(&mut bin);
    bin
}

fn run(id: &str, bin: &ElfBinary) -> Finding {
    let rule = rules::find(id).unwrap_or_else(|| panic!("rule {} registered", id));
    rules::check(&[rule], bin).remove(0)
}

fn assert_status(id: &str, bin: &ElfBinary, status: Status, message: &str) {
    let finding = run(id, bin);
    assert_eq!(finding.status, status, "{}: {}", id, finding.message);
    assert_eq!(finding.message, message, "{}", id);
}

#[test]
fn test_hardened_pie_passes_default_set() {
    let bin = parse(&hardened_pie());
    let findings = rules::check(&rules::default_rules(), &bin);
    assert_eq!(findings.len(), rules::DEFAULT_PRESET.len());
    for f in &findings {
        assert_eq!(f.status, Status::Passed, "{}: {}", f.rule_id, f.message);
    }
}

#[test]
fn test_exec_is_not_pie() {
    let bin = parse(&legacy_exec());
    assert_status("pie", &bin, Status::Failed, "Not PIE");
    assert_status("aslr", &bin, Status::Failed, "Not ASLR compatible, not PIE");
    assert_status("nx-bit", &bin, Status::Failed, "NX not enabled, stack executable");
    assert_status("relro", &bin, Status::Failed, "RELRO not enabled");
    assert_status("separate-code", &bin, Status::Failed, "Code and data share pages");
    assert_status("stack-canary", &bin, Status::Failed, "Stack canary not enabled");
    assert_status("fortify-source", &bin, Status::Failed, "FORTIFY_SOURCE not enabled");
}

#[test]
fn test_shared_library_pie_skipped() {
    let bin = parse(&ElfBuilder::new(EM_X86_64).needed("libc.so.6"));
    assert_status("pie", &bin, Status::Skipped, "Shared library, PIE not applicable");
    assert_status("no-dlopen", &bin, Status::Failed, "dlopen not disabled");

    let nodlopen = parse(&ElfBuilder::new(EM_X86_64).dyn_val(DT_FLAGS_1, DF_1_NOOPEN));
    assert_status("no-dlopen", &nodlopen, Status::Passed, "dlopen disabled");
}

#[test]
fn test_relocatable_object_skipped() {
    let bin = parse(&ElfBuilder::new(EM_X86_64).e_type(ET_REL));
    assert_status("relro", &bin, Status::Skipped, "Not an executable or shared library");
    assert_status("pie", &bin, Status::Skipped, "Not an executable or shared library");
}

#[test]
fn test_partial_relro() {
    let bin = parse(
        &ElfBuilder::new(EM_X86_64)
            .interp("/lib64/ld-linux-x86-64.so.2")
            .relro(),
    );
    assert_status("relro", &bin, Status::Passed, "RELRO enabled");
    assert_status("full-relro", &bin, Status::Failed, "Full RELRO not enabled, partial RELRO only");

    let bind_now = parse(
        &ElfBuilder::new(EM_X86_64)
            .relro()
            .dyn_val(DT_BIND_NOW, 0),
    );
    assert_status("full-relro", &bind_now, Status::Passed, "Full RELRO enabled");
}

#[test]
fn test_text_relocations_break_aslr() {
    let bin = parse(&hardened_pie().dyn_val(DT_TEXTREL, 0));
    assert_status("aslr", &bin, Status::Failed, "Not ASLR compatible, text relocations present");
}

#[test]
fn test_stack_limit_and_nodump() {
    let bin = parse(
        &ElfBuilder::new(EM_X86_64)
            .gnu_stack_size(PF_R | PF_W, 0x80000)
            .dyn_val(DT_FLAGS_1, DF_1_NODUMP),
    );
    assert_status("stack-limit", &bin, Status::Passed, "Explicit stack limit set (524288 bytes)");
    assert_status("no-dump", &bin, Status::Passed, "Core dumps disabled");

    let bare = parse(&ElfBuilder::new(EM_X86_64).gnu_stack(PF_R | PF_W));
    assert_status("stack-limit", &bare, Status::Failed, "No explicit stack limit");
    assert_status("no-dump", &bare, Status::Failed, "Core dumps not explicitly disabled");
}

#[test]
fn test_insecure_search_paths() {
    let bin = parse(
        &hardened_pie()
            .dyn_str(DT_RPATH, "/usr/lib:/tmp/evil")
            .dyn_str(DT_RUNPATH, "$ORIGIN/../lib::lib"),
    );
    assert_status("no-insecure-rpath", &bin, Status::Failed, "Insecure RPATH: /tmp/evil");
    assert_status("no-insecure-runpath", &bin, Status::Failed, "Insecure RUNPATH: (empty), lib");

    let clean = parse(&hardened_pie().dyn_str(DT_RUNPATH, "$ORIGIN/../lib64"));
    assert_status("no-insecure-runpath", &clean, Status::Passed, "RUNPATH secure");
    assert_status("no-insecure-rpath", &clean, Status::Passed, "No RPATH set");
}

#[test]
fn test_fortify_source_variants() {
    let mixed = parse(&ElfBuilder::new(EM_X86_64).dynamic_symbols(&["__memcpy_chk", "strcpy"]));
    assert_status(
        "fortify-source",
        &mixed,
        Status::Passed,
        "FORTIFY_SOURCE enabled (1 fortified, 1 unfortified)",
    );

    let none = parse(&ElfBuilder::new(EM_X86_64).dynamic_symbols(&["puts"]));
    assert_status("fortify-source", &none, Status::Skipped, "No fortifiable functions detected");

    let musl = parse(
        &ElfBuilder::new(EM_X86_64)
            .interp("/lib/ld-musl-x86_64.so.1")
            .dynamic_symbols(&["memcpy"]),
    );
    assert_status("fortify-source", &musl, Status::Skipped, "musl libc, FORTIFY_SOURCE not supported");
}

#[test]
fn test_sanitizers_and_cfi() {
    let bin = parse(
        &ElfBuilder::new(EM_X86_64)
            .comment("clang version 16.0.0")
            .symbols(&["__asan_init", "__ubsan_handle_add_overflow", "__safestack_init", "foo.cfi"]),
    );
    assert_status("asan", &bin, Status::Passed, "ASan enabled");
    assert_status("ubsan", &bin, Status::Passed, "UBSan enabled");
    assert_status("safe-stack", &bin, Status::Passed, "SafeStack enabled");
    assert_status("cfi", &bin, Status::Passed, "CFI enabled");

    let stripped = parse(&ElfBuilder::new(EM_X86_64).comment("clang version 16.0.0"));
    assert_status("cfi", &stripped, Status::Skipped, "Stripped binary, CFI detection limited");

    let cross_dso = parse(&ElfBuilder::new(EM_X86_64).dynamic_symbols(&["__cfi_slowpath"]));
    assert_status("cfi", &cross_dso, Status::Passed, "CFI enabled (cross-DSO mode)");
}

#[test]
fn test_gcc_binary_skips_clang_only_rules() {
    let bin = parse(&hardened_pie());
    let finding = run("safe-stack", &bin);
    assert_eq!(finding.status, Status::Skipped);
    assert_eq!(finding.message, "rule not applicable to gcc binaries");
}

#[test]
fn test_stripped_states() {
    assert_status("stripped", &parse(&hardened_pie()), Status::Passed, "Fully stripped");
    assert_status(
        "stripped",
        &parse(&hardened_pie().symbols(&["main"])),
        Status::Failed,
        "Not stripped, has symbols",
    );
    assert_status(
        "stripped",
        &parse(&hardened_pie().dwarf_producer("GNU C17 13.2.0")),
        Status::Failed,
        "Partially stripped, has debug info",
    );
    assert_status(
        "stripped",
        &parse(&hardened_pie().symbols(&["main"]).dwarf_producer("GNU C17 13.2.0")),
        Status::Failed,
        "Not stripped, has symbols and debug info",
    );
}

#[test]
fn test_x86_cet() {
    let both = parse(&hardened_pie().gnu_property(X86_FEATURE_1_AND, X86_IBT | X86_SHSTK));
    assert_status("x86-cet-ibt", &both, Status::Passed, "CET IBT enabled");
    assert_status("x86-cet-shstk", &both, Status::Passed, "CET Shadow Stack enabled");

    let ibt_only = parse(&hardened_pie().gnu_property(X86_FEATURE_1_AND, X86_IBT));
    assert_status("x86-cet-shstk", &ibt_only, Status::Failed, "CET Shadow Stack not enabled");
}

#[test]
fn test_x86_retpoline() {
    let with_ibt = parse(
        &hardened_pie()
            .gnu_property(X86_FEATURE_1_AND, X86_IBT)
            .symbols(&["main"]),
    );
    assert_status("x86-retpoline", &with_ibt, Status::Skipped, "CET IBT enabled, retpoline not needed");

    let stripped = parse(&hardened_pie());
    assert_status(
        "x86-retpoline",
        &stripped,
        Status::Skipped,
        "Stripped binary, retpoline detection limited",
    );

    let gcc = parse(&hardened_pie().symbols(&["main", "__x86_indirect_thunk_rax"]));
    assert_status("x86-retpoline", &gcc, Status::Passed, "Retpoline enabled (GCC)");

    let llvm = parse(
        &ElfBuilder::new(EM_X86_64)
            .comment("clang version 15.0.0")
            .symbols(&["__llvm_retpoline_r11"]),
    );
    assert_status("x86-retpoline", &llvm, Status::Passed, "Retpoline enabled (LLVM)");

    let missing = parse(&hardened_pie().symbols(&["main"]));
    assert_status("x86-retpoline", &missing, Status::Failed, "Retpoline not enabled");
}

#[test]
fn test_arm_branch_protection() {
    let arm = |flags| {
        parse(
            &ElfBuilder::new(EM_AARCH64)
                .comment("GCC: (GNU) 12.2.0")
                .gnu_property(AARCH64_FEATURE_1_AND, flags),
        )
    };

    let full = arm(AARCH64_BTI | AARCH64_PAC);
    assert_status("arm-bti", &full, Status::Passed, "ARM BTI enabled");
    assert_status("arm-pac", &full, Status::Passed, "ARM PAC enabled");
    assert_status(
        "arm-branch-protection",
        &full,
        Status::Passed,
        "ARM branch protection enabled (PAC+BTI)",
    );

    let bti = arm(AARCH64_BTI);
    assert_status(
        "arm-branch-protection",
        &bti,
        Status::Failed,
        "ARM branch protection partial, PAC missing (libc may lack PAC support)",
    );
    let pac = arm(AARCH64_PAC);
    assert_status("arm-branch-protection", &pac, Status::Failed, "ARM branch protection partial, BTI missing");
}

#[test]
fn test_arm_mte() {
    let tagged = parse(
        &ElfBuilder::new(EM_AARCH64)
            .comment("clang version 17.0.0")
            .section(".note.android.memtag", SHT_NOTE, &note(4, &[0; 4], 4)),
    );
    assert_status("arm-mte", &tagged, Status::Passed, "ARM MTE enabled");

    let untagged = parse(&ElfBuilder::new(EM_AARCH64).comment("clang version 17.0.0"));
    assert_status("arm-mte", &untagged, Status::Failed, "ARM MTE not enabled");
}

#[test]
fn test_architecture_applicability_on_arm64() {
    let bin = parse(&ElfBuilder::new(EM_AARCH64));
    let x86_rule = Applicability::new(Platform::ALL_X86);
    let arm_rule = Applicability::new(Platform::new(Architecture::ALL_ARM, Isa::default()));

    assert_eq!(
        rules::check_applicability(&x86_rule, &bin),
        ApplicabilityResult::NotApplicableArchitecture
    );
    assert_eq!(rules::check_applicability(&arm_rule, &bin), ApplicabilityResult::Applicable);

    let ibt = run("x86-cet-ibt", &bin);
    assert_eq!(ibt.status, Status::Skipped);
    assert_eq!(ibt.message, "rule not applicable to arm64 architecture");

    let bti = run("arm-bti", &bin);
    assert_ne!(bti.status, Status::Skipped);
}

#[test]
fn test_compiler_applicability() {
    let clang_only = Applicability::new(Platform::ALL)
        .compiler(Compiler::Clang, CompilerRequirement::new(Version::new(6, 0), "-fsanitize=cfi"));
    let gcc_bin = parse(&hardened_pie());
    assert_eq!(
        rules::check_applicability(&clang_only, &gcc_bin),
        ApplicabilityResult::NotApplicableCompiler
    );

    // unknown compilers never rule anything out
    let unknown = parse(&ElfBuilder::new(EM_X86_64));
    assert_eq!(rules::check_applicability(&clang_only, &unknown), ApplicabilityResult::Applicable);
}

#[test]
fn test_failed_findings_get_suggestions() {
    let bin = parse(&legacy_exec());
    let mut findings = rules::check(&rules::default_rules(), &bin);
    rules::decorate(&mut findings, &bin.toolchain);

    let pie = findings.iter().find(|f| f.rule_id == "pie").unwrap();
    assert_eq!(pie.suggestion.as_deref(), Some("Use \"-fPIE -pie\" (default in gcc 6.1+)."));

    for f in findings.iter().filter(|f| f.status != Status::Failed) {
        assert!(f.suggestion.is_none(), "{} should carry no suggestion", f.rule_id);
    }
    assert!(findings.iter().filter(|f| f.status == Status::Failed).all(|f| f.suggestion.is_some()));
}

#[test]
fn test_findings_follow_registry_order() {
    let bin = parse(&hardened_pie());
    let all: Vec<_> = rules::all().iter().collect();
    let findings = rules::check(&all, &bin);
    let ids: Vec<&str> = findings.iter().map(|f| f.rule_id.as_str()).collect();
    let expected: Vec<&str> = all.iter().map(|r| r.id).collect();
    assert_eq!(ids, expected);
    assert!(ids.iter().all(|id| rules::find(id).is_some()));
}
