// src/cli/list_rules.rs
use crate::binary::Architecture;
use crate::cli::ElfguardCli;
use crate::rules::{self, DEFAULT_PRESET, Rule};
use anyhow::Result;
use std::fmt::Write as _;

impl ElfguardCli {
    pub fn handle_list_rules_command(&self) -> Result<u8> {
        let all: Vec<&Rule> = rules::all().iter().collect();
        print!("{}", render_rule_list(&all));
        Ok(super::EXIT_SUCCESS)
    }
}

fn describe(rule: &Rule) -> String {
    let compilers: Vec<String> = rule
        .applicability
        .compilers
        .iter()
        .map(|(compiler, req)| format!("{} {}+", compiler, req.min_version))
        .collect();
    let marker = if DEFAULT_PRESET.contains(&rule.id) { " *" } else { "" };
    format!(
        "  {:<24} {:<36} [{}; {}]{}",
        rule.id,
        rule.name,
        rule.applicability.platform,
        compilers.join(", "),
        marker
    )
}

/// Rules grouped into General, x86 and ARM sections, each sorted by id.
pub fn render_rule_list(rules: &[&Rule]) -> String {
    let mut general = Vec::new();
    let mut x86 = Vec::new();
    let mut arm = Vec::new();
    for rule in rules {
        let arch = rule.applicability.platform.architecture;
        let is_x86 = arch.matches(Architecture::ALL_X86);
        let is_arm = arch.matches(Architecture::ALL_ARM);
        match (is_x86, is_arm) {
            (true, false) => x86.push(*rule),
            (false, true) => arm.push(*rule),
            _ => general.push(*rule),
        }
    }

    let mut out = String::new();
    for (title, mut group) in [("General", general), ("x86", x86), ("ARM", arm)] {
        if group.is_empty() {
            continue;
        }
        group.sort_by_key(|r| r.id);
        if !out.is_empty() {
            out.push('\n');
        }
        let _ = writeln!(out, "{}:", title);
        for rule in group {
            let _ = writeln!(out, "{}", describe(rule));
        }
    }
    if !out.is_empty() {
        out.push_str("\n* part of the default rule set\n");
    }
    out
}
