// src/toolchain/detector.rs
use super::{Compiler, Toolchain, Version};
use crate::binary::ElfBinary;

/// Classifies a single identification string.
pub trait CompilerDetector: Send + Sync {
    fn detect(&self, ident: &str) -> (Compiler, Version);
}

/// Heuristics for `.comment` entries and DWARF producer strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommentDetector;

impl CompilerDetector for CommentDetector {
    fn detect(&self, ident: &str) -> (Compiler, Version) {
        let lower = ident.to_lowercase();
        let compiler = if lower.contains("rustc") {
            Compiler::Rustc
        } else if lower.contains("gcc") || lower.contains("gnu c") || lower.contains("gnu gimple") {
            Compiler::Gcc
        } else if lower.contains("clang") {
            Compiler::Clang
        } else {
            return (Compiler::Unknown, Version::default());
        };

        (compiler, extract_version(ident))
    }
}

fn extract_version(ident: &str) -> Version {
    let tokens: Vec<&str> = ident.split_whitespace().collect();
    let clean = |t: &str| t.trim_end_matches(['(', ')', ',', ';']).to_string();

    let after_keyword = tokens
        .windows(2)
        .filter(|w| w[0].eq_ignore_ascii_case("version"))
        .find_map(|w| clean(w[1]).parse::<Version>().ok());
    if let Some(version) = after_keyword {
        return version;
    }

    tokens
        .iter()
        .filter(|t| t.contains('.'))
        .find_map(|t| clean(t).parse::<Version>().ok())
        .unwrap_or_default()
}

/// Pick the strongest compiler marker across all strings.
pub fn detect<I, S>(detector: &dyn CompilerDetector, idents: I) -> Toolchain
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut best = Toolchain::default();
    for ident in idents {
        let (compiler, version) = detector.detect(ident.as_ref());
        if !compiler.is_known() {
            continue;
        }
        if !best.compiler.is_known() || compiler.priority() > best.compiler.priority() {
            best = Toolchain::new(compiler, version);
        }
    }
    best
}

/// Fill in `binary.toolchain` from its `.comment` strings.
pub fn detect_binary(binary: &mut ElfBinary) {
    binary.toolchain = detect(&CommentDetector, &binary.comments);
    tracing::debug!("Detected toolchain: {}", binary.toolchain);
}
