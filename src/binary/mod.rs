// src/binary/mod.rs
pub mod arch;
pub mod dynamic;
pub mod elf;
pub mod notes;

pub use self::arch::{Architecture, Isa, Platform};
pub use self::dynamic::DynEntry;
pub use self::elf::parse;
pub use self::notes::NoteProperty;

use crate::toolchain::Toolchain;
use goblin::elf::dynamic::{DT_NEEDED, DT_FLAGS_1, DF_1_PIE};
use goblin::elf::program_header::PT_INTERP;
use serde::Serialize;
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unsupported file format")]
    UnsupportedFormat,
    #[error("malformed ELF: {0}")]
    Malformed(String),
}

impl From<goblin::error::Error> for ParseError {
    fn from(err: goblin::error::Error) -> Self {
        ParseError::Malformed(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LibC {
    #[default]
    Unknown,
    Glibc,
    Musl,
}

impl fmt::Display for LibC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LibC::Unknown => "unknown",
            LibC::Glibc => "glibc",
            LibC::Musl => "musl",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub p_type: u32,
    pub flags: u32,
    pub offset: u64,
    pub vaddr: u64,
    pub filesz: u64,
    pub memsz: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub sh_type: u32,
    pub flags: u64,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub sym_type: u8,
    pub bind: u8,
    pub visibility: u8,
}

/// Everything the hardening rules need to know about one ELF file.
#[derive(Debug, Clone)]
pub struct ElfBinary {
    pub architecture: Architecture,
    pub is_64bit: bool,
    pub little_endian: bool,
    pub e_type: u16,
    pub toolchain: Toolchain,
    pub libc: LibC,
    pub build_id: String,
    pub interpreter: Option<String>,
    pub segments: Vec<Segment>,
    pub sections: Vec<Section>,
    pub dynamic: Vec<DynEntry>,
    pub symbols: Vec<Symbol>,
    pub dynamic_symbols: Vec<Symbol>,
    pub gnu_properties: Vec<NoteProperty>,
    /// NUL separated strings from `.comment`.
    pub comments: Vec<String>,
    pub(crate) dynstr: Vec<u8>,
}

impl ElfBinary {
    pub fn format(&self) -> &'static str {
        "ELF"
    }

    pub fn bits(&self) -> u8 {
        if self.is_64bit { 64 } else { 32 }
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.section(name).is_some()
    }

    pub fn has_section_type(&self, sh_type: u32) -> bool {
        self.sections.iter().any(|s| s.sh_type == sh_type)
    }

    pub fn first_segment(&self, p_type: u32) -> Option<&Segment> {
        self.segments.iter().find(|s| s.p_type == p_type)
    }

    pub fn segments_of(&self, p_type: u32) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(move |s| s.p_type == p_type)
    }

    pub fn has_dyn_tag(&self, tag: u64) -> bool {
        self.dynamic.iter().any(|e| e.tag == tag)
    }

    pub fn has_dyn_flag(&self, tag: u64, flag: u64) -> bool {
        self.dynamic
            .iter()
            .any(|e| e.tag == tag && e.value & flag != 0)
    }

    /// String value of the first entry with `tag`, or "" when absent or unresolvable.
    pub fn dyn_string(&self, tag: u64) -> String {
        self.dynamic
            .iter()
            .find(|e| e.tag == tag)
            .and_then(|e| dynamic::read_cstr(&self.dynstr, e.value))
            .unwrap_or_default()
    }

    pub fn dyn_strings(&self, tag: u64) -> Vec<String> {
        self.dynamic
            .iter()
            .filter(|e| e.tag == tag)
            .filter_map(|e| dynamic::read_cstr(&self.dynstr, e.value))
            .collect()
    }

    pub fn has_gnu_property(&self, pr_type: u32, flag: u32) -> bool {
        self.gnu_properties
            .iter()
            .any(|p| p.pr_type == pr_type && p.flags & flag != 0)
    }

    /// Position independent: DF_1_PIE in DT_FLAGS_1, or an interpreter.
    pub fn is_pie(&self) -> bool {
        self.has_dyn_flag(DT_FLAGS_1, DF_1_PIE) || self.first_segment(PT_INTERP).is_some()
    }

    pub fn all_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().chain(self.dynamic_symbols.iter())
    }

    pub fn needed_libraries(&self) -> Vec<String> {
        self.dyn_strings(DT_NEEDED)
    }

    /// Merge symbols from a separate debug file, skipping names already present.
    pub fn merge_symbols(&mut self, extra: Vec<Symbol>) {
        let mut known: std::collections::HashSet<String> =
            self.symbols.iter().map(|s| s.name.clone()).collect();
        for sym in extra {
            if known.insert(sym.name.clone()) {
                self.symbols.push(sym);
            }
        }
    }
}

pub(crate) fn read_u16(data: &[u8], off: usize, little: bool) -> Option<u16> {
    let bytes: [u8; 2] = data.get(off..off.checked_add(2)?)?.try_into().ok()?;
    Some(if little {
        u16::from_le_bytes(bytes)
    } else {
        u16::from_be_bytes(bytes)
    })
}

pub(crate) fn read_u32(data: &[u8], off: usize, little: bool) -> Option<u32> {
    let bytes: [u8; 4] = data.get(off..off.checked_add(4)?)?.try_into().ok()?;
    Some(if little {
        u32::from_le_bytes(bytes)
    } else {
        u32::from_be_bytes(bytes)
    })
}

pub(crate) fn read_u64(data: &[u8], off: usize, little: bool) -> Option<u64> {
    let bytes: [u8; 8] = data.get(off..off.checked_add(8)?)?.try_into().ok()?;
    Some(if little {
        u64::from_le_bytes(bytes)
    } else {
        u64::from_be_bytes(bytes)
    })
}
