// src/debuginfo/enhance.rs
//! Folding a downloaded debug file back into the binary under analysis.

use crate::binary::{self, ElfBinary};
use crate::toolchain::{self, CommentDetector};
use anyhow::{Context, Result};
use object::{Object, ObjectSection};
use std::borrow::Cow;
use std::path::Path;

/// Merge symbols from `debug_path` and, when the compiler is still unknown,
/// detect it from DWARF `DW_AT_producer` strings.
pub fn enhance(binary: &mut ElfBinary, debug_path: &Path) -> Result<()> {
    let data = std::fs::read(debug_path)
        .with_context(|| format!("failed to read debug file {}", debug_path.display()))?;
    let debug = binary::parse(&data).context("failed to parse debug file")?;

    if !debug.symbols.is_empty() {
        binary.merge_symbols(debug.symbols);
        tracing::debug!("merged debug symbols, {} total", binary.symbols.len());
    }

    if !debug.sections.iter().any(|s| s.name.starts_with(".debug_")) {
        return Ok(());
    }

    let producers = dwarf_producers(&data)?;
    if producers.is_empty() {
        tracing::debug!("no DW_AT_producer in {}", debug_path.display());
        return Ok(());
    }

    if !binary.toolchain.compiler.is_known() {
        let detected = toolchain::detect(&CommentDetector, &producers);
        if detected.compiler.is_known() {
            tracing::debug!("toolchain from DWARF: {}", detected);
            binary.toolchain = detected;
        }
    }
    Ok(())
}

/// `DW_AT_producer` of every compile unit in an object file's DWARF.
pub fn dwarf_producers(data: &[u8]) -> Result<Vec<String>> {
    let file = object::File::parse(data).context("failed to open object file")?;
    let endian = if file.is_little_endian() {
        gimli::RunTimeEndian::Little
    } else {
        gimli::RunTimeEndian::Big
    };

    let load_section = |id: gimli::SectionId| -> Result<Cow<[u8]>, gimli::Error> {
        Ok(file
            .section_by_name(id.name())
            .and_then(|s| s.uncompressed_data().ok())
            .unwrap_or(Cow::Borrowed(&[])))
    };
    let sections = gimli::Dwarf::load(load_section).context("failed to load DWARF")?;
    let dwarf = sections.borrow(|section| gimli::EndianSlice::new(section, endian));

    let mut producers = Vec::new();
    let mut units = dwarf.units();
    while let Some(header) = units.next().context("bad DWARF unit header")? {
        let unit = dwarf.unit(header).context("bad DWARF unit")?;
        let mut entries = unit.entries();
        let Some((_, entry)) = entries.next_dfs()? else {
            continue;
        };
        if entry.tag() != gimli::DW_TAG_compile_unit {
            continue;
        }
        if let Some(attr) = entry.attr_value(gimli::DW_AT_producer)? {
            let producer = dwarf.attr_string(&unit, attr)?.to_string_lossy().into_owned();
            if !producer.is_empty() {
                producers.push(producer);
            }
        }
    }
    Ok(producers)
}
