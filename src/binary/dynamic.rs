// src/binary/dynamic.rs
use super::{read_u32, read_u64};
use goblin::elf::dynamic::DT_NULL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynEntry {
    pub tag: u64,
    pub value: u64,
}

/// Decode the raw `.dynamic` section. Stops at DT_NULL or when the buffer runs out.
pub fn parse_dynamic(data: &[u8], is_64bit: bool, little: bool) -> Vec<DynEntry> {
    let entry_size = if is_64bit { 16 } else { 8 };
    let mut entries = Vec::with_capacity(data.len() / entry_size);

    for chunk in data.chunks_exact(entry_size) {
        let entry = if is_64bit {
            match (read_u64(chunk, 0, little), read_u64(chunk, 8, little)) {
                (Some(tag), Some(value)) => DynEntry { tag, value },
                _ => break,
            }
        } else {
            match (read_u32(chunk, 0, little), read_u32(chunk, 4, little)) {
                (Some(tag), Some(value)) => DynEntry {
                    tag: tag as u64,
                    value: value as u64,
                },
                _ => break,
            }
        };
        if entry.tag == DT_NULL {
            break;
        }
        entries.push(entry);
    }

    entries
}

/// NUL terminated string at `offset` inside a string table, bounds checked.
pub fn read_cstr(table: &[u8], offset: u64) -> Option<String> {
    let start = usize::try_from(offset).ok()?;
    let rest = table.get(start..)?;
    let end = rest.iter().position(|&b| b == 0)?;
    Some(String::from_utf8_lossy(&rest[..end]).into_owned())
}
