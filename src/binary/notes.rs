// src/binary/notes.rs
//! GNU note records: build-id and `.note.gnu.property` feature bits.
//!
//! Truncated or non-conforming records end the walk early instead of
//! failing; a missing property simply reads as "not enabled".

use super::read_u32;

pub const NT_GNU_BUILD_ID: u32 = 3;
pub const NT_GNU_PROPERTY_TYPE_0: u32 = 5;

pub const GNU_PROPERTY_AARCH64_FEATURE_1_AND: u32 = 0xc000_0000;
pub const GNU_PROPERTY_AARCH64_FEATURE_1_BTI: u32 = 1 << 0;
pub const GNU_PROPERTY_AARCH64_FEATURE_1_PAC: u32 = 1 << 1;

pub const GNU_PROPERTY_X86_FEATURE_1_AND: u32 = 0xc000_0002;
pub const GNU_PROPERTY_X86_FEATURE_1_IBT: u32 = 1 << 0;
pub const GNU_PROPERTY_X86_FEATURE_1_SHSTK: u32 = 1 << 1;

const GNU_NOTE_NAME: &[u8; 4] = b"GNU\0";
const NOTE_HEADER_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteProperty {
    pub pr_type: u32,
    pub flags: u32,
}

#[derive(Debug, Clone, Copy)]
struct Note<'a> {
    n_type: u32,
    name: &'a [u8],
    desc: &'a [u8],
}

fn align_up(value: usize, align: usize) -> Option<usize> {
    value.checked_add(align - 1).map(|v| v & !(align - 1))
}

/// Walk note records. Names are 4-byte aligned, descriptors use `desc_align`.
fn walk_notes(data: &[u8], desc_align: usize, little: bool) -> Vec<Note<'_>> {
    let mut notes = Vec::new();
    let mut offset = 0usize;

    while offset + NOTE_HEADER_SIZE <= data.len() {
        let (Some(namesz), Some(descsz), Some(n_type)) = (
            read_u32(data, offset, little),
            read_u32(data, offset + 4, little),
            read_u32(data, offset + 8, little),
        ) else {
            break;
        };
        let (namesz, descsz) = (namesz as usize, descsz as usize);

        let name_start = offset + NOTE_HEADER_SIZE;
        let Some(desc_start) = align_up(namesz, 4).and_then(|n| name_start.checked_add(n)) else {
            break;
        };
        let Some(desc_end) = desc_start.checked_add(descsz) else {
            break;
        };
        if desc_end > data.len() {
            break;
        }
        let Some(name) = data.get(name_start..name_start + namesz) else {
            break;
        };

        notes.push(Note {
            n_type,
            name,
            desc: &data[desc_start..desc_end],
        });

        match align_up(descsz, desc_align).and_then(|d| desc_start.checked_add(d)) {
            Some(next) if next > offset => offset = next,
            _ => break,
        }
    }

    notes
}

/// Extract every `(pr_type, flags)` pair from a `.note.gnu.property` section.
pub fn parse_gnu_properties(data: &[u8], is_64bit: bool, little: bool) -> Vec<NoteProperty> {
    let mut properties = Vec::new();
    if data.len() < 16 {
        return properties;
    }
    let align = if is_64bit { 8 } else { 4 };

    for note in walk_notes(data, align, little) {
        if note.n_type != NT_GNU_PROPERTY_TYPE_0 || note.name != GNU_NOTE_NAME {
            continue;
        }

        let desc = note.desc;
        let mut pos = 0usize;
        while pos + 8 <= desc.len() {
            let (Some(pr_type), Some(pr_size)) =
                (read_u32(desc, pos, little), read_u32(desc, pos + 4, little))
            else {
                break;
            };
            let data_start = pos + 8;
            let Some(data_end) = data_start.checked_add(pr_size as usize) else {
                break;
            };
            if data_end > desc.len() {
                break;
            }
            if pr_size >= 4 {
                if let Some(flags) = read_u32(desc, data_start, little) {
                    properties.push(NoteProperty { pr_type, flags });
                }
            }
            match align_up(pr_size as usize, align).and_then(|p| data_start.checked_add(p)) {
                Some(next) => pos = next,
                None => break,
            }
        }
    }

    properties
}

/// Convenience check straight on raw section bytes.
pub fn has_gnu_property(data: &[u8], is_64bit: bool, little: bool, pr_type: u32, flag: u32) -> bool {
    parse_gnu_properties(data, is_64bit, little)
        .iter()
        .any(|p| p.pr_type == pr_type && p.flags & flag != 0)
}

/// Hex encoded descriptor of the first GNU build-id note, if any.
pub fn parse_build_id(data: &[u8], little: bool) -> Option<String> {
    walk_notes(data, 4, little)
        .into_iter()
        .find(|n| n.n_type == NT_GNU_BUILD_ID && n.name == GNU_NOTE_NAME && !n.desc.is_empty())
        .map(|n| hex::encode(n.desc))
}
