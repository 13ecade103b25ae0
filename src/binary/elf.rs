// src/binary/elf.rs
use super::dynamic::{parse_dynamic, read_cstr};
use super::notes::{parse_build_id, parse_gnu_properties};
use super::{Architecture, ElfBinary, LibC, ParseError, Section, Segment, Symbol};
use crate::toolchain::Toolchain;
use goblin::container::{Container, Ctx, Endian};
use goblin::elf::program_header::{PT_DYNAMIC, PT_INTERP, PT_NOTE, ProgramHeader};
use goblin::elf::section_header::{SHT_DYNAMIC, SHT_DYNSYM, SHT_NOBITS, SHT_SYMTAB, SectionHeader};
use goblin::elf::sym::Symtab;
use goblin::elf::Elf;

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";
const PT_GNU_PROPERTY: u32 = 0x6474_e553;

/// Parse an ELF image held in memory.
///
/// Returns [`ParseError::UnsupportedFormat`] when the magic does not match so
/// callers can skip non-ELF files quietly. Every other structural problem is
/// [`ParseError::Malformed`]. The toolchain is left unknown; see
/// [`crate::toolchain::detect_binary`].
pub fn parse(bytes: &[u8]) -> Result<ElfBinary, ParseError> {
    if bytes.len() < ELF_MAGIC.len() || &bytes[..4] != ELF_MAGIC {
        return Err(ParseError::UnsupportedFormat);
    }

    let header = Elf::parse_header(bytes)?;
    let container = header.container()?;
    let endian = header.endianness()?;
    let ctx = Ctx::new(container, endian);
    let is_64bit = container == Container::Big;
    let little = endian == Endian::Little;

    let architecture = Architecture::from_elf_machine(header.e_machine);
    if architecture.is_empty() {
        return Err(ParseError::Malformed(format!(
            "unsupported machine type {}",
            header.e_machine
        )));
    }

    let program_headers = if header.e_phnum > 0 {
        ProgramHeader::parse(bytes, to_usize(header.e_phoff)?, header.e_phnum as usize, ctx)?
    } else {
        Vec::new()
    };
    let section_headers = if header.e_shoff > 0 && header.e_shnum > 0 {
        SectionHeader::parse(bytes, to_usize(header.e_shoff)?, header.e_shnum as usize, ctx)?
    } else {
        Vec::new()
    };

    let segments: Vec<Segment> = program_headers
        .iter()
        .map(|ph| Segment {
            p_type: ph.p_type,
            flags: ph.p_flags,
            offset: ph.p_offset,
            vaddr: ph.p_vaddr,
            filesz: ph.p_filesz,
            memsz: ph.p_memsz,
        })
        .collect();

    let shstrtab = section_headers
        .get(header.e_shstrndx as usize)
        .map(|sh| section_bytes(bytes, sh))
        .unwrap_or_default();
    let sections: Vec<Section> = section_headers
        .iter()
        .map(|sh| Section {
            name: read_cstr(shstrtab, sh.sh_name as u64).unwrap_or_default(),
            sh_type: sh.sh_type,
            flags: sh.sh_flags,
            offset: sh.sh_offset,
            size: sh.sh_size,
        })
        .collect();

    let named = |name: &str| -> Option<&[u8]> {
        sections
            .iter()
            .position(|s| s.name == name)
            .map(|idx| section_bytes(bytes, &section_headers[idx]))
    };

    let dynamic_data = section_headers
        .iter()
        .find(|sh| sh.sh_type == SHT_DYNAMIC)
        .map(|sh| section_bytes(bytes, sh))
        .or_else(|| {
            program_headers
                .iter()
                .find(|ph| ph.p_type == PT_DYNAMIC)
                .map(|ph| segment_bytes(bytes, ph))
        })
        .unwrap_or_default();
    let dynamic = parse_dynamic(dynamic_data, is_64bit, little);
    let dynstr = named(".dynstr").unwrap_or_default().to_vec();

    let interpreter = program_headers
        .iter()
        .find(|ph| ph.p_type == PT_INTERP)
        .map(|ph| {
            String::from_utf8_lossy(segment_bytes(bytes, ph))
                .trim_end_matches('\0')
                .to_string()
        });

    let build_id = named(".note.gnu.build-id")
        .and_then(|data| parse_build_id(data, little))
        .or_else(|| {
            program_headers
                .iter()
                .filter(|ph| ph.p_type == PT_NOTE)
                .find_map(|ph| parse_build_id(segment_bytes(bytes, ph), little))
        })
        .unwrap_or_default();

    let gnu_properties = named(".note.gnu.property")
        .or_else(|| {
            program_headers
                .iter()
                .find(|ph| ph.p_type == PT_GNU_PROPERTY)
                .map(|ph| segment_bytes(bytes, ph))
        })
        .map(|data| parse_gnu_properties(data, is_64bit, little))
        .unwrap_or_default();

    let comments = named(".comment")
        .map(split_strings)
        .unwrap_or_default();

    let symbols = read_symbols(bytes, &section_headers, SHT_SYMTAB, ctx)?;
    let dynamic_symbols = read_symbols(bytes, &section_headers, SHT_DYNSYM, ctx)?;

    let mut binary = ElfBinary {
        architecture,
        is_64bit,
        little_endian: little,
        e_type: header.e_type,
        toolchain: Toolchain::default(),
        libc: LibC::Unknown,
        build_id,
        interpreter,
        segments,
        sections,
        dynamic,
        symbols,
        dynamic_symbols,
        gnu_properties,
        comments,
        dynstr,
    };
    binary.libc = detect_libc(&binary);

    tracing::debug!(
        "Parsed ELF: arch={}, bits={}, segments={}, sections={}, symbols={}",
        binary.architecture,
        binary.bits(),
        binary.segments.len(),
        binary.sections.len(),
        binary.symbols.len() + binary.dynamic_symbols.len()
    );

    Ok(binary)
}

fn to_usize(value: u64) -> Result<usize, ParseError> {
    usize::try_from(value).map_err(|_| ParseError::Malformed(format!("offset {} out of range", value)))
}

/// File bytes of a section; empty when the section has no file data or points outside the file.
fn section_bytes<'a>(bytes: &'a [u8], sh: &SectionHeader) -> &'a [u8] {
    if sh.sh_type == SHT_NOBITS {
        return &[];
    }
    slice_at(bytes, sh.sh_offset, sh.sh_size)
}

fn segment_bytes<'a>(bytes: &'a [u8], ph: &ProgramHeader) -> &'a [u8] {
    slice_at(bytes, ph.p_offset, ph.p_filesz)
}

fn slice_at(bytes: &[u8], offset: u64, size: u64) -> &[u8] {
    let (Ok(start), Ok(len)) = (usize::try_from(offset), usize::try_from(size)) else {
        return &[];
    };
    start
        .checked_add(len)
        .and_then(|end| bytes.get(start..end))
        .unwrap_or(&[])
}

fn split_strings(data: &[u8]) -> Vec<String> {
    data.split(|&b| b == 0)
        .filter(|s| !s.is_empty())
        .map(|s| String::from_utf8_lossy(s).trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn read_symbols(
    bytes: &[u8],
    section_headers: &[SectionHeader],
    sh_type: u32,
    ctx: Ctx,
) -> Result<Vec<Symbol>, ParseError> {
    let Some(table) = section_headers.iter().find(|sh| sh.sh_type == sh_type) else {
        return Ok(Vec::new());
    };
    let entry_size = if ctx.container == Container::Big { 24 } else { 16 };
    let count = to_usize(table.sh_size)? / entry_size;
    if count == 0 {
        return Ok(Vec::new());
    }

    let symtab = Symtab::parse(bytes, to_usize(table.sh_offset)?, count, ctx)
        .map_err(|e| ParseError::Malformed(format!("failed to read symbols: {}", e)))?;
    let strtab = section_headers
        .get(table.sh_link as usize)
        .map(|sh| section_bytes(bytes, sh))
        .unwrap_or_default();

    // index 0 is the reserved null symbol
    Ok(symtab
        .iter()
        .skip(1)
        .map(|sym| Symbol {
            name: read_cstr(strtab, sym.st_name as u64).unwrap_or_default(),
            sym_type: sym.st_type(),
            bind: sym.st_bind(),
            visibility: sym.st_visibility(),
        })
        .collect())
}

fn detect_libc(binary: &ElfBinary) -> LibC {
    if let Some(interp) = &binary.interpreter {
        if interp.contains("ld-musl") {
            return LibC::Musl;
        }
        if interp.contains("ld-linux") {
            return LibC::Glibc;
        }
    }
    for lib in binary.needed_libraries() {
        if lib.contains("musl") {
            return LibC::Musl;
        }
        if lib.contains("libc.so.6") {
            return LibC::Glibc;
        }
    }
    LibC::Unknown
}
