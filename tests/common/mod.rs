// tests/common/mod.rs
// Minimal ELF64 little-endian image builder shared by the integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

pub const EM_386: u16 = 3;
pub const EM_X86_64: u16 = 62;
pub const EM_AARCH64: u16 = 183;

pub const ET_REL: u16 = 1;
pub const ET_EXEC: u16 = 2;
pub const ET_DYN: u16 = 3;

pub const PT_LOAD: u32 = 1;
pub const PT_INTERP: u32 = 3;
pub const PT_GNU_STACK: u32 = 0x6474_e551;
pub const PT_GNU_RELRO: u32 = 0x6474_e552;

pub const PF_X: u32 = 1;
pub const PF_W: u32 = 2;
pub const PF_R: u32 = 4;

pub const SHT_PROGBITS: u32 = 1;
pub const SHT_SYMTAB: u32 = 2;
pub const SHT_STRTAB: u32 = 3;
pub const SHT_DYNAMIC: u32 = 6;
pub const SHT_NOTE: u32 = 7;
pub const SHT_DYNSYM: u32 = 11;

pub const DT_NEEDED: u64 = 1;
pub const DT_TEXTREL: u64 = 22;
pub const DT_BIND_NOW: u64 = 24;
pub const DT_RPATH: u64 = 15;
pub const DT_RUNPATH: u64 = 29;
pub const DT_FLAGS: u64 = 30;
pub const DT_FLAGS_1: u64 = 0x6fff_fffb;

pub const DF_1_NOW: u64 = 0x1;
pub const DF_1_NOOPEN: u64 = 0x40;
pub const DF_1_NODUMP: u64 = 0x1000;
pub const DF_1_PIE: u64 = 0x0800_0000;

pub const X86_FEATURE_1_AND: u32 = 0xc000_0002;
pub const X86_IBT: u32 = 1;
pub const X86_SHSTK: u32 = 2;
pub const AARCH64_FEATURE_1_AND: u32 = 0xc000_0000;
pub const AARCH64_BTI: u32 = 1;
pub const AARCH64_PAC: u32 = 2;

enum SegmentData {
    Raw { offset: u64, filesz: u64 },
    Bytes(Vec<u8>),
}

struct SegmentSpec {
    p_type: u32,
    flags: u32,
    memsz: u64,
    data: SegmentData,
}

#[derive(Clone)]
struct SectionSpec {
    name: String,
    sh_type: u32,
    data: Vec<u8>,
    link: Option<&'static str>,
    entsize: u64,
}

pub struct ElfBuilder {
    machine: u16,
    e_type: u16,
    segments: Vec<SegmentSpec>,
    sections: Vec<SectionSpec>,
    dyn_entries: Vec<(u64, u64)>,
    dynstr: Vec<u8>,
    symbols: Vec<String>,
    dynamic_symbols: Vec<String>,
    comment: Vec<u8>,
    properties: Vec<(u32, u32)>,
}

impl ElfBuilder {
    pub fn new(machine: u16) -> Self {
        Self {
            machine,
            e_type: ET_DYN,
            segments: Vec::new(),
            sections: Vec::new(),
            dyn_entries: Vec::new(),
            dynstr: vec![0],
            symbols: Vec::new(),
            dynamic_symbols: Vec::new(),
            comment: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn e_type(mut self, e_type: u16) -> Self {
        self.e_type = e_type;
        self
    }

    pub fn interp(mut self, path: &str) -> Self {
        let mut data = path.as_bytes().to_vec();
        data.push(0);
        self.segments.push(SegmentSpec {
            p_type: PT_INTERP,
            flags: PF_R,
            memsz: data.len() as u64,
            data: SegmentData::Bytes(data),
        });
        self
    }

    /// Segment header only; offset and size need not point at real data.
    pub fn segment(mut self, p_type: u32, flags: u32, offset: u64, filesz: u64, memsz: u64) -> Self {
        self.segments.push(SegmentSpec {
            p_type,
            flags,
            memsz,
            data: SegmentData::Raw { offset, filesz },
        });
        self
    }

    pub fn load(self, flags: u32, offset: u64, size: u64) -> Self {
        self.segment(PT_LOAD, flags, offset, size, size)
    }

    pub fn gnu_stack(self, flags: u32) -> Self {
        self.segment(PT_GNU_STACK, flags, 0, 0, 0)
    }

    pub fn gnu_stack_size(self, flags: u32, size: u64) -> Self {
        self.segment(PT_GNU_STACK, flags, 0, 0, size)
    }

    pub fn relro(self) -> Self {
        self.segment(PT_GNU_RELRO, PF_R, 0x2000, 0x100, 0x100)
    }

    pub fn dyn_val(mut self, tag: u64, value: u64) -> Self {
        self.dyn_entries.push((tag, value));
        self
    }

    pub fn dyn_str(mut self, tag: u64, value: &str) -> Self {
        let offset = push_str(&mut self.dynstr, value);
        self.dyn_entries.push((tag, offset));
        self
    }

    pub fn needed(self, lib: &str) -> Self {
        self.dyn_str(DT_NEEDED, lib)
    }

    pub fn symbols(mut self, names: &[&str]) -> Self {
        self.symbols.extend(names.iter().map(|s| s.to_string()));
        self
    }

    pub fn dynamic_symbols(mut self, names: &[&str]) -> Self {
        self.dynamic_symbols.extend(names.iter().map(|s| s.to_string()));
        self
    }

    pub fn comment(mut self, text: &str) -> Self {
        self.comment.extend_from_slice(text.as_bytes());
        self.comment.push(0);
        self
    }

    pub fn section(mut self, name: &str, sh_type: u32, data: &[u8]) -> Self {
        self.sections.push(SectionSpec {
            name: name.to_string(),
            sh_type,
            data: data.to_vec(),
            link: None,
            entsize: 0,
        });
        self
    }

    pub fn gnu_property(mut self, pr_type: u32, flags: u32) -> Self {
        self.properties.push((pr_type, flags));
        self
    }

    pub fn build_id(self, id: &[u8]) -> Self {
        let note = note(3, id, 4);
        self.section(".note.gnu.build-id", SHT_NOTE, &note)
    }

    /// `.debug_abbrev` and `.debug_info` holding one compile unit with `producer`.
    pub fn dwarf_producer(self, producer: &str) -> Self {
        let (abbrev, info) = dwarf_compile_unit(producer);
        self.section(".debug_abbrev", SHT_PROGBITS, &abbrev)
            .section(".debug_info", SHT_PROGBITS, &info)
    }

    pub fn build(&self) -> Vec<u8> {
        let mut sections = self.sections.clone();

        if !self.comment.is_empty() {
            sections.push(SectionSpec {
                name: ".comment".into(),
                sh_type: SHT_PROGBITS,
                data: self.comment.clone(),
                link: None,
                entsize: 1,
            });
        }

        if !self.properties.is_empty() {
            let mut desc = Vec::new();
            for (pr_type, flags) in &self.properties {
                desc.extend_from_slice(&pr_type.to_le_bytes());
                desc.extend_from_slice(&4u32.to_le_bytes());
                desc.extend_from_slice(&flags.to_le_bytes());
                desc.extend_from_slice(&[0; 4]);
            }
            sections.push(SectionSpec {
                name: ".note.gnu.property".into(),
                sh_type: SHT_NOTE,
                data: note(5, &desc, 8),
                link: None,
                entsize: 0,
            });
        }

        if !self.dyn_entries.is_empty() || !self.dynamic_symbols.is_empty() {
            let mut dynstr = self.dynstr.clone();
            if !self.dynamic_symbols.is_empty() {
                sections.push(SectionSpec {
                    name: ".dynsym".into(),
                    sh_type: SHT_DYNSYM,
                    data: symbol_table(&self.dynamic_symbols, &mut dynstr),
                    link: Some(".dynstr"),
                    entsize: 24,
                });
            }
            if !self.dyn_entries.is_empty() {
                let mut data = Vec::new();
                for (tag, value) in self.dyn_entries.iter().chain(std::iter::once(&(0, 0))) {
                    data.extend_from_slice(&tag.to_le_bytes());
                    data.extend_from_slice(&value.to_le_bytes());
                }
                sections.push(SectionSpec {
                    name: ".dynamic".into(),
                    sh_type: SHT_DYNAMIC,
                    data,
                    link: Some(".dynstr"),
                    entsize: 16,
                });
            }
            sections.push(SectionSpec {
                name: ".dynstr".into(),
                sh_type: SHT_STRTAB,
                data: dynstr,
                link: None,
                entsize: 0,
            });
        }

        if !self.symbols.is_empty() {
            let mut strtab = vec![0];
            let table = symbol_table(&self.symbols, &mut strtab);
            sections.push(SectionSpec {
                name: ".symtab".into(),
                sh_type: SHT_SYMTAB,
                data: table,
                link: Some(".strtab"),
                entsize: 24,
            });
            sections.push(SectionSpec {
                name: ".strtab".into(),
                sh_type: SHT_STRTAB,
                data: strtab,
                link: None,
                entsize: 0,
            });
        }

        let mut shstrtab = vec![0];
        let name_offsets: Vec<u32> = sections
            .iter()
            .map(|s| push_str(&mut shstrtab, &s.name) as u32)
            .collect();
        let shstrtab_name = push_str(&mut shstrtab, ".shstrtab") as u32;

        let phnum = self.segments.len();
        let mut out = vec![0u8; 64 + 56 * phnum];

        let mut segment_layout = Vec::new();
        for seg in &self.segments {
            match &seg.data {
                SegmentData::Raw { offset, filesz } => segment_layout.push((*offset, *filesz)),
                SegmentData::Bytes(bytes) => {
                    align(&mut out, 8);
                    segment_layout.push((out.len() as u64, bytes.len() as u64));
                    out.extend_from_slice(bytes);
                }
            }
        }

        let mut section_layout = Vec::new();
        for sec in &sections {
            align(&mut out, 8);
            section_layout.push((out.len() as u64, sec.data.len() as u64));
            out.extend_from_slice(&sec.data);
        }
        let shstrtab_offset = out.len() as u64;
        out.extend_from_slice(&shstrtab);

        align(&mut out, 8);
        let shoff = out.len() as u64;
        let shnum = sections.len() + 2;
        let shstrndx = sections.len() + 1;

        // null section header
        out.extend_from_slice(&[0u8; 64]);
        for (i, sec) in sections.iter().enumerate() {
            let link = sec
                .link
                .and_then(|name| sections.iter().position(|s| s.name == name))
                .map(|idx| idx as u32 + 1)
                .unwrap_or(0);
            let (offset, size) = section_layout[i];
            write_section_header(&mut out, name_offsets[i], sec.sh_type, offset, size, link, sec.entsize);
        }
        write_section_header(
            &mut out,
            shstrtab_name,
            SHT_STRTAB,
            shstrtab_offset,
            shstrtab.len() as u64,
            0,
            0,
        );

        // ELF header
        out[0..4].copy_from_slice(b"\x7fELF");
        out[4] = 2; // ELFCLASS64
        out[5] = 1; // ELFDATA2LSB
        out[6] = 1; // EV_CURRENT
        out[16..18].copy_from_slice(&self.e_type.to_le_bytes());
        out[18..20].copy_from_slice(&self.machine.to_le_bytes());
        out[20..24].copy_from_slice(&1u32.to_le_bytes());
        out[32..40].copy_from_slice(&(if phnum > 0 { 64u64 } else { 0 }).to_le_bytes());
        out[40..48].copy_from_slice(&shoff.to_le_bytes());
        out[52..54].copy_from_slice(&64u16.to_le_bytes());
        out[54..56].copy_from_slice(&56u16.to_le_bytes());
        out[56..58].copy_from_slice(&(phnum as u16).to_le_bytes());
        out[58..60].copy_from_slice(&64u16.to_le_bytes());
        out[60..62].copy_from_slice(&(shnum as u16).to_le_bytes());
        out[62..64].copy_from_slice(&(shstrndx as u16).to_le_bytes());

        for (i, seg) in self.segments.iter().enumerate() {
            let (offset, filesz) = segment_layout[i];
            let base = 64 + 56 * i;
            let ph = &mut out[base..base + 56];
            ph[0..4].copy_from_slice(&seg.p_type.to_le_bytes());
            ph[4..8].copy_from_slice(&seg.flags.to_le_bytes());
            ph[8..16].copy_from_slice(&offset.to_le_bytes());
            ph[16..24].copy_from_slice(&offset.to_le_bytes());
            ph[24..32].copy_from_slice(&offset.to_le_bytes());
            ph[32..40].copy_from_slice(&filesz.to_le_bytes());
            ph[40..48].copy_from_slice(&seg.memsz.max(filesz).to_le_bytes());
            ph[48..56].copy_from_slice(&8u64.to_le_bytes());
        }

        out
    }

    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).expect("write test binary");
        path
    }
}

fn push_str(table: &mut Vec<u8>, s: &str) -> u64 {
    let offset = table.len() as u64;
    table.extend_from_slice(s.as_bytes());
    table.push(0);
    offset
}

fn align(out: &mut Vec<u8>, to: usize) {
    while out.len() % to != 0 {
        out.push(0);
    }
}

fn symbol_table(names: &[String], strtab: &mut Vec<u8>) -> Vec<u8> {
    let mut table = vec![0u8; 24];
    for name in names {
        let st_name = push_str(strtab, name) as u32;
        table.extend_from_slice(&st_name.to_le_bytes());
        table.push((1 << 4) | 2); // STB_GLOBAL, STT_FUNC
        table.push(0);
        table.extend_from_slice(&0u16.to_le_bytes());
        table.extend_from_slice(&0u64.to_le_bytes());
        table.extend_from_slice(&0u64.to_le_bytes());
    }
    table
}

fn write_section_header(out: &mut Vec<u8>, name: u32, sh_type: u32, offset: u64, size: u64, link: u32, entsize: u64) {
    out.extend_from_slice(&name.to_le_bytes());
    out.extend_from_slice(&sh_type.to_le_bytes());
    out.extend_from_slice(&0u64.to_le_bytes()); // flags
    out.extend_from_slice(&0u64.to_le_bytes()); // addr
    out.extend_from_slice(&offset.to_le_bytes());
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(&link.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // info
    out.extend_from_slice(&1u64.to_le_bytes()); // addralign
    out.extend_from_slice(&entsize.to_le_bytes());
}

/// GNU note with `desc` padded to `desc_align`.
pub fn note(n_type: u32, desc: &[u8], desc_align: usize) -> Vec<u8> {
    let mut padded = desc.to_vec();
    while padded.len() % desc_align != 0 {
        padded.push(0);
    }
    let mut out = Vec::new();
    out.extend_from_slice(&4u32.to_le_bytes());
    out.extend_from_slice(&(desc.len() as u32).to_le_bytes());
    out.extend_from_slice(&n_type.to_le_bytes());
    out.extend_from_slice(b"GNU\0");
    out.extend(padded);
    out
}

/// DWARF 4 abbreviation and info bytes for a single `DW_TAG_compile_unit`
/// carrying `DW_AT_producer` as an inline string.
pub fn dwarf_compile_unit(producer: &str) -> (Vec<u8>, Vec<u8>) {
    let abbrev = vec![
        0x01, // abbrev code
        0x11, // DW_TAG_compile_unit
        0x00, // DW_CHILDREN_no
        0x25, // DW_AT_producer
        0x08, // DW_FORM_string
        0x00, 0x00, // end of attributes
        0x00, // end of table
    ];

    let mut body = Vec::new();
    body.extend_from_slice(&4u16.to_le_bytes()); // version
    body.extend_from_slice(&0u32.to_le_bytes()); // abbrev offset
    body.push(8); // address size
    body.push(0x01); // abbrev code
    body.extend_from_slice(producer.as_bytes());
    body.push(0);

    let mut info = Vec::new();
    info.extend_from_slice(&(body.len() as u32).to_le_bytes());
    info.extend(body);
    (abbrev, info)
}

/// A gcc-built x86-64 PIE that passes every rule of the default set.
pub fn hardened_pie() -> ElfBuilder {
    ElfBuilder::new(EM_X86_64)
        .interp("/lib64/ld-linux-x86-64.so.2")
        .load(PF_R | PF_X, 0, 0x1000)
        .load(PF_R | PF_W, 0x2000, 0x100)
        .gnu_stack(PF_R | PF_W)
        .relro()
        .needed("libc.so.6")
        .dyn_val(DT_FLAGS_1, DF_1_NOW | DF_1_PIE)
        .dynamic_symbols(&["__stack_chk_fail", "__memcpy_chk", "__printf_chk"])
        .comment("GCC: (GNU) 13.2.0")
}

/// An x86-64 `ET_EXEC` with no interpreter and none of the usual hardening.
pub fn legacy_exec() -> ElfBuilder {
    ElfBuilder::new(EM_X86_64)
        .e_type(ET_EXEC)
        .load(PF_R | PF_W | PF_X, 0, 0x1000)
        .gnu_stack(PF_R | PF_W | PF_X)
        .dynamic_symbols(&["memcpy", "strcpy"])
        .comment("GCC: (GNU) 4.8.5")
}
