//! Shared helpers for building minimal, synthetic ELF64 objects with hand
//! laid out DWARF sections, used by the integration tests to exercise the
//! full `add`/`find` pipeline without needing a real compiler toolchain.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use dwindex::elf::consts::*;

pub fn uleb(mut v: u64, out: &mut Vec<u8>) {
    loop {
        let mut byte = (v & 0x7f) as u8;
        v >>= 7;
        if v != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if v == 0 {
            break;
        }
    }
}

#[derive(Default)]
pub struct ObjectBuilder {
    pub debug_abbrev: Vec<u8>,
    pub debug_info: Vec<u8>,
    pub debug_line: Vec<u8>,
    pub debug_str: Vec<u8>,
    pub relocations: Vec<(usize, u64, u64, i64)>, // (section index into SECTION_NAMES below, r_offset, r_type|sym<<32 combined later, addend)
}

const SECTION_NAMES: [&str; 4] = [".debug_abbrev", ".debug_info", ".debug_line", ".debug_str"];

impl ObjectBuilder {
    pub fn new() -> Self {
        ObjectBuilder {
            debug_line: vec![0u8; 4],
            debug_str: vec![0u8],
            ..Default::default()
        }
    }

    /// Queue an `R_X86_64_{32,64}` relocation against symbol 1 (the sole
    /// synthetic symbol every object carries), targeting one of the four
    /// debug sections by index (0=abbrev,1=info,2=line,3=str).
    pub fn reloc(&mut self, section: usize, r_offset: u64, r_type: u32, addend: i64) -> &mut Self {
        self.relocations.push((section, r_offset, r_type as u64, addend));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let debug_sections = [
            self.debug_abbrev,
            self.debug_info,
            self.debug_line,
            self.debug_str,
        ];

        let mut rela_bytes: [Vec<u8>; 4] = Default::default();
        for (section, r_offset, r_type, addend) in &self.relocations {
            let r_info = (1u64 << 32) | r_type;
            let mut entry = Vec::with_capacity(SIZEOF_RELA);
            entry.extend_from_slice(&r_offset.to_le_bytes());
            entry.extend_from_slice(&r_info.to_le_bytes());
            entry.extend_from_slice(&addend.to_le_bytes());
            rela_bytes[*section].extend_from_slice(&entry);
        }

        // One symbol table with a single symbol at st_value = 0x1000.
        let mut symtab = vec![0u8; SIZEOF_SYM]; // symbol 0: null symbol
        let mut sym1 = vec![0u8; SIZEOF_SYM];
        sym1[8..16].copy_from_slice(&0x1000u64.to_le_bytes()); // st_value
        symtab.extend_from_slice(&sym1);

        #[derive(Clone)]
        struct Sec {
            name: &'static str,
            ty: u32,
            data: Vec<u8>,
            link: u32,
            info: u32,
        }

        let mut sections = vec![Sec {
            name: "",
            ty: SHT_NULL,
            data: vec![],
            link: 0,
            info: 0,
        }];
        for (i, name) in SECTION_NAMES.iter().enumerate() {
            sections.push(Sec {
                name,
                ty: SHT_PROGBITS,
                data: debug_sections[i].clone(),
                link: 0,
                info: 0,
            });
        }
        let symtab_idx = sections.len();
        sections.push(Sec {
            name: ".symtab",
            ty: SHT_SYMTAB,
            data: symtab,
            link: 0,
            info: 0,
        });
        let strtab_idx = sections.len();
        sections.push(Sec {
            name: ".strtab",
            ty: SHT_STRTAB,
            data: vec![0u8],
            link: 0,
            info: 0,
        });
        sections[symtab_idx].link = strtab_idx as u32;

        for (i, bytes) in rela_bytes.iter().enumerate() {
            if bytes.is_empty() {
                continue;
            }
            let target_section_idx = i + 1; // offset by the leading null section
            sections.push(Sec {
                name: Box::leak(format!(".rela{}", SECTION_NAMES[i]).into_boxed_str()),
                ty: SHT_RELA,
                data: bytes.clone(),
                link: symtab_idx as u32,
                info: target_section_idx as u32,
            });
        }

        let shstrtab_idx = sections.len();
        let mut shstrtab = vec![0u8];
        let mut name_offsets = Vec::new();
        for sec in &sections {
            name_offsets.push(shstrtab.len() as u32);
            shstrtab.extend_from_slice(sec.name.as_bytes());
            shstrtab.push(0);
        }
        name_offsets.push(shstrtab.len() as u32);
        sections.push(Sec {
            name: ".shstrtab",
            ty: SHT_STRTAB,
            data: shstrtab,
            link: 0,
            info: 0,
        });

        let mut buf = vec![0u8; SIZEOF_EHDR];
        buf[0..4].copy_from_slice(&ELFMAG);
        buf[EI_CLASS] = ELFCLASS64;
        buf[EI_DATA] = ELFDATA2LSB;
        buf[EI_VERSION] = EV_CURRENT;

        let mut offsets = Vec::new();
        for sec in &sections {
            while buf.len() % 8 != 0 {
                buf.push(0);
            }
            offsets.push(buf.len());
            buf.extend_from_slice(&sec.data);
        }

        let shoff = buf.len();
        for (i, sec) in sections.iter().enumerate() {
            let mut shdr = vec![0u8; SIZEOF_SHDR];
            shdr[0..4].copy_from_slice(&name_offsets[i].to_le_bytes());
            shdr[4..8].copy_from_slice(&sec.ty.to_le_bytes());
            shdr[24..32].copy_from_slice(&(offsets[i] as u64).to_le_bytes());
            shdr[32..40].copy_from_slice(&(sec.data.len() as u64).to_le_bytes());
            shdr[40..44].copy_from_slice(&sec.link.to_le_bytes());
            shdr[44..48].copy_from_slice(&sec.info.to_le_bytes());
            buf.extend_from_slice(&shdr);
        }

        buf[16..18].copy_from_slice(&0u16.to_le_bytes()); // e_type
        buf[18..20].copy_from_slice(&0x3eu16.to_le_bytes()); // e_machine (x86_64)
        buf[20..24].copy_from_slice(&1u32.to_le_bytes()); // e_version
        buf[24..32].copy_from_slice(&0u64.to_le_bytes()); // e_entry
        buf[32..40].copy_from_slice(&0u64.to_le_bytes()); // e_phoff
        buf[40..48].copy_from_slice(&(shoff as u64).to_le_bytes()); // e_shoff
        buf[48..52].copy_from_slice(&0u32.to_le_bytes()); // e_flags
        buf[52..54].copy_from_slice(&(SIZEOF_EHDR as u16).to_le_bytes()); // e_ehsize
        buf[54..56].copy_from_slice(&0u16.to_le_bytes()); // e_phentsize
        buf[56..58].copy_from_slice(&0u16.to_le_bytes()); // e_phnum
        buf[58..60].copy_from_slice(&(SIZEOF_SHDR as u16).to_le_bytes()); // e_shentsize
        buf[60..62].copy_from_slice(&(sections.len() as u16).to_le_bytes()); // e_shnum
        buf[62..64].copy_from_slice(&(shstrtab_idx as u16).to_le_bytes()); // e_shstrndx

        buf
    }
}

pub fn abbrev_table(decls: &[(u64, u64, bool, &[(u64, u64)])]) -> Vec<u8> {
    let mut out = Vec::new();
    for (code, tag, children, attrs) in decls {
        uleb(*code, &mut out);
        uleb(*tag, &mut out);
        out.push(u8::from(*children));
        for (attr, form) in attrs.iter() {
            uleb(*attr, &mut out);
            uleb(*form, &mut out);
        }
        uleb(0, &mut out);
        uleb(0, &mut out);
    }
    uleb(0, &mut out);
    out
}

pub fn cu_header(version: u16, abbrev_offset: u32, addr_size: u8, body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    let unit_length = 2 + 4 + 1 + body.len();
    buf.extend_from_slice(&(unit_length as u32).to_le_bytes());
    buf.extend_from_slice(&version.to_le_bytes());
    buf.extend_from_slice(&abbrev_offset.to_le_bytes());
    buf.push(addr_size);
    buf.extend_from_slice(body);
    buf
}

pub fn line_program_header(dirs: &[&[u8]], files: &[(&[u8], u64)]) -> Vec<u8> {
    let mut body = Vec::new();
    body.push(1u8); // minimum_instruction_length
    body.push(1u8); // maximum_operations_per_instruction (version 4)
    body.push(1u8); // default_is_stmt
    body.push(0xfbu8); // line_base = -5
    body.push(14u8); // line_range
    body.push(1u8); // opcode_base
    for d in dirs {
        body.extend_from_slice(d);
        body.push(0);
    }
    body.push(0);
    for (name, dir_index) in files {
        body.extend_from_slice(name);
        body.push(0);
        uleb(*dir_index, &mut body);
        uleb(0, &mut body); // mtime
        uleb(0, &mut body); // size
    }
    body.push(0);

    let mut buf = Vec::new();
    let unit_length = 2 + 4 + body.len();
    buf.extend_from_slice(&(unit_length as u32).to_le_bytes());
    buf.extend_from_slice(&4u16.to_le_bytes());
    buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
    buf.extend_from_slice(&body);
    buf
}

static COUNTER: AtomicU32 = AtomicU32::new(0);

pub fn write_temp(bytes: &[u8]) -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!("dwindex-it-{}-{n}.o", std::process::id()));
    std::fs::write(&path, bytes).unwrap();
    path
}
