//! ELF64 loading and section discovery (component B).

use std::path::{Path, PathBuf};

use memmap2::MmapMut;
use scroll::Pread;

use crate::elf::consts::*;
use crate::error::{Error, Result};

/// A section's extent within the owning file's mapped bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    pub offset: usize,
    pub size: usize,
}

/// The four debug sections this index cares about, plus the symbol table
/// and the `.rela` section (if any) paired with each debug section.
#[derive(Debug, Default, Clone)]
pub struct DebugSections {
    pub abbrev: Option<Slice>,
    pub info: Option<Slice>,
    pub line: Option<Slice>,
    pub str_: Option<Slice>,
    pub symtab: Option<Slice>,
    pub rela_abbrev: Option<Slice>,
    pub rela_info: Option<Slice>,
    pub rela_line: Option<Slice>,
    pub rela_str: Option<Slice>,
}

impl DebugSections {
    fn is_complete(&self) -> bool {
        self.abbrev.is_some()
            && self.info.is_some()
            && self.line.is_some()
            && self.str_.is_some()
            && self.symtab.is_some()
    }

    /// The four `(debug_section, rela_section)` pairs actually present,
    /// used by the relocator to build its flat work set.
    pub fn rela_pairs(&self) -> Vec<(Slice, Slice)> {
        let mut pairs = Vec::new();
        if let (Some(d), Some(r)) = (self.info, self.rela_info) {
            pairs.push((d, r));
        }
        if let (Some(d), Some(r)) = (self.abbrev, self.rela_abbrev) {
            pairs.push((d, r));
        }
        if let (Some(d), Some(r)) = (self.line, self.rela_line) {
            pairs.push((d, r));
        }
        if let (Some(d), Some(r)) = (self.str_, self.rela_str) {
            pairs.push((d, r));
        }
        pairs
    }
}

/// One loaded, relocated ELF64 object and its discovered debug sections.
pub struct File {
    pub path: PathBuf,
    map: MmapMut,
    pub sections: DebugSections,
}

impl File {
    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }

    pub fn slice(&self, s: Slice) -> &[u8] {
        &self.map[s.offset..s.offset + s.size]
    }

    /// Open, map, and validate the ELF64 header of `path`, then discover its
    /// debug sections. Returns `Ok(None)` when the file is valid ELF64 but
    /// lacks one of the required sections (symtab or any `.debug_*`): such
    /// files are silently skipped, matching the upstream indexer.
    pub fn open(path: &Path) -> Result<Option<File>> {
        let fs_file = std::fs::File::open(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let map = unsafe { memmap2::MmapOptions::new().map_copy(&fs_file) }.map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let buf: &[u8] = &map;
        if buf.len() < SIZEOF_IDENT {
            return Err(Error::ElfFormatError("file too small for ELF ident".into()));
        }
        if buf[0..4] != ELFMAG {
            return Err(Error::ElfFormatError("bad ELF magic".into()));
        }
        if buf[EI_VERSION] != EV_CURRENT {
            return Err(Error::ElfFormatError("unsupported ELF version".into()));
        }
        match buf[EI_DATA] {
            ELFDATA2LSB => {}
            ELFDATA2MSB => {
                return Err(Error::NotImplemented("big-endian ELF".into()));
            }
            ELFDATANONE | _ => {
                return Err(Error::ElfFormatError("invalid ELF data encoding".into()));
            }
        }
        match buf[EI_CLASS] {
            ELFCLASS64 => {}
            ELFCLASS32 => return Err(Error::NotImplemented("32-bit ELF".into())),
            _ => return Err(Error::ElfFormatError("invalid ELF class".into())),
        }

        let header: Header = buf.pread_with(0, scroll::LE)?;
        if header.e_shnum == 0 {
            return Err(Error::ElfFormatError("no section headers".into()));
        }

        let shoff = crate::reader::to_usize(header.e_shoff)?;
        let shentsize = header.e_shentsize as usize;
        if shentsize < SIZEOF_SHDR {
            return Err(Error::ElfFormatError("section header entry too small".into()));
        }
        let shnum = header.e_shnum as usize;
        let shtab_end = shoff
            .checked_add(shentsize.checked_mul(shnum).ok_or(Error::Eof)?)
            .ok_or(Error::Eof)?;
        if shtab_end > buf.len() {
            return Err(Error::ElfFormatError("section header table out of bounds".into()));
        }

        let mut shdrs = Vec::with_capacity(shnum);
        for i in 0..shnum {
            let off = shoff + i * shentsize;
            let shdr: SectionHeader = buf.pread_with(off, scroll::LE)?;
            shdrs.push(shdr);
        }

        let shstrndx = header.e_shstrndx as usize;
        let shstrtab = shdrs
            .get(shstrndx)
            .ok_or_else(|| Error::ElfFormatError("bad shstrndx".into()))?;
        let shstrtab_bytes = section_bytes(buf, shstrtab)?;

        let mut sections = DebugSections::default();
        let mut symtab_idx = None;
        for (idx, shdr) in shdrs.iter().enumerate() {
            if shdr.sh_type == SHT_SYMTAB {
                sections.symtab = Some(section_slice(buf, shdr)?);
                symtab_idx = Some(idx);
                continue;
            }
            if shdr.sh_type != SHT_PROGBITS {
                continue;
            }
            let name = section_name(shstrtab_bytes, shdr.sh_name as usize)?;
            let slice = section_slice(buf, shdr)?;
            match name {
                DEBUG_ABBREV => sections.abbrev = Some(slice),
                DEBUG_INFO => sections.info = Some(slice),
                DEBUG_LINE => sections.line = Some(slice),
                DEBUG_STR => sections.str_ = Some(slice),
                _ => {}
            }
        }

        if !sections.is_complete() {
            log::debug!(
                "{}: skipping, missing one of .debug_{{abbrev,info,line,str}} or .symtab",
                path.display()
            );
            return Ok(None);
        }

        let symtab_idx = symtab_idx.expect("is_complete implies symtab present");
        for shdr in &shdrs {
            if shdr.sh_type != SHT_RELA || shdr.sh_link as usize != symtab_idx {
                continue;
            }
            let target = shdr.sh_info as usize;
            let target_shdr = shdrs
                .get(target)
                .ok_or_else(|| Error::ElfFormatError("rela sh_info out of range".into()))?;
            let name = section_name(shstrtab_bytes, target_shdr.sh_name as usize)?;
            let slice = section_slice(buf, shdr)?;
            match name {
                DEBUG_ABBREV => sections.rela_abbrev = Some(slice),
                DEBUG_INFO => sections.rela_info = Some(slice),
                DEBUG_LINE => sections.rela_line = Some(slice),
                DEBUG_STR => sections.rela_str = Some(slice),
                _ => {}
            }
        }

        Ok(Some(File {
            path: path.to_path_buf(),
            map,
            sections,
        }))
    }
}

fn section_bytes<'a>(buf: &'a [u8], shdr: &SectionHeader) -> Result<&'a [u8]> {
    let off = crate::reader::to_usize(shdr.sh_offset)?;
    let size = crate::reader::to_usize(shdr.sh_size)?;
    let end = off.checked_add(size).ok_or(Error::Eof)?;
    buf.get(off..end).ok_or(Error::Eof)
}

/// A section's `(offset, size)` as a bounds-checked `Slice`, rejecting a
/// section header whose extent runs past end of file.
fn section_slice(buf: &[u8], shdr: &SectionHeader) -> Result<Slice> {
    let offset = crate::reader::to_usize(shdr.sh_offset)?;
    let size = crate::reader::to_usize(shdr.sh_size)?;
    let end = offset.checked_add(size).ok_or(Error::Eof)?;
    if end > buf.len() {
        return Err(Error::ElfFormatError("section extends past end of file".into()));
    }
    Ok(Slice { offset, size })
}

fn section_name(strtab: &[u8], offset: usize) -> Result<&str> {
    let bytes = strtab.get(offset..).ok_or(Error::Eof)?;
    let nul = bytes.iter().position(|&b| b == 0).ok_or(Error::Eof)?;
    std::str::from_utf8(&bytes[..nul])
        .map_err(|_| Error::ElfFormatError("non-UTF8 section name".into()))
}
