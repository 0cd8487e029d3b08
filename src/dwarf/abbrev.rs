//! The abbreviation compiler (component E).
//!
//! Each `.debug_abbrev` declaration is compiled once into a byte-opcode
//! command stream so that walking a CU's DIEs never has to re-inspect a
//! `(attribute, form)` pair: the walker just replays the opcodes. Opcodes
//! `1..=CMD_MAX_SKIP` advance the DIE cursor by that many bytes (runs of
//! fixed-size attributes are fused into a single skip at compile time);
//! opcodes above that are a closed set of captures for the handful of
//! attributes this index actually consumes.

use crate::dwarf::consts::*;
use crate::dwarf::cu::CompilationUnit;
use crate::error::{Error, Result};
use crate::reader::Reader;

pub const CMD_MAX_SKIP: u8 = 228;

const ATTRIB_BLOCK1: u8 = 229;
const ATTRIB_BLOCK2: u8 = 230;
const ATTRIB_BLOCK4: u8 = 231;
const ATTRIB_EXPRLOC: u8 = 232;
const ATTRIB_LEB128: u8 = 233;
const ATTRIB_STRING: u8 = 234;
const ATTRIB_NAME_STRING: u8 = 235;
const ATTRIB_NAME_STRP4: u8 = 236;
const ATTRIB_NAME_STRP8: u8 = 237;
const ATTRIB_SIBLING_REF1: u8 = 238;
const ATTRIB_SIBLING_REF2: u8 = 239;
const ATTRIB_SIBLING_REF4: u8 = 240;
const ATTRIB_SIBLING_REF8: u8 = 241;
const ATTRIB_SIBLING_REF_UDATA: u8 = 242;
const ATTRIB_STMT_LIST_LINEPTR4: u8 = 243;
const ATTRIB_STMT_LIST_LINEPTR8: u8 = 244;
const ATTRIB_DECL_FILE_DATA1: u8 = 245;
const ATTRIB_DECL_FILE_DATA2: u8 = 246;
const ATTRIB_DECL_FILE_DATA4: u8 = 247;
const ATTRIB_DECL_FILE_DATA8: u8 = 248;
const ATTRIB_DECL_FILE_UDATA: u8 = 249;
const ATTRIB_SPECIFICATION_REF1: u8 = 250;
const ATTRIB_SPECIFICATION_REF2: u8 = 251;
const ATTRIB_SPECIFICATION_REF4: u8 = 252;
const ATTRIB_SPECIFICATION_REF8: u8 = 253;
const ATTRIB_SPECIFICATION_REF_UDATA: u8 = 254;
const ATTRIB_DECLARATION_FLAG: u8 = 255;
const CMD_END: u8 = 0;

/// Static, per-declaration metadata not worth round-tripping through the
/// opcode stream.
#[derive(Debug, Clone, Copy)]
struct DeclMeta {
    /// 0 if the tag is not one this index records.
    tag: u64,
    children: bool,
    /// True when `DW_AT_declaration` is present with `DW_FORM_flag_present`
    /// (so every DIE of this shape is a declaration, no runtime read
    /// needed).
    declaration_always: bool,
    cmd_start: usize,
}

/// The compiled form of one CU's `.debug_abbrev` table.
pub struct AbbrevTable {
    decls: Vec<DeclMeta>,
    cmds: Vec<u8>,
}

/// Attributes captured while replaying one DIE's compiled command stream.
#[derive(Debug, Default, Clone)]
pub struct DieAttrs<'a> {
    pub tag: u64,
    pub children: bool,
    pub declaration: bool,
    pub name: Option<&'a [u8]>,
    /// Absolute `.debug_info` offset of the DIE `DW_AT_sibling` points to.
    pub sibling: Option<usize>,
    pub stmt_list: Option<u64>,
    pub decl_file: Option<u64>,
    /// Absolute `.debug_info` offset of the DIE `DW_AT_specification`
    /// points to.
    pub specification: Option<usize>,
}

/// Fixed-size skip in bytes for a form that carries no information this
/// index ever captures, or `None` if the form needs special handling
/// (dynamic length, or one of the captured attribute shapes).
fn generic_skip_size(form: u64, address_size: u8, offset_size: u8) -> Option<u8> {
    match form {
        DW_FORM_addr => Some(address_size),
        DW_FORM_data1 | DW_FORM_ref1 | DW_FORM_flag => Some(1),
        DW_FORM_data2 | DW_FORM_ref2 => Some(2),
        DW_FORM_data4 | DW_FORM_ref4 => Some(4),
        DW_FORM_data8 | DW_FORM_ref8 | DW_FORM_ref_sig8 => Some(8),
        DW_FORM_ref_addr | DW_FORM_sec_offset | DW_FORM_strp => Some(offset_size),
        DW_FORM_flag_present => Some(0),
        _ => None,
    }
}

struct Compiler<'c> {
    cu: &'c CompilationUnit,
    cmds: Vec<u8>,
    pending_skip: u32,
}

impl<'c> Compiler<'c> {
    fn new(cu: &'c CompilationUnit) -> Self {
        Compiler {
            cu,
            cmds: Vec::new(),
            pending_skip: 0,
        }
    }

    fn offset_size(&self) -> u8 {
        if self.cu.is_64_bit {
            8
        } else {
            4
        }
    }

    fn flush_skip(&mut self) {
        while self.pending_skip > 0 {
            let chunk = self.pending_skip.min(CMD_MAX_SKIP as u32);
            self.cmds.push(chunk as u8);
            self.pending_skip -= chunk;
        }
    }

    fn push_skip(&mut self, n: u8) {
        self.pending_skip += n as u32;
    }

    fn push_capture(&mut self, op: u8) {
        self.flush_skip();
        self.cmds.push(op);
    }

    /// Compile one `(attribute, form)` pair for a declaration of `tag`.
    fn compile_attr(&mut self, tag: u64, attr: u64, form: u64) -> Result<()> {
        if form == DW_FORM_indirect {
            return Err(Error::NotImplemented("DW_FORM_indirect".into()));
        }

        let address_size = self.cu.address_size;
        let offset_size = self.offset_size();

        match attr {
            DW_AT_name => match form {
                DW_FORM_string => return Ok(self.push_capture(ATTRIB_NAME_STRING)),
                DW_FORM_strp if offset_size == 4 => return Ok(self.push_capture(ATTRIB_NAME_STRP4)),
                DW_FORM_strp => return Ok(self.push_capture(ATTRIB_NAME_STRP8)),
                _ => {}
            },
            DW_AT_sibling if tag != DW_TAG_enumeration_type => match form {
                DW_FORM_ref1 => return Ok(self.push_capture(ATTRIB_SIBLING_REF1)),
                DW_FORM_ref2 => return Ok(self.push_capture(ATTRIB_SIBLING_REF2)),
                DW_FORM_ref4 => return Ok(self.push_capture(ATTRIB_SIBLING_REF4)),
                DW_FORM_ref8 => return Ok(self.push_capture(ATTRIB_SIBLING_REF8)),
                DW_FORM_ref_udata => return Ok(self.push_capture(ATTRIB_SIBLING_REF_UDATA)),
                _ => {}
            },
            DW_AT_stmt_list => match form {
                DW_FORM_data4 => return Ok(self.push_capture(ATTRIB_STMT_LIST_LINEPTR4)),
                DW_FORM_data8 => return Ok(self.push_capture(ATTRIB_STMT_LIST_LINEPTR8)),
                DW_FORM_sec_offset if offset_size == 4 => {
                    return Ok(self.push_capture(ATTRIB_STMT_LIST_LINEPTR4))
                }
                DW_FORM_sec_offset => return Ok(self.push_capture(ATTRIB_STMT_LIST_LINEPTR8)),
                _ => {}
            },
            DW_AT_decl_file => match form {
                DW_FORM_data1 => return Ok(self.push_capture(ATTRIB_DECL_FILE_DATA1)),
                DW_FORM_data2 => return Ok(self.push_capture(ATTRIB_DECL_FILE_DATA2)),
                DW_FORM_data4 => return Ok(self.push_capture(ATTRIB_DECL_FILE_DATA4)),
                DW_FORM_data8 => return Ok(self.push_capture(ATTRIB_DECL_FILE_DATA8)),
                DW_FORM_udata => return Ok(self.push_capture(ATTRIB_DECL_FILE_UDATA)),
                _ => {}
            },
            DW_AT_specification => match form {
                DW_FORM_ref1 => return Ok(self.push_capture(ATTRIB_SPECIFICATION_REF1)),
                DW_FORM_ref2 => return Ok(self.push_capture(ATTRIB_SPECIFICATION_REF2)),
                DW_FORM_ref4 => return Ok(self.push_capture(ATTRIB_SPECIFICATION_REF4)),
                DW_FORM_ref8 => return Ok(self.push_capture(ATTRIB_SPECIFICATION_REF8)),
                DW_FORM_ref_udata => return Ok(self.push_capture(ATTRIB_SPECIFICATION_REF_UDATA)),
                _ => {}
            },
            DW_AT_declaration => match form {
                DW_FORM_flag_present => return Ok(()), // handled via DeclMeta.declaration_always
                DW_FORM_flag => return Ok(self.push_capture(ATTRIB_DECLARATION_FLAG)),
                _ => {}
            },
            _ => {}
        }

        if let Some(size) = generic_skip_size(form, address_size, offset_size) {
            self.push_skip(size);
            return Ok(());
        }

        match form {
            DW_FORM_block1 => self.push_capture(ATTRIB_BLOCK1),
            DW_FORM_block2 => self.push_capture(ATTRIB_BLOCK2),
            DW_FORM_block4 => self.push_capture(ATTRIB_BLOCK4),
            DW_FORM_exprloc | DW_FORM_block => self.push_capture(ATTRIB_EXPRLOC),
            DW_FORM_sdata | DW_FORM_udata | DW_FORM_ref_udata => self.push_capture(ATTRIB_LEB128),
            DW_FORM_string => self.push_capture(ATTRIB_STRING),
            _ => return Err(Error::DwarfFormatError(format!("unsupported DW_FORM {form:#x}"))),
        }
        Ok(())
    }
}

impl AbbrevTable {
    /// Compile the abbreviation table at `debug_abbrev_offset` within
    /// `debug_abbrev`, for the given CU (whose `address_size`/DWARF-offset
    /// form determine several forms' concrete skip widths).
    pub fn compile(debug_abbrev: &[u8], cu: &CompilationUnit) -> Result<AbbrevTable> {
        let start = crate::reader::to_usize(cu.debug_abbrev_offset)?;
        let mut r = Reader::at(debug_abbrev, start)?;
        let mut decls: Vec<DeclMeta> = Vec::new();
        let mut compiler = Compiler::new(cu);

        loop {
            let code = r.read_uleb128()?;
            if code == 0 {
                break;
            }
            if code != decls.len() as u64 + 1 {
                return Err(Error::DwarfFormatError(
                    "non-sequential abbreviation code".into(),
                ));
            }

            let tag = r.read_uleb128()?;
            let has_children = r.read_u8()? != 0;
            let mut declaration_always = false;
            let cmd_start = compiler.cmds.len();

            loop {
                let attr = r.read_uleb128()?;
                let form = r.read_uleb128()?;
                if attr == 0 && form == 0 {
                    break;
                }
                if attr == DW_AT_declaration && form == DW_FORM_flag_present {
                    declaration_always = true;
                }
                compiler.compile_attr(tag, attr, form)?;
            }
            compiler.flush_skip();
            compiler.cmds.push(CMD_END);

            decls.push(DeclMeta {
                tag: if is_interesting_tag(tag) { tag } else { 0 },
                children: has_children,
                declaration_always,
                cmd_start,
            });
        }

        Ok(AbbrevTable {
            decls,
            cmds: compiler.cmds,
        })
    }

    /// Replay the compiled command stream for `code`, reading captured
    /// attribute values from `die` (positioned immediately after the
    /// abbreviation code ULEB) and resolving string-form attributes against
    /// `debug_info`/`debug_str`.
    pub fn execute<'a>(
        &self,
        code: u64,
        die: &mut Reader<'a>,
        cu_offset: usize,
        debug_str: &'a [u8],
    ) -> Result<DieAttrs<'a>> {
        let idx = code
            .checked_sub(1)
            .and_then(|i| usize::try_from(i).ok())
            .filter(|&i| i < self.decls.len())
            .ok_or_else(|| Error::DwarfFormatError("abbreviation code out of range".into()))?;
        let decl = &self.decls[idx];

        let mut attrs = DieAttrs {
            tag: decl.tag,
            children: decl.children,
            declaration: decl.declaration_always,
            ..Default::default()
        };

        let mut pc = decl.cmd_start;
        loop {
            let op = self.cmds[pc];
            pc += 1;
            match op {
                CMD_END => break,
                1..=CMD_MAX_SKIP => die.skip(op as usize)?,
                ATTRIB_BLOCK1 => {
                    let len = die.read_u8()? as usize;
                    die.skip(len)?;
                }
                ATTRIB_BLOCK2 => {
                    let len = die.read_u16()? as usize;
                    die.skip(len)?;
                }
                ATTRIB_BLOCK4 => {
                    let len = die.read_u32()? as usize;
                    die.skip(len)?;
                }
                ATTRIB_EXPRLOC => {
                    let len = crate::reader::to_usize(die.read_uleb128()?)?;
                    die.skip(len)?;
                }
                ATTRIB_LEB128 => {
                    die.read_uleb128()?;
                }
                ATTRIB_STRING => {
                    die.read_cstr()?;
                }
                ATTRIB_NAME_STRING => {
                    attrs.name = Some(die.read_cstr()?);
                }
                ATTRIB_NAME_STRP4 => {
                    let off = crate::reader::to_usize(die.read_u32()? as u64)?;
                    attrs.name = Some(read_strp(debug_str, off)?);
                }
                ATTRIB_NAME_STRP8 => {
                    let off = crate::reader::to_usize(die.read_u64()?)?;
                    attrs.name = Some(read_strp(debug_str, off)?);
                }
                ATTRIB_SIBLING_REF1 => attrs.sibling = Some(cu_ref(cu_offset, die.read_u8()? as u64)?),
                ATTRIB_SIBLING_REF2 => attrs.sibling = Some(cu_ref(cu_offset, die.read_u16()? as u64)?),
                ATTRIB_SIBLING_REF4 => attrs.sibling = Some(cu_ref(cu_offset, die.read_u32()? as u64)?),
                ATTRIB_SIBLING_REF8 => attrs.sibling = Some(cu_ref(cu_offset, die.read_u64()?)?),
                ATTRIB_SIBLING_REF_UDATA => {
                    attrs.sibling = Some(cu_ref(cu_offset, die.read_uleb128()?)?)
                }
                ATTRIB_STMT_LIST_LINEPTR4 => attrs.stmt_list = Some(die.read_u32()? as u64),
                ATTRIB_STMT_LIST_LINEPTR8 => attrs.stmt_list = Some(die.read_u64()?),
                ATTRIB_DECL_FILE_DATA1 => attrs.decl_file = Some(die.read_u8()? as u64),
                ATTRIB_DECL_FILE_DATA2 => attrs.decl_file = Some(die.read_u16()? as u64),
                ATTRIB_DECL_FILE_DATA4 => attrs.decl_file = Some(die.read_u32()? as u64),
                ATTRIB_DECL_FILE_DATA8 => attrs.decl_file = Some(die.read_u64()?),
                ATTRIB_DECL_FILE_UDATA => attrs.decl_file = Some(die.read_uleb128()?),
                ATTRIB_SPECIFICATION_REF1 => {
                    attrs.specification = Some(cu_ref(cu_offset, die.read_u8()? as u64)?)
                }
                ATTRIB_SPECIFICATION_REF2 => {
                    attrs.specification = Some(cu_ref(cu_offset, die.read_u16()? as u64)?)
                }
                ATTRIB_SPECIFICATION_REF4 => {
                    attrs.specification = Some(cu_ref(cu_offset, die.read_u32()? as u64)?)
                }
                ATTRIB_SPECIFICATION_REF8 => {
                    attrs.specification = Some(cu_ref(cu_offset, die.read_u64()?)?)
                }
                ATTRIB_SPECIFICATION_REF_UDATA => {
                    attrs.specification = Some(cu_ref(cu_offset, die.read_uleb128()?)?)
                }
                ATTRIB_DECLARATION_FLAG => {
                    attrs.declaration = die.read_u8()? != 0;
                }
                _ => unreachable!("closed opcode set"),
            }
        }
        Ok(attrs)
    }
}

/// `DW_FORM_ref*` values are offsets relative to the start of the owning
/// CU's header.
fn cu_ref(cu_offset: usize, value: u64) -> Result<usize> {
    let value = crate::reader::to_usize(value)?;
    cu_offset.checked_add(value).ok_or(Error::Eof)
}

fn read_strp(debug_str: &[u8], offset: usize) -> Result<&[u8]> {
    let bytes = debug_str.get(offset..).ok_or(Error::Eof)?;
    let nul = bytes
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::DwarfFormatError(".debug_str entry not NUL-terminated".into()))?;
    Ok(&bytes[..nul])
}
