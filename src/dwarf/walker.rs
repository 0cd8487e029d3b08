//! DIE walker and indexer (component G).
//!
//! Walks one compilation unit's DIE tree, replaying each DIE's compiled
//! abbreviation command stream, and inserts the handful of "interesting"
//! tags into the shared name hash table. This is the function `rayon`
//! schedules one-per-CU across the worker pool.

use crate::dwarf::abbrev::{AbbrevTable, DieAttrs};
use crate::dwarf::consts::*;
use crate::dwarf::cu::CompilationUnit;
use crate::dwarf::line::{parse_file_name_table, FileNameTable};
use crate::elf::File;
use crate::error::{Error, Result};
use crate::index::table::{pack_loc, DieHashTable};
use crate::reader::{to_usize, Reader};

fn offset_in_file(file: &File, s: &[u8]) -> u32 {
    let base = file.bytes().as_ptr() as usize;
    let ptr = s.as_ptr() as usize;
    (ptr - base) as u32
}

/// Parse exactly one DIE at `offset` (used only for the bounded
/// `DW_AT_specification` backfill below; never followed more than once).
fn read_one_die<'a>(
    debug_info: &'a [u8],
    debug_str: &'a [u8],
    abbrev: &AbbrevTable,
    cu_offset: usize,
    offset: usize,
) -> Result<DieAttrs<'a>> {
    let mut r = Reader::at(debug_info, offset)?;
    let code = r.read_uleb128()?;
    abbrev.execute(code, &mut r, cu_offset, debug_str)
}

/// Walk `cu`'s DIE tree and insert every qualifying DIE into `table`.
/// Returns the CU's `address_size`, which the index surfaces as a
/// diagnostic (the upstream indexer overwrites this on every CU; it is
/// never used internally for a parsing decision).
pub fn index_cu(
    files: &[File],
    cu_index: u32,
    cu: &CompilationUnit,
    table: &DieHashTable,
) -> Result<u8> {
    let file = &files[cu.file];
    let debug_info = file.slice(file.sections.info.unwrap());
    let debug_str = file.slice(file.sections.str_.unwrap());
    let debug_line = file.slice(file.sections.line.unwrap());
    let debug_abbrev = file.slice(file.sections.abbrev.unwrap());

    let abbrev = AbbrevTable::compile(debug_abbrev, cu)?;

    let mut r = Reader::at(debug_info, cu.die_offset)?;
    let cu_end = cu.end_offset();
    let mut depth: u32 = 0;
    let mut enum_ptr: Option<usize> = None;
    let mut file_table: Option<FileNameTable> = None;

    while r.pos() < cu_end {
        let die_start = r.pos();
        let code = r.read_uleb128()?;
        if code == 0 {
            if depth > 0 {
                depth -= 1;
                if depth == 0 {
                    enum_ptr = None;
                }
            }
            continue;
        }

        let attrs = abbrev.execute(code, &mut r, cu.offset, debug_str)?;

        if attrs.tag == DW_TAG_compile_unit && depth == 0 {
            if let Some(stmt_list) = attrs.stmt_list {
                file_table = Some(parse_file_name_table(debug_line, to_usize(stmt_list)?)?);
            }
        } else if attrs.tag != 0 && !attrs.declaration {
            let mut insert_ptr = die_start;
            let mut do_insert = true;

            if depth == 1 && attrs.tag == DW_TAG_enumeration_type {
                enum_ptr = Some(die_start);
            } else if depth == 2 && attrs.tag == DW_TAG_enumerator {
                match enum_ptr {
                    Some(ep) => insert_ptr = ep,
                    None => do_insert = false,
                }
            } else if depth != 1 {
                do_insert = false;
            }

            if do_insert {
                let mut name = attrs.name;
                let mut decl_file = attrs.decl_file;
                if attrs.specification.is_some() && (name.is_none() || decl_file.is_none()) {
                    if let Some(spec_off) = attrs.specification {
                        let spec_attrs =
                            read_one_die(debug_info, debug_str, &abbrev, cu.offset, spec_off)?;
                        name = name.or(spec_attrs.name);
                        decl_file = decl_file.or(spec_attrs.decl_file);
                    }
                }

                if let Some(name) = name {
                    let decl_file_val = decl_file.unwrap_or(0);
                    let file_hash = match &file_table {
                        Some(ft) => ft.hash(decl_file_val)?,
                        None if decl_file_val == 0 => 0,
                        None => {
                            return Err(Error::DwarfFormatError(
                                "decl_file set without a line program".into(),
                            ))
                        }
                    };

                    let name_loc = pack_loc(cu.file as u32, offset_in_file(file, name));
                    let ptr_loc = pack_loc(cu.file as u32, insert_ptr as u32);
                    table.insert(
                        files,
                        name,
                        name_loc,
                        attrs.tag as u8,
                        file_hash,
                        cu_index,
                        ptr_loc,
                    )?;
                }
            }
        }

        if attrs.children {
            match attrs.sibling {
                Some(sib) => r.seek(sib)?,
                None => depth += 1,
            }
        }
    }

    Ok(cu.address_size)
}
