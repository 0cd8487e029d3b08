//! Relocation application (component C).
//!
//! Every `(debug_section, rela_section)` pair across every loaded file is
//! treated as one flat work set and applied in parallel; see
//! `SPEC_FULL.md` §5. Relocation targets within a single section never
//! overlap, and distinct sections of the same file never overlap either, so
//! concurrent workers touching the same `mmap` region is sound even though
//! it requires a raw pointer to get past the borrow checker's
//! whole-slice-at-a-time view of `&mut [u8]`.

use rayon::prelude::*;
use scroll::Pread;

use crate::elf::consts::*;
use crate::elf::file::{File, Slice};
use crate::error::{Error, Result};
use crate::sync::ErrorSlot;

struct Job {
    base: *mut u8,
    len: usize,
    debug: Slice,
    rela: Slice,
    symtab: Slice,
    path_for_errors: std::rc::Rc<std::path::PathBuf>,
}

// SAFETY: each `Job`'s `debug` slice is disjoint from every other job's,
// either because they belong to different files entirely or because
// sections within one ELF file never overlap (enforced by the loader).
unsafe impl Send for Job {}
unsafe impl Sync for Job {}

pub fn apply_relocations(files: &mut [File]) -> Result<()> {
    let mut jobs = Vec::new();
    for file in files.iter_mut() {
        let symtab = match file.sections.symtab {
            Some(s) => s,
            None => continue,
        };
        let path = std::rc::Rc::new(file.path.clone());
        let len = file.bytes().len();
        let base = file.bytes_mut().as_mut_ptr();
        for (debug, rela) in file.sections.rela_pairs() {
            jobs.push(Job {
                base,
                len,
                debug,
                rela,
                symtab,
                path_for_errors: path.clone(),
            });
        }
    }

    let errors = ErrorSlot::new();
    jobs.par_iter().for_each(|job| {
        if errors.is_set() {
            return;
        }
        if let Err(e) = apply_job(job) {
            log::warn!("{}: relocation failed: {}", job.path_for_errors.display(), e);
            errors.set(e);
        }
    });
    errors.into_result()
}

fn apply_job(job: &Job) -> Result<()> {
    // SAFETY: `base..base+len` is the file's full mmap extent; `debug`,
    // `rela`, and `symtab` are all sub-ranges validated against `len` by
    // the loader.
    let whole = unsafe { std::slice::from_raw_parts(job.base, job.len) };
    let rela_bytes = whole
        .get(job.rela.offset..job.rela.offset + job.rela.size)
        .ok_or(Error::Eof)?;
    let symtab_bytes = whole
        .get(job.symtab.offset..job.symtab.offset + job.symtab.size)
        .ok_or(Error::Eof)?;

    let num_relocs = rela_bytes.len() / SIZEOF_RELA;
    let num_syms = symtab_bytes.len() / SIZEOF_SYM;

    for i in 0..num_relocs {
        let rela: Rela = rela_bytes.pread_with(i * SIZEOF_RELA, scroll::LE)?;
        if rela.r_type() == R_X86_64_NONE {
            continue;
        }
        let sym_idx = rela.r_sym() as usize;
        if sym_idx >= num_syms {
            return Err(Error::ElfFormatError("relocation symbol index out of range".into()));
        }
        let sym: Sym = symtab_bytes.pread_with(sym_idx * SIZEOF_SYM, scroll::LE)?;
        let value = (sym.st_value as i64).wrapping_add(rela.r_addend) as u64;

        let target_offset = job
            .debug
            .offset
            .checked_add(crate::reader::to_usize(rela.r_offset)?)
            .ok_or(Error::Eof)?;

        match rela.r_type() {
            R_X86_64_32 => {
                let bytes = (value as u32).to_le_bytes();
                write_at(job, target_offset, &bytes)?;
            }
            R_X86_64_64 => {
                let bytes = value.to_le_bytes();
                write_at(job, target_offset, &bytes)?;
            }
            other => {
                return Err(Error::NotImplemented(format!(
                    "relocation type {other}"
                )));
            }
        }
    }
    Ok(())
}

fn write_at(job: &Job, offset: usize, bytes: &[u8]) -> Result<()> {
    let end = offset.checked_add(bytes.len()).ok_or(Error::Eof)?;
    let debug_end = job
        .debug
        .offset
        .checked_add(job.debug.size)
        .ok_or(Error::Eof)?;
    if offset < job.debug.offset || end > debug_end {
        return Err(Error::ElfFormatError(
            "relocation r_offset out of bounds of its target section".into(),
        ));
    }
    // SAFETY: bounds checked above against the `debug` section's own
    // extent, which no other job's section overlaps.
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), job.base.add(offset), bytes.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn r_x86_64_32_applies_value_plus_addend() {
        // exercised end-to-end in tests/index.rs with a synthetic ELF file;
        // this just pins the byte arithmetic used above.
        let value: u64 = 0x1000u64.wrapping_add(4u64);
        assert_eq!((value as u32).to_le_bytes(), [0x04, 0x10, 0x00, 0x00]);
    }
}
