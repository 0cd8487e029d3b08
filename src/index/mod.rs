//! The query surface (component I): `Index::add`/`find`, and the
//! `DieResolver` seam external collaborators plug into to turn a raw
//! `(file, cu_offset, die_offset)` match into a richer object.

pub mod table;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

use rayon::prelude::*;

use crate::dwarf::cu::{scan_compilation_units, CompilationUnit};
use crate::dwarf::walker::index_cu;
use crate::elf::{apply_relocations, File};
use crate::error::{Error, Result};
use crate::sync::ErrorSlot;
use table::{unpack_loc, DieHashTable};

/// Materializes richer objects from the raw triples this index produces.
/// Left entirely to the caller: this crate never interprets CU or DIE
/// contents beyond what it needs for indexing.
pub trait DieResolver {
    type Cu: Clone;
    type Die;

    fn compilation_unit(&self, file: &Path, cu_offset: u64) -> Result<Self::Cu>;
    fn die(&self, cu: &Self::Cu, die_offset: u64) -> Result<Self::Die>;
}

/// A resolver that does nothing beyond handing back the raw offsets,
/// useful for tests and for callers who only want locations.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawResolver;

impl DieResolver for RawResolver {
    type Cu = u64;
    type Die = u64;

    fn compilation_unit(&self, _file: &Path, cu_offset: u64) -> Result<u64> {
        Ok(cu_offset)
    }

    fn die(&self, _cu: &u64, die_offset: u64) -> Result<u64> {
        Ok(die_offset)
    }
}

/// One resolved match returned by [`Index::find`].
pub struct DieMatch<R: DieResolver> {
    pub file: PathBuf,
    pub cu_offset: u64,
    pub die_offset: u64,
    pub tag: u8,
    pub file_name_hash: u64,
    pub cu: R::Cu,
    pub die: R::Die,
}

/// The name-indexed view over a set of ELF64 object files' DWARF
/// debugging information.
pub struct Index<R: DieResolver> {
    resolver: R,
    files: Vec<File>,
    cus: Vec<CompilationUnit>,
    table: DieHashTable,
    address_size: AtomicU8,
    cu_cache: Mutex<HashMap<(usize, u64), R::Cu>>,
}

impl<R: DieResolver> Index<R> {
    pub fn new(resolver: R) -> Self {
        Index {
            resolver,
            files: Vec::new(),
            cus: Vec::new(),
            table: DieHashTable::new(),
            address_size: AtomicU8::new(0),
            cu_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Paths of the files successfully indexed so far. Files that were
    /// valid ELF64 but lacked a required debug section are silently
    /// skipped and never appear here.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|f| f.path.as_path())
    }

    /// Address size of whatever CU was indexed most recently; diagnostic
    /// only, and not meaningful when CUs disagree (the upstream indexer
    /// has the same property, since it has no real use for the value
    /// beyond surfacing it to callers).
    pub fn address_size(&self) -> u8 {
        self.address_size.load(Ordering::Relaxed)
    }

    /// Load, relocate, and index every object file in `paths`.
    ///
    /// Before CU indexing starts, a failure (bad ELF, bad relocation, a
    /// malformed CU header) leaves the index exactly as it was: nothing is
    /// committed to `self`. Once CU indexing starts, failures are *not*
    /// rolled back — the worker pool has already published entries into
    /// the shared hash table, and undoing that would require tracking
    /// every insertion, which this index deliberately does not do. Callers
    /// that need atomicity across files should build a fresh `Index` per
    /// attempt.
    pub fn add<P: AsRef<Path>>(&mut self, paths: impl IntoIterator<Item = P>) -> Result<()> {
        let mut new_files = Vec::new();
        for path in paths {
            let path = path.as_ref();
            match File::open(path)? {
                Some(file) => new_files.push(file),
                None => log::info!("{}: skipped, missing a required section", path.display()),
            }
        }

        apply_relocations(&mut new_files)?;

        for file in &new_files {
            let debug_str = file.slice(file.sections.str_.expect("checked by File::open"));
            if debug_str.last() != Some(&0) {
                return Err(Error::DwarfFormatError(format!(
                    "{}: .debug_str is not NUL-terminated",
                    file.path.display()
                )));
            }
        }

        let base_file_id = self.files.len();
        let mut new_cus = Vec::new();
        for (i, file) in new_files.iter().enumerate() {
            let info = file.slice(file.sections.info.expect("checked by File::open"));
            new_cus.extend(scan_compilation_units(base_file_id + i, info)?);
        }

        // Commit. Past this point a failure is surfaced but not undone.
        self.files.extend(new_files);
        let base_cu_id = self.cus.len();
        self.cus.extend(new_cus);

        let files = &self.files;
        let table = &self.table;
        let address_size = &self.address_size;
        let errors = ErrorSlot::new();

        self.cus[base_cu_id..]
            .par_iter()
            .enumerate()
            .for_each(|(i, cu)| {
                if errors.is_set() {
                    return;
                }
                match index_cu(files, (base_cu_id + i) as u32, cu, table) {
                    Ok(sz) => address_size.store(sz, Ordering::Relaxed),
                    Err(e) => {
                        log::warn!(
                            "{}: CU at offset {:#x}: {}",
                            files[cu.file].path.display(),
                            cu.offset,
                            e
                        );
                        errors.set(e);
                    }
                }
            });

        errors.into_result()
    }

    /// Look up every DIE named `name`, optionally restricted to a single
    /// DWARF tag (`None` matches any of the indexed tags).
    pub fn find(&self, name: &str, tag: Option<u8>) -> Result<Vec<DieMatch<R>>> {
        let raw = self.table.find(&self.files, name.as_bytes(), tag.unwrap_or(0));
        if raw.is_empty() {
            return Err(Error::NotFound);
        }

        let mut cache = self.cu_cache.lock().unwrap();
        let mut results = Vec::with_capacity(raw.len());
        for entry in raw {
            let cu = &self.cus[entry.cu as usize];
            let file_path = self.files[cu.file].path.clone();
            let cu_offset = cu.offset as u64;

            let (ptr_file, ptr_offset) = unpack_loc(entry.ptr);
            debug_assert_eq!(ptr_file as usize, cu.file);
            let die_offset = (ptr_offset as u64).saturating_sub(cu.offset as u64);

            let key = (cu.file, cu_offset);
            let cu_handle = match cache.get(&key) {
                Some(h) => h.clone(),
                None => {
                    let h = self.resolver.compilation_unit(&file_path, cu_offset)?;
                    cache.insert(key, h.clone());
                    h
                }
            };
            let die_handle = self.resolver.die(&cu_handle, die_offset)?;

            results.push(DieMatch {
                file: file_path,
                cu_offset,
                die_offset,
                tag: entry.tag,
                file_name_hash: entry.file_name_hash,
                cu: cu_handle,
                die: die_handle,
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_index_find_is_not_found() {
        let index = Index::new(RawResolver);
        assert!(matches!(index.find("anything", None), Err(Error::NotFound)));
    }

    #[test]
    fn add_skips_nonexistent_path_as_io_error() {
        let mut index = Index::new(RawResolver);
        let result = index.add(["/nonexistent/path/does/not/exist.o"]);
        assert!(matches!(result, Err(Error::Io { .. })));
        assert_eq!(index.files().count(), 0);
    }
}
