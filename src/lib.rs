//! A fast, parallel, name-indexed reader for DWARF debugging information in
//! ELF64 object files.
//!
//! Given a set of object files, [`index::Index::add`] discovers their
//! `.debug_{abbrev,info,line,str}` sections, applies relocations, and walks
//! every compilation unit, inserting a handful of "interesting" DIE tags
//! (base types, structures, enumerators, typedefs, variables, and so on)
//! into a lock-free name hash table. [`index::Index::find`] looks entries
//! up by name and hands the raw `(file, cu_offset, die_offset)` location to
//! a caller-supplied [`index::DieResolver`] to materialize richer objects.
//!
//! ```no_run
//! use dwindex::index::{Index, RawResolver};
//!
//! let mut index = Index::new(RawResolver);
//! index.add(["a.o", "b.o"])?;
//! for m in index.find("my_struct", None)? {
//!     println!("{}: cu {:#x} die {:#x}", m.file.display(), m.cu_offset, m.die_offset);
//! }
//! # Ok::<(), dwindex::error::Error>(())
//! ```

pub mod dwarf;
pub mod elf;
pub mod error;
pub mod index;
pub mod reader;
pub mod sync;

pub use error::{Error, Result};
