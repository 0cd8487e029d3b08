//! Crate-wide error type.
//!
//! Every fallible operation in this crate returns [`Result`]. Parallel phases
//! (relocation, CU indexing) collapse to the first error observed across all
//! workers; see `index::table` and `elf::reloc` for the aggregation protocol.

use std::path::PathBuf;

/// The error type returned by every fallible operation in this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A read ran past the end of a section, or an offset overflowed the
    /// target integer width.
    #[error("unexpected end of data")]
    Eof,

    /// The ELF container itself is malformed or uses a feature this crate
    /// does not parse (wrong magic, bad section table, broken rela linkage).
    #[error("malformed ELF: {0}")]
    ElfFormatError(String),

    /// The DWARF content is malformed: unknown form, non-sequential abbrev
    /// codes, bad `decl_file` index, un-terminated `.debug_str`, and so on.
    #[error("malformed DWARF: {0}")]
    DwarfFormatError(String),

    /// A feature that exists in the format but that this index deliberately
    /// does not support (32-bit ELF, `DW_FORM_indirect`, non-x86_64
    /// relocations, big-endian input).
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// `find` produced no matches.
    #[error("no matching entries")]
    NotFound,

    /// The name hash table is full, or some other allocation failed.
    #[error("out of memory")]
    OutOfMemory,

    /// Failed to open or map a file.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<scroll::Error> for Error {
    fn from(err: scroll::Error) -> Self {
        match err {
            scroll::Error::TooBig { .. } | scroll::Error::BadOffset(_) => Error::Eof,
            other => Error::ElfFormatError(other.to_string()),
        }
    }
}

pub type Result<T> = ::std::result::Result<T, Error>;
