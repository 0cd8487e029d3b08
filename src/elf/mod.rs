//! ELF64 loading, section discovery, and relocation (components B and C).

pub mod consts;
pub mod file;
pub mod reloc;

pub use file::{DebugSections, File, Slice};
pub use reloc::apply_relocations;
