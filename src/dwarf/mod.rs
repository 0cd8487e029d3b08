//! DWARF parsing: compilation unit headers, the abbreviation compiler, the
//! line-program file-name hasher, and the DIE walker (components D–G).

pub mod abbrev;
pub mod consts;
pub mod cu;
pub mod line;
pub mod walker;
