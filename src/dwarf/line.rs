//! Line-program file-name hashing (component F).
//!
//! The line-number program itself is never interpreted; only its header's
//! include-directory and file-name tables are read, to build a stable
//! per-file fingerprint used as `DieHashEntry::file_name_hash`. Directory
//! paths are canonicalized (dropping `.`, resolving `..`, collapsing
//! trailing slashes) before hashing so that two differently-spelled paths
//! to the same file compare equal.

use std::hash::Hasher;

use siphasher::sip::SipHasher13;

use crate::error::{Error, Result};
use crate::reader::Reader;

/// Per-CU table of file-identity hashes, one per line-program file-name
/// table entry.
pub struct FileNameTable {
    hashes: Vec<u64>,
}

impl FileNameTable {
    /// Resolve a DWARF `decl_file` index (0 meaning "no file") to its
    /// canonical hash.
    pub fn hash(&self, decl_file: u64) -> Result<u64> {
        if decl_file == 0 {
            return Ok(0);
        }
        let idx = (decl_file - 1) as usize;
        self.hashes
            .get(idx)
            .copied()
            .ok_or_else(|| Error::DwarfFormatError("decl_file index out of range".into()))
    }
}

/// Parse the line-program header at `offset` within `debug_line` and hash
/// its file-name table.
pub fn parse_file_name_table(debug_line: &[u8], offset: usize) -> Result<FileNameTable> {
    let mut r = Reader::at(debug_line, offset)?;

    let mut unit_length = r.read_u32()? as u64;
    let is_64_bit = unit_length == 0xffff_ffff;
    if is_64_bit {
        unit_length = r.read_u64()?;
    }
    let unit_end = r
        .pos()
        .checked_add(crate::reader::to_usize(unit_length)?)
        .ok_or(Error::Eof)?;

    let version = r.read_u16()?;
    if !(2..=4).contains(&version) {
        return Err(Error::DwarfFormatError(format!(
            "unsupported line program version {version}"
        )));
    }

    let _header_length = if is_64_bit { r.read_u64()? } else { r.read_u32()? as u64 };
    let _minimum_instruction_length = r.read_u8()?;
    if version == 4 {
        let _maximum_operations_per_instruction = r.read_u8()?;
    }
    let _default_is_stmt = r.read_u8()?;
    let _line_base = r.read_u8()? as i8;
    let _line_range = r.read_u8()?;
    let opcode_base = r.read_u8()?;
    for _ in 0..opcode_base.saturating_sub(1) {
        r.read_u8()?;
    }

    let mut dir_hashers: Vec<SipHasher13> = Vec::new();
    loop {
        let dir = r.read_cstr()?;
        if dir.is_empty() {
            break;
        }
        if r.pos() > unit_end {
            return Err(Error::DwarfFormatError("line program header truncated".into()));
        }
        dir_hashers.push(hash_directory(dir));
    }

    let mut file_hashes = Vec::new();
    loop {
        let name = r.read_cstr()?;
        if name.is_empty() {
            break;
        }
        let dir_index = r.read_uleb128()?;
        let _mtime = r.read_uleb128()?;
        let _size = r.read_uleb128()?;

        let mut hasher = if dir_index == 0 {
            SipHasher13::new_with_keys(0, 0)
        } else {
            let idx = (dir_index - 1) as usize;
            dir_hashers
                .get(idx)
                .cloned()
                .ok_or_else(|| Error::DwarfFormatError("missing include directory".into()))?
        };
        hasher.write(name);
        file_hashes.push(hasher.finish());
    }

    Ok(FileNameTable {
        hashes: file_hashes,
    })
}

/// Canonicalize `path` with a single right-to-left scan and return the
/// resulting hasher state, ready to have a basename fed into it.
///
/// Trailing slashes are dropped, `.` components are dropped, and `..`
/// components consume the nearest ordinary component to their left (found
/// while scanning backward); any `..` left over once the scan reaches the
/// start of the path is re-emitted (one `../` each) unless the path is
/// absolute, in which case a single leading `/` is emitted instead.
fn hash_directory(path: &[u8]) -> SipHasher13 {
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    let absolute = path.first() == Some(&b'/');

    let mut end = path.len();
    while end > 0 && path[end - 1] == b'/' {
        end -= 1;
    }

    let mut pending_dotdot: u32 = 0;
    while end > 0 {
        let mut start = end;
        while start > 0 && path[start - 1] != b'/' {
            start -= 1;
        }
        let component = &path[start..end];
        match component {
            b"." | b"" => {}
            b".." => pending_dotdot += 1,
            _ => {
                if pending_dotdot > 0 {
                    pending_dotdot -= 1;
                } else {
                    hasher.write(component);
                    hasher.write(b"/");
                }
            }
        }
        end = start;
        while end > 0 && path[end - 1] == b'/' {
            end -= 1;
        }
    }

    if absolute {
        hasher.write(b"/");
    } else {
        for _ in 0..pending_dotdot {
            hasher.write(b"../");
        }
    }
    hasher
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finish(path: &[u8]) -> u64 {
        hash_directory(path).finish()
    }

    #[test]
    fn dot_components_are_dropped() {
        assert_eq!(finish(b"./a/b"), finish(b"a/b"));
        assert_eq!(finish(b"a/./b"), finish(b"a/b"));
    }

    #[test]
    fn trailing_slashes_are_ignored() {
        assert_eq!(finish(b"a/b/"), finish(b"a/b"));
        assert_eq!(finish(b"a/b//"), finish(b"a/b"));
    }

    #[test]
    fn dotdot_consumes_preceding_component() {
        assert_eq!(finish(b"a/b/../c"), finish(b"a/c"));
        assert_eq!(finish(b"a/b/c/../.."), finish(b"a"));
    }

    #[test]
    fn leading_dotdot_is_preserved_when_relative() {
        assert_ne!(finish(b"../a"), finish(b"a"));
        assert_eq!(finish(b"../a"), finish(b"../a"));
    }

    #[test]
    fn absolute_paths_differ_from_relative() {
        assert_ne!(finish(b"/a/b"), finish(b"a/b"));
    }

    fn header_bytes(dirs: &[&[u8]], files: &[(&[u8], u64)]) -> Vec<u8> {
        let mut body = Vec::new();
        body.push(1u8); // minimum_instruction_length
        body.push(1u8); // maximum_operations_per_instruction (version 4)
        body.push(1u8); // default_is_stmt
        body.push(0xfbu8); // line_base = -5
        body.push(14u8); // line_range
        body.push(1u8); // opcode_base (0 standard opcode length bytes follow)
        for d in dirs {
            body.extend_from_slice(d);
            body.push(0);
        }
        body.push(0); // end of directories
        for (name, dir_index) in files {
            body.extend_from_slice(name);
            body.push(0);
            body.push(*dir_index as u8); // dir index (small values only, test-only encoding)
            body.push(0); // mtime
            body.push(0); // size
        }
        body.push(0); // end of files

        let mut buf = Vec::new();
        let unit_length = 2 + 4 + body.len(); // version + header_length + body
        buf.extend_from_slice(&(unit_length as u32).to_le_bytes());
        buf.extend_from_slice(&4u16.to_le_bytes()); // version 4
        buf.extend_from_slice(&(body.len() as u32).to_le_bytes()); // header_length
        buf.extend_from_slice(&body);
        buf
    }

    #[test]
    fn two_spellings_of_same_file_hash_equal() {
        let a = header_bytes(&[b"./a/b"], &[(b"s.h", 1)]);
        let b = header_bytes(&[b"a/b/"], &[(b"s.h", 1)]);
        let ta = parse_file_name_table(&a, 0).unwrap();
        let tb = parse_file_name_table(&b, 0).unwrap();
        assert_eq!(ta.hash(1).unwrap(), tb.hash(1).unwrap());
    }

    #[test]
    fn decl_file_zero_is_always_zero() {
        let buf = header_bytes(&[b"a"], &[(b"s.h", 1)]);
        let table = parse_file_name_table(&buf, 0).unwrap();
        assert_eq!(table.hash(0).unwrap(), 0);
    }

    #[test]
    fn decl_file_out_of_range_errors() {
        let buf = header_bytes(&[b"a"], &[(b"s.h", 1)]);
        let table = parse_file_name_table(&buf, 0).unwrap();
        assert!(matches!(table.hash(5), Err(Error::DwarfFormatError(_))));
    }
}
