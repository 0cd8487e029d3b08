//! Compilation unit header scanning (component D).

use crate::error::{Error, Result};
use crate::reader::Reader;

/// One compilation unit header parsed out of `.debug_info`.
#[derive(Debug, Clone, Copy)]
pub struct CompilationUnit {
    /// Index of the owning `File` within the `Index`'s file list.
    pub file: usize,
    /// Byte offset of this CU's header (the `unit_length` field) within
    /// `.debug_info`.
    pub offset: usize,
    /// Byte offset immediately after the header, where the first DIE
    /// begins.
    pub die_offset: usize,
    /// Length of the unit *excluding* the initial length field itself.
    pub unit_length: u64,
    pub version: u16,
    pub debug_abbrev_offset: u64,
    pub address_size: u8,
    pub is_64_bit: bool,
}

impl CompilationUnit {
    /// Exclusive end offset of this CU's body within `.debug_info`.
    pub fn end_offset(&self) -> usize {
        let header_len = if self.is_64_bit { 12 } else { 4 };
        self.offset + header_len + self.unit_length as usize
    }
}

/// Parse every CU header out of `debug_info`, in order.
pub fn scan_compilation_units(file: usize, debug_info: &[u8]) -> Result<Vec<CompilationUnit>> {
    let mut cus = Vec::new();
    let mut r = Reader::new(debug_info);
    while !r.is_empty() {
        let offset = r.pos();
        let mut unit_length = r.read_u32()? as u64;
        let is_64_bit = unit_length == 0xffff_ffff;
        if is_64_bit {
            unit_length = r.read_u64()?;
        } else if unit_length >= 0xffff_fff0 {
            return Err(Error::DwarfFormatError("reserved unit_length value".into()));
        }

        let version = r.read_u16()?;
        if !(2..=4).contains(&version) {
            return Err(Error::DwarfFormatError(format!(
                "unsupported DWARF version {version}"
            )));
        }

        let debug_abbrev_offset = if is_64_bit {
            r.read_u64()?
        } else {
            r.read_u32()? as u64
        };
        let address_size = r.read_u8()?;

        let die_offset = r.pos();
        let cu = CompilationUnit {
            file,
            offset,
            die_offset,
            unit_length,
            version,
            debug_abbrev_offset,
            address_size,
            is_64_bit,
        };
        r.seek(cu.end_offset())?;
        cus.push(cu);
    }
    Ok(cus)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cu32(abbrev_offset: u32, addr_size: u8, body: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        let unit_length = 2 + 4 + 1 + body.len();
        buf.extend_from_slice(&(unit_length as u32).to_le_bytes());
        buf.extend_from_slice(&3u16.to_le_bytes());
        buf.extend_from_slice(&abbrev_offset.to_le_bytes());
        buf.push(addr_size);
        buf.extend_from_slice(body);
        buf
    }

    #[test]
    fn scans_single_32bit_cu() {
        let body = [0x01, 0x00]; // abbrev code 1, terminator
        let buf = cu32(0, 8, &body);
        let cus = scan_compilation_units(0, &buf).unwrap();
        assert_eq!(cus.len(), 1);
        assert_eq!(cus[0].version, 3);
        assert_eq!(cus[0].address_size, 8);
        assert!(!cus[0].is_64_bit);
        assert_eq!(cus[0].end_offset(), buf.len());
    }

    #[test]
    fn rejects_bad_version() {
        let mut buf = cu32(0, 8, &[]);
        buf[4] = 99; // stomp version low byte
        assert!(matches!(
            scan_compilation_units(0, &buf),
            Err(Error::DwarfFormatError(_))
        ));
    }

    #[test]
    fn scans_two_consecutive_cus() {
        let mut buf = cu32(0, 8, &[0x00]);
        buf.extend(cu32(10, 4, &[0x00]));
        let cus = scan_compilation_units(0, &buf).unwrap();
        assert_eq!(cus.len(), 2);
        assert_eq!(cus[1].debug_abbrev_offset, 10);
        assert_eq!(cus[1].address_size, 4);
    }
}
