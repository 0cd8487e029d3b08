//! The lock-free name hash table (component H).
//!
//! A fixed 2^17-slot open-addressed table keyed by a DJBX33A hash of the
//! DIE name. Insertion is the only concurrent operation: workers race to
//! claim a slot with a relaxed CAS on its `name` handle, publish the rest
//! of the entry with plain stores, then release-store `tag` to make the
//! entry visible. Readers (duplicate detection during insert, and lookups
//! after indexing completes) acquire-load `tag` before touching anything
//! else, which is sound precisely because the publishing store is the last
//! one a writer performs.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::elf::File;
use crate::error::{Error, Result};

pub const TABLE_BITS: u32 = 17;
pub const TABLE_SIZE: usize = 1 << TABLE_BITS;

const EMPTY_NAME: u64 = u64::MAX;

/// A `(file index, byte offset)` pair packed into a `u64`, standing in for
/// a borrowed pointer into one file's mapped bytes. See `SPEC_FULL.md`'s
/// Design Notes for why this replaces the raw `*const u8` the format this
/// crate indexes would suggest.
pub type DieLoc = u64;

pub fn pack_loc(file: u32, offset: u32) -> DieLoc {
    ((file as u64) << 32) | offset as u64
}

pub fn unpack_loc(loc: DieLoc) -> (u32, u32) {
    ((loc >> 32) as u32, loc as u32)
}

/// Resolve a `DieLoc` to the NUL-terminated byte string it points at.
pub fn resolve_cstr(files: &[File], loc: DieLoc) -> &[u8] {
    let (file, offset) = unpack_loc(loc);
    let bytes = files[file as usize].bytes();
    let start = offset as usize;
    let rest = &bytes[start..];
    let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    &rest[..end]
}

struct Slot {
    name: AtomicU64,
    tag: AtomicU8,
    file_name_hash: std::cell::UnsafeCell<u64>,
    cu: std::cell::UnsafeCell<u32>,
    ptr: std::cell::UnsafeCell<DieLoc>,
}

// SAFETY: the `UnsafeCell` fields are written exactly once, by whichever
// thread wins the CAS on `name`, strictly before that thread's
// release-store to `tag`. Every other access (reader or a losing writer)
// acquire-loads `tag` first and only proceeds once it is non-zero, which
// happens-after the release store and therefore after the plain writes
// that preceded it.
unsafe impl Sync for Slot {}

impl Slot {
    fn new() -> Self {
        Slot {
            name: AtomicU64::new(EMPTY_NAME),
            tag: AtomicU8::new(0),
            file_name_hash: std::cell::UnsafeCell::new(0),
            cu: std::cell::UnsafeCell::new(0),
            ptr: std::cell::UnsafeCell::new(0),
        }
    }
}

/// One published entry, returned by `find`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DieRef {
    pub tag: u8,
    pub cu: u32,
    pub ptr: DieLoc,
    pub file_name_hash: u64,
}

pub struct DieHashTable {
    slots: Vec<Slot>,
}

fn djbx33a(name: &[u8]) -> u32 {
    let mut h: u32 = 5381;
    for &c in name {
        h = h.wrapping_mul(33).wrapping_add(c as u32);
    }
    h
}

impl DieHashTable {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(TABLE_SIZE);
        slots.resize_with(TABLE_SIZE, Slot::new);
        DieHashTable { slots }
    }

    fn bucket(&self, name: &[u8]) -> usize {
        djbx33a(name) as usize & (self.slots.len() - 1)
    }

    /// Insert a DIE entry, or fold it into an existing duplicate with the
    /// same `(tag, file_name_hash, name)`. `name` must be the exact bytes
    /// `name_loc` resolves to in `files`.
    pub fn insert(
        &self,
        files: &[File],
        name: &[u8],
        name_loc: DieLoc,
        tag: u8,
        file_name_hash: u64,
        cu: u32,
        ptr: DieLoc,
    ) -> Result<()> {
        debug_assert_ne!(tag, 0, "only interesting tags are ever inserted");
        let start = self.bucket(name);
        for i in 0..self.slots.len() {
            let idx = (start + i) & (self.slots.len() - 1);
            let slot = &self.slots[idx];

            let cur = slot.name.load(Ordering::Relaxed);
            if cur == EMPTY_NAME {
                if slot
                    .name
                    .compare_exchange(EMPTY_NAME, name_loc, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    // SAFETY: we just won the CAS; no other thread will
                    // touch these cells until we release-store `tag`.
                    unsafe {
                        *slot.file_name_hash.get() = file_name_hash;
                        *slot.cu.get() = cu;
                        *slot.ptr.get() = ptr;
                    }
                    slot.tag.store(tag, Ordering::Release);
                    return Ok(());
                }
            }

            // Either the slot was already occupied, or we just lost a
            // race to claim it; in both cases someone is (or will be)
            // publishing an entry here.
            while slot.tag.load(Ordering::Acquire) == 0 {
                std::hint::spin_loop();
            }

            let resident_tag = slot.tag.load(Ordering::Acquire);
            if resident_tag == tag {
                // SAFETY: tag is non-zero, so the writer's plain stores
                // already happened-before this acquire load.
                let resident_hash = unsafe { *slot.file_name_hash.get() };
                if resident_hash == file_name_hash {
                    let resident_loc = slot.name.load(Ordering::Relaxed);
                    if resolve_cstr(files, resident_loc) == name {
                        return Ok(());
                    }
                }
            }
        }
        Err(Error::OutOfMemory)
    }

    /// Collect every published entry whose name matches, optionally
    /// restricted to one tag (`tag_filter == 0` means "any tag").
    pub fn find(&self, files: &[File], name: &[u8], tag_filter: u8) -> Vec<DieRef> {
        let start = self.bucket(name);
        let mut results = Vec::new();
        for i in 0..self.slots.len() {
            let idx = (start + i) & (self.slots.len() - 1);
            let slot = &self.slots[idx];
            let name_loc = slot.name.load(Ordering::Relaxed);
            if name_loc == EMPTY_NAME {
                break;
            }
            let tag = slot.tag.load(Ordering::Acquire);
            if tag == 0 {
                break;
            }
            if (tag_filter == 0 || tag == tag_filter) && resolve_cstr(files, name_loc) == name {
                // SAFETY: tag != 0 establishes happens-before on these cells.
                let (cu, ptr, file_name_hash) =
                    unsafe { (*slot.cu.get(), *slot.ptr.get(), *slot.file_name_hash.get()) };
                results.push(DieRef {
                    tag,
                    cu,
                    ptr,
                    file_name_hash,
                });
            }
        }
        results
    }
}

impl Default for DieHashTable {
    fn default() -> Self {
        Self::new()
    }
}
