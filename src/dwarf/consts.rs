//! DWARF tag, attribute, and form constants (the subset this index parses).

#![allow(non_upper_case_globals)]

pub const DW_TAG_enumerator: u64 = 0x28;
pub const DW_TAG_compile_unit: u64 = 0x11;
pub const DW_TAG_base_type: u64 = 0x24;
pub const DW_TAG_class_type: u64 = 0x02;
pub const DW_TAG_enumeration_type: u64 = 0x04;
pub const DW_TAG_structure_type: u64 = 0x13;
pub const DW_TAG_typedef: u64 = 0x16;
pub const DW_TAG_union_type: u64 = 0x17;
pub const DW_TAG_variable: u64 = 0x34;

pub const DW_AT_sibling: u64 = 0x01;
pub const DW_AT_name: u64 = 0x03;
pub const DW_AT_stmt_list: u64 = 0x10;
pub const DW_AT_declaration: u64 = 0x3c;
pub const DW_AT_decl_file: u64 = 0x3a;
pub const DW_AT_specification: u64 = 0x47;

pub const DW_FORM_addr: u64 = 0x01;
pub const DW_FORM_block2: u64 = 0x03;
pub const DW_FORM_block4: u64 = 0x04;
pub const DW_FORM_data2: u64 = 0x05;
pub const DW_FORM_data4: u64 = 0x06;
pub const DW_FORM_data8: u64 = 0x07;
pub const DW_FORM_string: u64 = 0x08;
pub const DW_FORM_block: u64 = 0x09;
pub const DW_FORM_block1: u64 = 0x0a;
pub const DW_FORM_data1: u64 = 0x0b;
pub const DW_FORM_flag: u64 = 0x0c;
pub const DW_FORM_sdata: u64 = 0x0d;
pub const DW_FORM_strp: u64 = 0x0e;
pub const DW_FORM_udata: u64 = 0x0f;
pub const DW_FORM_ref_addr: u64 = 0x10;
pub const DW_FORM_ref1: u64 = 0x11;
pub const DW_FORM_ref2: u64 = 0x12;
pub const DW_FORM_ref4: u64 = 0x13;
pub const DW_FORM_ref8: u64 = 0x14;
pub const DW_FORM_ref_udata: u64 = 0x15;
pub const DW_FORM_indirect: u64 = 0x16;
pub const DW_FORM_sec_offset: u64 = 0x17;
pub const DW_FORM_exprloc: u64 = 0x18;
pub const DW_FORM_flag_present: u64 = 0x19;
pub const DW_FORM_ref_sig8: u64 = 0x20;

/// Whether a tag is one this index records. Matches the upstream indexer's
/// `DW_TAG`-is-interesting switch; every other tag is still walked (for its
/// children) but never produces a hash table entry.
pub fn is_interesting_tag(tag: u64) -> bool {
    matches!(
        tag,
        DW_TAG_compile_unit
            | DW_TAG_base_type
            | DW_TAG_class_type
            | DW_TAG_enumeration_type
            | DW_TAG_enumerator
            | DW_TAG_structure_type
            | DW_TAG_typedef
            | DW_TAG_union_type
            | DW_TAG_variable
    )
}
