//! Used by the linker and debugger. Also see segments.
use crate::error::Result;
use crate::layout::{Descriptor, Record, Struct, descriptor};
use crate::reader::Reader;

const WRITE_FLAG: u64 = 1 << 0; // Writable
const ALLOC_FLAG: u64 = 1 << 1; // Occupies memory during execution
const EXECINSTR_FLAG: u64 = 1 << 2; // Executable
const MERGE_FLAG: u64 = 1 << 4; // Might be merged
const STRINGS_FLAG: u64 = 1 << 5; // Contains nul-terminated strings
const INFO_LINK_FLAG: u64 = 1 << 6; // `sh_info' contains SHT index
const LINK_ORDER_FLAG: u64 = 1 << 7; // Preserve order after combining
const GROUP_FLAG: u64 = 1 << 9; // Section is member of a group.
const TLS_FLAG: u64 = 1 << 10; // Section hold thread-local data.
const COMPRESSED_FLAG: u64 = 1 << 11; // Section with compressed data.

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SectionType {
    /// Not to be used.
    Null,

    /// CPU instructions or constant data.
    ProgBits,

    /// Debugging info.
    SymbolTable,

    /// Strings for use by the linker and debugger.
    StringTable,

    /// Relocation entries with addends.
    RelocationsWith,

    /// Symbol hash table.
    SymbolHashTable,

    /// Dynamic linking information.
    Dynamic,

    /// Arbitrary metadata.
    Note,

    /// Uninitialized data.
    NoBits,

    /// Relocation entries without addends.
    RelocationsWithout,

    // Dynamic linker symbol table.
    DynamicSymbolTable,

    /// Array of pointers to initialization functions.
    InitArray,

    /// Array of pointers to termination functions.
    FiniArray,

    /// Array of pointers to functions to be called before the regular
    /// initialization functions.
    PreinitArray,

    /// GNU style hash table.
    Hash,

    /// GNU symbol versions that are provided.
    VerDef,

    /// GNU symbol versions that are required.
    VerNeed,

    /// GNU symbol version table.
    VerSym,

    Other(u32),
}

impl SectionType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0x0 => SectionType::Null,
            0x1 => SectionType::ProgBits,
            0x2 => SectionType::SymbolTable,
            0x3 => SectionType::StringTable,
            0x4 => SectionType::RelocationsWith,
            0x5 => SectionType::SymbolHashTable,
            0x6 => SectionType::Dynamic,
            0x7 => SectionType::Note,
            0x8 => SectionType::NoBits,
            0x9 => SectionType::RelocationsWithout,
            0xb => SectionType::DynamicSymbolTable,
            0xe => SectionType::InitArray,
            0xf => SectionType::FiniArray,
            0x10 => SectionType::PreinitArray,
            0x6ffffff6 => SectionType::Hash,
            0x6ffffffd => SectionType::VerDef,
            0x6ffffffe => SectionType::VerNeed,
            0x6fffffff => SectionType::VerSym,
            0x60000000.. => SectionType::Other(value),
            _ => {
                tracing::debug!("Unknown section type: {value:#x}");
                SectionType::Other(value)
            }
        }
    }
}

/// Elf32_Shdr or Elf64_Shdr.
#[derive(Clone, Debug)]
pub struct SectionHeader {
    /// Index into the section name string table. Zero means no name.
    pub name_index: u32,

    pub section_type: SectionType,

    /// Write, alloc, and/or exec.
    pub flags: u64,

    pub virtual_address: u64,

    pub file_offset: u64,

    pub file_size: u64,

    /// Link to another section with related information, usually a string
    /// or symbol table.
    pub link: u32,

    /// Additional section info.
    pub info: u32,

    pub alignment: u64,

    /// Set if the section holds a table of entries.
    pub entry_size: u64,
}

impl Struct for SectionHeader {
    const DESCRIPTOR: &'static Descriptor = descriptor!("ElfSectionHeader" {
        "NameIndex": U32,
        "Type": U32,
        "Flags": SizeT,
        "VirtualAddress": SizeT,
        "FileOffset": SizeT,
        "FileSize": SizeT,
        "Link": U32,
        "Info": U32,
        "Alignment": SizeT,
        "EntrySize": SizeT,
    });

    fn from_record(record: &Record) -> Result<Self> {
        Ok(SectionHeader {
            name_index: record.u32("NameIndex")?,
            section_type: SectionType::from_u32(record.u32("Type")?),
            flags: record.size_t("Flags")?,
            virtual_address: record.size_t("VirtualAddress")?,
            file_offset: record.size_t("FileOffset")?,
            file_size: record.size_t("FileSize")?,
            link: record.u32("Link")?,
            info: record.u32("Info")?,
            alignment: record.size_t("Alignment")?,
            entry_size: record.size_t("EntrySize")?,
        })
    }
}

impl SectionHeader {
    pub fn flags_str(&self) -> String {
        let names = [
            (WRITE_FLAG, "WRITE"),
            (ALLOC_FLAG, "ALLOC"),
            (EXECINSTR_FLAG, "EXEC"),
            (MERGE_FLAG, "MERGE"),
            (STRINGS_FLAG, "STRINGS"),
            (INFO_LINK_FLAG, "INFO"),
            (LINK_ORDER_FLAG, "LINK"),
            (GROUP_FLAG, "GROUP"),
            (TLS_FLAG, "TLS"),
            (COMPRESSED_FLAG, "COMPRESSED"),
        ];
        let result: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.flags & flag != 0)
            .map(|(_, name)| *name)
            .collect();
        if result.is_empty() {
            "none".to_string()
        } else {
            result.join(" ")
        }
    }
}

/// A section header, its resolved name, and a reader over its file bytes.
#[derive(Clone)]
pub struct ElfSection {
    pub header: SectionHeader,
    pub name: String,
    pub contents: Reader,
}
