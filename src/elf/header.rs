//! The ELF ident and file header.
use crate::error::Result;
use crate::layout::{Descriptor, Record, Struct, descriptor};
use crate::validation::ValidationRule;

pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// Counts above this are treated as corruption rather than trusted.
pub const MAX_REASONABLE_HEADER_COUNT: u16 = 30000;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ElfClass {
    Class32,
    Class64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ElfData {
    LittleEndian,
    BigEndian,
}

/// The first 16 bytes of every ELF file. These don't depend on the architecture so they can
/// be read before it's known.
#[derive(Clone, Debug)]
pub struct ElfHeaderIdent {
    pub magic: [u8; 4],
    pub class: u8,
    pub data: u8,
    pub version: u8,
    pub os_abi: u8,
    pub abi_version: u8,
}

impl Struct for ElfHeaderIdent {
    const DESCRIPTOR: &'static Descriptor = descriptor!("ElfHeaderIdent" {
        "Magic": Bytes(4),
        "Class": U8,
        "Data": U8,
        "Version": U8,
        "OsAbi": U8,
        "AbiVersion": U8,
        "Padding": Bytes(7),
    });

    fn from_record(record: &Record) -> Result<Self> {
        let mut magic = [0; 4];
        magic.copy_from_slice(record.bytes("Magic")?);
        Ok(ElfHeaderIdent {
            magic,
            class: record.u8("Class")?,
            data: record.u8("Data")?,
            version: record.u8("Version")?,
            os_abi: record.u8("OsAbi")?,
            abi_version: record.u8("AbiVersion")?,
        })
    }
}

impl ElfHeaderIdent {
    pub fn class(&self) -> Option<ElfClass> {
        match self.class {
            1 => Some(ElfClass::Class32),
            2 => Some(ElfClass::Class64),
            _ => None,
        }
    }

    pub fn data(&self) -> Option<ElfData> {
        match self.data {
            1 => Some(ElfData::LittleEndian),
            2 => Some(ElfData::BigEndian),
            _ => None,
        }
    }

    pub fn is_magic_valid(&self) -> ValidationRule<'_> {
        ValidationRule::new("Invalid ELF magic", || Ok(self.magic == ELF_MAGIC))
    }

    pub fn is_class_valid(&self) -> ValidationRule<'_> {
        ValidationRule::new("Invalid ELF class", || Ok(self.class().is_some()))
    }

    pub fn is_data_valid(&self) -> ValidationRule<'_> {
        ValidationRule::new("Invalid ELF data (endianness)", || Ok(self.data().is_some()))
    }

    /// The OS the binary was compiled for.
    pub fn abi(&self) -> &'static str {
        match self.os_abi {
            0 => "System V",
            1 => "HP-UX",
            2 => "NetBSD",
            3 => "Linux",
            6 => "Solaris",
            7 => "AIX",
            8 => "IRIX",
            9 => "FreeBSD",
            12 => "OpenBSD",
            _ => "unknown",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ElfHeaderType {
    None,
    Relocatable,
    Executable,
    Shared,
    Core,
    Other(u16),
}

impl ElfHeaderType {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => ElfHeaderType::None,
            1 => ElfHeaderType::Relocatable,
            2 => ElfHeaderType::Executable,
            3 => ElfHeaderType::Shared,
            4 => ElfHeaderType::Core,
            _ => ElfHeaderType::Other(value),
        }
    }
}

/// Elf32_Ehdr or Elf64_Ehdr. The address and offset fields are pointer sized.
#[derive(Clone, Debug)]
pub struct ElfHeader {
    pub ident: ElfHeaderIdent,
    pub header_type: ElfHeaderType,
    pub machine: u16,
    pub version: u32,
    pub entry: u64,
    pub program_header_offset: u64,
    pub section_header_offset: u64,
    pub flags: u32,
    pub header_size: u16,
    pub program_header_entry_size: u16,
    pub program_header_count: u16,
    pub section_header_entry_size: u16,
    pub section_header_count: u16,
    pub section_header_string_index: u16,
}

impl Struct for ElfHeader {
    const DESCRIPTOR: &'static Descriptor = descriptor!("ElfHeader" {
        "Ident": Struct(ElfHeaderIdent::DESCRIPTOR),
        "Type": U16,
        "Machine": U16,
        "Version": U32,
        "Entry": SizeT,
        "ProgramHeaderOffset": SizeT,
        "SectionHeaderOffset": SizeT,
        "Flags": U32,
        "HeaderSize": U16,
        "ProgramHeaderEntrySize": U16,
        "ProgramHeaderCount": U16,
        "SectionHeaderEntrySize": U16,
        "SectionHeaderCount": U16,
        "SectionHeaderStringIndex": U16,
    });

    fn from_record(record: &Record) -> Result<Self> {
        Ok(ElfHeader {
            ident: record.get("Ident")?,
            header_type: ElfHeaderType::from_u16(record.u16("Type")?),
            machine: record.u16("Machine")?,
            version: record.u32("Version")?,
            entry: record.size_t("Entry")?,
            program_header_offset: record.size_t("ProgramHeaderOffset")?,
            section_header_offset: record.size_t("SectionHeaderOffset")?,
            flags: record.u32("Flags")?,
            header_size: record.u16("HeaderSize")?,
            program_header_entry_size: record.u16("ProgramHeaderEntrySize")?,
            program_header_count: record.u16("ProgramHeaderCount")?,
            section_header_entry_size: record.u16("SectionHeaderEntrySize")?,
            section_header_count: record.u16("SectionHeaderCount")?,
            section_header_string_index: record.u16("SectionHeaderStringIndex")?,
        })
    }
}

impl ElfHeader {
    pub fn is_program_header_count_reasonable(&self) -> ValidationRule<'_> {
        ValidationRule::new("Unreasonably large ELF program header count", || {
            Ok(self.program_header_count <= MAX_REASONABLE_HEADER_COUNT)
        })
    }

    pub fn is_section_header_count_reasonable(&self) -> ValidationRule<'_> {
        ValidationRule::new("Unreasonably large ELF section header count", || {
            Ok(self.section_header_count <= MAX_REASONABLE_HEADER_COUNT)
        })
    }

    /// CPU architecture.
    pub fn machine_name(&self) -> &'static str {
        match self.machine {
            0x03 => "x86",
            0x08 => "MIPS",
            0x14 => "PowerPC",
            0x15 => "PowerPC64",
            0x16 => "S390",
            0x28 => "ARM",
            0x3e => "x86-64",
            0xb7 => "AArch64",
            0xf3 => "RISC-V",
            0x102 => "LoongArch",
            _ => "unknown",
        }
    }
}
