//! Used by the run-time loader. Also see sections.
use crate::error::Result;
use crate::layout::{Descriptor, Record, Struct, descriptor};
use crate::reader::Reader;

const EXECUTE_FLAG: u32 = 0x1;
const WRITE_FLAG: u32 = 0x2;
const READ_FLAG: u32 = 0x4;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SegmentType {
    /// Not to be used: either it's a segment that is intended to be not used or one
    /// that is not recognized.
    Null,

    /// A loadable segment, described by p_filesz and p_memsz.
    Load,

    /// Specifies dynamic linking information.
    Dynamic,

    /// Location and size of a null-terminated path name to invoke as an interpreter.
    Interpreter,

    /// The location and size of auxiliary information.
    Note,

    /// Reserved but has unspecified semantics.
    Shlib,

    /// The location and size of the program header table itself.
    Phdr,

    // The Thread-Local Storage template.
    Tls,

    /// OS or processor specific, e.g. PT_GNU_STACK.
    Other(u32),
}

impl SegmentType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => SegmentType::Null,
            1 => SegmentType::Load,
            2 => SegmentType::Dynamic,
            3 => SegmentType::Interpreter,
            4 => SegmentType::Note,
            5 => SegmentType::Shlib,
            6 => SegmentType::Phdr,
            7 => SegmentType::Tls,
            0x60000000.. => SegmentType::Other(value), // OS, processor, and future use
            _ => {
                tracing::warn!("Unknown segment type: {value:#x}");
                SegmentType::Other(value)
            }
        }
    }

    pub fn name(&self) -> String {
        match self {
            SegmentType::Null => "NULL".to_string(),
            SegmentType::Load => "LOAD".to_string(),
            SegmentType::Dynamic => "DYNAMIC".to_string(),
            SegmentType::Interpreter => "INTERP".to_string(),
            SegmentType::Note => "NOTE".to_string(),
            SegmentType::Shlib => "SHLIB".to_string(),
            SegmentType::Phdr => "PHDR".to_string(),
            SegmentType::Tls => "TLS".to_string(),
            SegmentType::Other(0x6474e550) => "GNU_EH_FRAME".to_string(),
            SegmentType::Other(0x6474e551) => "GNU_STACK".to_string(),
            SegmentType::Other(0x6474e552) => "GNU_RELRO".to_string(),
            SegmentType::Other(0x6474e553) => "GNU_PROPERTY".to_string(),
            SegmentType::Other(value) => format!("{value:#x}"),
        }
    }
}

/// Elf64_Phdr or Elf32_Phdr. The flags move to the end for 32-bit files.
#[derive(Clone, Debug)]
pub struct ProgramHeader {
    pub segment_type: SegmentType,

    /// Offset to the first byte of the segment.
    pub file_offset: u64,

    /// Virtual address of the first byte in the segment.
    pub virtual_address: u64,

    /// Physical address of the first byte in the segment.
    pub physical_address: u64,

    /// Number of bytes in the segment in the file.
    pub file_size: u64,

    /// Number of bytes in the segment in memory.
    pub virtual_size: u64,

    /// Read/Write/Execute flags.
    pub flags: u32,

    pub alignment: u64,
}

impl Struct for ProgramHeader {
    const DESCRIPTOR: &'static Descriptor = descriptor!("ElfProgramHeader" {
        "Type": U32,
        "Flags": U32 if "64BIT",
        "FileOffset": SizeT,
        "VirtualAddress": SizeT,
        "PhysicalAddress": SizeT,
        "FileSize": SizeT,
        "VirtualSize": SizeT,
        "Flags": U32 if "32BIT",
        "Alignment": SizeT,
    });

    fn from_record(record: &Record) -> Result<Self> {
        Ok(ProgramHeader {
            segment_type: SegmentType::from_u32(record.u32("Type")?),
            file_offset: record.size_t("FileOffset")?,
            virtual_address: record.size_t("VirtualAddress")?,
            physical_address: record.size_t("PhysicalAddress")?,
            file_size: record.size_t("FileSize")?,
            virtual_size: record.size_t("VirtualSize")?,
            flags: record.u32("Flags")?,
            alignment: record.size_t("Alignment")?,
        })
    }
}

impl ProgramHeader {
    pub fn executable(&self) -> bool {
        self.flags & EXECUTE_FLAG != 0
    }

    pub fn writeable(&self) -> bool {
        self.flags & WRITE_FLAG != 0
    }

    pub fn readable(&self) -> bool {
        self.flags & READ_FLAG != 0
    }

    /// Renders the flags as "xwr" with '-' for unset flags.
    pub fn flags_str(&self) -> String {
        let mut result = String::new();
        result.push(if self.executable() { 'x' } else { '-' });
        result.push(if self.writeable() { 'w' } else { '-' });
        result.push(if self.readable() { 'r' } else { '-' });
        result
    }
}

/// A program header plus a reader over its bytes. For files the bytes come from the file, for
/// images inside a virtual address space they come from the (bias adjusted) virtual range.
#[derive(Clone)]
pub struct ElfSegment {
    pub header: ProgramHeader,
    pub contents: Reader,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutManager;
    use std::sync::Arc;

    #[test]
    fn header_layouts() {
        assert_eq!(
            LayoutManager::elf(false, true)
                .size_of(ProgramHeader::DESCRIPTOR)
                .unwrap(),
            56
        );
        assert_eq!(
            LayoutManager::elf(false, false)
                .size_of(ProgramHeader::DESCRIPTOR)
                .unwrap(),
            32
        );
    }

    #[test]
    fn flags_after_sizes_on_32bit() {
        let mut bytes = Vec::new();
        for word in [1u32, 0x10, 0x8000, 0x8000, 0x20, 0x40, 5, 0x1000] {
            bytes.extend(word.to_be_bytes());
        }
        let reader = Reader::with_layouts(Arc::new(bytes), LayoutManager::elf(true, false));
        let header: ProgramHeader = reader.read(0).unwrap();
        assert_eq!(header.segment_type, SegmentType::Load);
        assert_eq!(header.file_offset, 0x10);
        assert_eq!(header.virtual_address, 0x8000);
        assert_eq!(header.file_size, 0x20);
        assert_eq!(header.virtual_size, 0x40);
        assert_eq!(header.flags_str(), "x-r");
        assert_eq!(header.alignment, 0x1000);
    }

    #[test]
    fn type_names() {
        assert_eq!(SegmentType::from_u32(4), SegmentType::Note);
        assert_eq!(SegmentType::from_u32(0x6474e551).name(), "GNU_STACK");
        assert_eq!(SegmentType::from_u32(9).name(), "0x9");
    }
}
