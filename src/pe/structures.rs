//! On-disk PE records. Most are fixed size, the optional header depends on whether the file is
//! PE32 or PE32+.
use crate::error::Result;
use crate::layout::{Descriptor, Record, Struct, descriptor};
use crate::validation::ValidationRule;

pub const IMAGE_MAGIC_32: u16 = 0x10b;
pub const IMAGE_MAGIC_64: u16 = 0x20b;

/// IMAGE_DIRECTORY_ENTRY_* indexes.
pub const DIRECTORY_EXPORT: usize = 0;
pub const DIRECTORY_RESOURCE: usize = 2;
pub const DIRECTORY_CERTIFICATES: usize = 4;
pub const DIRECTORY_DEBUG: usize = 6;
pub const DIRECTORY_COM_DESCRIPTOR: usize = 14;

pub const DIRECTORY_NAMES: [&str; 15] = [
    "Export",
    "Import",
    "Resource",
    "Exception",
    "Certificates",
    "BaseRelocation",
    "Debug",
    "Architecture",
    "GlobalPointers",
    "ThreadStorage",
    "LoadConfiguration",
    "BoundImport",
    "ImportAddress",
    "DelayImport",
    "ComDescriptor",
];

/// IMAGE_FILE_HEADER, also known as the COFF header.
#[derive(Clone, Debug)]
pub struct ImageFileHeader {
    pub machine: u16,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub pointer_to_symbol_table: u32,
    pub number_of_symbols: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

impl Struct for ImageFileHeader {
    const DESCRIPTOR: &'static Descriptor = descriptor!("PeImageFileHeader" {
        "Machine": U16,
        "NumberOfSections": U16,
        "TimeDateStamp": U32,
        "PointerToSymbolTable": U32,
        "NumberOfSymbols": U32,
        "SizeOfOptionalHeader": U16,
        "Characteristics": U16,
    });

    fn from_record(record: &Record) -> Result<Self> {
        Ok(ImageFileHeader {
            machine: record.u16("Machine")?,
            number_of_sections: record.u16("NumberOfSections")?,
            time_date_stamp: record.u32("TimeDateStamp")?,
            pointer_to_symbol_table: record.u32("PointerToSymbolTable")?,
            number_of_symbols: record.u32("NumberOfSymbols")?,
            size_of_optional_header: record.u16("SizeOfOptionalHeader")?,
            characteristics: record.u16("Characteristics")?,
        })
    }
}

impl ImageFileHeader {
    pub fn machine_name(&self) -> &'static str {
        match self.machine {
            0 => "Unknown",
            0x8664 => "Amd64",
            0x014c => "I386",
            0x01c0 => "Arm",
            0x01c2 => "Thumb",
            0x01c4 => "ArmNT",
            0xaa64 => "Arm64",
            _ => "other",
        }
    }

    pub fn is_dll(&self) -> bool {
        self.characteristics & 0x2000 != 0
    }
}

/// Just the first field of the optional header. It has to be read before the rest of the
/// header because it decides the layout.
#[derive(Clone, Debug)]
pub struct ImageOptionalHeaderMagic {
    pub magic: u16,
}

impl Struct for ImageOptionalHeaderMagic {
    const DESCRIPTOR: &'static Descriptor = descriptor!("PeImageOptionalHeaderMagic" {
        "Magic": U16,
    });

    fn from_record(record: &Record) -> Result<Self> {
        Ok(ImageOptionalHeaderMagic {
            magic: record.u16("Magic")?,
        })
    }
}

impl ImageOptionalHeaderMagic {
    pub fn is_magic_valid(&self) -> ValidationRule<'_> {
        ValidationRule::new("PE Optional Header has invalid magic field", || {
            Ok(self.magic == IMAGE_MAGIC_32 || self.magic == IMAGE_MAGIC_64)
        })
    }

    pub fn is_64bit(&self) -> bool {
        self.magic == IMAGE_MAGIC_64
    }
}

/// IMAGE_OPTIONAL_HEADER32 or IMAGE_OPTIONAL_HEADER64, without the data directories.
#[derive(Clone, Debug)]
pub struct ImageOptionalHeader {
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub address_of_entry_point: u32,

    /// Preferred load address.
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub check_sum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub number_of_rva_and_sizes: u32,
}

impl Struct for ImageOptionalHeader {
    const DESCRIPTOR: &'static Descriptor = descriptor!("PeImageOptionalHeader" {
        "Magic": U16,
        "MajorLinkerVersion": U8,
        "MinorLinkerVersion": U8,
        "SizeOfCode": U32,
        "SizeOfInitializedData": U32,
        "SizeOfUninitializedData": U32,
        "AddressOfEntryPoint": U32,
        "BaseOfCode": U32,
        "BaseOfData": U32 if "PE32",
        "ImageBase": SizeT,
        "SectionAlignment": U32,
        "FileAlignment": U32,
        "MajorOperatingSystemVersion": U16,
        "MinorOperatingSystemVersion": U16,
        "MajorImageVersion": U16,
        "MinorImageVersion": U16,
        "MajorSubsystemVersion": U16,
        "MinorSubsystemVersion": U16,
        "Win32VersionValue": U32,
        "SizeOfImage": U32,
        "SizeOfHeaders": U32,
        "CheckSum": U32,
        "Subsystem": U16,
        "DllCharacteristics": U16,
        "SizeOfStackReserve": SizeT,
        "SizeOfStackCommit": SizeT,
        "SizeOfHeapReserve": SizeT,
        "SizeOfHeapCommit": SizeT,
        "LoaderFlags": U32,
        "NumberOfRvaAndSizes": U32,
    });

    fn from_record(record: &Record) -> Result<Self> {
        Ok(ImageOptionalHeader {
            magic: record.u16("Magic")?,
            major_linker_version: record.u8("MajorLinkerVersion")?,
            minor_linker_version: record.u8("MinorLinkerVersion")?,
            size_of_code: record.u32("SizeOfCode")?,
            address_of_entry_point: record.u32("AddressOfEntryPoint")?,
            image_base: record.size_t("ImageBase")?,
            section_alignment: record.u32("SectionAlignment")?,
            file_alignment: record.u32("FileAlignment")?,
            size_of_image: record.u32("SizeOfImage")?,
            size_of_headers: record.u32("SizeOfHeaders")?,
            check_sum: record.u32("CheckSum")?,
            subsystem: record.u16("Subsystem")?,
            dll_characteristics: record.u16("DllCharacteristics")?,
            number_of_rva_and_sizes: record.u32("NumberOfRvaAndSizes")?,
        })
    }
}

/// IMAGE_DATA_DIRECTORY
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ImageDataDirectory {
    pub virtual_address: u32,
    pub size: u32,
}

impl Struct for ImageDataDirectory {
    const DESCRIPTOR: &'static Descriptor = descriptor!("PeImageDataDirectory" {
        "VirtualAddress": U32,
        "Size": U32,
    });

    fn from_record(record: &Record) -> Result<Self> {
        Ok(ImageDataDirectory {
            virtual_address: record.u32("VirtualAddress")?,
            size: record.u32("Size")?,
        })
    }
}

/// IMAGE_SECTION_HEADER
#[derive(Clone, Debug)]
pub struct ImageSectionHeader {
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub characteristics: u32,
}

impl Struct for ImageSectionHeader {
    const DESCRIPTOR: &'static Descriptor = descriptor!("PeImageSectionHeader" {
        "Name": Bytes(8),
        "VirtualSize": U32,
        "VirtualAddress": U32,
        "SizeOfRawData": U32,
        "PointerToRawData": U32,
        "PointerToRelocations": U32,
        "PointerToLinenumbers": U32,
        "NumberOfRelocations": U16,
        "NumberOfLinenumbers": U16,
        "Characteristics": U32,
    });

    fn from_record(record: &Record) -> Result<Self> {
        let mut name = [0; 8];
        name.copy_from_slice(record.bytes("Name")?);
        Ok(ImageSectionHeader {
            name,
            virtual_size: record.u32("VirtualSize")?,
            virtual_address: record.u32("VirtualAddress")?,
            size_of_raw_data: record.u32("SizeOfRawData")?,
            pointer_to_raw_data: record.u32("PointerToRawData")?,
            characteristics: record.u32("Characteristics")?,
        })
    }
}

impl ImageSectionHeader {
    /// The name is nul padded, not nul terminated.
    pub fn name(&self) -> String {
        let end = self.name.iter().position(|b| *b == 0).unwrap_or(8);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    pub fn contains(&self, rva: u64) -> bool {
        let start = self.virtual_address as u64;
        start <= rva && rva < start + self.virtual_size as u64
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImageDebugType {
    Unknown,
    Coff,
    CodeView,
    Fpo,
    Misc,
    Bbt,
    Reproducible,
    EmbeddedPortablePdb,
    PdbChecksum,
    PerfMap,
    Other(u32),
}

impl ImageDebugType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => ImageDebugType::Unknown,
            1 => ImageDebugType::Coff,
            2 => ImageDebugType::CodeView,
            3 => ImageDebugType::Fpo,
            4 => ImageDebugType::Misc,
            10 => ImageDebugType::Bbt,
            16 => ImageDebugType::Reproducible,
            17 => ImageDebugType::EmbeddedPortablePdb,
            19 => ImageDebugType::PdbChecksum,
            21 => ImageDebugType::PerfMap,
            _ => ImageDebugType::Other(value),
        }
    }
}

/// IMAGE_DEBUG_DIRECTORY
#[derive(Clone, Debug)]
pub struct ImageDebugDirectory {
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub debug_type: ImageDebugType,
    pub size_of_data: u32,
    pub address_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
}

impl Struct for ImageDebugDirectory {
    const DESCRIPTOR: &'static Descriptor = descriptor!("PeImageDebugDirectory" {
        "Characteristics": U32,
        "TimeDateStamp": U32,
        "MajorVersion": U16,
        "MinorVersion": U16,
        "Type": U32,
        "SizeOfData": U32,
        "AddressOfRawData": U32,
        "PointerToRawData": U32,
    });

    fn from_record(record: &Record) -> Result<Self> {
        Ok(ImageDebugDirectory {
            characteristics: record.u32("Characteristics")?,
            time_date_stamp: record.u32("TimeDateStamp")?,
            major_version: record.u16("MajorVersion")?,
            minor_version: record.u16("MinorVersion")?,
            debug_type: ImageDebugType::from_u32(record.u32("Type")?),
            size_of_data: record.u32("SizeOfData")?,
            address_of_raw_data: record.u32("AddressOfRawData")?,
            pointer_to_raw_data: record.u32("PointerToRawData")?,
        })
    }
}

/// The start of a CodeView RSDS record. The PDB path follows.
#[derive(Clone, Debug)]
pub struct CvInfoPdb70 {
    pub cv_signature: i32,
    pub signature: [u8; 16],
    pub age: i32,
}

impl Struct for CvInfoPdb70 {
    const DESCRIPTOR: &'static Descriptor = descriptor!("PeCvInfoPdb70" {
        "CvSignature": I32,
        "Signature": Bytes(16),
        "Age": I32,
    });

    fn from_record(record: &Record) -> Result<Self> {
        let mut signature = [0; 16];
        signature.copy_from_slice(record.bytes("Signature")?);
        Ok(CvInfoPdb70 {
            cv_signature: record.i32("CvSignature")?,
            signature,
            age: record.i32("Age")?,
        })
    }
}

/// The start of a perfmap debug record. The perfmap path follows.
#[derive(Clone, Debug)]
pub struct PerfMapIdV1 {
    pub magic: i32,
    pub signature: [u8; 16],
    pub version: u32,
}

impl Struct for PerfMapIdV1 {
    const DESCRIPTOR: &'static Descriptor = descriptor!("PePerfMapIdV1" {
        "Magic": I32,
        "Signature": Bytes(16),
        "Version": U32,
    });

    fn from_record(record: &Record) -> Result<Self> {
        let mut signature = [0; 16];
        signature.copy_from_slice(record.bytes("Signature")?);
        Ok(PerfMapIdV1 {
            magic: record.i32("Magic")?,
            signature,
            version: record.u32("Version")?,
        })
    }
}

/// IMAGE_RESOURCE_DIRECTORY, followed by the named entries and then the id entries.
#[derive(Clone, Debug)]
pub struct ImageResourceDirectory {
    pub number_of_named_entries: u16,
    pub number_of_id_entries: u16,
}

impl Struct for ImageResourceDirectory {
    const DESCRIPTOR: &'static Descriptor = descriptor!("PeImageResourceDirectory" {
        "Characteristics": U32,
        "TimeDateStamp": U32,
        "MajorVersion": U16,
        "MinorVersion": U16,
        "NumberOfNamedEntries": U16,
        "NumberOfIdEntries": U16,
    });

    fn from_record(record: &Record) -> Result<Self> {
        Ok(ImageResourceDirectory {
            number_of_named_entries: record.u16("NumberOfNamedEntries")?,
            number_of_id_entries: record.u16("NumberOfIdEntries")?,
        })
    }
}

/// IMAGE_RESOURCE_DIRECTORY_ENTRY for resources identified by id.
#[derive(Clone, Debug)]
pub struct ImageResourceDirectoryEntry {
    pub id: u32,

    /// With the high bit set the low 31 bits are the offset of the next directory down,
    /// otherwise it's the offset of a data entry. Either way relative to the resource section.
    pub offset_to_data: u32,
}

impl Struct for ImageResourceDirectoryEntry {
    const DESCRIPTOR: &'static Descriptor = descriptor!("PeImageResourceDirectoryEntry" {
        "Id": U32,
        "OffsetToData": U32,
    });

    fn from_record(record: &Record) -> Result<Self> {
        Ok(ImageResourceDirectoryEntry {
            id: record.u32("Id")?,
            offset_to_data: record.u32("OffsetToData")?,
        })
    }
}

/// IMAGE_RESOURCE_DATA_ENTRY
#[derive(Clone, Debug)]
pub struct ImageResourceDataEntry {
    /// An RVA, unlike the offsets in the directory entries.
    pub offset_to_data: u32,
    pub size: u32,
    pub code_page: u32,
}

impl Struct for ImageResourceDataEntry {
    const DESCRIPTOR: &'static Descriptor = descriptor!("PeImageResourceDataEntry" {
        "OffsetToData": U32,
        "Size": U32,
        "CodePage": U32,
        "Reserved": U32,
    });

    fn from_record(record: &Record) -> Result<Self> {
        Ok(ImageResourceDataEntry {
            offset_to_data: record.u32("OffsetToData")?,
            size: record.u32("Size")?,
            code_page: record.u32("CodePage")?,
        })
    }
}

pub const FIXED_FILE_INFO_SIGNATURE: u32 = 0xfeef04bd;

/// VS_FIXEDFILEINFO
#[derive(Clone, Debug)]
pub struct VsFixedFileInfo {
    pub signature: u32,
    pub struc_version: u32,
    pub file_version_minor: u16,
    pub file_version_major: u16,
    pub file_version_revision: u16,
    pub file_version_build: u16,
    pub product_version_minor: u16,
    pub product_version_major: u16,
    pub product_version_revision: u16,
    pub product_version_build: u16,
    pub file_flags_mask: u32,
    pub file_flags: u32,
    pub file_os: u32,
    pub file_type: u32,
    pub file_subtype: u32,
    pub file_date_ms: u32,
    pub file_date_ls: u32,
}

impl Struct for VsFixedFileInfo {
    const DESCRIPTOR: &'static Descriptor = descriptor!("PeVsFixedFileInfo" {
        "Signature": U32,
        "StrucVersion": U32,
        "FileVersionMinor": U16,
        "FileVersionMajor": U16,
        "FileVersionRevision": U16,
        "FileVersionBuild": U16,
        "ProductVersionMinor": U16,
        "ProductVersionMajor": U16,
        "ProductVersionRevision": U16,
        "ProductVersionBuild": U16,
        "FileFlagsMask": U32,
        "FileFlags": U32,
        "FileOS": U32,
        "FileType": U32,
        "FileSubtype": U32,
        "FileDateMS": U32,
        "FileDateLS": U32,
    });

    fn from_record(record: &Record) -> Result<Self> {
        Ok(VsFixedFileInfo {
            signature: record.u32("Signature")?,
            struc_version: record.u32("StrucVersion")?,
            file_version_minor: record.u16("FileVersionMinor")?,
            file_version_major: record.u16("FileVersionMajor")?,
            file_version_revision: record.u16("FileVersionRevision")?,
            file_version_build: record.u16("FileVersionBuild")?,
            product_version_minor: record.u16("ProductVersionMinor")?,
            product_version_major: record.u16("ProductVersionMajor")?,
            product_version_revision: record.u16("ProductVersionRevision")?,
            product_version_build: record.u16("ProductVersionBuild")?,
            file_flags_mask: record.u32("FileFlagsMask")?,
            file_flags: record.u32("FileFlags")?,
            file_os: record.u32("FileOS")?,
            file_type: record.u32("FileType")?,
            file_subtype: record.u32("FileSubtype")?,
            file_date_ms: record.u32("FileDateMS")?,
            file_date_ls: record.u32("FileDateLS")?,
        })
    }
}

impl VsFixedFileInfo {
    /// major.minor.build.revision
    pub fn file_version(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.file_version_major,
            self.file_version_minor,
            self.file_version_build,
            self.file_version_revision
        )
    }

    pub fn product_version(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.product_version_major,
            self.product_version_minor,
            self.product_version_build,
            self.product_version_revision
        )
    }

    pub fn is_debug(&self) -> bool {
        self.file_flags & 0x1 != 0
    }
}

/// VS_VERSIONINFO, only the part up to the fixed file info is described.
#[derive(Clone, Debug)]
pub struct VsVersionInfo {
    pub length: u16,
    pub value_length: u16,
    pub value_type: u16,
    pub key: String,
    pub value: VsFixedFileInfo,
}

impl Struct for VsVersionInfo {
    const DESCRIPTOR: &'static Descriptor = descriptor!("PeVsVersionInfo" {
        "Length": U16,
        "ValueLength": U16,
        "Type": U16,
        "Key": Chars(16),
        "Padding1": U16,
        "Value": Struct(VsFixedFileInfo::DESCRIPTOR),
    });

    fn from_record(record: &Record) -> Result<Self> {
        Ok(VsVersionInfo {
            length: record.u16("Length")?,
            value_length: record.u16("ValueLength")?,
            value_type: record.u16("Type")?,
            key: record.chars("Key")?,
            value: record.get("Value")?,
        })
    }
}

/// IMAGE_EXPORT_DIRECTORY
#[derive(Clone, Debug)]
pub struct ImageExportDirectory {
    pub name: u32,
    pub base: u32,
    pub number_of_functions: u32,
    pub number_of_names: u32,
    pub address_of_functions: u32,
    pub address_of_names: u32,
    pub address_of_name_ordinals: u32,
}

impl Struct for ImageExportDirectory {
    const DESCRIPTOR: &'static Descriptor = descriptor!("PeImageExportDirectory" {
        "Characteristics": U32,
        "TimeDateStamp": U32,
        "MajorVersion": U16,
        "MinorVersion": U16,
        "Name": U32,
        "Base": U32,
        "NumberOfFunctions": U32,
        "NumberOfNames": U32,
        "AddressOfFunctions": U32,
        "AddressOfNames": U32,
        "AddressOfNameOrdinals": U32,
    });

    fn from_record(record: &Record) -> Result<Self> {
        Ok(ImageExportDirectory {
            name: record.u32("Name")?,
            base: record.u32("Base")?,
            number_of_functions: record.u32("NumberOfFunctions")?,
            number_of_names: record.u32("NumberOfNames")?,
            address_of_functions: record.u32("AddressOfFunctions")?,
            address_of_names: record.u32("AddressOfNames")?,
            address_of_name_ordinals: record.u32("AddressOfNameOrdinals")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutManager;

    #[test]
    fn record_sizes() {
        let pe32 = LayoutManager::pe(false);
        let pe64 = LayoutManager::pe(true);
        assert_eq!(pe32.size_of(ImageFileHeader::DESCRIPTOR).unwrap(), 20);
        assert_eq!(pe32.size_of(ImageOptionalHeader::DESCRIPTOR).unwrap(), 96);
        assert_eq!(pe64.size_of(ImageOptionalHeader::DESCRIPTOR).unwrap(), 112);
        assert_eq!(pe32.size_of(ImageSectionHeader::DESCRIPTOR).unwrap(), 40);
        assert_eq!(pe32.size_of(ImageDebugDirectory::DESCRIPTOR).unwrap(), 28);
        assert_eq!(pe32.size_of(CvInfoPdb70::DESCRIPTOR).unwrap(), 24);
        assert_eq!(pe32.size_of(ImageExportDirectory::DESCRIPTOR).unwrap(), 40);
        assert_eq!(pe32.size_of(ImageResourceDirectory::DESCRIPTOR).unwrap(), 16);
        assert_eq!(pe32.size_of(VsFixedFileInfo::DESCRIPTOR).unwrap(), 52);
        assert_eq!(pe32.size_of(VsVersionInfo::DESCRIPTOR).unwrap(), 92);
    }

    #[test]
    fn section_names() {
        let header = ImageSectionHeader {
            name: *b".text\0\0\0",
            virtual_size: 0x100,
            virtual_address: 0x1000,
            size_of_raw_data: 0x200,
            pointer_to_raw_data: 0x400,
            characteristics: 0,
        };
        assert_eq!(header.name(), ".text");
        assert!(header.contains(0x10ff));
        assert!(!header.contains(0x1100));

        let header = ImageSectionHeader {
            name: *b".textbss",
            ..header
        };
        assert_eq!(header.name(), ".textbss");
    }

    #[test]
    fn versions() {
        let mut bytes = Vec::new();
        bytes.extend(FIXED_FILE_INFO_SIGNATURE.to_le_bytes());
        bytes.extend(0x10000u32.to_le_bytes());
        for v in [2u16, 1, 4, 3, 6, 5, 8, 7] {
            bytes.extend(v.to_le_bytes());
        }
        bytes.extend([0u8; 28]);
        let reader = crate::reader::Reader::new(std::sync::Arc::new(bytes));
        let info: VsFixedFileInfo = reader.read(0).unwrap();
        assert_eq!(info.file_version(), "1.2.3.4");
        assert_eq!(info.product_version(), "5.6.7.8");
    }
}
