use super::debug::{self, DebugRecords, PdbChecksum, PdbRecord, PerfMapRecord};
use super::{
    DIRECTORY_COM_DESCRIPTOR, DIRECTORY_DEBUG, DIRECTORY_EXPORT, DIRECTORY_RESOURCE,
    ImageDataDirectory, ImageDebugDirectory, ImageExportDirectory, ImageFileHeader,
    ImageOptionalHeader, ImageOptionalHeaderMagic, ImageSectionHeader, PeRvaAddressSpace,
    VsFixedFileInfo, exports, resources,
};
use crate::address_space::SharedSpace;
use crate::error::{FormatError, Result, checked_add};
use crate::layout::LayoutManager;
use crate::reader::Reader;
use crate::utils;
use crate::validation::ValidationRule;
use std::sync::{Arc, OnceLock};

const DOS_HEADER_MAGIC: u16 = 0x5a4d; // MZ
const PE_SIGNATURE_OFFSET_LOCATION: u64 = 0x3c;
const PE_SIGNATURE: u32 = 0x00004550; // PE\0\0
const DATA_DIRECTORY_COUNT: u64 = 15;

/// A PE/COFF image: an exe or dll either as a flat file or as mapped into a process.
/// Headers are read on first use and cached.
pub struct PeFile {
    header_reader: Reader,
    is_virtual: bool,
    dos_header_magic: OnceLock<u16>,
    pe_header_offset: OnceLock<u32>,
    pe_signature: OnceLock<u32>,
    file_header: OnceLock<ImageFileHeader>,
    optional_header_magic: OnceLock<ImageOptionalHeaderMagic>,
    file_reader: OnceLock<Reader>,
    optional_header: OnceLock<ImageOptionalHeader>,
    data_directories: OnceLock<Vec<ImageDataDirectory>>,
    sections: OnceLock<Vec<ImageSectionHeader>>,
    rva_reader: OnceLock<Reader>,
    debug_records: OnceLock<DebugRecords>,
    version_info: OnceLock<Option<VsFixedFileInfo>>,
    export_directory: OnceLock<Option<ImageExportDirectory>>,
}

impl PeFile {
    /// If `is_virtual` is set the data source is the image as loaded by the OS, so RVAs are
    /// just offsets from the start of the data source.
    pub fn new(data_source: SharedSpace, is_virtual: bool) -> Self {
        PeFile {
            header_reader: Reader::new(data_source),
            is_virtual,
            dos_header_magic: OnceLock::new(),
            pe_header_offset: OnceLock::new(),
            pe_signature: OnceLock::new(),
            file_header: OnceLock::new(),
            optional_header_magic: OnceLock::new(),
            file_reader: OnceLock::new(),
            optional_header: OnceLock::new(),
            data_directories: OnceLock::new(),
            sections: OnceLock::new(),
            rva_reader: OnceLock::new(),
            debug_records: OnceLock::new(),
            version_info: OnceLock::new(),
            export_directory: OnceLock::new(),
        }
    }

    pub fn data_source(&self) -> &SharedSpace {
        self.header_reader.data_source()
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    /// True if the DOS magic and the PE signature are present. Never fails.
    pub fn is_valid(&self) -> bool {
        let len = self.header_reader.len();
        if len <= 2 || !self.has_valid_dos_signature().check() {
            return false;
        }
        len > PE_SIGNATURE_OFFSET_LOCATION && self.has_valid_pe_signature().check()
    }

    pub fn dos_header_magic(&self) -> Result<u16> {
        utils::get_or_try_init(&self.dos_header_magic, || self.header_reader.read_u16(0))
            .copied()
    }

    pub fn pe_header_offset(&self) -> Result<u32> {
        utils::get_or_try_init(&self.pe_header_offset, || {
            self.has_valid_dos_signature().check_throwing()?;
            self.header_reader.read_u32(PE_SIGNATURE_OFFSET_LOCATION)
        })
        .copied()
    }

    pub fn pe_signature(&self) -> Result<u32> {
        utils::get_or_try_init(&self.pe_signature, || {
            self.header_reader.read_u32(self.pe_header_offset()? as u64)
        })
        .copied()
    }

    /// The COFF header.
    pub fn file_header(&self) -> Result<&ImageFileHeader> {
        utils::get_or_try_init(&self.file_header, || {
            self.has_valid_pe_signature().check_throwing()?;
            self.header_reader.read(self.pe_header_offset()? as u64 + 4)
        })
    }

    pub fn timestamp(&self) -> Result<u32> {
        Ok(self.file_header()?.time_date_stamp)
    }

    pub fn machine(&self) -> Result<u16> {
        Ok(self.file_header()?.machine)
    }

    pub fn optional_header_magic(&self) -> Result<&ImageOptionalHeaderMagic> {
        utils::get_or_try_init(&self.optional_header_magic, || {
            self.header_reader.read(self.optional_header_offset()?)
        })
    }

    pub fn is_64bit(&self) -> Result<bool> {
        let magic = self.optional_header_magic()?;
        magic.is_magic_valid().check_throwing()?;
        Ok(magic.is_64bit())
    }

    /// Reader over the data source with the PE32 or PE32+ layouts.
    pub fn file_reader(&self) -> Result<&Reader> {
        utils::get_or_try_init(&self.file_reader, || {
            let layouts = LayoutManager::pe(self.is_64bit()?);
            Ok(Reader::with_layouts(self.data_source().clone(), layouts))
        })
    }

    pub fn optional_header(&self) -> Result<&ImageOptionalHeader> {
        utils::get_or_try_init(&self.optional_header, || {
            self.file_reader()?.read(self.optional_header_offset()?)
        })
    }

    pub fn size_of_image(&self) -> Result<u32> {
        Ok(self.optional_header()?.size_of_image)
    }

    pub fn data_directories(&self) -> Result<&[ImageDataDirectory]> {
        utils::get_or_try_init(&self.data_directories, || {
            let size = self.file_reader()?.size_of::<ImageOptionalHeader>()?;
            let offset = checked_add(self.optional_header_offset()?, size)?;
            self.header_reader.read_array(offset, DATA_DIRECTORY_COUNT)
        })
        .map(|d| d.as_slice())
    }

    pub fn data_directory(&self, index: usize) -> Result<ImageDataDirectory> {
        self.data_directories()?
            .get(index)
            .copied()
            .ok_or_else(|| FormatError::InvalidArgument(format!("no PE data directory {index}")))
    }

    /// In practice this is the metadata of a managed image.
    pub fn com_data_directory(&self) -> Result<ImageDataDirectory> {
        self.data_directory(DIRECTORY_COM_DESCRIPTOR)
    }

    pub fn is_il_image(&self) -> Result<bool> {
        Ok(self.com_data_directory()?.virtual_address != 0)
    }

    pub fn sections(&self) -> Result<&[ImageSectionHeader]> {
        utils::get_or_try_init(&self.sections, || {
            let header = self.file_header()?;
            let offset = checked_add(
                self.optional_header_offset()?,
                header.size_of_optional_header as u64,
            )?;
            self.header_reader
                .read_array(offset, header.number_of_sections as u64)
        })
        .map(|s| s.as_slice())
    }

    /// Reads by RVA.
    pub fn rva_reader(&self) -> Result<&Reader> {
        utils::get_or_try_init(&self.rva_reader, || {
            let reader = self.file_reader()?;
            if self.is_virtual {
                Ok(reader.clone())
            } else {
                let space = PeRvaAddressSpace::new(self.data_source().clone(), 0, self.sections()?);
                Ok(reader.with_address_space(Arc::new(space)))
            }
        })
    }

    /// Where the checksum field is within the file.
    pub fn pe_checksum_offset(&self) -> Result<u64> {
        checked_add(self.optional_header_offset()?, 0x40)
    }

    /// Where the certificate table data directory is within the file.
    pub fn certificate_table_offset(&self) -> Result<u64> {
        let size = self.file_reader()?.size_of::<ImageOptionalHeader>()?;
        checked_add(checked_add(self.optional_header_offset()?, size)?, 0x20)
    }

    /// The raw debug directory, empty if it can't be read.
    pub fn debug_directories(&self) -> Result<&[ImageDebugDirectory]> {
        Ok(&self.debug_records()?.directories)
    }

    /// CodeView records naming the PDBs for this image.
    pub fn pdbs(&self) -> Result<&[PdbRecord]> {
        Ok(&self.debug_records()?.pdbs)
    }

    pub fn pdb_checksums(&self) -> Result<&[PdbChecksum]> {
        Ok(&self.debug_records()?.checksums)
    }

    pub fn perfmaps(&self) -> Result<&[PerfMapRecord]> {
        Ok(&self.debug_records()?.perfmaps)
    }

    /// The fixed part of the version resource, None if there isn't one.
    pub fn version_info(&self) -> Result<Option<&VsFixedFileInfo>> {
        utils::get_or_try_init(&self.version_info, || {
            let directory = self.data_directory(DIRECTORY_RESOURCE)?;
            match resources::read_version_info(self.rva_reader()?, directory) {
                Err(err) if err.is_expected() => {
                    tracing::debug!(%err, "failed to read the PE version resource");
                    Ok(None)
                }
                result => result,
            }
        })
        .map(|v| v.as_ref())
    }

    pub fn export_directory(&self) -> Result<Option<&ImageExportDirectory>> {
        utils::get_or_try_init(&self.export_directory, || {
            if !self.is_valid() {
                return Ok(None);
            }
            let directory = self.data_directory(DIRECTORY_EXPORT)?;
            if directory.virtual_address == 0 {
                return Ok(None);
            }
            match self.rva_reader()?.read(directory.virtual_address as u64) {
                Ok(exports) => Ok(Some(exports)),
                Err(err) if err.is_expected() => {
                    tracing::debug!(%err, "failed to read the PE export directory");
                    Ok(None)
                }
                Err(err) => Err(err),
            }
        })
        .map(|e| e.as_ref())
    }

    /// RVA of an exported symbol, `name` is without the module prefix.
    pub fn export_symbol(&self, name: &str) -> Result<Option<u64>> {
        let Some(directory) = self.export_directory()? else {
            return Ok(None);
        };
        match exports::find_export(self.rva_reader()?, directory, name) {
            Err(err) if err.is_expected() => {
                tracing::debug!(%err, name, "failed to search the PE exports");
                Ok(None)
            }
            result => result,
        }
    }

    pub fn has_valid_dos_signature(&self) -> ValidationRule<'_> {
        ValidationRule::new("PE file does not have valid DOS header", || {
            Ok(self.dos_header_magic()? == DOS_HEADER_MAGIC)
        })
    }

    pub fn has_valid_pe_signature(&self) -> ValidationRule<'_> {
        ValidationRule::new("PE file does not have a valid PE signature", || {
            Ok(self.pe_signature()? == PE_SIGNATURE)
        })
    }

    fn optional_header_offset(&self) -> Result<u64> {
        let size = self.header_reader.size_of::<ImageFileHeader>()?;
        checked_add(self.pe_header_offset()? as u64 + 4, size)
    }

    fn debug_records(&self) -> Result<&DebugRecords> {
        utils::get_or_try_init(&self.debug_records, || {
            let directory = self.data_directory(DIRECTORY_DEBUG)?;
            debug::read_debug_records(self.rva_reader()?, directory)
        })
    }
}
