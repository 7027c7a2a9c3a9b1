use super::{
    ElfHeader, ElfHeaderIdent, ElfSection, ElfSegment, ElfVirtualAddressSpace, NT_GNU_BUILD_ID,
    NoteList, ProgramHeader, SectionHeader, SectionType, SegmentType,
};
use crate::address_space::SharedSpace;
use crate::error::{FormatError, Result, checked_add, checked_mul};
use crate::layout::LayoutManager;
use crate::reader::Reader;
use crate::utils;
use crate::validation::ValidationRule;
use std::sync::{Arc, OnceLock};

/// An ELF executable, shared library, or core file. The file may be a flat file or an image
/// loaded into a virtual address space (e.g. a shared library inside a core file). Everything
/// past the ident is read on first use and then cached.
pub struct ElfFile {
    reader: Reader,
    position: u64,
    is_virtual: bool,
    ident: OnceLock<ElfHeaderIdent>,
    data_source_reader: OnceLock<Reader>,
    header: OnceLock<ElfHeader>,
    segments: OnceLock<Vec<ElfSegment>>,
    section_headers: OnceLock<Vec<SectionHeader>>,
    sections: OnceLock<Vec<ElfSection>>,
    section_name_table: OnceLock<Option<Vec<u8>>>,
    virtual_address_reader: OnceLock<Reader>,
    build_id: OnceLock<Option<Vec<u8>>>,
}

impl ElfFile {
    /// `position` is where the ELF header is within `data_source`. If `is_virtual` is set the
    /// data source is a process address space and segments are found by virtual address
    /// rather than by file offset.
    pub fn new(data_source: SharedSpace, position: u64, is_virtual: bool) -> Self {
        ElfFile {
            reader: Reader::new(data_source),
            position,
            is_virtual,
            ident: OnceLock::new(),
            data_source_reader: OnceLock::new(),
            header: OnceLock::new(),
            segments: OnceLock::new(),
            section_headers: OnceLock::new(),
            sections: OnceLock::new(),
            section_name_table: OnceLock::new(),
            virtual_address_reader: OnceLock::new(),
            build_id: OnceLock::new(),
        }
    }

    pub fn data_source(&self) -> &SharedSpace {
        self.reader.data_source()
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    /// True if there's room for an ident with the ELF magic. Never fails.
    pub fn is_valid(&self) -> bool {
        let Ok(ident_size) = self.reader.size_of::<ElfHeaderIdent>() else {
            return false;
        };
        match self.position.checked_add(ident_size) {
            Some(end) if self.reader.len() > end => {}
            _ => return false,
        }
        match self.ident() {
            Ok(ident) => ident.is_magic_valid().check(),
            Err(err) => {
                tracing::debug!(%err, "not an ELF file");
                false
            }
        }
    }

    pub fn ident(&self) -> Result<&ElfHeaderIdent> {
        utils::get_or_try_init(&self.ident, || self.reader.read(self.position))
    }

    pub fn is_big_endian(&self) -> Result<bool> {
        let ident = self.ident()?;
        ident.is_magic_valid().check_throwing()?;
        ident.is_data_valid().check_throwing()?;
        Ok(ident.data == 2)
    }

    pub fn is_64bit(&self) -> Result<bool> {
        let ident = self.ident()?;
        ident.is_magic_valid().check_throwing()?;
        ident.is_class_valid().check_throwing()?;
        Ok(ident.class == 2)
    }

    /// Reader over the data source using this file's endianness and word size.
    pub fn data_source_reader(&self) -> Result<&Reader> {
        utils::get_or_try_init(&self.data_source_reader, || {
            let layouts = LayoutManager::elf(self.is_big_endian()?, self.is_64bit()?);
            Ok(Reader::with_layouts(self.data_source().clone(), layouts))
        })
    }

    pub fn header(&self) -> Result<&ElfHeader> {
        utils::get_or_try_init(&self.header, || {
            self.data_source_reader()?.read(self.position)
        })
    }

    pub fn segments(&self) -> Result<&[ElfSegment]> {
        utils::get_or_try_init(&self.segments, || self.read_segments()).map(|s| s.as_slice())
    }

    pub fn sections(&self) -> Result<&[ElfSection]> {
        utils::get_or_try_init(&self.sections, || self.read_sections()).map(|s| s.as_slice())
    }

    /// Contents of the section named by the header's string table index. None if the file has
    /// no such section or it can't be read.
    pub fn section_name_table(&self) -> Result<Option<&[u8]>> {
        utils::get_or_try_init(&self.section_name_table, || {
            match self.read_section_name_table() {
                Err(err) if err.is_expected() => {
                    tracing::debug!(%err, "no ELF section name table");
                    Ok(None)
                }
                result => result,
            }
        })
        .map(|t| t.as_deref())
    }

    /// Reads by virtual address. For a flat file this goes through the LOAD segments, for an
    /// image already in a virtual address space it's just the data source.
    pub fn virtual_address_reader(&self) -> Result<&Reader> {
        utils::get_or_try_init(&self.virtual_address_reader, || {
            let reader = self.data_source_reader()?;
            if self.is_virtual {
                Ok(reader.clone())
            } else {
                let space = ElfVirtualAddressSpace::new(self.segments()?);
                Ok(reader.with_address_space(Arc::new(space)))
            }
        })
    }

    /// The GNU build id note, from a NOTE segment or failing that a NOTE section.
    pub fn build_id(&self) -> Result<Option<&[u8]>> {
        utils::get_or_try_init(&self.build_id, || self.read_build_id()).map(|b| b.as_deref())
    }

    /// Lowest virtual address of the LOAD segments, u64::MAX if there are none.
    pub fn preferred_vm_base_address(&self) -> Result<u64> {
        Ok(self
            .segments()?
            .iter()
            .filter(|s| s.header.segment_type == SegmentType::Load)
            .map(|s| s.header.virtual_address)
            .min()
            .unwrap_or(u64::MAX))
    }

    pub fn find_section_by_name(&self, name: &str) -> Result<Option<&ElfSection>> {
        Ok(self.sections()?.iter().find(|s| s.name == name))
    }

    pub fn is_header_program_header_offset_valid(&self) -> Result<ValidationRule<'_>> {
        let header = self.header()?;
        let len = self.reader.len();
        Ok(ValidationRule::new(
            "ELF Header ProgramHeaderOffset is invalid or elf file is incomplete",
            move || {
                let table_size = header.program_header_entry_size as u64
                    * header.program_header_count as u64;
                Ok(header.program_header_offset < len
                    && checked_add(header.program_header_offset, table_size)? <= len)
            },
        )
        .requires(self.is_header_program_header_entry_size_valid()?)
        .requires(header.is_program_header_count_reasonable()))
    }

    pub fn is_header_program_header_entry_size_valid(&self) -> Result<ValidationRule<'_>> {
        let header = self.header()?;
        let entry_size = self.data_source_reader()?.size_of::<ProgramHeader>()?;
        Ok(ValidationRule::new(
            "ELF Header ProgramHeaderEntrySize is invalid",
            move || Ok(header.program_header_entry_size as u64 == entry_size),
        ))
    }

    pub fn is_header_section_header_offset_valid(&self) -> Result<ValidationRule<'_>> {
        let header = self.header()?;
        let len = self.reader.len();
        Ok(ValidationRule::new(
            "ELF Header SectionHeaderOffset is invalid or elf file is incomplete",
            move || {
                let table_size = header.section_header_entry_size as u64
                    * header.section_header_count as u64;
                Ok(header.section_header_offset < len
                    && checked_add(header.section_header_offset, table_size)? <= len)
            },
        )
        .requires(self.is_header_section_header_entry_size_valid()?)
        .requires(header.is_section_header_count_reasonable()))
    }

    pub fn is_header_section_header_entry_size_valid(&self) -> Result<ValidationRule<'_>> {
        let header = self.header()?;
        let entry_size = self.data_source_reader()?.size_of::<SectionHeader>()?;
        Ok(ValidationRule::new(
            "ELF Header SectionHeaderEntrySize is invalid",
            move || Ok(header.section_header_entry_size as u64 == entry_size),
        ))
    }

    fn program_header_offset(&self, header: &ElfHeader, index: u64) -> Result<u64> {
        let offset = checked_add(self.position, header.program_header_offset)?;
        checked_add(
            offset,
            checked_mul(index, header.program_header_entry_size as u64)?,
        )
    }

    fn read_segments(&self) -> Result<Vec<ElfSegment>> {
        let header = self.header()?;
        header.is_program_header_count_reasonable().check_throwing()?;
        self.is_header_program_header_offset_valid()?
            .check_throwing()?;
        self.is_header_program_header_entry_size_valid()?
            .check_throwing()?;

        let reader = self.data_source_reader()?;
        let count = header.program_header_count as u64;
        let headers = (0..count)
            .map(|i| reader.read::<ProgramHeader>(self.program_header_offset(header, i)?))
            .collect::<Result<Vec<_>>>()?;

        // Images inside a virtual address space are usually loaded somewhere other than the
        // address they were linked at.
        let mut load_bias = self.position;
        if load_bias > 0 {
            for h in headers.iter() {
                if h.segment_type == SegmentType::Load && h.file_offset == 0 {
                    load_bias = load_bias.wrapping_sub(h.virtual_address);
                }
            }
        }

        Ok(headers
            .into_iter()
            .map(|header| {
                let contents = if self.is_virtual {
                    reader.with_relative_address_space(
                        load_bias.wrapping_add(header.virtual_address),
                        header.virtual_size,
                    )
                } else {
                    reader.with_relative_address_space(
                        load_bias.wrapping_add(header.file_offset),
                        header.file_size,
                    )
                };
                ElfSegment { header, contents }
            })
            .collect())
    }

    fn section_headers(&self) -> Result<&[SectionHeader]> {
        utils::get_or_try_init(&self.section_headers, || {
            let header = self.header()?;
            header.is_section_header_count_reasonable().check_throwing()?;
            self.is_header_section_header_offset_valid()?
                .check_throwing()?;
            self.is_header_section_header_entry_size_valid()?
                .check_throwing()?;

            let reader = self.data_source_reader()?;
            let start = checked_add(self.position, header.section_header_offset)?;
            let entry_size = header.section_header_entry_size as u64;
            (0..header.section_header_count as u64)
                .map(|i| reader.read(checked_add(start, checked_mul(i, entry_size)?)?))
                .collect()
        })
        .map(|s| s.as_slice())
    }

    fn section_contents(&self, header: &SectionHeader) -> Result<Reader> {
        Ok(self.data_source_reader()?.with_relative_address_space(
            self.position.wrapping_add(header.file_offset),
            header.file_size,
        ))
    }

    fn read_sections(&self) -> Result<Vec<ElfSection>> {
        let headers = self.section_headers()?;
        let table = self.section_name_table()?;
        headers
            .iter()
            .map(|header| {
                Ok(ElfSection {
                    header: header.clone(),
                    name: section_name(header, table),
                    contents: self.section_contents(header)?,
                })
            })
            .collect()
    }

    fn read_section_name_table(&self) -> Result<Option<Vec<u8>>> {
        let header = self.header()?;
        let index = header.section_header_string_index as usize;
        if header.section_header_offset == 0 || header.section_header_count == 0 || index == 0 {
            return Ok(None);
        }
        let Some(table) = self.section_headers()?.get(index) else {
            return Err(FormatError::bad_format(format!(
                "ELF section name table index {index} is out of range"
            )));
        };
        if table.file_offset == 0 || table.file_size == 0 {
            return Ok(None);
        }
        let contents = self.section_contents(table)?;
        Ok(Some(contents.read_bytes(0, contents.len())?))
    }

    fn read_build_id(&self) -> Result<Option<Vec<u8>>> {
        let header = self.header()?;
        if header.program_header_offset > 0
            && header.program_header_entry_size > 0
            && header.program_header_count > 0
        {
            let found = self.segments().and_then(|segments| {
                for segment in segments
                    .iter()
                    .filter(|s| s.header.segment_type == SegmentType::Note)
                {
                    if let Some(id) = find_build_id(&segment.contents)? {
                        return Ok(Some(id));
                    }
                }
                Ok(None)
            });
            match found {
                Ok(Some(id)) => return Ok(Some(id)),
                Ok(None) => {}
                Err(err) if err.is_expected() => {
                    tracing::debug!(%err, "failed to read build id from the ELF segments")
                }
                Err(err) => return Err(err),
            }
        }

        // Files without program headers (e.g. some FreeBSD .dbg files) still have the
        // note sections.
        let found = self.sections().and_then(|sections| {
            for section in sections
                .iter()
                .filter(|s| s.header.section_type == SectionType::Note)
            {
                if let Some(id) = find_build_id(&section.contents)? {
                    return Ok(Some(id));
                }
            }
            Ok(None)
        });
        match found {
            Err(err) if err.is_expected() => {
                tracing::debug!(%err, "failed to read build id from the ELF sections");
                Ok(None)
            }
            result => result,
        }
    }
}

fn find_build_id(notes: &Reader) -> Result<Option<Vec<u8>>> {
    for note in NoteList::new(notes.clone()) {
        let note = note?;
        if note.header.note_type == NT_GNU_BUILD_ID && note.name()? == "GNU" {
            // contents are padded, the id is only the descriptor bytes
            let contents = note.contents()?;
            let id = contents.read_bytes(0, note.header.content_size as u64)?;
            return Ok(Some(id));
        }
    }
    Ok(None)
}

fn section_name(header: &SectionHeader, table: Option<&[u8]>) -> String {
    if header.section_type == SectionType::Null {
        return String::new();
    }
    let Some(table) = table else {
        return String::new();
    };
    let index = header.name_index as usize;
    if index == 0 || index > table.len() {
        return String::new();
    }
    let name = &table[index..];
    let end = name.iter().position(|b| *b == 0).unwrap_or(name.len());
    String::from_utf8_lossy(&name[..end]).into_owned()
}
