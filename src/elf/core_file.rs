//! Core files record the memory of a crashed process. The NT_FILE note lists the files that
//! were memory mapped into the process which lets us find the loaded executable and shared
//! libraries, each of which can be parsed as an ELF file within the core's address space.
use super::{ElfFile, ElfHeaderType, ElfSegment, NT_FILE, NoteList, SegmentType};
use crate::address_space::SharedSpace;
use crate::error::{FormatError, Result};
use crate::layout::{Descriptor, Record, Struct, descriptor};
use crate::reader::Reader;
use crate::utils;
use rangemap::RangeMap;
use std::collections::HashMap;
use std::sync::OnceLock;

struct FileTableHeader {
    entry_count: u64,
    page_size: u64,
}

impl Struct for FileTableHeader {
    const DESCRIPTOR: &'static Descriptor = descriptor!("ElfFileTableHeader" {
        "EntryCount": SizeT,
        "PageSize": SizeT,
    });

    fn from_record(record: &Record) -> Result<Self> {
        Ok(FileTableHeader {
            entry_count: record.size_t("EntryCount")?,
            page_size: record.size_t("PageSize")?,
        })
    }
}

struct FileTableEntryPointers {
    start: u64,
    stop: u64,
    page_offset: u64,
}

impl Struct for FileTableEntryPointers {
    const DESCRIPTOR: &'static Descriptor = descriptor!("ElfFileTableEntryPointers" {
        "Start": SizeT,
        "Stop": SizeT,
        "PageOffset": SizeT,
    });

    fn from_record(record: &Record) -> Result<Self> {
        Ok(FileTableEntryPointers {
            start: record.size_t("Start")?,
            stop: record.size_t("Stop")?,
            page_offset: record.size_t("PageOffset")?,
        })
    }
}

/// One memory mapped range of a file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ElfFileTableEntry {
    pub start: u64,
    pub stop: u64,

    /// Offset into the file in pages.
    pub page_offset: u64,
    pub path: String,
}

#[derive(Clone, Debug)]
pub struct ElfFileTable {
    pub page_size: u64,
    pub files: Vec<ElfFileTableEntry>,
}

impl ElfFileTable {
    /// `reader` is over the contents of the NT_FILE note: a count and page size, then the
    /// address ranges, then the paths.
    pub fn new(reader: &Reader) -> Result<Self> {
        let mut s = reader.stream(0);
        let header: FileTableHeader = s.read()?;
        let pointers: Vec<FileTableEntryPointers> = s.read_array(header.entry_count)?;
        let mut files = Vec::with_capacity(pointers.len());
        for p in pointers {
            // Linux appends this to the names of unloaded modules.
            let path = s.read_string()?.replace(" (deleted)", "");
            files.push(ElfFileTableEntry {
                start: p.start,
                stop: p.stop,
                page_offset: p.page_offset,
                path,
            });
        }
        Ok(ElfFileTable {
            page_size: header.page_size,
            files,
        })
    }
}

/// A file that was loaded into the process, e.g. the executable or a shared library.
pub struct ElfLoadedImage {
    pub path: String,
    pub load_address: u64,

    /// The ranges of the file table entries for this path.
    pub ranges: Vec<std::ops::Range<u64>>,

    /// The image parsed at its load address within the core's address space.
    pub image: ElfFile,
}

/// The header is normally mapped by the first entry with a zero page offset. Some dumps (e.g.
/// macOS ELF dumps) have no such entry in which case the lowest address is used.
pub fn image_load_address<'a>(entries: impl IntoIterator<Item = &'a ElfFileTableEntry>) -> u64 {
    let mut load_address = None;
    let mut minimum = u64::MAX;
    for entry in entries {
        if load_address.is_none() && entry.page_offset == 0 && entry.start != 0 {
            load_address = Some(entry.start);
        }
        minimum = minimum.min(entry.start);
    }
    load_address.unwrap_or(minimum)
}

pub struct ElfCoreFile {
    elf: ElfFile,
    file_table: OnceLock<ElfFileTable>,
    images: OnceLock<Vec<ElfLoadedImage>>,
    image_ranges: OnceLock<RangeMap<u64, usize>>,
}

impl ElfCoreFile {
    pub fn new(data_source: SharedSpace) -> Self {
        ElfCoreFile {
            elf: ElfFile::new(data_source, 0, false),
            file_table: OnceLock::new(),
            images: OnceLock::new(),
            image_ranges: OnceLock::new(),
        }
    }

    pub fn elf(&self) -> &ElfFile {
        &self.elf
    }

    pub fn is_valid(&self) -> bool {
        self.elf.is_valid()
            && self
                .elf
                .header()
                .is_ok_and(|h| h.header_type == ElfHeaderType::Core)
    }

    pub fn is_64bit(&self) -> Result<bool> {
        self.elf.is_64bit()
    }

    pub fn segments(&self) -> Result<&[ElfSegment]> {
        self.elf.segments()
    }

    /// The process's virtual address space.
    pub fn data_source(&self) -> Result<&SharedSpace> {
        Ok(self.elf.virtual_address_reader()?.data_source())
    }

    pub fn file_table(&self) -> Result<&ElfFileTable> {
        utils::get_or_try_init(&self.file_table, || {
            for segment in self.elf.segments()? {
                if segment.header.segment_type != SegmentType::Note {
                    continue;
                }
                for note in NoteList::new(segment.contents.clone()) {
                    let note = note?;
                    if note.header.note_type == NT_FILE {
                        return ElfFileTable::new(&note.contents()?);
                    }
                }
            }
            Err(FormatError::bad_format("No ELF file table found"))
        })
    }

    /// Images in file table order, one per distinct path.
    pub fn loaded_images(&self) -> Result<&[ElfLoadedImage]> {
        utils::get_or_try_init(&self.images, || self.read_loaded_images()).map(|i| i.as_slice())
    }

    /// The image with a file table range containing `address`.
    pub fn image_containing(&self, address: u64) -> Result<Option<&ElfLoadedImage>> {
        let images = self.loaded_images()?;
        let ranges = utils::get_or_try_init(&self.image_ranges, || {
            let mut ranges = RangeMap::new();
            for (index, image) in images.iter().enumerate() {
                for range in image.ranges.iter().filter(|r| !r.is_empty()) {
                    ranges.insert(range.clone(), index);
                }
            }
            Ok(ranges)
        })?;
        Ok(ranges.get(&address).map(|index| &images[*index]))
    }

    fn read_loaded_images(&self) -> Result<Vec<ElfLoadedImage>> {
        let mut paths: Vec<&str> = Vec::new();
        let mut entries: HashMap<&str, Vec<&ElfFileTableEntry>> = HashMap::new();
        for entry in self.file_table()?.files.iter() {
            if entry.path.starts_with("/dev/zero") || entry.path.starts_with("/run/shm") {
                continue;
            }
            entries
                .entry(entry.path.as_str())
                .or_insert_with(|| {
                    paths.push(entry.path.as_str());
                    Vec::new()
                })
                .push(entry);
        }

        let data_source = self.data_source()?;
        let mut images = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(entries) = entries.get(path) else {
                continue;
            };
            let load_address = image_load_address(entries.iter().copied());
            tracing::trace!("{path} loaded at {load_address:#x}");
            images.push(ElfLoadedImage {
                path: path.to_string(),
                load_address,
                ranges: entries.iter().map(|e| e.start..e.stop).collect(),
                image: ElfFile::new(data_source.clone(), load_address, true),
            });
        }
        Ok(images)
    }
}
