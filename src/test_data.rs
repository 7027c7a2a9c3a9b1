//! Synthetic containers for the unit tests, built byte by byte.

fn put(bytes: &mut Vec<u8>, value: u64, size: usize, big_endian: bool) {
    let le = value.to_le_bytes();
    if big_endian {
        bytes.extend(le[..size].iter().rev());
    } else {
        bytes.extend(&le[..size]);
    }
}

fn pad_to(bytes: &mut Vec<u8>, alignment: usize) {
    while bytes.len() % alignment != 0 {
        bytes.push(0);
    }
}

/// One ELF note: header, name, and contents each padded to 4 bytes.
pub fn note_bytes(big_endian: bool, name: &str, note_type: u32, contents: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::new();
    put(&mut bytes, name.len() as u64 + 1, 4, big_endian);
    put(&mut bytes, contents.len() as u64, 4, big_endian);
    put(&mut bytes, note_type as u64, 4, big_endian);
    bytes.extend(name.as_bytes());
    bytes.push(0);
    pad_to(&mut bytes, 4);
    bytes.extend(contents);
    pad_to(&mut bytes, 4);
    bytes
}

enum SegmentData {
    Bytes(Vec<u8>),

    /// File offset zero through the end of the file, like the first LOAD segment of a
    /// shared library.
    WholeFile,
}

pub struct Segment {
    segment_type: u32,

    /// None means the same as the file offset.
    vaddr: Option<u64>,
    bss: u64,
    data: SegmentData,
}

impl Segment {
    pub fn load(vaddr: u64, data: Vec<u8>) -> Self {
        Segment {
            segment_type: 1,
            vaddr: Some(vaddr),
            bss: 0,
            data: SegmentData::Bytes(data),
        }
    }

    pub fn note(data: Vec<u8>) -> Self {
        Segment {
            segment_type: 4,
            vaddr: None,
            bss: 0,
            data: SegmentData::Bytes(data),
        }
    }

    pub fn whole_file(vaddr: u64) -> Self {
        Segment {
            segment_type: 1,
            vaddr: Some(vaddr),
            bss: 0,
            data: SegmentData::WholeFile,
        }
    }

    /// Extra virtual size without file bytes.
    pub fn with_bss(mut self, size: u64) -> Self {
        self.bss = size;
        self
    }
}

struct Section {
    name: String,
    section_type: u32,
    data: Vec<u8>,
}

pub struct ElfBuilder {
    big_endian: bool,
    is_64bit: bool,
    elf_type: u16,
    segments: Vec<Segment>,
    sections: Vec<Section>,
}

impl ElfBuilder {
    pub fn new(big_endian: bool, is_64bit: bool) -> Self {
        ElfBuilder {
            big_endian,
            is_64bit,
            elf_type: 3,
            segments: Vec::new(),
            sections: Vec::new(),
        }
    }

    pub fn elf_type(mut self, elf_type: u16) -> Self {
        self.elf_type = elf_type;
        self
    }

    pub fn segment(mut self, segment: Segment) -> Self {
        self.segments.push(segment);
        self
    }

    /// Sections get a null section in front and a .shstrtab at the end.
    pub fn section(mut self, name: &str, section_type: u32, data: Vec<u8>) -> Self {
        self.sections.push(Section {
            name: name.to_string(),
            section_type,
            data,
        });
        self
    }

    pub fn build(self) -> Vec<u8> {
        let be = self.big_endian;
        let word = if self.is_64bit { 8 } else { 4 };
        let header_size = if self.is_64bit { 64 } else { 52 };
        let ph_size = if self.is_64bit { 56 } else { 32 };
        let sh_size = if self.is_64bit { 64 } else { 40 };

        // segment and section data follow the program headers
        let mut data = vec![0u8; header_size + ph_size * self.segments.len()];
        pad_to(&mut data, 16);
        let mut segment_offsets = Vec::new();
        for segment in self.segments.iter() {
            match &segment.data {
                SegmentData::Bytes(bytes) => {
                    segment_offsets.push(data.len() as u64);
                    data.extend(bytes);
                    pad_to(&mut data, 16);
                }
                SegmentData::WholeFile => segment_offsets.push(0),
            }
        }

        let mut names = vec![0u8];
        let mut sections = Vec::new(); // (name index, type, offset, size)
        if !self.sections.is_empty() {
            sections.push((0, 0, 0, 0));
            for section in self.sections.iter() {
                let name = names.len() as u64;
                names.extend(section.name.as_bytes());
                names.push(0);
                sections.push((name, section.section_type, data.len() as u64, section.data.len() as u64));
                data.extend(&section.data);
                pad_to(&mut data, 16);
            }
            let name = names.len() as u64;
            names.extend(b".shstrtab\0");
            sections.push((name, 3, data.len() as u64, names.len() as u64));
            data.extend(&names);
            pad_to(&mut data, 16);
        }
        let section_offset = if sections.is_empty() { 0 } else { data.len() as u64 };
        let total = data.len() + sh_size * sections.len();

        let mut bytes = Vec::with_capacity(total);
        bytes.extend([0x7f, b'E', b'L', b'F']);
        bytes.push(if self.is_64bit { 2 } else { 1 });
        bytes.push(if be { 2 } else { 1 });
        bytes.extend([1, 0, 0, 0, 0, 0, 0, 0, 0, 0]); // version, osabi, abi version, padding
        put(&mut bytes, self.elf_type as u64, 2, be);
        put(&mut bytes, 0x3e, 2, be); // machine
        put(&mut bytes, 1, 4, be); // version
        put(&mut bytes, 0, word, be); // entry
        let ph_offset = if self.segments.is_empty() { 0 } else { header_size as u64 };
        put(&mut bytes, ph_offset, word, be);
        put(&mut bytes, section_offset, word, be);
        put(&mut bytes, 0, 4, be); // flags
        put(&mut bytes, header_size as u64, 2, be);
        put(&mut bytes, ph_size as u64, 2, be);
        put(&mut bytes, self.segments.len() as u64, 2, be);
        put(&mut bytes, sh_size as u64, 2, be);
        put(&mut bytes, sections.len() as u64, 2, be);
        let string_index = if sections.is_empty() { 0 } else { sections.len() - 1 };
        put(&mut bytes, string_index as u64, 2, be);
        assert_eq!(bytes.len(), header_size);

        for (segment, offset) in self.segments.iter().zip(segment_offsets) {
            let file_size = match &segment.data {
                SegmentData::Bytes(b) => b.len() as u64,
                SegmentData::WholeFile => total as u64,
            };
            let vaddr = segment.vaddr.unwrap_or(offset);
            let vsize = file_size + segment.bss;
            let flags = 4;
            put(&mut bytes, segment.segment_type as u64, 4, be);
            if self.is_64bit {
                put(&mut bytes, flags, 4, be);
            }
            put(&mut bytes, offset, word, be);
            put(&mut bytes, vaddr, word, be);
            put(&mut bytes, 0, word, be); // paddr
            put(&mut bytes, file_size, word, be);
            put(&mut bytes, vsize, word, be);
            if !self.is_64bit {
                put(&mut bytes, flags, 4, be);
            }
            put(&mut bytes, 0x1000, word, be);
        }

        bytes.extend(&data[bytes.len()..]);
        for (name, section_type, offset, size) in sections {
            put(&mut bytes, name, 4, be);
            put(&mut bytes, section_type as u64, 4, be);
            put(&mut bytes, 0, word, be); // flags
            put(&mut bytes, 0, word, be); // vaddr
            put(&mut bytes, offset, word, be);
            put(&mut bytes, size, word, be);
            put(&mut bytes, 0, 4, be); // link
            put(&mut bytes, 0, 4, be); // info
            put(&mut bytes, 1, word, be); // alignment
            put(&mut bytes, 0, word, be); // entry size
        }
        assert_eq!(bytes.len(), total);
        bytes
    }
}

/// An NT_FILE entry.
pub struct FileMapping {
    start: u64,
    stop: u64,
    page_offset: u64,
    path: Vec<u8>,
}

impl FileMapping {
    /// Paths are bytes since Linux paths needn't be UTF-8.
    pub fn new(start: u64, stop: u64, page_offset: u64, path: impl AsRef<[u8]>) -> Self {
        FileMapping {
            start,
            stop,
            page_offset,
            path: path.as_ref().to_vec(),
        }
    }
}

/// Little endian core file with an NT_FILE note segment followed by `loads`.
pub fn core_file(is_64bit: bool, files: &[FileMapping], loads: Vec<Segment>) -> Vec<u8> {
    let word = if is_64bit { 8 } else { 4 };
    let mut table = Vec::new();
    put(&mut table, files.len() as u64, word, false);
    put(&mut table, 0x1000, word, false);
    for file in files {
        put(&mut table, file.start, word, false);
        put(&mut table, file.stop, word, false);
        put(&mut table, file.page_offset, word, false);
    }
    for file in files {
        table.extend(&file.path);
        table.push(0);
    }

    let mut notes = note_bytes(false, "CORE", 1, &[0; 16]);
    notes.extend(note_bytes(false, "CORE", 0x46494c45, &table));

    let mut builder = ElfBuilder::new(false, is_64bit)
        .elf_type(4)
        .segment(Segment {
            segment_type: 4,
            vaddr: Some(0),
            bss: 0,
            data: SegmentData::Bytes(notes),
        });
    for load in loads {
        builder = builder.segment(load);
    }
    builder.build()
}

struct PeSection {
    name: String,
    rva: u32,
    data: Vec<u8>,
}

/// PE image with the PE header at 0x80 and each section's raw data 0x200 aligned.
pub struct PeBuilder {
    is_64bit: bool,
    sections: Vec<PeSection>,
    directories: [(u32, u32); 16],
}

impl PeBuilder {
    pub fn new(is_64bit: bool) -> Self {
        PeBuilder {
            is_64bit,
            sections: Vec::new(),
            directories: [(0, 0); 16],
        }
    }

    pub fn section(mut self, name: &str, rva: u32, data: Vec<u8>) -> Self {
        self.sections.push(PeSection {
            name: name.to_string(),
            rva,
            data,
        });
        self
    }

    pub fn directory(mut self, index: usize, rva: u32, size: u32) -> Self {
        self.directories[index] = (rva, size);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let word = if self.is_64bit { 8 } else { 4 };
        let optional_size = if self.is_64bit { 112 } else { 96 };
        let headers_size = 0x80 + 4 + 20 + optional_size + 8 * 16 + 40 * self.sections.len();
        let headers_size = headers_size.div_ceil(0x200) * 0x200;
        let image_size = self
            .sections
            .iter()
            .map(|s| s.rva as usize + s.data.len())
            .max()
            .unwrap_or(0)
            .div_ceil(0x1000)
            .max(1)
            * 0x1000;

        let mut bytes = vec![0u8; 0x80];
        bytes[..2].copy_from_slice(b"MZ");
        bytes[0x3c..0x40].copy_from_slice(&0x80u32.to_le_bytes());
        bytes.extend(b"PE\0\0");

        let machine = if self.is_64bit { 0x8664 } else { 0x14c };
        put(&mut bytes, machine, 2, false);
        put(&mut bytes, self.sections.len() as u64, 2, false);
        put(&mut bytes, 0x5f5e1000, 4, false); // timestamp
        put(&mut bytes, 0, 4, false); // symbol table
        put(&mut bytes, 0, 4, false); // symbol count
        put(&mut bytes, optional_size as u64 + 8 * 16, 2, false);
        put(&mut bytes, 0x2022, 2, false); // characteristics

        let start = bytes.len();
        put(&mut bytes, if self.is_64bit { 0x20b } else { 0x10b }, 2, false);
        bytes.extend([14, 0]); // linker version
        for _ in 0..5 {
            put(&mut bytes, 0, 4, false); // code sizes, entry point, base of code
        }
        if !self.is_64bit {
            put(&mut bytes, 0, 4, false); // base of data
        }
        put(&mut bytes, if self.is_64bit { 0x180000000 } else { 0x10000000 }, word, false);
        put(&mut bytes, 0x1000, 4, false);
        put(&mut bytes, 0x200, 4, false);
        for v in [6, 0, 0, 0, 6, 0] {
            put(&mut bytes, v, 2, false);
        }
        put(&mut bytes, 0, 4, false); // win32 version
        put(&mut bytes, image_size as u64, 4, false);
        put(&mut bytes, headers_size as u64, 4, false);
        put(&mut bytes, 0, 4, false); // checksum
        put(&mut bytes, 3, 2, false); // console subsystem
        put(&mut bytes, 0x8160, 2, false);
        for _ in 0..4 {
            put(&mut bytes, 0x100000, word, false);
        }
        put(&mut bytes, 0, 4, false); // loader flags
        put(&mut bytes, 16, 4, false);
        assert_eq!(bytes.len() - start, optional_size);

        for (rva, size) in self.directories {
            put(&mut bytes, rva as u64, 4, false);
            put(&mut bytes, size as u64, 4, false);
        }

        let mut raw_offset = headers_size;
        let mut raw_data = Vec::new();
        for section in self.sections.iter() {
            let mut name = [0u8; 8];
            name[..section.name.len()].copy_from_slice(section.name.as_bytes());
            let raw_size = section.data.len().div_ceil(0x200) * 0x200;
            bytes.extend(name);
            put(&mut bytes, section.data.len() as u64, 4, false);
            put(&mut bytes, section.rva as u64, 4, false);
            put(&mut bytes, raw_size as u64, 4, false);
            put(&mut bytes, raw_offset as u64, 4, false);
            bytes.extend([0u8; 12]); // relocations and line numbers
            put(&mut bytes, 0x40000040, 4, false);

            raw_data.extend(&section.data);
            raw_data.resize(raw_data.len() + raw_size - section.data.len(), 0);
            raw_offset += raw_size;
        }
        bytes.resize(headers_size, 0);
        bytes.extend(raw_data);
        bytes
    }
}

/// One IMAGE_DEBUG_DIRECTORY entry.
pub fn debug_entry(debug_type: u32, major: u16, minor: u16, size: u32, rva: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    put(&mut bytes, 0, 4, false); // characteristics
    put(&mut bytes, 0, 4, false); // timestamp
    put(&mut bytes, major as u64, 2, false);
    put(&mut bytes, minor as u64, 2, false);
    put(&mut bytes, debug_type as u64, 4, false);
    put(&mut bytes, size as u64, 4, false);
    put(&mut bytes, rva as u64, 4, false);
    put(&mut bytes, 0, 4, false); // file pointer
    bytes
}

/// Classic paged PDB. None streams are written with the nil size. Pages within each stream
/// are stored in reverse order so reads have to go through the page map.
pub fn msf_file(page_size: usize, streams: &[Option<Vec<u8>>]) -> Vec<u8> {
    // page 0 is the header, 1 and 2 are the free page maps
    let mut pages: Vec<Vec<u8>> = vec![Vec::new(); 3];
    let add_pages = |data: &[u8], pages: &mut Vec<Vec<u8>>| -> Vec<u32> {
        let chunks: Vec<Vec<u8>> = data.chunks(page_size).map(|c| c.to_vec()).collect();
        let first = pages.len();
        let mut indices = vec![0u32; chunks.len()];
        for (i, chunk) in chunks.into_iter().enumerate().rev() {
            indices[i] = pages.len() as u32;
            pages.push(chunk);
        }
        assert_eq!(pages.len(), first + indices.len());
        indices
    };

    let mut directory = Vec::new();
    put(&mut directory, streams.len() as u64, 4, false);
    for stream in streams {
        let size = stream.as_ref().map_or(0xffffffff, |s| s.len() as u64);
        put(&mut directory, size, 4, false);
    }
    for stream in streams.iter().flatten() {
        for index in add_pages(stream, &mut pages) {
            put(&mut directory, index as u64, 4, false);
        }
    }
    let directory_pages = add_pages(&directory, &mut pages);
    let mut root = Vec::new();
    for index in directory_pages {
        put(&mut root, index as u64, 4, false);
    }
    let root_pages = add_pages(&root, &mut pages);

    let mut header = b"Microsoft C/C++ MSF 7.00\r\n\x1aDS\0\0\0".to_vec();
    put(&mut header, page_size as u64, 4, false);
    put(&mut header, 1, 4, false); // free page map
    put(&mut header, pages.len() as u64, 4, false);
    put(&mut header, directory.len() as u64, 4, false);
    put(&mut header, 0, 4, false);
    for index in root_pages {
        put(&mut header, index as u64, 4, false);
    }
    pages[0] = header;

    let mut bytes = Vec::new();
    for mut page in pages {
        page.resize(page_size, 0);
        bytes.extend(page);
    }
    bytes
}

pub enum MsfzFragment {
    Data(Vec<u8>),

    /// Size of the uncompressed data, the chunk itself isn't written.
    Compressed(u32),
}

/// Uncompressed MSFZ file. None streams are nil streams.
pub fn msfz_file(streams: &[Option<Vec<MsfzFragment>>]) -> Vec<u8> {
    let mut bytes = vec![0u8; 80];
    let mut directory = Vec::new();
    for stream in streams {
        let Some(fragments) = stream else {
            put(&mut directory, 0xffffffff, 4, false);
            continue;
        };
        for fragment in fragments {
            match fragment {
                MsfzFragment::Data(data) => {
                    put(&mut directory, data.len() as u64, 4, false);
                    put(&mut directory, bytes.len() as u64, 8, false);
                    bytes.extend(data);
                }
                MsfzFragment::Compressed(size) => {
                    put(&mut directory, *size as u64, 4, false);
                    put(&mut directory, 0, 4, false); // chunk index
                    put(&mut directory, 0x80000000, 4, false);
                }
            }
        }
        put(&mut directory, 0, 4, false);
    }

    let mut header = b"Microsoft MSFZ Container\r\n\x1aALD\0\0".to_vec();
    put(&mut header, 0, 8, false); // version
    put(&mut header, bytes.len() as u64, 8, false); // stream directory
    put(&mut header, 0, 8, false); // chunk table
    put(&mut header, streams.len() as u64, 4, false);
    put(&mut header, 0, 4, false); // no compression
    put(&mut header, directory.len() as u64, 4, false);
    put(&mut header, directory.len() as u64, 4, false);
    put(&mut header, 0, 4, false); // chunk count
    put(&mut header, 0, 4, false); // chunk table size
    bytes[..80].copy_from_slice(&header);
    bytes.extend(directory);
    bytes
}
