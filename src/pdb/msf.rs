//! The classic MSF container. The file is an array of fixed size pages and each stream is a
//! list of (not necessarily contiguous) pages. The stream directory, which lists the size and
//! pages of every stream, is itself paged and the pages holding its page list are named by
//! the root indices that follow the header.
use crate::address_space::{AddressSpace, SharedSpace};
use crate::error::{FormatError, Result, checked_add, checked_mul};
use crate::layout::{Descriptor, Record, Struct, descriptor};
use crate::reader::Reader;
use std::sync::Arc;

pub const MSF_MAGIC: &[u8; 32] = b"Microsoft C/C++ MSF 7.00\r\n\x1aDS\0\0\0";

/// Streams of this size are unused.
const NIL_STREAM_SIZE: u32 = 0xffffffff;

#[derive(Clone, Debug)]
pub struct MsfFileHeader {
    pub magic: Vec<u8>,
    pub page_size: u32,
    pub free_page_map: u32,
    pub page_count: u32,
    pub directory_size: u32,
}

impl Struct for MsfFileHeader {
    const DESCRIPTOR: &'static Descriptor = descriptor!("PdbMsfFileHeader" {
        "Magic": Bytes(32),
        "PageSize": U32,
        "FreePageMap": U32,
        "PageCount": U32,
        "DirectorySize": U32,
        "Reserved": U32,
    });

    fn from_record(record: &Record) -> Result<Self> {
        Ok(MsfFileHeader {
            magic: record.bytes("Magic")?.to_vec(),
            page_size: record.u32("PageSize")?,
            free_page_map: record.u32("FreePageMap")?,
            page_count: record.u32("PageCount")?,
            directory_size: record.u32("DirectorySize")?,
        })
    }
}

impl MsfFileHeader {
    pub fn is_magic_valid(&self) -> bool {
        self.magic == MSF_MAGIC
    }
}

/// Remaps virtual pages onto physical pages: virtual page `v` is physical page
/// `page_indices[v]`.
pub struct PagedAddressSpace {
    physical: SharedSpace,
    page_indices: Vec<u32>,
    page_size: u32,
    length: u64,
}

impl PagedAddressSpace {
    pub fn new(physical: SharedSpace, page_indices: Vec<u32>, page_size: u32, length: u64) -> Self {
        PagedAddressSpace {
            physical,
            page_indices,
            page_size,
            length,
        }
    }

    fn physical_address(&self, position: u64) -> Result<(u64, u64)> {
        let page_size = self.page_size as u64;
        if page_size == 0 {
            return Err(FormatError::bad_format("PDB page size is zero"));
        }
        let virtual_page = position / page_size;
        let offset = position % page_size;
        let Some(physical_page) = self.page_indices.get(virtual_page as usize) else {
            return Err(FormatError::bad_format(format!(
                "PDB page {virtual_page} is missing from the page map"
            )));
        };
        Ok((checked_mul(*physical_page as u64, page_size)? + offset, offset))
    }
}

impl AddressSpace for PagedAddressSpace {
    fn len(&self) -> u64 {
        self.length
    }

    /// Reads past the end fail rather than short-read.
    fn read(&self, position: u64, buffer: &mut [u8]) -> Result<usize> {
        let count = buffer.len();
        if checked_add(position, count as u64)? > self.length {
            return Err(FormatError::bad_format(format!(
                "Unexpected end of data: expected {count} bytes at {position:#x} in a {:#x} byte stream",
                self.length
            )));
        }

        let mut read = 0;
        while read < count {
            let (physical, offset) = self.physical_address(position + read as u64)?;
            let wanted = ((self.page_size as u64 - offset) as usize).min(count - read);
            let actual = self.physical.read(physical, &mut buffer[read..read + wanted])?;
            read += actual;
            if actual != wanted {
                break;
            }
        }
        Ok(read)
    }
}

struct StreamInfo {
    size: u32,
    pages: Vec<u32>,
}

pub struct MsfFile {
    data_source: SharedSpace,
    page_size: u32,
    streams: Vec<StreamInfo>,
}

impl MsfFile {
    /// Reads the stream directory. `header` must already have a valid magic.
    pub fn open(reader: &Reader, header: &MsfFileHeader) -> Result<MsfFile> {
        let page_size = header.page_size;
        if page_size == 0 {
            return Err(FormatError::bad_format("PDB page size is zero"));
        }
        let data_source = reader.data_source().clone();

        let directory_pages = page_count(header.directory_size as u64, page_size);
        let root_size = checked_mul(directory_pages, 4)?;
        let root_position = reader.size_of::<MsfFileHeader>()?;
        let root_indices = reader.read_u32_array(root_position, page_count(root_size, page_size))?;

        let root = PagedAddressSpace::new(data_source.clone(), root_indices, page_size, root_size);
        let directory_indices = Reader::new(Arc::new(root)).read_u32_array(0, directory_pages)?;

        let directory = PagedAddressSpace::new(
            data_source.clone(),
            directory_indices,
            page_size,
            header.directory_size as u64,
        );
        let directory = Reader::new(Arc::new(directory));
        let count = directory.read_u32(0)? as u64;
        let sizes = directory.read_u32_array(4, count)?;
        let mut position = checked_add(4, checked_mul(count, 4)?)?;

        let mut streams = Vec::with_capacity(sizes.len());
        for size in sizes {
            let size = if size == NIL_STREAM_SIZE { 0 } else { size };
            let pages = directory.read_u32_array(position, page_count(size as u64, page_size))?;
            position += pages.len() as u64 * 4;
            streams.push(StreamInfo { size, pages });
        }
        tracing::debug!(page_size, streams = streams.len(), "read MSF stream directory");

        Ok(MsfFile {
            data_source,
            page_size,
            streams,
        })
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn num_streams(&self) -> u32 {
        self.streams.len() as u32
    }

    pub fn stream_size(&self, stream: u32) -> Result<u32> {
        Ok(self.stream_info(stream)?.size)
    }

    pub fn get_stream(&self, stream: u32) -> Result<Reader> {
        let info = self.stream_info(stream)?;
        let space = PagedAddressSpace::new(
            self.data_source.clone(),
            info.pages.clone(),
            self.page_size,
            info.size as u64,
        );
        Ok(Reader::new(Arc::new(space)))
    }

    fn stream_info(&self, stream: u32) -> Result<&StreamInfo> {
        self.streams.get(stream as usize).ok_or_else(|| {
            FormatError::InvalidArgument(format!(
                "stream {stream} is out of range, the PDB has {} streams",
                self.streams.len()
            ))
        })
    }
}

fn page_count(size: u64, page_size: u32) -> u64 {
    size.div_ceil(page_size as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_data::msf_file;

    fn open(bytes: Vec<u8>) -> MsfFile {
        let reader = Reader::new(Arc::new(bytes));
        let header: MsfFileHeader = reader.read(0).unwrap();
        assert!(header.is_magic_valid());
        MsfFile::open(&reader, &header).unwrap()
    }

    #[test]
    fn paged_reads() {
        let physical: SharedSpace = Arc::new((0u8..=255).collect::<Vec<u8>>());
        let space = PagedAddressSpace::new(physical, vec![7, 9], 0x10, 0x20);
        let mut buffer = [0; 4];
        assert_eq!(space.read(0x16, &mut buffer).unwrap(), 4);
        assert_eq!(buffer, [0x96, 0x97, 0x98, 0x99]);

        // spans virtual pages 0 and 1
        assert_eq!(space.read(0x0e, &mut buffer).unwrap(), 4);
        assert_eq!(buffer, [0x7e, 0x7f, 0x90, 0x91]);

        assert!(matches!(
            space.read(0x1e, &mut buffer),
            Err(FormatError::BadInputFormat(_))
        ));
    }

    #[test]
    fn streams() {
        let big: Vec<u8> = (0..600u32).map(|i| i as u8).collect();
        let file = open(msf_file(
            0x100,
            &[Some(vec![1, 2, 3]), Some(big.clone()), None, Some(Vec::new())],
        ));
        assert_eq!(file.page_size(), 0x100);
        assert_eq!(file.num_streams(), 4);
        assert_eq!(file.stream_size(2).unwrap(), 0);
        assert_eq!(file.stream_size(3).unwrap(), 0);

        let stream = file.get_stream(0).unwrap();
        assert_eq!(stream.read_bytes(0, 3).unwrap(), vec![1, 2, 3]);

        let stream = file.get_stream(1).unwrap();
        assert_eq!(stream.len(), 600);
        assert_eq!(stream.read_bytes(0, 600).unwrap(), big);
        assert_eq!(stream.read_u32(0xfe).unwrap(), u32::from_le_bytes([0xfe, 0xff, 0, 1]));
        assert!(stream.read_u32(598).is_err());

        assert!(matches!(
            file.get_stream(4),
            Err(FormatError::InvalidArgument(_))
        ));
    }

    #[test]
    fn large_directory() {
        // enough streams that the directory needs several pages
        let streams: Vec<Option<Vec<u8>>> = (0..40u8).map(|i| Some(vec![i; 3])).collect();
        let file = open(msf_file(0x40, &streams));
        assert_eq!(file.num_streams(), 40);
        assert_eq!(file.get_stream(39).unwrap().read_bytes(0, 3).unwrap(), vec![39; 3]);
    }
}
