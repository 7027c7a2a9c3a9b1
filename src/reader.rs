//! Typed reads out of an address space. A [`Reader`] pairs an address space with the
//! [`LayoutManager`] for one architecture. It holds no decoded state so it's cheap to clone and
//! to rewrap over another space.
use crate::address_space::{RelativeAddressSpace, SharedSpace, read_exact};
use crate::error::{FormatError, Result, checked_add, checked_mul};
use crate::layout::{Descriptor, LayoutManager, Record, Struct, decode_uint};
use std::sync::Arc;

const MAX_PREALLOCATED: u64 = 4096;

#[derive(Clone)]
pub struct Reader {
    space: SharedSpace,
    layouts: LayoutManager,
}

impl Reader {
    /// Little endian reader for records that don't depend on the architecture.
    pub fn new(space: SharedSpace) -> Self {
        Reader::with_layouts(space, LayoutManager::default())
    }

    pub fn with_layouts(space: SharedSpace, layouts: LayoutManager) -> Self {
        Reader { space, layouts }
    }

    pub fn data_source(&self) -> &SharedSpace {
        &self.space
    }

    pub fn layouts(&self) -> &LayoutManager {
        &self.layouts
    }

    pub fn len(&self) -> u64 {
        self.space.len()
    }

    pub fn is_empty(&self) -> bool {
        self.space.len() == 0
    }

    /// Same layouts over `[base, base + len)` of this reader's space.
    pub fn with_relative_address_space(&self, base: u64, len: u64) -> Reader {
        let space = RelativeAddressSpace::new(self.space.clone(), base, len);
        self.with_address_space(Arc::new(space))
    }

    /// Same layouts over a different space.
    pub fn with_address_space(&self, space: SharedSpace) -> Reader {
        Reader {
            space,
            layouts: self.layouts.clone(),
        }
    }

    pub fn size_of<T: Struct>(&self) -> Result<u64> {
        self.layouts.size_of(T::DESCRIPTOR)
    }

    pub fn read<T: Struct>(&self, position: u64) -> Result<T> {
        T::from_record(&self.read_record(T::DESCRIPTOR, position)?)
    }

    pub fn read_record(&self, descriptor: &'static Descriptor, position: u64) -> Result<Record> {
        let layout = self.layouts.layout(descriptor)?;
        let mut bytes = vec![0; layout.size as usize];
        read_exact(self.space.as_ref(), position, &mut bytes)?;
        Record::new(layout, bytes, self.layouts.is_big_endian())
    }

    pub fn read_array<T: Struct>(&self, position: u64, count: u64) -> Result<Vec<T>> {
        let size = self.size_of::<T>()?;
        self.check_range(position, checked_mul(size, count)?)?;

        // count comes from the file, virtual spaces can be far larger than the data behind them
        let mut result = Vec::with_capacity(count.min(MAX_PREALLOCATED) as usize);
        let mut offset = position;
        for _ in 0..count {
            result.push(self.read(offset)?);
            offset += size;
        }
        Ok(result)
    }

    /// Exactly `count` bytes, the range must lie within the space.
    pub fn read_bytes(&self, position: u64, count: u64) -> Result<Vec<u8>> {
        self.check_range(position, count)?;
        let mut bytes = vec![0; count as usize];
        read_exact(self.space.as_ref(), position, &mut bytes)?;
        Ok(bytes)
    }

    /// Raw read that may return fewer bytes than asked for.
    pub fn read_into(&self, position: u64, buffer: &mut [u8]) -> Result<usize> {
        self.space.read(position, buffer)
    }

    pub fn read_u8(&self, position: u64) -> Result<u8> {
        Ok(self.read_uint(position, 1)? as u8)
    }

    pub fn read_u16(&self, position: u64) -> Result<u16> {
        Ok(self.read_uint(position, 2)? as u16)
    }

    pub fn read_u32(&self, position: u64) -> Result<u32> {
        Ok(self.read_uint(position, 4)? as u32)
    }

    pub fn read_u64(&self, position: u64) -> Result<u64> {
        self.read_uint(position, 8)
    }

    pub fn read_i32(&self, position: u64) -> Result<i32> {
        Ok(self.read_uint(position, 4)? as u32 as i32)
    }

    /// Either a u32 or u64 depending on the pointer size but always returned as 64 bits.
    pub fn read_size_t(&self, position: u64) -> Result<u64> {
        self.read_uint(position, self.layouts.pointer_size() as usize)
    }

    pub fn read_u32_array(&self, position: u64, count: u64) -> Result<Vec<u32>> {
        let bytes = self.read_bytes(position, checked_mul(count, 4)?)?;
        let big_endian = self.layouts.is_big_endian();
        Ok(bytes
            .chunks_exact(4)
            .map(|c| decode_uint(c, big_endian) as u32)
            .collect())
    }

    /// Reads a null-terminated string. The string ends at the first zero byte or at the end of
    /// the address space, whichever comes first. Invalid UTF-8 is replaced.
    pub fn read_string(&self, position: u64) -> Result<String> {
        let bytes = self.read_string_bytes(position)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// The raw bytes of a null-terminated string, without the terminator.
    pub fn read_string_bytes(&self, position: u64) -> Result<Vec<u8>> {
        let len = self.len();
        if position >= len {
            return Err(FormatError::bad_format(format!(
                "string at {position:#x} is past the end of the data ({len:#x})"
            )));
        }

        let mut bytes = Vec::new();
        let mut chunk = [0u8; 64];
        let mut offset = position;
        while offset < len {
            let wanted = (chunk.len() as u64).min(len - offset) as usize;
            let count = self.space.read(offset, &mut chunk[..wanted])?;
            if count == 0 {
                if bytes.is_empty() && offset == position {
                    return Err(FormatError::bad_format(format!(
                        "string at {position:#x} is not readable"
                    )));
                }
                break;
            }
            if let Some(end) = chunk[..count].iter().position(|b| *b == 0) {
                bytes.extend_from_slice(&chunk[..end]);
                break;
            }
            bytes.extend_from_slice(&chunk[..count]);
            offset += count as u64;
        }
        Ok(bytes)
    }

    pub fn stream(&self, position: u64) -> Stream<'_> {
        Stream::new(self, position)
    }

    fn read_uint(&self, position: u64, size: usize) -> Result<u64> {
        let mut bytes = [0u8; 8];
        read_exact(self.space.as_ref(), position, &mut bytes[..size])?;
        Ok(decode_uint(&bytes[..size], self.layouts.is_big_endian()))
    }

    // Sizes come from the input so check them before allocating.
    fn check_range(&self, position: u64, count: u64) -> Result<()> {
        let end = checked_add(position, count)?;
        if end > self.len() {
            return Err(FormatError::bad_format(format!(
                "Unexpected end of data: {count:#x} bytes at {position:#x} but the data is only {:#x} bytes",
                self.len()
            )));
        }
        Ok(())
    }
}

/// Cursor over a reader, each read advances the position.
pub struct Stream<'a> {
    pub reader: &'a Reader,
    pub position: u64,
}

impl<'a> Stream<'a> {
    pub fn new(reader: &'a Reader, position: u64) -> Self {
        Stream { reader, position }
    }

    pub fn read<T: Struct>(&mut self) -> Result<T> {
        let value = self.reader.read(self.position)?;
        self.position += self.reader.size_of::<T>()?;
        Ok(value)
    }

    pub fn read_array<T: Struct>(&mut self, count: u64) -> Result<Vec<T>> {
        let values = self.reader.read_array(self.position, count)?;
        self.position += self.reader.size_of::<T>()? * count;
        Ok(values)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let value = self.reader.read_u16(self.position)?;
        self.position += 2;
        Ok(value)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let value = self.reader.read_u32(self.position)?;
        self.position += 4;
        Ok(value)
    }

    pub fn read_size_t(&mut self) -> Result<u64> {
        let value = self.reader.read_size_t(self.position)?;
        self.position += self.reader.layouts().pointer_size();
        Ok(value)
    }

    pub fn read_bytes(&mut self, count: u64) -> Result<Vec<u8>> {
        let bytes = self.reader.read_bytes(self.position, count)?;
        self.position += count;
        Ok(bytes)
    }

    /// Reads a null-terminated string and steps over the terminator.
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.reader.read_string_bytes(self.position)?;
        self.position += bytes.len() as u64 + 1;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_space::AddressSpace;
    use crate::layout::descriptor;

    struct Pair {
        tag: u16,
        value: u64,
    }

    impl Struct for Pair {
        const DESCRIPTOR: &'static Descriptor = descriptor!("ReaderTestPair" {
            "Tag": U16,
            "Value": SizeT,
        });

        fn from_record(record: &Record) -> Result<Self> {
            Ok(Pair {
                tag: record.u16("Tag")?,
                value: record.size_t("Value")?,
            })
        }
    }

    fn reader(bytes: Vec<u8>, layouts: LayoutManager) -> Reader {
        Reader::with_layouts(Arc::new(bytes), layouts)
    }

    #[test]
    fn records_follow_pointer_size() {
        let mut bytes = vec![0u8; 24];
        bytes[0] = 1;
        bytes[4..8].copy_from_slice(&0xaabbccddu32.to_le_bytes());
        bytes[8] = 2;
        bytes[12..16].copy_from_slice(&0x11223344u32.to_le_bytes());
        let r = reader(bytes, LayoutManager::new(false, 4));

        assert_eq!(r.size_of::<Pair>().unwrap(), 8);
        let pairs: Vec<Pair> = r.read_array(0, 2).unwrap();
        assert_eq!(pairs[0].tag, 1);
        assert_eq!(pairs[0].value, 0xaabbccdd);
        assert_eq!(pairs[1].tag, 2);
        assert_eq!(pairs[1].value, 0x11223344);

        assert!(matches!(
            r.read_array::<Pair>(0, 4),
            Err(FormatError::BadInputFormat(_))
        ));
        assert!(matches!(
            r.read_array::<Pair>(0, u64::MAX),
            Err(FormatError::Overflow(_))
        ));
    }

    #[test]
    fn primitives_and_endianness() {
        let bytes = vec![0x12, 0x34, 0x56, 0x78];
        let le = reader(bytes.clone(), LayoutManager::new(false, 4));
        let be = reader(bytes, LayoutManager::new(true, 4));
        assert_eq!(le.read_u32(0).unwrap(), 0x78563412);
        assert_eq!(be.read_u32(0).unwrap(), 0x12345678);
        assert_eq!(be.read_u16(2).unwrap(), 0x5678);
        assert_eq!(be.read_size_t(0).unwrap(), 0x12345678);
        assert!(matches!(be.read_u32(1), Err(FormatError::BadInputFormat(_))));
    }

    #[test]
    fn strings() {
        let mut bytes = b"hello\0world".to_vec();
        bytes.extend(std::iter::repeat_n(b'x', 100));
        let r = reader(bytes, LayoutManager::default());
        assert_eq!(r.read_string(0).unwrap(), "hello");
        assert_eq!(r.read_string(3).unwrap(), "lo");

        // unterminated strings stop at the end of the space
        let s = r.read_string(6).unwrap();
        assert_eq!(s.len(), 105);
        assert!(s.starts_with("worldxx"));

        assert!(r.read_string(200).is_err());

        let mut stream = r.stream(0);
        assert_eq!(stream.read_string().unwrap(), "hello");
        assert_eq!(stream.position, 6);
    }

    /// Claims a huge length but only the first 16 bytes are backed.
    struct Sparse;

    impl AddressSpace for Sparse {
        fn len(&self) -> u64 {
            1 << 60
        }

        fn read(&self, position: u64, buffer: &mut [u8]) -> Result<usize> {
            let backed = 16u64.saturating_sub(position).min(buffer.len() as u64) as usize;
            buffer[..backed].fill(7);
            Ok(backed)
        }
    }

    #[test]
    fn huge_counts_over_sparse_spaces() {
        let r = Reader::with_layouts(Arc::new(Sparse), LayoutManager::new(false, 4));
        assert!(matches!(
            r.read_array::<Pair>(0, 1 << 40),
            Err(FormatError::BadInputFormat(_))
        ));
        assert_eq!(r.read_array::<Pair>(0, 2).unwrap().len(), 2);
    }

    #[test]
    fn strings_with_invalid_utf8() {
        let bytes = b"/tmp/\xff\xfeapp\0/lib/libc.so.6\0".to_vec();
        let r = reader(bytes, LayoutManager::default());
        assert_eq!(r.read_string_bytes(0).unwrap(), b"/tmp/\xff\xfeapp");

        // the cursor steps over the raw bytes, not the replacement characters
        let mut stream = r.stream(0);
        assert_eq!(stream.read_string().unwrap(), "/tmp/\u{fffd}\u{fffd}app");
        assert_eq!(stream.position, 11);
        assert_eq!(stream.read_string().unwrap(), "/lib/libc.so.6");
    }

    #[test]
    fn relative_readers() {
        let r = reader((0u8..16).collect(), LayoutManager::new(true, 8));
        let window = r.with_relative_address_space(4, 4);
        assert_eq!(window.len(), 4);
        assert_eq!(window.read_u32(0).unwrap(), 0x04050607);
        assert!(window.read_u32(2).is_err());
        assert_eq!(window.layouts(), r.layouts());
    }

    #[test]
    fn stream_cursor() {
        let mut bytes = Vec::new();
        bytes.extend(0x0102u16.to_le_bytes());
        bytes.extend(0x03040506u32.to_le_bytes());
        bytes.extend(0x0708u64.to_le_bytes());
        bytes.extend(b"abc");
        let r = reader(bytes, LayoutManager::default());

        let mut s = r.stream(0);
        assert_eq!(s.read_u16().unwrap(), 0x0102);
        assert_eq!(s.read_u32().unwrap(), 0x03040506);
        assert_eq!(s.read_size_t().unwrap(), 0x0708);
        assert_eq!(s.read_bytes(3).unwrap(), b"abc");
        assert_eq!(s.position, 17);
        assert!(s.read_u16().is_err());
    }
}
