//! Maps virtual addresses onto the file bytes of LOAD segments, i.e. the memory of the
//! process as recorded by a core file.
use super::{ElfSegment, SegmentType};
use crate::address_space::AddressSpace;
use crate::error::{FormatError, Result};

pub struct ElfVirtualAddressSpace {
    segments: Vec<ElfSegment>,
    len: u64,
}

impl ElfVirtualAddressSpace {
    /// Segments that aren't LOAD or have no file bytes are ignored.
    pub fn new(segments: &[ElfSegment]) -> Self {
        let segments: Vec<ElfSegment> = segments
            .iter()
            .filter(|s| s.header.segment_type == SegmentType::Load && s.header.file_size > 0)
            .cloned()
            .collect();
        let len = segments
            .iter()
            .map(|s| s.header.virtual_address.saturating_add(s.header.virtual_size))
            .max()
            .unwrap_or(0);
        ElfVirtualAddressSpace { segments, len }
    }

    fn find(&self, address: u64) -> Option<&ElfSegment> {
        self.segments.iter().find(|s| {
            let start = s.header.virtual_address;
            start <= address && address - start < s.header.virtual_size
        })
    }
}

impl AddressSpace for ElfVirtualAddressSpace {
    fn len(&self) -> u64 {
        self.len
    }

    /// Reads across adjacent segments. Once a gap is hit (an address outside every segment or
    /// the part of a segment without file bytes) the rest of the buffer is zeroed. It's an
    /// error if nothing at all could be read.
    fn read(&self, position: u64, buffer: &mut [u8]) -> Result<usize> {
        if buffer.is_empty() {
            return Ok(0);
        }

        let mut count = 0;
        let mut address = position;
        while count < buffer.len() {
            let Some(segment) = self.find(address) else {
                break;
            };
            let offset = address - segment.header.virtual_address;
            let available = segment.header.virtual_size - offset;
            let wanted = ((buffer.len() - count) as u64).min(available) as usize;
            let n = segment
                .contents
                .read_into(offset, &mut buffer[count..count + wanted])?;
            if n == 0 {
                break;
            }
            count += n;
            address += n as u64;
        }

        if count == 0 {
            return Err(FormatError::InvalidVirtualAddress {
                address: position,
                count: buffer.len(),
            });
        }
        buffer[count..].fill(0);
        Ok(count)
    }
}
