use super::ImageSectionHeader;
use crate::address_space::{AddressSpace, SharedSpace};
use crate::error::{Result, checked_add};

/// Maps RVAs onto the raw data of the sections of a flat PE file. Addresses outside every
/// section read as zero bytes rather than failing.
pub struct PeRvaAddressSpace {
    inner: SharedSpace,
    base: u64,
    sections: Vec<ImageSectionHeader>,
    length: u64,
}

impl PeRvaAddressSpace {
    /// `base` is where the file starts within `inner`.
    pub fn new(inner: SharedSpace, base: u64, sections: &[ImageSectionHeader]) -> Self {
        let length = sections
            .iter()
            .map(|s| s.virtual_address as u64 + s.virtual_size as u64)
            .max()
            .unwrap_or(0);
        PeRvaAddressSpace {
            inner,
            base,
            sections: sections.to_vec(),
            length,
        }
    }
}

impl AddressSpace for PeRvaAddressSpace {
    fn len(&self) -> u64 {
        self.length
    }

    fn read(&self, position: u64, buffer: &mut [u8]) -> Result<usize> {
        let Some(section) = self.sections.iter().find(|s| s.contains(position)) else {
            return Ok(0);
        };

        // Stay within the section, the next one may not follow it in the file.
        let end = section.virtual_address as u64 + section.virtual_size as u64;
        let count = (buffer.len() as u64).min(end - position) as usize;
        let offset = checked_add(self.base, position - section.virtual_address as u64)?;
        let offset = checked_add(offset, section.pointer_to_raw_data as u64)?;
        self.inner.read(offset, &mut buffer[..count])
    }
}
