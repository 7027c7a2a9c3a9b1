use super::{AddressSpace, SharedSpace};
use crate::error::{Result, checked_add};

/// Maps `[0, len)` onto `[base, base + len)` of another space. Used to isolate the bytes of a
/// segment, section or note.
pub struct RelativeAddressSpace {
    inner: SharedSpace,
    base: u64,
    length: u64,
}

impl RelativeAddressSpace {
    pub fn new(inner: SharedSpace, base: u64, length: u64) -> Self {
        RelativeAddressSpace {
            inner,
            base,
            length,
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }
}

impl AddressSpace for RelativeAddressSpace {
    fn len(&self) -> u64 {
        self.length
    }

    fn read(&self, position: u64, buffer: &mut [u8]) -> Result<usize> {
        if position >= self.length {
            return Ok(0);
        }
        let available = self.length - position;
        let count = if (buffer.len() as u64) > available {
            available as usize
        } else {
            buffer.len()
        };
        let inner_position = checked_add(self.base, position)?;
        self.inner.read(inner_position, &mut buffer[..count])
    }
}
