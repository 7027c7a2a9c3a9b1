//! Randomly addressable byte sources. Everything the parsers read goes through an
//! [`AddressSpace`]: a flat file, a window into another space, or one of the remapping spaces
//! built by the container modules (ELF segments, PE sections, PDB pages, MSFZ fragments).
//!
//! Spaces are never mutated once built. New spaces are made by wrapping an existing one so
//! they are shared as `Arc<dyn AddressSpace>`.
pub mod mapped_file;
pub mod relative;

pub use mapped_file::*;
pub use relative::*;

use crate::error::{FormatError, Result};
use std::sync::Arc;

pub trait AddressSpace: Send + Sync {
    /// One past the largest readable position. Reads at or beyond this may short-read or fail
    /// depending on the space.
    fn len(&self) -> u64;

    /// Copies up to `buffer.len()` bytes starting at `position` and returns how many were
    /// copied. Unmapped ranges either short-read or fail depending on the space.
    fn read(&self, position: u64, buffer: &mut [u8]) -> Result<usize>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub type SharedSpace = Arc<dyn AddressSpace>;

impl AddressSpace for Vec<u8> {
    fn len(&self) -> u64 {
        self.as_slice().len() as u64
    }

    fn read(&self, position: u64, buffer: &mut [u8]) -> Result<usize> {
        read_slice(self, position, buffer)
    }
}

impl AddressSpace for Box<[u8]> {
    fn len(&self) -> u64 {
        (**self).len() as u64
    }

    fn read(&self, position: u64, buffer: &mut [u8]) -> Result<usize> {
        read_slice(self, position, buffer)
    }
}

/// Short-reads at the end of the slice, returns 0 past it.
pub(crate) fn read_slice(bytes: &[u8], position: u64, buffer: &mut [u8]) -> Result<usize> {
    let Ok(start) = usize::try_from(position) else {
        return Ok(0);
    };
    if start >= bytes.len() {
        return Ok(0);
    }
    let count = buffer.len().min(bytes.len() - start);
    buffer[..count].copy_from_slice(&bytes[start..start + count]);
    Ok(count)
}

/// Fills all of `buffer` or fails with a bad input error. Spaces are allowed to short-read at
/// internal boundaries so this keeps reading until a read returns nothing.
pub fn read_exact(space: &dyn AddressSpace, position: u64, buffer: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buffer.len() {
        let offset = crate::error::checked_add(position, filled as u64)?;
        let count = space.read(offset, &mut buffer[filled..])?;
        if count == 0 {
            return Err(FormatError::bad_format(format!(
                "Unexpected end of data: expected {} bytes at {position:#x}, got {filled}",
                buffer.len()
            )));
        }
        filled += count;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_short_reads() {
        let space: Vec<u8> = (0..10).collect();
        let mut buffer = [0xff; 4];
        assert_eq!(space.read(8, &mut buffer).unwrap(), 2);
        assert_eq!(buffer, [8, 9, 0xff, 0xff]);
        assert_eq!(space.read(10, &mut buffer).unwrap(), 0);
        assert_eq!(space.read(u64::MAX, &mut buffer).unwrap(), 0);
    }

    #[test]
    fn exact_reads() {
        let space: Vec<u8> = (0..10).collect();
        let mut buffer = [0; 3];
        read_exact(&space, 2, &mut buffer).unwrap();
        assert_eq!(buffer, [2, 3, 4]);

        let err = read_exact(&space, 8, &mut buffer).unwrap_err();
        assert!(matches!(err, FormatError::BadInputFormat(_)));
    }
}
