use super::{AddressSpace, read_slice};
use crate::error::Result;
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// A file on disk exposed as an address space.
pub struct MappedFile {
    path: PathBuf,
    bytes: Mmap,
}

impl MappedFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;

        // This is unsafe because it has undefined behavior if the underlying file is
        // modified while the memory map is in use.
        let bytes = unsafe { Mmap::map(&file) }?;
        tracing::debug!(path = %path.display(), len = bytes.len(), "mapped file");
        Ok(MappedFile { path, bytes })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AddressSpace for MappedFile {
    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read(&self, position: u64, buffer: &mut [u8]) -> Result<usize> {
        read_slice(&self.bytes, position, buffer)
    }
}
