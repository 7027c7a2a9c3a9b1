//! Resource directory lookups. Resources form a three level tree: type, then name, then
//! language. Only numeric ids are supported, which is all the version resource needs.
use super::{
    FIXED_FILE_INFO_SIGNATURE, ImageDataDirectory, ImageResourceDataEntry,
    ImageResourceDirectory, ImageResourceDirectoryEntry, VsFixedFileInfo, VsVersionInfo,
};
use crate::error::{Result, checked_add, checked_mul};
use crate::reader::Reader;

const VERSION_RESOURCE_TYPE: u32 = 16;
const VERSION_RESOURCE_NAME: u32 = 1;
const LANGUAGE_EN_US: u32 = 0x409;
const LANGUAGE_NEUTRAL: u32 = 0;

/// The VS_FIXEDFILEINFO of the version resource. Looks for en-US and then for the neutral
/// language.
pub(super) fn read_version_info(
    rva: &Reader,
    directory: ImageDataDirectory,
) -> Result<Option<VsFixedFileInfo>> {
    if directory.virtual_address == 0 {
        return Ok(None);
    }
    let root = directory.virtual_address as u64;
    let mut entry = None;
    for language in [LANGUAGE_EN_US, LANGUAGE_NEUTRAL] {
        let path = [VERSION_RESOURCE_TYPE, VERSION_RESOURCE_NAME, language];
        entry = find_data_entry(rva, root, &path)?;
        if entry.is_some() {
            break;
        }
    }
    let Some(entry) = entry else {
        return Ok(None);
    };

    let info: VsVersionInfo = rva.read(entry.offset_to_data as u64)?;
    if info.value.signature != FIXED_FILE_INFO_SIGNATURE {
        tracing::debug!(signature = info.value.signature, "bad VS_FIXEDFILEINFO signature");
        return Ok(None);
    }
    Ok(Some(info.value))
}

/// Walks one level of the tree per id, `root` is the RVA of the resource section.
fn find_data_entry(rva: &Reader, root: u64, path: &[u32]) -> Result<Option<ImageResourceDataEntry>> {
    let mut offset = 0;
    for id in path {
        match find_child(rva, checked_add(root, offset)?, *id)? {
            Some(child) => offset = child,
            None => return Ok(None),
        }
    }
    rva.read(checked_add(root, offset)?).map(Some)
}

// Offset of the child with `id` relative to the resource section.
fn find_child(rva: &Reader, directory_rva: u64, id: u32) -> Result<Option<u64>> {
    let directory: ImageResourceDirectory = rva.read(directory_rva)?;
    let named = match directory.number_of_named_entries {
        u16::MAX => 0,
        n => n as u64,
    };
    let ids = match directory.number_of_id_entries {
        u16::MAX => 0,
        n => n as u64,
    };

    let directory_size = rva.size_of::<ImageResourceDirectory>()?;
    let entry_size = rva.size_of::<ImageResourceDirectoryEntry>()?;
    for i in named..named + ids {
        let position = checked_add(directory_rva, directory_size)?;
        let position = checked_add(position, checked_mul(i, entry_size)?)?;
        let entry: ImageResourceDirectoryEntry = rva.read(position)?;
        if entry.id == id {
            return Ok(Some((entry.offset_to_data & 0x7fffffff) as u64));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use crate::pe::{DIRECTORY_RESOURCE, FIXED_FILE_INFO_SIGNATURE, PeFile};
    use crate::test_data::PeBuilder;
    use std::sync::Arc;

    const RSRC: u32 = 0x3000;

    fn directory(ids: &[(u32, u32)], named: u16) -> Vec<u8> {
        let mut bytes = vec![0u8; 12];
        bytes.extend(named.to_le_bytes());
        bytes.extend((ids.len() as u16).to_le_bytes());
        for _ in 0..named {
            bytes.extend([0u8; 8]);
        }
        for (id, offset) in ids {
            bytes.extend(id.to_le_bytes());
            bytes.extend(offset.to_le_bytes());
        }
        bytes
    }

    fn version_info(signature: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend(0x34u16.to_le_bytes()); // length
        bytes.extend(0x34u16.to_le_bytes()); // value length
        bytes.extend(0u16.to_le_bytes()); // type
        for c in "VS_VERSION_INFO\0".encode_utf16() {
            bytes.extend(c.to_le_bytes());
        }
        bytes.extend(0u16.to_le_bytes()); // padding
        bytes.extend(signature.to_le_bytes());
        bytes.extend(0x10000u32.to_le_bytes());
        for v in [0u16, 10, 2, 19041, 0, 10, 2, 19041] {
            bytes.extend(v.to_le_bytes());
        }
        bytes.extend([0u8; 28]);
        bytes
    }

    /// A .rsrc section with type 16 -> name 1 -> `language`. The lower levels are at fixed
    /// offsets: name directory at 0x100, language directory at 0x200, data entry at 0x300,
    /// data at 0x400.
    fn image(language: u32, named: u16, signature: u32) -> PeFile {
        let mut section = vec![0u8; 0x400];
        let put = |section: &mut Vec<u8>, offset: usize, bytes: Vec<u8>| {
            section[offset..offset + bytes.len()].copy_from_slice(&bytes);
        };
        put(&mut section, 0, directory(&[(3, 0x80000080), (16, 0x80000100)], named));
        put(&mut section, 0x100, directory(&[(1, 0x80000200)], 0));
        put(&mut section, 0x200, directory(&[(language, 0x300)], 0));

        let info = version_info(signature);
        let mut entry = Vec::new();
        entry.extend((RSRC + 0x400).to_le_bytes());
        entry.extend((info.len() as u32).to_le_bytes());
        entry.extend([0u8; 8]);
        put(&mut section, 0x300, entry);
        section.extend(info);

        let bytes = PeBuilder::new(true)
            .section(".rsrc", RSRC, section)
            .directory(DIRECTORY_RESOURCE, RSRC, 0x500)
            .build();
        PeFile::new(Arc::new(bytes), false)
    }

    #[test]
    fn english_version() {
        let file = image(0x409, 0, FIXED_FILE_INFO_SIGNATURE);
        let info = file.version_info().unwrap().unwrap();
        assert_eq!(info.file_version(), "10.0.19041.2");
        assert_eq!(info.product_version(), "10.0.19041.2");
    }

    #[test]
    fn neutral_version() {
        // named entries are skipped
        let file = image(0, 2, FIXED_FILE_INFO_SIGNATURE);
        assert!(file.version_info().unwrap().is_some());
    }

    #[test]
    fn missing_version() {
        let file = image(0x407, 0, FIXED_FILE_INFO_SIGNATURE);
        assert!(file.version_info().unwrap().is_none());

        let file = image(0x409, 0, 0x12345678);
        assert!(file.version_info().unwrap().is_none());
    }
}
