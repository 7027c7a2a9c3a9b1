//! Records found through the debug data directory: the CodeView link to a PDB, the PDB
//! checksum and the perfmap link for ReadyToRun images.
use super::{CvInfoPdb70, ImageDataDirectory, ImageDebugDirectory, ImageDebugType, PerfMapIdV1};
use crate::error::{FormatError, Result, checked_add};
use crate::reader::Reader;
use crate::utils;
use std::fmt;
use uuid::Uuid;

const CV_SIGNATURE_RSDS: i32 = 0x53445352;
const PERFMAP_MAGIC: i32 = 0x4d523252; // R2RM
const PORTABLE_PDB_MINOR_VERSION: u16 = 0x504d;

/// A CodeView RSDS record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PdbRecord {
    /// Portable PDBs are the managed format, otherwise this is a Windows (MSF) PDB.
    pub is_portable: bool,
    pub path: String,
    pub signature: Uuid,
    pub age: i32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PdbChecksum {
    /// e.g. "SHA256"
    pub algorithm: String,
    pub checksum: Vec<u8>,
}

impl fmt::Display for PdbChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, utils::to_hex_string(&self.checksum))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PerfMapRecord {
    pub path: String,
    pub signature: [u8; 16],
    pub version: u32,
}

#[derive(Default)]
pub(super) struct DebugRecords {
    pub directories: Vec<ImageDebugDirectory>,
    pub pdbs: Vec<PdbRecord>,
    pub checksums: Vec<PdbChecksum>,
    pub perfmaps: Vec<PerfMapRecord>,
}

/// Decodes every entry of the debug directory. These are optional so entries that can't be
/// read are skipped.
pub(super) fn read_debug_records(rva: &Reader, directory: ImageDataDirectory) -> Result<DebugRecords> {
    let count = directory.size as u64 / rva.size_of::<ImageDebugDirectory>()?;
    let address = directory.virtual_address as u64;
    let directories = match rva.read_array::<ImageDebugDirectory>(address, count) {
        Ok(directories) => directories,
        Err(err) if err.is_expected() => {
            tracing::debug!(%err, "failed to read the PE debug directory");
            return Ok(DebugRecords::default());
        }
        Err(err) => return Err(err),
    };

    let mut records = DebugRecords::default();
    for entry in directories.iter() {
        match entry.debug_type {
            ImageDebugType::CodeView => {
                if let Some(pdb) = skip_bad(read_pdb(rva, entry), entry)? {
                    records.pdbs.push(pdb);
                }
            }
            ImageDebugType::PdbChecksum => {
                if let Some(checksum) = skip_bad(read_checksum(rva, entry).map(Some), entry)? {
                    records.checksums.push(checksum);
                }
            }
            ImageDebugType::PerfMap if entry.major_version == 1 && entry.minor_version == 0 => {
                if let Some(perfmap) = skip_bad(read_perfmap(rva, entry), entry)? {
                    records.perfmaps.push(perfmap);
                }
            }
            _ => {}
        }
    }
    records.directories = directories;
    Ok(records)
}

fn skip_bad<T>(result: Result<Option<T>>, entry: &ImageDebugDirectory) -> Result<Option<T>> {
    match result {
        Err(err) if err.is_expected() => {
            tracing::debug!(%err, debug_type = ?entry.debug_type, "skipping PE debug record");
            Ok(None)
        }
        result => result,
    }
}

fn read_pdb(rva: &Reader, entry: &ImageDebugDirectory) -> Result<Option<PdbRecord>> {
    let mut stream = rva.stream(entry.address_of_raw_data as u64);
    let info: CvInfoPdb70 = stream.read()?;
    if info.cv_signature != CV_SIGNATURE_RSDS {
        return Ok(None);
    }
    Ok(Some(PdbRecord {
        is_portable: entry.minor_version == PORTABLE_PDB_MINOR_VERSION,
        path: stream.read_string()?,
        signature: Uuid::from_bytes_le(info.signature),
        age: info.age,
    }))
}

// The algorithm name and its terminator are followed by the checksum bytes.
fn read_checksum(rva: &Reader, entry: &ImageDebugDirectory) -> Result<PdbChecksum> {
    let position = entry.address_of_raw_data as u64;
    let algorithm = rva.read_string(position)?;
    let name_size = algorithm.len() as u64 + 1;
    let length = (entry.size_of_data as u64)
        .checked_sub(name_size)
        .ok_or_else(|| {
            FormatError::overflow(format!(
                "PDB checksum data size {:#x} is smaller than the algorithm name",
                entry.size_of_data
            ))
        })?;
    let checksum = rva.read_bytes(checked_add(position, name_size)?, length)?;
    Ok(PdbChecksum {
        algorithm,
        checksum,
    })
}

fn read_perfmap(rva: &Reader, entry: &ImageDebugDirectory) -> Result<Option<PerfMapRecord>> {
    let mut stream = rva.stream(entry.address_of_raw_data as u64);
    let header: PerfMapIdV1 = stream.read()?;
    if header.magic != PERFMAP_MAGIC {
        return Ok(None);
    }
    Ok(Some(PerfMapRecord {
        path: stream.read_string()?,
        signature: header.signature,
        version: header.version,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pe::{DIRECTORY_DEBUG, PeFile};
    use crate::test_data::{PeBuilder, debug_entry};
    use std::sync::Arc;

    const RDATA: u32 = 0x2000;

    fn codeview(signature: &[u8; 4], path: &str) -> Vec<u8> {
        let mut bytes = signature.to_vec();
        bytes.extend(0u8..16);
        bytes.extend(3i32.to_le_bytes());
        bytes.extend(path.as_bytes());
        bytes.push(0);
        bytes
    }

    /// Debug entries at the start of .rdata with their data at fixed offsets after them.
    fn image(entries: &[(u32, u16, u16, Vec<u8>)]) -> PeFile {
        let mut directory = Vec::new();
        let mut data = Vec::new();
        let data_start = 0x100;
        for (debug_type, major, minor, bytes) in entries {
            let rva = RDATA + data_start + data.len() as u32;
            directory.extend(debug_entry(*debug_type, *major, *minor, bytes.len() as u32, rva));
            data.extend(bytes);
            while data.len() % 8 != 0 {
                data.push(0);
            }
        }
        let size = directory.len() as u32;
        directory.resize(data_start as usize, 0);
        directory.extend(data);

        let bytes = PeBuilder::new(true)
            .section(".rdata", RDATA, directory)
            .directory(DIRECTORY_DEBUG, RDATA, size)
            .build();
        PeFile::new(Arc::new(bytes), false)
    }

    #[test]
    fn codeview_records() {
        let file = image(&[
            (2, 0, 0, codeview(b"RSDS", r"C:\src\foo.pdb")),
            (2, 0x0100, PORTABLE_PDB_MINOR_VERSION, codeview(b"RSDS", "foo.pdb")),
            (2, 0, 0, codeview(b"NB10", "old.pdb")),
        ]);
        let pdbs = file.pdbs().unwrap();
        assert_eq!(pdbs.len(), 2);
        assert!(!pdbs[0].is_portable);
        assert_eq!(pdbs[0].path, r"C:\src\foo.pdb");
        assert_eq!(pdbs[0].age, 3);
        insta::assert_snapshot!(pdbs[0].signature.to_string(), @"03020100-0504-0706-0809-0a0b0c0d0e0f");
        assert!(pdbs[1].is_portable);
        assert_eq!(pdbs[1].path, "foo.pdb");
        assert_eq!(file.debug_directories().unwrap().len(), 3);
    }

    #[test]
    fn checksums() {
        let mut data = b"SHA256\0".to_vec();
        data.extend(1u8..=8);
        let file = image(&[(19, 1, 0, data), (19, 1, 0, b"MD5".to_vec())]);
        let checksums = file.pdb_checksums().unwrap();

        // the second record is too short for its own name
        assert_eq!(checksums.len(), 1);
        insta::assert_snapshot!(checksums[0].to_string(), @"SHA256:0102030405060708");
    }

    #[test]
    fn perfmaps() {
        let mut data = Vec::new();
        data.extend(PERFMAP_MAGIC.to_le_bytes());
        data.extend([0x11; 16]);
        data.extend(1u32.to_le_bytes());
        data.extend(b"System.Private.CoreLib.ni.r2rmap\0");
        let file = image(&[(21, 1, 0, data.clone()), (21, 2, 0, data)]);
        let perfmaps = file.perfmaps().unwrap();
        assert_eq!(perfmaps.len(), 1);
        assert_eq!(perfmaps[0].path, "System.Private.CoreLib.ni.r2rmap");
        assert_eq!(perfmaps[0].signature, [0x11; 16]);
        assert_eq!(perfmaps[0].version, 1);
    }

    #[test]
    fn unmapped_debug_directory() {
        let bytes = PeBuilder::new(false)
            .section(".text", 0x1000, vec![0; 0x10])
            .directory(DIRECTORY_DEBUG, 0x8000, 28)
            .build();
        let file = PeFile::new(Arc::new(bytes), false);
        assert!(file.pdbs().unwrap().is_empty());
        assert!(file.debug_directories().unwrap().is_empty());
    }
}
