//! Headers of the fixed streams that identify a PDB.
use crate::error::Result;
use crate::layout::{Descriptor, Record, Struct, descriptor};
use crate::validation::ValidationRule;

/// Stream 1, also called the PDB info stream.
pub const NAME_STREAM_INDEX: u32 = 1;

/// Stream 3, debug info.
pub const DBI_STREAM_INDEX: u32 = 3;

#[derive(Clone, Debug)]
pub struct NameIndexStreamHeader {
    pub version: u32,
    pub signature: u32,
    pub age: u32,
    pub guid: [u8; 16],
}

impl Struct for NameIndexStreamHeader {
    const DESCRIPTOR: &'static Descriptor = descriptor!("PdbNameIndexStreamHeader" {
        "Version": U32,
        "Signature": U32,
        "Age": U32,
        "Guid": Bytes(16),
    });

    fn from_record(record: &Record) -> Result<Self> {
        let mut guid = [0; 16];
        guid.copy_from_slice(record.bytes("Guid")?);
        Ok(NameIndexStreamHeader {
            version: record.u32("Version")?,
            signature: record.u32("Signature")?,
            age: record.u32("Age")?,
            guid,
        })
    }
}

#[derive(Clone, Debug)]
pub struct DbiStreamHeader {
    pub version_signature: i32,
    pub version_header: u32,
    pub age: u32,
    pub global_stream_index: u16,
    pub build_number: u16,
    pub public_stream_index: u16,
    pub pdb_dll_version: u16,
    pub sym_record_stream: u16,
    pub machine: u16,
}

impl Struct for DbiStreamHeader {
    const DESCRIPTOR: &'static Descriptor = descriptor!("PdbDbiStreamHeader" {
        "VersionSignature": I32,
        "VersionHeader": U32,
        "Age": U32,
        "GlobalStreamIndex": U16,
        "BuildNumber": U16,
        "PublicStreamIndex": U16,
        "PdbDllVersion": U16,
        "SymRecordStream": U16,
        "PdbDllRbld": U16,
        "ModInfoSize": I32,
        "SectionContributionSize": I32,
        "SectionMapSize": I32,
        "SourceInfoSize": I32,
        "TypeServerMapSize": I32,
        "MFCTypeServerIndex": U32,
        "OptionalDbgHeaderSize": I32,
        "ECSubstreamSize": I32,
        "Flags": U16,
        "Machine": U16,
        "Padding": U32,
    });

    fn from_record(record: &Record) -> Result<Self> {
        Ok(DbiStreamHeader {
            version_signature: record.i32("VersionSignature")?,
            version_header: record.u32("VersionHeader")?,
            age: record.u32("Age")?,
            global_stream_index: record.u16("GlobalStreamIndex")?,
            build_number: record.u16("BuildNumber")?,
            public_stream_index: record.u16("PublicStreamIndex")?,
            pdb_dll_version: record.u16("PdbDllVersion")?,
            sym_record_stream: record.u16("SymRecordStream")?,
            machine: record.u16("Machine")?,
        })
    }
}

impl DbiStreamHeader {
    pub fn is_header_valid(&self) -> ValidationRule<'_> {
        ValidationRule::new("DBI stream header has an invalid version signature", || {
            Ok(self.version_signature == -1)
        })
    }
}
