use super::{
    DBI_STREAM_INDEX, DbiStreamHeader, MsfFile, MsfFileHeader, MsfzFile, MsfzFileHeader,
    NAME_STREAM_INDEX, NameIndexStreamHeader,
};
use crate::address_space::SharedSpace;
use crate::error::{FormatError, Result};
use crate::reader::Reader;
use crate::utils;
use std::fmt;
use std::sync::OnceLock;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PdbContainerKind {
    /// An uncompressed PDB.
    Msf,

    /// A compressed PDB (PDZ).
    Msfz,
}

impl fmt::Display for PdbContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PdbContainerKind::Msf => write!(f, "MSF"),
            PdbContainerKind::Msfz => write!(f, "MSFZ"),
        }
    }
}

enum Container {
    Msf(MsfFile),
    Msfz(MsfzFile),
}

/// A Windows PDB in either container format. The container is chosen when the file is
/// opened by looking at its signature.
pub struct PdbFile {
    container: Option<Container>,
    name_stream: OnceLock<NameIndexStreamHeader>,
    dbi_stream: OnceLock<DbiStreamHeader>,
}

impl PdbFile {
    /// Never fails, use `is_valid` to see if the data source is a PDB.
    pub fn new(data_source: SharedSpace) -> Self {
        let container = match open_container(&data_source) {
            Ok(container) => container,
            Err(err) => {
                if err.is_expected() {
                    tracing::debug!(%err, "failed to open the PDB container");
                } else {
                    tracing::warn!(%err, "failed to open the PDB container");
                }
                None
            }
        };
        PdbFile {
            container,
            name_stream: OnceLock::new(),
            dbi_stream: OnceLock::new(),
        }
    }

    /// Like new but an error if the data source isn't a PDB.
    pub fn open(data_source: SharedSpace) -> Result<Self> {
        let file = PdbFile::new(data_source);
        file.container()?;
        Ok(file)
    }

    pub fn is_valid(&self) -> bool {
        self.container.is_some()
    }

    pub fn container_kind(&self) -> Result<PdbContainerKind> {
        Ok(match self.container()? {
            Container::Msf(_) => PdbContainerKind::Msf,
            Container::Msfz(_) => PdbContainerKind::Msfz,
        })
    }

    /// "pdb" for MSF files, "msfz" plus the version for MSFZ files. Newer MSFZ versions get new
    /// names without clients needing to know about them.
    pub fn container_kind_spec_string(&self) -> Result<String> {
        Ok(match self.container()? {
            Container::Msf(_) => "pdb".to_string(),
            Container::Msfz(msfz) => format!("msfz{}", msfz.version()),
        })
    }

    /// Always at least 1.
    pub fn num_streams(&self) -> Result<u32> {
        Ok(match self.container()? {
            Container::Msf(msf) => msf.num_streams(),
            Container::Msfz(msfz) => msfz.num_streams(),
        })
    }

    pub fn stream_size(&self, stream: u32) -> Result<u64> {
        match self.container()? {
            Container::Msf(msf) => msf.stream_size(stream).map(|s| s as u64),
            Container::Msfz(msfz) => msfz.stream_size(stream),
        }
    }

    /// `stream` must be less than num_streams.
    pub fn get_stream(&self, stream: u32) -> Result<Reader> {
        match self.container()? {
            Container::Msf(msf) => msf.get_stream(stream),
            Container::Msfz(msfz) => msfz.get_stream(stream),
        }
    }

    pub fn name_stream_header(&self) -> Result<&NameIndexStreamHeader> {
        utils::get_or_try_init(&self.name_stream, || {
            self.get_stream(NAME_STREAM_INDEX)?.read(0)
        })
    }

    /// True if the DBI stream is large enough for its header and the header looks right.
    pub fn is_dbi_valid(&self) -> bool {
        match self.read_dbi_header() {
            Ok(header) => header.is_header_valid().check(),
            Err(err) => {
                tracing::debug!(%err, "no DBI stream");
                false
            }
        }
    }

    pub fn dbi_header(&self) -> Result<&DbiStreamHeader> {
        let header = self.read_dbi_header()?;
        header.is_header_valid().check_throwing()?;
        Ok(header)
    }

    pub fn age(&self) -> Result<u32> {
        Ok(self.name_stream_header()?.age)
    }

    pub fn dbi_age(&self) -> Result<u32> {
        Ok(self.dbi_header()?.age)
    }

    /// The GUID that CodeView records in PE files refer to.
    pub fn signature(&self) -> Result<Uuid> {
        Ok(Uuid::from_bytes_le(self.name_stream_header()?.guid))
    }

    fn container(&self) -> Result<&Container> {
        self.container.as_ref().ok_or_else(|| {
            FormatError::bad_format("not a PDB (uses neither MSF nor MSFZ container format)")
        })
    }

    fn read_dbi_header(&self) -> Result<&DbiStreamHeader> {
        utils::get_or_try_init(&self.dbi_stream, || {
            let stream = self.get_stream(DBI_STREAM_INDEX)?;
            if stream.len() < stream.size_of::<DbiStreamHeader>()? {
                return Err(FormatError::bad_format(format!(
                    "DBI stream is too small for its header ({} bytes)",
                    stream.len()
                )));
            }
            stream.read(0)
        })
    }
}

fn open_container(data_source: &SharedSpace) -> Result<Option<Container>> {
    let reader = Reader::new(data_source.clone());
    if reader.len() > reader.size_of::<MsfFileHeader>()? {
        let header: MsfFileHeader = reader.read(0)?;
        if header.is_magic_valid() {
            return MsfFile::open(&reader, &header).map(|msf| Some(Container::Msf(msf)));
        }
    }
    if reader.len() > reader.size_of::<MsfzFileHeader>()? {
        let header: MsfzFileHeader = reader.read(0)?;
        if header.is_magic_valid() {
            return Ok(MsfzFile::open(data_source.clone())?.map(Container::Msfz));
        }
    }
    Ok(None)
}
