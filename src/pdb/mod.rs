//! Windows PDB files. Only the container and the streams that identify a PDB (its GUID and
//! age) are decoded.
//!
//! Classic PDBs use the MSF container: the file is split into pages and each stream is a list
//! of pages. Compressed PDBs (PDZ) use the MSFZ container where each stream is a list of
//! fragments, possibly compressed. Streams with unused indexes are nil and read as empty.
pub mod msf;
pub mod msfz;
pub mod pdb_file;
pub mod streams;

pub use msf::*;
pub use msfz::*;
pub use pdb_file::*;
pub use streams::*;
