//! Readers for the binary containers a post-mortem debugger has to look inside: ELF files and
//! core dumps, PE images, and Windows PDBs.
//!
//! Everything is read through an [`address_space::AddressSpace`], a randomly addressable byte
//! source. Containers decode their headers with a [`reader::Reader`] whose record layouts are
//! described declaratively ([`layout`]) and sized for the pointer width and byte order found in
//! the file. Containers also build new address spaces: the virtual memory of a core dump, the
//! RVA space of a PE image, the streams of a PDB.
//!
//! Parsing is lazy. Each accessor reads what it needs on first use and remembers the result,
//! so a partially corrupt file still answers the questions it can.
pub mod address_space;
pub mod elf;
pub mod error;
pub mod layout;
pub mod pdb;
pub mod pe;
pub mod reader;
pub mod utils;
pub mod validation;

#[cfg(test)]
mod test_data;
