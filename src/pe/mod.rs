//! PE/COFF support for Windows executables and dlls.
//!
//! A PE file starts with a DOS header whose last field (at 0x3C) is the offset of the PE
//! signature. The COFF file header follows the signature and then the optional header which
//! is PE32 or PE32+ depending on its magic. The optional header ends with the data directories
//! (exports, resources, debug info, etc) which are located by RVA. Section headers follow the
//! optional header and map RVAs onto file offsets.
pub mod address_space;
mod debug;
mod exports;
pub mod pe_file;
mod resources;
pub mod structures;

pub use address_space::*;
pub use debug::{PdbChecksum, PdbRecord, PerfMapRecord};
pub use pe_file::*;
pub use structures::*;
