//! ELF file support. These can be both core files and executable files (or shared libraries).
//! Quick ELF reference: https://gist.github.com/x0nu11byt3/bcb35c3de461e5fb66173071a2379779
//!
//! ELF files start with an ELF header which includes:
//! * A magic number to identify the file as an ELF file.
//! * The word size and endianness, these determine the layout of everything else.
//! * The offset to and number of program headers.
//! * The offset to and number of section headers.
//!
//! Program headers identify segments. Segments are used by the OS to load an exe into
//! memory. A program header has type, vaddr, offset, etc. Common types are:
//! * Load - for a core file these are the memory of the process, for an exe these are text
//!   (CPU instructions) and data (eg statics)
//! * Note - variety of metadata, e.g. the build id or, for core files, the mapped files.
//!
//! Section headers identify sections. Sections are used for static linking and often don't
//! appear in core files. Section headers have name, type, vaddr, offset, size, etc.
pub mod address_space;
pub mod core_file;
pub mod elf_file;
pub mod header;
pub mod notes;
pub mod sections;
pub mod segments;

pub use address_space::*;
pub use core_file::*;
pub use elf_file::*;
pub use header::*;
pub use notes::*;
pub use sections::*;
pub use segments::*;
