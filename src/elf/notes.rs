//! The notes in an ELF file. These provide information about the process (for core files) or
//! the build (for executables) and not all may be present. Notes live in NOTE segments and in
//! NOTE sections and are packed back to back with their names and contents padded to 4 bytes.
use crate::error::{Result, checked_add};
use crate::layout::{Descriptor, Record, Struct, descriptor};
use crate::reader::Reader;
use crate::utils::{self, align_to_word};
use std::fmt;
use std::sync::OnceLock;

/// Type of the memory-mapped files note in core files.
pub const NT_FILE: u32 = 0x46494c45;

/// Type of the build id note, only meaningful when the note is named "GNU".
pub const NT_GNU_BUILD_ID: u32 = 3;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CoreNoteType {
    /// Signal info, pid, and registers.
    PrStatus,

    /// Floating point register values.
    PrFpReg,

    /// Process state info, e.g. whether it's running, sleeping, or a zombie. Also the
    /// name and arguments for the executable.
    PrPsInfo,

    Task,

    /// The auxiliary vector passed to the process by the kernel.
    AuxV,

    /// A siginfo_t with the usual signal stuff plus the fault address.
    SigInfo,

    /// Memory-mapped files.
    File,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum GnuNoteType {
    AbiTag,
    HwCap,
    BuildId,
    GoldVersion,
    Property,
}

/// What a note's type means depends on its name so this is decoded with both.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NoteType {
    Core(CoreNoteType),
    Gnu(GnuNoteType),
    Other(u32),
}

impl NoteType {
    pub fn new(name: &str, value: u32) -> Self {
        match name {
            "CORE" | "LINUX" => match value {
                1 => NoteType::Core(CoreNoteType::PrStatus),
                2 => NoteType::Core(CoreNoteType::PrFpReg),
                3 => NoteType::Core(CoreNoteType::PrPsInfo),
                4 => NoteType::Core(CoreNoteType::Task),
                6 => NoteType::Core(CoreNoteType::AuxV),
                0x53494749 => NoteType::Core(CoreNoteType::SigInfo),
                NT_FILE => NoteType::Core(CoreNoteType::File),
                _ => NoteType::Other(value),
            },
            "GNU" => match value {
                1 => NoteType::Gnu(GnuNoteType::AbiTag),
                2 => NoteType::Gnu(GnuNoteType::HwCap),
                NT_GNU_BUILD_ID => NoteType::Gnu(GnuNoteType::BuildId),
                4 => NoteType::Gnu(GnuNoteType::GoldVersion),
                5 => NoteType::Gnu(GnuNoteType::Property),
                _ => NoteType::Other(value),
            },
            _ => NoteType::Other(value),
        }
    }
}

impl fmt::Display for NoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteType::Core(CoreNoteType::PrStatus) => write!(f, "NT_PRSTATUS"),
            NoteType::Core(CoreNoteType::PrFpReg) => write!(f, "NT_PRFPREG"),
            NoteType::Core(CoreNoteType::PrPsInfo) => write!(f, "NT_PRPSINFO"),
            NoteType::Core(CoreNoteType::Task) => write!(f, "NT_TASKSTRUCT"),
            NoteType::Core(CoreNoteType::AuxV) => write!(f, "NT_AUXV"),
            NoteType::Core(CoreNoteType::SigInfo) => write!(f, "NT_SIGINFO"),
            NoteType::Core(CoreNoteType::File) => write!(f, "NT_FILE"),
            NoteType::Gnu(GnuNoteType::AbiTag) => write!(f, "NT_GNU_ABI_TAG"),
            NoteType::Gnu(GnuNoteType::HwCap) => write!(f, "NT_GNU_HWCAP"),
            NoteType::Gnu(GnuNoteType::BuildId) => write!(f, "NT_GNU_BUILD_ID"),
            NoteType::Gnu(GnuNoteType::GoldVersion) => write!(f, "NT_GNU_GOLD_VERSION"),
            NoteType::Gnu(GnuNoteType::Property) => write!(f, "NT_GNU_PROPERTY_TYPE_0"),
            NoteType::Other(value) => write!(f, "{value:#x}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct NoteHeader {
    pub name_size: u32,
    pub content_size: u32,
    pub note_type: u32,
}

impl Struct for NoteHeader {
    const DESCRIPTOR: &'static Descriptor = descriptor!("ElfNoteHeader" {
        "NameSize": U32,
        "ContentSize": U32,
        "Type": U32,
    });

    fn from_record(record: &Record) -> Result<Self> {
        Ok(NoteHeader {
            name_size: record.u32("NameSize")?,
            content_size: record.u32("ContentSize")?,
            note_type: record.u32("Type")?,
        })
    }
}

#[derive(Clone)]
pub struct ElfNote {
    pub header: NoteHeader,
    reader: Reader,
    position: u64,
    name: OnceLock<String>,
}

impl ElfNote {
    pub fn new(reader: &Reader, position: u64) -> Result<Self> {
        Ok(ElfNote {
            header: reader.read(position)?,
            reader: reader.clone(),
            position,
            name: OnceLock::new(),
        })
    }

    /// The owner of the note, e.g. "CORE" or "GNU".
    pub fn name(&self) -> Result<&str> {
        utils::get_or_try_init(&self.name, || {
            let window = self.reader.with_relative_address_space(
                self.name_position()?,
                align_to_word(self.header.name_size as u64),
            );
            if window.is_empty() {
                return Ok(String::new());
            }
            window.read_string(0)
        })
        .map(|s| s.as_str())
    }

    pub fn note_type(&self) -> Result<NoteType> {
        Ok(NoteType::new(self.name()?, self.header.note_type))
    }

    /// Reader over the descriptor bytes, padded to 4 bytes.
    pub fn contents(&self) -> Result<Reader> {
        let start = checked_add(
            self.name_position()?,
            align_to_word(self.header.name_size as u64),
        )?;
        Ok(self
            .reader
            .with_relative_address_space(start, align_to_word(self.header.content_size as u64)))
    }

    /// Offset of the note following this one.
    pub fn next_position(&self) -> Result<u64> {
        let position = checked_add(
            self.name_position()?,
            align_to_word(self.header.name_size as u64),
        )?;
        checked_add(position, align_to_word(self.header.content_size as u64))
    }

    fn name_position(&self) -> Result<u64> {
        checked_add(self.position, self.reader.size_of::<NoteHeader>()?)
    }
}

/// Walks the notes packed into a segment or section. Iteration ends after the first note that
/// can't be read.
pub struct NoteList {
    reader: Reader,
    position: u64,
    failed: bool,
}

impl NoteList {
    pub fn new(reader: Reader) -> Self {
        NoteList {
            reader,
            position: 0,
            failed: false,
        }
    }
}

impl Iterator for NoteList {
    type Item = Result<ElfNote>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.position >= self.reader.len() {
            return None;
        }
        let note = ElfNote::new(&self.reader, self.position).and_then(|note| {
            self.position = note.next_position()?;
            Ok(note)
        });
        if note.is_err() {
            self.failed = true;
        }
        Some(note)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutManager;
    use crate::test_data::note_bytes;
    use std::sync::Arc;

    #[test]
    fn walk_notes() {
        let mut bytes = note_bytes(false, "GNU", NT_GNU_BUILD_ID, &[1, 2, 3, 4, 5]);
        bytes.extend(note_bytes(false, "CORE", NT_FILE, &[9; 8]));
        let reader = Reader::with_layouts(Arc::new(bytes), LayoutManager::elf(false, true));

        let notes: Vec<ElfNote> = NoteList::new(reader).collect::<Result<_>>().unwrap();
        assert_eq!(notes.len(), 2);

        assert_eq!(notes[0].name().unwrap(), "GNU");
        assert_eq!(
            notes[0].note_type().unwrap(),
            NoteType::Gnu(GnuNoteType::BuildId)
        );
        let contents = notes[0].contents().unwrap();
        assert_eq!(contents.len(), 8);
        assert_eq!(contents.read_bytes(0, 5).unwrap(), vec![1, 2, 3, 4, 5]);

        assert_eq!(notes[1].name().unwrap(), "CORE");
        insta::assert_snapshot!(notes[1].note_type().unwrap().to_string(), @"NT_FILE");
    }

    #[test]
    fn big_endian_notes() {
        let bytes = note_bytes(true, "GNU", NT_GNU_BUILD_ID, &[0xaa; 20]);
        let reader = Reader::with_layouts(Arc::new(bytes), LayoutManager::elf(true, false));
        let note = NoteList::new(reader).next().unwrap().unwrap();
        assert_eq!(note.header.content_size, 20);
        assert_eq!(note.name().unwrap(), "GNU");
    }

    #[test]
    fn truncated_list_stops() {
        let mut bytes = note_bytes(false, "GNU", 1, &[0; 4]);
        bytes.extend([1, 0, 0]); // not enough for a header
        let reader = Reader::with_layouts(Arc::new(bytes), LayoutManager::elf(false, true));
        let notes: Vec<Result<ElfNote>> = NoteList::new(reader).collect();
        assert_eq!(notes.len(), 2);
        assert!(notes[0].is_ok());
        assert!(notes[1].is_err());
    }

    #[test]
    fn type_depends_on_name() {
        assert_eq!(NoteType::new("GNU", 3), NoteType::Gnu(GnuNoteType::BuildId));
        assert_eq!(NoteType::new("CORE", 3), NoteType::Core(CoreNoteType::PrPsInfo));
        assert_eq!(NoteType::new("Go", 3), NoteType::Other(3));
    }
}
