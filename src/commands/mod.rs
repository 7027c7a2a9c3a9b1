//! Handlers for the commands users type, e.g. `ffdump elf app segments`. Each handler writes to
//! `out` so that tests can capture the output.
pub mod coredump;
pub mod elf;
pub mod pdb;
pub mod pe;
pub mod styles;
pub mod tables;

use crate::cli::{CoreAction, ElfAction, MainCommand, PdbAction, PeAction};
use fileformats::address_space::{MappedFile, SharedSpace};
use fileformats::elf::{ElfCoreFile, ElfFile};
use fileformats::error::{FormatError, Result};
use fileformats::pdb::PdbFile;
use fileformats::pe::PeFile;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

pub fn run(command: &MainCommand) -> Result<()> {
    let mut out = io::stdout().lock();
    match command {
        MainCommand::Elf(cmd) => {
            let file = ElfFile::new(open(&cmd.path)?, 0, false);
            require(file.is_valid(), &cmd.path, "an ELF file")?;
            match &cmd.action {
                ElfAction::Header(args) => elf::header(&mut out, &file, args),
                ElfAction::Segments(args) => elf::segments(&mut out, &file, args),
                ElfAction::Sections(args) => elf::sections(&mut out, &file, args),
                ElfAction::Notes(args) => elf::notes(&mut out, &file, args),
                ElfAction::BuildId => elf::build_id(&mut out, &file),
            }
        }
        MainCommand::Core(cmd) => {
            let core = ElfCoreFile::new(open(&cmd.path)?);
            require(core.is_valid(), &cmd.path, "an ELF core file")?;
            match &cmd.action {
                CoreAction::Files(args) => coredump::files(&mut out, &core, args),
                CoreAction::Images(args) => coredump::images(&mut out, &core, args),
                CoreAction::Read(args) => coredump::read(&mut out, &core, args),
            }
        }
        MainCommand::Pe(cmd) => {
            let file = PeFile::new(open(&cmd.path)?, false);
            require(file.is_valid(), &cmd.path, "a PE file")?;
            match &cmd.action {
                PeAction::Header(args) => pe::header(&mut out, &file, args),
                PeAction::Sections(args) => pe::sections(&mut out, &file, args),
                PeAction::Debug(args) => pe::debug(&mut out, &file, args),
                PeAction::Version(args) => pe::version(&mut out, &file, args),
                PeAction::Export(args) => pe::export(&mut out, &file, args),
            }
        }
        MainCommand::Pdb(cmd) => {
            let file = PdbFile::open(open(&cmd.path)?)?;
            match &cmd.action {
                PdbAction::Info(args) => pdb::info(&mut out, &file, args),
                PdbAction::Streams(args) => pdb::streams(&mut out, &file, args),
            }
        }
    }
}

fn open(path: &Path) -> Result<SharedSpace> {
    Ok(Arc::new(MappedFile::open(path)?))
}

fn require(predicate: bool, path: &Path, kind: &str) -> Result<()> {
    if predicate {
        Ok(())
    } else {
        Err(FormatError::bad_format(format!(
            "{} is not {kind}",
            path.display()
        )))
    }
}

/// Output with styling removed and runs of spaces collapsed so that tests don't depend on
/// column widths.
#[cfg(test)]
pub fn normalize(out: &[u8]) -> String {
    let s = styles::strip_escapes(&String::from_utf8_lossy(out));
    let lines: Vec<String> = s
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();
    lines.join("\n")
}
