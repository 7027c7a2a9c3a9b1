use super::tables::{SimpleTableBuilder, TableBuilder, add_field, add_simple};
use crate::cli::{ExplainArgs, TableArgs};
use fileformats::elf::{ElfFile, NoteList, SectionType, SegmentType};
use fileformats::error::Result;
use fileformats::reader::Reader;
use fileformats::utils;
use std::io::Write;

pub fn header(out: &mut impl Write, file: &ElfFile, args: &ExplainArgs) -> Result<()> {
    let header = file.header()?;
    let mut b = SimpleTableBuilder::new();
    add_simple!(b, "type", "{:?}", header.header_type, "type of ELF file");
    add_simple!(
        b,
        "64-bit",
        file.is_64bit()?,
        "pointer sized fields are eight bytes instead of four"
    );
    add_simple!(
        b,
        "big endian",
        file.is_big_endian()?,
        "words are laid out in memory with the most significant byte first"
    );
    add_simple!(b, "osabi", header.ident.abi(), "the OS the binary was compiled for");
    add_simple!(b, "machine", header.machine_name(), "CPU architecture");
    add_simple!(b, "entry", "{:#x}", header.entry, "address of the first instruction");
    add_simple!(
        b,
        "program headers",
        format!("{} at {:#x}", header.program_header_count, header.program_header_offset),
        "number of and offset to the program header table"
    );
    add_simple!(
        b,
        "section headers",
        format!("{} at {:#x}", header.section_header_count, header.section_header_offset),
        "number of and offset to the section header table"
    );
    add_simple!(
        b,
        "name table",
        header.section_header_string_index,
        "index of the section containing the section names"
    );
    b.writeln(&mut *out, args.explain)?;
    Ok(())
}

pub fn segments(out: &mut impl Write, file: &ElfFile, args: &TableArgs) -> Result<()> {
    let mut b = TableBuilder::new();
    b.add_col_l("type", "the segment type");
    b.add_col_r("offset", "offset into the ELF file at which the segment appears");
    b.add_col_r("vaddr", "virtual address at which the segment is loaded");
    b.add_col_r("file size", "number of bytes in the file");
    b.add_col_r("memory size", "number of bytes in memory, the rest is zero filled");
    b.add_col_l("flags", "x if executable, w if writeable, r if readable");
    for segment in file.segments()? {
        let h = &segment.header;
        add_field!(b, "type", h.segment_type.name());
        add_field!(b, "offset", "{:x}", h.file_offset);
        add_field!(b, "vaddr", "{:x}", h.virtual_address);
        add_field!(b, "file size", "{:x}", h.file_size);
        add_field!(b, "memory size", "{:x}", h.virtual_size);
        add_field!(b, "flags", h.flags_str());
    }
    b.writeln(&mut *out, args.titles, args.explain)?;
    Ok(())
}

pub fn sections(out: &mut impl Write, file: &ElfFile, args: &TableArgs) -> Result<()> {
    let mut b = TableBuilder::new();
    b.add_col_l("name", "the section name");
    b.add_col_l("type", "what the section holds");
    b.add_col_r("vaddr", "virtual address of the section, zero if not loaded");
    b.add_col_r("offset", "offset into the ELF file at which the section appears");
    b.add_col_r("size", "number of bytes in the file");
    b.add_col_l("flags", "write, alloc, exec, etc");
    for section in file.sections()? {
        let h = &section.header;
        add_field!(b, "name", section.name);
        add_field!(b, "type", "{:?}", h.section_type);
        add_field!(b, "vaddr", "{:x}", h.virtual_address);
        add_field!(b, "offset", "{:x}", h.file_offset);
        add_field!(b, "size", "{:x}", h.file_size);
        add_field!(b, "flags", h.flags_str());
    }
    b.writeln(&mut *out, args.titles, args.explain)?;
    Ok(())
}

/// Notes from the NOTE segments or, if there are none, the NOTE sections.
pub fn notes(out: &mut impl Write, file: &ElfFile, args: &TableArgs) -> Result<()> {
    let mut containers: Vec<Reader> = file
        .segments()?
        .iter()
        .filter(|s| s.header.segment_type == SegmentType::Note)
        .map(|s| s.contents.clone())
        .collect();
    if containers.is_empty() {
        containers = file
            .sections()?
            .iter()
            .filter(|s| s.header.section_type == SectionType::Note)
            .map(|s| s.contents.clone())
            .collect();
    }

    let mut b = TableBuilder::new();
    b.add_col_l("name", "owner of the note, e.g. CORE or GNU");
    b.add_col_l("type", "what the note holds, the meaning depends on the name");
    b.add_col_r("size", "number of bytes in the note contents");
    for notes in containers {
        for note in NoteList::new(notes) {
            let note = note?;
            add_field!(b, "name", note.name()?);
            add_field!(b, "type", note.note_type()?);
            add_field!(b, "size", "{:x}", note.header.content_size);
        }
    }
    b.writeln(&mut *out, args.titles, args.explain)?;
    Ok(())
}

pub fn build_id(out: &mut impl Write, file: &ElfFile) -> Result<()> {
    match file.build_id()? {
        Some(id) => writeln!(out, "{}", utils::to_hex_string(id))?,
        None => writeln!(out, "no build id")?,
    }
    Ok(())
}
