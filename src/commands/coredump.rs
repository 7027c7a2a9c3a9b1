use super::styles::Styling;
use super::tables::{TableBuilder, add_field};
use crate::cli::{HexdumpLabels, ReadArgs, TableArgs};
use fileformats::address_space::read_exact;
use fileformats::elf::{ElfCoreFile, ElfLoadedImage};
use fileformats::error::Result;
use fileformats::utils;
use std::io::Write;

pub fn files(out: &mut impl Write, core: &ElfCoreFile, args: &TableArgs) -> Result<()> {
    let table = core.file_table()?;
    let mut b = TableBuilder::new();
    b.add_col_r("start", "virtual address at which the mapping starts");
    b.add_col_r("stop", "virtual address just past the end of the mapping");
    b.add_col_r("offset", "offset into the file, in pages");
    b.add_col_l("path", "path of the mapped file");
    for file in table.files.iter() {
        add_field!(b, "start", "{:x}", file.start);
        add_field!(b, "stop", "{:x}", file.stop);
        add_field!(b, "offset", "{:x}", file.page_offset);
        add_field!(b, "path", file.path);
    }
    b.writeln(&mut *out, args.titles, args.explain)?;
    Ok(())
}

pub fn images(out: &mut impl Write, core: &ElfCoreFile, args: &TableArgs) -> Result<()> {
    let mut b = TableBuilder::new();
    b.add_col_r("load address", "virtual address of the image's ELF header");
    b.add_col_r("mappings", "number of file table entries for the image");
    b.add_col_l("build id", "GNU build id read from the image in memory");
    b.add_col_l("path", "path of the exe or shared library");
    for image in core.loaded_images()? {
        add_field!(b, "load address", "{:x}", image.load_address);
        add_field!(b, "mappings", image.ranges.len());
        add_field!(b, "build id", image_build_id(image));
        add_field!(b, "path", image.path);
    }
    b.writeln(&mut *out, args.titles, args.explain)?;
    Ok(())
}

/// Images whose headers weren't dumped are common so failures here aren't fatal.
fn image_build_id(image: &ElfLoadedImage) -> String {
    if !image.image.is_valid() {
        return String::new();
    }
    match image.image.build_id() {
        Ok(Some(id)) => utils::to_hex_string(id),
        Ok(None) => String::new(),
        Err(err) => {
            tracing::debug!(%err, path = %image.path, "couldn't read build id");
            "?".to_string()
        }
    }
}

pub fn read(out: &mut impl Write, core: &ElfCoreFile, args: &ReadArgs) -> Result<()> {
    let memory = core.data_source()?;
    let mut bytes = vec![0; args.count];
    read_exact(memory.as_ref(), args.address, &mut bytes)?;
    hexdump(out, args.address, &bytes, args.labels)?;
    Ok(())
}

fn hexdump(
    out: &mut impl Write,
    address: u64,
    bytes: &[u8],
    labels: HexdumpLabels,
) -> std::io::Result<()> {
    for (row, chunk) in bytes.chunks(16).enumerate() {
        let offset = row as u64 * 16;
        match labels {
            HexdumpLabels::None => (),
            HexdumpLabels::Addr => {
                write!(out, "{}", format!("{:012x}: ", address + offset).hex_offset())?
            }
            HexdumpLabels::Zero => write!(out, "{}", format!("{offset:04x}: ").hex_offset())?,
        }

        for j in 0..16 {
            if j == 8 {
                write!(out, " ")?;
            }
            match chunk.get(j) {
                Some(byte) => write!(out, "{}", format!("{byte:02x} ").hex_hex())?,
                None => write!(out, "   ")?,
            }
        }
        write!(out, "  ")?;
        let ascii: String = chunk
            .iter()
            .map(|b| {
                let ch = *b as char;
                if ch.is_ascii_graphic() { ch } else { '.' }
            })
            .collect();
        writeln!(out, "{}", ascii.hex_ascii())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::normalize;
    use crate::test_data::{ElfBuilder, FileMapping, Segment, core_file, note_bytes};
    use fileformats::elf::NT_GNU_BUILD_ID;
    use fileformats::error::FormatError;
    use std::sync::Arc;

    fn core() -> ElfCoreFile {
        let library = ElfBuilder::new(false, true)
            .segment(Segment::whole_file(0))
            .segment(Segment::note(note_bytes(
                false,
                "GNU",
                NT_GNU_BUILD_ID,
                &[0x12, 0x34, 0x56, 0x78],
            )))
            .build();
        let size = library.len() as u64;
        let mut memory = b"hello, world!\0\x01\x02ABCD".to_vec();
        memory.resize(0x1000, 0);
        let bytes = core_file(
            true,
            &[
                FileMapping::new(0x7f0000, 0x7f0000 + size, 0, "/lib/libfoo.so"),
                FileMapping::new(0x800000, 0x801000, 0, "/dev/zero (deleted)"),
            ],
            vec![
                Segment::load(0x1000, memory),
                Segment::load(0x7f0000, library),
            ],
        );
        ElfCoreFile::new(Arc::new(bytes))
    }

    fn table_args() -> TableArgs {
        TableArgs {
            explain: false,
            titles: false,
        }
    }

    #[test]
    fn file_table() {
        let mut out = Vec::new();
        files(&mut out, &core(), &table_args()).unwrap();
        insta::assert_snapshot!(normalize(&out), @r"
        7f0000 7f00d0 0 /lib/libfoo.so
        800000 801000 0 /dev/zero
        ");
    }

    #[test]
    fn image_table() {
        let mut out = Vec::new();
        images(&mut out, &core(), &table_args()).unwrap();
        insta::assert_snapshot!(normalize(&out), @"7f0000 1 12345678 /lib/libfoo.so");
    }

    #[test]
    fn memory() {
        let args = ReadArgs {
            count: 20,
            labels: HexdumpLabels::Addr,
            address: 0x1000,
        };
        let mut out = Vec::new();
        read(&mut out, &core(), &args).unwrap();
        insta::assert_snapshot!(normalize(&out), @r"
        000000001000: 68 65 6c 6c 6f 2c 20 77 6f 72 6c 64 21 00 01 02 hello,.world!...
        000000001010: 41 42 43 44 ABCD
        ");

        let args = ReadArgs {
            count: 4,
            labels: HexdumpLabels::Zero,
            address: 0x1004,
        };
        let mut out = Vec::new();
        read(&mut out, &core(), &args).unwrap();
        assert_eq!(normalize(&out), "0000: 6f 2c 20 77 o,.w");

        let args = ReadArgs {
            count: 16,
            labels: HexdumpLabels::None,
            address: 0x5000,
        };
        let err = read(&mut Vec::new(), &core(), &args).unwrap_err();
        assert!(matches!(err, FormatError::InvalidVirtualAddress { .. }));
    }
}
