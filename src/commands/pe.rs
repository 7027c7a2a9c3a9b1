use super::styles::Styling;
use super::tables::{SimpleTableBuilder, TableBuilder, add_field, add_simple};
use crate::cli::{ExplainArgs, ExportArgs, TableArgs};
use fileformats::error::Result;
use fileformats::pe::{DIRECTORY_NAMES, PeFile};
use std::io::Write;

pub fn header(out: &mut impl Write, file: &PeFile, args: &ExplainArgs) -> Result<()> {
    let header = file.file_header()?;
    let optional = file.optional_header()?;
    let mut b = SimpleTableBuilder::new();
    add_simple!(b, "machine", header.machine_name(), "CPU architecture");
    add_simple!(b, "dll", header.is_dll(), "true for dlls, false for exes");
    add_simple!(
        b,
        "timestamp",
        "{:#x}",
        header.time_date_stamp,
        "when the image was linked, in seconds since 1970 (or a hash for reproducible builds)"
    );
    add_simple!(b, "64-bit", file.is_64bit()?, "PE32+ instead of PE32");
    add_simple!(b, "image base", "{:#x}", optional.image_base, "preferred load address");
    add_simple!(
        b,
        "entry point",
        "{:#x}",
        optional.address_of_entry_point,
        "RVA of the first instruction"
    );
    add_simple!(
        b,
        "size of image",
        "{:#x}",
        optional.size_of_image,
        "bytes of memory the loaded image occupies"
    );
    add_simple!(b, "subsystem", optional.subsystem, "2 for GUI apps, 3 for console apps");
    add_simple!(b, "IL image", file.is_il_image()?, "has a CLR header (managed code)");
    for (name, directory) in DIRECTORY_NAMES.iter().zip(file.data_directories()?) {
        if directory.virtual_address != 0 {
            let value = format!("{:#x} ({:#x} bytes)", directory.virtual_address, directory.size);
            b.add_str_row(name, value.table_field(), "RVA and size of a data directory");
        }
    }
    b.writeln(&mut *out, args.explain)?;
    Ok(())
}

pub fn sections(out: &mut impl Write, file: &PeFile, args: &TableArgs) -> Result<()> {
    let mut b = TableBuilder::new();
    b.add_col_l("name", "the section name");
    b.add_col_r("rva", "address of the section relative to the image base");
    b.add_col_r("virtual size", "number of bytes in memory");
    b.add_col_r("offset", "offset into the file of the section data");
    b.add_col_r("raw size", "number of bytes in the file, a multiple of the file alignment");
    b.add_col_r("flags", "IMAGE_SCN_* characteristics");
    for section in file.sections()? {
        add_field!(b, "name", section.name());
        add_field!(b, "rva", "{:x}", section.virtual_address);
        add_field!(b, "virtual size", "{:x}", section.virtual_size);
        add_field!(b, "offset", "{:x}", section.pointer_to_raw_data);
        add_field!(b, "raw size", "{:x}", section.size_of_raw_data);
        add_field!(b, "flags", "{:08x}", section.characteristics);
    }
    b.writeln(&mut *out, args.titles, args.explain)?;
    Ok(())
}

/// The debug directory entries followed by the records decoded from them.
pub fn debug(out: &mut impl Write, file: &PeFile, args: &TableArgs) -> Result<()> {
    let mut b = TableBuilder::new();
    b.add_col_l("type", "what the debug data is, e.g. CodeView");
    b.add_col_r("version", "major.minor version of the debug data");
    b.add_col_r("size", "number of bytes in the debug data");
    b.add_col_r("rva", "address of the debug data relative to the image base");
    for entry in file.debug_directories()? {
        add_field!(b, "type", "{:?}", entry.debug_type);
        add_field!(b, "version", format!("{}.{}", entry.major_version, entry.minor_version));
        add_field!(b, "size", "{:x}", entry.size_of_data);
        add_field!(b, "rva", "{:x}", entry.address_of_raw_data);
    }
    b.writeln(&mut *out, args.titles, args.explain)?;

    let pdbs = file.pdbs()?;
    let checksums = file.pdb_checksums()?;
    let perfmaps = file.perfmaps()?;
    if !pdbs.is_empty() || !checksums.is_empty() || !perfmaps.is_empty() {
        writeln!(out)?;
    }
    for pdb in pdbs {
        let kind = if pdb.is_portable { " (portable)" } else { "" };
        writeln!(out, "pdb {} {} age {}{kind}", pdb.path, pdb.signature, pdb.age)?;
    }
    for checksum in checksums {
        writeln!(out, "checksum {checksum}")?;
    }
    for perfmap in perfmaps {
        writeln!(out, "perfmap {} version {}", perfmap.path, perfmap.version)?;
    }
    Ok(())
}

pub fn version(out: &mut impl Write, file: &PeFile, args: &ExplainArgs) -> Result<()> {
    let Some(info) = file.version_info()? else {
        writeln!(out, "no version resource")?;
        return Ok(());
    };
    let mut b = SimpleTableBuilder::new();
    add_simple!(b, "file version", info.file_version(), "major.minor.build.revision");
    add_simple!(
        b,
        "product version",
        info.product_version(),
        "version of the product the file ships with"
    );
    add_simple!(b, "debug", info.is_debug(), "built with debug information");
    b.writeln(&mut *out, args.explain)?;
    Ok(())
}

pub fn export(out: &mut impl Write, file: &PeFile, args: &ExportArgs) -> Result<()> {
    match file.export_symbol(&args.symbol)? {
        Some(rva) => writeln!(out, "{} {rva:#x}", args.symbol)?,
        None => writeln!(out, "{} is not exported", args.symbol)?,
    }
    Ok(())
}
