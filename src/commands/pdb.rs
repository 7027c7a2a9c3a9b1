use super::tables::{SimpleTableBuilder, TableBuilder, add_field, add_simple};
use crate::cli::{ExplainArgs, TableArgs};
use fileformats::error::Result;
use fileformats::pdb::PdbFile;
use std::io::Write;

pub fn info(out: &mut impl Write, file: &PdbFile, args: &ExplainArgs) -> Result<()> {
    let mut b = SimpleTableBuilder::new();
    add_simple!(
        b,
        "container",
        file.container_kind_spec_string()?,
        "pdb for classic MSF files, msfz plus a version for compressed files"
    );
    add_simple!(b, "streams", file.num_streams()?, "number of streams, including nil streams");
    add_simple!(
        b,
        "signature",
        file.signature()?,
        "GUID that the CodeView records of matching PE files refer to"
    );
    add_simple!(b, "age", file.age()?, "incremented each time the PDB is written");
    let dbi_age = if file.is_dbi_valid() {
        file.dbi_age()?.to_string()
    } else {
        "invalid".to_string()
    };
    add_simple!(b, "dbi age", dbi_age, "age from the debug info stream, normally the same");
    b.writeln(&mut *out, args.explain)?;
    Ok(())
}

pub fn streams(out: &mut impl Write, file: &PdbFile, args: &TableArgs) -> Result<()> {
    let mut b = TableBuilder::new();
    b.add_col_r("index", "stream number, 1 is the name stream and 3 the debug info stream");
    b.add_col_r("size", "number of bytes in the stream, - if it can't be read");
    for stream in 0..file.num_streams()? {
        let size = match file.stream_size(stream) {
            Ok(size) => format!("{size:x}"),
            Err(err) => {
                tracing::debug!(%err, stream, "no size for PDB stream");
                "-".to_string()
            }
        };
        add_field!(b, "index", stream);
        add_field!(b, "size", size);
    }
    b.writeln(&mut *out, args.titles, args.explain)?;
    Ok(())
}
