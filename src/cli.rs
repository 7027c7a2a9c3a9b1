//! Command line definitions, e.g. `ffdump pe foo.dll debug --titles`.
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fmt;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about, long_about = None)]
#[command(infer_subcommands(true))] // allow abreviations
pub struct Cli {
    /// Log parsing details to stderr (RUST_LOG overrides this)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: MainCommand,
}

#[derive(Subcommand)]
pub enum MainCommand {
    /// Show information about an ELF executable or shared library
    Elf(ElfCommand),

    /// Show information about an ELF core dump
    Core(CoreCommand),

    /// Show information about a PE executable or dll
    Pe(PeCommand),

    /// Show information about a Windows PDB
    Pdb(PdbCommand),
}

#[derive(Args)]
pub struct ElfCommand {
    /// Path to the ELF file
    pub path: PathBuf,

    #[clap(subcommand)]
    pub action: ElfAction,
}

#[derive(Args)]
pub struct CoreCommand {
    /// Path to the core file
    pub path: PathBuf,

    #[clap(subcommand)]
    pub action: CoreAction,
}

#[derive(Args)]
pub struct PeCommand {
    /// Path to the PE file
    pub path: PathBuf,

    #[clap(subcommand)]
    pub action: PeAction,
}

#[derive(Args)]
pub struct PdbCommand {
    /// Path to the PDB file
    pub path: PathBuf,

    #[clap(subcommand)]
    pub action: PdbAction,
}

#[derive(Subcommand)]
pub enum ElfAction {
    /// Show ELF header
    Header(ExplainArgs),

    /// Show segments
    Segments(TableArgs),

    /// Show sections
    Sections(TableArgs),

    /// Show the notes in note segments
    Notes(TableArgs),

    /// Show the GNU build id
    BuildId,
}

#[derive(Subcommand)]
pub enum CoreAction {
    /// Show the files mapped into the process
    Files(TableArgs),

    /// Show the images (exes and shared libraries) loaded into the process
    Images(TableArgs),

    /// Print a range of the process memory as hex and ascii
    Read(ReadArgs),
}

#[derive(Subcommand)]
pub enum PeAction {
    /// Show the file and optional headers
    Header(ExplainArgs),

    /// Show section headers
    Sections(TableArgs),

    /// Show the PDB, checksum, and perfmap records from the debug directory
    Debug(TableArgs),

    /// Show the fixed file version resource
    Version(ExplainArgs),

    /// Print the RVA of an exported symbol
    Export(ExportArgs),
}

#[derive(Subcommand)]
pub enum PdbAction {
    /// Show the container kind, GUID, and age
    Info(ExplainArgs),

    /// Show the streams and their sizes
    Streams(TableArgs),
}

#[derive(Args)]
pub struct ExplainArgs {
    /// Explain columns, fields, etc.
    #[arg(short, long)]
    pub explain: bool,
}

#[derive(Args)]
pub struct TableArgs {
    /// Explain columns, fields, etc.
    #[arg(short, long)]
    pub explain: bool,

    /// Add column headers
    #[arg(short, long)]
    pub titles: bool,
}

#[derive(Args)]
pub struct ReadArgs {
    /// Number of bytes to dump
    #[arg(short, long)]
    #[arg(default_value_t = 64)]
    pub count: usize,

    /// How to display the start of each row
    #[arg(short, long, name = "TYPE")]
    #[arg(default_value_t = HexdumpLabels::Addr)]
    pub labels: HexdumpLabels,

    /// A virtual address in the cored process
    #[arg(value_parser = parse_u64_expr)]
    pub address: u64,
}

#[derive(Args)]
pub struct ExportArgs {
    /// Exported name, e.g. DllGetClassObject
    pub symbol: String,
}

#[derive(Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum HexdumpLabels {
    /// Show nothing at the start of lines
    None,

    /// Show the address for the first byte on each line
    Addr,

    /// Show the offset from zero for the first byte on each line
    Zero,
}

impl fmt::Display for HexdumpLabels {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HexdumpLabels::None => fmt.write_str("none"),
            HexdumpLabels::Addr => fmt.write_str("addr"),
            HexdumpLabels::Zero => fmt.write_str("zero"),
        }
    }
}

fn parse_u64_expr(s: &str) -> Result<u64, String> {
    let s = s.replace('_', "");
    let result = if let Some(t) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(t, 16)
    } else {
        s.parse()
    };
    result.map_err(|_| format!("`{s}` isn't a hex or decimal number"))
}
