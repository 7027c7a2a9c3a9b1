mod cli;
mod commands;

#[cfg(test)]
#[allow(dead_code)]
#[path = "test_data.rs"]
mod test_data;

use clap::Parser;
use cli::Cli;
use commands::styles::Styling;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so stdout only has the dump.
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = commands::run(&cli.command) {
        eprintln!("{}", err.to_string().warn());
        process::exit(1);
    }
}
