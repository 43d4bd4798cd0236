//! tilegen command-line binary.
//!
//! Reads a block program (file or stdin), runs one pass and writes the result.
//! `-v` raises the log level; `RUST_LOG` overrides it.

use clap::Parser;
use log::LevelFilter;
use tilegen::driver::{self, Cli};

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).parse_default_env().init();

    if let Err(e) = driver::run(&cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
