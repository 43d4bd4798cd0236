// This module is the command-line front end of tilegen. It declares the clap derive argument
// structs for the three subcommands (tile, cache, features), maps their flags onto the typed
// pass options, and runs the matching pass over a program read in the textual block format.
// Output is the rewritten program, or a feature table when requested. I/O, parse and pass
// failures are folded into DriverError so the binary can report them in one place.

//! Command-line driver for the tilegen passes.

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use thiserror::Error;

use crate::core::block::{tags, Block};
use crate::core::error::{ParseError, PassError};
use crate::core::state::{run_passes, CompilePass, CompilerState};
use crate::core::traversal::{run_on_blocks, Requirement};
use crate::passes::cache_ref::{CacheReferenceOptions, CacheReferencePass};
use crate::passes::features::features;
use crate::passes::generate_tiles::{GenerateTilesOptions, GenerateTilesPass};
use crate::text::{parse_block, print_block};

/// Errors surfaced by the command-line driver.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Pass(#[from] PassError),

    #[error(transparent)]
    Usage(#[from] clap::Error),
}

#[derive(Parser, Debug)]
#[command(name = "tilegen")]
#[command(about = "Tiling plan search and cache block selection over block programs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Raise the log level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replace the tiling target of `main` with one variant per valid tile plan
    Tile(TileArgs),
    /// Tag the largest cache block of every matched region
    Cache(CacheArgs),
    /// Print the feature encoding of every matched block
    Features(FeaturesArgs),
}

impl Command {
    fn io(&self) -> &IoArgs {
        match self {
            Command::Tile(args) => &args.io,
            Command::Cache(args) => &args.io,
            Command::Features(args) => &args.io,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct IoArgs {
    /// Input program; read from stdin when omitted
    pub input: Option<PathBuf>,

    /// Write the result here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct TileArgs {
    #[command(flatten)]
    pub io: IoArgs,

    /// Tags a block must carry to be searched
    #[arg(long, value_delimiter = ',', value_name = "TAGS")]
    pub reqs: Vec<String>,

    /// Tags added to every emitted outer block
    #[arg(long, value_delimiter = ',', value_name = "TAGS")]
    pub outer_set: Vec<String>,

    /// Tags added to every emitted inner block
    #[arg(long, value_delimiter = ',', value_name = "TAGS")]
    pub inner_set: Vec<String>,

    /// Byte budget for the tiled refinements of one plan
    #[arg(long, value_name = "BYTES")]
    pub max_mem_size: u64,

    /// Pad even tile dimensions to odd sizes when checking the budget
    #[arg(long)]
    pub odd_size: bool,

    /// Interleave inner iterations instead of tiling contiguously
    #[arg(long)]
    pub interleave: bool,

    /// Search accumulation indices too
    #[arg(long)]
    pub acc_idxs: bool,

    /// Only factors that divide the index range
    #[arg(long)]
    pub only_even: bool,

    /// Only power-of-two factors
    #[arg(long)]
    pub only_po2: bool,

    /// Skip candidates whose prefix already exceeds the budget
    #[arg(long)]
    pub prune: bool,

    /// Print `name: features` for each emitted variant instead of the program
    #[arg(long)]
    pub emit_features: bool,
}

impl TileArgs {
    pub fn options(&self) -> GenerateTilesOptions {
        GenerateTilesOptions::new(self.max_mem_size)
            .with_reqs(Requirement::tags(self.reqs.iter().cloned()))
            .with_outer_set(tags(self.outer_set.iter().cloned()))
            .with_inner_set(tags(self.inner_set.iter().cloned()))
            .with_odd_size(self.odd_size)
            .with_interleave(self.interleave)
            .with_acc_idxs(self.acc_idxs)
            .with_only_even(self.only_even)
            .with_only_po2(self.only_po2)
            .with_prune(self.prune)
    }
}

#[derive(Args, Debug, Clone)]
pub struct CacheArgs {
    #[command(flatten)]
    pub io: IoArgs,

    /// Tags a region must carry to be searched
    #[arg(long, value_delimiter = ',', value_name = "TAGS")]
    pub reqs: Vec<String>,

    /// Tags added to the selected cache block
    #[arg(long, value_delimiter = ',', value_name = "TAGS")]
    pub tags: Vec<String>,
}

impl CacheArgs {
    pub fn options(&self) -> CacheReferenceOptions {
        CacheReferenceOptions::new(tags(self.tags.iter().cloned()))
            .with_reqs(Requirement::tags(self.reqs.iter().cloned()))
    }
}

#[derive(Args, Debug, Clone)]
pub struct FeaturesArgs {
    #[command(flatten)]
    pub io: IoArgs,

    /// Tags a block must carry to be encoded
    #[arg(long, value_delimiter = ',', value_name = "TAGS")]
    pub reqs: Vec<String>,
}

/// Run `command` over `program` and render its textual result.
pub fn execute(command: &Command, program: Block) -> Result<String, DriverError> {
    match command {
        Command::Tile(args) => {
            let pass = GenerateTilesPass::new(args.options());
            let entry = run_pass(&pass, program)?;
            if args.emit_features {
                Ok(feature_table(&entry))
            } else {
                Ok(print_block(&entry))
            }
        }
        Command::Cache(args) => {
            let pass = CacheReferencePass::new(args.options());
            Ok(print_block(&run_pass(&pass, program)?))
        }
        Command::Features(args) => {
            let reqs = Requirement::tags(args.reqs.iter().cloned());
            let mut program = program;
            let mut out = String::new();
            run_on_blocks(
                &mut program,
                &reqs,
                |_, block| {
                    out.push_str(&format!("{}: {}\n", block.name, features(block)));
                    Ok(())
                },
                true,
            )?;
            Ok(out)
        }
    }
}

fn run_pass(pass: &dyn CompilePass, program: Block) -> Result<Block, DriverError> {
    let mut state = CompilerState::new(program);
    run_passes(&mut state, &[pass])?;
    Ok(state.into_entry())
}

/// `name: comments` for every block with comments, in pre-order.
pub fn feature_table(program: &Block) -> String {
    fn collect(block: &Block, out: &mut String) {
        if !block.comments.is_empty() {
            out.push_str(&format!("{}: {}\n", block.name, block.comments));
        }
        for sub in block.sub_blocks() {
            collect(sub, out);
        }
    }
    let mut out = String::new();
    collect(program, &mut out);
    out
}

/// Read, transform and write according to `cli`.
pub fn run(cli: &Cli) -> Result<(), DriverError> {
    let io_args = cli.command.io();
    let text = match &io_args.input {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    let program = parse_block(&text)?;
    log::info!("loaded program `{}`", program.name);

    let output = execute(&cli.command, program)?;
    match &io_args.output {
        Some(path) => fs::write(path, output)?,
        None => io::stdout().write_all(output.as_bytes())?,
    }
    Ok(())
}
