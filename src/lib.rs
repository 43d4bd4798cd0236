//! tilegen - tiling plan search and cache block selection.
//!
//! tilegen works on a nested block program: blocks own loop indices,
//! refinements (shaped views of buffers) and child statements. Two passes
//! rewrite the tree in place. Tile generation replaces the last block under
//! `main` with one tiled variant per tile plan that fits a byte budget, each
//! keyed by a feature string for the cost model. Cache reference selection
//! tags the cache block with the largest global footprint in each region.
//!
//! # Primary Usage
//!
//! ```ignore
//! use tilegen::core::{run_passes, CompilerState};
//! use tilegen::passes::{GenerateTilesOptions, GenerateTilesPass};
//! use tilegen::text::{parse_block, print_block};
//!
//! let program = parse_block(&source)?;
//! let mut state = CompilerState::new(program);
//! let pass = GenerateTilesPass::new(GenerateTilesOptions::new(32 * 1024).with_only_po2(true));
//! run_passes(&mut state, &[&pass])?;
//! println!("{}", print_block(state.entry()));
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Block tree, affine expressions, shapes, traversal, tiling primitive
//! - [`passes`] - Tile generation, cache reference selection, feature encoding
//! - [`text`] - Textual block format and FileCheck-style test runner
//! - [`driver`] - Command-line front end

pub mod core;
pub mod driver;
pub mod passes;
pub mod text;

pub use crate::core::{
    // Block tree
    Affine, Block, Index, Op, RefDir, Refinement, Statement, Tags,
    // Shapes
    DataType, DenseCodec, Dim, ShapeCodec, TensorShape,
    // Pass framework
    run_passes, CompilePass, CompilerState, Requirement,
    // Errors
    ParseError, PassError, PassResult,
};
pub use crate::passes::{CacheReferenceOptions, CacheReferencePass, GenerateTilesOptions, GenerateTilesPass};
