//! Textual block format for writing and inspecting programs.
//!
//! The format mirrors the block tree one item per line, which keeps
//! filetests readable and diffable:
//! - Human-readable and writable
//! - Round-trips exactly through [`print_block`] and [`parse_block`]
//!
//! # Format
//!
//! ```text
//! ; Comments start with semicolon
//! block main #main {
//!   ref in A global f32 [0, 0] (8:16, 16:1)
//!   block kernel #kernel #contraction {
//!     comments "free text"
//!     idx i 8
//!     idx n 1 = 2*i_outer + 1
//!     ref in a from A global f32 [i, k] (1:16, 1:1)
//!     constraint 7 - i
//!     op load a
//!   }
//! }
//! ```
//!
//! A refinement line lists direction (`none`, `in`, `out`, `inout`), name, an
//! optional `from` parent, the `global` marker, the element type, one affine
//! access per dimension and the `size:stride` dimensions.

pub mod check;
pub mod parser;
pub mod printer;

pub use check::{CheckDirective, RunDirective, TestRunner, TestSpec};

use crate::core::block::Block;
use crate::core::error::ParseError;

/// Parse a program made of exactly one top-level block.
pub fn parse_block(text: &str) -> Result<Block, ParseError> {
    parser::parse_program(text)
}

/// Render `block` and everything below it in the textual format.
pub fn print_block(block: &Block) -> String {
    printer::print_block(block)
}
