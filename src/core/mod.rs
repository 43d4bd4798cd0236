// This module is the hub for tilegen's core infrastructure, the pieces every pass shares. It
// exports the block tree data model (blocks, indices, refinements, statements), integer
// affine expressions, tensor shapes with the shape-to-bytes codec seam, per-block alias
// maps, the requirement predicate and pre-order traversal engine, the tiling primitive that
// splits a block into an outer/inner nest, the compiler state with the CompilePass trait,
// and the thiserror-based error types.

//! Core tilegen infrastructure
//!
//! # Key Components
//!
//! ## Block tree (`block`, `affine`, `shape`)
//! - Owned, cloneable tree of blocks; `Clone` is the deep structural copy
//! - Affine index expressions with structural equality
//! - Shapes resolved to bytes through [`ShapeCodec`]
//!
//! ## Traversal (`traversal`, `alias`)
//! - Pre-order walk with a [`Requirement`] predicate
//! - Alias maps resolving refinements to their base buffers
//!
//! ## Tiling (`tile`)
//! - Per-refinement tile shapes and the outer/inner block split
//!
//! ## Passes (`state`)
//! - [`CompilerState`] and the [`CompilePass`] contract

pub mod affine;
pub mod alias;
pub mod block;
pub mod error;
pub mod shape;
pub mod state;
pub mod tile;
pub mod traversal;

#[cfg(test)]
pub mod test_utils;

pub use affine::Affine;
pub use alias::{AliasInfo, AliasMap};
pub use block::{tags, Block, Index, Op, RefDir, Refinement, Statement, Tags};
pub use error::{ParseError, PassError, PassResult};
pub use shape::{make_odd_tile, DataType, DenseCodec, Dim, ShapeCodec, TensorShape};
pub use state::{run_passes, CompilePass, CompilerState};
pub use tile::{apply_tile, TileShape};
pub use traversal::{run_on_blocks, Requirement};
