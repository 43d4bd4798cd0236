//! Feature encoding of a block for plan ranking.
//!
//! The encoding is `<range> ` for every index, then `;` followed by
//! `<coef> ` for every index, once per refinement. Coefficients come from the
//! refinement's flat access. The exact text is consumed by the plan-ranking
//! side, so field order and spacing must not change.

use std::fmt::Write;

use crate::core::block::{Block, Refinement};

/// Access coefficients of `refinement` for each index of `block`.
pub fn ref_features(block: &Block, refinement: &Refinement) -> String {
    let access = refinement.flat_access();
    let mut features = String::new();
    for idx in &block.indices {
        // writing into a String cannot fail
        let _ = write!(features, "{} ", access.get(&idx.name));
    }
    features
}

/// Index ranges followed by one coefficient segment per refinement.
pub fn features(block: &Block) -> String {
    let mut out = String::new();
    for idx in &block.indices {
        let _ = write!(out, "{} ", idx.range);
    }
    for refinement in &block.refinements {
        out.push(';');
        out.push_str(&ref_features(block, refinement));
    }
    out
}
