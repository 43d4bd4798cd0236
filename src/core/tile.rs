// This module implements the tiling primitive used by the generate-tiles pass. A tile maps
// free index names to tile factors. Refinement::apply_tile computes the interior shape a
// refinement covers within one tile, which is what the memory-budget check sums. apply_tile
// splits a block into an outer block that iterates over tiles and a single inner block
// that iterates within one tile. Tiles are either contiguous (outer stride = factor) or
// interleaved (inner stride = outer range). Refinement accesses are split between the two
// levels so that every element address stays the same. Uneven tiles get a guard
// constraint in the inner block so iterations past the original range are skipped.

//! Tile application for blocks and refinements.

use hashbrown::HashMap;

use super::affine::Affine;
use super::block::{Block, Index, Refinement};
use super::shape::TensorShape;

/// Tile factor by index name.
pub type TileShape = HashMap<String, u64>;

impl Refinement {
    /// Interior shape seen by one tile; indices missing from `tile` count as 1.
    pub fn apply_tile(&self, tile: &TileShape) -> TensorShape {
        self.extent_shape(|name| tile.get(name).copied().unwrap_or(1))
    }
}

fn signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// How one index of the original block is split.
struct Split {
    range: u64,
    /// Multiplier of the outer index in the global position.
    outer_scale: i64,
    /// Multiplier of the inner index in the global position.
    inner_scale: i64,
    inner_range: u64,
    uneven: bool,
}

/// Rewrite `block` into an outer block over tiles holding one inner block.
///
/// Free indices found in `tile` are split; other free indices are left whole.
/// Non-free indices stay on the outer block and reach the inner through a
/// passthrough index of the same name.
pub fn apply_tile(block: &mut Block, tile: &TileShape, interleave: bool) {
    let mut inner = Block::new(block.name.clone());
    inner.statements = std::mem::take(&mut block.statements);

    let mut splits: HashMap<String, Split> = HashMap::new();
    for idx in &mut block.indices {
        if !idx.is_free() {
            inner.indices.push(Index::passthrough(idx.name.clone(), Affine::var(idx.name.clone())));
            continue;
        }
        let range = idx.range;
        let factor = tile.get(&idx.name).copied().unwrap_or(range).clamp(1, range.max(1));
        let outer_range = range.div_ceil(factor);
        let (outer_scale, inner_scale) = if interleave {
            (1, signed(outer_range))
        } else {
            (signed(factor), 1)
        };
        idx.range = outer_range;
        inner.indices.push(Index::new(idx.name.clone(), factor));
        splits.insert(
            idx.name.clone(),
            Split {
                range,
                outer_scale,
                inner_scale,
                inner_range: factor,
                uneven: range % factor != 0,
            },
        );
        log::trace!(
            "tile `{}`: {} -> {} x {}{}",
            idx.name,
            range,
            outer_range,
            factor,
            if interleave { " (interleaved)" } else { "" }
        );
    }

    // Refinements: the outer keeps the offset of the tile, the inner the offset within it.
    let mut outer_refs = Vec::with_capacity(block.refinements.len());
    for refinement in &block.refinements {
        let mut outer_access = Vec::with_capacity(refinement.access.len());
        let mut inner_access = Vec::with_capacity(refinement.access.len());
        for affine in &refinement.access {
            let mut outer = Affine::constant(affine.constant_term());
            let mut inner_aff = Affine::default();
            for (name, coef) in affine.terms() {
                match splits.get(name) {
                    Some(split) => {
                        outer.add_term(name, coef.saturating_mul(split.outer_scale));
                        inner_aff.add_term(name, coef.saturating_mul(split.inner_scale));
                    }
                    None => outer.add_term(name, coef),
                }
            }
            outer_access.push(outer);
            inner_access.push(inner_aff);
        }

        let mut inner_ref = refinement.clone().with_from(refinement.name.clone());
        inner_ref.access = inner_access;
        let mut outer_ref = refinement.clone();
        outer_ref.access = outer_access;
        outer_ref.shape = inner_ref.extent_shape(|name| splits.get(name).map_or(1, |s| s.inner_range));

        inner.refinements.push(inner_ref);
        outer_refs.push(outer_ref);
    }
    block.refinements = outer_refs;

    // Constraints: restate in terms of the global position of each split index.
    let mut guards = Vec::new();
    for idx in &block.indices {
        let Some(split) = splits.get(&idx.name) else {
            continue;
        };
        let mentioned = block.constraints.iter().any(|c| c.get(&idx.name) != 0);
        if !split.uneven && !mentioned {
            continue;
        }
        let outer_name = format!("{}_outer", idx.name);
        inner.indices.push(Index::passthrough(outer_name.clone(), Affine::var(idx.name.clone())));
        let global = Affine::term(outer_name, split.outer_scale) + Affine::term(idx.name.clone(), split.inner_scale);
        if split.uneven {
            guards.push(Affine::constant(signed(split.range) - 1) - global.clone());
        }
        for constraint in &mut block.constraints {
            *constraint = constraint.substitute(&idx.name, &global);
        }
    }
    inner.constraints = std::mem::take(&mut block.constraints);
    inner.constraints.extend(guards);

    block.statements = vec![inner.into()];
}
