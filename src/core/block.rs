// This module defines the block tree that every pass operates on. A Block is a node of the
// hierarchical program: it names a loop nest through its ordered indices, views memory
// through named refinements, restricts iterations with affine constraints, and owns an
// ordered list of statements that are either nested blocks or opaque leaf operations. Tags
// are plain strings used to match blocks for passes and to hand results to later passes;
// the comments string carries the tiling feature encoding after the generate-tiles pass.
// Each block exclusively owns its children, so the tree is a plain owned Rust value and a
// deep copy is just Clone. The module also provides the per-block queries the passes need:
// free indices, accumulation indices, sub-block lookup and exterior refinement shapes.

//! Block tree data model.

use std::collections::BTreeSet;
use std::fmt;

use hashbrown::HashSet;

use super::affine::Affine;
use super::shape::{Dim, TensorShape};

/// Tag set attached to a block.
pub type Tags = BTreeSet<String>;

/// Build a tag set from string-like items.
pub fn tags<I, S>(items: I) -> Tags
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

/// One loop dimension of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub name: String,
    pub range: u64,
    /// Affine over enclosing indices; zero for a free index.
    pub affine: Affine,
}

impl Index {
    pub fn new(name: impl Into<String>, range: u64) -> Self {
        Self {
            name: name.into(),
            range,
            affine: Affine::default(),
        }
    }

    /// Range-1 index forwarding the value of an enclosing index expression.
    pub fn passthrough(name: impl Into<String>, affine: Affine) -> Self {
        Self {
            name: name.into(),
            range: 1,
            affine,
        }
    }

    /// Free indices are not derived from an enclosing index and may be tiled.
    pub fn is_free(&self) -> bool {
        self.affine.is_zero()
    }
}

/// Data flow direction of a refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RefDir {
    #[default]
    None,
    In,
    Out,
    InOut,
}

impl RefDir {
    pub const fn name(self) -> &'static str {
        match self {
            RefDir::None => "none",
            RefDir::In => "in",
            RefDir::Out => "out",
            RefDir::InOut => "inout",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "none" => Some(RefDir::None),
            "in" => Some(RefDir::In),
            "out" => Some(RefDir::Out),
            "inout" => Some(RefDir::InOut),
            _ => None,
        }
    }
}

impl fmt::Display for RefDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named view of a memory region as seen by a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refinement {
    pub dir: RefDir,
    /// Name inside this block.
    pub name: String,
    /// Name of the refined buffer in the parent block, if any.
    pub from: Option<String>,
    pub is_global: bool,
    /// Shape of the region touched by a single iteration.
    pub shape: TensorShape,
    /// One affine per shape dimension.
    pub access: Vec<Affine>,
}

impl Refinement {
    pub fn new(dir: RefDir, name: impl Into<String>, shape: TensorShape, access: Vec<Affine>) -> Self {
        Self {
            dir,
            name: name.into(),
            from: None,
            is_global: false,
            shape,
            access,
        }
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn with_global(mut self, is_global: bool) -> Self {
        self.is_global = is_global;
        self
    }

    /// Access flattened through the strides: `Σ access[d] * stride[d]`.
    pub fn flat_access(&self) -> Affine {
        self.access
            .iter()
            .zip(&self.shape.dims)
            .fold(Affine::default(), |acc, (affine, dim)| acc + affine.clone() * dim.stride)
    }

    /// Shape covered when each index takes `extent(name)` consecutive values.
    pub(crate) fn extent_shape(&self, extent: impl Fn(&str) -> u64) -> TensorShape {
        let mut shape = self.shape.clone();
        for (dim, affine) in shape.dims.iter_mut().zip(&self.access) {
            let mut size = dim.size;
            for (name, coef) in affine.terms() {
                let count = extent(name).max(1);
                size = size.saturating_add(coef.unsigned_abs().saturating_mul(count - 1));
            }
            *dim = Dim::new(size, dim.stride);
        }
        shape
    }
}

/// Leaf operation; opaque to the tiling passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Op {
    pub name: String,
    pub args: Vec<String>,
}

impl Op {
    pub fn new<I, S>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Block(Box<Block>),
    Op(Op),
}

impl Statement {
    pub fn as_block(&self) -> Option<&Block> {
        match self {
            Statement::Block(block) => Some(block),
            Statement::Op(_) => None,
        }
    }

    pub fn as_block_mut(&mut self) -> Option<&mut Block> {
        match self {
            Statement::Block(block) => Some(block),
            Statement::Op(_) => None,
        }
    }
}

impl From<Block> for Statement {
    fn from(block: Block) -> Self {
        Statement::Block(Box::new(block))
    }
}

impl From<Op> for Statement {
    fn from(op: Op) -> Self {
        Statement::Op(op)
    }
}

/// A node in the hierarchical program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    pub name: String,
    pub tags: Tags,
    pub comments: String,
    pub indices: Vec<Index>,
    pub refinements: Vec<Refinement>,
    /// Each constraint must evaluate to a non-negative value.
    pub constraints: Vec<Affine>,
    pub statements: Vec<Statement>,
}

impl Block {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_tags<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_tags(items);
        self
    }

    pub fn with_index(mut self, index: Index) -> Self {
        self.indices.push(index);
        self
    }

    pub fn with_refinement(mut self, refinement: Refinement) -> Self {
        self.refinements.push(refinement);
        self
    }

    pub fn with_constraint(mut self, constraint: Affine) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn with_statement(mut self, statement: impl Into<Statement>) -> Self {
        self.statements.push(statement.into());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn has_tags<'a>(&self, required: impl IntoIterator<Item = &'a String>) -> bool {
        required.into_iter().all(|tag| self.tags.contains(tag))
    }

    pub fn add_tags<I, S>(&mut self, items: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(items.into_iter().map(Into::into));
    }

    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indices.iter().find(|idx| idx.name == name)
    }

    pub fn refinement(&self, name: &str) -> Option<&Refinement> {
        self.refinements.iter().find(|r| r.name == name)
    }

    /// Positions of free indices, in declaration order.
    pub fn free_indices(&self) -> Vec<usize> {
        self.indices
            .iter()
            .enumerate()
            .filter(|(_, idx)| idx.is_free())
            .map(|(pos, _)| pos)
            .collect()
    }

    /// Names of indices that no output refinement depends on.
    ///
    /// `inout_as_output` counts `inout` refinements as outputs too.
    pub fn accumulation_idxs(&self, inout_as_output: bool) -> HashSet<String> {
        let outputs: Vec<&Refinement> = self
            .refinements
            .iter()
            .filter(|r| r.dir == RefDir::Out || (inout_as_output && r.dir == RefDir::InOut))
            .collect();
        self.indices
            .iter()
            .filter(|idx| {
                !outputs
                    .iter()
                    .any(|r| r.access.iter().any(|a| a.get(&idx.name) != 0))
            })
            .map(|idx| idx.name.clone())
            .collect()
    }

    /// Nested blocks among the statements, in statement order.
    pub fn sub_blocks(&self) -> impl Iterator<Item = &Block> + '_ {
        self.statements.iter().filter_map(Statement::as_block)
    }

    /// The `pos`-th nested block, counted from the end when `reverse` is set.
    pub fn sub_block(&self, pos: usize, reverse: bool) -> Option<&Block> {
        if reverse {
            self.statements.iter().rev().filter_map(Statement::as_block).nth(pos)
        } else {
            self.sub_blocks().nth(pos)
        }
    }

    pub fn sub_block_mut(&mut self, pos: usize) -> Option<&mut Block> {
        self.statements.iter_mut().filter_map(Statement::as_block_mut).nth(pos)
    }

    /// Shape of refinement `name` covered by all iterations of this block.
    pub fn exterior_shape(&self, name: &str) -> Option<TensorShape> {
        let refinement = self.refinement(name)?;
        Some(refinement.extent_shape(|idx| self.index(idx).map_or(1, |i| i.range)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shape::DataType;

    fn contraction() -> Block {
        // C[i, j] += A[i, k] * B[k, j]
        Block::new("kernel")
            .with_index(Index::new("i", 8))
            .with_index(Index::new("j", 4))
            .with_index(Index::new("k", 16))
            .with_refinement(Refinement::new(
                RefDir::Out,
                "C",
                TensorShape::new(DataType::F32, vec![Dim::new(1, 4), Dim::new(1, 1)]),
                vec![Affine::var("i"), Affine::var("j")],
            ))
            .with_refinement(Refinement::new(
                RefDir::In,
                "A",
                TensorShape::new(DataType::F32, vec![Dim::new(1, 16), Dim::new(1, 1)]),
                vec![Affine::var("i"), Affine::var("k")],
            ))
    }

    #[test]
    fn accumulation_indices_skip_output_dims() {
        let block = contraction();
        let acc = block.accumulation_idxs(true);
        assert_eq!(acc.len(), 1);
        assert!(acc.contains("k"));
    }

    #[test]
    fn inout_only_counts_when_requested() {
        let mut block = contraction();
        block.refinements[0].dir = RefDir::InOut;
        assert_eq!(block.accumulation_idxs(false).len(), 3);
        assert_eq!(block.accumulation_idxs(true).len(), 1);
    }

    #[test]
    fn exterior_shape_spans_all_iterations() {
        let block = contraction();
        assert_eq!(block.exterior_shape("A").map(|s| s.sizes()), Some(vec![8, 16]));
        assert_eq!(block.exterior_shape("C").map(|s| s.sizes_product()), Some(32));
        assert!(block.exterior_shape("missing").is_none());
    }

    #[test]
    fn flat_access_folds_strides() {
        let block = contraction();
        let flat = block.refinements[1].flat_access();
        assert_eq!(flat.get("i"), 16);
        assert_eq!(flat.get("k"), 1);
        assert_eq!(flat.get("j"), 0);
    }

    #[test]
    fn sub_block_counts_from_either_end() {
        let block = Block::new("main")
            .with_statement(Block::new("init"))
            .with_statement(Op::new("barrier", Vec::<String>::new()))
            .with_statement(Block::new("target"));
        assert_eq!(block.sub_block(0, false).map(|b| b.name.as_str()), Some("init"));
        assert_eq!(block.sub_block(0, true).map(|b| b.name.as_str()), Some("target"));
        assert!(block.sub_block(2, false).is_none());
    }
}
