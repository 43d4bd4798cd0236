// This module implements the traversal engine shared by the tiling and caching passes. It
// walks the block tree depth-first in pre-order, children in statement order, and hands
// every block that satisfies a Requirement to a visitor together with that block's alias
// map. A Requirement is a small predicate value (tag presence, block name and boolean
// combinators) rather than ad hoc string dispatch. Visitors may rewrite the matched block;
// the walk then descends into whatever statements the visitor left behind, which is how
// nested matches below a rewritten block are still reached. The visit order is fixed,
// which keeps tiling output order and the cache selector tie-break reproducible.

//! Requirement matching and block traversal.

use super::alias::AliasMap;
use super::block::Block;
use super::error::PassResult;

/// Predicate over block metadata used to select blocks for a pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Requirement {
    /// Matches every block.
    #[default]
    Any,
    HasTag(String),
    Named(String),
    All(Vec<Requirement>),
    AnyOf(Vec<Requirement>),
    Not(Box<Requirement>),
}

impl Requirement {
    /// Block must carry every tag; an empty list matches every block.
    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut reqs: Vec<Requirement> = tags.into_iter().map(|t| Requirement::HasTag(t.into())).collect();
        match reqs.len() {
            0 => Requirement::Any,
            1 => reqs.remove(0),
            _ => Requirement::All(reqs),
        }
    }

    pub fn matches(&self, block: &Block) -> bool {
        match self {
            Requirement::Any => true,
            Requirement::HasTag(tag) => block.has_tag(tag),
            Requirement::Named(name) => block.name == *name,
            Requirement::All(reqs) => reqs.iter().all(|r| r.matches(block)),
            Requirement::AnyOf(reqs) => reqs.iter().any(|r| r.matches(block)),
            Requirement::Not(req) => !req.matches(block),
        }
    }
}

/// Visit every block under `root` that satisfies `reqs`, in pre-order.
///
/// With `recurse_into_matches` unset a matching block is a leaf for the walk;
/// otherwise its (possibly rewritten) children are walked after the visit.
/// The first visitor error stops the walk and is returned.
pub fn run_on_blocks<F>(
    root: &mut Block,
    reqs: &Requirement,
    mut visitor: F,
    recurse_into_matches: bool,
) -> PassResult<()>
where
    F: FnMut(&AliasMap, &mut Block) -> PassResult<()>,
{
    let map = AliasMap::root(root);
    walk(&map, root, reqs, &mut visitor, recurse_into_matches)
}

fn walk(
    map: &AliasMap,
    block: &mut Block,
    reqs: &Requirement,
    visitor: &mut dyn FnMut(&AliasMap, &mut Block) -> PassResult<()>,
    recurse_into_matches: bool,
) -> PassResult<()> {
    if reqs.matches(block) {
        log::trace!("visiting block `{}` at depth {}", block.name, map.depth());
        visitor(map, block)?;
        if !recurse_into_matches {
            return Ok(());
        }
    }
    for stmt in &mut block.statements {
        if let Some(sub) = stmt.as_block_mut() {
            let sub_map = map.child(sub);
            walk(&sub_map, sub, reqs, visitor, recurse_into_matches)?;
        }
    }
    Ok(())
}
