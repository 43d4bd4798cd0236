//! Cache-reference pass.
//!
//! Within every matched region, tags the `cache` block whose global
//! refinements cover the most elements. `cache` blocks end the search, so a
//! cache region nested inside another is never considered. Ties keep the block
//! found first in pre-order.

use crate::core::alias::AliasMap;
use crate::core::block::{Block, Statement, Tags};
use crate::core::error::PassResult;
use crate::core::state::{CompilePass, CompilerState};
use crate::core::traversal::{run_on_blocks, Requirement};

/// Tag that marks a block as a caching region.
pub const CACHE_TAG: &str = "cache";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CacheReferenceOptions {
    pub reqs: Requirement,
    /// Tags added to the selected block.
    pub tags: Tags,
}

impl CacheReferenceOptions {
    pub fn new(tags: Tags) -> Self {
        Self {
            reqs: Requirement::Any,
            tags,
        }
    }

    pub fn with_reqs(mut self, reqs: Requirement) -> Self {
        self.reqs = reqs;
        self
    }
}

/// Element count of the global refinements of `block`, over all its iterations.
pub fn global_footprint(block: &Block) -> u64 {
    block
        .refinements
        .iter()
        .filter(|r| r.is_global)
        .filter_map(|r| block.exterior_shape(&r.name))
        .fold(0u64, |acc, shape| acc.saturating_add(shape.sizes_product()))
}

/// Best cache block seen so far, as a path of statement positions.
#[derive(Debug, Default)]
struct LargestCache {
    size: u64,
    path: Option<Vec<usize>>,
}

fn largest_ref_block(block: &Block, path: &mut Vec<usize>, best: &mut LargestCache) {
    if block.has_tag(CACHE_TAG) {
        let size = global_footprint(block);
        if size > best.size {
            best.size = size;
            best.path = Some(path.clone());
        }
        return;
    }
    for (pos, stmt) in block.statements.iter().enumerate() {
        if let Statement::Block(sub) = stmt {
            path.push(pos);
            largest_ref_block(sub, path, best);
            path.pop();
        }
    }
}

fn block_at_mut<'b>(block: &'b mut Block, path: &[usize]) -> Option<&'b mut Block> {
    let mut current = block;
    for &pos in path {
        current = current.statements.get_mut(pos)?.as_block_mut()?;
    }
    Some(current)
}

/// Tag the largest cache block under `block`; no cache block is a no-op.
pub fn cache_reference(_alias_map: &AliasMap, block: &mut Block, options: &CacheReferenceOptions) {
    let mut best = LargestCache::default();
    largest_ref_block(block, &mut Vec::new(), &mut best);
    let Some(path) = best.path else {
        log::trace!("no cache block under `{}`", block.name);
        return;
    };
    if let Some(winner) = block_at_mut(block, &path) {
        log::debug!("cache block `{}` selected ({} elements)", winner.name, best.size);
        winner.add_tags(options.tags.iter().cloned());
    }
}

/// Tags the largest cache region of each matched block.
#[derive(Debug, Clone)]
pub struct CacheReferencePass {
    options: CacheReferenceOptions,
}

impl CacheReferencePass {
    pub fn new(options: CacheReferenceOptions) -> Self {
        Self { options }
    }
}

impl CompilePass for CacheReferencePass {
    fn name(&self) -> &'static str {
        "cache_reference"
    }

    fn apply(&self, state: &mut CompilerState) -> PassResult<()> {
        run_on_blocks(
            state.entry_mut(),
            &self.options.reqs,
            |map, block| {
                cache_reference(map, block, &self.options);
                Ok(())
            },
            true,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::{tags, Index, Op, RefDir};
    use crate::core::test_utils::{element_view, with_state};

    fn cache_block(name: &str, range: u64, global: bool) -> Block {
        Block::new(name)
            .with_tags([CACHE_TAG])
            .with_index(Index::new("x", range))
            .with_refinement(element_view(RefDir::In, "buf", &[1], &["x"]).with_global(global))
    }

    fn run(program: Block) -> Block {
        let pass = CacheReferencePass::new(
            CacheReferenceOptions::new(tags(["ref_tile"])).with_reqs(Requirement::tags(["region"])),
        );
        with_state(program, |state| pass.apply(state).expect("pass succeeds"))
    }

    fn tagged(program: &Block) -> Vec<String> {
        let mut names = Vec::new();
        collect(program, &mut names);
        names
    }

    fn collect(block: &Block, names: &mut Vec<String>) {
        if block.has_tag("ref_tile") {
            names.push(block.name.clone());
        }
        for sub in block.sub_blocks() {
            collect(sub, names);
        }
    }

    #[test]
    fn largest_global_footprint_wins() {
        let region = Block::new("region")
            .with_tags(["region"])
            .with_statement(cache_block("small", 4, true))
            .with_statement(Block::new("wrapper").with_statement(cache_block("large", 16, true)))
            .with_statement(cache_block("local", 64, false));
        assert_eq!(tagged(&run(region)), vec!["large"]);
    }

    #[test]
    fn ties_keep_the_first_block() {
        let region = Block::new("region")
            .with_tags(["region"])
            .with_statement(cache_block("first", 8, true))
            .with_statement(cache_block("second", 8, true));
        assert_eq!(tagged(&run(region)), vec!["first"]);
    }

    #[test]
    fn nested_cache_blocks_are_not_searched() {
        let outer = cache_block("outer", 2, true).with_statement(cache_block("inner", 100, true));
        let region = Block::new("region").with_tags(["region"]).with_statement(outer);
        assert_eq!(tagged(&run(region)), vec!["outer"]);
    }

    #[test]
    fn no_cache_block_is_a_no_op() {
        let region = Block::new("region")
            .with_tags(["region"])
            .with_statement(Block::new("compute").with_index(Index::new("x", 4)))
            .with_statement(Op::new("sync", Vec::<String>::new()));
        let before = region.clone();
        assert_eq!(run(region), before);
    }

    #[test]
    fn zero_footprint_never_wins() {
        let region = Block::new("region")
            .with_tags(["region"])
            .with_statement(cache_block("locals_only", 32, false));
        assert!(tagged(&run(region)).is_empty());
    }

    #[test]
    fn each_region_gets_its_own_winner() {
        let program = Block::new("main")
            .with_statement(
                Block::new("region")
                    .with_tags(["region"])
                    .with_statement(cache_block("a", 3, true))
                    .with_statement(cache_block("b", 5, true)),
            )
            .with_statement(
                Block::new("region")
                    .with_tags(["region"])
                    .with_statement(cache_block("c", 7, true)),
            );
        assert_eq!(tagged(&run(program)), vec!["b", "c"]);
    }

    #[test]
    fn footprint_counts_exterior_elements() {
        let block = cache_block("c", 6, true)
            .with_index(Index::new("y", 3))
            .with_refinement(element_view(RefDir::Out, "out", &[3, 1], &["x", "y"]).with_global(true));
        assert_eq!(global_footprint(&block), 6 + 18);
    }
}
