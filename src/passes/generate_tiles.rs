// This module implements the generate-tiles pass, the search core of tilegen. For the block
// named `main`, the trailing nested block is the tiling target. TilePlanGenerator walks its
// free indices depth-first and tries every tile factor below the index range, optionally
// restricted to divisors of the range and/or powers of two. Accumulation indices are pinned
// to their full range unless the options let them take part. Each complete plan is checked
// against the scratch-memory budget: the per-tile shapes of all refinements (optionally
// padded to odd sizes) are resolved to bytes through the ShapeCodec and summed. Every
// plan that fits produces a clone of the target tiled into an outer/inner nest. The clone
// gets the configured tag sets, and its comments carry the feature encoding of the
// untiled target and of the inner block. The clones replace the target in discovery order.
// An optional pruning mode drops prefixes whose smallest completion already exceeds the
// budget; it yields exactly the same plans as the exhaustive search.

//! Tile plan search and the generate-tiles pass.

use hashbrown::HashSet;

use crate::core::alias::AliasMap;
use crate::core::block::{Block, Statement, Tags};
use crate::core::error::{PassError, PassResult};
use crate::core::shape::{make_odd_tile, DenseCodec, ShapeCodec};
use crate::core::state::{CompilePass, CompilerState};
use crate::core::tile::{apply_tile, TileShape};
use crate::core::traversal::{run_on_blocks, Requirement};

use super::features::features;

/// Options of the generate-tiles pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GenerateTilesOptions {
    /// Blocks visited by the pass; only one named `main` is rewritten.
    pub reqs: Requirement,
    /// Tags added to each generated outer block.
    pub outer_set: Tags,
    /// Tags added to each generated inner block.
    pub inner_set: Tags,
    /// Scratch-memory budget of one tile, in bytes.
    pub max_mem_size: u64,
    /// Estimate footprints with every even dimension padded by one.
    pub odd_size: bool,
    /// Interleave tiles instead of making them contiguous.
    pub interleave: bool,
    /// Let accumulation indices take part in the search.
    pub acc_idxs: bool,
    /// Only try factors that divide the index range.
    pub only_even: bool,
    /// Only try factors that are powers of two.
    pub only_po2: bool,
    /// Skip prefixes that cannot fit the budget; needs a monotone codec.
    pub prune: bool,
}

impl GenerateTilesOptions {
    pub fn new(max_mem_size: u64) -> Self {
        Self {
            max_mem_size,
            ..Self::default()
        }
    }

    pub fn with_reqs(mut self, reqs: Requirement) -> Self {
        self.reqs = reqs;
        self
    }

    pub fn with_outer_set(mut self, tags: Tags) -> Self {
        self.outer_set = tags;
        self
    }

    pub fn with_inner_set(mut self, tags: Tags) -> Self {
        self.inner_set = tags;
        self
    }

    pub fn with_odd_size(mut self, odd_size: bool) -> Self {
        self.odd_size = odd_size;
        self
    }

    pub fn with_interleave(mut self, interleave: bool) -> Self {
        self.interleave = interleave;
        self
    }

    pub fn with_acc_idxs(mut self, acc_idxs: bool) -> Self {
        self.acc_idxs = acc_idxs;
        self
    }

    pub fn with_only_even(mut self, only_even: bool) -> Self {
        self.only_even = only_even;
        self
    }

    pub fn with_only_po2(mut self, only_po2: bool) -> Self {
        self.only_po2 = only_po2;
        self
    }

    pub fn with_prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    pub fn validate(&self) -> PassResult<()> {
        if self.max_mem_size == 0 {
            return Err(PassError::InvalidOptions {
                reason: "max_mem_size must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Whether `factor` passes the structural filters for an index of `range`.
    ///
    /// With both filters set a factor must satisfy both.
    pub fn accepts_factor(&self, range: u64, factor: u64) -> bool {
        if self.only_even && range % factor != 0 {
            return false;
        }
        if self.only_po2 && !factor.is_power_of_two() {
            return false;
        }
        true
    }
}

/// Counters of one search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanStats {
    /// Complete assignments reached.
    pub candidates: u64,
    /// Assignments within budget.
    pub valid: u64,
    /// Prefixes abandoned by pruning.
    pub pruned: u64,
}

/// Enumerates tile plans of one target block.
pub struct TilePlanGenerator<'a> {
    target: &'a Block,
    options: &'a GenerateTilesOptions,
    codec: &'a dyn ShapeCodec,
    /// Positions of the free indices in `target.indices`.
    free: Vec<usize>,
    /// Which entries of `free` are pinned accumulation indices.
    pinned: Vec<bool>,
    plan: Vec<u64>,
    target_features: String,
    plans: Vec<Vec<u64>>,
    blocks: Vec<Block>,
    stats: PlanStats,
}

impl<'a> TilePlanGenerator<'a> {
    pub fn new(target: &'a Block, options: &'a GenerateTilesOptions, codec: &'a dyn ShapeCodec) -> Self {
        let acc: HashSet<String> = target.accumulation_idxs(true);
        let free = target.free_indices();
        let pinned = free
            .iter()
            .map(|&pos| !options.acc_idxs && acc.contains(&target.indices[pos].name))
            .collect();
        let plan = vec![0; free.len()];
        Self {
            target,
            options,
            codec,
            free,
            pinned,
            plan,
            target_features: features(target),
            plans: Vec::new(),
            blocks: Vec::new(),
            stats: PlanStats::default(),
        }
    }

    /// Run the full search from the first free index.
    pub fn generate(&mut self) {
        self.generate_plans(0);
    }

    fn generate_plans(&mut self, k: usize) {
        if k >= self.free.len() {
            self.stats.candidates += 1;
            if self.is_valid_plan() {
                self.emit();
            }
            return;
        }
        let range = self.target.indices[self.free[k]].range;
        if self.pinned[k] {
            self.plan[k] = range;
            self.generate_plans(k + 1);
            return;
        }
        for factor in 1..range {
            if !self.options.accepts_factor(range, factor) {
                continue;
            }
            self.plan[k] = factor;
            if self.options.prune && !self.prefix_fits(k) {
                // footprints only grow with the factor
                self.stats.pruned += 1;
                break;
            }
            self.generate_plans(k + 1);
        }
    }

    /// Tile factors by index name, for the first `len` entries of the plan.
    fn tile_by_name(&self, len: usize) -> TileShape {
        self.free[..len]
            .iter()
            .zip(&self.plan[..len])
            .map(|(&pos, &factor)| (self.target.indices[pos].name.clone(), factor))
            .collect()
    }

    /// Summed byte footprint of all refinements for one tile.
    fn footprint(&self, tile: &TileShape) -> u64 {
        self.target
            .refinements
            .iter()
            .fold(0u64, |total, refinement| {
                let tiled = refinement.apply_tile(tile);
                let bytes = if self.options.odd_size {
                    self.codec.byte_size(&make_odd_tile(&tiled))
                } else {
                    self.codec.byte_size(&tiled)
                };
                total.saturating_add(bytes)
            })
    }

    pub fn is_valid_plan(&self) -> bool {
        let tile = self.tile_by_name(self.free.len());
        self.footprint(&tile) <= self.options.max_mem_size
    }

    // Smallest completion of plan[..=k]: undecided indices at 1, pinned ones at full range.
    fn prefix_fits(&self, k: usize) -> bool {
        let mut tile = self.tile_by_name(k + 1);
        for (slot, &pos) in self.free.iter().enumerate().skip(k + 1) {
            let idx = &self.target.indices[pos];
            let factor = if self.pinned[slot] { idx.range } else { 1 };
            tile.insert(idx.name.clone(), factor);
        }
        self.footprint(&tile) <= self.options.max_mem_size
    }

    fn emit(&mut self) {
        let tile = self.tile_by_name(self.free.len());
        let mut block = self.target.clone();
        apply_tile(&mut block, &tile, self.options.interleave);
        block.add_tags(self.options.outer_set.iter().cloned());
        let inner_features = match block.sub_block_mut(0) {
            Some(inner) => {
                inner.add_tags(self.options.inner_set.iter().cloned());
                features(inner)
            }
            None => String::new(),
        };
        block.comments = format!("{}.{}", self.target_features, inner_features);
        log::trace!("plan {:?} accepted: {}", self.plan, block.comments);

        self.stats.valid += 1;
        self.plans.push(self.plan.clone());
        self.blocks.push(block);
    }

    /// Feature encoding of the untiled target.
    pub fn target_features(&self) -> &str {
        &self.target_features
    }

    /// Valid plans in discovery order, one factor per free index.
    pub fn plans(&self) -> &[Vec<u64>] {
        &self.plans
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn stats(&self) -> PlanStats {
        self.stats
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }
}

/// Replace the trailing nested block of `main` with all of its tiled variants.
///
/// Blocks not named `main` are left alone.
pub fn generate_tiles(
    _alias_map: &AliasMap,
    block: &mut Block,
    options: &GenerateTilesOptions,
    codec: &dyn ShapeCodec,
) -> PassResult<()> {
    if block.name != "main" {
        return Ok(());
    }
    // Earlier statements are initialization or helpers; only the last one is tiled.
    let Some(Statement::Block(target)) = block.statements.last() else {
        return Err(PassError::NoTilingTarget {
            block: block.name.clone(),
        });
    };

    let target_name = target.name.clone();
    let mut generator = TilePlanGenerator::new(target, options, codec);
    generator.generate();
    let stats = generator.stats();
    log::debug!(
        "tiling `{}`: {} candidates, {} valid, {} pruned",
        target_name,
        stats.candidates,
        stats.valid,
        stats.pruned
    );
    if stats.valid == 0 {
        log::warn!("no tile plan of `{}` fits in {} bytes", target_name, options.max_mem_size);
    }

    let tiled = generator.into_blocks();
    block.statements.pop();
    block.statements.extend(tiled.into_iter().map(Statement::from));
    Ok(())
}

/// Emits one tiled variant of the `main` target per valid tile plan.
pub struct GenerateTilesPass {
    options: GenerateTilesOptions,
    codec: Box<dyn ShapeCodec>,
}

impl GenerateTilesPass {
    pub fn new(options: GenerateTilesOptions) -> Self {
        Self {
            options,
            codec: Box::new(DenseCodec),
        }
    }

    pub fn with_codec(mut self, codec: impl ShapeCodec + 'static) -> Self {
        self.codec = Box::new(codec);
        self
    }

    pub fn options(&self) -> &GenerateTilesOptions {
        &self.options
    }
}

impl CompilePass for GenerateTilesPass {
    fn name(&self) -> &'static str {
        "generate_tiles"
    }

    fn apply(&self, state: &mut CompilerState) -> PassResult<()> {
        self.options.validate()?;
        let codec = self.codec.as_ref();
        run_on_blocks(
            state.entry_mut(),
            &self.options.reqs,
            |map, block| generate_tiles(map, block, &self.options, codec),
            true,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::affine::Affine;
    use crate::core::block::{tags, Index, Op, RefDir, Refinement};
    use crate::core::shape::{DataType, Dim, TensorShape};
    use crate::core::test_utils::{init_logging, matmul_program, two_index_target, with_state};

    fn search(target: &Block, options: &GenerateTilesOptions) -> (Vec<Vec<u64>>, PlanStats) {
        let mut generator = TilePlanGenerator::new(target, options, &DenseCodec);
        generator.generate();
        (generator.plans().to_vec(), generator.stats())
    }

    #[test]
    fn four_by_three_under_twenty_bytes() {
        init_logging();
        let target = two_index_target(4, 3);
        let (plans, stats) = search(&target, &GenerateTilesOptions::new(20));
        assert_eq!(plans, vec![vec![1, 1], vec![1, 2], vec![2, 1], vec![2, 2], vec![3, 1]]);
        assert_eq!(stats.candidates, 6);
        assert_eq!(stats.valid, 5);
    }

    #[test]
    fn candidates_are_product_of_ranges_minus_one() {
        let program = matmul_program(4, 5, 3);
        let kernel = program.sub_block(0, true).expect("kernel");
        let options = GenerateTilesOptions::new(u64::MAX).with_acc_idxs(true);
        let (plans, stats) = search(kernel, &options);
        assert_eq!(stats.candidates, 3 * 4 * 2);
        assert_eq!(plans.len(), 24);
    }

    #[test]
    fn accumulation_indices_are_pinned_by_default() {
        let program = matmul_program(4, 4, 6);
        let kernel = program.sub_block(0, true).expect("kernel");
        let (plans, stats) = search(kernel, &GenerateTilesOptions::new(u64::MAX));
        assert_eq!(stats.candidates, 9);
        assert!(plans.iter().all(|p| p[2] == 6));
    }

    #[test]
    fn divisor_filter() {
        let target = two_index_target(12, 8);
        let options = GenerateTilesOptions::new(u64::MAX).with_only_even(true);
        let (plans, _) = search(&target, &options);
        assert_eq!(plans.len(), 5 * 3);
        assert!(plans.iter().all(|p| 12 % p[0] == 0 && 8 % p[1] == 0));
    }

    #[test]
    fn power_of_two_filter() {
        let target = two_index_target(12, 8);
        let options = GenerateTilesOptions::new(u64::MAX).with_only_po2(true);
        let (plans, _) = search(&target, &options);
        // {1, 2, 4, 8} x {1, 2, 4}
        assert_eq!(plans.len(), 12);
        assert!(plans.iter().flatten().all(|f| f.is_power_of_two()));
    }

    #[test]
    fn both_filters_must_hold() {
        let target = two_index_target(12, 8);
        let options = GenerateTilesOptions::new(u64::MAX).with_only_even(true).with_only_po2(true);
        let (plans, _) = search(&target, &options);
        // {1, 2, 4} x {1, 2, 4}
        assert_eq!(plans.len(), 9);
        assert!(plans.iter().all(|p| p[0] != 8));
    }

    #[test]
    fn odd_size_uses_padded_footprint() {
        let target = two_index_target(4, 3);
        let options = GenerateTilesOptions::new(20).with_odd_size(true);
        let (plans, _) = search(&target, &options);
        assert_eq!(plans, vec![vec![1, 1], vec![1, 2], vec![2, 1], vec![3, 1]]);
    }

    #[test]
    fn every_plan_fits_the_budget() {
        let program = matmul_program(6, 5, 7);
        let kernel = program.sub_block(0, true).expect("kernel");
        for odd_size in [false, true] {
            let options = GenerateTilesOptions::new(96).with_acc_idxs(true).with_odd_size(odd_size);
            let mut generator = TilePlanGenerator::new(kernel, &options, &DenseCodec);
            generator.generate();
            assert!(!generator.plans().is_empty());
            for plan in generator.plans() {
                let (ti, tj, tk) = (plan[0], plan[1], plan[2]);
                let pad = |s: u64| if odd_size && s % 2 == 0 { s + 1 } else { s };
                let bytes = 4 * (pad(ti) * pad(tj) + pad(ti) * pad(tk) + pad(tk) * pad(tj));
                assert!(bytes <= 96, "plan {plan:?} uses {bytes} bytes");
            }
        }
    }

    #[test]
    fn pruning_keeps_the_same_plans() {
        let program = matmul_program(9, 7, 8);
        let kernel = program.sub_block(0, true).expect("kernel");
        for budget in [16, 100, 400, 1000] {
            for (acc_idxs, odd_size) in [(false, false), (true, false), (true, true)] {
                let base = GenerateTilesOptions::new(budget).with_acc_idxs(acc_idxs).with_odd_size(odd_size);
                let (full, _) = search(kernel, &base);
                let (pruned, stats) = search(kernel, &base.clone().with_prune(true));
                assert_eq!(full, pruned, "budget {budget}, acc {acc_idxs}, odd {odd_size}");
                if budget == 16 && acc_idxs {
                    assert!(stats.pruned > 0);
                }
            }
        }
    }

    #[test]
    fn emitted_blocks_carry_tags_and_features() {
        let target = two_index_target(4, 3);
        let options = GenerateTilesOptions::new(20)
            .with_outer_set(tags(["tiled", "outer"]))
            .with_inner_set(tags(["inner"]));
        let mut generator = TilePlanGenerator::new(&target, &options, &DenseCodec);
        generator.generate();
        assert_eq!(generator.target_features(), "4 3 ;3 1 ");

        let blocks = generator.blocks();
        assert_eq!(blocks.len(), 5);
        // plan (2, 1) tiles both indices evenly
        let outer = &blocks[2];
        assert!(outer.has_tags(&tags(["tiled", "outer", "kernel"])));
        assert_eq!(outer.comments, "4 3 ;3 1 .2 1 ;3 1 ");
        let inner = outer.sub_block(0, false).expect("inner");
        assert!(inner.has_tag("inner"));
        assert!(!inner.has_tag("tiled"));

        // plan (3, 1) leaves a partial tile and a passthrough index
        assert_eq!(blocks[4].comments, "4 3 ;3 1 .3 1 1 ;3 1 0 ");
    }

    #[test]
    fn pass_splices_variants_after_helpers() {
        init_logging();
        let program = matmul_program(4, 2, 2);
        let pass = GenerateTilesPass::new(GenerateTilesOptions::new(u64::MAX).with_reqs(Requirement::tags(["main"])));
        let program = with_state(program, |state| pass.apply(state).expect("pass succeeds"));

        let names: Vec<&str> = program.sub_blocks().map(|b| b.name.as_str()).collect();
        // zero_c stays first; 3 x 1 plans of the kernel follow (k pinned)
        assert_eq!(names, vec!["zero_c", "kernel", "kernel", "kernel"]);
        let factors: Vec<u64> = program
            .sub_blocks()
            .skip(1)
            .map(|b| b.sub_block(0, false).map_or(0, |inner| inner.indices[0].range))
            .collect();
        assert_eq!(factors, vec![1, 2, 3]);
    }

    #[test]
    fn missing_target_is_fatal() {
        let program = Block::new("main").with_tags(["main"]).with_statement(Op::new("nop", Vec::<String>::new()));
        let mut state = CompilerState::new(program);
        let pass = GenerateTilesPass::new(GenerateTilesOptions::new(64));
        assert_eq!(
            pass.apply(&mut state),
            Err(PassError::NoTilingTarget { block: "main".into() })
        );
    }

    #[test]
    fn other_blocks_are_untouched() {
        let mut program = matmul_program(4, 4, 4);
        program.name = "entry".into();
        let before = program.clone();
        let pass = GenerateTilesPass::new(GenerateTilesOptions::new(1024));
        let after = with_state(program, |state| pass.apply(state).expect("pass succeeds"));
        assert_eq!(after, before);
    }

    #[test]
    fn zero_budget_is_rejected() {
        let mut state = CompilerState::new(matmul_program(2, 2, 2));
        let pass = GenerateTilesPass::new(GenerateTilesOptions::default());
        assert!(matches!(pass.apply(&mut state), Err(PassError::InvalidOptions { .. })));
    }

    #[test]
    fn custom_codec_drives_the_budget() {
        let target = two_index_target(4, 3);
        let options = GenerateTilesOptions::new(2);
        let count_dims = |shape: &TensorShape| shape.sizes().iter().filter(|&&s| s > 1).count() as u64;
        let mut generator = TilePlanGenerator::new(&target, &options, &count_dims);
        generator.generate();
        assert_eq!(generator.plans().len(), 6);
    }

    #[test]
    fn oversized_refinement_never_fits() {
        init_logging();
        let huge = TensorShape::new(DataType::F32, vec![Dim::new(1 << 32, 1), Dim::new(1 << 32, 1)]);
        let target = Block::new("kernel")
            .with_index(Index::new("i", 3))
            .with_refinement(
                Refinement::new(RefDir::Out, "O", huge, vec![Affine::var("i"), Affine::default()]).with_global(true),
            );
        let (plans, stats) = search(&target, &GenerateTilesOptions::new(1000));
        assert!(plans.is_empty());
        assert_eq!(stats.valid, 0);
    }
}
