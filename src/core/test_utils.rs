//! Test utilities for pass-level testing.
//!
//! Small programs shared by the unit tests, built with the block builders so
//! the tests do not depend on the text parser.

use super::affine::Affine;
use super::block::{Block, Index, Op, RefDir, Refinement};
use super::shape::{DataType, Dim, TensorShape};
use super::state::CompilerState;

/// Route `log` output through the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Single-element view over a row-major buffer with the given strides.
pub fn element_view(dir: RefDir, name: &str, strides: &[i64], access: &[&str]) -> Refinement {
    let dims = strides.iter().map(|&s| Dim::new(1, s)).collect();
    let access = access.iter().map(|n| Affine::var(*n)).collect();
    Refinement::new(dir, name, TensorShape::new(DataType::F32, dims), access)
}

/// Two free indices `i`/`j` writing one global f32 element each.
pub fn two_index_target(r1: u64, r2: u64) -> Block {
    Block::new("kernel")
        .with_tags(["kernel"])
        .with_index(Index::new("i", r1))
        .with_index(Index::new("j", r2))
        .with_refinement(element_view(RefDir::Out, "O", &[r2 as i64, 1], &["i", "j"]).with_global(true))
        .with_statement(Op::new("store", ["O"]))
}

/// `C[i, j] += A[i, k] * B[k, j]` as the last statement of `main`.
pub fn matmul_program(m: u64, n: u64, k: u64) -> Block {
    let kernel = Block::new("kernel")
        .with_tags(["kernel", "contraction"])
        .with_index(Index::new("i", m))
        .with_index(Index::new("j", n))
        .with_index(Index::new("k", k))
        .with_refinement(element_view(RefDir::Out, "C", &[n as i64, 1], &["i", "j"]).with_from("C").with_global(true))
        .with_refinement(element_view(RefDir::In, "A", &[k as i64, 1], &["i", "k"]).with_from("A").with_global(true))
        .with_refinement(element_view(RefDir::In, "B", &[n as i64, 1], &["k", "j"]).with_from("B").with_global(true))
        .with_statement(Op::new("mul", ["A", "B"]))
        .with_statement(Op::new("add_assign", ["C"]));
    let init = Block::new("zero_c")
        .with_index(Index::new("i", m))
        .with_index(Index::new("j", n))
        .with_refinement(element_view(RefDir::Out, "C", &[n as i64, 1], &["i", "j"]).with_from("C"))
        .with_statement(Op::new("zero", ["C"]));
    let global = |dir, name: &str, sizes: &[u64]| {
        Refinement::new(dir, name, TensorShape::packed(DataType::F32, sizes), vec![Affine::default(); sizes.len()])
            .with_global(true)
    };
    Block::new("main")
        .with_tags(["main"])
        .with_refinement(global(RefDir::In, "A", &[m, k]))
        .with_refinement(global(RefDir::In, "B", &[k, n]))
        .with_refinement(global(RefDir::Out, "C", &[m, n]))
        .with_statement(init)
        .with_statement(kernel)
}

/// Run `f` against a fresh compiler state and hand back the resulting program.
pub fn with_state<F>(entry: Block, f: F) -> Block
where
    F: FnOnce(&mut CompilerState),
{
    let mut state = CompilerState::new(entry);
    f(&mut state);
    state.into_entry()
}
