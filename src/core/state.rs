//! Compiler state and the pass contract.
//!
//! Passes are applied one after another to a [`CompilerState`], each one
//! rewriting the entry block in place. There is no registry: callers build the
//! passes they want and apply them in order.

use super::block::Block;
use super::error::PassResult;

/// Pass-pipeline state holding the program's entry block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerState {
    entry: Block,
}

impl CompilerState {
    pub fn new(entry: Block) -> Self {
        Self { entry }
    }

    pub fn entry(&self) -> &Block {
        &self.entry
    }

    pub fn entry_mut(&mut self) -> &mut Block {
        &mut self.entry
    }

    pub fn into_entry(self) -> Block {
        self.entry
    }
}

/// A compiler pass that rewrites the program held by a [`CompilerState`].
pub trait CompilePass {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn apply(&self, state: &mut CompilerState) -> PassResult<()>;
}

/// Apply `passes` in order, stopping at the first failure.
pub fn run_passes(state: &mut CompilerState, passes: &[&dyn CompilePass]) -> PassResult<()> {
    for pass in passes {
        log::info!("running pass `{}`", pass.name());
        pass.apply(state)?;
    }
    Ok(())
}
