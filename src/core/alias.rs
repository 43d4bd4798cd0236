//! Per-block alias resolution.
//!
//! An [`AliasMap`] resolves every refinement visible in a block to the buffer
//! it ultimately aliases. Maps are built top-down during traversal: a child
//! refinement whose `from` names a refinement of the parent inherits the
//! parent's base buffer, anything else is a new allocation owned by the child.

use hashbrown::HashMap;

use super::block::Block;
use super::shape::TensorShape;

/// Resolution of one refinement to its base buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasInfo {
    /// Name of the base buffer in the block that owns it.
    pub base_name: String,
    /// Name of the block that owns the base buffer.
    pub base_block: String,
    /// Depth of the owning block; the root block sits at depth 1.
    pub base_depth: usize,
    pub is_global: bool,
    /// Interior shape of the refinement in the current block.
    pub shape: TensorShape,
}

#[derive(Debug, Clone, Default)]
pub struct AliasMap {
    depth: usize,
    block_name: String,
    info: HashMap<String, AliasInfo>,
}

impl AliasMap {
    /// Alias map of `root` derived from an empty base map.
    pub fn root(root: &Block) -> Self {
        AliasMap::default().child(root)
    }

    /// Alias map of `block`, a direct child of the block this map describes.
    pub fn child(&self, block: &Block) -> Self {
        let depth = self.depth + 1;
        let mut info = HashMap::with_capacity(block.refinements.len());
        for refinement in &block.refinements {
            let inherited = refinement.from.as_deref().and_then(|from| self.info.get(from));
            let entry = match inherited {
                Some(parent) => AliasInfo {
                    shape: refinement.shape.clone(),
                    ..parent.clone()
                },
                None => AliasInfo {
                    base_name: refinement.name.clone(),
                    base_block: block.name.clone(),
                    base_depth: depth,
                    is_global: refinement.is_global,
                    shape: refinement.shape.clone(),
                },
            };
            info.insert(refinement.name.clone(), entry);
        }
        Self {
            depth,
            block_name: block.name.clone(),
            info,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn block_name(&self) -> &str {
        &self.block_name
    }

    pub fn get(&self, name: &str) -> Option<&AliasInfo> {
        self.info.get(name)
    }

    pub fn len(&self) -> usize {
        self.info.len()
    }

    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }
}
