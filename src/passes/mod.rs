//! Block-tree passes.
//!
//! - [`generate_tiles`] - tile plan search, emitting one variant per plan
//! - [`cache_ref`] - largest cache region selection
//! - [`features`] - feature encoding shared with plan ranking

pub mod cache_ref;
pub mod features;
pub mod generate_tiles;

pub use cache_ref::{cache_reference, global_footprint, CacheReferenceOptions, CacheReferencePass, CACHE_TAG};
pub use features::{features, ref_features};
pub use generate_tiles::{generate_tiles, GenerateTilesOptions, GenerateTilesPass, PlanStats, TilePlanGenerator};
