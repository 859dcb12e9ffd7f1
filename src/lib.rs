//! # Ripple Native Analyzer (Reactivity Ground Truth)
//!
//! Build-time reactivity analysis for Ripple components. The pipeline is
//! strictly one-directional:
//!
//! 1. **Builder** populates the block tree from declaration requests.
//! 2. **Pruner** removes reactive declarations nothing observes, iterating to
//!    a fixed point, and assigns each terminally observed id its canonical
//!    wave bit.
//! 3. **Propagator** computes, per surviving id, the union of every terminal
//!    computation's wave bits in one backward pass per block (post-order over
//!    sub-components).
//! 4. **Bit manager** resolves names/ids to wave bits and dependency bitmaps
//!    to react bits during code generation.
//!
//! ## Invariants
//!
//! 1. **Bit uniqueness**: every reactive id is a distinct power of two within
//!    one builder; ids are shared only across the leaves of one destructuring
//!    pattern.
//! 2. **Declaration order**: a source is always declared before any statement
//!    that depends on it. The single backward pass in step 3 is only correct
//!    because of this.
//! 3. **Isolation**: each top-level component gets its own allocator and
//!    arena; id spaces never collide across components, which is what makes
//!    the batch entry safe to parallelize.
//! 4. **Finalize once**: a block tree is pruned and propagated exactly once,
//!    together with its whole subtree.

#[cfg(feature = "napi")]
use napi_derive::napi;

mod analyze;
mod builder;
mod codegen;
mod extract;
mod ir;
mod pattern;
mod prune;
mod view;
mod wave;

#[cfg(test)]
mod wave_tests;

pub use analyze::{
    analyze_component, analyze_components, AnalyzeResult, AnalyzedComponent, ComponentInput,
    Declaration,
};
#[cfg(feature = "napi")]
pub use analyze::{analyze_component_native, analyze_components_native};
pub use builder::{BitAllocator, IRBuilder};
pub use codegen::generate_runtime_code;
pub use extract::{extract_dependency, extract_hook_call};
pub use ir::*;
pub use pattern::{parse_binding_target, BindingTarget};
pub use prune::prune_unused_state;
pub use view::parse_view;
pub use wave::{build_wave_bits_map, BitManager};

#[cfg(feature = "napi")]
#[napi]
pub fn analyzer_bridge() -> String {
    "Ripple Native Analyzer Connected".to_string()
}
