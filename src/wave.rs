//! Wave propagation and the bit manager.
//!
//! Statements are built in dependency order (a consumer is always declared
//! after its sources), so a single backward scan of each block visits every
//! consumer of a producer before the producer itself. Sub-components recurse
//! first: post-order over the tree, reverse order within a block. No fixed
//! point or cycle detection is needed; declarations form a DAG by
//! construction.

use std::collections::HashMap;

use crate::ir::{
    bitmap_to_bits, BlockId, CompilerError, DerivedStmt, ErrorKind, IRRoot, IRStmt,
    SourceLocation, ERR_MISSING_WAVE_BIT,
};

/// Compute the wave bits map: for each reactive id, the union of the wave
/// bits of every terminal computation that transitively depends on it.
pub fn build_wave_bits_map(
    ir: &IRRoot,
    id_to_wave_bit: &HashMap<u64, u64>,
) -> HashMap<u64, u64> {
    let mut wave_bits_map = HashMap::new();
    traverse(ir, ir.root, id_to_wave_bit, &mut wave_bits_map);
    wave_bits_map
}

fn traverse(
    ir: &IRRoot,
    block_id: BlockId,
    id_to_wave_bit: &HashMap<u64, u64>,
    wave_bits_map: &mut HashMap<u64, u64>,
) {
    let block = ir.block(block_id);
    // e.g. with `a = f(b)` here and `b = g(c)` in a nested component, `a`
    // needs `c`'s waves, so children contribute before this block scans.
    for stmt in &block.body {
        if let IRStmt::SubComp(sub) = stmt {
            traverse(ir, sub.block, id_to_wave_bit, wave_bits_map);
        }
    }

    for stmt in block.body.iter().rev() {
        let Some(reactive_id) = stmt.reactive_id() else {
            continue;
        };
        let wave_bits = get_wave_bits(id_to_wave_bit, reactive_id, wave_bits_map);
        if wave_bits != 0 {
            wave_bits_map.insert(reactive_id, wave_bits);
            if let IRStmt::Derived(derived) = stmt {
                track_source(wave_bits_map, derived, wave_bits);
            }
        }
    }
}

/// A statement's own canonical bit (absent when nothing observes the id
/// terminally) merged with the waves already recorded by later-declared
/// consumers.
fn get_wave_bits(
    id_to_wave_bit: &HashMap<u64, u64>,
    reactive_id: u64,
    wave_bits_map: &HashMap<u64, u64>,
) -> u64 {
    let own_bit = id_to_wave_bit.get(&reactive_id).copied().unwrap_or(0);
    let downstream = wave_bits_map.get(&reactive_id).copied().unwrap_or(0);
    own_bit | downstream
}

/// Push a derived statement's waves onto each of its sources, merging with
/// whatever the source already accumulated. This is what lets `a → b → c`
/// give `a` the waves of everything that ultimately depends on it.
fn track_source(
    wave_bits_map: &mut HashMap<u64, u64>,
    stmt: &DerivedStmt,
    derived_waves: u64,
) {
    if let Some(dependency) = &stmt.dependency {
        for source_id in bitmap_to_bits(dependency.dep_id_bitmap) {
            *wave_bits_map.entry(source_id).or_insert(0) |= derived_waves;
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BIT MANAGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Read-only façade over the propagation outputs, used during code
/// generation to embed literal bitmask constants into update guards.
#[derive(Debug, Clone)]
pub struct BitManager {
    wave_bits_map: HashMap<u64, u64>,
    id_to_wave_bit: HashMap<u64, u64>,
    file: String,
}

impl BitManager {
    pub fn new(
        wave_bits_map: HashMap<u64, u64>,
        id_to_wave_bit: HashMap<u64, u64>,
        file: &str,
    ) -> Self {
        BitManager {
            wave_bits_map,
            id_to_wave_bit,
            file: file.to_string(),
        }
    }

    /// Wave bits for a name, resolved lexically from `block` outward. Zero
    /// when the name is unknown at every level or carries no waves.
    pub fn wave_bits_for_name(&self, ir: &IRRoot, block: BlockId, name: &str) -> u64 {
        match ir.resolve_reactive(block, name) {
            Some(id) => self.wave_bits_for_id(id),
            None => 0,
        }
    }

    pub fn wave_bits_for_id(&self, id: u64) -> u64 {
        self.wave_bits_map.get(&id).copied().unwrap_or(0)
    }

    /// Translate a raw dependency bitmap into the emittable react bits: each
    /// set bit mapped through its canonical wave bit, OR-ed together. A set
    /// bit without an entry means pruning dropped an id a consumer still
    /// references; that is an analyzer bug and must surface, since emitted
    /// code would otherwise miss an update.
    pub fn react_bits_for_dependency(&self, dep_id_bitmap: u64) -> Result<u64, CompilerError> {
        let mut react_bits = 0u64;
        for dep_id in bitmap_to_bits(dep_id_bitmap) {
            let Some(&wave_bit) = self.id_to_wave_bit.get(&dep_id) else {
                return Err(CompilerError::new(
                    ERR_MISSING_WAVE_BIT,
                    ErrorKind::InternalConsistency,
                    &format!("wave bit not found for id {}", dep_id),
                    &self.file,
                    SourceLocation::default(),
                ));
            };
            react_bits |= wave_bit;
        }
        Ok(react_bits)
    }

    pub fn wave_bits_map(&self) -> &HashMap<u64, u64> {
        &self.wave_bits_map
    }

    pub fn id_to_wave_bit(&self) -> &HashMap<u64, u64> {
        &self.id_to_wave_bit
    }
}
