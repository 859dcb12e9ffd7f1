//! Dead state pruning.
//!
//! Runs once over the whole block arena before wave propagation. A reactive
//! declaration survives only while some surviving statement consumes its bit;
//! removing a dead derived statement can strand its own sources, so the sweep
//! repeats until a pass removes nothing.

use std::collections::HashMap;

use crate::ir::{bitmap_to_bits, IRRoot, IRStmt};

/// Prune unobserved State/Derived/Prop statements in place and return the
/// id-to-wave-bit map: every surviving id that a terminal consumer (watch,
/// view, lifecycle, hook return, hook-call argument) reads directly keeps its
/// own bit as the canonical wave bit. Ids consumed only through plain derived
/// chains survive without an entry; propagation reaches them through the
/// chain instead.
pub fn prune_unused_state(ir: &mut IRRoot) -> HashMap<u64, u64> {
    loop {
        let used = consumed_bits(ir);
        let mut removed = false;
        for block in &mut ir.blocks {
            block.body.retain(|stmt| match stmt.reactive_id() {
                Some(id) => {
                    let keep = id & used != 0;
                    removed |= !keep;
                    keep
                }
                None => true,
            });
        }
        if !removed {
            break;
        }
    }

    refresh_used_bits(ir);

    let mut id_to_wave_bit = HashMap::new();
    for block in &ir.blocks {
        for stmt in &block.body {
            for bit in bitmap_to_bits(terminal_bits(stmt)) {
                id_to_wave_bit.insert(bit, bit);
            }
        }
    }
    id_to_wave_bit
}

/// Union of every reactive id some surviving statement consumes, across the
/// whole tree. Prop declarations consume nothing; they only produce.
fn consumed_bits(ir: &IRRoot) -> u64 {
    let mut used = 0u64;
    for block in &ir.blocks {
        for stmt in &block.body {
            used |= stmt_consumed_bits(stmt);
        }
    }
    used
}

fn stmt_consumed_bits(stmt: &IRStmt) -> u64 {
    match stmt {
        IRStmt::Derived(derived) => {
            let mut bits = derived
                .dependency
                .as_ref()
                .map_or(0, |dep| dep.dep_id_bitmap);
            for arg in derived.hook_arg_dependencies.iter().flatten() {
                bits |= arg.dep_id_bitmap;
            }
            bits
        }
        IRStmt::Watch(watch) => watch.dependency.as_ref().map_or(0, |dep| dep.dep_id_bitmap),
        IRStmt::Lifecycle(lifecycle) => lifecycle
            .dependency
            .as_ref()
            .map_or(0, |dep| dep.dep_id_bitmap),
        IRStmt::ViewReturn(view) => view.used_id_bits,
        IRStmt::HookReturn(ret) => ret.dependency.as_ref().map_or(0, |dep| dep.dep_id_bitmap),
        _ => 0,
    }
}

/// Bits a statement observes terminally: a change to one of these ids must
/// re-run the statement at runtime. Plain derived dependencies are derivation
/// edges, not terminal observations.
fn terminal_bits(stmt: &IRStmt) -> u64 {
    match stmt {
        IRStmt::Watch(watch) => watch.dependency.as_ref().map_or(0, |dep| dep.dep_id_bitmap),
        IRStmt::Lifecycle(lifecycle) => lifecycle
            .dependency
            .as_ref()
            .map_or(0, |dep| dep.dep_id_bitmap),
        IRStmt::ViewReturn(view) => view.used_id_bits,
        IRStmt::HookReturn(ret) => ret.dependency.as_ref().map_or(0, |dep| dep.dep_id_bitmap),
        IRStmt::Derived(derived) => {
            let mut bits = 0;
            for arg in derived.hook_arg_dependencies.iter().flatten() {
                bits |= arg.dep_id_bitmap;
            }
            bits
        }
        _ => 0,
    }
}

/// Recompute each block's `used_id_bits` from its surviving statements, then
/// fold child bits into ancestors. Children are always created after their
/// parents, so one reverse pass folds bottom-up.
fn refresh_used_bits(ir: &mut IRRoot) {
    for block in &mut ir.blocks {
        block.used_id_bits = block.body.iter().map(stmt_consumed_bits).fold(0, |a, b| a | b);
    }
    for child in (0..ir.blocks.len()).rev() {
        if let Some(parent) = ir.blocks[child].parent {
            let bits = ir.blocks[child].used_id_bits;
            ir.blocks[parent].used_id_bits |= bits;
        }
    }
}
