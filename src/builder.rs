//! IR construction.
//!
//! One `IRBuilder` per top-level component tree. The builder owns the block
//! arena and the bit allocator, so id spaces never collide across components.
//! Class, component, and hook scopes share this single builder; only the
//! terminal operations (`set_view` vs `set_hook_return`) differ by kind.

use std::collections::HashMap;

use crate::extract::{extract_dependency, extract_hook_call};
use crate::ir::{
    BlockId, BlockKind, CompilerError, Dependency, DerivedSource, DerivedStmt, ErrorKind,
    ExprSource, HookReturnStmt, IRBlock, IRRoot, IRStmt, LifecyclePhase, LifecycleStmt,
    PropsSource, RestPropStmt, SinglePropStmt, SourceLocation, StateStmt, SubCompStmt,
    UseContextStmt, ViewReturnStmt, WatchStmt, WholePropStmt, ERR_HOOK_RETURN_SCOPE_KIND,
    ERR_ID_SPACE_EXHAUSTED, ERR_UNBALANCED_SUB_COMPONENT, ERR_VIEW_SCOPE_KIND,
};
use crate::pattern::{parse_binding_target, BindingTarget};
use crate::prune::prune_unused_state;
use crate::view::parse_view;
use crate::wave::{build_wave_bits_map, BitManager};

// ═══════════════════════════════════════════════════════════════════════════════
// BIT ALLOCATOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Issues power-of-two reactive ids, strictly sequential per builder.
///
/// Ids are single bits of a `u64`, so one component tree supports at most 64
/// reactive entities; the 65th allocation fails with `R-ERR-CAP-001` instead
/// of wrapping.
#[derive(Debug, Default)]
pub struct BitAllocator {
    index: u32,
}

impl BitAllocator {
    pub const MAX_REACTIVE_IDS: u32 = u64::BITS;

    pub fn next_id(&mut self, file: &str, loc: SourceLocation) -> Result<u64, CompilerError> {
        if self.index >= Self::MAX_REACTIVE_IDS {
            return Err(CompilerError::with_hints(
                ERR_ID_SPACE_EXHAUSTED,
                ErrorKind::Capacity,
                &format!(
                    "Component tree exceeds {} reactive declarations",
                    Self::MAX_REACTIVE_IDS
                ),
                file,
                loc,
                vec!["Split the component into smaller sub-components.".to_string()],
            ));
        }
        let id = 1u64 << self.index;
        self.index += 1;
        Ok(id)
    }

    /// True when `id` was issued by this allocator.
    fn issued(&self, id: u64) -> bool {
        id.is_power_of_two() && id.trailing_zeros() < self.index
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// IR BUILDER
// ═══════════════════════════════════════════════════════════════════════════════

pub struct IRBuilder {
    blocks: Vec<IRBlock>,
    root: BlockId,
    current: BlockId,
    allocator: BitAllocator,
    file: String,
}

impl IRBuilder {
    pub fn new(name: &str, kind: BlockKind, file: &str) -> Self {
        IRBuilder {
            blocks: vec![IRBlock::new(name, kind, None)],
            root: 0,
            current: 0,
            allocator: BitAllocator::default(),
            file: file.to_string(),
        }
    }

    fn current(&self) -> &IRBlock {
        &self.blocks[self.current]
    }

    fn current_mut(&mut self) -> &mut IRBlock {
        &mut self.blocks[self.current]
    }

    fn add_stmt(&mut self, stmt: IRStmt) {
        self.current_mut().body.push(stmt);
    }

    fn add_used_reactives(&mut self, used_id_bits: u64) {
        self.current_mut().used_id_bits |= used_id_bits;
    }

    /// Register a name in the current scope. An explicit id is only legal for
    /// destructured leaves sharing one freshly allocated bit; anything else
    /// is a builder bug, not an input error.
    fn declare_reactive(
        &mut self,
        name: &str,
        id: Option<u64>,
        loc: SourceLocation,
    ) -> Result<u64, CompilerError> {
        let reactive_id = match id {
            Some(id) => {
                debug_assert!(
                    self.allocator.issued(id),
                    "shared reactive id must come from this builder's allocator"
                );
                id
            }
            None => self.allocator.next_id(&self.file, loc)?,
        };
        self.current_mut()
            .reactive_map
            .insert(name.to_string(), reactive_id);
        Ok(reactive_id)
    }

    /// Declare every leaf of a target against one shared id.
    fn declare_target(
        &mut self,
        target: &BindingTarget,
        loc: SourceLocation,
    ) -> Result<(u64, Vec<String>), CompilerError> {
        let reactive_id = self.allocator.next_id(&self.file, loc)?;
        let names = target.leaf_names();
        for name in &names {
            self.declare_reactive(name, Some(reactive_id), loc)?;
        }
        Ok((reactive_id, names))
    }

    /// Reactive names visible from the current scope; nearest scope wins.
    pub fn global_reactive_map(&self) -> HashMap<String, u64> {
        let mut merged = self.current().reactive_map.clone();
        let mut next = self.current().parent;
        while let Some(block_id) = next {
            let block = &self.blocks[block_id];
            for (name, &id) in &block.reactive_map {
                merged.entry(name.clone()).or_insert(id);
            }
            next = block.parent;
        }
        merged
    }

    fn get_dependency(&self, expr: &ExprSource) -> Result<Option<Dependency>, CompilerError> {
        extract_dependency(&expr.code, &self.file, expr.loc, &self.global_reactive_map())
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Declarations
    // ───────────────────────────────────────────────────────────────────────────

    /// Passthrough statement with no reactive effect.
    pub fn add_raw(&mut self, code: &str) {
        self.add_stmt(IRStmt::Raw {
            code: code.to_string(),
        });
    }

    /// Declare a state variable. A hook-invocation initializer always becomes
    /// a derived statement (hook results are never fresh cells); any other
    /// initializer with a non-empty dependency becomes plain derived state.
    pub fn add_state(
        &mut self,
        pattern: &ExprSource,
        init: Option<ExprSource>,
    ) -> Result<(), CompilerError> {
        let target = parse_binding_target(&pattern.code, &self.file, pattern.loc)?;
        let (reactive_id, names) = self.declare_target(&target, pattern.loc)?;

        if let Some(value) = init {
            let dependency = self.get_dependency(&value)?;
            let hook_args = extract_hook_call(
                &value.code,
                &self.file,
                value.loc,
                &self.global_reactive_map(),
            )?;

            if let Some(hook_arg_dependencies) = hook_args {
                if let Some(dep) = &dependency {
                    self.add_used_reactives(dep.dep_id_bitmap);
                }
                self.add_stmt(IRStmt::Derived(DerivedStmt {
                    names,
                    lval: pattern.code.clone(),
                    reactive_id,
                    value,
                    source: DerivedSource::Hook,
                    dependency,
                    hook_arg_dependencies,
                }));
                return Ok(());
            }

            if let Some(dep) = dependency {
                self.add_used_reactives(dep.dep_id_bitmap);
                self.add_stmt(IRStmt::Derived(DerivedStmt {
                    names,
                    lval: pattern.code.clone(),
                    reactive_id,
                    value,
                    source: DerivedSource::State,
                    dependency: Some(dep),
                    hook_arg_dependencies: vec![],
                }));
                return Ok(());
            }

            self.add_stmt(IRStmt::State(StateStmt {
                names,
                lval: pattern.code.clone(),
                reactive_id,
                init: Some(value),
            }));
            return Ok(());
        }

        self.add_stmt(IRStmt::State(StateStmt {
            names,
            lval: pattern.code.clone(),
            reactive_id,
            init: None,
        }));
        Ok(())
    }

    /// Declare one named prop. Resolves aliasing (`{ a: b }` binds `b`),
    /// defaults (`{ a = fallback }`), and destructured values (every leaf
    /// shares the prop's id).
    pub fn add_single_prop(
        &mut self,
        key: &str,
        value_pattern: &ExprSource,
        source: PropsSource,
        ctx_name: Option<String>,
    ) -> Result<(), CompilerError> {
        let target = parse_binding_target(&value_pattern.code, &self.file, value_pattern.loc)?;
        let reactive_id = self.allocator.next_id(&self.file, value_pattern.loc)?;

        match target {
            BindingTarget::Identifier {
                name,
                default_value,
            } => {
                self.declare_reactive(&name, Some(reactive_id), value_pattern.loc)?;
                self.add_stmt(IRStmt::SingleProp(SinglePropStmt {
                    name: key.to_string(),
                    value: name,
                    reactive_id,
                    is_destructured: false,
                    default_value,
                    source,
                    ctx_name,
                }));
            }
            BindingTarget::Pattern { leaf_names } => {
                for name in &leaf_names {
                    self.declare_reactive(name, Some(reactive_id), value_pattern.loc)?;
                }
                self.add_stmt(IRStmt::SingleProp(SinglePropStmt {
                    name: key.to_string(),
                    value: value_pattern.code.clone(),
                    reactive_id,
                    is_destructured: true,
                    default_value: None,
                    source,
                    ctx_name,
                }));
            }
        }
        Ok(())
    }

    pub fn add_rest_prop(
        &mut self,
        name: &str,
        source: PropsSource,
        ctx_name: Option<String>,
    ) -> Result<(), CompilerError> {
        let reactive_id = self.declare_reactive(name, None, SourceLocation::default())?;
        self.add_stmt(IRStmt::RestProp(RestPropStmt {
            name: name.to_string(),
            reactive_id,
            source,
            ctx_name,
        }));
        Ok(())
    }

    pub fn add_whole_prop(
        &mut self,
        name: &str,
        source: PropsSource,
        ctx_name: Option<String>,
    ) -> Result<(), CompilerError> {
        let reactive_id = self.declare_reactive(name, None, SourceLocation::default())?;
        self.add_stmt(IRStmt::WholeProp(WholePropStmt {
            name: name.to_string(),
            value: name.to_string(),
            reactive_id,
            source,
            ctx_name,
        }));
        Ok(())
    }

    /// Record a side-effecting watch. When no explicit dependency is given it
    /// is extracted from the callback body.
    pub fn add_watch(
        &mut self,
        callback: ExprSource,
        dependency: Option<Dependency>,
    ) -> Result<(), CompilerError> {
        let dependency = match dependency {
            Some(dep) => Some(dep),
            None => self.get_dependency(&callback)?,
        };
        if let Some(dep) = &dependency {
            self.add_used_reactives(dep.dep_id_bitmap);
        }
        self.add_stmt(IRStmt::Watch(WatchStmt {
            callback,
            dependency,
        }));
        Ok(())
    }

    pub fn add_lifecycle(
        &mut self,
        callback: ExprSource,
        phase: LifecyclePhase,
        dependency: Option<Dependency>,
    ) -> Result<(), CompilerError> {
        let dependency = match dependency {
            Some(dep) => Some(dep),
            None => self.get_dependency(&callback)?,
        };
        if let Some(dep) = &dependency {
            self.add_used_reactives(dep.dep_id_bitmap);
        }
        self.add_stmt(IRStmt::Lifecycle(LifecycleStmt {
            callback,
            phase,
            dependency,
        }));
        Ok(())
    }

    /// Subscribe to a context object without reactive bindings; reactive
    /// context values go through `add_single_prop` with a context source.
    pub fn add_context(
        &mut self,
        pattern: &ExprSource,
        context: &str,
    ) -> Result<(), CompilerError> {
        let target = parse_binding_target(&pattern.code, &self.file, pattern.loc)?;
        self.add_stmt(IRStmt::UseContext(UseContextStmt {
            names: target.leaf_names(),
            lval: pattern.code.clone(),
            context: context.to_string(),
        }));
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Terminals
    // ───────────────────────────────────────────────────────────────────────────

    pub fn set_view(&mut self, view: &ExprSource) -> Result<(), CompilerError> {
        if !self.current().kind.has_view() {
            return Err(CompilerError::new(
                ERR_VIEW_SCOPE_KIND,
                ErrorKind::UserInput,
                &format!("'{}' is a hook scope and cannot return a view", self.current().name),
                &self.file,
                view.loc,
            ));
        }
        let (particle, used_id_bits) = parse_view(
            &view.code,
            &self.file,
            view.loc,
            &self.global_reactive_map(),
        )?;
        self.add_stmt(IRStmt::ViewReturn(ViewReturnStmt {
            particle,
            used_id_bits,
        }));
        self.add_used_reactives(used_id_bits);
        Ok(())
    }

    pub fn set_hook_return(&mut self, value: ExprSource) -> Result<(), CompilerError> {
        if self.current().kind != BlockKind::Hook {
            return Err(CompilerError::new(
                ERR_HOOK_RETURN_SCOPE_KIND,
                ErrorKind::UserInput,
                &format!(
                    "'{}' is not a hook scope and cannot return a hook value",
                    self.current().name
                ),
                &self.file,
                value.loc,
            ));
        }
        let dependency = self.get_dependency(&value)?;
        if let Some(dep) = &dependency {
            self.add_used_reactives(dep.dep_id_bitmap);
        }
        self.add_stmt(IRStmt::HookReturn(HookReturnStmt {
            value,
            dependency,
        }));
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Sub-components
    // ───────────────────────────────────────────────────────────────────────────

    pub fn start_sub_component(&mut self, name: &str) -> Result<(), CompilerError> {
        if !self.current().kind.has_view() {
            return Err(CompilerError::new(
                ERR_VIEW_SCOPE_KIND,
                ErrorKind::UserInput,
                &format!("hook scope '{}' cannot nest a component", self.current().name),
                &self.file,
                SourceLocation::default(),
            ));
        }
        let child = IRBlock::new(name, BlockKind::Component, Some(self.current));
        self.blocks.push(child);
        self.current = self.blocks.len() - 1;
        Ok(())
    }

    /// Pop the current sub-component: fold its used bits into the parent and
    /// append the SubComp statement referencing the finished child.
    pub fn end_sub_component(&mut self) -> Result<(), CompilerError> {
        let child = self.current;
        let Some(parent) = self.blocks[child].parent else {
            return Err(CompilerError::new(
                ERR_UNBALANCED_SUB_COMPONENT,
                ErrorKind::InternalConsistency,
                "end_sub_component without a matching start_sub_component",
                &self.file,
                SourceLocation::default(),
            ));
        };
        let child_used = self.blocks[child].used_id_bits;
        let child_name = self.blocks[child].name.clone();
        self.current = parent;
        self.add_used_reactives(child_used);
        self.add_stmt(IRStmt::SubComp(SubCompStmt {
            name: child_name,
            block: child,
        }));
        Ok(())
    }

    pub fn has_sub_component(&self, name: &str) -> bool {
        self.current().body.iter().any(|stmt| {
            matches!(stmt, IRStmt::SubComp(sub) if sub.name == name)
        })
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Finalization
    // ───────────────────────────────────────────────────────────────────────────

    /// Prune dead state and compute the wave maps for the whole subtree.
    /// Consumes the builder; a tree is finalized exactly once.
    pub fn build(mut self) -> Result<(IRRoot, BitManager), CompilerError> {
        if self.current != self.root {
            return Err(CompilerError::new(
                ERR_UNBALANCED_SUB_COMPONENT,
                ErrorKind::InternalConsistency,
                "build() called with an open sub-component scope",
                &self.file,
                SourceLocation::default(),
            ));
        }
        let mut ir = IRRoot {
            blocks: std::mem::take(&mut self.blocks),
            root: self.root,
        };
        let id_to_wave_bit = prune_unused_state(&mut ir);
        let wave_bits_map = build_wave_bits_map(&ir, &id_to_wave_bit);
        let manager = BitManager::new(wave_bits_map, id_to_wave_bit, &self.file);
        Ok((ir, manager))
    }
}
