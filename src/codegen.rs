//! Runtime code generation.
//!
//! Walks the pruned, wave-annotated block tree and emits the runtime
//! registration calls, embedding literal bitmask constants from the bit
//! manager: declaration sites carry their wave bits (what must re-run when
//! the value changes), consumers carry react bits (which update signals they
//! listen to).

use crate::ir::{
    AttrValue, BlockId, CompilerError, Dependency, IRRoot, IRStmt, ParticleAttr, ViewParticle,
};
use crate::wave::BitManager;

/// Emit one JS module string for a finished component tree.
pub fn generate_runtime_code(ir: &IRRoot, manager: &BitManager) -> Result<String, CompilerError> {
    let emitter = Emitter { ir, manager };
    let root = ir.block(ir.root);
    let mut out = String::new();
    out.push_str(&format!("function {}(self) {{\n", root.name));
    emitter.emit_body(ir.root, 1, &mut out)?;
    out.push_str("}\n");
    Ok(out)
}

struct Emitter<'a> {
    ir: &'a IRRoot,
    manager: &'a BitManager,
}

impl<'a> Emitter<'a> {
    fn emit_body(
        &self,
        block_id: BlockId,
        depth: usize,
        out: &mut String,
    ) -> Result<(), CompilerError> {
        let block = self.ir.block(block_id);
        let pad = "  ".repeat(depth);

        for stmt in &block.body {
            match stmt {
                IRStmt::Raw { code } => {
                    out.push_str(&format!("{}{}\n", pad, code));
                }
                IRStmt::State(state) => {
                    let init = state
                        .init
                        .as_ref()
                        .map_or("null".to_string(), |e| format!("() => ({})", e.code));
                    let wave = self.wave_bits_for(block_id, &state.names, state.reactive_id);
                    out.push_str(&format!(
                        "{}self.state({:?}, {}, {});\n",
                        pad, state.lval, init, mask(wave)
                    ));
                }
                IRStmt::Derived(derived) => {
                    let wave = self.wave_bits_for(block_id, &derived.names, derived.reactive_id);
                    if derived.hook_arg_dependencies.is_empty() {
                        out.push_str(&format!(
                            "{}self.derived({:?}, () => ({}), {}, {});\n",
                            pad,
                            derived.lval,
                            derived.value.code,
                            deps_arrow(&derived.dependency),
                            mask(wave)
                        ));
                    } else {
                        // Hook results update when any call argument changes.
                        let mut arg_bits = 0u64;
                        for dep in derived.hook_arg_dependencies.iter().flatten() {
                            arg_bits |= dep.dep_id_bitmap;
                        }
                        let react = self.manager.react_bits_for_dependency(arg_bits)?;
                        out.push_str(&format!(
                            "{}self.hook({:?}, () => {}, {}, {});\n",
                            pad,
                            derived.lval,
                            derived.value.code,
                            mask(react),
                            mask(wave)
                        ));
                    }
                }
                IRStmt::SingleProp(prop) => {
                    let wave = self.manager.wave_bits_for_id(prop.reactive_id);
                    let fallback = prop
                        .default_value
                        .as_ref()
                        .map_or("null".to_string(), |e| format!("() => ({})", e.code));
                    out.push_str(&format!(
                        "{}self.prop({:?}, {:?}, {}, {});\n",
                        pad, prop.name, prop.value, fallback, mask(wave)
                    ));
                }
                IRStmt::RestProp(prop) => {
                    let wave = self.manager.wave_bits_for_id(prop.reactive_id);
                    out.push_str(&format!(
                        "{}self.restProps({:?}, {});\n",
                        pad, prop.name, mask(wave)
                    ));
                }
                IRStmt::WholeProp(prop) => {
                    let wave = self.manager.wave_bits_for_id(prop.reactive_id);
                    out.push_str(&format!(
                        "{}self.props({:?}, {});\n",
                        pad, prop.name, mask(wave)
                    ));
                }
                IRStmt::Watch(watch) => {
                    let react = self.react_bits(&watch.dependency)?;
                    out.push_str(&format!(
                        "{}self.watch({}, {}, {});\n",
                        pad,
                        watch.callback.code,
                        deps_arrow(&watch.dependency),
                        mask(react)
                    ));
                }
                IRStmt::Lifecycle(lifecycle) => {
                    out.push_str(&format!(
                        "{}self.{}({});\n",
                        pad,
                        lifecycle.phase.method(),
                        lifecycle.callback.code
                    ));
                }
                IRStmt::UseContext(ctx) => {
                    out.push_str(&format!(
                        "{}const {} = self.useContext({});\n",
                        pad, ctx.lval, ctx.context
                    ));
                }
                IRStmt::SubComp(sub) => {
                    out.push_str(&format!(
                        "{}const {} = self.component({:?}, (self) => {{\n",
                        pad, sub.name, sub.name
                    ));
                    self.emit_body(sub.block, depth + 1, out)?;
                    out.push_str(&format!("{}}});\n", pad));
                }
                IRStmt::ViewReturn(view) => {
                    let rendered = self.emit_particle(&view.particle)?;
                    out.push_str(&format!("{}return self.render({});\n", pad, rendered));
                }
                IRStmt::HookReturn(ret) => {
                    let react = self.react_bits(&ret.dependency)?;
                    out.push_str(&format!(
                        "{}return self.hookValue(() => ({}), {}, {});\n",
                        pad,
                        ret.value.code,
                        deps_arrow(&ret.dependency),
                        mask(react)
                    ));
                }
            }
        }
        Ok(())
    }

    fn emit_particle(&self, particle: &ViewParticle) -> Result<String, CompilerError> {
        Ok(match particle {
            ViewParticle::Text { value } => format!("{:?}", value),
            ViewParticle::Expression {
                expr,
                dep_id_bitmap,
            } => {
                let react = self.manager.react_bits_for_dependency(*dep_id_bitmap)?;
                format!("self.bind(() => ({}), {})", expr.code, mask(react))
            }
            ViewParticle::Element {
                tag,
                attributes,
                children,
            } => {
                let props = self.emit_attrs(attributes)?;
                let kids = self.emit_children(children)?;
                format!("h({:?}, {}, {})", tag, props, kids)
            }
            ViewParticle::Component {
                name,
                attributes,
                children,
            } => {
                let props = self.emit_attrs(attributes)?;
                let kids = self.emit_children(children)?;
                format!("self.child({}, {}, {})", name, props, kids)
            }
            ViewParticle::Fragment { children } => {
                format!("self.fragment({})", self.emit_children(children)?)
            }
        })
    }

    fn emit_attrs(&self, attrs: &[ParticleAttr]) -> Result<String, CompilerError> {
        if attrs.is_empty() {
            return Ok("null".to_string());
        }
        let mut parts = Vec::with_capacity(attrs.len());
        for attr in attrs {
            let value = match &attr.value {
                AttrValue::Static(value) => format!("{:?}", value),
                AttrValue::Dynamic {
                    expr,
                    dep_id_bitmap,
                } => {
                    let react = self.manager.react_bits_for_dependency(*dep_id_bitmap)?;
                    format!("self.bind(() => ({}), {})", expr.code, mask(react))
                }
            };
            if attr.name == "..." {
                parts.push(format!("...{}", value));
            } else {
                parts.push(format!("{:?}: {}", attr.name, value));
            }
        }
        Ok(format!("{{ {} }}", parts.join(", ")))
    }

    fn emit_children(&self, children: &[ViewParticle]) -> Result<String, CompilerError> {
        if children.is_empty() {
            return Ok("null".to_string());
        }
        let mut parts = Vec::with_capacity(children.len());
        for child in children {
            parts.push(self.emit_particle(child)?);
        }
        Ok(format!("[{}]", parts.join(", ")))
    }

    fn react_bits(&self, dependency: &Option<Dependency>) -> Result<u64, CompilerError> {
        self.manager
            .react_bits_for_dependency(dependency.as_ref().map_or(0, |d| d.dep_id_bitmap))
    }

    /// Declaration-site wave bits, resolved by name so lexical shadowing in
    /// nested components keeps working; falls back to the id for destructured
    /// declarations whose lval is not a single name.
    fn wave_bits_for(&self, block_id: BlockId, names: &[String], reactive_id: u64) -> u64 {
        match names.first() {
            Some(name) if names.len() == 1 => {
                self.manager.wave_bits_for_name(self.ir, block_id, name)
            }
            _ => self.manager.wave_bits_for_id(reactive_id),
        }
    }
}

fn mask(bits: u64) -> String {
    format!("0b{:b}", bits)
}

/// `() => [a, b]` for a recorded dependency, `null` when there is none.
fn deps_arrow(dependency: &Option<Dependency>) -> String {
    match dependency {
        Some(dep) if !dep.source_names.is_empty() => {
            format!("() => [{}]", dep.source_names.join(", "))
        }
        _ => "null".to_string(),
    }
}
