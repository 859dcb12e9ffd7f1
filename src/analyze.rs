//! Analysis entry points.
//!
//! The front-end parser hands over a stream of declaration requests per
//! component; this module drives the builder through them, finalizes the
//! tree, and packages the annotated IR, the two wave maps, and the generated
//! runtime code. Independent components share no state, so the batch entry
//! fans out with rayon. A failing component is reported as a diagnostic and
//! never aborts its siblings.

#[cfg(feature = "napi")]
use napi_derive::napi;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::builder::IRBuilder;
use crate::codegen::generate_runtime_code;
use crate::extract::extract_dependency;
use crate::ir::{
    BlockKind, CompilerError, Dependency, ErrorKind, ExprSource, IRRoot, LifecyclePhase,
    PropsSource, SourceLocation, ERR_INVALID_INPUT,
};

// ═══════════════════════════════════════════════════════════════════════════════
// DECLARATION REQUESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Declaration {
    Raw {
        code: String,
    },
    State {
        pattern: ExprSource,
        init: Option<ExprSource>,
    },
    SingleProp {
        key: String,
        value: ExprSource,
        #[serde(default)]
        source: PropsSource,
        #[serde(default)]
        ctx_name: Option<String>,
    },
    RestProp {
        name: String,
        #[serde(default)]
        source: PropsSource,
        #[serde(default)]
        ctx_name: Option<String>,
    },
    WholeProp {
        name: String,
        #[serde(default)]
        source: PropsSource,
        #[serde(default)]
        ctx_name: Option<String>,
    },
    Watch {
        callback: ExprSource,
        /// Explicit dependency expression (`() => [count]`); extracted from
        /// the callback body when omitted.
        #[serde(default)]
        deps: Option<ExprSource>,
    },
    Lifecycle {
        callback: ExprSource,
        phase: LifecyclePhase,
    },
    UseContext {
        pattern: ExprSource,
        context: String,
    },
    SubComponentStart {
        name: String,
    },
    SubComponentEnd,
    View {
        expr: ExprSource,
    },
    HookReturn {
        expr: ExprSource,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentInput {
    pub name: String,
    #[serde(default)]
    pub kind: BlockKind,
    #[serde(default)]
    pub file: String,
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResult {
    pub ir: IRRoot,
    pub wave_bits_map: HashMap<u64, u64>,
    pub id_to_wave_bit: HashMap<u64, u64>,
    pub code: String,
}

/// Batch entry output: exactly one of `result` / `error` per component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedComponent {
    pub name: String,
    pub result: Option<AnalyzeResult>,
    pub error: Option<CompilerError>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ANALYSIS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn analyze_component(input: &ComponentInput) -> Result<AnalyzeResult, CompilerError> {
    let file = if input.file.is_empty() {
        format!("{}.tsx", input.name)
    } else {
        input.file.clone()
    };
    let mut builder = IRBuilder::new(&input.name, input.kind, &file);

    for declaration in &input.declarations {
        apply_declaration(&mut builder, declaration, &file)?;
    }

    let (ir, manager) = builder.build()?;
    let code = generate_runtime_code(&ir, &manager)?;
    Ok(AnalyzeResult {
        wave_bits_map: manager.wave_bits_map().clone(),
        id_to_wave_bit: manager.id_to_wave_bit().clone(),
        ir,
        code,
    })
}

fn apply_declaration(
    builder: &mut IRBuilder,
    declaration: &Declaration,
    file: &str,
) -> Result<(), CompilerError> {
    match declaration {
        Declaration::Raw { code } => {
            builder.add_raw(code);
            Ok(())
        }
        Declaration::State { pattern, init } => builder.add_state(pattern, init.clone()),
        Declaration::SingleProp {
            key,
            value,
            source,
            ctx_name,
        } => builder.add_single_prop(key, value, *source, ctx_name.clone()),
        Declaration::RestProp {
            name,
            source,
            ctx_name,
        } => builder.add_rest_prop(name, *source, ctx_name.clone()),
        Declaration::WholeProp {
            name,
            source,
            ctx_name,
        } => builder.add_whole_prop(name, *source, ctx_name.clone()),
        Declaration::Watch { callback, deps } => {
            let explicit = match deps {
                Some(deps_expr) => Some(explicit_dependency(builder, deps_expr, file)?),
                None => None,
            };
            builder.add_watch(callback.clone(), explicit)
        }
        Declaration::Lifecycle { callback, phase } => {
            builder.add_lifecycle(callback.clone(), *phase, None)
        }
        Declaration::UseContext { pattern, context } => builder.add_context(pattern, context),
        Declaration::SubComponentStart { name } => builder.start_sub_component(name),
        Declaration::SubComponentEnd => builder.end_sub_component(),
        Declaration::View { expr } => builder.set_view(expr),
        Declaration::HookReturn { expr } => builder.set_hook_return(expr.clone()),
    }
}

/// An explicitly supplied dependency expression always wins over body
/// extraction, even when it names nothing reactive.
fn explicit_dependency(
    builder: &IRBuilder,
    deps_expr: &ExprSource,
    file: &str,
) -> Result<Dependency, CompilerError> {
    let dependency = extract_dependency(
        &deps_expr.code,
        file,
        deps_expr.loc,
        &builder.global_reactive_map(),
    )?;
    Ok(dependency.unwrap_or_default())
}

/// Analyze a batch of independent components. Each gets its own builder and
/// id space; failures are collected per component.
pub fn analyze_components(inputs: &[ComponentInput]) -> Vec<AnalyzedComponent> {
    inputs
        .par_iter()
        .map(|input| match analyze_component(input) {
            Ok(result) => AnalyzedComponent {
                name: input.name.clone(),
                result: Some(result),
                error: None,
            },
            Err(error) => AnalyzedComponent {
                name: input.name.clone(),
                result: None,
                error: Some(error),
            },
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NativeOutput {
    result: Option<AnalyzeResult>,
    error: Option<CompilerError>,
}

#[cfg(feature = "napi")]
fn input_error(message: &str) -> CompilerError {
    CompilerError::new(
        ERR_INVALID_INPUT,
        ErrorKind::UserInput,
        message,
        "<input>",
        SourceLocation::default(),
    )
}

#[cfg(feature = "napi")]
fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|err| {
        format!(
            "{{\"result\":null,\"error\":{{\"code\":\"{}\",\"message\":\"serialization failed: {}\"}}}}",
            ERR_INVALID_INPUT, err
        )
    })
}

#[cfg(feature = "napi")]
#[napi]
pub fn analyze_component_native(input_json: String) -> String {
    let output = match serde_json::from_str::<ComponentInput>(&input_json) {
        Ok(input) => match analyze_component(&input) {
            Ok(result) => NativeOutput {
                result: Some(result),
                error: None,
            },
            Err(error) => NativeOutput {
                result: None,
                error: Some(error),
            },
        },
        Err(err) => NativeOutput {
            result: None,
            error: Some(input_error(&format!("Failed to parse component input: {}", err))),
        },
    };
    to_json(&output)
}

#[cfg(feature = "napi")]
#[napi]
pub fn analyze_components_native(inputs_json: String) -> String {
    match serde_json::from_str::<Vec<ComponentInput>>(&inputs_json) {
        Ok(inputs) => to_json(&analyze_components(&inputs)),
        Err(err) => to_json(&vec![AnalyzedComponent {
            name: String::new(),
            result: None,
            error: Some(input_error(&format!("Failed to parse batch input: {}", err))),
        }]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(pattern: &str, init: &str) -> Declaration {
        Declaration::State {
            pattern: ExprSource::new(pattern),
            init: Some(ExprSource::new(init)),
        }
    }

    #[test]
    fn test_analyze_counter_component() {
        let input = ComponentInput {
            name: "Counter".to_string(),
            kind: BlockKind::Component,
            file: String::new(),
            declarations: vec![
                state("count", "0"),
                state("double", "count * 2"),
                Declaration::Watch {
                    callback: ExprSource::new("() => console.log(double)"),
                    deps: None,
                },
                Declaration::View {
                    expr: ExprSource::new("<div>{double}</div>"),
                },
            ],
        };

        let result = analyze_component(&input).unwrap();
        assert_eq!(result.wave_bits_map.get(&0b1), Some(&0b10));
        assert_eq!(result.wave_bits_map.get(&0b10), Some(&0b10));
        assert!(result.code.contains("function Counter(self)"));
    }

    #[test]
    fn test_batch_isolates_failures() {
        let good = ComponentInput {
            name: "Good".to_string(),
            kind: BlockKind::Component,
            file: String::new(),
            declarations: vec![state("x", "1")],
        };
        let bad = ComponentInput {
            name: "Bad".to_string(),
            kind: BlockKind::Hook,
            file: String::new(),
            declarations: vec![Declaration::View {
                expr: ExprSource::new("<div />"),
            }],
        };

        let results = analyze_components(&[good, bad]);
        assert_eq!(results.len(), 2);
        assert!(results[0].result.is_some());
        let error = results[1].error.as_ref().unwrap();
        assert_eq!(error.code, crate::ir::ERR_VIEW_SCOPE_KIND);
    }

    #[test]
    fn test_declaration_stream_round_trips_from_json() {
        let json = r#"{
            "name": "Badge",
            "declarations": [
                { "type": "singleProp", "key": "label", "value": { "code": "label" } },
                { "type": "view", "expr": { "code": "<span>{label}</span>" } }
            ]
        }"#;
        let input: ComponentInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.kind, BlockKind::Component);

        let result = analyze_component(&input).unwrap();
        assert_eq!(result.id_to_wave_bit.get(&0b1), Some(&0b1));
    }

    #[test]
    fn test_explicit_watch_deps_override_body_extraction() {
        let input = ComponentInput {
            name: "App".to_string(),
            kind: BlockKind::Component,
            file: String::new(),
            declarations: vec![
                state("a", "1"),
                state("b", "2"),
                Declaration::Watch {
                    callback: ExprSource::new("() => console.log(a, b)"),
                    deps: Some(ExprSource::new("() => [a]")),
                },
            ],
        };

        let result = analyze_component(&input).unwrap();
        // Only `a` is terminally observed.
        assert!(result.id_to_wave_bit.contains_key(&0b1));
        assert!(!result.id_to_wave_bit.contains_key(&0b10));
    }
}
