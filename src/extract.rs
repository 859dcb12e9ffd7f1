//! Dependency extraction.
//!
//! Parses an opaque expression snippet and reports which visible reactive
//! names it reads, as a bitmap plus the names in source order. Names bound
//! inside the expression itself (params, local declarations), framework
//! function names, and platform globals never count; any other name absent
//! from the visible map is simply non-reactive.

use oxc_allocator::Allocator;
use oxc_ast::ast::Expression;
use oxc_ast_visit::Visit;
use oxc_parser::Parser;
use oxc_span::SourceType;
use std::collections::{HashMap, HashSet};

use crate::ir::{
    CompilerError, Dependency, ErrorKind, SourceLocation, ERR_EXPRESSION_SYNTAX,
};

lazy_static::lazy_static! {
    /// Ripple runtime helpers. References to these are calls into the
    /// framework, never reactive reads.
    pub static ref REACTIVITY_FUNC_NAMES: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert("watch");
        s.insert("useContext");
        s.insert("willMount");
        s.insert("didMount");
        s.insert("willUnmount");
        s.insert("didUnmount");
        s
    };

    /// Standard JS globals that shadow nothing reactive.
    pub static ref JS_GLOBALS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert("Math");
        s.insert("console");
        s.insert("JSON");
        s.insert("Date");
        s.insert("String");
        s.insert("Number");
        s.insert("Boolean");
        s.insert("Array");
        s.insert("Object");
        s.insert("Promise");
        s.insert("Map");
        s.insert("Set");
        s.insert("Error");
        s.insert("undefined");
        s.insert("NaN");
        s.insert("Infinity");
        s.insert("parseInt");
        s.insert("parseFloat");
        s.insert("window");
        s.insert("document");
        s
    };
}

fn source_type() -> SourceType {
    SourceType::default()
        .with_typescript(true)
        .with_module(true)
        .with_jsx(true)
}

// ═══════════════════════════════════════════════════════════════════════════════
// REFERENCE COLLECTOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Collects every identifier reference and every binding introduced anywhere
/// in the expression. A reference that matches a collected binding was bound
/// locally (a callback param, a local declaration) and is not a free read.
#[derive(Default)]
pub(crate) struct ReferenceCollector {
    references: Vec<String>,
    bindings: HashSet<String>,
}

impl<'a> Visit<'a> for ReferenceCollector {
    fn visit_identifier_reference(&mut self, ident: &oxc_ast::ast::IdentifierReference) {
        self.references.push(ident.name.to_string());
    }

    fn visit_binding_identifier(&mut self, ident: &oxc_ast::ast::BindingIdentifier) {
        self.bindings.insert(ident.name.to_string());
    }
}

impl ReferenceCollector {
    /// Fold the collected references into a `Dependency` against the visible
    /// reactive map. `None` when nothing reactive was read.
    fn into_dependency(self, visible: &HashMap<String, u64>) -> Option<Dependency> {
        let mut bitmap = 0u64;
        let mut names: Vec<String> = Vec::new();

        for name in self.references {
            if self.bindings.contains(&name)
                || REACTIVITY_FUNC_NAMES.contains(name.as_str())
                || JS_GLOBALS.contains(name.as_str())
            {
                continue;
            }
            if let Some(&bit) = visible.get(&name) {
                bitmap |= bit;
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }

        if bitmap == 0 {
            return None;
        }
        Some(Dependency {
            dep_id_bitmap: bitmap,
            source_names: names,
        })
    }
}

/// Dependency of an already-parsed sub-expression, for callers that walk a
/// larger AST themselves (the view parser, hook arguments).
pub(crate) fn dependency_of_expression(
    expr: &Expression,
    visible: &HashMap<String, u64>,
) -> Option<Dependency> {
    let mut collector = ReferenceCollector::default();
    collector.visit_expression(expr);
    collector.into_dependency(visible)
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXTRACTION ENTRY POINTS
// ═══════════════════════════════════════════════════════════════════════════════

fn parse_failure(code: &str, file: &str, loc: SourceLocation) -> CompilerError {
    CompilerError::new(
        ERR_EXPRESSION_SYNTAX,
        ErrorKind::UserInput,
        &format!("Invalid expression syntax: {}", code),
        file,
        loc,
    )
}

/// Extract the reactive dependency of an expression snippet, or `None` when
/// it reads nothing reactive.
pub fn extract_dependency(
    code: &str,
    file: &str,
    loc: SourceLocation,
    visible: &HashMap<String, u64>,
) -> Result<Option<Dependency>, CompilerError> {
    let allocator = Allocator::default();
    let expr = Parser::new(&allocator, code, source_type())
        .parse_expression()
        .map_err(|_| parse_failure(code, file, loc))?;

    Ok(dependency_of_expression(&expr, visible))
}

/// Per-argument dependencies of a hook invocation, or `None` when the
/// expression is not one. A hook invocation is a direct call to a
/// `useXxx`-named function; hook results are always derived values, never
/// fresh state cells.
pub fn extract_hook_call(
    code: &str,
    file: &str,
    loc: SourceLocation,
    visible: &HashMap<String, u64>,
) -> Result<Option<Vec<Option<Dependency>>>, CompilerError> {
    let allocator = Allocator::default();
    let expr = Parser::new(&allocator, code, source_type())
        .parse_expression()
        .map_err(|_| parse_failure(code, file, loc))?;

    let Expression::CallExpression(call) = &expr else {
        return Ok(None);
    };
    let Expression::Identifier(callee) = &call.callee else {
        return Ok(None);
    };
    if !is_hook_name(&callee.name) {
        return Ok(None);
    }

    let mut arg_dependencies = Vec::with_capacity(call.arguments.len());
    for arg in &call.arguments {
        let dependency = arg
            .as_expression()
            .and_then(|arg_expr| dependency_of_expression(arg_expr, visible));
        arg_dependencies.push(dependency);
    }
    Ok(Some(arg_dependencies))
}

fn is_hook_name(name: &str) -> bool {
    name.strip_prefix("use")
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visible(entries: &[(&str, u64)]) -> HashMap<String, u64> {
        entries
            .iter()
            .map(|(name, bit)| (name.to_string(), *bit))
            .collect()
    }

    #[test]
    fn test_plain_reference_builds_bitmap() {
        let map = visible(&[("count", 0b1), ("step", 0b10)]);
        let dep = extract_dependency("count + step * 2", "t.tsx", SourceLocation::default(), &map)
            .unwrap()
            .unwrap();
        assert_eq!(dep.dep_id_bitmap, 0b11);
        assert_eq!(dep.source_names, vec!["count", "step"]);
    }

    #[test]
    fn test_unknown_names_are_non_reactive() {
        let map = visible(&[("count", 0b1)]);
        let dep =
            extract_dependency("other + 1", "t.tsx", SourceLocation::default(), &map).unwrap();
        assert!(dep.is_none());
    }

    #[test]
    fn test_locally_bound_names_are_excluded() {
        let map = visible(&[("item", 0b1), ("items", 0b10)]);
        let dep = extract_dependency(
            "items.map(item => item.id)",
            "t.tsx",
            SourceLocation::default(),
            &map,
        )
        .unwrap()
        .unwrap();
        // `item` is the callback's own param, not the outer reactive.
        assert_eq!(dep.dep_id_bitmap, 0b10);
        assert_eq!(dep.source_names, vec!["items"]);
    }

    #[test]
    fn test_globals_and_framework_names_are_excluded() {
        let map = visible(&[("count", 0b1)]);
        let dep = extract_dependency(
            "() => { console.log(Math.round(count)) }",
            "t.tsx",
            SourceLocation::default(),
            &map,
        )
        .unwrap()
        .unwrap();
        assert_eq!(dep.dep_id_bitmap, 0b1);
        assert_eq!(dep.source_names, vec!["count"]);
    }

    #[test]
    fn test_duplicate_references_dedupe_names() {
        let map = visible(&[("count", 0b1)]);
        let dep = extract_dependency(
            "count > 0 ? count : -count",
            "t.tsx",
            SourceLocation::default(),
            &map,
        )
        .unwrap()
        .unwrap();
        assert_eq!(dep.source_names, vec!["count"]);
    }

    #[test]
    fn test_hook_call_detection_and_argument_dependencies() {
        let map = visible(&[("query", 0b1), ("page", 0b10)]);
        let args = extract_hook_call(
            "useSearch(query, page, 20)",
            "t.tsx",
            SourceLocation::default(),
            &map,
        )
        .unwrap()
        .unwrap();
        assert_eq!(args.len(), 3);
        assert_eq!(args[0].as_ref().unwrap().dep_id_bitmap, 0b1);
        assert_eq!(args[1].as_ref().unwrap().dep_id_bitmap, 0b10);
        assert!(args[2].is_none());
    }

    #[test]
    fn test_non_hook_calls_are_not_hook_invocations() {
        let map = visible(&[]);
        assert!(extract_hook_call("used()", "t.tsx", SourceLocation::default(), &map)
            .unwrap()
            .is_none());
        assert!(extract_hook_call("compute(1)", "t.tsx", SourceLocation::default(), &map)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_syntax_error_is_reported_with_location() {
        let map = visible(&[]);
        let err = extract_dependency(
            "count +",
            "App.tsx",
            SourceLocation { line: 9, column: 4 },
            &map,
        )
        .unwrap_err();
        assert_eq!(err.code, ERR_EXPRESSION_SYNTAX);
        assert_eq!(err.line, 9);
    }
}
