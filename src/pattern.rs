//! Assignment-target decomposition.
//!
//! Declaration targets arrive as opaque source snippets (`count`, `{ x, y }`,
//! `[a, { b: c }]`, `value = fallback`). This module parses them with oxc and
//! enumerates the bound leaf identifiers, so the builder can declare each leaf
//! against one shared reactive id.

use oxc_allocator::Allocator;
use oxc_ast::ast::{BindingPattern, Expression};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};

use crate::ir::{
    CompilerError, ErrorKind, ExprSource, SourceLocation, ERR_INVALID_PROP_TARGET,
};

/// A parsed declaration target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingTarget {
    /// A plain identifier, optionally with a default (`value = fallback`).
    Identifier {
        name: String,
        default_value: Option<ExprSource>,
    },
    /// An object or array pattern; `leaf_names` are the identifiers the
    /// pattern binds, in source order.
    Pattern { leaf_names: Vec<String> },
}

impl BindingTarget {
    pub fn leaf_names(&self) -> Vec<String> {
        match self {
            BindingTarget::Identifier { name, .. } => vec![name.clone()],
            BindingTarget::Pattern { leaf_names } => leaf_names.clone(),
        }
    }

    pub fn is_destructured(&self) -> bool {
        matches!(self, BindingTarget::Pattern { .. })
    }
}

/// Parse a declaration-target snippet. Fails with `R-ERR-PROP-001` when the
/// snippet is not a valid assignable target (e.g. a call expression or member
/// access).
pub fn parse_binding_target(
    code: &str,
    file: &str,
    loc: SourceLocation,
) -> Result<BindingTarget, CompilerError> {
    let allocator = Allocator::default();
    let source_type = SourceType::default()
        .with_typescript(true)
        .with_module(true)
        .with_jsx(true);

    // A formal parameter accepts exactly the pattern grammar we accept:
    // identifiers, object/array patterns, and defaults.
    let wrapped = format!("({}) => 0", code);
    let ret = Parser::new(&allocator, &wrapped, source_type).parse_expression();

    let invalid = || {
        CompilerError::new(
            ERR_INVALID_PROP_TARGET,
            ErrorKind::UserInput,
            &format!("Invalid assignable target: {}", code),
            file,
            loc,
        )
    };

    let expr = ret.map_err(|_| invalid())?;
    let Expression::ArrowFunctionExpression(arrow) = expr else {
        return Err(invalid());
    };
    let Some(param) = arrow.params.items.first() else {
        return Err(invalid());
    };

    Ok(classify_pattern(&param.pattern, &wrapped))
}

fn classify_pattern(pattern: &BindingPattern, source: &str) -> BindingTarget {
    match pattern {
        BindingPattern::BindingIdentifier(id) => BindingTarget::Identifier {
            name: id.name.to_string(),
            default_value: None,
        },
        BindingPattern::AssignmentPattern(assign) => {
            let default = slice_expr(&assign.right, source);
            match classify_pattern(&assign.left, source) {
                BindingTarget::Identifier { name, .. } => BindingTarget::Identifier {
                    name,
                    default_value: Some(default),
                },
                // `{ x, y } = fallback`: the destructured names still share
                // one id; the default belongs to codegen, not to naming.
                pattern => pattern,
            }
        }
        _ => {
            let mut leaf_names = Vec::new();
            collect_leaf_names(pattern, &mut leaf_names);
            BindingTarget::Pattern { leaf_names }
        }
    }
}

/// Enumerate identifiers bound by a nested pattern. For
/// `{ a, b: [c, { d, e: f }] }` this collects `a, c, d, f`: shorthand keys,
/// array elements, rest arguments, and aliases, but never non-alias object
/// keys.
fn collect_leaf_names(pattern: &BindingPattern, names: &mut Vec<String>) {
    match pattern {
        BindingPattern::BindingIdentifier(id) => {
            names.push(id.name.to_string());
        }
        BindingPattern::ObjectPattern(obj) => {
            for prop in &obj.properties {
                collect_leaf_names(&prop.value, names);
            }
            if let Some(rest) = &obj.rest {
                collect_leaf_names(&rest.argument, names);
            }
        }
        BindingPattern::ArrayPattern(arr) => {
            for elem in &arr.elements {
                if let Some(p) = elem {
                    collect_leaf_names(p, names);
                }
            }
            if let Some(rest) = &arr.rest {
                collect_leaf_names(&rest.argument, names);
            }
        }
        BindingPattern::AssignmentPattern(assign) => {
            collect_leaf_names(&assign.left, names);
        }
        _ => {}
    }
}

fn slice_expr(expr: &Expression, source: &str) -> ExprSource {
    let span = expr.span();
    ExprSource::new(&source[span.start as usize..span.end as usize])
}
