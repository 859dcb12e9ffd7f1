//! View parsing.
//!
//! Turns a component's view expression (JSX, or any plain expression) into a
//! renderable particle tree plus the bitmask of reactive ids the view reads.
//! Dynamic attribute values and expression children each carry their own
//! dependency bitmap so codegen can guard their updates individually.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Expression, JSXAttributeItem, JSXAttributeValue, JSXChild, JSXElement, JSXElementName,
    JSXFragment, JSXMemberExpression, JSXMemberExpressionObject,
};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};
use std::collections::HashMap;

use crate::extract::dependency_of_expression;
use crate::ir::{
    AttrValue, CompilerError, ErrorKind, ExprSource, ParticleAttr, SourceLocation, ViewParticle,
    ERR_EXPRESSION_SYNTAX,
};

/// Parse a view expression against the visible reactive map. Returns the
/// particle tree and the union of every dynamic part's dependency bitmap.
pub fn parse_view(
    code: &str,
    file: &str,
    loc: SourceLocation,
    visible: &HashMap<String, u64>,
) -> Result<(ViewParticle, u64), CompilerError> {
    let allocator = Allocator::default();
    let source_type = SourceType::default()
        .with_typescript(true)
        .with_module(true)
        .with_jsx(true);

    let expr = Parser::new(&allocator, code, source_type)
        .parse_expression()
        .map_err(|_| {
            CompilerError::new(
                ERR_EXPRESSION_SYNTAX,
                ErrorKind::UserInput,
                &format!("Invalid view expression: {}", code),
                file,
                loc,
            )
        })?;

    let mut parser = ViewParser {
        source: code,
        visible,
        used_id_bits: 0,
    };
    let particle = parser.lower_expression(&expr);
    Ok((particle, parser.used_id_bits))
}

struct ViewParser<'a> {
    source: &'a str,
    visible: &'a HashMap<String, u64>,
    used_id_bits: u64,
}

impl<'a> ViewParser<'a> {
    fn lower_expression(&mut self, expr: &Expression) -> ViewParticle {
        match expr {
            Expression::JSXElement(element) => self.lower_element(element),
            Expression::JSXFragment(fragment) => ViewParticle::Fragment {
                children: self.lower_children(&fragment.children),
            },
            other => self.expression_particle(other),
        }
    }

    fn lower_element(&mut self, element: &JSXElement) -> ViewParticle {
        let tag = tag_name(&element.opening_element.name);
        let mut attributes = Vec::new();

        for item in &element.opening_element.attributes {
            match item {
                JSXAttributeItem::Attribute(attr) => {
                    let name = attr_name(attr);
                    let value = match &attr.value {
                        Some(JSXAttributeValue::StringLiteral(s)) => {
                            AttrValue::Static(s.value.to_string())
                        }
                        Some(JSXAttributeValue::ExpressionContainer(container)) => {
                            match container.expression.as_expression() {
                                Some(value_expr) => self.dynamic_attr(value_expr),
                                None => AttrValue::Static(String::new()),
                            }
                        }
                        Some(JSXAttributeValue::Element(el)) => {
                            let span = el.span();
                            AttrValue::Static(self.slice(span.start, span.end))
                        }
                        Some(JSXAttributeValue::Fragment(frag)) => {
                            let span = frag.span();
                            AttrValue::Static(self.slice(span.start, span.end))
                        }
                        // Bare attribute: `<input disabled />`.
                        None => AttrValue::Static("true".to_string()),
                    };
                    attributes.push(ParticleAttr { name, value });
                }
                JSXAttributeItem::SpreadAttribute(spread) => {
                    let value = self.dynamic_attr(&spread.argument);
                    attributes.push(ParticleAttr {
                        name: "...".to_string(),
                        value,
                    });
                }
            }
        }

        let children = self.lower_children(&element.children);

        // Capitalized tags are component references, lowercase tags are
        // host elements.
        if tag.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
            ViewParticle::Component {
                name: tag,
                attributes,
                children,
            }
        } else {
            ViewParticle::Element {
                tag,
                attributes,
                children,
            }
        }
    }

    fn lower_children(&mut self, children: &[JSXChild]) -> Vec<ViewParticle> {
        let mut particles = Vec::new();
        for child in children {
            match child {
                JSXChild::Text(text) => {
                    let value = text.value.trim();
                    if !value.is_empty() {
                        particles.push(ViewParticle::Text {
                            value: value.to_string(),
                        });
                    }
                }
                JSXChild::Element(el) => particles.push(self.lower_element(el)),
                JSXChild::Fragment(frag) => particles.push(self.lower_fragment(frag)),
                JSXChild::ExpressionContainer(container) => {
                    // Empty containers hold only comments.
                    if let Some(child_expr) = container.expression.as_expression() {
                        particles.push(self.expression_particle(child_expr));
                    }
                }
                JSXChild::Spread(spread) => {
                    particles.push(self.expression_particle(&spread.expression));
                }
            }
        }
        particles
    }

    fn lower_fragment(&mut self, fragment: &JSXFragment) -> ViewParticle {
        ViewParticle::Fragment {
            children: self.lower_children(&fragment.children),
        }
    }

    fn expression_particle(&mut self, expr: &Expression) -> ViewParticle {
        let bitmap = self.note_dependency(expr);
        let span = expr.span();
        ViewParticle::Expression {
            expr: ExprSource::new(self.slice(span.start, span.end)),
            dep_id_bitmap: bitmap,
        }
    }

    fn dynamic_attr(&mut self, expr: &Expression) -> AttrValue {
        let bitmap = self.note_dependency(expr);
        let span = expr.span();
        AttrValue::Dynamic {
            expr: ExprSource::new(self.slice(span.start, span.end)),
            dep_id_bitmap: bitmap,
        }
    }

    fn note_dependency(&mut self, expr: &Expression) -> u64 {
        let bitmap = dependency_of_expression(expr, self.visible)
            .map_or(0, |dep| dep.dep_id_bitmap);
        self.used_id_bits |= bitmap;
        bitmap
    }

    fn slice(&self, start: u32, end: u32) -> String {
        self.source[start as usize..end as usize].to_string()
    }
}

fn attr_name(attr: &oxc_ast::ast::JSXAttribute) -> String {
    match &attr.name {
        oxc_ast::ast::JSXAttributeName::Identifier(id) => id.name.to_string(),
        oxc_ast::ast::JSXAttributeName::NamespacedName(ns) => {
            format!("{}:{}", ns.namespace.name, ns.name.name)
        }
    }
}

fn tag_name(name: &JSXElementName) -> String {
    match name {
        JSXElementName::Identifier(id) => id.name.to_string(),
        JSXElementName::IdentifierReference(id) => id.name.to_string(),
        JSXElementName::NamespacedName(ns) => format!("{}:{}", ns.namespace.name, ns.name.name),
        JSXElementName::MemberExpression(me) => member_name(me),
        JSXElementName::ThisExpression(_) => "this".to_string(),
    }
}

fn member_name(me: &JSXMemberExpression) -> String {
    let object = match &me.object {
        JSXMemberExpressionObject::IdentifierReference(id) => id.name.to_string(),
        JSXMemberExpressionObject::MemberExpression(inner) => member_name(inner),
        _ => "unknown".to_string(),
    };
    format!("{}.{}", object, me.property.name)
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

    fn parse(code: &str, map: &HashMap<String, u64>) -> (ViewParticle, u64) {
        parse_view(code, "t.tsx", SourceLocation::default(), map).unwrap()
    }

    #[test]
    fn test_element_with_dynamic_child_collects_used_bits() {
        let map = visible(&[("count", 0b1)]);
        let (particle, used) = parse("<div>{count}</div>", &map);
        assert_eq!(used, 0b1);
        let ViewParticle::Element { tag, children, .. } = particle else {
            panic!("expected element");
        };
        assert_eq!(tag, "div");
        assert!(matches!(
            &children[0],
            ViewParticle::Expression { dep_id_bitmap: 0b1, .. }
        ));
    }

    #[test]
    fn test_dynamic_attribute_carries_its_own_bitmap() {
        let map = visible(&[("title", 0b1), ("count", 0b10)]);
        let (particle, used) = parse("<h1 title={title}>{count}</h1>", &map);
        assert_eq!(used, 0b11);
        let ViewParticle::Element { attributes, .. } = particle else {
            panic!("expected element");
        };
        match &attributes[0].value {
            AttrValue::Dynamic { dep_id_bitmap, .. } => assert_eq!(*dep_id_bitmap, 0b1),
            other => panic!("expected dynamic attr, got {:?}", other),
        }
    }

    #[test]
    fn test_capitalized_tag_is_component() {
        let map = visible(&[]);
        let (particle, _) = parse("<Counter start={1} />", &map);
        assert!(matches!(
            particle,
            ViewParticle::Component { ref name, .. } if name == "Counter"
        ));
    }

    #[test]
    fn test_fragment_and_text_children() {
        let map = visible(&[("name", 0b1)]);
        let (particle, used) = parse("<>hello {name}</>", &map);
        assert_eq!(used, 0b1);
        let ViewParticle::Fragment { children } = particle else {
            panic!("expected fragment");
        };
        assert!(matches!(&children[0], ViewParticle::Text { value } if value == "hello"));
    }

    #[test]
    fn test_plain_expression_view() {
        let map = visible(&[("items", 0b100)]);
        let (particle, used) = parse("items.map(item => <li>{item}</li>)", &map);
        assert_eq!(used, 0b100);
        assert!(matches!(
            particle,
            ViewParticle::Expression { dep_id_bitmap: 0b100, .. }
        ));
    }

    #[test]
    fn test_static_attribute_and_bare_flag() {
        let map = visible(&[]);
        let (particle, used) = parse(r#"<input type="text" disabled />"#, &map);
        assert_eq!(used, 0);
        let ViewParticle::Element { attributes, .. } = particle else {
            panic!("expected element");
        };
        assert!(matches!(&attributes[0].value, AttrValue::Static(v) if v == "text"));
        assert!(matches!(&attributes[1].value, AttrValue::Static(v) if v == "true"));
    }
}
