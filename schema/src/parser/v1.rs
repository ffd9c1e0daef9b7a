//! Version 1 of the schema language, namespace `urn:docmeta:schema:1`.

use std::str::FromStr;

use num_bigint::BigUint;
use roxmltree::Node;

use super::{HandlerContext, NamespaceHandler};
use crate::ast::{
    AttributeNode, CommentNode, Element, ImportNode, Parsed, SchemaNode, TypeNode,
    TypeReferenceNode, TypeReferenceSyntax,
};
use crate::diagnostics::DiagnosticCode;
use crate::error::ParseError;
use crate::names::{parse_component, AttributeName, NameError, SchemaName, Version};
use crate::schema::{Cardinality, PrimitiveType};

pub const NAMESPACE: &str = "urn:docmeta:schema:1";

const SCHEMA_TAG_NAME: &str = "Schema";
const IMPORT_TAG_NAME: &str = "Import";
const TYPE_TAG_NAME: &str = "Type";
const ATTRIBUTE_TAG_NAME: &str = "Attribute";
const COMMENT_TAG_NAME: &str = "Comment";
const PRIMITIVE_TAG_NAME: &str = "TypeReferencePrimitive";
const NAMED_TAG_NAME: &str = "TypeReferenceNamed";

const VERSION_MAJOR: &str = "versionMajor";
const VERSION_MINOR: &str = "versionMinor";

pub struct SchemaHandlerV1;

impl NamespaceHandler for SchemaHandlerV1 {
    fn namespace(&self) -> &'static str {
        NAMESPACE
    }

    fn schema_description(&self) -> &'static str {
        super::SCHEMA_XSD_V1
    }

    fn handle(&self, context: &mut HandlerContext, root: Node) -> Option<SchemaNode<Parsed>> {
        map_schema(context, root)
    }
}

/// The local name of `node` if it is an element of this namespace.
fn tag<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    if node.is_element() && node.tag_name().namespace() == Some(NAMESPACE) {
        Some(node.tag_name().name())
    } else {
        None
    }
}

fn display_tag(node: Node) -> String {
    match node.tag_name().namespace() {
        Some(NAMESPACE) | None => node.tag_name().name().to_string(),
        Some(namespace) => format!("{{{namespace}}}{}", node.tag_name().name()),
    }
}

/// Unqualified attributes must be listed in `allowed`. Attributes of other namespaces are ignored
/// with a warning.
fn check_attributes(context: &mut HandlerContext, node: Node, allowed: &[&str]) {
    for attribute in node.attributes() {
        match attribute.namespace() {
            None if allowed.contains(&attribute.name()) => {}
            None | Some(NAMESPACE) => context.error(
                node,
                format!(
                    "attribute {:?} is not allowed on {}",
                    attribute.name(),
                    display_tag(node)
                ),
            ),
            Some(namespace) => context.warning(
                node,
                DiagnosticCode::ParseForeignAttribute,
                format!(
                    "ignoring attribute {{{namespace}}}{} on {}",
                    attribute.name(),
                    display_tag(node)
                ),
            ),
        }
    }
}

fn required<'a>(context: &mut HandlerContext, node: Node<'a, '_>, attribute: &str) -> Option<&'a str> {
    let value = node.attribute(attribute);
    if value.is_none() {
        context.error(
            node,
            format!("{} requires the attribute {attribute:?}", display_tag(node)),
        );
    }
    value
}

fn parse_name<T: FromStr<Err = NameError>>(
    context: &mut HandlerContext,
    node: Node,
    attribute: &str,
    value: &str,
) -> Option<T> {
    match value.parse() {
        Ok(name) => Some(name),
        Err(e) => {
            context.error(node, format!("attribute {attribute:?}: {e}"));
            None
        }
    }
}

fn name_attribute<T: FromStr<Err = NameError>>(
    context: &mut HandlerContext,
    node: Node,
    attribute: &str,
) -> Option<T> {
    let value = required(context, node, attribute)?;
    parse_name(context, node, attribute, value)
}

fn version_component(context: &mut HandlerContext, node: Node, attribute: &str) -> Option<BigUint> {
    let value = required(context, node, attribute)?;
    let component = parse_component(value.trim());
    if component.is_none() {
        context.error(
            node,
            format!("attribute {attribute:?}: {value:?} is not a non-negative integer"),
        );
    }
    component
}

fn version_attributes(context: &mut HandlerContext, node: Node) -> Option<Version> {
    let major = version_component(context, node, VERSION_MAJOR);
    let minor = version_component(context, node, VERSION_MINOR);
    Some(Version::new(major?, minor?))
}

/// Element children of `node`, in document order. Non-whitespace text is an error.
fn element_children<'a, 'i>(context: &mut HandlerContext, node: Node<'a, 'i>) -> Vec<Node<'a, 'i>> {
    let mut elements = Vec::new();
    for child in node.children() {
        if child.is_element() {
            elements.push(child);
        } else if child.is_text() && child.text().is_some_and(|t| !t.trim().is_empty()) {
            context.error(child, format!("text is not allowed in {}", display_tag(node)));
        }
    }
    elements
}

fn unexpected(context: &mut HandlerContext, parent: Node, child: Node) {
    context.error(
        child,
        format!(
            "{} is not allowed in {}",
            display_tag(child),
            display_tag(parent)
        ),
    );
}

fn no_children(context: &mut HandlerContext, node: Node) {
    for child in element_children(context, node) {
        unexpected(context, node, child);
    }
}

fn map_schema(context: &mut HandlerContext, node: Node) -> Option<SchemaNode<Parsed>> {
    if tag(node) != Some(SCHEMA_TAG_NAME) {
        context.error(
            node,
            format!(
                "the root element must be {SCHEMA_TAG_NAME}, found {}",
                display_tag(node)
            ),
        );
        return None;
    }
    check_attributes(context, node, &["name", VERSION_MAJOR, VERSION_MINOR]);
    let name: Option<SchemaName> = name_attribute(context, node, "name");
    let version = version_attributes(context, node);

    let mut children = Vec::new();
    for child in element_children(context, node) {
        let element = match tag(child) {
            Some(IMPORT_TAG_NAME) => map_import(context, child).map(Element::Import),
            Some(TYPE_TAG_NAME) => map_type(context, child).map(Element::Type),
            Some(ATTRIBUTE_TAG_NAME) => map_attribute(context, child).map(Element::Attribute),
            Some(COMMENT_TAG_NAME) => map_comment(context, child).map(Element::Comment),
            _ => {
                unexpected(context, node, child);
                None
            }
        };
        children.extend(element);
    }

    let (name, version) = (name?, version?);
    if context.has_failed() {
        return None;
    }
    match SchemaNode::new(context.position(node), (), name, version, children) {
        Ok(schema) => Some(schema),
        Err(e) => {
            context.report(ParseError::from(e));
            None
        }
    }
}

fn map_import(context: &mut HandlerContext, node: Node) -> Option<ImportNode<Parsed>> {
    check_attributes(context, node, &["name", VERSION_MAJOR, VERSION_MINOR]);
    no_children(context, node);
    let target = name_attribute(context, node, "name");
    let version = version_attributes(context, node);
    Some(ImportNode {
        lexical: context.position(node),
        data: (),
        target: target?,
        version: version?,
    })
}

fn map_type(context: &mut HandlerContext, node: Node) -> Option<TypeNode<Parsed>> {
    check_attributes(context, node, &["name"]);
    let name = name_attribute(context, node, "name");

    let mut children = element_children(context, node).into_iter();
    let base = match children.next() {
        Some(child) => map_type_reference(context, node, child),
        None => {
            context.error(node, format!("{TYPE_TAG_NAME} requires a type reference"));
            None
        }
    };
    let comment = match children.next() {
        Some(child) if tag(child) == Some(COMMENT_TAG_NAME) => map_comment(context, child),
        Some(child) => {
            unexpected(context, node, child);
            None
        }
        None => None,
    };
    for child in children {
        unexpected(context, node, child);
    }

    Some(TypeNode {
        lexical: context.position(node),
        data: (),
        name: name?,
        base: base?,
        comment,
    })
}

fn map_attribute(context: &mut HandlerContext, node: Node) -> Option<AttributeNode<Parsed>> {
    check_attributes(context, node, &["name", "cardinality"]);
    let name: Option<AttributeName> = name_attribute(context, node, "name");

    let cardinality = required(context, node, "cardinality").and_then(|token| {
        match token.parse::<Cardinality>() {
            Ok(_) => Some(token.to_string()),
            Err(e) => {
                context.error(node, format!("attribute \"cardinality\": {e}"));
                None
            }
        }
    });

    let mut children = element_children(context, node).into_iter();
    let type_reference = match children.next() {
        Some(child) => map_type_reference(context, node, child),
        None => {
            context.error(node, format!("{ATTRIBUTE_TAG_NAME} requires a type reference"));
            None
        }
    };
    for child in children {
        unexpected(context, node, child);
    }

    Some(AttributeNode {
        lexical: context.position(node),
        data: (),
        name: name?,
        type_reference: type_reference?,
        cardinality: cardinality?,
    })
}

fn map_comment(context: &mut HandlerContext, node: Node) -> Option<CommentNode<Parsed>> {
    check_attributes(context, node, &[]);
    let mut text = String::new();
    for child in node.children() {
        if child.is_element() {
            unexpected(context, node, child);
        } else if let Some(fragment) = child.text().filter(|_| child.is_text()) {
            text.push_str(fragment);
        }
    }
    Some(CommentNode {
        lexical: context.position(node),
        data: (),
        text,
    })
}

fn map_type_reference(
    context: &mut HandlerContext,
    parent: Node,
    node: Node,
) -> Option<TypeReferenceNode<Parsed>> {
    let syntax = match tag(node) {
        Some(PRIMITIVE_TAG_NAME) => {
            check_attributes(context, node, &["type"]);
            no_children(context, node);
            let keyword = required(context, node, "type")?;
            match PrimitiveType::from_keyword(keyword) {
                Some(primitive) => TypeReferenceSyntax::Primitive(primitive),
                None => {
                    context.error(node, format!("{keyword:?} is not a primitive type"));
                    return None;
                }
            }
        }
        Some(NAMED_TAG_NAME) => {
            check_attributes(context, node, &["schema", "name"]);
            no_children(context, node);
            // An absent qualifier is fine; a malformed one is not.
            let schema = match node.attribute("schema") {
                Some(value) => parse_name::<SchemaName>(context, node, "schema", value).map(Some),
                None => Some(None),
            };
            let name = name_attribute(context, node, "name");
            TypeReferenceSyntax::Named {
                schema: schema?,
                name: name?,
            }
        }
        _ => {
            context.error(
                node,
                format!(
                    "{} expects a type reference, found {}",
                    display_tag(parent),
                    display_tag(node)
                ),
            );
            return None;
        }
    };
    Some(TypeReferenceNode {
        lexical: context.position(node),
        data: (),
        syntax,
    })
}
