//! Name binding: [`Parsed`] tree to [`Bound`] tree.
//!
//! Every declaration is given its qualified identifier and every type reference is bound to a
//! primitive, a type of the same schema, or a type of one of its imports. Whether an imported
//! schema actually declares the referenced type is only known once it has been loaded, so that
//! check is left to the typer.

use std::collections::{BTreeMap, BTreeSet};

use crate::ast::{
    AttributeNode, Bound, BoundTypeReference, CommentNode, Declaration, Element, ImportNode,
    Parsed, SchemaNode, TypeNode, TypeReferenceNode, TypeReferenceSyntax,
};
use crate::diagnostics::Reporter;
use crate::error::{BindError, InternalError};
use crate::names::{QualifiedName, SchemaIdentifier, SchemaName, TypeName};

struct Binder<'s, 'a, 'r> {
    schema: &'s SchemaNode<Parsed>,
    reporter: &'a mut Reporter<'r>,
    failed: bool,
}

/// Binds all names of `schema`. Returns `None` if anything could not be bound; the reasons have
/// been reported.
pub fn bind(schema: &SchemaNode<Parsed>, reporter: &mut Reporter) -> Option<SchemaNode<Bound>> {
    let id = SchemaIdentifier::new(schema.name().clone(), schema.version().clone());
    tracing::debug!(schema = %id, "binding");

    let mut binder = Binder {
        schema,
        reporter,
        failed: false,
    };

    let children: Vec<Element<Bound>> = schema
        .declarations()
        .iter()
        .filter_map(|declaration| binder.bind_declaration(declaration))
        .collect();

    binder.check_type_cycles();
    if binder.failed {
        return None;
    }

    match SchemaNode::new(
        schema.lexical().clone(),
        id,
        schema.name().clone(),
        schema.version().clone(),
        children,
    ) {
        Ok(bound) => Some(bound),
        Err(e) => {
            binder.reporter.report_error(&InternalError::from(e));
            None
        }
    }
}

impl<'s, 'a, 'r> Binder<'s, 'a, 'r> {
    fn fail(&mut self, error: BindError) {
        self.failed = true;
        self.reporter.report_error(&error);
    }

    fn own_name(&self) -> &'s SchemaName {
        self.schema.name()
    }

    fn bind_declaration(&mut self, declaration: &Declaration<Parsed>) -> Option<Element<Bound>> {
        Some(match declaration {
            Declaration::Import(node) => Element::Import(self.bind_import(node)?),
            Declaration::Type(node) => Element::Type(self.bind_type(node)?),
            Declaration::Attribute(node) => Element::Attribute(self.bind_attribute(node)?),
            Declaration::Comment(node) => Element::Comment(bind_comment(node)),
        })
    }

    fn bind_import(&mut self, node: &ImportNode<Parsed>) -> Option<ImportNode<Bound>> {
        if &node.target == self.own_name() {
            self.fail(BindError::ImportSelf {
                schema: node.target.clone(),
                position: node.lexical.clone(),
            });
            return None;
        }
        Some(ImportNode {
            lexical: node.lexical.clone(),
            data: SchemaIdentifier::new(node.target.clone(), node.version.clone()),
            target: node.target.clone(),
            version: node.version.clone(),
        })
    }

    fn bind_type(&mut self, node: &TypeNode<Parsed>) -> Option<TypeNode<Bound>> {
        let base = self.bind_type_reference(&node.base);
        Some(TypeNode {
            lexical: node.lexical.clone(),
            data: QualifiedName::new(self.own_name().clone(), node.name.clone()),
            name: node.name.clone(),
            base: base?,
            comment: node.comment.as_ref().map(bind_comment),
        })
    }

    fn bind_attribute(&mut self, node: &AttributeNode<Parsed>) -> Option<AttributeNode<Bound>> {
        let type_reference = self.bind_type_reference(&node.type_reference);
        Some(AttributeNode {
            lexical: node.lexical.clone(),
            data: QualifiedName::new(self.own_name().clone(), node.name.clone()),
            name: node.name.clone(),
            type_reference: type_reference?,
            cardinality: node.cardinality.clone(),
        })
    }

    fn bind_type_reference(
        &mut self,
        node: &TypeReferenceNode<Parsed>,
    ) -> Option<TypeReferenceNode<Bound>> {
        let data = match &node.syntax {
            TypeReferenceSyntax::Primitive(primitive) => BoundTypeReference::Primitive(*primitive),
            TypeReferenceSyntax::Named { schema, name } => {
                match schema.as_ref().filter(|s| *s != self.own_name()) {
                    None => {
                        if self.schema.type_named(name).is_none() {
                            self.fail(BindError::TypeUnbound {
                                schema: self.own_name().clone(),
                                name: name.clone(),
                                position: node.lexical.clone(),
                            });
                            return None;
                        }
                        BoundTypeReference::Local(QualifiedName::new(
                            self.own_name().clone(),
                            name.clone(),
                        ))
                    }
                    Some(qualifier) => match self.schema.import_of(qualifier) {
                        Some(import) => BoundTypeReference::Imported {
                            import: SchemaIdentifier::new(
                                import.target.clone(),
                                import.version.clone(),
                            ),
                            name: name.clone(),
                        },
                        None => {
                            self.fail(BindError::ImportUnbound {
                                schema: self.own_name().clone(),
                                qualifier: qualifier.clone(),
                                position: node.lexical.clone(),
                            });
                            return None;
                        }
                    },
                }
            }
        };
        Some(TypeReferenceNode {
            lexical: node.lexical.clone(),
            data,
            syntax: node.syntax.clone(),
        })
    }

    /// Types whose base chain within the schema leads back to themselves are reported once per
    /// cycle.
    fn check_type_cycles(&mut self) {
        let schema = self.schema;
        let own = schema.name();
        let bases: BTreeMap<&TypeName, &TypeName> = schema
            .types()
            .filter_map(|node| match &node.base.syntax {
                TypeReferenceSyntax::Named { schema, name }
                    if schema.as_ref().map_or(true, |s| s == own) =>
                {
                    Some((&node.name, name))
                }
                _ => None,
            })
            .collect();

        let mut reported = BTreeSet::new();
        for node in schema.types() {
            if reported.contains(&node.name) {
                continue;
            }
            let mut chain = vec![&node.name];
            let mut current = &node.name;
            while let Some(&next) = bases.get(current) {
                if next == &node.name {
                    chain.push(next);
                    reported.extend(chain.iter().cloned());
                    self.fail(BindError::TypeCyclic {
                        name: QualifiedName::new(own.clone(), node.name.clone()),
                        cycle: chain
                            .iter()
                            .map(|n| n.as_str())
                            .collect::<Vec<_>>()
                            .join(" -> "),
                        position: node.lexical.clone(),
                    });
                    break;
                }
                // A cycle not through this type is reported when its own members are visited.
                if chain.contains(&next) {
                    break;
                }
                chain.push(next);
                current = next;
            }
        }
    }
}

fn bind_comment(node: &CommentNode<Parsed>) -> CommentNode<Bound> {
    CommentNode {
        lexical: node.lexical.clone(),
        data: (),
        text: node.text.clone(),
    }
}
