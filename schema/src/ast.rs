//! The declaration tree of a schema source, parameterized over the compilation phase.
//!
//! Every node carries a [`LexicalPosition`] and a phase payload (`data`). The payload types are
//! chosen by the [`Phase`]: the parser produces [`Parsed`] trees, which carry nothing, and the
//! binder produces [`Bound`] trees, which carry resolved identifiers. A tree is never modified;
//! each phase builds a new one.

use std::collections::BTreeMap;
use std::fmt;

use crate::diagnostics::LexicalPosition;
use crate::error::StructuralError;
use crate::names::{
    AttributeName, QualifiedAttributeName, QualifiedTypeName, SchemaIdentifier, SchemaName,
    TypeName, Version,
};
use crate::schema::PrimitiveType;

/// Selects the payload type of each node kind.
pub trait Phase: fmt::Debug + Clone + 'static {
    type Schema: fmt::Debug + Clone;
    type Import: fmt::Debug + Clone;
    type Type: fmt::Debug + Clone;
    type Attribute: fmt::Debug + Clone;
    type TypeReference: fmt::Debug + Clone;
    type Comment: fmt::Debug + Clone;
}

/// The phase produced by the parser.
#[derive(Clone, Debug)]
pub struct Parsed;

impl Phase for Parsed {
    type Schema = ();
    type Import = ();
    type Type = ();
    type Attribute = ();
    type TypeReference = ();
    type Comment = ();
}

/// The phase produced by the binder.
#[derive(Clone, Debug)]
pub struct Bound;

impl Phase for Bound {
    type Schema = SchemaIdentifier;
    type Import = SchemaIdentifier;
    type Type = QualifiedTypeName;
    type Attribute = QualifiedAttributeName;
    type TypeReference = BoundTypeReference;
    type Comment = ();
}

/// What a type reference was bound to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BoundTypeReference {
    Primitive(PrimitiveType),
    /// A type declared by the same schema.
    Local(QualifiedTypeName),
    /// A type of the schema imported as `import`.
    Imported {
        import: SchemaIdentifier,
        name: TypeName,
    },
}

/// Access to the identifier of kind `K` that binding attached to a node.
pub trait Resolved<K> {
    fn resolved(&self) -> &K;
}

/// A type reference as written in the source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeReferenceSyntax {
    Primitive(PrimitiveType),
    Named {
        schema: Option<SchemaName>,
        name: TypeName,
    },
}

impl fmt::Display for TypeReferenceSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeReferenceSyntax::Primitive(primitive) => write!(f, "{primitive}"),
            TypeReferenceSyntax::Named {
                schema: Some(schema),
                name,
            } => write!(f, "{schema}.{name}"),
            TypeReferenceSyntax::Named { schema: None, name } => write!(f, "{name}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TypeReferenceNode<P: Phase> {
    pub lexical: LexicalPosition,
    pub data: P::TypeReference,
    pub syntax: TypeReferenceSyntax,
}

#[derive(Clone, Debug)]
pub struct ImportNode<P: Phase> {
    pub lexical: LexicalPosition,
    pub data: P::Import,
    pub target: SchemaName,
    pub version: Version,
}

#[derive(Clone, Debug)]
pub struct CommentNode<P: Phase> {
    pub lexical: LexicalPosition,
    pub data: P::Comment,
    pub text: String,
}

#[derive(Clone, Debug)]
pub struct TypeNode<P: Phase> {
    pub lexical: LexicalPosition,
    pub data: P::Type,
    pub name: TypeName,
    pub base: TypeReferenceNode<P>,
    pub comment: Option<CommentNode<P>>,
}

#[derive(Clone, Debug)]
pub struct AttributeNode<P: Phase> {
    pub lexical: LexicalPosition,
    pub data: P::Attribute,
    pub name: AttributeName,
    pub type_reference: TypeReferenceNode<P>,
    /// The cardinality token as written; the typer maps it to a
    /// [`Cardinality`](crate::schema::Cardinality).
    pub cardinality: String,
}

/// The node kinds that may appear directly inside a schema.
#[derive(Clone, Debug)]
pub enum Declaration<P: Phase> {
    Import(ImportNode<P>),
    Type(TypeNode<P>),
    Attribute(AttributeNode<P>),
    Comment(CommentNode<P>),
}

/// Any node of the tree.
#[derive(Clone, Debug)]
pub enum Element<P: Phase> {
    Schema(Box<SchemaNode<P>>),
    Import(ImportNode<P>),
    Type(TypeNode<P>),
    Attribute(AttributeNode<P>),
    Comment(CommentNode<P>),
    TypeReference(TypeReferenceNode<P>),
}

impl<P: Phase> Element<P> {
    pub fn kind(&self) -> &'static str {
        match self {
            Element::Schema(_) => "schema",
            Element::Import(_) => "import",
            Element::Type(_) => "type",
            Element::Attribute(_) => "attribute",
            Element::Comment(_) => "comment",
            Element::TypeReference(_) => "type reference",
        }
    }

    pub fn lexical(&self) -> &LexicalPosition {
        match self {
            Element::Schema(node) => node.lexical(),
            Element::Import(node) => &node.lexical,
            Element::Type(node) => &node.lexical,
            Element::Attribute(node) => &node.lexical,
            Element::Comment(node) => &node.lexical,
            Element::TypeReference(node) => &node.lexical,
        }
    }
}

impl<P: Phase> From<Declaration<P>> for Element<P> {
    fn from(declaration: Declaration<P>) -> Self {
        match declaration {
            Declaration::Import(node) => Element::Import(node),
            Declaration::Type(node) => Element::Type(node),
            Declaration::Attribute(node) => Element::Attribute(node),
            Declaration::Comment(node) => Element::Comment(node),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DeclarationCounts {
    pub imports: usize,
    pub types: usize,
    pub attributes: usize,
}

impl fmt::Display for DeclarationCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} imports, {} types, {} attributes",
            self.imports, self.types, self.attributes
        )
    }
}

/// The root of a schema tree.
#[derive(Clone, Debug)]
pub struct SchemaNode<P: Phase> {
    lexical: LexicalPosition,
    data: P::Schema,
    name: SchemaName,
    version: Version,
    declarations: Vec<Declaration<P>>,

    imports: BTreeMap<SchemaName, usize>,
    types: BTreeMap<TypeName, usize>,
    attributes: BTreeMap<AttributeName, usize>,
}

impl<P: Phase> SchemaNode<P> {
    /// Builds a schema node from its children, in source order. Only imports, types, attributes
    /// and comments are accepted; type, attribute and import names must be unique.
    pub fn new(
        lexical: LexicalPosition,
        data: P::Schema,
        name: SchemaName,
        version: Version,
        children: Vec<Element<P>>,
    ) -> Result<Self, StructuralError> {
        let mut declarations = Vec::with_capacity(children.len());
        let mut imports = BTreeMap::new();
        let mut types = BTreeMap::new();
        let mut attributes = BTreeMap::new();

        for child in children {
            let index = declarations.len();
            let declaration = match child {
                Element::Import(node) => {
                    if imports.insert(node.target.clone(), index).is_some() {
                        return Err(StructuralError::DuplicateImport {
                            name: node.target,
                            position: node.lexical,
                        });
                    }
                    Declaration::Import(node)
                }
                Element::Type(node) => {
                    if types.insert(node.name.clone(), index).is_some() {
                        return Err(StructuralError::DuplicateType {
                            name: node.name,
                            position: node.lexical,
                        });
                    }
                    Declaration::Type(node)
                }
                Element::Attribute(node) => {
                    if attributes.insert(node.name.clone(), index).is_some() {
                        return Err(StructuralError::DuplicateAttribute {
                            name: node.name,
                            position: node.lexical,
                        });
                    }
                    Declaration::Attribute(node)
                }
                Element::Comment(node) => Declaration::Comment(node),
                other @ (Element::Schema(_) | Element::TypeReference(_)) => {
                    return Err(StructuralError::IllegalDeclaration {
                        kind: other.kind(),
                        position: other.lexical().clone(),
                    });
                }
            };
            declarations.push(declaration);
        }

        Ok(Self {
            lexical,
            data,
            name,
            version,
            declarations,
            imports,
            types,
            attributes,
        })
    }

    pub fn lexical(&self) -> &LexicalPosition {
        &self.lexical
    }

    pub fn data(&self) -> &P::Schema {
        &self.data
    }

    pub fn name(&self) -> &SchemaName {
        &self.name
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn declarations(&self) -> &[Declaration<P>] {
        &self.declarations
    }

    pub fn imports(&self) -> impl Iterator<Item = &ImportNode<P>> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Import(node) => Some(node),
            _ => None,
        })
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeNode<P>> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Type(node) => Some(node),
            _ => None,
        })
    }

    pub fn attributes(&self) -> impl Iterator<Item = &AttributeNode<P>> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Attribute(node) => Some(node),
            _ => None,
        })
    }

    pub fn comments(&self) -> impl Iterator<Item = &CommentNode<P>> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Comment(node) => Some(node),
            _ => None,
        })
    }

    pub fn import_of(&self, target: &SchemaName) -> Option<&ImportNode<P>> {
        match self.imports.get(target).map(|&i| &self.declarations[i]) {
            Some(Declaration::Import(node)) => Some(node),
            _ => None,
        }
    }

    pub fn type_named(&self, name: &TypeName) -> Option<&TypeNode<P>> {
        match self.types.get(name).map(|&i| &self.declarations[i]) {
            Some(Declaration::Type(node)) => Some(node),
            _ => None,
        }
    }

    pub fn attribute_named(&self, name: &AttributeName) -> Option<&AttributeNode<P>> {
        match self.attributes.get(name).map(|&i| &self.declarations[i]) {
            Some(Declaration::Attribute(node)) => Some(node),
            _ => None,
        }
    }

    pub fn counts(&self) -> DeclarationCounts {
        DeclarationCounts {
            imports: self.imports.len(),
            types: self.types.len(),
            attributes: self.attributes.len(),
        }
    }
}

impl Resolved<SchemaIdentifier> for SchemaNode<Bound> {
    fn resolved(&self) -> &SchemaIdentifier {
        &self.data
    }
}

impl Resolved<SchemaIdentifier> for ImportNode<Bound> {
    fn resolved(&self) -> &SchemaIdentifier {
        &self.data
    }
}

impl Resolved<QualifiedTypeName> for TypeNode<Bound> {
    fn resolved(&self) -> &QualifiedTypeName {
        &self.data
    }
}

impl Resolved<QualifiedAttributeName> for AttributeNode<Bound> {
    fn resolved(&self) -> &QualifiedAttributeName {
        &self.data
    }
}

impl Resolved<BoundTypeReference> for TypeReferenceNode<Bound> {
    fn resolved(&self) -> &BoundTypeReference {
        &self.data
    }
}
