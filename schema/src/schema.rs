use std::fmt;
use std::str::FromStr;

use crate::names::{AttributeName, QualifiedTypeName, SchemaIdentifier, TypeName};

/// The closed set of primitive types.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrimitiveType {
    Boolean,
    Integer,
    Real,
    String,
    Timestamp,
    Uri,
    Uuid,
}

impl PrimitiveType {
    pub const ALL: [PrimitiveType; 7] = [
        PrimitiveType::Boolean,
        PrimitiveType::Integer,
        PrimitiveType::Real,
        PrimitiveType::String,
        PrimitiveType::Timestamp,
        PrimitiveType::Uri,
        PrimitiveType::Uuid,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "BOOLEAN",
            PrimitiveType::Integer => "INTEGER",
            PrimitiveType::Real => "REAL",
            PrimitiveType::String => "STRING",
            PrimitiveType::Timestamp => "TIMESTAMP",
            PrimitiveType::Uri => "URI",
            PrimitiveType::Uuid => "UUID",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.keyword() == keyword)
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeReference {
    Primitive(PrimitiveType),
    /// Always fully qualified, also for types of the declaring schema.
    Named(QualifiedTypeName),
}

impl fmt::Display for TypeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeReference::Primitive(primitive) => write!(f, "{primitive}"),
            TypeReference::Named(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// `1`
    ExactlyOne,
    /// `0..1`
    ZeroOrOne,
    /// `0..N`
    ZeroOrMany,
    /// `1..N`
    OneOrMany,
}

impl Cardinality {
    pub fn token(self) -> &'static str {
        match self {
            Cardinality::ExactlyOne => "1",
            Cardinality::ZeroOrOne => "0..1",
            Cardinality::ZeroOrMany => "0..N",
            Cardinality::OneOrMany => "1..N",
        }
    }

    /// Whether `count` occurrences satisfy this cardinality.
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Cardinality::ExactlyOne => count == 1,
            Cardinality::ZeroOrOne => count <= 1,
            Cardinality::ZeroOrMany => true,
            Cardinality::OneOrMany => count >= 1,
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Cardinality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" => Ok(Cardinality::ExactlyOne),
            "0..1" => Ok(Cardinality::ZeroOrOne),
            "0..N" => Ok(Cardinality::ZeroOrMany),
            "1..N" => Ok(Cardinality::OneOrMany),
            _ => Err(format!("unknown cardinality {s:?}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeDeclaration {
    pub name: TypeName,
    pub base: TypeReference,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeDeclaration {
    pub name: AttributeName,
    pub type_reference: TypeReference,
    pub cardinality: Cardinality,
}

/// A compiled schema. Values are never modified after construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    identifier: SchemaIdentifier,
    imports: Vec<SchemaIdentifier>,
    types: Vec<TypeDeclaration>,
    attributes: Vec<AttributeDeclaration>,
}

impl Schema {
    pub fn new(
        identifier: SchemaIdentifier,
        imports: Vec<SchemaIdentifier>,
        types: Vec<TypeDeclaration>,
        attributes: Vec<AttributeDeclaration>,
    ) -> Self {
        Self {
            identifier,
            imports,
            types,
            attributes,
        }
    }

    pub fn identifier(&self) -> &SchemaIdentifier {
        &self.identifier
    }

    pub fn imports(&self) -> &[SchemaIdentifier] {
        &self.imports
    }

    pub fn types(&self) -> &[TypeDeclaration] {
        &self.types
    }

    pub fn attributes(&self) -> &[AttributeDeclaration] {
        &self.attributes
    }

    pub fn type_named(&self, name: &TypeName) -> Option<&TypeDeclaration> {
        self.types.iter().find(|t| &t.name == name)
    }

    pub fn attribute_named(&self, name: &AttributeName) -> Option<&AttributeDeclaration> {
        self.attributes.iter().find(|a| &a.name == name)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "schema {}", self.identifier)?;
        for import in &self.imports {
            writeln!(f, "  import {import}")?;
        }
        for type_ in &self.types {
            writeln!(f, "  type {} : {}", type_.name, type_.base)?;
        }
        for attribute in &self.attributes {
            writeln!(
                f,
                "  attribute {} : {} [{}]",
                attribute.name, attribute.type_reference, attribute.cardinality
            )?;
        }
        Ok(())
    }
}
