//! Checks the attributes of one document against a [`ResolvedSet`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::diagnostics::Reporter;
use crate::error::{InternalError, ValidationError};
use crate::names::{
    AttributeName, NameError, QualifiedAttributeName, QualifiedName, SchemaIdentifier,
};
use crate::resolver::{ImportTable, ResolvedSet};
use crate::schema::{AttributeDeclaration, PrimitiveType};
use crate::values::TypedValue;

/// An attribute as supplied by a document: `LOCAL.name` and a raw value. `LOCAL` is the name of
/// the schema in the document's import table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UntypedAttribute {
    pub name: QualifiedAttributeName,
    pub value: String,
}

impl UntypedAttribute {
    pub fn new(name: QualifiedAttributeName, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

/// Parses `LOCAL.name=value`.
impl FromStr for UntypedAttribute {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| NameError::Qualified { value: s.into() })?;
        Ok(Self::new(name.parse()?, value))
    }
}

/// A validated attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypedAttribute {
    pub schema: SchemaIdentifier,
    pub name: AttributeName,
    pub value: TypedValue,
}

impl TypedAttribute {
    pub fn primitive(&self) -> PrimitiveType {
        self.value.primitive()
    }
}

impl fmt::Display for TypedAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} : {} = {}",
            self.schema,
            self.name,
            self.primitive(),
            self.value
        )
    }
}

pub struct ValidationRequest<'a> {
    pub resolved: &'a ResolvedSet,
    pub imports: &'a ImportTable,
    pub attributes: &'a [UntypedAttribute],
}

type Occurrence = (SchemaIdentifier, AttributeName);

/// Validates every attribute of `request`.
///
/// Attributes that fail are reported and left out of the result; the others are still
/// validated. Afterwards the occurrences of every attribute declared by an imported schema are
/// counted against its cardinality, and all occurrences of a violating attribute are dropped.
pub fn validate(request: &ValidationRequest, reporter: &mut Reporter) -> Vec<TypedAttribute> {
    let mut counts: BTreeMap<Occurrence, usize> = BTreeMap::new();
    let mut typed = Vec::new();

    for attribute in request.attributes {
        let (id, declaration) = match declaration_of(request, attribute) {
            Ok(found) => found,
            Err(e) => {
                reporter.report_error(&e);
                continue;
            }
        };
        *counts
            .entry((id.clone(), declaration.name.clone()))
            .or_default() += 1;

        match typed_value(request.resolved, id, declaration, attribute) {
            Ok(value) => typed.push(TypedAttribute {
                schema: id.clone(),
                name: declaration.name.clone(),
                value,
            }),
            Err(e) => reporter.report_error(&e),
        }
    }

    let violated = check_cardinalities(request, &counts, reporter);
    typed.retain(|attribute| !violated.contains(&(attribute.schema.clone(), attribute.name.clone())));
    tracing::debug!(
        supplied = request.attributes.len(),
        valid = typed.len(),
        "validated attributes"
    );
    typed
}

fn declaration_of<'r>(
    request: &ValidationRequest<'r>,
    attribute: &UntypedAttribute,
) -> Result<(&'r SchemaIdentifier, &'r AttributeDeclaration), ValidationError> {
    let name = &attribute.name;
    let id = request
        .imports
        .get(&name.schema)
        .ok_or_else(|| ValidationError::SchemaNotImported { name: name.clone() })?;
    let schema = request
        .resolved
        .schema(id)
        .ok_or_else(|| ValidationError::SchemaNotFound {
            name: name.clone(),
            id: id.clone(),
        })?;
    let declaration =
        schema
            .attribute_named(&name.name)
            .ok_or_else(|| ValidationError::SchemaAttributeNotFound {
                name: name.clone(),
                id: id.clone(),
            })?;
    Ok((id, declaration))
}

fn typed_value(
    resolved: &ResolvedSet,
    id: &SchemaIdentifier,
    declaration: &AttributeDeclaration,
    attribute: &UntypedAttribute,
) -> Result<TypedValue, ValidationError> {
    let primitive = resolved
        .primitive_of(&declaration.type_reference)
        .ok_or_else(|| InternalError::UnresolvedTypeReference {
            schema: id.clone(),
            reference: declaration.type_reference.to_string(),
        })?;
    TypedValue::parse(primitive, &attribute.value).ok_or_else(|| {
        ValidationError::AttributeValueInvalid {
            name: attribute.name.clone(),
            primitive,
            value: attribute.value.clone(),
        }
    })
}

/// Reports every attribute of the imported schemas whose number of occurrences its cardinality
/// does not accept, and returns them.
fn check_cardinalities(
    request: &ValidationRequest,
    counts: &BTreeMap<Occurrence, usize>,
    reporter: &mut Reporter,
) -> BTreeSet<Occurrence> {
    let mut checked = BTreeSet::new();
    let mut violated = BTreeSet::new();
    for (local, id) in request.imports.iter() {
        // A schema imported under two local names is only checked once.
        if !checked.insert(id) {
            continue;
        }
        let Some(schema) = request.resolved.schema(id) else {
            continue;
        };
        for declaration in schema.attributes() {
            let key = (id.clone(), declaration.name.clone());
            let count = counts.get(&key).copied().unwrap_or(0);
            if !declaration.cardinality.accepts(count) {
                reporter.report_error(&ValidationError::CardinalityViolation {
                    name: QualifiedName::new(local.clone(), declaration.name.clone()),
                    cardinality: declaration.cardinality,
                    count,
                });
                violated.insert(key);
            }
        }
    }
    violated
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::diagnostics::{
        Diagnostic, DiagnosticCode, DiagnosticReceiver, ReceiverError, Severity,
    };
    use crate::graph::ImportGraph;
    use crate::names::{SchemaName, TypeName};
    use crate::schema::{Cardinality, Schema, TypeDeclaration, TypeReference};

    fn id(s: &str) -> SchemaIdentifier {
        s.parse().unwrap()
    }

    fn attribute(
        name: &str,
        base: TypeReference,
        cardinality: Cardinality,
    ) -> AttributeDeclaration {
        AttributeDeclaration {
            name: AttributeName::new(name).unwrap(),
            type_reference: base,
            cardinality,
        }
    }

    /// Core 1.0: `Title: STRING`, `title: Core.Title [1]`, `keywords: STRING [0..N]`,
    /// `edition: INTEGER [0..1]`.
    fn core() -> Schema {
        Schema::new(
            id("Core:1.0"),
            Vec::new(),
            vec![TypeDeclaration {
                name: TypeName::new("Title").unwrap(),
                base: TypeReference::Primitive(PrimitiveType::String),
            }],
            vec![
                attribute(
                    "title",
                    TypeReference::Named("Core.Title".parse().unwrap()),
                    Cardinality::ExactlyOne,
                ),
                attribute(
                    "keywords",
                    TypeReference::Primitive(PrimitiveType::String),
                    Cardinality::ZeroOrMany,
                ),
                attribute(
                    "edition",
                    TypeReference::Primitive(PrimitiveType::Integer),
                    Cardinality::ZeroOrOne,
                ),
            ],
        )
    }

    fn resolved() -> ResolvedSet {
        let extra = Schema::new(
            id("Extra:1.0"),
            Vec::new(),
            Vec::new(),
            vec![attribute(
                "tag",
                TypeReference::Primitive(PrimitiveType::String),
                Cardinality::OneOrMany,
            )],
        );
        ResolvedSet::new(ImportGraph::new(), [Arc::new(core()), Arc::new(extra)]).unwrap()
    }

    fn core_imports() -> ImportTable {
        ImportTable::new().with(SchemaName::new("Core").unwrap(), id("Core:1.0"))
    }

    fn attributes(pairs: &[&str]) -> Vec<UntypedAttribute> {
        pairs.iter().map(|p| p.parse().unwrap()).collect()
    }

    fn run(
        imports: &ImportTable,
        supplied: &[&str],
    ) -> (Vec<TypedAttribute>, Vec<Diagnostic>) {
        let resolved = resolved();
        let attributes = attributes(supplied);
        let request = ValidationRequest {
            resolved: &resolved,
            imports,
            attributes: &attributes,
        };
        let mut diagnostics = Vec::new();
        let typed = validate(&request, &mut Reporter::new(&mut diagnostics));
        (typed, diagnostics)
    }

    fn codes(diagnostics: &[Diagnostic]) -> Vec<DiagnosticCode> {
        diagnostics.iter().map(|d| d.code).collect()
    }

    #[test]
    fn core_title() {
        let (typed, diagnostics) = run(&core_imports(), &["Core.title=Hello"]);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        assert_eq!(
            typed,
            vec![TypedAttribute {
                schema: id("Core:1.0"),
                name: AttributeName::new("title").unwrap(),
                value: TypedValue::String("Hello".into()),
            }]
        );
        assert_eq!(typed[0].to_string(), "Core:1.0.title : STRING = Hello");
    }

    #[test]
    fn missing_required_attribute() {
        let (typed, diagnostics) = run(&core_imports(), &["Core.keywords=a"]);
        assert_eq!(codes(&diagnostics), vec![DiagnosticCode::ValidateCardinality]);
        assert_eq!(diagnostics[0].attributes["attribute"], "Core.title");
        assert_eq!(typed.len(), 1);
    }

    #[test]
    fn repeated_single_attribute_is_dropped_entirely() {
        let (typed, diagnostics) = run(
            &core_imports(),
            &["Core.title=Hello", "Core.title=World", "Core.keywords=x"],
        );
        assert_eq!(codes(&diagnostics), vec![DiagnosticCode::ValidateCardinality]);
        assert!(diagnostics[0].message.contains("occurs 2 times"));
        assert_eq!(typed.len(), 1);
        assert_eq!(typed[0].name.as_str(), "keywords");
    }

    #[test]
    fn many_and_optional() {
        let (typed, diagnostics) = run(
            &core_imports(),
            &[
                "Core.title=T",
                "Core.keywords=a",
                "Core.keywords=b",
                "Core.keywords=c",
                "Core.edition=2",
                "Core.edition=3",
            ],
        );
        assert_eq!(codes(&diagnostics), vec![DiagnosticCode::ValidateCardinality]);
        assert!(diagnostics[0].message.contains("Core.edition"));
        assert_eq!(typed.len(), 4);
    }

    #[test]
    fn unimported_schema_is_rejected_even_if_resolved() {
        let (typed, diagnostics) = run(&core_imports(), &["Core.title=T", "Extra.tag=x"]);
        assert_eq!(codes(&diagnostics), vec![DiagnosticCode::ValidateSchemaNotImported]);
        assert_eq!(typed.len(), 1);
    }

    #[test]
    fn imported_schema_must_be_resolved() {
        let imports = core_imports().with(SchemaName::new("Other").unwrap(), id("Other:1.0"));
        let (typed, diagnostics) = run(&imports, &["Core.title=T", "Other.x=1"]);
        assert_eq!(codes(&diagnostics), vec![DiagnosticCode::ValidateSchemaNotFound]);
        assert_eq!(typed.len(), 1);
    }

    #[test]
    fn undeclared_attribute() {
        let (typed, diagnostics) = run(&core_imports(), &["Core.title=T", "Core.author=me"]);
        assert_eq!(codes(&diagnostics), vec![DiagnosticCode::ValidateAttributeNotFound]);
        assert_eq!(typed.len(), 1);
    }

    #[test]
    fn invalid_values_are_dropped() {
        let (typed, diagnostics) = run(&core_imports(), &["Core.title=T", "Core.edition=two"]);
        assert_eq!(codes(&diagnostics), vec![DiagnosticCode::ValidateValueInvalid]);
        assert_eq!(typed.len(), 1);
    }

    #[test]
    fn local_names_alias_schemas() {
        let imports = ImportTable::new()
            .with(SchemaName::new("dc").unwrap(), id("Core:1.0"))
            .with(SchemaName::new("x").unwrap(), id("Extra:1.0"));
        let (typed, diagnostics) = run(&imports, &["dc.title=T", "x.tag=a", "x.tag=b"]);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        assert_eq!(typed.len(), 3);
        assert_eq!(typed[2].schema, id("Extra:1.0"));
    }

    struct Exploding;

    impl DiagnosticReceiver for Exploding {
        fn receive(&mut self, _diagnostic: &Diagnostic) -> Result<(), ReceiverError> {
            panic!("receiver exploded")
        }
    }

    #[test]
    fn failing_receiver_does_not_stop_validation() {
        let resolved = resolved();
        let imports = core_imports();
        let attributes = attributes(&["Nope.a=1", "Core.title=T", "Core.author=x"]);
        let request = ValidationRequest {
            resolved: &resolved,
            imports: &imports,
            attributes: &attributes,
        };
        let mut receiver = Exploding;
        let mut reporter = Reporter::new(&mut receiver);
        let typed = validate(&request, &mut reporter);
        assert_eq!(typed.len(), 1);
        assert_eq!(reporter.error_count(), 2);
    }

    #[test]
    fn unresolvable_attribute_type_is_internal() {
        let broken = Schema::new(
            id("Broken:1.0"),
            Vec::new(),
            Vec::new(),
            vec![attribute(
                "a",
                TypeReference::Named("Gone.T".parse().unwrap()),
                Cardinality::ZeroOrMany,
            )],
        );
        let resolved = ResolvedSet::new(ImportGraph::new(), [Arc::new(broken)]).unwrap();
        let imports = ImportTable::new().with(SchemaName::new("b").unwrap(), id("Broken:1.0"));
        let attributes = attributes(&["b.a=1"]);
        let request = ValidationRequest {
            resolved: &resolved,
            imports: &imports,
            attributes: &attributes,
        };
        let mut diagnostics = Vec::new();
        let typed = validate(&request, &mut Reporter::new(&mut diagnostics));
        assert!(typed.is_empty());
        assert_eq!(diagnostics[0].severity, Severity::Critical);
    }
}
