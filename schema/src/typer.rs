//! [`Bound`] tree to compiled [`Schema`].

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::ast::{Bound, BoundTypeReference, Resolved, SchemaNode, TypeReferenceNode};
use crate::diagnostics::{Diagnose, Reporter};
use crate::error::{InternalError, LoaderError};
use crate::loader::Loader;
use crate::names::{QualifiedName, SchemaIdentifier, SchemaName};
use crate::schema::{AttributeDeclaration, Cardinality, Schema, TypeDeclaration, TypeReference};

struct Typer<'a> {
    id: &'a SchemaIdentifier,
    schema: &'a SchemaNode<Bound>,
    imports: &'a BTreeMap<SchemaName, Arc<Schema>>,
}

/// Why [`type_schema`] produced no schema.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TypingFailure {
    /// Only imports failed to load. Their failures have been reported.
    Imports,
    /// The schema itself is in error.
    Schema,
}

/// Loads the imports of `schema` through `loader` and builds the compiled schema.
///
/// Fails closed: if any error was reported while this schema was typed, including errors of the
/// schemas it imports, no schema is returned. An import that failed only because of its own
/// imports is not reported again, so a failure deep in a chain is reported once.
pub fn type_schema(
    schema: &SchemaNode<Bound>,
    loader: &mut Loader,
    reporter: &mut Reporter,
) -> Result<Schema, TypingFailure> {
    let id = schema.resolved();
    let errors = reporter.error_count();
    let mut import_errors = 0;
    let mut imports_failed = false;

    let mut imports = BTreeMap::new();
    for import in schema.imports() {
        let target = import.resolved();
        let before = reporter.error_count();
        match loader.load(id, target, reporter) {
            Ok(imported) => {
                imports.insert(target.name.clone(), imported);
            }
            Err(LoaderError::CompilationFailed { id: failed })
                if loader.failed_by_import(&failed) =>
            {
                imports_failed = true;
            }
            Err(e) => {
                imports_failed = true;
                let mut diagnostic = e.diagnostic();
                if diagnostic.position.is_zero() {
                    diagnostic = diagnostic.at(import.lexical.clone());
                }
                reporter.report(diagnostic);
            }
        }
        import_errors += reporter.error_count() - before;
    }

    let typer = Typer {
        id,
        schema,
        imports: &imports,
    };
    let declarations = match typer.declarations() {
        Ok(declarations) => declarations,
        Err(e) => {
            reporter.report_error(&e);
            return Err(TypingFailure::Schema);
        }
    };

    if reporter.error_count() - errors > import_errors {
        tracing::debug!(schema = %id, "typing failed");
        return Err(TypingFailure::Schema);
    }
    match declarations {
        Some((types, attributes)) if !imports_failed => Ok(Schema::new(
            id.clone(),
            schema.imports().map(|i| i.resolved().clone()).collect(),
            types,
            attributes,
        )),
        _ => {
            tracing::debug!(schema = %id, "imports failed");
            Err(TypingFailure::Imports)
        }
    }
}

type Declarations = (Vec<TypeDeclaration>, Vec<AttributeDeclaration>);

impl<'a> Typer<'a> {
    /// `Ok(None)` if a declaration refers into an import that failed to load.
    fn declarations(&self) -> Result<Option<Declarations>, InternalError> {
        let mut complete = true;

        let mut types = Vec::new();
        for node in self.schema.types() {
            match self.type_reference(&node.base)? {
                Some(base) => types.push(TypeDeclaration {
                    name: node.name.clone(),
                    base,
                }),
                None => complete = false,
            }
        }

        let mut attributes = Vec::new();
        for node in self.schema.attributes() {
            let cardinality: Cardinality =
                node.cardinality
                    .parse()
                    .map_err(|_| InternalError::UnknownCardinality {
                        attribute: node.resolved().clone(),
                        token: node.cardinality.clone(),
                    })?;
            match self.type_reference(&node.type_reference)? {
                Some(type_reference) => attributes.push(AttributeDeclaration {
                    name: node.name.clone(),
                    type_reference,
                    cardinality,
                }),
                None => complete = false,
            }
        }

        Ok(complete.then_some((types, attributes)))
    }

    fn type_reference(
        &self,
        node: &TypeReferenceNode<Bound>,
    ) -> Result<Option<TypeReference>, InternalError> {
        let unresolved = || InternalError::UnresolvedTypeReference {
            schema: self.id.clone(),
            reference: node.syntax.to_string(),
        };
        match node.resolved() {
            BoundTypeReference::Primitive(primitive) => Ok(Some(TypeReference::Primitive(*primitive))),
            BoundTypeReference::Local(name) => match self.schema.type_named(&name.name) {
                Some(_) => Ok(Some(TypeReference::Named(name.clone()))),
                None => Err(unresolved()),
            },
            BoundTypeReference::Imported { import, name } => {
                let Some(imported) = self.imports.get(&import.name) else {
                    return Ok(None);
                };
                if imported.type_named(name).is_none() {
                    return Err(unresolved());
                }
                Ok(Some(TypeReference::Named(QualifiedName::new(
                    import.name.clone(),
                    name.clone(),
                ))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::diagnostics::{Diagnostic, DiagnosticCode, Reporter, Severity};
    use crate::loader::{Loader, LoaderOptions};
    use crate::names::{AttributeName, SchemaIdentifier, TypeName};
    use crate::schema::{Cardinality, PrimitiveType, Schema, TypeReference};
    use crate::source::MemorySource;

    fn id(s: &str) -> SchemaIdentifier {
        s.parse().unwrap()
    }

    fn document(name: &str, version: (u32, u32), body: &str) -> String {
        format!(
            r#"<Schema xmlns="urn:docmeta:schema:1" name="{name}" versionMajor="{}" versionMinor="{}">{body}</Schema>"#,
            version.0, version.1
        )
    }

    fn base_source() -> MemorySource {
        MemorySource::new().with(
            id("Base:2.0"),
            document(
                "Base",
                (2, 0),
                r#"<Type name="Key"><TypeReferencePrimitive type="UUID"/></Type>"#,
            ),
        )
    }

    fn compile(source: &MemorySource, text: &str) -> (Option<Arc<Schema>>, Vec<Diagnostic>) {
        let mut loader = Loader::new(source, LoaderOptions::default());
        let mut diagnostics = Vec::new();
        let schema = loader.compile_document(
            "root.xml",
            text.as_bytes(),
            &mut Reporter::new(&mut diagnostics),
        );
        (schema, diagnostics)
    }

    #[test]
    fn types_everything() {
        let source = base_source();
        let (schema, diagnostics) = compile(
            &source,
            &document(
                "Core",
                (1, 0),
                r#"<Import name="Base" versionMajor="2" versionMinor="0"/>
<Type name="Title"><TypeReferencePrimitive type="STRING"/></Type>
<Type name="Id"><TypeReferenceNamed schema="Base" name="Key"/></Type>
<Attribute name="title" cardinality="1"><TypeReferenceNamed name="Title"/></Attribute>
<Attribute name="ids" cardinality="0..N"><TypeReferenceNamed schema="Core" name="Id"/></Attribute>"#,
            ),
        );
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        let schema = schema.unwrap();

        assert_eq!(schema.identifier(), &id("Core:1.0"));
        assert_eq!(schema.imports(), &[id("Base:2.0")]);
        assert_eq!(
            schema.type_named(&TypeName::new("Title").unwrap()).unwrap().base,
            TypeReference::Primitive(PrimitiveType::String)
        );
        assert_eq!(
            schema.type_named(&TypeName::new("Id").unwrap()).unwrap().base,
            TypeReference::Named("Base.Key".parse().unwrap())
        );

        let title = schema
            .attribute_named(&AttributeName::new("title").unwrap())
            .unwrap();
        assert_eq!(title.cardinality, Cardinality::ExactlyOne);
        assert_eq!(title.type_reference.to_string(), "Core.Title");

        let ids = schema
            .attribute_named(&AttributeName::new("ids").unwrap())
            .unwrap();
        assert_eq!(ids.cardinality, Cardinality::ZeroOrMany);
    }

    #[test]
    fn missing_imported_type_is_internal() {
        let source = base_source();
        let (schema, diagnostics) = compile(
            &source,
            &document(
                "Core",
                (1, 0),
                r#"<Import name="Base" versionMajor="2" versionMinor="0"/>
<Type name="Id"><TypeReferenceNamed schema="Base" name="Lock"/></Type>"#,
            ),
        );
        assert!(schema.is_none());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, DiagnosticCode::Internal);
        assert_eq!(diagnostics[0].severity, Severity::Critical);
    }

    #[test]
    fn failed_import_fails_closed() {
        let source = MemorySource::new();
        let (schema, diagnostics) = compile(
            &source,
            &document(
                "Core",
                (1, 0),
                r#"
<Import name="Base" versionMajor="2" versionMinor="0"/>
<Type name="Id"><TypeReferenceNamed schema="Base" name="Key"/></Type>"#,
            ),
        );
        assert!(schema.is_none());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, DiagnosticCode::LoadSource);
        assert_eq!(diagnostics[0].position.line, 2);
    }

    #[test]
    fn warnings_do_not_fail() {
        let source = MemorySource::new();
        let (schema, diagnostics) = compile(
            &source,
            r#"<Schema xmlns="urn:docmeta:schema:1" xmlns:x="urn:x" x:note="n" name="Core" versionMajor="1" versionMinor="0"/>"#,
        );
        assert!(schema.is_some());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, Severity::Warning);
    }
}
