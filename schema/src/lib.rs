pub mod ast;
pub mod binder;
pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod loader;
pub mod names;
pub mod parser;
pub mod resolver;
pub mod schema;
pub mod source;
pub mod typer;
pub mod validator;
pub mod values;

use std::sync::Arc;

pub use diagnostics::{Diagnostic, DiagnosticCode, DiagnosticReceiver, Reporter, Severity};
pub use error::{
    BindError, InternalError, LoaderError, ParseError, ResolverError, SourceError,
    StructuralError, ValidationError,
};
pub use graph::ImportGraph;
pub use loader::{Loader, LoaderOptions};
pub use names::{
    AttributeName, QualifiedAttributeName, QualifiedTypeName, SchemaIdentifier, SchemaName,
    TypeName, Version,
};
pub use parser::{Parser, ParserOptions};
pub use resolver::{ImportTable, ResolvedSet, Resolver, SchemaCatalog, SchemaDirectory};
pub use schema::{Cardinality, PrimitiveType, Schema, TypeReference};
pub use source::{DirectorySource, MemorySource, SchemaSource};
pub use validator::{validate, TypedAttribute, UntypedAttribute, ValidationRequest};
pub use values::TypedValue;

/// Compiles one schema document in a fresh session, loading its imports from `source`.
pub fn compile_schema(
    document: &[u8],
    uri: &str,
    source: &dyn SchemaSource,
    options: LoaderOptions,
    receiver: &mut dyn DiagnosticReceiver,
) -> Option<Arc<Schema>> {
    let mut reporter = Reporter::new(receiver);
    Loader::new(source, options).compile_document(uri, document, &mut reporter)
}

/// Resolves `imports` and validates `attributes` against the result. Returns `None` if the
/// imports could not be resolved.
pub fn validate_document(
    directory: &mut dyn SchemaDirectory,
    imports: &ImportTable,
    attributes: &[UntypedAttribute],
    receiver: &mut dyn DiagnosticReceiver,
) -> Option<Vec<TypedAttribute>> {
    let mut reporter = Reporter::new(receiver);
    let resolved = Resolver::new(directory).resolve(imports, &mut reporter)?;
    let request = ValidationRequest {
        resolved: &resolved,
        imports,
        attributes,
    };
    Some(validate(&request, &mut reporter))
}
