use std::io;

use thiserror::Error;

use crate::ast::DeclarationCounts;
use crate::diagnostics::{Diagnose, Diagnostic, DiagnosticCode, LexicalPosition, Severity};
use crate::names::{
    AttributeName, QualifiedAttributeName, QualifiedTypeName, SchemaIdentifier, SchemaName,
    TypeName,
};
use crate::schema::{Cardinality, PrimitiveType};

fn display_path(path: &[SchemaIdentifier]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn display_requirer(required_by: &Option<SchemaIdentifier>) -> String {
    match required_by {
        Some(id) => id.to_string(),
        None => "the document".into(),
    }
}

/// An illegal tree shape.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("a {kind} cannot be a schema declaration")]
    IllegalDeclaration {
        kind: &'static str,
        position: LexicalPosition,
    },
    #[error("type {name} is declared more than once")]
    DuplicateType {
        name: TypeName,
        position: LexicalPosition,
    },
    #[error("attribute {name} is declared more than once")]
    DuplicateAttribute {
        name: AttributeName,
        position: LexicalPosition,
    },
    #[error("schema {name} is imported more than once")]
    DuplicateImport {
        name: SchemaName,
        position: LexicalPosition,
    },
}

impl StructuralError {
    pub fn position(&self) -> &LexicalPosition {
        match self {
            StructuralError::IllegalDeclaration { position, .. }
            | StructuralError::DuplicateType { position, .. }
            | StructuralError::DuplicateAttribute { position, .. }
            | StructuralError::DuplicateImport { position, .. } => position,
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed XML: {message}")]
    MalformedXml {
        message: String,
        position: LexicalPosition,
    },
    #[error("failed to read the schema source: {source}")]
    Io {
        #[source]
        source: io::Error,
        position: LexicalPosition,
    },
    #[error("the XML parser cannot be used: {message}")]
    BrokenParserConfig {
        message: String,
        position: LexicalPosition,
    },
    #[error("invalid schema: {message}")]
    InvalidData {
        message: String,
        position: LexicalPosition,
    },
}

impl Diagnose for ParseError {
    fn diagnostic(&self) -> Diagnostic {
        let (code, position) = match self {
            ParseError::MalformedXml { position, .. } => (DiagnosticCode::ParseMalformedXml, position),
            ParseError::Io { position, .. } => (DiagnosticCode::ParseIo, position),
            ParseError::BrokenParserConfig { position, .. } => {
                (DiagnosticCode::ParseBrokenConfig, position)
            }
            ParseError::InvalidData { position, .. } => (DiagnosticCode::ParseInvalidData, position),
        };
        Diagnostic::error(code, self.to_string()).at(position.clone())
    }
}

impl From<StructuralError> for ParseError {
    fn from(error: StructuralError) -> Self {
        ParseError::InvalidData {
            position: error.position().clone(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BindError {
    #[error("type {name} is not declared in schema {schema}")]
    TypeUnbound {
        schema: SchemaName,
        name: TypeName,
        position: LexicalPosition,
    },
    #[error("schema {schema} does not import a schema named {qualifier}")]
    ImportUnbound {
        schema: SchemaName,
        qualifier: SchemaName,
        position: LexicalPosition,
    },
    #[error("schema {schema} imports itself")]
    ImportSelf {
        schema: SchemaName,
        position: LexicalPosition,
    },
    #[error("type {name} is defined in terms of itself ({cycle})")]
    TypeCyclic {
        name: QualifiedTypeName,
        cycle: String,
        position: LexicalPosition,
    },
}

impl Diagnose for BindError {
    fn diagnostic(&self) -> Diagnostic {
        let (code, position) = match self {
            BindError::TypeUnbound { position, .. } => (DiagnosticCode::BindTypeUnbound, position),
            BindError::ImportUnbound { position, .. } => {
                (DiagnosticCode::BindImportUnbound, position)
            }
            BindError::ImportSelf { position, .. } => (DiagnosticCode::BindImportSelf, position),
            BindError::TypeCyclic { position, .. } => (DiagnosticCode::BindTypeCyclic, position),
        };
        Diagnostic::error(code, self.to_string()).at(position.clone())
    }
}

/// Failure of a [`SchemaSource`](crate::source::SchemaSource) to open a schema.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no schema source provides it")]
    NotFound,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error(
        "importing {target} from {requester} closes the import cycle {}",
        display_path(.path)
    )]
    CyclicImport {
        requester: SchemaIdentifier,
        target: SchemaIdentifier,
        /// The shortest path from `target` back to `requester`.
        path: Vec<SchemaIdentifier>,
    },
    #[error("schema {id} could not be opened: {source}")]
    Source {
        id: SchemaIdentifier,
        #[source]
        source: SourceError,
    },
    #[error("schema {id} failed to compile")]
    CompilationFailed { id: SchemaIdentifier },
    #[error("importing {id} exceeds the maximum import depth of {limit}")]
    ImportDepthExceeded { id: SchemaIdentifier, limit: usize },
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl Diagnose for LoaderError {
    fn diagnostic(&self) -> Diagnostic {
        match self {
            LoaderError::CyclicImport {
                requester,
                target,
                path,
            } => Diagnostic::error(DiagnosticCode::LoadCyclicImport, self.to_string())
                .with("requester", requester)
                .with("target", target)
                .with("path", display_path(path)),
            LoaderError::Source { id, .. } => {
                Diagnostic::error(DiagnosticCode::LoadSource, self.to_string()).with("schema", id)
            }
            LoaderError::CompilationFailed { id } => {
                Diagnostic::error(DiagnosticCode::LoadCompilationFailed, self.to_string())
                    .with("schema", id)
            }
            LoaderError::ImportDepthExceeded { id, limit } => {
                Diagnostic::error(DiagnosticCode::LoadDepthExceeded, self.to_string())
                    .with("schema", id)
                    .with("limit", limit)
            }
            LoaderError::Internal(e) => e.diagnostic(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error(
        "{} requires {requested}, but {existing} is already part of the resolution",
        display_requirer(.required_by)
    )]
    VersionConflict {
        existing: SchemaIdentifier,
        requested: SchemaIdentifier,
        required_by: Option<SchemaIdentifier>,
    },
    #[error("circular import {}", display_path(.path))]
    CircularImport { path: Vec<SchemaIdentifier> },
    #[error("schema {id} was not found")]
    SchemaNotFound { id: SchemaIdentifier },
    #[error("the schema directory failed to provide {id}: {message}")]
    SchemaDirectoryFailed { id: SchemaIdentifier, message: String },
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl Diagnose for ResolverError {
    fn diagnostic(&self) -> Diagnostic {
        match self {
            ResolverError::VersionConflict {
                existing,
                requested,
                ..
            } => Diagnostic::error(DiagnosticCode::ResolveVersionConflict, self.to_string())
                .with("existing", existing)
                .with("requested", requested),
            ResolverError::CircularImport { path } => {
                Diagnostic::error(DiagnosticCode::ResolveCircularImport, self.to_string())
                    .with("path", display_path(path))
            }
            ResolverError::SchemaNotFound { id } => {
                Diagnostic::error(DiagnosticCode::ResolveSchemaNotFound, self.to_string())
                    .with("schema", id)
            }
            ResolverError::SchemaDirectoryFailed { id, .. } => {
                Diagnostic::error(DiagnosticCode::ResolveDirectoryFailed, self.to_string())
                    .with("schema", id)
            }
            ResolverError::Internal(e) => e.diagnostic(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("attribute {name}: its schema is not imported")]
    SchemaNotImported { name: QualifiedAttributeName },
    #[error("attribute {name}: schema {id} is not part of the resolved schemas")]
    SchemaNotFound {
        name: QualifiedAttributeName,
        id: SchemaIdentifier,
    },
    #[error("attribute {name}: schema {id} declares no such attribute")]
    SchemaAttributeNotFound {
        name: QualifiedAttributeName,
        id: SchemaIdentifier,
    },
    #[error("attribute {name} occurs {count} times but its cardinality is {cardinality}")]
    CardinalityViolation {
        name: QualifiedAttributeName,
        cardinality: Cardinality,
        count: usize,
    },
    #[error("attribute {name}: {value:?} is not a valid {primitive} value")]
    AttributeValueInvalid {
        name: QualifiedAttributeName,
        primitive: PrimitiveType,
        value: String,
    },
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl ValidationError {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            ValidationError::SchemaNotImported { .. } => DiagnosticCode::ValidateSchemaNotImported,
            ValidationError::SchemaNotFound { .. } => DiagnosticCode::ValidateSchemaNotFound,
            ValidationError::SchemaAttributeNotFound { .. } => {
                DiagnosticCode::ValidateAttributeNotFound
            }
            ValidationError::CardinalityViolation { .. } => DiagnosticCode::ValidateCardinality,
            ValidationError::AttributeValueInvalid { .. } => DiagnosticCode::ValidateValueInvalid,
            ValidationError::Internal(_) => DiagnosticCode::Internal,
        }
    }
}

impl Diagnose for ValidationError {
    fn diagnostic(&self) -> Diagnostic {
        let name = match self {
            ValidationError::SchemaNotImported { name }
            | ValidationError::SchemaNotFound { name, .. }
            | ValidationError::SchemaAttributeNotFound { name, .. }
            | ValidationError::CardinalityViolation { name, .. }
            | ValidationError::AttributeValueInvalid { name, .. } => name,
            ValidationError::Internal(e) => return e.diagnostic(),
        };
        Diagnostic::error(self.code(), self.to_string()).with("attribute", name)
    }
}

/// A violated internal invariant. These indicate a defect rather than bad input; the stage that
/// detects one reports it with [`Severity::Critical`] and produces no result.
#[derive(Debug, Error)]
pub enum InternalError {
    #[error("binding changed the declarations of {schema} from ({before}) to ({after})")]
    BinderCountMismatch {
        schema: SchemaIdentifier,
        before: DeclarationCounts,
        after: DeclarationCounts,
    },
    #[error("type reference {reference} in {schema} does not resolve")]
    UnresolvedTypeReference {
        schema: SchemaIdentifier,
        reference: String,
    },
    #[error("compiling {expected} produced {found}")]
    IdentifierMismatch {
        expected: SchemaIdentifier,
        found: SchemaIdentifier,
    },
    #[error("{kind} {name} occurs more than once in the resolved schemas")]
    DuplicateQualifiedName { kind: &'static str, name: String },
    #[error("attribute {attribute} has the unknown cardinality {token:?}")]
    UnknownCardinality {
        attribute: QualifiedAttributeName,
        token: String,
    },
    #[error("malformed bound tree: {0}")]
    Structural(#[from] StructuralError),
}

impl Diagnose for InternalError {
    fn diagnostic(&self) -> Diagnostic {
        Diagnostic::new(DiagnosticCode::Internal, Severity::Critical, self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> SchemaIdentifier {
        s.parse().unwrap()
    }

    #[test]
    fn cyclic_import_lists_the_path() {
        let error = LoaderError::CyclicImport {
            requester: id("B:1.0"),
            target: id("A:1.0"),
            path: vec![id("A:1.0"), id("B:1.0")],
        };
        let diagnostic = error.diagnostic();
        assert_eq!(diagnostic.code, DiagnosticCode::LoadCyclicImport);
        assert_eq!(diagnostic.attributes["path"], "A:1.0 -> B:1.0");
        assert!(diagnostic.message.contains("A:1.0 -> B:1.0"));
    }

    #[test]
    fn internal_errors_are_critical() {
        let error = LoaderError::from(InternalError::IdentifierMismatch {
            expected: id("A:1.0"),
            found: id("A:2.0"),
        });
        let diagnostic = error.diagnostic();
        assert_eq!(diagnostic.code, DiagnosticCode::Internal);
        assert_eq!(diagnostic.severity, Severity::Critical);
    }

    #[test]
    fn version_conflict_names_the_requirer() {
        let error = ResolverError::VersionConflict {
            existing: id("X:1.0"),
            requested: id("X:2.0"),
            required_by: Some(id("Y:1.0")),
        };
        assert_eq!(
            error.to_string(),
            "Y:1.0 requires X:2.0, but X:1.0 is already part of the resolution"
        );
    }
}
