//! Computes the closure of schemas a document needs.
//!
//! A document names the schemas it uses in an [`ImportTable`]. The [`Resolver`] walks those
//! schemas and everything they import through a [`SchemaDirectory`], and checks that the result
//! is consistent: one version per schema name, no import cycles, no ambiguous qualified names.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::diagnostics::Reporter;
use crate::error::{InternalError, LoaderError, ResolverError, SourceError};
use crate::graph::{CycleRejected, ImportGraph};
use crate::loader::Loader;
use crate::names::{QualifiedTypeName, SchemaIdentifier, SchemaName};
use crate::schema::{PrimitiveType, Schema, TypeReference};

/// The schemas a document uses, by the local name it refers to them with.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportTable {
    entries: BTreeMap<SchemaName, SchemaIdentifier>,
}

impl ImportTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, returning the identifier previously bound to `local`, if any.
    pub fn insert(&mut self, local: SchemaName, id: SchemaIdentifier) -> Option<SchemaIdentifier> {
        self.entries.insert(local, id)
    }

    pub fn with(mut self, local: SchemaName, id: SchemaIdentifier) -> Self {
        self.insert(local, id);
        self
    }

    pub fn get(&self, local: &SchemaName) -> Option<&SchemaIdentifier> {
        self.entries.get(local)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SchemaName, &SchemaIdentifier)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(SchemaName, SchemaIdentifier)> for ImportTable {
    fn from_iter<T: IntoIterator<Item = (SchemaName, SchemaIdentifier)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Supplies compiled schemas to the resolver.
pub trait SchemaDirectory {
    fn find(
        &mut self,
        id: &SchemaIdentifier,
        reporter: &mut Reporter,
    ) -> Result<Arc<Schema>, ResolverError>;
}

impl SchemaDirectory for Loader<'_> {
    fn find(
        &mut self,
        id: &SchemaIdentifier,
        reporter: &mut Reporter,
    ) -> Result<Arc<Schema>, ResolverError> {
        self.load_root(id, reporter).map_err(|e| match e {
            LoaderError::Source {
                source: SourceError::NotFound,
                ..
            } => ResolverError::SchemaNotFound { id: id.clone() },
            LoaderError::Internal(e) => ResolverError::Internal(e),
            e => ResolverError::SchemaDirectoryFailed {
                id: id.clone(),
                message: e.to_string(),
            },
        })
    }
}

/// Already compiled schemas held in memory.
#[derive(Clone, Debug, Default)]
pub struct SchemaCatalog {
    schemas: BTreeMap<SchemaIdentifier, Arc<Schema>>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, schema: impl Into<Arc<Schema>>) {
        let schema = schema.into();
        self.schemas.insert(schema.identifier().clone(), schema);
    }

    pub fn with(mut self, schema: impl Into<Arc<Schema>>) -> Self {
        self.insert(schema);
        self
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

impl SchemaDirectory for SchemaCatalog {
    fn find(
        &mut self,
        id: &SchemaIdentifier,
        _reporter: &mut Reporter,
    ) -> Result<Arc<Schema>, ResolverError> {
        self.schemas
            .get(id)
            .cloned()
            .ok_or_else(|| ResolverError::SchemaNotFound { id: id.clone() })
    }
}

/// A consistent closure of schemas.
#[derive(Clone, Debug)]
pub struct ResolvedSet {
    graph: ImportGraph,
    schemas: BTreeMap<SchemaName, Arc<Schema>>,
    types: BTreeMap<QualifiedTypeName, TypeReference>,
}

impl ResolvedSet {
    /// Indexes `schemas`. Schema names and qualified type names must be unique.
    pub fn new(
        graph: ImportGraph,
        schemas: impl IntoIterator<Item = Arc<Schema>>,
    ) -> Result<Self, InternalError> {
        let mut by_name = BTreeMap::new();
        let mut types = BTreeMap::new();
        for schema in schemas {
            let name = &schema.identifier().name;
            for declaration in schema.types() {
                let qualified = QualifiedTypeName::new(name.clone(), declaration.name.clone());
                if types.contains_key(&qualified) {
                    return Err(InternalError::DuplicateQualifiedName {
                        kind: "type",
                        name: qualified.to_string(),
                    });
                }
                types.insert(qualified, declaration.base.clone());
            }
            if by_name.contains_key(name) {
                return Err(InternalError::DuplicateQualifiedName {
                    kind: "schema",
                    name: name.to_string(),
                });
            }
            by_name.insert(name.clone(), schema);
        }
        Ok(Self {
            graph,
            schemas: by_name,
            types,
        })
    }

    pub fn graph(&self) -> &ImportGraph {
        &self.graph
    }

    /// The schema with exactly this identifier.
    pub fn schema(&self, id: &SchemaIdentifier) -> Option<&Arc<Schema>> {
        self.schemas
            .get(&id.name)
            .filter(|schema| schema.identifier() == id)
    }

    pub fn schema_named(&self, name: &SchemaName) -> Option<&Arc<Schema>> {
        self.schemas.get(name)
    }

    /// The base of the type `name`.
    pub fn type_named(&self, name: &QualifiedTypeName) -> Option<&TypeReference> {
        self.types.get(name)
    }

    /// Follows named types down to their primitive type. `None` if a type on the way is not part
    /// of the set.
    pub fn primitive_of(&self, reference: &TypeReference) -> Option<PrimitiveType> {
        let mut current = reference;
        // Each hop visits a distinct type unless the bases are cyclic.
        for _ in 0..=self.types.len() {
            match current {
                TypeReference::Primitive(primitive) => return Some(*primitive),
                TypeReference::Named(name) => current = self.types.get(name)?,
            }
        }
        None
    }

    pub fn schemas(&self) -> impl Iterator<Item = &Arc<Schema>> {
        self.schemas.values()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// One resolution run over a directory.
pub struct Resolver<'d> {
    directory: &'d mut dyn SchemaDirectory,
}

struct Walk {
    graph: ImportGraph,
    versions: BTreeMap<SchemaName, SchemaIdentifier>,
    schemas: BTreeMap<SchemaIdentifier, Arc<Schema>>,
    visited: BTreeSet<SchemaIdentifier>,
    failed: bool,
}

impl Walk {
    fn fail(&mut self, reporter: &mut Reporter, error: ResolverError) {
        self.failed = true;
        reporter.report_error(&error);
    }
}

impl<'d> Resolver<'d> {
    pub fn new(directory: &'d mut dyn SchemaDirectory) -> Self {
        Self { directory }
    }

    /// Resolves the closure of `imports`. Every problem found on the way is reported; if there
    /// was any, no set is returned.
    pub fn resolve(&mut self, imports: &ImportTable, reporter: &mut Reporter) -> Option<ResolvedSet> {
        let mut walk = Walk {
            graph: ImportGraph::new(),
            versions: BTreeMap::new(),
            schemas: BTreeMap::new(),
            visited: BTreeSet::new(),
            failed: false,
        };
        for (local, id) in imports.iter() {
            tracing::debug!(%local, schema = %id, "resolving import");
            self.visit(&mut walk, id, None, reporter);
        }
        if walk.failed {
            return None;
        }

        match ResolvedSet::new(walk.graph, walk.schemas.into_values()) {
            Ok(set) => {
                tracing::debug!(schemas = set.len(), "resolved");
                Some(set)
            }
            Err(e) => {
                reporter.report_error(&ResolverError::from(e));
                None
            }
        }
    }

    fn visit(
        &mut self,
        walk: &mut Walk,
        id: &SchemaIdentifier,
        required_by: Option<&SchemaIdentifier>,
        reporter: &mut Reporter,
    ) {
        if let Some(existing) = walk.versions.get(&id.name) {
            if existing != id {
                let error = ResolverError::VersionConflict {
                    existing: existing.clone(),
                    requested: id.clone(),
                    required_by: required_by.cloned(),
                };
                walk.fail(reporter, error);
                return;
            }
        }

        match required_by {
            Some(requester) => {
                if let Err(CycleRejected { path }) = walk.graph.add_edge(requester, id) {
                    let mut cycle = vec![requester.clone()];
                    cycle.extend(path);
                    walk.fail(reporter, ResolverError::CircularImport { path: cycle });
                    return;
                }
            }
            None => {
                walk.graph.add_vertex(id);
            }
        }

        if !walk.visited.insert(id.clone()) {
            return;
        }
        walk.versions.insert(id.name.clone(), id.clone());

        let schema = match self.directory.find(id, reporter) {
            Ok(schema) => schema,
            Err(e) => {
                walk.fail(reporter, e);
                return;
            }
        };
        walk.schemas.insert(id.clone(), Arc::clone(&schema));
        for import in schema.imports() {
            self.visit(walk, import, Some(id), reporter);
        }
    }
}
