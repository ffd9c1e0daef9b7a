//! Compilation sessions.
//!
//! A [`Loader`] compiles schemas (parse, bind, type) and caches the results by identifier. All
//! imports compiled during one session share a single import graph, so import cycles are found
//! no matter through which schemas they run.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::Arc;

use crate::ast::{Parsed, SchemaNode};
use crate::binder;
use crate::diagnostics::Reporter;
use crate::error::{InternalError, LoaderError};
use crate::graph::{CycleRejected, ImportGraph};
use crate::names::SchemaIdentifier;
use crate::parser::{Parser, ParserOptions};
use crate::schema::Schema;
use crate::source::SchemaSource;
use crate::typer::{self, TypingFailure};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LoaderOptions {
    pub parser: ParserOptions,
    /// How many levels of imports below a root schema are followed.
    pub max_import_depth: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            parser: ParserOptions::default(),
            max_import_depth: 128,
        }
    }
}

/// One compilation session. Not shareable between threads; use one loader per run.
pub struct Loader<'s> {
    source: &'s dyn SchemaSource,
    parser: Parser,
    options: LoaderOptions,
    cache: HashMap<SchemaIdentifier, Arc<Schema>>,
    /// Schemas that failed to compile only because one of their imports failed.
    failed_by_import: HashSet<SchemaIdentifier>,
    graph: ImportGraph,
    depth: usize,
    compilations: usize,
}

impl<'s> Loader<'s> {
    pub fn new(source: &'s dyn SchemaSource, options: LoaderOptions) -> Self {
        Self {
            source,
            parser: Parser::new(options.parser),
            options,
            cache: HashMap::new(),
            failed_by_import: HashSet::new(),
            graph: ImportGraph::new(),
            depth: 0,
            compilations: 0,
        }
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    pub fn cached(&self, id: &SchemaIdentifier) -> Option<&Arc<Schema>> {
        self.cache.get(id)
    }

    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    pub fn graph(&self) -> &ImportGraph {
        &self.graph
    }

    /// Whether the last compilation of `id` failed only because of its imports.
    pub(crate) fn failed_by_import(&self, id: &SchemaIdentifier) -> bool {
        self.failed_by_import.contains(id)
    }

    /// Number of schema sources compiled so far, successful or not.
    pub fn compilations(&self) -> usize {
        self.compilations
    }

    /// Loads `target` as an import of `requester`.
    ///
    /// Cached schemas are returned as they are. Otherwise the import is recorded in the session's
    /// import graph, which fails if it would close a cycle, and `target` is opened and compiled.
    /// The imports of `target` are loaded recursively through this loader.
    pub fn load(
        &mut self,
        requester: &SchemaIdentifier,
        target: &SchemaIdentifier,
        reporter: &mut Reporter,
    ) -> Result<Arc<Schema>, LoaderError> {
        if let Some(schema) = self.cache.get(target) {
            tracing::trace!(schema = %target, "cache hit");
            return Ok(Arc::clone(schema));
        }
        if self.depth > self.options.max_import_depth {
            return Err(LoaderError::ImportDepthExceeded {
                id: target.clone(),
                limit: self.options.max_import_depth,
            });
        }
        self.graph
            .add_edge(requester, target)
            .map_err(|CycleRejected { path }| LoaderError::CyclicImport {
                requester: requester.clone(),
                target: target.clone(),
                path,
            })?;
        self.fetch(target, reporter)
    }

    /// Loads a schema that is not imported by anything.
    pub fn load_root(
        &mut self,
        target: &SchemaIdentifier,
        reporter: &mut Reporter,
    ) -> Result<Arc<Schema>, LoaderError> {
        if let Some(schema) = self.cache.get(target) {
            return Ok(Arc::clone(schema));
        }
        self.graph.add_vertex(target);
        self.fetch(target, reporter)
    }

    /// Compiles a schema document that the source does not provide, typically the one a user
    /// is working on. Its imports are loaded from the source. Internal errors are reported.
    pub fn compile_document(
        &mut self,
        uri: &str,
        document: &[u8],
        reporter: &mut Reporter,
    ) -> Option<Arc<Schema>> {
        match self.compile(document, uri, None, reporter) {
            Ok(schema) => schema,
            Err(e) => {
                reporter.report_error(&e);
                None
            }
        }
    }

    fn fetch(
        &mut self,
        target: &SchemaIdentifier,
        reporter: &mut Reporter,
    ) -> Result<Arc<Schema>, LoaderError> {
        let opened = self.source.open(target).map_err(|source| LoaderError::Source {
            id: target.clone(),
            source,
        })?;
        self.compile(opened.reader, &opened.uri, Some(target), reporter)?
            .ok_or_else(|| LoaderError::CompilationFailed { id: target.clone() })
    }

    fn compile(
        &mut self,
        reader: impl Read,
        uri: &str,
        expected: Option<&SchemaIdentifier>,
        reporter: &mut Reporter,
    ) -> Result<Option<Arc<Schema>>, InternalError> {
        self.compilations += 1;
        let Some(parsed) = self.parser.parse_reader(reader, uri, reporter) else {
            return Ok(None);
        };

        let id = SchemaIdentifier::new(parsed.name().clone(), parsed.version().clone());
        match expected {
            Some(expected) if expected != &id => {
                return Err(InternalError::IdentifierMismatch {
                    expected: expected.clone(),
                    found: id,
                });
            }
            Some(_) => {}
            None => {
                if let Some(cached) = self.cache.get(&id) {
                    tracing::warn!(
                        schema = %id,
                        uri,
                        "schema already compiled in this session, keeping the cached one"
                    );
                    return Ok(Some(Arc::clone(cached)));
                }
                self.graph.add_vertex(&id);
            }
        }
        tracing::debug!(schema = %id, uri, depth = self.depth, "compiling");

        let Some(schema) = self.bind_and_type(&id, &parsed, reporter)? else {
            return Ok(None);
        };
        let schema = Arc::new(schema);
        self.cache.insert(id, Arc::clone(&schema));
        Ok(Some(schema))
    }

    fn bind_and_type(
        &mut self,
        id: &SchemaIdentifier,
        parsed: &SchemaNode<Parsed>,
        reporter: &mut Reporter,
    ) -> Result<Option<Schema>, InternalError> {
        let Some(bound) = binder::bind(parsed, reporter) else {
            return Ok(None);
        };
        if bound.counts() != parsed.counts() {
            return Err(InternalError::BinderCountMismatch {
                schema: id.clone(),
                before: parsed.counts(),
                after: bound.counts(),
            });
        }

        self.depth += 1;
        let typed = typer::type_schema(&bound, self, reporter);
        self.depth -= 1;
        match typed {
            Ok(schema) => {
                self.failed_by_import.remove(id);
                Ok(Some(schema))
            }
            Err(TypingFailure::Imports) => {
                self.failed_by_import.insert(id.clone());
                Ok(None)
            }
            Err(TypingFailure::Schema) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{Diagnostic, DiagnosticCode};
    use crate::source::MemorySource;

    fn id(s: &str) -> SchemaIdentifier {
        s.parse().unwrap()
    }

    fn schema_document(id: &SchemaIdentifier, imports: &[&str]) -> String {
        let imports: String = imports
            .iter()
            .map(|i| {
                let import = self::id(i);
                format!(
                    r#"<Import name="{}" versionMajor="{}" versionMinor="{}"/>"#,
                    import.name, import.version.major, import.version.minor
                )
            })
            .collect();
        format!(
            r#"<Schema xmlns="urn:docmeta:schema:1" name="{}" versionMajor="{}" versionMinor="{}">{imports}</Schema>"#,
            id.name, id.version.major, id.version.minor
        )
    }

    fn source(schemas: &[(&str, &[&str])]) -> MemorySource {
        let mut source = MemorySource::new();
        for (name, imports) in schemas {
            let id = id(name);
            let document = schema_document(&id, imports);
            source.insert(id, document);
        }
        source
    }

    fn codes(diagnostics: &[Diagnostic]) -> Vec<DiagnosticCode> {
        diagnostics.iter().map(|d| d.code).collect()
    }

    #[test]
    fn loading_caches_the_whole_chain() {
        let source = source(&[("A:1.0", &["B:1.0"]), ("B:1.0", &["C:1.0"]), ("C:1.0", &[])]);
        let mut loader = Loader::new(&source, LoaderOptions::default());
        let mut diagnostics = Vec::new();
        let mut reporter = Reporter::new(&mut diagnostics);

        let b = loader.load(&id("A:1.0"), &id("B:1.0"), &mut reporter).unwrap();
        assert!(loader.cached(&id("B:1.0")).is_some());
        assert!(loader.cached(&id("C:1.0")).is_some());
        assert_eq!(loader.compilations(), 2);

        let again = loader.load(&id("A:1.0"), &id("B:1.0"), &mut reporter).unwrap();
        assert!(Arc::ptr_eq(&b, &again));
        assert_eq!(loader.compilations(), 2);
        assert!(!reporter.has_errors());
    }

    #[test]
    fn cycles_are_rejected_without_damage() {
        let source = source(&[("A:1.0", &[]), ("B:1.0", &[]), ("C:1.0", &[])]);
        let mut loader = Loader::new(&source, LoaderOptions::default());
        let mut diagnostics = Vec::new();
        let mut reporter = Reporter::new(&mut diagnostics);

        loader.load(&id("A:1.0"), &id("B:1.0"), &mut reporter).unwrap();
        let before = loader.graph().clone();

        // A is not cached, so the edge has to be checked.
        let error = loader
            .load(&id("B:1.0"), &id("A:1.0"), &mut reporter)
            .unwrap_err();
        match error {
            LoaderError::CyclicImport { path, .. } => {
                assert_eq!(path, vec![id("A:1.0"), id("B:1.0")])
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(loader.graph(), &before);

        loader.load(&id("A:1.0"), &id("C:1.0"), &mut reporter).unwrap();
        assert!(loader.graph().contains_edge(&id("A:1.0"), &id("C:1.0")));
    }

    #[test]
    fn import_cycle_between_sources() {
        let source = source(&[("A:1.0", &["B:1.0"]), ("B:1.0", &["A:1.0"])]);
        let mut loader = Loader::new(&source, LoaderOptions::default());
        let mut diagnostics = Vec::new();
        let result = loader.load_root(&id("A:1.0"), &mut Reporter::new(&mut diagnostics));

        assert!(matches!(result, Err(LoaderError::CompilationFailed { .. })));
        assert_eq!(
            codes(&diagnostics),
            vec![DiagnosticCode::LoadCyclicImport]
        );
        assert!(loader.cached(&id("A:1.0")).is_none());
        assert!(loader.cached(&id("B:1.0")).is_none());
    }

    #[test]
    fn missing_source() {
        let source = MemorySource::new();
        let mut loader = Loader::new(&source, LoaderOptions::default());
        let mut diagnostics = Vec::new();
        let error = loader
            .load_root(&id("A:1.0"), &mut Reporter::new(&mut diagnostics))
            .unwrap_err();
        assert!(matches!(error, LoaderError::Source { .. }));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn mismatched_identifier_is_internal() {
        let mut source = MemorySource::new();
        source.insert(id("A:1.0"), schema_document(&id("A:1.1"), &[]));
        let mut loader = Loader::new(&source, LoaderOptions::default());
        let mut diagnostics = Vec::new();
        let error = loader
            .load_root(&id("A:1.0"), &mut Reporter::new(&mut diagnostics))
            .unwrap_err();
        assert!(matches!(
            error,
            LoaderError::Internal(InternalError::IdentifierMismatch { .. })
        ));
    }

    #[test]
    fn deep_chains_load() {
        let names: Vec<String> = (0..40).map(|i| format!("S{i}:1.0")).collect();
        let mut source = MemorySource::new();
        for (i, name) in names.iter().enumerate() {
            let imports: Vec<&str> = names.get(i + 1).map(String::as_str).into_iter().collect();
            source.insert(id(name), schema_document(&id(name), &imports));
        }
        let mut loader = Loader::new(&source, LoaderOptions::default());
        let mut diagnostics = Vec::new();
        loader
            .load_root(&id("S0:1.0"), &mut Reporter::new(&mut diagnostics))
            .unwrap();
        assert_eq!(loader.cache_size(), 40);
        assert_eq!(loader.graph().edge_count(), 39);
    }

    #[test]
    fn import_depth_is_limited() {
        let source = source(&[
            ("A:1.0", &["B:1.0"]),
            ("B:1.0", &["C:1.0"]),
            ("C:1.0", &["D:1.0"]),
            ("D:1.0", &[]),
        ]);
        let options = LoaderOptions {
            max_import_depth: 2,
            ..LoaderOptions::default()
        };
        let mut loader = Loader::new(&source, options);
        let mut diagnostics = Vec::new();
        assert!(loader
            .load_root(&id("A:1.0"), &mut Reporter::new(&mut diagnostics))
            .is_err());
        assert_eq!(codes(&diagnostics), vec![DiagnosticCode::LoadDepthExceeded]);
        assert!(loader.cached(&id("D:1.0")).is_none());
    }

    #[test]
    fn broken_import_is_reported_once_up_the_chain() {
        let mut source = source(&[("A:1.0", &["B:1.0"]), ("B:1.0", &["C:1.0"])]);
        source.insert(id("C:1.0"), "<Schema");
        let mut loader = Loader::new(&source, LoaderOptions::default());
        let mut diagnostics = Vec::new();
        assert!(loader
            .load_root(&id("A:1.0"), &mut Reporter::new(&mut diagnostics))
            .is_err());
        assert_eq!(
            codes(&diagnostics),
            vec![
                DiagnosticCode::ParseMalformedXml,
                DiagnosticCode::LoadCompilationFailed
            ]
        );
        assert_eq!(diagnostics[1].attributes["schema"], "C:1.0");
    }

    #[test]
    fn compile_document_keeps_the_cached_schema() {
        let core = |type_name: &str| {
            format!(
                r#"<Schema xmlns="urn:docmeta:schema:1" name="Core" versionMajor="1" versionMinor="0"><Type name="{type_name}"><TypeReferencePrimitive type="STRING"/></Type></Schema>"#
            )
        };
        let source = MemorySource::new().with(id("Core:1.0"), core("A"));
        let mut loader = Loader::new(&source, LoaderOptions::default());
        let mut diagnostics = Vec::new();
        let mut reporter = Reporter::new(&mut diagnostics);

        let first = loader.load_root(&id("Core:1.0"), &mut reporter).unwrap();
        let second = loader
            .compile_document("draft.xml", core("B").as_bytes(), &mut reporter)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, loader.cached(&id("Core:1.0")).unwrap()));
        let types: Vec<_> = second.types().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(types, ["A"]);
        drop(reporter);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
    }

    #[test]
    fn compile_document_serves_the_root() {
        let source = source(&[("Base:1.0", &[])]);
        let mut loader = Loader::new(&source, LoaderOptions::default());
        let mut diagnostics = Vec::new();
        let root = loader
            .compile_document(
                "draft.xml",
                schema_document(&id("Draft:0.1"), &["Base:1.0"]).as_bytes(),
                &mut Reporter::new(&mut diagnostics),
            )
            .unwrap();
        assert_eq!(root.identifier(), &id("Draft:0.1"));
        assert!(loader.cached(&id("Draft:0.1")).is_some());
        assert!(loader.graph().contains_edge(&id("Draft:0.1"), &id("Base:1.0")));
        assert_eq!(loader.compilations(), 2);
    }
}
