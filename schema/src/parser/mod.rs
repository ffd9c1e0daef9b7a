//! Schema source (XML) to [`Parsed`] tree.
//!
//! Parsing is dispatched on the namespace of the root element: every version of the schema
//! language has its own [`NamespaceHandler`], which checks the document against the bundled schema
//! description of that version and maps it to a tree.

mod v1;

use std::io::Read;

use encoding_rs::UTF_8;
use roxmltree::{Document, Node};

use crate::ast::{Parsed, SchemaNode};
use crate::diagnostics::{Diagnostic, DiagnosticCode, LexicalPosition, Reporter};
use crate::error::ParseError;

pub use v1::{SchemaHandlerV1, NAMESPACE as NAMESPACE_V1};

/// The schema description (XSD) of version 1 of the schema language.
pub const SCHEMA_XSD_V1: &str = include_str!("../../schemas/docmeta-1.xsd");

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ParserOptions {
    /// Maximum number of XML nodes in one document. Zero makes the parser unusable.
    pub nodes_limit: u32,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            nodes_limit: 100_000,
        }
    }
}

/// Maps documents of one namespace (one language version) to trees.
pub trait NamespaceHandler {
    fn namespace(&self) -> &'static str;

    /// The bundled schema description the handler validates against.
    fn schema_description(&self) -> &'static str;

    /// Maps the root element. Returns `None` if any error was reported through `context`.
    fn handle(&self, context: &mut HandlerContext, root: Node) -> Option<SchemaNode<Parsed>>;
}

/// What a [`NamespaceHandler`] needs to report diagnostics against the document.
pub struct HandlerContext<'a, 'r> {
    document: &'a Document<'a>,
    uri: &'a str,
    reporter: &'a mut Reporter<'r>,
    failed: bool,
}

impl<'a, 'r> HandlerContext<'a, 'r> {
    pub fn position(&self, node: Node) -> LexicalPosition {
        let pos = self.document.text_pos_at(node.range().start);
        LexicalPosition::new(self.uri, pos.row, pos.col)
    }

    /// Reports a schema violation at `node`.
    pub fn error(&mut self, node: Node, message: impl Into<String>) {
        self.failed = true;
        let error = ParseError::InvalidData {
            message: message.into(),
            position: self.position(node),
        };
        self.reporter.report_error(&error);
    }

    /// Reports an error that carries its own position.
    pub fn report(&mut self, error: ParseError) {
        self.failed = true;
        self.reporter.report_error(&error);
    }

    pub fn warning(&mut self, node: Node, code: DiagnosticCode, message: impl Into<String>) {
        let diagnostic = Diagnostic::warning(code, message).at(self.position(node));
        self.reporter.report(diagnostic);
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }
}

pub struct Parser {
    options: ParserOptions,
    handlers: Vec<Box<dyn NamespaceHandler>>,
}

impl Parser {
    /// A parser that understands every supported language version.
    pub fn new(options: ParserOptions) -> Self {
        Self::with_handlers(options, vec![Box::new(SchemaHandlerV1)])
    }

    pub fn with_handlers(options: ParserOptions, handlers: Vec<Box<dyn NamespaceHandler>>) -> Self {
        Self { options, handlers }
    }

    pub fn options(&self) -> ParserOptions {
        self.options
    }

    pub fn handler(&self, namespace: &str) -> Option<&dyn NamespaceHandler> {
        self.handlers
            .iter()
            .find(|h| h.namespace() == namespace)
            .map(|h| h.as_ref())
    }

    /// Reads the whole stream, then parses it. `uri` is only used in diagnostics.
    pub fn parse_reader(
        &self,
        mut reader: impl Read,
        uri: &str,
        reporter: &mut Reporter,
    ) -> Option<SchemaNode<Parsed>> {
        let mut bytes = Vec::new();
        if let Err(source) = reader.read_to_end(&mut bytes) {
            reporter.report_error(&ParseError::Io {
                source,
                position: LexicalPosition::new(uri, 0, 0),
            });
            return None;
        }
        self.parse(&bytes, uri, reporter)
    }

    pub fn parse(&self, bytes: &[u8], uri: &str, reporter: &mut Reporter) -> Option<SchemaNode<Parsed>> {
        tracing::debug!(uri, bytes = bytes.len(), "parsing schema");
        let origin = LexicalPosition::new(uri, 0, 0);

        if let Err(message) = self.check_configuration() {
            reporter.report_error(&ParseError::BrokenParserConfig {
                message,
                position: origin,
            });
            return None;
        }

        // BOM sniffing picks UTF-16 when marked; everything else must be UTF-8.
        let (text, encoding, malformed) = UTF_8.decode(bytes);
        if malformed {
            reporter.report_error(&ParseError::MalformedXml {
                message: format!("the document is not valid {}", encoding.name()),
                position: origin,
            });
            return None;
        }

        let mut options = roxmltree::ParsingOptions::default();
        options.allow_dtd = false;
        options.nodes_limit = self.options.nodes_limit;

        let document = match Document::parse_with_options(&text, options) {
            Ok(document) => document,
            Err(e) => {
                let pos = e.pos();
                let position = LexicalPosition::new(uri, pos.row, pos.col);
                let error = match e {
                    roxmltree::Error::DtdDetected => ParseError::InvalidData {
                        message: "document type declarations are not permitted".into(),
                        position,
                    },
                    roxmltree::Error::NodesLimitReached => ParseError::InvalidData {
                        message: format!(
                            "the document has more than {} nodes",
                            self.options.nodes_limit
                        ),
                        position,
                    },
                    e => ParseError::MalformedXml {
                        message: e.to_string(),
                        position,
                    },
                };
                reporter.report_error(&error);
                return None;
            }
        };

        let root = document.root_element();
        let mut context = HandlerContext {
            document: &document,
            uri,
            reporter,
            failed: false,
        };

        let namespace = root.tag_name().namespace().unwrap_or("");
        let Some(handler) = self.handler(namespace) else {
            context.error(root, format!("unsupported schema namespace {namespace:?}"));
            return None;
        };

        let schema = handler.handle(&mut context, root);
        if context.has_failed() {
            return None;
        }
        schema
    }

    fn check_configuration(&self) -> Result<(), String> {
        if self.options.nodes_limit == 0 {
            return Err("the node limit is zero".into());
        }
        if self.handlers.is_empty() {
            return Err("no schema language handlers are registered".into());
        }
        Ok(())
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new(ParserOptions::default())
    }
}
