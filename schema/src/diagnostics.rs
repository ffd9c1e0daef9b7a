//! Structured diagnostics and the guarded channel through which every stage reports them.
//!
//! Stages never hand a [`Diagnostic`] to a caller-supplied [`DiagnosticReceiver`] directly; they
//! go through a [`Reporter`], which counts what was reported and contains any failure of the
//! receiver so that it cannot disturb the pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning,
    Error,
    /// An internal defect. The stage that reported it produced no result.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        })
    }
}

macro_rules! diagnostic_codes {
    ($($variant:ident => $code:literal,)*) => {
        /// Stable machine-readable diagnostic codes.
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        pub enum DiagnosticCode {
            $($variant,)*
        }

        impl DiagnosticCode {
            pub const ALL: &'static [DiagnosticCode] = &[$(DiagnosticCode::$variant,)*];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(DiagnosticCode::$variant => $code,)*
                }
            }
        }
    };
}

diagnostic_codes! {
    ParseMalformedXml => "error-parse-xml-malformed",
    ParseIo => "error-parse-io",
    ParseBrokenConfig => "error-parse-config-broken",
    ParseInvalidData => "error-parse-invalid-data",
    ParseForeignAttribute => "warn-parse-foreign-attribute",
    BindTypeUnbound => "error-bind-type-unbound",
    BindImportUnbound => "error-bind-import-unbound",
    BindImportSelf => "error-bind-import-self",
    BindTypeCyclic => "error-bind-type-cyclic",
    LoadCyclicImport => "error-load-cyclic-import",
    LoadSource => "error-load-source",
    LoadCompilationFailed => "error-load-compilation-failed",
    LoadDepthExceeded => "error-load-depth-exceeded",
    ResolveVersionConflict => "error-resolve-version-conflict",
    ResolveCircularImport => "error-resolve-circular-import",
    ResolveSchemaNotFound => "error-resolve-schema-not-found",
    ResolveDirectoryFailed => "error-resolve-directory-failed",
    ValidateSchemaNotImported => "error-validate-schema-not-imported",
    ValidateSchemaNotFound => "error-validate-schema-not-found",
    ValidateAttributeNotFound => "error-validate-attribute-not-found",
    ValidateCardinality => "error-validate-cardinality",
    ValidateValueInvalid => "error-validate-value-invalid",
    Internal => "error-internal",
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A position in a schema source. The zero position (empty URI, line and column 0) stands in
/// whenever no real position is available.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct LexicalPosition {
    pub uri: String,
    pub line: u32,
    pub column: u32,
}

impl LexicalPosition {
    pub fn new(uri: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            uri: uri.into(),
            line,
            column,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.line == 0 && self.column == 0
    }
}

impl fmt::Display for LexicalPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.uri, self.line, self.column)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub severity: Severity,
    pub message: String,
    pub position: LexicalPosition,
    pub attributes: BTreeMap<String, String>,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            position: LexicalPosition::zero(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Error, message)
    }

    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Warning, message)
    }

    pub fn at(mut self, position: LexicalPosition) -> Self {
        self.position = position;
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.attributes.insert(key.into(), value.to_string());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.position.is_zero() {
            write!(f, "{}: ", self.position)?;
        }
        write!(f, "{} [{}]: {}", self.severity, self.code, self.message)
    }
}

/// Implemented by every error type that can be turned into a [`Diagnostic`].
pub trait Diagnose {
    fn diagnostic(&self) -> Diagnostic;
}

pub type ReceiverError = Box<dyn std::error::Error + Send + Sync>;

/// A caller-supplied consumer of diagnostics.
pub trait DiagnosticReceiver {
    fn receive(&mut self, diagnostic: &Diagnostic) -> Result<(), ReceiverError>;
}

impl DiagnosticReceiver for Vec<Diagnostic> {
    fn receive(&mut self, diagnostic: &Diagnostic) -> Result<(), ReceiverError> {
        self.push(diagnostic.clone());
        Ok(())
    }
}

/// Discards everything it receives.
pub struct Ignore;

impl DiagnosticReceiver for Ignore {
    fn receive(&mut self, _diagnostic: &Diagnostic) -> Result<(), ReceiverError> {
        Ok(())
    }
}

/// The shared error sink of one pipeline run.
pub struct Reporter<'r> {
    receiver: &'r mut dyn DiagnosticReceiver,
    warnings: usize,
    errors: usize,
}

impl<'r> Reporter<'r> {
    pub fn new(receiver: &'r mut dyn DiagnosticReceiver) -> Self {
        Self {
            receiver,
            warnings: 0,
            errors: 0,
        }
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Warning => self.warnings += 1,
            Severity::Error | Severity::Critical => self.errors += 1,
        }
        tracing::debug!(code = %diagnostic.code, severity = %diagnostic.severity, "{}", diagnostic.message);

        let receiver = &mut *self.receiver;
        match panic::catch_unwind(AssertUnwindSafe(|| receiver.receive(&diagnostic))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(code = %diagnostic.code, "diagnostic receiver failed: {e}");
            }
            Err(_) => {
                tracing::error!(code = %diagnostic.code, "diagnostic receiver panicked");
            }
        }
    }

    pub fn report_error(&mut self, error: &impl Diagnose) {
        self.report(error.diagnostic())
    }

    /// Number of error and critical diagnostics reported so far.
    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }
}
