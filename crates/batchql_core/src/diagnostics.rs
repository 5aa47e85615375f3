//! Diagnostic reporting for batchql.

use crate::span::{Location, Span};

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSeverity {
    /// An error that rejects the document.
    Error,
    /// A warning that doesn't reject the document.
    Warning,
}

/// A diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity level.
    pub severity: DiagnosticSeverity,
    /// Diagnostic code, see [`codes`].
    pub code: &'static str,
    /// Human-readable message, already in its final wording.
    pub message: String,
    /// Source spans this diagnostic points to.
    pub spans: Vec<Span>,
}

impl Diagnostic {
    /// Creates a new error diagnostic.
    pub fn error(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            code,
            message: message.into(),
            spans: Vec::new(),
        }
    }

    /// Creates a new warning diagnostic.
    pub fn warning(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            code,
            message: message.into(),
            spans: Vec::new(),
        }
    }

    /// Adds a span to the diagnostic.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.spans.push(span);
        self
    }

    /// Returns the primary span, if any.
    pub fn primary_span(&self) -> Option<Span> {
        self.spans.first().copied()
    }

    /// Resolves every span against the source it was produced from.
    pub fn locations(&self, source: &str) -> Vec<Location> {
        self.spans.iter().map(|span| span.location(source)).collect()
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// A collection of diagnostics.
#[derive(Debug, Default)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
    /// Creates a new empty diagnostic bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a diagnostic.
    pub fn add(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Adds an error diagnostic at a span.
    pub fn error(&mut self, code: &'static str, span: Span, message: impl Into<String>) {
        self.add(Diagnostic::error(code, message).with_span(span));
    }

    /// Returns true if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == DiagnosticSeverity::Error)
    }

    /// Returns the number of errors.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    /// Returns an iterator over all diagnostics.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Returns an iterator over errors.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == DiagnosticSeverity::Error)
    }

    /// Returns true if there are no diagnostics.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Returns the number of diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    /// Consumes the bag, returning the diagnostics in insertion order.
    #[must_use]
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

impl IntoIterator for DiagnosticBag {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.into_iter()
    }
}

/// Common diagnostic codes.
pub mod codes {
    pub const SYNTAX: &str = "E0001";
    pub const UNKNOWN_TYPE: &str = "E0010";
    pub const UNKNOWN_FIELD: &str = "E0011";
    pub const UNKNOWN_ARGUMENT: &str = "E0012";
    pub const UNKNOWN_FRAGMENT: &str = "E0013";
    pub const UNDEFINED_VARIABLE: &str = "E0014";
    pub const MISSING_ARGUMENT: &str = "E0015";
    pub const UNUSED_DEFINITION: &str = "E0016";
    pub const FRAGMENT_CYCLE: &str = "E0017";
    pub const DUPLICATE_NAME: &str = "E0020";
    pub const LONE_ANONYMOUS_OPERATION: &str = "E0021";
    pub const SINGLE_ROOT_FIELD: &str = "E0022";
    pub const UNSUPPORTED_OPERATION: &str = "E0023";
    pub const NON_EXECUTABLE_DEFINITION: &str = "E0024";
    pub const LEAF_SELECTION: &str = "E0030";
    pub const MISSING_SELECTION: &str = "E0031";
    pub const INVALID_TYPE_CONDITION: &str = "E0032";
    pub const INVALID_VARIABLE_TYPE: &str = "E0033";
    pub const SCHEMA: &str = "E0040";
}
