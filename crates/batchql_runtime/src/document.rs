//! Parsed executable documents.

use crate::error::GraphQLError;
use batchql_core::{Location, Span};
use batchql_syntax::{Document, OperationDefinition};
use std::sync::Arc;

/// A parsed document together with the source text its spans point into.
///
/// Documents produced by splitting keep the original source, so error
/// locations stay relative to what the client sent.
#[derive(Debug, Clone)]
pub struct ExecutableDocument {
    source: Arc<str>,
    ast: Document,
}

impl ExecutableDocument {
    /// Parses `source`, reporting the first syntax error.
    pub fn parse(source: &str) -> Result<Self, GraphQLError> {
        let source: Arc<str> = Arc::from(source);
        match batchql_syntax::parse(&source) {
            Ok(ast) => Ok(Self { source, ast }),
            Err(diagnostic) => Err(GraphQLError::from_diagnostic(&diagnostic, &source)),
        }
    }

    /// Wraps an already parsed document.
    pub fn new(source: Arc<str>, ast: Document) -> Self {
        Self { source, ast }
    }

    /// The syntax tree.
    pub fn ast(&self) -> &Document {
        &self.ast
    }

    /// The source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn shared_source(&self) -> Arc<str> {
        Arc::clone(&self.source)
    }

    /// Resolves a span to a line/column location.
    pub fn locate(&self, span: Span) -> Location {
        span.location(&self.source)
    }

    /// Iterates the operations in document order.
    pub fn operations(&self) -> impl Iterator<Item = &OperationDefinition> {
        self.ast.operations()
    }

    /// Picks the operation to run: the named one, or the only one.
    pub fn operation(&self, name: Option<&str>) -> Result<&OperationDefinition, GraphQLError> {
        match name {
            Some(name) => self
                .operations()
                .find(|op| op.name() == Some(name))
                .ok_or_else(|| GraphQLError::new(format!("Unknown operation named \"{name}\"."))),
            None => {
                let mut operations = self.operations();
                match (operations.next(), operations.next()) {
                    (Some(op), None) => Ok(op),
                    (None, _) => Err(GraphQLError::new("Must provide an operation.")),
                    (Some(_), Some(_)) => Err(GraphQLError::new(
                        "Must provide operation name if query contains multiple operations.",
                    )),
                }
            }
        }
    }
}
