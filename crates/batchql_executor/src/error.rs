//! Error types for the batch executor.
//!
//! Only [`ExecutorError`] is ever returned to a caller. Every other failure
//! becomes a [`ProcessingError`] written once to the batch's result stream.

use crate::envelope::{Envelope, OperationKind};
use batchql_runtime::{EngineError, GraphQLError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors raised while constructing an executor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    #[error("Schema must be defined")]
    SchemaRequired,
}

/// Class of a processing error, serialised as the envelope's `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The document is missing or is not syntactically valid.
    ParseError,
    /// The document does not validate against the schema.
    ValidationError,
    /// The document holds no operation.
    EmptyBatch,
    /// The engine failed while running one operation.
    FatalEngineError,
    /// A submitted batch has no id.
    MissingOperationId,
    /// A submitted batch has no document.
    MissingDocument,
    /// The lazy context producer failed.
    ContextError,
    /// A subscription could not be started.
    SubscriptionError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ParseError => "PARSE_ERROR",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::EmptyBatch => "EMPTY_BATCH",
            Self::FatalEngineError => "FATAL_ENGINE_ERROR",
            Self::MissingOperationId => "MISSING_OPERATION_ID",
            Self::MissingDocument => "MISSING_DOCUMENT",
            Self::ContextError => "CONTEXT_ERROR",
            Self::SubscriptionError => "SUBSCRIPTION_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message of the error raised for a missing or empty document.
pub const NO_DOCUMENT: &str = "No document was provided";

/// Message of the error raised for a document without operations.
pub const EMPTY_BATCH: &str = "There must be at least one operation document";

/// Message of the error raised for a submitted batch without an id.
pub const MISSING_OPERATION_ID: &str = "Missing operation id";

/// A classified failure, tagged with the operation it belongs to.
///
/// Failures detected before any operation was identified carry the `none`
/// sentinels.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {}", summary(.errors))]
pub struct ProcessingError {
    pub kind: ErrorKind,
    pub operation_type: OperationKind,
    pub operation_name: String,
    pub errors: Vec<GraphQLError>,
}

fn summary(errors: &[GraphQLError]) -> String {
    match errors {
        [] => "no details".to_string(),
        [only] => only.message.clone(),
        [first, rest @ ..] => format!("{} (and {} more)", first.message, rest.len()),
    }
}

impl ProcessingError {
    /// Creates a batch-level error with the `none` sentinels.
    pub fn new(kind: ErrorKind, errors: Vec<GraphQLError>) -> Self {
        Self {
            kind,
            operation_type: OperationKind::None,
            operation_name: OperationKind::None.as_str().to_string(),
            errors,
        }
    }

    /// Creates a batch-level error with a single message.
    pub fn message(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, vec![GraphQLError::new(message)])
    }

    pub fn no_document() -> Self {
        Self::message(ErrorKind::ParseError, NO_DOCUMENT)
    }

    pub fn empty_batch() -> Self {
        Self::message(ErrorKind::EmptyBatch, EMPTY_BATCH)
    }

    /// Classifies an engine failure for one operation.
    pub fn engine(operation_type: OperationKind, operation_name: &str, error: &EngineError) -> Self {
        Self::new(ErrorKind::FatalEngineError, vec![error.to_graphql_error()])
            .with_operation(operation_type, operation_name)
    }

    /// Tags the error with the operation it belongs to.
    #[must_use]
    pub fn with_operation(mut self, operation_type: OperationKind, operation_name: &str) -> Self {
        self.operation_type = operation_type;
        self.operation_name = operation_name.to_string();
        self
    }

    /// Converts the error into the envelope written to the result stream.
    pub fn into_envelope(self, batch_id: Option<String>) -> Envelope {
        Envelope {
            batch_id,
            operation_type: self.operation_type,
            operation_name: self.operation_name,
            data: None,
            errors: self.errors,
            kind: Some(self.kind),
        }
    }
}
