//! Turns a raw document into independently executable operations.

use crate::envelope::OperationKind;
use crate::error::{ErrorKind, ProcessingError};
use batchql_runtime::{ExecutableDocument, QueryEngine, Schema};

/// Name given to operations without one.
pub const ANONYMOUS_OPERATION: &str = "anon";

/// One operation of a batch, isolated in its own document.
#[derive(Debug, Clone)]
pub struct Operation {
    pub kind: OperationKind,
    pub name: String,
    /// The operation and every fragment it references.
    pub document: ExecutableDocument,
}

/// Parses, validates and splits `document`.
///
/// Operations are returned in document order. A missing or invalid
/// document, or one without operations, rejects the whole batch.
pub fn split(
    engine: &dyn QueryEngine,
    schema: &Schema,
    document: Option<&str>,
) -> Result<Vec<Operation>, ProcessingError> {
    let source = match document {
        Some(source) if !source.is_empty() => source,
        _ => return Err(ProcessingError::no_document()),
    };

    let parsed = engine
        .parse(source)
        .map_err(|errors| ProcessingError::new(ErrorKind::ParseError, errors))?;

    let errors = engine.validate(schema, &parsed);
    if !errors.is_empty() {
        return Err(ProcessingError::new(ErrorKind::ValidationError, errors));
    }

    let operations: Vec<_> = engine
        .split_operations(&parsed)
        .into_iter()
        .filter_map(|document| {
            let operation = document.operations().next()?;
            let kind = OperationKind::from(operation.operation);
            let name = operation.name().unwrap_or(ANONYMOUS_OPERATION).to_string();
            Some(Operation {
                kind,
                name,
                document,
            })
        })
        .collect();

    if operations.is_empty() {
        return Err(ProcessingError::empty_batch());
    }

    Ok(operations)
}
