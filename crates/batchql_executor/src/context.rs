//! Binding operations to the schema, root values and the batch context.

use crate::envelope::OperationKind;
use crate::error::{ErrorKind, ProcessingError};
use crate::splitter::Operation;
use batchql_runtime::{Context, ExecutionRequest, Schema, Variables};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Error type returned by lazy context producers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Producer = Arc<dyn Fn() -> Result<Context, BoxError> + Send + Sync>;

/// Where a batch's context comes from.
#[derive(Clone)]
pub enum ContextSource {
    /// The same context for every batch.
    Value(Context),
    /// Computed once per batch; all operations of the batch share the result.
    Lazy(Producer),
}

impl Default for ContextSource {
    fn default() -> Self {
        Self::Value(Context::default())
    }
}

impl fmt::Debug for ContextSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(context) => f.debug_tuple("Value").field(context).finish(),
            Self::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

impl ContextSource {
    pub fn lazy<F>(producer: F) -> Self
    where
        F: Fn() -> Result<Context, BoxError> + Send + Sync + 'static,
    {
        Self::Lazy(Arc::new(producer))
    }

    /// Produces the context snapshot for one batch.
    pub fn resolve(&self) -> Result<Context, ProcessingError> {
        match self {
            Self::Value(context) => Ok(context.clone()),
            Self::Lazy(producer) => producer()
                .map_err(|error| ProcessingError::message(ErrorKind::ContextError, error.to_string())),
        }
    }
}

/// Root values, one per operation kind.
#[derive(Debug, Clone)]
pub struct RootValues {
    pub query: Value,
    pub mutation: Value,
    pub subscription: Value,
}

impl Default for RootValues {
    fn default() -> Self {
        let empty = Value::Object(serde_json::Map::new());
        Self {
            query: empty.clone(),
            mutation: empty.clone(),
            subscription: empty,
        }
    }
}

impl RootValues {
    pub fn for_kind(&self, kind: OperationKind) -> Value {
        match kind {
            OperationKind::Query => self.query.clone(),
            OperationKind::Mutation => self.mutation.clone(),
            OperationKind::Subscription => self.subscription.clone(),
            OperationKind::None => Value::Null,
        }
    }
}

/// An operation ready to run.
#[derive(Debug, Clone)]
pub struct ExecutionDescriptor {
    pub operation_type: OperationKind,
    pub operation_name: String,
    pub request: ExecutionRequest,
}

/// Binds every operation of a batch to the shared pieces. The context
/// source is consulted once.
pub fn build(
    operations: Vec<Operation>,
    variables: &Variables,
    source: &ContextSource,
    schema: &Arc<Schema>,
    roots: &RootValues,
) -> Result<Vec<ExecutionDescriptor>, ProcessingError> {
    let context = source.resolve()?;

    Ok(operations
        .into_iter()
        .map(|operation| ExecutionDescriptor {
            request: ExecutionRequest::new(Arc::clone(schema), operation.document)
                .with_root_value(roots.for_kind(operation.kind))
                .with_context(context.clone())
                .with_variables(variables.clone()),
            operation_type: operation.kind,
            operation_name: operation.name,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splitter;
    use batchql_runtime::GraphQLEngine;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn operations() -> (Arc<Schema>, Vec<Operation>) {
        let schema = Arc::new(
            Schema::parse("type Query { ping: String } type Mutation { touch: Boolean }").unwrap(),
        );
        let operations = splitter::split(
            &GraphQLEngine::default(),
            &schema,
            Some("query a { ping } query b { ping } mutation c { touch }"),
        )
        .unwrap();
        (schema, operations)
    }

    #[test]
    fn test_lazy_context_runs_once_and_is_shared() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let source = ContextSource::lazy(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Context::new().with("user", "alice"))
        });

        let (schema, operations) = operations();
        let descriptors =
            build(operations, &Variables::new(), &source, &schema, &RootValues::default()).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(descriptors.len(), 3);
        assert!(descriptors[0].request.context.ptr_eq(&descriptors[2].request.context));
    }

    #[test]
    fn test_root_value_follows_operation_kind() {
        let roots = RootValues {
            query: serde_json::json!({"ping": "q"}),
            mutation: serde_json::json!({"touch": true}),
            ..RootValues::default()
        };

        let (schema, operations) = operations();
        let descriptors =
            build(operations, &Variables::new(), &ContextSource::default(), &schema, &roots)
                .unwrap();

        let tags: Vec<_> = descriptors
            .iter()
            .map(|d| (d.operation_type, d.operation_name.as_str(), d.request.root_value.clone()))
            .collect();
        assert_eq!(
            tags,
            vec![
                (OperationKind::Query, "a", serde_json::json!({"ping": "q"})),
                (OperationKind::Query, "b", serde_json::json!({"ping": "q"})),
                (OperationKind::Mutation, "c", serde_json::json!({"touch": true})),
            ]
        );
    }

    #[test]
    fn test_failing_producer_is_a_context_error() {
        let source = ContextSource::lazy(|| Err("session store unavailable".into()));
        let (schema, operations) = operations();

        let error = build(operations, &Variables::new(), &source, &schema, &RootValues::default())
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::ContextError);
        assert_eq!(error.errors[0].message, "session store unavailable");
    }
}
