//! The batch executor.
//!
//! A batch is split into operations, every operation runs in its own task,
//! and all results flow into one bounded [`ResultStream`]:
//!
//! ```text
//! document -> split -> bind context -> N runners -> ResultSink -> ResultStream
//! ```
//!
//! Pre-dispatch failures (parse, validation, empty batch, context) end the
//! batch with a single processing error. Failures of one operation never
//! affect its siblings.

use crate::batch::{Batch, BatchHandle};
use crate::config::ExecutorConfig;
use crate::context::{self, BoxError, ContextSource, ExecutionDescriptor, RootValues};
use crate::envelope::OperationKind;
use crate::error::{ErrorKind, ExecutorError, ProcessingError, MISSING_OPERATION_ID, NO_DOCUMENT};
use crate::multiplexer::{self, ResultSink, ResultStream};
use crate::runner;
use crate::splitter;
use batchql_runtime::{Context, GraphQLEngine, QueryEngine, Schema};
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info_span, warn, Instrument};

/// Executes batches of GraphQL operations concurrently.
///
/// Cloning is cheap; clones share the schema, engine and root values.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<Inner>,
}

struct Inner {
    schema: Arc<Schema>,
    engine: Arc<dyn QueryEngine>,
    context: ContextSource,
    roots: RootValues,
    config: ExecutorConfig,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("context", &self.inner.context)
            .field("roots", &self.inner.roots)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Executor {
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::default()
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.inner.config
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.inner.schema
    }

    /// Starts executing a batch and returns its result stream.
    ///
    /// Must be called from within a tokio runtime. The stream ends once every
    /// operation has finished; subscriptions keep it open until their source
    /// ends or the stream is closed.
    pub fn execute_batch(&self, batch: Batch) -> ResultStream {
        let (sink, stream) = multiplexer::channel(self.inner.config.capacity);
        let span = info_span!(
            "batch",
            executor = %self.inner.config.id,
            batch_id = batch.id_or_sentinel(),
        );

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.dispatch(batch, sink).await }.instrument(span));

        stream
    }

    /// Executes every batch of `inputs`, lazily, yielding one handle per
    /// input in input order.
    ///
    /// An input without an id or without a document yields a handle whose
    /// stream carries a single processing error; later inputs are still
    /// processed.
    pub fn submit<S>(&self, inputs: S) -> impl Stream<Item = BatchHandle> + Send + 'static
    where
        S: Stream<Item = Batch> + Send + 'static,
    {
        let executor = self.clone();
        inputs.map(move |batch| executor.handle(batch))
    }

    fn handle(&self, batch: Batch) -> BatchHandle {
        let rejection = match (&batch.id, &batch.document) {
            (None, _) => Some(ProcessingError::message(
                ErrorKind::MissingOperationId,
                MISSING_OPERATION_ID,
            )),
            (_, None) => Some(ProcessingError::message(ErrorKind::MissingDocument, NO_DOCUMENT)),
            (_, Some(document)) if document.is_empty() => {
                Some(ProcessingError::message(ErrorKind::MissingDocument, NO_DOCUMENT))
            }
            _ => None,
        };

        let batch_id = batch.id_or_sentinel().to_string();
        match rejection {
            Some(error) => {
                warn!(executor = %self.inner.config.id, batch_id, %error, "rejecting batch input");
                BatchHandle {
                    stream: multiplexer::single(error.into_envelope(batch.id)),
                    batch_id,
                }
            }
            None => BatchHandle {
                stream: self.execute_batch(batch),
                batch_id,
            },
        }
    }
}

impl Inner {
    fn prepare(&self, batch: &Batch) -> Result<Vec<ExecutionDescriptor>, ProcessingError> {
        let operations =
            splitter::split(self.engine.as_ref(), &self.schema, batch.document.as_deref())?;
        context::build(
            operations,
            &batch.variables,
            &self.context,
            &self.schema,
            &self.roots,
        )
    }

    async fn dispatch(self: Arc<Self>, batch: Batch, sink: ResultSink) {
        let descriptors = match self.prepare(&batch) {
            Ok(descriptors) => descriptors,
            Err(error) => {
                warn!(%error, "batch rejected");
                if sink.write(error.into_envelope(batch.id)).await.is_err() {
                    debug!("result stream closed, discarding processing error");
                }
                return;
            }
        };

        debug!(operations = descriptors.len(), "dispatching");

        let tasks: Vec<_> = descriptors
            .into_iter()
            .map(|descriptor| self.spawn_runner(descriptor, batch.id.clone(), sink.clone()))
            .collect();

        for (operation_type, operation_name, task) in tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    warn!(%operation_type, operation_name, %error, "operation failed");
                }
                Err(join_error) if join_error.is_panic() => {
                    warn!(%operation_type, operation_name, "operation panicked");
                    let error = ProcessingError::message(
                        ErrorKind::FatalEngineError,
                        format!("Operation \"{operation_name}\" panicked"),
                    )
                    .with_operation(operation_type, &operation_name);
                    if sink.write(error.into_envelope(batch.id.clone())).await.is_err() {
                        debug!("result stream closed, discarding processing error");
                    }
                }
                Err(_) => debug!(%operation_type, operation_name, "operation cancelled"),
            }
        }

        debug!("batch done");
    }

    fn spawn_runner(
        self: &Arc<Self>,
        descriptor: ExecutionDescriptor,
        batch_id: Option<String>,
        sink: ResultSink,
    ) -> (OperationKind, String, JoinHandle<Result<(), ProcessingError>>) {
        let operation_type = descriptor.operation_type;
        let operation_name = descriptor.operation_name.clone();
        let span = info_span!(
            "operation",
            operation_type = %operation_type,
            operation_name = %operation_name,
        );

        let engine = Arc::clone(&self.engine);
        let task = tokio::spawn(
            async move {
                match operation_type {
                    OperationKind::Subscription => {
                        runner::run_subscription(engine.as_ref(), descriptor, batch_id, &sink).await
                    }
                    _ => runner::run_query(engine.as_ref(), descriptor, batch_id, &sink).await,
                }
            }
            .instrument(span),
        );

        (operation_type, operation_name, task)
    }
}

/// Builder for [`Executor`].
#[derive(Default)]
pub struct ExecutorBuilder {
    schema: Option<Arc<Schema>>,
    engine: Option<Arc<dyn QueryEngine>>,
    context: ContextSource,
    roots: RootValues,
    config: ExecutorConfig,
}

impl ExecutorBuilder {
    /// Sets the schema. Required.
    pub fn schema(mut self, schema: impl Into<Arc<Schema>>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Sets the engine. Defaults to a [`GraphQLEngine`] without resolvers.
    pub fn engine(mut self, engine: impl QueryEngine + 'static) -> Self {
        self.engine = Some(Arc::new(engine));
        self
    }

    /// Uses the same context for every batch.
    pub fn context(mut self, context: Context) -> Self {
        self.context = ContextSource::Value(context);
        self
    }

    /// Computes the context once per batch.
    pub fn context_with<F>(mut self, producer: F) -> Self
    where
        F: Fn() -> Result<Context, BoxError> + Send + Sync + 'static,
    {
        self.context = ContextSource::lazy(producer);
        self
    }

    pub fn query_root(mut self, root: Value) -> Self {
        self.roots.query = root;
        self
    }

    pub fn mutation_root(mut self, root: Value) -> Self {
        self.roots.mutation = root;
        self
    }

    pub fn subscription_root(mut self, root: Value) -> Self {
        self.roots.subscription = root;
        self
    }

    pub fn config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the result channel capacity of every batch.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config = self.config.with_capacity(capacity);
        self
    }

    /// Sets the id used in logs.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config = self.config.with_id(id);
        self
    }

    pub fn build(self) -> Result<Executor, ExecutorError> {
        let schema = self.schema.ok_or(ExecutorError::SchemaRequired)?;
        let engine = self
            .engine
            .unwrap_or_else(|| Arc::new(GraphQLEngine::default()));

        Ok(Executor {
            inner: Arc::new(Inner {
                schema,
                engine,
                context: self.context,
                roots: self.roots,
                config: self.config,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::NO_BATCH_ID;

    fn schema() -> Schema {
        Schema::parse("type Query { ping: String }").unwrap()
    }

    #[test]
    fn test_build_requires_schema() {
        let error = Executor::builder().build().unwrap_err();
        assert_eq!(error, ExecutorError::SchemaRequired);
        assert_eq!(error.to_string(), "Schema must be defined");
    }

    #[test]
    fn test_builder_config() {
        let executor = Executor::builder()
            .schema(schema())
            .capacity(0)
            .id("edge")
            .build()
            .unwrap();
        assert_eq!(executor.config().capacity, 1);
        assert_eq!(executor.config().id, "edge");
        assert_eq!(NO_BATCH_ID, "none");
    }

    #[tokio::test]
    async fn test_query_root_feeds_default_resolver() {
        let executor = Executor::builder()
            .schema(schema())
            .query_root(serde_json::json!({"ping": "from root"}))
            .build()
            .unwrap();

        let envelopes: Vec<_> = executor.execute_batch(Batch::new("{ ping }")).collect().await;
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].data, Some(serde_json::json!({"ping": "from root"})));
        assert_eq!(envelopes[0].operation_name, "anon");
    }
}
