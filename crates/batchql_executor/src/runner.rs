//! Running one operation and writing its results.

use crate::context::ExecutionDescriptor;
use crate::envelope::{Envelope, OperationKind};
use crate::error::{ErrorKind, ProcessingError};
use crate::multiplexer::{ResultSink, SinkClosed};
use batchql_runtime::{QueryEngine, Response, Subscription};
use futures::StreamExt;
use tracing::debug;

/// What the engine produced for one operation.
#[derive(Debug)]
pub enum RunOutcome {
    Ok { response: Response },
    Fail(ProcessingError),
}

impl RunOutcome {
    fn into_envelope(
        self,
        batch_id: Option<String>,
        operation_type: OperationKind,
        operation_name: &str,
    ) -> Envelope {
        match self {
            Self::Ok { response } => {
                Envelope::from_response(batch_id, operation_type, operation_name, response)
            }
            Self::Fail(error) => error.into_envelope(batch_id),
        }
    }
}

/// Runs a query or mutation and writes its single envelope.
///
/// Returns the processing error when the engine failed; the envelope
/// describing it has already been written.
pub async fn run_query(
    engine: &dyn QueryEngine,
    descriptor: ExecutionDescriptor,
    batch_id: Option<String>,
    sink: &ResultSink,
) -> Result<(), ProcessingError> {
    let ExecutionDescriptor {
        operation_type,
        operation_name,
        request,
    } = descriptor;

    debug!(variables = ?request.variables, "processing query");

    let outcome = match engine.execute(request).await {
        Ok(response) => RunOutcome::Ok { response },
        Err(error) => RunOutcome::Fail(ProcessingError::engine(
            operation_type,
            &operation_name,
            &error,
        )),
    };

    let failure = match &outcome {
        RunOutcome::Fail(error) => Some(error.clone()),
        RunOutcome::Ok { .. } => None,
    };

    let envelope = outcome.into_envelope(batch_id, operation_type, &operation_name);
    if sink.write(envelope).await.is_err() {
        debug!("result stream closed, discarding result");
    }

    failure.map_or(Ok(()), Err)
}

/// Runs a subscription, writing one envelope per event until the source
/// ends, fails, or the consumer closes the stream.
pub async fn run_subscription(
    engine: &dyn QueryEngine,
    descriptor: ExecutionDescriptor,
    batch_id: Option<String>,
    sink: &ResultSink,
) -> Result<(), ProcessingError> {
    let ExecutionDescriptor {
        operation_type,
        operation_name,
        request,
    } = descriptor;

    debug!(variables = ?request.variables, "processing subscription");

    let subscription = tokio::select! {
        () = sink.closed() => {
            debug!("result stream closed before the subscription started");
            return Ok(());
        }
        subscription = engine.subscribe(request) => subscription,
    };

    let mut stream = match subscription {
        Ok(Subscription::Stream(stream)) => stream,
        Ok(Subscription::Immediate(response)) => {
            let error = ProcessingError::new(ErrorKind::SubscriptionError, response.errors)
                .with_operation(operation_type, &operation_name);
            write_failure(sink, error.clone(), batch_id).await;
            return Err(error);
        }
        Err(engine_error) => {
            let error = ProcessingError::engine(operation_type, &operation_name, &engine_error);
            write_failure(sink, error.clone(), batch_id).await;
            return Err(error);
        }
    };

    let mut events = 0usize;
    loop {
        // Room is awaited, not held across `next()`: a quiet source must
        // not occupy a slot.
        if sink.ready().await.is_err() {
            debug!(events, "result stream closed, releasing subscription");
            return Ok(());
        }

        let next = tokio::select! {
            () = sink.closed() => {
                debug!(events, "result stream closed, releasing subscription");
                return Ok(());
            }
            next = stream.next() => next,
        };

        let envelope = match next {
            Some(Ok(response)) => {
                events += 1;
                Envelope::from_response(batch_id.clone(), operation_type, &operation_name, response)
            }
            Some(Err(engine_error)) => {
                let error = ProcessingError::engine(operation_type, &operation_name, &engine_error);
                write_failure(sink, error.clone(), batch_id).await;
                return Err(error);
            }
            None => {
                debug!(events, "subscription ended");
                return Ok(());
            }
        };

        if sink.write(envelope).await.is_err() {
            debug!(events, "result stream closed, releasing subscription");
            return Ok(());
        }
    }
}

async fn write_failure(sink: &ResultSink, error: ProcessingError, batch_id: Option<String>) {
    if let Err(SinkClosed) = sink.write(error.into_envelope(batch_id)).await {
        debug!("result stream closed, discarding processing error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multiplexer::channel;
    use batchql_runtime::{
        ExecutableDocument, ExecutionRequest, GraphQLEngine, ResolverError, ResolverMap, Schema,
    };
    use std::sync::Arc;

    fn descriptor(kind: OperationKind, source: &str) -> ExecutionDescriptor {
        let schema = Schema::parse(
            "type Query { ping: String fail: String } type Subscription { count: Int }",
        )
        .unwrap();
        ExecutionDescriptor {
            operation_type: kind,
            operation_name: "anon".into(),
            request: ExecutionRequest::new(
                Arc::new(schema),
                ExecutableDocument::parse(source).unwrap(),
            ),
        }
    }

    fn engine(events: Vec<Result<i64, ResolverError>>) -> GraphQLEngine {
        let mut resolvers = ResolverMap::new();
        resolvers
            .register_fn("Query", "ping", |_, _, _, _| Ok(serde_json::json!("pong")))
            .register_fn("Query", "fail", |_, _, _, _| {
                Err(ResolverError::fatal("disk on fire"))
            })
            .register_subscription("Subscription", "count", move |_, _, _, _| {
                let events = events.clone();
                Ok(futures::stream::iter(
                    events.into_iter().map(|event| event.map(serde_json::Value::from)),
                ))
            });
        GraphQLEngine::new(resolvers)
    }

    #[tokio::test]
    async fn test_query_writes_one_envelope() {
        let (sink, mut stream) = channel(8);
        run_query(
            &engine(vec![]),
            descriptor(OperationKind::Query, "{ ping }"),
            Some("b".into()),
            &sink,
        )
        .await
        .unwrap();
        drop(sink);

        let envelope = stream.recv().await.unwrap();
        assert_eq!(envelope.batch_id.as_deref(), Some("b"));
        assert_eq!(envelope.data, Some(serde_json::json!({"ping": "pong"})));
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_fatal_query_writes_processing_error() {
        let (sink, mut stream) = channel(8);
        let error = run_query(
            &engine(vec![]),
            descriptor(OperationKind::Query, "{ fail }"),
            None,
            &sink,
        )
        .await
        .unwrap_err();
        assert_eq!(error.kind, ErrorKind::FatalEngineError);

        let envelope = stream.recv().await.unwrap();
        assert_eq!(envelope.kind, Some(ErrorKind::FatalEngineError));
        assert_eq!(envelope.errors[0].message, "disk on fire");
    }

    #[tokio::test]
    async fn test_query_into_closed_sink_is_not_an_error() {
        let (sink, stream) = channel(8);
        drop(stream);
        run_query(
            &engine(vec![]),
            descriptor(OperationKind::Query, "{ ping }"),
            None,
            &sink,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_subscription_stops_at_fatal_event() {
        let (sink, stream) = channel(8);
        let error = run_subscription(
            &engine(vec![Ok(1), Err(ResolverError::fatal("gone")), Ok(3)]),
            descriptor(OperationKind::Subscription, "subscription { count }"),
            None,
            &sink,
        )
        .await
        .unwrap_err();
        assert_eq!(error.operation_type, OperationKind::Subscription);
        drop(sink);

        let envelopes: Vec<_> = stream.collect().await;
        assert_eq!(envelopes.len(), 2);
        assert_eq!(envelopes[0].data, Some(serde_json::json!({"count": 1})));
        assert_eq!(envelopes[1].kind, Some(ErrorKind::FatalEngineError));
    }

    #[tokio::test]
    async fn test_subscription_without_source_is_a_subscription_error() {
        let (sink, mut stream) = channel(8);
        let error = run_subscription(
            &GraphQLEngine::default(),
            descriptor(OperationKind::Subscription, "subscription { count }"),
            None,
            &sink,
        )
        .await
        .unwrap_err();
        assert_eq!(error.kind, ErrorKind::SubscriptionError);
        assert_eq!(stream.recv().await.unwrap().kind, Some(ErrorKind::SubscriptionError));
    }

    #[tokio::test]
    async fn test_outcome_envelopes() {
        let ok = RunOutcome::Ok {
            response: Response::data(serde_json::json!({"ping": "pong"})),
        }
        .into_envelope(None, OperationKind::Query, "a");
        assert!(!ok.is_processing_error());

        let fail = RunOutcome::Fail(ProcessingError::empty_batch()).into_envelope(
            None,
            OperationKind::Query,
            "a",
        );
        assert_eq!(fail.kind, Some(ErrorKind::EmptyBatch));
    }
}
