//! Integration tests for batch execution.

use async_trait::async_trait;
use batchql_executor::{Batch, Envelope, ErrorKind, Executor, OperationKind};
use batchql_runtime::{
    Context, EngineError, ExecutableDocument, ExecutionRequest, GraphQLEngine, GraphQLError,
    QueryEngine, ResolverError, ResolverMap, Response, Schema, Subscription,
};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SDL: &str = r#"
    type Query {
        ping: String
        boom: String
        broken: String
        whoami: String
        slow: String
    }
    type Mutation { touch: Boolean }
    type Subscription {
        count: Int
        failing: Int
        endless: Int
        quiet: Int
    }
"#;

fn schema() -> Schema {
    Schema::parse(SDL).unwrap()
}

fn resolvers() -> ResolverMap {
    let mut resolvers = ResolverMap::new();
    resolvers
        .register_fn("Query", "ping", |_, _, _, _| Ok("pong".into()))
        .register_fn("Query", "boom", |_, _, _, _| {
            Err(ResolverError::custom("boom went the resolver"))
        })
        .register_fn("Query", "broken", |_, _, _, _| {
            Err(ResolverError::fatal("database unreachable"))
        })
        .register_fn("Query", "whoami", |_, _, ctx, _| {
            Ok(ctx.value("user").cloned().unwrap_or_default())
        })
        .register_async("Query", "slow", |_, _, _, _| async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok("finally".into())
        })
        .register_fn("Mutation", "touch", |_, _, _, _| Ok(true.into()))
        .register_subscription("Subscription", "count", |_, _, _, _| {
            Ok(futures::stream::iter(
                (1..=3).map(|n| Ok::<_, ResolverError>(serde_json::Value::from(n))),
            ))
        })
        .register_subscription("Subscription", "failing", |_, _, _, _| {
            Ok(async_stream::stream! {
                yield Ok::<_, ResolverError>(serde_json::Value::from(1));
                yield Err(ResolverError::fatal("broker went away"));
                yield Ok(serde_json::Value::from(2));
            })
        })
        .register_subscription("Subscription", "quiet", |_, _, _, _| {
            Ok(futures::stream::pending::<Result<serde_json::Value, ResolverError>>())
        });
    resolvers
}

fn executor() -> Executor {
    Executor::builder()
        .schema(schema())
        .engine(GraphQLEngine::new(resolvers()))
        .build()
        .unwrap()
}

async fn run(executor: &Executor, batch: Batch) -> Vec<Envelope> {
    tokio::time::timeout(
        Duration::from_secs(5),
        executor.execute_batch(batch).collect::<Vec<_>>(),
    )
    .await
    .expect("batch did not finish")
}

fn named<'a>(envelopes: &'a [Envelope], name: &str) -> Vec<&'a Envelope> {
    envelopes
        .iter()
        .filter(|e| e.operation_name == name)
        .collect()
}

#[tokio::test]
async fn test_each_query_yields_one_envelope() {
    let envelopes = run(&executor(), Batch::new("query a { ping } query b { ping }")).await;

    assert_eq!(envelopes.len(), 2);
    for name in ["a", "b"] {
        let envelope = named(&envelopes, name)[0];
        insta::allow_duplicates! {
            insta::assert_snapshot!(
                serde_json::to_string(&envelope.data).unwrap(),
                @r#"{"ping":"pong"}"#
            );
        }
        assert_eq!(envelope.operation_type, OperationKind::Query);
        assert!(envelope.errors.is_empty());
        assert!(envelope.kind.is_none());
    }
}

#[tokio::test]
async fn test_wire_form_of_a_query_result() {
    let envelopes = run(&executor(), Batch::new("query a { ping }").with_id("b-1")).await;

    insta::assert_snapshot!(
        serde_json::to_string(&envelopes[0]).unwrap(),
        @r#"{"batchId":"b-1","operationType":"query","operationName":"a","data":{"ping":"pong"},"errors":[]}"#
    );
}

#[tokio::test]
async fn test_mixed_kinds_share_one_stream() {
    let envelopes = run(
        &executor(),
        Batch::new("query q { ping } mutation m { touch } subscription s { count }"),
    )
    .await;

    assert_eq!(envelopes.len(), 5);
    assert_eq!(named(&envelopes, "q")[0].data, Some(serde_json::json!({"ping": "pong"})));
    assert_eq!(named(&envelopes, "m")[0].data, Some(serde_json::json!({"touch": true})));
    assert_eq!(named(&envelopes, "m")[0].operation_type, OperationKind::Mutation);
    assert_eq!(named(&envelopes, "s").len(), 3);
}

#[tokio::test]
async fn test_subscription_events_arrive_in_order() {
    let envelopes = run(&executor(), Batch::new("subscription { count }")).await;

    let data: Vec<_> = envelopes.iter().map(|e| e.data.clone().unwrap()).collect();
    assert_eq!(
        data,
        vec![
            serde_json::json!({"count": 1}),
            serde_json::json!({"count": 2}),
            serde_json::json!({"count": 3}),
        ]
    );
    assert!(envelopes
        .iter()
        .all(|e| e.operation_type == OperationKind::Subscription && e.operation_name == "anon"));
}

#[tokio::test]
async fn test_missing_document() {
    for batch in [Batch::default(), Batch::new("")] {
        let envelopes = run(&executor(), batch).await;

        assert_eq!(envelopes.len(), 1);
        let envelope = &envelopes[0];
        assert_eq!(envelope.kind, Some(ErrorKind::ParseError));
        assert_eq!(envelope.operation_type, OperationKind::None);
        assert_eq!(envelope.operation_name, "none");
        assert_eq!(envelope.errors[0].message, "No document was provided");
    }
}

#[tokio::test]
async fn test_syntax_error_rejects_batch() {
    let envelopes = run(&executor(), Batch::new("invalid")).await;

    assert_eq!(envelopes.len(), 1);
    assert_eq!(envelopes[0].kind, Some(ErrorKind::ParseError));
    insta::assert_snapshot!(envelopes[0].errors[0].message, @r#"Syntax Error: Unexpected Name "invalid"."#);
    assert_eq!(envelopes[0].errors[0].locations[0].column, 1);
}

#[tokio::test]
async fn test_validation_error_rejects_whole_batch() {
    let envelopes = run(&executor(), Batch::new("query a { ping } query b { nope }")).await;

    assert_eq!(envelopes.len(), 1);
    assert_eq!(envelopes[0].kind, Some(ErrorKind::ValidationError));
    insta::assert_snapshot!(envelopes[0].errors[0].message, @r#"Cannot query field "nope" on type "Query"."#);
}

/// Delegates to [`GraphQLEngine`] but accepts every document, so documents
/// without operations reach the splitter.
struct Permissive(GraphQLEngine);

#[async_trait]
impl QueryEngine for Permissive {
    fn parse(&self, source: &str) -> Result<ExecutableDocument, Vec<GraphQLError>> {
        self.0.parse(source)
    }

    fn validate(&self, _schema: &Schema, _document: &ExecutableDocument) -> Vec<GraphQLError> {
        Vec::new()
    }

    async fn execute(&self, request: ExecutionRequest) -> Result<Response, EngineError> {
        self.0.execute(request).await
    }

    async fn subscribe(&self, request: ExecutionRequest) -> Result<Subscription, EngineError> {
        self.0.subscribe(request).await
    }
}

#[tokio::test]
async fn test_document_without_operations() {
    let executor = Executor::builder()
        .schema(schema())
        .engine(Permissive(GraphQLEngine::default()))
        .build()
        .unwrap();

    let envelopes = run(&executor, Batch::new("fragment F on Query { ping }")).await;

    assert_eq!(envelopes.len(), 1);
    assert_eq!(envelopes[0].kind, Some(ErrorKind::EmptyBatch));
    insta::assert_snapshot!(envelopes[0].errors[0].message, @"There must be at least one operation document");
}

#[tokio::test]
async fn test_soft_error_stays_in_its_operation() {
    let envelopes = run(&executor(), Batch::new("query a { ping } query b { ping boom }")).await;

    assert_eq!(envelopes.len(), 2);

    let a = named(&envelopes, "a")[0];
    assert!(!a.has_errors());

    let b = named(&envelopes, "b")[0];
    assert!(b.has_errors());
    assert!(!b.is_processing_error());
    assert_eq!(b.data, Some(serde_json::json!({"ping": "pong", "boom": null})));
    assert_eq!(b.errors.len(), 1);
    assert_eq!(b.errors[0].message, "boom went the resolver");
}

#[tokio::test]
async fn test_fatal_query_error_is_isolated() {
    let envelopes = run(&executor(), Batch::new("query a { ping } query b { broken }")).await;

    assert_eq!(envelopes.len(), 2);
    assert!(named(&envelopes, "a")[0].kind.is_none());

    let b = named(&envelopes, "b")[0];
    assert_eq!(b.kind, Some(ErrorKind::FatalEngineError));
    assert_eq!(b.operation_type, OperationKind::Query);
    assert_eq!(b.errors[0].message, "database unreachable");
}

#[tokio::test]
async fn test_fatal_subscription_error_ends_only_that_subscription() {
    let envelopes = run(
        &executor(),
        Batch::new("subscription s { failing } subscription t { count } query q { slow }"),
    )
    .await;

    let s = named(&envelopes, "s");
    assert_eq!(s.len(), 2);
    assert_eq!(s[0].data, Some(serde_json::json!({"failing": 1})));
    assert_eq!(s[1].kind, Some(ErrorKind::FatalEngineError));
    assert_eq!(s[1].errors[0].message, "broker went away");

    assert_eq!(named(&envelopes, "t").len(), 3);
    assert_eq!(
        named(&envelopes, "q")[0].data,
        Some(serde_json::json!({"slow": "finally"}))
    );
}

/// Sets a flag when dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn endless_executor(capacity: usize, dropped: Arc<AtomicBool>, pulls: Arc<AtomicUsize>) -> Executor {
    let mut resolvers = resolvers();
    resolvers.register_subscription("Subscription", "endless", move |_, _, _, _| {
        let guard = DropFlag(Arc::clone(&dropped));
        let pulls = Arc::clone(&pulls);
        Ok(async_stream::stream! {
            let _guard = guard;
            let mut n = 0i64;
            loop {
                pulls.fetch_add(1, Ordering::SeqCst);
                n += 1;
                yield Ok::<_, ResolverError>(serde_json::Value::from(n));
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
    });

    Executor::builder()
        .schema(schema())
        .engine(GraphQLEngine::new(resolvers))
        .capacity(capacity)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_closing_the_stream_releases_the_producer() {
    let dropped = Arc::new(AtomicBool::new(false));
    let executor = endless_executor(8, Arc::clone(&dropped), Arc::default());

    let mut stream = executor.execute_batch(Batch::new("subscription { endless }"));
    for expected in 1..=3 {
        let envelope = stream.next().await.unwrap();
        assert_eq!(envelope.data, Some(serde_json::json!({"endless": expected})));
    }

    stream.close();
    // Envelopes buffered before the close may still be drained; nothing
    // new is written once the runner has observed it.
    let drained = tokio::time::timeout(Duration::from_secs(5), stream.by_ref().count())
        .await
        .expect("stream did not end");
    assert!(drained <= 8);

    tokio::time::timeout(Duration::from_secs(5), async {
        while !dropped.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("producer was not released");
}

#[tokio::test]
async fn test_dropping_the_stream_releases_the_producer() {
    let dropped = Arc::new(AtomicBool::new(false));
    let executor = endless_executor(8, Arc::clone(&dropped), Arc::default());

    let mut stream = executor.execute_batch(Batch::new("subscription { endless }"));
    assert!(stream.next().await.is_some());
    drop(stream);

    tokio::time::timeout(Duration::from_secs(5), async {
        while !dropped.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("producer was not released");
}

#[tokio::test]
async fn test_slow_consumer_suspends_the_producer() {
    let pulls = Arc::new(AtomicUsize::new(0));
    let executor = endless_executor(1, Arc::default(), Arc::clone(&pulls));

    let mut stream = executor.execute_batch(Batch::new("subscription { endless }"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    // One slot of capacity: one event buffered, the next pull waits for room.
    assert_eq!(pulls.load(Ordering::SeqCst), 1);

    assert!(stream.next().await.is_some());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pulls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_quiet_subscriptions_leave_room_for_queries() {
    let cases = [
        (1, "subscription s { quiet } query q { ping }"),
        (2, "subscription s { quiet } subscription t { quiet } query q { ping }"),
    ];

    for (capacity, document) in cases {
        let executor = Executor::builder()
            .schema(schema())
            .engine(GraphQLEngine::new(resolvers()))
            .capacity(capacity)
            .build()
            .unwrap();

        let mut stream = executor.execute_batch(Batch::new(document));
        let envelope = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap_or_else(|_| panic!("query starved at capacity {capacity}"))
            .unwrap();
        assert_eq!(envelope.operation_name, "q");
        assert_eq!(envelope.data, Some(serde_json::json!({"ping": "pong"})));
    }
}

#[tokio::test]
async fn test_subscription_root_reaches_the_source() {
    let mut resolvers = ResolverMap::new();
    resolvers.register_subscription("Subscription", "count", |root, _, _, _| {
        let step = root["step"].as_i64().unwrap_or(1);
        Ok(futures::stream::iter(
            (1..=2).map(move |n| Ok::<_, ResolverError>(serde_json::Value::from(n * step))),
        ))
    });
    let executor = Executor::builder()
        .schema(schema())
        .engine(GraphQLEngine::new(resolvers))
        .subscription_root(serde_json::json!({"step": 10, "endless": [5, 6, 7]}))
        .build()
        .unwrap();

    let envelopes = run(
        &executor,
        Batch::new("subscription a { count } subscription b { endless }"),
    )
    .await;

    let counts: Vec<_> = named(&envelopes, "a").iter().map(|e| e.data.clone()).collect();
    assert_eq!(
        counts,
        vec![
            Some(serde_json::json!({"count": 10})),
            Some(serde_json::json!({"count": 20})),
        ]
    );

    let replayed: Vec<_> = named(&envelopes, "b").iter().map(|e| e.data.clone()).collect();
    assert_eq!(
        replayed,
        vec![
            Some(serde_json::json!({"endless": 5})),
            Some(serde_json::json!({"endless": 6})),
            Some(serde_json::json!({"endless": 7})),
        ]
    );
}

#[tokio::test]
async fn test_lazy_context_is_computed_once_per_batch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::<Context>::new()));

    let mut resolvers = resolvers();
    let recorder = Arc::clone(&seen);
    resolvers.register_fn("Query", "whoami", move |_, _, ctx, _| {
        recorder.lock().unwrap().push(ctx.clone());
        Ok(ctx.value("user").cloned().unwrap_or_default())
    });

    let counter = Arc::clone(&calls);
    let executor = Executor::builder()
        .schema(schema())
        .engine(GraphQLEngine::new(resolvers))
        .context_with(move || {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            Ok(Context::new().with("user", format!("user-{call}")))
        })
        .build()
        .unwrap();

    let envelopes = run(&executor, Batch::new("query a { whoami } query b { whoami }")).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for envelope in &envelopes {
        assert_eq!(envelope.data, Some(serde_json::json!({"whoami": "user-0"})));
    }
    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].ptr_eq(&seen[1]));
    }

    run(&executor, Batch::new("{ whoami }")).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failing_context_producer() {
    let executor = Executor::builder()
        .schema(schema())
        .context_with(|| Err("session store unavailable".into()))
        .build()
        .unwrap();

    let envelopes = run(&executor, Batch::new("{ ping }")).await;
    assert_eq!(envelopes.len(), 1);
    assert_eq!(envelopes[0].kind, Some(ErrorKind::ContextError));
    assert_eq!(envelopes[0].operation_name, "none");
}

#[tokio::test]
async fn test_static_context_and_variables() {
    let mut resolvers = resolvers();
    resolvers
        .register_fn("Query", "ping", |_, _, ctx, _| {
            Ok(ctx.value("greeting").cloned().unwrap_or_default())
        })
        .register_fn("Query", "echo", |_, args, _, _| {
            Ok(args.get("value").cloned().unwrap_or_default())
        });
    let schema =
        Schema::parse(&format!("{SDL} extend type Query {{ echo(value: String!): String }}"))
            .unwrap();

    let executor = Executor::builder()
        .schema(schema)
        .engine(GraphQLEngine::new(resolvers))
        .context(Context::new().with("greeting", "hello"))
        .build()
        .unwrap();

    let envelopes = run(
        &executor,
        Batch::new("query a($v: String!) { echo(value: $v) ping }")
            .with_variable("v", serde_json::json!("echoed")),
    )
    .await;
    assert_eq!(
        envelopes[0].data,
        Some(serde_json::json!({"echo": "echoed", "ping": "hello"}))
    );
}

#[tokio::test]
async fn test_panicking_operation_is_contained() {
    let mut resolvers = resolvers();
    resolvers.register_fn("Query", "boom", |_, _, _, _| panic!("resolver bug"));
    let executor = Executor::builder()
        .schema(schema())
        .engine(GraphQLEngine::new(resolvers))
        .build()
        .unwrap();

    let envelopes = run(&executor, Batch::new("query a { ping } query b { boom }")).await;

    assert_eq!(envelopes.len(), 2);
    assert!(named(&envelopes, "a")[0].kind.is_none());
    let b = named(&envelopes, "b")[0];
    assert_eq!(b.kind, Some(ErrorKind::FatalEngineError));
    assert_eq!(b.errors[0].message, "Operation \"b\" panicked");
}

#[tokio::test]
async fn test_subscription_that_cannot_start() {
    // No source stream is registered for `endless` here.
    let envelopes = run(&executor(), Batch::new("subscription s { endless }")).await;

    assert_eq!(envelopes.len(), 1);
    assert_eq!(envelopes[0].kind, Some(ErrorKind::SubscriptionError));
    assert_eq!(envelopes[0].operation_type, OperationKind::Subscription);
    assert_eq!(envelopes[0].operation_name, "s");
}
