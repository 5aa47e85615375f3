//! Concurrent batch executor for GraphQL documents.
//!
//! A document holding several operations is split, every operation runs
//! concurrently, and results come back through one bounded stream as soon
//! as they are available, including every event of long-lived
//! subscriptions.
//!
//! - `splitter`: Parse, validate and split a document into operations
//! - `context`: Bind operations to the schema, root values and context
//! - `runner`: Run one query, mutation or subscription
//! - `multiplexer`: The bounded per-batch result channel
//! - `error`: Error classification
//! - `executor`: The public [`Executor`]
//!
//! ```no_run
//! use batchql_executor::{Batch, Executor};
//! use batchql_runtime::{GraphQLEngine, ResolverMap, Schema};
//! use futures::StreamExt;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut resolvers = ResolverMap::new();
//! resolvers.register_fn("Query", "ping", |_, _, _, _| Ok("pong".into()));
//!
//! let executor = Executor::builder()
//!     .schema(Schema::parse("type Query { ping: String }")?)
//!     .engine(GraphQLEngine::new(resolvers))
//!     .build()?;
//!
//! let mut results = executor.execute_batch(Batch::new("query a { ping } query b { ping }"));
//! while let Some(envelope) = results.next().await {
//!     println!("{}", serde_json::to_string(&envelope)?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod context;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod multiplexer;
pub mod runner;
pub mod splitter;

pub use batch::{Batch, BatchHandle};
pub use config::ExecutorConfig;
pub use context::{BoxError, ContextSource, ExecutionDescriptor, RootValues};
pub use envelope::{Envelope, OperationKind};
pub use error::{ErrorKind, ExecutorError, ProcessingError};
pub use executor::{Executor, ExecutorBuilder};
pub use multiplexer::{ResultSink, ResultStream, SinkClosed};
pub use runner::RunOutcome;
pub use splitter::Operation;
