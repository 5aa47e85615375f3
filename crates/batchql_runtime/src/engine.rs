//! The query engine seam and its reference implementation.

use crate::context::Context;
use crate::document::ExecutableDocument;
use crate::error::{EngineError, GraphQLError};
use crate::execution;
use crate::resolver::ResolverMap;
use crate::response::Response;
use crate::schema::Schema;
use crate::separate;
use crate::validation;
use crate::value::Variables;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::sync::Arc;

/// Responses produced by a subscription, one per source event.
pub type ResponseStream = BoxStream<'static, Result<Response, EngineError>>;

/// Result of starting a subscription.
pub enum Subscription {
    /// The subscription is running.
    Stream(ResponseStream),
    /// The subscription could not start; the response explains why.
    Immediate(Response),
}

impl Subscription {
    /// Flattens both variants into a stream.
    pub fn into_stream(self) -> ResponseStream {
        match self {
            Self::Stream(stream) => stream,
            Self::Immediate(response) => stream::once(async move { Ok(response) }).boxed(),
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream(_) => f.write_str("Subscription::Stream(..)"),
            Self::Immediate(response) => {
                f.debug_tuple("Subscription::Immediate").field(response).finish()
            }
        }
    }
}

/// Everything one operation needs to run.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub schema: Arc<Schema>,
    /// A document holding exactly one operation and its fragments.
    pub document: ExecutableDocument,
    pub root_value: Value,
    pub context: Context,
    pub variables: Variables,
}

impl ExecutionRequest {
    /// Creates a request with a `null` root value, an empty context and no
    /// variables.
    pub fn new(schema: Arc<Schema>, document: ExecutableDocument) -> Self {
        Self {
            schema,
            document,
            root_value: Value::Null,
            context: Context::default(),
            variables: Variables::new(),
        }
    }

    #[must_use]
    pub fn with_root_value(mut self, root_value: Value) -> Self {
        self.root_value = root_value;
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }
}

/// The operations a batch executor needs from a GraphQL implementation.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Parses a document.
    fn parse(&self, source: &str) -> Result<ExecutableDocument, Vec<GraphQLError>>;

    /// Validates a document against a schema. An empty result means valid.
    fn validate(&self, schema: &Schema, document: &ExecutableDocument) -> Vec<GraphQLError>;

    /// Splits a document into one document per operation.
    fn split_operations(&self, document: &ExecutableDocument) -> Vec<ExecutableDocument> {
        separate::split_operations(document)
    }

    /// Executes a query or mutation.
    async fn execute(&self, request: ExecutionRequest) -> Result<Response, EngineError>;

    /// Starts a subscription.
    async fn subscribe(&self, request: ExecutionRequest) -> Result<Subscription, EngineError>;
}

/// The built-in engine, driven by a [`ResolverMap`].
#[derive(Clone, Default)]
pub struct GraphQLEngine {
    resolvers: Arc<ResolverMap>,
}

impl GraphQLEngine {
    pub fn new(resolvers: ResolverMap) -> Self {
        Self {
            resolvers: Arc::new(resolvers),
        }
    }

    pub fn resolvers(&self) -> &ResolverMap {
        &self.resolvers
    }
}

#[async_trait]
impl QueryEngine for GraphQLEngine {
    fn parse(&self, source: &str) -> Result<ExecutableDocument, Vec<GraphQLError>> {
        ExecutableDocument::parse(source).map_err(|error| vec![error])
    }

    fn validate(&self, schema: &Schema, document: &ExecutableDocument) -> Vec<GraphQLError> {
        validation::validate(schema, document.ast())
            .into_iter()
            .map(|diagnostic| GraphQLError::from_diagnostic(&diagnostic, document.source()))
            .collect()
    }

    async fn execute(&self, request: ExecutionRequest) -> Result<Response, EngineError> {
        execution::execute(&self.resolvers, &request).await
    }

    async fn subscribe(&self, request: ExecutionRequest) -> Result<Subscription, EngineError> {
        execution::subscribe(Arc::clone(&self.resolvers), request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::parse("type Query { hello(name: String = \"world\"): String }").unwrap()
    }

    #[test]
    fn test_parse_reports_syntax_errors() {
        let errors = GraphQLEngine::default().parse("{ hello").unwrap_err();
        insta::assert_snapshot!(errors[0].message, @"Syntax Error: Expected Name, found <EOF>.");
        assert_eq!(errors[0].locations[0].line, 1);
    }

    #[test]
    fn test_validate_locates_errors() {
        let engine = GraphQLEngine::default();
        let document = engine.parse("{\n  goodbye\n}").unwrap();
        let errors = engine.validate(&schema(), &document);

        assert_eq!(errors.len(), 1);
        insta::assert_snapshot!(errors[0].message, @r#"Cannot query field "goodbye" on type "Query"."#);
        assert_eq!(errors[0].locations[0].line, 2);
        assert_eq!(errors[0].locations[0].column, 3);
    }

    #[tokio::test]
    async fn test_default_arguments_reach_resolvers() {
        let mut resolvers = ResolverMap::new();
        resolvers.register_fn("Query", "hello", |_, args, _, _| {
            let name: String = args.require("name")?;
            Ok(Value::String(format!("Hello, {name}!")))
        });
        let engine = GraphQLEngine::new(resolvers);

        let document = engine.parse("{ hello }").unwrap();
        let response = engine
            .execute(ExecutionRequest::new(Arc::new(schema()), document))
            .await
            .unwrap();
        assert_eq!(
            response.data.unwrap(),
            serde_json::json!({"hello": "Hello, world!"})
        );
    }

    #[tokio::test]
    async fn test_root_value_feeds_default_resolver() {
        let engine = GraphQLEngine::default();
        let document = engine.parse("{ hello }").unwrap();
        let response = engine
            .execute(
                ExecutionRequest::new(Arc::new(schema()), document)
                    .with_root_value(serde_json::json!({"hello": "from root"})),
            )
            .await
            .unwrap();
        assert_eq!(response.data.unwrap(), serde_json::json!({"hello": "from root"}));
    }

    #[tokio::test]
    async fn test_immediate_subscription_flattens_to_one_item() {
        let items: Vec<_> = Subscription::Immediate(Response::error(GraphQLError::new("nope")))
            .into_stream()
            .collect()
            .await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap().errors[0].message, "nope");
    }
}
