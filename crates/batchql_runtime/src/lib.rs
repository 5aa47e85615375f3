//! Reference GraphQL engine for batchql.
//!
//! This crate provides everything the batch executor needs from a GraphQL
//! implementation:
//! - `document`: Parsed executable documents that remember their source
//! - `schema`: Schema definition and building
//! - `validation`: Document validation against a schema
//! - `separate`: Splitting a document into one document per operation
//! - `execution`: Query, mutation and subscription execution
//! - `resolver`: Field and subscription resolvers
//! - `engine`: The [`QueryEngine`] seam and [`GraphQLEngine`]

pub mod context;
pub mod document;
pub mod engine;
pub mod error;
mod execution;
pub mod resolver;
pub mod response;
pub mod schema;
pub mod separate;
pub mod validation;
pub mod value;

pub use context::Context;
pub use document::ExecutableDocument;
pub use engine::{ExecutionRequest, GraphQLEngine, QueryEngine, ResponseStream, Subscription};
pub use error::{EngineError, GraphQLError, PathSegment};
pub use resolver::{
    Resolver, ResolverArgs, ResolverError, ResolverInfo, ResolverMap, ResolverResult,
    SourceStream, SubscriptionResolver,
};
pub use response::Response;
pub use schema::{Schema, SchemaBuilder, SchemaError, TypeDef, TypeRef};
pub use separate::split_operations;
pub use validation::validate;
pub use value::Variables;
