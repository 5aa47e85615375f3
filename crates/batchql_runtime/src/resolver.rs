//! Resolver system.
//!
//! This module provides the resolver traits and the [`ResolverMap`] the
//! engine looks fields up in.

use crate::context::Context;
use crate::error::PathSegment;
use futures::stream::{BoxStream, Stream, StreamExt};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Arguments passed to a resolver.
#[derive(Debug, Clone, Default)]
pub struct ResolverArgs {
    args: serde_json::Map<String, Value>,
}

impl ResolverArgs {
    /// Creates new resolver args.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates resolver args from a list of (name, value) pairs.
    pub fn from_pairs(pairs: Vec<(String, Value)>) -> Self {
        Self {
            args: pairs.into_iter().collect(),
        }
    }

    /// Gets an argument by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// Gets an argument as a specific type.
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.args
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Gets a required argument, returning an error if not found.
    pub fn require<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T, ResolverError> {
        self.args
            .get(name)
            .ok_or_else(|| ResolverError::MissingArgument(name.to_string()))
            .and_then(|v| {
                serde_json::from_value(v.clone())
                    .map_err(|e| ResolverError::ArgumentParseError(name.to_string(), e.to_string()))
            })
    }

    /// Returns all arguments.
    pub fn all(&self) -> &serde_json::Map<String, Value> {
        &self.args
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Sets an argument.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.args.insert(name.into(), value);
    }
}

/// Info about the field being resolved.
#[derive(Debug, Clone)]
pub struct ResolverInfo {
    /// The field name being resolved.
    pub field_name: String,

    /// The return type, e.g. `[User!]`.
    pub return_type: String,

    /// The parent type name.
    pub parent_type: String,

    /// Path to this field.
    pub path: Vec<PathSegment>,
}

impl ResolverInfo {
    /// Creates new resolver info.
    pub fn new(field_name: impl Into<String>, parent_type: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            return_type: String::new(),
            parent_type: parent_type.into(),
            path: Vec::new(),
        }
    }

    /// Sets the return type.
    #[must_use]
    pub fn with_return_type(mut self, ty: impl Into<String>) -> Self {
        self.return_type = ty.into();
        self
    }

    /// Sets the path.
    #[must_use]
    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = path;
        self
    }
}

/// Result type for resolvers.
pub type ResolverResult = Result<Value, ResolverError>;

/// Future type for async resolvers.
pub type ResolverFuture<'a> = Pin<Box<dyn Future<Output = ResolverResult> + Send + 'a>>;

/// Error from a resolver.
///
/// Every variant except [`ResolverError::Fatal`] is a GraphQL error: the
/// field becomes `null` and the message is reported in the response. A
/// fatal error aborts the operation instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolverError {
    /// Field not found.
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    /// Missing required argument.
    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    /// Argument parse error.
    #[error("Failed to parse argument '{0}': {1}")]
    ArgumentParseError(String, String),

    /// Custom error.
    #[error("{0}")]
    Custom(String),

    /// A failure that is not a GraphQL error, e.g. a lost connection.
    #[error("{0}")]
    Fatal(String),
}

impl ResolverError {
    /// Creates a custom (soft) error.
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }

    /// Creates a fatal error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    /// Returns true for errors that abort the operation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Trait for field resolvers.
pub trait Resolver: Send + Sync {
    /// Resolves a field value.
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a>;
}

/// A boxed resolver.
pub type BoxedResolver = Box<dyn Resolver>;

/// A sync resolver function.
pub type SyncResolverFn =
    Arc<dyn Fn(&Value, &ResolverArgs, &Context, &ResolverInfo) -> ResolverResult + Send + Sync>;

/// A wrapper for sync resolver functions.
pub struct FnResolver {
    func: SyncResolverFn,
}

impl FnResolver {
    /// Creates a new function resolver.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value, &ResolverArgs, &Context, &ResolverInfo) -> ResolverResult
            + Send
            + Sync
            + 'static,
    {
        Self { func: Arc::new(f) }
    }
}

impl Resolver for FnResolver {
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        let result = (self.func)(parent, args, ctx, info);
        Box::pin(async move { result })
    }
}

/// An async resolver function type.
pub type AsyncResolverFn = Arc<
    dyn Fn(Value, ResolverArgs, Context, ResolverInfo) -> ResolverFuture<'static> + Send + Sync,
>;

/// A wrapper for async resolver functions.
pub struct AsyncFnResolver {
    func: AsyncResolverFn,
}

impl AsyncFnResolver {
    /// Creates a new async function resolver.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Value, ResolverArgs, Context, ResolverInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResolverResult> + Send + 'static,
    {
        Self {
            func: Arc::new(move |parent, args, ctx, info| Box::pin(f(parent, args, ctx, info))),
        }
    }
}

impl Resolver for AsyncFnResolver {
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        let parent = parent.clone();
        let args = args.clone();
        let ctx = ctx.clone();
        let info = info.clone();
        let func = Arc::clone(&self.func);
        Box::pin(async move { func(parent, args, ctx, info).await })
    }
}

/// Default resolver that accesses properties from the parent object.
pub struct DefaultResolver;

impl Resolver for DefaultResolver {
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        _args: &'a ResolverArgs,
        _ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        let field_name = &info.field_name;
        let result = match parent {
            Value::Object(map) => Ok(map
                .get(field_name)
                .or_else(|| map.get(&to_snake_case(field_name)))
                .cloned()
                .unwrap_or(Value::Null)),
            Value::Null => Ok(Value::Null),
            _ => Err(ResolverError::FieldNotFound(field_name.clone())),
        };
        Box::pin(async move { result })
    }
}

/// Converts camelCase to snake_case.
fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(c.to_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}

/// A stream of subscription source events.
pub type SourceStream = BoxStream<'static, Result<Value, ResolverError>>;

/// Trait for subscription fields: produces the source event stream.
///
/// Every event becomes the value of the subscription field for one
/// response. `root` is the subscription root value.
pub trait SubscriptionResolver: Send + Sync {
    /// Opens the source stream.
    fn subscribe(
        &self,
        root: &Value,
        args: &ResolverArgs,
        ctx: &Context,
        info: &ResolverInfo,
    ) -> Result<SourceStream, ResolverError>;
}

/// A wrapper for subscription functions.
pub struct FnSubscriptionResolver {
    func: Arc<
        dyn Fn(&Value, &ResolverArgs, &Context, &ResolverInfo) -> Result<SourceStream, ResolverError>
            + Send
            + Sync,
    >,
}

impl FnSubscriptionResolver {
    /// Creates a new subscription resolver.
    pub fn new<F, S>(f: F) -> Self
    where
        F: Fn(&Value, &ResolverArgs, &Context, &ResolverInfo) -> Result<S, ResolverError>
            + Send
            + Sync
            + 'static,
        S: Stream<Item = Result<Value, ResolverError>> + Send + 'static,
    {
        Self {
            func: Arc::new(
                move |root: &Value, args: &ResolverArgs, ctx: &Context, info: &ResolverInfo| {
                    f(root, args, ctx, info).map(|stream| stream.boxed())
                },
            ),
        }
    }
}

impl SubscriptionResolver for FnSubscriptionResolver {
    fn subscribe(
        &self,
        root: &Value,
        args: &ResolverArgs,
        ctx: &Context,
        info: &ResolverInfo,
    ) -> Result<SourceStream, ResolverError> {
        (self.func)(root, args, ctx, info)
    }
}

/// Storage for resolvers organized by type and field.
pub struct ResolverMap {
    /// Resolvers indexed by "TypeName.fieldName".
    resolvers: FxHashMap<String, BoxedResolver>,

    /// Subscription source resolvers indexed by "TypeName.fieldName".
    subscriptions: FxHashMap<String, Box<dyn SubscriptionResolver>>,

    /// Default resolver for unregistered fields.
    default_resolver: Option<BoxedResolver>,
}

fn key(type_name: &str, field_name: &str) -> String {
    format!("{type_name}.{field_name}")
}

impl Default for ResolverMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolverMap {
    /// Creates a new resolver map.
    pub fn new() -> Self {
        Self {
            resolvers: FxHashMap::default(),
            subscriptions: FxHashMap::default(),
            default_resolver: Some(Box::new(DefaultResolver)),
        }
    }

    /// Registers a resolver for a specific type and field.
    pub fn register<R: Resolver + 'static>(
        &mut self,
        type_name: impl AsRef<str>,
        field_name: impl AsRef<str>,
        resolver: R,
    ) -> &mut Self {
        self.resolvers.insert(
            key(type_name.as_ref(), field_name.as_ref()),
            Box::new(resolver),
        );
        self
    }

    /// Registers a sync function as a resolver.
    pub fn register_fn<F>(
        &mut self,
        type_name: impl AsRef<str>,
        field_name: impl AsRef<str>,
        f: F,
    ) -> &mut Self
    where
        F: Fn(&Value, &ResolverArgs, &Context, &ResolverInfo) -> ResolverResult
            + Send
            + Sync
            + 'static,
    {
        self.register(type_name, field_name, FnResolver::new(f))
    }

    /// Registers an async function as a resolver.
    pub fn register_async<F, Fut>(
        &mut self,
        type_name: impl AsRef<str>,
        field_name: impl AsRef<str>,
        f: F,
    ) -> &mut Self
    where
        F: Fn(Value, ResolverArgs, Context, ResolverInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResolverResult> + Send + 'static,
    {
        self.register(type_name, field_name, AsyncFnResolver::new(f))
    }

    /// Registers a function producing the source stream of a subscription
    /// field.
    pub fn register_subscription<F, S>(
        &mut self,
        type_name: impl AsRef<str>,
        field_name: impl AsRef<str>,
        f: F,
    ) -> &mut Self
    where
        F: Fn(&Value, &ResolverArgs, &Context, &ResolverInfo) -> Result<S, ResolverError>
            + Send
            + Sync
            + 'static,
        S: Stream<Item = Result<Value, ResolverError>> + Send + 'static,
    {
        self.subscriptions.insert(
            key(type_name.as_ref(), field_name.as_ref()),
            Box::new(FnSubscriptionResolver::new(f)),
        );
        self
    }

    /// Gets a resolver for a type and field.
    pub fn get(&self, type_name: &str, field_name: &str) -> Option<&dyn Resolver> {
        self.resolvers
            .get(&key(type_name, field_name))
            .or(self.default_resolver.as_ref())
            .map(|r| r.as_ref())
    }

    /// Gets the subscription resolver for a type and field.
    pub fn subscription(&self, type_name: &str, field_name: &str) -> Option<&dyn SubscriptionResolver> {
        self.subscriptions
            .get(&key(type_name, field_name))
            .map(|r| r.as_ref())
    }

    /// Sets the default resolver.
    pub fn set_default<R: Resolver + 'static>(&mut self, resolver: R) {
        self.default_resolver = Some(Box::new(resolver));
    }

    /// Removes the default resolver.
    pub fn remove_default(&mut self) {
        self.default_resolver = None;
    }
}

impl Debug for ResolverMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverMap")
            .field("resolver_count", &self.resolvers.len())
            .field("subscription_count", &self.subscriptions.len())
            .field("has_default", &self.default_resolver.is_some())
            .finish()
    }
}
