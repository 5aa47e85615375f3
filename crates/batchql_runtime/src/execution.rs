//! Execution of queries, mutations and subscriptions.
//!
//! Query fields resolve concurrently, mutation root fields one after the
//! other. A soft resolver error nulls its field and is reported with a
//! location and path; `null` in a non-null position bubbles up to the
//! nearest nullable parent. A fatal resolver error aborts the operation.

use crate::context::Context;
use crate::document::ExecutableDocument;
use crate::engine::{ExecutionRequest, Subscription};
use crate::error::{EngineError, GraphQLError, PathSegment};
use crate::resolver::{ResolverArgs, ResolverError, ResolverInfo, ResolverMap, SourceStream};
use crate::response::Response;
use crate::schema::{FieldDef, Schema, TypeDef, TypeRef};
use crate::value::{const_value, value_from_ast, Variables};
use batchql_syntax::ast::{
    Directive, Field, FragmentDefinition, OperationDefinition, OperationType, Selection,
    SelectionSet, Value as AstValue,
};
use futures::future::join_all;
use futures::StreamExt;
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Why a value could not be completed.
enum Bubble {
    /// `null` reached a non-null position; the error is already recorded.
    Null,
    /// The operation must be aborted.
    Fatal(EngineError),
}

type FieldResult = Result<Value, Bubble>;
type FieldFuture<'b> = Pin<Box<dyn Future<Output = FieldResult> + Send + 'b>>;

/// Fields grouped by response key, in selection order.
type GroupedFields<'a> = IndexMap<&'a str, Vec<&'a Field>>;

/// Executes a query or mutation.
pub(crate) async fn execute(
    resolvers: &ResolverMap,
    request: &ExecutionRequest,
) -> Result<Response, EngineError> {
    let (operation, root_type, variables) = match prepare(request) {
        Ok(prepared) => prepared,
        Err(response) => return Ok(response),
    };

    tracing::debug!(
        operation_type = operation.operation.as_str(),
        operation_name = operation.name().unwrap_or("anon"),
        "executing operation"
    );

    let ctx = ExecutionContext::new(
        &request.schema,
        &request.document,
        resolvers,
        &request.context,
        variables,
    );
    let fields = ctx.collect_root_fields(root_type, &operation.selection_set);

    let result = if operation.operation == OperationType::Mutation {
        ctx.execute_fields_serially(root_type, &request.root_value, &fields, Vec::new())
            .await
    } else {
        ctx.execute_fields(root_type, &request.root_value, &fields, Vec::new())
            .await
    };

    let data = match result {
        Ok(data) => data,
        Err(Bubble::Null) => Value::Null,
        Err(Bubble::Fatal(error)) => return Err(error),
    };

    Ok(Response {
        data: Some(data),
        errors: ctx.into_errors(),
    })
}

/// Opens a subscription: resolves the source stream of the single root
/// field and maps every source event to a response.
pub(crate) async fn subscribe(
    resolvers: Arc<ResolverMap>,
    request: ExecutionRequest,
) -> Result<Subscription, EngineError> {
    let (operation, root_type, variables) = match prepare(&request) {
        Ok(prepared) => prepared,
        Err(response) => return Ok(Subscription::Immediate(response)),
    };

    let ctx = ExecutionContext::new(
        &request.schema,
        &request.document,
        &resolvers,
        &request.context,
        variables.clone(),
    );
    let fields = ctx.collect_root_fields(root_type, &operation.selection_set);
    let Some((response_key, nodes)) = fields.first() else {
        return Ok(Subscription::Immediate(Response::error(GraphQLError::new(
            "Subscription must select a root field.",
        ))));
    };

    let field = nodes[0];
    let name = field.name.as_str();
    let path = vec![PathSegment::from(*response_key)];
    let location = request.document.locate(field.span);

    let Some(def) = request.schema.field(root_type, name) else {
        return Ok(Subscription::Immediate(Response::error(
            GraphQLError::new(format!("The subscription field \"{name}\" is not defined."))
                .with_location(location),
        )));
    };
    let args = ctx.arguments(def, field);
    let info = ResolverInfo::new(name, root_type)
        .with_return_type(def.ty.to_string())
        .with_path(path.clone());

    let opened = match resolvers.subscription(root_type, name) {
        Some(resolver) => resolver.subscribe(&request.root_value, &args, &request.context, &info),
        None => match root_source(&request.root_value, name) {
            Some(source) => Ok(source),
            None => {
                return Ok(Subscription::Immediate(Response::error(
                    GraphQLError::new(format!(
                        "Subscription field \"{root_type}.{name}\" has no source stream."
                    ))
                    .with_location(location)
                    .with_path(path),
                )))
            }
        },
    };

    let source = match opened {
        Ok(source) => source,
        Err(error) if error.is_fatal() => {
            return Err(EngineError::Fatal {
                message: error.to_string(),
                path,
            })
        }
        Err(error) => {
            return Ok(Subscription::Immediate(Response::error(
                GraphQLError::new(error.to_string())
                    .with_location(location)
                    .with_path(path),
            )))
        }
    };

    let state = Arc::new(SubscriptionState {
        response_key: (*response_key).to_string(),
        schema: Arc::clone(&request.schema),
        document: request.document.clone(),
        context: request.context.clone(),
        variables,
        resolvers: Arc::clone(&resolvers),
    });

    let responses = source.then(move |event| {
        let state = Arc::clone(&state);
        async move { state.respond(event).await }
    });

    Ok(Subscription::Stream(responses.boxed()))
}

/// A list stored under `name` on the root value, replayed as a finite
/// source stream.
fn root_source(root: &Value, name: &str) -> Option<SourceStream> {
    let Value::Array(events) = root.get(name)? else {
        return None;
    };
    let events = events.clone();
    Some(futures::stream::iter(events.into_iter().map(Ok)).boxed())
}

/// Everything needed to turn a source event into a response, owned so the
/// response stream is `'static`.
struct SubscriptionState {
    response_key: String,
    schema: Arc<Schema>,
    document: ExecutableDocument,
    context: Context,
    variables: Variables,
    resolvers: Arc<ResolverMap>,
}

impl SubscriptionState {
    async fn respond(&self, event: Result<Value, ResolverError>) -> Result<Response, EngineError> {
        let path = vec![PathSegment::Field(self.response_key.clone())];

        let event = match event {
            Ok(event) => event,
            Err(error) if error.is_fatal() => {
                return Err(EngineError::Fatal {
                    message: error.to_string(),
                    path,
                })
            }
            Err(error) => {
                return Ok(Response::error(
                    GraphQLError::new(error.to_string()).with_path(path),
                ))
            }
        };

        let operation = match self.document.operation(None) {
            Ok(operation) => operation,
            Err(error) => return Ok(Response::error(error)),
        };
        let Some(root_type) = self.schema.root_type(OperationType::Subscription) else {
            return Ok(Response::error(GraphQLError::new(
                "Schema is not configured for subscriptions.",
            )));
        };

        let ctx = ExecutionContext::new(
            &self.schema,
            &self.document,
            &self.resolvers,
            &self.context,
            self.variables.clone(),
        );
        let fields = ctx.collect_root_fields(root_type, &operation.selection_set);
        let Some(nodes) = fields.get(self.response_key.as_str()) else {
            return Ok(Response::data(Value::Object(serde_json::Map::new())));
        };
        let Some(def) = self.schema.field(root_type, nodes[0].name.as_str()) else {
            return Ok(Response::data(Value::Object(serde_json::Map::new())));
        };

        let completed = ctx
            .complete_value(&def.ty, root_type, nodes, event, path)
            .await;
        let data = match completed {
            Ok(value) => Value::Object([(self.response_key.clone(), value)].into_iter().collect()),
            Err(Bubble::Null) if !def.ty.is_non_null() => {
                Value::Object([(self.response_key.clone(), Value::Null)].into_iter().collect())
            }
            Err(Bubble::Null) => Value::Null,
            Err(Bubble::Fatal(error)) => return Err(error),
        };

        Ok(Response {
            data: Some(data),
            errors: ctx.into_errors(),
        })
    }
}

/// Picks the operation, its root type and the coerced variables, or the
/// response explaining why the request cannot run.
fn prepare(
    request: &ExecutionRequest,
) -> Result<(&OperationDefinition, &str, Variables), Response> {
    let operation = request.document.operation(None).map_err(Response::error)?;

    let Some(root_type) = request.schema.root_type(operation.operation) else {
        let plural = match operation.operation {
            OperationType::Query => "queries",
            OperationType::Mutation => "mutations",
            OperationType::Subscription => "subscriptions",
        };
        return Err(Response::error(
            GraphQLError::new(format!("Schema is not configured for {plural}."))
                .with_location(request.document.locate(operation.span)),
        ));
    };

    let variables = coerce_variables(&request.document, operation, &request.variables)
        .map_err(Response::errors)?;

    Ok((operation, root_type, variables))
}

/// Applies defaults and checks required variables.
fn coerce_variables(
    document: &ExecutableDocument,
    operation: &OperationDefinition,
    provided: &Variables,
) -> Result<Variables, Vec<GraphQLError>> {
    let mut coerced = Variables::new();
    let mut errors = Vec::new();

    for definition in &operation.variables {
        let name = definition.name.as_str();
        let location = document.locate(definition.span);

        match provided.get(name) {
            Some(Value::Null) if definition.ty.is_non_null() => errors.push(
                GraphQLError::new(format!(
                    "Variable \"${name}\" of non-null type \"{}\" must not be null.",
                    definition.ty
                ))
                .with_location(location),
            ),
            Some(value) => {
                coerced.insert(name.to_string(), value.clone());
            }
            None => match &definition.default_value {
                Some(default) => {
                    coerced.insert(name.to_string(), const_value(default));
                }
                None if definition.ty.is_non_null() => errors.push(
                    GraphQLError::new(format!(
                        "Variable \"${name}\" of required type \"{}\" was not provided.",
                        definition.ty
                    ))
                    .with_location(location),
                ),
                None => {}
            },
        }
    }

    if errors.is_empty() {
        Ok(coerced)
    } else {
        Err(errors)
    }
}

/// Execution context.
struct ExecutionContext<'a> {
    schema: &'a Schema,
    document: &'a ExecutableDocument,
    fragments: FxHashMap<&'a str, &'a FragmentDefinition>,
    resolvers: &'a ResolverMap,
    context: &'a Context,
    variables: Variables,
    errors: Mutex<Vec<GraphQLError>>,
}

impl<'a> ExecutionContext<'a> {
    fn new(
        schema: &'a Schema,
        document: &'a ExecutableDocument,
        resolvers: &'a ResolverMap,
        context: &'a Context,
        variables: Variables,
    ) -> Self {
        let fragments = document
            .ast()
            .fragments()
            .map(|fragment| (fragment.name.as_str(), fragment))
            .collect();
        Self {
            schema,
            document,
            fragments,
            resolvers,
            context,
            variables,
            errors: Mutex::new(Vec::new()),
        }
    }

    fn into_errors(self) -> Vec<GraphQLError> {
        self.errors.into_inner()
    }

    async fn record(&self, error: GraphQLError) {
        self.errors.lock().await.push(error);
    }

    fn collect_root_fields(
        &self,
        object_type: &str,
        selection_set: &'a SelectionSet,
    ) -> GroupedFields<'a> {
        let mut fields = GroupedFields::new();
        let mut visited = FxHashSet::default();
        self.collect_fields(object_type, selection_set, &mut fields, &mut visited);
        fields
    }

    /// Groups the fields selected on `object_type` by response key,
    /// flattening fragments whose type condition applies.
    fn collect_fields(
        &self,
        object_type: &str,
        selection_set: &'a SelectionSet,
        fields: &mut GroupedFields<'a>,
        visited: &mut FxHashSet<&'a str>,
    ) {
        for selection in &selection_set.selections {
            match selection {
                Selection::Field(field) => {
                    if self.should_include(&field.directives) {
                        fields.entry(field.response_key()).or_default().push(field);
                    }
                }
                Selection::FragmentSpread(spread) => {
                    let name = spread.name.as_str();
                    if !self.should_include(&spread.directives) || !visited.insert(name) {
                        continue;
                    }
                    let Some(fragment) = self.fragments.get(name).copied() else {
                        continue;
                    };
                    if self
                        .schema
                        .type_applies(&fragment.type_condition.value, object_type)
                    {
                        self.collect_fields(object_type, &fragment.selection_set, fields, visited);
                    }
                }
                Selection::InlineFragment(inline) => {
                    let applies = inline
                        .type_condition
                        .as_ref()
                        .map_or(true, |tc| self.schema.type_applies(&tc.value, object_type));
                    if applies && self.should_include(&inline.directives) {
                        self.collect_fields(object_type, &inline.selection_set, fields, visited);
                    }
                }
            }
        }
    }

    /// Evaluates `@skip(if:)` and `@include(if:)`.
    fn should_include(&self, directives: &[Directive]) -> bool {
        directives.iter().all(|directive| {
            let condition = directive
                .arguments
                .iter()
                .find(|argument| argument.name.value == "if")
                .map(|argument| value_from_ast(&argument.value, &self.variables));
            match (directive.name.as_str(), condition) {
                ("skip", Some(Value::Bool(true))) | ("include", Some(Value::Bool(false))) => false,
                _ => true,
            }
        })
    }

    /// Builds resolver arguments: literals, variables, then defaults.
    fn arguments(&self, def: &FieldDef, field: &Field) -> ResolverArgs {
        let mut args = ResolverArgs::new();
        for (name, arg_def) in &def.arguments {
            let provided = field
                .arguments
                .iter()
                .find(|argument| argument.name.value == *name)
                .filter(|argument| match &argument.value {
                    AstValue::Variable(var) => self.variables.contains_key(&var.value),
                    _ => true,
                })
                .map(|argument| value_from_ast(&argument.value, &self.variables));
            if let Some(value) = provided.or_else(|| arg_def.default_value.clone()) {
                args.set(name.clone(), value);
            }
        }
        args
    }

    /// Executes grouped fields concurrently.
    async fn execute_fields(
        &self,
        object_type: &str,
        parent: &Value,
        fields: &GroupedFields<'a>,
        path: Vec<PathSegment>,
    ) -> FieldResult {
        let results = join_all(fields.iter().map(|(key, nodes)| {
            let mut field_path = path.clone();
            field_path.push(PathSegment::from(*key));
            self.resolve_field(object_type, parent, nodes, field_path)
        }))
        .await;

        let mut object = serde_json::Map::with_capacity(results.len());
        let mut null = false;
        for ((key, _), result) in fields.iter().zip(results) {
            match result {
                Ok(value) => {
                    object.insert((*key).to_string(), value);
                }
                Err(Bubble::Null) => null = true,
                Err(fatal) => return Err(fatal),
            }
        }

        if null {
            Err(Bubble::Null)
        } else {
            Ok(Value::Object(object))
        }
    }

    /// Executes grouped fields one after the other.
    async fn execute_fields_serially(
        &self,
        object_type: &str,
        parent: &Value,
        fields: &GroupedFields<'a>,
        path: Vec<PathSegment>,
    ) -> FieldResult {
        let mut object = serde_json::Map::with_capacity(fields.len());
        for (key, nodes) in fields {
            let mut field_path = path.clone();
            field_path.push(PathSegment::from(*key));
            let value = self
                .resolve_field(object_type, parent, nodes, field_path)
                .await?;
            object.insert((*key).to_string(), value);
        }
        Ok(Value::Object(object))
    }

    fn resolve_field<'b>(
        &'b self,
        parent_type: &'b str,
        parent: &'b Value,
        nodes: &'b [&'a Field],
        path: Vec<PathSegment>,
    ) -> FieldFuture<'b> {
        Box::pin(async move {
            let field = nodes[0];
            let name = field.name.as_str();

            if name == "__typename" {
                return Ok(Value::String(parent_type.to_string()));
            }

            // Unknown fields are rejected by validation.
            let Some(def) = self.schema.field(parent_type, name) else {
                return Ok(Value::Null);
            };

            let args = self.arguments(def, field);
            let info = ResolverInfo::new(name, parent_type)
                .with_return_type(def.ty.to_string())
                .with_path(path.clone());

            let resolved = match self.resolvers.get(parent_type, name) {
                Some(resolver) => resolver.resolve(parent, &args, self.context, &info).await,
                None => Ok(Value::Null),
            };

            let completed = match resolved {
                Ok(value) => {
                    self.complete_value(&def.ty, parent_type, nodes, value, path)
                        .await
                }
                Err(error) if error.is_fatal() => Err(Bubble::Fatal(EngineError::Fatal {
                    message: error.to_string(),
                    path,
                })),
                Err(error) => {
                    self.record(
                        GraphQLError::new(error.to_string())
                            .with_location(self.document.locate(field.span))
                            .with_path(path),
                    )
                    .await;
                    Err(Bubble::Null)
                }
            };

            match completed {
                Err(Bubble::Null) if !def.ty.is_non_null() => Ok(Value::Null),
                other => other,
            }
        })
    }

    fn complete_value<'b>(
        &'b self,
        ty: &'b TypeRef,
        parent_type: &'b str,
        nodes: &'b [&'a Field],
        value: Value,
        path: Vec<PathSegment>,
    ) -> FieldFuture<'b> {
        Box::pin(async move {
            let field = nodes[0];

            match ty {
                TypeRef::NonNull(inner) => {
                    let completed = self
                        .complete_value(inner, parent_type, nodes, value, path.clone())
                        .await?;
                    if completed.is_null() {
                        self.record(
                            GraphQLError::new(format!(
                                "Cannot return null for non-nullable field {parent_type}.{}.",
                                field.name.value
                            ))
                            .with_location(self.document.locate(field.span))
                            .with_path(path),
                        )
                        .await;
                        return Err(Bubble::Null);
                    }
                    Ok(completed)
                }
                _ if value.is_null() => Ok(Value::Null),
                TypeRef::List(inner) => {
                    let Value::Array(items) = value else {
                        self.record(
                            GraphQLError::new(format!(
                                "Expected Iterable, but did not find one for field \"{parent_type}.{}\".",
                                field.name.value
                            ))
                            .with_location(self.document.locate(field.span))
                            .with_path(path),
                        )
                        .await;
                        return Err(Bubble::Null);
                    };

                    let completed = join_all(items.into_iter().enumerate().map(|(index, item)| {
                        let mut item_path = path.clone();
                        item_path.push(PathSegment::Index(index));
                        self.complete_value(inner, parent_type, nodes, item, item_path)
                    }))
                    .await;

                    let mut list = Vec::with_capacity(completed.len());
                    for item in completed {
                        match item {
                            Ok(value) => list.push(value),
                            Err(Bubble::Null) if !inner.is_non_null() => list.push(Value::Null),
                            Err(bubble) => return Err(bubble),
                        }
                    }
                    Ok(Value::Array(list))
                }
                TypeRef::Named(name) => match self.schema.get_type(name) {
                    Some(TypeDef::Object(object)) => {
                        self.complete_object(&object.name, nodes, value, path).await
                    }
                    Some(TypeDef::Interface(_) | TypeDef::Union(_)) => {
                        match self.resolve_abstract_type(name, &value) {
                            Some(object_type) => {
                                self.complete_object(object_type, nodes, value, path).await
                            }
                            None => {
                                self.record(
                                    GraphQLError::new(format!(
                                        "Abstract type \"{name}\" must resolve to an object type at runtime for field \"{parent_type}.{}\".",
                                        field.name.value
                                    ))
                                    .with_location(self.document.locate(field.span))
                                    .with_path(path),
                                )
                                .await;
                                Err(Bubble::Null)
                            }
                        }
                    }
                    _ => Ok(value),
                },
            }
        })
    }

    /// Picks the concrete type from `__typename`, or the only possible type.
    fn resolve_abstract_type(&self, abstract_type: &str, value: &Value) -> Option<&'a str> {
        if let Some(typename) = value.get("__typename").and_then(Value::as_str) {
            let (name, _) = self.schema.types.get_key_value(typename)?;
            return self
                .schema
                .type_applies(abstract_type, name)
                .then_some(name.as_str());
        }
        match self.schema.possible_types(abstract_type).as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    async fn complete_object(
        &self,
        object_type: &str,
        nodes: &[&'a Field],
        value: Value,
        path: Vec<PathSegment>,
    ) -> FieldResult {
        let mut fields = GroupedFields::new();
        let mut visited = FxHashSet::default();
        for node in nodes {
            if let Some(selection_set) = &node.selection_set {
                self.collect_fields(object_type, selection_set, &mut fields, &mut visited);
            }
        }
        self.execute_fields(object_type, &value, &fields, path).await
    }
}
