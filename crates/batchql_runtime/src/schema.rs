//! Schema definition.
//!
//! Schemas are usually built from SDL with [`Schema::parse`]; the
//! [`SchemaBuilder`] is available for assembling one in code.

use crate::value::const_value;
use batchql_syntax::ast;
use batchql_syntax::OperationType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Errors raised while building a schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// The SDL did not parse.
    #[error("{0}")]
    Syntax(String),

    /// A type was referenced but never defined.
    #[error("Unknown type \"{0}\".")]
    UnknownType(String),

    /// A type was defined twice.
    #[error("There can be only one type named \"{0}\".")]
    DuplicateType(String),

    /// No query root type could be found.
    #[error("Query root type must be provided.")]
    MissingQueryType,

    /// A definition that has no meaning in a schema document.
    #[error("{0}")]
    Invalid(String),
}

/// A GraphQL schema.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub query_type: Option<String>,
    pub mutation_type: Option<String>,
    pub subscription_type: Option<String>,
    pub types: IndexMap<String, TypeDef>,
}

impl Schema {
    /// Creates a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a schema from SDL.
    ///
    /// Root operation types come from a `schema { ... }` definition when
    /// present, otherwise from types named `Query`, `Mutation` and
    /// `Subscription`.
    pub fn parse(sdl: &str) -> Result<Self, SchemaError> {
        let document =
            batchql_syntax::parse(sdl).map_err(|diag| SchemaError::Syntax(diag.message))?;

        let mut builder = SchemaBuilder::new();
        let mut roots = Vec::new();
        let mut extensions = Vec::new();

        for definition in document.definitions {
            match definition {
                ast::Definition::Type(def) => {
                    let type_def = TypeDef::from_ast(def);
                    if builder.has_user_type(type_def.name()) {
                        return Err(SchemaError::DuplicateType(type_def.name().to_string()));
                    }
                    builder = builder.add_type(type_def);
                }
                ast::Definition::TypeExtension(def) => extensions.push(TypeDef::from_ast(def)),
                ast::Definition::Schema(schema) => roots.extend(schema.operations),
                // Directive definitions carry no runtime behavior.
                ast::Definition::Directive(_) => {}
                ast::Definition::Operation(_) | ast::Definition::Fragment(_) => {
                    return Err(SchemaError::Invalid(
                        "Executable definitions are not allowed in a schema.".to_string(),
                    ));
                }
            }
        }

        for extension in extensions {
            builder = builder.extend_type(extension)?;
        }

        if roots.is_empty() {
            for (operation, name) in [
                (OperationType::Query, "Query"),
                (OperationType::Mutation, "Mutation"),
                (OperationType::Subscription, "Subscription"),
            ] {
                if builder.schema.types.contains_key(name) {
                    builder = builder.root_type(operation, name);
                }
            }
        } else {
            for (operation, name) in roots {
                builder = builder.root_type(operation, name.value);
            }
        }

        builder.try_build()
    }

    /// Gets a type by name.
    pub fn get_type(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    /// Returns all types.
    pub fn types(&self) -> impl Iterator<Item = (&String, &TypeDef)> {
        self.types.iter()
    }

    /// Name of the root type for an operation kind.
    pub fn root_type(&self, operation: OperationType) -> Option<&str> {
        match operation {
            OperationType::Query => self.query_type.as_deref(),
            OperationType::Mutation => self.mutation_type.as_deref(),
            OperationType::Subscription => self.subscription_type.as_deref(),
        }
    }

    /// Looks up a field on an object or interface type.
    pub fn field(&self, type_name: &str, field_name: &str) -> Option<&FieldDef> {
        match self.types.get(type_name)? {
            TypeDef::Object(def) => def.fields.get(field_name),
            TypeDef::Interface(def) => def.fields.get(field_name),
            _ => None,
        }
    }

    /// Returns true for types that can have a selection set.
    pub fn is_composite(&self, type_name: &str) -> bool {
        matches!(
            self.types.get(type_name),
            Some(TypeDef::Object(_) | TypeDef::Interface(_) | TypeDef::Union(_))
        )
    }

    /// Returns true for interfaces and unions.
    pub fn is_abstract(&self, type_name: &str) -> bool {
        matches!(
            self.types.get(type_name),
            Some(TypeDef::Interface(_) | TypeDef::Union(_))
        )
    }

    /// Returns true if a fragment on `condition` applies to the object type
    /// `object_type`.
    pub fn type_applies(&self, condition: &str, object_type: &str) -> bool {
        if condition == object_type {
            return true;
        }
        match self.types.get(condition) {
            Some(TypeDef::Union(def)) => def.members.iter().any(|m| m == object_type),
            Some(TypeDef::Interface(def)) => match self.types.get(object_type) {
                Some(TypeDef::Object(object)) => object.implements.contains(&def.name),
                _ => false,
            },
            _ => false,
        }
    }

    /// Object types that an abstract type can resolve to.
    pub fn possible_types(&self, type_name: &str) -> Vec<&str> {
        self.types
            .values()
            .filter_map(|def| match def {
                TypeDef::Object(object) if self.type_applies(type_name, &object.name) => {
                    Some(object.name.as_str())
                }
                _ => None,
            })
            .collect()
    }
}

/// A type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TypeDef {
    Scalar(ScalarDef),
    Object(ObjectDef),
    Interface(InterfaceDef),
    Union(UnionDef),
    Enum(EnumDef),
    InputObject(InputObjectDef),
}

impl TypeDef {
    /// The type name.
    pub fn name(&self) -> &str {
        match self {
            Self::Scalar(s) => &s.name,
            Self::Object(o) => &o.name,
            Self::Interface(i) => &i.name,
            Self::Union(u) => &u.name,
            Self::Enum(e) => &e.name,
            Self::InputObject(i) => &i.name,
        }
    }

    fn from_ast(def: ast::TypeDefinition) -> Self {
        match def {
            ast::TypeDefinition::Scalar(def) => Self::Scalar(ScalarDef {
                name: def.name.value,
                description: def.description,
            }),
            ast::TypeDefinition::Object(def) => Self::Object(ObjectDef {
                name: def.name.value,
                description: def.description,
                fields: fields_from_ast(def.fields),
                implements: def.implements.into_iter().map(|n| n.value).collect(),
            }),
            ast::TypeDefinition::Interface(def) => Self::Interface(InterfaceDef {
                name: def.name.value,
                description: def.description,
                fields: fields_from_ast(def.fields),
                implements: def.implements.into_iter().map(|n| n.value).collect(),
            }),
            ast::TypeDefinition::Union(def) => Self::Union(UnionDef {
                name: def.name.value,
                description: def.description,
                members: def.members.into_iter().map(|n| n.value).collect(),
            }),
            ast::TypeDefinition::Enum(def) => Self::Enum(EnumDef {
                name: def.name.value,
                description: def.description,
                values: def
                    .values
                    .into_iter()
                    .map(|value| EnumValueDef {
                        name: value.name.value,
                        description: value.description,
                    })
                    .collect(),
            }),
            ast::TypeDefinition::Input(def) => Self::InputObject(InputObjectDef {
                name: def.name.value,
                description: def.description,
                fields: inputs_from_ast(def.fields),
            }),
        }
    }
}

fn fields_from_ast(fields: Vec<ast::FieldDefinition>) -> IndexMap<String, FieldDef> {
    fields
        .into_iter()
        .map(|field| {
            let def = FieldDef {
                name: field.name.value.clone(),
                description: field.description,
                ty: TypeRef::from(&field.ty),
                arguments: inputs_from_ast(field.arguments),
            };
            (field.name.value, def)
        })
        .collect()
}

fn inputs_from_ast(inputs: Vec<ast::InputValueDefinition>) -> IndexMap<String, InputFieldDef> {
    inputs
        .into_iter()
        .map(|input| {
            let def = InputFieldDef {
                name: input.name.value.clone(),
                description: input.description,
                ty: TypeRef::from(&input.ty),
                default_value: input.default_value.as_ref().map(const_value),
            };
            (input.name.value, def)
        })
        .collect()
}

/// Scalar type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalarDef {
    pub name: String,
    pub description: Option<String>,
}

/// Object type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldDef>,
    pub implements: Vec<String>,
}

/// Interface type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldDef>,
    pub implements: Vec<String>,
}

/// Union type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnionDef {
    pub name: String,
    pub description: Option<String>,
    pub members: Vec<String>,
}

/// Enum type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumDef {
    pub name: String,
    pub description: Option<String>,
    pub values: Vec<EnumValueDef>,
}

/// Enum value definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumValueDef {
    pub name: String,
    pub description: Option<String>,
}

/// Input object type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, InputFieldDef>,
}

/// Field definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub arguments: IndexMap<String, InputFieldDef>,
}

/// Input field or argument definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputFieldDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub default_value: Option<serde_json::Value>,
}

/// Type reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeRef {
    Named(String),
    NonNull(Box<TypeRef>),
    List(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn non_null(inner: TypeRef) -> Self {
        Self::NonNull(Box::new(inner))
    }

    pub fn list(inner: TypeRef) -> Self {
        Self::List(Box::new(inner))
    }

    /// The innermost named type.
    pub fn base_name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::NonNull(inner) | Self::List(inner) => inner.base_name(),
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, Self::NonNull(_))
    }
}

impl From<&ast::Type> for TypeRef {
    fn from(ty: &ast::Type) -> Self {
        match ty {
            ast::Type::Named(name) => Self::Named(name.value.clone()),
            ast::Type::NonNull(inner) => Self::non_null(Self::from(inner.as_ref())),
            ast::Type::List(inner) => Self::list(Self::from(inner.as_ref())),
        }
    }
}

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::NonNull(inner) => write!(f, "{inner}!"),
            Self::List(inner) => write!(f, "[{inner}]"),
        }
    }
}

/// Schema builder.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    schema: Schema,
}

const BUILTIN_SCALARS: [&str; 5] = ["Int", "Float", "String", "Boolean", "ID"];

impl SchemaBuilder {
    /// Creates a new schema builder.
    pub fn new() -> Self {
        let mut builder = Self::default();
        // Add built-in scalars
        for name in BUILTIN_SCALARS {
            builder.schema.types.insert(
                name.to_string(),
                TypeDef::Scalar(ScalarDef {
                    name: name.to_string(),
                    description: Some(format!("Built-in {name} scalar")),
                }),
            );
        }
        builder
    }

    /// Sets the query type.
    #[must_use]
    pub fn query_type(self, name: impl Into<String>) -> Self {
        self.root_type(OperationType::Query, name)
    }

    /// Sets the mutation type.
    #[must_use]
    pub fn mutation_type(self, name: impl Into<String>) -> Self {
        self.root_type(OperationType::Mutation, name)
    }

    /// Sets the subscription type.
    #[must_use]
    pub fn subscription_type(self, name: impl Into<String>) -> Self {
        self.root_type(OperationType::Subscription, name)
    }

    /// Sets the root type for an operation kind.
    #[must_use]
    pub fn root_type(mut self, operation: OperationType, name: impl Into<String>) -> Self {
        let name = Some(name.into());
        match operation {
            OperationType::Query => self.schema.query_type = name,
            OperationType::Mutation => self.schema.mutation_type = name,
            OperationType::Subscription => self.schema.subscription_type = name,
        }
        self
    }

    /// Adds a type.
    #[must_use]
    pub fn add_type(mut self, type_def: TypeDef) -> Self {
        self.schema
            .types
            .insert(type_def.name().to_string(), type_def);
        self
    }

    fn has_user_type(&self, name: &str) -> bool {
        self.schema.types.contains_key(name) && !BUILTIN_SCALARS.contains(&name)
    }

    /// Merges an `extend type` definition into an existing type.
    fn extend_type(mut self, extension: TypeDef) -> Result<Self, SchemaError> {
        let Some(existing) = self.schema.types.get_mut(extension.name()) else {
            return Err(SchemaError::UnknownType(extension.name().to_string()));
        };

        match (existing, extension) {
            (TypeDef::Object(target), TypeDef::Object(ext)) => {
                target.fields.extend(ext.fields);
                target.implements.extend(ext.implements);
            }
            (TypeDef::Interface(target), TypeDef::Interface(ext)) => {
                target.fields.extend(ext.fields);
            }
            (TypeDef::Union(target), TypeDef::Union(ext)) => target.members.extend(ext.members),
            (TypeDef::Enum(target), TypeDef::Enum(ext)) => target.values.extend(ext.values),
            (TypeDef::InputObject(target), TypeDef::InputObject(ext)) => {
                target.fields.extend(ext.fields);
            }
            (TypeDef::Scalar(_), TypeDef::Scalar(_)) => {}
            (_, ext) => {
                return Err(SchemaError::Invalid(format!(
                    "Cannot extend type \"{}\" with a different kind of type.",
                    ext.name()
                )))
            }
        }
        Ok(self)
    }

    /// Builds the schema without checking it.
    pub fn build(self) -> Schema {
        self.schema
    }

    /// Builds the schema, checking that every referenced type exists and
    /// that a query root is present.
    pub fn try_build(self) -> Result<Schema, SchemaError> {
        let schema = self.schema;

        let query = schema
            .query_type
            .as_deref()
            .ok_or(SchemaError::MissingQueryType)?;
        for root in [
            Some(query),
            schema.mutation_type.as_deref(),
            schema.subscription_type.as_deref(),
        ]
        .into_iter()
        .flatten()
        {
            if !matches!(schema.types.get(root), Some(TypeDef::Object(_))) {
                return Err(SchemaError::UnknownType(root.to_string()));
            }
        }

        for def in schema.types.values() {
            let referenced: Vec<&str> = match def {
                TypeDef::Object(ObjectDef { fields, .. })
                | TypeDef::Interface(InterfaceDef { fields, .. }) => fields
                    .values()
                    .flat_map(|field| {
                        std::iter::once(field.ty.base_name())
                            .chain(field.arguments.values().map(|arg| arg.ty.base_name()))
                    })
                    .collect(),
                TypeDef::Union(union) => union.members.iter().map(String::as_str).collect(),
                TypeDef::InputObject(input) => {
                    input.fields.values().map(|f| f.ty.base_name()).collect()
                }
                TypeDef::Scalar(_) | TypeDef::Enum(_) => Vec::new(),
            };
            if let Some(missing) = referenced
                .into_iter()
                .find(|name| !schema.types.contains_key(*name))
            {
                return Err(SchemaError::UnknownType(missing.to_string()));
            }
        }

        Ok(schema)
    }
}
