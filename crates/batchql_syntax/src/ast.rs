//! Abstract syntax tree types for GraphQL documents.
//!
//! The tree owns its strings so documents can be split, cloned into
//! per-operation documents and moved across tasks freely.

use batchql_core::Span;

/// A complete document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub definitions: Vec<Definition>,
    pub span: Span,
}

impl Document {
    /// Iterates the operation definitions in document order.
    pub fn operations(&self) -> impl Iterator<Item = &OperationDefinition> {
        self.definitions.iter().filter_map(|def| match def {
            Definition::Operation(op) => Some(op),
            _ => None,
        })
    }

    /// Iterates the fragment definitions in document order.
    pub fn fragments(&self) -> impl Iterator<Item = &FragmentDefinition> {
        self.definitions.iter().filter_map(|def| match def {
            Definition::Fragment(fragment) => Some(fragment),
            _ => None,
        })
    }

    /// Finds a fragment definition by name.
    pub fn fragment(&self, name: &str) -> Option<&FragmentDefinition> {
        self.fragments().find(|fragment| fragment.name.value == name)
    }
}

/// A top-level definition.
#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    Operation(OperationDefinition),
    Fragment(FragmentDefinition),
    Schema(SchemaDefinition),
    Type(TypeDefinition),
    TypeExtension(TypeDefinition),
    Directive(DirectiveDefinition),
}

impl Definition {
    /// Returns true for operations and fragments.
    pub fn is_executable(&self) -> bool {
        matches!(self, Self::Operation(_) | Self::Fragment(_))
    }

    pub fn span(&self) -> Span {
        match self {
            Self::Operation(op) => op.span,
            Self::Fragment(fragment) => fragment.span,
            Self::Schema(schema) => schema.span,
            Self::Type(ty) | Self::TypeExtension(ty) => ty.span(),
            Self::Directive(directive) => directive.span,
        }
    }
}

/// A name with its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name {
    pub value: String,
    pub span: Span,
}

impl Name {
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

/// Type of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    Query,
    Mutation,
    Subscription,
}

impl OperationType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        }
    }

    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "query" => Some(Self::Query),
            "mutation" => Some(Self::Mutation),
            "subscription" => Some(Self::Subscription),
            _ => None,
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An operation definition.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationDefinition {
    pub operation: OperationType,
    pub name: Option<Name>,
    pub variables: Vec<VariableDefinition>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
    pub span: Span,
}

impl OperationDefinition {
    pub fn name(&self) -> Option<&str> {
        self.name.as_ref().map(Name::as_str)
    }
}

/// A variable definition.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    pub name: Name,
    pub ty: Type,
    pub default_value: Option<Value>,
    pub directives: Vec<Directive>,
    pub span: Span,
}

/// A type reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Named(Name),
    List(Box<Type>),
    NonNull(Box<Type>),
}

impl Type {
    /// The innermost named type.
    pub fn named(&self) -> &Name {
        match self {
            Self::Named(name) => name,
            Self::List(inner) | Self::NonNull(inner) => inner.named(),
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, Self::NonNull(_))
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Named(name) => f.write_str(&name.value),
            Self::List(inner) => write!(f, "[{inner}]"),
            Self::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

/// A directive application.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub name: Name,
    pub arguments: Vec<Argument>,
    pub span: Span,
}

/// An argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: Name,
    pub value: Value,
    pub span: Span,
}

/// An input value literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Variable(Name),
    Int(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,
    Enum(String),
    List(Vec<Value>),
    Object(Vec<(Name, Value)>),
}

impl Value {
    /// Calls `f` for every variable referenced by this value.
    pub fn visit_variables<'a>(&'a self, f: &mut impl FnMut(&'a Name)) {
        match self {
            Self::Variable(name) => f(name),
            Self::List(values) => values.iter().for_each(|v| v.visit_variables(f)),
            Self::Object(fields) => fields.iter().for_each(|(_, v)| v.visit_variables(f)),
            _ => {}
        }
    }
}

/// A selection set.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionSet {
    pub selections: Vec<Selection>,
    pub span: Span,
}

/// A selection.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Field(Field),
    FragmentSpread(FragmentSpread),
    InlineFragment(InlineFragment),
}

/// A field selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub alias: Option<Name>,
    pub name: Name,
    pub arguments: Vec<Argument>,
    pub directives: Vec<Directive>,
    pub selection_set: Option<SelectionSet>,
    pub span: Span,
}

impl Field {
    /// The key this field is written under in the response.
    pub fn response_key(&self) -> &str {
        self.alias.as_ref().unwrap_or(&self.name).as_str()
    }
}

/// A fragment spread.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentSpread {
    pub name: Name,
    pub directives: Vec<Directive>,
    pub span: Span,
}

/// An inline fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineFragment {
    pub type_condition: Option<Name>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
    pub span: Span,
}

/// A fragment definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentDefinition {
    pub name: Name,
    pub type_condition: Name,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
    pub span: Span,
}

/// `schema { query: Q mutation: M }`.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDefinition {
    pub directives: Vec<Directive>,
    pub operations: Vec<(OperationType, Name)>,
    pub span: Span,
}

/// Type definitions.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDefinition {
    Object(ObjectTypeDefinition),
    Interface(ObjectTypeDefinition),
    Union(UnionTypeDefinition),
    Enum(EnumTypeDefinition),
    Input(InputObjectTypeDefinition),
    Scalar(ScalarTypeDefinition),
}

impl TypeDefinition {
    pub fn name(&self) -> &Name {
        match self {
            Self::Object(def) | Self::Interface(def) => &def.name,
            Self::Union(def) => &def.name,
            Self::Enum(def) => &def.name,
            Self::Input(def) => &def.name,
            Self::Scalar(def) => &def.name,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::Object(def) | Self::Interface(def) => def.span,
            Self::Union(def) => def.span,
            Self::Enum(def) => def.span,
            Self::Input(def) => def.span,
            Self::Scalar(def) => def.span,
        }
    }
}

/// Object or interface type definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectTypeDefinition {
    pub description: Option<String>,
    pub name: Name,
    pub implements: Vec<Name>,
    pub directives: Vec<Directive>,
    pub fields: Vec<FieldDefinition>,
    pub span: Span,
}

/// Field definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub description: Option<String>,
    pub name: Name,
    pub arguments: Vec<InputValueDefinition>,
    pub ty: Type,
    pub directives: Vec<Directive>,
    pub span: Span,
}

/// Argument or input field definition.
#[derive(Debug, Clone, PartialEq)]
pub struct InputValueDefinition {
    pub description: Option<String>,
    pub name: Name,
    pub ty: Type,
    pub default_value: Option<Value>,
    pub directives: Vec<Directive>,
    pub span: Span,
}

/// Union type definition.
#[derive(Debug, Clone, PartialEq)]
pub struct UnionTypeDefinition {
    pub description: Option<String>,
    pub name: Name,
    pub directives: Vec<Directive>,
    pub members: Vec<Name>,
    pub span: Span,
}

/// Enum type definition.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumTypeDefinition {
    pub description: Option<String>,
    pub name: Name,
    pub directives: Vec<Directive>,
    pub values: Vec<EnumValueDefinition>,
    pub span: Span,
}

/// Enum value definition.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumValueDefinition {
    pub description: Option<String>,
    pub name: Name,
    pub directives: Vec<Directive>,
}

/// Input object type definition.
#[derive(Debug, Clone, PartialEq)]
pub struct InputObjectTypeDefinition {
    pub description: Option<String>,
    pub name: Name,
    pub directives: Vec<Directive>,
    pub fields: Vec<InputValueDefinition>,
    pub span: Span,
}

/// Scalar type definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarTypeDefinition {
    pub description: Option<String>,
    pub name: Name,
    pub directives: Vec<Directive>,
    pub span: Span,
}

/// `directive @name(args) repeatable on LOCATION | ...`.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectiveDefinition {
    pub description: Option<String>,
    pub name: Name,
    pub arguments: Vec<InputValueDefinition>,
    pub repeatable: bool,
    pub locations: Vec<Name>,
    pub span: Span,
}
