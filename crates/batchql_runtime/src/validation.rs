//! Validation of executable documents against a schema.
//!
//! Messages use the wording of the GraphQL reference implementation so that
//! clients see familiar errors, e.g. `Cannot query field "x" on type "T".`.

use crate::schema::{Schema, TypeDef};
use batchql_core::diagnostics::codes;
use batchql_core::{Diagnostic, DiagnosticBag, Span};
use batchql_syntax::ast::*;
use rustc_hash::{FxHashMap, FxHashSet};

/// Validates `document` against `schema`. An empty bag means the document
/// is valid.
pub fn validate(schema: &Schema, document: &Document) -> DiagnosticBag {
    let mut validator = Validator::new(schema, document);
    validator.validate_document();
    validator.diagnostics
}

struct Validator<'a> {
    schema: &'a Schema,
    document: &'a Document,
    fragments: FxHashMap<&'a str, &'a FragmentDefinition>,
    diagnostics: DiagnosticBag,
}

impl<'a> Validator<'a> {
    fn new(schema: &'a Schema, document: &'a Document) -> Self {
        let mut fragments = FxHashMap::default();
        for fragment in document.fragments() {
            fragments.entry(fragment.name.as_str()).or_insert(fragment);
        }
        Self {
            schema,
            document,
            fragments,
            diagnostics: DiagnosticBag::new(),
        }
    }

    fn validate_document(&mut self) {
        let document = self.document;
        self.check_executable_definitions();
        self.check_unique_names();
        self.check_lone_anonymous_operation();

        let mut used_fragments = FxHashSet::default();
        for operation in document.operations() {
            self.validate_operation(operation, &mut used_fragments);
        }

        for fragment in document.fragments() {
            self.validate_fragment(fragment);
            if !used_fragments.contains(fragment.name.as_str()) {
                self.diagnostics.error(
                    codes::UNUSED_DEFINITION,
                    fragment.span,
                    format!("Fragment \"{}\" is never used.", fragment.name.value),
                );
            }
        }

        self.check_fragment_cycles();
    }

    fn check_executable_definitions(&mut self) {
        for definition in &self.document.definitions {
            let name = match definition {
                Definition::Operation(_) | Definition::Fragment(_) => continue,
                Definition::Schema(_) => "schema".to_string(),
                Definition::Type(def) | Definition::TypeExtension(def) => {
                    format!("\"{}\"", def.name().value)
                }
                Definition::Directive(def) => format!("\"{}\"", def.name.value),
            };
            self.diagnostics.error(
                codes::NON_EXECUTABLE_DEFINITION,
                definition.span(),
                format!("The {name} definition is not executable."),
            );
        }
    }

    fn check_unique_names(&mut self) {
        let mut operations: FxHashMap<&str, Span> = FxHashMap::default();
        for operation in self.document.operations() {
            let Some(name) = &operation.name else {
                continue;
            };
            if let Some(first) = operations.insert(name.as_str(), name.span) {
                self.diagnostics.add(
                    Diagnostic::error(
                        codes::DUPLICATE_NAME,
                        format!("There can be only one operation named \"{}\".", name.value),
                    )
                    .with_span(first)
                    .with_span(name.span),
                );
            }
        }

        let mut fragments: FxHashMap<&str, Span> = FxHashMap::default();
        for fragment in self.document.fragments() {
            let name = &fragment.name;
            if let Some(first) = fragments.insert(name.as_str(), name.span) {
                self.diagnostics.add(
                    Diagnostic::error(
                        codes::DUPLICATE_NAME,
                        format!("There can be only one fragment named \"{}\".", name.value),
                    )
                    .with_span(first)
                    .with_span(name.span),
                );
            }
        }
    }

    fn check_lone_anonymous_operation(&mut self) {
        let count = self.document.operations().count();
        if count < 2 {
            return;
        }
        for operation in self.document.operations().filter(|op| op.name.is_none()) {
            self.diagnostics.error(
                codes::LONE_ANONYMOUS_OPERATION,
                operation.span,
                "This anonymous operation must be the only defined operation.",
            );
        }
    }

    fn validate_operation(
        &mut self,
        operation: &'a OperationDefinition,
        used_fragments: &mut FxHashSet<&'a str>,
    ) {
        let mut visited = FxHashSet::default();
        collect_spreads(&operation.selection_set, &self.fragments, &mut visited);
        used_fragments.extend(visited.iter().copied());

        self.validate_variables(operation, &visited);

        let schema = self.schema;
        let Some(root) = schema.root_type(operation.operation) else {
            let plural = match operation.operation {
                OperationType::Query => "queries",
                OperationType::Mutation => "mutations",
                OperationType::Subscription => "subscriptions",
            };
            self.diagnostics.error(
                codes::UNSUPPORTED_OPERATION,
                operation.span,
                format!("Schema is not configured for {plural}."),
            );
            return;
        };

        if operation.operation == OperationType::Subscription {
            self.check_single_root_field(operation, root);
        }

        self.validate_selection_set(root, &operation.selection_set);
    }

    fn check_single_root_field(&mut self, operation: &OperationDefinition, root: &str) {
        let mut fields = Vec::new();
        let mut visited = FxHashSet::default();
        collect_root_fields(
            self.schema,
            root,
            &operation.selection_set,
            &self.fragments,
            &mut visited,
            &mut fields,
        );

        let subject = match operation.name() {
            Some(name) => format!("Subscription \"{name}\""),
            None => "Anonymous Subscription".to_string(),
        };

        let mut keys: Vec<&str> = fields.iter().map(|f| f.response_key()).collect();
        keys.dedup();
        if keys.len() > 1 {
            self.diagnostics.add(
                fields.iter().skip(1).fold(
                    Diagnostic::error(
                        codes::SINGLE_ROOT_FIELD,
                        format!("{subject} must select only one top level field."),
                    ),
                    |diag, field| diag.with_span(field.span),
                ),
            );
        }
        if let Some(field) = fields.iter().find(|f| f.name.value.starts_with("__")) {
            self.diagnostics.error(
                codes::SINGLE_ROOT_FIELD,
                field.span,
                format!("{subject} must not select an introspection top level field."),
            );
        }
    }

    fn validate_variables(
        &mut self,
        operation: &'a OperationDefinition,
        fragments: &FxHashSet<&'a str>,
    ) {
        let mut defined: FxHashMap<&str, Span> = FxHashMap::default();
        for variable in &operation.variables {
            let name = variable.name.as_str();
            if defined.insert(name, variable.name.span).is_some() {
                self.diagnostics.error(
                    codes::DUPLICATE_NAME,
                    variable.span,
                    format!("There can be only one variable named \"${name}\"."),
                );
            }

            let type_name = variable.ty.named();
            match self.schema.get_type(&type_name.value) {
                None => self.diagnostics.error(
                    codes::UNKNOWN_TYPE,
                    type_name.span,
                    format!("Unknown type \"{}\".", type_name.value),
                ),
                Some(TypeDef::Object(_) | TypeDef::Interface(_) | TypeDef::Union(_)) => {
                    self.diagnostics.error(
                        codes::INVALID_VARIABLE_TYPE,
                        variable.ty.named().span,
                        format!(
                            "Variable \"${name}\" cannot be non-input type \"{}\".",
                            variable.ty
                        ),
                    );
                }
                Some(_) => {}
            }
        }

        let mut used = Vec::new();
        collect_variable_usages(&operation.selection_set, &mut used);
        for directive in &operation.directives {
            directive_variables(directive, &mut used);
        }
        for fragment in fragments.iter().filter_map(|name| self.fragments.get(name).copied()) {
            collect_variable_usages(&fragment.selection_set, &mut used);
        }

        let mut reported = FxHashSet::default();
        for name in &used {
            if defined.contains_key(name.as_str()) || !reported.insert(name.as_str()) {
                continue;
            }
            let message = match operation.name() {
                Some(op) => format!("Variable \"${}\" is not defined by operation \"{op}\".", name.value),
                None => format!("Variable \"${}\" is not defined.", name.value),
            };
            self.diagnostics
                .error(codes::UNDEFINED_VARIABLE, name.span, message);
        }

        for variable in &operation.variables {
            if used.iter().any(|u| u.value == variable.name.value) {
                continue;
            }
            let message = match operation.name() {
                Some(op) => format!(
                    "Variable \"${}\" is never used in operation \"{op}\".",
                    variable.name.value
                ),
                None => format!("Variable \"${}\" is never used.", variable.name.value),
            };
            self.diagnostics
                .error(codes::UNUSED_DEFINITION, variable.span, message);
        }
    }

    fn validate_fragment(&mut self, fragment: &FragmentDefinition) {
        let condition = &fragment.type_condition;
        if self.check_type_condition(condition, Some(&fragment.name.value)) {
            self.validate_selection_set(&condition.value, &fragment.selection_set);
        }
    }

    /// Returns true if selections can be validated against the condition.
    fn check_type_condition(&mut self, condition: &Name, fragment: Option<&str>) -> bool {
        if self.schema.get_type(&condition.value).is_none() {
            self.diagnostics.error(
                codes::UNKNOWN_TYPE,
                condition.span,
                format!("Unknown type \"{}\".", condition.value),
            );
            return false;
        }
        if !self.schema.is_composite(&condition.value) {
            let message = match fragment {
                Some(name) => format!(
                    "Fragment \"{name}\" cannot condition on non composite type \"{}\".",
                    condition.value
                ),
                None => format!(
                    "Fragment cannot condition on non composite type \"{}\".",
                    condition.value
                ),
            };
            self.diagnostics
                .error(codes::INVALID_TYPE_CONDITION, condition.span, message);
            return false;
        }
        true
    }

    fn validate_selection_set(&mut self, parent_type: &str, selection_set: &SelectionSet) {
        for selection in &selection_set.selections {
            match selection {
                Selection::Field(field) => self.validate_field(parent_type, field),
                Selection::FragmentSpread(spread) => {
                    if !self.fragments.contains_key(spread.name.as_str()) {
                        self.diagnostics.error(
                            codes::UNKNOWN_FRAGMENT,
                            spread.name.span,
                            format!("Unknown fragment \"{}\".", spread.name.value),
                        );
                    }
                }
                Selection::InlineFragment(inline) => match &inline.type_condition {
                    Some(condition) => {
                        if self.check_type_condition(condition, None) {
                            self.validate_selection_set(&condition.value, &inline.selection_set);
                        }
                    }
                    None => self.validate_selection_set(parent_type, &inline.selection_set),
                },
            }
        }
    }

    fn validate_field(&mut self, parent_type: &str, field: &Field) {
        let schema = self.schema;
        let name = field.name.as_str();

        if name == "__typename" {
            if let Some(selection_set) = &field.selection_set {
                self.diagnostics.error(
                    codes::LEAF_SELECTION,
                    selection_set.span,
                    "Field \"__typename\" must not have a selection since type \"String!\" has no subfields.",
                );
            }
            return;
        }

        let Some(def) = schema.field(parent_type, name) else {
            self.diagnostics.error(
                codes::UNKNOWN_FIELD,
                field.name.span,
                format!("Cannot query field \"{name}\" on type \"{parent_type}\"."),
            );
            return;
        };

        for argument in &field.arguments {
            if !def.arguments.contains_key(argument.name.as_str()) {
                self.diagnostics.error(
                    codes::UNKNOWN_ARGUMENT,
                    argument.span,
                    format!(
                        "Unknown argument \"{}\" on field \"{parent_type}.{name}\".",
                        argument.name.value
                    ),
                );
            }
        }

        for (arg_name, arg) in &def.arguments {
            let provided = field.arguments.iter().any(|a| a.name.value == *arg_name);
            if !provided && arg.ty.is_non_null() && arg.default_value.is_none() {
                self.diagnostics.error(
                    codes::MISSING_ARGUMENT,
                    field.span,
                    format!(
                        "Field \"{name}\" argument \"{arg_name}\" of type \"{}\" is required, but it was not provided.",
                        arg.ty
                    ),
                );
            }
        }

        let base = def.ty.base_name();
        match (&field.selection_set, schema.is_composite(base)) {
            (Some(selection_set), true) => self.validate_selection_set(base, selection_set),
            (Some(selection_set), false) => self.diagnostics.error(
                codes::LEAF_SELECTION,
                selection_set.span,
                format!(
                    "Field \"{name}\" must not have a selection since type \"{}\" has no subfields.",
                    def.ty
                ),
            ),
            (None, true) => self.diagnostics.error(
                codes::MISSING_SELECTION,
                field.span,
                format!(
                    "Field \"{name}\" of type \"{}\" must have a selection of subfields. Did you mean \"{name} {{ ... }}\"?",
                    def.ty
                ),
            ),
            (None, false) => {}
        }
    }

    fn check_fragment_cycles(&mut self) {
        for fragment in self.document.fragments() {
            let mut visited = FxHashSet::default();
            let mut direct = FxHashSet::default();
            spreads_in(&fragment.selection_set, &mut direct);

            let mut stack: Vec<&str> = direct.into_iter().collect();
            while let Some(name) = stack.pop() {
                if name == fragment.name.as_str() {
                    self.diagnostics.error(
                        codes::FRAGMENT_CYCLE,
                        fragment.name.span,
                        format!(
                            "Cannot spread fragment \"{}\" within itself.",
                            fragment.name.value
                        ),
                    );
                    break;
                }
                if !visited.insert(name) {
                    continue;
                }
                if let Some(next) = self.fragments.get(name) {
                    let mut spreads = FxHashSet::default();
                    spreads_in(&next.selection_set, &mut spreads);
                    stack.extend(spreads);
                }
            }
        }
    }
}

/// Names of fragments spread directly in a selection set.
fn spreads_in<'a>(selection_set: &'a SelectionSet, out: &mut FxHashSet<&'a str>) {
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field) => {
                if let Some(set) = &field.selection_set {
                    spreads_in(set, out);
                }
            }
            Selection::FragmentSpread(spread) => {
                out.insert(spread.name.as_str());
            }
            Selection::InlineFragment(inline) => spreads_in(&inline.selection_set, out),
        }
    }
}

/// Names of all fragments reachable from a selection set.
pub(crate) fn collect_spreads<'a>(
    selection_set: &'a SelectionSet,
    fragments: &FxHashMap<&'a str, &'a FragmentDefinition>,
    visited: &mut FxHashSet<&'a str>,
) {
    let mut direct = FxHashSet::default();
    spreads_in(selection_set, &mut direct);
    for name in direct {
        if visited.insert(name) {
            if let Some(fragment) = fragments.get(name) {
                collect_spreads(&fragment.selection_set, fragments, visited);
            }
        }
    }
}

fn collect_root_fields<'a>(
    schema: &Schema,
    root: &str,
    selection_set: &'a SelectionSet,
    fragments: &FxHashMap<&'a str, &'a FragmentDefinition>,
    visited: &mut FxHashSet<&'a str>,
    out: &mut Vec<&'a Field>,
) {
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field) => out.push(field),
            Selection::FragmentSpread(spread) => {
                if !visited.insert(spread.name.as_str()) {
                    continue;
                }
                if let Some(fragment) = fragments.get(spread.name.as_str()) {
                    if schema.type_applies(&fragment.type_condition.value, root) {
                        collect_root_fields(
                            schema,
                            root,
                            &fragment.selection_set,
                            fragments,
                            visited,
                            out,
                        );
                    }
                }
            }
            Selection::InlineFragment(inline) => {
                let applies = inline
                    .type_condition
                    .as_ref()
                    .map_or(true, |tc| schema.type_applies(&tc.value, root));
                if applies {
                    collect_root_fields(
                        schema,
                        root,
                        &inline.selection_set,
                        fragments,
                        visited,
                        out,
                    );
                }
            }
        }
    }
}

fn directive_variables<'a>(directive: &'a Directive, out: &mut Vec<&'a Name>) {
    for argument in &directive.arguments {
        argument.value.visit_variables(&mut |name| out.push(name));
    }
}

/// Variables referenced in a selection set, not following fragment spreads.
fn collect_variable_usages<'a>(selection_set: &'a SelectionSet, out: &mut Vec<&'a Name>) {
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field) => {
                for argument in &field.arguments {
                    argument.value.visit_variables(&mut |name| out.push(name));
                }
                field
                    .directives
                    .iter()
                    .for_each(|d| directive_variables(d, out));
                if let Some(set) = &field.selection_set {
                    collect_variable_usages(set, out);
                }
            }
            Selection::FragmentSpread(spread) => spread
                .directives
                .iter()
                .for_each(|d| directive_variables(d, out)),
            Selection::InlineFragment(inline) => {
                inline
                    .directives
                    .iter()
                    .for_each(|d| directive_variables(d, out));
                collect_variable_usages(&inline.selection_set, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SDL: &str = r#"
        type Query {
            ping: String
            user(id: ID!): User
            users(limit: Int = 10): [User!]!
        }
        type Mutation { touch: Boolean }
        type Subscription { count: Int! tick: Int }
        type User { id: ID! name: String friends: [User] }
    "#;

    fn messages(source: &str) -> Vec<String> {
        let schema = Schema::parse(SDL).unwrap();
        let document = batchql_syntax::parse(source).unwrap();
        validate(&schema, &document)
            .into_iter()
            .map(|d| d.message)
            .collect()
    }

    #[test]
    fn test_valid_document() {
        assert!(messages(
            r#"
            query a { ping }
            query b($id: ID!) { user(id: $id) { ...UserParts } }
            fragment UserParts on User { id name friends { __typename } }
            subscription c { count }
        "#
        )
        .is_empty());
    }

    #[test]
    fn test_unknown_field() {
        insta::assert_snapshot!(
            messages("{ thanos }").join("\n"),
            @r#"Cannot query field "thanos" on type "Query"."#
        );
    }

    #[test]
    fn test_unknown_and_missing_arguments() {
        assert_eq!(
            messages("{ user(name: \"x\") { id } }"),
            vec![
                "Unknown argument \"name\" on field \"Query.user\".",
                "Field \"user\" argument \"id\" of type \"ID!\" is required, but it was not provided.",
            ]
        );
    }

    #[test]
    fn test_leaf_and_composite_selections() {
        assert_eq!(
            messages("{ ping { x } users }"),
            vec![
                "Field \"ping\" must not have a selection since type \"String\" has no subfields.",
                "Field \"users\" of type \"[User!]!\" must have a selection of subfields. Did you mean \"users { ... }\"?",
            ]
        );
    }

    #[test]
    fn test_fragments() {
        assert_eq!(
            messages("{ ...Missing } fragment Unused on User { id }"),
            vec![
                "Unknown fragment \"Missing\".",
                "Fragment \"Unused\" is never used.",
            ]
        );
        assert_eq!(
            messages("{ ... on Nope { id } }"),
            vec!["Unknown type \"Nope\"."]
        );
    }

    #[test]
    fn test_fragment_cycle() {
        let messages = messages(
            "{ users { ...A } } fragment A on User { ...B } fragment B on User { ...A }",
        );
        assert!(messages.contains(&"Cannot spread fragment \"A\" within itself.".to_string()));
        assert!(messages.contains(&"Cannot spread fragment \"B\" within itself.".to_string()));
    }

    #[test]
    fn test_variables() {
        assert_eq!(
            messages("query Q($unused: Int) { user(id: $id) { id } }"),
            vec![
                "Variable \"$id\" is not defined by operation \"Q\".",
                "Variable \"$unused\" is never used in operation \"Q\".",
            ]
        );
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(
            messages("query a { ping } query a { ping }"),
            vec!["There can be only one operation named \"a\"."]
        );
        assert_eq!(
            messages("{ ping } query b { ping }"),
            vec!["This anonymous operation must be the only defined operation."]
        );
    }

    #[test]
    fn test_subscription_single_root_field() {
        assert_eq!(
            messages("subscription s { count tick }"),
            vec!["Subscription \"s\" must select only one top level field."]
        );
    }

    #[test]
    fn test_unsupported_operation() {
        let schema = Schema::parse("type Query { ping: String }").unwrap();
        let document = batchql_syntax::parse("mutation { ping }").unwrap();
        let messages: Vec<_> = validate(&schema, &document)
            .into_iter()
            .map(|d| d.message)
            .collect();
        assert_eq!(messages, vec!["Schema is not configured for mutations."]);
    }

    #[test]
    fn test_type_system_definitions_are_not_executable() {
        assert_eq!(
            messages("{ ping } type Extra { a: Int }"),
            vec!["The \"Extra\" definition is not executable."]
        );
    }
}
