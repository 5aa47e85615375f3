//! Conversion of AST literals into JSON values.

use batchql_syntax::ast::Value as AstValue;
use serde_json::{Map, Number, Value};

/// Variable values by name.
pub type Variables = Map<String, Value>;

/// Converts a constant literal (no variables).
pub fn const_value(value: &AstValue) -> Value {
    value_from_ast(value, &Variables::new())
}

/// Converts a literal, substituting variables. Unknown variables become
/// `null`.
pub fn value_from_ast(value: &AstValue, variables: &Variables) -> Value {
    match value {
        AstValue::Variable(name) => variables.get(&name.value).cloned().unwrap_or(Value::Null),
        AstValue::Int(int) => Value::Number((*int).into()),
        AstValue::Float(float) => Number::from_f64(*float).map_or(Value::Null, Value::Number),
        AstValue::String(s) => Value::String(s.clone()),
        AstValue::Boolean(b) => Value::Bool(*b),
        AstValue::Null => Value::Null,
        AstValue::Enum(e) => Value::String(e.clone()),
        AstValue::List(values) => Value::Array(
            values
                .iter()
                .map(|v| value_from_ast(v, variables))
                .collect(),
        ),
        AstValue::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, v)| (name.value.clone(), value_from_ast(v, variables)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchql_core::Span;
    use batchql_syntax::ast::Name;

    fn name(value: &str) -> Name {
        Name {
            value: value.to_string(),
            span: Span::default(),
        }
    }

    #[test]
    fn test_variables_are_substituted() {
        let mut variables = Variables::new();
        variables.insert("id".into(), serde_json::json!("u1"));

        let literal = AstValue::Object(vec![
            (name("id"), AstValue::Variable(name("id"))),
            (name("missing"), AstValue::Variable(name("other"))),
            (name("tags"), AstValue::List(vec![AstValue::Enum("NEW".into())])),
        ]);

        assert_eq!(
            value_from_ast(&literal, &variables),
            serde_json::json!({"id": "u1", "missing": null, "tags": ["NEW"]})
        );
    }

    #[test]
    fn test_scalars() {
        assert_eq!(const_value(&AstValue::Int(3)), serde_json::json!(3));
        assert_eq!(const_value(&AstValue::Float(1.5)), serde_json::json!(1.5));
        assert_eq!(const_value(&AstValue::Boolean(true)), serde_json::json!(true));
        assert_eq!(const_value(&AstValue::Null), Value::Null);
    }
}
