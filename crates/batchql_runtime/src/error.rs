//! GraphQL errors and engine failures.

use batchql_core::{Diagnostic, Location};
use serde::{Deserialize, Serialize};

/// A path segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(field: &str) -> Self {
        Self::Field(field.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// A GraphQL error as it appears in a response's `errors` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    /// The error message.
    pub message: String,

    /// Source locations the error refers to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,

    /// The path to the field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,

    /// Error extensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Map<String, serde_json::Value>>,
}

impl GraphQLError {
    /// Creates a new error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: None,
            extensions: None,
        }
    }

    /// Converts a diagnostic, resolving its spans against `source`.
    pub fn from_diagnostic(diagnostic: &Diagnostic, source: &str) -> Self {
        Self {
            message: diagnostic.message.clone(),
            locations: diagnostic.locations(source),
            path: None,
            extensions: None,
        }
    }

    /// Adds a location.
    #[must_use]
    pub fn with_location(mut self, location: Location) -> Self {
        self.locations.push(location);
        self
    }

    /// Adds a path to the error.
    #[must_use]
    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = Some(path);
        self
    }

    /// Adds an extension.
    #[must_use]
    pub fn with_extension(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extensions
            .get_or_insert_with(serde_json::Map::new)
            .insert(key.into(), value);
        self
    }

    /// Sets the error code extension.
    #[must_use]
    pub fn with_code(self, code: impl Into<String>) -> Self {
        self.with_extension("code", serde_json::Value::String(code.into()))
    }
}

impl std::fmt::Display for GraphQLError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for GraphQLError {}

/// A failure of the engine itself, as opposed to a GraphQL error that
/// belongs in a response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// A resolver reported a non-GraphQL failure.
    #[error("{message}")]
    Fatal {
        message: String,
        path: Vec<PathSegment>,
    },

    /// The request cannot be executed by this engine.
    #[error("{0}")]
    InvalidRequest(String),
}

impl EngineError {
    /// Creates a fatal error without a field path.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
            path: Vec::new(),
        }
    }

    /// Converts the failure into a GraphQL error for reporting.
    pub fn to_graphql_error(&self) -> GraphQLError {
        match self {
            Self::Fatal { message, path } if !path.is_empty() => {
                GraphQLError::new(message.clone()).with_path(path.clone())
            }
            other => GraphQLError::new(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization_skips_empty_fields() {
        let error = GraphQLError::new("boom");
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            serde_json::json!({"message": "boom"})
        );
    }

    #[test]
    fn test_error_serialization_with_location_and_path() {
        let error = GraphQLError::new("boom")
            .with_location(Location { line: 1, column: 9 })
            .with_path(vec!["user".into(), 0.into(), "name".into()])
            .with_code("INTERNAL");

        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            serde_json::json!({
                "message": "boom",
                "locations": [{"line": 1, "column": 9}],
                "path": ["user", 0, "name"],
                "extensions": {"code": "INTERNAL"}
            })
        );
    }

    #[test]
    fn test_fatal_error_keeps_path() {
        let error = EngineError::Fatal {
            message: "database is gone".into(),
            path: vec!["count".into()],
        };
        let graphql = error.to_graphql_error();
        assert_eq!(graphql.message, "database is gone");
        assert_eq!(graphql.path, Some(vec![PathSegment::Field("count".into())]));
    }
}
