//! GraphQL responses.

use crate::error::GraphQLError;
use serde::{Deserialize, Serialize};

/// A GraphQL response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// The data.
    pub data: Option<serde_json::Value>,

    /// The errors.
    #[serde(default)]
    pub errors: Vec<GraphQLError>,
}

impl Response {
    /// Creates a successful response with data.
    pub fn data(data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    /// Creates an error response.
    pub fn error(error: GraphQLError) -> Self {
        Self::errors(vec![error])
    }

    /// Creates an error response with multiple errors.
    pub fn errors(errors: Vec<GraphQLError>) -> Self {
        Self { data: None, errors }
    }

    /// Returns true if the response has errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns true if the response has data.
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_constructors() {
        let ok = Response::data(serde_json::json!({"ping": "pong"}));
        assert!(ok.has_data());
        assert!(!ok.has_errors());

        let failed = Response::error(GraphQLError::new("nope"));
        assert!(!failed.has_data());
        assert!(failed.has_errors());
    }
}
