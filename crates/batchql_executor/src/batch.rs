//! Batches: documents submitted for execution.

use crate::multiplexer::ResultStream;
use batchql_runtime::Variables;
use serde::{Deserialize, Serialize};

/// Batch id used in logs and handles when a batch has none.
pub const NO_BATCH_ID: &str = "none";

/// A document of one or more operations, submitted together.
///
/// `id` and `document` are optional so that malformed submissions can be
/// represented and reported rather than rejected at decode time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    #[serde(default)]
    pub variables: Variables,
}

impl Batch {
    /// Creates a batch without an id.
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            id: None,
            document: Some(document.into()),
            variables: Variables::new(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    /// Sets a single variable.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// The id, or the `none` sentinel.
    pub fn id_or_sentinel(&self) -> &str {
        self.id.as_deref().unwrap_or(NO_BATCH_ID)
    }
}

/// The result stream of one submitted batch.
#[derive(Debug)]
pub struct BatchHandle {
    pub batch_id: String,
    pub stream: ResultStream,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_partial_input() {
        let batch: Batch = serde_json::from_value(serde_json::json!({
            "document": "{ ping }"
        }))
        .unwrap();
        assert_eq!(batch.id, None);
        assert_eq!(batch.id_or_sentinel(), "none");
        assert!(batch.variables.is_empty());
    }

    #[test]
    fn test_builder() {
        let batch = Batch::new("query($n: Int) { count(n: $n) }")
            .with_id("7")
            .with_variable("n", serde_json::json!(3));
        assert_eq!(batch.id_or_sentinel(), "7");
        assert_eq!(batch.variables["n"], 3);
    }
}
