//! Result envelopes: the items of a batch's result stream.

use crate::error::ErrorKind;
use batchql_runtime::{GraphQLError, Response};
use batchql_syntax::OperationType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of an operation, or `none` before one was identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
    None,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
            Self::None => "none",
        }
    }
}

impl From<OperationType> for OperationKind {
    fn from(operation: OperationType) -> Self {
        match operation {
            OperationType::Query => Self::Query,
            OperationType::Mutation => Self::Mutation,
            OperationType::Subscription => Self::Subscription,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One result of one operation, or one processing error.
///
/// Serialises as
/// `{"batchId"?, "operationType", "operationName", "data", "errors", "kind"?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    pub operation_type: OperationKind,
    pub operation_name: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub errors: Vec<GraphQLError>,
    /// Set only on processing errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl Envelope {
    /// Wraps an engine response. Errors returned alongside data pass through
    /// untouched.
    pub fn from_response(
        batch_id: Option<String>,
        operation_type: OperationKind,
        operation_name: impl Into<String>,
        response: Response,
    ) -> Self {
        Self {
            batch_id,
            operation_type,
            operation_name: operation_name.into(),
            data: response.data,
            errors: response.errors,
            kind: None,
        }
    }

    /// Returns true if this envelope reports a processing error.
    pub fn is_processing_error(&self) -> bool {
        self.kind.is_some()
    }

    /// Returns true if the envelope carries any error, soft or not.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
