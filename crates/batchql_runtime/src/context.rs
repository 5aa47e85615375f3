//! Request-scoped context shared by every resolver of an operation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Execution context.
///
/// Cloning is cheap: clones share the same snapshot until one of them is
/// written to.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Request-scoped data.
    data: Arc<serde_json::Map<String, Value>>,
}

impl Context {
    /// Creates a new context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context from a JSON object. Non-object values produce an
    /// empty context.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self {
                data: Arc::new(map),
            },
            _ => Self::default(),
        }
    }

    /// Sets a value in the context.
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) {
        if let Ok(v) = serde_json::to_value(value) {
            Arc::make_mut(&mut self.data).insert(key.into(), v);
        }
    }

    /// Sets a value, builder style.
    #[must_use]
    pub fn with<T: Serialize>(mut self, key: impl Into<String>, value: T) -> Self {
        self.set(key, value);
        self
    }

    /// Gets a value from the context.
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Gets the raw JSON value for a key.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Returns true if both contexts share the same snapshot.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut ctx = Context::new();
        ctx.set("user_id", 7);
        assert_eq!(ctx.get::<i64>("user_id"), Some(7));
        assert_eq!(ctx.get::<i64>("missing"), None);
    }

    #[test]
    fn test_clones_share_snapshot_until_written() {
        let ctx = Context::from_value(serde_json::json!({"tenant": "acme"}));
        let mut copy = ctx.clone();
        assert!(ctx.ptr_eq(&copy));

        copy.set("tenant", "other");
        assert!(!ctx.ptr_eq(&copy));
        assert_eq!(ctx.get::<String>("tenant").as_deref(), Some("acme"));
    }

    #[test]
    fn test_from_non_object_is_empty() {
        let ctx = Context::from_value(serde_json::json!(42));
        assert!(ctx.value("anything").is_none());
    }
}
