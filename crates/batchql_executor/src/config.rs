//! Executor configuration.

/// Default number of envelopes buffered per batch before runners suspend.
pub const DEFAULT_CAPACITY: usize = 100;

/// Default executor id, used to tell executors apart in logs.
pub const DEFAULT_ID: &str = "anon";

/// Executor configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Capacity of each batch's result channel. Never zero.
    pub capacity: usize,
    /// Id attached to every log span of this executor.
    pub id: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutorConfig {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            id: DEFAULT_ID.to_string(),
        }
    }

    /// Sets the channel capacity. Zero is raised to one.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Sets the executor id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}
