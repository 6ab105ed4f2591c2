use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

pub type Result<T> = std::result::Result<T, PluginError>;

/// Access a tool needs on the host filesystem.
///
/// The registry is created with the access the front end is willing to grant,
/// and silently refuses tools asking for more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permission {
    pub read: bool,
    pub write: bool,
}

impl Permission {
    pub const NONE: Self = Self {
        read: false,
        write: false,
    };

    pub const READ_ONLY: Self = Self {
        read: true,
        write: false,
    };

    pub const READ_WRITE: Self = Self {
        read: true,
        write: true,
    };

    /// Check if this permission covers the required permission.
    pub fn allows(&self, required: &Permission) -> bool {
        (!required.read || self.read) && (!required.write || self.write)
    }
}

/// Text handed back to the model after a tool ran.
#[derive(Debug, Clone)]
pub struct PluginOutput {
    pub content: String,
    pub metadata: Option<Value>,
}

impl PluginOutput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

impl fmt::Display for PluginOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.content)
    }
}

/// A local function the model may call during generation.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Function name as declared to the model.
    fn name(&self) -> &str;

    /// Tells the model when the function is useful.
    fn description(&self) -> &str;

    /// JSON schema of the arguments, or `None` for a zero-argument function.
    fn parameter_schema(&self) -> Option<Value>;

    fn required_permission(&self) -> Permission;

    /// Run the function with the arguments the model supplied.
    async fn execute(&self, input: Value) -> Result<PluginOutput>;
}
