//! LLM provider abstraction layer.
//!
//! This module defines a common interface for hosted model backends to
//! provide chat completions (with function calling) and embeddings.

mod types;
pub mod gemini;

// Re-export common types
pub use types::{
    Attachment,
    ChatRequest,
    ChatResponse,
    Message,
    Provider,
    ProviderError,
    Result,
    Tool,
    ToolCall,
    ToolCallFunction,
    ToolFunction,
};

pub use gemini::GeminiProvider;
