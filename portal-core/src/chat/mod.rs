//! Tool-augmented question answering.

mod manager;
mod prompt;

pub use manager::{
    ChatManager, GenerationOutcome, EMPTY_RESPONSE_FALLBACK, PENDING_TOOL_CALL_FALLBACK,
};
pub use prompt::DEFAULT_SYSTEM_PROMPT;
