//! portal-core - Query engine and retrieval pipeline for the research portal
//!
//! Provides:
//! - LLM provider abstraction with a Gemini backend
//! - The tool-augmented query engine ([`ChatManager`])
//! - Report model and PDF extraction
//! - Embedding generation and the Pinecone vector store client
//! - Configuration management
//! - The HTTP API ([`Server`])

pub mod chat;
pub mod config;
pub mod provider;
pub mod rag;
pub mod report;
pub mod server;

pub use chat::{ChatManager, GenerationOutcome};
pub use config::Config;
pub use report::{Report, ReportExtractor};
pub use server::Server;

pub use provider::{
    ChatRequest, ChatResponse, GeminiProvider, Message, Provider, ProviderError, Tool, ToolCall, ToolCallFunction,
    ToolFunction,
};
