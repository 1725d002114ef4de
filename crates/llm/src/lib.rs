//! # LLM
//!
//! AI provider abstraction used by the lead engine.
//!
//! This crate provides:
//! - The `AIProvider` trait and the message/option types shared by providers
//! - An OpenAI chat-completions provider with optional web search

pub mod error;
pub mod openai;
pub mod provider;

pub use error::{LlmError, LlmResult};
pub use openai::OpenAIProvider;
pub use provider::{
    AIMessage, AIProvider, AIResponse, AIRole, GenerateOptions, MessageBuilder, TokenUsage,
};
