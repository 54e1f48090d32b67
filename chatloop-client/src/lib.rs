//! # chatloop-client
//!
//! The client side of the conversation loop: the message model exchanged with a
//! chat-completion service, function declarations advertised to it, and the
//! `LlmProvider` trait with its implementations.
//!
//! - `OpenAIProvider` talks to any OpenAI-compatible `/chat/completions` endpoint
//! - `ScriptedProvider` replays canned responses (tests, dry runs)

pub mod provider;

pub use chatloop_error::{Error, ErrorKind, ErrorStatus, Result};
pub use provider::{
    ChatMessage, Choice, CompletionRequest, CompletionResponse, FinishReason, FunctionCall,
    FunctionCallMode, FunctionDeclaration, LlmProvider, OpenAIProvider, ProviderConfig, Role,
    ScriptedProvider, Usage, UsageTracker,
};
