//! # LLM Provider Interface
//!
//! A trait-based abstraction for talking to a chat-completion service that
//! supports function calling.
//!
//! ## Design
//! - `LlmProvider` trait defines the request/response contract
//! - `OpenAIProvider` speaks the OpenAI-compatible `functions` / `function_call` API
//! - `ScriptedProvider` replays canned responses without any network access
//! - Usage tracking across the responses of a run

pub mod openai;
pub mod scripted;

pub use openai::OpenAIProvider;
pub use scripted::ScriptedProvider;

use chatloop_error::{Error, ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Core Types
// ============================================================================

/// A chat message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<String>,
    /// Function name, set on `function` result messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Function-call request, set on assistant messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
            name: None,
            function_call: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            name: None,
            function_call: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            name: None,
            function_call: None,
        }
    }

    /// An assistant message that requests a function call instead of answering
    pub fn assistant_function_call(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            name: None,
            function_call: Some(FunctionCall::new(name, arguments)),
        }
    }

    /// The result of running function `name`, fed back to the model
    pub fn function_result(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Function,
            content: Some(content.into()),
            name: Some(name.into()),
            function_call: None,
        }
    }

    /// Whether this message asks for a function to be run
    pub fn is_function_call(&self) -> bool {
        self.function_call.is_some()
    }

    /// Pretty print the message to stdout
    pub fn pretty_print(&self) {
        println!("[{}]", self.role.as_str().to_uppercase());
        if let Some(content) = &self.content {
            println!("{}", content);
        }
        if let Some(call) = &self.function_call {
            println!("  function_call: {}({})", call.name, call.arguments);
        }
        if let Some(name) = &self.name {
            println!("  name: {}", name);
        }
        println!();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Function,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Function => "function",
        }
    }

    fn parse(role: &str) -> Option<Self> {
        match role {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "function" => Some(Role::Function),
            _ => None,
        }
    }
}

/// A function that the model may ask to call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl FunctionDeclaration {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// A function call requested by the model.
///
/// `arguments` is the raw JSON text exactly as the model produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse arguments into a typed value
    pub fn parse_arguments<T: serde::de::DeserializeOwned>(
        &self,
    ) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_str(&self.arguments)
    }

    /// Parse arguments as untyped JSON, without any schema validation
    pub fn arguments_value(&self) -> Result<serde_json::Value> {
        self.parse_arguments().map_err(|e| {
            Error::new(ErrorKind::ParseFailed, "function-call arguments are not valid JSON")
                .with_operation("function_call::arguments_value")
                .with_context("function", self.name.clone())
                .with_context("arguments", self.arguments.clone())
                .set_source(e)
        })
    }
}

/// How the service should decide whether to call a function
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FunctionCallMode {
    /// Let the model decide between answering and calling a function
    #[default]
    Auto,
    /// Never call a function
    None,
    /// Force a call to the named function
    Named(String),
}

impl FunctionCallMode {
    fn to_wire(&self) -> serde_json::Value {
        match self {
            FunctionCallMode::Auto => serde_json::json!("auto"),
            FunctionCallMode::None => serde_json::json!("none"),
            FunctionCallMode::Named(name) => serde_json::json!({ "name": name }),
        }
    }
}

/// Request parameters for a completion
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub functions: Vec<FunctionDeclaration>,
    pub function_call: Option<FunctionCallMode>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Advertise functions and let the service pick one automatically
    pub fn with_functions(mut self, functions: Vec<FunctionDeclaration>) -> Self {
        if !functions.is_empty() {
            self.function_call = Some(FunctionCallMode::Auto);
        }
        self.functions = functions;
        self
    }

    pub fn with_function_call(mut self, mode: FunctionCallMode) -> Self {
        self.function_call = Some(mode);
        self
    }
}

/// Response from a completion request, as received
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    pub id: String,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

impl CompletionResponse {
    /// A single-choice response carrying `message`
    pub fn from_message(message: ChatMessage) -> Self {
        let finish_reason = if message.is_function_call() {
            FinishReason::FunctionCall
        } else {
            FinishReason::Stop
        };

        Self {
            id: String::new(),
            model: String::new(),
            choices: vec![Choice {
                index: 0,
                message,
                finish_reason,
            }],
            usage: Usage::default(),
        }
    }

    /// The first choice's message, the only one the loop consumes
    pub fn message(&self) -> Option<&ChatMessage> {
        self.choices.first().map(|c| &c.message)
    }
}

/// One candidate completion
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub index: usize,
    pub message: ChatMessage,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    FunctionCall,
    ToolCalls,
    ContentFilter,
    Unknown,
}

impl FinishReason {
    fn parse(reason: Option<&str>) -> Self {
        match reason {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("function_call") => FinishReason::FunctionCall,
            Some("tool_calls") => FinishReason::ToolCalls,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Unknown,
        }
    }
}

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

// ============================================================================
// Provider Trait
// ============================================================================

/// The chat-completion service contract
#[allow(async_fn_in_trait)]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "openai", "scripted")
    fn name(&self) -> &str;

    /// Model used when a request does not name one
    fn default_model(&self) -> &str;

    /// Send a completion request and get the full response
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
}

// ============================================================================
// Provider Configuration
// ============================================================================

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Configuration for creating providers
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub default_model: Option<String>,
    pub headers: HashMap<String, String>,
    pub timeout_secs: Option<u64>,
}

impl ProviderConfig {
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: Some(DEFAULT_BASE_URL.into()),
            default_model: Some(DEFAULT_MODEL.into()),
            headers: HashMap::new(),
            timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Any OpenAI-compatible server that needs no key (vLLM, Ollama, ...)
    pub fn local(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: None,
            base_url: Some(base_url.into()),
            default_model: Some(model.into()),
            headers: HashMap::new(),
            timeout_secs: Some(300),
        }
    }

    /// Load from the environment.
    ///
    /// - `OPENAI_API_KEY`: required unless `OPENAI_BASE_URL` points elsewhere
    /// - `OPENAI_BASE_URL`: defaults to the public OpenAI endpoint
    /// - `OPENAI_MODEL`: defaults to `gpt-3.5-turbo`
    /// - `OPENAI_TIMEOUT_SECS`: defaults to 120
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    ///
    /// Callers that take a base URL from elsewhere answer `OPENAI_BASE_URL`
    /// with it, so the key stays optional but the other values are still
    /// validated.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty());
        let base_url = lookup("OPENAI_BASE_URL").filter(|u| !u.is_empty());

        if api_key.is_none() && base_url.is_none() {
            return Err(Error::config_invalid("OPENAI_API_KEY is not set")
                .with_operation("provider_config::from_env"));
        }

        let timeout_secs = match lookup("OPENAI_TIMEOUT_SECS") {
            Some(raw) => Some(raw.parse::<u64>().map_err(|e| {
                Error::config_invalid(format!("invalid OPENAI_TIMEOUT_SECS '{}'", raw))
                    .with_operation("provider_config::from_env")
                    .set_source(e)
            })?),
            None => Some(DEFAULT_TIMEOUT_SECS),
        };

        Ok(Self {
            api_key,
            base_url: Some(base_url.unwrap_or_else(|| DEFAULT_BASE_URL.into())),
            default_model: Some(lookup("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into())),
            headers: HashMap::new(),
            timeout_secs,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

// ============================================================================
// Usage Tracking
// ============================================================================

/// Tracks token usage across multiple calls
#[derive(Debug, Clone, Default)]
pub struct UsageTracker {
    pub total_calls: usize,
    pub total_prompt_tokens: usize,
    pub total_completion_tokens: usize,
    pub by_model: HashMap<String, Usage>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, model: &str, usage: &Usage) {
        self.total_calls += 1;
        self.total_prompt_tokens += usage.prompt_tokens;
        self.total_completion_tokens += usage.completion_tokens;

        let entry = self.by_model.entry(model.to_string()).or_default();
        entry.prompt_tokens += usage.prompt_tokens;
        entry.completion_tokens += usage.completion_tokens;
        entry.total_tokens += usage.total_tokens;
    }

    pub fn total_tokens(&self) -> usize {
        self.total_prompt_tokens + self.total_completion_tokens
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_constructors() {
        let sys = ChatMessage::system("You are an announcer");
        assert_eq!(sys.role, Role::System);
        assert_eq!(sys.content.as_deref(), Some("You are an announcer"));

        let call = ChatMessage::assistant_function_call("get_news", r#"{"seed":10}"#);
        assert_eq!(call.role, Role::Assistant);
        assert!(call.content.is_none());
        assert!(call.is_function_call());

        let result = ChatMessage::function_result("get_news", "sunny");
        assert_eq!(result.role, Role::Function);
        assert_eq!(result.name.as_deref(), Some("get_news"));
    }

    #[test]
    fn test_function_declaration() {
        let decl = FunctionDeclaration::new("get_news", "Get news from the news API")
            .with_parameters(serde_json::json!({
                "type": "object",
                "properties": {
                    "seed": { "type": "number", "description": "random seed. from 0 to 100" }
                },
                "required": ["seed"]
            }));

        assert_eq!(decl.name, "get_news");
        assert!(decl.parameters["properties"]["seed"].is_object());
    }

    #[test]
    fn test_arguments_value() {
        let call = FunctionCall::new("get_news", r#"{"seed": 10}"#);
        assert_eq!(call.arguments_value().unwrap(), serde_json::json!({ "seed": 10 }));

        let bad = FunctionCall::new("get_news", "{seed: ");
        let err = bad.arguments_value().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseFailed);
        assert!(err.source_ref().is_some());
    }

    #[test]
    fn test_with_functions_sets_auto() {
        let request = CompletionRequest::new(vec![ChatMessage::user("hi")])
            .with_model("gpt-4o")
            .with_functions(vec![FunctionDeclaration::new("get_news", "news")]);

        assert_eq!(request.model.as_deref(), Some("gpt-4o"));
        assert_eq!(request.function_call, Some(FunctionCallMode::Auto));

        let bare = CompletionRequest::new(vec![]).with_functions(vec![]);
        assert!(bare.function_call.is_none());
    }

    #[test]
    fn test_from_message_finish_reason() {
        let answer = CompletionResponse::from_message(ChatMessage::assistant("done"));
        assert_eq!(answer.choices[0].finish_reason, FinishReason::Stop);

        let call =
            CompletionResponse::from_message(ChatMessage::assistant_function_call("f", "{}"));
        assert_eq!(call.choices[0].finish_reason, FinishReason::FunctionCall);
        assert!(call.message().unwrap().is_function_call());
    }

    #[test]
    fn test_config_from_lookup() {
        let env = HashMap::from([
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL", "gpt-4o-mini"),
        ]);
        let config = ProviderConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.base_url.as_deref(), Some(DEFAULT_BASE_URL));
        assert_eq!(config.default_model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(config.timeout_secs, Some(120));
    }

    #[test]
    fn test_config_requires_key_or_url() {
        let err = ProviderConfig::from_lookup(|_| None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);

        let config = ProviderConfig::from_lookup(|k| {
            (k == "OPENAI_BASE_URL").then(|| "http://localhost:11434/v1".to_string())
        })
        .unwrap();
        assert!(config.api_key.is_none());
        assert_eq!(config.default_model.as_deref(), Some(DEFAULT_MODEL));
    }

    #[test]
    fn test_config_bad_timeout() {
        let err = ProviderConfig::from_lookup(|k| match k {
            "OPENAI_API_KEY" => Some("sk".into()),
            "OPENAI_TIMEOUT_SECS" => Some("soon".into()),
            _ => None,
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_usage_tracker() {
        let mut tracker = UsageTracker::new();

        tracker.track("gpt-3.5-turbo", &Usage {
            prompt_tokens: 100,
            completion_tokens: 50,
            total_tokens: 150,
        });

        tracker.track("gpt-3.5-turbo", &Usage {
            prompt_tokens: 200,
            completion_tokens: 100,
            total_tokens: 300,
        });

        assert_eq!(tracker.total_calls, 2);
        assert_eq!(tracker.total_prompt_tokens, 300);
        assert_eq!(tracker.total_completion_tokens, 150);
        assert_eq!(tracker.total_tokens(), 450);
        assert_eq!(tracker.by_model["gpt-3.5-turbo"].total_tokens, 450);
    }
}
