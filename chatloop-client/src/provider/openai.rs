//! OpenAI-compatible provider implementation
//!
//! Speaks the `functions` / `function_call` flavour of `/chat/completions`,
//! which OpenAI, Azure OpenAI, vLLM and most compatible servers accept.

use super::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// OpenAI-compatible provider.
///
/// Holds one long-lived HTTP client; build it once and share it across runs.
pub struct OpenAIProvider {
    client: Client,
    config: ProviderConfig,
}

impl OpenAIProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let timeout = config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout))
            .build()
            .map_err(|e| {
                Error::config_invalid("failed to create HTTP client")
                    .with_operation("openai::new")
                    .set_source(e)
            })?;

        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }
}

impl LlmProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        self.config.default_model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = request.model.as_deref().unwrap_or(self.default_model()).to_string();
        let api_request = OpenAIRequest::new(&model, request);

        tracing::debug!(
            model = %model,
            messages = api_request.messages.len(),
            functions = api_request.functions.as_ref().map_or(0, Vec::len),
            "sending chat completion request"
        );

        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url()))
            .json(&api_request);

        if let Some(api_key) = &self.config.api_key {
            if !api_key.is_empty() {
                req = req.bearer_auth(api_key);
            }
        }

        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }

        let response = req.send().await.map_err(|e| {
            Error::new(ErrorKind::NetworkFailed, e.to_string())
                .with_operation("openai::complete")
                .with_context("model", model.clone())
                .set_source(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), text, retry_after)
                .with_operation("openai::complete")
                .with_context("model", model));
        }

        let body = response.text().await.map_err(|e| {
            Error::new(ErrorKind::NetworkFailed, "failed to read response body")
                .with_operation("openai::complete")
                .set_source(e)
        })?;

        let api_response: OpenAIResponse = serde_json::from_str(&body).map_err(|e| {
            Error::parse_failed("unexpected chat completion response body")
                .with_operation("openai::complete")
                .with_context("model", model.clone())
                .set_source(e)
        })?;

        api_response.into_completion()
    }
}

/// Map a non-success HTTP status to an error kind
fn status_error(status: u16, body: String, retry_after: Option<String>) -> Error {
    let err = match status {
        401 | 403 => Error::new(ErrorKind::AuthenticationFailed, body),
        429 => Error::new(ErrorKind::RateLimited, body),
        500..=599 => Error::new(ErrorKind::ProviderUnavailable, body),
        _ => Error::inference_failed(body).permanent(),
    };
    let err = err.with_context("status", status.to_string());
    match retry_after {
        Some(secs) => err.with_context("retry_after", secs),
        None => err,
    }
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    functions: Option<Vec<OpenAIFunction>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<serde_json::Value>,
}

impl OpenAIRequest {
    fn new(model: &str, request: CompletionRequest) -> Self {
        // The API rejects `function_call` when no functions are declared.
        let (functions, function_call) = if request.functions.is_empty() {
            (None, None)
        } else {
            let functions = request
                .functions
                .into_iter()
                .map(|f| OpenAIFunction {
                    name: f.name,
                    description: Some(f.description),
                    parameters: Some(f.parameters),
                })
                .collect();
            (Some(functions), request.function_call.as_ref().map(FunctionCallMode::to_wire))
        };

        Self {
            model: model.to_string(),
            messages: request.messages.into_iter().map(OpenAIMessage::from).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            functions,
            function_call,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<OpenAIFunctionCall>,
}

impl From<ChatMessage> for OpenAIMessage {
    fn from(msg: ChatMessage) -> Self {
        Self {
            role: msg.role.as_str().into(),
            content: msg.content,
            name: msg.name,
            function_call: msg.function_call.map(|fc| OpenAIFunctionCall {
                name: fc.name,
                arguments: fc.arguments,
            }),
        }
    }
}

impl OpenAIMessage {
    fn into_chat_message(self) -> Result<ChatMessage> {
        let role = Role::parse(&self.role).ok_or_else(|| {
            Error::parse_failed(format!("unsupported message role '{}'", self.role))
                .with_operation("openai::into_chat_message")
        })?;

        Ok(ChatMessage {
            role,
            content: self.content,
            name: self.name,
            function_call: self.function_call.map(|fc| FunctionCall::new(fc.name, fc.arguments)),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

impl OpenAIResponse {
    fn into_completion(self) -> Result<CompletionResponse> {
        let choices = self
            .choices
            .into_iter()
            .enumerate()
            .map(|(i, c)| {
                Ok(Choice {
                    index: c.index.unwrap_or(i),
                    message: c.message.into_chat_message()?,
                    finish_reason: FinishReason::parse(c.finish_reason.as_deref()),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let usage = self
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            id: self.id,
            model: self.model,
            choices,
            usage,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    index: Option<usize>,
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}
