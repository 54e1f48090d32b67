//! A provider that replays canned responses
//!
//! Used by tests and by the CLI's dry-run mode. Every request is recorded so
//! callers can assert on exactly what would have been sent over the wire.

use super::*;
use std::collections::VecDeque;
use std::sync::Mutex;

enum Step {
    Respond(CompletionResponse),
    Fail(ErrorKind, String),
}

/// Replays a queue of responses, then falls back to a fixed one (if any).
#[derive(Default)]
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    fallback: Option<CompletionResponse>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a full response
    pub fn then_respond(self, response: CompletionResponse) -> Self {
        self.push(Step::Respond(response))
    }

    /// Queue a plain assistant answer
    pub fn then_answer(self, content: impl Into<String>) -> Self {
        self.then_respond(CompletionResponse::from_message(ChatMessage::assistant(content)))
    }

    /// Queue a function-call request with raw argument text
    pub fn then_call(self, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        self.then_respond(CompletionResponse::from_message(ChatMessage::assistant_function_call(
            name, arguments,
        )))
    }

    /// Queue a remote fault
    pub fn then_fail(self, kind: ErrorKind, message: impl Into<String>) -> Self {
        self.push(Step::Fail(kind, message.into()))
    }

    /// Response returned once the queue is empty, forever
    pub fn repeating(mut self, response: CompletionResponse) -> Self {
        self.fallback = Some(response);
        self
    }

    /// Every request received so far, in order
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    fn push(self, step: Step) -> Self {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push_back(step);
        }
        self
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let poisoned = || {
            Error::unexpected("scripted provider lock poisoned")
                .with_operation("scripted::complete")
        };

        self.requests.lock().map_err(|_| poisoned())?.push(request);

        let next = self.steps.lock().map_err(|_| poisoned())?.pop_front();
        match next {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Fail(kind, message)) => {
                Err(Error::new(kind, message).with_operation("scripted::complete"))
            }
            None => self.fallback.clone().ok_or_else(|| {
                Error::inference_failed("script exhausted").with_operation("scripted::complete")
            }),
        }
    }
}
