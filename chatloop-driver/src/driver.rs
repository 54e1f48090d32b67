//! Conversation driver - alternates between the model and local functions

use crate::function::FunctionRegistry;
use chatloop_client::{
    ChatMessage, CompletionRequest, CompletionResponse, FunctionCall, LlmProvider, UsageTracker,
};
use chatloop_error::{Error, Result};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Result content sent back when the model asks for an unregistered function
pub const FUNCTION_NOT_FOUND: &str = "Error: Function not found";

/// Result content sent back when a function fails; the cause is only logged
pub const FUNCTION_FAILED: &str = "Error: Exception thrown while running function";

/// What to do when a function call carries argument text that is not JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedArguments {
    /// Answer the call with the `FUNCTION_FAILED` placeholder and keep going
    #[default]
    Placeholder,
    /// Abort the run with a `ParseFailed` error
    Fault,
}

/// Options for a run
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Maximum number of model calls; `None` for no limit
    pub max_calls: Option<usize>,
    /// Keep every response, not just the latest one
    pub collect_all_responses: bool,
    pub malformed_arguments: MalformedArguments,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            max_calls: Some(10),
            collect_all_responses: true,
            malformed_arguments: MalformedArguments::default(),
        }
    }
}

impl DriverOptions {
    /// No call budget, only the latest response kept
    pub fn unbounded() -> Self {
        Self {
            max_calls: None,
            collect_all_responses: false,
            malformed_arguments: MalformedArguments::default(),
        }
    }

    pub fn with_max_calls(mut self, max_calls: Option<usize>) -> Self {
        self.max_calls = max_calls;
        self
    }

    pub fn with_collect_all_responses(mut self, collect: bool) -> Self {
        self.collect_all_responses = collect;
        self
    }

    pub fn with_malformed_arguments(mut self, policy: MalformedArguments) -> Self {
        self.malformed_arguments = policy;
        self
    }
}

/// Where the driver is in its loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    AwaitingModel,
    ExecutingFunction,
}

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The model answered without requesting a function
    Completed,
    /// The call budget ran out first
    BudgetExhausted,
}

/// What a run produced
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Raw responses in arrival order (only the latest unless collecting all)
    pub responses: Vec<CompletionResponse>,
    pub stop_reason: StopReason,
    /// Number of requests sent to the model
    pub model_calls: usize,
    /// Number of function-call requests answered
    pub function_calls: usize,
    pub usage: UsageTracker,
}

impl RunOutcome {
    /// The model's final answer, if the run completed
    pub fn final_message(&self) -> Option<&ChatMessage> {
        match self.stop_reason {
            StopReason::Completed => self.responses.last().and_then(CompletionResponse::message),
            StopReason::BudgetExhausted => None,
        }
    }

    /// First-choice message of every collected response
    pub fn messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.responses.iter().filter_map(CompletionResponse::message)
    }
}

/// Empty system/user framing for callers that have nothing to say up front
pub fn default_framing() -> Vec<ChatMessage> {
    vec![ChatMessage::system(""), ChatMessage::user("")]
}

/// Drives one conversation at a time against a long-lived provider
pub struct ConversationDriver<P> {
    provider: Arc<P>,
    model: Option<String>,
    options: DriverOptions,
}

impl<P: LlmProvider> ConversationDriver<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            model: None,
            options: DriverOptions::default(),
        }
    }

    /// Use `model` instead of the provider's default
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_options(mut self, options: DriverOptions) -> Self {
        self.options = options;
        self
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or_else(|| self.provider.default_model())
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// Run the loop until the model answers or the budget is spent.
    ///
    /// `history` is only ever appended to. Each function-call message the
    /// model sends is followed by exactly one `function` result message, and a
    /// final answer is appended as the last message. Remote faults propagate
    /// and leave `history` as it was at the time of the failing request.
    #[tracing::instrument(skip_all, fields(model = %self.model()))]
    pub async fn run(
        &self,
        history: &mut Vec<ChatMessage>,
        functions: &FunctionRegistry,
    ) -> Result<RunOutcome> {
        let declarations = functions.declarations();
        let mut remaining = self.options.max_calls;
        let mut state = DriverState::AwaitingModel;
        let mut outcome = RunOutcome {
            responses: Vec::new(),
            stop_reason: StopReason::Completed,
            model_calls: 0,
            function_calls: 0,
            usage: UsageTracker::new(),
        };

        loop {
            debug_assert_eq!(state, DriverState::AwaitingModel);

            if remaining == Some(0) {
                warn!(
                    model_calls = outcome.model_calls,
                    "call budget exhausted before the model finished"
                );
                outcome.stop_reason = StopReason::BudgetExhausted;
                return Ok(outcome);
            }

            let request = CompletionRequest::new(history.clone())
                .with_model(self.model())
                .with_functions(declarations.clone());

            debug!(iteration = outcome.model_calls + 1, messages = history.len(), "awaiting model");
            let response = self.provider.complete(request).await.map_err(|e| {
                e.with_operation("driver::run")
                    .with_context("iteration", (outcome.model_calls + 1).to_string())
            })?;
            outcome.model_calls += 1;
            outcome.usage.track(&response.model, &response.usage);

            let message = response.message().cloned().ok_or_else(|| {
                Error::inference_failed("completion returned no choices")
                    .with_operation("driver::run")
                    .with_context("response_id", response.id.clone())
            })?;

            if !self.options.collect_all_responses {
                outcome.responses.clear();
            }
            outcome.responses.push(response);

            let Some(call) = message.function_call.clone() else {
                history.push(message);
                info!(
                    model_calls = outcome.model_calls,
                    function_calls = outcome.function_calls,
                    "conversation completed"
                );
                return Ok(outcome);
            };

            state = DriverState::ExecutingFunction;
            debug!(function = %call.name, ?state, "model requested function");
            history.push(message);

            let content = self.execute(&call, functions).await?;
            history.push(ChatMessage::function_result(&call.name, content));
            outcome.function_calls += 1;

            remaining = remaining.map(|n| n - 1);
            state = DriverState::AwaitingModel;
        }
    }

    /// Run one requested function and produce the content of its result message
    async fn execute(&self, call: &FunctionCall, functions: &FunctionRegistry) -> Result<String> {
        let Some(function) = functions.find(&call.name) else {
            warn!(function = %call.name, "model requested an unregistered function");
            return Ok(FUNCTION_NOT_FOUND.to_string());
        };

        let arguments = match call.arguments_value() {
            Ok(arguments) => arguments,
            Err(e) => match self.options.malformed_arguments {
                MalformedArguments::Fault => return Err(e.with_operation("driver::execute")),
                MalformedArguments::Placeholder => {
                    error!(
                        function = %call.name,
                        error = %e,
                        "function-call arguments are not valid JSON"
                    );
                    return Ok(FUNCTION_FAILED.to_string());
                }
            },
        };

        debug!(function = %call.name, %arguments, "calling function");
        match function.call(arguments.clone()).await {
            Ok(output) => {
                debug!(function = %call.name, %arguments, output = %output, "function returned");
                Ok(output)
            }
            Err(e) => {
                error!(function = %call.name, %arguments, error = %e, "function failed");
                Ok(FUNCTION_FAILED.to_string())
            }
        }
    }
}
