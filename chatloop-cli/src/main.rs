//! # chatloop CLI
//!
//! Runs one function-calling conversation against an OpenAI-compatible
//! endpoint, with a dummy `get_news` function registered.
//!
//! Usage:
//!   chatloop [OPTIONS] <prompt>
//!
//! Examples:
//!   chatloop "Report tomorrow's news based on the information you get"
//!   chatloop --system "You are a news announcer." --max-calls 3 "Read the news"
//!   chatloop --dry-run "Anything"

mod news;

use chatloop_client::{ChatMessage, LlmProvider, OpenAIProvider, ProviderConfig, ScriptedProvider};
use chatloop_driver::{
    ConversationDriver, DriverOptions, MalformedArguments, RunOutcome, StopReason,
};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "chatloop")]
#[command(author, version, about = "Let a chat model call local functions until it answers")]
struct Cli {
    /// User message that opens the conversation
    #[arg(trailing_var_arg = true)]
    prompt: Vec<String>,

    /// System message placed before the prompt
    #[arg(long, default_value = "")]
    system: String,

    /// Model to use (defaults to OPENAI_MODEL, then gpt-3.5-turbo)
    #[arg(short, long)]
    model: Option<String>,

    /// OpenAI-compatible base URL (defaults to OPENAI_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Maximum number of model calls
    #[arg(long, default_value_t = 10, env = "CHATLOOP_MAX_CALLS")]
    max_calls: usize,

    /// Remove the call budget entirely (overrides --max-calls)
    #[arg(long)]
    unbounded: bool,

    /// Only keep the last response instead of all of them
    #[arg(long)]
    latest_only: bool,

    /// Abort the run when the model sends arguments that are not JSON
    #[arg(long)]
    fault_on_malformed: bool,

    /// Replay a canned conversation instead of calling the service
    #[arg(long)]
    dry_run: bool,

    /// Print responses as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn options(&self) -> DriverOptions {
        let malformed = if self.fault_on_malformed {
            MalformedArguments::Fault
        } else {
            MalformedArguments::Placeholder
        };

        DriverOptions::default()
            .with_max_calls((!self.unbounded).then_some(self.max_calls))
            .with_collect_all_responses(!self.latest_only)
            .with_malformed_arguments(malformed)
    }

    fn history(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system.clone()),
            ChatMessage::user(self.prompt.join(" ")),
        ]
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "chatloop=debug" } else { "chatloop=info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// The conversation a well-behaved model would have with `get_news`
fn dry_run_provider() -> ScriptedProvider {
    ScriptedProvider::new()
        .then_call("get_news", r#"{"seed": 10}"#)
        .then_answer(format!("Here is the news: {}", news::SUNNY))
}

/// Environment config with `--base-url` standing in for `OPENAI_BASE_URL`
fn provider_config(
    cli: &Cli,
    env: impl Fn(&str) -> Option<String>,
) -> chatloop_client::Result<ProviderConfig> {
    let mut config = ProviderConfig::from_lookup(|key| match (key, &cli.base_url) {
        ("OPENAI_BASE_URL", Some(base_url)) => Some(base_url.clone()),
        _ => env(key),
    })?;

    if let Some(model) = &cli.model {
        config = config.with_model(model.clone());
    }
    Ok(config)
}

async fn run<P: LlmProvider>(provider: Arc<P>, cli: &Cli) {
    let driver = ConversationDriver::new(provider).with_options(cli.options());
    let driver = match &cli.model {
        Some(model) => driver.with_model(model.clone()),
        None => driver,
    };

    let mut history = cli.history();
    match driver.run(&mut history, &news::registry()).await {
        Ok(outcome) => print_outcome(&outcome, cli.json),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_outcome(outcome: &RunOutcome, json: bool) {
    if json {
        let messages: Vec<_> = outcome.messages().collect();
        match serde_json::to_string_pretty(&messages) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: failed to serialize responses: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        for message in outcome.messages() {
            message.pretty_print();
        }
    }

    if outcome.stop_reason == StopReason::BudgetExhausted {
        eprintln!("(stopped after {} model calls: call budget exhausted)", outcome.model_calls);
    }
    tracing::info!(
        model_calls = outcome.model_calls,
        function_calls = outcome.function_calls,
        total_tokens = outcome.usage.total_tokens(),
        "run finished"
    );
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.dry_run {
        run(Arc::new(dry_run_provider()), &cli).await;
        return;
    }

    let provider = match provider_config(&cli, |key| std::env::var(key).ok())
        .and_then(OpenAIProvider::new)
    {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(
        provider = provider.name(),
        model = provider.default_model(),
        "provider ready"
    );

    run(Arc::new(provider), &cli).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatloop_client::{ErrorKind, Role};

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: Vec<(String, String)> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["chatloop", "report", "the", "news"]).unwrap();
        let options = cli.options();

        assert_eq!(options.max_calls, Some(10));
        assert!(options.collect_all_responses);
        assert_eq!(options.malformed_arguments, MalformedArguments::Placeholder);

        let history = cli.history();
        assert_eq!(history[0].role, Role::System);
        assert_eq!(history[0].content.as_deref(), Some(""));
        assert_eq!(history[1].content.as_deref(), Some("report the news"));
    }

    #[test]
    fn test_cli_unbounded_latest_only() {
        let cli = Cli::try_parse_from([
            "chatloop",
            "--unbounded",
            "--latest-only",
            "--fault-on-malformed",
            "hi",
        ])
        .unwrap();
        let options = cli.options();

        assert_eq!(options.max_calls, None);
        assert!(!options.collect_all_responses);
        assert_eq!(options.malformed_arguments, MalformedArguments::Fault);
    }

    #[tokio::test]
    async fn test_dry_run_conversation() {
        let provider = Arc::new(dry_run_provider());
        let driver = ConversationDriver::new(provider.clone());
        let mut history = vec![ChatMessage::system(""), ChatMessage::user("news please")];

        let outcome = driver.run(&mut history, &news::registry()).await.unwrap();

        assert_eq!(outcome.stop_reason, StopReason::Completed);
        assert_eq!(outcome.messages().count(), 2);
        assert_eq!(history[3], ChatMessage::function_result("get_news", news::SUNNY));
        assert_eq!(provider.request_count(), 2);
    }

    #[test]
    fn test_base_url_flag_keeps_key() {
        let cli = Cli::try_parse_from(["chatloop", "--base-url", "http://localhost:1/v1", "hi"])
            .unwrap();
        let config = provider_config(&cli, env(&[("OPENAI_API_KEY", "sk-test")])).unwrap();

        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:1/v1"));
        assert_eq!(config.timeout_secs, Some(120));
    }

    #[test]
    fn test_base_url_flag_makes_key_optional() {
        let cli = Cli::try_parse_from([
            "chatloop",
            "--base-url",
            "http://localhost:11434/v1",
            "--model",
            "llama3",
            "hi",
        ])
        .unwrap();
        let config = provider_config(&cli, env(&[])).unwrap();

        assert!(config.api_key.is_none());
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:11434/v1"));
        assert_eq!(config.default_model.as_deref(), Some("llama3"));
    }

    #[test]
    fn test_bad_timeout_rejected_with_base_url_flag() {
        let cli = Cli::try_parse_from(["chatloop", "--base-url", "http://localhost:1/v1", "hi"])
            .unwrap();
        let err = provider_config(
            &cli,
            env(&[("OPENAI_API_KEY", "sk"), ("OPENAI_TIMEOUT_SECS", "soon")]),
        )
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_missing_key_without_base_url() {
        let cli = Cli::try_parse_from(["chatloop", "hi"]).unwrap();
        let err = provider_config(&cli, env(&[])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }
}
