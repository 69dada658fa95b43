//! Slash-command interception.
//!
//! Messages shaped like `/command[@handle] args` are routed to a registered
//! [`CommandHandler`] before the model is consulted. The result is always one
//! of three [`CommandOutcome`]s; handler errors and panics stop here.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::billing::{total_credits, UsageLedger};
use crate::error::Error;
use crate::Result;

use super::message::InboundMessage;
use super::progress::NotificationSink;

/// Result of trying to intercept a message as a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Not a command for this agent; continue to the model.
    Unknown,
    /// The command handled the turn completely.
    Success,
    /// The command was recognized but failed; carries the user-facing message.
    Failed(String),
}

/// Everything a handler needs to run one command.
pub struct CommandContext<'a> {
    pub command: &'a str,
    pub args: &'a str,
    pub message: &'a InboundMessage,
    pub sink: &'a dyn NotificationSink,
    /// `(name, description)` of every registered command.
    pub available: &'a [(String, String)],
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Command name without the leading slash.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn handle(&self, ctx: &CommandContext<'_>) -> Result<()>;
}

/// Routes slash commands addressed to this agent.
pub struct CommandInterceptor {
    agent_handle: String,
    handlers: Vec<Arc<dyn CommandHandler>>,
    pattern: Regex,
}

impl CommandInterceptor {
    pub fn new(agent_handle: &str) -> Self {
        Self {
            agent_handle: agent_handle.trim_start_matches('@').to_string(),
            handlers: Vec::new(),
            pattern: Regex::new(r"(?s)^/([A-Za-z0-9_]+)(?:@([A-Za-z0-9_]+))?(?:\s+(.*))?$")
                .expect("command pattern is a valid regex"),
        }
    }

    /// Interceptor with `/start`, `/help` and, given a ledger, `/usage`.
    pub fn with_builtins(agent_handle: &str, ledger: Option<Arc<dyn UsageLedger>>) -> Self {
        let mut interceptor = Self::new(agent_handle);
        interceptor.register(Arc::new(StartCommand));
        interceptor.register(Arc::new(HelpCommand));
        if let Some(ledger) = ledger {
            interceptor.register(Arc::new(UsageCommand { ledger }));
        }
        interceptor
    }

    /// Register a handler, replacing any with the same name.
    pub fn register(&mut self, handler: Arc<dyn CommandHandler>) {
        self.handlers.retain(|h| !h.name().eq_ignore_ascii_case(handler.name()));
        self.handlers.push(handler);
    }

    pub fn commands(&self) -> Vec<(String, String)> {
        self.handlers
            .iter()
            .map(|h| (h.name().to_string(), h.description().to_string()))
            .collect()
    }

    /// Split a message into `(command, args)` if it is a command addressed to this agent.
    pub fn parse<'t>(&self, text: &'t str) -> Option<(String, &'t str)> {
        let caps = self.pattern.captures(text.trim())?;
        if let Some(target) = caps.get(2) {
            if !target.as_str().eq_ignore_ascii_case(&self.agent_handle) {
                debug!(target = target.as_str(), "Command addressed to another agent");
                return None;
            }
        }
        let command = caps.get(1)?.as_str().to_lowercase();
        let args = caps.get(3).map(|m| m.as_str().trim()).unwrap_or("");
        Some((command, args))
    }

    /// Run the matching handler, if any.
    pub async fn intercept(&self, message: &InboundMessage, sink: &dyn NotificationSink) -> CommandOutcome {
        let text = message.content.trim();
        let Some((command, args)) = self.parse(text) else {
            return CommandOutcome::Unknown;
        };
        let Some(handler) = self.handlers.iter().find(|h| h.name().eq_ignore_ascii_case(&command)) else {
            debug!(command = %command, "Unregistered command, passing through");
            return CommandOutcome::Unknown;
        };

        let available = self.commands();
        let ctx = CommandContext {
            command: &command,
            args,
            message,
            sink,
            available: &available,
        };

        let result = AssertUnwindSafe(handler.handle(&ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(Error::Other("command handler panicked".to_string())));

        match result {
            Ok(()) => {
                info!(command = %command, "Command handled");
                CommandOutcome::Success
            }
            Err(e) => {
                warn!(command = %command, error = %e, "Command failed");
                CommandOutcome::Failed(format!("⚠️ /{command} failed. Please try again later."))
            }
        }
    }
}

struct StartCommand;

#[async_trait]
impl CommandHandler for StartCommand {
    fn name(&self) -> &str {
        "start"
    }

    fn description(&self) -> &str {
        "Say hello"
    }

    async fn handle(&self, ctx: &CommandContext<'_>) -> Result<()> {
        ctx.sink
            .send_text("👋 Hi! Send me a message and I'll do my best to help. Try /help for commands.")
            .await
    }
}

struct HelpCommand;

#[async_trait]
impl CommandHandler for HelpCommand {
    fn name(&self) -> &str {
        "help"
    }

    fn description(&self) -> &str {
        "List available commands"
    }

    async fn handle(&self, ctx: &CommandContext<'_>) -> Result<()> {
        let mut text = String::from("Available commands:\n");
        for (name, description) in ctx.available {
            text.push_str(&format!("/{name} — {description}\n"));
        }
        ctx.sink.send_text(text.trim_end()).await
    }
}

struct UsageCommand {
    ledger: Arc<dyn UsageLedger>,
}

#[async_trait]
impl CommandHandler for UsageCommand {
    fn name(&self) -> &str {
        "usage"
    }

    fn description(&self) -> &str {
        "Show credits used so far"
    }

    async fn handle(&self, ctx: &CommandContext<'_>) -> Result<()> {
        let payer = ctx.message.sender.payer_id();
        let records = self.ledger.records_for_payer(payer)?;
        let text = format!(
            "You have used {:.4} credits across {} calls.",
            total_credits(&records),
            records.len()
        );
        ctx.sink.send_text(&text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::Invoker;
    use crate::agent::progress::RecordingSink;
    use crate::billing::InMemoryLedger;

    struct Exploding;

    #[async_trait]
    impl CommandHandler for Exploding {
        fn name(&self) -> &str {
            "explode"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        async fn handle(&self, _ctx: &CommandContext<'_>) -> Result<()> {
            Err(Error::Other("kaboom".to_string()))
        }
    }

    struct Panicking;

    #[async_trait]
    impl CommandHandler for Panicking {
        fn name(&self) -> &str {
            "panic"
        }
        fn description(&self) -> &str {
            "Always panics"
        }
        async fn handle(&self, _ctx: &CommandContext<'_>) -> Result<()> {
            panic!("handler bug")
        }
    }

    fn message(text: &str) -> InboundMessage {
        InboundMessage::new("test", Invoker::new("u1", "alice"), text)
    }

    #[test]
    fn test_parse_command_forms() {
        let interceptor = CommandInterceptor::new("@mybot");
        assert_eq!(interceptor.parse("/help"), Some(("help".to_string(), "")));
        assert_eq!(interceptor.parse("/Help@MyBot now"), Some(("help".to_string(), "now")));
        assert_eq!(interceptor.parse("/help@otherbot"), None);
        assert_eq!(interceptor.parse("hello /help"), None);
    }

    #[tokio::test]
    async fn test_plain_text_is_unknown() {
        let interceptor = CommandInterceptor::with_builtins("mybot", None);
        let sink = RecordingSink::default();
        assert_eq!(interceptor.intercept(&message("hi there"), &sink).await, CommandOutcome::Unknown);
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_command_is_unknown() {
        let interceptor = CommandInterceptor::with_builtins("mybot", None);
        let sink = RecordingSink::default();
        assert_eq!(interceptor.intercept(&message("/weather"), &sink).await, CommandOutcome::Unknown);
    }

    #[tokio::test]
    async fn test_help_lists_commands() {
        let interceptor = CommandInterceptor::with_builtins("mybot", Some(Arc::new(InMemoryLedger::new())));
        let sink = RecordingSink::default();

        assert_eq!(interceptor.intercept(&message("/help"), &sink).await, CommandOutcome::Success);
        let texts = sink.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("/start"));
        assert!(texts[0].contains("/usage"));
    }

    #[tokio::test]
    async fn test_failing_and_panicking_handlers_become_failed() {
        let mut interceptor = CommandInterceptor::new("mybot");
        interceptor.register(Arc::new(Exploding));
        interceptor.register(Arc::new(Panicking));
        let sink = RecordingSink::default();

        let outcome = interceptor.intercept(&message("/explode"), &sink).await;
        assert!(matches!(outcome, CommandOutcome::Failed(ref m) if m.contains("/explode")));

        let outcome = interceptor.intercept(&message("/panic"), &sink).await;
        assert!(matches!(outcome, CommandOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_command_for_other_agent_is_unknown() {
        let interceptor = CommandInterceptor::with_builtins("mybot", None);
        let sink = RecordingSink::default();
        assert_eq!(
            interceptor.intercept(&message("/start@someone_else"), &sink).await,
            CommandOutcome::Unknown
        );
    }
}
