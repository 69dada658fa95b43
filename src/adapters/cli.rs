//! CLI adapter — interactive and single-message command line interface.
//!
//! Runs every line through the full agent turn, including the reply gate,
//! commands and progress feedback printed to the terminal.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::agent::{Agent, ChatConfig, InboundMessage, Invoker, Message, NotificationSink, ProgressNotifier, TurnOutcome};
use crate::config::ProgressConfig;
use crate::ui;
use crate::Result;

use super::remember;

/// Prints agent feedback to the terminal.
#[derive(Debug, Default)]
pub struct ConsoleSink;

#[async_trait]
impl NotificationSink for ConsoleSink {
    async fn send_text(&self, text: &str) -> Result<()> {
        ui::print_thinking(text);
        Ok(())
    }

    async fn set_reaction(&self, emoji: Option<&str>) -> Result<()> {
        if let Some(emoji) = emoji {
            ui::print_reaction(emoji);
        }
        Ok(())
    }

    async fn set_typing_status(&self) -> Result<()> {
        debug!("typing");
        Ok(())
    }

    async fn set_uploading_status(&self) -> Result<()> {
        debug!("uploading");
        Ok(())
    }
}

/// CLI channel for interactive agent sessions.
pub struct CliChannel {
    agent: Arc<Agent>,
    progress: ProgressConfig,
    invoker: Invoker,
    sink: Arc<ConsoleSink>,
    history: Vec<Message>,
}

impl CliChannel {
    /// Create a new CLI channel speaking as `invoker`.
    pub fn new(agent: Arc<Agent>, progress: ProgressConfig, invoker: Invoker) -> Self {
        Self {
            agent,
            progress,
            invoker,
            sink: Arc::new(ConsoleSink),
            history: Vec::new(),
        }
    }

    /// Run a single message through the agent.
    pub async fn run_once(&mut self, text: &str) -> TurnOutcome {
        let message = InboundMessage::new("cli", self.invoker.clone(), text);
        let notifier = ProgressNotifier::new(self.progress.clone(), self.sink.clone());

        let outcome = self
            .agent
            .handle(&message, &ChatConfig::default(), &self.history, self.sink.as_ref(), &notifier)
            .await;

        if let TurnOutcome::Answered { text: reply, .. } = &outcome {
            remember(&mut self.history, text, reply);
        }
        outcome
    }

    /// Run interactive REPL loop.
    pub async fn run_interactive(&mut self) -> Result<()> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            print!("\n> ");
            stdout.flush()?;

            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                // EOF
                break;
            }

            let input = line.trim();
            if input.is_empty() {
                continue;
            }

            if matches!(input.to_lowercase().as_str(), "exit" | "quit" | "q") {
                println!("Goodbye! 👋");
                break;
            }

            let outcome = self.run_once(input).await;
            print_outcome(&outcome);
        }

        Ok(())
    }

    /// Clear conversation history.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Get current history length.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

/// Print a turn outcome the way the REPL shows it.
pub fn print_outcome(outcome: &TurnOutcome) {
    match outcome {
        TurnOutcome::Answered { text, .. } => ui::print_reply(text),
        TurnOutcome::Ignored | TurnOutcome::CommandHandled => {}
        TurnOutcome::NotConfigured(text) | TurnOutcome::Overflow { message: text, .. } => ui::print_warning(text),
        TurnOutcome::CommandFailed(text) | TurnOutcome::Failed(text) => ui::print_error(text),
    }
}
