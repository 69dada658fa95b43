//! Agent module — the orchestration core.
//!
//! This module contains:
//! - Message types (InboundMessage, Invoker, ChatConfig, ConversationTurn)
//! - Reply gate and slash-command interception
//! - LLM client trait and provider implementations
//! - Progress notifier running beside each turn
//! - The bounded tool loop ([`Agent`])
//!
//! # Adding a New LLM Provider
//!
//! See [`llm::ProviderRegistry`] for instructions.

pub mod commands;
pub mod gate;
mod leak_guard;
mod loop_impl;
mod message;
pub mod progress;

// LLM providers in submodule
pub mod llm;

// Re-exports for convenience
pub use commands::{CommandContext, CommandHandler, CommandInterceptor, CommandOutcome};
pub use gate::should_reply;
pub use leak_guard::LeakGuard;
pub use llm::{GeminiClient, LlmClient, LlmResponse, ModelFactory, OpenAiClient, ProviderRegistry};
pub use loop_impl::{Agent, TurnOutcome, NOT_CONFIGURED};
pub use message::{
    Attachment, AttachmentKind, ChatConfig, ConversationTurn, InboundMessage, Invoker, Message, Role,
    ToolCallRequest,
};
pub use progress::{Activity, NotificationSink, Progress, ProgressNotifier};
