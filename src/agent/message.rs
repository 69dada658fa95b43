//! Message types for agent communication

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use chrono::{DateTime, Utc};

use crate::catalog::Capability;

/// Message role in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,

    /// Tool call ID (for tool responses)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Tool name (for tool responses)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    /// Tool calls made by assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
            tool_calls: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create an assistant message with tool calls
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls: Some(tool_calls),
            ..Self::with_role(Role::Assistant, content)
        }
    }

    /// Create a tool result message
    pub fn tool_result(call: &ToolCallRequest, result: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call.id.clone()),
            tool_name: Some(call.name.clone()),
            ..Self::with_role(Role::Tool, result)
        }
    }
}

/// A tool call request from the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Ordered message history for one agent turn.
///
/// Messages can only be appended; nothing is ever reordered or removed.
#[derive(Debug, Clone, Default)]
pub struct ConversationTurn {
    messages: Vec<Message>,
}

impl ConversationTurn {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a turn from a system prompt, prior history and the current user text.
    pub fn start(system_prompt: &str, history: &[Message], current: &str) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 2);
        if !system_prompt.is_empty() {
            messages.push(Message::system(system_prompt));
        }
        messages.extend(history.iter().cloned());
        messages.push(Message::user(current));
        Self { messages }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Kind of file attached to an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Audio,
    Document,
    Other,
}

/// A file attached to an inbound message, referenced by a platform identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub kind: AttachmentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// The user who sent a message, along with their tool preferences and keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Invoker {
    pub id: String,

    /// Platform handle without the leading `@`.
    pub handle: String,

    /// Identity paying for this user's usage, if sponsored.
    #[serde(default)]
    pub sponsor_id: Option<String>,

    /// Preferred tool id per capability.
    #[serde(default)]
    pub preferred_tools: HashMap<Capability, String>,

    /// The user's own API tokens, keyed by provider.
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
}

impl Invoker {
    pub fn new(id: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            handle: handle.into(),
            ..Self::default()
        }
    }

    /// The identity charged for this user's usage.
    pub fn payer_id(&self) -> &str {
        self.sponsor_id.as_deref().unwrap_or(&self.id)
    }
}

/// Per-chat reply settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatConfig {
    /// One-on-one chat with the agent.
    pub is_private: bool,

    /// Chance (0–100) of replying to an unaddressed group message.
    pub reply_chance: u8,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            is_private: true,
            reply_chance: 100,
        }
    }
}

/// Inbound message from a chat platform
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel: String,
    pub chat_id: String,
    pub message_id: Option<String>,
    pub sender: Invoker,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub attachments: Vec<Attachment>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl InboundMessage {
    pub fn new(channel: &str, sender: Invoker, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            chat_id: "default".to_string(),
            message_id: None,
            sender,
            content: content.to_string(),
            timestamp: Utc::now(),
            attachments: vec![],
            metadata: HashMap::new(),
        }
    }

    pub fn session_key(&self) -> String {
        format!("{}:{}", self.channel, self.chat_id)
    }

    /// Attachment identifiers that must never reach the user verbatim.
    pub fn attachment_ids(&self) -> Vec<String> {
        self.attachments.iter().map(|a| a.id.clone()).collect()
    }
}
