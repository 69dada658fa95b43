//! Adapters module — chat platform integrations.
//!
//! Each adapter turns platform messages into [`crate::agent::InboundMessage`]s,
//! gives the agent a [`crate::agent::NotificationSink`] for live feedback and
//! delivers the final reply.
//!
//! # Supported Channels
//!
//! - **CLI** — Interactive command line interface
//! - **Telegram** — Telegram Bot API via teloxide
//!
//! # Adding a New Channel
//!
//! 1. Create a new file (e.g., `slack.rs`)
//! 2. Implement a `NotificationSink` for the platform
//! 3. Implement the [`Channel`] trait
//! 4. Add to [`ChannelRegistry`]

pub mod cli;
pub mod telegram;

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use crate::agent::Message;
use crate::config::Config;

/// Messages of history kept per conversation.
pub const MAX_HISTORY: usize = 20;

/// Conversations whose history is kept in memory at once.
pub const MAX_CHATS: usize = 1000;

/// Channel trait for long-running chat adapters.
///
/// All channel implementations must be [`Send`] + [`Sync`] for async compatibility.
pub trait Channel: Send + Sync {
    /// Channel name (e.g., "telegram", "cli").
    fn name(&self) -> &str;

    /// Start listening for messages.
    fn start(&self) -> impl std::future::Future<Output = crate::Result<()>> + Send;
}

/// Channel registry — metadata about available channels.
///
/// # Example
///
/// ```ignore
/// for name in ChannelRegistry::available() {
///     if ChannelRegistry::is_enabled(name, &config) {
///         println!("{} is enabled", name);
///     }
/// }
/// ```
pub struct ChannelRegistry;

impl ChannelRegistry {
    /// List all available channel names.
    pub fn available() -> &'static [&'static str] {
        &["cli", "telegram"]
    }

    /// Check if a channel is enabled in the config.
    pub fn is_enabled(name: &str, config: &Config) -> bool {
        match name {
            "cli" => true, // CLI is always available
            "telegram" => config.telegram.enabled && !config.telegram.token.is_empty(),
            _ => false,
        }
    }

    /// Get a human-readable description of a channel.
    pub fn description(name: &str) -> &'static str {
        match name {
            "cli" => "Interactive command line interface",
            "telegram" => "Telegram Bot API",
            _ => "Unknown channel",
        }
    }
}

/// Append one exchange to a conversation history, dropping the oldest messages past [`MAX_HISTORY`].
pub fn remember(history: &mut Vec<Message>, user: &str, reply: &str) {
    history.push(Message::user(user));
    history.push(Message::assistant(reply));
    if history.len() > MAX_HISTORY {
        let excess = history.len() - MAX_HISTORY;
        history.drain(..excess);
    }
}

/// Per-chat histories bounded to `capacity` chats; the least recently active chat is evicted first.
pub struct ChatHistories<K> {
    capacity: usize,
    clock: u64,
    chats: HashMap<K, (u64, Vec<Message>)>,
}

impl<K: Eq + Hash + Clone> ChatHistories<K> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            clock: 0,
            chats: HashMap::new(),
        }
    }

    /// History of one chat, marking it as active.
    pub fn get(&mut self, chat: &K) -> Vec<Message> {
        self.clock += 1;
        match self.chats.get_mut(chat) {
            Some((last_used, history)) => {
                *last_used = self.clock;
                history.clone()
            }
            None => Vec::new(),
        }
    }

    /// Record one exchange for `chat`, evicting the idlest chat if a new one does not fit.
    pub fn remember(&mut self, chat: K, user: &str, reply: &str) {
        self.clock += 1;
        if !self.chats.contains_key(&chat) && self.chats.len() >= self.capacity {
            let idlest = self
                .chats
                .iter()
                .min_by_key(|(_, (last_used, _))| *last_used)
                .map(|(key, _)| key.clone());
            if let Some(idlest) = idlest {
                self.chats.remove(&idlest);
            }
        }

        let (last_used, history) = self.chats.entry(chat).or_default();
        *last_used = self.clock;
        remember(history, user, reply);
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }
}

/// Drop per-chat locks nobody holds or waits on.
pub fn prune_idle<K, T>(locks: &mut HashMap<K, Arc<T>>) {
    locks.retain(|_, lock| Arc::strong_count(lock) > 1);
}
