//! Telegram adapter using teloxide

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, MessageId, ReactionType, User};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::{prune_idle, Channel, ChatHistories, MAX_CHATS};
use crate::agent::{
    Agent, Attachment, AttachmentKind, ChatConfig, InboundMessage, Invoker, NotificationSink, ProgressNotifier,
};
use crate::config::Config;
use crate::Result;

/// Feedback for one Telegram message: replies, reactions and chat actions.
pub struct TelegramSink {
    bot: Bot,
    chat_id: ChatId,
    message_id: Option<MessageId>,
}

impl TelegramSink {
    pub fn new(bot: Bot, chat_id: ChatId, message_id: Option<MessageId>) -> Self {
        Self { bot, chat_id, message_id }
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn send_text(&self, text: &str) -> Result<()> {
        self.bot.send_message(self.chat_id, text).await?;
        Ok(())
    }

    async fn set_reaction(&self, emoji: Option<&str>) -> Result<()> {
        let Some(message_id) = self.message_id else {
            return Ok(());
        };
        let reaction: Vec<ReactionType> = emoji
            .map(|e| vec![ReactionType::Emoji { emoji: e.to_string() }])
            .unwrap_or_default();

        self.bot
            .set_message_reaction(self.chat_id, message_id)
            .reaction(reaction)
            .await?;
        Ok(())
    }

    async fn set_typing_status(&self) -> Result<()> {
        self.bot.send_chat_action(self.chat_id, ChatAction::Typing).await?;
        Ok(())
    }

    async fn set_uploading_status(&self) -> Result<()> {
        self.bot.send_chat_action(self.chat_id, ChatAction::UploadDocument).await?;
        Ok(())
    }
}

/// Telegram channel adapter
pub struct TelegramChannel {
    bot: Bot,
    config: Config,
    agent: Arc<Agent>,
    // One turn at a time per chat; entries are dropped once no turn holds them
    locks: Mutex<HashMap<ChatId, Arc<Mutex<()>>>>,
    histories: Mutex<ChatHistories<ChatId>>,
}

impl TelegramChannel {
    pub fn new(config: Config, agent: Arc<Agent>) -> Self {
        let bot = Bot::new(&config.telegram.token);
        Self {
            bot,
            config,
            agent,
            locks: Mutex::new(HashMap::new()),
            histories: Mutex::new(ChatHistories::new(MAX_CHATS)),
        }
    }

    async fn handle_message(&self, message: teloxide::types::Message) -> Result<()> {
        let chat_id = message.chat.id;

        if !is_allowed(&self.config.telegram.allow_from, message.from.as_ref()) {
            debug!(user = ?message.from.as_ref().map(|u| u.id), "Ignoring message from unauthorized user");
            return Ok(());
        }

        let Some(inbound) = to_inbound(&message) else {
            debug!(chat = %chat_id, "Ignoring message without text or attachments");
            return Ok(());
        };
        let chat = chat_config(&message, self.config.telegram.group_reply_chance);

        info!(chat = %chat_id, sender = %inbound.sender.id, "Received message");

        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(chat_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        let guard = lock.lock().await;

        let history = self.histories.lock().await.get(&chat_id);

        let sink = Arc::new(TelegramSink::new(self.bot.clone(), chat_id, Some(message.id)));
        let notifier = ProgressNotifier::new(self.config.progress.clone(), sink.clone());

        let outcome = self.agent.handle(&inbound, &chat, &history, sink.as_ref(), &notifier).await;

        if let Some(reply) = outcome.reply() {
            if let Err(e) = sink.send_text(reply).await {
                error!(chat = %chat_id, error = %e, "Failed to deliver reply");
            }
        }

        if let crate::agent::TurnOutcome::Answered { text, .. } = &outcome {
            self.histories.lock().await.remember(chat_id, &inbound.content, text);
        }

        drop(guard);
        drop(lock);
        prune_idle(&mut *self.locks.lock().await);

        Ok(())
    }
}

/// Whether the sender passes the allow list. An empty list allows everyone.
pub fn is_allowed(allow_from: &[String], user: Option<&User>) -> bool {
    if allow_from.is_empty() {
        return true;
    }

    let Some(user) = user else { return false };
    let username = user.username.as_deref().unwrap_or("");
    let id = user.id.to_string();

    allow_from.iter().any(|allowed| {
        let allowed = allowed.trim_start_matches('@');
        (!username.is_empty() && allowed.eq_ignore_ascii_case(username)) || allowed == id
    })
}

/// Reply settings for the chat a message arrived in.
pub fn chat_config(message: &teloxide::types::Message, group_reply_chance: u8) -> ChatConfig {
    ChatConfig {
        is_private: message.chat.is_private(),
        reply_chance: group_reply_chance.min(100),
    }
}

/// Convert a Telegram message into an [`InboundMessage`].
///
/// Returns `None` for messages with neither text nor a supported attachment.
pub fn to_inbound(message: &teloxide::types::Message) -> Option<InboundMessage> {
    let sender = message
        .from
        .as_ref()
        .map(|user| {
            let handle = user.username.clone().unwrap_or_else(|| user.first_name.clone());
            Invoker::new(user.id.to_string(), handle)
        })
        .unwrap_or_else(|| Invoker::new(message.chat.id.to_string(), ""));

    let mut attachments = Vec::new();
    if let Some(largest) = message.photo().and_then(|sizes| sizes.last()) {
        attachments.push(Attachment {
            id: largest.file.id.to_string(),
            kind: AttachmentKind::Image,
            mime_type: Some("image/jpeg".to_string()),
        });
    }
    if let Some(document) = message.document() {
        attachments.push(Attachment {
            id: document.file.id.to_string(),
            kind: AttachmentKind::Document,
            mime_type: document.mime_type.as_ref().map(|m| m.to_string()),
        });
    }
    if let Some(voice) = message.voice() {
        attachments.push(Attachment {
            id: voice.file.id.to_string(),
            kind: AttachmentKind::Audio,
            mime_type: voice.mime_type.as_ref().map(|m| m.to_string()),
        });
    }

    let text = message.text().or_else(|| message.caption()).unwrap_or("");
    if text.trim().is_empty() && attachments.is_empty() {
        return None;
    }

    let mut inbound = InboundMessage::new("telegram", sender, text);
    inbound.chat_id = message.chat.id.to_string();
    inbound.message_id = Some(message.id.0.to_string());
    inbound.timestamp = message.date;
    inbound.attachments = attachments;
    Some(inbound)
}

async fn run_telegram_loop(channel: Arc<TelegramChannel>) {
    let handler = Update::filter_message().endpoint(
        |msg: teloxide::types::Message, channel: Arc<TelegramChannel>| async move {
            if let Err(e) = channel.handle_message(msg).await {
                error!(error = %e, "Error handling telegram message");
            }
            respond(())
        },
    );

    Dispatcher::builder(channel.bot.clone(), handler)
        .dependencies(dptree::deps![channel])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

impl Channel for Arc<TelegramChannel> {
    fn name(&self) -> &str {
        "telegram"
    }

    fn start(&self) -> impl std::future::Future<Output = Result<()>> + Send {
        let this = self.clone();
        async move {
            if this.config.telegram.token.is_empty() {
                warn!("Telegram token is empty, not starting");
                return Ok(());
            }
            info!("Starting Telegram bot...");
            run_telegram_loop(this).await;
            Ok(())
        }
    }
}
