//! Progress notifier - live "still working" feedback while a turn runs.
//!
//! One background task per active turn. Every tick it either posts a
//! generated status text, advances an escalating reaction emoji, or just
//! re-asserts the typing indicator (platforms clear it after a few seconds).
//!
//! The session state lives entirely inside the worker task. The controller
//! only sees [`ProgressNotifier::start`] and [`ProgressNotifier::stop`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ProgressConfig;
use crate::Result;

use super::llm::LlmClient;
use super::message::Message;

const STATUS_PROMPT: &str = "You write one short, friendly chat message telling the user their \
request is still being worked on. Mention the elapsed time naturally. No greetings, no questions, \
at most one emoji.";

/// Platform operations used for user feedback. Failures are logged by callers, never escalated.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_text(&self, text: &str) -> Result<()>;

    /// Set the reaction on the user's message; `None` clears it.
    async fn set_reaction(&self, emoji: Option<&str>) -> Result<()>;

    async fn set_typing_status(&self) -> Result<()>;

    async fn set_uploading_status(&self) -> Result<()>;
}

/// What the agent is currently doing, as shown by the keep-alive status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Typing,
    Uploading,
}

/// Lifecycle handle the agent loop drives around a turn.
#[async_trait]
pub trait Progress: Send + Sync {
    async fn start(&self);

    async fn stop(&self);

    fn set_activity(&self, _activity: Activity) {}

    /// Model used to phrase status texts for the next session.
    async fn set_status_model(&self, _model: Arc<dyn LlmClient>) {}
}

/// Kind of update a tick emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickKind {
    TextUpdate,
    Reaction,
    KeepAlive,
}

/// Mutable state of one running session. Owned by the worker task.
struct ProgressSession {
    started: Instant,
    last_reaction: Instant,
    last_text_update: Instant,
    next_reaction: usize,
    ticks: u64,
}

impl ProgressSession {
    fn new(now: Instant) -> Self {
        Self {
            started: now,
            last_reaction: now,
            last_text_update: now,
            next_reaction: 0,
            ticks: 0,
        }
    }

    fn next_kind(&self, now: Instant, config: &ProgressConfig) -> TickKind {
        if now.duration_since(self.last_text_update) >= config.text_update_interval() {
            TickKind::TextUpdate
        } else if !config.reactions.is_empty()
            && now.duration_since(self.last_reaction) >= config.reaction_interval()
        {
            TickKind::Reaction
        } else {
            TickKind::KeepAlive
        }
    }
}

struct Lifecycle {
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
    force_finished: bool,
}

/// Background feedback worker for one chat message.
pub struct ProgressNotifier {
    config: ProgressConfig,
    sink: Arc<dyn NotificationSink>,
    status_model: Mutex<Option<Arc<dyn LlmClient>>>,
    uploading: Arc<AtomicBool>,
    lifecycle: Mutex<Lifecycle>,
}

impl ProgressNotifier {
    /// Without a status model, text updates fall back to plain status lines.
    pub fn new(config: ProgressConfig, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            config,
            sink,
            status_model: Mutex::new(None),
            uploading: Arc::new(AtomicBool::new(false)),
            lifecycle: Mutex::new(Lifecycle {
                cancel: CancellationToken::new(),
                worker: None,
                force_finished: false,
            }),
        }
    }

    /// Whether a worker is currently alive.
    pub async fn is_running(&self) -> bool {
        let lifecycle = self.lifecycle.lock().await;
        lifecycle.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Whether the last stop gave up waiting for the worker.
    pub async fn was_force_finished(&self) -> bool {
        self.lifecycle.lock().await.force_finished
    }
}

#[async_trait]
impl Progress for ProgressNotifier {
    /// Launch the worker unless one is already running.
    async fn start(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.worker.as_ref().is_some_and(|w| !w.is_finished()) {
            debug!("Progress session already running");
            return;
        }

        lifecycle.cancel = CancellationToken::new();
        lifecycle.force_finished = false;

        let worker = Worker {
            config: self.config.clone(),
            sink: self.sink.clone(),
            status_model: self.status_model.lock().await.clone(),
            uploading: self.uploading.clone(),
            cancel: lifecycle.cancel.clone(),
        };
        lifecycle.worker = Some(tokio::spawn(worker.run()));
        debug!("Progress session started");
    }

    /// Signal the worker, wait briefly for it, then clear any reaction.
    async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        lifecycle.cancel.cancel();

        if let Some(worker) = lifecycle.worker.take() {
            // On timeout the handle is dropped and the task is left to finish on its own.
            if tokio::time::timeout(self.config.stop_timeout(), worker).await.is_err() {
                warn!(
                    timeout_ms = self.config.stop_timeout_ms,
                    "Progress worker did not stop in time, abandoning it"
                );
                lifecycle.force_finished = true;
            }
        }
        self.uploading.store(false, Ordering::Relaxed);

        if let Err(e) = self.sink.set_reaction(None).await {
            debug!(error = %e, "Failed to clear reaction");
        }
        debug!("Progress session stopped");
    }

    fn set_activity(&self, activity: Activity) {
        self.uploading.store(activity == Activity::Uploading, Ordering::Relaxed);
    }

    async fn set_status_model(&self, model: Arc<dyn LlmClient>) {
        *self.status_model.lock().await = Some(model);
    }
}

/// The spawned half of a session.
struct Worker {
    config: ProgressConfig,
    sink: Arc<dyn NotificationSink>,
    status_model: Option<Arc<dyn LlmClient>>,
    uploading: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) {
        let tick = self.config.tick_interval();
        let max_ticks = self.config.max_ticks();
        let mut session = ProgressSession::new(Instant::now());

        self.keep_alive().await;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(tick) => {}
            }

            session.ticks += 1;
            let now = Instant::now();
            let kind = session.next_kind(now, &self.config);
            debug!(tick = session.ticks, ?kind, "Progress tick");

            match kind {
                TickKind::TextUpdate => {
                    self.text_update(now.duration_since(session.started)).await;
                    session.last_text_update = now;
                }
                TickKind::Reaction => {
                    let emoji = &self.config.reactions[session.next_reaction % self.config.reactions.len()];
                    if let Err(e) = self.sink.set_reaction(Some(emoji)).await {
                        debug!(error = %e, "Failed to set reaction");
                    }
                    session.next_reaction = (session.next_reaction + 1) % self.config.reactions.len();
                    session.last_reaction = now;
                }
                TickKind::KeepAlive => self.keep_alive().await,
            }

            if session.ticks >= max_ticks {
                warn!(ticks = session.ticks, "Progress session hit its cycle cap, stopping");
                break;
            }
        }
    }

    async fn keep_alive(&self) {
        let result = if self.uploading.load(Ordering::Relaxed) {
            self.sink.set_uploading_status().await
        } else {
            self.sink.set_typing_status().await
        };
        if let Err(e) = result {
            debug!(error = %e, "Failed to refresh chat status");
        }
    }

    async fn text_update(&self, elapsed: Duration) {
        let status = format!("Still working on it, {} seconds elapsed.", elapsed.as_secs());
        let text = self.compose(status).await;

        if let Err(e) = self.sink.set_reaction(None).await {
            debug!(error = %e, "Failed to clear reaction");
        }
        if let Err(e) = self.sink.send_text(&text).await {
            warn!(error = %e, "Failed to send status update");
        }
    }

    /// Rephrase the status line with the lightweight model, falling back to the line itself.
    async fn compose(&self, status: String) -> String {
        let Some(model) = &self.status_model else {
            return status;
        };

        let messages = [Message::system(STATUS_PROMPT), Message::user(status.as_str())];
        match model.chat(&messages, &[]).await {
            Ok(response) => response
                .content
                .filter(|c| !c.trim().is_empty())
                .unwrap_or(status),
            Err(e) => {
                warn!(error = %e, "Status model failed, sending plain status");
                status
            }
        }
    }
}

/// Event captured by [`RecordingSink`].
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Text(String),
    Reaction(Option<String>),
    Typing,
    Uploading,
}

/// Sink that records every call, for tests.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingSink {
    events: std::sync::Mutex<Vec<SinkEvent>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Text(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: SinkEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send_text(&self, text: &str) -> Result<()> {
        self.push(SinkEvent::Text(text.to_string()));
        Ok(())
    }

    async fn set_reaction(&self, emoji: Option<&str>) -> Result<()> {
        self.push(SinkEvent::Reaction(emoji.map(str::to_string)));
        Ok(())
    }

    async fn set_typing_status(&self) -> Result<()> {
        self.push(SinkEvent::Typing);
        Ok(())
    }

    async fn set_uploading_status(&self) -> Result<()> {
        self.push(SinkEvent::Uploading);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm::{FakeLlmClient, LlmResponse};
    use crate::error::Error;

    async fn notifier(sink: Arc<dyn NotificationSink>, model: Option<Arc<dyn LlmClient>>) -> ProgressNotifier {
        let notifier = ProgressNotifier::new(ProgressConfig::default(), sink);
        if let Some(model) = model {
            notifier.set_status_model(model).await;
        }
        notifier
    }

    fn count(events: &[SinkEvent], wanted: &SinkEvent) -> usize {
        events.iter().filter(|e| *e == wanted).count()
    }

    /// Sink whose typing call never returns.
    struct StuckSink {
        cleared: AtomicBool,
    }

    #[async_trait]
    impl NotificationSink for StuckSink {
        async fn send_text(&self, _text: &str) -> Result<()> {
            Ok(())
        }
        async fn set_reaction(&self, emoji: Option<&str>) -> Result<()> {
            if emoji.is_none() {
                self.cleared.store(true, Ordering::SeqCst);
            }
            Ok(())
        }
        async fn set_typing_status(&self) -> Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
        async fn set_uploading_status(&self) -> Result<()> {
            Err(Error::Other("unsupported".to_string()))
        }
    }

    #[test]
    fn test_tick_kind_priorities() {
        let config = ProgressConfig::default();
        let t0 = Instant::now();
        let session = ProgressSession::new(t0);

        assert_eq!(session.next_kind(t0 + Duration::from_secs(5), &config), TickKind::KeepAlive);
        assert_eq!(session.next_kind(t0 + Duration::from_secs(15), &config), TickKind::Reaction);
        assert_eq!(session.next_kind(t0 + Duration::from_secs(45), &config), TickKind::TextUpdate);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_then_reaction() {
        let sink = Arc::new(RecordingSink::default());
        let notifier = notifier(sink.clone(), None).await;

        notifier.start().await;
        tokio::time::sleep(Duration::from_secs(16)).await;
        notifier.stop().await;

        let events = sink.events();
        // initial + ticks at 5s and 10s
        assert_eq!(count(&events, &SinkEvent::Typing), 3);
        assert_eq!(count(&events, &SinkEvent::Reaction(Some("👀".to_string()))), 1);
        assert_eq!(events.last(), Some(&SinkEvent::Reaction(None)));
        assert!(!notifier.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reactions_escalate_and_text_update_uses_model() {
        let sink = Arc::new(RecordingSink::default());
        let model = Arc::new(FakeLlmClient::scripted(vec![Ok(LlmResponse::text("Hang tight, almost there!"))]));
        let notifier = notifier(sink.clone(), Some(model.clone())).await;

        notifier.start().await;
        tokio::time::sleep(Duration::from_secs(46)).await;
        notifier.stop().await;

        let events = sink.events();
        let reactions: Vec<SinkEvent> = events
            .iter()
            .filter(|e| matches!(e, SinkEvent::Reaction(Some(_))))
            .cloned()
            .collect();
        assert_eq!(
            reactions,
            vec![
                SinkEvent::Reaction(Some("👀".to_string())),
                SinkEvent::Reaction(Some("🤔".to_string())),
            ]
        );
        assert_eq!(sink.texts(), vec!["Hang tight, almost there!"]);
        assert_eq!(model.calls(), 1);

        let text_at = events.iter().position(|e| matches!(e, SinkEvent::Text(_))).unwrap();
        assert_eq!(events[text_at - 1], SinkEvent::Reaction(None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_update_falls_back_when_model_fails() {
        let sink = Arc::new(RecordingSink::default());
        let model = Arc::new(FakeLlmClient::scripted(vec![Err(Error::Llm("down".to_string()))]));
        let notifier = notifier(sink.clone(), Some(model)).await;

        notifier.start().await;
        tokio::time::sleep(Duration::from_secs(46)).await;
        notifier.stop().await;

        let texts = sink.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("45 seconds"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let sink = Arc::new(RecordingSink::default());
        let notifier = notifier(sink.clone(), None).await;

        notifier.start().await;
        notifier.start().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        notifier.stop().await;

        assert_eq!(count(&sink.events(), &SinkEvent::Typing), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uploading_activity_changes_keep_alive() {
        let sink = Arc::new(RecordingSink::default());
        let notifier = notifier(sink.clone(), None).await;

        notifier.start().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        notifier.set_activity(Activity::Uploading);
        tokio::time::sleep(Duration::from_secs(6)).await;
        notifier.stop().await;

        assert_eq!(count(&sink.events(), &SinkEvent::Uploading), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_cap_stops_worker() {
        let sink = Arc::new(RecordingSink::default());
        let config = ProgressConfig {
            tick_interval_secs: 1,
            reaction_interval_secs: 100,
            text_update_interval_secs: 2,
            cycle_cap_multiplier: 1,
            ..ProgressConfig::default()
        };
        let notifier = ProgressNotifier::new(config, sink.clone());

        notifier.start().await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(!notifier.is_running().await);
        // initial keep-alive, one keep-alive tick, then the text update on tick 2
        assert_eq!(count(&sink.events(), &SinkEvent::Typing), 2);
        assert_eq!(sink.texts().len(), 1);
        notifier.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_abandons_stuck_worker_and_still_clears() {
        let sink = Arc::new(StuckSink {
            cleared: AtomicBool::new(false),
        });
        let notifier = notifier(sink.clone(), None).await;

        notifier.start().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        notifier.stop().await;

        assert!(notifier.was_force_finished().await);
        assert!(sink.cleared.load(Ordering::SeqCst));
    }
}
