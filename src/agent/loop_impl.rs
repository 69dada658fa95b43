//! Agent loop - gate, commands, model resolution and the bounded tool loop

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{debug, error, info, warn};

use crate::billing::{TrackedLlmClient, UsageLedger, UsageTracker};
use crate::catalog::{Capability, ConfigCredentialResolver, ToolCatalog, ToolChoiceResolver};
use crate::config::{AgentConfig, Config};
use crate::error::Error;
use crate::tools::ToolRunner;
use crate::Result;

use super::commands::{CommandInterceptor, CommandOutcome};
use super::gate::should_reply;
use super::leak_guard::LeakGuard;
use super::llm::{LlmClient, ModelFactory, ProviderRegistry};
use super::message::{ChatConfig, ConversationTurn, InboundMessage, Invoker, Message};
use super::progress::{Activity, NotificationSink, Progress};

/// Reply when no model could be resolved for the invoker.
pub const NOT_CONFIGURED: &str =
    "⚙️ No AI model is configured for you yet. Ask an admin to add an API key, or add your own.";

/// How one inbound message was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The reply gate said no; nothing was sent.
    Ignored,
    /// A command handled the message itself.
    CommandHandled,
    /// A command failed; carries its user-facing message.
    CommandFailed(String),
    /// No credentialed model for the invoker.
    NotConfigured(String),
    /// The model produced a final answer.
    Answered { text: String, iterations: usize },
    /// The iteration cap was reached without a final answer.
    Overflow { message: String, iterations: usize },
    /// Anything else that went wrong inside the turn.
    Failed(String),
}

impl TurnOutcome {
    /// Text the caller should deliver, if any.
    pub fn reply(&self) -> Option<&str> {
        match self {
            TurnOutcome::Ignored | TurnOutcome::CommandHandled => None,
            TurnOutcome::CommandFailed(text)
            | TurnOutcome::NotConfigured(text)
            | TurnOutcome::Failed(text)
            | TurnOutcome::Answered { text, .. }
            | TurnOutcome::Overflow { message: text, .. } => Some(text.as_str()).filter(|t| !t.trim().is_empty()),
        }
    }
}

/// The orchestration core: one call to [`Agent::handle`] per inbound message.
pub struct Agent {
    config: AgentConfig,
    resolver: ToolChoiceResolver,
    models: Arc<dyn ModelFactory>,
    tracker: UsageTracker,
    tools: Arc<ToolRunner>,
    commands: CommandInterceptor,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        resolver: ToolChoiceResolver,
        models: Arc<dyn ModelFactory>,
        tracker: UsageTracker,
        tools: Arc<ToolRunner>,
        commands: CommandInterceptor,
    ) -> Self {
        Self {
            config,
            resolver,
            models,
            tracker,
            tools,
            commands,
        }
    }

    /// Wire an agent from configuration with the real providers and default tools.
    pub fn from_config(config: &Config, ledger: Arc<dyn UsageLedger>) -> Self {
        let catalog = Arc::new(ToolCatalog::with_extra(config.catalog.clone()));
        let credentials = Arc::new(ConfigCredentialResolver::new(config.api_keys.clone()));

        Self::new(
            config.agent.clone(),
            ToolChoiceResolver::new(catalog, credentials),
            Arc::new(ProviderRegistry),
            UsageTracker::new(ledger.clone(), config.billing.maintenance_fee),
            Arc::new(ToolRunner::new_with_defaults()),
            CommandInterceptor::with_builtins(&config.agent.handle, Some(ledger)),
        )
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn resolver(&self) -> &ToolChoiceResolver {
        &self.resolver
    }

    /// Usage-tracked client for the given capability, or `None` if nothing is credentialed.
    pub fn model_for(
        &self,
        invoker: &Invoker,
        capability: Capability,
        preferred: Option<&str>,
    ) -> Option<Result<Arc<dyn LlmClient>>> {
        let preferred = preferred.or_else(|| invoker.preferred_tools.get(&capability).map(String::as_str));
        let tool = self
            .resolver
            .resolve(invoker, capability, preferred, self.config.default_tool(capability))?;

        Some(self.models.create(&tool).map(|client| {
            Arc::new(TrackedLlmClient::new(client, tool, self.tracker.clone())) as Arc<dyn LlmClient>
        }))
    }

    /// Lightweight model used by the progress notifier for status texts.
    pub fn status_model(&self, invoker: &Invoker) -> Option<Arc<dyn LlmClient>> {
        match self.model_for(invoker, self.config.status_capability, self.config.status_tool.as_deref())? {
            Ok(model) => Some(model),
            Err(e) => {
                warn!(error = %e, "Status model unavailable, progress texts will be plain");
                None
            }
        }
    }

    /// Handle one inbound message end to end.
    ///
    /// Never fails: every error path becomes a [`TurnOutcome`] with a
    /// user-facing message. Once `progress` is started it is stopped exactly
    /// once before this returns. The status model is only resolved for
    /// messages that reach the model.
    pub async fn handle(
        &self,
        message: &InboundMessage,
        chat: &ChatConfig,
        history: &[Message],
        sink: &dyn NotificationSink,
        progress: &dyn Progress,
    ) -> TurnOutcome {
        if !should_reply(&message.content, chat, &message.sender.handle, &self.config.handle) {
            debug!(chat = %message.chat_id, sender = %message.sender.id, "Reply gate declined");
            return TurnOutcome::Ignored;
        }

        match self.commands.intercept(message, sink).await {
            CommandOutcome::Success => return TurnOutcome::CommandHandled,
            CommandOutcome::Failed(text) => return TurnOutcome::CommandFailed(text),
            CommandOutcome::Unknown => {}
        }

        let model = match self.model_for(&message.sender, Capability::Chat, None) {
            Some(Ok(model)) => model,
            Some(Err(e)) => {
                error!(error = %e, "Failed to build model client");
                return TurnOutcome::Failed(format!("⚠️ Something went wrong: {e}"));
            }
            None => return TurnOutcome::NotConfigured(NOT_CONFIGURED.to_string()),
        };

        if let Some(status) = self.status_model(&message.sender) {
            progress.set_status_model(status).await;
        }

        progress.start().await;
        let result = AssertUnwindSafe(self.run(message, history, model.as_ref(), progress))
            .catch_unwind()
            .await;
        progress.stop().await;

        match result {
            Ok(Ok((text, iterations))) => TurnOutcome::Answered { text, iterations },
            Ok(Err(Error::MaxIterations(max))) => TurnOutcome::Overflow {
                message: format!(
                    "⚠️ I couldn't finish this within {max} steps. Please try a simpler request."
                ),
                iterations: max,
            },
            Ok(Err(e)) => {
                error!(error = %e, "Turn failed");
                TurnOutcome::Failed(format!("⚠️ Something went wrong: {e}"))
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(reason = %reason, "Turn panicked");
                TurnOutcome::Failed(format!("⚠️ Something went wrong: {reason}"))
            }
        }
    }

    /// The bounded tool loop. Returns the answer and the number of model invocations.
    async fn run(
        &self,
        message: &InboundMessage,
        history: &[Message],
        model: &dyn LlmClient,
        progress: &dyn Progress,
    ) -> Result<(String, usize)> {
        let mut turn = ConversationTurn::start(&self.config.system_prompt, history, &user_content(message));
        let identifiers = message.attachment_ids();
        let schemas = self.tools.schemas();
        let max_iterations = self.config.max_iterations;
        let mut guard = LeakGuard::new();
        let mut iterations = 0;

        info!(chat = %message.chat_id, sender = %message.sender.id, "Starting turn");

        while iterations < max_iterations {
            iterations += 1;
            debug!(iteration = iterations, max = max_iterations, "Invoking model");

            let response = model.chat(turn.messages(), &schemas).await?;

            if !response.has_tool_calls() {
                let answer = response.content.unwrap_or_default();
                if let Some(correction) = guard.check(&answer, &identifiers) {
                    turn.push(Message::assistant(answer));
                    turn.push(correction);
                    continue;
                }
                info!(iterations, chars = answer.len(), "Turn answered");
                return Ok((answer, iterations));
            }

            turn.push(Message::assistant_with_tools(
                response.content.unwrap_or_default(),
                response.tool_calls.clone(),
            ));

            for call in &response.tool_calls {
                let media = self.tools.produces_media(&call.name);
                if media {
                    progress.set_activity(Activity::Uploading);
                }
                let result = self
                    .tools
                    .invoke_named(&call.name, call.arguments.clone(), &self.tracker, &message.sender)
                    .await;
                if media {
                    progress.set_activity(Activity::Typing);
                }

                match result {
                    Some(output) => turn.push(Message::tool_result(call, output)),
                    None => warn!(tool = %call.name, call = %call.id, "Tool returned no result, continuing without it"),
                }
            }
        }

        warn!(max = max_iterations, "Turn hit the iteration cap");
        Err(Error::MaxIterations(max_iterations))
    }
}

/// User text plus a line per attachment so the model can pass identifiers to tools.
fn user_content(message: &InboundMessage) -> String {
    let mut content = message.content.clone();
    for attachment in &message.attachments {
        content.push_str(&format!(
            "\n[attached {:?} id={}]",
            attachment.kind, attachment.id
        ));
    }
    content
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unexpected internal error".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::agent::llm::{FakeLlmClient, LlmResponse};
    use crate::agent::message::{Attachment, AttachmentKind, Role, ToolCallRequest};
    use crate::agent::progress::RecordingSink;
    use crate::billing::InMemoryLedger;
    use crate::catalog::{ConfiguredTool, CostEstimate, ToolDefinition};
    use crate::tools::{DummyTool, Tool, ToolSchema};

    /// Hands out the same fake client for every resolved tool.
    struct FakeModels {
        client: Arc<dyn LlmClient>,
        created: Mutex<Vec<String>>,
    }

    impl ModelFactory for FakeModels {
        fn create(&self, tool: &ConfiguredTool) -> Result<Arc<dyn LlmClient>> {
            self.created.lock().unwrap().push(tool.id().to_string());
            Ok(self.client.clone())
        }
    }

    #[derive(Default)]
    struct CountingProgress {
        starts: AtomicUsize,
        stops: AtomicUsize,
        activities: Mutex<Vec<Activity>>,
        status_models: AtomicUsize,
    }

    #[async_trait]
    impl Progress for CountingProgress {
        async fn start(&self) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        async fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }

        fn set_activity(&self, activity: Activity) {
            self.activities.lock().unwrap().push(activity);
        }

        async fn set_status_model(&self, _model: Arc<dyn LlmClient>) {
            self.status_models.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl CountingProgress {
        fn counts(&self) -> (usize, usize) {
            (self.starts.load(Ordering::SeqCst), self.stops.load(Ordering::SeqCst))
        }
    }

    /// Tool that counts invocations and may claim to upload media.
    struct CountingTool {
        calls: Arc<AtomicUsize>,
        media: bool,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            "lookup"
        }
        fn description(&self) -> &str {
            "Looks something up"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _params: Value) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("found it".to_string())
        }
        fn produces_media(&self) -> bool {
            self.media
        }
    }

    struct PanickingClient;

    #[async_trait]
    impl LlmClient for PanickingClient {
        async fn chat(&self, _messages: &[Message], _tools: &[ToolSchema]) -> Result<LlmResponse> {
            panic!("provider adapter bug")
        }
        fn default_model(&self) -> &str {
            "panicky"
        }
    }

    struct Harness {
        agent: Agent,
        ledger: Arc<InMemoryLedger>,
        models: Arc<FakeModels>,
    }

    fn harness(client: Arc<dyn LlmClient>, api_keys: &[(&str, &str)], tools: ToolRunner, max_iterations: usize) -> Harness {
        let catalog = Arc::new(ToolCatalog::new(vec![ToolDefinition::new(
            "chat-model",
            "Chat Model",
            "openai",
            &[Capability::Chat],
            CostEstimate::tokens(1.0, 2.0),
        )]));
        let keys: HashMap<String, String> = api_keys
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let resolver = ToolChoiceResolver::new(catalog, Arc::new(ConfigCredentialResolver::new(keys)));

        let ledger = Arc::new(InMemoryLedger::new());
        let models = Arc::new(FakeModels {
            client,
            created: Mutex::new(vec![]),
        });
        let config = AgentConfig {
            handle: "testbot".to_string(),
            max_iterations,
            ..AgentConfig::default()
        };

        let agent = Agent::new(
            config,
            resolver,
            models.clone(),
            UsageTracker::new(ledger.clone(), 0.0),
            Arc::new(tools),
            CommandInterceptor::with_builtins("testbot", Some(ledger.clone())),
        );
        Harness { agent, ledger, models }
    }

    fn message(text: &str) -> InboundMessage {
        InboundMessage::new("test", Invoker::new("u1", "alice"), text)
    }

    fn private_chat() -> ChatConfig {
        ChatConfig {
            is_private: true,
            reply_chance: 50,
        }
    }

    fn tool_call(id: &str) -> LlmResponse {
        LlmResponse::tool_calls(vec![ToolCallRequest {
            id: id.to_string(),
            name: "lookup".to_string(),
            arguments: json!({}),
        }])
    }

    fn call(id: &str, name: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_string(),
            name: name.to_string(),
            arguments: json!({}),
        }
    }

    fn dummy(name: &str, result: Option<&str>) -> DummyTool {
        DummyTool {
            name: name.to_string(),
            result: result.map(str::to_string),
        }
    }

    fn counting_tools(media: bool) -> (ToolRunner, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut runner = ToolRunner::new();
        runner.register(CountingTool {
            calls: calls.clone(),
            media,
        });
        (runner, calls)
    }

    #[tokio::test]
    async fn test_private_chat_single_answer() {
        let client = Arc::new(FakeLlmClient::new(vec!["Hello, human!"]));
        let h = harness(client.clone(), &[("openai", "sk-platform")], ToolRunner::new(), 10);
        let sink = RecordingSink::default();
        let progress = CountingProgress::default();

        let outcome = h.agent.handle(&message("Hi there"), &private_chat(), &[], &sink, &progress).await;

        assert_eq!(
            outcome,
            TurnOutcome::Answered {
                text: "Hello, human!".to_string(),
                iterations: 1
            }
        );
        assert_eq!(progress.counts(), (1, 1));
        assert_eq!(progress.status_models.load(Ordering::SeqCst), 1);
        let records = h.ledger.records();
        assert_eq!(records.len(), 1);
        assert!(!records[0].is_failed);
        assert!(records[0].uses_credits);
    }

    #[tokio::test]
    async fn test_unaddressed_group_message_is_ignored() {
        let client = Arc::new(FakeLlmClient::new(vec!["should not be used"]));
        let h = harness(client.clone(), &[("openai", "sk-platform")], ToolRunner::new(), 10);
        let sink = RecordingSink::default();
        let progress = CountingProgress::default();
        let group = ChatConfig {
            is_private: false,
            reply_chance: 0,
        };

        let outcome = h.agent.handle(&message("hello everyone"), &group, &[], &sink, &progress).await;

        assert_eq!(outcome, TurnOutcome::Ignored);
        assert_eq!(outcome.reply(), None);
        assert_eq!(client.calls(), 0);
        assert!(h.ledger.records().is_empty());
        assert_eq!(progress.counts(), (0, 0));
        assert!(sink.events().is_empty());
        assert!(h.models.created.lock().unwrap().is_empty());
        assert_eq!(progress.status_models.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_credential_is_not_configured() {
        let client = Arc::new(FakeLlmClient::new(vec!["should not be used"]));
        let h = harness(client.clone(), &[], ToolRunner::new(), 10);
        let sink = RecordingSink::default();
        let progress = CountingProgress::default();

        let outcome = h.agent.handle(&message("Hi"), &private_chat(), &[], &sink, &progress).await;

        assert_eq!(outcome, TurnOutcome::NotConfigured(NOT_CONFIGURED.to_string()));
        assert_eq!(progress.counts(), (0, 0));
        assert_eq!(client.calls(), 0);
        assert!(h.models.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tool_call_then_answer() {
        let client = Arc::new(FakeLlmClient::scripted(vec![
            Ok(tool_call("tc_1")),
            Ok(LlmResponse::text("The answer is 42")),
        ]));
        let (tools, tool_calls) = counting_tools(false);
        let h = harness(client.clone(), &[("openai", "sk-platform")], tools, 10);
        let sink = RecordingSink::default();
        let progress = CountingProgress::default();

        let outcome = h.agent.handle(&message("look it up"), &private_chat(), &[], &sink, &progress).await;

        assert_eq!(
            outcome,
            TurnOutcome::Answered {
                text: "The answer is 42".to_string(),
                iterations: 2
            }
        );
        assert_eq!(client.calls(), 2);
        assert_eq!(tool_calls.load(Ordering::SeqCst), 1);
        let billed: Vec<(String, Capability, bool)> = h
            .ledger
            .records()
            .into_iter()
            .map(|r| (r.tool_id, r.purpose, r.is_failed))
            .collect();
        assert_eq!(
            billed,
            vec![
                ("chat-model".to_string(), Capability::Chat, false),
                ("lookup".to_string(), Capability::ToolUse, false),
                ("chat-model".to_string(), Capability::Chat, false),
            ]
        );
        assert_eq!(progress.counts(), (1, 1));
        assert!(progress.activities.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_endless_tool_calls_overflow() {
        let client = Arc::new(FakeLlmClient::scripted(vec![
            Ok(tool_call("tc_1")),
            Ok(tool_call("tc_2")),
            Ok(tool_call("tc_3")),
        ]));
        let (tools, _) = counting_tools(false);
        let h = harness(client.clone(), &[("openai", "sk-platform")], tools, 2);
        let sink = RecordingSink::default();
        let progress = CountingProgress::default();

        let outcome = h.agent.handle(&message("loop forever"), &private_chat(), &[], &sink, &progress).await;

        match &outcome {
            TurnOutcome::Overflow { message, iterations } => {
                assert!(message.contains('2'));
                assert_eq!(*iterations, 2);
            }
            other => panic!("expected overflow, got {other:?}"),
        }
        assert_eq!(client.calls(), 2);
        assert_eq!(progress.counts(), (1, 1));
    }

    #[tokio::test]
    async fn test_missing_tool_result_is_skipped() {
        let client = Arc::new(FakeLlmClient::with_tool_call("flaky", json!({}), "Done anyway"));
        let mut tools = ToolRunner::new();
        tools.register(DummyTool {
            name: "flaky".to_string(),
            result: None,
        });
        let h = harness(client, &[("openai", "sk-platform")], tools, 10);
        let sink = RecordingSink::default();
        let progress = CountingProgress::default();

        let outcome = h.agent.handle(&message("try it"), &private_chat(), &[], &sink, &progress).await;
        assert_eq!(outcome.reply(), Some("Done anyway"));

        let records = h.ledger.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].tool_id, "flaky");
        assert!(records[1].is_failed);
    }

    #[tokio::test]
    async fn test_tool_results_reach_model_in_request_order() {
        let client = Arc::new(FakeLlmClient::scripted(vec![
            Ok(LlmResponse::tool_calls(vec![
                call("tc_a", "first"),
                call("tc_b", "flaky"),
                call("tc_c", "third"),
            ])),
            Ok(LlmResponse::text("All done")),
        ]));
        let mut tools = ToolRunner::new();
        tools.register(dummy("first", Some("alpha")));
        tools.register(dummy("flaky", None));
        tools.register(dummy("third", Some("gamma")));
        let h = harness(client.clone(), &[("openai", "sk-platform")], tools, 10);
        let sink = RecordingSink::default();
        let progress = CountingProgress::default();

        let outcome = h.agent.handle(&message("do three things"), &private_chat(), &[], &sink, &progress).await;
        assert_eq!(outcome.reply(), Some("All done"));

        let received = client.received();
        assert_eq!(received.len(), 2);
        assert!(received[0].iter().all(|m| m.role != Role::Tool));

        let second = &received[1];
        let assistant = second
            .iter()
            .position(|m| m.role == Role::Assistant)
            .expect("assistant tool-call message");
        let results: Vec<(Option<&str>, &str)> = second[assistant + 1..]
            .iter()
            .map(|m| {
                assert_eq!(m.role, Role::Tool);
                (m.tool_call_id.as_deref(), m.content.as_str())
            })
            .collect();
        assert_eq!(results, vec![(Some("tc_a"), "alpha"), (Some("tc_c"), "gamma")]);

        let failed: Vec<(String, bool)> = h
            .ledger
            .records()
            .into_iter()
            .filter(|r| r.purpose == Capability::ToolUse)
            .map(|r| (r.tool_id, r.is_failed))
            .collect();
        assert_eq!(
            failed,
            vec![
                ("first".to_string(), false),
                ("flaky".to_string(), true),
                ("third".to_string(), false),
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_is_skipped_and_unbilled() {
        let client = Arc::new(FakeLlmClient::with_tool_call("missing", json!({}), "Carried on"));
        let h = harness(client, &[("openai", "sk-platform")], ToolRunner::new(), 10);
        let sink = RecordingSink::default();
        let progress = CountingProgress::default();

        let outcome = h.agent.handle(&message("use a tool"), &private_chat(), &[], &sink, &progress).await;

        assert_eq!(outcome.reply(), Some("Carried on"));
        let records = h.ledger.records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.purpose == Capability::Chat));
    }

    #[tokio::test]
    async fn test_media_tool_switches_activity() {
        let client = Arc::new(FakeLlmClient::scripted(vec![
            Ok(tool_call("tc_1")),
            Ok(LlmResponse::text("Here you go")),
        ]));
        let (tools, _) = counting_tools(true);
        let h = harness(client, &[("openai", "sk-platform")], tools, 10);
        let sink = RecordingSink::default();
        let progress = CountingProgress::default();

        h.agent.handle(&message("draw a cat"), &private_chat(), &[], &sink, &progress).await;

        assert_eq!(
            *progress.activities.lock().unwrap(),
            vec![Activity::Uploading, Activity::Typing]
        );
    }

    #[tokio::test]
    async fn test_leaked_identifier_triggers_one_correction() {
        let id = "AgACAgIAAxkBAAIB3mZ_file_0042";
        let client = Arc::new(FakeLlmClient::scripted(vec![
            Ok(LlmResponse::text(format!("I looked at {id}."))),
            Ok(LlmResponse::text("I looked at your photo.")),
        ]));
        let h = harness(client.clone(), &[("openai", "sk-platform")], ToolRunner::new(), 10);
        let sink = RecordingSink::default();
        let progress = CountingProgress::default();

        let mut msg = message("what is in this photo?");
        msg.attachments.push(Attachment {
            id: id.to_string(),
            kind: AttachmentKind::Image,
            mime_type: Some("image/jpeg".to_string()),
        });

        let outcome = h.agent.handle(&msg, &private_chat(), &[], &sink, &progress).await;

        assert_eq!(
            outcome,
            TurnOutcome::Answered {
                text: "I looked at your photo.".to_string(),
                iterations: 2
            }
        );
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn test_model_error_becomes_message_and_stops_progress() {
        let client = Arc::new(FakeLlmClient::scripted(vec![Err(Error::Llm("quota exceeded".to_string()))]));
        let h = harness(client, &[("openai", "sk-platform")], ToolRunner::new(), 10);
        let sink = RecordingSink::default();
        let progress = CountingProgress::default();

        let outcome = h.agent.handle(&message("Hi"), &private_chat(), &[], &sink, &progress).await;

        assert!(matches!(outcome, TurnOutcome::Failed(ref m) if m.contains("quota exceeded")));
        assert_eq!(progress.counts(), (1, 1));
        let records = h.ledger.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_failed);
    }

    #[tokio::test]
    async fn test_panic_in_loop_is_contained() {
        let h = harness(Arc::new(PanickingClient), &[("openai", "sk-platform")], ToolRunner::new(), 10);
        let sink = RecordingSink::default();
        let progress = CountingProgress::default();

        let outcome = h.agent.handle(&message("Hi"), &private_chat(), &[], &sink, &progress).await;

        assert!(matches!(outcome, TurnOutcome::Failed(ref m) if m.contains("provider adapter bug")));
        assert_eq!(progress.counts(), (1, 1));
    }

    #[tokio::test]
    async fn test_command_short_circuits_model() {
        let client = Arc::new(FakeLlmClient::new(vec!["unused"]));
        let h = harness(client.clone(), &[("openai", "sk-platform")], ToolRunner::new(), 10);
        let sink = RecordingSink::default();
        let progress = CountingProgress::default();

        let outcome = h.agent.handle(&message("/help"), &private_chat(), &[], &sink, &progress).await;

        assert_eq!(outcome, TurnOutcome::CommandHandled);
        assert_eq!(sink.texts().len(), 1);
        assert_eq!(client.calls(), 0);
        assert_eq!(progress.counts(), (0, 0));
        assert!(h.models.created.lock().unwrap().is_empty());
    }

    #[test]
    fn test_user_content_lists_attachments() {
        let mut msg = message("see this");
        msg.attachments.push(Attachment {
            id: "file-1".to_string(),
            kind: AttachmentKind::Document,
            mime_type: None,
        });
        assert_eq!(user_content(&msg), "see this\n[attached Document id=file-1]");
    }
}
