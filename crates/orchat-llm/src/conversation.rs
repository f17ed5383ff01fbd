//! Conversation orchestration
//!
//! A [`ChatSession`] drives one user turn at a time: it composes the outgoing
//! window, consumes the primary completion stream, reassembles tool calls,
//! runs the tools, streams the follow-up answer and persists the finalized
//! assistant message. Progress is published as whole message-list snapshots
//! on a broadcast channel so a UI can render incrementally.

use crate::accumulator::{ReadyToolCall, ToolCallAccumulator};
use crate::provider::{
    ChunkStream, CompletionProvider, CompletionRequest, ProviderMessage, ResolvedToolCall,
};
use futures::StreamExt;
use orchat_common::constants::errors;
use orchat_common::pricing::estimate_tokens_sum;
use orchat_common::tools::WEB_SEARCH;
use orchat_common::{
    ChatError, ConversationConfig, Message, ModelDescriptor, MultiToolPolicy, ReasoningStep,
    Result, SEARCH_COMPLETED_LABEL, SEARCHING_LABEL, StepKind, StepMetadata, StepStatus,
    TOOL_FAILURE_APOLOGY, ThreadUpdate, TokenUsage, calculate_cost, current_timestamp_millis,
    derive_thread_title, estimate_tokens, total_cost,
};
use orchat_memory::ThreadStore;
use orchat_tools::{ToolError, ToolRegistry, extract_search_results};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{RwLock, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Terminal state of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    /// The assistant message was persisted
    Done,
    /// The turn aborted; no assistant message was persisted
    Failed,
    /// Blank input or another turn in flight; nothing happened
    Ignored,
}

/// Result of [`ChatSession::send_message`]
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub status: TurnStatus,
    /// Committed messages after the turn
    pub messages: Vec<Message>,
    pub error: Option<String>,
}

impl TurnOutcome {
    pub fn is_done(&self) -> bool {
        self.status == TurnStatus::Done
    }

    /// The assistant message produced by a successful turn
    pub fn reply(&self) -> Option<&Message> {
        match self.status {
            TurnStatus::Done => self.messages.last(),
            _ => None,
        }
    }
}

/// Events for UI updates
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A turn started or ended
    Loading(bool),
    /// Committed messages plus the in-progress assistant message
    Snapshot(Vec<Message>),
    /// User-visible error of a failed turn
    Error(String),
}

/// Clears the in-flight flag on every exit path of a turn
struct TurnGuard<'a> {
    in_flight: &'a AtomicBool,
    events: &'a broadcast::Sender<ChatEvent>,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
        let _ = self.events.send(ChatEvent::Loading(false));
    }
}

/// One conversation bound to a persisted thread
pub struct ChatSession {
    thread_id: String,
    model: ModelDescriptor,
    provider: Arc<dyn CompletionProvider>,
    store: Arc<dyn ThreadStore>,
    tools: Arc<ToolRegistry>,
    config: ConversationConfig,
    messages: RwLock<Vec<Message>>,
    in_flight: AtomicBool,
    events: broadcast::Sender<ChatEvent>,
}

impl ChatSession {
    /// Open a session on `thread_id`, loading its persisted messages
    pub async fn open(
        thread_id: impl Into<String>,
        model: ModelDescriptor,
        provider: Arc<dyn CompletionProvider>,
        store: Arc<dyn ThreadStore>,
    ) -> Result<Self> {
        let thread_id = thread_id.into();
        let messages = store.get_thread_messages(&thread_id).await?;
        debug!(
            "Opened session on thread {} with {} messages",
            thread_id,
            messages.len()
        );

        let (events, _) = broadcast::channel(1000);

        Ok(Self {
            thread_id,
            model,
            provider,
            store,
            tools: Arc::new(ToolRegistry::new()),
            config: ConversationConfig::default(),
            messages: RwLock::new(messages),
            in_flight: AtomicBool::new(false),
            events,
        })
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_config(mut self, config: ConversationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn model(&self) -> &ModelDescriptor {
        &self.model
    }

    /// Switch the model used by subsequent turns
    pub fn set_model(&mut self, model: ModelDescriptor) {
        self.model = model;
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.messages.read().await.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Subscribe to snapshot, loading and error events
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    /// Run one user turn
    pub async fn send_message(&self, text: &str) -> TurnOutcome {
        self.send_message_with_cancel(text, CancellationToken::new())
            .await
    }

    /// Run one user turn, aborting as Failed when `cancel` fires
    pub async fn send_message_with_cancel(
        &self,
        text: &str,
        cancel: CancellationToken,
    ) -> TurnOutcome {
        let text = text.trim();
        if text.is_empty() {
            return self.ignored().await;
        }

        let Some(_guard) = self.begin_turn() else {
            debug!("Turn already in flight on {}; ignoring input", self.thread_id);
            return self.ignored().await;
        };

        let history = self.messages().await;
        let window = compose_window(&history, self.config.history_window, text);

        let mut user_message = Message::user(text);
        match self.store.add_message(&self.thread_id, &user_message).await {
            Ok(id) => user_message.id = Some(id),
            Err(e) => {
                return self
                    .fail(format!("{}: {}", errors::FAILED_TO_SAVE_MESSAGE, e))
                    .await;
            }
        }
        self.messages.write().await.push(user_message);
        self.publish(None).await;

        let turn = tokio::select! {
            _ = cancel.cancelled() => Err(ChatError::Cancelled),
            result = self.run_turn(&window) => result,
        };

        let mut reply = match turn {
            Ok(reply) => reply,
            Err(ChatError::Cancelled) => {
                info!("Turn on {} cancelled", self.thread_id);
                return self.fail(ChatError::Cancelled.to_string()).await;
            }
            Err(e) => {
                return self
                    .fail(format!("{}: {}", errors::FAILED_TO_SEND, e))
                    .await;
            }
        };

        match self.store.add_message(&self.thread_id, &reply).await {
            Ok(id) => reply.id = Some(id),
            Err(e) => {
                return self
                    .fail(format!("{}: {}", errors::FAILED_TO_SAVE_RESPONSE, e))
                    .await;
            }
        }

        if let Some(usage) = reply.usage {
            info!(
                "Turn complete on {}: {} prompt + {} completion tokens, cost ${:.6}",
                self.thread_id,
                usage.prompt_tokens,
                usage.completion_tokens,
                reply.cost.unwrap_or_default()
            );
        }

        self.messages.write().await.push(reply);
        self.publish(None).await;
        self.refresh_thread_summary().await;

        TurnOutcome {
            status: TurnStatus::Done,
            messages: self.messages().await,
            error: None,
        }
    }

    fn begin_turn(&self) -> Option<TurnGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        let _ = self.events.send(ChatEvent::Loading(true));
        Some(TurnGuard {
            in_flight: &self.in_flight,
            events: &self.events,
        })
    }

    async fn ignored(&self) -> TurnOutcome {
        TurnOutcome {
            status: TurnStatus::Ignored,
            messages: self.messages().await,
            error: None,
        }
    }

    async fn fail(&self, message: String) -> TurnOutcome {
        error!("Turn on {} failed: {}", self.thread_id, message);
        let _ = self.events.send(ChatEvent::Error(message.clone()));
        self.publish(None).await;
        TurnOutcome {
            status: TurnStatus::Failed,
            messages: self.messages().await,
            error: Some(message),
        }
    }

    /// Broadcast committed messages, followed by `draft` when given
    async fn publish(&self, draft: Option<&Message>) {
        let mut snapshot = self.messages.read().await.clone();
        if let Some(draft) = draft {
            snapshot.push(draft.clone());
        }
        let _ = self.events.send(ChatEvent::Snapshot(snapshot));
    }

    async fn open_stream(&self, request: CompletionRequest) -> Result<ChunkStream> {
        let opening = self.provider.stream(request);
        match self.config.stream_open_timeout() {
            Some(limit) => tokio::time::timeout(limit, opening).await.map_err(|_| {
                ChatError::Timeout(format!(
                    "completion stream did not open within {}s",
                    limit.as_secs()
                ))
            })?,
            None => opening.await,
        }
    }

    /// Everything between the persisted user message and the persisted reply
    async fn run_turn(&self, window: &[ProviderMessage]) -> Result<Message> {
        let tools_enabled = self.model.supports_tools && !self.tools.is_empty();
        let request = CompletionRequest {
            model: self.model.id.clone(),
            messages: window.to_vec(),
            tools: if tools_enabled {
                self.tools.definitions()
            } else {
                Vec::new()
            },
        };

        let mut draft = Message::assistant("");
        let mut accumulator = ToolCallAccumulator::new();
        let mut stream = self.open_stream(request).await?;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;

            if let Some(text) = chunk.content.filter(|text| !text.is_empty()) {
                draft.content.push_str(&text);
                self.publish(Some(&draft)).await;
            }

            if !chunk.tool_calls.is_empty() {
                accumulator.extend(chunk.tool_calls);
                if draft.reasoning.is_empty() && accumulator.has_named_call() {
                    draft.reasoning = seed_search_steps(&accumulator);
                    self.publish(Some(&draft)).await;
                }
            }
        }
        debug!(
            "Primary stream ended: {} chars, {} tool calls",
            draft.content.chars().count(),
            accumulator.len()
        );

        if tools_enabled {
            let ready = accumulator.into_ready(&self.tools);
            if !ready.is_empty() {
                match self.config.multi_tool_policy {
                    MultiToolPolicy::LastWins => {
                        self.resolve_each(window, ready, &mut draft).await
                    }
                    MultiToolPolicy::Merged => {
                        self.resolve_merged(window, ready, &mut draft).await
                    }
                }
            }
        }

        let prompt_tokens = estimate_tokens_sum(window.iter().map(ProviderMessage::text));
        let completion_tokens = estimate_tokens(&draft.content);
        draft.usage = Some(TokenUsage::new(prompt_tokens, completion_tokens));
        draft.cost = Some(calculate_cost(
            prompt_tokens,
            completion_tokens,
            &self.model.pricing,
        ));
        draft.timestamp = current_timestamp_millis();

        Ok(draft)
    }

    /// Invoke one ready call. `None` when the tool is not registered.
    async fn invoke(
        &self,
        call: &ReadyToolCall,
    ) -> Option<std::result::Result<String, ToolError>> {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!("Skipping call to unknown tool '{}'", call.name);
            return None;
        };
        debug!("Invoking tool {} ({})", call.name, call.id);
        Some(tool.execute(call.arguments.clone()).await)
    }

    /// One follow-up stream per successful call; each overwrites the content
    async fn resolve_each(
        &self,
        window: &[ProviderMessage],
        calls: Vec<ReadyToolCall>,
        draft: &mut Message,
    ) {
        for call in calls {
            let Some(result) = self.invoke(&call).await else {
                continue;
            };

            match result {
                Ok(output) => {
                    complete_search_step(draft, &call, &output);
                    self.publish(Some(draft)).await;

                    draft.content.clear();
                    let follow_up = follow_up_window(window, &[(call, output)]);
                    self.stream_follow_up(follow_up, draft).await;
                }
                Err(e) => self.apply_tool_error(&call, e, draft).await,
            }
        }
    }

    /// All successful results go into a single follow-up stream
    async fn resolve_merged(
        &self,
        window: &[ProviderMessage],
        calls: Vec<ReadyToolCall>,
        draft: &mut Message,
    ) {
        let mut resolved = Vec::new();
        let mut rejected = Vec::new();

        for call in calls {
            match self.invoke(&call).await {
                Some(Ok(output)) => {
                    complete_search_step(draft, &call, &output);
                    self.publish(Some(draft)).await;
                    resolved.push((call, output));
                }
                Some(Err(e)) => rejected.push((call, e)),
                None => {}
            }
        }

        if !resolved.is_empty() {
            draft.content.clear();
            let follow_up = follow_up_window(window, &resolved);
            self.stream_follow_up(follow_up, draft).await;
        }

        let any_resolved = !resolved.is_empty();
        for (call, e) in rejected {
            match e {
                ToolError::Execution(_) if any_resolved => {
                    warn!("Tool {} failed: {}", call.name, e);
                }
                e => self.apply_tool_error(&call, e, draft).await,
            }
        }
    }

    async fn apply_tool_error(&self, call: &ReadyToolCall, err: ToolError, draft: &mut Message) {
        warn!("Tool {} ({}) failed: {}", call.name, call.id, err);
        match err {
            ToolError::InvalidArguments(_) => {
                if !draft.content.is_empty() {
                    draft.content.push_str("\n\n");
                }
                draft.content.push_str(TOOL_FAILURE_APOLOGY);
            }
            ToolError::Execution(_) => {
                draft.content = TOOL_FAILURE_APOLOGY.to_string();
            }
        }
        self.publish(Some(draft)).await;
    }

    /// Stream a tool-free completion into `draft.content`.
    /// A failure replaces the content with the apology text.
    async fn stream_follow_up(&self, messages: Vec<ProviderMessage>, draft: &mut Message) {
        let request = CompletionRequest {
            model: self.model.id.clone(),
            messages,
            tools: Vec::new(),
        };

        let result: Result<()> = async {
            let mut stream = self.open_stream(request).await?;
            while let Some(chunk) = stream.next().await {
                if let Some(text) = chunk?.content.filter(|text| !text.is_empty()) {
                    draft.content.push_str(&text);
                    self.publish(Some(draft)).await;
                }
            }
            Ok(())
        }
        .await;

        if let Err(e) = result {
            warn!("Follow-up stream failed: {}", e);
            draft.content = TOOL_FAILURE_APOLOGY.to_string();
            self.publish(Some(draft)).await;
        }
    }

    /// Recompute title and total cost from the committed messages
    async fn refresh_thread_summary(&self) {
        let update = {
            let messages = self.messages.read().await;
            ThreadUpdate {
                title: Some(derive_thread_title(&messages)),
                model_id: None,
                total_cost: Some(total_cost(&messages)),
            }
        };

        if let Err(e) = self.store.update_thread(&self.thread_id, update).await {
            warn!("Failed to update thread {} summary: {}", self.thread_id, e);
        }
    }
}

/// The last `history_window` prior messages followed by the new user message
fn compose_window(history: &[Message], history_window: usize, text: &str) -> Vec<ProviderMessage> {
    let start = history.len().saturating_sub(history_window);
    history[start..]
        .iter()
        .map(ProviderMessage::from)
        .chain(std::iter::once(ProviderMessage::User(text.to_string())))
        .collect()
}

/// Primary window plus the assistant tool-call turn and one result per call
fn follow_up_window(
    window: &[ProviderMessage],
    resolved: &[(ReadyToolCall, String)],
) -> Vec<ProviderMessage> {
    let mut messages = window.to_vec();
    messages.push(ProviderMessage::Assistant {
        content: String::new(),
        tool_calls: resolved
            .iter()
            .map(|(call, _)| ResolvedToolCall {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments: call.arguments.to_string(),
            })
            .collect(),
    });
    messages.extend(resolved.iter().map(|(call, output)| ProviderMessage::Tool {
        call_id: call.id.clone(),
        content: output.clone(),
    }));
    messages
}

/// One active search step per call known so far
fn seed_search_steps(accumulator: &ToolCallAccumulator) -> Vec<ReasoningStep> {
    let now = current_timestamp_millis();
    accumulator
        .snapshot()
        .into_iter()
        .map(|call| {
            let mut step = ReasoningStep::new(
                format!("search-{}-{}", now, call.index),
                StepKind::Search,
                SEARCHING_LABEL,
            );
            step.advance(StepStatus::Active);
            step
        })
        .collect()
}

/// Mark the first active step complete with the query and parsed results
fn complete_search_step(draft: &mut Message, call: &ReadyToolCall, output: &str) {
    let Some(step) = draft.reasoning.iter_mut().find(|step| step.is_active()) else {
        return;
    };

    let query = call.query().map(str::to_string);
    let search_results = if call.name == WEB_SEARCH {
        extract_search_results(output)
    } else {
        Vec::new()
    };
    let label = query
        .clone()
        .unwrap_or_else(|| SEARCH_COMPLETED_LABEL.to_string());

    let metadata = if query.is_none() && search_results.is_empty() {
        None
    } else {
        Some(StepMetadata {
            search_query: query,
            search_results,
        })
    };
    step.complete(label, metadata);
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchat_common::Role;
    use serde_json::json;

    fn history(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("q{}", i))
                } else {
                    Message::assistant(format!("a{}", i))
                }
            })
            .collect()
    }

    #[test]
    fn test_compose_window_keeps_last_prior_messages() {
        let window = compose_window(&history(10), 6, "new");
        assert_eq!(window.len(), 7);
        assert_eq!(window[0].text(), "q4");
        assert_eq!(window[6], ProviderMessage::User("new".into()));

        let short = compose_window(&history(2), 6, "new");
        assert_eq!(short.len(), 3);
    }

    #[test]
    fn test_follow_up_window_shape() {
        let primary = vec![ProviderMessage::User("weather?".into())];
        let call = ReadyToolCall {
            index: 0,
            id: "call_1".into(),
            name: "web_search".into(),
            arguments: json!({"query": "tokyo"}),
        };
        let messages = follow_up_window(&primary, &[(call, "raw".into())]);

        assert_eq!(messages.len(), 3);
        match &messages[1] {
            ProviderMessage::Assistant { tool_calls, .. } => {
                assert_eq!(tool_calls[0].arguments, r#"{"query":"tokyo"}"#);
            }
            other => panic!("unexpected message {:?}", other),
        }
        assert_eq!(
            messages[2],
            ProviderMessage::Tool {
                call_id: "call_1".into(),
                content: "raw".into()
            }
        );
    }

    #[test]
    fn test_complete_step_for_other_tool_has_no_metadata() {
        let mut draft = Message::assistant("");
        let mut step = ReasoningStep::new("s", StepKind::Search, SEARCHING_LABEL);
        step.advance(StepStatus::Active);
        draft.reasoning.push(step);

        let call = ReadyToolCall {
            index: 0,
            id: "c".into(),
            name: "calculator".into(),
            arguments: json!({"expr": "1+1"}),
        };
        complete_search_step(&mut draft, &call, "2");

        let step = &draft.reasoning[0];
        assert_eq!(step.status, StepStatus::Complete);
        assert_eq!(step.label, SEARCH_COMPLETED_LABEL);
        assert!(step.metadata.is_none());
        assert_eq!(draft.role, Role::Assistant);
    }
}
