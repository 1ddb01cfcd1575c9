use std::{fmt::Write, sync::Arc};

use {
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, trace, warn},
};

use crate::{
    compaction::HistoryCompactor,
    conversation::ConversationStore,
    model::{ConversationItem, LlmProvider, ModelOutput, ToolCall},
    prompt::build_system_prompt,
    retrieval::{RetrievalOptions, Retriever, is_retrieval_worthy, render_context_note},
    tool_parsing::ExtractorChain,
    tool_registry::{ToolRegistry, TransportFailure},
};

/// Caller-visible rejections. Everything else is a [`TurnOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum AgentRunError {
    #[error("input is blank")]
    BlankInput,
    #[error("turn cancelled")]
    Cancelled,
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The model answered in natural language.
    FinalAnswer(String),
    /// The model kept calling tools until the iteration bound. Retryable.
    LimitExceeded { iterations: usize },
    /// The model or a tool transport failed; this turn is over.
    ProtocolFailure(String),
}

impl TurnOutcome {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LimitExceeded { .. })
    }

    /// Text to show the user for this outcome.
    #[must_use]
    pub fn display_text(&self) -> String {
        match self {
            Self::FinalAnswer(text) => text.clone(),
            Self::LimitExceeded { iterations } => format!(
                "I could not finish within {iterations} tool-calling steps. Please try again or rephrase."
            ),
            Self::ProtocolFailure(reason) => format!("Something went wrong: {reason}"),
        }
    }
}

/// Events emitted during a turn.
#[derive(Debug, Clone)]
pub enum RunnerEvent {
    Iteration(usize),
    /// Model is processing (show a "thinking" indicator).
    Thinking,
    /// Model finished thinking (hide the indicator).
    ThinkingDone,
    ToolCallStart {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    ToolCallEnd {
        id: String,
        name: String,
        success: bool,
        error: Option<String>,
    },
    /// Text the model produced alongside its tool calls.
    ThinkingText(String),
    Compacted {
        covered_turns: usize,
    },
}

/// Callback for streaming events out of the runner.
pub type OnEvent = Box<dyn Fn(RunnerEvent) + Send + Sync>;

/// Loop behavior switches.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub system_prompt: String,
    /// Model calls allowed per turn.
    pub max_iterations: usize,
    pub temperature: f32,
    pub enable_text_mined_tool_calls: bool,
    /// Stop sending the manifest once a tool has run in the current turn.
    pub suppress_manifest_after_first_call: bool,
    pub max_tool_result_bytes: usize,
    /// `None` disables retrieval even when a retriever is attached.
    pub retrieval: Option<RetrievalOptions>,
}

impl From<&agentwire_config::AgentwireConfig> for SessionOptions {
    fn from(cfg: &agentwire_config::AgentwireConfig) -> Self {
        Self {
            system_prompt: cfg.agent.system_prompt.clone(),
            max_iterations: cfg.agent.max_iterations,
            temperature: cfg.model.temperature,
            enable_text_mined_tool_calls: cfg.agent.enable_text_mined_tool_calls,
            suppress_manifest_after_first_call: cfg.agent.suppress_manifest_after_first_call,
            max_tool_result_bytes: cfg.agent.max_tool_result_bytes,
            retrieval: cfg
                .retrieval
                .enabled
                .then(|| RetrievalOptions::from(&cfg.retrieval)),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        (&agentwire_config::AgentwireConfig::default()).into()
    }
}

/// One conversation driven through think → call tool → observe cycles.
///
/// A session owns its conversation and compactor; the tool registry is
/// shared read-only. Turns run strictly one at a time (`&mut self`).
pub struct AgentSession {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    options: SessionOptions,
    store: ConversationStore,
    extractors: ExtractorChain,
    compactor: Option<HistoryCompactor>,
    retriever: Option<Arc<dyn Retriever>>,
    on_event: Option<OnEvent>,
    cancel: Option<CancellationToken>,
}

impl AgentSession {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        options: SessionOptions,
    ) -> Self {
        let native_tools = provider.supports_tools();
        let system_prompt = build_system_prompt(
            &options.system_prompt,
            &tools.manifest(),
            native_tools || !options.enable_text_mined_tool_calls,
        );
        Self {
            provider,
            tools,
            options,
            store: ConversationStore::new(system_prompt),
            extractors: ExtractorChain::standard(),
            compactor: None,
            retriever: None,
            on_event: None,
            cancel: None,
        }
    }

    #[must_use]
    pub fn with_compactor(mut self, compactor: HistoryCompactor) -> Self {
        self.compactor = Some(compactor);
        self
    }

    #[must_use]
    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    #[must_use]
    pub fn with_extractors(mut self, extractors: ExtractorChain) -> Self {
        self.extractors = extractors;
        self
    }

    #[must_use]
    pub fn with_event_handler(mut self, on_event: OnEvent) -> Self {
        self.on_event = Some(on_event);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Swap the token, e.g. a fresh one per interactive turn.
    pub fn set_cancellation(&mut self, cancel: CancellationToken) {
        self.cancel = Some(cancel);
    }

    /// Seed the conversation with the latest persisted summary, if any.
    /// Only applies to a fresh session. Returns whether a summary was loaded.
    pub async fn restore_latest_summary(&mut self) -> anyhow::Result<bool> {
        let Some(compactor) = &self.compactor else {
            return Ok(false);
        };
        if self.store.len() > 1 {
            return Ok(false);
        }
        let Some(checkpoint) = compactor.summaries().load_latest().await? else {
            return Ok(false);
        };
        let system_prompt = match self.store.system_prompt() {
            Some(ConversationItem::SystemNote { content }) => content.clone(),
            _ => String::new(),
        };
        self.store =
            ConversationStore::with_restored_summary(system_prompt, Some(&checkpoint.summary_text));
        info!(
            covered_turns = checkpoint.covered_turn_count,
            created_at = %checkpoint.created_at,
            "restored conversation summary"
        );
        Ok(self.store.len() > 1)
    }

    pub fn conversation(&self) -> &ConversationStore {
        &self.store
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    fn emit(&self, event: RunnerEvent) {
        if let Some(cb) = &self.on_event {
            cb(event);
        }
    }

    /// Process one user message.
    ///
    /// Only blank input and cancellation are errors. Model and transport
    /// failures end the turn with [`TurnOutcome::ProtocolFailure`]; tool
    /// failures become tool results the model can read.
    pub async fn process_turn(&mut self, user_text: &str) -> Result<TurnOutcome, AgentRunError> {
        let user_text = user_text.trim();
        if user_text.is_empty() {
            return Err(AgentRunError::BlankInput);
        }

        self.inject_retrieved_context(user_text).await;
        self.store.push(ConversationItem::user(user_text));
        if let Some(compactor) = self.compactor.as_mut() {
            compactor.record_user_turn();
        }

        let manifest = self.tools.manifest();
        let known_tools = self.tools.tool_names();
        let max_iterations = self.options.max_iterations.max(1);
        info!(
            provider = self.provider.name(),
            model = self.provider.id(),
            tools_count = manifest.len(),
            items = self.store.len(),
            "starting agent loop"
        );

        let mut iterations = 0usize;
        let mut tool_calls_made = 0usize;
        loop {
            if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                info!(iterations, "turn cancelled before model request");
                return Err(AgentRunError::Cancelled);
            }

            self.emit(RunnerEvent::Iteration(iterations + 1));
            let manifest_for_request =
                if self.options.suppress_manifest_after_first_call && tool_calls_made > 0 {
                    &[][..]
                } else {
                    manifest.as_slice()
                };

            info!(
                iteration = iterations + 1,
                items_count = self.store.len(),
                tools_sent = manifest_for_request.len(),
                "calling model"
            );
            trace!(items = ?self.store.items(), "model request items");

            self.emit(RunnerEvent::Thinking);
            let request = self.provider.complete(
                self.store.items(),
                manifest_for_request,
                self.options.temperature,
            );
            let response = match &self.cancel {
                Some(cancel) => tokio::select! {
                    response = request => response,
                    () = cancel.cancelled() => {
                        self.emit(RunnerEvent::ThinkingDone);
                        info!(iterations, "turn cancelled during model request");
                        return Err(AgentRunError::Cancelled);
                    },
                },
                None => request.await,
            };
            self.emit(RunnerEvent::ThinkingDone);

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, iteration = iterations + 1, "model request failed");
                    return Ok(TurnOutcome::ProtocolFailure(format!(
                        "model request failed: {e}"
                    )));
                },
            };

            // INTERPRET
            let mut calls: Vec<ToolCall> = Vec::new();
            let mut messages: Vec<String> = Vec::new();
            for output in response.outputs {
                match output {
                    ModelOutput::ToolCall(call) => calls.push(call),
                    ModelOutput::Message(text) => {
                        if self.options.enable_text_mined_tool_calls
                            && let Some((stage, found)) =
                                self.extractors.extract(&text, &known_tools)
                        {
                            info!(stage, tool = %found.call.name, "recovered tool call from text");
                            messages.extend(found.remaining_text);
                            calls.push(found.call);
                        } else if !text.trim().is_empty() {
                            messages.push(text.trim().to_string());
                        }
                    },
                }
            }
            info!(
                iteration = iterations + 1,
                tool_calls_count = calls.len(),
                messages_count = messages.len(),
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                "model response received"
            );

            if calls.is_empty() {
                if messages.is_empty() {
                    warn!(iteration = iterations + 1, "model returned nothing usable");
                    return Ok(TurnOutcome::ProtocolFailure(
                        "empty or unrecognized model output".into(),
                    ));
                }
                let answer = messages.join("\n\n");
                self.store.push(ConversationItem::assistant(answer.clone()));
                info!(iterations = iterations + 1, tool_calls = tool_calls_made, "agent loop complete");
                self.run_compaction().await;
                return Ok(TurnOutcome::FinalAnswer(answer));
            }

            // INVOKE, strictly in emission order.
            if !messages.is_empty() {
                self.emit(RunnerEvent::ThinkingText(messages.join("\n")));
            }
            for call in &calls {
                self.store.push(ConversationItem::invocation(call));
                tool_calls_made += 1;
                let transport_error = self.invoke(call).await;
                if let Some(reason) = transport_error {
                    return Ok(TurnOutcome::ProtocolFailure(reason));
                }
            }

            iterations += 1;
            if iterations >= max_iterations {
                warn!(
                    iterations,
                    tool_calls = tool_calls_made,
                    "agent loop hit iteration limit"
                );
                return Ok(TurnOutcome::LimitExceeded { iterations });
            }
        }
    }

    /// Execute one call and append its result. Returns the reason when the
    /// tool's transport failed.
    async fn invoke(&mut self, call: &ToolCall) -> Option<String> {
        self.emit(RunnerEvent::ToolCallStart {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        });
        info!(tool = %call.name, id = %call.id, args = %call.arguments, "executing tool");

        let (content, error, transport_error) = match self.tools.get(&call.name) {
            None => {
                warn!(tool = %call.name, "tool not found");
                let msg = format!("capability not found: {}", call.name);
                (msg.clone(), Some(msg), None)
            },
            Some(tool) => match tool.execute(call.arguments.clone()).await {
                Ok(text) => (
                    sanitize_tool_result(&text, self.options.max_tool_result_bytes),
                    None,
                    None,
                ),
                Err(e) if e.downcast_ref::<TransportFailure>().is_some() => {
                    warn!(tool = %call.name, id = %call.id, error = %e, "tool transport failed");
                    let msg = format!("error: {e}");
                    (msg, Some(e.to_string()), Some(e.to_string()))
                },
                Err(e) => {
                    warn!(tool = %call.name, id = %call.id, error = %e, "tool execution failed");
                    let msg = format!("error: {e}");
                    (msg, Some(e.to_string()), None)
                },
            },
        };

        debug!(tool = %call.name, id = %call.id, result_len = content.len(), "tool result");
        self.store
            .push(ConversationItem::tool_result(call.id.clone(), content));
        self.emit(RunnerEvent::ToolCallEnd {
            id: call.id.clone(),
            name: call.name.clone(),
            success: error.is_none(),
            error,
        });
        transport_error
    }

    async fn inject_retrieved_context(&mut self, user_text: &str) {
        let (Some(retriever), Some(opts)) = (&self.retriever, &self.options.retrieval) else {
            return;
        };
        if !is_retrieval_worthy(user_text, opts.min_query_words) {
            debug!("input too short for retrieval");
            return;
        }
        match retriever
            .search(user_text, opts.limit, opts.min_similarity)
            .await
        {
            Ok(hits) => {
                if let Some(note) = render_context_note(&hits) {
                    debug!(hits = hits.len(), "injecting retrieved context");
                    self.store.push(ConversationItem::system(note));
                }
            },
            Err(e) => warn!(error = %e, "retrieval failed, continuing without context"),
        }
    }

    async fn run_compaction(&mut self) {
        let Some(compactor) = self.compactor.as_mut() else {
            return;
        };
        if let Some(checkpoint) = compactor
            .maybe_compact(&mut self.store, self.provider.as_ref())
            .await
            && let Some(cb) = &self.on_event
        {
            cb(RunnerEvent::Compacted {
                covered_turns: checkpoint.covered_turn_count,
            });
        }
    }
}

/// Truncate a tool result to `max_bytes` on a char boundary, appending a
/// marker with the original size.
pub fn sanitize_tool_result(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return input.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !input.is_char_boundary(end) {
        end -= 1;
    }
    let mut result = input[..end].to_string();
    let _ = write!(result, "\n\n[truncated, {} bytes total]", input.len());
    result
}
