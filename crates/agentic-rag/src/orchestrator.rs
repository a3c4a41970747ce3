//! Chat turn orchestration
//!
//! A turn moves through validation, session resolution, optional retrieval,
//! generation and persistence. Anything that fails after the conversation is
//! resolved produces a degraded [`ChatResult`] rather than an error, so the
//! client always learns which conversation it is talking to.

use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::ChatConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::executor::{run_with_retry, RetryPolicy};
use crate::providers::{ConversationStore, ExecutionLog, GenerationRequest, Generator};
use crate::retrieval::Retriever;
use crate::session::SessionManager;
use crate::types::{
    AgentExecution, ChatMetadata, ChatRequest, ChatResult, Conversation, HistoryResponse,
    MessageRole, Outcome, ScoredChunk, Source, TurnError, TurnStatus,
};
use crate::util::{duration_millis, format_execution_time, millis_to_seconds};
use crate::validation::{
    parse_uuid, require_non_blank, validate_length, validate_max_tokens, validate_range,
    validate_temperature, FieldCheck,
};

/// Agent type recorded for chat executions
pub const CHAT_AGENT: &str = "chat";

const VECTOR_SEARCH_TOOL: &str = "vector_search";
const GENERATE_TOOL: &str = "generate";

/// Generation settings after defaults are applied
#[derive(Debug, Clone, Copy)]
struct TurnParams {
    max_tokens: u32,
    temperature: f32,
}

/// Trace records opened so far in a turn
#[derive(Debug, Default)]
struct TurnTrace {
    stage: &'static str,
    execution_id: Option<Uuid>,
    open_tool: Option<Uuid>,
}

/// Runs chat turns against the stores and the generator
#[derive(Clone)]
pub struct ChatOrchestrator {
    sessions: SessionManager,
    log: Arc<dyn ExecutionLog>,
    generator: Arc<dyn Generator>,
    retriever: Option<Retriever>,
    config: ChatConfig,
    store_policy: RetryPolicy,
    generation_policy: RetryPolicy,
}

impl ChatOrchestrator {
    /// Orchestrator with single-attempt policies and no retrieval
    pub fn new(
        store: Arc<dyn ConversationStore>,
        log: Arc<dyn ExecutionLog>,
        generator: Arc<dyn Generator>,
        config: ChatConfig,
    ) -> Self {
        Self {
            sessions: SessionManager::new(store, RetryPolicy::no_retry()),
            log,
            generator,
            retriever: None,
            config,
            store_policy: RetryPolicy::no_retry(),
            generation_policy: RetryPolicy::no_retry(),
        }
    }

    /// Retry store work (session resolution, trace writes, search) with `store`
    /// and generator calls with `generation`
    pub fn with_policies(mut self, store: RetryPolicy, generation: RetryPolicy) -> Self {
        self.sessions = SessionManager::new(self.sessions.store().clone(), store.clone());
        self.store_policy = store;
        self.generation_policy = generation;
        self
    }

    /// Allow turns to ground answers in retrieved chunks
    pub fn with_retriever(mut self, retriever: Retriever) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn retriever(&self) -> Option<&Retriever> {
        self.retriever.as_ref()
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Model name of the configured generator
    pub fn model(&self) -> &str {
        self.generator.model()
    }

    /// Run one chat turn.
    ///
    /// Returns `Err` only for invalid input and for failures while resolving
    /// the session. Later failures come back as a degraded result.
    pub async fn chat(&self, request: ChatRequest, cancel: &CancellationToken) -> Result<ChatResult> {
        let started = Instant::now();
        let params = self.validate(&request)?;

        let conversation = self
            .sessions
            .resolve(
                request.session_id.as_deref(),
                request.user_id.as_deref(),
                cancel,
            )
            .await?;

        let mut trace = TurnTrace::default();
        match self
            .run_turn(&request, params, &conversation, &mut trace, started, cancel)
            .await
        {
            Ok(result) => {
                tracing::info!(
                    "Chat turn for {} completed in {} ({} tokens, {} sources)",
                    conversation.id,
                    format_execution_time(result.metadata.processing_time_ms),
                    result.tokens_used,
                    result.sources.len()
                );
                Ok(result)
            }
            Err(err) => Ok(self.degrade(&request, &conversation, trace, err, started).await),
        }
    }

    /// Transcript of a session
    pub async fn history(&self, session_token: &str) -> Result<HistoryResponse> {
        let conversation_id = parse_uuid(session_token, "session_id")?;
        let messages = self.sessions.history(session_token).await?;
        Ok(HistoryResponse {
            conversation_id,
            messages,
        })
    }

    /// Delete a conversation with its messages and trace
    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        self.sessions.delete(conversation_id).await
    }

    /// Execution trace of a conversation, oldest first
    pub async fn executions(&self, conversation_id: &str) -> Result<Vec<AgentExecution>> {
        let id = parse_uuid(conversation_id, "conversation_id")?;
        if self.sessions.store().get(id).await?.is_none() {
            return Err(Error::not_found("Conversation", id));
        }
        self.log.list_executions(id).await
    }

    fn validate(&self, request: &ChatRequest) -> Result<TurnParams> {
        let params = TurnParams {
            max_tokens: request.max_tokens.unwrap_or(self.config.default_max_tokens),
            temperature: request.temperature.unwrap_or(self.config.default_temperature),
        };

        let mut check = FieldCheck::new();
        check
            .check(require_non_blank(&request.query, "query"))
            .check(validate_length(&request.query, "query", self.config.max_query_chars))
            .check(validate_temperature(params.temperature))
            .check(validate_max_tokens(params.max_tokens));

        if request.use_retrieval {
            match &self.retriever {
                None => {
                    check.check(Err(Error::invalid_field(
                        "use_retrieval",
                        "retrieval is not configured on this server",
                    )));
                }
                Some(retriever) => {
                    if let Some(top_k) = request.top_k {
                        check.check(validate_range(top_k, 1, retriever.index().max_k(), "top_k"));
                    }
                }
            }
        }

        if let Err(err) = check.finish() {
            tracing::warn!("Rejected chat request: {}", err);
            return Err(err);
        }
        Ok(params)
    }

    async fn run_turn(
        &self,
        request: &ChatRequest,
        params: TurnParams,
        conversation: &Conversation,
        trace: &mut TurnTrace,
        started: Instant,
        cancel: &CancellationToken,
    ) -> Result<ChatResult> {
        let store = self.sessions.store().as_ref();
        let log = self.log.as_ref();
        let conversation_id = conversation.id;

        trace.stage = "append_user_message";
        self.sessions
            .append(conversation, MessageRole::User, &request.query)
            .await?;

        trace.stage = "load_history";
        let history = store.list_messages(conversation_id).await?;

        trace.stage = "open_execution";
        let input = request.redacted_snapshot();
        let execution = run_with_retry("create_execution", &self.store_policy, cancel, move || {
            log.create_execution(conversation_id, CHAT_AGENT, input.clone())
        })
        .await?;
        trace.execution_id = Some(execution.id);
        let execution_id = execution.id;
        run_with_retry("mark_running", &self.store_policy, cancel, move || {
            log.mark_running(execution_id)
        })
        .await?;

        let context = match (&self.retriever, request.use_retrieval) {
            (Some(retriever), true) => {
                trace.stage = VECTOR_SEARCH_TOOL;
                let top_k = request.top_k.unwrap_or(retriever.top_k());
                let input = json!({
                    "model": retriever.model(),
                    "top_k": top_k,
                    "metric": retriever.metric().as_str(),
                    "query_chars": request.query.chars().count(),
                });
                self.open_tool(trace, execution_id, VECTOR_SEARCH_TOOL, input, cancel)
                    .await?;

                let query = request.query.as_str();
                let chunks = run_with_retry(VECTOR_SEARCH_TOOL, &self.store_policy, cancel, move || {
                    retriever.retrieve(query, Some(top_k))
                })
                .await?;

                let chunk_ids: Vec<Uuid> = chunks.iter().map(|c| c.chunk.id).collect();
                self.close_tool(
                    trace,
                    Outcome::Completed(json!({ "chunks": chunks.len(), "chunk_ids": chunk_ids })),
                    cancel,
                )
                .await?;
                tracing::debug!("Retrieved {} chunks for {}", chunks.len(), conversation_id);
                chunks
            }
            _ => Vec::<ScoredChunk>::new(),
        };

        trace.stage = GENERATE_TOOL;
        let input = json!({
            "model": self.generator.model(),
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "context_chunks": context.len(),
            "history_messages": history.len(),
        });
        self.open_tool(trace, execution_id, GENERATE_TOOL, input, cancel)
            .await?;

        let generator = self.generator.as_ref();
        let generation_request = GenerationRequest {
            query: &request.query,
            context: &context,
            history: &history,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        };
        let generation = run_with_retry(GENERATE_TOOL, &self.generation_policy, cancel, move || {
            generator.generate(generation_request)
        })
        .await?;
        if generation.text.trim().is_empty() {
            return Err(Error::Generation(format!(
                "{} returned an empty answer",
                generator.name()
            )));
        }

        self.close_tool(
            trace,
            Outcome::Completed(json!({
                "model": generation.model,
                "tokens_used": generation.tokens_used,
                "answer_chars": generation.text.chars().count(),
            })),
            cancel,
        )
        .await?;

        trace.stage = "append_assistant_message";
        let reply = self
            .sessions
            .append(conversation, MessageRole::Assistant, &generation.text)
            .await?;
        let message_count = store.count_messages(conversation_id).await?;
        let processing_time_ms = duration_millis(started.elapsed());

        trace.stage = "complete_execution";
        let output = json!({
            "message_id": reply.id,
            "model": generation.model,
            "tokens_used": generation.tokens_used,
            "source_ids": generation.sources,
        });
        self.finish_execution(execution_id, Outcome::Completed(output), cancel)
            .await?;

        Ok(ChatResult {
            answer: generation.text,
            session_id: conversation_id.to_string(),
            conversation_id,
            sources: context.iter().map(Source::from_scored).collect(),
            metadata: ChatMetadata {
                conversation_id,
                message_count,
                conversation_created_at: conversation.created_at,
                processing_time_ms,
                processing_time_seconds: millis_to_seconds(processing_time_ms),
                source_ids: generation.sources,
                session_id: request.session_id.clone(),
                model: generation.model.clone(),
                execution_id: Some(execution_id),
                chunks_retrieved: context.len(),
            },
            tokens_used: generation.tokens_used,
            timestamp: reply.timestamp,
            model: generation.model,
            status: TurnStatus::Completed,
            error: None,
        })
    }

    async fn open_tool(
        &self,
        trace: &mut TurnTrace,
        execution_id: Uuid,
        tool_name: &'static str,
        input: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let log = self.log.as_ref();
        let invocation = run_with_retry("start_tool", &self.store_policy, cancel, move || {
            log.start_tool(execution_id, tool_name, input.clone())
        })
        .await?;
        trace.open_tool = Some(invocation.id);
        Ok(())
    }

    async fn close_tool(
        &self,
        trace: &mut TurnTrace,
        outcome: Outcome,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if let Some(invocation_id) = trace.open_tool {
            self.finish_tool(invocation_id, outcome, cancel).await?;
            trace.open_tool = None;
        }
        Ok(())
    }

    async fn finish_tool(
        &self,
        invocation_id: Uuid,
        outcome: Outcome,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let log = self.log.as_ref();
        run_with_retry("finish_tool", &self.store_policy, cancel, move || {
            log.finish_tool(invocation_id, outcome.clone())
        })
        .await
    }

    async fn finish_execution(
        &self,
        execution_id: Uuid,
        outcome: Outcome,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let log = self.log.as_ref();
        run_with_retry("finish_execution", &self.store_policy, cancel, move || {
            log.finish_execution(execution_id, outcome.clone())
        })
        .await
    }

    /// Close open trace records as failed and build the degraded result
    async fn degrade(
        &self,
        request: &ChatRequest,
        conversation: &Conversation,
        trace: TurnTrace,
        err: Error,
        started: Instant,
    ) -> ChatResult {
        let trace_id = Uuid::new_v4();
        let snapshot = request.redacted_snapshot();
        match err.kind() {
            ErrorKind::InvalidArgument | ErrorKind::NotFound => tracing::warn!(
                "Chat turn failed at {} (trace_id={}, conversation={}): {} request={}",
                trace.stage,
                trace_id,
                conversation.id,
                err,
                snapshot
            ),
            _ => tracing::error!(
                "Chat turn failed at {} (trace_id={}, conversation={}): {} request={}",
                trace.stage,
                trace_id,
                conversation.id,
                err,
                snapshot
            ),
        }

        // The caller's token may be what failed the turn.
        let recorder = CancellationToken::new();
        let reason = err.to_string();
        if let Some(invocation_id) = trace.open_tool {
            if let Err(e) = self
                .finish_tool(invocation_id, Outcome::Failed(reason.clone()), &recorder)
                .await
            {
                tracing::warn!("Could not mark tool invocation {} failed: {}", invocation_id, e);
            }
        }
        if let Some(execution_id) = trace.execution_id {
            if let Err(e) = self
                .finish_execution(execution_id, Outcome::Failed(reason), &recorder)
                .await
            {
                tracing::warn!("Could not mark execution {} failed: {}", execution_id, e);
            }
        }

        let message_count = match self.sessions.store().count_messages(conversation.id).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("Could not count messages for {}: {}", conversation.id, e);
                0
            }
        };
        let processing_time_ms = duration_millis(started.elapsed());
        let model = self.generator.model().to_string();

        ChatResult {
            answer: String::new(),
            session_id: conversation.id.to_string(),
            conversation_id: conversation.id,
            sources: Vec::new(),
            metadata: ChatMetadata {
                conversation_id: conversation.id,
                message_count,
                conversation_created_at: conversation.created_at,
                processing_time_ms,
                processing_time_seconds: millis_to_seconds(processing_time_ms),
                source_ids: Vec::new(),
                session_id: request.session_id.clone(),
                model: model.clone(),
                execution_id: trace.execution_id,
                chunks_retrieved: 0,
            },
            tokens_used: 0,
            timestamp: chrono::Utc::now(),
            model,
            status: TurnStatus::Failed,
            error: Some(TurnError {
                category: err.kind(),
                message: err.user_message(),
                trace_id,
            }),
        }
    }
}
