//! Session turn processor.
//!
//! Consumes one bridge event stream and turns it into persisted parts on a
//! single assistant message. Open text, reasoning, and tool parts live in
//! memory until finalized; every delta is also written through the store so
//! a crash loses at most one delta.
//!
//! Finalization runs on every exit path (clean end, bridge error,
//! cancellation, store failure) and stamps `time.completed` exactly once.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;

use futures::StreamExt;
use indexmap::IndexMap;
use loom_core::part::{
    PartTime, PatchPart, ReasoningPart, StepFinishPart, StepStartPart, TextPart, ToolTime,
};
use loom_core::time::now_ms;
use loom_core::{
    AgentInfo, BaseEvent, BridgeEvent, BusyPhase, FileChange, LoomEvent, Message, MessageError,
    MessageWithParts, ModelRef, Part, PartKind, TokenUsage, ToolPart, ToolState,
};
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bridge::{BridgeError, BridgeRequest};
use crate::context::RuntimeContext;
use crate::errors::RuntimeError;
use crate::session::authorizer::TurnAuthorizer;
use crate::status::tool_detail;
use crate::tool_map;

/// Error text recorded on tool parts still open when a turn ends.
pub const TOOL_ABORTED: &str = "Tool execution aborted";

/// Whether the caller should attempt another turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The turn finished without error.
    Continue,
    /// The message ended in error.
    Stop,
}

/// Inputs for one turn besides the assistant message itself.
#[derive(Clone, Debug)]
pub struct TurnInput {
    /// Agent running the turn.
    pub agent: Arc<AgentInfo>,
    /// Provider and model.
    pub model: ModelRef,
    /// System prompt lines.
    pub system: Vec<String>,
    /// History visible to the model.
    pub messages: Vec<MessageWithParts>,
    /// Tool enable map.
    pub tools: IndexMap<String, bool>,
    /// Explicit resume handle. Defaults to the one stored on the session.
    pub resume_handle: Option<String>,
}

/// Result of [`SessionProcessor::process`].
#[derive(Clone, Debug)]
pub struct ProcessedTurn {
    /// Continue/stop signal.
    pub outcome: TurnOutcome,
    /// Final state of the assistant message.
    pub message: Message,
}

/// Drives one assistant message through a bridge event stream.
pub struct SessionProcessor {
    ctx: RuntimeContext,
    message: Message,
    cancel: CancellationToken,
    text: Option<Part>,
    reasoning: IndexMap<String, Part>,
    tools: IndexMap<String, Part>,
    /// Call ids already closed this turn.
    finished: HashSet<String>,
    snapshot: Option<String>,
}

impl SessionProcessor {
    /// Processor for `message`, which must already exist in the store.
    pub fn new(ctx: RuntimeContext, message: Message, cancel: CancellationToken) -> Self {
        Self {
            ctx,
            message,
            cancel,
            text: None,
            reasoning: IndexMap::new(),
            tools: IndexMap::new(),
            finished: HashSet::new(),
            snapshot: None,
        }
    }

    /// The assistant message as currently known.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Run the turn to completion.
    pub async fn process(mut self, input: TurnInput) -> ProcessedTurn {
        info!(
            session_id = %self.message.session_id,
            message_id = %self.message.id,
            agent = %input.agent.name,
            provider = %input.model.provider_id,
            model = %input.model.model_id,
            "processing turn"
        );

        match self.consume(input).await {
            Ok(()) => {}
            Err(RuntimeError::Aborted) => {
                debug!(message_id = %self.message.id, "turn aborted");
            }
            Err(e) => {
                error!(message_id = %self.message.id, error = %e, "turn failed");
                self.fail(MessageError::new(e.error_name(), e.to_string()));
            }
        }
        self.finalize().await;

        let outcome = if self.message.error.is_some() {
            TurnOutcome::Stop
        } else {
            TurnOutcome::Continue
        };
        ProcessedTurn {
            outcome,
            message: self.message,
        }
    }

    async fn consume(&mut self, input: TurnInput) -> Result<(), RuntimeError> {
        let session_id = self.message.session_id.clone();
        self.ctx.status.busy(&session_id);
        self.snapshot = self.ctx.snapshot.track().await;
        let step_start = self.new_part(PartKind::StepStart(StepStartPart {
            snapshot: self.snapshot.clone(),
        }));
        self.ctx.save_part(&step_start, None).await?;

        let resume_handle = match input.resume_handle {
            Some(handle) => Some(handle),
            None => self
                .ctx
                .store
                .get_session(&session_id)
                .await
                .ok()
                .and_then(|s| s.provider_handle(&input.model.provider_id).map(String::from)),
        };
        let authorizer = TurnAuthorizer::new(
            Arc::clone(&self.ctx.permissions),
            Arc::clone(&self.ctx.store),
            session_id.clone(),
            Arc::clone(&input.agent),
            input.model.provider_id.clone(),
            self.cancel.clone(),
        );
        let request = BridgeRequest {
            session_id,
            message_id: self.message.id.clone(),
            agent: input.agent,
            model: input.model,
            system: input.system,
            messages: input.messages,
            resume_handle,
            tools: input.tools,
            authorizer: Arc::new(authorizer),
            cancel: self.cancel.clone(),
        };

        let mut stream = self.ctx.bridge.stream(request).await.map_err(bridge_error)?;
        loop {
            let event = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(RuntimeError::Aborted),
                event = stream.next() => event,
            };
            match event {
                None => return Ok(()),
                Some(Err(e)) => return Err(bridge_error(e)),
                Some(Ok(event)) => {
                    if self.handle(event).await?.is_break() {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn handle(&mut self, event: BridgeEvent) -> Result<ControlFlow<()>, RuntimeError> {
        let session_id = self.message.session_id.clone();
        match event {
            // ── Content ─────────────────────────────────────────────────
            BridgeEvent::TextDelta { text } => {
                self.ctx.status.phase(&session_id, BusyPhase::Writing, None);
                let message_id = self.message.id.clone();
                let part = self.text.get_or_insert_with(|| {
                    Part::new(
                        session_id.clone(),
                        message_id,
                        PartKind::Text(TextPart {
                            time: Some(PartTime::starting(now_ms())),
                            ..TextPart::default()
                        }),
                    )
                });
                if let PartKind::Text(t) = &mut part.kind {
                    t.text.push_str(&text);
                }
                let part = part.clone();
                self.ctx.save_part(&part, Some(text.as_str())).await?;
            }

            BridgeEvent::ReasoningDelta { id, text } => {
                self.ctx.status.phase(&session_id, BusyPhase::Thinking, None);
                let message_id = self.message.id.clone();
                let part = self.reasoning.entry(id).or_insert_with(|| {
                    Part::new(
                        session_id.clone(),
                        message_id,
                        PartKind::Reasoning(ReasoningPart {
                            text: String::new(),
                            time: PartTime::starting(now_ms()),
                        }),
                    )
                });
                if let PartKind::Reasoning(r) = &mut part.kind {
                    r.text.push_str(&text);
                }
                let part = part.clone();
                self.ctx.save_part(&part, Some(text.as_str())).await?;
            }

            // ── Tools ───────────────────────────────────────────────────
            BridgeEvent::ToolStart { id, tool, command } => {
                if self.tools.contains_key(&id) || self.finished.contains(&id) {
                    debug!(call_id = %id, "duplicate tool start ignored");
                    return Ok(ControlFlow::Continue(()));
                }
                self.ctx.status.phase(
                    &session_id,
                    BusyPhase::Tool,
                    Some(tool_detail(&tool, command.as_deref())),
                );
                self.finalize_text().await;

                let input = command
                    .as_ref()
                    .map_or_else(|| json!({}), |c| json!({ "command": c }));
                let mut metadata = Map::new();
                let _ = metadata.insert("raw".into(), json!(""));
                let part = self.new_part(PartKind::Tool(ToolPart {
                    call_id: id.clone(),
                    tool,
                    state: ToolState::Running {
                        input,
                        title: command.unwrap_or_default(),
                        metadata,
                        time: ToolTime {
                            start: now_ms(),
                            end: None,
                        },
                    },
                }));
                self.ctx.save_part(&part, None).await?;
                let _ = self.tools.insert(id, part);
            }

            BridgeEvent::ToolInputDelta { id, partial } => {
                self.tool_input_delta(&id, &partial).await;
            }

            BridgeEvent::ToolEnd {
                id,
                output,
                exit_code,
            } => {
                self.ctx.status.phase(&session_id, BusyPhase::Thinking, None);
                self.tool_end(id, output, exit_code).await?;
            }

            BridgeEvent::FileChange { id, files } => {
                self.finalize_text().await;
                if !files.is_empty() {
                    let part = self.new_part(PartKind::Patch(PatchPart {
                        hash: id,
                        files: files.into_iter().map(|FileChange { path, .. }| path).collect(),
                    }));
                    self.ctx.save_part(&part, None).await?;
                }
            }

            // ── Steps ───────────────────────────────────────────────────
            BridgeEvent::StepStart => {
                self.ctx.status.busy(&session_id);
                self.snapshot = self.ctx.snapshot.track().await;
            }

            BridgeEvent::StepEnd => self.step_end().await?,

            // ── Terminal ────────────────────────────────────────────────
            BridgeEvent::Done {
                provider_session_handle,
            } => {
                if let Some(handle) = provider_session_handle {
                    let mut session = self.ctx.store.get_session(&session_id).await?;
                    let _ = session
                        .provider_session_handles
                        .insert(self.message.model.provider_id.clone(), handle);
                    let _ = self.ctx.store.update_session(session).await?;
                }
            }

            BridgeEvent::Error { message } => {
                error!(session_id = %session_id, error = %message, "bridge reported error");
                self.fail(MessageError::new("BridgeError", message));
                self.ctx.status.idle(&session_id);
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    async fn tool_input_delta(&mut self, id: &str, partial: &str) {
        let Some(part) = self.tools.get_mut(id) else {
            debug!(call_id = %id, "input delta for unknown tool call");
            return;
        };
        let Some(ToolPart { tool, state, .. }) = part.as_tool_mut() else {
            return;
        };
        let ToolState::Running {
            title, metadata, ..
        } = state
        else {
            return;
        };

        let mut raw = metadata
            .get("raw")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        raw.push_str(partial);
        let parsed = serde_json::from_str::<Value>(&raw);
        let _ = metadata.insert("raw".into(), Value::String(raw));

        let parsed = match parsed {
            Ok(v) if v.is_object() => v,
            Ok(_) | Err(_) => return,
        };
        let extracted = tool_map::pattern(tool, &parsed);
        if extracted == "*" || *title == extracted {
            return;
        }
        *title = extracted;

        let part = part.clone();
        if let Err(e) = self.ctx.save_part(&part, None).await {
            warn!(call_id = %id, error = %e, "failed to update tool part title");
        }
    }

    async fn tool_end(
        &mut self,
        id: String,
        output: String,
        exit_code: Option<i32>,
    ) -> Result<(), RuntimeError> {
        if !self.finished.insert(id.clone()) {
            debug!(call_id = %id, "duplicate tool end ignored");
            return Ok(());
        }
        let now = now_ms();
        let mut metadata = Map::new();
        let _ = metadata.insert("exitCode".into(), json!(exit_code));

        let part = if let Some(mut part) = self.tools.shift_remove(&id) {
            if let Some(tool) = part.as_tool_mut() {
                tool.state = ToolState::Completed {
                    input: tool.state.input().clone(),
                    output,
                    title: String::new(),
                    metadata,
                    time: ToolTime {
                        start: tool.state.start().unwrap_or(now),
                        end: Some(now),
                    },
                };
            }
            part
        } else {
            debug!(call_id = %id, "tool end without start, synthesizing part");
            self.new_part(PartKind::Tool(ToolPart {
                call_id: id,
                tool: "bash".into(),
                state: ToolState::Completed {
                    input: json!({}),
                    output,
                    title: String::new(),
                    metadata,
                    time: ToolTime {
                        start: now,
                        end: Some(now),
                    },
                },
            }))
        };
        self.ctx.save_part(&part, None).await?;
        Ok(())
    }

    async fn step_end(&mut self) -> Result<(), RuntimeError> {
        self.finalize_text().await;
        self.finalize_reasoning().await;
        self.finalize_tools().await;

        self.message.finish = Some("end-turn".into());
        let step_finish = self.new_part(PartKind::StepFinish(StepFinishPart {
            reason: "end_turn".into(),
            snapshot: self.ctx.snapshot.track().await,
            tokens: TokenUsage::default(),
            cost: 0.0,
        }));
        self.ctx.save_part(&step_finish, None).await?;

        if let Some(hash) = self.snapshot.take() {
            self.emit_patch(&hash).await?;
        }

        if let Some(parent_id) = self.message.parent_id.clone() {
            let summary = Arc::clone(&self.ctx.summary);
            let session_id = self.message.session_id.clone();
            let _ = tokio::spawn(async move {
                summary.summarize(&session_id, &parent_id).await;
            });
        }
        Ok(())
    }

    async fn emit_patch(&self, hash: &str) -> Result<(), RuntimeError> {
        let patch = self.ctx.snapshot.patch(hash).await;
        if patch.files.is_empty() {
            return Ok(());
        }
        let part = self.new_part(PartKind::Patch(PatchPart {
            hash: patch.hash,
            files: patch.files,
        }));
        self.ctx.save_part(&part, None).await?;
        Ok(())
    }

    fn fail(&mut self, error: MessageError) {
        let _ = self.ctx.emitter.emit(LoomEvent::SessionError {
            base: BaseEvent::now(&self.message.session_id),
            message_id: Some(self.message.id.clone()),
            error: error.clone(),
        });
        self.message.error = Some(error);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Finalization
    // ─────────────────────────────────────────────────────────────────────

    async fn finalize(&mut self) {
        self.finalize_text().await;
        self.finalize_reasoning().await;
        self.finalize_tools().await;

        if let Some(hash) = self.snapshot.take() {
            if let Err(e) = self.emit_patch(&hash).await {
                warn!(message_id = %self.message.id, error = %e, "failed to record final patch");
            }
        }

        if self.message.time.completed.is_none() {
            self.message.time.completed = Some(now_ms());
        }
        if let Err(e) = self.ctx.save_message(&self.message).await {
            error!(message_id = %self.message.id, error = %e, "failed to persist finished message");
        }
        self.ctx.status.idle(&self.message.session_id);
    }

    async fn finalize_text(&mut self) {
        let Some(mut part) = self.text.take() else {
            return;
        };
        if let PartKind::Text(t) = &mut part.kind {
            let len = t.text.trim_end().len();
            t.text.truncate(len);
            let now = now_ms();
            t.time = Some(PartTime {
                start: t.time.as_ref().map_or(now, |time| time.start),
                end: Some(now),
            });
        }
        self.persist_quietly(&part, "text").await;
    }

    async fn finalize_reasoning(&mut self) {
        let open = std::mem::take(&mut self.reasoning);
        for (_, mut part) in open {
            if let PartKind::Reasoning(r) = &mut part.kind {
                let len = r.text.trim_end().len();
                r.text.truncate(len);
                r.time.end = Some(now_ms());
            }
            self.persist_quietly(&part, "reasoning").await;
        }
    }

    async fn finalize_tools(&mut self) {
        let open = std::mem::take(&mut self.tools);
        for (id, mut part) in open {
            let _ = self.finished.insert(id);
            let Some(tool) = part.as_tool_mut() else {
                continue;
            };
            if tool.state.is_terminal() {
                continue;
            }
            let now = now_ms();
            tool.state = ToolState::Error {
                input: tool.state.input().clone(),
                error: TOOL_ABORTED.into(),
                time: ToolTime {
                    start: tool.state.start().unwrap_or(now),
                    end: Some(now),
                },
            };
            self.persist_quietly(&part, "tool").await;
        }
    }

    async fn persist_quietly(&self, part: &Part, kind: &str) {
        if let Err(e) = self.ctx.save_part(part, None).await {
            error!(
                message_id = %self.message.id,
                part_id = %part.id,
                kind,
                error = %e,
                "failed to persist finalized part"
            );
        }
    }

    fn new_part(&self, kind: PartKind) -> Part {
        Part::new(self.message.session_id.clone(), self.message.id.clone(), kind)
    }
}

fn bridge_error(e: BridgeError) -> RuntimeError {
    match e {
        BridgeError::Cancelled => RuntimeError::Aborted,
        BridgeError::Failed(message) => RuntimeError::Bridge(message),
    }
}
