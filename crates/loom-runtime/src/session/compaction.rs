//! Compaction monitor.
//!
//! Counts words over the visible history and, when a threshold is crossed,
//! summarizes it with the hidden `compaction` agent. Later turns only see
//! history from the latest completed compaction onward (see
//! [`filter_compacted`]).

use std::collections::HashSet;

use indexmap::IndexMap;
use loom_core::part::{CompactionPart, PartTime, TextPart};
use loom_core::time::now_ms;
use loom_core::{
    BaseEvent, LoomEvent, Message, MessageId, MessageWithParts, ModelRef, Part, PartKind,
    SessionId, ToolState,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::RuntimeContext;
use crate::errors::RuntimeError;
use crate::session::processor::{SessionProcessor, TurnInput, TurnOutcome};

/// Text of the synthetic user message appended after a successful auto compaction.
pub const CONTINUE_PROMPT: &str = "Continue if you have next steps";

/// Name of the hidden agent that writes summaries.
pub const COMPACTION_AGENT: &str = "compaction";

/// Text a part contributes to the history. Empty for parts that carry none.
fn part_text(part: &Part) -> &str {
    match &part.kind {
        PartKind::Text(t) if !t.ignored => &t.text,
        PartKind::Reasoning(r) => &r.text,
        PartKind::Tool(tool) => match &tool.state {
            ToolState::Completed { output, .. } => output,
            ToolState::Error { error, .. } => error,
            ToolState::Pending { .. } | ToolState::Running { .. } => "",
        },
        _ => "",
    }
}

/// History formatted as `"role: text"` blocks joined by blank lines.
pub fn format_history(messages: &[MessageWithParts]) -> String {
    messages
        .iter()
        .filter_map(|message| {
            let content = message
                .parts
                .iter()
                .map(part_text)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            let content = content.trim();
            if content.is_empty() {
                return None;
            }
            let role = if message.info.is_user() {
                "user"
            } else {
                "assistant"
            };
            Some(format!("{role}: {content}"))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Whitespace-separated words in the formatted history.
pub fn word_count(messages: &[MessageWithParts]) -> usize {
    format_history(messages).split_whitespace().count()
}

/// Whether `message` is a user message whose last part requests compaction.
pub fn compaction_request(message: &MessageWithParts) -> Option<bool> {
    if !message.info.is_user() {
        return None;
    }
    match message.parts.last().map(|p| &p.kind) {
        Some(PartKind::Compaction(c)) => Some(c.auto),
        _ => None,
    }
}

/// History from the most recent completed compaction onward.
///
/// A compaction is complete when its summary message finished without
/// error; the user message that requested it starts the returned slice.
pub fn filter_compacted(messages: Vec<MessageWithParts>) -> Vec<MessageWithParts> {
    let start = {
        let completed: HashSet<&MessageId> = messages
            .iter()
            .filter(|m| {
                m.info.is_assistant()
                    && m.info.summary
                    && m.info.finish.is_some()
                    && m.info.error.is_none()
            })
            .filter_map(|m| m.info.parent_id.as_ref())
            .collect();
        messages
            .iter()
            .rposition(|m| compaction_request(m).is_some() && completed.contains(&m.info.id))
    };
    match start {
        Some(index) => messages.into_iter().skip(index).collect(),
        None => messages,
    }
}

/// One compaction pass.
#[derive(Clone, Debug)]
pub struct CompactionRequest {
    /// User message the summary answers.
    pub parent_id: MessageId,
    /// History to summarize. Must contain `parent_id`.
    pub messages: Vec<MessageWithParts>,
    /// Session being compacted.
    pub session_id: SessionId,
    /// Turn cancellation.
    pub cancel: CancellationToken,
    /// Triggered automatically rather than by an explicit command.
    pub auto: bool,
}

/// Decides when to compact and runs compaction turns.
#[derive(Clone)]
pub struct CompactionMonitor {
    ctx: RuntimeContext,
}

impl CompactionMonitor {
    /// Monitor using `ctx`.
    pub fn new(ctx: RuntimeContext) -> Self {
        Self { ctx }
    }

    /// Whether the history exceeds the configured word threshold.
    ///
    /// Uses `messages` when given, else the session's compacted history.
    /// Always `false` without a threshold.
    pub async fn should_compact(
        &self,
        session_id: &SessionId,
        messages: Option<&[MessageWithParts]>,
    ) -> Result<bool, RuntimeError> {
        let Some(threshold) = self.ctx.settings.compaction.threshold() else {
            return Ok(false);
        };
        let count = match messages {
            Some(messages) => word_count(messages),
            None => word_count(&filter_compacted(self.ctx.store.messages(session_id).await?)),
        };
        if u64::try_from(count).unwrap_or(u64::MAX) <= threshold {
            return Ok(false);
        }
        info!(session_id = %session_id, words = count, threshold, "compaction threshold exceeded");
        Ok(true)
    }

    /// Append a user message requesting compaction.
    pub async fn create(
        &self,
        session_id: &SessionId,
        agent: &str,
        model: ModelRef,
        auto: bool,
    ) -> Result<Message, RuntimeError> {
        let message = Message::user(session_id.clone(), agent, model);
        self.ctx.create_message(&message).await?;
        let part = Part::new(
            session_id.clone(),
            message.id.clone(),
            PartKind::Compaction(CompactionPart { auto }),
        );
        self.ctx.save_part(&part, None).await?;
        debug!(session_id = %session_id, auto, "compaction requested");
        Ok(message)
    }

    /// Summarize `request.messages` with the compaction agent.
    ///
    /// Auto compaction never stops the caller: failures are logged and
    /// reported as [`TurnOutcome::Continue`], and success appends a synthetic
    /// [`CONTINUE_PROMPT`] message. Explicit compaction reports failures as
    /// [`TurnOutcome::Stop`].
    pub async fn process(&self, request: CompactionRequest) -> Result<TurnOutcome, RuntimeError> {
        let CompactionRequest {
            parent_id,
            messages,
            session_id,
            cancel,
            auto,
        } = request;
        let user = messages
            .iter()
            .rev()
            .find(|m| m.info.id == parent_id)
            .map(|m| m.info.clone())
            .ok_or_else(|| {
                RuntimeError::InvalidRequest(format!("compaction parent {parent_id} not in history"))
            })?;
        let agent = self.ctx.agents.get(COMPACTION_AGENT)?;
        let model = self
            .ctx
            .settings
            .compaction
            .model_override()
            .unwrap_or_else(|| user.model.clone());

        let prompt = self.ctx.settings.compaction.prompt.trim();
        if prompt.is_empty() {
            warn!(session_id = %session_id, "skipping compaction, no prompt configured");
            return Ok(if auto {
                TurnOutcome::Continue
            } else {
                TurnOutcome::Stop
            });
        }

        let mut sections = vec!["Conversation history:".to_string(), format_history(&messages)];
        for contributor in &self.ctx.contributors {
            sections.extend(contributor.context(&session_id).await);
        }
        sections.retain(|s| !s.is_empty());
        let prompt_text = sections.join("\n\n");

        let mut summary =
            Message::assistant(session_id.clone(), parent_id, COMPACTION_AGENT, model.clone());
        summary.summary = true;
        summary.variant.clone_from(&user.variant);
        self.ctx.create_message(&summary).await?;

        let request_message = Message::user(session_id.clone(), COMPACTION_AGENT, model.clone());
        let request_part = Part::text(
            session_id.clone(),
            request_message.id.clone(),
            prompt_text,
        );
        let turn = SessionProcessor::new(self.ctx.clone(), summary, cancel)
            .process(TurnInput {
                agent,
                model,
                system: vec![prompt.to_string()],
                messages: vec![MessageWithParts {
                    info: request_message,
                    parts: vec![request_part],
                }],
                tools: IndexMap::new(),
                resume_handle: None,
            })
            .await;

        if turn.outcome == TurnOutcome::Stop {
            if auto {
                warn!(session_id = %session_id, "auto compaction failed, continuing");
                return Ok(TurnOutcome::Continue);
            }
            return Ok(TurnOutcome::Stop);
        }

        if auto {
            let next = Message::user(session_id.clone(), &user.agent, user.model.clone());
            self.ctx.create_message(&next).await?;
            let now = now_ms();
            let part = Part::new(
                session_id.clone(),
                next.id.clone(),
                PartKind::Text(TextPart {
                    text: CONTINUE_PROMPT.to_string(),
                    synthetic: true,
                    ignored: false,
                    time: Some(PartTime {
                        start: now,
                        end: Some(now),
                    }),
                }),
            );
            self.ctx.save_part(&part, None).await?;
        }

        info!(session_id = %session_id, auto, "session compacted");
        let _ = self.ctx.emitter.emit(LoomEvent::SessionCompacted {
            base: BaseEvent::now(&session_id),
        });
        Ok(TurnOutcome::Continue)
    }
}
