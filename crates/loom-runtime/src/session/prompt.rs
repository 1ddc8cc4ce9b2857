//! Top-level turn driver.
//!
//! [`SessionPrompt::prompt`] appends the user's message and loops until an
//! assistant turn has run: pending compaction requests are processed first,
//! and an auto compaction is requested once when history is over the word
//! threshold. One prompt runs per session at a time.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use indexmap::IndexMap;
use loom_core::{AgentInfo, Message, MessageId, MessageWithParts, ModelRef, Part, SessionId};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::context::RuntimeContext;
use crate::errors::RuntimeError;
use crate::session::compaction::{
    CompactionMonitor, CompactionRequest, compaction_request, filter_compacted,
};
use crate::session::processor::{SessionProcessor, TurnInput, TurnOutcome};

/// A user prompt.
#[derive(Clone, Debug)]
pub struct PromptInput {
    /// Target session.
    pub session_id: SessionId,
    /// Agent to run.
    pub agent: String,
    /// Model override. Defaults to the agent's model, then the last one used.
    pub model: Option<ModelRef>,
    /// Model variant.
    pub variant: Option<String>,
    /// User text.
    pub text: String,
    /// Extra synthetic text parts (context the user did not type).
    pub synthetic: Vec<String>,
    /// Tool enable map passed to the bridge.
    pub tools: IndexMap<String, bool>,
}

impl PromptInput {
    /// Prompt `agent` in `session_id` with `text`.
    pub fn new(session_id: SessionId, agent: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            session_id,
            agent: agent.into(),
            model: None,
            variant: None,
            text: text.into(),
            synthetic: Vec::new(),
            tools: IndexMap::new(),
        }
    }

    /// Set the model.
    #[must_use]
    pub fn with_model(mut self, model: ModelRef) -> Self {
        self.model = Some(model);
        self
    }

    /// Set the tool map.
    #[must_use]
    pub fn with_tools(mut self, tools: IndexMap<String, bool>) -> Self {
        self.tools = tools;
        self
    }

    /// Add a synthetic text part.
    #[must_use]
    pub fn with_synthetic(mut self, text: impl Into<String>) -> Self {
        self.synthetic.push(text.into());
        self
    }
}

/// Removes the session's running entry when the prompt returns.
struct RunningGuard<'a> {
    running: &'a DashMap<SessionId, CancellationToken>,
    session_id: SessionId,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        let _ = self.running.remove(&self.session_id);
    }
}

/// Runs prompts and tracks their cancellation tokens per session.
pub struct SessionPrompt {
    ctx: RuntimeContext,
    compaction: CompactionMonitor,
    running: DashMap<SessionId, CancellationToken>,
}

impl SessionPrompt {
    /// Prompt driver over `ctx`.
    pub fn new(ctx: RuntimeContext) -> Self {
        Self {
            compaction: CompactionMonitor::new(ctx.clone()),
            ctx,
            running: DashMap::new(),
        }
    }

    /// The compaction monitor used between turns.
    pub fn compaction(&self) -> &CompactionMonitor {
        &self.compaction
    }

    /// Whether a prompt is running in `session_id`.
    pub fn is_running(&self, session_id: &SessionId) -> bool {
        self.running.contains_key(session_id)
    }

    /// Cancel the running prompt of `session_id`. Returns `false` if idle.
    pub fn cancel(&self, session_id: &SessionId) -> bool {
        match self.running.get(session_id) {
            Some(token) => {
                info!(session_id = %session_id, "cancelling prompt");
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn start(
        &self,
        session_id: &SessionId,
    ) -> Result<(RunningGuard<'_>, CancellationToken), RuntimeError> {
        let token = CancellationToken::new();
        match self.running.entry(session_id.clone()) {
            Entry::Occupied(_) => return Err(RuntimeError::InvalidRequest("session busy".into())),
            Entry::Vacant(slot) => {
                let _ = slot.insert(token.clone());
            }
        }
        let guard = RunningGuard {
            running: &self.running,
            session_id: session_id.clone(),
        };
        Ok((guard, token))
    }

    /// Append a user message and run until an assistant turn completes.
    ///
    /// Returns the last assistant message with its parts.
    pub async fn prompt(&self, input: PromptInput) -> Result<MessageWithParts, RuntimeError> {
        let (_guard, cancel) = self.start(&input.session_id)?;
        let agent = self.ctx.agents.get(&input.agent)?;
        let _ = self.ctx.store.get_session(&input.session_id).await?;
        let model = self
            .resolve_model(&input.session_id, &agent, input.model.clone())
            .await?;

        let mut user = Message::user(input.session_id.clone(), &agent.name, model.clone());
        user.variant.clone_from(&input.variant);
        self.ctx.create_message(&user).await?;
        let text = Part::text(input.session_id.clone(), user.id.clone(), input.text.as_str());
        self.ctx.save_part(&text, None).await?;
        for synthetic in &input.synthetic {
            let part = Part::synthetic_text(
                input.session_id.clone(),
                user.id.clone(),
                synthetic.as_str(),
            );
            self.ctx.save_part(&part, None).await?;
        }
        debug!(session_id = %input.session_id, message_id = %user.id, "user message appended");

        self.run(&input.session_id, &agent, &model, &input.tools, &cancel)
            .await
    }

    /// Explicitly compact `session_id` and return the summary message.
    pub async fn compact(
        &self,
        session_id: &SessionId,
        agent: &str,
        model: Option<ModelRef>,
    ) -> Result<MessageWithParts, RuntimeError> {
        let (_guard, cancel) = self.start(session_id)?;
        let agent = self.ctx.agents.get(agent)?;
        let model = self.resolve_model(session_id, &agent, model).await?;
        let _ = self
            .compaction
            .create(session_id, &agent.name, model.clone(), false)
            .await?;
        self.run(session_id, &agent, &model, &IndexMap::new(), &cancel)
            .await
    }

    async fn run(
        &self,
        session_id: &SessionId,
        agent: &Arc<AgentInfo>,
        model: &ModelRef,
        tools: &IndexMap<String, bool>,
        cancel: &CancellationToken,
    ) -> Result<MessageWithParts, RuntimeError> {
        let mut auto_requested = false;
        let mut last: Option<MessageId> = None;
        // A skipped or failed auto compaction leaves its request as the tail
        // of history; it must not be processed twice.
        let mut handled: Option<MessageId> = None;

        loop {
            if cancel.is_cancelled() {
                debug!(session_id = %session_id, "prompt loop cancelled");
                break;
            }
            let messages = filter_compacted(self.ctx.store.messages(session_id).await?);

            let pending = messages.last().filter(|m| {
                compaction_request(m).is_some() && handled.as_ref() != Some(&m.info.id)
            });
            if let Some(pending) = pending {
                let auto = compaction_request(pending).unwrap_or(false);
                let parent_id = pending.info.id.clone();
                handled = Some(parent_id.clone());
                let outcome = self
                    .compaction
                    .process(CompactionRequest {
                        parent_id,
                        messages,
                        session_id: session_id.clone(),
                        cancel: cancel.clone(),
                        auto,
                    })
                    .await?;
                auto_requested = true;
                if outcome == TurnOutcome::Stop || !auto {
                    break;
                }
                continue;
            }

            if !auto_requested
                && self
                    .compaction
                    .should_compact(session_id, Some(&messages))
                    .await?
            {
                auto_requested = true;
                let _ = self
                    .compaction
                    .create(session_id, &agent.name, model.clone(), true)
                    .await?;
                continue;
            }

            let parent = messages
                .iter()
                .rev()
                .find(|m| m.info.is_user() && compaction_request(m).is_none())
                .map(|m| m.info.clone())
                .ok_or_else(|| RuntimeError::InvalidRequest("no user message to answer".into()))?;

            let mut assistant = Message::assistant(
                session_id.clone(),
                parent.id.clone(),
                &agent.name,
                model.clone(),
            );
            assistant.variant.clone_from(&parent.variant);
            self.ctx.create_message(&assistant).await?;
            last = Some(assistant.id.clone());

            let turn = SessionProcessor::new(self.ctx.clone(), assistant, cancel.clone())
                .process(TurnInput {
                    agent: Arc::clone(agent),
                    model: model.clone(),
                    system: agent.prompt.iter().cloned().collect(),
                    messages,
                    tools: tools.clone(),
                    resume_handle: None,
                })
                .await;
            debug!(session_id = %session_id, outcome = ?turn.outcome, "turn finished");
            break;
        }

        self.ctx.status.idle(session_id);
        self.last_assistant(session_id, last).await
    }

    async fn last_assistant(
        &self,
        session_id: &SessionId,
        preferred: Option<MessageId>,
    ) -> Result<MessageWithParts, RuntimeError> {
        if let Some(id) = preferred {
            return Ok(self.ctx.store.get_message(session_id, &id).await?);
        }
        self.ctx
            .store
            .messages(session_id)
            .await?
            .into_iter()
            .rev()
            .find(|m| m.info.is_assistant())
            .ok_or(RuntimeError::Aborted)
    }

    async fn resolve_model(
        &self,
        session_id: &SessionId,
        agent: &AgentInfo,
        explicit: Option<ModelRef>,
    ) -> Result<ModelRef, RuntimeError> {
        if let Some(model) = explicit.or_else(|| agent.model.clone()) {
            return Ok(model);
        }
        self.ctx
            .store
            .messages(session_id)
            .await?
            .into_iter()
            .rev()
            .find(|m| m.info.is_user())
            .map(|m| m.info.model)
            .ok_or_else(|| {
                RuntimeError::InvalidRequest(format!(
                    "no model configured for agent {}",
                    agent.name
                ))
            })
    }
}
