//! Task delegation.
//!
//! A running agent can delegate work in two ways:
//!
//! - **Subtask**: a child session runs the target agent to completion and
//!   its final text is returned to the caller as the tool output.
//! - **Handoff**: the caller's session is compacted and continues under the
//!   target agent.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use loom_core::{
    AgentInfo, BaseEvent, LoomEvent, Message, MessageId, MessageWithParts, ModelRef, Part,
    PermissionAction, PermissionRule, Ruleset, Session, SessionId,
};
use loom_permission::{AskInput, mentions, merge};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::context::RuntimeContext;
use crate::errors::RuntimeError;
use crate::session::compaction::CompactionRequest;
use crate::session::processor::TurnOutcome;
use crate::session::prompt::{PromptInput, SessionPrompt};

/// How the target agent takes over.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TaskMode {
    /// Run in a child session and return its result.
    #[default]
    Subtask,
    /// Switch the caller's session to the target agent.
    Handoff,
}

/// Arguments of a delegation.
#[derive(Clone, Debug)]
pub struct TaskInput {
    /// Short description of the work.
    pub description: String,
    /// Instructions for the subtask agent. Required for subtasks.
    pub prompt: Option<String>,
    /// Target agent name.
    pub subagent_type: String,
    /// Delegation mode.
    pub mode: TaskMode,
    /// Child session to resume.
    pub task_id: Option<String>,
    /// Skip the permission check (user-initiated delegation).
    pub bypass_agent_check: bool,
}

impl TaskInput {
    /// Subtask delegating `prompt` to `agent`.
    pub fn subtask(
        agent: impl Into<String>,
        description: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            prompt: Some(prompt.into()),
            subagent_type: agent.into(),
            mode: TaskMode::Subtask,
            task_id: None,
            bypass_agent_check: false,
        }
    }

    /// Handoff to `agent` with `description` as the objective.
    pub fn handoff(agent: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            prompt: None,
            subagent_type: agent.into(),
            mode: TaskMode::Handoff,
            task_id: None,
            bypass_agent_check: false,
        }
    }

    /// Resume the child session `task_id`.
    #[must_use]
    pub fn resuming(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Skip the permission check.
    #[must_use]
    pub fn bypassing_agent_check(mut self) -> Self {
        self.bypass_agent_check = true;
        self
    }
}

/// The calling turn.
#[derive(Clone, Debug)]
pub struct TaskContext {
    /// Caller session.
    pub session_id: SessionId,
    /// Assistant message issuing the call.
    pub message_id: MessageId,
    /// Caller agent name.
    pub agent: String,
    /// Caller history.
    pub messages: Vec<MessageWithParts>,
    /// Caller cancellation. Cancels the child session too.
    pub cancel: CancellationToken,
}

/// Tool output of a delegation.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskResult {
    /// Display title.
    pub title: String,
    /// Text returned to the calling model.
    pub output: String,
    /// Structured metadata.
    pub metadata: Value,
    /// Session the work ran in.
    pub session_id: SessionId,
}

/// Cancels the child prompt when the caller is cancelled, for as long as it lives.
struct AbortListener(JoinHandle<()>);

impl AbortListener {
    fn spawn(prompt: Arc<SessionPrompt>, parent: CancellationToken, child: SessionId) -> Self {
        Self(tokio::spawn(async move {
            parent.cancelled().await;
            debug!(child_session_id = %child, "parent cancelled, cancelling subtask");
            // The child prompt may not have registered yet.
            while !prompt.cancel(&child) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }))
    }
}

impl Drop for AbortListener {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs subtasks and handoffs.
pub struct TaskEngine {
    ctx: RuntimeContext,
    prompt: Arc<SessionPrompt>,
}

impl TaskEngine {
    /// Engine driving child sessions through `prompt`.
    pub fn new(ctx: RuntimeContext, prompt: Arc<SessionPrompt>) -> Self {
        Self { ctx, prompt }
    }

    /// Agents `ruleset` may delegate to.
    pub fn accessible_agents(&self, ruleset: &[PermissionRule]) -> Vec<Arc<AgentInfo>> {
        self.ctx.agents.accessible_agents(ruleset)
    }

    /// Delegate according to `input.mode`.
    #[instrument(skip_all, fields(session_id = %ctx.session_id, agent = %input.subagent_type))]
    pub async fn execute(
        &self,
        input: TaskInput,
        ctx: TaskContext,
    ) -> Result<TaskResult, RuntimeError> {
        let target = self.ctx.agents.get(&input.subagent_type)?;
        let caller = self
            .ctx
            .store
            .get_message(&ctx.session_id, &ctx.message_id)
            .await?;
        if !caller.info.is_assistant() {
            return Err(RuntimeError::InvalidRequest("Not an assistant message".into()));
        }
        let model = target
            .model
            .clone()
            .unwrap_or_else(|| caller.info.model.clone());

        match input.mode {
            TaskMode::Handoff => self.handoff(&input, &ctx, &target, model).await,
            TaskMode::Subtask => self.subtask(&input, &ctx, &target, model).await,
        }
    }

    async fn caller_rules(&self, ctx: &TaskContext) -> Result<Ruleset, RuntimeError> {
        let session = self.ctx.store.get_session(&ctx.session_id).await?;
        let agent_rules = self
            .ctx
            .agents
            .get(&ctx.agent)
            .map(|a| a.permission.clone())
            .unwrap_or_default();
        Ok(merge(&[&agent_rules, &session.permission]))
    }

    async fn handoff(
        &self,
        input: &TaskInput,
        ctx: &TaskContext,
        target: &AgentInfo,
        model: ModelRef,
    ) -> Result<TaskResult, RuntimeError> {
        let from = ctx.agent.clone();
        let to = target.name.clone();

        if !input.bypass_agent_check && from != to {
            let ask = AskInput::new(ctx.session_id.clone(), "task_handoff", vec![to.clone()])
                .with_ruleset(self.caller_rules(ctx).await?)
                .with_always(vec![to.clone()])
                .with_agent(from.as_str())
                .with_metadata("sourceAgent", from.as_str())
                .with_metadata("targetAgent", to.as_str())
                .with_metadata("reason", input.description.as_str());
            self.ctx.permissions.ask(ask, &ctx.cancel).await?;
        }

        let last_user = ctx
            .messages
            .iter()
            .rev()
            .find(|m| m.info.is_user())
            .map(|m| m.info.id.clone())
            .ok_or_else(|| {
                RuntimeError::InvalidRequest("Unable to handoff: missing user message context".into())
            })?;

        let compacted = self
            .prompt
            .compaction()
            .process(CompactionRequest {
                parent_id: last_user,
                messages: ctx.messages.clone(),
                session_id: ctx.session_id.clone(),
                cancel: ctx.cancel.clone(),
                auto: false,
            })
            .await;
        match compacted {
            Ok(TurnOutcome::Continue) => {}
            Ok(TurnOutcome::Stop) => {
                return Err(RuntimeError::CompactionFailed(
                    "Unable to handoff: compaction failed".into(),
                ));
            }
            Err(e) => {
                warn!(error = %e, "handoff compaction failed");
                return Err(RuntimeError::CompactionFailed(
                    "Unable to handoff: compaction failed".into(),
                ));
            }
        }

        let message = Message::user(ctx.session_id.clone(), &to, model);
        self.ctx.create_message(&message).await?;
        let note = Part::synthetic_text(
            ctx.session_id.clone(),
            message.id.clone(),
            format!("Handoff from @{from} to @{to}.\nObjective: {}", input.description),
        );
        self.ctx.save_part(&note, None).await?;

        let _ = self.ctx.emitter.emit(LoomEvent::AgentSwitched {
            base: BaseEvent::now(&ctx.session_id),
            from: from.clone(),
            to: to.clone(),
        });
        info!(from = %from, to = %to, "handed off");

        Ok(TaskResult {
            title: input.description.clone(),
            output: format!("<handoff_result>\nHanded off to @{to}\n</handoff_result>"),
            metadata: json!({
                "switched": true,
                "from": from,
                "to": to,
                "session_id": ctx.session_id,
            }),
            session_id: ctx.session_id.clone(),
        })
    }

    async fn subtask(
        &self,
        input: &TaskInput,
        ctx: &TaskContext,
        target: &AgentInfo,
        model: ModelRef,
    ) -> Result<TaskResult, RuntimeError> {
        let prompt = input
            .prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| RuntimeError::InvalidRequest("subtask requires a prompt".into()))?;

        if !input.bypass_agent_check {
            let ask = AskInput::new(
                ctx.session_id.clone(),
                "task",
                vec![target.name.clone()],
            )
            .with_ruleset(self.caller_rules(ctx).await?)
            .with_always(vec!["*".to_string()])
            .with_agent(ctx.agent.as_str())
            .with_metadata("description", input.description.as_str())
            .with_metadata("subagent_type", target.name.as_str());
            self.ctx.permissions.ask(ask, &ctx.cancel).await?;
        }

        let can_delegate = mentions("task", &target.permission);
        let primary_tools = &self.ctx.settings.experimental.primary_tools;
        let child = self
            .child_session(input, ctx, target, can_delegate, primary_tools)
            .await?;

        let mut tools = IndexMap::new();
        let _ = tools.insert("todowrite".to_string(), false);
        let _ = tools.insert("todoread".to_string(), false);
        if !can_delegate {
            let _ = tools.insert("task".to_string(), false);
        }
        for tool in primary_tools {
            let _ = tools.insert(tool.clone(), false);
        }

        let _ = self.ctx.emitter.emit(LoomEvent::TaskStarted {
            base: BaseEvent::now(&ctx.session_id),
            child_session_id: child.id.clone(),
            agent: target.name.clone(),
            description: input.description.clone(),
        });

        let result = {
            let _listener = AbortListener::spawn(
                Arc::clone(&self.prompt),
                ctx.cancel.clone(),
                child.id.clone(),
            );
            self.prompt
                .prompt(
                    PromptInput::new(child.id.clone(), target.name.as_str(), prompt)
                        .with_model(model)
                        .with_tools(tools),
                )
                .await
        };

        let _ = self.ctx.emitter.emit(LoomEvent::TaskCompleted {
            base: BaseEvent::now(&ctx.session_id),
            child_session_id: child.id.clone(),
        });
        let reply = result?;

        let text = reply
            .parts
            .iter()
            .rev()
            .find_map(|p| p.as_text())
            .map(|t| t.text.clone())
            .unwrap_or_default();
        debug!(child_session_id = %child.id, "subtask finished");

        Ok(TaskResult {
            title: input.description.clone(),
            output: format!(
                "task_id: {} (for resuming to continue this task if needed)\n\n<task_result>\n{text}\n</task_result>",
                child.id
            ),
            metadata: json!({
                "session_id": child.id,
                "agent": target.name,
            }),
            session_id: child.id,
        })
    }

    async fn child_session(
        &self,
        input: &TaskInput,
        ctx: &TaskContext,
        target: &AgentInfo,
        can_delegate: bool,
        primary_tools: &[String],
    ) -> Result<Session, RuntimeError> {
        if let Some(task_id) = &input.task_id {
            match self.ctx.store.get_session(&SessionId::from(task_id.as_str())).await {
                Ok(session) => {
                    debug!(child_session_id = %session.id, "resuming subtask session");
                    return Ok(session);
                }
                Err(e) => warn!(task_id = %task_id, error = %e, "task session not found, starting new"),
            }
        }

        let mut rules = vec![
            PermissionRule::new("todowrite", "*", PermissionAction::Deny),
            PermissionRule::new("todoread", "*", PermissionAction::Deny),
        ];
        if !can_delegate {
            rules.push(PermissionRule::new("task", "*", PermissionAction::Deny));
        }
        rules.extend(
            primary_tools
                .iter()
                .map(|tool| PermissionRule::new(tool.as_str(), "*", PermissionAction::Allow)),
        );

        let session = Session::child(
            ctx.session_id.clone(),
            format!("{} (@{} agent)", input.description, target.name),
            rules,
        );
        Ok(self.ctx.store.create_session(session).await?)
    }
}
