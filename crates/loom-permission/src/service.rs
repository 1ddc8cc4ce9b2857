//! Interactive permission service.
//!
//! [`PermissionService::ask`] evaluates a request against the caller's
//! ruleset plus the rules the asking agent was approved during this process.
//! If anything needs
//! asking, it parks a [`PermissionRequest`] and waits for
//! [`PermissionService::reply`] or for the turn's cancellation token.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use loom_core::{
    BaseEvent, EventEmitter, LoomEvent, PermissionAction, PermissionReply, PermissionRequest,
    PermissionRequestId, PermissionRule, Ruleset, SessionId,
};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::PermissionError;
use crate::ruleset::{evaluate, merge};

/// Durable storage for rules created by `always`/`always_deny` replies.
#[async_trait]
pub trait RulePersister: Send + Sync {
    /// Append `rule` to the configuration of `agent` (or the global
    /// configuration when `agent` is `None`).
    async fn append_rule(
        &self,
        agent: Option<&str>,
        rule: &PermissionRule,
    ) -> Result<(), PermissionError>;
}

/// Persister that keeps nothing beyond the in-memory approved set.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPersister;

#[async_trait]
impl RulePersister for NoopPersister {
    async fn append_rule(
        &self,
        _agent: Option<&str>,
        _rule: &PermissionRule,
    ) -> Result<(), PermissionError> {
        Ok(())
    }
}

/// Parameters of one permission check.
#[derive(Clone, Debug)]
pub struct AskInput {
    /// Session whose turn is asking.
    pub session_id: SessionId,
    /// Permission kind.
    pub permission: String,
    /// Concrete targets.
    pub patterns: Vec<String>,
    /// Context for the decision UI.
    pub metadata: Map<String, Value>,
    /// Patterns to persist on `always`/`always_deny`. Empty means `*`.
    pub always: Vec<String>,
    /// Caller ruleset (agent rules merged with session rules).
    pub ruleset: Ruleset,
    /// Agent whose configuration receives persisted rules.
    pub agent: Option<String>,
}

impl AskInput {
    /// Check `permission` on `patterns` for `session_id`.
    pub fn new(
        session_id: SessionId,
        permission: impl Into<String>,
        patterns: Vec<String>,
    ) -> Self {
        Self {
            session_id,
            permission: permission.into(),
            patterns,
            metadata: Map::new(),
            always: Vec::new(),
            ruleset: Vec::new(),
            agent: None,
        }
    }

    /// Set the ruleset.
    #[must_use]
    pub fn with_ruleset(mut self, ruleset: Ruleset) -> Self {
        self.ruleset = ruleset;
        self
    }

    /// Set the always-patterns.
    #[must_use]
    pub fn with_always(mut self, always: Vec<String>) -> Self {
        self.always = always;
        self
    }

    /// Add a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        let _ = self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Set the agent.
    #[must_use]
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }
}

struct Pending {
    request: PermissionRequest,
    ruleset: Ruleset,
    agent: Option<String>,
    tx: oneshot::Sender<Result<(), PermissionError>>,
}

type PendingMap = Mutex<IndexMap<PermissionRequestId, Pending>>;

/// Removes a parked request when its `ask` future goes away, whether it
/// resolved, was cancelled or was dropped mid-wait.
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: PermissionRequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.pending.lock().shift_remove(&self.id).is_some() {
            debug!(request_id = %self.id, "permission request dropped before a reply");
        }
    }
}

/// Evaluates permission checks and brokers pending requests.
pub struct PermissionService {
    pending: PendingMap,
    /// Approved rules keyed by agent (`None` for asks without one).
    approved: RwLock<IndexMap<Option<String>, Ruleset>>,
    persister: Arc<dyn RulePersister>,
    emitter: Arc<EventEmitter>,
}

/// Outcome of evaluating every pattern without asking.
#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    Allowed,
    NeedsAsk,
}

fn verdict(
    permission: &str,
    patterns: &[String],
    ruleset: &[PermissionRule],
) -> Result<Verdict, PermissionError> {
    let mut verdict = Verdict::Allowed;
    for pattern in patterns {
        match evaluate(permission, pattern, ruleset) {
            PermissionAction::Deny => {
                return Err(PermissionError::Denied {
                    permission: permission.to_string(),
                    pattern: pattern.clone(),
                });
            }
            PermissionAction::Ask => verdict = Verdict::NeedsAsk,
            PermissionAction::Allow => {}
        }
    }
    Ok(verdict)
}

impl PermissionService {
    /// Create a service publishing on `emitter`.
    pub fn new(persister: Arc<dyn RulePersister>, emitter: Arc<EventEmitter>) -> Self {
        Self {
            pending: Mutex::new(IndexMap::new()),
            approved: RwLock::new(IndexMap::new()),
            persister,
            emitter,
        }
    }

    /// Rules approved for `agent` by `always`/`always_deny` replies so far.
    pub fn approved(&self, agent: Option<&str>) -> Ruleset {
        self.approved
            .read()
            .get(&agent.map(ToString::to_string))
            .cloned()
            .unwrap_or_default()
    }

    /// Pending requests, oldest first.
    pub fn list(&self) -> Vec<PermissionRequest> {
        self.pending.lock().values().map(|p| p.request.clone()).collect()
    }

    /// Number of pending requests.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    fn effective(&self, ruleset: &[PermissionRule], agent: Option<&str>) -> Ruleset {
        merge(&[ruleset, &self.approved(agent)])
    }

    /// Ask for `input.permission` on every pattern.
    ///
    /// Returns immediately when every pattern is allowed, fails with
    /// [`PermissionError::Denied`] when any is denied, and otherwise waits
    /// for a reply. Cancellation of `cancel` abandons the wait with
    /// [`PermissionError::Cancelled`].
    pub async fn ask(
        &self,
        input: AskInput,
        cancel: &CancellationToken,
    ) -> Result<(), PermissionError> {
        let ruleset = self.effective(&input.ruleset, input.agent.as_deref());
        match verdict(&input.permission, &input.patterns, &ruleset) {
            Ok(Verdict::Allowed) => return Ok(()),
            Ok(Verdict::NeedsAsk) => {}
            Err(e) => {
                debug!(
                    session_id = %input.session_id,
                    permission = %input.permission,
                    "permission denied by rule"
                );
                return Err(e);
            }
        }

        let always = if input.always.is_empty() {
            vec!["*".to_string()]
        } else {
            input.always
        };
        let request = PermissionRequest {
            id: PermissionRequestId::new(),
            session_id: input.session_id.clone(),
            permission: input.permission,
            patterns: input.patterns,
            metadata: input.metadata,
            always,
        };
        let id = request.id.clone();
        let (tx, rx) = oneshot::channel();

        let _ = self.pending.lock().insert(
            id.clone(),
            Pending {
                request: request.clone(),
                ruleset: input.ruleset,
                agent: input.agent,
                tx,
            },
        );
        let _guard = PendingGuard {
            pending: &self.pending,
            id: id.clone(),
        };
        info!(
            session_id = %request.session_id,
            request_id = %id,
            permission = %request.permission,
            patterns = ?request.patterns,
            "permission requested"
        );
        let _ = self.emitter.emit(LoomEvent::PermissionAsked {
            base: BaseEvent::now(&request.session_id),
            request,
        });

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(request_id = %id, "permission request abandoned by cancellation");
                Err(PermissionError::Cancelled)
            }
            reply = rx => reply.unwrap_or(Err(PermissionError::Cancelled)),
        }
    }

    /// Resolve a pending request. Returns `false` if `request_id` is unknown.
    pub async fn reply(&self, request_id: &PermissionRequestId, reply: PermissionReply) -> bool {
        let Some(pending) = self.pending.lock().shift_remove(request_id) else {
            warn!(request_id = %request_id, "reply for unknown permission request");
            return false;
        };
        self.emit_replied(&pending.request, reply);

        match reply {
            PermissionReply::Once => {
                let _ = pending.tx.send(Ok(()));
            }
            PermissionReply::Reject => {
                let _ = pending.tx.send(Err(PermissionError::Rejected {
                    request_id: request_id.clone(),
                }));
                let session_id = pending.request.session_id.clone();
                for other in self.take_where(|p| p.request.session_id == session_id) {
                    self.emit_replied(&other.request, PermissionReply::Reject);
                    let _ = other.tx.send(Err(PermissionError::Rejected {
                        request_id: other.request.id.clone(),
                    }));
                }
            }
            PermissionReply::Always => {
                self.remember(&pending, PermissionAction::Allow).await;
                let _ = pending.tx.send(Ok(()));

                let session_id = pending.request.session_id.clone();
                let approved = self.approved(pending.agent.as_deref());
                let unblocked = self.take_where(|p| {
                    let ruleset = merge(&[&p.ruleset, &approved]);
                    p.request.session_id == session_id
                        && p.agent == pending.agent
                        && matches!(
                            verdict(&p.request.permission, &p.request.patterns, &ruleset),
                            Ok(Verdict::Allowed)
                        )
                });
                for other in unblocked {
                    self.emit_replied(&other.request, PermissionReply::Always);
                    let _ = other.tx.send(Ok(()));
                }
            }
            PermissionReply::AlwaysDeny => {
                self.remember(&pending, PermissionAction::Deny).await;
                let _ = pending.tx.send(Err(PermissionError::Rejected {
                    request_id: request_id.clone(),
                }));
            }
        }
        true
    }

    /// Add the request's always-patterns as `action` rules and persist them.
    async fn remember(&self, pending: &Pending, action: PermissionAction) {
        let rules: Vec<PermissionRule> = pending
            .request
            .always
            .iter()
            .map(|pattern| {
                PermissionRule::new(pending.request.permission.as_str(), pattern.as_str(), action)
            })
            .collect();
        self.approved
            .write()
            .entry(pending.agent.clone())
            .or_default()
            .extend(rules.iter().cloned());

        for rule in &rules {
            if let Err(e) = self.persister.append_rule(pending.agent.as_deref(), rule).await {
                warn!(
                    permission = %rule.permission,
                    pattern = %rule.pattern,
                    error = %e,
                    "failed to persist permission rule"
                );
            }
        }
    }

    fn take_where(&self, pred: impl Fn(&Pending) -> bool) -> Vec<Pending> {
        let mut pending = self.pending.lock();
        let ids: Vec<PermissionRequestId> = pending
            .iter()
            .filter(|(_, p)| pred(p))
            .map(|(id, _)| id.clone())
            .collect();
        ids.iter().filter_map(|id| pending.shift_remove(id)).collect()
    }

    fn emit_replied(&self, request: &PermissionRequest, reply: PermissionReply) {
        debug!(request_id = %request.id, ?reply, "permission replied");
        let _ = self.emitter.emit(LoomEvent::PermissionReplied {
            base: BaseEvent::now(&request.session_id),
            request_id: request.id.clone(),
            reply,
        });
    }
}
