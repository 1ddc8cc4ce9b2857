#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use loom_core::{
    AgentInfo, BridgeEvent, Message, MessageWithParts, ModelRef, Part, Session, SessionId,
};
use loom_runtime::{
    Bridge, BridgeError, BridgeEventStream, BridgeRequest, MemorySessionStore, Patch,
    RuntimeContext, Snapshot, ToolDecision,
};
use loom_settings::LoomSettings;
use parking_lot::Mutex;
use serde_json::Value;

/// One step of a scripted bridge turn.
#[derive(Clone, Debug)]
pub enum Step {
    Emit(BridgeEvent),
    /// Ask the turn's authorizer about a tool call and record the decision.
    Authorize(String, Value),
    /// Block until the turn is cancelled.
    WaitCancel,
    /// Cancel the turn and keep playing.
    Cancel,
    Fail(String),
}

pub fn emit(event: BridgeEvent) -> Step {
    Step::Emit(event)
}

pub fn text(s: &str) -> Step {
    emit(BridgeEvent::TextDelta { text: s.into() })
}

pub fn step_start() -> Step {
    emit(BridgeEvent::StepStart)
}

pub fn step_end() -> Step {
    emit(BridgeEvent::StepEnd)
}

pub fn done(handle: Option<&str>) -> Step {
    emit(BridgeEvent::Done {
        provider_session_handle: handle.map(String::from),
    })
}

/// A full turn answering with `reply`.
pub fn reply(reply: &str) -> Vec<Step> {
    vec![step_start(), text(reply), step_end(), done(None)]
}

/// Bridge that plays back one script per `stream` call.
#[derive(Default)]
pub struct ScriptedBridge {
    scripts: Mutex<VecDeque<Vec<Step>>>,
    pub requests: Mutex<Vec<BridgeRequest>>,
    pub decisions: Arc<Mutex<Vec<ToolDecision>>>,
}

impl ScriptedBridge {
    pub fn new(scripts: Vec<Vec<Step>>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            ..Self::default()
        })
    }

    pub fn push(&self, script: Vec<Step>) {
        self.scripts.lock().push_back(script);
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn last_request(&self) -> BridgeRequest {
        self.requests.lock().last().cloned().expect("no bridge request")
    }
}

#[async_trait]
impl Bridge for ScriptedBridge {
    async fn stream(&self, request: BridgeRequest) -> Result<BridgeEventStream, BridgeError> {
        let steps = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| reply("ok"));
        let authorizer = Arc::clone(&request.authorizer);
        let cancel = request.cancel.clone();
        let decisions = Arc::clone(&self.decisions);
        self.requests.lock().push(request);

        let stream = async_stream::stream! {
            for step in steps {
                match step {
                    Step::Emit(event) => yield Ok(event),
                    Step::Authorize(tool, input) => {
                        let decision = authorizer.authorize_tool(&tool, &input).await;
                        decisions.lock().push(decision);
                    }
                    Step::WaitCancel => {
                        cancel.cancelled().await;
                        yield Err(BridgeError::Cancelled);
                    }
                    Step::Cancel => cancel.cancel(),
                    Step::Fail(message) => yield Err(BridgeError::Failed(message)),
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

/// Snapshot that hands out sequential hashes and reports fixed files.
#[derive(Default)]
pub struct RecordingSnapshot {
    pub files: Vec<String>,
    pub tracked: Mutex<u32>,
}

#[async_trait]
impl Snapshot for RecordingSnapshot {
    async fn track(&self) -> Option<String> {
        let mut n = self.tracked.lock();
        *n += 1;
        Some(format!("snap{n}"))
    }

    async fn patch(&self, hash: &str) -> Patch {
        Patch {
            hash: hash.to_string(),
            files: self.files.clone(),
        }
    }
}

pub struct Harness {
    pub ctx: RuntimeContext,
    pub bridge: Arc<ScriptedBridge>,
    pub store: Arc<MemorySessionStore>,
}

pub fn model() -> ModelRef {
    ModelRef::new("claude-code", "sonnet")
}

pub fn harness(settings: LoomSettings, scripts: Vec<Vec<Step>>) -> Harness {
    let bridge = ScriptedBridge::new(scripts);
    let store = Arc::new(MemorySessionStore::new());
    let ctx = RuntimeContext::new(settings, store.clone(), bridge.clone());
    Harness { ctx, bridge, store }
}

impl Harness {
    pub async fn session(&self) -> Session {
        self.ctx
            .store
            .create_session(Session::new("test"))
            .await
            .unwrap()
    }

    pub fn agent(&self, name: &str) -> Arc<AgentInfo> {
        self.ctx.agents.get(name).unwrap()
    }

    pub async fn user_message(&self, session: &SessionId, agent: &str, body: &str) -> Message {
        let message = Message::user(session.clone(), agent, model());
        self.ctx.create_message(&message).await.unwrap();
        let part = Part::text(session.clone(), message.id.clone(), body);
        self.ctx.save_part(&part, None).await.unwrap();
        message
    }

    pub async fn assistant_message(&self, parent: &Message, agent: &str) -> Message {
        let message = Message::assistant(
            parent.session_id.clone(),
            parent.id.clone(),
            agent,
            model(),
        );
        self.ctx.create_message(&message).await.unwrap();
        message
    }

    pub async fn history(&self, session: &SessionId) -> Vec<MessageWithParts> {
        self.ctx.store.messages(session).await.unwrap()
    }
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}

/// `n` words of filler text.
pub fn words(n: usize) -> String {
    vec!["word"; n].join(" ")
}
