//! Session store collaborator.
//!
//! The runtime writes every session, message, and part through
//! [`SessionStore`]. Writes are assumed atomic per call and ordered per
//! session. [`MemorySessionStore`] is a concurrent in-memory backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;
use loom_core::{Message, MessageId, MessageWithParts, Part, PartId, Session, SessionId};

use crate::errors::StoreError;

/// Persistence boundary for the conversation tree.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new session.
    async fn create_session(&self, session: Session) -> Result<Session, StoreError>;

    /// Fetch a session.
    async fn get_session(&self, id: &SessionId) -> Result<Session, StoreError>;

    /// Replace a session record (last writer wins).
    async fn update_session(&self, session: Session) -> Result<Session, StoreError>;

    /// Insert a new message.
    async fn create_message(&self, message: Message) -> Result<Message, StoreError>;

    /// Replace a message record.
    async fn update_message(&self, message: Message) -> Result<Message, StoreError>;

    /// Fetch a message with its parts.
    async fn get_message(
        &self,
        session_id: &SessionId,
        id: &MessageId,
    ) -> Result<MessageWithParts, StoreError>;

    /// All messages of a session in ID order, each with its parts.
    async fn messages(&self, session_id: &SessionId) -> Result<Vec<MessageWithParts>, StoreError>;

    /// Insert a new part.
    async fn create_part(&self, part: Part) -> Result<Part, StoreError>;

    /// Upsert a part by ID.
    async fn update_part(&self, part: Part) -> Result<Part, StoreError>;

    /// Parts of one message in ID order.
    async fn parts(
        &self,
        session_id: &SessionId,
        message_id: &MessageId,
    ) -> Result<Vec<Part>, StoreError> {
        Ok(self.get_message(session_id, message_id).await?.parts)
    }
}

struct MessageEntry {
    info: Message,
    parts: BTreeMap<PartId, Part>,
}

struct SessionEntry {
    session: Session,
    messages: BTreeMap<MessageId, MessageEntry>,
}

/// In-memory [`SessionStore`].
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<SessionId, SessionEntry>,
}

impl MemorySessionStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Child sessions of `parent`.
    pub fn children(&self, parent: &SessionId) -> Vec<Session> {
        let mut children: Vec<Session> = self
            .sessions
            .iter()
            .filter(|e| e.session.parent_id.as_ref() == Some(parent))
            .map(|e| e.session.clone())
            .collect();
        children.sort_by(|a, b| a.id.cmp(&b.id));
        children
    }

    fn upsert_part(&self, part: Part, must_exist: bool) -> Result<Part, StoreError> {
        let mut entry = self
            .sessions
            .get_mut(&part.session_id)
            .ok_or_else(|| StoreError::SessionNotFound(part.session_id.clone()))?;
        let message = entry
            .messages
            .get_mut(&part.message_id)
            .ok_or_else(|| StoreError::MessageNotFound(part.message_id.clone()))?;
        if must_exist && message.parts.contains_key(&part.id) {
            return Err(StoreError::Backend(format!("duplicate part id {}", part.id)));
        }
        let _ = message.parts.insert(part.id.clone(), part.clone());
        Ok(part)
    }
}

fn snapshot(entry: &MessageEntry) -> MessageWithParts {
    MessageWithParts {
        info: entry.info.clone(),
        parts: entry.parts.values().cloned().collect(),
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, session: Session) -> Result<Session, StoreError> {
        if self.sessions.contains_key(&session.id) {
            return Err(StoreError::Backend(format!("duplicate session id {}", session.id)));
        }
        let _ = self.sessions.insert(
            session.id.clone(),
            SessionEntry {
                session: session.clone(),
                messages: BTreeMap::new(),
            },
        );
        Ok(session)
    }

    async fn get_session(&self, id: &SessionId) -> Result<Session, StoreError> {
        self.sessions
            .get(id)
            .map(|e| e.session.clone())
            .ok_or_else(|| StoreError::SessionNotFound(id.clone()))
    }

    async fn update_session(&self, mut session: Session) -> Result<Session, StoreError> {
        let mut entry = self
            .sessions
            .get_mut(&session.id)
            .ok_or_else(|| StoreError::SessionNotFound(session.id.clone()))?;
        session.time.updated = loom_core::time::now_ms();
        entry.session = session.clone();
        Ok(session)
    }

    async fn create_message(&self, message: Message) -> Result<Message, StoreError> {
        let mut entry = self
            .sessions
            .get_mut(&message.session_id)
            .ok_or_else(|| StoreError::SessionNotFound(message.session_id.clone()))?;
        if entry.messages.contains_key(&message.id) {
            return Err(StoreError::Backend(format!("duplicate message id {}", message.id)));
        }
        let _ = entry.messages.insert(
            message.id.clone(),
            MessageEntry {
                info: message.clone(),
                parts: BTreeMap::new(),
            },
        );
        Ok(message)
    }

    async fn update_message(&self, message: Message) -> Result<Message, StoreError> {
        let mut entry = self
            .sessions
            .get_mut(&message.session_id)
            .ok_or_else(|| StoreError::SessionNotFound(message.session_id.clone()))?;
        let existing = entry
            .messages
            .get_mut(&message.id)
            .ok_or_else(|| StoreError::MessageNotFound(message.id.clone()))?;
        existing.info = message.clone();
        Ok(message)
    }

    async fn get_message(
        &self,
        session_id: &SessionId,
        id: &MessageId,
    ) -> Result<MessageWithParts, StoreError> {
        let entry = self
            .sessions
            .get(session_id)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.clone()))?;
        entry
            .messages
            .get(id)
            .map(snapshot)
            .ok_or_else(|| StoreError::MessageNotFound(id.clone()))
    }

    async fn messages(&self, session_id: &SessionId) -> Result<Vec<MessageWithParts>, StoreError> {
        let entry = self
            .sessions
            .get(session_id)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.clone()))?;
        Ok(entry.messages.values().map(snapshot).collect())
    }

    async fn create_part(&self, part: Part) -> Result<Part, StoreError> {
        self.upsert_part(part, true)
    }

    async fn update_part(&self, part: Part) -> Result<Part, StoreError> {
        self.upsert_part(part, false)
    }
}
