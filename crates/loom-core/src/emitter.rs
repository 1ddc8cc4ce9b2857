//! Fan-out of [`LoomEvent`]s to UI and tooling subscribers.
//!
//! Events are published after the store write they describe, so a
//! subscriber that reads the store on receipt sees at least that state.
//! Publishing never waits on subscribers.

use tokio::sync::broadcast;

use crate::events::LoomEvent;
use crate::ids::SessionId;

/// Events buffered per subscriber before it starts lagging.
const BUFFERED_EVENTS: usize = 1024;

/// Publishes runtime events to any number of subscribers.
///
/// A subscriber that falls more than the buffer behind receives
/// `RecvError::Lagged` and resumes from the oldest retained event.
pub struct EventEmitter {
    tx: broadcast::Sender<LoomEvent>,
}

impl EventEmitter {
    /// Emitter with the default buffer.
    pub fn new() -> Self {
        Self::with_capacity(BUFFERED_EVENTS)
    }

    /// Emitter buffering `capacity` events per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish `event`. Returns how many subscribers it reached.
    pub fn emit(&self, event: LoomEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LoomEvent> {
        self.tx.subscribe()
    }

    /// Receive events published from now on for `session_id` only.
    pub fn subscribe_session(&self, session_id: SessionId) -> SessionEvents {
        SessionEvents {
            rx: self.tx.subscribe(),
            session_id,
        }
    }

    /// Live subscriber count.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscription filtered to one session.
pub struct SessionEvents {
    rx: broadcast::Receiver<LoomEvent>,
    session_id: SessionId,
}

impl SessionEvents {
    /// Next event of this session, skipping other sessions' events.
    ///
    /// Returns `None` once the emitter is gone. Lagging skips the lost
    /// events and keeps going.
    pub async fn next(&mut self) -> Option<LoomEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.session_id() == &self.session_id => return Some(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
