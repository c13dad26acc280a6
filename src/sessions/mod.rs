//! Sessions: per-conversation state and the entry point that serializes
//! turns within a session.
//!
//! A [`Session`] owns the context handle, the active-agent pointer and the
//! model-visible history of one conversation. It lives only as long as the
//! conversation; nothing is persisted.
//!
//! [`SessionManager`] maps session ids to sessions. Turns of the same session
//! run one at a time behind a `tokio::sync::Mutex`; different sessions share
//! nothing and run in parallel. Ending a session cancels its in-flight turn
//! and closes its context so late writes are refused.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::context::{AgentContext, ContextHandle};
use crate::items::Message;
use crate::registry::{AgentId, AgentRegistry};
use crate::runner::{Runner, TurnOutcome, TurnResult};

/// Where a session is in its turn cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnState {
    Idle,
    Guarding,
    Acting,
}

/// One conversation.
pub struct Session<C> {
    id: String,
    context: ContextHandle<C>,
    pub(crate) active: AgentId,
    pub(crate) history: Vec<Message>,
    pub(crate) state: TurnState,
    cancel: CancellationToken,
}

impl<C: AgentContext> Session<C> {
    /// Starts on the registry's default agent.
    pub fn new(id: impl Into<String>, registry: &AgentRegistry<C>, context: C) -> Self {
        Self {
            id: id.into(),
            context: ContextHandle::new(context),
            active: registry.default_agent(),
            history: Vec::new(),
            state: TurnState::Idle,
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn context(&self) -> &ContextHandle<C> {
        &self.context
    }

    pub fn active_agent(&self) -> AgentId {
        self.active
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_ended(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancels any in-flight turn and closes the context to writes.
    pub fn end(&self) {
        self.cancel.cancel();
        self.context.close();
    }
}

impl<C> std::fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("active", &self.active)
            .field("history_len", &self.history.len())
            .field("state", &self.state)
            .finish()
    }
}

/// What the caller of [`SessionManager::handle`] gets back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnReply {
    pub response: String,
    pub outcome: TurnOutcome,
    /// Agent active after the turn
    pub agent: String,
}

impl From<TurnResult> for TurnReply {
    fn from(result: TurnResult) -> Self {
        Self {
            response: result.response,
            outcome: result.outcome,
            agent: result.agent,
        }
    }
}

struct SessionSlot<C> {
    session: Arc<Mutex<Session<C>>>,
    cancel: CancellationToken,
    context: ContextHandle<C>,
}

impl<C> Clone for SessionSlot<C> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            cancel: self.cancel.clone(),
            context: self.context.clone(),
        }
    }
}

/// Session-keyed entry point over a [`Runner`].
pub struct SessionManager<C> {
    runner: Runner<C>,
    sessions: RwLock<HashMap<String, SessionSlot<C>>>,
}

impl<C: AgentContext + Default> SessionManager<C> {
    pub fn new(runner: Runner<C>) -> Self {
        Self {
            runner,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn runner(&self) -> &Runner<C> {
        &self.runner
    }

    async fn slot(&self, session_id: &str) -> SessionSlot<C> {
        if let Some(slot) = self.sessions.read().await.get(session_id) {
            return slot.clone();
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                info!(session = %session_id, "Opening session");
                let session = self.runner.new_session(session_id, C::default());
                SessionSlot {
                    cancel: session.cancel_token(),
                    context: session.context().clone(),
                    session: Arc::new(Mutex::new(session)),
                }
            })
            .clone()
    }

    /// Runs one user turn, creating the session on first use.
    pub async fn handle(&self, session_id: &str, message: &str) -> TurnReply {
        self.run(session_id, message).await.into()
    }

    /// Like [`handle`](Self::handle) but returns the full turn record.
    pub async fn run(&self, session_id: &str, message: &str) -> TurnResult {
        let slot = self.slot(session_id).await;
        let mut session = slot.session.lock().await;
        self.runner.run_turn(&mut session, message).await
    }

    /// Ends a session: cancels its in-flight turn, closes its context and
    /// forgets it. Returns `false` for unknown ids.
    pub async fn end_session(&self, session_id: &str) -> bool {
        let Some(slot) = self.sessions.write().await.remove(session_id) else {
            return false;
        };
        slot.cancel.cancel();
        slot.context.close();
        info!(session = %session_id, "Session ended");
        true
    }

    /// Current context of a session, without waiting for an in-flight turn.
    pub async fn context_snapshot(&self, session_id: &str) -> Option<C> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|slot| slot.context.snapshot())
    }

    /// Name of the session's active agent; waits for an in-flight turn.
    pub async fn active_agent(&self, session_id: &str) -> Option<String> {
        let slot = self.sessions.read().await.get(session_id).cloned()?;
        let session = slot.session.lock().await;
        Some(self.runner.registry().name_of(session.active_agent()).to_string())
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }
}
