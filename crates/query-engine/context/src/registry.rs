//! Creation and teardown of per-session contexts.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::conversation::{ConversationContext, SessionId};

/// Exclusive access to one session's context. Holding the lock for the length
/// of a request keeps the stages of that session sequential.
pub type SessionHandle = Arc<Mutex<ConversationContext>>;

/// The live sessions.
#[derive(Debug)]
pub struct SessionRegistry {
    window: NonZeroUsize,
    idle_timeout: Duration,
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(window: NonZeroUsize, idle_timeout: Duration) -> Self {
        SessionRegistry {
            window,
            idle_timeout,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Get the context of a session, creating it on first use.
    pub async fn open(&self, session_id: &SessionId) -> SessionHandle {
        if let Some(handle) = self.get(session_id).await {
            return handle;
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.clone())
            .or_insert_with(|| {
                tracing::info!(session = %session_id, "opening session");
                Arc::new(Mutex::new(ConversationContext::new(
                    session_id.clone(),
                    self.window,
                )))
            })
            .clone()
    }

    pub async fn get(&self, session_id: &SessionId) -> Option<SessionHandle> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Destroy a session's context. Returns whether the session existed.
    pub async fn close(&self, session_id: &SessionId) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            tracing::info!(session = %session_id, "closed session");
        }
        removed
    }

    /// Destroy every context that has been idle for longer than the idle
    /// timeout. Sessions with a request in flight are left alone.
    pub async fn sweep_idle(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|session_id, handle| match handle.try_lock() {
            Ok(context) => {
                let idle = context.is_idle(now, self.idle_timeout);
                if idle {
                    tracing::info!(session = %session_id, "expiring idle session");
                }
                !idle
            }
            Err(_) => true,
        });
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
