//! The conversation history of a single session.

use std::collections::VecDeque;
use std::fmt;
use std::num::NonZeroUsize;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies a user session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        SessionId(value.to_string())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        SessionId(value)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let SessionId(id) = self;
        write!(f, "{id}")
    }
}

/// Identifies a turn within one conversation. Ids increase monotonically and
/// are never reused, even after the turn has been evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Pending,
    Answered,
    Rejected,
    Failed,
    Cancelled,
}

/// One question asked in a session, and what became of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub id: TurnId,
    pub user_text: String,
    pub generated_sql: Option<String>,
    pub status: TurnStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
}

/// What the user thought of a turn's answer. Later feedback replaces earlier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub helpful: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextSummary {
    pub session_id: SessionId,
    pub latest_turn: Option<TurnId>,
    pub turn_count: usize,
    pub window: usize,
    pub last_updated: DateTime<Utc>,
}

/// The last `window` turns of a session, oldest first.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    session_id: SessionId,
    window: NonZeroUsize,
    turns: VecDeque<Turn>,
    next_turn: u64,
    last_updated: DateTime<Utc>,
}

impl ConversationContext {
    pub fn new(session_id: SessionId, window: NonZeroUsize) -> Self {
        ConversationContext {
            session_id,
            window,
            turns: VecDeque::with_capacity(window.get()),
            next_turn: 0,
            last_updated: Utc::now(),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Append a new pending turn, evicting the oldest turns beyond the window.
    pub fn append(&mut self, user_text: impl Into<String>) -> ContextSummary {
        let id = TurnId(self.next_turn);
        self.next_turn += 1;
        self.last_updated = Utc::now();
        self.turns.push_back(Turn {
            id,
            user_text: user_text.into(),
            generated_sql: None,
            status: TurnStatus::Pending,
            timestamp: self.last_updated,
            feedback: None,
        });
        while self.turns.len() > self.window.get() {
            if let Some(evicted) = self.turns.pop_front() {
                tracing::debug!(session = %self.session_id, turn = evicted.id.0, "evicted turn");
            }
        }
        self.summary()
    }

    /// Record the generated SQL and final status of a turn.
    ///
    /// Returns `false` when the turn has already left the window.
    pub fn record_outcome(
        &mut self,
        turn: TurnId,
        generated_sql: Option<String>,
        status: TurnStatus,
    ) -> bool {
        match self.turns.iter_mut().find(|t| t.id == turn) {
            Some(t) => {
                if generated_sql.is_some() {
                    t.generated_sql = generated_sql;
                }
                t.status = status;
                self.last_updated = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Attach the user's verdict to a turn that has finished.
    ///
    /// Returns `false` when the turn has left the window or is still pending.
    pub fn record_feedback(
        &mut self,
        turn: TurnId,
        helpful: bool,
        comment: Option<String>,
    ) -> bool {
        let Some(t) = self
            .turns
            .iter_mut()
            .find(|t| t.id == turn && t.status != TurnStatus::Pending)
        else {
            return false;
        };
        tracing::info!(session = %self.session_id, turn = turn.0, helpful, "feedback recorded");
        t.feedback = Some(Feedback {
            helpful,
            comment,
            timestamp: Utc::now(),
        });
        true
    }

    /// All turns in the window, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Turn> + '_ {
        self.turns.iter()
    }

    /// The turns that came before `turn`, oldest first.
    pub fn history_before(&self, turn: TurnId) -> impl Iterator<Item = &Turn> + '_ {
        self.turns.iter().filter(move |t| t.id < turn)
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Has nothing happened in this session for longer than `idle_timeout`?
    pub fn is_idle(&self, now: DateTime<Utc>, idle_timeout: Duration) -> bool {
        (now - self.last_updated)
            .to_std()
            .map_or(false, |elapsed| elapsed > idle_timeout)
    }

    pub fn summary(&self) -> ContextSummary {
        ContextSummary {
            session_id: self.session_id.clone(),
            latest_turn: self.turns.back().map(|t| t.id),
            turn_count: self.turns.len(),
            window: self.window.get(),
            last_updated: self.last_updated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    fn context(window: usize) -> ConversationContext {
        ConversationContext::new(
            SessionId::from("session"),
            NonZeroUsize::new(window).unwrap(),
        )
    }

    #[test]
    fn appending_past_the_window_evicts_oldest_first() {
        for window in 1..=6 {
            let mut ctx = context(window);
            for i in 0..=window {
                ctx.append(format!("question {i}"));
            }
            assert_eq!(ctx.len(), window);
            let texts: Vec<String> = ctx.history().map(|t| t.user_text.clone()).collect();
            let expected: Vec<String> = (1..=window).map(|i| format!("question {i}")).collect();
            assert_eq!(texts, expected);
        }
    }

    #[test]
    fn summary_reports_latest_turn() {
        let mut ctx = context(3);
        ctx.append("first");
        let summary = ctx.append("second");
        assert_eq!(summary.latest_turn, Some(TurnId(1)));
        assert_eq!(summary.turn_count, 2);
        assert_eq!(summary.window, 3);
    }

    #[test]
    fn outcome_of_evicted_turn_is_not_recorded() {
        let mut ctx = context(1);
        ctx.append("first");
        ctx.append("second");
        assert!(!ctx.record_outcome(TurnId(0), Some("SELECT 1".into()), TurnStatus::Answered));
        assert!(ctx.record_outcome(TurnId(1), Some("SELECT 2".into()), TurnStatus::Answered));

        let turn = ctx.history().next().unwrap();
        assert_eq!(turn.generated_sql.as_deref(), Some("SELECT 2"));
        assert_eq!(turn.status, TurnStatus::Answered);
    }

    #[test]
    fn feedback_is_kept_on_finished_turns_only() {
        let mut ctx = context(2);
        ctx.append("first");
        ctx.append("second");
        ctx.append("third");
        ctx.record_outcome(TurnId(1), Some("SELECT 1".into()), TurnStatus::Answered);

        assert!(!ctx.record_feedback(TurnId(0), true, None));
        assert!(!ctx.record_feedback(TurnId(2), true, None));
        assert!(ctx.record_feedback(TurnId(1), true, None));
        assert!(ctx.record_feedback(TurnId(1), false, Some("wrong store".into())));

        let feedback = ctx.history().next().unwrap().feedback.clone().unwrap();
        assert!(!feedback.helpful);
        assert_eq!(feedback.comment.as_deref(), Some("wrong store"));
        assert_eq!(ctx.history().nth(1).unwrap().feedback, None);
    }

    #[test]
    fn history_before_excludes_current_turn() {
        let mut ctx = context(5);
        ctx.append("first");
        ctx.append("second");
        let current = ctx.append("third").latest_turn.unwrap();
        let previous: Vec<&str> = ctx
            .history_before(current)
            .map(|t| t.user_text.as_str())
            .collect();
        assert_eq!(previous, vec!["first", "second"]);
    }

    #[test]
    fn idle_is_measured_from_last_update() {
        let ctx = context(2);
        let now = ctx.last_updated() + chrono::Duration::seconds(61);
        assert!(ctx.is_idle(now, Duration::from_secs(60)));
        assert!(!ctx.is_idle(now, Duration::from_secs(120)));
    }
}
