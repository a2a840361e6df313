//! Per-conversation session state.
//!
//! Each session owns its context tracker and response history behind an
//! async mutex, so turns of one conversation run one at a time in arrival
//! order while different conversations proceed independently.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Local, TimeZone};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use parley_core::types::ResponseRecord;
use parley_nlu::ContextTracker;

/// Mutable state touched by a turn.
#[derive(Debug, Default)]
pub struct SessionState {
    pub context: ContextTracker,
    pub responses: Vec<ResponseRecord>,
    /// Row id in the conversation log, assigned on the first persisted turn.
    pub conversation_id: Option<i64>,
}

/// A live conversation.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub started_at: i64,
    last_message_at: AtomicI64,
    turn_count: AtomicU64,
    pub(crate) state: Mutex<SessionState>,
}

impl Session {
    pub fn last_message_at(&self) -> i64 {
        self.last_message_at.load(Ordering::Relaxed)
    }

    pub fn turn_count(&self) -> u64 {
        self.turn_count.load(Ordering::Relaxed)
    }

    /// Mark a completed turn.
    pub(crate) fn touch(&self) {
        self.last_message_at
            .store(Local::now().timestamp(), Ordering::Relaxed);
        self.turn_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            started_at: format_epoch(self.started_at),
            last_message_at: format_epoch(self.last_message_at()),
            turn_count: self.turn_count(),
        }
    }
}

/// Listing entry for a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub started_at: String,
    pub last_message_at: String,
    pub turn_count: u64,
}

/// Creates sessions and decides when they have gone stale.
#[derive(Debug, Clone, Copy)]
pub struct SessionManager {
    /// Session timeout in minutes.
    pub session_timeout_minutes: u32,
}

impl SessionManager {
    pub fn new(session_timeout_minutes: u32) -> Self {
        Self {
            session_timeout_minutes,
        }
    }

    /// Create a fresh session with an empty context.
    pub fn create_session(&self) -> Session {
        let now = Local::now().timestamp();
        Session {
            id: Uuid::new_v4(),
            started_at: now,
            last_message_at: AtomicI64::new(now),
            turn_count: AtomicU64::new(0),
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Check whether a session has been idle longer than the timeout.
    pub fn is_expired(&self, session: &Session) -> bool {
        let now = Local::now().timestamp();
        let timeout_secs = i64::from(self.session_timeout_minutes) * 60;
        now - session.last_message_at() > timeout_secs
    }
}

/// Format epoch seconds as ISO 8601 string.
fn format_epoch(epoch: i64) -> String {
    Local
        .timestamp_opt(epoch, 0)
        .single()
        .map(|dt: DateTime<Local>| dt.to_rfc3339())
        .unwrap_or_else(|| epoch.to_string())
}
