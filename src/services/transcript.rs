//! Session transcripts
//!
//! In-memory chat history keyed by session id, dropped after a period of inactivity

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// Append one line to a newline-joined log
pub fn append_line(existing: &str, line: &str) -> String {
    if existing.is_empty() {
        line.to_string()
    } else {
        format!("{}\n{}", existing, line)
    }
}

#[derive(Debug)]
struct Session {
    transcript: String,
    last_seen: Instant,
}

/// Transcript storage shared by all chat handlers
#[derive(Debug)]
pub struct SessionStore {
    idle_timeout: Duration,
    sessions: Mutex<HashMap<Uuid, Session>>,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Lock the map and drop sessions idle for longer than the timeout
    fn live_sessions(&self) -> MutexGuard<'_, HashMap<Uuid, Session>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let before = sessions.len();
        sessions.retain(|_, session| now.duration_since(session.last_seen) < self.idle_timeout);

        let expired = before - sessions.len();
        if expired > 0 {
            debug!("Expired {} idle chat sessions", expired);
        }
        sessions
    }

    /// Whether `id` names a live session; refreshes its idle timer
    pub fn touch(&self, id: &Uuid) -> bool {
        match self.live_sessions().get_mut(id) {
            Some(session) => {
                session.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Current transcript, empty for unknown sessions
    pub fn history(&self, id: &Uuid) -> String {
        match self.live_sessions().get_mut(id) {
            Some(session) => {
                session.last_seen = Instant::now();
                session.transcript.clone()
            }
            None => String::new(),
        }
    }

    /// Record one message/reply pair followed by a blank separator line
    ///
    /// The first exchange for `id` creates its session.
    pub fn append_exchange(&self, id: Uuid, message: &str, reply: &str) {
        let mut sessions = self.live_sessions();
        let session = sessions.entry(id).or_insert_with(|| Session {
            transcript: String::new(),
            last_seen: Instant::now(),
        });

        let mut transcript = append_line(&session.transcript, &format!("You: {}", message));
        transcript = append_line(&transcript, &format!("AI: {}", reply));
        transcript = append_line(&transcript, "");

        session.transcript = transcript;
        session.last_seen = Instant::now();
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.live_sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
