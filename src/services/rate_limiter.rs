//! Fixed-window rate limiter
//!
//! Process-wide admission control for the chat endpoint. A window grants a
//! fixed number of permits; once they are spent, a bounded number of callers
//! wait in arrival order for the next window and everyone else is rejected.

use crate::config::settings::RateLimitConfig;
use crate::services::admission::AdmissionError;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

/// Fixed-window limiter with a FIFO wait queue
#[derive(Debug)]
pub struct FixedWindowLimiter {
    permit_limit: u32,
    window: Duration,
    queue_limit: usize,
    state: Mutex<WindowState>,
}

#[derive(Debug)]
struct WindowState {
    started: Instant,
    used: u32,
    waiters: VecDeque<oneshot::Sender<()>>,
}

impl WindowState {
    /// Start a fresh window if the current one has elapsed, handing its
    /// permits to queued callers first.
    fn roll(&mut self, now: Instant, window: Duration, permit_limit: u32) {
        if now.duration_since(self.started) < window {
            return;
        }

        self.started = now;
        self.used = 0;

        while self.used < permit_limit {
            let Some(waiter) = self.waiters.pop_front() else {
                break;
            };
            // A dropped receiver means the caller gave up; its permit stays free
            if waiter.send(()).is_ok() {
                self.used += 1;
            }
        }
    }
}

impl FixedWindowLimiter {
    pub fn new(permit_limit: u32, window: Duration, queue_limit: usize) -> Self {
        Self {
            permit_limit,
            window,
            queue_limit,
            state: Mutex::new(WindowState {
                started: Instant::now(),
                used: 0,
                waiters: VecDeque::new(),
            }),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.permit_limit,
            Duration::from_secs(config.window_seconds),
            config.queue_limit,
        )
    }

    fn lock(&self) -> MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a permit, waiting for the next window if a queue slot is free
    pub async fn acquire(&self) -> Result<(), AdmissionError> {
        let (mut granted, mut deadline) = {
            let mut state = self.lock();
            state.roll(Instant::now(), self.window, self.permit_limit);
            state.waiters.retain(|waiter| !waiter.is_closed());

            if state.waiters.is_empty() && state.used < self.permit_limit {
                state.used += 1;
                return Ok(());
            }

            if state.waiters.len() >= self.queue_limit {
                debug!(
                    "Chat rate limit exhausted ({} permits, {} queued)",
                    state.used,
                    state.waiters.len()
                );
                return Err(AdmissionError::RateLimited);
            }

            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            debug!("Chat request queued at position {}", state.waiters.len());
            (rx, state.started + self.window)
        };

        loop {
            tokio::select! {
                biased;
                result = &mut granted => {
                    return result.map_err(|_| AdmissionError::RateLimited);
                }
                _ = tokio::time::sleep_until(deadline) => {
                    let mut state = self.lock();
                    state.roll(Instant::now(), self.window, self.permit_limit);
                    deadline = state.started + self.window;
                }
            }
        }
    }

    /// Number of callers currently waiting for the next window
    pub fn queued(&self) -> usize {
        let state = self.lock();
        state.waiters.iter().filter(|waiter| !waiter.is_closed()).count()
    }
}
