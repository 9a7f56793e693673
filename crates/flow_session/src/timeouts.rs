//! Per-session naming timers
//!
//! Timers are keyed by `(session_id, TimerKind)`; arming a key supersedes the
//! timer already armed under it. A fired timer does not act on its own: it
//! hands its id back to a [`TimeoutHandler`], which must confirm with
//! [`TimeoutCoordinator::take_if_current`] that the id is still live before
//! touching the session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// The two timers a session can have armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// Fires when the user leaves a naming prompt unanswered.
    NameResponse,
    /// Fires when a suggested name has not been confirmed or rejected.
    SuggestionAutoProceed,
}

impl TimerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NameResponse => "name_response",
            Self::SuggestionAutoProceed => "suggestion_auto_proceed",
        }
    }
}

/// Receiver of fired timers.
#[async_trait]
pub trait TimeoutHandler: Send + Sync {
    async fn on_timeout(&self, session_id: &str, kind: TimerKind, timer_id: u64);
}

struct ArmedTimer {
    id: u64,
    cancel: CancellationToken,
}

/// Delay queue for naming timers.
pub struct TimeoutCoordinator {
    timers: DashMap<(String, TimerKind), ArmedTimer>,
    next_id: AtomicU64,
}

impl Default for TimeoutCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeoutCoordinator {
    pub fn new() -> Self {
        Self {
            timers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Arm `kind` for `session_id`, cancelling any timer of the same kind.
    ///
    /// Must be called from within a tokio runtime. Returns the new timer id.
    pub fn arm(
        &self,
        session_id: &str,
        kind: TimerKind,
        delay: Duration,
        handler: Weak<dyn TimeoutHandler>,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();

        let previous = self.timers.insert(
            (session_id.to_string(), kind),
            ArmedTimer {
                id,
                cancel: token.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.cancel.cancel();
            debug!(
                "Timer {} ({}) for session {} superseded by {}",
                previous.id,
                kind.as_str(),
                session_id,
                id
            );
        }

        let session_id = session_id.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Some(handler) = handler.upgrade() {
                        handler.on_timeout(&session_id, kind, id).await;
                    }
                }
            }
        });

        id
    }

    /// Cancel the timer of `kind` for `session_id`. Returns whether one was armed.
    pub fn cancel(&self, session_id: &str, kind: TimerKind) -> bool {
        match self.timers.remove(&(session_id.to_string(), kind)) {
            Some((_, timer)) => {
                timer.cancel.cancel();
                debug!(
                    "Timer {} ({}) for session {} cancelled",
                    timer.id,
                    kind.as_str(),
                    session_id
                );
                true
            }
            None => false,
        }
    }

    /// Cancel both naming timers of a session.
    pub fn clear_name_timeout(&self, session_id: &str) {
        self.cancel(session_id, TimerKind::NameResponse);
        self.cancel(session_id, TimerKind::SuggestionAutoProceed);
    }

    /// Cancel every armed timer.
    pub fn cancel_all(&self) {
        for entry in self.timers.iter() {
            entry.value().cancel.cancel();
        }
        self.timers.clear();
    }

    /// Disarm `timer_id` if it is still the live timer; false for stale ids.
    pub fn take_if_current(&self, session_id: &str, kind: TimerKind, timer_id: u64) -> bool {
        self.timers
            .remove_if(&(session_id.to_string(), kind), |_, timer| {
                timer.id == timer_id
            })
            .is_some()
    }

    /// Timer kinds currently armed for a session.
    pub fn pending(&self, session_id: &str) -> Vec<TimerKind> {
        [TimerKind::NameResponse, TimerKind::SuggestionAutoProceed]
            .into_iter()
            .filter(|kind| self.timers.contains_key(&(session_id.to_string(), *kind)))
            .collect()
    }}
