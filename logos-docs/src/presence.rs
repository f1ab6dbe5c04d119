//! Ephemeral cursor presence per document.
//!
//! Presence is never persisted and never enters the operation log.
//! Entries idle for longer than the timeout are hidden at read time
//! (lazy expiry); [`PresenceTracker::cleanup_idle`] drops them for good.
//!
//! Uses `tokio::time::Instant` so tests can drive expiry with a paused clock.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::ids::{now_ms, AgentId};

/// Default idle timeout after which a cursor is no longer reported.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// An agent's last reported cursor.
#[derive(Debug, Clone)]
pub struct PresenceEntry {
    pub agent: AgentId,
    pub line: usize,
    pub column: usize,
    /// Monotonic time of the last update, drives expiry.
    pub updated_at: Instant,
    /// Wall-clock time of the last update, for reporting.
    pub updated_at_ms: u64,
}

impl PresenceEntry {
    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.updated_at)
    }

    /// Idle means strictly older than `timeout`.
    pub fn is_idle(&self, timeout: Duration, now: Instant) -> bool {
        self.age(now) > timeout
    }
}

/// Presence as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceView {
    pub agent_id: AgentId,
    pub line: usize,
    pub column: usize,
    pub age_ms: u64,
    pub updated_at_ms: u64,
}

/// Cursor map of a single document, with its own lock.
pub struct PresenceTracker {
    entries: Mutex<HashMap<AgentId, PresenceEntry>>,
    idle_timeout: Duration,
}

impl PresenceTracker {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Insert or refresh an agent's cursor.
    pub fn update(&self, agent: AgentId, line: usize, column: usize) {
        let entry = PresenceEntry {
            agent: agent.clone(),
            line,
            column,
            updated_at: Instant::now(),
            updated_at_ms: now_ms(),
        };
        self.entries.lock().insert(agent, entry);
    }

    /// Place a cursor at 1:1 unless the agent already has a live one.
    /// Returns whether a cursor was placed.
    pub fn join(&self, agent: &AgentId) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(agent) {
            if !entry.is_idle(self.idle_timeout, now) {
                return false;
            }
        }
        entries.insert(
            agent.clone(),
            PresenceEntry {
                agent: agent.clone(),
                line: 1,
                column: 1,
                updated_at: now,
                updated_at_ms: now_ms(),
            },
        );
        true
    }

    /// Live cursors, sorted by agent.
    pub fn active(&self) -> Vec<PresenceView> {
        let now = Instant::now();
        let entries = self.entries.lock();
        let mut views: Vec<PresenceView> = entries
            .values()
            .filter(|e| !e.is_idle(self.idle_timeout, now))
            .map(|e| PresenceView {
                agent_id: e.agent.clone(),
                line: e.line,
                column: e.column,
                age_ms: e.age(now).as_millis() as u64,
                updated_at_ms: e.updated_at_ms,
            })
            .collect();
        views.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        views
    }

    /// Remove an agent's cursor. Returns whether one was present.
    pub fn remove(&self, agent: &AgentId) -> bool {
        self.entries.lock().remove(agent).is_some()
    }

    /// Drop expired entries, returning the agents removed.
    pub fn cleanup_idle(&self) -> Vec<AgentId> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let stale: Vec<AgentId> = entries
            .values()
            .filter(|e| e.is_idle(self.idle_timeout, now))
            .map(|e| e.agent.clone())
            .collect();
        for agent in &stale {
            entries.remove(agent);
        }
        stale
    }

    /// Stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_TIMEOUT)
    }
}
