//! Status records shared by nodes and containers.
//!
//! A status record is the mutable, observed side of an entity: its
//! lifecycle state, timestamps, and the reason/message/error of the last
//! change. States only move forward (`Unknown → Created → Running →
//! Exited`); `Exited` is terminal.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};

/// Lifecycle state of a node or container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    #[default]
    Unknown,
    Created,
    Running,
    Exited,
}

impl State {
    fn rank(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Created => 1,
            Self::Running => 2,
            Self::Exited => 3,
        }
    }

    /// Whether the entity shows up in filtered (`all = false`) listings.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Created | Self::Running)
    }

    /// Whether `next` is a legal forward move from this state.
    pub fn can_transition_to(self, next: State) -> bool {
        next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Created => "created",
            Self::Running => "running",
            Self::Exited => "exited",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed status shared by `NodeStatus` and `ContainerStatus`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub state: State,
    /// Unix timestamp (seconds) when the record was created.
    pub created_at: u64,
    /// Unix timestamp of the transition into `Running`.
    pub started_at: Option<u64>,
    /// Unix timestamp of the transition into `Exited`.
    pub finished_at: Option<u64>,
    /// Short machine-friendly reason for the current state.
    pub reason: String,
    /// Free-form detail (e.g. drift description).
    pub message: String,
    /// Last error observed for this entity.
    pub error: Option<String>,
}

impl StatusRecord {
    /// A fresh record in `Unknown` with the given reason.
    pub fn new(reason: &str) -> Self {
        Self {
            state: State::Unknown,
            created_at: epoch_secs(),
            started_at: None,
            finished_at: None,
            reason: reason.to_string(),
            message: String::new(),
            error: None,
        }
    }

    /// Move to `next`, stamping `started_at`/`finished_at` as appropriate.
    ///
    /// A successful transition clears the last error.
    pub fn transition(&mut self, next: State, reason: &str) -> StateResult<()> {
        self.transition_at(next, reason, epoch_secs())
    }

    /// Like [`transition`](Self::transition) with an explicit timestamp.
    pub fn transition_at(&mut self, next: State, reason: &str, at: u64) -> StateResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(StateError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        match next {
            State::Running => self.started_at = Some(at),
            State::Exited => self.finished_at = Some(at),
            State::Unknown | State::Created => {}
        }
        self.state = next;
        self.reason = reason.to_string();
        self.error = None;
        Ok(())
    }

    /// Record a failed transition without changing state.
    pub fn record_failure(&mut self, reason: &str, error: impl fmt::Display) {
        self.reason = reason.to_string();
        self.error = Some(error.to_string());
    }
}

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_is_unknown() {
        let record = StatusRecord::new("created");
        assert_eq!(record.state, State::Unknown);
        assert_eq!(record.reason, "created");
        assert!(record.started_at.is_none());
        assert!(record.finished_at.is_none());
        assert!(record.error.is_none());
        // Should be after 2024-01-01.
        assert!(record.created_at > 1_704_067_200);
    }

    #[test]
    fn forward_transitions_stamp_times() {
        let mut record = StatusRecord::new("created");
        record.transition_at(State::Running, "started", 100).unwrap();
        assert_eq!(record.state, State::Running);
        assert_eq!(record.started_at, Some(100));

        record.transition_at(State::Exited, "stopped", 200).unwrap();
        assert_eq!(record.state, State::Exited);
        assert_eq!(record.started_at, Some(100));
        assert_eq!(record.finished_at, Some(200));
    }

    #[test]
    fn exited_is_terminal() {
        let mut record = StatusRecord::new("created");
        record.transition(State::Exited, "stopped").unwrap();

        for next in [State::Unknown, State::Created, State::Running, State::Exited] {
            let err = record.transition(next, "again").unwrap_err();
            assert_eq!(
                err,
                StateError::IllegalTransition {
                    from: State::Exited,
                    to: next,
                }
            );
        }
        assert_eq!(record.reason, "stopped");
    }

    #[test]
    fn same_state_is_not_a_transition() {
        let mut record = StatusRecord::new("created");
        record.transition(State::Running, "started").unwrap();
        assert!(record.transition(State::Running, "started").is_err());
    }

    #[test]
    fn failure_keeps_state_and_transition_clears_error() {
        let mut record = StatusRecord::new("created");
        record.record_failure("run failed", "image pull refused");
        assert_eq!(record.state, State::Unknown);
        assert_eq!(record.reason, "run failed");
        assert_eq!(record.error.as_deref(), Some("image pull refused"));

        record.transition(State::Running, "started").unwrap();
        assert!(record.error.is_none());
    }

    #[test]
    fn live_states() {
        assert!(!State::Unknown.is_live());
        assert!(State::Created.is_live());
        assert!(State::Running.is_live());
        assert!(!State::Exited.is_live());
    }

    #[test]
    fn state_serializes_snake_case() {
        let json = serde_json::to_string(&State::Running).unwrap();
        assert_eq!(json, "\"running\"");
        assert_eq!(State::Exited.to_string(), "exited");
    }
}
