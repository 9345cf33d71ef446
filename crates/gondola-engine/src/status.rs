//! Status publisher and dashboard log ring.
//!
//! The publisher is the only writer of the protocol state and active gondola
//! in the read model. Every message it logs goes both to `tracing` and to the
//! bounded ring served to the dashboard.

use std::collections::VecDeque;

use chrono::{DateTime, Local};
use gondola_core::PositionId;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::shared::SharedState;
use crate::state_machine::ProtocolState;

/// One dashboard log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub message: String,
}

/// Bounded log buffer that drops consecutive duplicates.
#[derive(Debug, Clone)]
pub struct LogRing {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a message, evicting the oldest entry when full.
    ///
    /// Returns `false` (and stores nothing) if `message` equals the newest entry.
    pub fn push(&mut self, message: impl Into<String>) -> bool {
        let message = message.into();
        if self
            .entries
            .back()
            .is_some_and(|last| last.message == message)
        {
            return false;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            timestamp: Local::now(),
            message,
        });
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }
}

/// Serializable view of the read model for the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub state: ProtocolState,
    pub webserver_ready: bool,
    pub camera_ok: bool,
    pub last_label: String,
    pub last_confidence: f64,
    pub object_detected: bool,
    pub tool_identified: bool,
    pub detected_label: Option<String>,
    pub current_gondola: Option<PositionId>,
    pub log_len: usize,
}

/// Writes state, active gondola and log lines into the shared read model.
///
/// Only the state machine publishes the protocol state and the active
/// gondola; other holders may log and take snapshots.
///
/// ```
/// use gondola_engine::{SharedState, StatusPublisher};
///
/// let publisher = StatusPublisher::new(SharedState::default());
/// publisher.log("Camera online");
/// assert_eq!(publisher.snapshot().log_len, 1);
/// ```
///
/// ```compile_fail
/// use gondola_engine::{ProtocolState, SharedState, StatusPublisher};
///
/// let publisher = StatusPublisher::new(SharedState::default());
/// publisher.publish_state(ProtocolState::Idle);
/// ```
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    shared: SharedState,
}

impl StatusPublisher {
    pub fn new(shared: SharedState) -> Self {
        Self { shared }
    }

    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    pub(crate) fn publish_state(&self, state: ProtocolState) {
        self.shared.set_state(state);
    }

    /// Set or clear the active gondola highlight.
    pub(crate) fn publish_gondola(&self, position: Option<PositionId>) {
        self.shared.set_current_gondola(position);
        match position {
            Some(position) => self.log(format!("Processing gondola {position}")),
            None => self.log("Gondola finished"),
        }
    }

    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.shared.append_log(message);
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let flags = self.shared.flags();
        let model = self.shared.read_model();
        StatusSnapshot {
            state: model.state,
            webserver_ready: flags.webserver_ready,
            camera_ok: flags.camera_ready,
            last_label: model.last_label,
            last_confidence: model.last_confidence,
            object_detected: flags.object_detected,
            tool_identified: flags.tool_identified,
            detected_label: flags.detected_label,
            current_gondola: model.current_gondola,
            log_len: self.shared.log_len(),
        }
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.shared.logs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_ring_suppresses_consecutive_duplicates() {
        let mut ring = LogRing::new(10);
        assert!(ring.push("a"));
        assert!(!ring.push("a"));
        assert!(ring.push("b"));
        assert!(ring.push("a"));

        let messages: Vec<_> = ring.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["a", "b", "a"]);
    }

    #[test]
    fn test_log_ring_is_bounded() {
        let mut ring = LogRing::new(3);
        for i in 0..5 {
            ring.push(format!("line {i}"));
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.to_vec()[0].message, "line 2");
        assert_eq!(ring.capacity(), 3);
    }

    #[test]
    fn test_log_ring_zero_capacity_keeps_one() {
        let mut ring = LogRing::new(0);
        ring.push("x");
        ring.push("y");
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn test_publish_gondola_logs_and_sets_model() {
        let publisher = StatusPublisher::new(SharedState::default());

        publisher.publish_gondola(Some(73));
        assert_eq!(publisher.snapshot().current_gondola, Some(73));

        publisher.publish_gondola(None);
        let snapshot = publisher.snapshot();
        assert_eq!(snapshot.current_gondola, None);
        assert_eq!(snapshot.log_len, 2);

        let logs = publisher.logs();
        assert_eq!(logs[0].message, "Processing gondola 73");
        assert_eq!(logs[1].message, "Gondola finished");
    }

    #[test]
    fn test_snapshot_reflects_flags() {
        let shared = SharedState::default();
        shared.set_camera_ready(true);
        shared.record_identification("wrench");
        let publisher = StatusPublisher::new(shared);
        publisher.publish_state(ProtocolState::Idle);

        let snapshot = publisher.snapshot();
        assert_eq!(snapshot.state, ProtocolState::Idle);
        assert!(snapshot.camera_ok);
        assert!(snapshot.tool_identified);
        assert_eq!(snapshot.detected_label.as_deref(), Some("wrench"));
    }

    #[test]
    fn test_snapshot_serializes() {
        let publisher = StatusPublisher::new(SharedState::default());
        let json = serde_json::to_value(publisher.snapshot()).unwrap();
        assert_eq!(json["state"], "init");
        assert_eq!(json["current_gondola"], serde_json::Value::Null);
    }
}
