//! JSON-lines vocabulary of the status endpoint.
//!
//! Every request and every response is one JSON object on one line. Requests
//! are tagged by `cmd`, responses by `kind`.
//!
//! ```text
//! -> {"cmd":"status"}
//! <- {"kind":"status","state":"idle","webserver_ready":true,...}
//! -> {"cmd":"event","event":{"type":"INICIAL"}}
//! <- {"kind":"accepted"}
//! ```

use gondola_core::{FrameObservation, GondolaEntry, PositionId};
use gondola_engine::{LogEntry, RawEvent, StatusSnapshot};
use serde::{Deserialize, Serialize};

/// A request sent by a dashboard or an external driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Request {
    /// Current read model.
    Status,

    /// Dashboard log ring, oldest first. `limit` keeps only the newest entries.
    Logs {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },

    /// Current gondola registry, in matching order.
    Gondolas,

    /// Replace the whole registry.
    SetGondolas { gondolas: Vec<GondolaEntry> },

    /// Enqueue an event for the protocol engine.
    Event { event: RawEvent },

    /// Hand a perception result to the vision bridge.
    Frame { frame: FrameObservation },
}

/// The endpoint's answer to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    Status(StatusSnapshot),
    Logs { entries: Vec<LogEntry> },
    Gondolas { gondolas: Vec<GondolaEntry> },
    GondolasReplaced {
        count: usize,
        duplicates: Vec<PositionId>,
    },
    /// The event or frame was queued.
    Accepted,
    /// The event had no recognised type and was dropped.
    Ignored,
    Error { message: String },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}
