//! Shared state between the vision loop, the engine and the status endpoint.
//!
//! [`SharedState`] is a cheap cloneable handle. Flags and the read model sit
//! behind one `parking_lot::Mutex`, the dashboard log ring behind another, and
//! the gondola registry behind an `RwLock` since it is read on every cycle and
//! replaced rarely. Every accessor holds a lock only for the copy or update.

use std::sync::Arc;

use gondola_core::constants::{DEFAULT_LOG_CAPACITY, NO_OBJECT_LABEL};
use gondola_core::{GondolaEntry, PositionId, Result};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::registry::{GondolaRegistry, RegistryReport};
use crate::state_machine::ProtocolState;
use crate::status::{LogEntry, LogRing};

/// Flags written by vision and the engine, read by the engine's guards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SharedFlags {
    pub webserver_ready: bool,
    pub camera_ready: bool,
    pub object_detected: bool,
    pub tool_identified: bool,
    pub detected_label: Option<String>,
}

impl SharedFlags {
    /// Label of the identified tool, if the tool is identified and the label
    /// is not blank.
    pub fn identified_label(&self) -> Option<&str> {
        if !self.tool_identified {
            return None;
        }
        self.detected_label
            .as_deref()
            .map(str::trim)
            .filter(|label| !label.is_empty())
    }
}

/// Dashboard-facing fields. Last write wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadModel {
    pub state: ProtocolState,
    pub last_label: String,
    pub last_confidence: f64,
    pub current_gondola: Option<PositionId>,
}

impl Default for ReadModel {
    fn default() -> Self {
        Self {
            state: ProtocolState::Init,
            last_label: NO_OBJECT_LABEL.to_string(),
            last_confidence: 0.0,
            current_gondola: None,
        }
    }
}

#[derive(Debug, Default)]
struct Fields {
    flags: SharedFlags,
    model: ReadModel,
}

/// Handle to the state shared by every worker.
///
/// # Examples
///
/// ```
/// use gondola_engine::SharedState;
///
/// let shared = SharedState::default();
/// let vision = shared.clone();
///
/// vision.record_identification("hammer");
/// assert_eq!(shared.identified_label().as_deref(), Some("hammer"));
/// ```
#[derive(Debug, Clone)]
pub struct SharedState {
    fields: Arc<Mutex<Fields>>,
    logs: Arc<Mutex<LogRing>>,
    registry: Arc<RwLock<GondolaRegistry>>,
}

impl SharedState {
    pub fn new(registry: GondolaRegistry, log_capacity: usize) -> Self {
        Self {
            fields: Arc::new(Mutex::new(Fields::default())),
            logs: Arc::new(Mutex::new(LogRing::new(log_capacity))),
            registry: Arc::new(RwLock::new(registry)),
        }
    }

    // ---- flags ----

    pub fn flags(&self) -> SharedFlags {
        self.fields.lock().flags.clone()
    }

    pub fn webserver_ready(&self) -> bool {
        self.fields.lock().flags.webserver_ready
    }

    pub fn set_webserver_ready(&self, ready: bool) {
        self.fields.lock().flags.webserver_ready = ready;
    }

    pub fn camera_ready(&self) -> bool {
        self.fields.lock().flags.camera_ready
    }

    pub fn set_camera_ready(&self, ready: bool) {
        self.fields.lock().flags.camera_ready = ready;
    }

    pub fn object_detected(&self) -> bool {
        self.fields.lock().flags.object_detected
    }

    pub fn set_object_detected(&self, detected: bool) {
        self.fields.lock().flags.object_detected = detected;
    }

    pub fn tool_identified(&self) -> bool {
        self.fields.lock().flags.tool_identified
    }

    pub fn set_tool_identified(&self, identified: bool) {
        self.fields.lock().flags.tool_identified = identified;
    }

    pub fn detected_label(&self) -> Option<String> {
        self.fields.lock().flags.detected_label.clone()
    }

    /// See [`SharedFlags::identified_label`].
    pub fn identified_label(&self) -> Option<String> {
        self.fields
            .lock()
            .flags
            .identified_label()
            .map(str::to_string)
    }

    /// Store `label` and raise `tool_identified` in one update.
    pub fn record_identification(&self, label: &str) {
        let mut fields = self.fields.lock();
        fields.flags.detected_label = Some(label.to_string());
        fields.flags.tool_identified = true;
    }

    /// Lower `object_detected` and `tool_identified` in one update.
    pub fn clear_detection(&self) {
        let mut fields = self.fields.lock();
        fields.flags.object_detected = false;
        fields.flags.tool_identified = false;
    }

    // ---- read model ----

    pub fn read_model(&self) -> ReadModel {
        self.fields.lock().model.clone()
    }

    pub fn state(&self) -> ProtocolState {
        self.fields.lock().model.state
    }

    pub(crate) fn set_state(&self, state: ProtocolState) {
        self.fields.lock().model.state = state;
    }

    pub fn set_last_detection(&self, label: &str, confidence: f64) {
        let mut fields = self.fields.lock();
        fields.model.last_label = label.to_string();
        fields.model.last_confidence = confidence;
    }

    pub fn current_gondola(&self) -> Option<PositionId> {
        self.fields.lock().model.current_gondola
    }

    pub(crate) fn set_current_gondola(&self, position: Option<PositionId>) {
        self.fields.lock().model.current_gondola = position;
    }

    // ---- log ring ----

    /// Append to the dashboard log. Returns `false` for a consecutive duplicate.
    pub fn append_log(&self, message: impl Into<String>) -> bool {
        self.logs.lock().push(message)
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.logs.lock().to_vec()
    }

    pub fn log_len(&self) -> usize {
        self.logs.lock().len()
    }

    // ---- registry ----

    /// Resolve a label against the registry, falling back to `default`.
    pub fn resolve_position(&self, label: &str, default: PositionId) -> PositionId {
        self.registry.read().resolve_or(label, default)
    }

    /// Read-all side of the administrative interface.
    pub fn gondolas(&self) -> Vec<GondolaEntry> {
        self.registry.read().entries().to_vec()
    }

    /// Replace-all side of the administrative interface.
    ///
    /// # Errors
    ///
    /// Propagates [`GondolaRegistry::replace_all`] validation errors.
    pub fn replace_gondolas(&self, entries: Vec<GondolaEntry>) -> Result<RegistryReport> {
        let report = self.registry.write().replace_all(entries)?;
        if report.has_warnings() {
            self.append_log(format!(
                "Duplicate gondola positions: {:?}",
                report.duplicates
            ));
        }
        Ok(report)
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(GondolaRegistry::default(), DEFAULT_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_fields() {
        let engine = SharedState::default();
        let vision = engine.clone();

        vision.set_object_detected(true);
        vision.set_last_detection("saw", 0.91);

        assert!(engine.object_detected());
        let model = engine.read_model();
        assert_eq!(model.last_label, "saw");
        assert_eq!(model.last_confidence, 0.91);
    }

    #[test]
    fn test_identified_label_requires_flag_and_text() {
        let shared = SharedState::default();
        assert_eq!(shared.identified_label(), None);

        shared.record_identification("  ");
        assert!(shared.tool_identified());
        assert_eq!(shared.identified_label(), None);

        shared.record_identification("Hammer");
        assert_eq!(shared.identified_label().as_deref(), Some("Hammer"));

        shared.set_tool_identified(false);
        assert_eq!(shared.identified_label(), None);
        assert_eq!(shared.detected_label().as_deref(), Some("Hammer"));
    }

    #[test]
    fn test_clear_detection() {
        let shared = SharedState::default();
        shared.set_object_detected(true);
        shared.record_identification("pliers");

        shared.clear_detection();

        let flags = shared.flags();
        assert!(!flags.object_detected);
        assert!(!flags.tool_identified);
    }

    #[test]
    fn test_read_model_defaults() {
        let model = SharedState::default().read_model();
        assert_eq!(model.state, ProtocolState::Init);
        assert_eq!(model.last_label, NO_OBJECT_LABEL);
        assert_eq!(model.current_gondola, None);
    }

    #[test]
    fn test_replace_gondolas_logs_duplicates() {
        let shared = SharedState::default();
        let entries = vec![GondolaEntry::new("pliers", 71), GondolaEntry::new("saw", 71)];

        let report = shared.replace_gondolas(entries.clone()).unwrap();

        assert_eq!(report.duplicates, vec![71]);
        assert_eq!(shared.gondolas(), entries);
        assert!(shared.logs()[0].message.contains("71"));
    }

    #[test]
    fn test_resolve_position_uses_current_registry() {
        let shared = SharedState::default();
        assert_eq!(shared.resolve_position("hammer", 76), 73);

        shared
            .replace_gondolas(vec![GondolaEntry::new("hammer", 80)])
            .unwrap();
        assert_eq!(shared.resolve_position("hammer", 76), 80);
        assert_eq!(shared.resolve_position("saw", 76), 76);
    }
}
