//! Events consumed by the handshake machine.
//!
//! Producers speak in string tags (`"SERIAL_ON"`, `"OBJETO_DETECTADO"`, ...).
//! [`EventKind::parse`] folds synonyms onto one closed set of triggers so the
//! transition table can match exhaustively. Unknown tags never become events.

use std::fmt;

use gondola_core::{Detection, ToolIdentification};
use serde::{Deserialize, Serialize};

/// Canonical trigger of a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Inicial,
    WebserverOn,
    CamOnline,
    WebDone,
    SerialOn,
    SerialOnAck,
    Idle,
    ToolIdentified,
    ObjDetected,
    AwaitToolIdent,
    ObjDefined,
    GondolaSet,
    DropObject,
    /// Camera failure reported by vision. Recognised, never handled.
    CameraError,
}

impl EventKind {
    /// Every kind, in table order.
    pub const ALL: [EventKind; 14] = [
        Self::Inicial,
        Self::WebserverOn,
        Self::CamOnline,
        Self::WebDone,
        Self::SerialOn,
        Self::SerialOnAck,
        Self::Idle,
        Self::ToolIdentified,
        Self::ObjDetected,
        Self::AwaitToolIdent,
        Self::ObjDefined,
        Self::GondolaSet,
        Self::DropObject,
        Self::CameraError,
    ];

    /// Parse a producer tag, folding synonyms onto the canonical trigger.
    ///
    /// # Examples
    ///
    /// ```
    /// use gondola_engine::EventKind;
    ///
    /// assert_eq!(EventKind::parse("OBJETO_PASSOU_LINHA"), Some(EventKind::ObjDetected));
    /// assert_eq!(EventKind::parse("CAMERA_INICIALIZADA"), Some(EventKind::CamOnline));
    /// assert_eq!(EventKind::parse("SEM_OBJETO"), None);
    /// ```
    pub fn parse(tag: &str) -> Option<Self> {
        let kind = match tag.trim() {
            "INICIAL" => Self::Inicial,
            "WEBSERVER_ON" => Self::WebserverOn,
            "CAM_ONLINE" | "CAMERA_INICIALIZADA" => Self::CamOnline,
            "WEB_DONE" => Self::WebDone,
            "SERIAL_ON" => Self::SerialOn,
            "SERIAL_ON_ACK" => Self::SerialOnAck,
            "IDLE" => Self::Idle,
            "TOOL_IDENTIFIED" => Self::ToolIdentified,
            "OBJ_DETECTED" | "OBJETO_DETECTADO" | "OBJETO_PASSOU_LINHA" => Self::ObjDetected,
            "AWAIT_TOOL_IDENT" => Self::AwaitToolIdent,
            "OBJ_DEFINED" => Self::ObjDefined,
            "GONDOLA_SET" => Self::GondolaSet,
            "DROP_OBJECT" => Self::DropObject,
            "ERRO_CAMERA" | "CAMERA_ERROR" => Self::CameraError,
            _ => return None,
        };
        Some(kind)
    }

    /// Canonical tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inicial => "INICIAL",
            Self::WebserverOn => "WEBSERVER_ON",
            Self::CamOnline => "CAM_ONLINE",
            Self::WebDone => "WEB_DONE",
            Self::SerialOn => "SERIAL_ON",
            Self::SerialOnAck => "SERIAL_ON_ACK",
            Self::Idle => "IDLE",
            Self::ToolIdentified => "TOOL_IDENTIFIED",
            Self::ObjDetected => "OBJ_DETECTED",
            Self::AwaitToolIdent => "AWAIT_TOOL_IDENT",
            Self::ObjDefined => "OBJ_DEFINED",
            Self::GondolaSet => "GONDOLA_SET",
            Self::DropObject => "DROP_OBJECT",
            Self::CameraError => "ERRO_CAMERA",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trigger plus the optional payload carried by vision events.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub label: Option<String>,
    pub confidence: Option<f64>,
    /// Seconds since the UNIX epoch.
    pub timestamp: Option<f64>,
    pub bbox: Option<[i32; 4]>,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            label: None,
            confidence: None,
            timestamp: None,
            bbox: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// `TOOL_IDENTIFIED` event for a debounced identification.
    pub fn tool_identified(identification: &ToolIdentification) -> Self {
        Self::new(EventKind::ToolIdentified)
            .with_label(identification.label.clone())
            .with_confidence(identification.confidence)
            .with_timestamp(identification.observed_at)
    }

    /// Per-detection `OBJETO_DETECTADO` event.
    pub fn detection(detection: &Detection) -> Self {
        Self {
            bbox: detection.bbox,
            ..Self::new(EventKind::ObjDetected)
                .with_label(detection.label.clone())
                .with_confidence(detection.confidence)
        }
    }

    /// Label carried by the event, if present and not blank.
    pub fn label(&self) -> Option<&str> {
        self.label
            .as_deref()
            .map(str::trim)
            .filter(|label| !label.is_empty())
    }
}

impl From<EventKind> for Event {
    fn from(kind: EventKind) -> Self {
        Self::new(kind)
    }
}

/// Wire form of an event as produced by external drivers.
///
/// Accepts `type` or `kind` for the tag and `conf` or `confidence` for the
/// score.
///
/// # Examples
///
/// ```
/// use gondola_engine::{EventKind, RawEvent};
///
/// let raw: RawEvent =
///     serde_json::from_str(r#"{"type":"TOOL_IDENTIFIED","label":"saw","conf":0.9}"#).unwrap();
/// let event = raw.into_event().unwrap();
/// assert_eq!(event.kind, EventKind::ToolIdentified);
/// assert_eq!(event.label(), Some("saw"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type", alias = "kind", default)]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(alias = "conf", default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[i32; 4]>,
}

impl RawEvent {
    /// Convert to an [`Event`]. A missing or unknown tag yields `None`.
    pub fn into_event(self) -> Option<Event> {
        let kind = EventKind::parse(self.kind.as_deref()?)?;
        Some(Event {
            kind,
            label: self.label,
            confidence: self.confidence,
            timestamp: self.timestamp,
            bbox: self.bbox,
        })
    }
}

impl From<&Event> for RawEvent {
    fn from(event: &Event) -> Self {
        Self {
            kind: Some(event.kind.as_str().to_string()),
            label: event.label.clone(),
            confidence: event.confidence,
            timestamp: event.timestamp,
            bbox: event.bbox,
        }
    }
}

/// Control message from the engine back to the vision loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisionRequest {
    /// Classify the last cached crop again.
    RequestIdentification,
}
