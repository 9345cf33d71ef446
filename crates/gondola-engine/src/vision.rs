//! Bridge between the perception stage and the protocol engine.
//!
//! The perception stage (camera, blob isolation, classifier) lives outside
//! this crate and hands over one [`FrameObservation`] per frame. The bridge
//! runs the identification gate on it, keeps the shared flags and read model
//! current, and enqueues the events the handshake machine consumes.

use std::time::Instant;

use chrono::Utc;
use gondola_core::config::GateConfig;
use gondola_core::constants::NO_OBJECT_LABEL;
use gondola_core::{CroppedRegion, Detection, FrameObservation, ToolIdentification};
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, info, warn};

use crate::driver::{ControlReceiver, EventSender};
use crate::event::{Event, EventKind, VisionRequest};
use crate::gate::{Assessment, CachedClassifier, Classifier, IdentificationGate};
use crate::shared::SharedState;

/// Seconds since the UNIX epoch, as carried by identification events.
fn epoch_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Map a crop-relative box to full-frame coordinates.
fn to_frame_coords(crop: &CroppedRegion, bbox: [i32; 4]) -> [i32; 4] {
    let [x, y, _, _] = crop.bbox;
    [bbox[0] + x, bbox[1] + y, bbox[2] + x, bbox[3] + y]
}

/// Per-frame vision logic.
pub struct VisionBridge<F = CachedClassifier> {
    gate: IdentificationGate,
    classifier: F,
    shared: SharedState,
    events: EventSender,
    control: Option<ControlReceiver>,
}

impl VisionBridge<CachedClassifier> {
    pub fn new(config: GateConfig, shared: SharedState, events: EventSender) -> Self {
        Self {
            gate: IdentificationGate::new(config),
            classifier: CachedClassifier,
            shared,
            events,
            control: None,
        }
    }
}

impl<F: Classifier> VisionBridge<F> {
    /// Replace the classifier used for re-identification requests.
    pub fn with_classifier<G: Classifier>(self, classifier: G) -> VisionBridge<G> {
        VisionBridge {
            gate: self.gate,
            classifier,
            shared: self.shared,
            events: self.events,
            control: self.control,
        }
    }

    /// Attach the queue on which the engine asks for re-identification.
    pub fn with_control(mut self, control: ControlReceiver) -> Self {
        self.control = Some(control);
        self
    }

    pub fn gate(&self) -> &IdentificationGate {
        &self.gate
    }

    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    /// Publish camera readiness; a working camera also announces itself to the engine.
    pub fn announce_camera(&self, ok: bool) {
        self.shared.set_camera_ready(ok);
        if ok {
            info!("Camera online");
            self.send(Event::new(EventKind::CamOnline));
        } else {
            warn!("Camera unavailable");
        }
    }

    /// The perception stage could not produce a frame.
    pub fn report_camera_error(&self) {
        self.shared.set_camera_ready(false);
        self.send(Event::new(EventKind::CameraError));
    }

    /// Process one frame observed at `now`.
    pub fn step(&mut self, frame: &FrameObservation, now: Instant) {
        self.handle_requests(now);

        let crop = frame.crop.as_ref();
        if let Some(crop) = crop {
            self.gate.cache_crop(crop.clone());
        }

        if frame.crossed {
            self.send(Event::new(EventKind::ObjDetected));
            self.shared.set_object_detected(true);
        }

        if !frame.detected_any {
            self.shared.set_last_detection(NO_OBJECT_LABEL, 0.0);
            return;
        }

        let detections: &[Detection] = if frame.crossed {
            &frame.detections
        } else {
            &[]
        };

        if frame.crossed {
            match Detection::best(detections) {
                Some(best) => {
                    let assessment = self.gate.assess(&best.label, best.confidence, now);
                    if !assessment.is_accepted() {
                        self.shared.set_tool_identified(false);
                    }
                    self.apply(assessment);
                }
                None => {
                    self.gate.prune(now);
                    self.shared.set_tool_identified(false);
                }
            }
        }

        match crop {
            Some(crop) if !detections.is_empty() => {
                for detection in detections {
                    let mut event = Event::detection(detection);
                    event.bbox = detection.bbox.map(|bbox| to_frame_coords(crop, bbox));
                    self.send(event);
                    self.shared.set_object_detected(true);
                    self.shared
                        .set_last_detection(&detection.label, detection.confidence);
                }
            }
            _ => {
                self.shared.set_object_detected(false);
                self.shared.set_last_detection(NO_OBJECT_LABEL, 0.0);
            }
        }
    }

    /// Serve pending re-identification requests. Returns how many were served.
    pub fn handle_requests(&mut self, now: Instant) -> usize {
        let mut served = 0;
        loop {
            let Some(control) = self.control.as_mut() else {
                return served;
            };
            match control.try_recv() {
                Ok(VisionRequest::RequestIdentification) => {
                    served += 1;
                    debug!("Re-identification requested");
                    match self.gate.reidentify(&mut self.classifier, now) {
                        Some(assessment) => self.apply(assessment),
                        None => debug!("Nothing to re-identify"),
                    }
                }
                Err(TryRecvError::Empty) => return served,
                Err(TryRecvError::Disconnected) => {
                    self.control = None;
                    return served;
                }
            }
        }
    }

    /// Write an accepted identification to the shared flags and emit it if due.
    fn apply(&self, assessment: Assessment) {
        let Assessment::Accepted {
            identification,
            emit,
        } = assessment
        else {
            return;
        };

        self.shared.record_identification(&identification.label);
        info!(
            label = %identification.label,
            confidence = identification.confidence,
            "Object identified"
        );
        if emit {
            let identification = ToolIdentification {
                label: identification.label,
                confidence: identification.confidence,
                observed_at: epoch_seconds(),
            };
            self.send(Event::tool_identified(&identification));
        }
    }

    fn send(&self, event: Event) -> bool {
        if self.events.send(event).is_err() {
            warn!("Event queue closed, vision event dropped");
            return false;
        }
        true
    }
}
