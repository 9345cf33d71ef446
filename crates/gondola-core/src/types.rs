use crate::{Result, error::Error};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric gondola slot identifier sent to the device.
pub type PositionId = i64;

/// Normalize a classifier label for comparison: trimmed and lowercase.
///
/// # Examples
///
/// ```
/// use gondola_core::normalize_label;
///
/// assert_eq!(normalize_label("  Hammer "), "hammer");
/// ```
#[must_use]
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

/// A single label-to-slot mapping in the gondola registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GondolaEntry {
    /// Classifier label as configured by the operator.
    pub label: String,

    /// Slot sent to the device when this label is picked.
    pub position_id: PositionId,
}

impl GondolaEntry {
    /// Create a new entry.
    pub fn new(label: impl Into<String>, position_id: PositionId) -> Self {
        Self {
            label: label.into(),
            position_id,
        }
    }

    /// Check that the entry can be matched against a detection.
    ///
    /// # Errors
    /// Returns `Error::InvalidGondola` if the label is blank or the position is negative.
    pub fn validate(&self) -> Result<()> {
        if self.label.trim().is_empty() {
            return Err(Error::InvalidGondola(format!(
                "empty label for position {}",
                self.position_id
            )));
        }
        if self.position_id < 0 {
            return Err(Error::InvalidGondola(format!(
                "negative position {} for label {:?}",
                self.position_id, self.label
            )));
        }
        Ok(())
    }

    /// Whether this entry matches a label, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn matches(&self, label: &str) -> bool {
        normalize_label(&self.label) == normalize_label(label)
    }
}

impl fmt::Display for GondolaEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.label, self.position_id)
    }
}

/// One classification produced by the vision pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,

    #[serde(alias = "conf")]
    pub confidence: f64,

    /// Bounding box `[x1, y1, x2, y2]` in full-frame coordinates.
    #[serde(default)]
    pub bbox: Option<[i32; 4]>,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox: None,
        }
    }

    pub fn with_bbox(mut self, bbox: [i32; 4]) -> Self {
        self.bbox = Some(bbox);
        self
    }

    /// Pick the detection with the highest confidence. Non-finite scores are
    /// skipped.
    pub fn best(detections: &[Detection]) -> Option<&Detection> {
        detections
            .iter()
            .filter(|d| d.confidence.is_finite())
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }
}

/// A single-frame classification handed to the identification gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolIdentification {
    pub label: String,
    pub confidence: f64,

    /// Seconds since the UNIX epoch when the frame was observed.
    pub observed_at: f64,
}

/// Region of a frame isolated by the blob detector, kept for re-identification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CroppedRegion {
    /// Bounding box `(x, y, width, height)` of the crop in the full frame.
    pub bbox: [i32; 4],

    /// Encoded image bytes; opaque to the controller.
    #[serde(default)]
    pub image: Bytes,

    /// Classifications last produced for this crop by the external pipeline.
    #[serde(default)]
    pub detections: Vec<Detection>,
}

impl CroppedRegion {
    pub fn new(bbox: [i32; 4]) -> Self {
        Self {
            bbox,
            image: Bytes::new(),
            detections: Vec::new(),
        }
    }

    pub fn with_detections(mut self, detections: Vec<Detection>) -> Self {
        self.detections = detections;
        self
    }
}

/// Output of the external perception stage for one camera frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameObservation {
    /// The isolated object crossed the trigger line.
    #[serde(default)]
    pub crossed: bool,

    /// Any candidate object was found in the frame.
    #[serde(default)]
    pub detected_any: bool,

    /// Crop of the best candidate, if one was isolated.
    #[serde(default)]
    pub crop: Option<CroppedRegion>,

    /// Classifications of the crop (only meaningful when `crossed`).
    #[serde(default)]
    pub detections: Vec<Detection>,
}

impl FrameObservation {
    /// A frame with nothing in view.
    pub fn empty() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("hammer", "hammer")]
    #[case(" Hammer ", "hammer")]
    #[case("\tSCREWDRIVER\n", "screwdriver")]
    #[case("", "")]
    fn test_normalize_label(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_label(input), expected);
    }

    #[rstest]
    #[case("hammer", " Hammer ", true)]
    #[case("Pliers", "pliers", true)]
    #[case("saw", "saws", false)]
    fn test_entry_matches(#[case] entry: &str, #[case] label: &str, #[case] expected: bool) {
        assert_eq!(GondolaEntry::new(entry, 71).matches(label), expected);
    }

    #[test]
    fn test_entry_validate() {
        assert!(GondolaEntry::new("pliers", 71).validate().is_ok());
        assert!(GondolaEntry::new("  ", 71).validate().is_err());
        assert!(GondolaEntry::new("pliers", -1).validate().is_err());
    }

    #[test]
    fn test_entry_display() {
        assert_eq!(GondolaEntry::new("saw", 75).to_string(), "saw -> 75");
    }

    #[test]
    fn test_best_detection_by_confidence() {
        let detections = vec![
            Detection::new("pliers", 0.4),
            Detection::new("hammer", 0.9),
            Detection::new("saw", 0.7),
        ];
        assert_eq!(Detection::best(&detections).unwrap().label, "hammer");
        assert!(Detection::best(&[]).is_none());
    }

    #[test]
    fn test_best_detection_skips_non_finite() {
        let detections = vec![
            Detection::new("hammer", 0.9),
            Detection::new("saw", f64::NAN),
            Detection::new("pliers", f64::INFINITY),
        ];
        assert_eq!(Detection::best(&detections).unwrap().label, "hammer");
        assert!(Detection::best(&[Detection::new("saw", f64::NAN)]).is_none());
    }

    #[test]
    fn test_detection_accepts_conf_alias() {
        let detection: Detection =
            serde_json::from_str(r#"{"label":"saw","conf":0.8,"bbox":[1,2,3,4]}"#).unwrap();
        assert_eq!(detection.confidence, 0.8);
        assert_eq!(detection.bbox, Some([1, 2, 3, 4]));
    }

    #[test]
    fn test_frame_observation_defaults() {
        let frame: FrameObservation = serde_json::from_str("{}").unwrap();
        assert_eq!(frame, FrameObservation::empty());
    }
}
