//! Debounced object identification.
//!
//! Single-frame classifications are noisy. The gate keeps, per label, the
//! timestamps of recent observations and accepts a label only when it was
//! seen at least `min_hits` times inside the sliding window with enough
//! confidence. Accepted identifications are emitted to the engine no more
//! often than `emit_interval`, across all labels.
//!
//! # Examples
//!
//! ```
//! use std::time::{Duration, Instant};
//! use gondola_core::config::GateConfig;
//! use gondola_engine::IdentificationGate;
//!
//! let mut gate = IdentificationGate::new(GateConfig::default());
//! let t0 = Instant::now();
//!
//! assert!(gate.observe("hammer", 0.65, t0).is_none());
//! let stable = gate.observe("hammer", 0.65, t0 + Duration::from_millis(500)).unwrap();
//! assert_eq!(stable.label, "hammer");
//! ```

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use gondola_core::config::GateConfig;
use gondola_core::{CroppedRegion, Detection};
use tracing::{debug, trace};

/// Per-label ring of observation instants.
#[derive(Debug, Clone)]
pub struct DetectionWindow {
    hits: VecDeque<Instant>,
    capacity: usize,
}

impl DetectionWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            hits: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record an observation, dropping the oldest one when full.
    pub fn record(&mut self, at: Instant) {
        if self.hits.len() == self.capacity {
            self.hits.pop_front();
        }
        self.hits.push_back(at);
    }

    /// Drop observations older than `window` relative to `now`.
    pub fn evict(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.hits.front() {
            if now.saturating_duration_since(*oldest) > window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// A label the gate considers stable.
#[derive(Debug, Clone, PartialEq)]
pub struct StableIdentification {
    pub label: String,
    pub confidence: f64,
    /// Observations of this label inside the window.
    pub hits: usize,
}

/// Result of feeding one observation to the gate.
#[derive(Debug, Clone, PartialEq)]
pub enum Assessment {
    /// Not enough corroboration or confidence yet.
    Pending,
    /// Label is stable. `emit` is false when the rate limit held it back.
    Accepted {
        identification: StableIdentification,
        emit: bool,
    },
}

impl Assessment {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// The identification to send downstream, if any.
    pub fn emitted(self) -> Option<StableIdentification> {
        match self {
            Self::Accepted {
                identification,
                emit: true,
            } => Some(identification),
            _ => None,
        }
    }
}

/// Source of classifications for a cached crop.
pub trait Classifier {
    fn classify(&mut self, crop: &CroppedRegion) -> Vec<Detection>;
}

/// Classifier that reuses the detections the perception stage attached to the
/// crop.
#[derive(Debug, Clone, Copy, Default)]
pub struct CachedClassifier;

impl Classifier for CachedClassifier {
    fn classify(&mut self, crop: &CroppedRegion) -> Vec<Detection> {
        crop.detections.clone()
    }
}

impl<F> Classifier for F
where
    F: FnMut(&CroppedRegion) -> Vec<Detection>,
{
    fn classify(&mut self, crop: &CroppedRegion) -> Vec<Detection> {
        self(crop)
    }
}

/// The debouncing gate.
#[derive(Debug, Clone)]
pub struct IdentificationGate {
    config: GateConfig,
    windows: HashMap<String, DetectionWindow>,
    last_emit: Option<Instant>,
    last_crop: Option<CroppedRegion>,
}

impl IdentificationGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            windows: HashMap::new(),
            last_emit: None,
            last_crop: None,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Feed one observation and return what the gate makes of it.
    pub fn assess(&mut self, label: &str, confidence: f64, now: Instant) -> Assessment {
        let window_len = self.config.window();
        let window = self
            .windows
            .entry(label.to_string())
            .or_insert_with(|| DetectionWindow::new(self.config.window_capacity));
        window.record(now);
        window.evict(now, window_len);
        let hits = window.len();

        let confident = confidence.is_finite() && confidence >= self.config.min_confidence;
        if !confident || hits < self.config.min_hits {
            trace!(label, confidence, hits, "Identification pending");
            return Assessment::Pending;
        }

        let emit = self
            .last_emit
            .is_none_or(|last| now.saturating_duration_since(last) >= self.config.emit_interval());
        if emit {
            self.last_emit = Some(now);
            debug!(label, confidence, hits, "Stable identification");
        }

        Assessment::Accepted {
            identification: StableIdentification {
                label: label.to_string(),
                confidence,
                hits,
            },
            emit,
        }
    }

    /// Feed one observation; returns an identification only when one should be
    /// emitted.
    pub fn observe(
        &mut self,
        label: &str,
        confidence: f64,
        now: Instant,
    ) -> Option<StableIdentification> {
        self.assess(label, confidence, now).emitted()
    }

    /// Evict stale observations from every window and forget empty ones.
    pub fn prune(&mut self, now: Instant) {
        let window_len = self.config.window();
        self.windows.retain(|_, window| {
            window.evict(now, window_len);
            !window.is_empty()
        });
    }

    /// Keep the latest crop for re-identification.
    pub fn cache_crop(&mut self, crop: CroppedRegion) {
        self.last_crop = Some(crop);
    }

    pub fn cached_crop(&self) -> Option<&CroppedRegion> {
        self.last_crop.as_ref()
    }

    /// Classify the cached crop again and assess the best detection.
    ///
    /// Returns `None` when there is no cached crop or the classifier finds
    /// nothing in it.
    pub fn reidentify<C: Classifier + ?Sized>(
        &mut self,
        classifier: &mut C,
        now: Instant,
    ) -> Option<Assessment> {
        let crop = self.last_crop.as_ref()?;
        let detections = classifier.classify(crop);
        let best = Detection::best(&detections)?;
        debug!(label = %best.label, confidence = best.confidence, "Re-identifying cached crop");
        Some(self.assess(&best.label, best.confidence, now))
    }

    /// Observations currently held for `label`.
    pub fn window_len(&self, label: &str) -> usize {
        self.windows.get(label).map_or(0, DetectionWindow::len)
    }

    /// Number of labels with a live window.
    pub fn tracked_labels(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> IdentificationGate {
        IdentificationGate::new(GateConfig::default())
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn test_single_observation_is_pending() {
        let mut gate = gate();
        assert!(gate.observe("hammer", 0.65, Instant::now()).is_none());
    }

    #[test]
    fn test_two_hits_within_window_accept() {
        let mut gate = gate();
        let t0 = Instant::now();
        assert!(gate.observe("hammer", 0.65, t0).is_none());

        let stable = gate.observe("hammer", 0.65, t0 + ms(1500)).unwrap();
        assert_eq!(stable.label, "hammer");
        assert_eq!(stable.hits, 2);
    }

    #[test]
    fn test_hits_too_far_apart_do_not_accept() {
        let mut gate = gate();
        let t0 = Instant::now();
        assert!(gate.observe("hammer", 0.65, t0).is_none());
        assert!(gate.observe("hammer", 0.65, t0 + ms(2500)).is_none());
        assert_eq!(gate.window_len("hammer"), 1);
    }

    #[test]
    fn test_low_confidence_never_accepts() {
        let mut gate = gate();
        let t0 = Instant::now();
        for i in 0..5 {
            assert!(gate.observe("saw", 0.59, t0 + ms(i * 100)).is_none());
        }
    }

    #[test]
    fn test_non_finite_confidence_never_accepts() {
        let mut gate = gate();
        let t0 = Instant::now();
        assert!(gate.observe("hammer", f64::NAN, t0).is_none());
        assert!(gate.observe("hammer", f64::NAN, t0 + ms(100)).is_none());
        assert!(!gate.assess("hammer", f64::NAN, t0 + ms(200)).is_accepted());
        assert!(!gate.assess("hammer", f64::INFINITY, t0 + ms(300)).is_accepted());
    }

    #[test]
    fn test_reidentify_skips_nan_detection() {
        let mut gate = gate();
        let t0 = Instant::now();
        gate.cache_crop(CroppedRegion::new([0, 0, 10, 10]).with_detections(vec![
            Detection::new("hammer", 0.9),
            Detection::new("saw", f64::NAN),
        ]));

        let mut classifier = CachedClassifier;
        gate.reidentify(&mut classifier, t0);
        let stable = gate
            .reidentify(&mut classifier, t0 + ms(100))
            .and_then(Assessment::emitted)
            .unwrap();
        assert_eq!(stable.label, "hammer");
        assert_eq!(gate.window_len("saw"), 0);
    }

    #[test]
    fn test_rate_limit_holds_back_emission() {
        let mut gate = gate();
        let t0 = Instant::now();
        gate.observe("hammer", 0.65, t0);
        assert!(gate.observe("hammer", 0.65, t0 + ms(100)).is_some());

        let third = gate.assess("hammer", 0.65, t0 + ms(500));
        assert!(third.is_accepted());
        assert_eq!(third.emitted(), None);

        assert!(gate.observe("hammer", 0.65, t0 + ms(900)).is_some());
    }

    #[test]
    fn test_rate_limit_is_shared_across_labels() {
        let mut gate = gate();
        let t0 = Instant::now();
        gate.observe("hammer", 0.9, t0);
        assert!(gate.observe("hammer", 0.9, t0 + ms(100)).is_some());

        gate.observe("saw", 0.9, t0 + ms(200));
        assert!(gate.observe("saw", 0.9, t0 + ms(300)).is_none());
    }

    #[test]
    fn test_window_capacity_is_bounded() {
        let mut gate = gate();
        let t0 = Instant::now();
        for i in 0..20 {
            gate.assess("pliers", 0.9, t0 + ms(i * 10));
        }
        assert_eq!(gate.window_len("pliers"), 8);
    }

    #[test]
    fn test_prune_forgets_stale_labels() {
        let mut gate = gate();
        let t0 = Instant::now();
        gate.observe("pliers", 0.9, t0);
        gate.observe("wrench", 0.9, t0 + ms(1900));

        gate.prune(t0 + ms(2500));

        assert_eq!(gate.window_len("pliers"), 0);
        assert_eq!(gate.window_len("wrench"), 1);
        assert_eq!(gate.tracked_labels(), 1);
    }

    #[test]
    fn test_reidentify_without_crop() {
        let mut gate = gate();
        assert!(gate.reidentify(&mut CachedClassifier, Instant::now()).is_none());
    }

    #[test]
    fn test_reidentify_uses_best_cached_detection() {
        let mut gate = gate();
        let t0 = Instant::now();
        gate.cache_crop(CroppedRegion::new([0, 0, 40, 40]).with_detections(vec![
            Detection::new("saw", 0.4),
            Detection::new("hammer", 0.8),
        ]));

        let first = gate.reidentify(&mut CachedClassifier, t0).unwrap();
        assert_eq!(first, Assessment::Pending);

        let second = gate.reidentify(&mut CachedClassifier, t0 + ms(100)).unwrap();
        let stable = second.emitted().unwrap();
        assert_eq!(stable.label, "hammer");
        assert_eq!(gate.window_len("saw"), 0);
    }

    #[test]
    fn test_reidentify_with_closure_classifier() {
        let mut gate = gate();
        gate.cache_crop(CroppedRegion::new([0, 0, 1, 1]));
        let mut calls = 0;
        let mut classify = |_: &CroppedRegion| {
            calls += 1;
            Vec::<Detection>::new()
        };

        assert!(gate.reidentify(&mut classify, Instant::now()).is_none());
        assert_eq!(calls, 1);
    }
}
