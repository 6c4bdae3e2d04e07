// src/gesture.rs
use serde::Serialize;

use crate::geometry::HandGeometry;

/// Confidence of a freshly confirmed gesture.
pub const BASE_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GestureLabel {
    None,
    IndexUp,
    Fist,
    TwoFingersUp,
    Pinch,
}

impl GestureLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::IndexUp => "index-up",
            Self::Fist => "fist",
            Self::TwoFingersUp => "two-fingers-up",
            Self::Pinch => "pinch",
        }
    }
}

/// Classifies one frame. Stateless; first match wins.
///
/// Pinch and fist are checked before the finger-count poses: a closing fist
/// passes briefly through an index-like silhouette, and a pinch can coexist
/// with an ambiguous index-up posture.
pub fn classify(geometry: &HandGeometry, pinch_ratio: f64) -> GestureLabel {
    if !geometry.detected {
        return GestureLabel::None;
    }

    let f = &geometry.fingers;

    if geometry.thumb_index_distance < pinch_ratio * geometry.palm_size {
        return GestureLabel::Pinch;
    }

    if f.extended_count() == 0 {
        return GestureLabel::Fist;
    }

    if f.index && !f.thumb && !f.middle && !f.ring && !f.pinky {
        return GestureLabel::IndexUp;
    }

    if f.index && f.middle && !f.ring && !f.pinky {
        return GestureLabel::TwoFingersUp;
    }

    GestureLabel::None
}

/// The debounced, externally visible gesture signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GestureEvent {
    pub label: GestureLabel,
    pub confidence: f64,
    /// Consecutive processed frames the stable label has been observed.
    pub stable_frame_count: u32,
}

impl Default for GestureEvent {
    fn default() -> Self {
        Self {
            label: GestureLabel::None,
            confidence: 0.0,
            stable_frame_count: 0,
        }
    }
}

/// Turns per-frame labels into a stable gesture. A new label has to be seen
/// on `hold_frames` consecutive frames before it replaces the stable one; any
/// interruption restarts the count but leaves the stable label in place.
#[derive(Debug, Clone)]
pub struct GestureDebouncer {
    hold_frames: u32,
    candidate: GestureLabel,
    candidate_frames: u32,
    event: GestureEvent,
    previous: GestureLabel,
}

impl GestureDebouncer {
    pub fn new(hold_frames: u32) -> Self {
        Self {
            hold_frames: hold_frames.max(1),
            candidate: GestureLabel::None,
            candidate_frames: 0,
            event: GestureEvent::default(),
            previous: GestureLabel::None,
        }
    }

    /// Feeds one frame-level label. Returns the new stable label when it
    /// changed on this frame.
    pub fn update(&mut self, label: GestureLabel) -> Option<GestureLabel> {
        if label == self.candidate {
            self.candidate_frames = self.candidate_frames.saturating_add(1);
        } else {
            self.candidate = label;
            self.candidate_frames = 1;
        }

        if self.candidate == self.event.label {
            self.event.stable_frame_count = self.candidate_frames;
            if self.candidate_frames >= self.hold_frames {
                self.event.confidence = self.confidence_for(self.candidate_frames);
            }
            return None;
        }

        // The stable label is not what the hand is showing right now.
        self.event.stable_frame_count = 0;
        self.event.confidence = BASE_CONFIDENCE;

        if self.candidate_frames < self.hold_frames {
            return None;
        }

        self.previous = self.event.label;
        self.event = GestureEvent {
            label: self.candidate,
            confidence: self.confidence_for(self.candidate_frames),
            stable_frame_count: self.candidate_frames,
        };
        Some(self.candidate)
    }

    // Base confidence at the hold threshold, reaching 1.0 after another
    // `hold_frames` frames.
    fn confidence_for(&self, frames: u32) -> f64 {
        let past = frames.saturating_sub(self.hold_frames) as f64;
        let span = self.hold_frames as f64;
        (BASE_CONFIDENCE + (1.0 - BASE_CONFIDENCE) * past / span).min(1.0)
    }

    pub fn event(&self) -> &GestureEvent {
        &self.event
    }

    pub fn stable_label(&self) -> GestureLabel {
        self.event.label
    }

    /// The stable label before the most recent change.
    pub fn previous_label(&self) -> GestureLabel {
        self.previous
    }

    pub fn candidate(&self) -> (GestureLabel, u32) {
        (self.candidate, self.candidate_frames)
    }

    pub fn hold_frames(&self) -> u32 {
        self.hold_frames
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.hold_frames);
    }
}
