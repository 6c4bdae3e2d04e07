// src/geometry.rs
use nalgebra::Vector2;
use thiserror::Error;

pub const LANDMARK_COUNT: usize = 21;

// Hand landmark indices
pub const WRIST: usize = 0;
pub const THUMB_CMC: usize = 1;
pub const THUMB_MCP: usize = 2;
pub const THUMB_IP: usize = 3;
pub const THUMB_TIP: usize = 4;
pub const INDEX_MCP: usize = 5;
pub const INDEX_PIP: usize = 6;
pub const INDEX_DIP: usize = 7;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_DIP: usize = 11;
pub const MIDDLE_TIP: usize = 12;
pub const RING_MCP: usize = 13;
pub const RING_PIP: usize = 14;
pub const RING_DIP: usize = 15;
pub const RING_TIP: usize = 16;
pub const PINKY_MCP: usize = 17;
pub const PINKY_PIP: usize = 18;
pub const PINKY_DIP: usize = 19;
pub const PINKY_TIP: usize = 20;

/// How far outside [0, 1] a coordinate may fall before the set is rejected.
/// Anything inside the slack is clamped back into the frame.
const COORDINATE_SLACK: f64 = 0.25;

/// Tip must clear the PIP joint by this fraction of palm size.
const EXTENSION_TOLERANCE: f64 = 0.05;

/// Lateral thumb offset (fraction of palm size) needed to count as extended.
const THUMB_TOLERANCE: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LandmarkError {
    #[error("invalid input: expected {expected} landmarks, got {got}")]
    WrongPointCount { expected: usize, got: usize },
    #[error("invalid input: landmark {index} has non-finite coordinates")]
    NonFinite { index: usize },
    #[error("invalid input: landmark {index} out of range ({x:.3}, {y:.3})")]
    OutOfRange { index: usize, x: f64, y: f64 },
    #[error("invalid input: detection confidence {0} outside [0, 1]")]
    InvalidConfidence(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl Landmark {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    pub fn with_depth(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z) }
    }

    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
}

/// One detected hand for one frame: 21 normalized landmarks plus the
/// detector's confidence in the hand as a whole.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: [Landmark; LANDMARK_COUNT],
    confidence: f64,
}

impl LandmarkSet {
    /// Validates and clamps raw detector output.
    pub fn new(points: &[Landmark], confidence: f64) -> Result<Self, LandmarkError> {
        if points.len() != LANDMARK_COUNT {
            return Err(LandmarkError::WrongPointCount {
                expected: LANDMARK_COUNT,
                got: points.len(),
            });
        }
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(LandmarkError::InvalidConfidence(confidence));
        }

        let mut clamped = [Landmark::default(); LANDMARK_COUNT];
        for (index, (slot, lm)) in clamped.iter_mut().zip(points).enumerate() {
            if !lm.x.is_finite() || !lm.y.is_finite() || lm.z.is_some_and(|z| !z.is_finite()) {
                return Err(LandmarkError::NonFinite { index });
            }
            let range = -COORDINATE_SLACK..=1.0 + COORDINATE_SLACK;
            if !range.contains(&lm.x) || !range.contains(&lm.y) {
                return Err(LandmarkError::OutOfRange { index, x: lm.x, y: lm.y });
            }
            *slot = Landmark {
                x: lm.x.clamp(0.0, 1.0),
                y: lm.y.clamp(0.0, 1.0),
                z: lm.z,
            };
        }

        Ok(Self {
            points: clamped,
            confidence,
        })
    }

    /// Same as [`LandmarkSet::new`] for `[x, y, z]` rows.
    pub fn from_coords(coords: &[[f64; 3]], confidence: f64) -> Result<Self, LandmarkError> {
        let points: Vec<Landmark> = coords
            .iter()
            .map(|c| Landmark::with_depth(c[0], c[1], c[2]))
            .collect();
        Self::new(&points, confidence)
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn landmark(&self, index: usize) -> &Landmark {
        &self.points[index]
    }

    pub fn point(&self, index: usize) -> Vector2<f64> {
        self.landmark(index).position()
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.points
    }

    /// Index fingertip scaled to frame pixels.
    pub fn index_tip_px(&self, frame_width: u32, frame_height: u32) -> Vector2<f64> {
        let tip = self.point(INDEX_TIP);
        Vector2::new(tip.x * frame_width as f64, tip.y * frame_height as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    pub const ALL: [Finger; 5] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Pinky,
    ];

    /// (PIP, TIP) landmark indices. The thumb's IP joint stands in for PIP.
    pub fn joints(self) -> (usize, usize) {
        match self {
            Finger::Thumb => (THUMB_IP, THUMB_TIP),
            Finger::Index => (INDEX_PIP, INDEX_TIP),
            Finger::Middle => (MIDDLE_PIP, MIDDLE_TIP),
            Finger::Ring => (RING_PIP, RING_TIP),
            Finger::Pinky => (PINKY_PIP, PINKY_TIP),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FingerState {
    pub thumb: bool,
    pub index: bool,
    pub middle: bool,
    pub ring: bool,
    pub pinky: bool,
}

impl FingerState {
    pub fn is_extended(&self, finger: Finger) -> bool {
        match finger {
            Finger::Thumb => self.thumb,
            Finger::Index => self.index,
            Finger::Middle => self.middle,
            Finger::Ring => self.ring,
            Finger::Pinky => self.pinky,
        }
    }

    pub fn extended_count(&self) -> usize {
        Finger::ALL.iter().filter(|f| self.is_extended(**f)).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandGeometry {
    pub detected: bool,
    pub fingers: FingerState,
    pub thumb_index_distance: f64,
    /// Wrist to middle-finger MCP; normalizes thresholds across camera distance.
    pub palm_size: f64,
}

impl HandGeometry {
    /// Geometry for a frame with no hand. Infinite distances keep every
    /// distance-based test from matching.
    pub fn absent() -> Self {
        Self {
            detected: false,
            fingers: FingerState::default(),
            thumb_index_distance: f64::INFINITY,
            palm_size: f64::INFINITY,
        }
    }
}

pub fn analyze(hand: Option<&LandmarkSet>) -> HandGeometry {
    let Some(hand) = hand else {
        return HandGeometry::absent();
    };

    let wrist = hand.point(WRIST);
    let palm_size = (hand.point(MIDDLE_MCP) - wrist).norm();

    let fingers = FingerState {
        thumb: is_thumb_extended(hand, palm_size),
        index: is_finger_extended(hand, Finger::Index, wrist, palm_size),
        middle: is_finger_extended(hand, Finger::Middle, wrist, palm_size),
        ring: is_finger_extended(hand, Finger::Ring, wrist, palm_size),
        pinky: is_finger_extended(hand, Finger::Pinky, wrist, palm_size),
    };

    HandGeometry {
        detected: true,
        fingers,
        thumb_index_distance: (hand.point(THUMB_TIP) - hand.point(INDEX_TIP)).norm(),
        palm_size,
    }
}

fn is_finger_extended(
    hand: &LandmarkSet,
    finger: Finger,
    wrist: Vector2<f64>,
    palm_size: f64,
) -> bool {
    let (pip, tip) = finger.joints();
    let tip_to_wrist = (hand.point(tip) - wrist).norm();
    let pip_to_wrist = (hand.point(pip) - wrist).norm();
    tip_to_wrist - pip_to_wrist > EXTENSION_TOLERANCE * palm_size
}

// The thumb folds across the palm rather than toward the wrist, so compare
// along x: outward is the side of the index MCP away from the pinky MCP.
fn is_thumb_extended(hand: &LandmarkSet, palm_size: f64) -> bool {
    let across = hand.point(INDEX_MCP).x - hand.point(PINKY_MCP).x;
    if across.abs() < f64::EPSILON {
        return false;
    }
    let lateral = hand.point(THUMB_TIP).x - hand.point(THUMB_IP).x;
    lateral * across.signum() > THUMB_TOLERANCE * palm_size
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{posture_hand, synthetic_hand, Posture};

    fn all_fingers() -> FingerState {
        FingerState {
            thumb: true,
            index: true,
            middle: true,
            ring: true,
            pinky: true,
        }
    }

    #[test]
    fn test_no_hand_has_nothing_extended() {
        let geometry = analyze(None);
        assert!(!geometry.detected);
        assert_eq!(geometry.fingers.extended_count(), 0);
        assert!(geometry.thumb_index_distance.is_infinite());
        assert!(geometry.palm_size.is_infinite());
    }

    #[test]
    fn test_open_palm_extends_every_finger() {
        let hand = synthetic_hand(all_fingers(), false, Vector2::zeros()).unwrap();
        let geometry = analyze(Some(&hand));
        assert!(geometry.detected);
        assert_eq!(geometry.fingers, all_fingers());
        assert!((geometry.palm_size - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_fist_curls_every_finger() {
        let hand = posture_hand(Posture::Fist, Vector2::zeros()).unwrap();
        let geometry = analyze(Some(&hand));
        assert_eq!(geometry.fingers, FingerState::default());
    }

    #[test]
    fn test_each_finger_detected_independently() {
        for finger in Finger::ALL {
            let mut state = FingerState::default();
            match finger {
                Finger::Thumb => state.thumb = true,
                Finger::Index => state.index = true,
                Finger::Middle => state.middle = true,
                Finger::Ring => state.ring = true,
                Finger::Pinky => state.pinky = true,
            }
            let hand = synthetic_hand(state, false, Vector2::zeros()).unwrap();
            assert_eq!(analyze(Some(&hand)).fingers, state, "finger {:?}", finger);
        }
    }

    #[test]
    fn test_thumb_check_mirrors_with_handedness() {
        // Mirror an open hand horizontally: the thumb now points the other way.
        let hand = synthetic_hand(all_fingers(), false, Vector2::zeros()).unwrap();
        let mirrored: Vec<Landmark> = hand
            .landmarks()
            .iter()
            .map(|lm| Landmark::new(1.0 - lm.x, lm.y))
            .collect();
        let mirrored = LandmarkSet::new(&mirrored, hand.confidence()).unwrap();
        assert!(analyze(Some(&mirrored)).fingers.thumb);
    }

    #[test]
    fn test_rejects_non_finite_depth() {
        let mut points = vec![Landmark::with_depth(0.5, 0.5, 0.0); LANDMARK_COUNT];
        points[5].z = Some(f64::INFINITY);
        assert_eq!(
            LandmarkSet::new(&points, 0.9),
            Err(LandmarkError::NonFinite { index: 5 })
        );
        points[5].z = None;
        assert!(LandmarkSet::new(&points, 0.9).is_ok());
    }

    #[test]
    fn test_pinch_distance_is_small() {
        let hand = posture_hand(Posture::Pinch, Vector2::zeros()).unwrap();
        let geometry = analyze(Some(&hand));
        assert!(geometry.thumb_index_distance < 0.25 * geometry.palm_size);
    }

    #[test]
    fn test_rejects_wrong_point_count() {
        let points = vec![Landmark::new(0.5, 0.5); 20];
        assert_eq!(
            LandmarkSet::new(&points, 0.9),
            Err(LandmarkError::WrongPointCount { expected: 21, got: 20 })
        );
    }

    #[test]
    fn test_rejects_non_finite_and_far_out_of_range() {
        let mut points = vec![Landmark::new(0.5, 0.5); LANDMARK_COUNT];
        points[3].y = f64::NAN;
        assert_eq!(
            LandmarkSet::new(&points, 0.9),
            Err(LandmarkError::NonFinite { index: 3 })
        );

        let mut points = vec![Landmark::new(0.5, 0.5); LANDMARK_COUNT];
        points[7].x = 2.0;
        assert!(matches!(
            LandmarkSet::new(&points, 0.9),
            Err(LandmarkError::OutOfRange { index: 7, .. })
        ));
    }

    #[test]
    fn test_rejects_bad_confidence() {
        let points = vec![Landmark::new(0.5, 0.5); LANDMARK_COUNT];
        assert_eq!(
            LandmarkSet::new(&points, 1.5),
            Err(LandmarkError::InvalidConfidence(1.5))
        );
    }

    #[test]
    fn test_clamps_slightly_out_of_frame() {
        let mut points = vec![Landmark::new(0.5, 0.5); LANDMARK_COUNT];
        points[INDEX_TIP] = Landmark::new(-0.1, 1.05);
        let hand = LandmarkSet::new(&points, 0.9).unwrap();
        assert_eq!(hand.point(INDEX_TIP), Vector2::new(0.0, 1.0));
    }

    #[test]
    fn test_index_tip_scaled_to_pixels() {
        let mut points = vec![Landmark::new(0.5, 0.5); LANDMARK_COUNT];
        points[INDEX_TIP] = Landmark::new(0.25, 0.5);
        let hand = LandmarkSet::new(&points, 0.9).unwrap();
        assert_eq!(hand.index_tip_px(1280, 720), Vector2::new(320.0, 360.0));
    }
}
