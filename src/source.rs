// src/source.rs - frame sources standing in for camera + hand detector
use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use nalgebra::Vector2;

use crate::geometry::{FingerState, Landmark, LandmarkError, LandmarkSet, LANDMARK_COUNT};
use crate::pipeline::Frame;

pub const REPLAY_ENV: &str = "AIR_WRITER_REPLAY";
/// Drop the hand on every Nth simulated frame.
pub const SIM_DROPOUT_ENV: &str = "AIR_WRITER_SIM_DROPOUT";

/// Yields one frame per call; `Ok(None)` ends the stream.
pub trait FrameSource {
    fn detect(&mut self) -> Result<Option<Frame>>;
}

/// Recorded session in CSV: `timestamp_ms,confidence,x0,y0,z0,...,x20,y20,z20`.
/// Rows with empty landmark fields are frames without a hand.
pub struct ReplaySource<R: Read> {
    records: csv::StringRecordsIntoIter<R>,
    row: usize,
}

impl ReplaySource<File> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Cannot open replay file: {}", path.display()))?;
        Ok(Self::from_reader(file))
    }
}

impl<R: Read> ReplaySource<R> {
    pub fn from_reader(reader: R) -> Self {
        let records = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader)
            .into_records();
        Self { records, row: 1 }
    }

    fn parse(&self, record: &csv::StringRecord) -> Result<Frame> {
        let field = |i: usize| record.get(i).unwrap_or("");

        let timestamp_ms: u64 = field(0)
            .parse()
            .map_err(|_| anyhow!("row {}: bad timestamp {:?}", self.row, field(0)))?;

        let coords: Vec<&str> = record.iter().skip(2).collect();
        if coords.iter().all(|c| c.is_empty()) {
            return Ok(Frame::empty(timestamp_ms));
        }
        if coords.len() % 3 != 0 {
            return Err(anyhow!(
                "row {}: {} landmark fields, expected triples of x,y,z",
                self.row,
                coords.len()
            ));
        }

        let confidence: f64 = field(1)
            .parse()
            .map_err(|_| anyhow!("row {}: bad confidence {:?}", self.row, field(1)))?;

        let number = |s: &str| -> Result<f64> {
            s.parse()
                .map_err(|_| anyhow!("row {}: bad coordinate {:?}", self.row, s))
        };
        let mut points = Vec::with_capacity(coords.len() / 3);
        for xyz in coords.chunks(3) {
            let z = if xyz[2].is_empty() { None } else { Some(number(xyz[2])?) };
            points.push(Landmark {
                x: number(xyz[0])?,
                y: number(xyz[1])?,
                z,
            });
        }

        let hand = LandmarkSet::new(&points, confidence)
            .with_context(|| format!("row {}: rejected landmarks", self.row))?;
        Ok(Frame::new(timestamp_ms, Some(hand)))
    }
}

impl<R: Read> FrameSource for ReplaySource<R> {
    fn detect(&mut self) -> Result<Option<Frame>> {
        let Some(record) = self.records.next() else {
            return Ok(None);
        };
        self.row += 1;
        let record = record.with_context(|| format!("row {}: unreadable CSV", self.row))?;
        self.parse(&record).map(Some)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Posture {
    IndexUp,
    Fist,
    TwoFingersUp,
    Pinch,
    OpenPalm,
}

impl Posture {
    pub fn fingers(self) -> FingerState {
        match self {
            Posture::IndexUp => FingerState {
                index: true,
                ..Default::default()
            },
            Posture::Fist | Posture::Pinch => FingerState::default(),
            Posture::TwoFingersUp => FingerState {
                index: true,
                middle: true,
                ..Default::default()
            },
            Posture::OpenPalm => FingerState {
                thumb: true,
                index: true,
                middle: true,
                ring: true,
                pinky: true,
            },
        }
    }
}

pub fn posture_hand(posture: Posture, offset: Vector2<f64>) -> Result<LandmarkSet, LandmarkError> {
    synthetic_hand(posture.fingers(), posture == Posture::Pinch, offset)
}

/// Builds a right hand, palm to camera, with the requested fingers extended.
/// Palm size (wrist to middle MCP) is 0.2. `pinch` puts the thumb tip on
/// the index tip. The whole hand is shifted by `offset`.
pub fn synthetic_hand(
    fingers: FingerState,
    pinch: bool,
    offset: Vector2<f64>,
) -> Result<LandmarkSet, LandmarkError> {
    // (extended, curled) positions per joint; MCPs first, then PIP, DIP, TIP
    const INDEX: [(f64, f64); 4] = [(0.45, 0.60), (0.45, 0.53), (0.45, 0.49), (0.45, 0.45)];
    const INDEX_CURLED: [(f64, f64); 3] = [(0.45, 0.56), (0.46, 0.60), (0.46, 0.63)];
    const MIDDLE: [(f64, f64); 4] = [(0.50, 0.60), (0.50, 0.52), (0.50, 0.47), (0.50, 0.43)];
    const MIDDLE_CURLED: [(f64, f64); 3] = [(0.50, 0.55), (0.51, 0.59), (0.51, 0.62)];
    const RING: [(f64, f64); 4] = [(0.55, 0.61), (0.56, 0.54), (0.565, 0.50), (0.57, 0.46)];
    const RING_CURLED: [(f64, f64); 3] = [(0.55, 0.57), (0.54, 0.61), (0.54, 0.64)];
    const PINKY: [(f64, f64); 4] = [(0.60, 0.63), (0.62, 0.57), (0.63, 0.54), (0.64, 0.51)];
    const PINKY_CURLED: [(f64, f64); 3] = [(0.60, 0.60), (0.59, 0.63), (0.58, 0.66)];

    let mut points: Vec<(f64, f64)> = Vec::with_capacity(LANDMARK_COUNT);
    points.push((0.50, 0.80)); // wrist
    points.push((0.44, 0.76));
    points.push((0.40, 0.72));
    points.push((0.37, 0.68));
    points.push(if fingers.thumb { (0.32, 0.64) } else { (0.50, 0.70) });

    let chains = [
        (fingers.index, INDEX, INDEX_CURLED),
        (fingers.middle, MIDDLE, MIDDLE_CURLED),
        (fingers.ring, RING, RING_CURLED),
        (fingers.pinky, PINKY, PINKY_CURLED),
    ];
    for (extended, straight, curled) in chains {
        points.push(straight[0]);
        if extended {
            points.extend_from_slice(&straight[1..]);
        } else {
            points.extend_from_slice(&curled);
        }
    }

    if pinch {
        let (x, y) = points[crate::geometry::INDEX_TIP];
        points[crate::geometry::THUMB_TIP] = (x + 0.01, y + 0.01);
    }

    let landmarks: Vec<Landmark> = points
        .into_iter()
        .map(|(x, y)| Landmark::new(x + offset.x, y + offset.y))
        .collect();
    LandmarkSet::new(&landmarks, 0.95)
}

/// Scripted session used when no recording is supplied: writes two strokes,
/// adds a space, fumbles a tap, then pinches the canvas clear and writes one
/// more stroke so the session ends with something on screen.
pub struct SimulatedSource {
    script: Vec<(Posture, usize)>,
    step: usize,
    frame_in_step: usize,
    frame: u64,
    frame_ms: u64,
    // Fingertip path offset shared across steps so strokes move smoothly.
    pen: Vector2<f64>,
    dropout_every: Option<u64>,
}

impl SimulatedSource {
    pub fn new() -> Self {
        Self::with_script(vec![
            (Posture::OpenPalm, 10),
            (Posture::IndexUp, 40),
            (Posture::Fist, 10),
            (Posture::TwoFingersUp, 10),
            (Posture::IndexUp, 30),
            (Posture::Fist, 10),
            (Posture::IndexUp, 6),
            (Posture::Fist, 10),
            (Posture::Pinch, 10),
            (Posture::OpenPalm, 5),
            (Posture::IndexUp, 30),
            (Posture::Fist, 10),
        ])
    }

    pub fn with_script(script: Vec<(Posture, usize)>) -> Self {
        Self {
            script,
            step: 0,
            frame_in_step: 0,
            frame: 0,
            frame_ms: 33,
            pen: Vector2::zeros(),
            dropout_every: None,
        }
    }

    /// Drop the hand on every `n`th frame to exercise detection gaps.
    pub fn with_dropouts(mut self, n: u64) -> Self {
        self.dropout_every = Some(n.max(2));
        self
    }

    /// Default script, with dropouts taken from `$AIR_WRITER_SIM_DROPOUT`.
    pub fn from_env() -> Result<Self> {
        Self::new().dropouts_from_setting(std::env::var(SIM_DROPOUT_ENV).ok().as_deref())
    }

    fn dropouts_from_setting(self, setting: Option<&str>) -> Result<Self> {
        let Some(raw) = setting.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(self);
        };
        let n: u64 = raw
            .parse()
            .with_context(|| format!("{} must be a frame count, got {:?}", SIM_DROPOUT_ENV, raw))?;
        Ok(self.with_dropouts(n))
    }
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for SimulatedSource {
    fn detect(&mut self) -> Result<Option<Frame>> {
        while let Some(&(_, frames)) = self.script.get(self.step) {
            if self.frame_in_step < frames {
                break;
            }
            self.step += 1;
            self.frame_in_step = 0;
        }
        let Some(&(posture, _)) = self.script.get(self.step) else {
            return Ok(None);
        };

        self.frame += 1;
        self.frame_in_step += 1;
        let timestamp_ms = self.frame * self.frame_ms;

        if self.dropout_every.is_some_and(|n| self.frame % n == 0) {
            return Ok(Some(Frame::empty(timestamp_ms)));
        }

        if posture == Posture::IndexUp {
            let t = self.frame as f64 * 0.15;
            self.pen = Vector2::new(0.08 * t.sin(), 0.04 * (2.0 * t).sin());
        }
        let hand = posture_hand(posture, self.pen)?;
        Ok(Some(Frame::new(timestamp_ms, Some(hand))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> String {
        let mut cols = vec!["timestamp_ms".to_string(), "confidence".to_string()];
        for i in 0..LANDMARK_COUNT {
            cols.push(format!("x{}", i));
            cols.push(format!("y{}", i));
            cols.push(format!("z{}", i));
        }
        cols.join(",")
    }

    fn row(timestamp: u64, hand: &LandmarkSet) -> String {
        let mut fields = vec![timestamp.to_string(), hand.confidence().to_string()];
        for lm in hand.landmarks() {
            fields.push(lm.x.to_string());
            fields.push(lm.y.to_string());
            fields.push(String::new());
        }
        fields.join(",")
    }

    fn drain(source: &mut impl FrameSource) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        while let Some(frame) = source.detect()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    #[test]
    fn test_replay_reads_hands_and_gaps() {
        let hand = posture_hand(Posture::IndexUp, Vector2::zeros()).unwrap();
        let csv = format!("{}\n{}\n66,,\n{}\n", header(), row(33, &hand), row(99, &hand));
        let mut source = ReplaySource::from_reader(csv.as_bytes());

        let frames = drain(&mut source).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].timestamp_ms, 33);
        assert_eq!(frames[0].hand.as_ref(), Some(&hand));
        assert!(frames[1].hand.is_none());
        assert_eq!(frames[2].timestamp_ms, 99);
    }

    #[test]
    fn test_replay_rejects_short_hand() {
        let csv = format!("{}\n10,0.9,0.5,0.5,0.0,0.4,0.4,0.0\n", header());
        let mut source = ReplaySource::from_reader(csv.as_bytes());
        let err = source.detect().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LandmarkError>(),
            Some(LandmarkError::WrongPointCount { got: 2, .. })
        ));
    }

    #[test]
    fn test_replay_rejects_garbage() {
        let csv = format!("{}\nsoon,0.9\n", header());
        let mut source = ReplaySource::from_reader(csv.as_bytes());
        assert!(source.detect().is_err());
    }

    #[test]
    fn test_simulation_runs_script() {
        let script = vec![(Posture::Fist, 3), (Posture::IndexUp, 2)];
        let mut source = SimulatedSource::with_script(script);
        let frames = drain(&mut source).unwrap();
        assert_eq!(frames.len(), 5);
        assert!(frames.iter().all(|f| f.hand.is_some()));
        assert_eq!(frames[4].timestamp_ms, 5 * 33);
    }

    #[test]
    fn test_simulation_dropouts() {
        let mut source =
            SimulatedSource::with_script(vec![(Posture::IndexUp, 10)]).with_dropouts(5);
        let frames = drain(&mut source).unwrap();
        let gaps = frames.iter().filter(|f| f.hand.is_none()).count();
        assert_eq!(gaps, 2);
    }

    #[test]
    fn test_dropout_setting() {
        let source = SimulatedSource::new().dropouts_from_setting(Some(" 7 ")).unwrap();
        assert_eq!(source.dropout_every, Some(7));

        let source = SimulatedSource::new().dropouts_from_setting(None).unwrap();
        assert_eq!(source.dropout_every, None);

        assert!(SimulatedSource::new().dropouts_from_setting(Some("often")).is_err());
    }

    #[test]
    fn test_offset_shifts_whole_hand() {
        let base = posture_hand(Posture::Fist, Vector2::zeros()).unwrap();
        let moved = posture_hand(Posture::Fist, Vector2::new(0.1, -0.05)).unwrap();
        for (a, b) in base.landmarks().iter().zip(moved.landmarks()) {
            assert!((b.x - a.x - 0.1).abs() < 1e-9);
            assert!((b.y - a.y + 0.05).abs() < 1e-9);
        }
    }
}
