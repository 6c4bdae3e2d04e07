// src/strokes.rs
use nalgebra::Vector2;
use serde::Serialize;
use tracing::{debug, warn};

use crate::smoothing::StrokeSmoother;
use crate::writing::Command;

/// Strokes with fewer points are treated as accidental taps.
pub const MIN_STROKE_POINTS: usize = 3;

/// Fingertip sample in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub timestamp_ms: u64,
}

impl Point {
    pub fn new(x: f64, y: f64, timestamp_ms: u64) -> Self {
        Self { x, y, timestamp_ms }
    }

    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        (self.position() - other.position()).norm()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    points: Vec<Point>,
    start_time: u64,
    end_time: Option<u64>,
    smoothed: Vec<Vector2<f64>>,
}

impl Stroke {
    fn new(start_time: u64) -> Self {
        Self {
            points: Vec::new(),
            start_time,
            end_time: None,
            smoothed: Vec::new(),
        }
    }

    /// Raw, distance-filtered samples.
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    /// Set once the stroke is sealed.
    pub fn end_time(&self) -> Option<u64> {
        self.end_time
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.end_time.map(|end| end.saturating_sub(self.start_time))
    }

    /// Display path. Falls back to the raw points when nothing was smoothed.
    pub fn display_points(&self) -> Vec<Vector2<f64>> {
        if self.smoothed.is_empty() {
            self.points.iter().map(Point::position).collect()
        } else {
            self.smoothed.clone()
        }
    }

    pub fn last_point(&self) -> Option<&Point> {
        self.points.last()
    }
}

/// Sealed strokes plus the one being drawn.
#[derive(Debug, Clone, Default)]
pub struct StrokeHistory {
    sealed: Vec<Stroke>,
    current: Option<Stroke>,
}

impl StrokeHistory {
    pub fn sealed(&self) -> &[Stroke] {
        &self.sealed
    }

    pub fn current(&self) -> Option<&Stroke> {
        self.current.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.sealed.is_empty() && self.current.is_none()
    }

    pub fn total_points(&self) -> usize {
        self.sealed.iter().map(Stroke::len).sum::<usize>()
            + self.current.as_ref().map_or(0, Stroke::len)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SessionStats {
    pub stroke_count: u32,
    pub space_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrokeOutcome {
    Sealed { points: usize },
    Discarded { points: usize },
    NotTracking,
}

pub struct StrokeTracker {
    history: StrokeHistory,
    stats: SessionStats,
    min_distance_threshold: f64,
    smoother: StrokeSmoother,
}

impl StrokeTracker {
    pub fn new(min_distance_threshold: f64, smoother: StrokeSmoother) -> Self {
        Self {
            history: StrokeHistory::default(),
            stats: SessionStats::default(),
            min_distance_threshold,
            smoother,
        }
    }

    pub fn history(&self) -> &StrokeHistory {
        &self.history
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn is_drawing(&self) -> bool {
        self.history.current.is_some()
    }

    pub fn apply(&mut self, command: Command, now_ms: u64) {
        match command {
            Command::StartStroke => self.start_stroke(now_ms),
            Command::EndStroke => {
                self.end_stroke(now_ms);
            }
            Command::AddSpace => self.add_space(),
            Command::ClearCanvas => self.clear(),
        }
    }

    pub fn start_stroke(&mut self, now_ms: u64) {
        if let Some(open) = self.history.current.take() {
            warn!("starting a stroke while one is open; dropping {} points", open.len());
        }
        self.history.current = Some(Stroke::new(now_ms));
    }

    /// Adds a fingertip sample to the open stroke. The first sample anchors
    /// the stroke; later ones must move at least the threshold away from the
    /// last stored point. A kept sample refreshes the live display path.
    /// Returns whether the point was kept.
    pub fn add_sample(&mut self, point: Point) -> bool {
        let Some(stroke) = self.history.current.as_mut() else {
            return false;
        };
        let keep = stroke
            .last_point()
            .map_or(true, |last| last.distance_to(&point) >= self.min_distance_threshold);
        if keep {
            stroke.points.push(point);
            let raw: Vec<Vector2<f64>> = stroke.points.iter().map(Point::position).collect();
            stroke.smoothed = self.smoother.smooth_live(&raw);
        }
        keep
    }

    pub fn end_stroke(&mut self, now_ms: u64) -> StrokeOutcome {
        let Some(mut stroke) = self.history.current.take() else {
            return StrokeOutcome::NotTracking;
        };
        stroke.end_time = Some(now_ms);

        let points = stroke.len();
        if points < MIN_STROKE_POINTS {
            debug!("discarding stroke with {} points", points);
            return StrokeOutcome::Discarded { points };
        }

        let raw: Vec<Vector2<f64>> = stroke.points.iter().map(Point::position).collect();
        if self.smoother.config().enabled {
            stroke.smoothed = self.smoother.smooth(&raw);
        }
        self.history.sealed.push(stroke);
        self.stats.stroke_count += 1;
        StrokeOutcome::Sealed { points }
    }

    pub fn add_space(&mut self) {
        self.stats.space_count += 1;
    }

    /// Empties the canvas. An open stroke is dropped without sealing.
    pub fn clear(&mut self) {
        self.history = StrokeHistory::default();
        self.stats.stroke_count = 0;
    }

    pub fn undo_last_stroke(&mut self) -> Option<Stroke> {
        let stroke = self.history.sealed.pop()?;
        self.stats.stroke_count = self.stats.stroke_count.saturating_sub(1);
        Some(stroke)
    }
}
