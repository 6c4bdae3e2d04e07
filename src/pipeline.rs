// src/pipeline.rs - per-frame gesture and stroke pipeline
use std::collections::VecDeque;
use std::time::Instant;

use tracing::{debug, info};

use crate::config::{AirWriterConfig, ConfigError};
use crate::geometry::{analyze, LandmarkError, LandmarkSet};
use crate::gesture::{classify, GestureDebouncer, GestureEvent, GestureLabel};
use crate::report::SessionReport;
use crate::smoothing::StrokeSmoother;
use crate::strokes::{Point, SessionStats, StrokeHistory, StrokeOutcome, StrokeTracker};
use crate::writing::{Command, WritingState, WritingStateMachine};

/// One captured frame as handed over by a detector.
#[derive(Debug, Clone)]
pub struct Frame {
    pub timestamp_ms: u64,
    pub hand: Option<LandmarkSet>,
}

impl Frame {
    pub fn new(timestamp_ms: u64, hand: Option<LandmarkSet>) -> Self {
        Self { timestamp_ms, hand }
    }

    pub fn empty(timestamp_ms: u64) -> Self {
        Self::new(timestamp_ms, None)
    }
}

/// What a renderer needs after each frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutput {
    pub writing_state: WritingState,
    pub gesture: GestureEvent,
    /// Raw, undebounced classification of this frame.
    pub frame_label: GestureLabel,
    pub command: Option<Command>,
    pub fingertip: Option<Point>,
}

#[derive(Clone, Debug)]
pub struct FrameMetrics {
    pub avg_fps: f32,
    pub avg_processing_time: f32,
    frame_times: VecDeque<f32>,
}

impl FrameMetrics {
    const WINDOW: usize = 30;

    pub fn new() -> Self {
        Self {
            avg_fps: 0.0,
            avg_processing_time: 0.0,
            frame_times: VecDeque::with_capacity(Self::WINDOW),
        }
    }

    fn record(&mut self, seconds: f32) {
        self.frame_times.push_front(seconds);
        if self.frame_times.len() > Self::WINDOW {
            self.frame_times.pop_back();
        }
        self.avg_processing_time =
            self.frame_times.iter().sum::<f32>() / self.frame_times.len() as f32;
        self.avg_fps = if self.avg_processing_time > 0.0 {
            1.0 / self.avg_processing_time
        } else {
            0.0
        };
    }
}

impl Default for FrameMetrics {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AirWriter {
    config: AirWriterConfig,
    debouncer: GestureDebouncer,
    machine: WritingStateMachine,
    tracker: StrokeTracker,
    metrics: FrameMetrics,
    dropout_frames: u32,
    frames_processed: u64,
    frames_with_hand: u64,
}

impl AirWriter {
    pub fn new(config: AirWriterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let smoother = StrokeSmoother::new(config.smoothing.clone());
        Ok(Self {
            debouncer: GestureDebouncer::new(config.hold_frames),
            machine: WritingStateMachine::new(),
            tracker: StrokeTracker::new(config.min_distance_threshold, smoother),
            metrics: FrameMetrics::new(),
            dropout_frames: 0,
            frames_processed: 0,
            frames_with_hand: 0,
            config,
        })
    }

    pub fn config(&self) -> &AirWriterConfig {
        &self.config
    }

    pub fn writing_state(&self) -> WritingState {
        self.machine.state()
    }

    pub fn gesture(&self) -> &GestureEvent {
        self.debouncer.event()
    }

    pub fn previous_gesture(&self) -> GestureLabel {
        self.debouncer.previous_label()
    }

    pub fn history(&self) -> &StrokeHistory {
        self.tracker.history()
    }

    pub fn stats(&self) -> SessionStats {
        self.tracker.stats()
    }

    pub fn undo_last_stroke(&mut self) -> bool {
        self.tracker.undo_last_stroke().is_some()
    }

    /// Validates raw detector output, then processes it as one frame.
    pub fn process_landmarks(
        &mut self,
        timestamp_ms: u64,
        hand: Option<(&[[f64; 3]], f64)>,
    ) -> Result<FrameOutput, LandmarkError> {
        let hand = hand
            .map(|(coords, confidence)| LandmarkSet::from_coords(coords, confidence))
            .transpose()?;
        Ok(self.process_frame(&Frame::new(timestamp_ms, hand)))
    }

    pub fn process_frame_with_metrics(&mut self, frame: &Frame) -> (FrameOutput, FrameMetrics) {
        let start = Instant::now();
        let output = self.process_frame(frame);
        self.metrics.record(start.elapsed().as_secs_f32());
        (output, self.metrics.clone())
    }

    pub fn process_frame(&mut self, frame: &Frame) -> FrameOutput {
        let now = frame.timestamp_ms;
        self.frames_processed += 1;

        let hand = frame
            .hand
            .as_ref()
            .filter(|h| h.confidence() >= self.config.min_detection_confidence);
        if hand.is_some() {
            self.frames_with_hand += 1;
        }

        let geometry = analyze(hand);
        let frame_label = classify(&geometry, self.config.pinch_ratio);

        let mut command = self
            .debouncer
            .update(frame_label)
            .and_then(|label| {
                debug!("Stable gesture: {}", label.as_str());
                self.machine.on_stable_change(label)
            });
        if let Some(cmd) = command {
            self.execute(cmd, now);
        }

        if hand.is_none() && self.machine.is_writing() {
            self.dropout_frames += 1;
            if self
                .config
                .dropout_end_frames
                .is_some_and(|limit| self.dropout_frames >= limit)
            {
                info!("[GESTURE] Hand lost for {} frames, ending stroke", self.dropout_frames);
                self.machine.force_idle();
                // Forget the held gesture so a returning index finger starts a new stroke.
                self.debouncer.reset();
                self.execute(Command::EndStroke, now);
                command = Some(Command::EndStroke);
            }
        } else {
            self.dropout_frames = 0;
        }

        let fingertip = hand.map(|h| {
            let px = h.index_tip_px(self.config.frame_width, self.config.frame_height);
            Point::new(px.x, px.y, now)
        });
        if let Some(point) = fingertip.filter(|_| self.machine.is_writing()) {
            self.tracker.add_sample(point);
        }

        FrameOutput {
            writing_state: self.machine.state(),
            gesture: *self.debouncer.event(),
            frame_label,
            command,
            fingertip,
        }
    }

    fn execute(&mut self, command: Command, now: u64) {
        match command {
            Command::StartStroke => {
                self.tracker.start_stroke(now);
                info!("[GESTURE] Writing started");
            }
            Command::EndStroke => {
                match self.tracker.end_stroke(now) {
                    StrokeOutcome::Sealed { points } => {
                        info!("[GESTURE] Stroke completed: {} points", points)
                    }
                    StrokeOutcome::Discarded { points } => {
                        debug!("[GESTURE] Stroke too short ({} points), discarded", points)
                    }
                    StrokeOutcome::NotTracking => {}
                }
                info!("[GESTURE] Writing stopped");
            }
            Command::AddSpace => {
                self.tracker.add_space();
                info!("[GESTURE] Space added (total: {})", self.tracker.stats().space_count);
            }
            Command::ClearCanvas => {
                self.tracker.clear();
                info!("[GESTURE] Canvas cleared");
            }
        }
    }

    /// Final state for the shutdown summary.
    pub fn finish(&self, session_name: Option<String>) -> SessionReport {
        SessionReport::new(
            session_name,
            self.tracker.stats(),
            self.tracker.history(),
            self.frames_processed,
            self.frames_with_hand,
        )
    }
}
