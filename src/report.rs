// src/report.rs
use std::fmt;

use chrono::Local;
use serde::Serialize;

use crate::strokes::{SessionStats, StrokeHistory};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    pub session_name: String,
    pub stats: SessionStats,
    /// Strokes on the canvas at shutdown (clears and undos remove them).
    pub sealed_strokes: usize,
    pub total_points: usize,
    pub frames_processed: u64,
    pub frames_with_hand: u64,
}

impl SessionReport {
    pub fn new(
        session_name: Option<String>,
        stats: SessionStats,
        history: &StrokeHistory,
        frames_processed: u64,
        frames_with_hand: u64,
    ) -> Self {
        let session_name = session_name.unwrap_or_else(|| {
            format!("session_{}", Local::now().format("%Y%m%d_%H%M%S"))
        });
        Self {
            session_name,
            stats,
            sealed_strokes: history.sealed().len(),
            total_points: history.total_points(),
            frames_processed,
            frames_with_hand,
        }
    }

    /// Share of frames that carried a usable hand, 0.0 for an empty session.
    pub fn hand_coverage(&self) -> f64 {
        if self.frames_processed == 0 {
            0.0
        } else {
            self.frames_with_hand as f64 / self.frames_processed as f64
        }
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(50);
        writeln!(f, "{}", rule)?;
        writeln!(f, "SESSION SUMMARY ({})", self.session_name)?;
        writeln!(f, "{}", rule)?;
        writeln!(f, "Total Strokes: {}", self.stats.stroke_count)?;
        writeln!(f, "Spaces Added: {}", self.stats.space_count)?;
        writeln!(f, "Strokes On Canvas: {}", self.sealed_strokes)?;
        writeln!(f, "Stroke Points: {}", self.total_points)?;
        writeln!(
            f,
            "Frames: {} ({:.1}% with hand)",
            self.frames_processed,
            self.hand_coverage() * 100.0
        )?;
        write!(f, "{}", rule)
    }
}
