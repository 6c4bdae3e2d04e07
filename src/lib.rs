// src/lib.rs
pub mod config;
pub mod geometry;
pub mod gesture;
pub mod pipeline;
pub mod report;
pub mod smoothing;
pub mod source;
pub mod strokes;
pub mod writing;

pub use config::AirWriterConfig;
pub use pipeline::{AirWriter, Frame, FrameOutput};
