// src/main.rs
use anyhow::Result;
use tracing::{info, warn};

use air_writer::config::AirWriterConfig;
use air_writer::pipeline::AirWriter;
use air_writer::source::{
    FrameSource, ReplaySource, SimulatedSource, REPLAY_ENV, SIM_DROPOUT_ENV,
};

const FPS_LOG_INTERVAL: u64 = 90;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let config = AirWriterConfig::load()?;
    info!(
        "Hold {} frames, pinch ratio {}, smoothing {:?}",
        config.hold_frames, config.pinch_ratio, config.smoothing.method
    );

    let mut source: Box<dyn FrameSource> = match std::env::var(REPLAY_ENV) {
        Ok(path) => {
            info!("Replaying landmarks from {}", path);
            Box::new(ReplaySource::open(&path)?)
        }
        Err(_) => {
            warn!("{} not set, running in simulation mode", REPLAY_ENV);
            let simulated = SimulatedSource::from_env()?;
            if std::env::var(SIM_DROPOUT_ENV).is_ok() {
                info!("Simulated hand dropouts enabled via {}", SIM_DROPOUT_ENV);
            }
            Box::new(simulated)
        }
    };

    let mut writer = AirWriter::new(config)?;
    let mut frames: u64 = 0;

    while let Some(frame) = source.detect()? {
        let (output, metrics) = writer.process_frame_with_metrics(&frame);
        frames += 1;

        if frames % FPS_LOG_INTERVAL == 0 {
            info!(
                "FPS: {:.1}, processing {:.3} ms, state {:?}, gesture {}",
                metrics.avg_fps,
                metrics.avg_processing_time * 1000.0,
                output.writing_state,
                output.gesture.label.as_str()
            );
        }
    }

    println!("{}", writer.finish(None));
    Ok(())
}
