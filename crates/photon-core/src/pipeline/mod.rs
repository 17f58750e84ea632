//! Per-camera orchestration of the pipes.
//!
//! A pipeline owns its pipes and processes one frame at a time. Which stages
//! run for a frame depends on what the capture path already did to it, so the
//! recorded stage timings, and the latency derived from them, only ever cover
//! the stages that actually ran.

pub mod apriltag;
pub mod driver;
pub mod settings;

use std::fmt;

use thiserror::Error;

use photon_targeting::{PipelineResult, TrackedTarget};

use crate::frame::Frame;
use crate::pipe::PipeResult;

pub use settings::{
    AprilTagPipelineSettings, DriverModePipelineSettings, PipelineSettings, PipelineType,
    SettingsHandle,
};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{found} settings cannot configure a {expected} pipeline")]
pub struct SettingsMismatch {
    pub expected: PipelineType,
    pub found: PipelineType,
}

pub trait CvPipeline: Send {
    fn pipeline_type(&self) -> PipelineType;

    /// Replace all parameters at once; takes effect from the next frame.
    fn set_settings(&mut self, settings: PipelineSettings) -> Result<(), SettingsMismatch>;

    fn process(&mut self, frame: Frame) -> CvPipelineResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Rotate,
    Grayscale,
    Detect,
    CollectTargets,
    Draw,
    Crosshair,
    Fps,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Rotate => "rotate",
            Stage::Grayscale => "grayscale",
            Stage::Detect => "detect",
            Stage::CollectTargets => "collect_targets",
            Stage::Draw => "draw",
            Stage::Crosshair => "crosshair",
            Stage::Fps => "fps",
        };
        f.write_str(name)
    }
}

/// Elapsed time of each stage that ran for one frame, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageTimings {
    entries: Vec<(Stage, u64)>,
}

impl StageTimings {
    /// Record `result`'s timing under `stage` and unwrap its output.
    pub fn record<T>(&mut self, stage: Stage, result: PipeResult<T>) -> T {
        self.entries.push((stage, result.nanos_elapsed));
        result.output
    }

    pub fn get(&self, stage: Stage) -> Option<u64> {
        self.entries.iter().find(|(s, _)| *s == stage).map(|(_, nanos)| *nanos)
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.get(stage).is_some()
    }

    pub fn stages(&self) -> impl Iterator<Item = Stage> + '_ {
        self.entries.iter().map(|(s, _)| *s)
    }

    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, nanos)| nanos).sum()
    }
}

/// What one frame produced.
#[derive(Debug, Clone)]
pub struct CvPipelineResult {
    /// Sum of `stage_timings`.
    pub latency_nanos: u64,
    pub fps: f64,
    pub targets: Vec<TrackedTarget>,
    pub stage_timings: StageTimings,
    /// Annotated color frame, when produced.
    pub input_frame: Option<Frame>,
    /// Processed single-channel frame, when produced.
    pub output_frame: Option<Frame>,
}

impl CvPipelineResult {
    pub fn new(
        stage_timings: StageTimings,
        fps: f64,
        targets: Vec<TrackedTarget>,
        input_frame: Option<Frame>,
        output_frame: Option<Frame>,
    ) -> Self {
        Self {
            latency_nanos: stage_timings.total(),
            fps,
            targets,
            stage_timings,
            input_frame,
            output_frame,
        }
    }

    pub fn latency_millis(&self) -> f64 {
        self.latency_nanos as f64 / 1e6
    }

    pub fn has_targets(&self) -> bool {
        !self.targets.is_empty()
    }

    /// The wire form of this result.
    pub fn to_wire(&self, sequence_id: i64) -> PipelineResult {
        PipelineResult::new(sequence_id, self.latency_millis(), self.targets.clone())
    }
}
