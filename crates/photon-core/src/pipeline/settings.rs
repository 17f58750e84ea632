use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::frame::ImageRotationMode;
use crate::pipe::detect::TagFamily;
use crate::pipe::draw::FrameDivisor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineType {
    AprilTag,
    DriverMode,
}

impl fmt::Display for PipelineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineType::AprilTag => write!(f, "apriltag"),
            PipelineType::DriverMode => write!(f, "driver-mode"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AprilTagPipelineSettings {
    pub input_rotation: ImageRotationMode,
    /// Keep a color copy of each frame for annotation when the capture
    /// hardware delivers single-channel frames.
    pub input_should_show: bool,
    pub output_should_draw: bool,
    /// Produce annotated and processed frames alongside the targets.
    pub stream_frames: bool,
    pub tag_family: TagFamily,
    pub max_hamming: u32,
    pub solve_pnp: bool,
    pub tag_size_meters: f64,
    pub streaming_frame_divisor: FrameDivisor,
}

impl Default for AprilTagPipelineSettings {
    fn default() -> Self {
        Self {
            input_rotation: ImageRotationMode::Deg0,
            input_should_show: true,
            output_should_draw: true,
            stream_frames: true,
            tag_family: TagFamily::Tag36h11,
            max_hamming: 0,
            solve_pnp: false,
            tag_size_meters: 0.1651,
            streaming_frame_divisor: FrameDivisor::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriverModePipelineSettings {
    pub input_rotation: ImageRotationMode,
    pub crosshair: bool,
    pub streaming_frame_divisor: FrameDivisor,
}

impl Default for DriverModePipelineSettings {
    fn default() -> Self {
        Self {
            input_rotation: ImageRotationMode::Deg0,
            crosshair: true,
            streaming_frame_divisor: FrameDivisor::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineSettings {
    AprilTag(AprilTagPipelineSettings),
    DriverMode(DriverModePipelineSettings),
}

impl PipelineSettings {
    pub fn pipeline_type(&self) -> PipelineType {
        match self {
            PipelineSettings::AprilTag(_) => PipelineType::AprilTag,
            PipelineSettings::DriverMode(_) => PipelineType::DriverMode,
        }
    }
}

/// Cloneable handle for changing a pipeline's settings from another thread.
///
/// Updates land in a pending slot; the runner drains it between frames, so a
/// frame always sees one complete settings value. Only the latest update
/// before a frame boundary is applied.
#[derive(Debug, Clone, Default)]
pub struct SettingsHandle {
    pending: Arc<Mutex<Option<PipelineSettings>>>,
}

impl SettingsHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, settings: PipelineSettings) {
        *self.pending.lock() = Some(settings);
    }

    pub fn take_pending(&self) -> Option<PipelineSettings> {
        self.pending.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_update_wins() {
        let handle = SettingsHandle::new();
        let remote = handle.clone();
        remote.update(PipelineSettings::DriverMode(DriverModePipelineSettings::default()));
        remote.update(PipelineSettings::AprilTag(AprilTagPipelineSettings {
            max_hamming: 2,
            ..AprilTagPipelineSettings::default()
        }));

        match handle.take_pending() {
            Some(PipelineSettings::AprilTag(s)) => assert_eq!(s.max_hamming, 2),
            other => panic!("unexpected pending settings: {other:?}"),
        }
        assert!(handle.take_pending().is_none());
    }
}
