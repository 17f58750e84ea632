use tracing::{debug, info};

use super::{
    CvPipeline, CvPipelineResult, DriverModePipelineSettings, PipelineSettings, PipelineType,
    SettingsMismatch, Stage, StageTimings,
};
use crate::frame::{Frame, FrameImage};
use crate::pipe::draw::{DrawCrosshairParams, DrawCrosshairPipe};
use crate::pipe::fps::CalculateFpsPipe;
use crate::pipe::rotate::{RotateImageParams, RotateImagePipe};
use crate::pipe::{Configure, Pipe};

/// Plain driver camera feed with a crosshair; produces no targets.
#[derive(Debug)]
pub struct DriverModePipeline {
    settings: DriverModePipelineSettings,
    dirty: bool,
    rotate: RotateImagePipe,
    crosshair: DrawCrosshairPipe,
    fps: CalculateFpsPipe,
}

impl DriverModePipeline {
    pub fn new(settings: DriverModePipelineSettings) -> Self {
        Self {
            settings,
            dirty: true,
            rotate: RotateImagePipe::default(),
            crosshair: DrawCrosshairPipe::default(),
            fps: CalculateFpsPipe::default(),
        }
    }

    fn configure(&mut self) {
        let s = &self.settings;
        self.rotate.set_params(RotateImageParams {
            rotation: s.input_rotation,
        });
        self.crosshair.set_params(DrawCrosshairParams {
            enabled: s.crosshair,
            divisor: s.streaming_frame_divisor,
        });
        info!(
            rotation = %s.input_rotation,
            crosshair = s.crosshair,
            "driver mode pipeline configured"
        );
        self.dirty = false;
    }
}

impl CvPipeline for DriverModePipeline {
    fn pipeline_type(&self) -> PipelineType {
        PipelineType::DriverMode
    }

    fn set_settings(&mut self, settings: PipelineSettings) -> Result<(), SettingsMismatch> {
        match settings {
            PipelineSettings::DriverMode(settings) => {
                self.settings = settings;
                self.dirty = true;
                Ok(())
            }
            other => Err(SettingsMismatch {
                expected: PipelineType::DriverMode,
                found: other.pipeline_type(),
            }),
        }
    }

    fn process(&mut self, frame: Frame) -> CvPipelineResult {
        if self.dirty {
            self.configure();
        }

        let Frame {
            image,
            timestamp_nanos,
            static_props,
        } = frame;
        let mut timings = StageTimings::default();

        let color = match image {
            FrameImage::Color(_) => {
                timings.record(Stage::Rotate, self.rotate.run(image)).into_rgb()
            }
            FrameImage::Gray(_) => image.into_rgb(),
        };
        let annotated = timings.record(Stage::Crosshair, self.crosshair.run(color));
        let fps = timings.record(Stage::Fps, self.fps.run(()));

        let input_frame = Frame::new(FrameImage::Color(annotated), timestamp_nanos, static_props);
        let result = CvPipelineResult::new(timings, fps, Vec::new(), Some(input_frame), None);
        debug!(latency_ms = result.latency_millis(), "driver frame processed");
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use image::{GrayImage, RgbImage};

    use super::*;
    use crate::frame::{FrameStaticProperties, ImageRotationMode};
    use crate::pipeline::AprilTagPipelineSettings;

    fn frame(image: FrameImage) -> Frame {
        Frame::new(image, 5, Arc::new(FrameStaticProperties::new(30, 20, 70.0)))
    }

    #[test]
    fn rotates_and_draws_without_targets() {
        let mut p = DriverModePipeline::new(DriverModePipelineSettings {
            input_rotation: ImageRotationMode::Deg90,
            ..DriverModePipelineSettings::default()
        });
        let result = p.process(frame(FrameImage::Color(RgbImage::new(30, 20))));

        assert!(!result.has_targets());
        assert_eq!(
            result.stage_timings.stages().collect::<Vec<_>>(),
            vec![Stage::Rotate, Stage::Crosshair, Stage::Fps]
        );
        assert_eq!(result.latency_nanos, result.stage_timings.total());
        let input = result.input_frame.unwrap();
        assert_eq!((input.image.width(), input.image.height()), (20, 30));
        assert!(result.output_frame.is_none());
    }

    #[test]
    fn single_channel_frame_is_not_rotated() {
        let mut p = DriverModePipeline::new(DriverModePipelineSettings::default());
        let result = p.process(frame(FrameImage::Gray(GrayImage::new(30, 20))));
        assert!(!result.stage_timings.contains(Stage::Rotate));
        assert_eq!(result.input_frame.unwrap().image.channels(), 3);
    }

    #[test]
    fn rejects_apriltag_settings() {
        let mut p = DriverModePipeline::new(DriverModePipelineSettings::default());
        let err = p
            .set_settings(PipelineSettings::AprilTag(AprilTagPipelineSettings::default()))
            .unwrap_err();
        assert_eq!(err.expected, PipelineType::DriverMode);
    }
}
