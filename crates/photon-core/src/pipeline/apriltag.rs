use std::sync::Arc;

use ab_glyph::FontVec;
use image::RgbImage;
use tracing::{debug, info, warn};

use super::{
    AprilTagPipelineSettings, CvPipeline, CvPipelineResult, PipelineSettings, PipelineType,
    SettingsMismatch, Stage, StageTimings,
};
use crate::calibration::{Intrinsics, Resolution};
use crate::capture::{AcceleratedCapture, CameraQuirk, QuirkSet};
use crate::frame::{Frame, FrameImage, FrameStaticProperties, ImageRotationMode};
use crate::pipe::collect::{CollectTargetsParams, CollectTargetsPipe, PoseMode};
use crate::pipe::detect::{AprilTagDetectionParams, AprilTagDetectionPipe, TagDetector};
use crate::pipe::draw::{DrawTargetsParams, DrawTargetsPipe};
use crate::pipe::fps::CalculateFpsPipe;
use crate::pipe::grayscale::GrayscalePipe;
use crate::pipe::rotate::{RotateImageParams, RotateImagePipe};
use crate::pipe::{Configure, Pipe};

/// How frames reach the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStrategy {
    /// Rotate and convert color frames on the CPU.
    Generic,
    /// The capture hardware rotates and converts; frames arrive single-channel.
    Accelerated,
}

/// Target and overlay parameters for images in one orientation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Geometry {
    rotation: ImageRotationMode,
    collect: CollectTargetsParams,
    draw: DrawTargetsParams,
}

/// Fiducial tracking: detect tags, turn them into targets, annotate.
pub struct AprilTagPipeline {
    settings: AprilTagPipelineSettings,
    quirks: QuirkSet,
    accelerated: Option<Box<dyn AcceleratedCapture>>,
    strategy: ChainStrategy,
    /// Properties the pipes were last configured for; `None` forces a
    /// reconfiguration before the next frame.
    configured_for: Option<Arc<FrameStaticProperties>>,
    pose_enabled: bool,
    /// Geometry of color frames after the rotate stage.
    color_geometry: Geometry,
    /// Geometry of single-channel frames as the capture path delivered them.
    gray_geometry: Geometry,
    /// Rotation whose geometry the collect and draw pipes currently hold.
    applied_rotation: Option<ImageRotationMode>,

    rotate: RotateImagePipe,
    grayscale: GrayscalePipe,
    detect: AprilTagDetectionPipe,
    collect: CollectTargetsPipe,
    draw: DrawTargetsPipe,
    fps: CalculateFpsPipe,
}

impl AprilTagPipeline {
    pub fn new(settings: AprilTagPipelineSettings, detector: Box<dyn TagDetector>) -> Self {
        Self {
            settings,
            quirks: QuirkSet::new(),
            accelerated: None,
            strategy: ChainStrategy::Generic,
            configured_for: None,
            pose_enabled: false,
            color_geometry: Geometry::default(),
            gray_geometry: Geometry::default(),
            applied_rotation: None,
            rotate: RotateImagePipe::default(),
            grayscale: GrayscalePipe,
            detect: AprilTagDetectionPipe::new(detector),
            collect: CollectTargetsPipe::default(),
            draw: DrawTargetsPipe::default(),
            fps: CalculateFpsPipe::default(),
        }
    }

    /// Camera quirks plus the accelerated capture path, if the camera has one.
    pub fn with_capture(
        mut self,
        quirks: QuirkSet,
        accelerated: Option<Box<dyn AcceleratedCapture>>,
    ) -> Self {
        self.quirks = quirks;
        self.accelerated = accelerated;
        self.configured_for = None;
        self
    }

    pub fn with_font(mut self, font: Option<FontVec>) -> Self {
        self.draw = DrawTargetsPipe::new(font);
        self.configured_for = None;
        self
    }

    pub fn settings(&self) -> &AprilTagPipelineSettings {
        &self.settings
    }

    pub fn strategy(&self) -> ChainStrategy {
        self.strategy
    }

    /// Whether targets currently get a 3-D pose.
    pub fn pose_enabled(&self) -> bool {
        self.pose_enabled
    }

    fn needs_configure(&self, props: &Arc<FrameStaticProperties>) -> bool {
        match &self.configured_for {
            Some(current) => !Arc::ptr_eq(current, props) && **current != **props,
            None => true,
        }
    }

    fn select_strategy(&self) -> ChainStrategy {
        if !self.quirks.contains(CameraQuirk::GpuGrayscale) {
            return ChainStrategy::Generic;
        }
        match &self.accelerated {
            Some(capture) if capture.is_supported() => ChainStrategy::Accelerated,
            _ => {
                warn!(
                    "camera reports accelerated grayscale but the capture path is unavailable, \
                     falling back to generic processing"
                );
                ChainStrategy::Generic
            }
        }
    }

    /// Push the current settings into every pipe for frames with `props`.
    fn configure(&mut self, props: &Arc<FrameStaticProperties>) {
        let s = self.settings.clone();
        let rotation = s.input_rotation;

        self.strategy = self.select_strategy();
        if self.strategy == ChainStrategy::Accelerated {
            if let Some(capture) = self.accelerated.as_mut() {
                capture.set_rotation(rotation);
                capture.set_grayscale_output(true);
                capture.set_copy_color(s.input_should_show && s.stream_frames);
            }
            if props.rotation != rotation {
                warn!(
                    capture = %props.rotation,
                    configured = %rotation,
                    "capture path has not applied the configured rotation yet"
                );
            }
        }

        self.rotate.set_params(RotateImageParams { rotation });
        self.detect.set_params(AprilTagDetectionParams {
            family: s.tag_family,
            max_hamming: s.max_hamming,
        });

        let calibrated = if s.solve_pnp {
            calibrated_intrinsics(props)
        } else {
            None
        };
        self.pose_enabled = calibrated.is_some();
        self.color_geometry = geometry(&s, props, rotation, calibrated);
        self.gray_geometry = geometry(&s, props, props.rotation, calibrated);
        self.applied_rotation = None;

        info!(
            strategy = ?self.strategy,
            width = props.width,
            height = props.height,
            %rotation,
            delivered_rotation = %props.rotation,
            family = %s.tag_family,
            pose = self.pose_enabled,
            "apriltag pipeline configured"
        );
        self.configured_for = Some(Arc::clone(props));
    }

    /// Point the collect and draw pipes at `geometry`.
    fn use_geometry(&mut self, geometry: Geometry) {
        if self.applied_rotation == Some(geometry.rotation) {
            return;
        }
        self.collect.set_params(geometry.collect);
        self.draw.set_params(geometry.draw);
        self.applied_rotation = Some(geometry.rotation);
    }

    /// Color copy of the current frame from the accelerated capture path.
    fn grab_color_copy(&mut self) -> Option<RgbImage> {
        let wanted = self.strategy == ChainStrategy::Accelerated
            && self.settings.input_should_show
            && self.settings.stream_frames;
        if !wanted {
            return None;
        }
        let copy = self.accelerated.as_mut()?.grab_color_frame();
        if copy.is_none() {
            debug!("no color copy from the capture path, annotating the processed frame");
        }
        copy
    }
}

/// Geometry for `props` frames turned clockwise by `rotation`. `calibrated`
/// holds intrinsics of the unrotated capture.
fn geometry(
    s: &AprilTagPipelineSettings,
    props: &FrameStaticProperties,
    rotation: ImageRotationMode,
    calibrated: Option<Intrinsics>,
) -> Geometry {
    let (width, height) = if rotation.is_transposed() {
        (props.height, props.width)
    } else {
        (props.width, props.height)
    };
    let calibrated = calibrated.map(|k| k.rotated(rotation, props.width, props.height));
    let angle_intrinsics = calibrated.unwrap_or_else(|| {
        props
            .approximate_intrinsics(props.width, props.height)
            .rotated(rotation, props.width, props.height)
    });
    let pose = match calibrated {
        Some(intrinsics) => PoseMode::Enabled {
            intrinsics,
            tag_size_meters: s.tag_size_meters,
        },
        None => PoseMode::Disabled,
    };

    Geometry {
        rotation,
        collect: CollectTargetsParams {
            angle_intrinsics,
            image_width: width,
            image_height: height,
            pose,
        },
        draw: DrawTargetsParams {
            should_draw: s.output_should_draw,
            intrinsics: calibrated,
            tag_size_meters: s.tag_size_meters,
            divisor: s.streaming_frame_divisor,
        },
    }
}

/// Validated calibration for `props`, or `None` after logging why pose
/// estimation is off. Runs once per configuration.
fn calibrated_intrinsics(props: &FrameStaticProperties) -> Option<Intrinsics> {
    let Some(calibration) = &props.calibration else {
        warn!(
            width = props.width,
            height = props.height,
            "no calibration for this resolution, pose estimation disabled"
        );
        return None;
    };
    if calibration.resolution != Resolution::new(props.width, props.height) {
        warn!(
            calibrated = ?calibration.resolution,
            width = props.width,
            height = props.height,
            "calibration resolution does not match frames, pose estimation disabled"
        );
        return None;
    }
    match calibration.validate() {
        Ok(intrinsics) => Some(intrinsics),
        Err(e) => {
            warn!(error = %e, "malformed calibration, pose estimation disabled until reconfigured");
            None
        }
    }
}

impl CvPipeline for AprilTagPipeline {
    fn pipeline_type(&self) -> PipelineType {
        PipelineType::AprilTag
    }

    fn set_settings(&mut self, settings: PipelineSettings) -> Result<(), SettingsMismatch> {
        match settings {
            PipelineSettings::AprilTag(settings) => {
                self.settings = settings;
                self.configured_for = None;
                Ok(())
            }
            other => Err(SettingsMismatch {
                expected: PipelineType::AprilTag,
                found: other.pipeline_type(),
            }),
        }
    }

    fn process(&mut self, frame: Frame) -> CvPipelineResult {
        if self.needs_configure(&frame.static_props) {
            self.configure(&frame.static_props);
        }

        let Frame {
            image,
            timestamp_nanos,
            static_props,
        } = frame;
        let mut timings = StageTimings::default();

        // Single-channel frames were already converted upstream and carry
        // whatever rotation the capture path applied.
        let (gray, color) = match image {
            FrameImage::Color(_) => {
                let rotated = timings.record(Stage::Rotate, self.rotate.run(image));
                let gray = timings.record(Stage::Grayscale, self.grayscale.run(&rotated));
                self.use_geometry(self.color_geometry);
                (gray, Some(rotated))
            }
            FrameImage::Gray(gray) => {
                let color = self.grab_color_copy().map(FrameImage::Color);
                self.use_geometry(self.gray_geometry);
                (gray, color)
            }
        };

        let detections = timings.record(Stage::Detect, self.detect.run(&gray));
        let targets =
            timings.record(Stage::CollectTargets, self.collect.run(detections.as_slice()));

        let (input_frame, output_frame) = if self.settings.stream_frames {
            let base = match color {
                Some(color) => color.into_rgb(),
                None => FrameImage::Gray(gray.clone()).into_rgb(),
            };
            let annotated = timings.record(Stage::Draw, self.draw.run((base, targets.as_slice())));
            (
                Some(Frame::new(
                    FrameImage::Color(annotated),
                    timestamp_nanos,
                    Arc::clone(&static_props),
                )),
                Some(Frame::new(FrameImage::Gray(gray), timestamp_nanos, static_props)),
            )
        } else {
            (None, None)
        };

        let fps = timings.record(Stage::Fps, self.fps.run(()));
        let result = CvPipelineResult::new(timings, fps, targets, input_frame, output_frame);
        debug!(
            targets = result.targets.len(),
            latency_ms = result.latency_millis(),
            fps = result.fps,
            "apriltag frame processed"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use image::{GrayImage, Luma, Rgb};
    use parking_lot::Mutex;
    use tracing_test::traced_test;

    use photon_targeting::TargetCorner;

    use super::*;
    use crate::calibration::CameraCalibration;
    use crate::pipe::detect::{TagDetection, TagFamily};
    use crate::pipeline::DriverModePipelineSettings;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Seen {
        width: u32,
        height: u32,
        family: TagFamily,
    }

    struct Recording {
        detections: Vec<TagDetection>,
        seen: Arc<Mutex<Vec<Seen>>>,
    }

    impl TagDetector for Recording {
        fn detect(&mut self, image: &GrayImage, family: TagFamily) -> Result<Vec<TagDetection>> {
            self.seen.lock().push(Seen {
                width: image.width(),
                height: image.height(),
                family,
            });
            Ok(self.detections.clone())
        }
    }

    struct FakeCapture {
        supported: bool,
        color: Option<RgbImage>,
        directives: Arc<Mutex<Vec<String>>>,
    }

    impl AcceleratedCapture for FakeCapture {
        fn is_supported(&self) -> bool {
            self.supported
        }

        fn set_rotation(&mut self, rotation: ImageRotationMode) {
            self.directives.lock().push(format!("rotation={rotation}"));
        }

        fn set_grayscale_output(&mut self, grayscale: bool) {
            self.directives.lock().push(format!("grayscale={grayscale}"));
        }

        fn set_copy_color(&mut self, copy_color: bool) {
            self.directives.lock().push(format!("copy_color={copy_color}"));
        }

        fn grab_color_frame(&mut self) -> Option<RgbImage> {
            self.color.clone()
        }
    }

    const W: u32 = 64;
    const H: u32 = 48;

    fn square(half: f64) -> Vec<TargetCorner> {
        let (cx, cy) = (W as f64 / 2.0, H as f64 / 2.0);
        vec![
            TargetCorner::new(cx - half, cy + half),
            TargetCorner::new(cx + half, cy + half),
            TargetCorner::new(cx + half, cy - half),
            TargetCorner::new(cx - half, cy - half),
        ]
    }

    fn detection(id: i32) -> TagDetection {
        TagDetection {
            id,
            hamming: 0,
            decision_margin: 45.0,
            corners: square(8.0),
            pose_hint: None,
        }
    }

    fn pipeline(
        settings: AprilTagPipelineSettings,
        detections: Vec<TagDetection>,
    ) -> (AprilTagPipeline, Arc<Mutex<Vec<Seen>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let detector = Recording {
            detections,
            seen: Arc::clone(&seen),
        };
        (AprilTagPipeline::new(settings, Box::new(detector)), seen)
    }

    fn accelerated(pipeline: AprilTagPipeline, capture: FakeCapture) -> AprilTagPipeline {
        let quirks: QuirkSet = [CameraQuirk::GpuGrayscale].into_iter().collect();
        pipeline.with_capture(quirks, Some(Box::new(capture)))
    }

    fn props(calibration: Option<CameraCalibration>) -> Arc<FrameStaticProperties> {
        Arc::new(FrameStaticProperties::new(W, H, 70.0).with_calibration(calibration))
    }

    fn calibration(fx: f64) -> CameraCalibration {
        CameraCalibration {
            resolution: Resolution::new(W, H),
            camera_matrix: [fx, 0.0, W as f64 / 2.0, 0.0, 60.0, H as f64 / 2.0, 0.0, 0.0, 1.0],
            dist_coeffs: Vec::new(),
        }
    }

    fn color_frame(props: &Arc<FrameStaticProperties>) -> Frame {
        Frame::new(
            FrameImage::Color(RgbImage::from_pixel(W, H, Rgb([90, 90, 90]))),
            1_000,
            Arc::clone(props),
        )
    }

    fn gray_frame(props: &Arc<FrameStaticProperties>) -> Frame {
        Frame::new(
            FrameImage::Gray(GrayImage::from_pixel(W, H, Luma([90]))),
            2_000,
            Arc::clone(props),
        )
    }

    #[test]
    fn color_frame_runs_every_stage_in_order() {
        let (mut p, seen) = pipeline(AprilTagPipelineSettings::default(), vec![detection(4)]);
        let result = p.process(color_frame(&props(None)));

        assert_eq!(
            result.stage_timings.stages().collect::<Vec<_>>(),
            vec![
                Stage::Rotate,
                Stage::Grayscale,
                Stage::Detect,
                Stage::CollectTargets,
                Stage::Draw,
                Stage::Fps
            ]
        );
        assert_eq!(result.latency_nanos, result.stage_timings.total());
        assert_eq!(result.targets.len(), 1);
        assert_eq!(result.targets[0].fiducial_id(), 4);
        assert_eq!(seen.lock()[0].family, TagFamily::Tag36h11);
        assert_eq!(p.strategy(), ChainStrategy::Generic);
        let output = result.output_frame.unwrap();
        assert_eq!(output.image.channels(), 1);
        assert_eq!(output.timestamp_nanos, 1_000);
    }

    #[test]
    fn single_channel_frame_skips_rotate_and_grayscale() {
        let directives = Arc::new(Mutex::new(Vec::new()));
        let capture = FakeCapture {
            supported: true,
            color: Some(RgbImage::from_pixel(W, H, Rgb([1, 2, 3]))),
            directives: Arc::clone(&directives),
        };
        let (p, _) = pipeline(AprilTagPipelineSettings::default(), Vec::new());
        let mut p = accelerated(p, capture);

        let result = p.process(gray_frame(&props(None)));
        assert_eq!(p.strategy(), ChainStrategy::Accelerated);
        assert!(!result.stage_timings.contains(Stage::Rotate));
        assert!(!result.stage_timings.contains(Stage::Grayscale));
        assert!(result.stage_timings.contains(Stage::Detect));
        assert_eq!(result.latency_nanos, result.stage_timings.total());

        // Annotations land on the capture path's color copy.
        let input = result.input_frame.unwrap();
        match input.image {
            FrameImage::Color(img) => assert_eq!(img.get_pixel(0, 0), &Rgb([1, 2, 3])),
            FrameImage::Gray(_) => panic!("expected the color copy"),
        }
        assert_eq!(
            *directives.lock(),
            vec!["rotation=0", "grayscale=true", "copy_color=true"]
        );
    }

    #[test]
    fn missing_color_copy_falls_back_to_processed_frame() {
        let capture = FakeCapture {
            supported: true,
            color: None,
            directives: Arc::default(),
        };
        let (p, _) = pipeline(AprilTagPipelineSettings::default(), vec![detection(7)]);
        let mut p = accelerated(p, capture);

        let result = p.process(gray_frame(&props(None)));
        assert_eq!(result.targets.len(), 1);
        let input = result.input_frame.unwrap();
        assert_eq!(input.image.width(), W);
        assert_eq!(input.image.to_rgb().get_pixel(0, 0), &Rgb([90, 90, 90]));
    }

    #[test]
    #[traced_test]
    fn unsupported_accelerated_path_uses_generic_chain() {
        let capture = FakeCapture {
            supported: false,
            color: None,
            directives: Arc::default(),
        };
        let (p, _) = pipeline(AprilTagPipelineSettings::default(), Vec::new());
        let mut p = accelerated(p, capture);

        let result = p.process(color_frame(&props(None)));
        assert_eq!(p.strategy(), ChainStrategy::Generic);
        assert!(result.stage_timings.contains(Stage::Grayscale));
        assert!(logs_contain("falling back to generic processing"));
    }

    #[test]
    #[traced_test]
    fn stale_capture_rotation_is_reported() {
        let capture = FakeCapture {
            supported: true,
            color: None,
            directives: Arc::default(),
        };
        let settings = AprilTagPipelineSettings {
            input_rotation: ImageRotationMode::Deg180,
            ..AprilTagPipelineSettings::default()
        };
        let (p, _) = pipeline(settings, Vec::new());
        let mut p = accelerated(p, capture);

        p.process(gray_frame(&props(None)));
        assert!(logs_contain("has not applied the configured rotation"));

        let rotated = Arc::new(
            FrameStaticProperties::new(W, H, 70.0).with_rotation(ImageRotationMode::Deg180),
        );
        let result = p.process(gray_frame(&rotated));
        assert!(!result.stage_timings.contains(Stage::Rotate));
    }

    #[test]
    fn quarter_turn_rotates_before_detection() {
        let settings = AprilTagPipelineSettings {
            input_rotation: ImageRotationMode::Deg90,
            ..AprilTagPipelineSettings::default()
        };
        let (mut p, seen) = pipeline(settings, Vec::new());
        p.process(color_frame(&props(None)));
        let seen = seen.lock()[0];
        assert_eq!((seen.width, seen.height), (H, W));
    }

    #[test]
    fn single_channel_targets_follow_the_delivered_orientation() {
        let settings = AprilTagPipelineSettings {
            input_rotation: ImageRotationMode::Deg90,
            ..AprilTagPipelineSettings::default()
        };
        let (mut p, seen) = pipeline(settings, vec![detection(5)]);
        let props = props(None);

        let gray = p.process(gray_frame(&props));
        assert_eq!(p.strategy(), ChainStrategy::Generic);
        let first = seen.lock()[0];
        assert_eq!((first.width, first.height), (W, H));
        let centred = &gray.targets[0];
        assert!(centred.yaw().abs() < 1e-9, "yaw {}", centred.yaw());
        assert!(centred.pitch().abs() < 1e-9, "pitch {}", centred.pitch());

        // A color frame of the same camera still gets the rotated geometry.
        let color = p.process(color_frame(&props));
        assert!(color.stage_timings.contains(Stage::Rotate));
        assert!(color.targets[0].yaw().abs() > 1.0);

        let again = p.process(gray_frame(&props));
        assert_eq!(again.targets[0].yaw(), centred.yaw());
    }

    #[test]
    fn valid_calibration_attaches_pose() {
        let settings = AprilTagPipelineSettings {
            solve_pnp: true,
            tag_size_meters: 0.2,
            ..AprilTagPipelineSettings::default()
        };
        let (mut p, _) = pipeline(settings, vec![detection(1)]);
        let result = p.process(color_frame(&props(Some(calibration(60.0)))));
        assert!(p.pose_enabled());
        // 16 px wide at f = 60 for a 0.2 m tag: 0.75 m ahead.
        let pose = result.targets[0].pose().unwrap();
        assert!((pose.translation.x - 0.75).abs() < 1e-9);
    }

    #[test]
    #[traced_test]
    fn malformed_calibration_keeps_two_dimensional_targets() {
        let settings = AprilTagPipelineSettings {
            solve_pnp: true,
            ..AprilTagPipelineSettings::default()
        };
        let (mut p, _) = pipeline(settings, vec![detection(1), detection(2)]);
        let props = props(Some(calibration(-5.0)));

        for _ in 0..3 {
            let result = p.process(color_frame(&props));
            assert_eq!(result.targets.len(), 2);
            assert!(result.targets.iter().all(|t| t.pose().is_none()));
            assert!(result.targets[0].yaw().abs() < 1e-9);
        }
        assert!(!p.pose_enabled());
        logs_assert(|lines: &[&str]| {
            match lines.iter().filter(|l| l.contains("malformed calibration")).count() {
                1 => Ok(()),
                n => Err(format!("expected one warning, saw {n}")),
            }
        });
    }

    #[test]
    fn without_streaming_no_frames_are_drawn() {
        let settings = AprilTagPipelineSettings {
            stream_frames: false,
            ..AprilTagPipelineSettings::default()
        };
        let (mut p, _) = pipeline(settings, vec![detection(3)]);
        let result = p.process(color_frame(&props(None)));
        assert!(result.input_frame.is_none());
        assert!(result.output_frame.is_none());
        assert!(!result.stage_timings.contains(Stage::Draw));
        assert_eq!(result.targets.len(), 1);
    }

    #[test]
    fn new_settings_apply_from_the_next_frame() {
        let (mut p, seen) = pipeline(AprilTagPipelineSettings::default(), Vec::new());
        let props = props(None);
        p.process(color_frame(&props));
        p.set_settings(PipelineSettings::AprilTag(AprilTagPipelineSettings {
            tag_family: TagFamily::Tag16h5,
            ..AprilTagPipelineSettings::default()
        }))
        .unwrap();
        p.process(color_frame(&props));

        let families: Vec<TagFamily> = seen.lock().iter().map(|s| s.family).collect();
        assert_eq!(families, vec![TagFamily::Tag36h11, TagFamily::Tag16h5]);
    }

    #[test]
    fn foreign_settings_are_rejected() {
        let (mut p, _) = pipeline(AprilTagPipelineSettings::default(), Vec::new());
        let err = p
            .set_settings(PipelineSettings::DriverMode(DriverModePipelineSettings::default()))
            .unwrap_err();
        assert_eq!(err.found, PipelineType::DriverMode);
        assert_eq!(p.settings(), &AprilTagPipelineSettings::default());
    }
}
