use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use image::GrayImage;
use tracing::{debug, warn};

use photon_targeting::{TargetCorner, Transform3d};

use super::{Configure, Pipe};

/// Fiducial family handed to the detection engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TagFamily {
    #[default]
    Tag36h11,
    Tag25h9,
    Tag16h5,
}

impl fmt::Display for TagFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagFamily::Tag36h11 => write!(f, "tag36h11"),
            TagFamily::Tag25h9 => write!(f, "tag25h9"),
            TagFamily::Tag16h5 => write!(f, "tag16h5"),
        }
    }
}

impl FromStr for TagFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tag36h11" | "36h11" => Ok(TagFamily::Tag36h11),
            "tag25h9" | "25h9" => Ok(TagFamily::Tag25h9),
            "tag16h5" | "16h5" => Ok(TagFamily::Tag16h5),
            other => Err(format!("unknown tag family '{other}'")),
        }
    }
}

/// Pose estimate some detection engines report alongside a detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TagPoseHint {
    /// Tag relative to the camera, in the camera's EDN frame, meters.
    pub camera_to_tag: Transform3d,
    /// Ratio of the best to the second-best reprojection error; lower is better.
    pub ambiguity: f64,
}

/// One raw detection from the detection engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TagDetection {
    pub id: i32,
    pub hamming: u32,
    pub decision_margin: f32,
    /// Image-space corners in the engine's order; four for a valid detection.
    pub corners: Vec<TargetCorner>,
    pub pose_hint: Option<TagPoseHint>,
}

/// The detection-engine collaborator.
pub trait TagDetector: Send {
    fn detect(&mut self, image: &GrayImage, family: TagFamily) -> Result<Vec<TagDetection>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AprilTagDetectionParams {
    pub family: TagFamily,
    /// Detections with more corrected bits than this are discarded.
    pub max_hamming: u32,
}

impl Default for AprilTagDetectionParams {
    fn default() -> Self {
        Self {
            family: TagFamily::default(),
            max_hamming: 0,
        }
    }
}

pub struct AprilTagDetectionPipe {
    detector: Box<dyn TagDetector>,
    params: AprilTagDetectionParams,
    failing: bool,
}

impl AprilTagDetectionPipe {
    pub fn new(detector: Box<dyn TagDetector>) -> Self {
        Self {
            detector,
            params: AprilTagDetectionParams::default(),
            failing: false,
        }
    }
}

impl Configure for AprilTagDetectionPipe {
    type Params = AprilTagDetectionParams;

    fn set_params(&mut self, params: AprilTagDetectionParams) {
        self.params = params;
    }
}

impl<'a> Pipe<&'a GrayImage> for AprilTagDetectionPipe {
    type Output = Vec<TagDetection>;

    fn process(&mut self, input: &'a GrayImage) -> Vec<TagDetection> {
        let detections = match self.detector.detect(input, self.params.family) {
            Ok(detections) => {
                self.failing = false;
                detections
            }
            Err(e) => {
                // Once per failure streak; the frame continues without targets.
                if !self.failing {
                    warn!(error = %e, family = %self.params.family, "tag detector failed");
                }
                self.failing = true;
                return Vec::new();
            }
        };

        let max_hamming = self.params.max_hamming;
        let total = detections.len();
        let kept: Vec<TagDetection> = detections
            .into_iter()
            .filter(|d| d.hamming <= max_hamming)
            .collect();
        debug!(total, kept = kept.len(), "tag detections");
        kept
    }
}
