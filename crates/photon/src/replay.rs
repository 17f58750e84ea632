use std::collections::VecDeque;
use std::path::Path;

use anyhow::{Context, Result};
use image::GrayImage;
use serde::Deserialize;
use tracing::{info, warn};

use photon_core::pipe::detect::{TagDetection, TagDetector, TagFamily};
use photon_targeting::TargetCorner;

#[derive(Debug, Clone, Deserialize)]
struct RecordedDetection {
    id: i32,
    #[serde(default)]
    hamming: u32,
    #[serde(default)]
    decision_margin: f32,
    /// `[x, y]` pixels, bottom-left first, counter-clockwise.
    corners: Vec<[f64; 2]>,
}

impl From<RecordedDetection> for TagDetection {
    fn from(d: RecordedDetection) -> Self {
        TagDetection {
            id: d.id,
            hamming: d.hamming,
            decision_margin: d.decision_margin,
            corners: d.corners.into_iter().map(|[x, y]| TargetCorner::new(x, y)).collect(),
            pose_hint: None,
        }
    }
}

/// Plays back detections recorded from a detection engine, one list per
/// frame. Frames past the end of the recording have no detections.
pub struct ReplayDetector {
    frames: VecDeque<Vec<RecordedDetection>>,
    exhausted: bool,
}

impl ReplayDetector {
    pub fn empty() -> Self {
        Self {
            frames: VecDeque::new(),
            exhausted: true,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let frames: VecDeque<Vec<RecordedDetection>> =
            serde_json::from_str(json).context("failed to parse recorded detections")?;
        Ok(Self {
            frames,
            exhausted: false,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let detector = Self::from_json_str(&json)?;
        info!(?path, frames = detector.frames.len(), "recorded detections loaded");
        Ok(detector)
    }
}

impl TagDetector for ReplayDetector {
    fn detect(&mut self, _image: &GrayImage, _family: TagFamily) -> Result<Vec<TagDetection>> {
        match self.frames.pop_front() {
            Some(frame) => Ok(frame.into_iter().map(TagDetection::from).collect()),
            None => {
                if !self.exhausted {
                    warn!("recorded detections exhausted, remaining frames have no targets");
                    self.exhausted = true;
                }
                Ok(Vec::new())
            }
        }
    }
}
