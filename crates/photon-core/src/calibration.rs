use std::path::Path;

use anyhow::{Context, Result};
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::frame::ImageRotationMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Intrinsics for one capture resolution, as supplied by the calibration
/// collaborator. `camera_matrix` is row-major `[fx 0 cx; 0 fy cy; 0 0 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraCalibration {
    pub resolution: Resolution,
    pub camera_matrix: [f64; 9],
    #[serde(default)]
    pub dist_coeffs: Vec<f64>,
}

#[derive(Debug, Error, PartialEq)]
pub enum CalibrationError {
    #[error("calibration resolution must be non-zero, got {0}x{1}")]
    ZeroResolution(u32, u32),

    #[error("calibration contains non-finite values")]
    NonFinite,

    #[error("focal lengths must be positive, got fx={fx} fy={fy}")]
    NonPositiveFocalLength { fx: f64, fy: f64 },

    #[error("principal point ({cx}, {cy}) lies outside the {width}x{height} image")]
    PrincipalPointOutside {
        cx: f64,
        cy: f64,
        width: u32,
        height: u32,
    },

    #[error("camera matrix bottom row must be [0 0 1]")]
    NotAffine,
}

/// Pinhole intrinsics in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Intrinsics {
    /// Approximate intrinsics from a horizontal field of view, assuming square
    /// pixels and a centered principal point.
    pub fn from_fov(width: u32, height: u32, horizontal_fov_degrees: f64) -> Self {
        let half_fov = (horizontal_fov_degrees.to_radians() / 2.0).max(f64::EPSILON);
        let f = (width as f64 / 2.0) / half_fov.tan();
        Self {
            fx: f,
            fy: f,
            cx: width as f64 / 2.0,
            cy: height as f64 / 2.0,
        }
    }

    /// Intrinsics of the image after rotating a `width`x`height` capture
    /// clockwise by `rotation`.
    pub fn rotated(&self, rotation: ImageRotationMode, width: u32, height: u32) -> Self {
        let (w, h) = (width as f64, height as f64);
        match rotation {
            ImageRotationMode::Deg0 => *self,
            ImageRotationMode::Deg90 => Self {
                fx: self.fy,
                fy: self.fx,
                cx: h - self.cy,
                cy: self.cx,
            },
            ImageRotationMode::Deg180 => Self {
                fx: self.fx,
                fy: self.fy,
                cx: w - self.cx,
                cy: h - self.cy,
            },
            ImageRotationMode::Deg270 => Self {
                fx: self.fy,
                fy: self.fx,
                cx: self.cy,
                cy: w - self.cx,
            },
        }
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }
}

impl CameraCalibration {
    pub fn validate(&self) -> Result<Intrinsics, CalibrationError> {
        let Resolution { width, height } = self.resolution;
        if width == 0 || height == 0 {
            return Err(CalibrationError::ZeroResolution(width, height));
        }

        let m = &self.camera_matrix;
        if !m.iter().chain(self.dist_coeffs.iter()).all(|v| v.is_finite()) {
            return Err(CalibrationError::NonFinite);
        }
        if m[6] != 0.0 || m[7] != 0.0 || m[8] != 1.0 {
            return Err(CalibrationError::NotAffine);
        }

        let (fx, fy, cx, cy) = (m[0], m[4], m[2], m[5]);
        if fx <= 0.0 || fy <= 0.0 {
            return Err(CalibrationError::NonPositiveFocalLength { fx, fy });
        }
        if !(0.0..=width as f64).contains(&cx) || !(0.0..=height as f64).contains(&cy) {
            return Err(CalibrationError::PrincipalPointOutside {
                cx,
                cy,
                width,
                height,
            });
        }

        Ok(Intrinsics { fx, fy, cx, cy })
    }
}

/// Calibrations for every resolution a camera has been calibrated at.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationSet {
    calibrations: Vec<CameraCalibration>,
}

impl CalibrationSet {
    pub fn new(calibrations: Vec<CameraCalibration>) -> Self {
        Self { calibrations }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("failed to parse calibration JSON")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let set = Self::from_json_str(&json)?;
        info!(?path, count = set.calibrations.len(), "loaded calibrations");
        Ok(set)
    }

    pub fn for_resolution(&self, width: u32, height: u32) -> Option<&CameraCalibration> {
        self.calibrations
            .iter()
            .find(|c| c.resolution == Resolution::new(width, height))
    }
}
