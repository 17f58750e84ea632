use tracing::debug;

use photon_targeting::coordinate::CoordinateSystem;
use photon_targeting::{TargetCorner, TrackedTarget, Transform3d};

use super::detect::TagDetection;
use super::{Configure, Pipe};
use crate::calibration::Intrinsics;
use crate::pose::{estimate_tag_pose, polygon_area};

/// How the 3-D pose of a target is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PoseMode {
    /// 2-D targets only.
    #[default]
    Disabled,
    /// Attach a pose computed with these (validated) intrinsics.
    Enabled { intrinsics: Intrinsics, tag_size_meters: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectTargetsParams {
    /// Used for yaw/pitch; calibrated when available, otherwise FOV-derived.
    pub angle_intrinsics: Intrinsics,
    pub image_width: u32,
    pub image_height: u32,
    pub pose: PoseMode,
}

impl Default for CollectTargetsParams {
    fn default() -> Self {
        Self {
            angle_intrinsics: Intrinsics::from_fov(640, 480, 70.0),
            image_width: 640,
            image_height: 480,
            pose: PoseMode::Disabled,
        }
    }
}

/// Turns raw detections into tracked targets, in detection order.
///
/// A detection without four finite corners is dropped. Pose failures only
/// cost the target its 3-D transform.
#[derive(Debug, Default)]
pub struct CollectTargetsPipe {
    params: CollectTargetsParams,
}

impl Configure for CollectTargetsPipe {
    type Params = CollectTargetsParams;

    fn set_params(&mut self, params: CollectTargetsParams) {
        self.params = params;
    }
}

impl<'a> Pipe<&'a [TagDetection]> for CollectTargetsPipe {
    type Output = Vec<TrackedTarget>;

    fn process(&mut self, input: &'a [TagDetection]) -> Vec<TrackedTarget> {
        let targets: Vec<TrackedTarget> = input.iter().filter_map(|d| self.to_target(d)).collect();
        if targets.len() != input.len() {
            debug!(
                detections = input.len(),
                targets = targets.len(),
                "dropped detections without valid corners"
            );
        }
        targets
    }
}

impl CollectTargetsPipe {
    fn to_target(&self, detection: &TagDetection) -> Option<TrackedTarget> {
        let corners = &detection.corners;
        if corners.len() != 4 || !corners.iter().all(TargetCorner::is_finite) {
            return None;
        }

        let k = &self.params.angle_intrinsics;
        let center = centroid(corners);
        let yaw = ((center.x - k.cx) / k.fx).atan().to_degrees();
        let pitch = -((center.y - k.cy) / k.fy).atan().to_degrees();

        let image_area = self.params.image_width as f64 * self.params.image_height as f64;
        let area = if image_area > 0.0 {
            polygon_area(corners).abs() / image_area * 100.0
        } else {
            0.0
        };
        let skew = edge_angle_degrees(corners[0], corners[1]);

        let (pose, ambiguity) = match self.solve_pose(detection) {
            Some((pose, ambiguity)) => (Some(pose), ambiguity),
            None => (None, -1.0),
        };

        Some(
            TrackedTarget::new(yaw, pitch, area, skew, pose, corners.clone())
                .with_fiducial(detection.id, ambiguity),
        )
    }

    /// Camera-to-target transform in NWU plus its ambiguity.
    fn solve_pose(&self, detection: &TagDetection) -> Option<(Transform3d, f64)> {
        let PoseMode::Enabled {
            intrinsics,
            tag_size_meters,
        } = self.params.pose
        else {
            return None;
        };

        let (edn, ambiguity) = match detection.pose_hint {
            Some(hint) => (hint.camera_to_tag, hint.ambiguity),
            None => (estimate_tag_pose(&detection.corners, &intrinsics, tag_size_meters)?, -1.0),
        };

        let nwu = CoordinateSystem::convert_transform(
            &edn,
            &CoordinateSystem::edn(),
            &CoordinateSystem::nwu(),
        );
        Some((nwu, ambiguity))
    }
}

fn centroid(corners: &[TargetCorner]) -> TargetCorner {
    let n = corners.len() as f64;
    let (sx, sy) = corners
        .iter()
        .fold((0.0, 0.0), |(sx, sy), c| (sx + c.x, sy + c.y));
    TargetCorner::new(sx / n, sy / n)
}

/// Angle of the edge `a -> b` from horizontal, in degrees.
fn edge_angle_degrees(a: TargetCorner, b: TargetCorner) -> f64 {
    (b.y - a.y).atan2(b.x - a.x).to_degrees()
}
