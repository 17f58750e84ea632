//! Planar target pose from four image corners and camera intrinsics.
//!
//! The tag frame matches the camera's EDN convention (+X right, +Y down,
//! +Z away from the viewer), so a tag squarely facing the camera has an
//! identity rotation. Corners are expected in the order bottom-left,
//! bottom-right, top-right, top-left.

use nalgebra::{Matrix3, Rotation3, SMatrix, SVector, UnitQuaternion, Vector3};

use photon_targeting::{TargetCorner, Transform3d};

use crate::calibration::Intrinsics;

/// Smaller quadrilaterals (pixels²) are too degenerate to solve.
const MIN_CORNER_AREA: f64 = 1.0;

/// Tag-frame corner positions for a tag of side `tag_size`.
pub fn tag_object_points(tag_size: f64) -> [(f64, f64); 4] {
    let s = tag_size / 2.0;
    [(-s, s), (s, s), (s, -s), (-s, -s)]
}

/// Signed shoelace area of a polygon in pixels²; positive when the points
/// wind clockwise on screen (y down).
pub fn polygon_area(corners: &[TargetCorner]) -> f64 {
    let n = corners.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let (a, b) = (corners[i], corners[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum();
    twice / 2.0
}

/// Homography from tag-plane points to pixels, normalized so `h33 == 1`.
fn homography(object: &[(f64, f64); 4], image: &[TargetCorner]) -> Option<Matrix3<f64>> {
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for (i, (&(x, y), c)) in object.iter().zip(image).enumerate() {
        let (u, v) = (c.x, c.y);
        let r = 2 * i;
        a[(r, 0)] = x;
        a[(r, 1)] = y;
        a[(r, 2)] = 1.0;
        a[(r, 6)] = -u * x;
        a[(r, 7)] = -u * y;
        b[r] = u;

        a[(r + 1, 3)] = x;
        a[(r + 1, 4)] = y;
        a[(r + 1, 5)] = 1.0;
        a[(r + 1, 6)] = -v * x;
        a[(r + 1, 7)] = -v * y;
        b[r + 1] = v;
    }

    let h = a.lu().solve(&b)?;
    Some(Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0))
}

/// Camera-to-tag transform in the camera's EDN frame, or `None` when the
/// corners are degenerate.
pub fn estimate_tag_pose(
    corners: &[TargetCorner],
    intrinsics: &Intrinsics,
    tag_size: f64,
) -> Option<Transform3d> {
    if corners.len() != 4 || tag_size <= 0.0 || polygon_area(corners).abs() < MIN_CORNER_AREA {
        return None;
    }

    let h = homography(&tag_object_points(tag_size), corners)?;
    let k_inv = intrinsics.matrix().try_inverse()?;
    let m = k_inv * h;

    let m1: Vector3<f64> = m.column(0).into_owned();
    let m2: Vector3<f64> = m.column(1).into_owned();
    let m3: Vector3<f64> = m.column(2).into_owned();

    let norm = (m1.norm() + m2.norm()) / 2.0;
    if !norm.is_finite() || norm <= f64::EPSILON {
        return None;
    }
    // The tag is in front of the camera, so the translation must have +Z.
    let lambda = if m3.z < 0.0 { -1.0 / norm } else { 1.0 / norm };

    let r1 = m1 * lambda;
    let r2 = m2 * lambda;
    let r3 = r1.cross(&r2);
    if r3.norm() < 0.5 {
        return None;
    }
    let t = m3 * lambda;

    let approx = Matrix3::from_columns(&[r1, r2, r3]);
    let rotation = Rotation3::from_matrix(&approx);
    let transform = Transform3d::new(t, UnitQuaternion::from_rotation_matrix(&rotation));

    let finite = transform.translation.iter().all(|v| v.is_finite())
        && transform.rotation.coords.iter().all(|v| v.is_finite());
    finite.then_some(transform)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k() -> Intrinsics {
        Intrinsics {
            fx: 600.0,
            fy: 600.0,
            cx: 320.0,
            cy: 240.0,
        }
    }

    fn project(pose: &Transform3d, tag_size: f64) -> Vec<TargetCorner> {
        let k = k();
        tag_object_points(tag_size)
            .iter()
            .map(|&(x, y)| {
                let p = pose.rotation * Vector3::new(x, y, 0.0) + pose.translation;
                TargetCorner::new(k.fx * p.x / p.z + k.cx, k.fy * p.y / p.z + k.cy)
            })
            .collect()
    }

    #[test]
    fn fronto_parallel_tag_recovers_distance() {
        let truth = Transform3d::new(Vector3::new(0.0, 0.0, 2.0), UnitQuaternion::identity());
        let est = estimate_tag_pose(&project(&truth, 0.2), &k(), 0.2).unwrap();
        assert!((est.translation - truth.translation).norm() < 1e-9);
        assert!(est.rotation.angle() < 1e-9);
    }

    #[test]
    fn tilted_tag_recovers_pose() {
        let truth = Transform3d::new(
            Vector3::new(0.1, -0.05, 1.5),
            UnitQuaternion::from_euler_angles(0.1, 0.3, -0.2),
        );
        let est = estimate_tag_pose(&project(&truth, 0.165), &k(), 0.165).unwrap();
        assert!((est.translation - truth.translation).norm() < 1e-6);
        assert!(est.rotation.angle_to(&truth.rotation) < 1e-6);
    }

    #[test]
    fn collinear_corners_have_no_pose() {
        let corners: Vec<TargetCorner> =
            (0..4).map(|i| TargetCorner::new(i as f64, i as f64)).collect();
        assert!(estimate_tag_pose(&corners, &k(), 0.2).is_none());
    }

    #[test]
    fn shoelace_area_of_unit_square() {
        let square = [
            TargetCorner::new(0.0, 0.0),
            TargetCorner::new(1.0, 0.0),
            TargetCorner::new(1.0, 1.0),
            TargetCorner::new(0.0, 1.0),
        ];
        assert_eq!(polygon_area(&square), 1.0);
    }

    #[test]
    fn wrong_corner_count_has_no_pose() {
        assert!(estimate_tag_pose(&[TargetCorner::default(); 3], &k(), 0.2).is_none());
    }
}
