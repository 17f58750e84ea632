//! Axis conventions and conversions between them.
//!
//! Every axis is expressed in the NWU system (+X north/forward, +Y west/left,
//! +Z up). Cameras report poses in EDN (+X east/right, +Y down, +Z north/out
//! of the lens); targets are published in NWU.

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

use crate::geometry::Transform3d;

/// One axis of a coordinate system, as a unit vector in NWU.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateAxis {
    axis: Vector3<f64>,
}

impl CoordinateAxis {
    /// Normalizes `(x, y, z)`.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            axis: Vector3::new(x, y, z).normalize(),
        }
    }

    pub fn n() -> Self {
        Self::new(1.0, 0.0, 0.0)
    }

    pub fn s() -> Self {
        Self::new(-1.0, 0.0, 0.0)
    }

    pub fn e() -> Self {
        Self::new(0.0, -1.0, 0.0)
    }

    pub fn w() -> Self {
        Self::new(0.0, 1.0, 0.0)
    }

    pub fn u() -> Self {
        Self::new(0.0, 0.0, 1.0)
    }

    pub fn d() -> Self {
        Self::new(0.0, 0.0, -1.0)
    }

    pub fn vector(&self) -> &Vector3<f64> {
        &self.axis
    }
}

/// A right-handed set of three axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateSystem {
    /// Columns are the system's X, Y, Z axes in NWU.
    basis: Matrix3<f64>,
}

impl CoordinateSystem {
    /// Panics if the axes are not mutually orthogonal.
    pub fn new(x: CoordinateAxis, y: CoordinateAxis, z: CoordinateAxis) -> Self {
        let basis = Matrix3::from_columns(&[x.axis, y.axis, z.axis]);
        assert!(
            (basis.transpose() * basis - Matrix3::identity()).norm() < 1e-9,
            "coordinate system axes must be orthogonal"
        );
        Self { basis }
    }

    pub fn nwu() -> Self {
        Self::new(CoordinateAxis::n(), CoordinateAxis::w(), CoordinateAxis::u())
    }

    pub fn edn() -> Self {
        Self::new(CoordinateAxis::e(), CoordinateAxis::d(), CoordinateAxis::n())
    }

    pub fn ned() -> Self {
        Self::new(CoordinateAxis::n(), CoordinateAxis::e(), CoordinateAxis::d())
    }

    /// Change-of-basis matrix taking coordinates in `from` to coordinates in `to`.
    fn change_of_basis(from: &CoordinateSystem, to: &CoordinateSystem) -> Matrix3<f64> {
        to.basis.transpose() * from.basis
    }

    pub fn convert_translation(
        translation: &Vector3<f64>,
        from: &CoordinateSystem,
        to: &CoordinateSystem,
    ) -> Vector3<f64> {
        Self::change_of_basis(from, to) * translation
    }

    pub fn convert_rotation(
        rotation: &UnitQuaternion<f64>,
        from: &CoordinateSystem,
        to: &CoordinateSystem,
    ) -> UnitQuaternion<f64> {
        let c = Self::change_of_basis(from, to);
        let m = c * rotation.to_rotation_matrix().into_inner() * c.transpose();
        UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(m))
    }

    pub fn convert_transform(
        transform: &Transform3d,
        from: &CoordinateSystem,
        to: &CoordinateSystem,
    ) -> Transform3d {
        Transform3d::new(
            Self::convert_translation(&transform.translation, from, to),
            Self::convert_rotation(&transform.rotation, from, to),
        )
    }
}
