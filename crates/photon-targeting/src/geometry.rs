use nalgebra::{Quaternion, UnitQuaternion, Vector3};

use crate::error::PacketError;
use crate::packet::{Packet, PacketSerde};

/// One image-space corner of a target, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TargetCorner {
    pub x: f64,
    pub y: f64,
}

impl TargetCorner {
    pub const PACK_SIZE_BYTES: usize = 2 * 8;

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl PacketSerde for TargetCorner {
    fn packed_size(&self) -> usize {
        Self::PACK_SIZE_BYTES
    }

    fn pack(&self, packet: &mut Packet) {
        packet.encode_f64(self.x);
        packet.encode_f64(self.y);
    }

    fn unpack(packet: &mut Packet) -> Result<Self, PacketError> {
        Ok(Self {
            x: packet.decode_f64()?,
            y: packet.decode_f64()?,
        })
    }
}

/// How far a decoded rotation's norm may stray from 1.
const UNIT_NORM_TOLERANCE: f64 = 1e-6;

/// Rigid transform of a target relative to the camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform3d {
    /// Meters.
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
}

impl Default for Transform3d {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform3d {
    /// Translation (3) plus quaternion (4).
    pub const PACK_SIZE_BYTES: usize = 7 * 8;

    pub fn new(translation: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Vector3::zeros(), UnitQuaternion::identity())
    }

    /// A transform in the XY plane: translation `(x, y, 0)` and a rotation of
    /// `theta` radians about +Z.
    pub fn from_planar(x: f64, y: f64, theta: f64) -> Self {
        Self::new(
            Vector3::new(x, y, 0.0),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), theta),
        )
    }

    /// Rotation about +Z, in radians.
    pub fn yaw(&self) -> f64 {
        self.rotation.euler_angles().2
    }

    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self::new(-(rotation * self.translation), rotation)
    }

    /// Apply `other` after `self`.
    pub fn compose(&self, other: &Transform3d) -> Self {
        Self::new(
            self.translation + self.rotation * other.translation,
            self.rotation * other.rotation,
        )
    }
}

impl PacketSerde for Transform3d {
    fn packed_size(&self) -> usize {
        Self::PACK_SIZE_BYTES
    }

    fn pack(&self, packet: &mut Packet) {
        packet.encode_f64(self.translation.x);
        packet.encode_f64(self.translation.y);
        packet.encode_f64(self.translation.z);
        let q = self.rotation.quaternion();
        packet.encode_f64(q.w);
        packet.encode_f64(q.i);
        packet.encode_f64(q.j);
        packet.encode_f64(q.k);
    }

    fn unpack(packet: &mut Packet) -> Result<Self, PacketError> {
        let translation = Vector3::new(
            packet.decode_f64()?,
            packet.decode_f64()?,
            packet.decode_f64()?,
        );
        let (w, i, j, k) = (
            packet.decode_f64()?,
            packet.decode_f64()?,
            packet.decode_f64()?,
            packet.decode_f64()?,
        );
        // Accepted as sent so valid rotations round-trip bit-exact.
        let quaternion = Quaternion::new(w, i, j, k);
        let norm = quaternion.norm();
        if norm.is_nan() || (norm - 1.0).abs() > UNIT_NORM_TOLERANCE {
            return Err(PacketError::NonUnitQuaternion(norm));
        }
        Ok(Self::new(translation, UnitQuaternion::new_unchecked(quaternion)))
    }
}
