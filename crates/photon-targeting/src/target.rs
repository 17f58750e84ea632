use crate::error::PacketError;
use crate::geometry::{TargetCorner, Transform3d};
use crate::packet::{option_packed_size, seq_packed_size, Packet, PacketSerde};

/// Number of corners a target carries when corners are present.
pub const CORNER_COUNT: usize = 4;

/// One detected target in one frame.
///
/// Angles are degrees, area is percent of the image. `corners` is either empty
/// or exactly [`CORNER_COUNT`] points; `pose` is `None` when only 2-D tracking
/// succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedTarget {
    yaw: f64,
    pitch: f64,
    area: f64,
    skew: f64,
    fiducial_id: i32,
    pose: Option<Transform3d>,
    pose_ambiguity: f64,
    corners: Vec<TargetCorner>,
}

impl Default for TrackedTarget {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            area: 0.0,
            skew: 0.0,
            fiducial_id: -1,
            pose: None,
            pose_ambiguity: -1.0,
            corners: Vec::new(),
        }
    }
}

impl TrackedTarget {
    /// Panics if `corners` is neither empty nor exactly four points.
    pub fn new(
        yaw: f64,
        pitch: f64,
        area: f64,
        skew: f64,
        pose: Option<Transform3d>,
        corners: Vec<TargetCorner>,
    ) -> Self {
        assert!(
            corners.is_empty() || corners.len() == CORNER_COUNT,
            "a target carries 0 or {CORNER_COUNT} corners, got {}",
            corners.len()
        );
        Self {
            yaw,
            pitch,
            area,
            skew,
            pose,
            corners,
            ..Self::default()
        }
    }

    /// Attach the fiducial id and pose ambiguity reported by the detector.
    pub fn with_fiducial(mut self, fiducial_id: i32, pose_ambiguity: f64) -> Self {
        self.fiducial_id = fiducial_id;
        self.pose_ambiguity = pose_ambiguity;
        self
    }

    pub fn yaw(&self) -> f64 {
        self.yaw
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn skew(&self) -> f64 {
        self.skew
    }

    /// -1 when the target is not a fiducial.
    pub fn fiducial_id(&self) -> i32 {
        self.fiducial_id
    }

    pub fn pose(&self) -> Option<&Transform3d> {
        self.pose.as_ref()
    }

    /// -1 when unknown.
    pub fn pose_ambiguity(&self) -> f64 {
        self.pose_ambiguity
    }

    pub fn corners(&self) -> &[TargetCorner] {
        &self.corners
    }
}

impl PacketSerde for TrackedTarget {
    fn packed_size(&self) -> usize {
        4 * 8 // yaw, pitch, area, skew
            + 4 // fiducial id
            + option_packed_size(self.pose.as_ref())
            + 8 // pose ambiguity
            + seq_packed_size(&self.corners)
    }

    fn pack(&self, packet: &mut Packet) {
        packet.encode_f64(self.yaw);
        packet.encode_f64(self.pitch);
        packet.encode_f64(self.area);
        packet.encode_f64(self.skew);
        packet.encode_i32(self.fiducial_id);
        packet.encode_option(self.pose.as_ref());
        packet.encode_f64(self.pose_ambiguity);
        packet.encode_seq(&self.corners);
    }

    fn unpack(packet: &mut Packet) -> Result<Self, PacketError> {
        let yaw = packet.decode_f64()?;
        let pitch = packet.decode_f64()?;
        let area = packet.decode_f64()?;
        let skew = packet.decode_f64()?;
        let fiducial_id = packet.decode_i32()?;
        let pose = packet.decode_option::<Transform3d>()?;
        let pose_ambiguity = packet.decode_f64()?;
        let corners = packet.decode_seq::<TargetCorner>()?;
        if !corners.is_empty() && corners.len() != CORNER_COUNT {
            return Err(PacketError::InvalidCornerCount(corners.len() as u32));
        }
        Ok(Self {
            yaw,
            pitch,
            area,
            skew,
            fiducial_id,
            pose,
            pose_ambiguity,
            corners,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{from_bytes, to_bytes};

    fn square_corners() -> Vec<TargetCorner> {
        vec![
            TargetCorner::new(1.0, 2.0),
            TargetCorner::new(3.0, 4.0),
            TargetCorner::new(5.0, 6.0),
            TargetCorner::new(7.0, 8.0),
        ]
    }

    #[test]
    fn simple_target_round_trips() {
        let target = TrackedTarget::new(
            3.0,
            4.0,
            9.0,
            -5.0,
            Some(Transform3d::from_planar(1.0, 2.0, 1.5)),
            square_corners(),
        );
        let mut p = Packet::for_entity(&target);
        target.pack(&mut p);

        let decoded = TrackedTarget::unpack(&mut p).unwrap();
        assert_eq!(decoded, target);
        assert_eq!(decoded.yaw(), 3.0);
        assert_eq!(decoded.pitch(), 4.0);
        assert_eq!(decoded.area(), 9.0);
        assert_eq!(decoded.skew(), -5.0);
        assert_eq!(decoded.corners(), square_corners().as_slice());
        assert_eq!(p.remaining(), 0);
    }

    #[test]
    fn size_matches_bytes_written() {
        let with_pose = TrackedTarget::new(
            0.0,
            0.0,
            1.0,
            0.0,
            Some(Transform3d::identity()),
            square_corners(),
        );
        let bare = TrackedTarget::new(0.0, 0.0, 1.0, 0.0, None, Vec::new());

        assert_eq!(with_pose.packed_size(), 32 + 4 + 1 + 56 + 8 + 4 + 64);
        assert_eq!(bare.packed_size(), 32 + 4 + 1 + 8 + 4);
        assert_eq!(to_bytes(&with_pose).len(), with_pose.packed_size());
        assert_eq!(to_bytes(&bare).len(), bare.packed_size());
    }

    #[test]
    fn target_without_corners_or_pose_round_trips() {
        let target =
            TrackedTarget::new(-1.0, 0.5, 0.0, 0.0, None, Vec::new()).with_fiducial(7, 0.1);
        let decoded: TrackedTarget = from_bytes(to_bytes(&target)).unwrap();
        assert_eq!(decoded, target);
        assert_eq!(decoded.fiducial_id(), 7);
        assert!(decoded.pose().is_none());
    }

    #[test]
    fn decode_rejects_wrong_corner_count() {
        let target = TrackedTarget::new(0.0, 0.0, 0.0, 0.0, None, Vec::new());
        let mut p = Packet::default();
        target.pack(&mut p);
        // Replace the empty corner sequence with a two-corner sequence.
        let mut bytes = p.as_slice()[..p.len() - 4].to_vec();
        let mut tail = Packet::default();
        tail.encode_seq(&square_corners()[..2]);
        bytes.extend_from_slice(tail.as_slice());

        let result = from_bytes::<TrackedTarget>(bytes);
        assert_eq!(result, Err(PacketError::InvalidCornerCount(2)));
    }

    #[test]
    fn truncated_target_fails() {
        let target = TrackedTarget::new(1.0, 2.0, 3.0, 4.0, None, square_corners());
        let bytes = to_bytes(&target);
        let result = from_bytes::<TrackedTarget>(&bytes[..bytes.len() - 1]);
        assert!(matches!(result, Err(PacketError::Underflow { .. })));
    }

    #[test]
    #[should_panic(expected = "0 or 4 corners")]
    fn constructor_enforces_corner_count() {
        TrackedTarget::new(0.0, 0.0, 0.0, 0.0, None, vec![TargetCorner::default()]);
    }
}
