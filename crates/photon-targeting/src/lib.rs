//! Target data model and the packed wire format shared by the vision
//! coprocessor and its remote readers.

pub mod coordinate;
pub mod error;
pub mod geometry;
pub mod message;
pub mod packet;
pub mod result;
pub mod target;

pub use error::PacketError;
pub use geometry::{TargetCorner, Transform3d};
pub use packet::{Packet, PacketSerde};
pub use result::PipelineResult;
pub use target::TrackedTarget;

#[cfg(test)]
mod proptests {
    use nalgebra::{UnitQuaternion, Vector3};
    use proptest::prelude::*;

    use super::*;
    use crate::packet::{from_bytes, to_bytes};

    fn finite() -> impl Strategy<Value = f64> {
        -1.0e6..1.0e6f64
    }

    fn corner() -> impl Strategy<Value = TargetCorner> {
        (finite(), finite()).prop_map(|(x, y)| TargetCorner::new(x, y))
    }

    fn transform() -> impl Strategy<Value = Transform3d> {
        (finite(), finite(), finite(), -3.0..3.0f64, -1.5..1.5f64, -3.0..3.0f64).prop_map(
            |(x, y, z, roll, pitch, yaw)| {
                Transform3d::new(
                    Vector3::new(x, y, z),
                    UnitQuaternion::from_euler_angles(roll, pitch, yaw),
                )
            },
        )
    }

    fn target() -> impl Strategy<Value = TrackedTarget> {
        (
            (finite(), finite(), finite(), finite()),
            proptest::option::of(transform()),
            prop_oneof![Just(0usize), Just(4usize)]
                .prop_flat_map(|n| proptest::collection::vec(corner(), n)),
            (any::<i32>(), finite()),
        )
            .prop_map(|((yaw, pitch, area, skew), pose, corners, (id, ambiguity))| {
                TrackedTarget::new(yaw, pitch, area, skew, pose, corners)
                    .with_fiducial(id, ambiguity)
            })
    }

    fn pipeline_result() -> impl Strategy<Value = PipelineResult> {
        (
            any::<i64>(),
            0.0..1.0e4f64,
            proptest::collection::vec(target(), 0..6),
        )
            .prop_map(|(seq, latency, targets)| PipelineResult::new(seq, latency, targets))
    }

    proptest! {
        #[test]
        fn target_round_trip_consumes_exactly_what_was_written(t in target()) {
            let bytes = to_bytes(&t);
            prop_assert_eq!(bytes.len(), t.packed_size());
            let decoded: TrackedTarget = from_bytes(&bytes).unwrap();
            prop_assert_eq!(decoded, t);
        }

        #[test]
        fn result_round_trip_consumes_exactly_what_was_written(r in pipeline_result()) {
            let bytes = to_bytes(&r);
            prop_assert_eq!(bytes.len(), r.packed_size());
            let mut packet = Packet::from_bytes(&bytes);
            let decoded = PipelineResult::unpack(&mut packet).unwrap();
            prop_assert_eq!(packet.read_position(), bytes.len());
            prop_assert_eq!(decoded, r);
        }
    }
}
