use crate::error::PacketError;
use crate::packet::{seq_packed_size, Packet, PacketSerde};
use crate::target::TrackedTarget;

/// Targets found in one processed frame, as published to the remote reader.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineResult {
    /// Increments once per published frame of a camera.
    pub sequence_id: i64,
    /// Sum of the pipeline's stage latencies.
    pub latency_millis: f64,
    /// Detection order.
    pub targets: Vec<TrackedTarget>,
}

impl PipelineResult {
    pub fn new(sequence_id: i64, latency_millis: f64, targets: Vec<TrackedTarget>) -> Self {
        Self {
            sequence_id,
            latency_millis,
            targets,
        }
    }

    pub fn has_targets(&self) -> bool {
        !self.targets.is_empty()
    }

    /// The first target in detection order.
    pub fn best_target(&self) -> Option<&TrackedTarget> {
        self.targets.first()
    }
}

impl PacketSerde for PipelineResult {
    fn packed_size(&self) -> usize {
        8 + 8 + seq_packed_size(&self.targets)
    }

    fn pack(&self, packet: &mut Packet) {
        packet.encode_i64(self.sequence_id);
        packet.encode_f64(self.latency_millis);
        packet.encode_seq(&self.targets);
    }

    fn unpack(packet: &mut Packet) -> Result<Self, PacketError> {
        Ok(Self {
            sequence_id: packet.decode_i64()?,
            latency_millis: packet.decode_f64()?,
            targets: packet.decode_seq()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{TargetCorner, Transform3d};
    use crate::packet::{from_bytes, to_bytes};

    fn corners() -> Vec<TargetCorner> {
        vec![
            TargetCorner::new(1.0, 2.0),
            TargetCorner::new(3.0, 4.0),
            TargetCorner::new(5.0, 6.0),
            TargetCorner::new(7.0, 8.0),
        ]
    }

    #[test]
    fn empty_result_round_trips() {
        let result = PipelineResult::new(1, 0.0, Vec::new());
        let mut p = Packet::for_entity(&result);
        result.pack(&mut p);
        assert_eq!(p.len(), 20);

        let decoded = PipelineResult::unpack(&mut p).unwrap();
        assert_eq!(decoded.sequence_id, 1);
        assert!(decoded.targets.is_empty());
        assert_eq!(decoded, result);
    }

    #[test]
    fn result_with_targets_round_trips() {
        let result = PipelineResult::new(
            2,
            12.5,
            vec![
                TrackedTarget::new(
                    3.0,
                    -4.0,
                    9.0,
                    4.0,
                    Some(Transform3d::from_planar(1.0, 2.0, 1.5)),
                    corners(),
                ),
                TrackedTarget::new(
                    3.0,
                    -4.0,
                    9.1,
                    6.7,
                    Some(Transform3d::from_planar(1.0, 5.0, 1.5)),
                    corners(),
                ),
            ],
        );
        let bytes = to_bytes(&result);
        assert_eq!(bytes.len(), result.packed_size());

        let decoded: PipelineResult = from_bytes(&bytes).unwrap();
        assert_eq!(decoded, result);
        assert_eq!(decoded.best_target(), result.targets.first());
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = to_bytes(&PipelineResult::new(3, 1.0, Vec::new())).to_vec();
        bytes.push(0);
        assert_eq!(
            from_bytes::<PipelineResult>(bytes),
            Err(PacketError::TrailingBytes(1))
        );
    }
}
