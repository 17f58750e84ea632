//! Sequential binary buffer shared by the encoder and the decoder.
//!
//! All multi-byte values are big-endian (network order); floats are IEEE-754.
//! A sequence is a `u32` element count followed by the elements. There is no
//! schema information in the bytes: the order in which fields are written is
//! the wire contract, and a reader must consume them in exactly that order.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::PacketError;

/// Width of a sequence's element count.
pub const SEQ_COUNT_BYTES: usize = 4;

/// A structured entity with a fixed field order on the wire.
pub trait PacketSerde: Sized {
    /// Exact number of bytes `pack` will append, computed from the values alone.
    fn packed_size(&self) -> usize;

    /// Append all fields in wire order.
    fn pack(&self, packet: &mut Packet);

    /// Consume all fields in wire order.
    fn unpack(packet: &mut Packet) -> Result<Self, PacketError>;
}

/// Byte buffer with an append cursor (encode) and a read cursor (decode).
#[derive(Debug, Clone, Default)]
pub struct Packet {
    data: BytesMut,
    read_pos: usize,
}

impl Packet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            read_pos: 0,
        }
    }

    /// Allocate a packet sized exactly for `entity`.
    pub fn for_entity<T: PacketSerde>(entity: &T) -> Self {
        Self::with_capacity(entity.packed_size())
    }

    /// Wrap received bytes for decoding.
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Self {
        Self {
            data: BytesMut::from(bytes.as_ref()),
            read_pos: 0,
        }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes written but not yet consumed by the decoder.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.read_pos
    }

    pub fn read_position(&self) -> usize {
        self.read_pos
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data.freeze()
    }

    pub fn encode_u8(&mut self, value: u8) {
        self.data.put_u8(value);
    }

    pub fn encode_bool(&mut self, value: bool) {
        self.data.put_u8(u8::from(value));
    }

    pub fn encode_i32(&mut self, value: i32) {
        self.data.put_i32(value);
    }

    pub fn encode_u32(&mut self, value: u32) {
        self.data.put_u32(value);
    }

    pub fn encode_i64(&mut self, value: i64) {
        self.data.put_i64(value);
    }

    pub fn encode_f64(&mut self, value: f64) {
        self.data.put_f64(value);
    }

    /// Append `items.len()` as a `u32`, then each item.
    pub fn encode_seq<T: PacketSerde>(&mut self, items: &[T]) {
        assert!(
            items.len() <= u32::MAX as usize,
            "sequence of {} elements exceeds the u32 count field",
            items.len()
        );
        self.encode_u32(items.len() as u32);
        for item in items {
            item.pack(self);
        }
    }

    /// Append an optional entity as a presence flag followed by the entity.
    pub fn encode_option<T: PacketSerde>(&mut self, value: Option<&T>) {
        match value {
            Some(v) => {
                self.encode_bool(true);
                v.pack(self);
            }
            None => self.encode_bool(false),
        }
    }

    fn take(&mut self, needed: usize) -> Result<&[u8], PacketError> {
        let remaining = self.remaining();
        if remaining < needed {
            return Err(PacketError::Underflow {
                needed,
                offset: self.read_pos,
                remaining,
            });
        }
        let start = self.read_pos;
        self.read_pos += needed;
        Ok(&self.data[start..start + needed])
    }

    pub fn decode_u8(&mut self) -> Result<u8, PacketError> {
        let mut bytes = self.take(1)?;
        Ok(bytes.get_u8())
    }

    pub fn decode_bool(&mut self) -> Result<bool, PacketError> {
        match self.decode_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(PacketError::InvalidFlag(other)),
        }
    }

    pub fn decode_i32(&mut self) -> Result<i32, PacketError> {
        let mut bytes = self.take(4)?;
        Ok(bytes.get_i32())
    }

    pub fn decode_u32(&mut self) -> Result<u32, PacketError> {
        let mut bytes = self.take(4)?;
        Ok(bytes.get_u32())
    }

    pub fn decode_i64(&mut self) -> Result<i64, PacketError> {
        let mut bytes = self.take(8)?;
        Ok(bytes.get_i64())
    }

    pub fn decode_f64(&mut self) -> Result<f64, PacketError> {
        let mut bytes = self.take(8)?;
        Ok(bytes.get_f64())
    }

    pub fn decode_seq<T: PacketSerde>(&mut self) -> Result<Vec<T>, PacketError> {
        let count = self.decode_u32()? as usize;
        // A corrupt count must not turn into a huge allocation.
        let mut items = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            items.push(T::unpack(self)?);
        }
        Ok(items)
    }

    pub fn decode_option<T: PacketSerde>(&mut self) -> Result<Option<T>, PacketError> {
        if self.decode_bool()? {
            T::unpack(self).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Size of a sequence field holding `items`.
pub fn seq_packed_size<T: PacketSerde>(items: &[T]) -> usize {
    SEQ_COUNT_BYTES + items.iter().map(PacketSerde::packed_size).sum::<usize>()
}

/// Size of an optional field: one flag byte plus the value when present.
pub fn option_packed_size<T: PacketSerde>(value: Option<&T>) -> usize {
    1 + value.map_or(0, PacketSerde::packed_size)
}

/// Encode `entity` into a buffer allocated once at its exact size.
pub fn to_bytes<T: PacketSerde>(entity: &T) -> Bytes {
    let size = entity.packed_size();
    let mut packet = Packet::with_capacity(size);
    entity.pack(&mut packet);
    debug_assert_eq!(packet.len(), size, "packed_size disagrees with pack");
    packet.into_bytes()
}

/// Decode exactly one entity; leftover bytes are a layout mismatch.
pub fn from_bytes<T: PacketSerde>(bytes: impl AsRef<[u8]>) -> Result<T, PacketError> {
    let mut packet = Packet::from_bytes(bytes);
    let entity = T::unpack(&mut packet)?;
    match packet.remaining() {
        0 => Ok(entity),
        n => Err(PacketError::TrailingBytes(n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_are_big_endian() {
        let mut p = Packet::with_capacity(13);
        p.encode_u8(0xAB);
        p.encode_i32(1);
        p.encode_f64(1.0);
        assert_eq!(
            p.as_slice(),
            &[0xAB, 0, 0, 0, 1, 0x3F, 0xF0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn primitives_decode_in_write_order() {
        let mut p = Packet::default();
        p.encode_i64(-7);
        p.encode_u32(42);
        p.encode_f64(-0.25);
        p.encode_bool(true);

        assert_eq!(p.decode_i64().unwrap(), -7);
        assert_eq!(p.decode_u32().unwrap(), 42);
        assert_eq!(p.decode_f64().unwrap(), -0.25);
        assert!(p.decode_bool().unwrap());
        assert_eq!(p.remaining(), 0);
    }

    #[test]
    fn reading_past_written_region_fails() {
        let mut p = Packet::default();
        p.encode_i32(5);
        assert_eq!(p.decode_i32().unwrap(), 5);
        assert_eq!(
            p.decode_f64(),
            Err(PacketError::Underflow {
                needed: 8,
                offset: 4,
                remaining: 0,
            })
        );
    }

    #[test]
    fn bool_rejects_garbage() {
        let mut p = Packet::from_bytes([7u8]);
        assert_eq!(p.decode_bool(), Err(PacketError::InvalidFlag(7)));
    }

    #[test]
    fn corrupt_sequence_count_underflows_instead_of_allocating() {
        let mut p = Packet::from_bytes([0xFF, 0xFF, 0xFF, 0xFF]);
        let result = p.decode_seq::<crate::geometry::TargetCorner>();
        assert!(matches!(result, Err(PacketError::Underflow { .. })));
    }
}
