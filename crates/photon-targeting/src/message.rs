//! Self-identifying messages and length-delimited streams of them.
//!
//! The bare [`PacketSerde`] layouts carry no schema information. A message
//! adds a two byte header (protocol version, message kind) so a reader built
//! against a different layout fails on the first byte instead of silently
//! misreading fields.

use std::fmt;
use std::io::{self, Read, Write};

use bytes::Bytes;
use tracing::warn;

use crate::error::PacketError;
use crate::packet::{Packet, PacketSerde};
use crate::result::PipelineResult;
use crate::target::TrackedTarget;

/// Bumped on every change to any layout in this crate.
pub const PROTOCOL_VERSION: u8 = 1;

pub const HEADER_BYTES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    PipelineResult = 1,
    TrackedTarget = 2,
}

impl MessageKind {
    fn from_u8(value: u8) -> Result<Self, PacketError> {
        match value {
            1 => Ok(Self::PipelineResult),
            2 => Ok(Self::TrackedTarget),
            other => Err(PacketError::UnknownKind(other)),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::PipelineResult => write!(f, "pipeline-result"),
            MessageKind::TrackedTarget => write!(f, "tracked-target"),
        }
    }
}

/// An entity that can be sent as a top-level message.
pub trait Message: PacketSerde {
    const KIND: MessageKind;
}

impl Message for PipelineResult {
    const KIND: MessageKind = MessageKind::PipelineResult;
}

impl Message for TrackedTarget {
    const KIND: MessageKind = MessageKind::TrackedTarget;
}

/// Header plus body, allocated once.
pub fn encode_message<T: Message>(entity: &T) -> Bytes {
    let size = HEADER_BYTES + entity.packed_size();
    let mut packet = Packet::with_capacity(size);
    packet.encode_u8(PROTOCOL_VERSION);
    packet.encode_u8(T::KIND as u8);
    entity.pack(&mut packet);
    debug_assert_eq!(packet.len(), size, "packed_size disagrees with pack");
    packet.into_bytes()
}

/// Read the header without consuming the body.
pub fn peek_kind(bytes: &[u8]) -> Result<MessageKind, PacketError> {
    let mut packet = Packet::from_bytes(bytes.get(..HEADER_BYTES).unwrap_or(bytes));
    read_header(&mut packet)
}

fn read_header(packet: &mut Packet) -> Result<MessageKind, PacketError> {
    let version = packet.decode_u8()?;
    if version != PROTOCOL_VERSION {
        warn!(expected = PROTOCOL_VERSION, found = version, "protocol version mismatch");
        return Err(PacketError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            found: version,
        });
    }
    MessageKind::from_u8(packet.decode_u8()?)
}

pub fn decode_message<T: Message>(bytes: impl AsRef<[u8]>) -> Result<T, PacketError> {
    let mut packet = Packet::from_bytes(bytes);
    let kind = read_header(&mut packet)?;
    if kind != T::KIND {
        return Err(PacketError::KindMismatch {
            expected: T::KIND as u8,
            found: kind as u8,
        });
    }
    let entity = T::unpack(&mut packet)?;
    match packet.remaining() {
        0 => Ok(entity),
        n => Err(PacketError::TrailingBytes(n)),
    }
}

/// Write `message` prefixed with its big-endian `u32` length.
pub fn write_delimited<W: Write>(writer: &mut W, message: &[u8]) -> io::Result<()> {
    let len = u32::try_from(message.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "message exceeds u32 length"))?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(message)
}

/// Read one length-delimited message, or `None` at a clean end of stream.
pub fn read_delimited<R: Read>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    let mut read = 0;
    while read < len_buf.len() {
        match reader.read(&mut len_buf[read..]) {
            Ok(0) if read == 0 => return Ok(None),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended inside a length prefix",
                ))
            }
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    // The prefix is untrusted; let the buffer grow only as bytes arrive.
    let len = u32::from_be_bytes(len_buf);
    let mut message = Vec::new();
    reader.take(u64::from(len)).read_to_end(&mut message)?;
    if message.len() != len as usize {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("stream ended after {} of {len} message bytes", message.len()),
        ));
    }
    Ok(Some(message))
}
