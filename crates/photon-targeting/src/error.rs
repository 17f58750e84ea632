use thiserror::Error;

/// Failure while decoding a packed message.
///
/// Any of these means the buffer and the reader's idea of the layout disagree;
/// the whole message has to be discarded.
#[derive(Debug, Error, PartialEq)]
pub enum PacketError {
    #[error("packet underflow: needed {needed} bytes at offset {offset}, {remaining} remaining")]
    Underflow {
        needed: usize,
        offset: usize,
        remaining: usize,
    },

    #[error("target must carry 0 or 4 corners, got {0}")]
    InvalidCornerCount(u32),

    #[error("invalid presence flag {0:#04x}")]
    InvalidFlag(u8),

    #[error("protocol version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u8, found: u8 },

    #[error("unknown message kind {0}")]
    UnknownKind(u8),

    #[error("unexpected message kind: expected {expected}, found {found}")]
    KindMismatch { expected: u8, found: u8 },

    #[error("rotation quaternion is not unit length (norm {0})")]
    NonUnitQuaternion(f64),

    #[error("{0} trailing bytes after decoded message")]
    TrailingBytes(usize),
}
