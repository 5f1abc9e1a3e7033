//! # lowcar wire protocol
//!
//! Byte-level protocol spoken between the host daemon and lowcar peripheral
//! boards, over serial or local sockets (no hardware dependency).
//!
//! ## Modules
//!
//! - `cobs`: consistent-overhead byte stuffing
//! - `message`: message kinds, constructors, frame encode/decode
//! - `params`: parameter value sum type and bitmap/value codecs
//!
//! ## Frame layout
//!
//! ```text
//! 0x00 | cobs_len:u8 | COBS( kind:u8 | payload_len:u8 | payload | checksum:u8 )
//! ```
//!
//! The delimiter byte `0x00` never appears inside the COBS-encoded body, so a
//! reader that loses sync can recover by scanning forward for the next
//! delimiter. The checksum is the XOR of every byte of
//! `kind | payload_len | payload`. All multi-byte payload fields are little
//! endian.

pub mod cobs;
pub mod message;
pub mod params;

pub use message::{
    DELIMITER, IntervalBounds, MAX_ENCODED_FRAME, Message, MessageKind, checksum,
};
pub use params::{ParamType, Value, decode_values, encode_values};

use thiserror::Error;

/// Maximum number of simultaneously connected devices.
pub const MAX_DEVICES: usize = 32;

/// Maximum number of parameters a single device type may declare.
pub const MAX_PARAMS: usize = 32;

/// Largest legal payload in bytes, reached by DEVICE_WRITE / DEVICE_DATA
/// carrying all 32 parameters as 4-byte values after the 4-byte bitmap.
pub const MAX_PAYLOAD: usize = 4 + MAX_PARAMS * 4;

/// The 88-bit identity a device reports in its ACKNOWLEDGEMENT.
///
/// `uid` is assigned once at flash time and is the only field stable across
/// reconnects; `dev_type` indexes the external device-type catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub dev_type: u16,
    pub year: u8,
    pub uid: u64,
}

impl DeviceIdentity {
    /// Serializes to the 11-byte ACKNOWLEDGEMENT payload.
    pub fn to_bytes(&self) -> [u8; 11] {
        let mut out = [0u8; 11];
        out[0..2].copy_from_slice(&self.dev_type.to_le_bytes());
        out[2] = self.year;
        out[3..11].copy_from_slice(&self.uid.to_le_bytes());
        out
    }

    /// Parses the 11-byte ACKNOWLEDGEMENT payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() != 11 {
            return Err(ProtocolError::MalformedPayload {
                kind: MessageKind::Acknowledgement,
            });
        }
        Ok(Self {
            dev_type: u16::from_le_bytes([bytes[0], bytes[1]]),
            year: bytes[2],
            uid: u64::from_le_bytes(bytes[3..11].try_into().unwrap()),
        })
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "type={} year={} uid={:016x}",
            self.dev_type, self.year, self.uid
        )
    }
}

/// Protocol-level decode/encode failures.
///
/// All of these are recoverable by the caller: drop the frame, resynchronize
/// at the next delimiter, keep reading.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("unknown message kind 0x{0:02X}")]
    UnknownKind(u8),

    #[error("frame body too short: {len} bytes")]
    TooShort { len: usize },

    #[error("payload length mismatch: header says {header}, body carries {actual}")]
    LengthMismatch { header: usize, actual: usize },

    #[error("payload of {0} bytes exceeds the protocol maximum")]
    PayloadTooLong(usize),

    #[error("checksum mismatch: expected 0x{expected:02X}, received 0x{received:02X}")]
    ChecksumMismatch { expected: u8, received: u8 },

    #[error("truncated COBS block")]
    CobsTruncated,

    #[error("delimiter byte inside COBS body")]
    CobsZero,

    #[error("parameter {index} does not exist on this device type")]
    UnknownParam { index: usize },

    #[error("parameter {index} is declared {expected:?} but a different type was supplied")]
    TypeMismatch { index: usize, expected: ParamType },

    #[error("expected {expected:?}, received {actual:?}")]
    WrongKind {
        expected: MessageKind,
        actual: MessageKind,
    },

    #[error("malformed payload for {kind:?}")]
    MalformedPayload { kind: MessageKind },
}
