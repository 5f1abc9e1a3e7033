//! Parameter values and their wire representation.
//!
//! DEVICE_WRITE and DEVICE_DATA carry a 32-bit little-endian parameter
//! bitmap followed by one fixed-width value per set bit, in ascending bit
//! order. Which width a bit uses is decided by the device type's declared
//! parameter schema, supplied by the caller; the codec itself stays free of
//! any device-type knowledge.

use crate::{MAX_PARAMS, MAX_PAYLOAD, ProtocolError};

/// Declared type of one device parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Int,
    Float,
    Bool,
}

impl ParamType {
    /// Bytes this parameter occupies on the wire.
    pub fn wire_size(self) -> usize {
        match self {
            ParamType::Int | ParamType::Float => 4,
            ParamType::Bool => 1,
        }
    }

    /// The zero value of this type, used when a slot is first populated.
    pub fn zero(self) -> Value {
        match self {
            ParamType::Int => Value::Int(0),
            ParamType::Float => Value::Float(0.0),
            ParamType::Bool => Value::Bool(false),
        }
    }
}

/// A single parameter value, typed at the wire-decode boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f32),
    Bool(bool),
}

impl Value {
    pub fn param_type(&self) -> ParamType {
        match self {
            Value::Int(_) => ParamType::Int,
            Value::Float(_) => ParamType::Float,
            Value::Bool(_) => ParamType::Bool,
        }
    }
}

/// Appends the wire form of `values` for the set bits of `mask` to `out`.
///
/// `values` must hold one entry per set bit, ascending. Each value must match
/// the schema's declared type and every set bit must name a real parameter.
pub fn encode_values(
    mask: u32,
    values: &[Value],
    schema: &[ParamType],
    out: &mut Vec<u8>,
) -> Result<(), ProtocolError> {
    let mut next = values.iter();
    for index in 0..MAX_PARAMS {
        if mask & (1 << index) == 0 {
            continue;
        }
        let declared = *schema
            .get(index)
            .ok_or(ProtocolError::UnknownParam { index })?;
        let value = next.next().ok_or(ProtocolError::UnknownParam { index })?;
        if value.param_type() != declared {
            return Err(ProtocolError::TypeMismatch {
                index,
                expected: declared,
            });
        }
        match *value {
            Value::Int(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Float(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Bool(v) => out.push(v as u8),
        }
        if out.len() > MAX_PAYLOAD {
            return Err(ProtocolError::PayloadTooLong(out.len()));
        }
    }
    Ok(())
}

/// Decodes the value section that follows a parameter bitmap.
///
/// Returns one [`Value`] per set bit of `mask`, ascending. The byte count
/// must match the schema exactly; trailing garbage is rejected.
pub fn decode_values(
    mask: u32,
    schema: &[ParamType],
    bytes: &[u8],
) -> Result<Vec<Value>, ProtocolError> {
    let mut out = Vec::with_capacity(mask.count_ones() as usize);
    let mut at = 0;
    for index in 0..MAX_PARAMS {
        if mask & (1 << index) == 0 {
            continue;
        }
        let declared = *schema
            .get(index)
            .ok_or(ProtocolError::UnknownParam { index })?;
        let size = declared.wire_size();
        if at + size > bytes.len() {
            return Err(ProtocolError::LengthMismatch {
                header: at + size,
                actual: bytes.len(),
            });
        }
        let value = match declared {
            ParamType::Int => {
                Value::Int(i32::from_le_bytes(bytes[at..at + 4].try_into().unwrap()))
            },
            ParamType::Float => {
                Value::Float(f32::from_le_bytes(bytes[at..at + 4].try_into().unwrap()))
            },
            ParamType::Bool => Value::Bool(bytes[at] != 0),
        };
        out.push(value);
        at += size;
    }
    if at != bytes.len() {
        return Err(ProtocolError::LengthMismatch {
            header: at,
            actual: bytes.len(),
        });
    }
    Ok(out)
}
