//! Message construction, framing and parsing.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::params::{ParamType, Value, decode_values, encode_values};
use crate::{DeviceIdentity, MAX_PAYLOAD, ProtocolError, cobs};

/// Frame delimiter; never appears inside a COBS body.
pub const DELIMITER: u8 = 0x00;

/// Upper bound on a complete encoded frame:
/// delimiter + cobs length byte + COBS(kind + payload_len + payload + checksum).
pub const MAX_ENCODED_FRAME: usize = 2 + (3 + MAX_PAYLOAD) + (3 + MAX_PAYLOAD) / 254 + 1;

/// The seven message kinds of the wire protocol.
///
/// One numbering is used by both ends; there is no version negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MessageKind {
    /// Bidirectional liveness probe; also opens the handshake.
    Ping = 0x01,
    /// Device's one-time reply to its first PING, carrying its identity.
    Acknowledgement = 0x02,
    /// Host asks the device to push a parameter set at an interval.
    SubscriptionRequest = 0x03,
    /// Host writes parameter values to the device.
    DeviceWrite = 0x04,
    /// Device pushes parameter readings to the host.
    DeviceData = 0x05,
    /// Free-text diagnostics from the device, forwarded to the logger.
    Log = 0x06,
    /// Orderly shutdown of the logical connection.
    Reset = 0x07,
}

/// Clamping bounds for the SUBSCRIPTION_REQUEST push interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalBounds {
    pub min_ms: u16,
    pub max_ms: u16,
}

impl Default for IntervalBounds {
    fn default() -> Self {
        Self {
            min_ms: 40,
            max_ms: 500,
        }
    }
}

impl IntervalBounds {
    pub fn clamp(&self, interval_ms: u16) -> u16 {
        interval_ms.clamp(self.min_ms, self.max_ms)
    }
}

/// XOR checksum over `kind | payload_len | payload`.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// A single protocol message, built per send and consumed per receive.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub kind: MessageKind,
    pub payload: Vec<u8>,
}

impl Message {
    /// Empty-payload PING.
    pub fn ping() -> Self {
        Self {
            kind: MessageKind::Ping,
            payload: Vec::new(),
        }
    }

    /// Empty-payload RESET.
    pub fn reset() -> Self {
        Self {
            kind: MessageKind::Reset,
            payload: Vec::new(),
        }
    }

    /// ACKNOWLEDGEMENT carrying the device identity (device side, and the
    /// test fake devices).
    pub fn acknowledgement(identity: &DeviceIdentity) -> Self {
        Self {
            kind: MessageKind::Acknowledgement,
            payload: identity.to_bytes().to_vec(),
        }
    }

    /// SUBSCRIPTION_REQUEST for the parameters in `mask`, pushed every
    /// `interval_ms` milliseconds. The interval is clamped to `bounds`.
    pub fn subscription_request(mask: u32, interval_ms: u16, bounds: IntervalBounds) -> Self {
        let mut payload = Vec::with_capacity(6);
        payload.extend_from_slice(&mask.to_le_bytes());
        payload.extend_from_slice(&bounds.clamp(interval_ms).to_le_bytes());
        Self {
            kind: MessageKind::SubscriptionRequest,
            payload,
        }
    }

    /// DEVICE_WRITE carrying `values` for the set bits of `mask`.
    pub fn device_write(
        mask: u32,
        values: &[Value],
        schema: &[ParamType],
    ) -> Result<Self, ProtocolError> {
        Self::with_values(MessageKind::DeviceWrite, mask, values, schema)
    }

    /// DEVICE_DATA carrying `values` for the set bits of `mask`.
    pub fn device_data(
        mask: u32,
        values: &[Value],
        schema: &[ParamType],
    ) -> Result<Self, ProtocolError> {
        Self::with_values(MessageKind::DeviceData, mask, values, schema)
    }

    fn with_values(
        kind: MessageKind,
        mask: u32,
        values: &[Value],
        schema: &[ParamType],
    ) -> Result<Self, ProtocolError> {
        let mut payload = Vec::with_capacity(4 + values.len() * 4);
        payload.extend_from_slice(&mask.to_le_bytes());
        encode_values(mask, values, schema, &mut payload)?;
        Ok(Self { kind, payload })
    }

    /// LOG with a NUL-terminated text payload.
    pub fn log(text: &str) -> Result<Self, ProtocolError> {
        if text.len() + 1 > MAX_PAYLOAD {
            return Err(ProtocolError::PayloadTooLong(text.len() + 1));
        }
        let mut payload = Vec::with_capacity(text.len() + 1);
        payload.extend_from_slice(text.as_bytes());
        payload.push(0);
        Ok(Self {
            kind: MessageKind::Log,
            payload,
        })
    }

    // ---- parsers ------------------------------------------------------

    fn expect(&self, expected: MessageKind) -> Result<(), ProtocolError> {
        if self.kind != expected {
            return Err(ProtocolError::WrongKind {
                expected,
                actual: self.kind,
            });
        }
        Ok(())
    }

    /// Identity from an ACKNOWLEDGEMENT.
    pub fn identity(&self) -> Result<DeviceIdentity, ProtocolError> {
        self.expect(MessageKind::Acknowledgement)?;
        DeviceIdentity::from_bytes(&self.payload)
    }

    /// `(mask, interval_ms)` from a SUBSCRIPTION_REQUEST.
    pub fn subscription(&self) -> Result<(u32, u16), ProtocolError> {
        self.expect(MessageKind::SubscriptionRequest)?;
        if self.payload.len() != 6 {
            return Err(ProtocolError::MalformedPayload { kind: self.kind });
        }
        let mask = u32::from_le_bytes(self.payload[0..4].try_into().unwrap());
        let interval = u16::from_le_bytes(self.payload[4..6].try_into().unwrap());
        Ok((mask, interval))
    }

    /// `(mask, values)` from a DEVICE_WRITE or DEVICE_DATA, decoded against
    /// the device type's declared schema.
    pub fn values(&self, schema: &[ParamType]) -> Result<(u32, Vec<Value>), ProtocolError> {
        if self.kind != MessageKind::DeviceWrite && self.kind != MessageKind::DeviceData {
            return Err(ProtocolError::WrongKind {
                expected: MessageKind::DeviceData,
                actual: self.kind,
            });
        }
        if self.payload.len() < 4 {
            return Err(ProtocolError::MalformedPayload { kind: self.kind });
        }
        let mask = u32::from_le_bytes(self.payload[0..4].try_into().unwrap());
        let values = decode_values(mask, schema, &self.payload[4..])?;
        Ok((mask, values))
    }

    /// Text from a LOG frame, NUL-trimmed and lossy on invalid UTF-8.
    pub fn log_text(&self) -> Result<String, ProtocolError> {
        self.expect(MessageKind::Log)?;
        let end = self
            .payload
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.payload.len());
        Ok(String::from_utf8_lossy(&self.payload[..end]).into_owned())
    }

    // ---- framing ------------------------------------------------------

    /// Encodes the complete frame: `0x00 | cobs_len | COBS(body)`.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(ProtocolError::PayloadTooLong(self.payload.len()));
        }
        let mut body = Vec::with_capacity(3 + self.payload.len());
        body.push(self.kind.into());
        body.push(self.payload.len() as u8);
        body.extend_from_slice(&self.payload);
        body.push(checksum(&body));

        let encoded = cobs::encode(&body);
        let mut frame = Vec::with_capacity(2 + encoded.len());
        frame.push(DELIMITER);
        frame.push(encoded.len() as u8);
        frame.extend_from_slice(&encoded);
        Ok(frame)
    }

    /// Decodes a COBS body (everything after the delimiter and length byte).
    ///
    /// Rejects implausible lengths, unknown kinds and checksum mismatches.
    /// Never panics on arbitrary input; the caller resynchronizes at the
    /// next delimiter on error.
    pub fn decode_body(encoded: &[u8]) -> Result<Self, ProtocolError> {
        let body = cobs::decode(encoded)?;
        // kind + payload_len + checksum is the empty-PING minimum
        if body.len() < 3 {
            return Err(ProtocolError::TooShort { len: body.len() });
        }
        let payload_len = body[1] as usize;
        if payload_len > MAX_PAYLOAD {
            return Err(ProtocolError::PayloadTooLong(payload_len));
        }
        if body.len() != payload_len + 3 {
            return Err(ProtocolError::LengthMismatch {
                header: payload_len + 3,
                actual: body.len(),
            });
        }
        let expected = checksum(&body[..body.len() - 1]);
        let received = body[body.len() - 1];
        if expected != received {
            return Err(ProtocolError::ChecksumMismatch { expected, received });
        }
        let kind = MessageKind::try_from(body[0]).map_err(|_| ProtocolError::UnknownKind(body[0]))?;
        Ok(Self {
            kind,
            payload: body[2..2 + payload_len].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn roundtrip(msg: &Message) -> Message {
        let frame = msg.encode().unwrap();
        assert_eq!(frame[0], DELIMITER);
        assert_eq!(frame[1] as usize, frame.len() - 2);
        assert!(!frame[2..].contains(&DELIMITER));
        Message::decode_body(&frame[2..]).unwrap()
    }

    #[test]
    fn ping_roundtrip() {
        assert_eq!(roundtrip(&Message::ping()), Message::ping());
    }

    #[test]
    fn acknowledgement_roundtrip() {
        let id = DeviceIdentity {
            dev_type: 3,
            year: 21,
            uid: 0x0123_4567_89AB_CDEF,
        };
        let decoded = roundtrip(&Message::acknowledgement(&id));
        assert_eq!(decoded.identity().unwrap(), id);
    }

    #[test]
    fn subscription_interval_is_clamped() {
        let bounds = IntervalBounds {
            min_ms: 40,
            max_ms: 500,
        };
        let low = Message::subscription_request(0b11, 5, bounds);
        assert_eq!(low.subscription().unwrap(), (0b11, 40));
        let high = Message::subscription_request(0b11, 9999, bounds);
        assert_eq!(high.subscription().unwrap(), (0b11, 500));
        let mid = Message::subscription_request(0b11, 120, bounds);
        assert_eq!(mid.subscription().unwrap(), (0b11, 120));
    }

    #[test]
    fn device_write_values_roundtrip() {
        let schema = [ParamType::Int, ParamType::Bool, ParamType::Float];
        let msg =
            Message::device_write(0b101, &[Value::Int(7), Value::Float(3.5)], &schema).unwrap();
        let decoded = roundtrip(&msg);
        let (mask, values) = decoded.values(&schema).unwrap();
        assert_eq!(mask, 0b101);
        assert_eq!(values, vec![Value::Int(7), Value::Float(3.5)]);
    }

    #[test]
    fn log_text_roundtrip() {
        let msg = Message::log("motor 2 stalled").unwrap();
        assert_eq!(roundtrip(&msg).log_text().unwrap(), "motor 2 stalled");
    }

    #[test]
    fn decode_rejects_unknown_kind() {
        // well-formed body with a kind byte no variant claims
        let body = [0xEEu8, 0x00, checksum(&[0xEE, 0x00])];
        assert_eq!(
            Message::decode_body(&crate::cobs::encode(&body)),
            Err(ProtocolError::UnknownKind(0xEE))
        );
    }

    #[test]
    fn decode_rejects_short_body() {
        let encoded = crate::cobs::encode(&[0x01, 0x00]);
        assert!(matches!(
            Message::decode_body(&encoded),
            Err(ProtocolError::TooShort { .. })
        ));
    }

    #[test]
    fn decode_rejects_length_mismatch() {
        // header claims 4 payload bytes, body carries none
        let body = [0x01u8, 0x04, checksum(&[0x01, 0x04])];
        let encoded = crate::cobs::encode(&body);
        assert!(matches!(
            Message::decode_body(&encoded),
            Err(ProtocolError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn any_single_bit_flip_in_body_is_rejected() {
        let schema = [ParamType::Int, ParamType::Bool, ParamType::Float];
        let msg =
            Message::device_write(0b101, &[Value::Int(7), Value::Float(3.5)], &schema).unwrap();
        let frame = msg.encode().unwrap();
        let body = crate::cobs::decode(&frame[2..]).unwrap();
        for at in 0..body.len() {
            for bit in 0..8 {
                let mut corrupt = body.clone();
                corrupt[at] ^= 1 << bit;
                assert!(
                    Message::decode_body(&crate::cobs::encode(&corrupt)).is_err(),
                    "flip of body byte {at} bit {bit} went undetected"
                );
            }
        }
    }

    #[test]
    fn no_wire_flip_impersonates_the_original() {
        // COBS code bytes can collide with the XOR checksum, so a wire flip
        // may decode to a different valid frame, but never to this one.
        let schema = [ParamType::Int, ParamType::Bool, ParamType::Float];
        let msg =
            Message::device_write(0b101, &[Value::Int(7), Value::Float(3.5)], &schema).unwrap();
        let frame = msg.encode().unwrap();
        for at in 2..frame.len() {
            for bit in 0..8 {
                let mut corrupt = frame.clone();
                corrupt[at] ^= 1 << bit;
                if let Ok(decoded) = Message::decode_body(&corrupt[2..]) {
                    assert_ne!(decoded, msg, "flip of byte {at} bit {bit} undetected");
                }
            }
        }
    }

    proptest! {
        #[test]
        fn arbitrary_bodies_never_panic(body in proptest::collection::vec(any::<u8>(), 0..300)) {
            let _ = Message::decode_body(&body);
        }
    }
}
