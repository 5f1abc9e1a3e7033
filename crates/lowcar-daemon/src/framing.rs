//! Frame extraction over a raw byte stream.
//!
//! The reader buffers incoming bytes, scans to the next delimiter, and
//! hands out one decoded [`Message`] per call. A malformed frame is
//! consumed and reported, never fatal: the next call resumes scanning at
//! the following delimiter, which is the resynchronization contract of
//! the wire protocol.

use lowcar_protocol::{DELIMITER, MAX_ENCODED_FRAME, Message, ProtocolError};
use thiserror::Error;
use tracing::trace;

use crate::transport::{TransportError, TransportReader, TransportWriter};

/// Errors on one logical link. Protocol errors are local to a single
/// frame; transport errors other than `Timeout` end the link.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

pub struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: TransportReader> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(2 * MAX_ENCODED_FRAME),
        }
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Returns the next well-formed message.
    ///
    /// `Err(Protocol(_))` means one frame was dropped; the caller may
    /// simply call again. `Err(Transport(Timeout))` is the cooperative
    /// checkpoint: no complete frame arrived within the read slice.
    pub fn next_message(&mut self) -> Result<Message, LinkError> {
        loop {
            if let Some(result) = self.extract() {
                return result.map_err(LinkError::from);
            }
            let mut chunk = [0u8; 256];
            let n = self.inner.read(&mut chunk)?;
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Pops one frame from the buffer, or `None` if no complete frame is
    /// buffered yet.
    fn extract(&mut self) -> Option<Result<Message, ProtocolError>> {
        // scan to the delimiter, discarding leftovers of torn frames
        let start = self.buf.iter().position(|&b| b == DELIMITER)?;
        if start > 0 {
            trace!(skipped = start, "skipped bytes before delimiter");
            self.buf.drain(..start);
        }
        // delimiter + length byte + body
        if self.buf.len() < 2 {
            return None;
        }
        let body_len = self.buf[1] as usize;
        if body_len == 0 {
            // a length byte of zero can only be stream garbage
            self.buf.drain(..2);
            return Some(Err(ProtocolError::TooShort { len: 0 }));
        }
        if self.buf.len() < 2 + body_len {
            return None;
        }
        let body: Vec<u8> = self.buf[2..2 + body_len].to_vec();
        self.buf.drain(..2 + body_len);
        Some(Message::decode_body(&body))
    }
}

/// Encodes and writes one message. A short write surfaces as an
/// [`TransportError::Io`]; the caller treats it per the link's error
/// policy rather than retrying.
pub fn send_message<W: TransportWriter>(writer: &mut W, message: &Message) -> Result<(), LinkError> {
    let frame = message.encode()?;
    writer.write_all(&frame)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lowcar_protocol::{DeviceIdentity, MessageKind};
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Feeds scripted byte chunks, then times out forever.
    struct ScriptedReader {
        chunks: VecDeque<Vec<u8>>,
    }

    impl ScriptedReader {
        fn new<I: IntoIterator<Item = Vec<u8>>>(chunks: I) -> Self {
            Self {
                chunks: chunks.into_iter().collect(),
            }
        }
    }

    impl TransportReader for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
            match self.chunks.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => Err(TransportError::Timeout),
            }
        }

        fn set_read_timeout(&mut self, _timeout: Duration) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn ack_frame() -> Vec<u8> {
        Message::acknowledgement(&DeviceIdentity {
            dev_type: 1,
            year: 22,
            uid: 77,
        })
        .encode()
        .unwrap()
    }

    #[test]
    fn reassembles_a_frame_split_across_reads() {
        let frame = ack_frame();
        let (a, b) = frame.split_at(3);
        let mut reader = FrameReader::new(ScriptedReader::new([a.to_vec(), b.to_vec()]));
        let msg = reader.next_message().unwrap();
        assert_eq!(msg.kind, MessageKind::Acknowledgement);
        assert!(matches!(
            reader.next_message(),
            Err(LinkError::Transport(TransportError::Timeout))
        ));
    }

    #[test]
    fn two_frames_in_one_read() {
        let mut bytes = Message::ping().encode().unwrap();
        bytes.extend_from_slice(&ack_frame());
        let mut reader = FrameReader::new(ScriptedReader::new([bytes]));
        assert_eq!(reader.next_message().unwrap().kind, MessageKind::Ping);
        assert_eq!(
            reader.next_message().unwrap().kind,
            MessageKind::Acknowledgement
        );
    }

    #[test]
    fn garbage_before_delimiter_is_skipped() {
        let mut bytes = vec![0x13, 0x37, 0xFF];
        bytes.extend_from_slice(&ack_frame());
        let mut reader = FrameReader::new(ScriptedReader::new([bytes]));
        assert_eq!(
            reader.next_message().unwrap().kind,
            MessageKind::Acknowledgement
        );
    }

    #[test]
    fn corrupt_frame_reports_then_resynchronizes() {
        let mut corrupt = Message::ping().encode().unwrap();
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0x40; // break the checksum
        corrupt.extend_from_slice(&ack_frame());
        let mut reader = FrameReader::new(ScriptedReader::new([corrupt]));
        assert!(matches!(reader.next_message(), Err(LinkError::Protocol(_))));
        assert_eq!(
            reader.next_message().unwrap().kind,
            MessageKind::Acknowledgement
        );
    }

    #[test]
    fn zero_length_byte_is_consumed_as_garbage() {
        let mut bytes = vec![DELIMITER, 0x00];
        bytes.extend_from_slice(&ack_frame());
        let mut reader = FrameReader::new(ScriptedReader::new([bytes]));
        assert!(matches!(reader.next_message(), Err(LinkError::Protocol(_))));
        assert_eq!(
            reader.next_message().unwrap().kind,
            MessageKind::Acknowledgement
        );
    }
}
