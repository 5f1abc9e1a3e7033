//! Byte-stream transports to lowcar endpoints.
//!
//! Two kinds of endpoint exist: physical boards behind serial character
//! devices, and virtual boards behind unix stream sockets. Both are plain
//! byte pipes; framing lives a layer up.

use std::time::Duration;

use thiserror::Error;

pub mod serial;
pub mod socket;

pub use serial::SerialTransport;
pub use socket::SocketTransport;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// No byte arrived within the configured read slice. Never fatal.
    #[error("read timed out")]
    Timeout,
    /// The peer closed the stream.
    #[error("endpoint closed")]
    Closed,
}

/// Read side of a transport. Reads return at least one byte, or
/// [`TransportError::Timeout`] once the current timeout elapses.
pub trait TransportReader: Send {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), TransportError>;
}

/// Write side of a transport.
pub trait TransportWriter: Send {
    fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError>;
}

/// A connected endpoint that can be split into its two halves, so the
/// inbound role can own reads while the outbound role owns writes.
pub trait Transport: TransportReader + TransportWriter {
    type Reader: TransportReader;
    type Writer: TransportWriter;

    fn split(self) -> Result<(Self::Reader, Self::Writer), TransportError>;
}

pub(crate) fn map_read(result: std::io::Result<usize>) -> Result<usize, TransportError> {
    match result {
        Ok(0) => Err(TransportError::Closed),
        Ok(n) => Ok(n),
        Err(e) if matches!(
            e.kind(),
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
        ) =>
        {
            Err(TransportError::Timeout)
        }
        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Err(TransportError::Timeout),
        Err(e) => Err(TransportError::Io(e)),
    }
}
