//! Unix-socket transport for virtual boards: simulated devices and the
//! test harness listen where a serial port would otherwise be.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use super::{Transport, TransportError, TransportReader, TransportWriter, map_read};

pub struct SocketTransport {
    stream: UnixStream,
}

impl SocketTransport {
    pub fn open(path: &Path, timeout: Duration) -> Result<Self, TransportError> {
        let stream = UnixStream::connect(path)?;
        stream.set_read_timeout(Some(timeout))?;
        Ok(Self { stream })
    }
}

fn set_timeout(stream: &UnixStream, timeout: Duration) -> Result<(), TransportError> {
    // None would block forever; a zero Duration is rejected by the OS
    let timeout = timeout.max(Duration::from_millis(1));
    stream.set_read_timeout(Some(timeout))?;
    Ok(())
}

impl TransportReader for SocketTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        map_read(self.stream.read(buf))
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        set_timeout(&self.stream, timeout)
    }
}

impl TransportWriter for SocketTransport {
    fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(buf)?;
        Ok(())
    }
}

impl Transport for SocketTransport {
    type Reader = SocketReader;
    type Writer = SocketWriter;

    fn split(self) -> Result<(Self::Reader, Self::Writer), TransportError> {
        let writer = SocketWriter {
            stream: self.stream.try_clone()?,
        };
        Ok((
            SocketReader {
                stream: self.stream,
            },
            writer,
        ))
    }
}

pub struct SocketReader {
    stream: UnixStream,
}

impl TransportReader for SocketReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        map_read(self.stream.read(buf))
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        set_timeout(&self.stream, timeout)
    }
}

pub struct SocketWriter {
    stream: UnixStream,
}

impl TransportWriter for SocketWriter {
    fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(buf)?;
        Ok(())
    }
}
