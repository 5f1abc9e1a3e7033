//! Serial transport for physical boards: raw mode, 115200 8N1.
//!
//! Read timeouts use the classic `VMIN = 0` / `VTIME` arrangement, so a
//! `read` returns whatever arrived within the window and 0 bytes on pure
//! silence. Lowcar boards reset on open (Arduino-style DTR toggle), which
//! is why the handshake tolerates a quiet start.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::time::Duration;

use nix::sys::termios::{
    BaudRate, ControlFlags, SetArg, SpecialCharacterIndices, cfmakeraw, cfsetspeed, tcgetattr,
    tcsetattr,
};

use super::{Transport, TransportError, TransportReader, TransportWriter};

fn os_err(errno: nix::errno::Errno) -> TransportError {
    TransportError::Io(std::io::Error::from_raw_os_error(errno as i32))
}

fn vtime_deciseconds(timeout: Duration) -> u8 {
    // round up so a sub-100ms request still waits at all
    (timeout.as_millis() as u64).div_ceil(100).clamp(0, 255) as u8
}

fn configure(file: &File, timeout: Duration) -> Result<(), TransportError> {
    let mut tio = tcgetattr(file).map_err(os_err)?;
    cfmakeraw(&mut tio);
    cfsetspeed(&mut tio, BaudRate::B115200).map_err(os_err)?;
    // 8N1 with modem-control lines ignored
    tio.control_flags |= ControlFlags::CLOCAL | ControlFlags::CREAD;
    tio.control_flags &= !(ControlFlags::CSTOPB | ControlFlags::PARENB);
    tio.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
    tio.control_chars[SpecialCharacterIndices::VTIME as usize] = vtime_deciseconds(timeout);
    tcsetattr(file, SetArg::TCSANOW, &tio).map_err(os_err)?;
    Ok(())
}

#[derive(Debug)]
pub struct SerialTransport {
    file: File,
}

impl SerialTransport {
    /// Opens and configures the port with an initial read timeout.
    pub fn open(path: &Path, timeout: Duration) -> Result<Self, TransportError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(nix::libc::O_NOCTTY)
            .open(path)?;
        configure(&file, timeout)?;
        Ok(Self { file })
    }
}

impl TransportReader for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        serial_read(&mut self.file, buf)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        configure(&self.file, timeout)
    }
}

impl TransportWriter for SerialTransport {
    fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        self.file.write_all(buf)?;
        Ok(())
    }
}

impl Transport for SerialTransport {
    type Reader = SerialReader;
    type Writer = SerialWriter;

    fn split(self) -> Result<(Self::Reader, Self::Writer), TransportError> {
        let writer = SerialWriter {
            file: self.file.try_clone()?,
        };
        Ok((SerialReader { file: self.file }, writer))
    }
}

// with VMIN = 0, a zero-byte read is a timeout, not EOF
fn serial_read(file: &mut File, buf: &mut [u8]) -> Result<usize, TransportError> {
    loop {
        match file.read(buf) {
            Ok(0) => return Err(TransportError::Timeout),
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransportError::Io(e)),
        }
    }
}

pub struct SerialReader {
    file: File,
}

impl TransportReader for SerialReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        serial_read(&mut self.file, buf)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        configure(&self.file, timeout)
    }
}

pub struct SerialWriter {
    file: File,
}

impl TransportWriter for SerialWriter {
    fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        self.file.write_all(buf)?;
        Ok(())
    }
}
