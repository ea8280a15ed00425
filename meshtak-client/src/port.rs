//! Serial port abstraction.
//!
//! The connection talks to the wire through [`SerialIo`] so the rest of the
//! stack is independent of the actual byte stream: the real implementation
//! wraps a [`serialport`] handle, tests drive the full client through an
//! in-memory double.

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::SerialPort;

/// Byte-stream transport the client polls and writes.
///
/// Implementations must not block indefinitely in `read`: the background
/// reader checks `bytes_to_read` first and only reads what is already
/// available.
pub trait SerialIo: Send {
    /// Number of bytes available to read without blocking.
    fn bytes_to_read(&mut self) -> io::Result<usize>;

    /// Reads available bytes into `buf`, returning how many were read.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes the whole buffer.
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Flushes buffered output to the device.
    fn flush(&mut self) -> io::Result<()>;
}

/// A physical serial port.
struct NativePort(Box<dyn SerialPort>);

impl SerialIo for NativePort {
    fn bytes_to_read(&mut self) -> io::Result<usize> {
        self.0
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(io::Error::other)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(&mut self.0, buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        Write::write_all(&mut self.0, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Write::flush(&mut self.0)
    }
}

/// Opens a serial port configured for a TAK radio (8N1, short read timeout)
/// and asserts DTR so the device wakes up.
pub fn open(path: &str, baud_rate: u32, read_timeout: Duration) -> serialport::Result<Box<dyn SerialIo>> {
    let mut port = serialport::new(path, baud_rate)
        .timeout(read_timeout)
        .data_bits(serialport::DataBits::Eight)
        .stop_bits(serialport::StopBits::One)
        .parity(serialport::Parity::None)
        .open()?;
    let _ = port.write_data_terminal_ready(true);
    Ok(Box::new(NativePort(port)))
}
