// CLASSIFICATION: COMMUNITY
// Filename: transport.rs v0.3
// Author: Lukas Bower
// Date Modified: 2026-03-12

//! Byte-oriented duplex channel boundary and its serial-port implementation.
//!
//! The protocol engine never talks to a device crate directly; it consumes
//! [`Channel`], which models exactly what the monitor firmware offers: a
//! non-blocking availability query, a bounded read, and a blocking write.

use std::io::{self, Read, Write};
use std::time::Duration;

use log::info;
use serialport::{DataBits, Parity, SerialPort, StopBits};

/// Symbol rate mandated by the monitor firmware. Not configurable.
pub const SYMBOL_RATE: u32 = 38_400;

/// Duplex byte channel consumed by the protocol engine.
///
/// Implementations must keep single reads bounded (by their own read timeout)
/// so callers can enforce wall-clock deadlines across repeated polls.
pub trait Channel {
    /// Number of bytes that can be read without blocking.
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Read up to `buf.len()` bytes, blocking at most the channel's read
    /// timeout. Returns `Ok(0)` when nothing arrived in time.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write the whole buffer to the link.
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// Serial port channel fixed at 38400 bps, 8 data bits, no parity, 1 stop bit.
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Open `path` with the mandated framing and the given per-read timeout.
    pub fn open(path: &str, read_timeout: Duration) -> io::Result<Self> {
        let port = serialport::new(path, SYMBOL_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(read_timeout)
            .open()
            .map_err(|err| io::Error::other(format!("open {path}: {err}")))?;
        info!("opened serial port {path} at {SYMBOL_RATE} bps, 8N1");
        Ok(Self { port })
    }
}

impl Channel for SerialChannel {
    fn bytes_available(&mut self) -> io::Result<usize> {
        self.port
            .bytes_to_read()
            .map(|count| count as usize)
            .map_err(io::Error::other)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(count) => Ok(count),
            Err(err) if err.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(err) => Err(err),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)
    }
}
