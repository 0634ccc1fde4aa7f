// CLASSIFICATION: COMMUNITY
// Filename: link.rs v0.4
// Author: Lukas Bower
// Date Modified: 2026-03-17

//! Echo-verified sender and prompt reader over a monitor link.
//!
//! The monitor echoes every printable character it accepts, which is the only
//! transmission check the protocol has. [`MonitorLink`] pairs the duplex
//! channel with an injected [`WireTrace`] sink and offers the two primitives
//! everything else is built from: `send_byte` with echo verification and
//! `read_until` with a wall-clock deadline. If the monitor's output ever
//! diverges from the expected grammar, `read_until` times out instead of
//! hanging.

use std::io;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::trace::WireTrace;
use crate::transport::Channel;

/// Byte the monitor emits when idle and ready for a command.
pub const ATTENTION_PROMPT: u8 = b'@';

/// Byte the monitor emits after opening an address for deposit.
pub const DEPOSIT_PROMPT: u8 = b' ';

/// Carriage return; interrupts the monitor into command mode.
pub const CARRIAGE_RETURN: u8 = b'\r';

/// Failures on the monitor link.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The expected byte did not arrive before the deadline.
    #[error("timed out after {timeout:?} waiting for byte {expected:#04x}")]
    Timeout {
        /// Byte that was awaited (echo or prompt).
        expected: u8,
        /// Deadline that elapsed.
        timeout: Duration,
    },
    /// The monitor echoed something other than what was sent.
    #[error("echo mismatch: sent {sent:#04x}, received {received:#04x}")]
    EchoMismatch {
        /// Byte written to the link.
        sent: u8,
        /// Byte the monitor echoed back.
        received: u8,
    },
    /// The underlying channel failed.
    #[error("channel error: {0}")]
    Channel(#[from] io::Error),
}

fn is_printable(byte: u8) -> bool {
    (0x20..=0x7e).contains(&byte)
}

/// Duplex channel plus trace sink, speaking the monitor's byte discipline.
pub struct MonitorLink<C> {
    channel: C,
    trace: Box<dyn WireTrace>,
}

impl<C: Channel> MonitorLink<C> {
    /// Wrap `channel`, reporting every byte to `trace`.
    pub fn new(channel: C, trace: Box<dyn WireTrace>) -> Self {
        Self { channel, trace }
    }

    /// Send one byte, verifying the monitor's echo for printable bytes.
    ///
    /// Control characters are not reliably echoed by the monitor, so for a
    /// non-printable byte the send completes once written. For printable
    /// bytes a differing echo fails with [`LinkError::EchoMismatch`] and a
    /// missing echo fails with [`LinkError::Timeout`].
    pub fn send_byte(&mut self, byte: u8, echo_timeout: Duration) -> Result<(), LinkError> {
        self.channel.write_all(&[byte])?;
        self.trace.tx(&[byte]);
        if !is_printable(byte) {
            return Ok(());
        }
        let deadline = Instant::now() + echo_timeout;
        let mut buf = [0u8; 1];
        loop {
            if self.channel.read(&mut buf)? == 1 {
                self.trace.rx(&buf);
                if buf[0] == byte {
                    return Ok(());
                }
                return Err(LinkError::EchoMismatch {
                    sent: byte,
                    received: buf[0],
                });
            }
            if Instant::now() >= deadline {
                return Err(LinkError::Timeout {
                    expected: byte,
                    timeout: echo_timeout,
                });
            }
        }
    }

    /// Send every byte of `text` through [`MonitorLink::send_byte`].
    pub fn send_text(&mut self, text: &str, echo_timeout: Duration) -> Result<(), LinkError> {
        for &byte in text.as_bytes() {
            self.send_byte(byte, echo_timeout)?;
        }
        Ok(())
    }

    /// Write one byte with no echo verification.
    ///
    /// Used while the injected loader owns the link; it does not echo.
    pub fn write_raw(&mut self, byte: u8) -> Result<(), LinkError> {
        self.channel.write_all(&[byte])?;
        self.trace.tx(&[byte]);
        Ok(())
    }

    /// Read and buffer bytes until `terminator` appears or `timeout` elapses.
    ///
    /// Returns the full buffer, terminator included. The deadline is measured
    /// from call entry; single reads stay bounded by the channel's own read
    /// timeout so the deadline is enforceable.
    pub fn read_until(&mut self, terminator: u8, timeout: Duration) -> Result<Vec<u8>, LinkError> {
        let deadline = Instant::now() + timeout;
        let mut response = Vec::new();
        let mut buf = [0u8; 1];
        loop {
            if self.channel.bytes_available()? > 0 && self.channel.read(&mut buf)? == 1 {
                self.trace.rx(&buf);
                response.push(buf[0]);
                if buf[0] == terminator {
                    return Ok(response);
                }
                continue;
            }
            if Instant::now() >= deadline {
                return Err(LinkError::Timeout {
                    expected: terminator,
                    timeout,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::NullTrace;
    use std::collections::VecDeque;

    /// Channel fake that optionally echoes writes, skewed by `echo_offset`.
    struct FakeChannel {
        pending: VecDeque<u8>,
        written: Vec<u8>,
        echo: bool,
        echo_offset: u8,
    }

    impl FakeChannel {
        fn echoing() -> Self {
            Self {
                pending: VecDeque::new(),
                written: Vec::new(),
                echo: true,
                echo_offset: 0,
            }
        }

        fn silent() -> Self {
            Self {
                pending: VecDeque::new(),
                written: Vec::new(),
                echo: false,
                echo_offset: 0,
            }
        }

        fn skewed() -> Self {
            Self {
                echo_offset: 1,
                ..Self::echoing()
            }
        }

        fn preload(mut self, bytes: &[u8]) -> Self {
            self.pending.extend(bytes);
            self
        }
    }

    impl Channel for FakeChannel {
        fn bytes_available(&mut self) -> io::Result<usize> {
            Ok(self.pending.len())
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.pending.pop_front() {
                Some(byte) => {
                    buf[0] = byte;
                    Ok(1)
                }
                None => Ok(0),
            }
        }

        fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
            for &byte in bytes {
                self.written.push(byte);
                if self.echo && is_printable(byte) {
                    self.pending.push_back(byte.wrapping_add(self.echo_offset));
                }
            }
            Ok(())
        }
    }

    fn link(channel: FakeChannel) -> MonitorLink<FakeChannel> {
        MonitorLink::new(channel, Box::new(NullTrace))
    }

    #[test]
    fn send_accepts_exact_echo() {
        let mut link = link(FakeChannel::echoing());
        for byte in [b' ', b'0', b'7', b'g', b'~'] {
            link.send_byte(byte, Duration::from_millis(50)).unwrap();
        }
    }

    #[test]
    fn send_rejects_differing_echo() {
        let mut link = link(FakeChannel::skewed());
        let err = link.send_byte(b'1', Duration::from_millis(50)).unwrap_err();
        match err {
            LinkError::EchoMismatch { sent, received } => {
                assert_eq!(sent, b'1');
                assert_eq!(received, b'2');
            }
            other => panic!("expected echo mismatch, got {other}"),
        }
    }

    #[test]
    fn send_times_out_without_echo() {
        let mut link = link(FakeChannel::silent());
        let err = link.send_byte(b'1', Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, LinkError::Timeout { expected: b'1', .. }));
    }

    #[test]
    fn send_skips_echo_for_control_bytes() {
        let mut link = link(FakeChannel::silent());
        link.send_byte(CARRIAGE_RETURN, Duration::from_millis(20))
            .unwrap();
        link.send_byte(b'\n', Duration::from_millis(20)).unwrap();
        assert_eq!(link.channel.written, vec![CARRIAGE_RETURN, b'\n']);
    }

    #[test]
    fn read_until_returns_buffer_with_terminator() {
        let mut link = link(FakeChannel::silent().preload(b"xx@"));
        let response = link
            .read_until(ATTENTION_PROMPT, Duration::from_millis(50))
            .unwrap();
        assert_eq!(response, b"xx@");
    }

    #[test]
    fn read_until_stops_at_first_terminator() {
        let mut link = link(FakeChannel::silent().preload(b"12 34 "));
        let response = link
            .read_until(DEPOSIT_PROMPT, Duration::from_millis(50))
            .unwrap();
        assert_eq!(response, b"12 ");
        assert_eq!(link.channel.pending.len(), 3);
    }

    #[test]
    fn read_until_times_out_near_the_deadline() {
        let mut link = link(FakeChannel::silent().preload(b"xx"));
        let timeout = Duration::from_millis(50);
        let started = Instant::now();
        let err = link.read_until(ATTENTION_PROMPT, timeout).unwrap_err();
        let elapsed = started.elapsed();
        assert!(matches!(err, LinkError::Timeout { expected: b'@', .. }));
        assert!(elapsed >= timeout);
        assert!(elapsed < timeout + Duration::from_millis(250));
    }
}
