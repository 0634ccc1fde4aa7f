// CLASSIFICATION: COMMUNITY
// Filename: trace.rs v0.2
// Author: Lukas Bower
// Date Modified: 2026-03-12

//! Injected diagnostic sink observing every byte crossing the link.
//!
//! The sender and reader report each TX/RX byte here in hex plus
//! printable-ASCII form. The sink is injected per session; no global state.

use std::fmt::Write as _;

use log::debug;

/// Observer for bytes written to and read from the link.
pub trait WireTrace {
    /// Bytes just written to the channel.
    fn tx(&mut self, bytes: &[u8]);

    /// Bytes just read from the channel.
    fn rx(&mut self, bytes: &[u8]);
}

/// Trace sink rendering through `log::debug!` in hex + printable-ASCII form.
#[derive(Debug, Default)]
pub struct LogTrace;

impl WireTrace for LogTrace {
    fn tx(&mut self, bytes: &[u8]) {
        debug!("TX: {}", render(bytes));
    }

    fn rx(&mut self, bytes: &[u8]) {
        debug!("RX: {}", render(bytes));
    }
}

/// Trace sink discarding everything.
#[derive(Debug, Default)]
pub struct NullTrace;

impl WireTrace for NullTrace {
    fn tx(&mut self, _bytes: &[u8]) {}

    fn rx(&mut self, _bytes: &[u8]) {}
}

/// Render bytes as `68 69 2e | hi.` with non-printables shown as dots.
pub fn render(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 3);
    let mut ascii = String::with_capacity(bytes.len());
    for (index, byte) in bytes.iter().enumerate() {
        if index > 0 {
            hex.push(' ');
        }
        let _ = write!(hex, "{byte:02x}");
        ascii.push(if byte.is_ascii_graphic() || *byte == b' ' {
            *byte as char
        } else {
            '.'
        });
    }
    format!("{hex} | {ascii}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_mixes_hex_and_ascii() {
        assert_eq!(render(b"hi"), "68 69 | hi");
    }

    #[test]
    fn render_masks_non_printables() {
        assert_eq!(render(&[0x0d, b'@']), "0d 40 | .@");
    }
}
