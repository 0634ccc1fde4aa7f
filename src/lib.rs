// CLASSIFICATION: COMMUNITY
// Filename: lib.rs v0.4
// Author: Lukas Bower
// Date Modified: 2026-03-19
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Serial console uploader for ODT-style octal debug monitors.
//!
//! The crate drives the interactive open-address / deposit-value grammar of a
//! resident octal debugger over an asynchronous serial link to place a binary
//! image in target memory. Two transfer strategies share one protocol
//! substrate:
//!
//! - **Loader streaming**: a twelve-word relay routine is deposited through
//!   the monitor, started, and the payload is streamed to it as raw paced
//!   bytes.
//! - **Direct deposit**: every 16-bit word of the payload goes through the
//!   monitor's own deposit loop, with no code injected.
//!
//! The protocol engine lives in [`session`]; it consumes any byte-oriented
//! duplex [`transport::Channel`], so tests and simulations can stand in for a
//! real serial port.

pub mod cli;
pub mod codec;
pub mod link;
pub mod loader;
pub mod report;
pub mod session;
pub mod trace;
pub mod transport;

pub use link::LinkError;
pub use loader::LoaderImage;
pub use report::TransferReport;
pub use session::{
    ContractViolation, Session, Strategy, Timing, UploadFailure, UploadOptions, UploadOutcome,
};
pub use transport::{Channel, SerialChannel, SYMBOL_RATE};

/// Boxed error type used at the application boundary.
pub type OdtError = std::boxed::Box<dyn std::error::Error + Send + Sync>;
