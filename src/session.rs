// CLASSIFICATION: COMMUNITY
// Filename: session.rs v0.5
// Author: Lukas Bower
// Date Modified: 2026-03-21

//! Upload orchestrator: the prompt-driven protocol state machine.
//!
//! A [`Session`] owns the monitor link for its whole lifetime and drives one
//! of two transfer strategies over the shared handshake / codec substrate:
//!
//! - [`Strategy::Loader`]: deposit the twelve-word resident loader through
//!   the monitor, start it, and stream the payload to it as raw paced bytes.
//! - [`Strategy::Deposit`]: push every 16-bit payload word through the
//!   monitor's own deposit loop, with no code injected.
//!
//! Protocol failures are carried inside the returned [`UploadOutcome`], never
//! raised past [`Session::run`]; only [`ContractViolation`]s propagate as
//! errors. There are no retries: a single echo mismatch or missed prompt ends
//! the transfer.

use std::io;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;

use crate::codec;
use crate::link::{LinkError, MonitorLink, ATTENTION_PROMPT, CARRIAGE_RETURN, DEPOSIT_PROMPT};
use crate::loader::LoaderImage;
use crate::report::{Progress, TransferReport};
use crate::trace::WireTrace;
use crate::transport::{Channel, SYMBOL_RATE};

/// Caller-level misuse, raised immediately and never retried.
#[derive(Debug, Error)]
pub enum ContractViolation {
    /// The start address did not parse as octal word-address text.
    #[error("start address {text:?} is not a valid octal word address")]
    BadStartAddress {
        /// Text as supplied by the caller.
        text: String,
    },
    /// The monitor deposits whole words; an odd start address cannot work.
    #[error("start address {address:06o} is odd")]
    OddStartAddress {
        /// Address as supplied by the caller.
        address: u16,
    },
    /// The source file could not be read.
    #[error("source file {}: {source}", .path.display())]
    UnreadableSource {
        /// Path as supplied by the caller.
        path: PathBuf,
        /// Underlying filesystem error.
        source: io::Error,
    },
    /// The payload length does not fit the 16-bit transfer-length word.
    #[error("payload of {len} bytes exceeds the 16-bit transfer length")]
    PayloadTooLarge {
        /// Payload length in bytes.
        len: usize,
    },
    /// The transfer would run past the top of the 16-bit address space.
    #[error("payload of {len} bytes starting at {start:06o} runs past the top of memory")]
    AddressRangeOverflow {
        /// Destination start address.
        start: u16,
        /// Payload length in bytes.
        len: usize,
    },
}

/// Protocol-level failure, tagged with the phase that aborted the transfer.
#[derive(Debug, Error)]
pub enum UploadFailure {
    /// The monitor never produced its attention prompt.
    #[error("handshake failed: {0}")]
    Handshake(LinkError),
    /// Opening an address for sequential deposit failed.
    #[error("could not open address {address:06o} for deposit: {source}")]
    OpenAddress {
        /// Address the open command named.
        address: u16,
        /// Link failure that ended the attempt.
        source: LinkError,
    },
    /// A loader image word failed to install; target memory in the loader
    /// region is now indeterminate.
    #[error("loader install failed at address {address:06o}: {source}")]
    LoaderInstall {
        /// Address of the word being deposited.
        address: u16,
        /// Link failure that ended the attempt.
        source: LinkError,
    },
    /// Leaving sequential deposit mode failed.
    #[error("could not leave sequential deposit mode: {0}")]
    DepositExit(LinkError),
    /// The go command for the loader entry address failed.
    #[error("loader start failed: {0}")]
    LoaderStart(LinkError),
    /// Writing the raw payload stream failed.
    #[error("payload stream failed after {sent} bytes: {source}")]
    Stream {
        /// Bytes already on the wire when the stream broke.
        sent: u64,
        /// Link failure that ended the attempt.
        source: LinkError,
    },
    /// A direct word deposit failed; the transfer aborts with no retry.
    #[error("deposit of word {index} failed: {source}")]
    Deposit {
        /// Zero-based sequence index of the word.
        index: usize,
        /// Link failure that ended the attempt.
        source: LinkError,
    },
    /// The monitor did not return to its prompt after the transfer. The
    /// payload is already on the wire, so this is reported, not raised.
    #[error("monitor did not return to the attention prompt: {0}")]
    Completion(LinkError),
}

/// Transfer strategy selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Inject the resident loader and stream raw bytes to it.
    Loader,
    /// Deposit every payload word through the monitor's own loop.
    Deposit,
}

/// Protocol deadlines and pacing delays.
///
/// All values are injectable so simulated links can run with zero or scaled
/// delays.
#[derive(Debug, Clone)]
pub struct Timing {
    /// Deadline for a printable byte's echo.
    pub echo_timeout: Duration,
    /// Deadline for the attention and deposit-ready prompts.
    pub prompt_timeout: Duration,
    /// Extended deadline for the post-transfer attention prompt.
    pub completion_timeout: Duration,
    /// Pause between starting the loader and the first streamed byte.
    pub loader_settle: Duration,
    /// Pause after each streamed byte so the loader's poll loop keeps up.
    pub byte_delay: Duration,
}

impl Timing {
    /// Defaults for a link at `rate` symbols per second.
    #[must_use]
    pub fn for_symbol_rate(rate: u32) -> Self {
        Self {
            echo_timeout: Duration::from_secs(1),
            prompt_timeout: Duration::from_secs(1),
            completion_timeout: Duration::from_secs(5),
            loader_settle: Duration::from_millis(100),
            // ten bit times per byte: start bit, eight data bits, stop bit
            byte_delay: Duration::from_secs_f64(10.0 / f64::from(rate)),
        }
    }

    /// No pacing sleeps and short deadlines, for simulated links.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            echo_timeout: Duration::from_millis(100),
            prompt_timeout: Duration::from_millis(100),
            completion_timeout: Duration::from_millis(200),
            loader_settle: Duration::ZERO,
            byte_delay: Duration::ZERO,
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::for_symbol_rate(SYMBOL_RATE)
    }
}

/// Configuration for one upload.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Destination start address in target memory.
    pub start_address: u16,
    /// Transfer strategy to drive.
    pub strategy: Strategy,
    /// Deadlines and pacing.
    pub timing: Timing,
}

/// Result of one upload: counters plus the failure that ended it, if any.
#[derive(Debug)]
pub struct UploadOutcome {
    /// Whether every phase, completion prompt included, succeeded.
    pub completed: bool,
    /// Payload bytes pushed onto the link.
    pub bytes_sent: u64,
    /// Words deposited through the monitor grammar.
    pub words_deposited: u64,
    /// Wall-clock duration of the session.
    pub elapsed: Duration,
    /// The phase-tagged failure, when the transfer did not complete.
    pub failure: Option<UploadFailure>,
}

impl UploadOutcome {
    /// True when the transfer completed and the monitor returned to prompt.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.completed && self.failure.is_none()
    }
}

/// One in-flight transfer session, exclusively owning the channel.
pub struct Session<C: Channel> {
    link: MonitorLink<C>,
    options: UploadOptions,
    report: TransferReport,
}

impl<C: Channel> Session<C> {
    /// Build a session over `channel`, tracing wire bytes to `trace`.
    pub fn new(channel: C, options: UploadOptions, trace: Box<dyn WireTrace>) -> Self {
        Self {
            link: MonitorLink::new(channel, trace),
            options,
            report: TransferReport::new(),
        }
    }

    /// Validate the contract, then drive the selected strategy to completion.
    ///
    /// Consumes the session, so the channel is released on every exit path.
    /// Protocol failures come back inside the outcome; only contract misuse
    /// is an `Err`.
    pub fn run(
        mut self,
        payload: &[u8],
        progress: &mut dyn Progress,
    ) -> Result<UploadOutcome, ContractViolation> {
        check_contract(&self.options, payload)?;
        info!(
            "uploading {} bytes to {:06o}, {:?} strategy",
            payload.len(),
            self.options.start_address,
            self.options.strategy
        );
        let failure = match self.options.strategy {
            Strategy::Loader => self.run_loader(payload, progress),
            Strategy::Deposit => self.run_deposit(payload, progress),
        };
        match &failure {
            None => info!(
                "upload complete: {} bytes in {:.2?}",
                self.report.bytes_sent(),
                self.report.elapsed()
            ),
            Some(failure) => warn!("upload failed: {failure}"),
        }
        Ok(UploadOutcome {
            completed: failure.is_none(),
            bytes_sent: self.report.bytes_sent(),
            words_deposited: self.report.words_deposited(),
            elapsed: self.report.elapsed(),
            failure,
        })
    }

    fn run_loader(&mut self, payload: &[u8], progress: &mut dyn Progress) -> Option<UploadFailure> {
        if let Err(err) = self.handshake() {
            return Some(UploadFailure::Handshake(err));
        }
        let image = LoaderImage::patched(self.options.start_address, payload.len() as u16);
        if let Err(failure) = self.install_loader(&image) {
            return Some(failure);
        }
        if let Err(err) = self.start_loader(&image) {
            return Some(UploadFailure::LoaderStart(err));
        }
        // Give the injected code time to reach its receive-wait loop.
        thread::sleep(self.options.timing.loader_settle);
        if let Err(failure) = self.stream_payload(payload, progress) {
            return Some(failure);
        }
        self.await_completion()
    }

    fn run_deposit(
        &mut self,
        payload: &[u8],
        progress: &mut dyn Progress,
    ) -> Option<UploadFailure> {
        if let Err(err) = self.handshake() {
            return Some(UploadFailure::Handshake(err));
        }
        if let Err(failure) = self.deposit_words(payload, progress) {
            return Some(failure);
        }
        if let Err(err) = self
            .link
            .send_byte(CARRIAGE_RETURN, self.options.timing.echo_timeout)
        {
            return Some(UploadFailure::DepositExit(err));
        }
        self.await_completion()
    }

    /// Interrupt the monitor into command mode and wait for its prompt.
    fn handshake(&mut self) -> Result<(), LinkError> {
        info!("interrupting the monitor");
        self.link
            .send_byte(CARRIAGE_RETURN, self.options.timing.echo_timeout)?;
        self.link
            .read_until(ATTENTION_PROMPT, self.options.timing.prompt_timeout)?;
        Ok(())
    }

    /// Open `address` for sequential deposit and wait for the ready prompt.
    fn open_deposit(&mut self, digits: &str, address: u16) -> Result<(), UploadFailure> {
        let command = format!("{digits}/");
        self.link
            .send_text(&command, self.options.timing.echo_timeout)
            .map_err(|source| UploadFailure::OpenAddress { address, source })?;
        self.link
            .read_until(DEPOSIT_PROMPT, self.options.timing.prompt_timeout)
            .map_err(|source| UploadFailure::OpenAddress { address, source })?;
        Ok(())
    }

    fn install_loader(&mut self, image: &LoaderImage) -> Result<(), UploadFailure> {
        info!("installing resident loader at {:06o}", image.base_address());
        self.open_deposit(
            &codec::fixed_digits(image.base_address()),
            image.base_address(),
        )?;
        for &(address, word) in image.words() {
            debug!("loader word {word:06o} at {address:06o}");
            self.link
                .send_text(&codec::encode_fixed(word), self.options.timing.echo_timeout)
                .map_err(|source| UploadFailure::LoaderInstall { address, source })?;
            self.link
                .read_until(DEPOSIT_PROMPT, self.options.timing.prompt_timeout)
                .map_err(|source| UploadFailure::LoaderInstall { address, source })?;
        }
        self.link
            .send_byte(CARRIAGE_RETURN, self.options.timing.echo_timeout)
            .map_err(UploadFailure::DepositExit)?;
        self.link
            .read_until(ATTENTION_PROMPT, self.options.timing.prompt_timeout)
            .map_err(UploadFailure::DepositExit)?;
        Ok(())
    }

    fn start_loader(&mut self, image: &LoaderImage) -> Result<(), LinkError> {
        let command = format!("{}g", codec::compact_digits(image.entry_address()));
        info!("starting loader: {command}");
        self.link
            .send_text(&command, self.options.timing.echo_timeout)
    }

    /// Fire-and-forget pump: the loader cannot signal back mid-stream.
    fn stream_payload(
        &mut self,
        payload: &[u8],
        progress: &mut dyn Progress,
    ) -> Result<(), UploadFailure> {
        info!("streaming {} payload bytes", payload.len());
        let total = payload.len() as u64;
        for &byte in payload {
            let sent = self.report.bytes_sent();
            self.link
                .write_raw(byte)
                .map_err(|source| UploadFailure::Stream { sent, source })?;
            thread::sleep(self.options.timing.byte_delay);
            self.report.note_byte();
            progress.advance(self.report.bytes_sent(), total);
        }
        Ok(())
    }

    fn deposit_words(
        &mut self,
        payload: &[u8],
        progress: &mut dyn Progress,
    ) -> Result<(), UploadFailure> {
        let total_words = (payload.len() as u64 + 1) / 2;
        info!(
            "depositing {total_words} words at {:06o}",
            self.options.start_address
        );
        self.open_deposit(
            &codec::compact_digits(self.options.start_address),
            self.options.start_address,
        )?;
        for (index, chunk) in payload.chunks(2).enumerate() {
            // Pair bytes low-first; an odd tail is padded with one zero byte.
            let word = u16::from_le_bytes([chunk[0], chunk.get(1).copied().unwrap_or(0)]);
            debug!("word {index:05}: {word:06o}");
            self.link
                .send_text(&codec::encode_compact(word), self.options.timing.echo_timeout)
                .map_err(|source| UploadFailure::Deposit { index, source })?;
            self.link
                .read_until(DEPOSIT_PROMPT, self.options.timing.prompt_timeout)
                .map_err(|source| UploadFailure::Deposit { index, source })?;
            self.report.note_word(chunk.len() as u64);
            progress.advance(self.report.words_deposited(), total_words);
        }
        Ok(())
    }

    /// Wait for the monitor to return to its prompt. A miss here is reported
    /// in the outcome rather than raised: the payload is already on the wire.
    fn await_completion(&mut self) -> Option<UploadFailure> {
        info!("waiting for the monitor to return to its prompt");
        match self
            .link
            .read_until(ATTENTION_PROMPT, self.options.timing.completion_timeout)
        {
            Ok(_) => None,
            Err(err) => Some(UploadFailure::Completion(err)),
        }
    }
}

fn check_contract(options: &UploadOptions, payload: &[u8]) -> Result<(), ContractViolation> {
    if options.start_address % 2 != 0 {
        return Err(ContractViolation::OddStartAddress {
            address: options.start_address,
        });
    }
    if payload.len() > usize::from(u16::MAX) {
        return Err(ContractViolation::PayloadTooLarge {
            len: payload.len(),
        });
    }
    // The start address is even, so the deposit strategy's padding byte can
    // never push an otherwise-fitting payload past the top of memory.
    if usize::from(options.start_address) + payload.len() > usize::from(u16::MAX) + 1 {
        return Err(ContractViolation::AddressRangeOverflow {
            start: options.start_address,
            len: payload.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(start_address: u16, strategy: Strategy) -> UploadOptions {
        UploadOptions {
            start_address,
            strategy,
            timing: Timing::immediate(),
        }
    }

    #[test]
    fn contract_rejects_odd_start_address() {
        let err = check_contract(&options(0o1001, Strategy::Loader), &[0]).unwrap_err();
        assert!(matches!(
            err,
            ContractViolation::OddStartAddress { address: 0o1001 }
        ));
    }

    #[test]
    fn contract_rejects_oversized_payload() {
        let payload = vec![0u8; usize::from(u16::MAX) + 1];
        let err = check_contract(&options(0, Strategy::Loader), &payload).unwrap_err();
        assert!(matches!(err, ContractViolation::PayloadTooLarge { .. }));
    }

    #[test]
    fn contract_rejects_overflowing_address_range() {
        let err = check_contract(&options(0o177770, Strategy::Loader), &[0; 16]).unwrap_err();
        assert!(matches!(
            err,
            ContractViolation::AddressRangeOverflow { .. }
        ));
    }

    #[test]
    fn contract_accepts_an_exact_fit_to_the_top_of_memory() {
        check_contract(&options(0o177770, Strategy::Deposit), &[0; 8]).unwrap();
        let err = check_contract(&options(0o177770, Strategy::Loader), &[0; 9]).unwrap_err();
        assert!(matches!(
            err,
            ContractViolation::AddressRangeOverflow { .. }
        ));
    }

    #[test]
    fn default_timing_paces_ten_bit_times() {
        let timing = Timing::default();
        let bit_times = timing.byte_delay.as_secs_f64() * f64::from(SYMBOL_RATE);
        assert!((bit_times - 10.0).abs() < 1e-6);
    }
}
