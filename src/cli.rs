// CLASSIFICATION: COMMUNITY
// Filename: cli.rs v0.3
// Author: Lukas Bower
// Date Modified: 2026-03-21

//! Command-line surface for the uploader binary.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use log::{debug, info, LevelFilter};

use crate::report::Progress;
use crate::session::{ContractViolation, Session, Strategy, Timing, UploadOptions};
use crate::trace::LogTrace;
use crate::transport::SerialChannel;
use crate::OdtError;

/// Bound on a single serial read; kept well under the protocol deadlines so
/// `read_until` can enforce them with useful granularity.
const SERIAL_READ_TIMEOUT: Duration = Duration::from_millis(250);

/// CLI wrapper for `odtup`.
#[derive(Parser)]
#[command(
    name = "odtup",
    about = "Upload a binary image through an ODT-style serial monitor",
    version = "0.1"
)]
pub struct Cli {
    /// Serial device, e.g. /dev/ttyUSB0
    pub port: String,
    /// Binary image to upload
    pub filename: PathBuf,
    /// Destination start address, octal
    #[arg(value_parser = parse_octal_address)]
    pub start_address: u16,
    /// Transfer strategy
    #[arg(long, value_enum, default_value_t = StrategyArg::Loader)]
    pub strategy: StrategyArg,
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Transfer strategy as exposed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    /// Inject the resident loader, then stream raw bytes to it
    Loader,
    /// Deposit every word through the monitor's own loop
    Deposit,
}

impl From<StrategyArg> for Strategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Loader => Strategy::Loader,
            StrategyArg::Deposit => Strategy::Deposit,
        }
    }
}

fn parse_octal_address(text: &str) -> Result<u16, String> {
    u16::from_str_radix(text, 8).map_err(|_| {
        ContractViolation::BadStartAddress {
            text: text.to_owned(),
        }
        .to_string()
    })
}

/// Progress sink logging coarse milestones; bar rendering stays external.
#[derive(Debug, Default)]
struct LogProgress;

impl Progress for LogProgress {
    fn advance(&mut self, sent: u64, total: u64) {
        if sent == total || sent % 4096 == 0 {
            debug!("progress: {sent}/{total}");
        }
    }
}

/// Parse the command line, set up logging, and run one upload.
pub fn run() -> Result<(), OdtError> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
    execute(cli)
}

/// Execute the upload described by `cli`.
pub fn execute(cli: Cli) -> Result<(), OdtError> {
    let payload = fs::read(&cli.filename).map_err(|source| ContractViolation::UnreadableSource {
        path: cli.filename.clone(),
        source,
    })?;
    info!("file size: {} bytes", payload.len());
    let channel = SerialChannel::open(&cli.port, SERIAL_READ_TIMEOUT)?;
    let options = UploadOptions {
        start_address: cli.start_address,
        strategy: cli.strategy.into(),
        timing: Timing::default(),
    };
    let session = Session::new(channel, options, Box::new(LogTrace));
    let outcome = session.run(&payload, &mut LogProgress)?;
    match outcome.failure {
        None => Ok(()),
        Some(failure) => Err(Box::new(failure)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_positional_arguments() {
        let cli = Cli::parse_from(["odtup", "/dev/ttyUSB0", "image.bin", "1000"]);
        assert_eq!(cli.port, "/dev/ttyUSB0");
        assert_eq!(cli.filename, PathBuf::from("image.bin"));
        assert_eq!(cli.start_address, 0o1000);
        assert_eq!(cli.strategy, StrategyArg::Loader);
        assert!(!cli.verbose);
    }

    #[test]
    fn parse_strategy_and_verbose_flags() {
        let cli = Cli::parse_from([
            "odtup",
            "-v",
            "--strategy",
            "deposit",
            "/dev/ttyS1",
            "boot.bin",
            "400",
        ]);
        assert_eq!(cli.strategy, StrategyArg::Deposit);
        assert_eq!(cli.start_address, 0o400);
        assert!(cli.verbose);
    }

    #[test]
    fn reject_non_octal_address() {
        assert!(Cli::try_parse_from(["odtup", "p", "f", "1009"]).is_err());
        assert!(Cli::try_parse_from(["odtup", "p", "f", "0x100"]).is_err());
    }

    #[test]
    fn unreadable_source_is_a_contract_violation() {
        let cli = Cli::parse_from(["odtup", "p", "/no/such/file.bin", "1000"]);
        let err = execute(cli).unwrap_err();
        assert!(err.to_string().contains("source file"));
    }
}
