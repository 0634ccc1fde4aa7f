// CLASSIFICATION: COMMUNITY
// Filename: loader.rs v0.2
// Author: Lukas Bower
// Date Modified: 2026-03-17

//! Resident loader image injected through the monitor's deposit grammar.
//!
//! Twelve instruction words form a relay loop that polls the console
//! receiver and copies each incoming byte to the destination buffer, halting
//! back into the monitor when the transfer length is exhausted. Two slots are
//! patched per run: the destination start address and the transfer length in
//! bytes. The table is never mutated once injection begins.

/// Address the loader image is deposited at and started from.
pub const LOADER_BASE: u16 = 0o100;

const START_ADDRESS_SLOT: u16 = 0o102;
const LENGTH_SLOT: u16 = 0o106;

/// Fixed relay routine, as (octal address, instruction word) pairs.
const LOADER_WORDS: [(u16, u16); 12] = [
    (0o100, 0o012700), // MOV #start, R0
    (0o102, 0o001000), // destination start address, patched per run
    (0o104, 0o012701), // MOV #length, R1
    (0o106, 0o000000), // transfer length in bytes, patched per run
    (0o110, 0o032737), // BIT #200, @#RCSR
    (0o112, 0o000200),
    (0o114, 0o177560), // console receiver status register
    (0o116, 0o001774), // BEQ 110
    (0o120, 0o113720), // MOVB @#RBUF, (R0)+
    (0o122, 0o177562), // console receiver buffer
    (0o124, 0o077107), // SOB R1, 110
    (0o126, 0o000000), // HALT
];

/// Loader image with the run-specific slots filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderImage {
    words: [(u16, u16); 12],
}

impl LoaderImage {
    /// Build an image relaying `length` bytes into memory at `start_address`.
    #[must_use]
    pub fn patched(start_address: u16, length: u16) -> Self {
        let mut words = LOADER_WORDS;
        for (address, word) in &mut words {
            if *address == START_ADDRESS_SLOT {
                *word = start_address;
            } else if *address == LENGTH_SLOT {
                *word = length;
            }
        }
        Self { words }
    }

    /// The patched (address, word) pairs in deposit order.
    #[must_use]
    pub fn words(&self) -> &[(u16, u16)] {
        &self.words
    }

    /// Address of the first word, where sequential deposit begins.
    #[must_use]
    pub fn base_address(&self) -> u16 {
        self.words[0].0
    }

    /// Entry address passed to the monitor's go command.
    #[must_use]
    pub fn entry_address(&self) -> u16 {
        LOADER_BASE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patching_fills_both_dynamic_slots() {
        let image = LoaderImage::patched(0o1000, 0o2000);
        let lookup = |address: u16| {
            image
                .words()
                .iter()
                .find(|(a, _)| *a == address)
                .map(|(_, w)| *w)
                .unwrap()
        };
        assert_eq!(lookup(0o102), 0o1000);
        assert_eq!(lookup(0o106), 0o2000);
    }

    #[test]
    fn patching_leaves_the_routine_intact() {
        let image = LoaderImage::patched(0o40000, 4);
        assert_eq!(image.words().len(), 12);
        assert_eq!(image.words()[0], (0o100, 0o012700));
        assert_eq!(image.words()[11], (0o126, 0o000000));
        assert_eq!(image.base_address(), 0o100);
        assert_eq!(image.entry_address(), 0o100);
    }

    #[test]
    fn addresses_ascend_by_word() {
        let image = LoaderImage::patched(0o1000, 2);
        for pair in image.words().windows(2) {
            assert_eq!(pair[1].0, pair[0].0 + 2);
        }
    }
}
