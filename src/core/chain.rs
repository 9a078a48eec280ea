// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Chain buffer with a virtual cursor.
//!
//! The cursor always advances by the payload length. Bytes are only stored
//! while the buffer is in [`PassMode::Emission`], so after a sizing pass the
//! cursor holds the final length while the physical buffer is still empty.

use crate::core::assembler::error::{AsmError, AsmErrorKind};

/// Largest chain the builder accepts, in bytes. Padding past this is refused
/// before anything is allocated.
pub const MAX_CHAIN_LENGTH: u64 = 1 << 28;

/// Which of the two passes is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassMode {
    /// Addresses and lengths are computed, no bytes are kept.
    Sizing,
    /// Bytes are written and addresses fixed during sizing are consumed.
    Emission,
}

impl PassMode {
    pub fn name(self) -> &'static str {
        match self {
            PassMode::Sizing => "sizing",
            PassMode::Emission => "emission",
        }
    }
}

/// Append-only byte sequence plus a monotonic cursor.
#[derive(Debug)]
pub struct Chain {
    stored: Vec<u8>,
    cursor: u64,
    mode: PassMode,
    complete: bool,
}

impl Chain {
    pub fn new() -> Self {
        Self {
            stored: Vec::new(),
            cursor: 0,
            mode: PassMode::Sizing,
            complete: false,
        }
    }

    pub fn mode(&self) -> PassMode {
        self.mode
    }

    /// Switch modes and rewind for a fresh pass. Stored bytes from an earlier
    /// pass are dropped.
    pub fn begin_pass(&mut self, mode: PassMode) {
        self.mode = mode;
        self.cursor = 0;
        self.stored.clear();
        self.complete = false;
    }

    /// Mark the emission pass as finished; the content is final from here on.
    pub fn finish_emission(&mut self) {
        if self.mode == PassMode::Emission {
            self.complete = true;
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Append a payload, returning the cursor value before the append.
    pub fn append(&mut self, payload: &[u8]) -> u64 {
        let start = self.cursor;
        if self.mode == PassMode::Emission {
            self.stored.extend_from_slice(payload);
        }
        self.cursor += payload.len() as u64;
        start
    }

    /// Append `count` zero bytes, returning the cursor value before the append.
    pub fn append_zeros(&mut self, count: u64) -> u64 {
        let start = self.cursor;
        if self.mode == PassMode::Emission {
            self.stored
                .resize(self.stored.len() + count as usize, 0);
        }
        self.cursor += count;
        start
    }

    /// Physical length of the stored bytes.
    pub fn length(&self) -> usize {
        self.stored.len()
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Move the cursor forward to `addr`, padding with zero bytes.
    ///
    /// Returns the number of padding bytes appended.
    pub fn set_cursor(&mut self, addr: u64) -> Result<u64, AsmError> {
        if addr < self.cursor {
            return Err(AsmError::new(
                AsmErrorKind::BackwardOrigin,
                "Trying to set origin backwards",
                Some(&format!("${addr:X} < ${:X}", self.cursor)),
            ));
        }
        let pad = addr - self.cursor;
        self.append_zeros(pad);
        Ok(pad)
    }

    /// Final byte content, only available once an emission pass completed.
    pub fn to_bytes(&self) -> Result<&[u8], AsmError> {
        if !self.complete {
            return Err(AsmError::new(
                AsmErrorKind::NotBuilt,
                "Chain content is incomplete until an emission pass has finished",
                None,
            ));
        }
        Ok(&self.stored)
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sizing_mode_advances_cursor_only() {
        let mut chain = Chain::new();
        assert_eq!(chain.append(&[1, 2, 3]), 0);
        assert_eq!(chain.append(&[4]), 3);
        assert_eq!(chain.cursor(), 4);
        assert_eq!(chain.length(), 0);
    }

    #[test]
    fn emission_mode_keeps_cursor_and_length_in_step() {
        let mut chain = Chain::new();
        chain.begin_pass(PassMode::Emission);
        chain.append(&[0xaa, 0xbb]);
        chain.append_zeros(2);
        assert_eq!(chain.cursor(), 4);
        assert_eq!(chain.length(), 4);
        chain.finish_emission();
        assert_eq!(chain.to_bytes().unwrap(), &[0xaa, 0xbb, 0, 0]);
    }

    #[test]
    fn set_cursor_pads_with_zeros() {
        let mut chain = Chain::new();
        chain.begin_pass(PassMode::Emission);
        chain.append(&[1]);
        assert_eq!(chain.set_cursor(4).unwrap(), 3);
        assert_eq!(chain.set_cursor(4).unwrap(), 0);
        chain.finish_emission();
        assert_eq!(chain.to_bytes().unwrap(), &[1, 0, 0, 0]);
    }

    #[test]
    fn set_cursor_backwards_fails() {
        let mut chain = Chain::new();
        chain.append(&[0; 8]);
        let err = chain.set_cursor(7).unwrap_err();
        assert_eq!(err.kind(), AsmErrorKind::BackwardOrigin);
        assert_eq!(chain.cursor(), 8);
    }

    #[test]
    fn to_bytes_before_emission_fails() {
        let mut chain = Chain::new();
        chain.append(&[1]);
        chain.finish_emission();
        assert_eq!(chain.to_bytes().unwrap_err().kind(), AsmErrorKind::NotBuilt);
    }

    proptest! {
        #[test]
        fn cursor_advances_by_payload_length_in_both_modes(
            sizes in proptest::collection::vec(0usize..64, 0..32)
        ) {
            let mut sizing = Chain::new();
            let mut emission = Chain::new();
            emission.begin_pass(PassMode::Emission);
            let mut expected = 0u64;
            for size in sizes {
                let payload = vec![0x5a; size];
                prop_assert_eq!(sizing.append(&payload), expected);
                prop_assert_eq!(emission.append(&payload), expected);
                expected += size as u64;
                prop_assert_eq!(sizing.cursor(), expected);
                prop_assert_eq!(sizing.length(), 0);
                prop_assert_eq!(emission.length() as u64, emission.cursor());
            }
        }
    }
}
