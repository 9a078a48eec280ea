// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! The builder: one chain, symbol table, macro tracker, area guard and pop
//! resolver, exposed through a fixed set of build operations.
//!
//! Every operation behaves the same in both passes except where the current
//! [`PassMode`] says otherwise: label definitions and area checks only take
//! effect in one of the two passes.

use std::fs;
use std::path::Path;
use std::rc::Rc;

use tracing::trace;

use crate::core::area::AreaGuard;
use crate::core::assembler::error::{AsmError, AsmErrorKind};
use crate::core::chain::{Chain, PassMode, MAX_CHAIN_LENGTH};
use crate::core::macro_tracker::MacroTracker;
use crate::core::pop_resolver::{PopResolver, RegisterSet, RegisterValues};
use crate::core::symbol_table::SymbolTable;
use crate::core::text_encoding::TextEncodingRegistry;
use crate::core::value::{align_padding, encode_le, fill_pattern};

/// Body of a pop macro. Receives only the values for its own registers.
pub type PopBody = Rc<dyn Fn(&mut Builder, &RegisterValues) -> Result<(), AsmError>>;

/// Lifecycle of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Fresh,
    Sized,
    Built,
    /// A pass failed; the builder must be discarded.
    Failed,
}

pub struct Builder {
    pub(super) chain: Chain,
    pub(super) symbols: SymbolTable,
    pub(super) macros: MacroTracker,
    pub(super) areas: AreaGuard,
    pub(super) pops: PopResolver<PopBody>,
    pub(super) encodings: TextEncodingRegistry,
    pub(super) state: BuildState,
    /// Cursor at the end of the sizing pass.
    pub(super) sized_length: u64,
}

impl Builder {
    pub fn new() -> Self {
        Self {
            chain: Chain::new(),
            symbols: SymbolTable::new(),
            macros: MacroTracker::new(),
            areas: AreaGuard::new(),
            pops: PopResolver::new(),
            encodings: TextEncodingRegistry::new(),
            state: BuildState::Fresh,
            sized_length: 0,
        }
    }

    pub fn mode(&self) -> PassMode {
        self.chain.mode()
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn cursor(&self) -> u64 {
        self.chain.cursor()
    }

    /// Physical length of the emitted bytes.
    pub fn length(&self) -> usize {
        self.chain.length()
    }

    pub fn macro_instance_count(&self, name: &str) -> usize {
        self.macros.instance_count(name)
    }

    /// Number of forward references recorded so far in this pass.
    pub fn pending_references(&self) -> usize {
        self.symbols.pending_count()
    }

    /// Append bytes, returning the cursor before the append.
    pub fn append_raw(&mut self, payload: &[u8]) -> Result<u64, AsmError> {
        self.check_room(payload.len() as u64)?;
        let start = self.chain.append(payload);
        self.check_areas()?;
        Ok(start)
    }

    fn append_zeros(&mut self, count: u64) -> Result<u64, AsmError> {
        self.check_room(count)?;
        let start = self.chain.append_zeros(count);
        self.check_areas()?;
        Ok(start)
    }

    fn check_room(&self, count: u64) -> Result<(), AsmError> {
        let cursor = self.cursor();
        match cursor.checked_add(count) {
            Some(end) if end <= MAX_CHAIN_LENGTH => Ok(()),
            _ => Err(AsmError::new(
                AsmErrorKind::ChainTooLong,
                "Chain would exceed the maximum length",
                Some(&format!("${cursor:X} + ${count:X} > ${MAX_CHAIN_LENGTH:X}")),
            )),
        }
    }

    fn check_areas(&self) -> Result<(), AsmError> {
        if self.mode() == PassMode::Emission {
            self.areas.check(self.chain.length())?;
        }
        Ok(())
    }

    /// Append `value` as a `width`-byte little-endian word.
    pub fn add_value(&mut self, value: u64, width: usize) -> Result<u64, AsmError> {
        let bytes = encode_le(value, width)?;
        self.append_raw(&bytes)
    }

    pub fn add_byte(&mut self, value: u64) -> Result<u64, AsmError> {
        self.add_value(value, 1)
    }

    pub fn add_halfword(&mut self, value: u64) -> Result<u64, AsmError> {
        self.add_value(value, 2)
    }

    pub fn add_word(&mut self, value: u64) -> Result<u64, AsmError> {
        self.add_value(value, 4)
    }

    /// Append `text` in the named encoding.
    pub fn add_string(&mut self, text: &str, encoding: &str) -> Result<u64, AsmError> {
        let id = self.encodings.resolve_name_or_error(encoding)?;
        let bytes = self.encodings.encode_str(id, text)?;
        self.append_raw(&bytes)
    }

    /// Append the contents of a file verbatim.
    pub fn include_binary(&mut self, path: &Path) -> Result<u64, AsmError> {
        let bytes = fs::read(path).map_err(|err| {
            AsmError::new(
                AsmErrorKind::Io,
                &format!("Error reading binary file: {err}"),
                Some(&path.display().to_string()),
            )
        })?;
        self.append_raw(&bytes)
    }

    /// Pad with zero bytes up to `address`.
    pub fn set_origin(&mut self, address: u32) -> Result<(), AsmError> {
        let cursor = self.cursor();
        if u64::from(address) < cursor {
            // Let the chain produce the error so both paths report alike.
            self.chain.set_cursor(u64::from(address))?;
        }
        self.append_zeros(u64::from(address) - cursor)?;
        Ok(())
    }

    /// Pad with zero bytes up to the next multiple of `multiple`.
    pub fn align(&mut self, multiple: u64) -> Result<(), AsmError> {
        let pad = align_padding(self.cursor(), multiple)?;
        self.append_zeros(pad)?;
        Ok(())
    }

    /// Append `size` bytes of repeated little-endian `value`.
    pub fn fill(&mut self, size: u64, value: u64, width: usize) -> Result<(), AsmError> {
        self.check_room(size)?;
        if self.mode() == PassMode::Sizing {
            encode_le(value, width)?;
            self.append_zeros(size)?;
            return Ok(());
        }
        let size = usize::try_from(size).map_err(|_| {
            AsmError::new(AsmErrorKind::ValueOverflow, "Fill size too large", None)
        })?;
        let bytes = fill_pattern(size, value, width)?;
        self.append_raw(&bytes)?;
        Ok(())
    }

    /// Bind a label in the current scope, at the cursor unless `address` is given.
    pub fn define_label(&mut self, name: &str, address: Option<u64>) -> Result<(), AsmError> {
        let mode = self.mode();
        let cursor = self.cursor();
        self.symbols.define(mode, name, address, cursor)
    }

    /// Resolve a label. During sizing an unknown label is a forward reference.
    pub fn get_label(&mut self, name: &str) -> Result<u32, AsmError> {
        let mode = self.mode();
        self.symbols.resolve(mode, name)
    }

    pub fn begin_area(&mut self, budget: u64) {
        let mode = self.mode();
        self.areas.begin(mode, self.chain.length(), budget);
    }

    pub fn end_area(&mut self) -> Result<(), AsmError> {
        let mode = self.mode();
        self.areas.end(mode)
    }

    /// Run `body` inside an area; the area is closed on every exit path.
    pub fn with_area<T>(
        &mut self,
        budget: u64,
        body: impl FnOnce(&mut Builder) -> Result<T, AsmError>,
    ) -> Result<T, AsmError> {
        self.begin_area(budget);
        let result = body(self);
        let closed = self.end_area();
        let value = result?;
        closed?;
        Ok(value)
    }

    pub fn register_macro(&mut self, name: &str) {
        self.macros.register(name);
    }

    pub fn enter_macro(&mut self, name: &str) -> Result<(), AsmError> {
        let mode = self.mode();
        self.macros.enter(mode, name, &mut self.symbols)?;
        Ok(())
    }

    pub fn exit_macro(&mut self, name: &str) -> Result<(), AsmError> {
        self.macros.exit(name, &mut self.symbols)
    }

    /// Run `body` as one call of macro `name` in its own instance scope.
    /// The caller's scope is restored on every exit path.
    pub fn with_macro<T>(
        &mut self,
        name: &str,
        body: impl FnOnce(&mut Builder) -> Result<T, AsmError>,
    ) -> Result<T, AsmError> {
        self.enter_macro(name)?;
        let result = body(self);
        let exited = self.exit_macro(name);
        let value = result?;
        exited?;
        Ok(value)
    }

    pub fn register_pop_macro<S: AsRef<str>>(
        &mut self,
        name: &str,
        registers: &[S],
        body: PopBody,
    ) -> Result<RegisterSet, AsmError> {
        self.pops.register(name, body, registers)
    }

    /// Load the given registers through a selection of pop macros.
    pub fn pop<S: AsRef<str>>(&mut self, assignments: &[(S, u64)]) -> Result<(), AsmError> {
        let steps = self.pops.resolve(assignments)?;
        for step in steps {
            trace!(name = step.name.as_str(), values = step.values.len(), "pop step");
            (step.body)(self, &step.values)?;
        }
        Ok(())
    }

    /// Final chain bytes after a successful build.
    pub fn to_bytes(&self) -> Result<&[u8], AsmError> {
        self.chain.to_bytes()
    }

    /// Resolved global labels, sorted by name.
    pub fn labels(&self) -> Vec<(String, u32)> {
        self.symbols.global_labels()
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}
