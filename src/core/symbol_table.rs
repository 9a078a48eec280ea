// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Scoped symbol table with forward-reference support.
//!
//! Symbols are bound only during the sizing pass. A lookup during sizing that
//! finds nothing is recorded as a pending reference and yields a placeholder;
//! [`SymbolTable::resolve_pending`] checks every pending reference once the
//! sizing pass is over. During emission every lookup must succeed, and every
//! definition must land on the address it was given while sizing.

use tracing::trace;

use crate::core::assembler::error::{AsmError, AsmErrorKind};
use crate::core::assembler::scope::{ScopeId, ScopeStack};
use crate::core::chain::PassMode;

/// Placeholder value returned for a forward reference during sizing.
pub const FORWARD_PLACEHOLDER: u32 = 0;

#[derive(Debug, Clone)]
struct PendingReference {
    name: String,
    scope: ScopeId,
}

pub struct SymbolTable {
    scopes: ScopeStack,
    pending: Vec<PendingReference>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: ScopeStack::new(),
            pending: Vec::new(),
        }
    }

    pub fn scopes(&self) -> &ScopeStack {
        &self.scopes
    }

    pub fn current_scope(&self) -> ScopeId {
        self.scopes.current()
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.depth()
    }

    /// Rewind the lookup scope to global for a new pass.
    pub fn reset_for_pass(&mut self) {
        self.scopes.clear();
        self.pending.clear();
    }

    /// Bind `name` in the current scope.
    ///
    /// `cursor` is used when no explicit address is given. During emission
    /// nothing is bound; the address must match the one fixed during sizing.
    pub fn define(
        &mut self,
        mode: PassMode,
        name: &str,
        address: Option<u64>,
        cursor: u64,
    ) -> Result<(), AsmError> {
        let scope = self.scopes.current();
        let address = address.unwrap_or(cursor);
        if mode == PassMode::Emission {
            return self.verify_sized(scope, name, address);
        }
        if self.scopes.contains_local(scope, name) {
            return Err(AsmError::new(
                AsmErrorKind::DuplicateSymbol,
                "Label name already used in this scope",
                Some(name),
            ));
        }
        let address = u32::try_from(address).map_err(|_| {
            AsmError::new(
                AsmErrorKind::InvalidAddress,
                "Label address should be 32 bits long",
                Some(&format!("{name} = ${address:X}")),
            )
        })?;
        trace!(name, address, scope = scope.index(), "label defined");
        self.scopes.insert_local(scope, name, address);
        Ok(())
    }

    fn verify_sized(&self, scope: ScopeId, name: &str, address: u64) -> Result<(), AsmError> {
        match self.scopes.local(scope, name) {
            Some(sized) if u64::from(sized) == address => Ok(()),
            Some(sized) => Err(AsmError::new(
                AsmErrorKind::PhaseMismatch,
                "Label address changed between passes",
                Some(&format!("{name}: ${sized:X} when sized, ${address:X} when emitted")),
            )),
            None => Err(AsmError::new(
                AsmErrorKind::PhaseMismatch,
                "Label was not defined during sizing",
                Some(name),
            )),
        }
    }

    /// Look `name` up from the current scope towards the root.
    pub fn resolve(&mut self, mode: PassMode, name: &str) -> Result<u32, AsmError> {
        let scope = self.scopes.current();
        if let Some(address) = self.scopes.lookup_from(scope, name) {
            return Ok(address);
        }
        match mode {
            PassMode::Sizing => {
                trace!(name, scope = scope.index(), "forward reference recorded");
                self.pending.push(PendingReference {
                    name: name.to_string(),
                    scope,
                });
                Ok(FORWARD_PLACEHOLDER)
            }
            PassMode::Emission => Err(undefined(name)),
        }
    }

    /// Look `name` up without recording anything.
    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.scopes.lookup_from(self.scopes.current(), name)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Check every forward reference against the final table.
    pub fn resolve_pending(&mut self) -> Result<(), AsmError> {
        let pending = std::mem::take(&mut self.pending);
        for reference in &pending {
            if self
                .scopes
                .lookup_from(reference.scope, &reference.name)
                .is_none()
            {
                return Err(undefined(&reference.name));
            }
        }
        Ok(())
    }

    /// Allocate a child scope of `parent`.
    pub fn new_child_scope(&mut self, parent: ScopeId) -> ScopeId {
        self.scopes.new_child(parent)
    }

    pub fn push_scope(&mut self, scope: ScopeId) {
        self.scopes.push(scope);
    }

    pub fn pop_scope(&mut self) -> Result<(), AsmError> {
        if self.scopes.pop() {
            Ok(())
        } else {
            Err(AsmError::new(
                AsmErrorKind::UnbalancedScope,
                "Scope pop without matching push",
                None,
            ))
        }
    }

    /// Global labels sorted by name.
    pub fn global_labels(&self) -> Vec<(String, u32)> {
        self.scopes
            .locals(ScopeId::GLOBAL)
            .into_iter()
            .map(|(name, address)| (name.to_string(), address))
            .collect()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

fn undefined(name: &str) -> AsmError {
    AsmError::new(
        AsmErrorKind::UndefinedSymbol,
        "Trying to use an undefined label",
        Some(name),
    )
}
