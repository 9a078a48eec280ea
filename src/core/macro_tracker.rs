// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Macro instance tracking across the two passes.
//!
//! Every macro call during sizing gets a fresh child scope of the caller's
//! scope. The emission pass replays those scopes in call order, so call J of
//! a macro binds to the same labels in both passes.

use std::collections::HashMap;

use tracing::trace;

use crate::core::assembler::error::{AsmError, AsmErrorKind};
use crate::core::assembler::scope::ScopeId;
use crate::core::chain::PassMode;
use crate::core::symbol_table::SymbolTable;

#[derive(Debug, Default)]
struct MacroState {
    instances: Vec<ScopeId>,
    replayed: usize,
}

#[derive(Debug, Default)]
pub struct MacroTracker {
    macros: HashMap<String, MacroState>,
}

impl MacroTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent; the first call allocates an empty instance list.
    pub fn register(&mut self, name: &str) {
        self.macros.entry(name.to_string()).or_default();
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn instance_count(&self, name: &str) -> usize {
        self.macros
            .get(name)
            .map(|state| state.instances.len())
            .unwrap_or(0)
    }

    pub fn instances(&self, name: &str) -> &[ScopeId] {
        self.macros
            .get(name)
            .map(|state| state.instances.as_slice())
            .unwrap_or(&[])
    }

    /// Rewind every replay counter for the next pass.
    pub fn reset_replay(&mut self) {
        for state in self.macros.values_mut() {
            state.replayed = 0;
        }
    }

    /// Enter one call of `name` and make its instance scope current.
    pub fn enter(
        &mut self,
        mode: PassMode,
        name: &str,
        symbols: &mut SymbolTable,
    ) -> Result<ScopeId, AsmError> {
        let state = self.macros.entry(name.to_string()).or_default();
        let (scope, call) = match mode {
            PassMode::Sizing => {
                let scope = symbols.new_child_scope(symbols.current_scope());
                state.instances.push(scope);
                (scope, state.instances.len())
            }
            PassMode::Emission => {
                let Some(scope) = state.instances.get(state.replayed).copied() else {
                    return Err(AsmError::new(
                        AsmErrorKind::MacroReplayMismatch,
                        "Macro called more often during emission than during sizing",
                        Some(&format!("{name} (call {})", state.replayed + 1)),
                    ));
                };
                if symbols.scopes().parent(scope) != Some(symbols.current_scope()) {
                    return Err(AsmError::new(
                        AsmErrorKind::MacroReplayMismatch,
                        "Macro called from a different scope than during sizing",
                        Some(&format!("{name} (call {})", state.replayed + 1)),
                    ));
                }
                state.replayed += 1;
                (scope, state.replayed)
            }
        };
        trace!(name, call, mode = mode.name(), "macro enter");
        symbols.push_scope(scope);
        Ok(scope)
    }

    /// Leave the current call and restore the caller's scope.
    pub fn exit(&mut self, name: &str, symbols: &mut SymbolTable) -> Result<(), AsmError> {
        trace!(name, "macro exit");
        symbols.pop_scope()
    }

    /// After emission, every recorded instance must have been replayed.
    pub fn verify_replayed(&self) -> Result<(), AsmError> {
        let mut names: Vec<&String> = self.macros.keys().collect();
        names.sort();
        for name in names {
            let state = &self.macros[name];
            if state.replayed != state.instances.len() {
                return Err(AsmError::new(
                    AsmErrorKind::MacroReplayMismatch,
                    "Macro called a different number of times in the two passes",
                    Some(&format!(
                        "{name} ({} during sizing, {} during emission)",
                        state.instances.len(),
                        state.replayed
                    )),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent() {
        let mut tracker = MacroTracker::new();
        tracker.register("gadget");
        tracker.register("gadget");
        assert!(tracker.is_registered("gadget"));
        assert_eq!(tracker.instance_count("gadget"), 0);
    }

    #[test]
    fn sizing_creates_one_instance_per_call() {
        let mut tracker = MacroTracker::new();
        let mut symbols = SymbolTable::new();
        for _ in 0..3 {
            let scope = tracker.enter(PassMode::Sizing, "m", &mut symbols).unwrap();
            assert_eq!(symbols.current_scope(), scope);
            tracker.exit("m", &mut symbols).unwrap();
        }
        assert_eq!(tracker.instance_count("m"), 3);
        assert_eq!(symbols.current_scope(), ScopeId::GLOBAL);
    }

    #[test]
    fn emission_replays_instances_in_order() {
        let mut tracker = MacroTracker::new();
        let mut symbols = SymbolTable::new();
        let mut sized = Vec::new();
        for _ in 0..3 {
            sized.push(tracker.enter(PassMode::Sizing, "m", &mut symbols).unwrap());
            tracker.exit("m", &mut symbols).unwrap();
        }
        tracker.reset_replay();
        for expected in &sized {
            let scope = tracker
                .enter(PassMode::Emission, "m", &mut symbols)
                .unwrap();
            assert_eq!(scope, *expected);
            tracker.exit("m", &mut symbols).unwrap();
        }
        tracker.verify_replayed().unwrap();
    }

    #[test]
    fn extra_emission_call_is_fatal() {
        let mut tracker = MacroTracker::new();
        let mut symbols = SymbolTable::new();
        tracker.enter(PassMode::Sizing, "m", &mut symbols).unwrap();
        tracker.exit("m", &mut symbols).unwrap();
        tracker.reset_replay();
        tracker.enter(PassMode::Emission, "m", &mut symbols).unwrap();
        tracker.exit("m", &mut symbols).unwrap();
        let err = tracker
            .enter(PassMode::Emission, "m", &mut symbols)
            .unwrap_err();
        assert_eq!(err.kind(), AsmErrorKind::MacroReplayMismatch);
    }

    #[test]
    fn missing_emission_call_is_detected() {
        let mut tracker = MacroTracker::new();
        let mut symbols = SymbolTable::new();
        for _ in 0..2 {
            tracker.enter(PassMode::Sizing, "m", &mut symbols).unwrap();
            tracker.exit("m", &mut symbols).unwrap();
        }
        tracker.reset_replay();
        tracker.enter(PassMode::Emission, "m", &mut symbols).unwrap();
        tracker.exit("m", &mut symbols).unwrap();
        let err = tracker.verify_replayed().unwrap_err();
        assert_eq!(err.kind(), AsmErrorKind::MacroReplayMismatch);
    }

    #[test]
    fn nested_instances_are_children_of_the_caller_instance() {
        let mut tracker = MacroTracker::new();
        let mut symbols = SymbolTable::new();
        let outer = tracker.enter(PassMode::Sizing, "outer", &mut symbols).unwrap();
        let inner = tracker.enter(PassMode::Sizing, "inner", &mut symbols).unwrap();
        assert_eq!(symbols.scopes().parent(inner), Some(outer));
        tracker.exit("inner", &mut symbols).unwrap();
        tracker.exit("outer", &mut symbols).unwrap();
        assert_eq!(symbols.scope_depth(), 0);
    }
}
