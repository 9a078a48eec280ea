// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Scope management for symbol namespacing.
//!
//! Scopes live in an arena and are addressed by [`ScopeId`]; each scope links
//! to exactly one parent except the global scope. Macro instances keep their
//! scope ids across passes, so scopes are never freed during a build.

use std::collections::HashMap;

/// Index of a scope in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

impl ScopeId {
    pub const GLOBAL: ScopeId = ScopeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
struct Scope {
    parent: Option<ScopeId>,
    locals: HashMap<String, u32>,
}

/// Arena of scopes plus the stack of previously-current scopes.
#[derive(Debug)]
pub struct ScopeStack {
    scopes: Vec<Scope>,
    current: ScopeId,
    saved: Vec<ScopeId>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                parent: None,
                locals: HashMap::new(),
            }],
            current: ScopeId::GLOBAL,
            saved: Vec::new(),
        }
    }

    /// Make the global scope current again and forget saved scopes.
    /// Scope contents are kept.
    pub fn clear(&mut self) {
        self.current = ScopeId::GLOBAL;
        self.saved.clear();
    }

    pub fn depth(&self) -> usize {
        self.saved.len()
    }

    pub fn current(&self) -> ScopeId {
        self.current
    }

    /// Allocate an empty scope whose parent is `parent`.
    pub fn new_child(&mut self, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            parent: Some(parent),
            locals: HashMap::new(),
        });
        id
    }

    /// Save the current scope and make `scope` current.
    pub fn push(&mut self, scope: ScopeId) {
        self.saved.push(self.current);
        self.current = scope;
    }

    /// Restore the previously-current scope.
    pub fn pop(&mut self) -> bool {
        let Some(previous) = self.saved.pop() else {
            return false;
        };
        self.current = previous;
        true
    }

    /// Binding of `name` in `scope` itself, ignoring parents.
    pub fn local(&self, scope: ScopeId, name: &str) -> Option<u32> {
        self.scopes[scope.0].locals.get(name).copied()
    }

    pub fn contains_local(&self, scope: ScopeId, name: &str) -> bool {
        self.scopes[scope.0].locals.contains_key(name)
    }

    pub fn insert_local(&mut self, scope: ScopeId, name: &str, address: u32) {
        self.scopes[scope.0]
            .locals
            .insert(name.to_string(), address);
    }

    /// Walk from `scope` to the root and return the nearest binding.
    pub fn lookup_from(&self, scope: ScopeId, name: &str) -> Option<u32> {
        let mut cursor = Some(scope);
        while let Some(id) = cursor {
            let node = &self.scopes[id.0];
            if let Some(address) = node.locals.get(name) {
                return Some(*address);
            }
            cursor = node.parent;
        }
        None
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.0].parent
    }

    /// Local bindings of one scope, sorted by name.
    pub fn locals(&self, scope: ScopeId) -> Vec<(&str, u32)> {
        let mut out: Vec<(&str, u32)> = self.scopes[scope.0]
            .locals
            .iter()
            .map(|(name, address)| (name.as_str(), *address))
            .collect();
        out.sort_unstable();
        out
    }
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_to_nearest_binding() {
        let mut scopes = ScopeStack::new();
        scopes.insert_local(ScopeId::GLOBAL, "a", 1);
        scopes.insert_local(ScopeId::GLOBAL, "b", 2);
        let child = scopes.new_child(ScopeId::GLOBAL);
        scopes.insert_local(child, "a", 10);

        assert_eq!(scopes.lookup_from(child, "a"), Some(10));
        assert_eq!(scopes.lookup_from(child, "b"), Some(2));
        assert_eq!(scopes.lookup_from(ScopeId::GLOBAL, "a"), Some(1));
        assert_eq!(scopes.lookup_from(child, "c"), None);
    }

    #[test]
    fn push_and_pop_restore_previous_scope() {
        let mut scopes = ScopeStack::new();
        let outer = scopes.new_child(ScopeId::GLOBAL);
        let inner = scopes.new_child(outer);
        scopes.push(outer);
        scopes.push(inner);
        assert_eq!(scopes.current(), inner);
        assert_eq!(scopes.depth(), 2);
        assert!(scopes.pop());
        assert_eq!(scopes.current(), outer);
        assert!(scopes.pop());
        assert_eq!(scopes.current(), ScopeId::GLOBAL);
        assert!(!scopes.pop());
    }

    #[test]
    fn clear_keeps_scope_contents() {
        let mut scopes = ScopeStack::new();
        let child = scopes.new_child(ScopeId::GLOBAL);
        scopes.insert_local(child, "x", 7);
        scopes.push(child);
        scopes.clear();
        assert_eq!(scopes.current(), ScopeId::GLOBAL);
        assert_eq!(scopes.lookup_from(child, "x"), Some(7));
        assert_eq!(scopes.parent(child), Some(ScopeId::GLOBAL));
    }
}
