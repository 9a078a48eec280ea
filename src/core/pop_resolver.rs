// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Register-pop resolution.
//!
//! A pop macro loads a fixed subset of the register file. To satisfy an
//! arbitrary set of register assignments the resolver picks pop macros with a
//! greedy set cover: repeatedly take the macro covering most of the still
//! missing registers, preferring the smaller register set on ties and the
//! earlier registration after that. This is a heuristic, not an optimal cover.

use std::fmt;

use tracing::trace;

use crate::core::assembler::error::{AsmError, AsmErrorKind};

/// Number of slots in the register alphabet (`r0`..`r15`).
pub const REGISTER_COUNT: u8 = 16;

/// One slot of the register alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Register(u8);

impl Register {
    pub fn new(index: u8) -> Option<Self> {
        (index < REGISTER_COUNT).then_some(Self(index))
    }

    /// Parse `r0`..`r15` (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        let digits = name.strip_prefix(['r', 'R'])?;
        if digits.is_empty() || (digits.len() > 1 && digits.starts_with('0')) {
            return None;
        }
        digits.parse::<u8>().ok().and_then(Self::new)
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Set of registers as a bit mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct RegisterSet(u16);

impl RegisterSet {
    pub const EMPTY: RegisterSet = RegisterSet(0);

    pub fn insert(&mut self, reg: Register) {
        self.0 |= 1 << reg.0;
    }

    pub fn contains(self, reg: Register) -> bool {
        self.0 & (1 << reg.0) != 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn intersection(self, other: RegisterSet) -> RegisterSet {
        RegisterSet(self.0 & other.0)
    }

    pub fn difference(self, other: RegisterSet) -> RegisterSet {
        RegisterSet(self.0 & !other.0)
    }

    pub fn iter(self) -> impl Iterator<Item = Register> {
        (0..REGISTER_COUNT)
            .filter(move |idx| self.0 & (1 << idx) != 0)
            .map(Register)
    }
}

impl FromIterator<Register> for RegisterSet {
    fn from_iter<I: IntoIterator<Item = Register>>(iter: I) -> Self {
        let mut set = RegisterSet::EMPTY;
        for reg in iter {
            set.insert(reg);
        }
        set
    }
}

impl fmt::Display for RegisterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.iter().map(|reg| reg.to_string()).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// Register values handed to one pop macro body, ordered by register.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegisterValues(Vec<(Register, u64)>);

impl RegisterValues {
    pub fn get(&self, reg: Register) -> Option<u64> {
        self.0
            .iter()
            .find(|(candidate, _)| *candidate == reg)
            .map(|(_, value)| *value)
    }

    pub fn registers(&self) -> RegisterSet {
        self.0.iter().map(|(reg, _)| *reg).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Register, u64)> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Clone)]
struct PopMacro<B> {
    name: String,
    registers: RegisterSet,
    body: B,
}

/// One selected pop macro with the values it receives.
#[derive(Clone)]
pub struct PopStep<B> {
    pub name: String,
    pub body: B,
    pub values: RegisterValues,
}

/// Catalogue of pop macros; `B` is the body handle type.
pub struct PopResolver<B> {
    macros: Vec<PopMacro<B>>,
}

impl<B: Clone> PopResolver<B> {
    pub fn new() -> Self {
        Self { macros: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    pub fn clear(&mut self) {
        self.macros.clear();
    }

    pub fn registers_of(&self, name: &str) -> Option<RegisterSet> {
        self.macros
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.registers)
    }

    /// Register a pop macro loading the named registers.
    pub fn register<S: AsRef<str>>(
        &mut self,
        name: &str,
        body: B,
        registers: &[S],
    ) -> Result<RegisterSet, AsmError> {
        let mut set = RegisterSet::EMPTY;
        for reg_name in registers {
            let reg_name = reg_name.as_ref();
            let Some(reg) = Register::parse(reg_name) else {
                return Err(AsmError::new(
                    AsmErrorKind::NonRegisterArgument,
                    "Non register argument found in pop macro",
                    Some(&format!("{name}: {reg_name}")),
                ));
            };
            set.insert(reg);
        }
        if set.is_empty() {
            return Err(AsmError::new(
                AsmErrorKind::NonRegisterArgument,
                "Pop macro must load at least one register",
                Some(name),
            ));
        }
        if self.registers_of(name).is_some() {
            return Err(AsmError::new(
                AsmErrorKind::DuplicatePopMacro,
                "Pop macro already registered",
                Some(name),
            ));
        }
        self.macros.push(PopMacro {
            name: name.to_string(),
            registers: set,
            body,
        });
        Ok(set)
    }

    /// Choose pop macros covering every requested register.
    ///
    /// `requested` pairs register names with the values to load. Each step
    /// receives only the values for registers its macro owns.
    pub fn resolve<S: AsRef<str>>(
        &self,
        requested: &[(S, u64)],
    ) -> Result<Vec<PopStep<B>>, AsmError> {
        let mut values: Vec<(Register, u64)> = Vec::with_capacity(requested.len());
        for (reg_name, value) in requested {
            let reg_name = reg_name.as_ref();
            let Some(reg) = Register::parse(reg_name) else {
                return Err(AsmError::new(
                    AsmErrorKind::InvalidRegisterName,
                    "Trying to pass non register argument to pop",
                    Some(reg_name),
                ));
            };
            match values.iter_mut().find(|(existing, _)| *existing == reg) {
                Some(slot) => slot.1 = *value,
                None => values.push((reg, *value)),
            }
        }
        values.sort_by_key(|(reg, _)| *reg);

        let mut remaining: RegisterSet = values.iter().map(|(reg, _)| *reg).collect();
        let mut chosen: Vec<&PopMacro<B>> = Vec::new();
        while !remaining.is_empty() {
            let Some(best) = self.find_best(remaining) else {
                return Err(AsmError::new(
                    AsmErrorKind::UnresolvableRegisters,
                    "Could not find pop macro for register(s)",
                    Some(&remaining.to_string()),
                ));
            };
            trace!(
                name = best.name.as_str(),
                covers = %best.registers.intersection(remaining),
                "pop macro selected"
            );
            remaining = remaining.difference(best.registers);
            chosen.push(best);
        }

        Ok(chosen
            .into_iter()
            .map(|entry| PopStep {
                name: entry.name.clone(),
                body: entry.body.clone(),
                values: RegisterValues(
                    values
                        .iter()
                        .copied()
                        .filter(|(reg, _)| entry.registers.contains(*reg))
                        .collect(),
                ),
            })
            .collect())
    }

    fn find_best(&self, remaining: RegisterSet) -> Option<&PopMacro<B>> {
        let mut best: Option<(&PopMacro<B>, usize)> = None;
        for entry in &self.macros {
            let covered = entry.registers.intersection(remaining).len();
            if covered == 0 {
                continue;
            }
            let better = match best {
                None => true,
                Some((current, current_covered)) => {
                    covered > current_covered
                        || (covered == current_covered
                            && entry.registers.len() < current.registers.len())
                }
            };
            if better {
                best = Some((entry, covered));
            }
        }
        best.map(|(entry, _)| entry)
    }
}

impl<B: Clone> Default for PopResolver<B> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn reg(index: u8) -> Register {
        Register::new(index).unwrap()
    }

    #[test]
    fn register_names_parse() {
        assert_eq!(Register::parse("r0"), Some(reg(0)));
        assert_eq!(Register::parse("R15"), Some(reg(15)));
        assert_eq!(Register::parse("r16"), None);
        assert_eq!(Register::parse("r01"), None);
        assert_eq!(Register::parse("sp"), None);
        assert_eq!(Register::parse("r"), None);
    }

    #[test]
    fn greedy_picks_widest_cover_first() {
        let mut resolver = PopResolver::new();
        resolver.register("pop_r0_r1", 1, &["r0", "r1"]).unwrap();
        resolver.register("pop_r1_r3", 2, &["r1", "r2", "r3"]).unwrap();
        resolver.register("pop_r0", 3, &["r0"]).unwrap();

        let steps = resolver
            .resolve(&[("r0", 10), ("r1", 11), ("r2", 12), ("r3", 13)])
            .unwrap();
        let names: Vec<&str> = steps.iter().map(|step| step.name.as_str()).collect();
        assert_eq!(names, vec!["pop_r1_r3", "pop_r0"]);
        assert_eq!(
            steps[0].values.iter().collect::<Vec<_>>(),
            vec![(reg(1), 11), (reg(2), 12), (reg(3), 13)]
        );
        assert_eq!(steps[1].values.iter().collect::<Vec<_>>(), vec![(reg(0), 10)]);
    }

    #[test]
    fn ties_prefer_smaller_register_set() {
        let mut resolver = PopResolver::new();
        resolver.register("wide", 1, &["r4", "r5", "r6"]).unwrap();
        resolver.register("narrow", 2, &["r4"]).unwrap();
        let steps = resolver.resolve(&[("r4", 1)]).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].name, "narrow");
    }

    #[test]
    fn values_only_cover_requested_registers() {
        let mut resolver = PopResolver::new();
        resolver.register("wide", (), &["r4", "r5", "r6"]).unwrap();
        let steps = resolver.resolve(&[("r5", 7)]).unwrap();
        assert_eq!(steps[0].values.len(), 1);
        assert_eq!(steps[0].values.get(reg(5)), Some(7));
        assert_eq!(steps[0].values.get(reg(4)), None);
    }

    #[test]
    fn missing_cover_fails() {
        let mut resolver = PopResolver::new();
        resolver.register("pop_r0", (), &["r0"]).unwrap();
        let err = resolver.resolve(&[("r0", 1), ("r7", 2)]).err().unwrap();
        assert_eq!(err.kind(), AsmErrorKind::UnresolvableRegisters);
        assert!(err.message().contains("r7"));
    }

    #[test]
    fn invalid_names_are_rejected() {
        let mut resolver: PopResolver<()> = PopResolver::new();
        let err = resolver.register("bad", (), &["r0", "pc"]).unwrap_err();
        assert_eq!(err.kind(), AsmErrorKind::NonRegisterArgument);
        let empty: [&str; 0] = [];
        let err = resolver.register("empty", (), &empty).unwrap_err();
        assert_eq!(err.kind(), AsmErrorKind::NonRegisterArgument);
        let err = resolver.resolve(&[("x9", 1)]).err().unwrap();
        assert_eq!(err.kind(), AsmErrorKind::InvalidRegisterName);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut resolver = PopResolver::new();
        resolver.register("p", (), &["r0"]).unwrap();
        let err = resolver.register("p", (), &["r1"]).unwrap_err();
        assert_eq!(err.kind(), AsmErrorKind::DuplicatePopMacro);
    }

    #[test]
    fn empty_request_selects_nothing() {
        let mut resolver = PopResolver::new();
        resolver.register("p", (), &["r0"]).unwrap();
        let request: [(&str, u64); 0] = [];
        assert!(resolver.resolve(&request).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn selection_covers_every_request(mask in 1u16..=u16::MAX, request in 1u16..=u16::MAX) {
            let mut resolver = PopResolver::new();
            // One single-register macro per bit of `mask`.
            for idx in 0..REGISTER_COUNT {
                if mask & (1 << idx) != 0 {
                    resolver.register(&format!("p{idx}"), (), &[format!("r{idx}")]).unwrap();
                }
            }
            let requested: Vec<(String, u64)> = (0..REGISTER_COUNT)
                .filter(|idx| request & (1 << idx) != 0)
                .map(|idx| (format!("r{idx}"), u64::from(idx)))
                .collect();
            match resolver.resolve(&requested) {
                Ok(steps) => {
                    prop_assert_eq!(request & !mask, 0);
                    let covered: RegisterSet = steps
                        .iter()
                        .flat_map(|step| step.values.registers().iter().collect::<Vec<_>>())
                        .collect();
                    prop_assert_eq!(covered.len(), requested.len());
                }
                Err(err) => {
                    prop_assert!(request & !mask != 0);
                    prop_assert_eq!(err.kind(), AsmErrorKind::UnresolvableRegisters);
                }
            }
        }
    }
}
