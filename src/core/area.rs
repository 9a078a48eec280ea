// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Nested byte budgets.
//!
//! Areas are only tracked during emission, when the physical length is real.
//! After every physical append all open areas are checked, innermost first.

use crate::core::assembler::error::{AsmError, AsmErrorKind};
use crate::core::chain::PassMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Area {
    baseline: usize,
    budget: u64,
}

#[derive(Debug, Default)]
pub struct AreaGuard {
    areas: Vec<Area>,
}

impl AreaGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.areas.len()
    }

    pub fn clear(&mut self) {
        self.areas.clear();
    }

    pub fn begin(&mut self, mode: PassMode, physical_length: usize, budget: u64) {
        if mode == PassMode::Sizing {
            return;
        }
        self.areas.push(Area {
            baseline: physical_length,
            budget,
        });
    }

    pub fn end(&mut self, mode: PassMode) -> Result<(), AsmError> {
        if mode == PassMode::Sizing {
            return Ok(());
        }
        if self.areas.pop().is_none() {
            return Err(AsmError::new(
                AsmErrorKind::UnbalancedArea,
                "end_area without a matching begin_area",
                None,
            ));
        }
        Ok(())
    }

    /// Check every open area against the current physical length.
    pub fn check(&self, physical_length: usize) -> Result<(), AsmError> {
        for (depth, area) in self.areas.iter().enumerate().rev() {
            let used = physical_length.saturating_sub(area.baseline) as u64;
            if used > area.budget {
                return Err(AsmError::new(
                    AsmErrorKind::AreaOverflow,
                    "Area overflowed",
                    Some(&format!(
                        "{used} bytes used of {} (nesting level {})",
                        area.budget,
                        depth + 1
                    )),
                ));
            }
        }
        Ok(())
    }

    /// Fails if areas are still open at the end of a pass.
    pub fn verify_closed(&self) -> Result<(), AsmError> {
        if self.areas.is_empty() {
            Ok(())
        } else {
            Err(AsmError::new(
                AsmErrorKind::UnbalancedArea,
                "Area(s) still open at end of script",
                Some(&self.areas.len().to_string()),
            ))
        }
    }
}
