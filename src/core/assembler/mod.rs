// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Shared assembler support.
//!
//! - [`scope`] - Symbol scope arena
//! - [`error`] - Error types and diagnostics

pub mod error;
pub mod scope;
