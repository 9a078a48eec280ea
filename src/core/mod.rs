// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Pass-aware building blocks shared by every front end.
//!
//! - [`chain`] - Chain buffer and pass mode
//! - [`symbol_table`] - Scoped labels with forward references
//! - [`macro_tracker`] - Per-call macro scopes replayed across passes
//! - [`area`] - Nested byte budgets
//! - [`pop_resolver`] - Register-pop macro selection
//! - [`value`] - Little-endian value encoding
//! - [`text_encoding`] - String encodings
//! - [`expr`] - Operand expressions

pub mod area;
pub mod assembler;
pub mod chain;
pub mod expr;
pub mod macro_tracker;
pub mod pop_resolver;
pub mod symbol_table;
pub mod text_encoding;
pub mod value;
