// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// Library entry exposing the chain builder and its script front end.
pub mod assembler;
pub mod core;
