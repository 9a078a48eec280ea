// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Chain builder front end.
//!
//! Ties the pass-aware core components together behind [`Builder`], runs a
//! [`ScriptEngine`] through the sizing and emission passes, and writes the
//! resulting artifacts.

mod builder;
pub mod cli;
mod output;
mod passes;
pub mod script;


use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::core::assembler::error::{
    AsmError, AsmErrorKind, AsmRunError, AsmRunReport, Diagnostic,
};
use crate::core::chain::PassMode;

use cli::{validate_cli, Cli, CliConfig};
use script::ScriptProgram;

// Re-export public types
pub use builder::{BuildState, Builder, PopBody};
pub use cli::VERSION;
pub use output::{write_intel_hex, write_labels};
pub use passes::{run_with_cli, run_with_config, ScriptEngine};
