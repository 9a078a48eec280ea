// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Text directive front end.
//!
//! A [`ScriptProgram`] is loaded and parsed once, then executed by the
//! orchestrator in both passes. Every pass issues the same builder calls in
//! the same order because the program is a fixed statement tree.

mod exec;
mod lexer;
mod parser;

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use self::exec::{Env, Executor};
use self::parser::{load_source, parse_program, MacroTable, SourceLine, SourceSet, Statement};
use super::builder::Builder;
use super::passes::ScriptEngine;
use crate::core::assembler::error::{AsmError, SourceLocation};

pub use self::exec::MAX_MACRO_DEPTH;

pub struct ScriptProgram {
    statements: Vec<Statement>,
    macros: Rc<MacroTable>,
    files: SourceSet,
}

impl ScriptProgram {
    /// Load, expand includes, and parse the script at `path`.
    pub fn load(path: &Path, include_dirs: &[PathBuf]) -> Result<Self, AsmError> {
        let mut files = load_source(path, include_dirs)?;
        let lines: Vec<SourceLine> = std::mem::take(&mut files.lines);
        let parsed = parse_program(&lines)?;
        Ok(Self {
            statements: parsed.statements,
            macros: Rc::new(parsed.macros),
            files,
        })
    }

    /// Parse script text that has no backing file. `.incbin` paths resolve
    /// against `base_dir`; `.include` is only available through [`Self::load`].
    pub fn from_source(text: &str, base_dir: &Path) -> Result<Self, AsmError> {
        let mut lines = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let location = SourceLocation {
                file: None,
                line: idx as u32 + 1,
            };
            let tokens =
                lexer::tokenize_line(raw).map_err(|err| err.with_location(location.clone()))?;
            lines.push(SourceLine {
                location,
                tokens,
                dir: base_dir.to_path_buf(),
            });
        }
        let parsed = parse_program(&lines)?;
        let mut files = SourceSet::default();
        files.files.insert(
            String::new(),
            Arc::new(text.lines().map(str::to_string).collect()),
        );
        Ok(Self {
            statements: parsed.statements,
            macros: Rc::new(parsed.macros),
            files,
        })
    }

    /// Raw lines of a loaded file, for diagnostics context.
    pub fn source_lines(&self, file: Option<&str>) -> Option<Arc<Vec<String>>> {
        self.files.files.get(file.unwrap_or_default()).cloned()
    }

    pub fn macro_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.macros.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl ScriptEngine for ScriptProgram {
    fn run(&mut self, builder: &mut Builder) -> Result<(), AsmError> {
        for name in self.macro_names() {
            builder.register_macro(name);
        }
        let exec = Executor::new(Rc::clone(&self.macros));
        exec.exec_block(builder, &self.statements, &Env::default())
    }
}
