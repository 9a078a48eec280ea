// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Two-pass orchestration and the CLI-driven run flow.
//!
//! A build runs the same script twice. The sizing pass fixes label addresses
//! and macro instances; the emission pass writes bytes. Both passes must issue
//! the same ordered sequence of builder calls, which is a contract on the
//! [`ScriptEngine`] and is only checked where it shows: macro replay counts,
//! scope balance, label addresses and the final chain length.

use super::*;

/// Something that drives a [`Builder`] through one complete pass.
///
/// `run` is called once per pass and must issue the same builder calls, in the
/// same order, every time.
pub trait ScriptEngine {
    fn run(&mut self, builder: &mut Builder) -> Result<(), AsmError>;
}

impl<F> ScriptEngine for F
where
    F: FnMut(&mut Builder) -> Result<(), AsmError>,
{
    fn run(&mut self, builder: &mut Builder) -> Result<(), AsmError> {
        self(builder)
    }
}

fn unusable() -> AsmError {
    AsmError::new(
        AsmErrorKind::ScriptExecutionFailure,
        "Builder is unusable after a failed pass",
        None,
    )
}

impl Builder {
    /// Run the sizing pass unless it already ran.
    pub fn load<E: ScriptEngine + ?Sized>(&mut self, engine: &mut E) -> Result<(), AsmError> {
        match self.state {
            BuildState::Sized | BuildState::Built => return Ok(()),
            BuildState::Failed => return Err(unusable()),
            BuildState::Fresh => {}
        }
        self.run_pass(PassMode::Sizing, engine)?;
        self.state = BuildState::Sized;
        Ok(())
    }

    /// Size if needed, then run the emission pass. A builder builds once.
    pub fn build<E: ScriptEngine + ?Sized>(&mut self, engine: &mut E) -> Result<(), AsmError> {
        match self.state {
            BuildState::Built => {
                return Err(AsmError::new(
                    AsmErrorKind::DoubleBuild,
                    "Chain already built",
                    None,
                ))
            }
            BuildState::Failed => return Err(unusable()),
            BuildState::Fresh | BuildState::Sized => {}
        }
        self.load(engine)?;
        self.run_pass(PassMode::Emission, engine)?;
        self.state = BuildState::Built;
        info!(
            bytes = self.chain.length(),
            labels = self.symbols.global_labels().len(),
            "chain built"
        );
        Ok(())
    }

    fn run_pass<E: ScriptEngine + ?Sized>(
        &mut self,
        mode: PassMode,
        engine: &mut E,
    ) -> Result<(), AsmError> {
        self.begin_pass(mode);
        debug!(pass = mode.name(), "pass start");
        let result = engine.run(self).and_then(|()| self.finish_pass(mode));
        if let Err(err) = result {
            self.state = BuildState::Failed;
            debug!(pass = mode.name(), error = %err, "pass failed");
            return Err(AsmError::script_failure(mode.name(), err));
        }
        debug!(
            pass = mode.name(),
            cursor = self.chain.cursor(),
            length = self.chain.length(),
            "pass done"
        );
        Ok(())
    }

    fn begin_pass(&mut self, mode: PassMode) {
        self.chain.begin_pass(mode);
        self.symbols.reset_for_pass();
        self.macros.reset_replay();
        self.areas.clear();
        self.pops.clear();
    }

    fn finish_pass(&mut self, mode: PassMode) -> Result<(), AsmError> {
        if self.symbols.scope_depth() != 0 {
            return Err(AsmError::new(
                AsmErrorKind::UnbalancedScope,
                "Scope(s) still open at end of script",
                Some(&self.symbols.scope_depth().to_string()),
            ));
        }
        match mode {
            PassMode::Sizing => {
                debug!(
                    pending = self.symbols.pending_count(),
                    "resolving forward references"
                );
                self.sized_length = self.chain.cursor();
                self.symbols.resolve_pending()
            }
            PassMode::Emission => {
                self.areas.verify_closed()?;
                self.macros.verify_replayed()?;
                let (sized, emitted) = (self.sized_length, self.chain.cursor());
                if emitted != sized {
                    return Err(AsmError::new(
                        AsmErrorKind::PhaseMismatch,
                        "Chain length changed between passes",
                        Some(&format!("${sized:X} when sized, ${emitted:X} when emitted")),
                    ));
                }
                self.chain.finish_emission();
                Ok(())
            }
        }
    }
}

/// Run a build from parsed command-line arguments.
pub fn run_with_cli(cli: &Cli) -> Result<AsmRunReport, AsmRunError> {
    let config = validate_cli(cli)?;
    run_with_config(&config)
}

fn run_error(err: AsmError, source_lines: Arc<Vec<String>>) -> AsmRunError {
    let diagnostics = vec![Diagnostic::from_error(err.clone())];
    AsmRunError::new(err, diagnostics, source_lines)
}

/// Source text for the file an error points at, read back from disk.
fn lines_for(err: &AsmError) -> Arc<Vec<String>> {
    let lines: Vec<String> = err
        .location()
        .and_then(|loc| loc.file.as_deref())
        .and_then(|file| std::fs::read_to_string(Path::new(file)).ok())
        .map(|text| text.lines().map(str::to_string).collect())
        .unwrap_or_default();
    Arc::new(lines)
}

/// Load, build and write every artifact the configuration asks for.
pub fn run_with_config(config: &CliConfig) -> Result<AsmRunReport, AsmRunError> {
    let mut program = ScriptProgram::load(&config.input_path, &config.include_paths)
        .map_err(|err| {
            let lines = lines_for(&err);
            run_error(err, lines)
        })?;

    let mut builder = Builder::new();
    if let Err(err) = builder.build(&mut program) {
        let file = err.location().and_then(|loc| loc.file.clone());
        let lines = program
            .source_lines(file.as_deref())
            .unwrap_or_default();
        return Err(run_error(err, lines));
    }

    let bytes = builder
        .to_bytes()
        .map_err(|err| run_error(err, Arc::default()))?;
    output::emit_binary(&config.output_path, bytes)?;
    if let Some(path) = &config.hex_path {
        output::emit_hex(path, config.hex_base, bytes)?;
    }
    if let Some(path) = &config.labels_file {
        output::emit_labels(path, &builder.labels())?;
    }
    info!(
        output = %config.output_path.display(),
        bytes = bytes.len(),
        "chain written"
    );
    Ok(AsmRunReport::new(Vec::new(), bytes.len()))
}
