// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Error types, diagnostics, and reporting for the chain builder.

use std::fmt;
use std::sync::Arc;

/// Categories of build errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsmErrorKind {
    DuplicateSymbol,
    UndefinedSymbol,
    InvalidAddress,
    BackwardOrigin,
    ValueOverflow,
    InvalidByteWidth,
    InvalidAlignment,
    ForwardReference,
    ChainTooLong,
    AreaOverflow,
    UnbalancedArea,
    UnbalancedScope,
    MacroReplayMismatch,
    PhaseMismatch,
    InvalidRegisterName,
    NonRegisterArgument,
    UnresolvableRegisters,
    DuplicatePopMacro,
    UnknownEncoding,
    DoubleBuild,
    NotBuilt,
    ScriptExecutionFailure,
    Syntax,
    Io,
    Cli,
}

impl AsmErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            AsmErrorKind::DuplicateSymbol => "rop001",
            AsmErrorKind::UndefinedSymbol => "rop002",
            AsmErrorKind::InvalidAddress => "rop003",
            AsmErrorKind::BackwardOrigin => "rop004",
            AsmErrorKind::ValueOverflow => "rop005",
            AsmErrorKind::InvalidByteWidth => "rop006",
            AsmErrorKind::InvalidAlignment => "rop007",
            AsmErrorKind::ForwardReference => "rop008",
            AsmErrorKind::ChainTooLong => "rop009",
            AsmErrorKind::AreaOverflow => "rop010",
            AsmErrorKind::UnbalancedArea => "rop011",
            AsmErrorKind::UnbalancedScope => "rop012",
            AsmErrorKind::MacroReplayMismatch => "rop013",
            AsmErrorKind::PhaseMismatch => "rop014",
            AsmErrorKind::InvalidRegisterName => "rop020",
            AsmErrorKind::NonRegisterArgument => "rop021",
            AsmErrorKind::UnresolvableRegisters => "rop022",
            AsmErrorKind::DuplicatePopMacro => "rop023",
            AsmErrorKind::UnknownEncoding => "rop030",
            AsmErrorKind::DoubleBuild => "rop040",
            AsmErrorKind::NotBuilt => "rop041",
            AsmErrorKind::ScriptExecutionFailure => "rop042",
            AsmErrorKind::Syntax => "rop050",
            AsmErrorKind::Io => "rop060",
            AsmErrorKind::Cli => "rop061",
        }
    }
}

/// Position of a script statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: Option<String>,
    pub line: u32,
}

/// A build error with a kind and message.
///
/// `ScriptExecutionFailure` errors keep the error that stopped the script as
/// their [`cause`](AsmError::cause).
#[derive(Debug, Clone)]
pub struct AsmError {
    kind: AsmErrorKind,
    message: String,
    location: Option<SourceLocation>,
    cause: Option<Box<AsmError>>,
}

impl AsmError {
    pub fn new(kind: AsmErrorKind, msg: &str, param: Option<&str>) -> Self {
        Self {
            kind,
            message: format_error(msg, param),
            location: None,
            cause: None,
        }
    }

    /// Wrap an error raised while the script engine was running a pass.
    pub fn script_failure(pass: &str, cause: AsmError) -> Self {
        let location = cause.location.clone();
        Self {
            kind: AsmErrorKind::ScriptExecutionFailure,
            message: format!("Script failed during {pass} pass: {}", cause.message),
            location,
            cause: Some(Box::new(cause)),
        }
    }

    /// Attach a location unless one is already set; the innermost statement wins.
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        if self.location.is_none() {
            self.location = Some(location);
        }
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> AsmErrorKind {
        self.kind
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }

    pub fn cause(&self) -> Option<&AsmError> {
        self.cause.as_deref()
    }

    /// Kind of the innermost wrapped error.
    pub fn root_kind(&self) -> AsmErrorKind {
        match &self.cause {
            Some(cause) => cause.root_kind(),
            None => self.kind,
        }
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AsmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A diagnostic message with location and context.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub(crate) line: u32,
    pub(crate) code: String,
    pub(crate) severity: Severity,
    pub(crate) error: AsmError,
    pub(crate) file: Option<String>,
    pub(crate) help: Vec<String>,
}

impl Diagnostic {
    pub fn new(line: u32, severity: Severity, error: AsmError) -> Self {
        Self {
            line,
            code: error.root_kind().code().to_string(),
            severity,
            error,
            file: None,
            help: Vec::new(),
        }
    }

    /// Build an error diagnostic positioned at the error's own location.
    pub fn from_error(error: AsmError) -> Self {
        let (file, line) = match error.location() {
            Some(loc) => (loc.file.clone(), loc.line),
            None => (None, 0),
        };
        let help = default_help(error.root_kind());
        let mut diag = Self::new(line, Severity::Error, error).with_file(file);
        if let Some(help) = help {
            diag = diag.with_help(help);
        }
        diag
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_file(mut self, file: Option<String>) -> Self {
        self.file = file;
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help.push(help.into());
        self
    }

    pub fn format(&self) -> String {
        let sev = severity_label(self.severity);
        format!(
            "{}: {} [{}] - {}",
            self.line,
            sev,
            self.code,
            self.error.message()
        )
    }

    pub fn format_with_context(&self, lines: Option<&[String]>, use_color: bool) -> String {
        let sev = severity_label(self.severity);
        let header = match &self.file {
            Some(file) => format!("{file}:{}: {sev} [{}]", self.line, self.code),
            None => format!("{}: {sev} [{}]", self.line, self.code),
        };

        let mut out = String::new();
        out.push_str(&header);
        out.push('\n');

        if self.line > 0 {
            for line in build_context_lines(self.line, lines, use_color) {
                out.push_str(&line);
                out.push('\n');
            }
        }

        for help in &self.help {
            out.push_str("help: ");
            out.push_str(help);
            out.push('\n');
        }

        out.push_str(&format!("{sev}: {}", self.error.message()));
        out
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn code(&self) -> &str {
        self.code.as_str()
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub fn message(&self) -> &str {
        self.error.message()
    }

    pub fn help(&self) -> &[String] {
        &self.help
    }
}

/// Report from a successful build run.
#[derive(Debug)]
pub struct AsmRunReport {
    diagnostics: Vec<Diagnostic>,
    bytes_written: usize,
}

impl AsmRunReport {
    pub fn new(diagnostics: Vec<Diagnostic>, bytes_written: usize) -> Self {
        Self {
            diagnostics,
            bytes_written,
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }
}

/// Error from a failed build run.
#[derive(Debug)]
pub struct AsmRunError {
    error: AsmError,
    diagnostics: Vec<Diagnostic>,
    source_lines: Arc<Vec<String>>,
}

impl AsmRunError {
    pub fn new(
        error: AsmError,
        diagnostics: Vec<Diagnostic>,
        source_lines: impl Into<Arc<Vec<String>>>,
    ) -> Self {
        Self {
            error,
            diagnostics,
            source_lines: source_lines.into(),
        }
    }

    pub fn error(&self) -> &AsmError {
        &self.error
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn source_lines(&self) -> &[String] {
        &self.source_lines
    }
}

impl fmt::Display for AsmRunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for AsmRunError {}

/// Build context lines for error display.
pub fn build_context_lines(
    line_num: u32,
    lines: Option<&[String]>,
    use_color: bool,
) -> Vec<String> {
    let line_idx = line_num.saturating_sub(1) as usize;
    let line = match lines {
        Some(lines) if line_idx < lines.len() => &lines[line_idx],
        _ => return vec![format!("{:>5} | <source unavailable>", line_num)],
    };
    let display = if use_color {
        format!("\x1b[31m{line}\x1b[0m")
    } else {
        line.to_string()
    };
    vec![format!("{:>5} | {}", line_num, display)]
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Warning => "WARNING",
        Severity::Error => "ERROR",
    }
}

fn default_help(kind: AsmErrorKind) -> Option<&'static str> {
    match kind {
        AsmErrorKind::MacroReplayMismatch => Some(
            "macros must be invoked the same number of times and in the same order in both passes",
        ),
        AsmErrorKind::UnresolvableRegisters => {
            Some("register a .popmacro that loads the missing register(s)")
        }
        AsmErrorKind::UnbalancedArea => Some("every .area needs a matching .endarea"),
        AsmErrorKind::ForwardReference => {
            Some("define the label before any directive whose size depends on it")
        }
        AsmErrorKind::PhaseMismatch => {
            Some("the chain layout must not depend on values only known in emission")
        }
        _ => None,
    }
}

/// Format an error message with an optional parameter.
pub fn format_error(msg: &str, param: Option<&str>) -> String {
    match param {
        Some(p) => format!("{msg}: {p}"),
        None => msg.to_string(),
    }
}
