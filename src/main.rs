// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint for ropforge.

use std::fs::File;
use std::io::{self, Write};

use clap::Parser;
use serde_json::json;

use ropforge::assembler::cli::{validate_cli, Cli, DiagnosticsSinkConfig, OutputFormat};
use ropforge::assembler::run_with_config;
use ropforge::core::assembler::error::{AsmRunError, Diagnostic, Severity};

struct DiagnosticsSink {
    writer: Box<dyn Write>,
}

impl DiagnosticsSink {
    fn from_config(config: &DiagnosticsSinkConfig) -> io::Result<Self> {
        match config {
            DiagnosticsSinkConfig::Stderr => Ok(Self {
                writer: Box::new(io::stderr()),
            }),
            DiagnosticsSinkConfig::File { path } => Ok(Self {
                writer: Box::new(File::create(path)?),
            }),
        }
    }

    /// Write one diagnostic line. Falls back to stderr when the sink fails.
    fn emit_line(&mut self, line: &str) {
        if writeln!(self.writer, "{line}").is_err() {
            eprintln!("{line}");
        }
    }

    fn emit_error_diagnostics(
        &mut self,
        err: &AsmRunError,
        use_color: bool,
        format: OutputFormat,
    ) {
        for diag in err.diagnostics() {
            self.emit_line(&format_diagnostic_line(
                diag,
                Some(err.source_lines()),
                use_color,
                format,
            ));
        }
    }
}

fn severity_to_str(severity: Severity) -> &'static str {
    match severity {
        Severity::Warning => "warning",
        Severity::Error => "error",
    }
}

fn format_diagnostic_line(
    diag: &Diagnostic,
    source_lines: Option<&[String]>,
    use_color: bool,
    format: OutputFormat,
) -> String {
    if format == OutputFormat::Json {
        json!({
            "code": diag.code(),
            "severity": severity_to_str(diag.severity()),
            "message": diag.message(),
            "file": diag.file(),
            "line": diag.line(),
            "help": diag.help(),
        })
        .to_string()
    } else {
        diag.format_with_context(source_lines, use_color)
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_writer(io::stderr)
        .init();

    let config = match validate_cli(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    let mut sink = match DiagnosticsSink::from_config(&config.diagnostics_sink) {
        Ok(sink) => sink,
        Err(err) => {
            eprintln!("Failed to open diagnostics sink: {err}");
            std::process::exit(1);
        }
    };

    let use_color = std::env::var("NO_COLOR").is_err()
        && matches!(config.diagnostics_sink, DiagnosticsSinkConfig::Stderr);
    match run_with_config(&config) {
        Ok(report) => {
            if !config.quiet && config.output_format == OutputFormat::Text {
                println!(
                    "{}: {} bytes",
                    config.output_path.display(),
                    report.bytes_written()
                );
            }
        }
        Err(err) => {
            sink.emit_error_diagnostics(&err, use_color, config.output_format);
            std::process::exit(1);
        }
    }
}
