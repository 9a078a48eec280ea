// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Command-line interface parsing and argument validation.

use std::env;
use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use tracing::Level;

use crate::core::assembler::error::{AsmError, AsmErrorKind, AsmRunError};
use crate::core::expr::parse_number;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const LONG_ABOUT: &str = "Two-pass ROP chain assembler.

Runs INPUT twice: a sizing pass that fixes every label address and macro
instance, then an emission pass that writes the chain. The chain bytes are
written verbatim to OUTPUT; parent directories are created as needed.
Use -x/--hex for an additional Intel HEX image and --labels for a listing of
the resolved global labels.";

#[derive(Parser, Debug)]
#[command(
    name = "ropforge",
    version = VERSION,
    about = "Two-pass ROP chain assembler with scoped labels, macros, areas and register pops",
    long_about = LONG_ABOUT
)]
pub struct Cli {
    #[arg(value_name = "INPUT", long_help = "Chain script to assemble.")]
    pub input: PathBuf,
    #[arg(value_name = "OUTPUT", long_help = "File receiving the raw chain bytes.")]
    pub output: PathBuf,
    #[arg(
        long = "format",
        value_enum,
        default_value_t = OutputFormat::Text,
        long_help = "Select diagnostic output format. text is default; json prints one JSON object per diagnostic."
    )]
    pub format: OutputFormat,
    #[arg(
        short = 'q',
        long = "quiet",
        action = ArgAction::SetTrue,
        long_help = "Suppress the summary line for successful runs. Errors are still reported."
    )]
    pub quiet: bool,
    #[arg(
        long = "log-level",
        value_name = "LEVEL",
        default_value_t = Level::WARN,
        long_help = "Maximum level of log events written to stderr (error, warn, info, debug, trace)."
    )]
    pub log_level: Level,
    #[arg(
        short = 'E',
        long = "error",
        value_name = "FILE",
        long_help = "Write diagnostics to FILE instead of stderr."
    )]
    pub error_file: Option<PathBuf>,
    #[arg(
        short = 'x',
        long = "hex",
        value_name = "FILE",
        long_help = "Also write the chain as an Intel HEX image to FILE."
    )]
    pub hex_file: Option<PathBuf>,
    #[arg(
        long = "base",
        value_name = "ADDR",
        requires = "hex_file",
        long_help = "Load address of the first chain byte in the Intel HEX image. Accepts decimal, 0x or $ hex. Defaults to 0."
    )]
    pub base: Option<String>,
    #[arg(
        long = "labels",
        value_name = "FILE",
        long_help = "Write resolved global labels to FILE as NAME = $XXXXXXXX lines."
    )]
    pub labels_file: Option<PathBuf>,
    #[arg(
        short = 'I',
        long = "include",
        value_name = "DIR",
        action = ArgAction::Append,
        long_help = "Add DIR to the .include search path (repeatable). Searched after the including file's directory."
    )]
    pub include_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticsSinkConfig {
    Stderr,
    File { path: PathBuf },
}

/// Validated run configuration.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub hex_path: Option<PathBuf>,
    pub hex_base: u32,
    pub labels_file: Option<PathBuf>,
    pub include_paths: Vec<PathBuf>,
    pub quiet: bool,
    pub output_format: OutputFormat,
    pub diagnostics_sink: DiagnosticsSinkConfig,
}

fn cli_error(message: impl Into<String>) -> AsmRunError {
    AsmRunError::new(
        AsmError::new(AsmErrorKind::Cli, &message.into(), None),
        Vec::new(),
        Vec::new(),
    )
}

fn parse_env_bool(var_name: &str) -> Result<Option<bool>, AsmRunError> {
    let Some(raw) = env::var_os(var_name) else {
        return Ok(None);
    };
    let value = raw.to_string_lossy().trim().to_ascii_lowercase();
    let parsed = match value.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        "" => None,
        _ => {
            return Err(cli_error(format!(
                "Invalid boolean value for {var_name}: {value}"
            )))
        }
    };
    Ok(parsed)
}

fn parse_env_path_list(var_name: &str) -> Vec<PathBuf> {
    let Some(raw) = env::var_os(var_name) else {
        return Vec::new();
    };
    env::split_paths(&raw)
        .filter(|path| !path.as_os_str().is_empty())
        .collect()
}

/// Parse a `--base` value into a 32-bit address.
pub fn parse_base_address(text: &str) -> Option<u32> {
    parse_number(text).and_then(|value| u32::try_from(value).ok())
}

/// Validate CLI arguments and return parsed configuration.
///
/// `ROPFORGE_INCLUDE_PATHS` adds include directories searched before the
/// `-I` ones; `ROPFORGE_QUIET` sets the quiet default.
pub fn validate_cli(cli: &Cli) -> Result<CliConfig, AsmRunError> {
    let mut include_paths = parse_env_path_list("ROPFORGE_INCLUDE_PATHS");
    include_paths.extend(cli.include_paths.iter().cloned());

    let quiet = if cli.quiet {
        true
    } else {
        parse_env_bool("ROPFORGE_QUIET")?.unwrap_or(false)
    };

    let hex_base = match cli.base.as_deref() {
        Some(text) => parse_base_address(text)
            .ok_or_else(|| cli_error(format!("Invalid --base address: {text}")))?,
        None => 0,
    };

    if cli.input == cli.output {
        return Err(cli_error("INPUT and OUTPUT must be different files"));
    }

    Ok(CliConfig {
        input_path: cli.input.clone(),
        output_path: cli.output.clone(),
        hex_path: cli.hex_file.clone(),
        hex_base,
        labels_file: cli.labels_file.clone(),
        include_paths,
        quiet,
        output_format: cli.format,
        diagnostics_sink: match &cli.error_file {
            Some(path) => DiagnosticsSinkConfig::File { path: path.clone() },
            None => DiagnosticsSinkConfig::Stderr,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_positionals_and_outputs() {
        let cli = Cli::parse_from([
            "ropforge",
            "--format",
            "json",
            "-x",
            "chain.hex",
            "--base",
            "0x0804_8000",
            "--labels",
            "chain.lbl",
            "-I",
            "lib",
            "-I",
            "gadgets",
            "chain.rop",
            "out/chain.bin",
        ]);
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.input, PathBuf::from("chain.rop"));
        assert_eq!(cli.output, PathBuf::from("out/chain.bin"));
        assert_eq!(
            cli.include_paths,
            vec![PathBuf::from("lib"), PathBuf::from("gadgets")]
        );
        assert_eq!(cli.log_level, Level::WARN);

        let config = validate_cli(&cli).unwrap();
        assert_eq!(config.hex_base, 0x0804_8000);
        assert_eq!(config.hex_path, Some(PathBuf::from("chain.hex")));
        assert_eq!(config.diagnostics_sink, DiagnosticsSinkConfig::Stderr);
    }

    #[test]
    fn missing_output_is_a_usage_error() {
        let err = Cli::try_parse_from(["ropforge", "chain.rop"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn base_requires_hex_output() {
        assert!(Cli::try_parse_from(["ropforge", "--base", "0x10", "a.rop", "a.bin"]).is_err());
    }

    #[test]
    fn invalid_base_is_rejected() {
        let cli = Cli::parse_from([
            "ropforge",
            "-x",
            "a.hex",
            "--base",
            "0x1_0000_0000",
            "a.rop",
            "a.bin",
        ]);
        let err = validate_cli(&cli).unwrap_err();
        assert_eq!(err.error().kind(), AsmErrorKind::Cli);
    }

    #[test]
    fn same_input_and_output_is_rejected() {
        let cli = Cli::parse_from(["ropforge", "chain.rop", "chain.rop"]);
        assert!(validate_cli(&cli).is_err());
    }

    #[test]
    fn error_file_selects_file_sink() {
        let cli = Cli::parse_from(["ropforge", "-E", "diag.txt", "-q", "a.rop", "a.bin"]);
        let config = validate_cli(&cli).unwrap();
        assert!(config.quiet);
        assert_eq!(
            config.diagnostics_sink,
            DiagnosticsSinkConfig::File {
                path: PathBuf::from("diag.txt")
            }
        );
    }
}
