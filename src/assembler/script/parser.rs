// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Source loading and statement parsing for chain scripts.
//!
//! Loading splices `.include` files into one flat line list. Parsing turns
//! that list into a statement tree where `.macro`, `.popmacro` and `.area`
//! blocks own their bodies. Macro definitions are collected into a table so
//! a macro may be invoked before the line that defines it.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use tracing::debug;

use super::lexer::{tokenize_line, Token, TokenKind};
use crate::core::assembler::error::{AsmError, AsmErrorKind, SourceLocation};
use crate::core::expr::{BinaryOp, Expr};

/// One tokenized line after include expansion.
#[derive(Debug, Clone)]
pub struct SourceLine {
    pub location: SourceLocation,
    pub tokens: Vec<Token>,
    /// Directory of the file the line came from.
    pub dir: PathBuf,
}

/// Expanded source plus the raw text of every file read.
#[derive(Debug, Default)]
pub struct SourceSet {
    pub lines: Vec<SourceLine>,
    pub files: HashMap<String, Arc<Vec<String>>>,
}

#[derive(Debug, Clone)]
pub struct Statement {
    pub kind: StatementKind,
    pub location: SourceLocation,
}

#[derive(Debug, Clone)]
pub enum StatementKind {
    Label {
        name: String,
        address: Option<Expr>,
    },
    Data {
        width: usize,
        values: Vec<Expr>,
    },
    Value {
        width: Expr,
        value: Expr,
    },
    Text {
        text: String,
        encoding: String,
    },
    Raw(Vec<Expr>),
    IncBin(PathBuf),
    Org(Expr),
    Align(Expr),
    Fill {
        size: Expr,
        value: Expr,
        width: Option<Expr>,
    },
    Area {
        budget: Expr,
        body: Vec<Statement>,
    },
    PopMacro(Rc<PopMacroDef>),
    Pop(Vec<(String, Expr)>),
    Invoke {
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug)]
pub struct MacroDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Statement>,
}

#[derive(Debug)]
pub struct PopMacroDef {
    pub name: String,
    pub registers: Vec<String>,
    pub body: Vec<Statement>,
}

pub type MacroTable = HashMap<String, Rc<MacroDef>>;

fn syntax(msg: &str, param: Option<&str>) -> AsmError {
    AsmError::new(AsmErrorKind::Syntax, msg, param)
}

fn io_error(msg: &str, path: &Path, err: std::io::Error) -> AsmError {
    AsmError::new(
        AsmErrorKind::Io,
        &format!("{msg}: {err}"),
        Some(&path.display().to_string()),
    )
}

/// Read `path` and every file it includes.
pub fn load_source(path: &Path, include_dirs: &[PathBuf]) -> Result<SourceSet, AsmError> {
    let mut set = SourceSet::default();
    let mut stack = Vec::new();
    expand_file(path, include_dirs, &mut stack, &mut set)?;
    debug!(
        lines = set.lines.len(),
        files = set.files.len(),
        "script source loaded"
    );
    Ok(set)
}

fn expand_file(
    path: &Path,
    include_dirs: &[PathBuf],
    stack: &mut Vec<PathBuf>,
    set: &mut SourceSet,
) -> Result<(), AsmError> {
    let canonical =
        fs::canonicalize(path).map_err(|err| io_error("Error opening file", path, err))?;
    if stack.contains(&canonical) {
        return Err(AsmError::new(
            AsmErrorKind::Syntax,
            "Include cycle detected",
            Some(&path.display().to_string()),
        ));
    }
    let text =
        fs::read_to_string(path).map_err(|err| io_error("Error reading file", path, err))?;
    let file_name = path.display().to_string();
    let raw_lines: Vec<String> = text.lines().map(str::to_string).collect();
    set.files
        .insert(file_name.clone(), Arc::new(raw_lines.clone()));
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    stack.push(canonical);
    for (idx, raw) in raw_lines.iter().enumerate() {
        let location = SourceLocation {
            file: Some(file_name.clone()),
            line: idx as u32 + 1,
        };
        let tokens = tokenize_line(raw).map_err(|err| err.with_location(location.clone()))?;
        let target =
            include_target(&tokens).map_err(|err| err.with_location(location.clone()))?;
        if let Some(target) = target {
            let resolved = resolve_include(&dir, include_dirs, &target)
                .map_err(|err| err.with_location(location.clone()))?;
            expand_file(&resolved, include_dirs, stack, set)
                .map_err(|err| err.with_location(location.clone()))?;
            continue;
        }
        set.lines.push(SourceLine {
            location,
            tokens,
            dir: dir.clone(),
        });
    }
    stack.pop();
    Ok(())
}

fn include_target(tokens: &[Token]) -> Result<Option<String>, AsmError> {
    match tokens {
        [Token {
            kind: TokenKind::Directive(name),
            ..
        }, rest @ ..]
            if name == "include" =>
        {
            match rest {
                [Token {
                    kind: TokenKind::Str(target),
                    ..
                }] => Ok(Some(target.clone())),
                _ => Err(syntax(".include expects one quoted path", None)),
            }
        }
        _ => Ok(None),
    }
}

fn resolve_include(
    dir: &Path,
    include_dirs: &[PathBuf],
    target: &str,
) -> Result<PathBuf, AsmError> {
    let target_path = Path::new(target);
    if target_path.is_absolute() {
        return Ok(target_path.to_path_buf());
    }
    let local = dir.join(target_path);
    if local.exists() {
        return Ok(local);
    }
    include_dirs
        .iter()
        .map(|base| base.join(target_path))
        .find(|candidate| candidate.exists())
        .ok_or_else(|| {
            AsmError::new(AsmErrorKind::Io, "Include file not found", Some(target))
        })
}

/// Parsed program: top-level statements plus the macro table.
#[derive(Debug)]
pub struct ParsedProgram {
    pub statements: Vec<Statement>,
    pub macros: MacroTable,
}

pub fn parse_program(lines: &[SourceLine]) -> Result<ParsedProgram, AsmError> {
    let mut parser = Parser {
        lines,
        pos: 0,
        macros: MacroTable::new(),
        pop_names: Vec::new(),
    };
    let statements = parser.parse_block(None, false)?;
    for name in &parser.pop_names {
        if parser.macros.contains_key(name) {
            return Err(syntax("Pop macro name already used by a macro", Some(name)));
        }
    }
    Ok(ParsedProgram {
        statements,
        macros: parser.macros,
    })
}

struct Parser<'a> {
    lines: &'a [SourceLine],
    pos: usize,
    macros: MacroTable,
    pop_names: Vec<String>,
}

/// Directive that closes the block being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator {
    EndMacro,
    EndPopMacro,
    EndArea,
}

impl Terminator {
    fn from_directive(name: &str) -> Option<Self> {
        match name {
            "endmacro" | "endm" => Some(Terminator::EndMacro),
            "endpopmacro" => Some(Terminator::EndPopMacro),
            "endarea" => Some(Terminator::EndArea),
            _ => None,
        }
    }

    fn directive(self) -> &'static str {
        match self {
            Terminator::EndMacro => ".endmacro",
            Terminator::EndPopMacro => ".endpopmacro",
            Terminator::EndArea => ".endarea",
        }
    }
}

impl<'a> Parser<'a> {
    fn parse_block(
        &mut self,
        end: Option<Terminator>,
        in_macro: bool,
    ) -> Result<Vec<Statement>, AsmError> {
        let mut out = Vec::new();
        while self.pos < self.lines.len() {
            let lines = self.lines;
            let line = &lines[self.pos];
            self.pos += 1;
            let location = line.location.clone();
            let mut tokens: &[Token] = &line.tokens;

            if let [Token {
                kind: TokenKind::Ident(name),
                ..
            }, Token {
                kind: TokenKind::Colon,
                ..
            }, rest @ ..] = tokens
            {
                out.push(Statement {
                    kind: StatementKind::Label {
                        name: name.clone(),
                        address: None,
                    },
                    location: location.clone(),
                });
                tokens = rest;
            }

            let Some(first) = tokens.first() else {
                continue;
            };
            let args = &tokens[1..];
            let kind = match &first.kind {
                TokenKind::Directive(name) => {
                    if let Some(found) = Terminator::from_directive(name) {
                        if !args.is_empty() {
                            return Err(syntax("Unexpected operands", Some(found.directive()))
                                .with_location(location));
                        }
                        if end == Some(found) {
                            return Ok(out);
                        }
                        return Err(syntax(
                            "Unexpected block terminator",
                            Some(found.directive()),
                        )
                        .with_location(location));
                    }
                    self.parse_directive(name, args, line, in_macro)
                        .map_err(|err| err.with_location(location.clone()))?
                }
                TokenKind::Ident(name) => {
                    let args: Vec<Expr> = split_args(args)
                        .and_then(|parts| parts.into_iter().map(parse_expr).collect())
                        .map_err(|err| err.with_location(location.clone()))?;
                    Some(StatementKind::Invoke {
                        name: name.clone(),
                        args,
                    })
                }
                _ => {
                    return Err(syntax("Expected a directive or macro name", None)
                        .with_location(location))
                }
            };
            if let Some(kind) = kind {
                out.push(Statement { kind, location });
            }
        }
        match end {
            Some(term) => Err(syntax("Missing block terminator", Some(term.directive()))),
            None => Ok(out),
        }
    }

    fn parse_directive(
        &mut self,
        name: &str,
        args: &[Token],
        line: &SourceLine,
        in_macro: bool,
    ) -> Result<Option<StatementKind>, AsmError> {
        let kind = match name {
            "db" | "byte" => data(1, args)?,
            "dh" | "half" => data(2, args)?,
            "dw" | "word" => data(4, args)?,
            "value" => {
                let [width, value] = exprs::<2>(name, args)?;
                StatementKind::Value { width, value }
            }
            "ascii" => text(args, None, "ascii")?,
            "utf16" => text(args, None, "utf16le")?,
            "str" => {
                let parts = split_args(args)?;
                match parts.as_slice() {
                    [text_tokens] => text(text_tokens, None, "ascii")?,
                    [text_tokens, enc] => text(text_tokens, Some(*enc), "ascii")?,
                    _ => return Err(syntax("Wrong number of operands", Some(".str"))),
                }
            }
            "raw" => StatementKind::Raw(exprs_list(args)?),
            "incbin" => {
                let path = single_string(args, ".incbin")?;
                StatementKind::IncBin(line.dir.join(path))
            }
            "include" => {
                return Err(syntax(".include expects one quoted path", None));
            }
            "org" => {
                let [addr] = exprs::<1>(name, args)?;
                StatementKind::Org(addr)
            }
            "align" => {
                let [multiple] = exprs::<1>(name, args)?;
                StatementKind::Align(multiple)
            }
            "fill" => {
                let mut values = exprs_list(args)?.into_iter();
                match (values.next(), values.next(), values.next(), values.next()) {
                    (Some(size), Some(value), width, None) => {
                        StatementKind::Fill { size, value, width }
                    }
                    _ => return Err(syntax("Wrong number of operands", Some(".fill"))),
                }
            }
            "label" => {
                let parts = split_args(args)?;
                let (name_tokens, address) = match parts.as_slice() {
                    [name_tokens] => (*name_tokens, None),
                    [name_tokens, addr] => (*name_tokens, Some(parse_expr(addr)?)),
                    _ => return Err(syntax("Wrong number of operands", Some(".label"))),
                };
                let name = single_ident(name_tokens, ".label")?;
                StatementKind::Label { name, address }
            }
            "area" => {
                let [budget] = exprs::<1>(name, args)?;
                let body = self.parse_block(Some(Terminator::EndArea), in_macro)?;
                StatementKind::Area { budget, body }
            }
            "macro" => {
                if in_macro {
                    return Err(syntax("Macro definitions cannot be nested", None));
                }
                let (macro_name, params) = name_and_params(args, ".macro")?;
                let body = self.parse_block(Some(Terminator::EndMacro), true)?;
                if self.macros.contains_key(&macro_name) {
                    return Err(AsmError::new(
                        AsmErrorKind::DuplicateSymbol,
                        "Macro already defined",
                        Some(&macro_name),
                    ));
                }
                self.macros.insert(
                    macro_name.clone(),
                    Rc::new(MacroDef {
                        name: macro_name,
                        params,
                        body,
                    }),
                );
                return Ok(None);
            }
            "popmacro" => {
                if in_macro {
                    return Err(syntax("Macro definitions cannot be nested", None));
                }
                let (macro_name, registers) = name_and_params(args, ".popmacro")?;
                let body = self.parse_block(Some(Terminator::EndPopMacro), true)?;
                self.pop_names.push(macro_name.clone());
                StatementKind::PopMacro(Rc::new(PopMacroDef {
                    name: macro_name,
                    registers,
                    body,
                }))
            }
            "pop" => {
                let mut assignments = Vec::new();
                for part in split_args(args)? {
                    let [Token {
                        kind: TokenKind::Ident(reg),
                        ..
                    }, Token {
                        kind: TokenKind::Assign,
                        ..
                    }, value @ ..] = part
                    else {
                        return Err(syntax("Expected register=value", Some(".pop")));
                    };
                    assignments.push((reg.clone(), parse_expr(value)?));
                }
                if assignments.is_empty() {
                    return Err(syntax("Wrong number of operands", Some(".pop")));
                }
                StatementKind::Pop(assignments)
            }
            other => return Err(syntax("Unknown directive", Some(&format!(".{other}")))),
        };
        Ok(Some(kind))
    }
}

fn data(width: usize, args: &[Token]) -> Result<StatementKind, AsmError> {
    let values = exprs_list(args)?;
    if values.is_empty() {
        return Err(syntax("Missing operand", None));
    }
    Ok(StatementKind::Data { width, values })
}

fn text(
    tokens: &[Token],
    encoding: Option<&[Token]>,
    default: &str,
) -> Result<StatementKind, AsmError> {
    let text = single_string(tokens, "string directive")?;
    let encoding = match encoding {
        Some(tokens) => match tokens {
            [Token {
                kind: TokenKind::Str(name) | TokenKind::Ident(name),
                ..
            }] => name.clone(),
            _ => return Err(syntax("Expected an encoding name", None)),
        },
        None => default.to_string(),
    };
    Ok(StatementKind::Text { text, encoding })
}

fn single_string(tokens: &[Token], what: &str) -> Result<String, AsmError> {
    match tokens {
        [Token {
            kind: TokenKind::Str(text),
            ..
        }] => Ok(text.clone()),
        _ => Err(syntax("Expected one quoted string", Some(what))),
    }
}

fn single_ident(tokens: &[Token], what: &str) -> Result<String, AsmError> {
    match tokens {
        [Token {
            kind: TokenKind::Ident(name),
            ..
        }] => Ok(name.clone()),
        _ => Err(syntax("Expected a name", Some(what))),
    }
}

fn name_and_params(args: &[Token], what: &str) -> Result<(String, Vec<String>), AsmError> {
    let Some((
        Token {
            kind: TokenKind::Ident(name),
            ..
        },
        rest,
    )) = args.split_first()
    else {
        return Err(syntax("Expected a name", Some(what)));
    };
    let mut params = Vec::new();
    for part in split_args(rest)? {
        let param = single_ident(part, what)?;
        if params.contains(&param) {
            return Err(syntax("Duplicate parameter", Some(&param)));
        }
        params.push(param);
    }
    Ok((name.clone(), params))
}

fn exprs<const N: usize>(name: &str, args: &[Token]) -> Result<[Expr; N], AsmError> {
    exprs_list(args)?
        .try_into()
        .map_err(|_| syntax("Wrong number of operands", Some(&format!(".{name}"))))
}

fn exprs_list(args: &[Token]) -> Result<Vec<Expr>, AsmError> {
    split_args(args)?.into_iter().map(parse_expr).collect()
}

/// Split operands on commas. An empty operand list yields no parts.
pub(super) fn split_args(tokens: &[Token]) -> Result<Vec<&[Token]>, AsmError> {
    if tokens.is_empty() {
        return Ok(Vec::new());
    }
    let parts: Vec<&[Token]> = tokens
        .split(|tok| tok.kind == TokenKind::Comma)
        .collect();
    if parts.iter().any(|part| part.is_empty()) {
        return Err(syntax("Empty operand", None));
    }
    Ok(parts)
}

/// Parse a complete expression from `tokens`.
pub(super) fn parse_expr(tokens: &[Token]) -> Result<Expr, AsmError> {
    let mut parser = ExprParser { tokens, pos: 0 };
    let expr = parser.parse_binary(0)?;
    if parser.pos != tokens.len() {
        return Err(syntax("Unexpected token in expression", None));
    }
    Ok(expr)
}

struct ExprParser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> ExprParser<'a> {
    fn peek_op(&self) -> Option<BinaryOp> {
        match self.tokens.get(self.pos) {
            Some(Token {
                kind: TokenKind::Op(op),
                ..
            }) => Some(*op),
            _ => None,
        }
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, AsmError> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.peek_op() {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.pos += 1;
            let right = self.parse_binary(prec + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, AsmError> {
        let Some(token) = self.tokens.get(self.pos) else {
            return Err(syntax("Missing operand", None));
        };
        self.pos += 1;
        match &token.kind {
            TokenKind::Number(value) => Ok(Expr::Number(*value)),
            TokenKind::Ident(name) => Ok(Expr::Identifier(name.clone())),
            TokenKind::Dollar => Ok(Expr::Dollar),
            TokenKind::Tilde => Ok(Expr::Not(Box::new(self.parse_unary()?))),
            TokenKind::LParen => {
                let inner = self.parse_binary(0)?;
                match self.tokens.get(self.pos) {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(syntax("Missing closing parenthesis", None)),
                }
            }
            _ => Err(syntax("Unexpected token in expression", None)),
        }
    }
}
