// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Line tokenizer for chain scripts.

use crate::core::assembler::error::{AsmError, AsmErrorKind};
use crate::core::expr::{parse_number, BinaryOp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Ident(String),
    /// Directive name, lowercased, without the leading dot.
    Directive(String),
    Number(u64),
    Str(String),
    Comma,
    Colon,
    LParen,
    RParen,
    Dollar,
    Assign,
    Tilde,
    Op(BinaryOp),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// 1-based column of the first character.
    pub col: usize,
}

fn syntax(msg: &str, param: Option<&str>) -> AsmError {
    AsmError::new(AsmErrorKind::Syntax, msg, param)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Split one source line into tokens. Everything after `;` is ignored.
pub fn tokenize_line(line: &str) -> Result<Vec<Token>, AsmError> {
    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let col = i + 1;
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == ';' {
            break;
        }

        let kind = match c {
            '.' if chars.get(i + 1).copied().is_some_and(is_ident_start) => {
                let start = i + 1;
                i = start;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                tokens.push(Token {
                    kind: TokenKind::Directive(name.to_ascii_lowercase()),
                    col,
                });
                continue;
            }
            c if is_ident_start(c) => {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Ident(chars[start..i].iter().collect()),
                    col,
                });
                continue;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value =
                    parse_number(&text).ok_or_else(|| syntax("Invalid number", Some(&text)))?;
                tokens.push(Token {
                    kind: TokenKind::Number(value),
                    col,
                });
                continue;
            }
            '$' if chars.get(i + 1).is_some_and(|c| c.is_ascii_hexdigit()) => {
                let start = i;
                i += 1;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value =
                    parse_number(&text).ok_or_else(|| syntax("Invalid number", Some(&text)))?;
                tokens.push(Token {
                    kind: TokenKind::Number(value),
                    col,
                });
                continue;
            }
            '"' => {
                let (text, next) = read_quoted(&chars, i, '"')?;
                i = next;
                tokens.push(Token {
                    kind: TokenKind::Str(text),
                    col,
                });
                continue;
            }
            '\'' => {
                let (text, next) = read_quoted(&chars, i, '\'')?;
                let mut iter = text.chars();
                let (Some(ch), None) = (iter.next(), iter.next()) else {
                    return Err(syntax(
                        "Character literal must hold exactly one character",
                        Some(&text),
                    ));
                };
                i = next;
                tokens.push(Token {
                    kind: TokenKind::Number(u64::from(u32::from(ch))),
                    col,
                });
                continue;
            }
            '<' | '>' => {
                if chars.get(i + 1) != Some(&c) {
                    return Err(syntax("Unexpected character", Some(&c.to_string())));
                }
                i += 2;
                tokens.push(Token {
                    kind: TokenKind::Op(if c == '<' {
                        BinaryOp::Shl
                    } else {
                        BinaryOp::Shr
                    }),
                    col,
                });
                continue;
            }
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '$' => TokenKind::Dollar,
            '=' => TokenKind::Assign,
            '~' => TokenKind::Tilde,
            '+' => TokenKind::Op(BinaryOp::Add),
            '-' => TokenKind::Op(BinaryOp::Subtract),
            '*' => TokenKind::Op(BinaryOp::Multiply),
            '/' => TokenKind::Op(BinaryOp::Divide),
            '%' => TokenKind::Op(BinaryOp::Mod),
            '&' => TokenKind::Op(BinaryOp::BitAnd),
            '^' => TokenKind::Op(BinaryOp::BitXor),
            '|' => TokenKind::Op(BinaryOp::BitOr),
            other => return Err(syntax("Unexpected character", Some(&other.to_string()))),
        };
        tokens.push(Token { kind, col });
        i += 1;
    }

    Ok(tokens)
}

/// Read a quoted literal starting at `start`; returns the unescaped text and
/// the index just past the closing quote.
fn read_quoted(chars: &[char], start: usize, quote: char) -> Result<(String, usize), AsmError> {
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if c == quote {
            return Ok((out, i + 1));
        }
        if c == '\\' {
            i += 1;
            let Some(&esc) = chars.get(i) else {
                break;
            };
            match esc {
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                't' => out.push('\t'),
                '0' => out.push('\0'),
                '\\' | '"' | '\'' => out.push(esc),
                'x' => {
                    let hex: String = chars.iter().skip(i + 1).take(2).collect();
                    let value = (hex.len() == 2)
                        .then(|| u8::from_str_radix(&hex, 16).ok())
                        .flatten()
                        .ok_or_else(|| syntax("Invalid \\x escape", Some(&hex)))?;
                    out.push(char::from(value));
                    i += 2;
                }
                other => {
                    return Err(syntax("Unknown escape sequence", Some(&format!("\\{other}"))))
                }
            }
            i += 1;
            continue;
        }
        out.push(c);
        i += 1;
    }
    Err(syntax("Unterminated literal", None))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(line: &str) -> Vec<TokenKind> {
        tokenize_line(line)
            .unwrap()
            .into_iter()
            .map(|tok| tok.kind)
            .collect()
    }

    #[test]
    fn tokenizes_label_and_directive() {
        assert_eq!(
            kinds("start: .DW $10, gadget ; trailing comment"),
            vec![
                TokenKind::Ident("start".to_string()),
                TokenKind::Colon,
                TokenKind::Directive("dw".to_string()),
                TokenKind::Number(0x10),
                TokenKind::Comma,
                TokenKind::Ident("gadget".to_string()),
            ]
        );
    }

    #[test]
    fn dollar_alone_is_the_cursor() {
        assert_eq!(
            kinds("$ - base"),
            vec![
                TokenKind::Dollar,
                TokenKind::Op(BinaryOp::Subtract),
                TokenKind::Ident("base".to_string()),
            ]
        );
    }

    #[test]
    fn strings_and_chars_unescape() {
        assert_eq!(
            kinds(r#".str "a\"b\x41", 'z'"#),
            vec![
                TokenKind::Directive("str".to_string()),
                TokenKind::Str("a\"bA".to_string()),
                TokenKind::Comma,
                TokenKind::Number(u64::from(b'z')),
            ]
        );
    }

    #[test]
    fn shifts_need_both_characters() {
        assert_eq!(
            kinds("1 << 4"),
            vec![
                TokenKind::Number(1),
                TokenKind::Op(BinaryOp::Shl),
                TokenKind::Number(4),
            ]
        );
        let err = tokenize_line("1 < 4").unwrap_err();
        assert_eq!(err.kind(), AsmErrorKind::Syntax);
    }

    #[test]
    fn rejects_bad_literals() {
        assert_eq!(
            tokenize_line("12zz").unwrap_err().kind(),
            AsmErrorKind::Syntax
        );
        assert_eq!(
            tokenize_line("\"open").unwrap_err().kind(),
            AsmErrorKind::Syntax
        );
        assert_eq!(
            tokenize_line("'ab'").unwrap_err().kind(),
            AsmErrorKind::Syntax
        );
    }
}
