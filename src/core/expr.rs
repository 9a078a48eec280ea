// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Expression evaluation for script operands.
//!
//! Values are unsigned 64-bit; any arithmetic that would leave that range is
//! reported as a value overflow instead of wrapping.

use crate::core::assembler::error::{AsmError, AsmErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Multiply,
    Divide,
    Mod,
    Add,
    Subtract,
    Shl,
    Shr,
    BitAnd,
    BitXor,
    BitOr,
}

impl BinaryOp {
    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Mod => 5,
            BinaryOp::Add | BinaryOp::Subtract => 4,
            BinaryOp::Shl | BinaryOp::Shr => 3,
            BinaryOp::BitAnd => 2,
            BinaryOp::BitXor => 1,
            BinaryOp::BitOr => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Number(u64),
    Identifier(String),
    /// Current cursor.
    Dollar,
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

/// Context for expression evaluation.
pub trait EvalContext {
    /// Look up a name: bound parameters first, then labels.
    fn lookup_symbol(&mut self, name: &str) -> Result<u64, AsmError>;

    /// Get the current cursor (`$`).
    fn current_address(&self) -> u64;

    /// True once a value looked up so far is only a forward-reference
    /// placeholder. Arithmetic on such values wraps instead of failing.
    fn provisional(&self) -> bool {
        false
    }
}

/// Evaluate an expression to a numeric value.
pub fn eval_expr(expr: &Expr, ctx: &mut dyn EvalContext) -> Result<u64, AsmError> {
    match expr {
        Expr::Number(value) => Ok(*value),
        Expr::Identifier(name) => ctx.lookup_symbol(name),
        Expr::Dollar => Ok(ctx.current_address()),
        Expr::Not(inner) => Ok(!eval_expr(inner, ctx)?),
        Expr::Binary { op, left, right } => {
            let l = eval_expr(left, ctx)?;
            let r = eval_expr(right, ctx)?;
            if ctx.provisional() {
                Ok(apply_binary_wrapping(*op, l, r))
            } else {
                apply_binary(*op, l, r)
            }
        }
    }
}

pub fn apply_binary(op: BinaryOp, l: u64, r: u64) -> Result<u64, AsmError> {
    let overflow = || {
        AsmError::new(
            AsmErrorKind::ValueOverflow,
            "Expression result does not fit in 64 bits",
            None,
        )
    };
    match op {
        BinaryOp::Add => l.checked_add(r).ok_or_else(overflow),
        BinaryOp::Subtract => l.checked_sub(r).ok_or_else(|| {
            AsmError::new(
                AsmErrorKind::ValueOverflow,
                "Expression result is negative",
                Some(&format!("{l} - {r}")),
            )
        }),
        BinaryOp::Multiply => l.checked_mul(r).ok_or_else(overflow),
        BinaryOp::Divide => {
            if r == 0 {
                return Err(AsmError::new(AsmErrorKind::Syntax, "Division by zero", None));
            }
            Ok(l / r)
        }
        BinaryOp::Mod => {
            if r == 0 {
                return Err(AsmError::new(AsmErrorKind::Syntax, "Modulo by zero", None));
            }
            Ok(l % r)
        }
        BinaryOp::Shl => {
            if r >= 64 || (l << r) >> r != l {
                return Err(overflow());
            }
            Ok(l << r)
        }
        BinaryOp::Shr => Ok(if r >= 64 { 0 } else { l >> r }),
        BinaryOp::BitAnd => Ok(l & r),
        BinaryOp::BitXor => Ok(l ^ r),
        BinaryOp::BitOr => Ok(l | r),
    }
}

/// Unchecked counterpart of [`apply_binary`] for placeholder operands.
/// Division by zero yields 0.
pub fn apply_binary_wrapping(op: BinaryOp, l: u64, r: u64) -> u64 {
    match op {
        BinaryOp::Add => l.wrapping_add(r),
        BinaryOp::Subtract => l.wrapping_sub(r),
        BinaryOp::Multiply => l.wrapping_mul(r),
        BinaryOp::Divide => l.checked_div(r).unwrap_or(0),
        BinaryOp::Mod => l.checked_rem(r).unwrap_or(0),
        BinaryOp::Shl => l.checked_shl(r.min(64) as u32).unwrap_or(0),
        BinaryOp::Shr => l.checked_shr(r.min(64) as u32).unwrap_or(0),
        BinaryOp::BitAnd => l & r,
        BinaryOp::BitXor => l ^ r,
        BinaryOp::BitOr => l | r,
    }
}

/// Parse a number literal.
///
/// Supports decimal, `0x`/`$` hex, `0b` binary and `0o` octal, with `_`
/// as a visual separator.
pub fn parse_number(text: &str) -> Option<u64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let text: String = text.chars().filter(|&c| c != '_').collect();
    let text = text.as_str();

    let (digits, radix) = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        (hex, 16)
    } else if let Some(hex) = text.strip_prefix('$') {
        (hex, 16)
    } else if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        (bin, 2)
    } else if let Some(oct) = text.strip_prefix("0o").or_else(|| text.strip_prefix("0O")) {
        (oct, 8)
    } else {
        (text, 10)
    };
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, radix).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    struct FixedContext {
        here: u64,
    }

    impl EvalContext for FixedContext {
        fn lookup_symbol(&mut self, name: &str) -> Result<u64, AsmError> {
            match name {
                "base" => Ok(0x1000),
                _ => Err(AsmError::new(
                    AsmErrorKind::UndefinedSymbol,
                    "Trying to use an undefined label",
                    Some(name),
                )),
            }
        }

        fn current_address(&self) -> u64 {
            self.here
        }
    }

    fn num(value: u64) -> Box<Expr> {
        Box::new(Expr::Number(value))
    }

    #[test]
    fn parse_number_forms() {
        assert_eq!(parse_number("42"), Some(42));
        assert_eq!(parse_number("0x2A"), Some(42));
        assert_eq!(parse_number("$2a"), Some(42));
        assert_eq!(parse_number("0b101010"), Some(42));
        assert_eq!(parse_number("0o52"), Some(42));
        assert_eq!(parse_number("0xFF_FF"), Some(0xffff));
        assert_eq!(parse_number("0x"), None);
        assert_eq!(parse_number("12ab"), None);
        assert_eq!(parse_number("0x1_0000_0000_0000_0000"), None);
    }

    #[test]
    fn evaluates_identifiers_and_dollar() {
        let mut ctx = FixedContext { here: 8 };
        let expr = Expr::Binary {
            op: BinaryOp::Add,
            left: Box::new(Expr::Identifier("base".to_string())),
            right: Box::new(Expr::Dollar),
        };
        assert_eq!(eval_expr(&expr, &mut ctx).unwrap(), 0x1008);
        let missing = Expr::Identifier("nope".to_string());
        assert_eq!(
            eval_expr(&missing, &mut ctx).unwrap_err().kind(),
            AsmErrorKind::UndefinedSymbol
        );
    }

    #[test]
    fn arithmetic_is_checked() {
        let mut ctx = FixedContext { here: 0 };
        let negative = Expr::Binary {
            op: BinaryOp::Subtract,
            left: num(1),
            right: num(2),
        };
        assert_eq!(
            eval_expr(&negative, &mut ctx).unwrap_err().kind(),
            AsmErrorKind::ValueOverflow
        );
        assert_eq!(
            apply_binary(BinaryOp::Shl, 1, 64).unwrap_err().kind(),
            AsmErrorKind::ValueOverflow
        );
        assert_eq!(
            apply_binary(BinaryOp::Divide, 1, 0).unwrap_err().kind(),
            AsmErrorKind::Syntax
        );
        assert_eq!(apply_binary(BinaryOp::Shr, 0x80, 4).unwrap(), 0x8);
        let not = Expr::Not(num(0));
        assert_eq!(eval_expr(&not, &mut ctx).unwrap(), u64::MAX);
    }

    struct SizingContext {
        forward: bool,
    }

    impl EvalContext for SizingContext {
        fn lookup_symbol(&mut self, name: &str) -> Result<u64, AsmError> {
            if name == "later" {
                self.forward = true;
            }
            Ok(0)
        }

        fn current_address(&self) -> u64 {
            0
        }

        fn provisional(&self) -> bool {
            self.forward
        }
    }

    #[test]
    fn placeholder_arithmetic_wraps() {
        let offset = Expr::Binary {
            op: BinaryOp::Subtract,
            left: Box::new(Expr::Identifier("later".to_string())),
            right: num(4),
        };
        let mut ctx = SizingContext { forward: false };
        assert_eq!(eval_expr(&offset, &mut ctx).unwrap(), 0u64.wrapping_sub(4));

        let known = Expr::Binary {
            op: BinaryOp::Subtract,
            left: Box::new(Expr::Identifier("known".to_string())),
            right: num(4),
        };
        let mut ctx = SizingContext { forward: false };
        assert_eq!(
            eval_expr(&known, &mut ctx).unwrap_err().kind(),
            AsmErrorKind::ValueOverflow
        );
        assert_eq!(apply_binary_wrapping(BinaryOp::Divide, 7, 0), 0);
        assert_eq!(apply_binary_wrapping(BinaryOp::Shl, 1, 64), 0);
        assert_eq!(apply_binary_wrapping(BinaryOp::Shr, 0x80, 4), 0x8);
    }

    proptest! {
        #[test]
        fn parse_number_decimal_round_trip(value in any::<u64>()) {
            prop_assert_eq!(parse_number(&value.to_string()), Some(value));
        }

        #[test]
        fn parse_number_hex_round_trip(value in any::<u64>()) {
            let text = format!("0x{:X}", value);
            prop_assert_eq!(parse_number(&text), Some(value));
        }
    }
}
