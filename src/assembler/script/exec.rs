// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Statement executor: turns parsed statements into builder calls.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use super::parser::{MacroTable, PopMacroDef, Statement, StatementKind};
use crate::assembler::builder::{Builder, PopBody};
use crate::core::assembler::error::{AsmError, AsmErrorKind};
use crate::core::expr::{eval_expr, EvalContext, Expr};
use crate::core::pop_resolver::{Register, RegisterValues};

/// Deepest allowed nesting of macro and pop macro calls.
pub const MAX_MACRO_DEPTH: usize = 64;

/// An evaluated expression. `provisional` marks a value computed from a
/// forward reference during sizing; it is a placeholder until emission.
#[derive(Debug, Clone, Copy)]
pub struct Operand {
    value: u64,
    provisional: bool,
}

impl Operand {
    fn known(value: u64) -> Self {
        Self {
            value,
            provisional: false,
        }
    }

    /// Value for uses that do not move the cursor. Placeholders read as 0.
    fn or_placeholder(self) -> u64 {
        if self.provisional {
            0
        } else {
            self.value
        }
    }
}

/// Names bound for the body being executed.
#[derive(Debug, Default)]
pub struct Env {
    bindings: HashMap<String, Operand>,
}

impl Env {
    fn bind(&mut self, name: &str, operand: Operand) {
        self.bindings.insert(name.to_string(), operand);
    }

    fn get(&self, name: &str) -> Option<Operand> {
        self.bindings.get(name).copied()
    }
}

struct ExprContext<'a> {
    builder: &'a mut Builder,
    env: &'a Env,
    provisional: bool,
}

impl EvalContext for ExprContext<'_> {
    fn lookup_symbol(&mut self, name: &str) -> Result<u64, AsmError> {
        if let Some(operand) = self.env.get(name) {
            self.provisional |= operand.provisional;
            return Ok(operand.value);
        }
        let pending = self.builder.pending_references();
        let address = self.builder.get_label(name)?;
        if self.builder.pending_references() > pending {
            self.provisional = true;
        }
        Ok(u64::from(address))
    }

    fn current_address(&self) -> u64 {
        self.builder.cursor()
    }

    fn provisional(&self) -> bool {
        self.provisional
    }
}

#[derive(Clone)]
pub struct Executor {
    macros: Rc<MacroTable>,
    depth: Rc<Cell<usize>>,
}

impl Executor {
    pub fn new(macros: Rc<MacroTable>) -> Self {
        Self {
            macros,
            depth: Rc::new(Cell::new(0)),
        }
    }

    pub fn exec_block(
        &self,
        builder: &mut Builder,
        statements: &[Statement],
        env: &Env,
    ) -> Result<(), AsmError> {
        for statement in statements {
            self.exec_statement(builder, statement, env)
                .map_err(|err| err.with_location(statement.location.clone()))?;
        }
        Ok(())
    }

    fn eval(&self, builder: &mut Builder, expr: &Expr, env: &Env) -> Result<Operand, AsmError> {
        let mut ctx = ExprContext {
            builder,
            env,
            provisional: false,
        };
        let value = eval_expr(expr, &mut ctx)?;
        Ok(Operand {
            value,
            provisional: ctx.provisional,
        })
    }

    /// Evaluate an operand that decides the chain layout. It has to be known
    /// during sizing, so forward references are refused.
    fn eval_layout(
        &self,
        builder: &mut Builder,
        expr: &Expr,
        env: &Env,
        directive: &str,
    ) -> Result<u64, AsmError> {
        let operand = self.eval(builder, expr, env)?;
        if operand.provisional {
            return Err(AsmError::new(
                AsmErrorKind::ForwardReference,
                "Operand refers to a label defined later",
                Some(directive),
            ));
        }
        Ok(operand.value)
    }

    fn eval_usize(
        &self,
        builder: &mut Builder,
        expr: &Expr,
        env: &Env,
        directive: &str,
    ) -> Result<usize, AsmError> {
        let value = self.eval_layout(builder, expr, env, directive)?;
        usize::try_from(value).map_err(|_| {
            AsmError::new(
                AsmErrorKind::ValueOverflow,
                "Value too large",
                Some(&value.to_string()),
            )
        })
    }

    fn exec_statement(
        &self,
        builder: &mut Builder,
        statement: &Statement,
        env: &Env,
    ) -> Result<(), AsmError> {
        match &statement.kind {
            StatementKind::Label { name, address } => {
                let address = match address {
                    Some(expr) => Some(self.eval_layout(builder, expr, env, ".label")?),
                    None => None,
                };
                builder.define_label(name, address)
            }
            StatementKind::Data { width, values } => {
                for expr in values {
                    let value = self.eval(builder, expr, env)?.or_placeholder();
                    match width {
                        1 => builder.add_byte(value)?,
                        2 => builder.add_halfword(value)?,
                        _ => builder.add_word(value)?,
                    };
                }
                Ok(())
            }
            StatementKind::Value { width, value } => {
                let width = self.eval_usize(builder, width, env, ".value")?;
                let value = self.eval(builder, value, env)?.or_placeholder();
                builder.add_value(value, width)?;
                Ok(())
            }
            StatementKind::Text { text, encoding } => {
                builder.add_string(text, encoding)?;
                Ok(())
            }
            StatementKind::Raw(values) => {
                let mut bytes = Vec::with_capacity(values.len());
                for expr in values {
                    let value = self.eval(builder, expr, env)?.or_placeholder();
                    let byte = u8::try_from(value).map_err(|_| {
                        AsmError::new(
                            AsmErrorKind::ValueOverflow,
                            "Raw byte out of range",
                            Some(&format!("${value:X}")),
                        )
                    })?;
                    bytes.push(byte);
                }
                builder.append_raw(&bytes)?;
                Ok(())
            }
            StatementKind::IncBin(path) => {
                builder.include_binary(path)?;
                Ok(())
            }
            StatementKind::Org(expr) => {
                let value = self.eval_layout(builder, expr, env, ".org")?;
                let address = u32::try_from(value).map_err(|_| {
                    AsmError::new(
                        AsmErrorKind::InvalidAddress,
                        "Origin should be 32 bits long",
                        Some(&format!("${value:X}")),
                    )
                })?;
                builder.set_origin(address)
            }
            StatementKind::Align(expr) => {
                let multiple = self.eval_layout(builder, expr, env, ".align")?;
                builder.align(multiple)
            }
            StatementKind::Fill { size, value, width } => {
                let size = self.eval_layout(builder, size, env, ".fill")?;
                let value = self.eval(builder, value, env)?.or_placeholder();
                let width = match width {
                    Some(expr) => self.eval_usize(builder, expr, env, ".fill")?,
                    None => 1,
                };
                builder.fill(size, value, width)
            }
            StatementKind::Area { budget, body } => {
                let budget = self.eval(builder, budget, env)?.or_placeholder();
                builder.with_area(budget, |builder| self.exec_block(builder, body, env))
            }
            StatementKind::PopMacro(def) => self.register_pop_macro(builder, def),
            StatementKind::Pop(assignments) => {
                let mut values = Vec::with_capacity(assignments.len());
                for (reg, expr) in assignments {
                    let value = self.eval(builder, expr, env)?.or_placeholder();
                    values.push((reg.as_str(), value));
                }
                builder.pop(&values)
            }
            StatementKind::Invoke { name, args } => self.invoke(builder, name, args, env),
        }
    }

    fn invoke(
        &self,
        builder: &mut Builder,
        name: &str,
        args: &[Expr],
        env: &Env,
    ) -> Result<(), AsmError> {
        let Some(def) = self.macros.get(name).cloned() else {
            return Err(AsmError::new(
                AsmErrorKind::UndefinedSymbol,
                "Unknown macro",
                Some(name),
            ));
        };
        if args.len() != def.params.len() {
            return Err(AsmError::new(
                AsmErrorKind::Syntax,
                "Wrong number of macro arguments",
                Some(&format!("{name} expects {}, got {}", def.params.len(), args.len())),
            ));
        }
        let mut inner = Env::default();
        for (param, arg) in def.params.iter().zip(args) {
            let value = self.eval(builder, arg, env)?;
            inner.bind(param, value);
        }
        self.nested(name, || {
            builder.with_macro(&def.name, |builder| {
                self.exec_block(builder, &def.body, &inner)
            })
        })
    }

    fn register_pop_macro(
        &self,
        builder: &mut Builder,
        def: &Rc<PopMacroDef>,
    ) -> Result<(), AsmError> {
        let exec = self.clone();
        let def_ref = Rc::clone(def);
        let body: PopBody = Rc::new(move |builder: &mut Builder, values: &RegisterValues| {
            let mut env = Env::default();
            for name in &def_ref.registers {
                let value = Register::parse(name)
                    .and_then(|reg| values.get(reg))
                    .unwrap_or(0);
                env.bind(name, Operand::known(value));
            }
            exec.nested(&def_ref.name, || {
                builder.with_macro(&def_ref.name, |builder| {
                    exec.exec_block(builder, &def_ref.body, &env)
                })
            })
        });
        builder.register_pop_macro(&def.name, &def.registers, body)?;
        Ok(())
    }

    /// Run `body` one macro level deeper, rejecting runaway recursion.
    fn nested<T>(
        &self,
        name: &str,
        body: impl FnOnce() -> Result<T, AsmError>,
    ) -> Result<T, AsmError> {
        let depth = self.depth.get();
        if depth >= MAX_MACRO_DEPTH {
            return Err(AsmError::new(
                AsmErrorKind::Syntax,
                "Macro expansion nested too deeply",
                Some(name),
            ));
        }
        self.depth.set(depth + 1);
        let result = body();
        self.depth.set(depth);
        result
    }
}
