// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Operand expression evaluation.
//!
//! Expressions are evaluated directly from the token stream with a
//! recursive-descent precedence climber. Every intermediate value carries
//! its numeric tag (`Int` or `Real`) so that operators which only admit
//! integers can reject real operands instead of silently coercing.

use crate::scanner::{Op, Token, TokenKind};

/// A tagged scalar: the only value type that flows through expressions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i64),
    Real(f64),
}

impl Value {
    pub fn as_real(self) -> f64 {
        match self {
            Value::Int(i) => i as f64,
            Value::Real(r) => r,
        }
    }

    /// Integer view of the value, accepting whole-valued reals.
    pub fn whole(self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(i),
            Value::Real(r) => {
                if r.is_finite() && r.fract() == 0.0 && r >= i64::MIN as f64 && r <= i64::MAX as f64
                {
                    Some(r as i64)
                } else {
                    None
                }
            }
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
        }
    }
}

/// Error returned from expression evaluation.
#[derive(Debug, Clone)]
pub struct EvalError {
    pub message: String,
    pub line: u32,
}

impl EvalError {
    pub fn new(message: impl Into<String>, line: u32) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for EvalError {}

/// Context for expression evaluation: resolves identifier atoms.
pub trait EvalContext {
    fn resolve(&self, name: &str) -> Option<Value>;
}

/// Recursive-descent evaluator over a shared token cursor.
///
/// The caller hands in the token slice and starting position; after a
/// successful evaluation `pos()` points at the first token that is not
/// part of the expression (an `ARGSEP`, `EOL`, label, or similar).
pub struct ExprEval<'a> {
    tokens: &'a [Token],
    pos: usize,
    ctx: &'a dyn EvalContext,
}

impl<'a> ExprEval<'a> {
    pub fn new(tokens: &'a [Token], pos: usize, ctx: &'a dyn EvalContext) -> Self {
        Self { tokens, pos, ctx }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn eval(&mut self) -> Result<Value, EvalError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Value, EvalError> {
        let mut acc = self.xor_expr()?;
        while let Some(op) = self.take_op(&[Op::Or]) {
            let line = self.prev_line();
            let rhs = self.xor_expr()?;
            acc = apply_binary(op, acc, rhs, line)?;
        }
        Ok(acc)
    }

    fn xor_expr(&mut self) -> Result<Value, EvalError> {
        let mut acc = self.and_expr()?;
        while let Some(op) = self.take_op(&[Op::Xor]) {
            let line = self.prev_line();
            let rhs = self.and_expr()?;
            acc = apply_binary(op, acc, rhs, line)?;
        }
        Ok(acc)
    }

    fn and_expr(&mut self) -> Result<Value, EvalError> {
        let mut acc = self.shift_expr()?;
        while let Some(op) = self.take_op(&[Op::And]) {
            let line = self.prev_line();
            let rhs = self.shift_expr()?;
            acc = apply_binary(op, acc, rhs, line)?;
        }
        Ok(acc)
    }

    fn shift_expr(&mut self) -> Result<Value, EvalError> {
        let mut acc = self.add_expr()?;
        while let Some(op) = self.take_op(&[Op::Shl, Op::Shr]) {
            let line = self.prev_line();
            let rhs = self.add_expr()?;
            acc = apply_binary(op, acc, rhs, line)?;
        }
        Ok(acc)
    }

    fn add_expr(&mut self) -> Result<Value, EvalError> {
        let mut acc = self.mul_expr()?;
        while let Some(op) = self.take_op(&[Op::Plus, Op::Minus]) {
            let line = self.prev_line();
            let rhs = self.mul_expr()?;
            acc = apply_binary(op, acc, rhs, line)?;
        }
        Ok(acc)
    }

    fn mul_expr(&mut self) -> Result<Value, EvalError> {
        let mut acc = self.unary_expr()?;
        while let Some(op) = self.take_op(&[Op::Mul, Op::Div, Op::IntDiv]) {
            let line = self.prev_line();
            let rhs = self.unary_expr()?;
            acc = apply_binary(op, acc, rhs, line)?;
        }
        Ok(acc)
    }

    fn unary_expr(&mut self) -> Result<Value, EvalError> {
        if let Some(op) = self.take_op(&[Op::Plus, Op::Minus, Op::BitNot, Op::Int]) {
            let line = self.prev_line();
            let val = self.unary_expr()?;
            return apply_unary(op, val, line);
        }
        self.power()
    }

    fn power(&mut self) -> Result<Value, EvalError> {
        let base = self.atom()?;
        if self.take_op(&[Op::Pow]).is_some() {
            let line = self.prev_line();
            // Right-associative: unary operators are admitted in the
            // exponent, and chained ** groups to the right.
            let exp = self.unary_expr()?;
            return apply_binary(Op::Pow, base, exp, line);
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Value, EvalError> {
        let token = self.cur().clone();
        match token.kind {
            TokenKind::Operator(Op::OpenParen) => {
                self.pos += 1;
                let val = self.or_expr()?;
                let close = self.cur();
                if close.kind == TokenKind::Operator(Op::CloseParen) {
                    self.pos += 1;
                    Ok(val)
                } else {
                    Err(EvalError::new(
                        format!(
                            "Expected ')' but saw {} {}",
                            close.kind.describe(),
                            close.text
                        ),
                        close.line,
                    ))
                }
            }
            TokenKind::Integer(i) => {
                self.pos += 1;
                Ok(Value::Int(i))
            }
            TokenKind::Float(f) => {
                self.pos += 1;
                Ok(Value::Real(f))
            }
            TokenKind::Name => match self.ctx.resolve(&token.text) {
                Some(val) => {
                    self.pos += 1;
                    Ok(val)
                }
                None => Err(EvalError::new(
                    format!("Undefined label {}", token.text),
                    token.line,
                )),
            },
            _ => Err(EvalError::new(
                format!(
                    "Unexpected {} {} in expression",
                    token.kind.describe(),
                    token.text.escape_default()
                ),
                token.line,
            )),
        }
    }

    fn cur(&self) -> &Token {
        // tokenize() guarantees a trailing Eof token.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn prev_line(&self) -> u32 {
        self.tokens[self.pos.saturating_sub(1).min(self.tokens.len() - 1)].line
    }

    fn take_op(&mut self, ops: &[Op]) -> Option<Op> {
        if let TokenKind::Operator(op) = self.cur().kind {
            if ops.contains(&op) {
                self.pos += 1;
                return Some(op);
            }
        }
        None
    }
}

/// Apply a unary operator to a value.
pub fn apply_unary(op: Op, val: Value, line: u32) -> Result<Value, EvalError> {
    match op {
        Op::Plus => Ok(val),
        Op::Minus => Ok(match val {
            Value::Int(i) => Value::Int(i.wrapping_neg()),
            Value::Real(r) => Value::Real(-r),
        }),
        Op::BitNot => match val {
            Value::Int(i) => Ok(Value::Int(!i)),
            Value::Real(_) => Err(EvalError::new("Integer operand required for '~'", line)),
        },
        Op::Int => match val {
            Value::Int(_) => Ok(val),
            Value::Real(r) => {
                if r.is_finite() {
                    Ok(Value::Int(r.round() as i64))
                } else {
                    Err(EvalError::new("Invalid operand for 'int'", line))
                }
            }
        },
        _ => Err(EvalError::new(
            format!("Invalid unary operator '{}'", op_symbol(op)),
            line,
        )),
    }
}

/// Apply a binary operator to two values.
pub fn apply_binary(op: Op, l: Value, r: Value, line: u32) -> Result<Value, EvalError> {
    use Value::{Int, Real};
    match op {
        Op::Or | Op::Xor | Op::And => match (l, r) {
            (Int(a), Int(b)) => Ok(Int(match op {
                Op::Or => a | b,
                Op::Xor => a ^ b,
                _ => a & b,
            })),
            _ => Err(type_error(op, line)),
        },
        Op::Shl | Op::Shr => match (l, r) {
            (Int(a), Int(b)) => {
                if b < 0 {
                    return Err(EvalError::new("Negative shift count", line));
                }
                if b > 63 {
                    return Err(EvalError::new(
                        format!("Shift count {b} out of range"),
                        line,
                    ));
                }
                Ok(Int(if op == Op::Shl {
                    a.wrapping_shl(b as u32)
                } else {
                    a.wrapping_shr(b as u32)
                }))
            }
            _ => Err(type_error(op, line)),
        },
        Op::Plus => Ok(match (l, r) {
            (Int(a), Int(b)) => Int(a.wrapping_add(b)),
            _ => Real(l.as_real() + r.as_real()),
        }),
        Op::Minus => Ok(match (l, r) {
            (Int(a), Int(b)) => Int(a.wrapping_sub(b)),
            _ => Real(l.as_real() - r.as_real()),
        }),
        Op::Mul => Ok(match (l, r) {
            (Int(a), Int(b)) => Int(a.wrapping_mul(b)),
            _ => Real(l.as_real() * r.as_real()),
        }),
        Op::Div => {
            let divisor = r.as_real();
            if divisor == 0.0 {
                return Err(EvalError::new("Division by zero", line));
            }
            Ok(Real(l.as_real() / divisor))
        }
        Op::IntDiv => match (l, r) {
            (Int(a), Int(b)) => {
                if b == 0 {
                    return Err(EvalError::new("Division by zero", line));
                }
                Ok(Int(floor_div(a, b)))
            }
            _ => Err(type_error(op, line)),
        },
        Op::Pow => match (l, r) {
            (Int(a), Int(b)) if b >= 0 => {
                if b > u32::MAX as i64 {
                    return Err(EvalError::new(
                        "Exponent out of range for integer power",
                        line,
                    ));
                }
                Ok(Int(a.wrapping_pow(b as u32)))
            }
            _ => {
                let val = l.as_real().powf(r.as_real());
                if val.is_nan() {
                    // Fractional power of a negative base.
                    Err(EvalError::new("Invalid expression", line))
                } else {
                    Ok(Real(val))
                }
            }
        },
        _ => Err(EvalError::new(
            format!("Invalid binary operator '{}'", op_symbol(op)),
            line,
        )),
    }
}

fn type_error(op: Op, line: u32) -> EvalError {
    EvalError::new(
        format!("Integer operands required for '{}'", op_symbol(op)),
        line,
    )
}

fn op_symbol(op: Op) -> &'static str {
    match op {
        Op::Or => "|",
        Op::Xor => "^",
        Op::And => "&",
        Op::Shl => "<<",
        Op::Shr => ">>",
        Op::Plus => "+",
        Op::Minus => "-",
        Op::Mul => "*",
        Op::Div => "/",
        Op::IntDiv => "//",
        Op::Pow => "**",
        Op::BitNot => "~",
        Op::Int => "int",
        Op::OpenParen => "(",
        Op::CloseParen => ")",
    }
}

fn floor_div(a: i64, b: i64) -> i64 {
    let q = a.wrapping_div(b);
    let r = a.wrapping_rem(b);
    if r != 0 && (r < 0) != (b < 0) {
        q - 1
    } else {
        q
    }
}
