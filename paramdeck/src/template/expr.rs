//! Formula lexer, AST, parser, and evaluator.
//!
//! Formulas are numeric-only infix arithmetic over bound variables:
//! `+ - * / ^`, parentheses, unary sign, numeric literals (`4.49988E-02`),
//! bare identifiers, and a handful of math functions.
//!
//! Operator precedence (lowest → highest):
//!   additive  →  multiplicative  →  unary  →  power  →  primary
//!
//! `^` is right-associative and binds tighter than unary minus, so `-2^2`
//! is `-4` and `2^3^2` is `2^9`.

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;
use thiserror::Error;

use crate::value::Value;

// ── Lookup ────────────────────────────────────────────────────────────────────

/// Read-only view of variable bindings used by the evaluator.
pub trait Lookup {
    fn lookup(&self, name: &str) -> Option<Value>;
}

impl Lookup for HashMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl Lookup for BTreeMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl Lookup for IndexMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl<L: Lookup + ?Sized> Lookup for &L {
    fn lookup(&self, name: &str) -> Option<Value> {
        (**self).lookup(name)
    }
}

/// Consult `first`, then `second`.
pub struct Layered<'a, A: ?Sized, B: ?Sized> {
    pub first: &'a A,
    pub second: &'a B,
}

impl<A: Lookup + ?Sized, B: Lookup + ?Sized> Lookup for Layered<'_, A, B> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.first.lookup(name).or_else(|| self.second.lookup(name))
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Failure to parse or evaluate a formula.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("unbound reference '{0}'")]
    UnboundReference(String),
    #[error("arithmetic error: {0}")]
    Arithmetic(String),
    #[error("'{name}' is bound to non-numeric value {value:?}")]
    NonNumeric { name: String, value: String },
}

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Comma,
    LParen,
    RParen,
    Eof,
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Lexer {
            src: src.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.src.get(self.pos + 1).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn eat_digits(&mut self) {
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
    }

    fn read_number(&mut self, start: usize) -> Result<Token, EvalError> {
        let mut is_float = self.src[start] == b'.';
        self.eat_digits();
        if !is_float && self.peek() == Some(b'.') {
            is_float = true;
            self.pos += 1;
            self.eat_digits();
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let exp_digit_at = match self.peek2() {
                Some(b'+' | b'-') => self.pos + 2,
                _ => self.pos + 1,
            };
            if matches!(self.src.get(exp_digit_at), Some(b'0'..=b'9')) {
                is_float = true;
                self.pos = exp_digit_at;
                self.eat_digits();
            }
        }

        let text = std::str::from_utf8(&self.src[start..self.pos])
            .map_err(|e| EvalError::Syntax(e.to_string()))?;
        if !is_float {
            if let Ok(n) = text.parse::<i64>() {
                return Ok(Token::Int(n));
            }
        }
        text.parse::<f64>()
            .map(Token::Float)
            .map_err(|_| EvalError::Syntax(format!("bad number '{text}'")))
    }

    fn read_ident(&mut self, start: usize) -> Token {
        while matches!(
            self.peek(),
            Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_')
        ) {
            self.pos += 1;
        }
        Token::Ident(String::from_utf8_lossy(&self.src[start..self.pos]).into_owned())
    }

    fn next_token(&mut self) -> Result<Token, EvalError> {
        self.skip_ws();
        let start = self.pos;
        let Some(ch) = self.peek() else {
            return Ok(Token::Eof);
        };
        self.pos += 1;

        Ok(match ch {
            b'0'..=b'9' => self.read_number(start)?,
            b'.' if matches!(self.peek(), Some(b'0'..=b'9')) => self.read_number(start)?,
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.read_ident(start),
            b'+' => Token::Plus,
            b'-' => Token::Minus,
            b'*' => {
                // Fortran/Python-style `**` is accepted as a power operator.
                if self.peek() == Some(b'*') {
                    self.pos += 1;
                    Token::Caret
                } else {
                    Token::Star
                }
            }
            b'/' => Token::Slash,
            b'^' => Token::Caret,
            b',' => Token::Comma,
            b'(' => Token::LParen,
            b')' => Token::RParen,
            _ => {
                let rest = String::from_utf8_lossy(&self.src[start..]);
                let c = rest.chars().next().unwrap_or('?');
                return Err(EvalError::Syntax(format!("unexpected character '{c}'")));
            }
        })
    }

    fn tokenize(mut self) -> Result<Vec<Token>, EvalError> {
        let mut tokens = Vec::new();
        loop {
            let t = self.next_token()?;
            let done = matches!(t, Token::Eof);
            tokens.push(t);
            if done {
                break;
            }
        }
        Ok(tokens)
    }
}

// ── AST ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

impl Expr {
    /// Identifiers referenced by the expression, in order of appearance.
    pub fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_refs(&mut out);
        out
    }

    fn collect_refs<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Var(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Expr::Neg(inner) => inner.collect_refs(out),
            Expr::Binary(_, l, r) => {
                l.collect_refs(out);
                r.collect_refs(out);
            }
            Expr::Call(_, args) => args.iter().for_each(|a| a.collect_refs(out)),
        }
    }
}

// ── Parser ────────────────────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        t
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    // ── Grammar ───────────────────────────────────────────────────────────────

    fn parse_additive(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        match self.peek() {
            Token::Minus => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            Token::Plus => {
                self.pos += 1;
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr, EvalError> {
        let base = self.parse_primary()?;
        if self.eat(&Token::Caret) {
            // Right operand re-enters at unary level: `2^-1`, `2^3^2`.
            let exp = self.parse_unary()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        match self.advance() {
            Token::Int(n) => Ok(Expr::Literal(Value::Int(n))),
            Token::Float(x) => Ok(Expr::Literal(Value::Float(x))),
            Token::Ident(name) => {
                if !self.eat(&Token::LParen) {
                    return Ok(Expr::Var(name));
                }
                let mut args = Vec::new();
                if self.peek() != &Token::RParen {
                    args.push(self.parse_additive()?);
                    while self.eat(&Token::Comma) {
                        args.push(self.parse_additive()?);
                    }
                }
                if !self.eat(&Token::RParen) {
                    return Err(EvalError::Syntax(format!(
                        "expected ')' after arguments to {name}"
                    )));
                }
                check_arity(&name, args.len())?;
                Ok(Expr::Call(name, args))
            }
            Token::LParen => {
                let inner = self.parse_additive()?;
                if !self.eat(&Token::RParen) {
                    return Err(EvalError::Syntax("expected ')'".into()));
                }
                Ok(inner)
            }
            Token::Eof => Err(EvalError::Syntax("unexpected end of formula".into())),
            other => Err(EvalError::Syntax(format!("unexpected token {other:?}"))),
        }
    }
}

/// Parse a formula into an AST.
pub fn parse_expr(src: &str) -> Result<Expr, EvalError> {
    let tokens = Lexer::new(src).tokenize()?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_additive()?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        other => Err(EvalError::Syntax(format!("unexpected trailing {other:?}"))),
    }
}

// ── Functions ─────────────────────────────────────────────────────────────────

fn arity(name: &str) -> Option<usize> {
    Some(match name {
        "abs" | "sqrt" | "exp" | "ln" | "log" | "log10" | "sin" | "cos" | "tan" => 1,
        "min" | "max" | "pow" => 2,
        _ => return None,
    })
}

fn check_arity(name: &str, got: usize) -> Result<(), EvalError> {
    match arity(name) {
        None => Err(EvalError::Syntax(format!("unknown function '{name}'"))),
        Some(n) if n != got => Err(EvalError::Syntax(format!(
            "{name}() takes {n} argument(s), got {got}"
        ))),
        Some(_) => Ok(()),
    }
}

fn call_fn(name: &str, args: &[Value]) -> Result<Value, EvalError> {
    check_arity(name, args.len())?;
    let arg = |i: usize| {
        args.get(i)
            .ok_or_else(|| EvalError::Syntax(format!("{name}() is missing argument {}", i + 1)))
    };
    let x = |i: usize| arg(i).map(|v| v.as_number().unwrap_or(0.0));
    Ok(match name {
        "abs" => match arg(0)? {
            Value::Int(n) => n.checked_abs().map(Value::Int).unwrap_or(Value::Float(x(0)?.abs())),
            _ => Value::Float(x(0)?.abs()),
        },
        "sqrt" => Value::Float(x(0)?.sqrt()),
        "exp" => Value::Float(x(0)?.exp()),
        "ln" | "log" => Value::Float(x(0)?.ln()),
        "log10" => Value::Float(x(0)?.log10()),
        "sin" => Value::Float(x(0)?.sin()),
        "cos" => Value::Float(x(0)?.cos()),
        "tan" => Value::Float(x(0)?.tan()),
        "min" => {
            let (a, b) = (arg(0)?, arg(1)?);
            if x(0)? <= x(1)? {
                a.clone()
            } else {
                b.clone()
            }
        }
        "max" => {
            let (a, b) = (arg(0)?, arg(1)?);
            if x(0)? >= x(1)? {
                a.clone()
            } else {
                b.clone()
            }
        }
        "pow" => arg(0)?.arith_pow(arg(1)?),
        _ => return Err(EvalError::Syntax(format!("unknown function '{name}'"))),
    })
}

// ── Evaluator ─────────────────────────────────────────────────────────────────

/// Evaluate an [`Expr`] AST node against `bindings`.
pub fn eval_expr<L: Lookup + ?Sized>(expr: &Expr, bindings: &L) -> Result<Value, EvalError> {
    let v = match expr {
        Expr::Literal(v) => v.clone(),

        Expr::Var(name) => {
            let bound = bindings
                .lookup(name)
                .ok_or_else(|| EvalError::UnboundReference(name.clone()))?;
            bound.to_numeric().ok_or_else(|| EvalError::NonNumeric {
                name: name.clone(),
                value: bound.to_string(),
            })?
        }

        Expr::Neg(inner) => eval_expr(inner, bindings)?.arith_neg(),

        Expr::Binary(op, lhs, rhs) => {
            let l = eval_expr(lhs, bindings)?;
            let r = eval_expr(rhs, bindings)?;
            match op {
                BinOp::Add => l.arith_add(&r),
                BinOp::Sub => l.arith_sub(&r),
                BinOp::Mul => l.arith_mul(&r),
                BinOp::Div => l.arith_div(&r).map_err(EvalError::Arithmetic)?,
                BinOp::Pow => l.arith_pow(&r),
            }
        }

        Expr::Call(name, arg_exprs) => {
            let mut args = Vec::with_capacity(arg_exprs.len());
            for ae in arg_exprs {
                args.push(eval_expr(ae, bindings)?);
            }
            call_fn(name, &args)?
        }
    };
    if v.is_non_finite() {
        return Err(EvalError::Arithmetic(format!("non-finite result {v}")));
    }
    Ok(v)
}

/// Convenience: parse and evaluate a formula.
pub fn evaluate<L: Lookup + ?Sized>(src: &str, bindings: &L) -> Result<Value, EvalError> {
    let expr = parse_expr(src)?;
    eval_expr(&expr, bindings)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
