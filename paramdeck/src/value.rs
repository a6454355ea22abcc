//! Scalar values bound to template variables and produced by extraction.
//!
//! A value is a number or a string.  Numbers keep the integer/float
//! distinction of their source text so that `8` compiles back to `8` and
//! `8.5` to `8.5`.

use std::fmt;

/// A scalar bound to a variable, produced by a formula, or extracted from a
/// report.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Default for Value {
    fn default() -> Self {
        Value::Int(0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => {
                // Integral floats keep a `.0` or an exponent so the deck
                // still reads them as reals.
                if x.fract() != 0.0 {
                    write!(f, "{x}")
                } else if x.abs() < 1e15 {
                    write!(f, "{x:.1}")
                } else {
                    write!(f, "{x:e}")
                }
            }
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

impl Value {
    /// Parse literal template text: integer, then float, then plain string.
    ///
    /// Only numeric-looking text becomes a number, so `nan` or `inf` stay
    /// strings even though `f64::from_str` would accept them.
    pub fn parse_literal(s: &str) -> Value {
        let t = s.trim();
        if !looks_numeric(t) {
            return Value::Str(s.to_owned());
        }
        if let Ok(n) = t.parse::<i64>() {
            Value::Int(n)
        } else if let Ok(x) = t.parse::<f64>() {
            Value::Float(x)
        } else {
            Value::Str(s.to_owned())
        }
    }

    /// Numeric view of the value, if it has one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            Value::Str(s) => match Value::parse_literal(s) {
                Value::Int(n) => Some(n as f64),
                Value::Float(x) => Some(x),
                Value::Str(_) => None,
            },
        }
    }

    /// Like [`as_number`](Self::as_number) but keeps integers integral.
    pub fn to_numeric(&self) -> Option<Value> {
        match self {
            Value::Int(_) | Value::Float(_) => Some(self.clone()),
            Value::Str(s) => match Value::parse_literal(s) {
                Value::Str(_) => None,
                v => Some(v),
            },
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_number().is_some()
    }

    /// Name of the type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Float(_) => "real",
            Value::Str(_) => "string",
        }
    }

    // ── Arithmetic helpers ────────────────────────────────────────────────────
    //
    // Operands must already be numeric (`Int` or `Float`); callers convert
    // strings with `to_numeric` first.

    fn both_int(a: &Value, b: &Value) -> Option<(i64, i64)> {
        match (a, b) {
            (Value::Int(x), Value::Int(y)) => Some((*x, *y)),
            _ => None,
        }
    }

    fn float_pair(a: &Value, b: &Value) -> (f64, f64) {
        (a.as_number().unwrap_or(0.0), b.as_number().unwrap_or(0.0))
    }

    pub fn arith_add(&self, rhs: &Value) -> Value {
        if let Some(n) = Self::both_int(self, rhs).and_then(|(a, b)| a.checked_add(b)) {
            return Value::Int(n);
        }
        let (a, b) = Self::float_pair(self, rhs);
        Value::Float(a + b)
    }

    pub fn arith_sub(&self, rhs: &Value) -> Value {
        if let Some(n) = Self::both_int(self, rhs).and_then(|(a, b)| a.checked_sub(b)) {
            return Value::Int(n);
        }
        let (a, b) = Self::float_pair(self, rhs);
        Value::Float(a - b)
    }

    pub fn arith_mul(&self, rhs: &Value) -> Value {
        if let Some(n) = Self::both_int(self, rhs).and_then(|(a, b)| a.checked_mul(b)) {
            return Value::Int(n);
        }
        let (a, b) = Self::float_pair(self, rhs);
        Value::Float(a * b)
    }

    /// Division always yields a real.
    pub fn arith_div(&self, rhs: &Value) -> Result<Value, String> {
        let (a, b) = Self::float_pair(self, rhs);
        if b == 0.0 {
            return Err("division by zero".into());
        }
        Ok(Value::Float(a / b))
    }

    pub fn arith_pow(&self, rhs: &Value) -> Value {
        if let Some((a, b)) = Self::both_int(self, rhs) {
            if let Some(n) = u32::try_from(b).ok().and_then(|e| a.checked_pow(e)) {
                return Value::Int(n);
            }
        }
        let (a, b) = Self::float_pair(self, rhs);
        Value::Float(a.powf(b))
    }

    pub fn arith_neg(&self) -> Value {
        match self {
            Value::Int(n) => match n.checked_neg() {
                Some(m) => Value::Int(m),
                None => Value::Float(-(*n as f64)),
            },
            Value::Float(x) => Value::Float(-x),
            Value::Str(_) => Value::Float(-self.as_number().unwrap_or(0.0)),
        }
    }

    /// `true` for a real that is NaN or infinite.
    pub fn is_non_finite(&self) -> bool {
        matches!(self, Value::Float(x) if !x.is_finite())
    }
}

/// Digits, sign, decimal point and exponent characters only, with at least
/// one digit.
fn looks_numeric(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().any(|b| b.is_ascii_digit())
        && s
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'+' | b'-' | b'.' | b'e' | b'E'))
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
