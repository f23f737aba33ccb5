//! Script values
//!
//! Scalars are stored inline; strings are shared immutable text; tables,
//! functions and userdata are reference types compared by identity.

use crate::vm::object::{Function, Userdata};
use crate::vm::opaque::OpaqueRef;
use crate::vm::table::TableRef;
use std::fmt;
use std::rc::Rc;

/// A script value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
    Table(TableRef),
    Function(Rc<Function>),
    Userdata(Rc<Userdata>),
    /// Host handle that crosses state boundaries by identity
    Opaque(OpaqueRef),
}

impl Value {
    /// Create a string value
    pub fn string(text: impl AsRef<str>) -> Self {
        Value::String(Rc::from(text.as_ref()))
    }

    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
            Value::Userdata(_) | Value::Opaque(_) => "userdata",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Everything except `nil` and `false` is true.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    /// Numeric value, converting numeric strings.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::String(s) => str_to_number(s),
            _ => None,
        }
    }

    /// Text value, converting numbers.
    pub fn to_text(&self) -> Option<Rc<str>> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(Rc::from(format_number(*n))),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Address of a reference value, used for identity strings.
    pub fn address(&self) -> Option<usize> {
        match self {
            Value::Table(t) => Some(t.address()),
            Value::Function(f) => Some(Rc::as_ptr(f) as *const () as usize),
            Value::Userdata(u) => Some(Rc::as_ptr(u) as *const () as usize),
            Value::Opaque(o) => Some(o.address()),
            _ => None,
        }
    }

    /// Equality without metamethods.
    pub fn raw_equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Userdata(a), Value::Userdata(b)) => Rc::ptr_eq(a, b),
            (Value::Opaque(a), Value::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.raw_equal(other)
    }
}

/// Conversion without metamethods (`tostring` falls back to this).
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Opaque(o) => write!(f, "{}", o),
            other => write!(
                f,
                "{}: {:#010x}",
                other.type_name(),
                other.address().unwrap_or(0)
            ),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            other => write!(f, "{}", other),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<TableRef> for Value {
    fn from(t: TableRef) -> Self {
        Value::Table(t)
    }
}

impl From<OpaqueRef> for Value {
    fn from(o: OpaqueRef) -> Self {
        Value::Opaque(o)
    }
}

/// Format a number the way `%.14g` does.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if n == n.trunc() && n.abs() < 1e14 {
        return format!("{}", n as i64);
    }

    let exponent = n.abs().log10().floor() as i32;
    if !(-4..14).contains(&exponent) {
        let formatted = format!("{:.13e}", n);
        let (mantissa, exp) = formatted.split_once('e').unwrap_or((&formatted, "0"));
        let mantissa = trim_fraction(mantissa);
        let exp: i32 = exp.parse().unwrap_or(0);
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exp.abs())
    } else {
        let decimals = (13 - exponent).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, n)).to_string()
    }
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

/// Parse a numeric string (decimal or `0x` hex, surrounding space allowed).
pub fn str_to_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    if let Some(hex) = unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"))
    {
        let n = u64::from_str_radix(hex, 16).ok()? as f64;
        return Some(if negative { -n } else { n });
    }

    // Reject forms Rust accepts but scripts do not (inf, nan, ...)
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return None;
    }
    trimmed.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_integers() {
        assert_eq!(format_number(2.0), "2");
        assert_eq!(format_number(-17.0), "-17");
        assert_eq!(format_number(1e15), "1e+15");
    }

    #[test]
    fn test_format_fractions() {
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(0.1), "0.1");
        assert_eq!(format_number(3.14159), "3.14159");
        assert_eq!(format_number(1e-5), "1e-05");
    }

    #[test]
    fn test_format_special() {
        assert_eq!(format_number(f64::INFINITY), "inf");
        assert_eq!(format_number(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn test_str_to_number() {
        assert_eq!(str_to_number(" 10 "), Some(10.0));
        assert_eq!(str_to_number("0x1F"), Some(31.0));
        assert_eq!(str_to_number("-2.5e1"), Some(-25.0));
        assert_eq!(str_to_number("inf"), None);
        assert_eq!(str_to_number("abc"), None);
        assert_eq!(str_to_number(""), None);
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(Value::Number(0.0).is_truthy());
        assert!(Value::string("").is_truthy());
    }

    #[test]
    fn test_raw_equal_strings_by_content() {
        assert_eq!(Value::string("abc"), Value::from("abc"));
        assert_ne!(Value::string("abc"), Value::Number(1.0));
    }
}
