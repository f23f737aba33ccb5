//! String library
//!
//! Strings are byte sequences to scripts; positions are 1-based and negative
//! positions count from the end.

use super::{
    arg, arg_error, check_integer, check_number, check_string, new_library, opt_integer, register,
};
use crate::vm::error::ScriptError;
use crate::vm::interpreter::State;
use crate::vm::value::{format_number, Value};

/// Longest string `rep` will build
const MAX_STRING_LEN: usize = 1 << 30;

pub(super) fn open(state: &State) {
    let string = new_library(state, "string");

    register(state, &string, "len", |state, args| {
        let s = check_string(state, &args, 1, "len")?;
        Ok(vec![Value::Number(s.len() as f64)])
    });

    register(state, &string, "sub", |state, args| {
        let s = check_string(state, &args, 1, "sub")?;
        let i = opt_integer(state, &args, 2, "sub", 1)?;
        let j = opt_integer(state, &args, 3, "sub", -1)?;
        let (start, end) = clamp_range(s.len(), i, j);
        Ok(vec![bytes_value(&s.as_bytes()[start..end])])
    });

    register(state, &string, "upper", |state, args| {
        let s = check_string(state, &args, 1, "upper")?;
        Ok(vec![Value::string(s.to_ascii_uppercase())])
    });

    register(state, &string, "lower", |state, args| {
        let s = check_string(state, &args, 1, "lower")?;
        Ok(vec![Value::string(s.to_ascii_lowercase())])
    });

    register(state, &string, "rep", |state, args| {
        let s = check_string(state, &args, 1, "rep")?;
        let n = check_integer(state, &args, 2, "rep")?;
        if n <= 0 {
            return Ok(vec![Value::from("")]);
        }
        let too_large = usize::try_from(n)
            .ok()
            .and_then(|n| s.len().checked_mul(n))
            .is_none_or(|len| len > MAX_STRING_LEN);
        if too_large {
            return Err(state.error("resulting string too large"));
        }
        Ok(vec![Value::string(s.repeat(n as usize))])
    });

    register(state, &string, "reverse", |state, args| {
        let s = check_string(state, &args, 1, "reverse")?;
        let mut bytes = s.as_bytes().to_vec();
        bytes.reverse();
        Ok(vec![bytes_value(&bytes)])
    });

    register(state, &string, "byte", |state, args| {
        let s = check_string(state, &args, 1, "byte")?;
        let i = opt_integer(state, &args, 2, "byte", 1)?;
        let j = opt_integer(state, &args, 3, "byte", i)?;
        let (start, end) = clamp_range(s.len(), i, j);
        Ok(s.as_bytes()[start..end]
            .iter()
            .map(|b| Value::Number(*b as f64))
            .collect())
    });

    register(state, &string, "char", |state, args| {
        let mut bytes = Vec::with_capacity(args.len());
        for position in 1..=args.len() {
            let code = check_integer(state, &args, position, "char")?;
            let byte = u8::try_from(code)
                .map_err(|_| arg_error(state, position, "char", "invalid value"))?;
            bytes.push(byte);
        }
        Ok(vec![bytes_value(&bytes)])
    });

    register(state, &string, "format", |state, args| {
        let template = check_string(state, &args, 1, "format")?;
        Ok(vec![Value::string(format(state, &template, &args)?)])
    });

    register(state, &string, "find", |state, args| {
        let s = check_string(state, &args, 1, "find")?;
        let pattern = check_string(state, &args, 2, "find")?;
        let init = opt_integer(state, &args, 3, "find", 1)?;
        let plain = arg(&args, 4).is_truthy();

        if !plain && pattern.bytes().any(|b| SPECIALS.contains(&b)) {
            return Err(state.error("patterns are not supported; pass plain = true"));
        }

        let start = match init {
            i if i < 0 => (s.len() as i64 + i).max(0) as usize,
            0 => 0,
            i => (i - 1) as usize,
        };
        if start > s.len() {
            return Ok(vec![Value::Nil]);
        }
        match find_bytes(&s.as_bytes()[start..], pattern.as_bytes()) {
            Some(offset) => {
                let first = start + offset + 1;
                Ok(vec![
                    Value::Number(first as f64),
                    Value::Number((first + pattern.len() - 1) as f64),
                ])
            }
            None => Ok(vec![Value::Nil]),
        }
    });

    // Strings index the string table, so ("x"):upper() works
    let metatable = state.new_table();
    metatable.set_str("__index", Value::Table(string));
    state.set_string_metatable(metatable);
}

/// Pattern characters with special meaning
const SPECIALS: &[u8] = b"^$*+?.([%-";

/// Byte range for 1-based inclusive `i..=j` with negative positions.
fn clamp_range(len: usize, i: i64, j: i64) -> (usize, usize) {
    let relative = |pos: i64| if pos < 0 { len as i64 + pos + 1 } else { pos };
    let start = relative(i).max(1);
    let end = relative(j).min(len as i64);
    if start > end {
        (0, 0)
    } else {
        ((start - 1) as usize, end as usize)
    }
}

fn bytes_value(bytes: &[u8]) -> Value {
    Value::string(String::from_utf8_lossy(bytes))
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

// ============================================================================
// string.format
// ============================================================================

/// One `%` directive: `%[flags][width][.precision]conversion`.
#[derive(Default)]
struct Directive {
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
    width: usize,
    precision: Option<usize>,
}

impl Directive {
    fn pad(&self, body: String, numeric: bool) -> String {
        if body.len() >= self.width {
            return body;
        }
        let fill = self.width - body.len();
        if self.left {
            format!("{}{}", body, " ".repeat(fill))
        } else if self.zero && numeric {
            let (sign, digits) = match body.strip_prefix(['-', '+', ' ']) {
                Some(rest) => body.split_at(body.len() - rest.len()),
                None => ("", body.as_str()),
            };
            format!("{}{}{}", sign, "0".repeat(fill), digits)
        } else {
            format!("{}{}", " ".repeat(fill), body)
        }
    }

    fn sign(&self, n: f64, body: String) -> String {
        if n >= 0.0 && self.plus {
            format!("+{}", body)
        } else if n >= 0.0 && self.space {
            format!(" {}", body)
        } else {
            body
        }
    }
}

fn format(state: &State, template: &str, args: &[Value]) -> Result<String, ScriptError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut position = 1;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut directive = Directive::default();
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => directive.left = true,
                '0' => directive.zero = true,
                '+' => directive.plus = true,
                ' ' => directive.space = true,
                '#' => {}
                _ => break,
            }
            chars.next();
        }
        while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
            directive.width = directive.width * 10 + digit as usize;
            chars.next();
        }
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut precision = 0;
            while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
                precision = precision * 10 + digit as usize;
                chars.next();
            }
            directive.precision = Some(precision);
        }

        position += 1;
        let conversion = chars
            .next()
            .ok_or_else(|| state.error("invalid option '%' to 'format'"))?;
        let piece = match conversion {
            'd' | 'i' => {
                let n = check_integer(state, args, position, "format")?;
                let body = directive.sign(n as f64, n.to_string());
                directive.pad(body, true)
            }
            'c' => {
                let n = check_integer(state, args, position, "format")?;
                directive.pad(bytes_to_string(&[n as u8]), false)
            }
            'x' | 'X' => {
                let n = check_integer(state, args, position, "format")?;
                let body = if conversion == 'x' {
                    format!("{:x}", n)
                } else {
                    format!("{:X}", n)
                };
                directive.pad(body, true)
            }
            'o' => {
                let n = check_integer(state, args, position, "format")?;
                directive.pad(format!("{:o}", n), true)
            }
            'f' | 'F' => {
                let n = check_number(state, args, position, "format")?;
                let body = format!("{:.*}", directive.precision.unwrap_or(6), n);
                directive.pad(directive.sign(n, body), true)
            }
            'e' | 'E' => {
                let n = check_number(state, args, position, "format")?;
                let body = exponent(n, directive.precision.unwrap_or(6), conversion == 'E');
                directive.pad(directive.sign(n, body), true)
            }
            'g' | 'G' => {
                let n = check_number(state, args, position, "format")?;
                let body = match directive.precision {
                    None | Some(14) => format_number(n),
                    Some(p) => general(n, p.max(1)),
                };
                let body = if conversion == 'G' {
                    body.to_uppercase()
                } else {
                    body
                };
                directive.pad(directive.sign(n, body), true)
            }
            's' => {
                if position > args.len() {
                    return Err(arg_error(state, position, "format", "string expected, got no value"));
                }
                let text = state.tostring(&arg(args, position))?;
                let body = match directive.precision {
                    Some(p) => text.chars().take(p).collect(),
                    None => text.to_string(),
                };
                directive.pad(body, false)
            }
            'q' => {
                let s = check_string(state, args, position, "format")?;
                quoted(&s)
            }
            other => {
                return Err(state.error(format!(
                    "invalid option '%{}' to 'format'",
                    other
                )))
            }
        };
        out.push_str(&piece);
    }

    Ok(out)
}

fn bytes_to_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// C-style `%e`: at least two exponent digits.
fn exponent(n: f64, precision: usize, upper: bool) -> String {
    let formatted = format!("{:.*e}", precision, n);
    let (mantissa, exp) = formatted.split_once('e').unwrap_or((&formatted, "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let sign = if exp < 0 { '-' } else { '+' };
    let e = if upper { 'E' } else { 'e' };
    format!("{}{}{}{:02}", mantissa, e, sign, exp.abs())
}

/// C-style `%.{precision}g`.
fn general(n: f64, precision: usize) -> String {
    if n == 0.0 || !n.is_finite() {
        return format_number(n);
    }
    let exp = n.abs().log10().floor() as i32;
    let text = if exp < -4 || exp >= precision as i32 {
        exponent(n, precision - 1, false)
    } else {
        let decimals = (precision as i32 - 1 - exp).max(0) as usize;
        format!("{:.*}", decimals, n)
    };
    trim_zeros(text)
}

fn trim_zeros(text: String) -> String {
    let (number, suffix) = match text.find('e') {
        Some(i) => text.split_at(i),
        None => (text.as_str(), ""),
    };
    if !number.contains('.') {
        return text;
    }
    let trimmed = number.trim_end_matches('0').trim_end_matches('.');
    format!("{}{}", trimmed, suffix)
}

/// `%q`: a string literal that reads back to the same string.
fn quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\\n"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\000"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::interpreter::StateOptions;

    fn eval(source: &str) -> Vec<Value> {
        let state = State::new(StateOptions::default());
        state.open_libs();
        match state.exec(source) {
            Ok(values) => values,
            Err(err) => panic!("{}: {}", source, err),
        }
    }

    fn text(source: &str) -> String {
        eval(source)[0].as_str().unwrap().to_string()
    }

    #[test]
    fn test_sub_positions() {
        assert_eq!(text("return string.sub('hello', 2, 4)"), "ell");
        assert_eq!(text("return string.sub('hello', -3)"), "llo");
        assert_eq!(text("return string.sub('hello', 4, 2)"), "");
        assert_eq!(text("return ('hello'):sub(0, 100)"), "hello");
    }

    #[test]
    fn test_format_directives() {
        assert_eq!(text("return string.format('%5d|%-3s|', 42, 'a')"), "   42|a  |");
        assert_eq!(text("return string.format('%05.1f', 3.14159)"), "003.1");
        assert_eq!(text("return string.format('%x %X', 255, 255)"), "ff FF");
        assert_eq!(text("return string.format('%g %g', 0.5, 1e20)"), "0.5 1e+20");
        assert_eq!(text("return string.format('%q', 'a\"b')"), "\"a\\\"b\"");
        assert_eq!(text("return string.format('100%%')"), "100%");
    }

    #[test]
    fn test_find_plain() {
        assert_eq!(
            eval("return string.find('a.b.c', '.', 3, true)"),
            vec![Value::Number(4.0), Value::Number(4.0)]
        );
        assert_eq!(eval("return string.find('abc', 'x', 1, true)"), vec![Value::Nil]);
    }

    #[test]
    fn test_byte_and_char() {
        assert_eq!(
            eval("return string.byte('AB', 1, 2)"),
            vec![Value::Number(65.0), Value::Number(66.0)]
        );
        assert_eq!(text("return string.char(104, 105)"), "hi");
        assert_eq!(text("return string.rep('ab', 3)"), "ababab");
        assert_eq!(text("return ('abc'):reverse():upper()"), "CBA");
    }

    #[test]
    fn test_rep_refuses_oversized_results() {
        let state = State::new(StateOptions::default());
        state.open_libs();
        for source in ["return ('xx'):rep(2^62)", "return string.rep('x', 2^40)"] {
            let values = state
                .exec(&format!("return pcall(function() {} end)", source))
                .unwrap();
            assert_eq!(values[0], Value::Boolean(false), "{}", source);
            assert!(
                values[1].as_str().unwrap().ends_with("resulting string too large"),
                "{:?}",
                values[1]
            );
        }
        assert_eq!(text("return string.rep('x', 0)"), "");
    }
}
