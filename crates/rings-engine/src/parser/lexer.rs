//! Lexer for the rings scripting language.
//!
//! Tokenization is driven by logos. Long brackets, quoted strings and
//! comments need context the regex engine cannot express (matching `=`
//! levels, escape sequences), so they are finished by callbacks that read
//! the remainder of the input directly.

use crate::parser::token::{Span, Token};
use logos::Logos;
use std::rc::Rc;
use thiserror::Error;

/// Logos-based token enum for lexing.
///
/// Converted to [`Token`] after lexing so the parser never sees logos types.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\x0B\x0C]+")]
enum LogosToken {
    #[token("--", lex_comment)]
    Comment,

    // Keywords (must come before identifiers)
    #[token("and")]
    And,
    #[token("break")]
    Break,
    #[token("do")]
    Do,
    #[token("else")]
    Else,
    #[token("elseif")]
    Elseif,
    #[token("end")]
    End,
    #[token("false")]
    False,
    #[token("for")]
    For,
    #[token("function")]
    Function,
    #[token("if")]
    If,
    #[token("in")]
    In,
    #[token("local")]
    Local,
    #[token("nil")]
    Nil,
    #[token("not")]
    Not,
    #[token("or")]
    Or,
    #[token("repeat")]
    Repeat,
    #[token("return")]
    Return,
    #[token("then")]
    Then,
    #[token("true")]
    True,
    #[token("until")]
    Until,
    #[token("while")]
    While,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Name,

    #[regex(r"0[xX][0-9a-fA-F]+", parse_hex)]
    #[regex(r"[0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?", parse_decimal)]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", parse_decimal)]
    Number(f64),

    #[token("\"", lex_quoted)]
    #[token("'", lex_quoted)]
    QuotedString(String),

    #[regex(r"\[=*\[", lex_long_string)]
    LongString(String),

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,
    #[token("#")]
    Hash,
    #[token("==")]
    EqualEqual,
    #[token("~=")]
    NotEqual,
    #[token("<=")]
    LessEqual,
    #[token(">=")]
    GreaterEqual,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("=")]
    Assign,
    #[token("..")]
    Concat,
    #[token("...")]
    Ellipsis,
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("{")]
    LeftBrace,
    #[token("}")]
    RightBrace,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
}

fn lex_comment(lex: &mut logos::Lexer<'_, LogosToken>) -> logos::Skip {
    let remainder = lex.remainder();

    if let Some(level) = long_bracket_level(remainder) {
        let open = level + 2;
        let close = format!("]{}]", "=".repeat(level));
        match remainder[open..].find(&close) {
            Some(end) => lex.bump(open + end + close.len()),
            // Unterminated long comment - consume to end
            None => lex.bump(remainder.len()),
        }
    } else {
        let end = remainder.find('\n').unwrap_or(remainder.len());
        lex.bump(end);
    }

    logos::Skip
}

/// Returns the `=` level if `text` starts with a long bracket opener.
fn long_bracket_level(text: &str) -> Option<usize> {
    let rest = text.strip_prefix('[')?;
    let level = rest.bytes().take_while(|b| *b == b'=').count();
    if rest.as_bytes().get(level) == Some(&b'[') {
        Some(level)
    } else {
        None
    }
}

fn parse_hex(lex: &mut logos::Lexer<'_, LogosToken>) -> Option<f64> {
    u64::from_str_radix(&lex.slice()[2..], 16)
        .ok()
        .map(|n| n as f64)
}

fn parse_decimal(lex: &mut logos::Lexer<'_, LogosToken>) -> Option<f64> {
    lex.slice().parse().ok()
}

fn lex_long_string(lex: &mut logos::Lexer<'_, LogosToken>) -> Option<String> {
    let level = lex.slice().len() - 2;
    let close = format!("]{}]", "=".repeat(level));
    let remainder = lex.remainder();
    let end = remainder.find(&close)?;

    let mut content = &remainder[..end];
    // A newline right after the opening bracket is not part of the string
    if let Some(rest) = content.strip_prefix("\r\n") {
        content = rest;
    } else if let Some(rest) = content.strip_prefix('\n') {
        content = rest;
    }
    let text = content.to_string();
    lex.bump(end + close.len());
    Some(text)
}

fn lex_quoted(lex: &mut logos::Lexer<'_, LogosToken>) -> Option<String> {
    let quote = lex.slice().chars().next()?;
    let remainder = lex.remainder();
    let mut result = String::new();
    let mut chars = remainder.char_indices().peekable();

    while let Some((index, c)) = chars.next() {
        match c {
            c if c == quote => {
                lex.bump(index + 1);
                return Some(result);
            }
            '\n' => return None,
            '\\' => {
                let (_, escaped) = chars.next()?;
                match escaped {
                    'n' => result.push('\n'),
                    't' => result.push('\t'),
                    'r' => result.push('\r'),
                    'a' => result.push('\x07'),
                    'b' => result.push('\x08'),
                    'f' => result.push('\x0C'),
                    'v' => result.push('\x0B'),
                    '\n' => result.push('\n'),
                    '0'..='9' => {
                        let mut code = escaped.to_digit(10).unwrap_or(0);
                        for _ in 0..2 {
                            match chars.peek() {
                                Some((_, d)) if d.is_ascii_digit() => {
                                    code = code * 10 + d.to_digit(10).unwrap_or(0);
                                    chars.next();
                                }
                                _ => break,
                            }
                        }
                        if code > 255 {
                            // Include the escape in the error span
                            lex.bump(index + 1);
                            return None;
                        }
                        result.push(char::from(code as u8));
                    }
                    other => result.push(other),
                }
            }
            c => result.push(c),
        }
    }

    None
}

/// Lexer error types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    #[error("unexpected symbol '{text}'")]
    UnexpectedCharacter { text: String, span: Span },

    #[error("unfinished string")]
    UnfinishedString { span: Span },

    #[error("unfinished long string")]
    UnfinishedLongString { span: Span },

    #[error("escape sequence too large")]
    InvalidEscape { span: Span },

    #[error("malformed number near '{text}'")]
    MalformedNumber { text: String, span: Span },
}

impl LexError {
    /// Get the span of this error
    pub fn span(&self) -> &Span {
        match self {
            LexError::UnexpectedCharacter { span, .. }
            | LexError::UnfinishedString { span }
            | LexError::UnfinishedLongString { span }
            | LexError::InvalidEscape { span }
            | LexError::MalformedNumber { span, .. } => span,
        }
    }
}

/// Main lexer structure.
pub struct Lexer<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            source,
            line_starts,
        }
    }

    /// Line number (1-based) of a byte offset.
    fn line_of(&self, offset: usize) -> u32 {
        self.line_starts.partition_point(|start| *start <= offset) as u32
    }

    /// Tokenize the whole source, stopping at the first error.
    ///
    /// The returned stream always ends with [`Token::Eof`].
    pub fn tokenize(self) -> Result<Vec<(Token, Span)>, LexError> {
        let mut tokens = Vec::new();
        let mut lex = LogosToken::lexer(self.source);

        while let Some(result) = lex.next() {
            let range = lex.span();
            let span = Span::new(range.start, range.end, self.line_of(range.start));
            let slice = lex.slice();

            let logos_token = match result {
                Ok(token) => token,
                Err(()) => return Err(self.classify_error(slice, span)),
            };
            tokens.push((convert_token(logos_token, slice), span));
        }

        let end = self.source.len();
        tokens.push((Token::Eof, Span::new(end, end, self.line_of(end))));
        Ok(tokens)
    }

    fn classify_error(&self, slice: &str, span: Span) -> LexError {
        match slice.chars().next() {
            Some('"') | Some('\'') if slice.len() == 1 => LexError::UnfinishedString { span },
            Some('"') | Some('\'') => LexError::InvalidEscape { span },
            Some('[') => LexError::UnfinishedLongString { span },
            Some(c) if c.is_ascii_digit() || c == '.' => LexError::MalformedNumber {
                text: slice.to_string(),
                span,
            },
            _ => LexError::UnexpectedCharacter {
                text: slice.to_string(),
                span,
            },
        }
    }
}

fn convert_token(token: LogosToken, slice: &str) -> Token {
    match token {
        // Comments are skipped by their callback and never reach here
        LogosToken::Comment => Token::Eof,
        LogosToken::And => Token::And,
        LogosToken::Break => Token::Break,
        LogosToken::Do => Token::Do,
        LogosToken::Else => Token::Else,
        LogosToken::Elseif => Token::Elseif,
        LogosToken::End => Token::End,
        LogosToken::False => Token::False,
        LogosToken::For => Token::For,
        LogosToken::Function => Token::Function,
        LogosToken::If => Token::If,
        LogosToken::In => Token::In,
        LogosToken::Local => Token::Local,
        LogosToken::Nil => Token::Nil,
        LogosToken::Not => Token::Not,
        LogosToken::Or => Token::Or,
        LogosToken::Repeat => Token::Repeat,
        LogosToken::Return => Token::Return,
        LogosToken::Then => Token::Then,
        LogosToken::True => Token::True,
        LogosToken::Until => Token::Until,
        LogosToken::While => Token::While,
        LogosToken::Name => Token::Name(Rc::from(slice)),
        LogosToken::Number(n) => Token::Number(n),
        LogosToken::QuotedString(s) | LogosToken::LongString(s) => Token::String(Rc::from(s)),
        LogosToken::Plus => Token::Plus,
        LogosToken::Minus => Token::Minus,
        LogosToken::Star => Token::Star,
        LogosToken::Slash => Token::Slash,
        LogosToken::Percent => Token::Percent,
        LogosToken::Caret => Token::Caret,
        LogosToken::Hash => Token::Hash,
        LogosToken::EqualEqual => Token::EqualEqual,
        LogosToken::NotEqual => Token::NotEqual,
        LogosToken::LessEqual => Token::LessEqual,
        LogosToken::GreaterEqual => Token::GreaterEqual,
        LogosToken::Less => Token::Less,
        LogosToken::Greater => Token::Greater,
        LogosToken::Assign => Token::Assign,
        LogosToken::Concat => Token::Concat,
        LogosToken::Ellipsis => Token::Ellipsis,
        LogosToken::LeftParen => Token::LeftParen,
        LogosToken::RightParen => Token::RightParen,
        LogosToken::LeftBrace => Token::LeftBrace,
        LogosToken::RightBrace => Token::RightBrace,
        LogosToken::LeftBracket => Token::LeftBracket,
        LogosToken::RightBracket => Token::RightBracket,
        LogosToken::Semicolon => Token::Semicolon,
        LogosToken::Colon => Token::Colon,
        LogosToken::Comma => Token::Comma,
        LogosToken::Dot => Token::Dot,
    }
}
