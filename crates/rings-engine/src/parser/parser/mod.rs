//! Recursive-descent parser
//!
//! Parsing functions are free functions over `&mut Parser`, split into
//! statement and expression modules. The parser stops at the first error,
//! which is reported in the `chunk:line: message near 'token'` form.

mod expr;
pub mod guards;
mod stmt;

use crate::parser::ast::{Chunk, FunctionBody};
use crate::parser::lexer::Lexer;
use crate::parser::token::{Span, Token};
use std::mem;
use std::rc::Rc;
use thiserror::Error;

/// Syntax error with its chunk name and line.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{chunk}:{line}: {message}")]
pub struct ParseError {
    pub chunk: Rc<str>,
    pub line: u32,
    pub message: String,
}

/// Parser state over a token stream.
pub struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    chunk: Rc<str>,
    /// Current nesting depth, see [`guards::nested`]
    pub(crate) depth: usize,
    /// Open loops in the function being parsed (for `break`)
    loop_depth: usize,
    /// Whether each enclosing function accepts `...`
    vararg_scopes: Vec<bool>,
}

/// Parse `source` into a chunk named `chunk`.
pub fn parse(source: &str, chunk: Rc<str>) -> Result<Chunk, ParseError> {
    let tokens = Lexer::new(source).tokenize().map_err(|err| ParseError {
        chunk: chunk.clone(),
        line: err.span().line,
        message: format!("{} near '{}'", err, err.span().slice(source).trim_end()),
    })?;

    let mut parser = Parser::new(tokens, chunk.clone());
    parser.vararg_scopes.push(true);
    let block = stmt::parse_block(&mut parser)?;
    if !parser.check(&Token::Eof) {
        return Err(parser.expected("<eof>"));
    }

    Ok(Chunk {
        name: chunk,
        body: Rc::new(FunctionBody {
            name: None,
            params: Vec::new(),
            is_vararg: true,
            block,
            line: 0,
        }),
    })
}

impl Parser {
    pub fn new(tokens: Vec<(Token, Span)>, chunk: Rc<str>) -> Self {
        Self {
            tokens,
            pos: 0,
            chunk,
            depth: 0,
            loop_depth: 0,
            vararg_scopes: Vec::new(),
        }
    }

    // ========================================================================
    // Token cursor
    // ========================================================================

    /// Current token (`Eof` past the end).
    pub fn current(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|(token, _)| token)
            .unwrap_or(&Token::Eof)
    }

    /// Token after the current one.
    pub fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos + 1)
            .map(|(token, _)| token)
            .unwrap_or(&Token::Eof)
    }

    /// Line of the current token.
    pub fn line(&self) -> u32 {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(_, span)| span.line)
            .unwrap_or(0)
    }

    /// Consume and return the current token.
    pub fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    /// Check the current token's kind (payloads are ignored).
    pub fn check(&self, token: &Token) -> bool {
        mem::discriminant(self.current()) == mem::discriminant(token)
    }

    /// Consume the current token if it matches.
    pub fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, token: &Token) -> Result<(), ParseError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.expected(&token.to_string()))
        }
    }

    /// Expect a closing token, naming the opener when it is on another line.
    pub fn expect_closing(
        &mut self,
        closing: &Token,
        opening: &Token,
        line: u32,
    ) -> Result<(), ParseError> {
        if self.eat(closing) {
            return Ok(());
        }
        if line == self.line() {
            Err(self.expected(&closing.to_string()))
        } else {
            Err(self.error(format!(
                "'{}' expected (to close '{}' at line {})",
                closing, opening, line
            )))
        }
    }

    pub fn expect_name(&mut self) -> Result<Rc<str>, ParseError> {
        match self.current() {
            Token::Name(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.expected("<name>")),
        }
    }

    // ========================================================================
    // Errors
    // ========================================================================

    /// Error at the current token, with `near` context appended.
    pub fn error(&self, message: String) -> ParseError {
        let near = match self.current() {
            Token::String(s) => format!("'{}'", s),
            token => format!("'{}'", token),
        };
        ParseError {
            chunk: self.chunk.clone(),
            line: self.line(),
            message: format!("{} near {}", message, near),
        }
    }

    pub fn expected(&self, what: &str) -> ParseError {
        self.error(format!("'{}' expected", what))
    }

    // ========================================================================
    // Scopes
    // ========================================================================

    /// Parse inside a loop body so `break` is accepted.
    pub fn in_loop<T>(
        &mut self,
        inner: impl FnOnce(&mut Parser) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        self.loop_depth += 1;
        let result = inner(self);
        self.loop_depth -= 1;
        result
    }

    /// Parse a function body: loops outside it do not count for `break`.
    pub fn in_function<T>(
        &mut self,
        is_vararg: bool,
        inner: impl FnOnce(&mut Parser) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        let saved_loops = mem::replace(&mut self.loop_depth, 0);
        self.vararg_scopes.push(is_vararg);
        let result = inner(self);
        self.vararg_scopes.pop();
        self.loop_depth = saved_loops;
        result
    }

    pub fn in_vararg_function(&self) -> bool {
        self.vararg_scopes.last().copied().unwrap_or(false)
    }

    pub fn loop_open(&self) -> bool {
        self.loop_depth > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::{Expression, StatementKind};

    fn parse_ok(source: &str) -> Chunk {
        parse(source, Rc::from("test")).unwrap()
    }

    fn parse_err(source: &str) -> String {
        parse(source, Rc::from("test")).unwrap_err().to_string()
    }

    #[test]
    fn test_parse_local_and_return() {
        let chunk = parse_ok("local a, b = 1, 2\nreturn a + b");
        let statements = &chunk.body.block.statements;
        assert_eq!(statements.len(), 2);
        assert!(matches!(statements[0].kind, StatementKind::Local { .. }));
        assert!(matches!(statements[1].kind, StatementKind::Return(_)));
        assert_eq!(statements[1].line, 2);
    }

    #[test]
    fn test_parse_method_function() {
        let chunk = parse_ok("function obj.field:method(x) return self end");
        match &chunk.body.block.statements[0].kind {
            StatementKind::Assign { values, .. } => match &values[0] {
                Expression::Function(body) => {
                    assert_eq!(body.params.len(), 2);
                    assert_eq!(&*body.params[0], "self");
                    assert_eq!(body.name.as_deref(), Some("obj.field:method"));
                }
                other => panic!("expected function, got {:?}", other),
            },
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_precedence() {
        let chunk = parse_ok("return 1 + 2 * 3 ^ 2");
        match &chunk.body.block.statements[0].kind {
            StatementKind::Return(values) => {
                assert!(matches!(
                    values[0],
                    Expression::Binary {
                        op: crate::parser::ast::BinaryOp::Add,
                        ..
                    }
                ));
            }
            other => panic!("expected return, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_end() {
        let message = parse_err("if x then\n y = 1");
        assert_eq!(message, "test:2: 'end' expected (to close 'if' at line 1) near '<eof>'");
    }

    #[test]
    fn test_break_outside_loop() {
        assert!(parse_err("break").contains("no loop to break"));
        parse_ok("while true do break end");
    }

    #[test]
    fn test_vararg_outside_vararg_function() {
        parse_ok("return ...");
        assert!(parse_err("function f() return ... end").contains("'...'"));
    }

    #[test]
    fn test_lex_error_reported_with_line() {
        let message = parse_err("x = 1\ny = 'open");
        assert!(message.starts_with("test:2: unfinished string"));
    }

    #[test]
    fn test_call_statement_required() {
        assert!(parse_err("x").contains("syntax error"));
    }
}
