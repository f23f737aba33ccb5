//! Expression parsing
//!
//! Binary operators use precedence climbing with the Lua priority table
//! from [`BinaryOp::priority`].

use super::guards::nested;
use super::stmt::parse_block;
use super::{ParseError, Parser};
use crate::parser::ast::*;
use crate::parser::token::Token;
use std::rc::Rc;

/// Parse an expression.
pub fn parse_expression(parser: &mut Parser) -> Result<Expression, ParseError> {
    parse_subexpression(parser, 0)
}

/// Parse a comma-separated, non-empty expression list.
pub fn parse_expression_list(parser: &mut Parser) -> Result<Vec<Expression>, ParseError> {
    let mut list = vec![parse_expression(parser)?];
    while parser.eat(&Token::Comma) {
        list.push(parse_expression(parser)?);
    }
    Ok(list)
}

fn binary_op(token: &Token) -> Option<BinaryOp> {
    let op = match token {
        Token::Plus => BinaryOp::Add,
        Token::Minus => BinaryOp::Sub,
        Token::Star => BinaryOp::Mul,
        Token::Slash => BinaryOp::Div,
        Token::Percent => BinaryOp::Mod,
        Token::Caret => BinaryOp::Pow,
        Token::Concat => BinaryOp::Concat,
        Token::EqualEqual => BinaryOp::Eq,
        Token::NotEqual => BinaryOp::Ne,
        Token::Less => BinaryOp::Lt,
        Token::LessEqual => BinaryOp::Le,
        Token::Greater => BinaryOp::Gt,
        Token::GreaterEqual => BinaryOp::Ge,
        Token::And => BinaryOp::And,
        Token::Or => BinaryOp::Or,
        _ => return None,
    };
    Some(op)
}

fn unary_op(token: &Token) -> Option<UnaryOp> {
    match token {
        Token::Minus => Some(UnaryOp::Neg),
        Token::Not => Some(UnaryOp::Not),
        Token::Hash => Some(UnaryOp::Len),
        _ => None,
    }
}

/// Parse operators whose left priority is greater than `limit`.
fn parse_subexpression(parser: &mut Parser, limit: u8) -> Result<Expression, ParseError> {
    nested(parser, "expression", |parser| {
        let mut left = if let Some(op) = unary_op(parser.current()) {
            let line = parser.line();
            parser.advance();
            let operand = parse_subexpression(parser, UNARY_PRIORITY)?;
            fold_unary(op, operand, line)
        } else {
            parse_simple_expression(parser)?
        };

        while let Some(op) = binary_op(parser.current()) {
            let (left_priority, right_priority) = op.priority();
            if left_priority <= limit {
                break;
            }
            let line = parser.line();
            parser.advance();
            let right = parse_subexpression(parser, right_priority)?;
            left = Expression::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                line,
            };
        }

        Ok(left)
    })
}

/// Negative numeric literals are folded so `-1` is a constant.
fn fold_unary(op: UnaryOp, operand: Expression, line: u32) -> Expression {
    match (op, operand) {
        (UnaryOp::Neg, Expression::Number(n)) => Expression::Number(-n),
        (op, operand) => Expression::Unary {
            op,
            operand: Box::new(operand),
            line,
        },
    }
}

fn parse_simple_expression(parser: &mut Parser) -> Result<Expression, ParseError> {
    let expression = match parser.current() {
        Token::Number(n) => Expression::Number(*n),
        Token::String(s) => Expression::String(s.clone()),
        Token::Nil => Expression::Nil,
        Token::True => Expression::True,
        Token::False => Expression::False,
        Token::Ellipsis => {
            if !parser.in_vararg_function() {
                return Err(parser.error("cannot use '...' outside a vararg function".to_string()));
            }
            Expression::Vararg
        }
        Token::LeftBrace => return parse_table_constructor(parser),
        Token::Function => {
            let line = parser.line();
            parser.advance();
            return Ok(Expression::Function(parse_function_body(parser, None, false, line)?));
        }
        _ => return parse_suffixed_expression(parser),
    };
    parser.advance();
    Ok(expression)
}

fn parse_primary_expression(parser: &mut Parser) -> Result<Expression, ParseError> {
    match parser.current() {
        Token::Name(name) => {
            let name = name.clone();
            parser.advance();
            Ok(Expression::Name(name))
        }
        Token::LeftParen => {
            let line = parser.line();
            parser.advance();
            let inner = parse_expression(parser)?;
            parser.expect_closing(&Token::RightParen, &Token::LeftParen, line)?;
            Ok(Expression::Paren(Box::new(inner)))
        }
        _ => Err(parser.error("unexpected symbol".to_string())),
    }
}

/// Primary expression followed by field accesses, indexing and calls.
pub fn parse_suffixed_expression(parser: &mut Parser) -> Result<Expression, ParseError> {
    let mut expression = parse_primary_expression(parser)?;
    loop {
        let line = parser.line();
        match parser.current() {
            Token::Dot => {
                parser.advance();
                let key = parser.expect_name()?;
                expression = Expression::Index {
                    object: Box::new(expression),
                    key: Box::new(Expression::String(key)),
                    line,
                };
            }
            Token::LeftBracket => {
                parser.advance();
                let key = parse_expression(parser)?;
                parser.expect(&Token::RightBracket)?;
                expression = Expression::Index {
                    object: Box::new(expression),
                    key: Box::new(key),
                    line,
                };
            }
            Token::Colon => {
                parser.advance();
                let method = parser.expect_name()?;
                let args = parse_call_arguments(parser)?;
                expression = Expression::MethodCall {
                    object: Box::new(expression),
                    method,
                    args,
                    line,
                };
            }
            Token::LeftParen | Token::String(_) | Token::LeftBrace => {
                let args = parse_call_arguments(parser)?;
                expression = Expression::Call {
                    callee: Box::new(expression),
                    args,
                    line,
                };
            }
            _ => return Ok(expression),
        }
    }
}

fn parse_call_arguments(parser: &mut Parser) -> Result<Vec<Expression>, ParseError> {
    match parser.current() {
        Token::String(s) => {
            let arg = Expression::String(s.clone());
            parser.advance();
            Ok(vec![arg])
        }
        Token::LeftBrace => Ok(vec![parse_table_constructor(parser)?]),
        Token::LeftParen => {
            let line = parser.line();
            parser.advance();
            if parser.eat(&Token::RightParen) {
                return Ok(Vec::new());
            }
            let args = parse_expression_list(parser)?;
            parser.expect_closing(&Token::RightParen, &Token::LeftParen, line)?;
            Ok(args)
        }
        _ => Err(parser.error("function arguments expected".to_string())),
    }
}

fn parse_table_constructor(parser: &mut Parser) -> Result<Expression, ParseError> {
    let line = parser.line();
    parser.expect(&Token::LeftBrace)?;
    let mut fields = Vec::new();

    while !parser.check(&Token::RightBrace) {
        let field = match parser.current() {
            Token::LeftBracket => {
                parser.advance();
                let key = parse_expression(parser)?;
                parser.expect(&Token::RightBracket)?;
                parser.expect(&Token::Assign)?;
                TableField::Keyed(key, parse_expression(parser)?)
            }
            Token::Name(name) if matches!(parser.peek(), Token::Assign) => {
                let key = Expression::String(name.clone());
                parser.advance();
                parser.advance();
                TableField::Keyed(key, parse_expression(parser)?)
            }
            _ => TableField::Positional(parse_expression(parser)?),
        };
        fields.push(field);

        if !parser.eat(&Token::Comma) && !parser.eat(&Token::Semicolon) {
            break;
        }
    }

    parser.expect_closing(&Token::RightBrace, &Token::LeftBrace, line)?;
    Ok(Expression::Table(fields))
}

/// Parse `(params) block end` after the `function` keyword and name.
pub fn parse_function_body(
    parser: &mut Parser,
    name: Option<Rc<str>>,
    is_method: bool,
    line: u32,
) -> Result<Rc<FunctionBody>, ParseError> {
    let mut params: Vec<Rc<str>> = Vec::new();
    if is_method {
        params.push(Rc::from("self"));
    }
    let mut is_vararg = false;

    parser.expect(&Token::LeftParen)?;
    if !parser.check(&Token::RightParen) {
        loop {
            if parser.eat(&Token::Ellipsis) {
                is_vararg = true;
                break;
            }
            params.push(parser.expect_name()?);
            if !parser.eat(&Token::Comma) {
                break;
            }
        }
    }
    parser.expect(&Token::RightParen)?;

    let block = parser.in_function(is_vararg, parse_block)?;
    parser.expect_closing(&Token::End, &Token::Function, line)?;

    Ok(Rc::new(FunctionBody {
        name,
        params,
        is_vararg,
        block,
        line,
    }))
}
