//! Statement parsing

use super::expr::{parse_expression, parse_expression_list, parse_function_body, parse_suffixed_expression};
use super::guards::nested;
use super::{ParseError, Parser};
use crate::parser::ast::*;
use crate::parser::token::Token;
use std::rc::Rc;

/// Parse a block up to (not including) its closing keyword.
pub fn parse_block(parser: &mut Parser) -> Result<Block, ParseError> {
    nested(parser, "block", |parser| {
        let mut statements = Vec::new();
        loop {
            if parser.current().is_block_end() {
                break;
            }
            if parser.eat(&Token::Semicolon) {
                continue;
            }
            if parser.check(&Token::Return) {
                statements.push(parse_return(parser)?);
                // return must be the last statement of a block
                if !parser.current().is_block_end() {
                    return Err(parser.expected("end"));
                }
                break;
            }
            statements.push(parse_statement(parser)?);
        }
        Ok(Block { statements })
    })
}

/// Parse a statement.
fn parse_statement(parser: &mut Parser) -> Result<Statement, ParseError> {
    let line = parser.line();
    let kind = match parser.current() {
        Token::If => parse_if(parser)?,
        Token::While => parse_while(parser)?,
        Token::Do => {
            parser.advance();
            let body = parse_block(parser)?;
            parser.expect_closing(&Token::End, &Token::Do, line)?;
            StatementKind::Do(body)
        }
        Token::For => parse_for(parser)?,
        Token::Repeat => parse_repeat(parser)?,
        Token::Function => parse_function_statement(parser)?,
        Token::Local => {
            parser.advance();
            if parser.eat(&Token::Function) {
                let name = parser.expect_name()?;
                let body = parse_function_body(parser, Some(name.clone()), false, line)?;
                StatementKind::LocalFunction { name, body }
            } else {
                parse_local(parser)?
            }
        }
        Token::Break => {
            parser.advance();
            if !parser.loop_open() {
                return Err(parser.error("no loop to break".to_string()));
            }
            StatementKind::Break
        }
        _ => parse_expression_statement(parser)?,
    };
    Ok(Statement { kind, line })
}

fn parse_return(parser: &mut Parser) -> Result<Statement, ParseError> {
    let line = parser.line();
    parser.advance();
    let values = if parser.current().is_block_end() || parser.check(&Token::Semicolon) {
        Vec::new()
    } else {
        parse_expression_list(parser)?
    };
    parser.eat(&Token::Semicolon);
    Ok(Statement {
        kind: StatementKind::Return(values),
        line,
    })
}

fn parse_if(parser: &mut Parser) -> Result<StatementKind, ParseError> {
    let line = parser.line();
    let mut branches = Vec::new();
    let mut otherwise = None;

    // `if` or `elseif` already current
    loop {
        parser.advance();
        let condition = parse_expression(parser)?;
        parser.expect(&Token::Then)?;
        let body = parse_block(parser)?;
        branches.push((condition, body));
        if !parser.check(&Token::Elseif) {
            break;
        }
    }

    if parser.eat(&Token::Else) {
        otherwise = Some(parse_block(parser)?);
    }
    parser.expect_closing(&Token::End, &Token::If, line)?;

    Ok(StatementKind::If {
        branches,
        otherwise,
    })
}

fn parse_while(parser: &mut Parser) -> Result<StatementKind, ParseError> {
    let line = parser.line();
    parser.advance();
    let condition = parse_expression(parser)?;
    parser.expect(&Token::Do)?;
    let body = parser.in_loop(parse_block)?;
    parser.expect_closing(&Token::End, &Token::While, line)?;
    Ok(StatementKind::While { condition, body })
}

fn parse_repeat(parser: &mut Parser) -> Result<StatementKind, ParseError> {
    let line = parser.line();
    parser.advance();
    let body = parser.in_loop(parse_block)?;
    parser.expect_closing(&Token::Until, &Token::Repeat, line)?;
    let condition = parse_expression(parser)?;
    Ok(StatementKind::Repeat { body, condition })
}

fn parse_for(parser: &mut Parser) -> Result<StatementKind, ParseError> {
    let line = parser.line();
    parser.advance();
    let first = parser.expect_name()?;

    let kind = if parser.eat(&Token::Assign) {
        let start = parse_expression(parser)?;
        parser.expect(&Token::Comma)?;
        let limit = parse_expression(parser)?;
        let step = if parser.eat(&Token::Comma) {
            Some(parse_expression(parser)?)
        } else {
            None
        };
        parser.expect(&Token::Do)?;
        let body = parser.in_loop(parse_block)?;
        StatementKind::NumericFor {
            variable: first,
            start,
            limit,
            step,
            body,
        }
    } else if parser.check(&Token::Comma) || parser.check(&Token::In) {
        let mut names = vec![first];
        while parser.eat(&Token::Comma) {
            names.push(parser.expect_name()?);
        }
        parser.expect(&Token::In)?;
        let values = parse_expression_list(parser)?;
        parser.expect(&Token::Do)?;
        let body = parser.in_loop(parse_block)?;
        StatementKind::GenericFor {
            names,
            values,
            body,
        }
    } else {
        return Err(parser.error("'=' or 'in' expected".to_string()));
    };

    parser.expect_closing(&Token::End, &Token::For, line)?;
    Ok(kind)
}

/// `function a.b.c:m(...) end` desugars to an assignment.
fn parse_function_statement(parser: &mut Parser) -> Result<StatementKind, ParseError> {
    let line = parser.line();
    parser.advance();

    let first = parser.expect_name()?;
    let mut full_name = first.to_string();
    let mut target = Expression::Name(first);
    let mut is_method = false;

    while parser.check(&Token::Dot) || parser.check(&Token::Colon) {
        is_method = parser.check(&Token::Colon);
        let separator = if is_method { ':' } else { '.' };
        let key_line = parser.line();
        parser.advance();
        let key = parser.expect_name()?;
        full_name.push(separator);
        full_name.push_str(&key);
        target = Expression::Index {
            object: Box::new(target),
            key: Box::new(Expression::String(key)),
            line: key_line,
        };
        if is_method {
            break;
        }
    }

    let body = parse_function_body(parser, Some(Rc::from(full_name)), is_method, line)?;
    Ok(StatementKind::Assign {
        targets: vec![target],
        values: vec![Expression::Function(body)],
    })
}

fn parse_local(parser: &mut Parser) -> Result<StatementKind, ParseError> {
    let mut names = vec![parser.expect_name()?];
    while parser.eat(&Token::Comma) {
        names.push(parser.expect_name()?);
    }
    let values = if parser.eat(&Token::Assign) {
        parse_expression_list(parser)?
    } else {
        Vec::new()
    };
    Ok(StatementKind::Local { names, values })
}

fn parse_expression_statement(parser: &mut Parser) -> Result<StatementKind, ParseError> {
    let first = parse_suffixed_expression(parser)?;

    if parser.check(&Token::Assign) || parser.check(&Token::Comma) {
        let mut targets = vec![first];
        while parser.eat(&Token::Comma) {
            targets.push(parse_suffixed_expression(parser)?);
        }
        if targets
            .iter()
            .any(|t| !matches!(t, Expression::Name(_) | Expression::Index { .. }))
        {
            return Err(parser.error("syntax error".to_string()));
        }
        parser.expect(&Token::Assign)?;
        let values = parse_expression_list(parser)?;
        return Ok(StatementKind::Assign { targets, values });
    }

    match first {
        Expression::Call { .. } | Expression::MethodCall { .. } => Ok(StatementKind::Call(first)),
        _ => Err(parser.error("syntax error".to_string())),
    }
}
