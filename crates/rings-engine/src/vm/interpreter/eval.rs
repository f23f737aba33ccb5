//! Expression evaluation

use super::call::Activation;
use super::scope::Scope;
use super::State;
use crate::parser::ast::{BinaryOp, Expression, FunctionBody, TableField, UnaryOp};
use crate::vm::error::ScriptError;
use crate::vm::object::{Closure, Function};
use crate::vm::value::Value;
use std::cell::RefCell;
use std::rc::Rc;

impl State {
    /// Evaluate to exactly one value.
    pub(crate) fn eval(
        &self,
        expression: &Expression,
        scope: &Rc<Scope>,
        activation: &Activation,
    ) -> Result<Value, ScriptError> {
        match expression {
            Expression::Nil => Ok(Value::Nil),
            Expression::True => Ok(Value::Boolean(true)),
            Expression::False => Ok(Value::Boolean(false)),
            Expression::Number(n) => Ok(Value::Number(*n)),
            Expression::String(s) => Ok(Value::String(s.clone())),
            Expression::Vararg => Ok(activation.varargs.first().cloned().unwrap_or_default()),
            Expression::Function(body) => Ok(self.make_closure(body, scope, activation)),
            Expression::Name(name) => match scope.lookup(name) {
                Some(cell) => Ok(cell.borrow().clone()),
                None => self.index(
                    &Value::Table(activation.env.clone()),
                    &Value::String(name.clone()),
                ),
            },
            Expression::Index { object, key, line } => {
                let object_value = self.eval(object, scope, activation)?;
                let key = self.eval(key, scope, activation)?;
                self.set_line(*line);
                match object_value {
                    Value::Table(_) => self.index(&object_value, &key),
                    _ => self.index_described(&object_value, &key, self.describe(object, scope)),
                }
            }
            Expression::Call { .. } | Expression::MethodCall { .. } => Ok(self
                .eval_multi(expression, scope, activation)?
                .into_iter()
                .next()
                .unwrap_or_default()),
            Expression::Binary {
                op,
                left,
                right,
                line,
            } => self.eval_binary(*op, left, right, *line, scope, activation),
            Expression::Unary { op, operand, line } => {
                let value = self.eval(operand, scope, activation)?;
                self.set_line(*line);
                match op {
                    UnaryOp::Not => Ok(Value::Boolean(!value.is_truthy())),
                    UnaryOp::Neg => match value.to_number() {
                        Some(n) => Ok(Value::Number(-n)),
                        None => Err(self.type_error(
                            "perform arithmetic on",
                            &value,
                            self.describe(operand, scope),
                        )),
                    },
                    UnaryOp::Len => match &value {
                        Value::String(s) => Ok(Value::Number(s.len() as f64)),
                        Value::Table(t) => Ok(Value::Number(t.borrow().border() as f64)),
                        other => Err(self.type_error(
                            "get length of",
                            other,
                            self.describe(operand, scope),
                        )),
                    },
                }
            }
            Expression::Table(fields) => self.eval_table(fields, scope, activation),
            Expression::Paren(inner) => self.eval(inner, scope, activation),
        }
    }

    /// Evaluate keeping every value a call or `...` produces.
    pub(crate) fn eval_multi(
        &self,
        expression: &Expression,
        scope: &Rc<Scope>,
        activation: &Activation,
    ) -> Result<Vec<Value>, ScriptError> {
        match expression {
            Expression::Call { callee, args, line } => {
                let function = self.eval(callee, scope, activation)?;
                let args = self.eval_list(args, scope, activation)?;
                self.set_line(*line);
                let description = match function {
                    Value::Function(_) => None,
                    _ => self.describe(callee, scope),
                };
                self.call_described(&function, args, description)
            }
            Expression::MethodCall {
                object,
                method,
                args,
                line,
            } => {
                let object_value = self.eval(object, scope, activation)?;
                let key = Value::String(method.clone());
                self.set_line(*line);
                let function = match object_value {
                    Value::Table(_) => self.index(&object_value, &key)?,
                    _ => self.index_described(&object_value, &key, self.describe(object, scope))?,
                };

                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(object_value);
                full.extend(self.eval_list(args, scope, activation)?);
                self.set_line(*line);
                let description = match function {
                    Value::Function(_) => None,
                    _ => Some(format!("method '{}'", method)),
                };
                self.call_described(&function, full, description)
            }
            Expression::Vararg => Ok(activation.varargs.clone()),
            other => Ok(vec![self.eval(other, scope, activation)?]),
        }
    }

    /// Evaluate a list; only the last expression may expand.
    pub(crate) fn eval_list(
        &self,
        expressions: &[Expression],
        scope: &Rc<Scope>,
        activation: &Activation,
    ) -> Result<Vec<Value>, ScriptError> {
        let mut values = Vec::with_capacity(expressions.len());
        if let Some((last, init)) = expressions.split_last() {
            for expression in init {
                values.push(self.eval(expression, scope, activation)?);
            }
            if last.is_multi_valued() {
                values.extend(self.eval_multi(last, scope, activation)?);
            } else {
                values.push(self.eval(last, scope, activation)?);
            }
        }
        Ok(values)
    }

    pub(crate) fn make_closure(
        &self,
        body: &Rc<FunctionBody>,
        scope: &Rc<Scope>,
        activation: &Activation,
    ) -> Value {
        Value::Function(Rc::new(Function::Script(Closure {
            body: body.clone(),
            chunk: activation.chunk.clone(),
            scope: scope.clone(),
            env: RefCell::new(activation.env.clone()),
        })))
    }

    /// Name an expression for error messages, when it has one.
    pub(crate) fn describe(&self, expression: &Expression, scope: &Scope) -> Option<String> {
        match expression {
            Expression::Name(name) => Some(if scope.lookup(name).is_some() {
                format!("local '{}'", name)
            } else {
                format!("global '{}'", name)
            }),
            Expression::Index { key, .. } => match &**key {
                Expression::String(field) => Some(format!("field '{}'", field)),
                _ => None,
            },
            _ => None,
        }
    }

    fn eval_binary(
        &self,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
        line: u32,
        scope: &Rc<Scope>,
        activation: &Activation,
    ) -> Result<Value, ScriptError> {
        let lhs = self.eval(left, scope, activation)?;
        match op {
            BinaryOp::And if !lhs.is_truthy() => return Ok(lhs),
            BinaryOp::Or if lhs.is_truthy() => return Ok(lhs),
            BinaryOp::And | BinaryOp::Or => return self.eval(right, scope, activation),
            _ => {}
        }
        let rhs = self.eval(right, scope, activation)?;
        self.set_line(line);

        match op {
            BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::Mod
            | BinaryOp::Pow => match (lhs.to_number(), rhs.to_number()) {
                (Some(a), Some(b)) => Ok(Value::Number(arith(op, a, b))),
                (None, _) => Err(self.type_error(
                    "perform arithmetic on",
                    &lhs,
                    self.describe(left, scope),
                )),
                (_, None) => Err(self.type_error(
                    "perform arithmetic on",
                    &rhs,
                    self.describe(right, scope),
                )),
            },
            BinaryOp::Concat => match (lhs.to_text(), rhs.to_text()) {
                (Some(a), Some(b)) => {
                    let mut text = String::with_capacity(a.len() + b.len());
                    text.push_str(&a);
                    text.push_str(&b);
                    Ok(Value::from(text))
                }
                (None, _) => Err(self.type_error("concatenate", &lhs, self.describe(left, scope))),
                (_, None) => Err(self.type_error("concatenate", &rhs, self.describe(right, scope))),
            },
            BinaryOp::Eq => Ok(Value::Boolean(lhs.raw_equal(&rhs))),
            BinaryOp::Ne => Ok(Value::Boolean(!lhs.raw_equal(&rhs))),
            BinaryOp::Lt => self.less_than(&lhs, &rhs).map(Value::Boolean),
            BinaryOp::Le => self.less_equal(&lhs, &rhs).map(Value::Boolean),
            BinaryOp::Gt => self.less_than(&rhs, &lhs).map(Value::Boolean),
            BinaryOp::Ge => self.less_equal(&rhs, &lhs).map(Value::Boolean),
            BinaryOp::And | BinaryOp::Or => Ok(rhs),
        }
    }

    pub(crate) fn less_than(&self, a: &Value, b: &Value) -> Result<bool, ScriptError> {
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => Ok(x < y),
            (Value::String(x), Value::String(y)) => Ok(x < y),
            _ => Err(self.compare_error(a, b)),
        }
    }

    fn less_equal(&self, a: &Value, b: &Value) -> Result<bool, ScriptError> {
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => Ok(x <= y),
            (Value::String(x), Value::String(y)) => Ok(x <= y),
            _ => Err(self.compare_error(a, b)),
        }
    }

    fn compare_error(&self, a: &Value, b: &Value) -> ScriptError {
        if a.type_name() == b.type_name() {
            self.error(format!("attempt to compare two {} values", a.type_name()))
        } else {
            self.error(format!(
                "attempt to compare {} with {}",
                a.type_name(),
                b.type_name()
            ))
        }
    }

    fn eval_table(
        &self,
        fields: &[TableField],
        scope: &Rc<Scope>,
        activation: &Activation,
    ) -> Result<Value, ScriptError> {
        let table = self.new_table();
        let mut position = 1usize;

        for (i, field) in fields.iter().enumerate() {
            match field {
                TableField::Keyed(key, value) => {
                    let key = self.eval(key, scope, activation)?;
                    let value = self.eval(value, scope, activation)?;
                    self.raw_set(&table, key, value)?;
                }
                TableField::Positional(expression)
                    if i + 1 == fields.len() && expression.is_multi_valued() =>
                {
                    for value in self.eval_multi(expression, scope, activation)? {
                        self.raw_set(&table, Value::Number(position as f64), value)?;
                        position += 1;
                    }
                }
                TableField::Positional(expression) => {
                    let value = self.eval(expression, scope, activation)?;
                    self.raw_set(&table, Value::Number(position as f64), value)?;
                    position += 1;
                }
            }
        }

        Ok(Value::Table(table))
    }
}

fn arith(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a - (a / b).floor() * b,
        BinaryOp::Pow => a.powf(b),
        _ => f64::NAN,
    }
}
