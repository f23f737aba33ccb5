//! Statement execution

use super::call::Activation;
use super::scope::Scope;
use super::State;
use crate::parser::ast::{Block, Expression, Statement, StatementKind};
use crate::vm::error::ScriptError;
use crate::vm::value::Value;
use std::rc::Rc;

/// How control leaves a block.
pub(crate) enum Flow {
    Normal,
    Break,
    Return(Vec<Value>),
}

/// Evaluated left-hand side of an assignment.
enum Target {
    Local(super::scope::Cell),
    Global(Rc<str>),
    Index {
        object: Value,
        key: Value,
        description: Option<String>,
    },
}

impl State {
    /// Execute `block` directly in `scope`.
    pub(crate) fn exec_block(
        &self,
        block: &Block,
        scope: &Rc<Scope>,
        activation: &Activation,
    ) -> Result<Flow, ScriptError> {
        for statement in &block.statements {
            match self.exec_statement(statement, scope, activation)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    /// Execute `block` in a fresh child scope.
    fn exec_nested(
        &self,
        block: &Block,
        parent: &Rc<Scope>,
        activation: &Activation,
    ) -> Result<Flow, ScriptError> {
        let scope = self.new_scope(Some(parent.clone()));
        self.exec_block(block, &scope, activation)
    }

    fn exec_statement(
        &self,
        statement: &Statement,
        scope: &Rc<Scope>,
        activation: &Activation,
    ) -> Result<Flow, ScriptError> {
        self.set_line(statement.line);

        match &statement.kind {
            StatementKind::Local { names, values } => {
                let mut values = self.eval_list(values, scope, activation)?;
                values.resize(names.len(), Value::Nil);
                for (name, value) in names.iter().zip(values) {
                    scope.declare(name.clone(), value);
                }
            }

            StatementKind::LocalFunction { name, body } => {
                // Declared first so the body can refer to itself
                let cell = scope.declare(name.clone(), Value::Nil);
                let function = self.make_closure(body, scope, activation);
                *cell.borrow_mut() = function;
            }

            StatementKind::Assign { targets, values } => {
                let mut resolved = Vec::with_capacity(targets.len());
                for target in targets {
                    resolved.push(self.resolve_target(target, scope, activation)?);
                }
                let mut values = self.eval_list(values, scope, activation)?;
                values.resize(resolved.len(), Value::Nil);
                for (target, value) in resolved.into_iter().zip(values) {
                    self.assign(target, value, activation)?;
                }
            }

            StatementKind::Call(call) => {
                self.eval_multi(call, scope, activation)?;
            }

            StatementKind::Do(body) => return self.exec_nested(body, scope, activation),

            StatementKind::While { condition, body } => {
                while self.eval(condition, scope, activation)?.is_truthy() {
                    match self.exec_nested(body, scope, activation)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
            }

            StatementKind::Repeat { body, condition } => loop {
                // The condition sees the body's locals
                let inner = self.new_scope(Some(scope.clone()));
                match self.exec_block(body, &inner, activation)? {
                    Flow::Normal => {}
                    Flow::Break => break,
                    flow @ Flow::Return(_) => return Ok(flow),
                }
                if self.eval(condition, &inner, activation)?.is_truthy() {
                    break;
                }
            },

            StatementKind::If {
                branches,
                otherwise,
            } => {
                for (condition, body) in branches {
                    if self.eval(condition, scope, activation)?.is_truthy() {
                        return self.exec_nested(body, scope, activation);
                    }
                }
                if let Some(body) = otherwise {
                    return self.exec_nested(body, scope, activation);
                }
            }

            StatementKind::NumericFor {
                variable,
                start,
                limit,
                step,
                body,
            } => {
                let start = self.for_number(start, "initial", scope, activation)?;
                let limit = self.for_number(limit, "limit", scope, activation)?;
                let step = match step {
                    Some(step) => self.for_number(step, "step", scope, activation)?,
                    None => 1.0,
                };
                if step == 0.0 {
                    return Err(self.error("'for' step is zero"));
                }

                let mut i = start;
                while (step > 0.0 && i <= limit) || (step < 0.0 && i >= limit) {
                    let inner = self.new_scope(Some(scope.clone()));
                    inner.declare(variable.clone(), Value::Number(i));
                    match self.exec_block(body, &inner, activation)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                    i += step;
                }
            }

            StatementKind::GenericFor {
                names,
                values,
                body,
            } => {
                let mut state = self.eval_list(values, scope, activation)?;
                state.resize(3, Value::Nil);
                let mut state = state.into_iter();
                let iterator = state.next().unwrap_or_default();
                let invariant = state.next().unwrap_or_default();
                let mut control = state.next().unwrap_or_default();

                loop {
                    let mut results = self.call_described(
                        &iterator,
                        vec![invariant.clone(), control.clone()],
                        Some("'for' iterator".to_string()),
                    )?;
                    let first = results.first().cloned().unwrap_or_default();
                    if first.is_nil() {
                        break;
                    }
                    control = first;

                    results.resize(names.len(), Value::Nil);
                    let inner = self.new_scope(Some(scope.clone()));
                    for (name, value) in names.iter().zip(results) {
                        inner.declare(name.clone(), value);
                    }
                    match self.exec_block(body, &inner, activation)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
            }

            StatementKind::Return(values) => {
                return Ok(Flow::Return(self.eval_list(values, scope, activation)?));
            }

            StatementKind::Break => return Ok(Flow::Break),
        }

        Ok(Flow::Normal)
    }

    fn for_number(
        &self,
        expression: &Expression,
        what: &str,
        scope: &Rc<Scope>,
        activation: &Activation,
    ) -> Result<f64, ScriptError> {
        self.eval(expression, scope, activation)?
            .to_number()
            .ok_or_else(|| self.error(format!("'for' {} value must be a number", what)))
    }

    fn resolve_target(
        &self,
        target: &Expression,
        scope: &Rc<Scope>,
        activation: &Activation,
    ) -> Result<Target, ScriptError> {
        match target {
            Expression::Name(name) => Ok(match scope.lookup(name) {
                Some(cell) => Target::Local(cell),
                None => Target::Global(name.clone()),
            }),
            Expression::Index { object, key, .. } => {
                let object_value = self.eval(object, scope, activation)?;
                let key = self.eval(key, scope, activation)?;
                // Only non-tables can fail with a type error
                let description = match object_value {
                    Value::Table(_) => None,
                    _ => self.describe(object, scope),
                };
                Ok(Target::Index {
                    object: object_value,
                    key,
                    description,
                })
            }
            // The parser only produces names and indexing here
            _ => Err(self.error("cannot assign to this expression")),
        }
    }

    fn assign(&self, target: Target, value: Value, activation: &Activation) -> Result<(), ScriptError> {
        match target {
            Target::Local(cell) => {
                let previous = cell.replace(value);
                drop(previous);
                Ok(())
            }
            Target::Global(name) => {
                self.set_index(&Value::Table(activation.env.clone()), Value::String(name), value)
            }
            Target::Index {
                object,
                key,
                description,
            } => self.set_index_described(&object, key, value, description),
        }
    }
}
