//! Metatable-aware operations

use super::State;
use crate::vm::error::ScriptError;
use crate::vm::table::TableRef;
use crate::vm::value::Value;
use std::rc::Rc;

/// Longest `__index`/`__newindex` chain followed before giving up
const MAX_META_CHAIN: usize = 100;

impl State {
    /// Metatable of any value (strings share one).
    pub fn metatable(&self, value: &Value) -> Option<TableRef> {
        match value {
            Value::Table(t) => t.metatable(),
            Value::Userdata(u) => u.metatable(),
            Value::String(_) => self.string_metatable(),
            _ => None,
        }
    }

    pub fn metamethod(&self, value: &Value, event: &str) -> Option<Value> {
        let metatable = self.metatable(value)?;
        let handler = metatable.get_str(event);
        if handler.is_nil() {
            None
        } else {
            Some(handler)
        }
    }

    /// "attempt to <op> <description> (a <type> value)"
    pub(crate) fn type_error(
        &self,
        operation: &str,
        value: &Value,
        description: Option<String>,
    ) -> ScriptError {
        match description {
            Some(description) => self.error(format!(
                "attempt to {} {} (a {} value)",
                operation,
                description,
                value.type_name()
            )),
            None => self.error(format!(
                "attempt to {} a {} value",
                operation,
                value.type_name()
            )),
        }
    }

    /// `object[key]` with `__index`.
    pub fn index(&self, object: &Value, key: &Value) -> Result<Value, ScriptError> {
        self.index_described(object, key, None)
    }

    pub(crate) fn index_described(
        &self,
        object: &Value,
        key: &Value,
        description: Option<String>,
    ) -> Result<Value, ScriptError> {
        let mut current = object.clone();
        for _ in 0..MAX_META_CHAIN {
            if let Value::Table(table) = &current {
                let raw = table.get(key);
                if !raw.is_nil() {
                    return Ok(raw);
                }
            }
            let handler = match self.metamethod(&current, "__index") {
                Some(handler) => handler,
                None if matches!(current, Value::Table(_)) => return Ok(Value::Nil),
                None => {
                    let description = if current.raw_equal(object) { description } else { None };
                    return Err(self.type_error("index", &current, description));
                }
            };
            if let Value::Function(_) = handler {
                let results = self.call_value(&handler, vec![current, key.clone()])?;
                return Ok(results.into_iter().next().unwrap_or_default());
            }
            current = handler;
        }
        Err(self.error("loop in gettable"))
    }

    /// `object[key] = value` with `__newindex`.
    pub fn set_index(&self, object: &Value, key: Value, value: Value) -> Result<(), ScriptError> {
        self.set_index_described(object, key, value, None)
    }

    pub(crate) fn set_index_described(
        &self,
        object: &Value,
        key: Value,
        value: Value,
        description: Option<String>,
    ) -> Result<(), ScriptError> {
        let mut current = object.clone();
        for _ in 0..MAX_META_CHAIN {
            if let Value::Table(table) = &current {
                let existing = table.get(&key);
                let handler = if existing.is_nil() {
                    self.metamethod(&current, "__newindex")
                } else {
                    None
                };
                match handler {
                    None => return self.raw_set(table, key, value),
                    Some(Value::Function(f)) => {
                        self.call_value(&Value::Function(f), vec![current.clone(), key, value])?;
                        return Ok(());
                    }
                    Some(next) => {
                        current = next;
                        continue;
                    }
                }
            }

            match self.metamethod(&current, "__newindex") {
                Some(Value::Function(f)) => {
                    self.call_value(&Value::Function(f), vec![current.clone(), key, value])?;
                    return Ok(());
                }
                Some(next) => current = next,
                None => {
                    let description = if current.raw_equal(object) { description } else { None };
                    return Err(self.type_error("index", &current, description));
                }
            }
        }
        Err(self.error("loop in settable"))
    }

    /// Raw store turning invalid keys into script errors.
    pub fn raw_set(&self, table: &TableRef, key: Value, value: Value) -> Result<(), ScriptError> {
        table.set(key, value).map_err(|err| self.error(err.to_string()))
    }

    /// Conversion to text honouring `__tostring`.
    pub fn tostring(&self, value: &Value) -> Result<Rc<str>, ScriptError> {
        if let Some(handler) = self.metamethod(value, "__tostring") {
            let result = self.call_value(&handler, vec![value.clone()])?;
            return match result.into_iter().next() {
                Some(Value::String(s)) => Ok(s),
                Some(Value::Number(n)) => Ok(Rc::from(crate::vm::value::format_number(n))),
                _ => Err(self.error("'__tostring' must return a string")),
            };
        }
        match value {
            Value::String(s) => Ok(s.clone()),
            other => Ok(Rc::from(other.to_string())),
        }
    }
}
