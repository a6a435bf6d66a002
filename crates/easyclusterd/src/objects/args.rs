use std::collections::BTreeMap;

use super::{CallError, ObjectRef, Value};

/// Decoded call arguments.
///
/// Accessors take both a position and a name so a parameter can be passed
/// either way, the keyword winning when both are present.
#[derive(Debug, Clone, Default)]
pub struct Args {
    positional: Vec<Value>,
    keyword: BTreeMap<String, Value>,
}

impl Args {
    /// Builds arguments from their parts.
    #[must_use]
    pub const fn new(positional: Vec<Value>, keyword: BTreeMap<String, Value>) -> Self {
        Self {
            positional,
            keyword,
        }
    }

    /// Positional arguments only.
    #[must_use]
    pub fn positional(values: Vec<Value>) -> Self {
        Self::new(values, BTreeMap::new())
    }

    /// Positional arguments in order.
    #[must_use]
    pub fn positional_values(&self) -> &[Value] {
        &self.positional
    }

    /// Keyword arguments.
    #[must_use]
    pub const fn keyword_values(&self) -> &BTreeMap<String, Value> {
        &self.keyword
    }

    /// Argument at `index` or named `name`.
    #[must_use]
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.keyword.get(name).or_else(|| self.positional.get(index))
    }

    /// Argument that must be present.
    pub fn require(&self, index: usize, name: &str) -> Result<&Value, CallError> {
        self.get(index, name)
            .ok_or_else(|| CallError::MissingArgument {
                name: name.to_owned(),
            })
    }

    /// Required text argument.
    pub fn require_str(&self, index: usize, name: &str) -> Result<&str, CallError> {
        let value = self.require(index, name)?;
        value.as_str().ok_or_else(|| wrong_type(name, "str", value))
    }

    /// Required integer argument.
    pub fn require_int(&self, index: usize, name: &str) -> Result<i64, CallError> {
        let value = self.require(index, name)?;
        value.as_int().ok_or_else(|| wrong_type(name, "int", value))
    }

    /// Required object argument.
    pub fn require_object(&self, index: usize, name: &str) -> Result<&ObjectRef, CallError> {
        let value = self.require(index, name)?;
        value
            .as_object()
            .ok_or_else(|| wrong_type(name, "object", value))
    }

    /// Splits off the first `count` positional arguments, returning them and
    /// the remaining arguments (keywords included).
    #[must_use]
    pub fn split_leading(mut self, count: usize) -> (Vec<Value>, Self) {
        let rest = self
            .positional
            .split_off(count.min(self.positional.len()));
        let leading = std::mem::replace(&mut self.positional, rest);
        (leading, self)
    }
}

fn wrong_type(name: &str, expected: &'static str, found: &Value) -> CallError {
    CallError::WrongType {
        name: name.to_owned(),
        expected,
        found: found.type_name(),
    }
}
