//! Remote objects used across unit and behaviour tests.

use std::sync::Mutex;

use easycluster_wire::TypeDescriptor;

use crate::objects::{Args, CallError, RemoteObject, Value};

/// Shared integer with `increment`, `add` and `read` methods.
#[derive(Debug, Default)]
pub struct Counter {
    value: Mutex<i64>,
}

impl Counter {
    fn adjust(&self, delta: i64) -> i64 {
        let mut value = self.value.lock().expect("counter mutex poisoned");
        *value += delta;
        *value
    }
}

impl RemoteObject for Counter {
    fn descriptor(&self) -> TypeDescriptor {
        TypeDescriptor::named("Counter").with_methods(["increment", "add", "read"])
    }

    fn call_method(&self, method: &str, args: Args) -> Result<Value, CallError> {
        match method {
            "increment" => Ok(Value::Int(self.adjust(1))),
            "add" => Ok(Value::Int(self.adjust(args.require_int(0, "amount")?))),
            "read" => Ok(Value::Int(self.adjust(0))),
            other => Err(CallError::NoMethod {
                type_name: "Counter".to_owned(),
                method: other.to_owned(),
            }),
        }
    }
}

/// Text holder with a readable, writable but undeletable `text` attribute.
#[derive(Debug)]
pub struct Label {
    text: Mutex<String>,
}

impl Label {
    pub fn new(text: &str) -> Self {
        Self {
            text: Mutex::new(text.to_owned()),
        }
    }

    fn text(&self) -> String {
        self.text.lock().expect("label mutex poisoned").clone()
    }
}

impl RemoteObject for Label {
    fn descriptor(&self) -> TypeDescriptor {
        TypeDescriptor::named("Label")
            .with_methods(["upper"])
            .with_attributes(["text"])
    }

    fn call_method(&self, method: &str, _args: Args) -> Result<Value, CallError> {
        match method {
            "upper" => Ok(Value::from(self.text().to_uppercase())),
            other => Err(CallError::NoMethod {
                type_name: "Label".to_owned(),
                method: other.to_owned(),
            }),
        }
    }

    fn get_attribute(&self, name: &str) -> Result<Value, CallError> {
        match name {
            "text" => Ok(Value::from(self.text())),
            other => Err(CallError::NoAttribute {
                type_name: "Label".to_owned(),
                name: other.to_owned(),
            }),
        }
    }

    fn set_attribute(&self, name: &str, value: Value) -> Result<(), CallError> {
        if name != "text" {
            return Err(CallError::NoAttribute {
                type_name: "Label".to_owned(),
                name: name.to_owned(),
            });
        }
        let Value::Str(text) = value else {
            return Err(CallError::WrongType {
                name: "text".to_owned(),
                expected: "str",
                found: value.type_name(),
            });
        };
        *self.text.lock().expect("label mutex poisoned") = text;
        Ok(())
    }
}
