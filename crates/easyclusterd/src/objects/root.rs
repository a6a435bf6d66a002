//! The object every connection starts with, at handle zero.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use easycluster_wire::{PROTOCOL_VERSION, TypeDescriptor};

use super::{Args, CallError, ObjectRef, RemoteObject, Services, Successor, Value};

/// Methods the root object answers.
pub const ROOT_METHODS: &[&str] = &[
    "get_global",
    "set_global",
    "list_globals",
    "call",
    "getattr",
    "getmethod",
    "setattr",
    "delattr",
    "server_version",
    "upgrade",
];

/// Entry point for a client: connection-scoped globals, registered
/// functions, attribute access on other objects and hot-swap upgrades.
#[derive(Debug)]
pub struct RootObject {
    services: Services,
    globals: Mutex<BTreeMap<String, Value>>,
}

impl RootObject {
    /// Root object with freshly instantiated globals.
    #[must_use]
    pub fn new(services: &Services) -> Self {
        Self {
            services: services.clone(),
            globals: Mutex::new(services.instantiate_globals()),
        }
    }

    fn globals(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        // Globals stay usable after a panicking writer; each entry is replaced
        // atomically under the lock.
        self.globals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs the named upgrade hook, producing the connection's successor.
    pub fn upgrade(&self, args: &Args) -> Result<Successor, CallError> {
        let name = args.require_str(0, "name")?;
        let data = args.get(1, "data").cloned().unwrap_or_default();
        let hook = self
            .services
            .upgrade_hook(name)
            .ok_or_else(|| CallError::UnknownName {
                name: name.to_owned(),
            })?;
        let services = hook.upgrade(data)?;
        Ok(Successor { services })
    }

    fn get_global(&self, args: &Args) -> Result<Value, CallError> {
        let name = args.require_str(0, "name")?;
        self.globals()
            .get(name)
            .cloned()
            .ok_or_else(|| CallError::UnknownName {
                name: name.to_owned(),
            })
    }

    fn set_global(&self, args: &Args) -> Result<Value, CallError> {
        let name = args.require_str(0, "name")?;
        let value = args.require(1, "value")?.clone();
        self.globals().insert(name.to_owned(), value);
        Ok(Value::Null)
    }

    fn list_globals(&self) -> Value {
        Value::List(self.globals().keys().map(|name| Value::from(name.as_str())).collect())
    }

    fn call(&self, args: Args) -> Result<Value, CallError> {
        let (leading, rest) = args.split_leading(1);
        match leading.first() {
            Some(Value::Str(name)) => {
                let function =
                    self.services
                        .function(name)
                        .ok_or_else(|| CallError::UnknownName {
                            name: name.clone(),
                        })?;
                function.invoke(rest)
            }
            Some(Value::Object(object)) => object.call_method("__call__", rest),
            Some(other) => Err(CallError::WrongType {
                name: "func".to_owned(),
                expected: "str or object",
                found: other.type_name(),
            }),
            None => Err(CallError::MissingArgument {
                name: "func".to_owned(),
            }),
        }
    }

    fn target_and_attribute<'a>(args: &'a Args) -> Result<(&'a ObjectRef, &'a str), CallError> {
        Ok((
            args.require_object(0, "obj")?,
            args.require_str(1, "attr")?,
        ))
    }

    fn getmethod(args: &Args) -> Result<Value, CallError> {
        let (object, attribute) = Self::target_and_attribute(args)?;
        if object.descriptor().has_method(attribute) {
            return Ok(Value::List(vec![Value::Bool(true), Value::Null]));
        }
        let value = object.get_attribute(attribute)?;
        Ok(Value::List(vec![Value::Bool(false), value]))
    }
}

impl RemoteObject for RootObject {
    fn descriptor(&self) -> TypeDescriptor {
        TypeDescriptor::named("RootObject").with_methods(ROOT_METHODS.iter().copied())
    }

    fn call_method(&self, method: &str, args: Args) -> Result<Value, CallError> {
        match method {
            "get_global" => self.get_global(&args),
            "set_global" => self.set_global(&args),
            "list_globals" => Ok(self.list_globals()),
            "call" => self.call(args),
            "getattr" => {
                let (object, attribute) = Self::target_and_attribute(&args)?;
                object.get_attribute(attribute)
            }
            "getmethod" => Self::getmethod(&args),
            "setattr" => {
                let (object, attribute) = Self::target_and_attribute(&args)?;
                let value = args.require(2, "value")?.clone();
                object.set_attribute(attribute, value)?;
                Ok(Value::Null)
            }
            "delattr" => {
                let (object, attribute) = Self::target_and_attribute(&args)?;
                object.delete_attribute(attribute)?;
                Ok(Value::Null)
            }
            "server_version" => Ok(Value::from(PROTOCOL_VERSION)),
            "upgrade" => Err(CallError::application(
                "UpgradeError",
                "upgrade must be requested directly on the root handle",
            )),
            other => Err(CallError::NoMethod {
                type_name: "RootObject".to_owned(),
                method: other.to_owned(),
            }),
        }
    }
}
