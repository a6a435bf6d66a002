//! Application-supplied globals, functions and upgrade hooks.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::{Args, CallError, Value};

/// Function callable through the root object's `call` method.
pub trait RemoteFunction: Send + Sync + 'static {
    /// Runs the function.
    fn invoke(&self, args: Args) -> Result<Value, CallError>;
}

impl<F> RemoteFunction for F
where
    F: Fn(Args) -> Result<Value, CallError> + Send + Sync + 'static,
{
    fn invoke(&self, args: Args) -> Result<Value, CallError> {
        self(args)
    }
}

/// Produces the services that replace the current ones on a hot swap.
pub trait UpgradeHook: Send + Sync + 'static {
    /// Builds successor services from the caller's upgrade payload.
    fn upgrade(&self, data: Value) -> Result<Services, CallError>;
}

impl<F> UpgradeHook for F
where
    F: Fn(Value) -> Result<Services, CallError> + Send + Sync + 'static,
{
    fn upgrade(&self, data: Value) -> Result<Services, CallError> {
        self(data)
    }
}

type GlobalFactory = Arc<dyn Fn() -> Value + Send + Sync>;

#[derive(Default)]
struct Registry {
    globals: BTreeMap<String, GlobalFactory>,
    functions: BTreeMap<String, Arc<dyn RemoteFunction>>,
    upgrades: BTreeMap<String, Arc<dyn UpgradeHook>>,
}

/// Everything a connection's root object can reach.
///
/// Globals are built from factories once per connection, so connections
/// share state only when a factory hands out the same object.
#[derive(Clone, Default)]
pub struct Services {
    registry: Arc<Registry>,
}

impl Services {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> ServicesBuilder {
        ServicesBuilder::default()
    }

    /// Fresh set of globals for a new connection.
    #[must_use]
    pub fn instantiate_globals(&self) -> BTreeMap<String, Value> {
        self.registry
            .globals
            .iter()
            .map(|(name, factory)| (name.clone(), factory()))
            .collect()
    }

    /// Registered function by name.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<Arc<dyn RemoteFunction>> {
        self.registry.functions.get(name).cloned()
    }

    /// Registered upgrade hook by name.
    #[must_use]
    pub fn upgrade_hook(&self, name: &str) -> Option<Arc<dyn UpgradeHook>> {
        self.registry.upgrades.get(name).cloned()
    }

    /// Names of registered functions.
    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.registry.functions.keys().map(String::as_str)
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("globals", &self.registry.globals.keys().collect::<Vec<_>>())
            .field(
                "functions",
                &self.registry.functions.keys().collect::<Vec<_>>(),
            )
            .field("upgrades", &self.registry.upgrades.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`Services`].
#[derive(Default)]
pub struct ServicesBuilder {
    registry: Registry,
}

impl ServicesBuilder {
    /// Registers a global built afresh for every connection.
    #[must_use]
    pub fn global<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.registry.globals.insert(name.into(), Arc::new(factory));
        self
    }

    /// Registers a global holding a clone of `value`. Object values are
    /// shared by every connection.
    #[must_use]
    pub fn global_value(self, name: impl Into<String>, value: Value) -> Self {
        self.global(name, move || value.clone())
    }

    /// Registers a function.
    #[must_use]
    pub fn function<F: RemoteFunction>(mut self, name: impl Into<String>, function: F) -> Self {
        self.registry
            .functions
            .insert(name.into(), Arc::new(function));
        self
    }

    /// Registers an upgrade hook.
    #[must_use]
    pub fn upgrade<H: UpgradeHook>(mut self, name: impl Into<String>, hook: H) -> Self {
        self.registry.upgrades.insert(name.into(), Arc::new(hook));
        self
    }

    /// Finishes the builder.
    #[must_use]
    pub fn build(self) -> Services {
        Services {
            registry: Arc::new(self.registry),
        }
    }
}

/// Services that take over a connection after a hot swap.
#[derive(Debug, Clone)]
pub struct Successor {
    /// Replacement services.
    pub services: Services,
}
