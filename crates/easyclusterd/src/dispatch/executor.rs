//! Executes a single pending request against the connection's objects.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use easycluster_wire::{Outcome, ResponseMessage};
use tracing::{debug, warn};

use super::DISPATCH_TARGET;
use super::errors::DispatchError;
use super::request::PendingRequest;
use crate::objects::codec::{decode_value, encode_value};
use crate::objects::{
    Args, CallError, ObjectRef, ROOT_HANDLE, RemoteObject, RemoteObjectTable, RootObject,
    Services, Successor, Value,
};

/// Outbound half of a connection as seen by request workers.
pub trait ReplySink: Send + Sync {
    /// Sends a response frame.
    ///
    /// # Errors
    ///
    /// Returns an error when the response cannot be encoded or written.
    fn respond(&self, response: &ResponseMessage) -> Result<(), DispatchError>;

    /// Reports a fatal error to the peer and shuts the connection down so
    /// the receive loop stops waiting for input.
    fn abort(&self, error: &DispatchError);
}

/// What the connection does after a request has run.
#[derive(Debug)]
pub enum Step {
    /// Keep serving.
    Done,
    /// Hand the session over to successor services once the current work
    /// has drained.
    Replace(Successor),
}

/// State shared by the receive loop and every worker of one connection.
pub struct ExecutionContext {
    table: Mutex<RemoteObjectTable>,
    root: Arc<RootObject>,
    replies: Arc<dyn ReplySink>,
    handoff: Mutex<Option<Successor>>,
    fatal: Mutex<Option<DispatchError>>,
}

impl ExecutionContext {
    /// Context with a fresh root object and table built from `services`.
    pub fn new(services: &Services, replies: Arc<dyn ReplySink>) -> Self {
        let root = Arc::new(RootObject::new(services));
        let root_ref = ObjectRef::from_arc(Arc::clone(&root) as Arc<dyn RemoteObject>);
        Self {
            table: Mutex::new(RemoteObjectTable::new(root_ref)),
            root,
            replies,
            handoff: Mutex::new(None),
            fatal: Mutex::new(None),
        }
    }

    /// Locks the object table.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Poisoned`] when a thread panicked while
    /// holding the lock.
    pub fn table(&self) -> Result<MutexGuard<'_, RemoteObjectTable>, DispatchError> {
        self.table.lock().map_err(|_| DispatchError::Poisoned)
    }

    /// Releases handles the peer reported as garbage.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Poisoned`] when the table lock is poisoned.
    pub fn release(&self, handles: &[u64]) -> Result<usize, DispatchError> {
        if handles.is_empty() {
            return Ok(0);
        }
        let released = self.table()?.release(handles);
        debug!(
            target: DISPATCH_TARGET,
            reported = handles.len(),
            released,
            "released garbage handles"
        );
        Ok(released)
    }

    /// Records a successor for the receive loop to pick up. Only the first
    /// successor is kept.
    pub fn hand_off(&self, successor: Successor) {
        if let Ok(mut slot) = self.handoff.lock()
            && slot.is_none()
        {
            *slot = Some(successor);
        }
    }

    /// Takes the pending successor, if any.
    pub fn take_handoff(&self) -> Option<Successor> {
        self.handoff.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Records a fatal error and asks the sink to abort the connection.
    /// Only the first error is kept.
    pub fn fail(&self, error: DispatchError) {
        warn!(target: DISPATCH_TARGET, error = %error, "request failed fatally");
        self.replies.abort(&error);
        if let Ok(mut slot) = self.fatal.lock()
            && slot.is_none()
        {
            *slot = Some(error);
        }
    }

    /// Takes the recorded fatal error, if any.
    pub fn take_fatal(&self) -> Option<DispatchError> {
        self.fatal.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Applies the outcome of a request run off the receive loop.
    pub fn settle(&self, result: Result<Step, DispatchError>) {
        match result {
            Ok(Step::Done) => {}
            Ok(Step::Replace(successor)) => self.hand_off(successor),
            Err(error) => self.fail(error),
        }
    }

    fn reply(&self, id: Option<u64>, result: Result<Value, CallError>) -> Result<(), DispatchError> {
        let Some(id) = id else {
            if let Err(error) = result {
                debug!(
                    target: DISPATCH_TARGET,
                    error = %error,
                    "call without id failed; no response sent"
                );
            }
            return Ok(());
        };
        let outcome = match result {
            Ok(value) => Outcome::Value(encode_value(&mut *self.table()?, &value)),
            Err(error) => Outcome::Error(error.to_remote()),
        };
        self.replies.respond(&ResponseMessage { id, outcome })
    }
}

/// Runs one request to completion, replying when it carries an id.
///
/// Application errors and panics are returned to the caller as remote
/// errors. Unknown handles and undecodable arguments end the connection.
/// An accepted `upgrade` on the root handle is answered before the
/// successor is returned as [`Step::Replace`].
///
/// # Errors
///
/// Returns a [`DispatchError`] for protocol violations and reply failures.
pub fn execute(context: &ExecutionContext, request: PendingRequest) -> Result<Step, DispatchError> {
    let PendingRequest {
        id,
        target,
        method,
        args,
        kwargs,
    } = request;

    let (object, args) = {
        let table = context.table()?;
        let object = table.resolve(target)?;
        let positional = args
            .into_iter()
            .map(|wire| decode_value(&table, wire))
            .collect::<Result<Vec<_>, _>>()?;
        let keyword = kwargs
            .into_iter()
            .map(|(name, wire)| decode_value(&table, wire).map(|value| (name, value)))
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        (object, Args::new(positional, keyword))
    };

    debug!(target: DISPATCH_TARGET, target_handle = target, method = %method, "executing request");

    if target == ROOT_HANDLE && method == "upgrade" {
        return match guarded(|| context.root.upgrade(&args)) {
            Ok(successor) => {
                context.reply(id, Ok(Value::Null))?;
                Ok(Step::Replace(successor))
            }
            Err(error) => {
                context.reply(id, Err(error))?;
                Ok(Step::Done)
            }
        };
    }

    let result = guarded(|| object.call_method(&method, args));
    context.reply(id, result)?;
    Ok(Step::Done)
}

fn guarded<T>(call: impl FnOnce() -> Result<T, CallError>) -> Result<T, CallError> {
    panic::catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        Err(CallError::Panicked {
            message: panic_message(&*payload),
        })
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic with a non-string payload".to_owned())
}
