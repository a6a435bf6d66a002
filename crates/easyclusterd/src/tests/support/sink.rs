//! Reply sink that records responses and aborts for assertions.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use easycluster_wire::{Outcome, ResponseMessage, WireValue};

use crate::dispatch::{DispatchError, ReplySink};

/// Records every response and abort instead of writing to a socket.
#[derive(Debug, Default)]
pub struct RecordingSink {
    responses: Mutex<Vec<ResponseMessage>>,
    arrived: Condvar,
    aborts: Mutex<Vec<String>>,
}

impl RecordingSink {
    /// Response with the given id, if one was sent.
    pub fn response(&self, id: u64) -> Option<ResponseMessage> {
        self.responses
            .lock()
            .expect("sink mutex poisoned")
            .iter()
            .find(|response| response.id == id)
            .cloned()
    }

    /// Handle of the remote reference returned by response `id`.
    pub fn remote_handle(&self, id: u64) -> Option<u64> {
        match self.response(id)?.outcome {
            Outcome::Value(WireValue::Remote(reference)) => Some(reference.handle),
            _ => None,
        }
    }

    pub fn response_count(&self) -> usize {
        self.responses.lock().expect("sink mutex poisoned").len()
    }

    pub fn abort_count(&self) -> usize {
        self.aborts.lock().expect("sink mutex poisoned").len()
    }

    /// Blocks until response `id` arrives or `timeout` elapses.
    pub fn wait_for_response(&self, id: u64, timeout: Duration) -> bool {
        let guard = self.responses.lock().expect("sink mutex poisoned");
        let (guard, _) = self
            .arrived
            .wait_timeout_while(guard, timeout, |responses| {
                responses.iter().all(|response| response.id != id)
            })
            .expect("sink mutex poisoned");
        guard.iter().any(|response| response.id == id)
    }
}

impl ReplySink for RecordingSink {
    fn respond(&self, response: &ResponseMessage) -> Result<(), DispatchError> {
        self.responses
            .lock()
            .expect("sink mutex poisoned")
            .push(response.clone());
        self.arrived.notify_all();
        Ok(())
    }

    fn abort(&self, error: &DispatchError) {
        self.aborts
            .lock()
            .expect("sink mutex poisoned")
            .push(error.to_string());
    }
}
