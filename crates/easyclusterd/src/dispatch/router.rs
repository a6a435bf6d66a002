//! Routes requests to the receive loop, throwaway threads or line workers.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use super::DISPATCH_TARGET;
use super::errors::DispatchError;
use super::executor::{ExecutionContext, Step, execute};
use super::request::{LogicalLine, PendingRequest, Route};

enum LineCommand {
    Run(PendingRequest),
    End,
}

/// Worker thread draining one logical line's queue in order.
struct LineWorker {
    line: LogicalLine,
    sender: Sender<LineCommand>,
    handle: JoinHandle<()>,
}

impl LineWorker {
    fn start(line: &LogicalLine, context: Arc<ExecutionContext>) -> Result<Self, DispatchError> {
        let (sender, receiver) = mpsc::channel();
        let worker_line = line.clone();
        let handle = thread::Builder::new()
            .name(format!("easycluster-line-{line}"))
            .spawn(move || run_line(&worker_line, &receiver, &context))
            .map_err(|source| DispatchError::Spawn {
                line: format!("line {line}"),
                source,
            })?;
        debug!(target: DISPATCH_TARGET, line = %line, "line worker started");
        Ok(Self {
            line: line.clone(),
            sender,
            handle,
        })
    }

    fn enqueue(&self, request: PendingRequest) -> Result<(), DispatchError> {
        self.sender
            .send(LineCommand::Run(request))
            .map_err(|_| DispatchError::LineClosed {
                line: self.line.clone(),
            })
    }

    fn finish(self) -> JoinHandle<()> {
        // A worker that already exited has nothing left to drain.
        let _ = self.sender.send(LineCommand::End);
        self.handle
    }
}

fn run_line(line: &LogicalLine, receiver: &Receiver<LineCommand>, context: &ExecutionContext) {
    while let Ok(LineCommand::Run(request)) = receiver.recv() {
        let result = execute(context, request);
        let fatal = result.is_err();
        context.settle(result);
        if fatal {
            break;
        }
    }
    debug!(target: DISPATCH_TARGET, line = %line, "line worker finished");
}

/// Per-connection router from requests to the thread that runs them.
///
/// Requests for the same line run one at a time in arrival order on that
/// line's worker. Different lines, detached requests and the receive loop
/// all run concurrently.
pub struct DispatchRouter {
    context: Arc<ExecutionContext>,
    lines: HashMap<LogicalLine, LineWorker>,
    retired: Vec<JoinHandle<()>>,
}

impl DispatchRouter {
    /// Router executing against `context`.
    pub fn new(context: Arc<ExecutionContext>) -> Self {
        Self {
            context,
            lines: HashMap::new(),
            retired: Vec::new(),
        }
    }

    /// Shared execution state.
    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.context
    }

    /// Number of lines with a live worker.
    pub fn active_lines(&self) -> usize {
        self.lines.len()
    }

    /// Routes one request.
    ///
    /// Inline requests run before this returns and may yield
    /// [`Step::Replace`]; everything else is queued and returns
    /// [`Step::Done`] immediately.
    ///
    /// # Errors
    ///
    /// Returns an error when an inline request fails fatally or a worker
    /// cannot be started or reached.
    pub fn dispatch(&mut self, route: Route, request: PendingRequest) -> Result<Step, DispatchError> {
        match route {
            Route::Inline => execute(&self.context, request),
            Route::Detached => {
                self.spawn_detached(request)?;
                Ok(Step::Done)
            }
            Route::Line(line) => {
                self.enqueue(line, request)?;
                Ok(Step::Done)
            }
        }
    }

    fn spawn_detached(&self, request: PendingRequest) -> Result<(), DispatchError> {
        let context = Arc::clone(&self.context);
        thread::Builder::new()
            .name("easycluster-detached".to_owned())
            .spawn(move || {
                let result = execute(&context, request);
                context.settle(result);
            })
            .map(drop)
            .map_err(|source| DispatchError::Spawn {
                line: "detached call".to_owned(),
                source,
            })
    }

    fn enqueue(&mut self, line: LogicalLine, request: PendingRequest) -> Result<(), DispatchError> {
        let worker = match self.lines.entry(line) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let worker = LineWorker::start(entry.key(), Arc::clone(&self.context))?;
                entry.insert(worker)
            }
        };
        worker.enqueue(request)
    }

    /// Ends `line` once its queued requests have run. Returns whether the
    /// line had a worker.
    pub fn end_line(&mut self, line: &LogicalLine) -> bool {
        let Some(worker) = self.lines.remove(line) else {
            return false;
        };
        debug!(target: DISPATCH_TARGET, line = %line, "ending line");
        self.reap_retired();
        self.retired.push(worker.finish());
        true
    }

    /// Number of ended line workers not yet joined.
    pub fn retired_lines(&self) -> usize {
        self.retired.len()
    }

    fn reap_retired(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) = self
            .retired
            .drain(..)
            .partition(JoinHandle::is_finished);
        self.retired = running;
        for handle in finished {
            if handle.join().is_err() {
                warn!(target: DISPATCH_TARGET, "line worker panicked");
            }
        }
    }

    /// Ends every line and waits for all line workers to finish.
    pub fn drain(&mut self) {
        let finished: Vec<_> = self.lines.drain().map(|(_, worker)| worker.finish()).collect();
        self.retired.extend(finished);
        for handle in self.retired.drain(..) {
            if handle.join().is_err() {
                warn!(target: DISPATCH_TARGET, "line worker panicked");
            }
        }
    }
}
