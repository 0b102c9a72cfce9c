//! Promises and the cooperative event loop (`spec.md` §4.6, §5).
//!
//! A promise's settlement signal (`PromiseSignal`) is kept deliberately
//! separate from its script-visible payload (`PromiseValue`). The signal is
//! built entirely out of `Send`/`Sync` primitives (`Mutex`, `Condvar`,
//! owned scalars) so a worker thread can settle it without ever touching a
//! script `Value` — script values are `Rc`-based and stay on the host
//! thread. `settle_promise_from_worker` is the only entry point a spawned
//! thread is meant to call.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::{Arc, Condvar, Mutex};

use crate::ast::Expr;
use crate::environment::Environment;
use crate::exception::Exception;
use crate::interpreter::Interpreter;
use crate::value::Value;

/// A fulfillment payload a worker thread is allowed to hand back. Kept to
/// primitives deliberately: `Value`'s reference variants are `Rc`-based and
/// must never cross a thread boundary. A collaborator that wants to settle
/// with a richer value does so from the host thread instead (an async
/// function's own return path never needs this type at all).
#[derive(Debug, Clone)]
pub enum SettleValue {
    Null,
    Number(f64),
    String(String),
    Boolean(bool),
}

impl From<SettleValue> for Value {
    fn from(v: SettleValue) -> Self {
        match v {
            SettleValue::Null => Value::Null,
            SettleValue::Number(n) => Value::Number(n),
            SettleValue::String(s) => Value::String(Rc::from(s.as_str())),
            SettleValue::Boolean(b) => Value::Boolean(b),
        }
    }
}

struct SignalState {
    settled: bool,
    rejected: bool,
    scalar: Option<SettleValue>,
    exception: Option<Exception>,
}

/// The cross-thread-safe half of a promise: just enough state for a
/// worker thread to flip settlement and wake an `await`.
pub struct PromiseSignal {
    state: Mutex<SignalState>,
    condvar: Condvar,
}

impl PromiseSignal {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SignalState { settled: false, rejected: false, scalar: None, exception: None }),
            condvar: Condvar::new(),
        })
    }
}

/// A handle worker threads can clone and post to, without touching any
/// script value.
#[derive(Clone)]
pub struct EventLoopHandle {
    pending: Arc<Mutex<VecDeque<u64>>>,
    condvar: Arc<Condvar>,
}

impl EventLoopHandle {
    pub fn post(&self, promise_id: u64) {
        self.pending.lock().unwrap().push_back(promise_id);
        self.condvar.notify_all();
    }
}

/// Settles a promise from a worker thread. The only state touched is
/// `Send`/`Sync`: the promise's `Mutex`-protected signal and the event
/// loop's posting queue. Safe to call from `thread::spawn`'d code
/// (`spec.md` §5 "Parallel worker threads").
pub fn settle_promise_from_worker(
    signal: &Arc<PromiseSignal>,
    loop_handle: &EventLoopHandle,
    promise_id: u64,
    outcome: Result<SettleValue, Exception>,
) {
    {
        let mut state = signal.state.lock().unwrap();
        if state.settled {
            return; // monotonicity: a promise settles exactly once (spec.md invariant 4).
        }
        state.settled = true;
        match outcome {
            Ok(v) => state.scalar = Some(v),
            Err(e) => {
                state.rejected = true;
                state.exception = Some(e);
            }
        }
    }
    signal.condvar.notify_all();
    loop_handle.post(promise_id);
}

/// The script-visible promise object: `Value::Promise` holds an
/// `Rc<PromiseValue>`. Callback lists and the materialized result live
/// here, host-thread-only.
/// Either a script/native callback registered via `then`/`catch`, or a
/// bare propagation link used to chain a downstream promise onto an inner
/// one returned from a callback (`spec.md` §4.6 "When the callback
/// returns a Promise").
#[derive(Clone)]
enum Callback {
    Script(Value),
    Forward,
}

pub struct PromiseValue {
    pub id: u64,
    signal: Arc<PromiseSignal>,
    result: RefCell<Option<Value>>,
    rejected: Cell<bool>,
    settled: Cell<bool>,
    then_callbacks: RefCell<Vec<(Callback, Rc<PromiseValue>)>>,
    catch_callbacks: RefCell<Vec<(Callback, Rc<PromiseValue>)>>,
}

impl PromiseValue {
    pub fn is_settled(&self) -> bool {
        self.settled.get()
    }

    pub fn is_rejected(&self) -> bool {
        self.rejected.get()
    }

    pub fn result(&self) -> Option<Value> {
        self.result.borrow().clone()
    }

    pub fn signal(&self) -> Arc<PromiseSignal> {
        self.signal.clone()
    }

    /// Blocks the calling (host) thread until settlement, waking either
    /// from an in-process `EventLoop::settle` or from a worker thread's
    /// `settle_promise_from_worker` (`spec.md` §4.5 "Await").
    pub fn block_until_settled(&self) {
        if self.settled.get() {
            return;
        }
        let guard = self.signal.state.lock().unwrap();
        let mut guard = self.signal.condvar.wait_while(guard, |s| !s.settled).unwrap();
        if !self.settled.get() {
            self.settled.set(true);
            if let Some(exc) = guard.exception.take() {
                self.rejected.set(true);
                *self.result.borrow_mut() = Some(Value::exception_to_value(exc));
            } else if let Some(scalar) = guard.scalar.take() {
                self.rejected.set(guard.rejected);
                *self.result.borrow_mut() = Some(scalar.into());
            }
        }
    }
}

/// One `go`-scheduled task: an expression to evaluate, plus the
/// environment snapshot it runs in (`spec.md` §4.6 "`go expr`").
struct GoTask {
    expr: Expr,
    env: Environment,
}

/// An async function call's body, deferred to a later turn so that the
/// call itself returns the unsettled promise immediately
/// (`spec.md` §4.5 "Call... For an async function").
struct AsyncBodyTask {
    body: Rc<Vec<crate::ast::Stmt>>,
    env: Environment,
    promise: Rc<PromiseValue>,
}

enum Dispatch {
    Go(GoTask),
    AsyncBody(AsyncBodyTask),
    Settle(Rc<PromiseValue>),
}

/// The single-threaded cooperative task queue drained by the host via
/// `run_event_loop_until_idle` (`spec.md` §4.6).
pub struct EventLoop {
    handle: EventLoopHandle,
    registry: RefCell<HashMap<u64, Rc<PromiseValue>>>,
    queue: RefCell<VecDeque<Dispatch>>,
    next_id: Cell<u64>,
}

impl EventLoop {
    pub fn new() -> Self {
        Self {
            handle: EventLoopHandle { pending: Arc::new(Mutex::new(VecDeque::new())), condvar: Arc::new(Condvar::new()) },
            registry: RefCell::new(HashMap::new()),
            queue: RefCell::new(VecDeque::new()),
            next_id: Cell::new(0),
        }
    }

    pub fn handle(&self) -> EventLoopHandle {
        self.handle.clone()
    }

    /// Creates a fresh unsettled promise and registers it so a worker
    /// thread's `EventLoopHandle::post` can find it again during a drain.
    pub fn new_promise(&self) -> Rc<PromiseValue> {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let promise = Rc::new(PromiseValue {
            id,
            signal: PromiseSignal::new(),
            result: RefCell::new(None),
            rejected: Cell::new(false),
            settled: Cell::new(false),
            then_callbacks: RefCell::new(Vec::new()),
            catch_callbacks: RefCell::new(Vec::new()),
        });
        self.registry.borrow_mut().insert(id, promise.clone());
        promise
    }

    pub fn schedule_go(&self, expr: Expr, env: Environment) {
        self.queue.borrow_mut().push_back(Dispatch::Go(GoTask { expr, env }));
    }

    /// Defers an async function's body to a later turn. The call
    /// expression that spawned this already returned `promise` to the
    /// caller before this task runs.
    pub fn schedule_async_body(&self, body: Rc<Vec<crate::ast::Stmt>>, env: Environment, promise: Rc<PromiseValue>) {
        self.queue.borrow_mut().push_back(Dispatch::AsyncBody(AsyncBodyTask { body, env, promise }));
    }

    /// Settles a promise from the host thread (an async function
    /// returning, or a script-visible `resolve`/`reject`). Always posts a
    /// dispatch task rather than running callbacks inline
    /// (`spec.md` §8.1 invariant 5).
    pub fn settle(&self, promise: &Rc<PromiseValue>, value: Value, rejected: bool) {
        if promise.settled.get() {
            return;
        }
        promise.settled.set(true);
        promise.rejected.set(rejected);
        *promise.result.borrow_mut() = Some(value);
        {
            let mut state = promise.signal.state.lock().unwrap();
            state.settled = true;
            state.rejected = rejected;
        }
        promise.signal.condvar.notify_all();
        self.queue.borrow_mut().push_back(Dispatch::Settle(promise.clone()));
    }

    /// Registers a `then`/`catch` pair and the downstream promise they
    /// settle. If `promise` is already settled, queues the dispatch for a
    /// later turn immediately rather than running inline
    /// (`spec.md` §8.1 invariant 5).
    pub fn register_then(&self, promise: &Rc<PromiseValue>, on_ok: Value, downstream: Rc<PromiseValue>) {
        promise.then_callbacks.borrow_mut().push((Callback::Script(on_ok), downstream));
        self.requeue_if_settled(promise);
    }

    pub fn register_catch(&self, promise: &Rc<PromiseValue>, on_err: Value, downstream: Rc<PromiseValue>) {
        promise.catch_callbacks.borrow_mut().push((Callback::Script(on_err), downstream));
        self.requeue_if_settled(promise);
    }

    fn requeue_if_settled(&self, promise: &Rc<PromiseValue>) {
        if promise.settled.get() {
            self.queue.borrow_mut().push_back(Dispatch::Settle(promise.clone()));
        }
    }

    /// Moves any ids posted by worker threads into the materialized
    /// per-promise state, then into the main dispatch queue.
    fn drain_external(&self) {
        let ids: Vec<u64> = {
            let mut pending = self.handle.pending.lock().unwrap();
            pending.drain(..).collect()
        };
        for id in ids {
            if let Some(promise) = self.registry.borrow().get(&id).cloned() {
                if !promise.settled.get() {
                    promise.block_until_settled();
                }
                self.queue.borrow_mut().push_back(Dispatch::Settle(promise));
            }
        }
    }

    /// Drains the task queue to empty, running `go` tasks and promise
    /// callback dispatches in FIFO order (`spec.md` §4.6, §4.9).
    pub fn run_until_idle(&self, interp: &mut Interpreter) {
        while self.step(interp) {}
    }

    /// Runs exactly one queued task, if any. Returns `false` when the
    /// queue (including anything posted by worker threads) is empty, the
    /// signal `await` uses to fall back to a blocking wait
    /// (`spec.md` §4.5 "Await").
    pub fn step(&self, interp: &mut Interpreter) -> bool {
        self.drain_external();
        let Some(item) = self.queue.borrow_mut().pop_front() else { return false };
        match item {
            Dispatch::Go(task) => {
                // errors thrown inside `go` are swallowed (spec.md §4.6 "`go expr`").
                let _ = interp.eval_expr(&task.expr, &task.env);
            }
            Dispatch::AsyncBody(task) => self.run_async_body(interp, task),
            Dispatch::Settle(promise) => self.dispatch_settled(interp, &promise),
        }
        true
    }

    /// Drives the event loop until `promise` settles, falling back to a
    /// blocking wait once the queue runs dry (a cross-thread worker is the
    /// only remaining way it could still settle). Returns its settled
    /// value and whether it was a rejection (`spec.md` §4.5 "Await").
    pub fn await_promise(&self, interp: &mut Interpreter, promise: &Rc<PromiseValue>) -> (Value, bool) {
        while !promise.is_settled() {
            if !self.step(interp) {
                promise.block_until_settled();
                break;
            }
        }
        (promise.result().unwrap_or(Value::Null), promise.is_rejected())
    }

    fn run_async_body(&self, interp: &mut Interpreter, task: AsyncBodyTask) {
        match interp.run_function_body(&task.body, &task.env) {
            Ok(value) => self.settle(&task.promise, value, false),
            Err(flow) => {
                let exc = interp.flow_into_exception(flow);
                self.settle(&task.promise, Value::exception_to_value(exc), true);
            }
        }
    }

    fn dispatch_settled(&self, interp: &mut Interpreter, promise: &Rc<PromiseValue>) {
        let value = promise.result().unwrap_or(Value::Null);
        let rejected = promise.rejected.get();
        let callbacks = if rejected {
            std::mem::take(&mut *promise.catch_callbacks.borrow_mut())
        } else {
            std::mem::take(&mut *promise.then_callbacks.borrow_mut())
        };
        // the other side's pending callbacks never fire; drop them so a
        // stale registration can't be replayed on a later settle.
        if rejected {
            promise.then_callbacks.borrow_mut().clear();
        } else {
            promise.catch_callbacks.borrow_mut().clear();
        }
        for (callback, downstream) in callbacks {
            match callback {
                Callback::Forward => self.settle(&downstream, value.clone(), rejected),
                Callback::Script(callback) => match interp.call_value(callback, Value::Null, vec![value.clone()]) {
                    Ok(result) => {
                        if let Value::Promise(inner) = result {
                            self.chain(&inner, downstream);
                        } else {
                            self.settle(&downstream, result, false);
                        }
                    }
                    Err(flow) => {
                        let exc = interp.flow_into_exception(flow);
                        self.settle(&downstream, Value::exception_to_value(exc), true);
                    }
                },
            }
        }
        self.registry.borrow_mut().remove(&promise.id);
    }

    /// Forwards settlement of `inner` onto `downstream`, whichever side
    /// it settles on (`spec.md` §4.6 "When the callback returns a
    /// Promise").
    fn chain(&self, inner: &Rc<PromiseValue>, downstream: Rc<PromiseValue>) {
        inner.then_callbacks.borrow_mut().push((Callback::Forward, downstream.clone()));
        inner.catch_callbacks.borrow_mut().push((Callback::Forward, downstream));
        self.requeue_if_settled(inner);
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settle_records_value_and_marks_settled() {
        let loop_ = EventLoop::new();
        let promise = loop_.new_promise();
        loop_.settle(&promise, Value::Number(42.0), false);
        assert!(promise.is_settled());
        assert!(!promise.is_rejected());
        assert!(matches!(promise.result(), Some(Value::Number(n)) if n == 42.0));
    }

    #[test]
    fn double_settle_is_ignored() {
        let loop_ = EventLoop::new();
        let promise = loop_.new_promise();
        loop_.settle(&promise, Value::Number(1.0), false);
        loop_.settle(&promise, Value::Number(2.0), false);
        assert!(matches!(promise.result(), Some(Value::Number(n)) if n == 1.0));
    }

    #[test]
    fn worker_settlement_is_send_safe() {
        let loop_ = EventLoop::new();
        let promise = loop_.new_promise();
        let signal = promise.signal();
        let handle = loop_.handle();
        let id = promise.id;
        let worker = std::thread::spawn(move || {
            settle_promise_from_worker(&signal, &handle, id, Ok(SettleValue::Number(7.0)));
        });
        worker.join().unwrap();
        promise.block_until_settled();
        assert!(matches!(promise.result(), Some(Value::Number(n)) if n == 7.0));
    }
}
