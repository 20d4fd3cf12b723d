//! Engine lifecycle and the worker loop
//!
//! One `Engine` owns one worker thread, and that thread owns one Lua state
//! for its whole life. Submission is fire-and-forget from any thread;
//! results come back as [`HostMessage::Response`] through the mailbox,
//! addressed to each task's caller. The worker drains its task queue in
//! FIFO order; only `Quit` (or every handle dropping) stops it.
//!
//! # Two queues
//!
//! Load/Eval/Call flow through the task queue. Answers to script callbacks
//! flow through a second queue consumed only while a script sits blocked
//! inside `host.call`, so a response can never overtake or wedge the main
//! dispatch loop.
//!
//! # Failure containment
//!
//! Whatever a task does — raise in Lua, panic in Rust, return garbage — the
//! worker survives it and the caller receives exactly one
//! `{ok, _}` or `{error_lua, _}` response. Construction is the only
//! synchronous failure: if the Lua state cannot be brought up, `spawn`
//! returns `EngineError::Init` and no engine exists.

use crate::bindings;
use crate::codec;
use crate::error::{EngineError, format_panic_payload};
use crate::mailbox::{HostMessage, Mailbox};
use crate::marshal;
use crate::task::{STATUS_ERROR, STATUS_OK, Task};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use mlua::{Lua, MultiValue};
use moonlet_term::{Atom, Pid, Term};
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Environment variable capping each engine's Lua allocator, in bytes.
/// Missing, zero, or unparsable values run unlimited.
pub const MEMORY_LIMIT_ENV: &str = "MOONLET_MEMORY_LIMIT";

/// Flags shared between the handle and the worker.
#[derive(Default)]
pub(crate) struct Control {
    pub(crate) closed: AtomicBool,
    pub(crate) callback_pending: AtomicBool,
}

/// Worker-side view of the host: where outbound messages go, where callback
/// answers arrive, and which actor is currently being served.
pub(crate) struct HostLink {
    pub(crate) mailbox: Arc<dyn Mailbox>,
    pub(crate) responses: Receiver<Task>,
    pub(crate) current_caller: Cell<Pid>,
    pub(crate) control: Arc<Control>,
}

/// Handle to one scripting engine.
///
/// Cheap to share behind an `Arc`; all methods take `&self`. Dropping the
/// last handle stops the engine the same way [`Engine::stop`] does.
pub struct Engine {
    owner: Pid,
    tasks: Sender<Task>,
    responses: Sender<Task>,
    control: Arc<Control>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Start a worker thread with a fresh Lua state.
    ///
    /// Blocks until the state is up; a construction failure is reported
    /// here and the thread is gone before this returns.
    pub fn spawn(owner: Pid, mailbox: Arc<dyn Mailbox>) -> Result<Engine, EngineError> {
        let (task_tx, task_rx) = unbounded();
        let (resp_tx, resp_rx) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);
        let control = Arc::new(Control::default());
        let worker_control = Arc::clone(&control);
        let handle = thread::Builder::new()
            .name(format!("moonlet-{}", owner.raw()))
            .spawn(move || {
                worker_main(owner, mailbox, task_rx, resp_rx, worker_control, ready_tx)
            })
            .map_err(|e| EngineError::Init(format!("worker thread: {e}")))?;
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Engine {
                owner,
                tasks: task_tx,
                responses: resp_tx,
                control,
                worker: Mutex::new(Some(handle)),
            }),
            Ok(Err(message)) => {
                let _ = handle.join();
                Err(EngineError::Init(message))
            }
            Err(_) => {
                let _ = handle.join();
                Err(EngineError::Init("worker exited during init".to_string()))
            }
        }
    }

    pub fn owner(&self) -> Pid {
        self.owner
    }

    /// Queue a script file for execution; `file` holds the path bytes.
    pub fn submit_load(&self, file: impl Into<Vec<u8>>, caller: Pid) -> Result<(), EngineError> {
        self.submit(Task::Load {
            file: file.into(),
            caller,
        })
    }

    /// Queue an inline chunk for execution.
    pub fn submit_eval(&self, code: impl Into<Vec<u8>>, caller: Pid) -> Result<(), EngineError> {
        self.submit(Task::Eval {
            code: code.into(),
            caller,
        })
    }

    /// Queue a call of the global function `fun` with marshaled `args`.
    pub fn submit_call(
        &self,
        fun: impl Into<Atom>,
        args: Vec<Term>,
        caller: Pid,
    ) -> Result<(), EngineError> {
        self.submit(Task::Call {
            fun: fun.into(),
            args,
            caller,
        })
    }

    /// Answer the callback a script is currently blocked on. `caller`
    /// becomes the engine's current caller, so the script's next `host.call`
    /// goes to whoever answered. Rejected when nothing is blocked waiting —
    /// a response must never sit in the queue unsolicited.
    ///
    /// Stays available during shutdown: a pending callback may still be
    /// answered so the in-flight task can finish and `stop` can join.
    pub fn submit_response(&self, term: Term, caller: Pid) -> Result<(), EngineError> {
        if !self.control.callback_pending.load(Ordering::SeqCst) {
            return Err(EngineError::NoPendingCallback);
        }
        self.responses
            .send(Task::Resp { term, caller })
            .map_err(|_| EngineError::Closed)
    }

    /// Signal Quit and join the worker. Tasks already queued finish first
    /// and their responses go out before this returns. Idempotent; also run
    /// by `Drop`.
    pub fn stop(&self) {
        self.control.closed.store(true, Ordering::SeqCst);
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = self.tasks.send(Task::Quit);
            if let Err(payload) = handle.join() {
                tracing::error!(
                    owner = %self.owner,
                    panic = %format_panic_payload(&payload),
                    "engine worker panicked"
                );
            }
        }
    }

    fn submit(&self, task: Task) -> Result<(), EngineError> {
        if self.control.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        self.tasks.send(task).map_err(|_| EngineError::Closed)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_main(
    owner: Pid,
    mailbox: Arc<dyn Mailbox>,
    tasks: Receiver<Task>,
    responses: Receiver<Task>,
    control: Arc<Control>,
    ready: Sender<Result<(), String>>,
) {
    let worker = match Worker::new(owner, mailbox, responses, control) {
        Ok(worker) => {
            let _ = ready.send(Ok(()));
            worker
        }
        Err(e) => {
            tracing::error!(owner = %owner, error = %e, "engine init failed");
            let _ = ready.send(Err(e.to_string()));
            return;
        }
    };
    tracing::debug!(owner = %owner, "engine worker started");
    worker.run(&tasks);
    tracing::debug!(owner = %owner, "engine worker stopped");
}

/// Parse the memory cap from an optional environment value.
/// Returns None (unlimited) when the value is missing, zero, or invalid;
/// warns for values that do not parse.
fn parse_memory_limit(env_value: Option<String>) -> Option<usize> {
    match env_value {
        Some(raw) => match raw.parse::<usize>() {
            Ok(0) => {
                tracing::warn!("MOONLET_MEMORY_LIMIT=0 is invalid, running unlimited");
                None
            }
            Ok(limit) => Some(limit),
            Err(_) => {
                tracing::warn!(
                    value = %raw,
                    "MOONLET_MEMORY_LIMIT is not a valid byte count, running unlimited"
                );
                None
            }
        },
        None => None,
    }
}

struct Worker {
    lua: Lua,
    link: Rc<HostLink>,
}

impl Worker {
    fn new(
        owner: Pid,
        mailbox: Arc<dyn Mailbox>,
        responses: Receiver<Task>,
        control: Arc<Control>,
    ) -> mlua::Result<Worker> {
        let lua = Lua::new();
        if let Some(limit) = parse_memory_limit(std::env::var(MEMORY_LIMIT_ENV).ok()) {
            lua.set_memory_limit(limit)?;
        }
        let link = Rc::new(HostLink {
            mailbox,
            responses,
            current_caller: Cell::new(owner),
            control,
        });
        bindings::install(&lua, Rc::clone(&link))?;
        codec::install(&lua)?;
        Ok(Worker { lua, link })
    }

    fn run(&self, tasks: &Receiver<Task>) {
        loop {
            let task = match tasks.recv() {
                Ok(task) => task,
                Err(_) => break, // every handle dropped
            };
            match task {
                Task::Load { file, caller } => {
                    self.dispatch(caller, "load", |worker| worker.load_file(&file));
                }
                Task::Eval { code, caller } => {
                    self.dispatch(caller, "eval", |worker| worker.eval_chunk(&code));
                }
                Task::Call { fun, args, caller } => {
                    self.dispatch(caller, "call", |worker| worker.call_global(&fun, &args));
                }
                Task::Resp { caller, .. } => {
                    // Contract violation: responses belong on the response
                    // queue, and only while a script is blocked.
                    tracing::warn!(caller = %caller, "response task on main queue, ignored");
                }
                Task::Quit => break,
            }
        }
    }

    /// Run one task body with the caller recorded, a panic fence, and
    /// uniform response delivery to the task's own caller.
    fn dispatch<F>(&self, caller: Pid, kind: &'static str, body: F)
    where
        F: FnOnce(&Worker) -> Result<Term, Term>,
    {
        tracing::debug!(kind, caller = %caller, "task");
        self.link.current_caller.set(caller);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(self)))
            .unwrap_or_else(|payload| Err(Term::binary(format_panic_payload(&payload))));
        // A finished task cannot leave a callback pending.
        self.link
            .control
            .callback_pending
            .store(false, Ordering::SeqCst);
        let (status, value) = match outcome {
            Ok(value) => (STATUS_OK, value),
            Err(diagnostic) => (STATUS_ERROR, diagnostic),
        };
        let response = Term::tuple(vec![Term::atom(status), value]);
        if self
            .link
            .mailbox
            .post(caller, HostMessage::Response(response))
            .is_err()
        {
            tracing::warn!(caller = %caller, kind, "response undeliverable, dropped");
        }
    }

    fn load_file(&self, file: &[u8]) -> Result<Term, Term> {
        let path = String::from_utf8_lossy(file).into_owned();
        let source =
            std::fs::read(&path).map_err(|e| Term::binary(format!("cannot load {path}: {e}")))?;
        let results = self
            .lua
            .load(&source[..])
            .set_name(format!("@{path}"))
            .eval::<MultiValue>()
            .map_err(|e| Term::binary(e.to_string()))?;
        Ok(marshal::decode_all(results))
    }

    fn eval_chunk(&self, code: &[u8]) -> Result<Term, Term> {
        let results = self
            .lua
            .load(code)
            .set_name("=eval")
            .eval::<MultiValue>()
            .map_err(|e| Term::binary(e.to_string()))?;
        Ok(marshal::decode_all(results))
    }

    fn call_global(&self, fun: &Atom, args: &[Term]) -> Result<Term, Term> {
        let name = fun.as_str();
        let function = self
            .lua
            .globals()
            .get::<mlua::Function>(name)
            .map_err(|e| Term::binary(format!("global '{name}': {e}")))?;
        let args = marshal::encode_all(&self.lua, args).map_err(|e| Term::binary(e.to_string()))?;
        let results = function
            .call::<MultiValue>(args)
            .map_err(|e| Term::binary(e.to_string()))?;
        Ok(marshal::decode_all(results))
    }
}
