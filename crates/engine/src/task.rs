//! Engine queue entries
//!
//! Every unit of work arrives at a worker as a `Task`. Load/Eval/Call flow
//! through the main task queue in submission order; Resp flows through the
//! separate response queue and is consumed only by a script blocked in
//! `host.call`. Quit is the only entry that stops the worker.

use moonlet_term::{Atom, Pid, Term};

/// Status atom heading every successful task response.
pub const STATUS_OK: &str = "ok";
/// Status atom heading every failed task response.
pub const STATUS_ERROR: &str = "error_lua";

#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    /// Run a script file; `file` holds the path bytes.
    Load { file: Vec<u8>, caller: Pid },
    /// Run an inline chunk.
    Eval { code: Vec<u8>, caller: Pid },
    /// Call a global function with marshaled arguments.
    Call {
        fun: Atom,
        args: Vec<Term>,
        caller: Pid,
    },
    /// Host answer to a pending host call. `caller` becomes the engine's
    /// current caller, so chained callbacks follow the responder.
    Resp { term: Term, caller: Pid },
    /// Drain-then-stop marker.
    Quit,
}

impl Task {
    pub fn kind(&self) -> &'static str {
        match self {
            Task::Load { .. } => "load",
            Task::Eval { .. } => "eval",
            Task::Call { .. } => "call",
            Task::Resp { .. } => "resp",
            Task::Quit => "quit",
        }
    }

    /// The actor that receives this task's response, if it has one.
    pub fn caller(&self) -> Option<Pid> {
        match self {
            Task::Load { caller, .. }
            | Task::Eval { caller, .. }
            | Task::Call { caller, .. }
            | Task::Resp { caller, .. } => Some(*caller),
            Task::Quit => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        let caller = Pid::from_raw(1);
        assert_eq!(
            Task::Eval {
                code: b"return 1".to_vec(),
                caller
            }
            .kind(),
            "eval"
        );
        assert_eq!(Task::Quit.kind(), "quit");
    }

    #[test]
    fn test_caller() {
        let caller = Pid::from_raw(3);
        let task = Task::Call {
            fun: Atom::new("tick"),
            args: vec![],
            caller,
        };
        assert_eq!(task.caller(), Some(caller));
        assert_eq!(Task::Quit.caller(), None);
    }
}
