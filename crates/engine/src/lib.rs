//! Moonlet Engine: embedded Lua for actor hosts
//!
//! Each engine owns a private Lua 5.4 state bound to one dedicated worker
//! thread for its whole lifetime. Hosts submit tasks — load a script file,
//! eval a chunk, call a global function — and every task yields exactly one
//! response message, `{ok, _}` or `{error_lua, _}`, delivered to the
//! submitting caller's mailbox. Script code calls synchronously back into
//! the host through `host.call`, blocking its own worker (and nothing else)
//! until the host answers.
//!
//! Key design principles:
//! - One worker thread per engine: the Lua state never crosses threads and
//!   tasks run strictly in submission order
//! - Fire-and-forget submission from any thread; results travel as
//!   mailbox messages addressed by caller pid
//! - Total decode: whatever shape a script returns, it becomes a
//!   deliverable term (diagnostic sentinels stand in for the undecodable)
//!
//! ```no_run
//! use moonlet_engine::{Engine, HostMessage, Router};
//! use std::sync::Arc;
//!
//! let router = Arc::new(Router::new());
//! let (me, inbox) = router.register();
//! let engine = Engine::spawn(me, router.clone())?;
//! engine.submit_eval("return 6 * 7", me)?;
//! if let HostMessage::Response(term) = inbox.recv()? {
//!     println!("{term}"); // {ok, 42}
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Modules
//!
//! - `engine`: engine handles and the worker loop
//! - `task`: queue entries and response status atoms
//! - `marshal`: Term ⇄ Lua value codec
//! - `mailbox`: outbound message transport and the in-process router
//! - `error`: construction and submission errors

pub mod engine;
pub mod error;
pub mod mailbox;
pub mod marshal;
pub mod task;

mod bindings;
mod codec;

pub use bindings::CALL_FAILED_SENTINEL;
pub use engine::{Engine, MEMORY_LIMIT_ENV};
pub use error::EngineError;
pub use mailbox::{DeliveryError, HostMessage, Mailbox, Router};
pub use marshal::{
    AtomUserData, DEPTH_SENTINEL, FOREIGN_TYPE_PREFIX, MAX_TABLE_DEPTH, PidUserData,
    SELF_REF_SENTINEL, decode, decode_all, encode, encode_all,
};
pub use task::{STATUS_ERROR, STATUS_OK, Task};

// Re-export the term model so hosts need only one dependency.
pub use moonlet_term::{Atom, Num, Pid, Term};
