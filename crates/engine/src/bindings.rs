//! Script-facing host capabilities
//!
//! Installs the global `host` table into a worker's Lua state:
//!
//! - `host.call(...)` posts its arguments to the current caller as a
//!   callback message and blocks the worker until the host answers via
//!   `Engine::submit_response`. The reply term becomes the call's return
//!   value, and the reply's caller pid becomes the engine's current caller,
//!   so chained callbacks follow whoever answered last.
//! - `host.atom(text)` builds an atom-tagged value; it is the only way
//!   script code can produce something that decodes as `Term::Atom`.
//!
//! A callback that cannot be delivered does not raise: the script receives
//! the string sentinel [`CALL_FAILED_SENTINEL`] and decides for itself.

use crate::engine::HostLink;
use crate::mailbox::HostMessage;
use crate::marshal::{self, AtomUserData};
use crate::task::Task;
use mlua::{Lua, MultiValue, Value};
use moonlet_term::Atom;
use std::rc::Rc;
use std::sync::atomic::Ordering;

/// Returned to the script when its callback could not reach the host.
pub const CALL_FAILED_SENTINEL: &str = "host_call_failed";

pub(crate) fn install(lua: &Lua, link: Rc<HostLink>) -> mlua::Result<()> {
    let host = lua.create_table()?;
    host.set(
        "call",
        lua.create_function(move |lua, args: MultiValue| host_call(lua, &link, args))?,
    )?;
    host.set(
        "atom",
        lua.create_function(|_, text: mlua::String| {
            let name = String::from_utf8_lossy(&text.as_bytes()).into_owned();
            Ok(AtomUserData(Atom::new(name)))
        })?,
    )?;
    lua.globals().set("host", host)?;
    Ok(())
}

fn host_call(lua: &Lua, link: &HostLink, args: MultiValue) -> mlua::Result<Value> {
    let payload = marshal::decode_all(args);
    let caller = link.current_caller.get();

    // Raise the pending flag before the host can possibly answer, or a
    // prompt submit_response would be rejected as unsolicited.
    link.control.callback_pending.store(true, Ordering::SeqCst);
    if link
        .mailbox
        .post(caller, HostMessage::Callback(payload))
        .is_err()
    {
        link.control.callback_pending.store(false, Ordering::SeqCst);
        tracing::warn!(caller = %caller, "callback undeliverable");
        return Ok(Value::String(lua.create_string(CALL_FAILED_SENTINEL)?));
    }

    let reply = link.responses.recv();
    link.control.callback_pending.store(false, Ordering::SeqCst);
    match reply {
        Ok(Task::Resp { term, caller }) => {
            link.current_caller.set(caller);
            marshal::encode(lua, &term)
        }
        Ok(other) => Err(mlua::Error::RuntimeError(format!(
            "unexpected {} task on response queue",
            other.kind()
        ))),
        Err(_) => Err(mlua::Error::RuntimeError(
            "engine response queue closed".to_string(),
        )),
    }
}
