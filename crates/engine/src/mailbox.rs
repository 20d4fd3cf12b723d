//! The host side of the engine boundary
//!
//! Engines never address the host runtime directly: every outbound message
//! (task responses, script-initiated callbacks) goes through a [`Mailbox`].
//! Embedders bridge the trait to their own actor transport; [`Router`] is
//! the channel-backed in-process implementation used by the CLI and the
//! test suites.
//!
//! Delivery is fire-and-forget from the engine's point of view: a failed
//! post is reported to the poster, never retried, and never blocks.

use crossbeam_channel::{Receiver, Sender, unbounded};
use moonlet_term::{Pid, Term};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Message an engine posts to an actor.
#[derive(Debug, Clone, PartialEq)]
pub enum HostMessage {
    /// Final result of a submitted task, always `{ok, _}` or `{error_lua, _}`.
    Response(Term),
    /// Arguments of a script-initiated host call. The receiving actor is
    /// expected to answer via `Engine::submit_response` while the script
    /// stays blocked.
    Callback(Term),
}

impl HostMessage {
    pub fn term(&self) -> &Term {
        match self {
            HostMessage::Response(term) | HostMessage::Callback(term) => term,
        }
    }

    pub fn is_callback(&self) -> bool {
        matches!(self, HostMessage::Callback(_))
    }
}

/// The destination pid is unknown or its receiver is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryError(pub Pid);

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no mailbox for {}", self.0)
    }
}

impl std::error::Error for DeliveryError {}

/// Outbound message transport, implemented by the embedding host.
///
/// Implementations must be callable from any engine worker thread.
pub trait Mailbox: Send + Sync {
    fn post(&self, to: Pid, message: HostMessage) -> Result<(), DeliveryError>;
}

/// In-process mailbox table: pid allocation plus channel fan-out.
pub struct Router {
    next_pid: AtomicU64,
    routes: Mutex<HashMap<Pid, Sender<HostMessage>>>,
}

impl Router {
    pub fn new() -> Router {
        Router {
            next_pid: AtomicU64::new(1),
            routes: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate a fresh pid and the receiving end of its mailbox.
    pub fn register(&self) -> (Pid, Receiver<HostMessage>) {
        let pid = Pid::from_raw(self.next_pid.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = unbounded();
        self.routes.lock().unwrap().insert(pid, tx);
        (pid, rx)
    }

    pub fn unregister(&self, pid: Pid) {
        self.routes.lock().unwrap().remove(&pid);
    }
}

impl Default for Router {
    fn default() -> Router {
        Router::new()
    }
}

impl Mailbox for Router {
    fn post(&self, to: Pid, message: HostMessage) -> Result<(), DeliveryError> {
        let mut routes = self.routes.lock().unwrap();
        let Some(sender) = routes.get(&to) else {
            return Err(DeliveryError(to));
        };
        if sender.send(message).is_err() {
            // Receiver dropped without unregistering; reap the route.
            routes.remove(&to);
            return Err(DeliveryError(to));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_allocates_distinct_pids() {
        let router = Router::new();
        let (a, _rx_a) = router.register();
        let (b, _rx_b) = router.register();
        assert_ne!(a, b);
    }

    #[test]
    fn test_post_reaches_receiver() {
        let router = Router::new();
        let (pid, rx) = router.register();
        router
            .post(pid, HostMessage::Response(Term::atom("ok")))
            .unwrap();
        assert_eq!(rx.recv().unwrap(), HostMessage::Response(Term::atom("ok")));
    }

    #[test]
    fn test_post_to_unknown_pid_fails() {
        let router = Router::new();
        let ghost = Pid::from_raw(999);
        assert_eq!(
            router.post(ghost, HostMessage::Callback(Term::nil())),
            Err(DeliveryError(ghost))
        );
    }

    #[test]
    fn test_post_after_receiver_dropped_fails_and_reaps() {
        let router = Router::new();
        let (pid, rx) = router.register();
        drop(rx);
        assert!(router.post(pid, HostMessage::Response(Term::nil())).is_err());
        // Route is gone afterwards as well.
        assert!(router.post(pid, HostMessage::Response(Term::nil())).is_err());
    }

    #[test]
    fn test_unregister_removes_route() {
        let router = Router::new();
        let (pid, _rx) = router.register();
        router.unregister(pid);
        assert!(router.post(pid, HostMessage::Response(Term::nil())).is_err());
    }

    #[test]
    fn test_message_accessors() {
        let msg = HostMessage::Callback(Term::int(1));
        assert!(msg.is_callback());
        assert_eq!(msg.term(), &Term::int(1));
        assert!(!HostMessage::Response(Term::nil()).is_callback());
    }
}
