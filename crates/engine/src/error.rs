//! Host-facing engine errors
//!
//! Failures inside a dispatched task never surface here: they are delivered
//! to the task's caller as an `{error_lua, ...}` response and the worker
//! keeps running. This enum covers only the submission API edges and
//! engine construction.

use std::fmt;

#[derive(Debug)]
pub enum EngineError {
    /// The worker thread or its Lua state could not be brought up.
    /// No engine instance exists after this is returned.
    Init(String),
    /// Shutdown has begun (or the worker is gone); the task was not queued.
    Closed,
    /// A response was submitted while no script was blocked in a host call.
    NoPendingCallback,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Init(msg) => write!(f, "engine init failed: {}", msg),
            EngineError::Closed => write!(f, "engine is closed"),
            EngineError::NoPendingCallback => {
                write!(f, "no pending callback awaits a response")
            }
        }
    }
}

impl std::error::Error for EngineError {}

/// Extract a printable message from a caught panic payload.
pub(crate) fn format_panic_payload(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            EngineError::Init("no luck".into()).to_string(),
            "engine init failed: no luck"
        );
        assert_eq!(EngineError::Closed.to_string(), "engine is closed");
        assert_eq!(
            EngineError::NoPendingCallback.to_string(),
            "no pending callback awaits a response"
        );
    }

    #[test]
    fn test_format_panic_payload() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("panic message");
        assert_eq!(format_panic_payload(&payload), "panic message");

        let payload: Box<dyn std::any::Any + Send> = Box::new("owned panic".to_string());
        assert_eq!(format_panic_payload(&payload), "owned panic");

        let payload: Box<dyn std::any::Any + Send> = Box::new(17u32);
        assert_eq!(format_panic_payload(&payload), "unknown panic");
    }
}
