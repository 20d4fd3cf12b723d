//! Byte-level Term encoding
//!
//! Hosts that move terms across process boundaries (persistence, IPC,
//! distribution shims) need a stable owned encoding. `Term` is already an
//! owned tree, so this is a thin self-describing serde/bincode codec.
//!
//! # Use Cases
//!
//! - **IPC**: shipping task arguments and responses between host processes
//! - **Persistence**: snapshotting engine responses for replay
//! - **Test fixtures**: byte-exact golden values

use crate::term::Term;

/// Error during wire encoding/decoding.
#[derive(Debug)]
pub enum WireError {
    /// Bincode encoding/decoding error (preserves original error for debugging)
    Bincode(Box<bincode::Error>),
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireError::Bincode(e) => write!(f, "bincode error: {}", e),
        }
    }
}

impl std::error::Error for WireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WireError::Bincode(e) => Some(e),
        }
    }
}

impl From<bincode::Error> for WireError {
    fn from(e: bincode::Error) -> WireError {
        WireError::Bincode(Box::new(e))
    }
}

/// Encode a term to bytes.
pub fn to_bytes(term: &Term) -> Result<Vec<u8>, WireError> {
    Ok(bincode::serialize(term)?)
}

/// Decode a term from bytes produced by [`to_bytes`].
pub fn from_bytes(bytes: &[u8]) -> Result<Term, WireError> {
    Ok(bincode::deserialize(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::{Num, Pid};

    #[test]
    fn test_roundtrip_scalars() {
        for term in [
            Term::int(42),
            Term::Num(Num::Int64(1 << 40)),
            Term::float(-0.5),
            Term::atom("ok"),
            Term::binary(vec![0u8, 1, 255]),
            Term::Pid(Pid::from_raw(9)),
        ] {
            let bytes = to_bytes(&term).unwrap();
            assert_eq!(from_bytes(&bytes).unwrap(), term);
        }
    }

    #[test]
    fn test_roundtrip_nested() {
        let term = Term::tuple(vec![
            Term::atom("ok"),
            Term::list(vec![
                Term::tuple(vec![Term::binary("k"), Term::int(1)]),
                Term::list(vec![]),
            ]),
        ]);
        let bytes = to_bytes(&term).unwrap();
        assert_eq!(from_bytes(&bytes).unwrap(), term);
    }

    #[test]
    fn test_subtype_survives_wire() {
        let narrow = to_bytes(&Term::Num(Num::Int32(1))).unwrap();
        let wide = to_bytes(&Term::Num(Num::Int64(1))).unwrap();
        assert_ne!(narrow, wide);
        assert_eq!(from_bytes(&narrow).unwrap(), Term::Num(Num::Int32(1)));
    }

    #[test]
    fn test_truncated_input_is_error() {
        let bytes = to_bytes(&Term::binary("hello")).unwrap();
        assert!(from_bytes(&bytes[..bytes.len() - 2]).is_err());
    }
}
