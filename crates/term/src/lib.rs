//! Moonlet Term: the tagged value model exchanged between an actor host
//! and its embedded script engines
//!
//! This crate is the shared foundation: hosts build `Term`s to hand to an
//! engine, engines hand `Term`s back, and neither side ever sees the other's
//! native representation.
//!
//! Key design principles:
//! - Term: a closed recursive union (numbers, pids, atoms, binaries, lists,
//!   tuples) that is immutable once constructed
//! - Pid: an opaque actor identity; equality and hashing only, no structure
//! - Atom: symbolic text distinct from Binary, with a handful of reserved
//!   names used as marshaling sentinels
//!
//! # Modules
//!
//! - `term`: the Term/Num/Pid/Atom types and constructors
//! - `wire`: byte-level Term encoding for crossing process boundaries

pub mod term;
pub mod wire;

pub use term::{
    ATOM_FALSE, ATOM_NIL, ATOM_NULL, ATOM_TRUE, ATOM_UNDEFINED, Atom, Num, Pid, Term,
};
pub use wire::{WireError, from_bytes, to_bytes};
