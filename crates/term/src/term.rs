//! The Term model
//!
//! A `Term` is the only currency between an actor host and an embedded
//! engine. It is a closed recursive union: scalars (numbers, pids, atoms,
//! binaries) and two sequence shapes (lists and tuples). Terms are immutable
//! once constructed and finite by construction; only marshaling layers have
//! to defend against cycles, and they do so on their own side.
//!
//! # Numeric subtypes
//!
//! Hosts distinguish 32-bit integers, 64-bit integers, and doubles. `Num`
//! keeps that distinction: `Num::int` picks the narrowest integer subtype
//! that fits, and nothing ever widens a value implicitly.
//!
//! # Reserved atoms
//!
//! The atoms `true`, `false`, and `nil`/`undefined`/`null` are reserved as
//! marshaling sentinels: engines map them to their native boolean/nil
//! values, so an atom with one of these names will not round-trip as a
//! plain atom.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Atom name an engine maps to its native `true`.
pub const ATOM_TRUE: &str = "true";
/// Atom name an engine maps to its native `false`.
pub const ATOM_FALSE: &str = "false";
/// Atom name an engine maps to its native nil; also the decode image of nil.
pub const ATOM_NIL: &str = "nil";
/// Alias of [`ATOM_NIL`] on the encode side; also the zero-results marker.
pub const ATOM_UNDEFINED: &str = "undefined";
/// Alias of [`ATOM_NIL`] on the encode side.
pub const ATOM_NULL: &str = "null";

/// Numeric payload of a [`Term`].
///
/// The subtype records how the host sent the value (or how an engine
/// decoded it), so equality is subtype-sensitive: `Int32(1)` ≠ `Int64(1)`.
/// Use [`Num::int`] to get value-fit selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Num {
    Int32(i32),
    Int64(i64),
    Float(f64),
}

impl Num {
    /// Integer with the narrowest subtype that fits the value.
    pub fn int(value: i64) -> Num {
        match i32::try_from(value) {
            Ok(narrow) => Num::Int32(narrow),
            Err(_) => Num::Int64(value),
        }
    }

    /// Double-precision float, regardless of integral value.
    pub fn float(value: f64) -> Num {
        Num::Float(value)
    }

    /// Integer value if this is an integer subtype.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Num::Int32(v) => Some(i64::from(*v)),
            Num::Int64(v) => Some(*v),
            Num::Float(_) => None,
        }
    }

    /// Float value if this is the float subtype.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Num::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Num {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Num::Int32(v) => write!(f, "{}", v),
            Num::Int64(v) => write!(f, "{}", v),
            Num::Float(v) => write!(f, "{}", v),
        }
    }
}

/// Opaque actor identity.
///
/// A `Pid` names a mailbox owned by the host; engines carry pids through
/// untouched and compare them only for identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pid(u64);

impl Pid {
    pub const fn from_raw(raw: u64) -> Pid {
        Pid(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#pid<{}>", self.0)
    }
}

/// Symbolic constant, distinct from [`Term::Binary`] text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Atom(String);

impl Atom {
    pub fn new(name: impl Into<String>) -> Atom {
        Atom(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<&str> for Atom {
    fn from(name: &str) -> Atom {
        Atom(name.to_owned())
    }
}

impl From<String> for Atom {
    fn from(name: String) -> Atom {
        Atom(name)
    }
}

impl PartialEq<str> for Atom {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Atom {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A host-side value.
///
/// `Binary` carries arbitrary bytes (UTF-8 text or raw data alike). `List`
/// is the variable-length sequence; `Tuple` is the fixed-arity one. The
/// distinction matters to marshaling: lists may encode as hybrid
/// array/map structures, tuples never do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Term {
    Num(Num),
    Pid(Pid),
    Atom(Atom),
    Binary(Vec<u8>),
    List(Vec<Term>),
    Tuple(Vec<Term>),
}

impl Term {
    /// Integer term with value-fit subtype selection.
    pub fn int(value: i64) -> Term {
        Term::Num(Num::int(value))
    }

    /// Float term.
    pub fn float(value: f64) -> Term {
        Term::Num(Num::float(value))
    }

    pub fn atom(name: impl Into<String>) -> Term {
        Term::Atom(Atom::new(name))
    }

    pub fn binary(bytes: impl Into<Vec<u8>>) -> Term {
        Term::Binary(bytes.into())
    }

    pub fn list(items: Vec<Term>) -> Term {
        Term::List(items)
    }

    pub fn tuple(items: Vec<Term>) -> Term {
        Term::Tuple(items)
    }

    /// The `nil` atom.
    pub fn nil() -> Term {
        Term::atom(ATOM_NIL)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Term::Num(_) => "number",
            Term::Pid(_) => "pid",
            Term::Atom(_) => "atom",
            Term::Binary(_) => "binary",
            Term::List(_) => "list",
            Term::Tuple(_) => "tuple",
        }
    }

    /// Integer value if this is an integer-subtyped number.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Term::Num(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Term::Atom(a) => Some(a.as_str()),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Term::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Term]> {
        match self {
            Term::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Term]> {
        match self {
            Term::Tuple(items) => Some(items),
            _ => None,
        }
    }
}

fn fmt_seq(f: &mut fmt::Formatter<'_>, items: &[Term], open: char, close: char) -> fmt::Result {
    write!(f, "{}", open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    write!(f, "{}", close)
}

impl fmt::Display for Term {
    /// Human-oriented rendering: atoms bare, UTF-8 binaries quoted, raw
    /// binaries as `<<...>>` byte lists, lists in `[]`, tuples in `{}`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Num(n) => write!(f, "{}", n),
            Term::Pid(p) => write!(f, "{}", p),
            Term::Atom(a) => write!(f, "{}", a),
            Term::Binary(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => write!(f, "\"{}\"", text.escape_debug()),
                Err(_) => {
                    write!(f, "<<")?;
                    for (i, b) in bytes.iter().enumerate() {
                        if i > 0 {
                            write!(f, ",")?;
                        }
                        write!(f, "{}", b)?;
                    }
                    write!(f, ">>")
                }
            },
            Term::List(items) => fmt_seq(f, items, '[', ']'),
            Term::Tuple(items) => fmt_seq(f, items, '{', '}'),
        }
    }
}
