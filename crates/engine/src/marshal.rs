//! Term ⇄ Lua value marshaling
//!
//! The bidirectional codec between the host's `Term` model and Lua values.
//! Encode runs host→script (task arguments, callback replies); decode runs
//! script→host (return values, callback arguments).
//!
//! # Why decode is total
//!
//! Script values are untrusted: they can be cyclic, arbitrarily deep, or of
//! types the term model has no image for (functions, threads). Decode never
//! errors and never recurses unboundedly; it degrades to stable diagnostic
//! sentinels instead, so a response is always deliverable.
//!
//! # Table shapes
//!
//! Lua has one aggregate type, the host has two. A `List` encodes as a
//! hybrid table: 2-tuple elements become key/value insertions, empty tuples
//! insert nothing, every other element appends under the next 1-based array
//! key. A `Tuple` encodes as a pure array. Decode inspects contiguity:
//! tables whose keys run 1..n in iteration order come back as a `List` of
//! values, anything else as a `List` of `{key, value}` 2-tuples covering
//! every entry. An empty table is an empty `List`, unless its metatable
//! carries a truthy `is_hash` field, which selects the empty-map form
//! `[{}]` — the shape whose encode image is again an empty table.

use mlua::{Lua, MetaMethod, MultiValue, Table, UserData, UserDataMethods, Value};
use moonlet_term::{ATOM_FALSE, ATOM_NIL, ATOM_NULL, ATOM_TRUE, ATOM_UNDEFINED};
use moonlet_term::{Atom, Num, Pid, Term};
use std::ffi::c_void;

/// Tables nested deeper than this decode to [`DEPTH_SENTINEL`].
pub const MAX_TABLE_DEPTH: usize = 20;

/// Decode image of a table that directly contains itself.
pub const SELF_REF_SENTINEL: &[u8] = b"(table_self)";
/// Decode image of a table past the nesting limit.
pub const DEPTH_SENTINEL: &[u8] = b"(table)";
/// Prefix of the decode image of values with no term representation.
pub const FOREIGN_TYPE_PREFIX: &str = "luatype_";

/// Full userdata carrying a process reference through Lua untouched.
pub struct PidUserData(pub Pid);

impl UserData for PidUserData {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| Ok(this.0.to_string()));
    }
}

/// Full userdata for atoms constructed by script code via `host.atom`.
///
/// Encoded atoms become booleans, nil, or plain strings; this wrapper is
/// the only way a script can produce a value that decodes as `Term::Atom`.
pub struct AtomUserData(pub Atom);

impl UserData for AtomUserData {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(this.0.as_str().to_owned())
        });
    }
}

/// Encode one term into a Lua value.
///
/// Encoding is structurally recursive with no depth guard: terms are finite
/// by construction. The only failures are Lua-side (allocation, or a table
/// insertion rejected by Lua, e.g. a nil key from a `{nil, v}` pair).
pub fn encode(lua: &Lua, term: &Term) -> mlua::Result<Value> {
    match term {
        Term::Num(Num::Int32(v)) => Ok(Value::Integer(i64::from(*v))),
        Term::Num(Num::Int64(v)) => Ok(Value::Integer(*v)),
        Term::Num(Num::Float(v)) => Ok(Value::Number(*v)),
        Term::Pid(pid) => Ok(Value::UserData(lua.create_userdata(PidUserData(*pid))?)),
        Term::Atom(atom) => match atom.as_str() {
            ATOM_TRUE => Ok(Value::Boolean(true)),
            ATOM_FALSE => Ok(Value::Boolean(false)),
            ATOM_NIL | ATOM_UNDEFINED | ATOM_NULL => Ok(Value::Nil),
            text => Ok(Value::String(lua.create_string(text)?)),
        },
        Term::Binary(bytes) => Ok(Value::String(lua.create_string(bytes)?)),
        Term::List(items) => {
            let table = lua.create_table_with_capacity(items.len(), 0)?;
            let mut index: i64 = 1;
            for item in items {
                match item {
                    Term::Tuple(pair) if pair.len() == 2 => {
                        table.raw_set(encode(lua, &pair[0])?, encode(lua, &pair[1])?)?;
                    }
                    Term::Tuple(empty) if empty.is_empty() => {}
                    other => {
                        table.raw_set(index, encode(lua, other)?)?;
                        index += 1;
                    }
                }
            }
            Ok(Value::Table(table))
        }
        Term::Tuple(items) => {
            let table = lua.create_table_with_capacity(items.len(), 0)?;
            for (i, item) in items.iter().enumerate() {
                table.raw_set(i as i64 + 1, encode(lua, item)?)?;
            }
            Ok(Value::Table(table))
        }
    }
}

/// Encode an argument list left to right.
pub fn encode_all(lua: &Lua, terms: &[Term]) -> mlua::Result<MultiValue> {
    let mut values = Vec::with_capacity(terms.len());
    for term in terms {
        values.push(encode(lua, term)?);
    }
    Ok(MultiValue::from_vec(values))
}

/// Decode one Lua value into a term. Total: never fails, never hangs.
pub fn decode(value: &Value) -> Term {
    decode_at(value, None, 0)
}

/// Decode a value pack with the multi-return convention: zero values decode
/// to the `undefined` atom, one value to itself, several to a tuple in
/// left-to-right order.
pub fn decode_all(values: MultiValue) -> Term {
    let values = values.into_vec();
    match values.len() {
        0 => Term::atom(ATOM_UNDEFINED),
        1 => decode(&values[0]),
        _ => Term::Tuple(values.iter().map(decode).collect()),
    }
}

fn decode_at(value: &Value, enclosing: Option<*const c_void>, depth: usize) -> Term {
    match value {
        Value::Nil => Term::atom(ATOM_NIL),
        Value::Boolean(true) => Term::atom(ATOM_TRUE),
        Value::Boolean(false) => Term::atom(ATOM_FALSE),
        Value::Integer(i) => Term::Num(Num::int(*i)),
        Value::Number(n) => {
            // Integral doubles collapse to integers. Magnitudes past 2^53
            // can collide in this comparison; the protocol accepts that.
            let projected = *n as i64;
            if projected as f64 == *n {
                Term::Num(Num::int(projected))
            } else {
                Term::Num(Num::float(*n))
            }
        }
        Value::String(s) => Term::Binary(s.as_bytes().to_vec()),
        Value::Table(table) => decode_table(table, enclosing, depth),
        Value::UserData(ud) => {
            if let Ok(pid) = ud.borrow::<PidUserData>() {
                Term::Pid(pid.0)
            } else if let Ok(atom) = ud.borrow::<AtomUserData>() {
                Term::Atom(atom.0.clone())
            } else {
                foreign(value)
            }
        }
        other => foreign(other),
    }
}

fn foreign(value: &Value) -> Term {
    Term::binary(format!("{}{}", FOREIGN_TYPE_PREFIX, value.type_name()))
}

fn decode_table(table: &Table, enclosing: Option<*const c_void>, depth: usize) -> Term {
    let identity = table.to_pointer();
    if enclosing == Some(identity) {
        return Term::binary(SELF_REF_SENTINEL);
    }
    if depth >= MAX_TABLE_DEPTH {
        return Term::binary(DEPTH_SENTINEL);
    }

    // One walk builds both interpretations: the array candidate (values
    // under keys 1..n in iteration order) and the pair form covering every
    // entry. Keys decode under the same guards as values.
    let mut array = Vec::new();
    let mut pairs = Vec::new();
    let mut sequential = true;
    let mut index: i64 = 0;
    let _ = table.for_each::<Value, Value>(|key, value| {
        index += 1;
        let value = decode_at(&value, Some(identity), depth + 1);
        let key = decode_at(&key, Some(identity), depth + 1);
        if key.as_int() == Some(index) {
            array.push(value.clone());
        } else {
            sequential = false;
        }
        pairs.push(Term::tuple(vec![key, value]));
        Ok(())
    });

    if !sequential {
        return Term::List(pairs);
    }
    if array.is_empty() && hash_marked(table) {
        // Empty-map sentinel: one empty tuple, whose encode image is again
        // an empty table.
        return Term::list(vec![Term::tuple(vec![])]);
    }
    Term::List(array)
}

/// Truthy `is_hash` field on the table's metatable.
fn hash_marked(table: &Table) -> bool {
    let Some(meta) = table.metatable() else {
        return false;
    };
    let flag = meta.raw_get::<Value>("is_hash").unwrap_or(Value::Nil);
    !matches!(flag, Value::Nil | Value::Boolean(false))
}
