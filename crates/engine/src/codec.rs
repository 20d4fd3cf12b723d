//! Script-facing structured-data codec
//!
//! Installs a global `json` table with `encode` and `decode`, bridged
//! through serde. Scripts use it to shape payloads before sending them
//! host-ward and to unpack text the host handed in as a binary. JSON null
//! maps to Lua nil in both directions; values with no JSON image
//! (functions, userdata) make `json.encode` raise, which a script can
//! contain with `pcall`.

use mlua::{Lua, LuaSerdeExt, SerializeOptions, Value};

pub(crate) fn install(lua: &Lua) -> mlua::Result<()> {
    let json = lua.create_table()?;
    json.set(
        "encode",
        lua.create_function(|_, value: Value| {
            serde_json::to_string(&value).map_err(mlua::Error::external)
        })?,
    )?;
    json.set(
        "decode",
        lua.create_function(|lua, text: mlua::String| {
            let parsed: serde_json::Value =
                serde_json::from_slice(&text.as_bytes()).map_err(mlua::Error::external)?;
            // Plain nil for null, not the boxed null sentinel.
            let options = SerializeOptions::new()
                .serialize_none_to_null(false)
                .serialize_unit_to_null(false);
            lua.to_value_with(&parsed, options)
        })?,
    )?;
    lua.globals().set("json", json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_lua() -> Lua {
        let lua = Lua::new();
        install(&lua).unwrap();
        lua
    }

    #[test]
    fn test_decode_object() {
        let lua = fresh_lua();
        let name = lua
            .load(r#"local v = json.decode('{"name":"ada","n":3}'); return v.name, v.n"#)
            .eval::<(String, i64)>()
            .unwrap();
        assert_eq!(name, ("ada".to_string(), 3));
    }

    #[test]
    fn test_decode_null_is_nil() {
        let lua = fresh_lua();
        let is_nil = lua
            .load("return json.decode('null') == nil")
            .eval::<bool>()
            .unwrap();
        assert!(is_nil);
    }

    #[test]
    fn test_encode_table() {
        let lua = fresh_lua();
        let text = lua
            .load("return json.encode({1, 2, 3})")
            .eval::<String>()
            .unwrap();
        assert_eq!(text, "[1,2,3]");
    }

    #[test]
    fn test_encode_failure_is_catchable() {
        let lua = fresh_lua();
        let caught = lua
            .load("local ok = pcall(json.encode, function() end); return ok")
            .eval::<bool>()
            .unwrap();
        assert!(!caught);
    }

    #[test]
    fn test_roundtrip_through_script() {
        let lua = fresh_lua();
        let text = lua
            .load(r#"return json.encode(json.decode('{"a":[1,2]}'))"#)
            .eval::<String>()
            .unwrap();
        assert_eq!(text, r#"{"a":[1,2]}"#);
    }
}
