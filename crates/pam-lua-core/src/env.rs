//! The `pamh.env` mapping: a live view over the transaction's environment.
//!
//! No state is owned here; every operation goes straight to the framework
//! through the current transaction.  Iterators keep nothing but a position
//! index and re-read the live list on each step, so mutation during
//! iteration can skip or repeat entries but can never touch freed memory.
//! Lua 5.4 dropped the `__pairs` metamethod, so iteration goes through the
//! `keys`/`values`/`items` factories.

use crate::error::PamError;
use crate::host::ScriptHost;
use mlua::{Function, Lua, MetaMethod, MultiValue, UserData, UserDataMethods, Value, Variadic};
use std::sync::Weak;
use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) struct EnvMap {
    pub(crate) host: Weak<ScriptHost>,
}

impl EnvMap {
    fn host(&self) -> mlua::Result<std::sync::Arc<ScriptHost>> {
        self.host
            .upgrade()
            .ok_or_else(|| mlua::Error::RuntimeError("PAM handle is no longer live".to_owned()))
    }
}

/// Environment keys must be non-empty and free of `=` and NUL.
fn check_key(key: &str) -> mlua::Result<()> {
    if key.is_empty() {
        return Err(mlua::Error::RuntimeError(
            "PAM environment key must not be empty".to_owned(),
        ));
    }
    if key.contains('=') {
        return Err(mlua::Error::RuntimeError(
            "PAM environment key can not contain '='".to_owned(),
        ));
    }
    if key.contains('\0') {
        return Err(mlua::Error::RuntimeError(
            "PAM environment key can not contain NUL bytes".to_owned(),
        ));
    }
    Ok(())
}

/// Split a `NAME=value` entry.  Entries without `=` yield an empty value.
fn split_entry(entry: &str) -> (&str, &str) {
    entry.split_once('=').unwrap_or((entry, ""))
}

#[derive(Clone, Copy)]
enum Part {
    Key,
    Value,
    Pair,
}

/// Build a restartable iterator function over the live environment.
fn make_iter(lua: &Lua, host: Weak<ScriptHost>, part: Part) -> mlua::Result<Function<'_>> {
    let pos = AtomicUsize::new(0);
    lua.create_function(move |lua, _: MultiValue| {
        let Some(host) = host.upgrade() else {
            return Ok(Variadic::new());
        };
        let txn = host.current_txn()?;
        let entries = txn.env_entries();
        let index = pos.fetch_add(1, Ordering::Relaxed);
        let Some(entry) = entries.get(index) else {
            return Ok(Variadic::new());
        };
        let (key, value) = split_entry(entry);
        let values = match part {
            Part::Key => vec![Value::String(lua.create_string(key)?)],
            Part::Value => vec![Value::String(lua.create_string(value)?)],
            Part::Pair => vec![
                Value::String(lua.create_string(key)?),
                Value::String(lua.create_string(value)?),
            ],
        };
        Ok(Variadic::from_iter(values))
    })
}

impl UserData for EnvMap {
    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_method("get", |lua, this, (key, default): (String, Option<Value>)| {
            check_key(&key)?;
            let txn = this.host()?.current_txn()?;
            match txn.getenv(&key) {
                Some(value) => Ok(Value::String(lua.create_string(value)?)),
                None => Ok(default.unwrap_or(Value::Nil)),
            }
        });

        methods.add_method("contains", |_, this, key: String| {
            check_key(&key)?;
            let txn = this.host()?.current_txn()?;
            Ok(txn.getenv(&key).is_some())
        });

        methods.add_method("keys", |lua, this, ()| {
            make_iter(lua, this.host.clone(), Part::Key)
        });

        methods.add_method("values", |lua, this, ()| {
            make_iter(lua, this.host.clone(), Part::Value)
        });

        methods.add_method("items", |lua, this, ()| {
            make_iter(lua, this.host.clone(), Part::Pair)
        });

        methods.add_meta_method(MetaMethod::Index, |lua, this, key: String| {
            check_key(&key)?;
            let txn = this.host()?.current_txn()?;
            match txn.getenv(&key) {
                Some(value) => Ok(Value::String(lua.create_string(value)?)),
                None => Ok(Value::Nil),
            }
        });

        methods.add_meta_method(
            MetaMethod::NewIndex,
            |_, this, (key, value): (String, Option<String>)| {
                check_key(&key)?;
                let txn = this.host()?.current_txn()?;
                let entry = match &value {
                    Some(value) => {
                        if value.contains('\0') {
                            return Err(mlua::Error::RuntimeError(
                                "PAM environment value can not contain NUL bytes".to_owned(),
                            ));
                        }
                        format!("{key}={value}")
                    }
                    // A bare name deletes the variable.
                    None => key.clone(),
                };
                txn.putenv(&entry)
                    .map_err(|code| mlua::Error::from(PamError::from_code(code)))
            },
        );

        methods.add_meta_method(MetaMethod::Len, |_, this, ()| {
            let txn = this.host()?.current_txn()?;
            Ok(txn.env_entries().len())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_entry_handles_missing_separator() {
        assert_eq!(split_entry("PATH=/bin"), ("PATH", "/bin"));
        assert_eq!(split_entry("EMPTY="), ("EMPTY", ""));
        assert_eq!(split_entry("WEIRD"), ("WEIRD", ""));
        assert_eq!(split_entry("A=b=c"), ("A", "b=c"));
    }

    #[test]
    fn key_validation() {
        assert!(check_key("HOME").is_ok());
        assert!(check_key("").is_err());
        assert!(check_key("A=B").is_err());
        assert!(check_key("A\0B").is_err());
    }
}
