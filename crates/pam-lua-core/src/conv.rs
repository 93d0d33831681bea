//! The conversation bridge.
//!
//! Scripts hand over one Message-like value or a list of them; the whole
//! batch goes to the framework's conversation callback in a single call so
//! the application sees the prompts as one transaction, and the replies come
//! back with the same cardinality: single in, single out; list in, list out.

use crate::consts;
use crate::error::PamError;
use crate::host::ScriptHost;
use crate::values::{Message, Response};
use mlua::{Lua, Table, Value};
use std::sync::Arc;

/// Accept a `Message` userdata or a duck-typed `{msg_style=..., msg=...}`
/// table.
fn message_from(value: &Value) -> mlua::Result<Message> {
    match value {
        Value::UserData(ud) => {
            let message = ud.borrow::<Message>().map_err(|_| {
                mlua::Error::RuntimeError("conversation() expects Message values".to_owned())
            })?;
            Ok(message.clone())
        }
        Value::Table(table) => {
            let style: i32 = table.get("msg_style")?;
            let text: String = table.get("msg")?;
            Ok(Message::new(style, text)?)
        }
        other => Err(mlua::Error::RuntimeError(format!(
            "conversation() expects a Message or a list of Messages, got {}",
            other.type_name()
        ))),
    }
}

fn run_batch(host: &Arc<ScriptHost>, batch: &[Message]) -> mlua::Result<Vec<Response>> {
    let txn = host.current_txn()?;
    let replies = txn
        .converse(batch)
        .map_err(|code| mlua::Error::from(PamError::from_code(code)))?;
    if replies.len() != batch.len() {
        return Err(PamError::new(
            consts::PAM_CONV_ERR,
            format!(
                "conversation returned {} responses for {} prompts",
                replies.len(),
                batch.len()
            ),
        )
        .into());
    }
    Ok(replies.into_iter().map(Response::from_reply).collect())
}

fn run_single<'lua>(
    lua: &'lua Lua,
    host: &Arc<ScriptHost>,
    message: Message,
) -> mlua::Result<Value<'lua>> {
    let mut replies = run_batch(host, std::slice::from_ref(&message))?;
    let reply = replies
        .pop()
        .ok_or_else(|| mlua::Error::from(PamError::from_code(consts::PAM_CONV_ERR)))?;
    Ok(Value::UserData(lua.create_userdata(reply)?))
}

/// `pamh:conversation(prompts)`.
pub(crate) fn conversation<'lua>(
    lua: &'lua Lua,
    host: &Arc<ScriptHost>,
    prompts: Value<'lua>,
) -> mlua::Result<Value<'lua>> {
    let table = match prompts {
        Value::Table(table) => table,
        single => return run_single(lua, host, message_from(&single)?),
    };
    // A table carrying a msg field is one duck-typed message, not a sequence.
    if table.contains_key("msg")? {
        let message = message_from(&Value::Table(table))?;
        return run_single(lua, host, message);
    }
    let len = table.raw_len();
    if len == 0 {
        // Nothing to ask; hand the empty sequence straight back.
        return Ok(Value::Table(table));
    }
    let mut batch = Vec::with_capacity(len);
    for index in 1..=len {
        let element: Value = table.raw_get(index)?;
        batch.push(message_from(&element)?);
    }
    let replies = run_batch(host, &batch)?;
    let out: Table = lua.create_table_with_capacity(len, 0)?;
    for (index, reply) in replies.into_iter().enumerate() {
        out.raw_set(index + 1, lua.create_userdata(reply)?)?;
    }
    Ok(Value::Table(out))
}
