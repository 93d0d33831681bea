//! The immutable value types crossing the script boundary.
//!
//! `Message`, `Response` and `XAuthData` are a closed set of plain compiled
//! types: construction validates and copies its inputs, and the Lua surface
//! exposes read-only fields only.  Scripts reach the constructors through
//! fields of the handle object (`pamh.Message(...)` etc.).

use crate::consts;
use mlua::{UserData, UserDataFields};
use thiserror::Error;

/// Rejected constructor input for one of the value types.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct InvalidValue(String);

impl From<InvalidValue> for mlua::Error {
    fn from(err: InvalidValue) -> Self {
        mlua::Error::external(err)
    }
}

fn reject_nul(what: &str, text: &str) -> Result<(), InvalidValue> {
    if text.contains('\0') {
        Err(InvalidValue(format!("{what} must not contain NUL bytes")))
    } else {
        Ok(())
    }
}

/// A single conversation prompt: a style tag plus the text to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    style: i32,
    text: String,
}

impl Message {
    pub fn new(style: i32, text: impl Into<String>) -> Result<Self, InvalidValue> {
        let text = text.into();
        match style {
            consts::PAM_PROMPT_ECHO_OFF
            | consts::PAM_PROMPT_ECHO_ON
            | consts::PAM_ERROR_MSG
            | consts::PAM_TEXT_INFO
            | consts::PAM_RADIO_TYPE
            | consts::PAM_BINARY_PROMPT => {}
            other => {
                return Err(InvalidValue(format!(
                    "{other} is not a conversation message style"
                )));
            }
        }
        reject_nul("message text", &text)?;
        Ok(Self { style, text })
    }

    pub fn style(&self) -> i32 {
        self.style
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl UserData for Message {
    fn add_fields<'lua, F: UserDataFields<'lua, Self>>(fields: &mut F) {
        fields.add_field_method_get("msg_style", |_, this| Ok(this.style));
        fields.add_field_method_get("msg", |_, this| Ok(this.text.clone()));
    }
}

/// One reply from the conversation: the entered text (or nil) plus the
/// framework's return code for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    text: Option<String>,
    retcode: i32,
}

impl Response {
    pub fn new(text: Option<String>, retcode: i32) -> Result<Self, InvalidValue> {
        if let Some(text) = &text {
            reject_nul("response text", text)?;
        }
        Ok(Self { text, retcode })
    }

    /// Wrap a reply the framework already produced; no validation since the
    /// text came across the C boundary and is NUL-free by construction.
    pub(crate) fn from_reply(reply: crate::txn::ConvReply) -> Self {
        Self {
            text: reply.text,
            retcode: reply.retcode,
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn retcode(&self) -> i32 {
        self.retcode
    }
}

impl UserData for Response {
    fn add_fields<'lua, F: UserDataFields<'lua, Self>>(fields: &mut F) {
        fields.add_field_method_get("resp", |_, this| Ok(this.text.clone()));
        fields.add_field_method_get("resp_retcode", |_, this| Ok(this.retcode));
    }
}

/// The `PAM_XAUTHDATA` item: a named blob, exchanged as a structure rather
/// than a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XAuthData {
    name: String,
    data: Vec<u8>,
}

impl XAuthData {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Result<Self, InvalidValue> {
        let name = name.into();
        reject_nul("xauthdata name", &name)?;
        Ok(Self {
            name,
            data: data.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl UserData for XAuthData {
    fn add_fields<'lua, F: UserDataFields<'lua, Self>>(fields: &mut F) {
        fields.add_field_method_get("name", |_, this| Ok(this.name.clone()));
        fields.add_field_method_get("data", |lua, this| lua.create_string(&this.data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_validates_style() {
        assert!(Message::new(consts::PAM_PROMPT_ECHO_OFF, "Password: ").is_ok());
        assert!(Message::new(consts::PAM_TEXT_INFO, "").is_ok());
        assert!(Message::new(0, "bad").is_err());
        assert!(Message::new(6, "bad").is_err());
        assert!(Message::new(-3, "bad").is_err());
    }

    #[test]
    fn message_rejects_nul() {
        assert!(Message::new(consts::PAM_TEXT_INFO, "a\0b").is_err());
    }

    #[test]
    fn response_allows_absent_text() {
        let r = Response::new(None, 0).unwrap();
        assert_eq!(r.text(), None);
        assert_eq!(r.retcode(), 0);
    }

    #[test]
    fn response_rejects_nul() {
        assert!(Response::new(Some("a\0b".to_owned()), 0).is_err());
    }

    #[test]
    fn xauthdata_keeps_binary_payload() {
        let x = XAuthData::new("MIT-MAGIC-COOKIE-1", vec![0u8, 1, 2, 255]).unwrap();
        assert_eq!(x.name(), "MIT-MAGIC-COOKIE-1");
        assert_eq!(x.data(), &[0, 1, 2, 255]);
    }

    #[test]
    fn xauthdata_rejects_nul_in_name() {
        assert!(XAuthData::new("a\0b", b"data".to_vec()).is_err());
    }
}
