//! The PAM handle boundary.
//!
//! Everything the bridge needs from the framework goes through the
//! [`Transaction`] trait: item access, the conversation callback, the
//! environment list, and the handle-scoped data store.  The real
//! implementation (in the `pam-lua` crate) forwards to libpam; the test
//! harness provides [`crate::harness::FakeTransaction`].
//!
//! Methods that mirror a pam_* call report failure as the raw status code;
//! callers convert through [`crate::error::PamError`] at the script boundary.

use crate::diag::LogSink;
use crate::host::ScriptHost;
use crate::values::{Message, XAuthData};
use crate::consts;
use std::sync::Arc;

/// Framework item slots exposed to scripts as read-only attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Item {
    Service,
    User,
    Tty,
    Rhost,
    AuthTok,
    OldAuthTok,
    Ruser,
    UserPrompt,
    XDisplay,
    AuthTokType,
}

impl Item {
    /// The framework's numeric code for this item.
    pub fn code(self) -> i32 {
        match self {
            Self::Service => consts::PAM_SERVICE,
            Self::User => consts::PAM_USER,
            Self::Tty => consts::PAM_TTY,
            Self::Rhost => consts::PAM_RHOST,
            Self::AuthTok => consts::PAM_AUTHTOK,
            Self::OldAuthTok => consts::PAM_OLDAUTHTOK,
            Self::Ruser => consts::PAM_RUSER,
            Self::UserPrompt => consts::PAM_USER_PROMPT,
            Self::XDisplay => consts::PAM_XDISPLAY,
            Self::AuthTokType => consts::PAM_AUTHTOK_TYPE,
        }
    }
}

/// One reply from the conversation callback, mirroring `struct pam_response`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvReply {
    pub text: Option<String>,
    pub retcode: i32,
}

/// One authentication transaction: the per-handle view of the framework.
///
/// The framework never re-enters a handle concurrently, but distinct handles
/// may live on distinct threads of one host process, hence `Send + Sync`.
pub trait Transaction: Send + Sync {
    /// Read a string item; `Ok(None)` when the slot is unset.
    fn item(&self, item: Item) -> Result<Option<String>, i32>;

    /// Read the `PAM_XAUTHDATA` item, exchanged as a structure.
    fn xauth_item(&self) -> Result<Option<XAuthData>, i32>;

    /// The user name, prompting through the conversation if it is unknown.
    fn user(&self, prompt: Option<&str>) -> Result<Option<String>, i32>;

    /// Register a fail delay in microseconds.
    fn fail_delay(&self, micro_sec: u32) -> Result<(), i32>;

    /// Invoke the conversation callback once with the whole prompt batch.
    /// The reply vector must pair with the prompts by position.
    fn converse(&self, prompts: &[Message]) -> Result<Vec<ConvReply>, i32>;

    /// Look up one environment variable.
    fn getenv(&self, key: &str) -> Option<String>;

    /// `NAME=value` sets, `NAME=` sets empty, bare `NAME` deletes.
    fn putenv(&self, entry: &str) -> Result<(), i32>;

    /// The live environment as `NAME=value` entries, in framework order.
    /// Iterators re-read this on every step rather than snapshotting.
    fn env_entries(&self) -> Vec<String>;

    /// Store the adapter in the handle-scoped data store.  The framework
    /// owns it from here and tears it down at the end of the transaction.
    fn stash(&self, key: &str, host: Arc<ScriptHost>) -> Result<(), i32>;

    /// Fetch a previously stashed adapter.
    fn stashed(&self, key: &str) -> Option<Arc<ScriptHost>>;

    /// Where diagnostics for this transaction go.
    fn log_sink(&self) -> Arc<dyn LogSink>;
}
