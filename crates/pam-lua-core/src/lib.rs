//! pam-lua-core: the bridge between the PAM module ABI and Lua scripts.
//!
//! A PAM stack line like
//!
//! ```text
//! auth required pam_lua.so my_module.lua
//! ```
//!
//! routes the framework's entry points to same-named functions in
//! `/lib/security/my_module.lua`, with the PAM API exposed to the script as
//! a `pamh` handle object.  This crate holds everything except the C ABI:
//! the runtime lifecycle, the module loader, the handle adapter and its Lua
//! surface, the conversation bridge, and the error translation.  The
//! framework itself is reached through the [`Transaction`] trait, which the
//! `pam-lua` crate implements over libpam and [`harness::FakeTransaction`]
//! implements for tests.

#![forbid(unsafe_code)]

pub mod consts;
mod conv;
pub mod diag;
pub mod dispatch;
mod env;
pub mod error;
pub mod harness;
pub mod host;
mod loader;
pub mod runtime;
pub mod txn;
pub mod values;

pub use diag::{LogSink, MemorySink, Reporter};
pub use dispatch::{Entry, call_handler};
pub use error::{HostError, PamError, check};
pub use host::ScriptHost;
pub use loader::{DEFAULT_SECURITY_DIR, resolve_module_path};
pub use txn::{ConvReply, Item, Transaction};
pub use values::{Message, Response, XAuthData};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, shrugging off poisoning: a panicked script call must not
/// take every later framework call down with it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
