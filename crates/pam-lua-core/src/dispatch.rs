//! Entry-point dispatch: the bridge between a framework call and a named
//! function in the loaded script.

use crate::host::ScriptHost;
use crate::txn::Transaction;
use std::sync::Arc;

/// The six management functions a PAM module can be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entry {
    Authenticate,
    SetCredentials,
    AccountManagement,
    OpenSession,
    CloseSession,
    ChangeAuthTok,
}

/// Invoked at handle teardown when the script defines it.
pub(crate) const END_HANDLER: &str = "pam_sm_end";

impl Entry {
    /// The function name looked up in the script namespace.
    pub fn handler(self) -> &'static str {
        match self {
            Self::Authenticate => "pam_sm_authenticate",
            Self::SetCredentials => "pam_sm_setcred",
            Self::AccountManagement => "pam_sm_acct_mgmt",
            Self::OpenSession => "pam_sm_open_session",
            Self::CloseSession => "pam_sm_close_session",
            Self::ChangeAuthTok => "pam_sm_chauthtok",
        }
    }
}

/// Serve one framework call: obtain (or build) the handle adapter for the
/// module named in `argv`, run the script handler, reduce the outcome to a
/// status code.  Failures are local to this call; nothing propagates.
pub fn call_handler(
    txn: &Arc<dyn Transaction>,
    entry: Entry,
    flags: i32,
    argv: &[String],
) -> i32 {
    match ScriptHost::get_or_create(txn, argv) {
        Ok(host) => host.call(entry, flags, argv),
        Err(status) => status,
    }
}
