//! pam_lua.so: a PAM service module that runs Lua scripts.
//!
//! A stack line names the script as the first module argument:
//!
//! ```text
//! auth required pam_lua.so my_checks.lua
//! ```
//!
//! Relative names resolve under `/lib/security/`.  The script defines any
//! subset of the six `pam_sm_*` functions plus an optional `pam_sm_end`
//! teardown hook; everything else lives in `pam-lua-core`.

mod ffi;
mod syslog;
mod transaction;

use pam_lua_core::{Entry, Transaction, call_handler, consts};
use std::ffi::{CStr, c_char, c_int};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use transaction::PamTransaction;

fn parse_argv(argc: c_int, argv: *const *const c_char) -> Vec<String> {
    if argv.is_null() || argc <= 0 {
        return Vec::new();
    }
    let mut args = Vec::with_capacity(argc as usize);
    for index in 0..argc as usize {
        let arg = unsafe { *argv.add(index) };
        if arg.is_null() {
            continue;
        }
        args.push(unsafe { CStr::from_ptr(arg) }.to_string_lossy().into_owned());
    }
    args
}

/// Shared trampoline: decode the C arguments, hand off to the dispatcher,
/// and make sure nothing (panics included) escapes the ABI boundary.
fn handle_entry(
    entry: Entry,
    pamh: *mut ffi::pam_handle_t,
    flags: c_int,
    argc: c_int,
    argv: *const *const c_char,
) -> c_int {
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
        let args = parse_argv(argc, argv);
        let txn: Arc<dyn Transaction> = Arc::new(PamTransaction::new(pamh));
        call_handler(&txn, entry, flags, &args)
    }));
    match outcome {
        Ok(status) => status,
        Err(_) => {
            log::error!("panic in {} suppressed", entry.handler());
            consts::PAM_SERVICE_ERR
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn pam_sm_authenticate(
    pamh: *mut ffi::pam_handle_t,
    flags: c_int,
    argc: c_int,
    argv: *const *const c_char,
) -> c_int {
    handle_entry(Entry::Authenticate, pamh, flags, argc, argv)
}

#[unsafe(no_mangle)]
pub extern "C" fn pam_sm_setcred(
    pamh: *mut ffi::pam_handle_t,
    flags: c_int,
    argc: c_int,
    argv: *const *const c_char,
) -> c_int {
    handle_entry(Entry::SetCredentials, pamh, flags, argc, argv)
}

#[unsafe(no_mangle)]
pub extern "C" fn pam_sm_acct_mgmt(
    pamh: *mut ffi::pam_handle_t,
    flags: c_int,
    argc: c_int,
    argv: *const *const c_char,
) -> c_int {
    handle_entry(Entry::AccountManagement, pamh, flags, argc, argv)
}

#[unsafe(no_mangle)]
pub extern "C" fn pam_sm_open_session(
    pamh: *mut ffi::pam_handle_t,
    flags: c_int,
    argc: c_int,
    argv: *const *const c_char,
) -> c_int {
    handle_entry(Entry::OpenSession, pamh, flags, argc, argv)
}

#[unsafe(no_mangle)]
pub extern "C" fn pam_sm_close_session(
    pamh: *mut ffi::pam_handle_t,
    flags: c_int,
    argc: c_int,
    argv: *const *const c_char,
) -> c_int {
    handle_entry(Entry::CloseSession, pamh, flags, argc, argv)
}

#[unsafe(no_mangle)]
pub extern "C" fn pam_sm_chauthtok(
    pamh: *mut ffi::pam_handle_t,
    flags: c_int,
    argc: c_int,
    argv: *const *const c_char,
) -> c_int {
    handle_entry(Entry::ChangeAuthTok, pamh, flags, argc, argv)
}
