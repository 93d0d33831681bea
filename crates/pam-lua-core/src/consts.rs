//! Linux-PAM constants mirrored for the bridge and for script code.
//!
//! Scripts see every name in [`SCRIPT_CONSTANTS`] as a read-only field on the
//! handle object, so `return pamh.PAM_AUTH_ERR` works without the script
//! importing anything.

// Status codes (pam_types.h).
pub const PAM_SUCCESS: i32 = 0;
pub const PAM_OPEN_ERR: i32 = 1;
pub const PAM_SYMBOL_ERR: i32 = 2;
pub const PAM_SERVICE_ERR: i32 = 3;
pub const PAM_SYSTEM_ERR: i32 = 4;
pub const PAM_BUF_ERR: i32 = 5;
pub const PAM_PERM_DENIED: i32 = 6;
pub const PAM_AUTH_ERR: i32 = 7;
pub const PAM_CRED_INSUFFICIENT: i32 = 8;
pub const PAM_AUTHINFO_UNAVAIL: i32 = 9;
pub const PAM_USER_UNKNOWN: i32 = 10;
pub const PAM_MAXTRIES: i32 = 11;
pub const PAM_NEW_AUTHTOK_REQD: i32 = 12;
pub const PAM_ACCT_EXPIRED: i32 = 13;
pub const PAM_SESSION_ERR: i32 = 14;
pub const PAM_CRED_UNAVAIL: i32 = 15;
pub const PAM_CRED_EXPIRED: i32 = 16;
pub const PAM_CRED_ERR: i32 = 17;
pub const PAM_NO_MODULE_DATA: i32 = 18;
pub const PAM_CONV_ERR: i32 = 19;
pub const PAM_AUTHTOK_ERR: i32 = 20;
pub const PAM_AUTHTOK_RECOVERY_ERR: i32 = 21;
pub const PAM_AUTHTOK_LOCK_BUSY: i32 = 22;
pub const PAM_AUTHTOK_DISABLE_AGING: i32 = 23;
pub const PAM_TRY_AGAIN: i32 = 24;
pub const PAM_IGNORE: i32 = 25;
pub const PAM_ABORT: i32 = 26;
pub const PAM_AUTHTOK_EXPIRED: i32 = 27;
pub const PAM_MODULE_UNKNOWN: i32 = 28;
pub const PAM_BAD_ITEM: i32 = 29;
pub const PAM_CONV_AGAIN: i32 = 30;
pub const PAM_INCOMPLETE: i32 = 31;

/// One past the highest status code libpam can return.
pub const PAM_RETURN_VALUES: i32 = 32;

// Item codes (pam_modules.h).
pub const PAM_SERVICE: i32 = 1;
pub const PAM_USER: i32 = 2;
pub const PAM_TTY: i32 = 3;
pub const PAM_RHOST: i32 = 4;
pub const PAM_CONV: i32 = 5;
pub const PAM_AUTHTOK: i32 = 6;
pub const PAM_OLDAUTHTOK: i32 = 7;
pub const PAM_RUSER: i32 = 8;
pub const PAM_USER_PROMPT: i32 = 9;
pub const PAM_FAIL_DELAY: i32 = 10;
pub const PAM_XDISPLAY: i32 = 11;
pub const PAM_XAUTHDATA: i32 = 12;
pub const PAM_AUTHTOK_TYPE: i32 = 13;

// Message styles for the conversation protocol.
pub const PAM_PROMPT_ECHO_OFF: i32 = 1;
pub const PAM_PROMPT_ECHO_ON: i32 = 2;
pub const PAM_ERROR_MSG: i32 = 3;
pub const PAM_TEXT_INFO: i32 = 4;
pub const PAM_RADIO_TYPE: i32 = 5;
pub const PAM_BINARY_PROMPT: i32 = 7;

// Flags passed to the entry points.
pub const PAM_SILENT: i32 = 0x8000;
pub const PAM_DISALLOW_NULL_AUTHTOK: i32 = 0x1;
pub const PAM_ESTABLISH_CRED: i32 = 0x2;
pub const PAM_DELETE_CRED: i32 = 0x4;
pub const PAM_REINITIALIZE_CRED: i32 = 0x8;
pub const PAM_REFRESH_CRED: i32 = 0x10;
pub const PAM_CHANGE_EXPIRED_AUTHTOK: i32 = 0x20;
pub const PAM_PRELIM_CHECK: i32 = 0x4000;
pub const PAM_UPDATE_AUTHTOK: i32 = 0x2000;

// Flags for pam_set_data cleanup callbacks.
pub const PAM_DATA_REPLACE: i32 = 0x2000_0000;
pub const PAM_DATA_SILENT: i32 = 0x4000_0000;

// Conversation limits (pam_appl.h).
pub const PAM_MAX_NUM_MSG: i32 = 32;
pub const PAM_MAX_MSG_SIZE: i32 = 512;
pub const PAM_MAX_RESP_SIZE: i32 = 512;

/// Whether `fail_delay` reaches a real `pam_fail_delay`.  Linux-PAM has it.
pub const HAVE_PAM_FAIL_DELAY: i32 = 1;

/// Every constant exposed to scripts as a field of the handle object.
pub const SCRIPT_CONSTANTS: &[(&str, i32)] = &[
    ("PAM_SUCCESS", PAM_SUCCESS),
    ("PAM_OPEN_ERR", PAM_OPEN_ERR),
    ("PAM_SYMBOL_ERR", PAM_SYMBOL_ERR),
    ("PAM_SERVICE_ERR", PAM_SERVICE_ERR),
    ("PAM_SYSTEM_ERR", PAM_SYSTEM_ERR),
    ("PAM_BUF_ERR", PAM_BUF_ERR),
    ("PAM_PERM_DENIED", PAM_PERM_DENIED),
    ("PAM_AUTH_ERR", PAM_AUTH_ERR),
    ("PAM_CRED_INSUFFICIENT", PAM_CRED_INSUFFICIENT),
    ("PAM_AUTHINFO_UNAVAIL", PAM_AUTHINFO_UNAVAIL),
    ("PAM_USER_UNKNOWN", PAM_USER_UNKNOWN),
    ("PAM_MAXTRIES", PAM_MAXTRIES),
    ("PAM_NEW_AUTHTOK_REQD", PAM_NEW_AUTHTOK_REQD),
    ("PAM_ACCT_EXPIRED", PAM_ACCT_EXPIRED),
    ("PAM_SESSION_ERR", PAM_SESSION_ERR),
    ("PAM_CRED_UNAVAIL", PAM_CRED_UNAVAIL),
    ("PAM_CRED_EXPIRED", PAM_CRED_EXPIRED),
    ("PAM_CRED_ERR", PAM_CRED_ERR),
    ("PAM_NO_MODULE_DATA", PAM_NO_MODULE_DATA),
    ("PAM_CONV_ERR", PAM_CONV_ERR),
    ("PAM_AUTHTOK_ERR", PAM_AUTHTOK_ERR),
    ("PAM_AUTHTOK_RECOVERY_ERR", PAM_AUTHTOK_RECOVERY_ERR),
    ("PAM_AUTHTOK_RECOVER_ERR", PAM_AUTHTOK_RECOVERY_ERR),
    ("PAM_AUTHTOK_LOCK_BUSY", PAM_AUTHTOK_LOCK_BUSY),
    ("PAM_AUTHTOK_DISABLE_AGING", PAM_AUTHTOK_DISABLE_AGING),
    ("PAM_TRY_AGAIN", PAM_TRY_AGAIN),
    ("PAM_IGNORE", PAM_IGNORE),
    ("PAM_ABORT", PAM_ABORT),
    ("PAM_AUTHTOK_EXPIRED", PAM_AUTHTOK_EXPIRED),
    ("PAM_MODULE_UNKNOWN", PAM_MODULE_UNKNOWN),
    ("PAM_BAD_ITEM", PAM_BAD_ITEM),
    ("PAM_CONV_AGAIN", PAM_CONV_AGAIN),
    ("PAM_INCOMPLETE", PAM_INCOMPLETE),
    ("_PAM_RETURN_VALUES", PAM_RETURN_VALUES),
    ("PAM_SERVICE", PAM_SERVICE),
    ("PAM_USER", PAM_USER),
    ("PAM_TTY", PAM_TTY),
    ("PAM_RHOST", PAM_RHOST),
    ("PAM_CONV", PAM_CONV),
    ("PAM_AUTHTOK", PAM_AUTHTOK),
    ("PAM_OLDAUTHTOK", PAM_OLDAUTHTOK),
    ("PAM_RUSER", PAM_RUSER),
    ("PAM_USER_PROMPT", PAM_USER_PROMPT),
    ("PAM_FAIL_DELAY", PAM_FAIL_DELAY),
    ("PAM_XDISPLAY", PAM_XDISPLAY),
    ("PAM_XAUTHDATA", PAM_XAUTHDATA),
    ("PAM_AUTHTOK_TYPE", PAM_AUTHTOK_TYPE),
    ("PAM_PROMPT_ECHO_OFF", PAM_PROMPT_ECHO_OFF),
    ("PAM_PROMPT_ECHO_ON", PAM_PROMPT_ECHO_ON),
    ("PAM_ERROR_MSG", PAM_ERROR_MSG),
    ("PAM_TEXT_INFO", PAM_TEXT_INFO),
    ("PAM_RADIO_TYPE", PAM_RADIO_TYPE),
    ("PAM_BINARY_PROMPT", PAM_BINARY_PROMPT),
    ("PAM_SILENT", PAM_SILENT),
    ("PAM_DISALLOW_NULL_AUTHTOK", PAM_DISALLOW_NULL_AUTHTOK),
    ("PAM_ESTABLISH_CRED", PAM_ESTABLISH_CRED),
    ("PAM_DELETE_CRED", PAM_DELETE_CRED),
    ("PAM_REINITIALIZE_CRED", PAM_REINITIALIZE_CRED),
    ("PAM_REFRESH_CRED", PAM_REFRESH_CRED),
    ("PAM_CHANGE_EXPIRED_AUTHTOK", PAM_CHANGE_EXPIRED_AUTHTOK),
    ("PAM_PRELIM_CHECK", PAM_PRELIM_CHECK),
    ("PAM_UPDATE_AUTHTOK", PAM_UPDATE_AUTHTOK),
    ("PAM_DATA_REPLACE", PAM_DATA_REPLACE),
    ("PAM_DATA_SILENT", PAM_DATA_SILENT),
    ("PAM_MAX_NUM_MSG", PAM_MAX_NUM_MSG),
    ("PAM_MAX_MSG_SIZE", PAM_MAX_MSG_SIZE),
    ("PAM_MAX_RESP_SIZE", PAM_MAX_RESP_SIZE),
    ("HAVE_PAM_FAIL_DELAY", HAVE_PAM_FAIL_DELAY),
];

/// Description of a status code, as printed by Linux-PAM's `pam_strerror`.
///
/// Returns `None` for out-of-range codes; callers surface that as nil rather
/// than an error.
pub fn strerror(code: i32) -> Option<&'static str> {
    let text = match code {
        PAM_SUCCESS => "Success",
        PAM_OPEN_ERR => "Failed to load module",
        PAM_SYMBOL_ERR => "Symbol not found",
        PAM_SERVICE_ERR => "Error in service module",
        PAM_SYSTEM_ERR => "System error",
        PAM_BUF_ERR => "Memory buffer error",
        PAM_PERM_DENIED => "Permission denied",
        PAM_AUTH_ERR => "Authentication failure",
        PAM_CRED_INSUFFICIENT => "Insufficient credentials to access authentication data",
        PAM_AUTHINFO_UNAVAIL => "Authentication service cannot retrieve authentication info",
        PAM_USER_UNKNOWN => "User not known to the underlying authentication module",
        PAM_MAXTRIES => "Have exhausted maximum number of retries for service",
        PAM_NEW_AUTHTOK_REQD => "Authentication token is no longer valid; new one required",
        PAM_ACCT_EXPIRED => "User account has expired",
        PAM_SESSION_ERR => "Cannot make/remove an entry for the specified session",
        PAM_CRED_UNAVAIL => "Authentication service cannot retrieve user credentials",
        PAM_CRED_EXPIRED => "User credentials expired",
        PAM_CRED_ERR => "Failure setting user credentials",
        PAM_NO_MODULE_DATA => "No module specific data is present",
        PAM_CONV_ERR => "Conversation error",
        PAM_AUTHTOK_ERR => "Authentication token manipulation error",
        PAM_AUTHTOK_RECOVERY_ERR => "Authentication information cannot be recovered",
        PAM_AUTHTOK_LOCK_BUSY => "Authentication token lock busy",
        PAM_AUTHTOK_DISABLE_AGING => "Authentication token aging disabled",
        PAM_TRY_AGAIN => "Failed preliminary check by password service",
        PAM_IGNORE => "The return value should be ignored by PAM dispatch",
        PAM_ABORT => "Critical error - immediate abort",
        PAM_AUTHTOK_EXPIRED => "Authentication token expired",
        PAM_MODULE_UNKNOWN => "Module is unknown",
        PAM_BAD_ITEM => "Bad item passed to pam_*_item()",
        PAM_CONV_AGAIN => "Conversation is waiting for event",
        PAM_INCOMPLETE => "Application needs to call libpam again",
        _ => return None,
    };
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strerror_covers_every_status_code() {
        for code in 0..PAM_RETURN_VALUES {
            let text = strerror(code);
            assert!(text.is_some(), "no description for status {code}");
            assert!(!text.unwrap().is_empty());
        }
    }

    #[test]
    fn strerror_out_of_range_is_none() {
        assert_eq!(strerror(-1), None);
        assert_eq!(strerror(PAM_RETURN_VALUES), None);
        assert_eq!(strerror(9999), None);
    }

    #[test]
    fn script_constants_have_unique_names() {
        let mut seen = std::collections::HashSet::new();
        for (name, _) in SCRIPT_CONSTANTS {
            assert!(seen.insert(*name), "duplicate constant {name}");
        }
    }

    #[test]
    fn script_constants_cover_the_status_codes() {
        for code in 0..PAM_RETURN_VALUES {
            assert!(
                SCRIPT_CONSTANTS.iter().any(|(_, v)| *v == code),
                "status {code} missing from SCRIPT_CONSTANTS"
            );
        }
    }
}
