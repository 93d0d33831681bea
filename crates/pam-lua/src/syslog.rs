//! The real diagnostic sink: syslog under the authentication-privileged
//! facility, channel opened and closed around each message.

use pam_lua_core::LogSink;
use std::ffi::CString;

pub struct SyslogSink;

fn c_lossy(text: &str) -> CString {
    CString::new(text.replace('\0', "?")).unwrap_or_default()
}

impl LogSink for SyslogSink {
    fn emit(&self, tag: &str, line: &str) {
        let tag = c_lossy(tag);
        let line = c_lossy(line);
        // openlog keeps the tag pointer; both CStrings outlive the closelog.
        unsafe {
            libc::openlog(tag.as_ptr(), libc::LOG_CONS | libc::LOG_PID, libc::LOG_AUTHPRIV);
            libc::syslog(
                libc::LOG_AUTHPRIV | libc::LOG_ERR,
                c"%s".as_ptr(),
                line.as_ptr(),
            );
            libc::closelog();
        }
    }
}
