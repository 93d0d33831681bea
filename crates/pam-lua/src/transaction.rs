//! The libpam-backed [`Transaction`]: every trait method forwards to the
//! corresponding pam_* call on the raw handle.

use crate::ffi;
use crate::syslog::SyslogSink;
use pam_lua_core::txn::{ConvReply, Item, Transaction};
use pam_lua_core::values::{Message, XAuthData};
use pam_lua_core::{LogSink, ScriptHost, consts};
use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::ptr;
use std::sync::Arc;

pub struct PamTransaction {
    pamh: *mut ffi::pam_handle_t,
}

// The framework never uses one handle from two threads at once; the pointer
// only crosses threads if the host application moves the whole transaction.
unsafe impl Send for PamTransaction {}
unsafe impl Sync for PamTransaction {}

impl PamTransaction {
    pub fn new(pamh: *mut ffi::pam_handle_t) -> Self {
        Self { pamh }
    }

    fn conv(&self) -> Result<&ffi::pam_conv, i32> {
        let mut item: *const c_void = ptr::null();
        let code = unsafe { ffi::pam_get_item(self.pamh, consts::PAM_CONV, &mut item) };
        if code != consts::PAM_SUCCESS {
            return Err(code);
        }
        let conv = item.cast::<ffi::pam_conv>();
        if conv.is_null() {
            return Err(consts::PAM_CONV_ERR);
        }
        Ok(unsafe { &*conv })
    }
}

fn string_from(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }
}

impl Transaction for PamTransaction {
    fn item(&self, item: Item) -> Result<Option<String>, i32> {
        let mut value: *const c_void = ptr::null();
        let code = unsafe { ffi::pam_get_item(self.pamh, item.code(), &mut value) };
        if code != consts::PAM_SUCCESS {
            return Err(code);
        }
        Ok(string_from(value.cast()))
    }

    fn xauth_item(&self) -> Result<Option<XAuthData>, i32> {
        let mut value: *const c_void = ptr::null();
        let code = unsafe { ffi::pam_get_item(self.pamh, consts::PAM_XAUTHDATA, &mut value) };
        if code != consts::PAM_SUCCESS {
            return Err(code);
        }
        let raw = value.cast::<ffi::pam_xauth_data>();
        if raw.is_null() {
            return Ok(None);
        }
        let raw = unsafe { &*raw };
        let name = if raw.name.is_null() || raw.namelen <= 0 {
            String::new()
        } else {
            let bytes = unsafe {
                std::slice::from_raw_parts(raw.name.cast::<u8>(), raw.namelen as usize)
            };
            String::from_utf8_lossy(bytes).into_owned()
        };
        let data = if raw.data.is_null() || raw.datalen <= 0 {
            Vec::new()
        } else {
            unsafe { std::slice::from_raw_parts(raw.data.cast::<u8>(), raw.datalen as usize) }
                .to_vec()
        };
        XAuthData::new(name, data)
            .map(Some)
            .map_err(|_| consts::PAM_SYSTEM_ERR)
    }

    fn user(&self, prompt: Option<&str>) -> Result<Option<String>, i32> {
        let prompt = match prompt {
            Some(prompt) => {
                Some(CString::new(prompt).map_err(|_| consts::PAM_SYSTEM_ERR)?)
            }
            None => None,
        };
        let mut user: *const c_char = ptr::null();
        let code = unsafe {
            ffi::pam_get_user(
                self.pamh,
                &mut user,
                prompt.as_ref().map_or(ptr::null(), |p| p.as_ptr()),
            )
        };
        if code != consts::PAM_SUCCESS {
            return Err(code);
        }
        Ok(string_from(user))
    }

    fn fail_delay(&self, micro_sec: u32) -> Result<(), i32> {
        let code = unsafe { ffi::pam_fail_delay(self.pamh, micro_sec) };
        if code == consts::PAM_SUCCESS {
            Ok(())
        } else {
            Err(code)
        }
    }

    fn converse(&self, prompts: &[Message]) -> Result<Vec<ConvReply>, i32> {
        let conv = self.conv()?;
        let Some(callback) = conv.conv else {
            return Err(consts::PAM_CONV_ERR);
        };
        // Message text is validated NUL-free at construction.
        let texts: Vec<CString> = prompts
            .iter()
            .map(|m| CString::new(m.text()).map_err(|_| consts::PAM_CONV_ERR))
            .collect::<Result<_, i32>>()?;
        let messages: Vec<ffi::pam_message> = prompts
            .iter()
            .zip(&texts)
            .map(|(m, text)| ffi::pam_message {
                msg_style: m.style(),
                msg: text.as_ptr(),
            })
            .collect();
        let mut vector: Vec<*const ffi::pam_message> =
            messages.iter().map(|m| m as *const _).collect();
        let mut responses: *mut ffi::pam_response = ptr::null_mut();
        let code = unsafe {
            callback(
                messages.len() as c_int,
                vector.as_mut_ptr(),
                &mut responses,
                conv.appdata_ptr,
            )
        };
        if code != consts::PAM_SUCCESS {
            if !responses.is_null() {
                unsafe { libc::free(responses.cast()) };
            }
            return Err(code);
        }
        if responses.is_null() {
            return Err(consts::PAM_CONV_ERR);
        }
        // The response array and its strings belong to us now; free both
        // once the contents are copied out.
        let mut replies = Vec::with_capacity(prompts.len());
        for index in 0..prompts.len() {
            let response = unsafe { &*responses.add(index) };
            let text = string_from(response.resp);
            if !response.resp.is_null() {
                unsafe { libc::free(response.resp.cast()) };
            }
            replies.push(ConvReply {
                text,
                retcode: response.resp_retcode,
            });
        }
        unsafe { libc::free(responses.cast()) };
        Ok(replies)
    }

    fn getenv(&self, key: &str) -> Option<String> {
        let key = CString::new(key).ok()?;
        string_from(unsafe { ffi::pam_getenv(self.pamh, key.as_ptr()) })
    }

    fn putenv(&self, entry: &str) -> Result<(), i32> {
        let entry = CString::new(entry).map_err(|_| consts::PAM_BAD_ITEM)?;
        let code = unsafe { ffi::pam_putenv(self.pamh, entry.as_ptr()) };
        if code == consts::PAM_SUCCESS {
            Ok(())
        } else {
            Err(code)
        }
    }

    fn env_entries(&self) -> Vec<String> {
        let list = unsafe { ffi::pam_getenvlist(self.pamh) };
        if list.is_null() {
            return Vec::new();
        }
        let mut entries = Vec::new();
        let mut cursor = list;
        unsafe {
            while !(*cursor).is_null() {
                if let Some(entry) = string_from(*cursor) {
                    entries.push(entry);
                }
                libc::free((*cursor).cast());
                cursor = cursor.add(1);
            }
            libc::free(list.cast());
        }
        entries
    }

    fn stash(&self, key: &str, host: Arc<ScriptHost>) -> Result<(), i32> {
        let key = CString::new(key).map_err(|_| consts::PAM_SERVICE_ERR)?;
        let data = Box::into_raw(Box::new(host));
        let code = unsafe {
            ffi::pam_set_data(
                self.pamh,
                key.as_ptr(),
                data.cast(),
                Some(cleanup_script_host),
            )
        };
        if code == consts::PAM_SUCCESS {
            Ok(())
        } else {
            drop(unsafe { Box::from_raw(data) });
            Err(code)
        }
    }

    fn stashed(&self, key: &str) -> Option<Arc<ScriptHost>> {
        let key = CString::new(key).ok()?;
        let mut data: *const c_void = ptr::null();
        let code = unsafe { ffi::pam_get_data(self.pamh, key.as_ptr(), &mut data) };
        if code != consts::PAM_SUCCESS || data.is_null() {
            return None;
        }
        Some(unsafe { &*data.cast::<Arc<ScriptHost>>() }.clone())
    }

    fn log_sink(&self) -> Arc<dyn LogSink> {
        Arc::new(SyslogSink)
    }
}

/// Destructor registered with pam_set_data: runs the script's shutdown hook
/// and releases the adapter exactly once, at framework teardown.
unsafe extern "C" fn cleanup_script_host(
    pamh: *mut ffi::pam_handle_t,
    data: *mut c_void,
    _error_status: c_int,
) {
    if data.is_null() {
        return;
    }
    let host = unsafe { Box::from_raw(data.cast::<Arc<ScriptHost>>()) };
    let txn: Arc<dyn Transaction> = Arc::new(PamTransaction::new(pamh));
    host.shutdown(txn);
}
