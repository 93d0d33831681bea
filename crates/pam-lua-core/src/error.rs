//! Error types and the single translation point between framework status
//! codes and script-level errors.
//!
//! Every failing framework call raises a [`PamError`] into the script; every
//! error coming back out of a script call is reduced to a status code by
//! walking the `mlua::Error` cause chain.  Because failures travel as
//! `Result`, "first failure wins" needs no pending-error bookkeeping.

use crate::consts;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The per-module framework error scripts can raise and catch.
///
/// Carries the numeric status code alongside the human-readable description
/// so script code can branch on `code` (via `pamh.error_code`).
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PamError {
    pub code: i32,
    pub message: String,
}

impl PamError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Build from a bare status code using the framework's description.
    pub fn from_code(code: i32) -> Self {
        let message = consts::strerror(code)
            .map_or_else(|| format!("Unknown PAM error {code}"), str::to_owned);
        Self { code, message }
    }
}

impl From<PamError> for mlua::Error {
    fn from(err: PamError) -> Self {
        mlua::Error::external(err)
    }
}

/// `PAM_SUCCESS` is a no-op; anything else becomes a raisable [`PamError`].
pub fn check(code: i32) -> Result<(), PamError> {
    if code == consts::PAM_SUCCESS {
        Ok(())
    } else {
        Err(PamError::from_code(code))
    }
}

/// Find an attached [`PamError`] anywhere in the cause chain.
pub fn pam_error(err: &mlua::Error) -> Option<&PamError> {
    match err {
        mlua::Error::CallbackError { cause, .. } => pam_error(cause),
        mlua::Error::WithContext { cause, .. } => pam_error(cause),
        mlua::Error::ExternalError(inner) => inner.downcast_ref::<PamError>(),
        _ => None,
    }
}

/// The status code attached to a script-raised framework error, if any.
pub fn pam_code(err: &mlua::Error) -> Option<i32> {
    pam_error(err).map(|e| e.code)
}

fn is_memory_error(err: &mlua::Error) -> bool {
    match err {
        mlua::Error::MemoryError(_) => true,
        mlua::Error::CallbackError { cause, .. } => is_memory_error(cause),
        mlua::Error::WithContext { cause, .. } => is_memory_error(cause),
        _ => false,
    }
}

/// Status for an error with no attached code: memory exhaustion maps to
/// `PAM_BUF_ERR`, everything else to `PAM_SERVICE_ERR`.
pub fn status_for(err: &mlua::Error) -> i32 {
    if is_memory_error(err) {
        consts::PAM_BUF_ERR
    } else {
        consts::PAM_SERVICE_ERR
    }
}

/// Failure while resolving, constructing, or loading a handle adapter.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Lua script module name not supplied")]
    MissingModuleArg,
    #[error("Can not open module {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The script's top-level code failed to compile or run.
    #[error("executing {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: mlua::Error,
    },
    #[error(transparent)]
    Lua(#[from] mlua::Error),
    #[error(transparent)]
    Pam(#[from] PamError),
}

impl HostError {
    /// The status code reported to the framework for this failure.
    pub fn status(&self) -> i32 {
        match self {
            Self::MissingModuleArg => consts::PAM_MODULE_UNKNOWN,
            Self::Open { .. } => consts::PAM_OPEN_ERR,
            Self::Load { source, .. } => {
                if status_for(source) == consts::PAM_BUF_ERR {
                    consts::PAM_BUF_ERR
                } else {
                    consts::PAM_SYMBOL_ERR
                }
            }
            Self::Lua(source) => pam_code(source).unwrap_or_else(|| status_for(source)),
            Self::Pam(source) => source.code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_passes_success() {
        assert!(check(consts::PAM_SUCCESS).is_ok());
    }

    #[test]
    fn check_carries_code_and_description() {
        let err = check(consts::PAM_AUTH_ERR).unwrap_err();
        assert_eq!(err.code, consts::PAM_AUTH_ERR);
        assert_eq!(err.message, "Authentication failure");
    }

    #[test]
    fn unknown_code_still_produces_a_message() {
        let err = PamError::from_code(12345);
        assert_eq!(err.code, 12345);
        assert!(err.message.contains("12345"));
    }

    #[test]
    fn pam_code_survives_the_lua_boundary() {
        let lua_err: mlua::Error = PamError::from_code(consts::PAM_USER_UNKNOWN).into();
        assert_eq!(pam_code(&lua_err), Some(consts::PAM_USER_UNKNOWN));

        let wrapped = mlua::Error::CallbackError {
            traceback: "stack traceback: in function 'x'".to_owned(),
            cause: std::sync::Arc::new(lua_err),
        };
        assert_eq!(pam_code(&wrapped), Some(consts::PAM_USER_UNKNOWN));
    }

    #[test]
    fn plain_runtime_errors_map_to_service_err() {
        let err = mlua::Error::RuntimeError("boom".to_owned());
        assert_eq!(pam_code(&err), None);
        assert_eq!(status_for(&err), consts::PAM_SERVICE_ERR);
    }

    #[test]
    fn memory_errors_map_to_buf_err() {
        let err = mlua::Error::MemoryError("not enough memory".to_owned());
        assert_eq!(status_for(&err), consts::PAM_BUF_ERR);

        let wrapped = mlua::Error::CallbackError {
            traceback: String::new(),
            cause: std::sync::Arc::new(err),
        };
        assert_eq!(status_for(&wrapped), consts::PAM_BUF_ERR);
    }

    #[test]
    fn host_error_status_mapping() {
        assert_eq!(
            HostError::MissingModuleArg.status(),
            consts::PAM_MODULE_UNKNOWN
        );
        let open = HostError::Open {
            path: PathBuf::from("/lib/security/nope.lua"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(open.status(), consts::PAM_OPEN_ERR);
        let load = HostError::Load {
            path: PathBuf::from("/lib/security/broken.lua"),
            source: mlua::Error::RuntimeError("syntax".to_owned()),
        };
        assert_eq!(load.status(), consts::PAM_SYMBOL_ERR);
    }
}
