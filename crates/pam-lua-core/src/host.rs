//! The handle adapter: the `pamh` object every script entry point receives.
//!
//! One [`ScriptHost`] exists per (framework handle, module path) pair, cached
//! in the framework's handle-scoped data store so repeated calls within one
//! transaction reuse the loaded namespace.  The host owns every lifetime
//! transition: construction acquires the runtime and loads the script,
//! teardown runs the script's `pam_sm_end` hook and releases the runtime.
//! Nothing else touches the lifecycle count.

use crate::consts;
use crate::conv;
use crate::diag::Reporter;
use crate::dispatch::{self, Entry};
use crate::env::EnvMap;
use crate::error::{self, HostError, PamError};
use crate::loader;
use crate::lock;
use crate::runtime::{self, RuntimeGuard};
use crate::txn::{Item, Transaction};
use crate::values::{Message, Response, XAuthData};
use mlua::{AnyUserData, RegistryKey, Table, UserData, UserDataFields, UserDataMethods, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

/// Tag used before a module path is known, and the prefix of the
/// handle-scoped storage key.
pub const MODULE_NAME: &str = "pam_lua";

struct Anchors {
    namespace: RegistryKey,
    handle: RegistryKey,
}

/// The long-lived adapter for one (handle, module path) pair.
pub struct ScriptHost {
    module_path: PathBuf,
    reporter: Reporter,
    /// Rebound at the start of every framework call; the handle pointer
    /// differs per transaction even when the adapter is reused.
    current: Mutex<Option<Arc<dyn Transaction>>>,
    anchors: Mutex<Option<Anchors>>,
    guard: Mutex<Option<RuntimeGuard>>,
}

impl ScriptHost {
    /// Resolve the module path from the stack arguments and fetch or build
    /// the adapter.  On failure the caller gets the status to report and the
    /// runtime acquisition, if one was taken, has been released.
    pub fn get_or_create(
        txn: &Arc<dyn Transaction>,
        argv: &[String],
    ) -> Result<Arc<Self>, i32> {
        let sink = txn.log_sink();
        let Some(first) = argv.first() else {
            Reporter::new(MODULE_NAME, sink).message("Lua script module name not supplied");
            return Err(consts::PAM_MODULE_UNKNOWN);
        };
        let path = loader::resolve_module_path(first);
        let stash_key = format!("{MODULE_NAME}.{}", path.display());
        if let Some(host) = txn.stashed(&stash_key) {
            host.bind(txn.clone());
            return Ok(host);
        }
        let reporter = Reporter::new(path.display().to_string(), sink);
        let host = match Self::build(txn, &path, reporter.clone()) {
            Ok(host) => host,
            Err(err) => return Err(report_build_failure(&reporter, &err)),
        };
        if let Err(code) = txn.stash(&stash_key, host.clone()) {
            reporter.message(&format!(
                "pam_set_data failed: {}",
                PamError::from_code(code).message
            ));
            // Dropping the only reference releases the runtime acquisition.
            return Err(code);
        }
        Ok(host)
    }

    fn build(
        txn: &Arc<dyn Transaction>,
        path: &Path,
        reporter: Reporter,
    ) -> Result<Arc<Self>, HostError> {
        let guard = runtime::acquire();
        let host = Arc::new(Self {
            module_path: path.to_owned(),
            reporter,
            current: Mutex::new(Some(txn.clone())),
            anchors: Mutex::new(None),
            guard: Mutex::new(None),
        });
        let built = guard.with(|lua| -> Result<Anchors, HostError> {
            // Handle surface first, script second: everything the script's
            // top level might reach exists before it runs.
            let handle = lua.create_userdata(HandleRef {
                host: Arc::downgrade(&host),
            })?;
            let handle = lua.create_registry_value(handle)?;
            let namespace = loader::load_module(lua, path)?;
            Ok(Anchors { namespace, handle })
        });
        // Failure drops `guard` here, undoing the acquisition.
        let anchors = built?;
        *lock(&host.anchors) = Some(anchors);
        *lock(&host.guard) = Some(guard);
        Ok(host)
    }

    /// Look up and run the script's handler for `entry`, translating the
    /// outcome to a status code.  Never panics, never raises.
    pub fn call(&self, entry: Entry, flags: i32, argv: &[String]) -> i32 {
        let guard_slot = lock(&self.guard);
        let anchors_slot = lock(&self.anchors);
        let (Some(guard), Some(anchors)) = (guard_slot.as_ref(), anchors_slot.as_ref()) else {
            self.reporter
                .message(&format!("{}() called after teardown", entry.handler()));
            return consts::PAM_SERVICE_ERR;
        };
        guard.with(|lua| {
            let namespace: Table = match lua.registry_value(&anchors.namespace) {
                Ok(namespace) => namespace,
                Err(err) => return self.reporter.failure(Some("fetching module namespace"), &err),
            };
            let handler = match namespace.raw_get::<_, Value>(entry.handler()) {
                Ok(Value::Function(handler)) => handler,
                Ok(Value::Nil) => {
                    self.reporter
                        .message(&format!("{}() is not defined", entry.handler()));
                    return consts::PAM_SYMBOL_ERR;
                }
                Ok(_) => {
                    self.reporter
                        .message(&format!("{} is not a function", entry.handler()));
                    return consts::PAM_SERVICE_ERR;
                }
                Err(err) => return self.reporter.failure(Some(entry.handler()), &err),
            };
            let handle = match lua.registry_value::<AnyUserData>(&anchors.handle) {
                Ok(handle) => handle,
                Err(err) => return self.reporter.failure(Some("fetching handle object"), &err),
            };
            let argv_table = match lua.create_sequence_from(argv.iter().cloned()) {
                Ok(argv_table) => argv_table,
                Err(err) => return self.reporter.failure(Some("marshalling argv"), &err),
            };
            match handler.call::<_, Value>((handle, flags, argv_table)) {
                Ok(Value::Integer(code)) => code as i32,
                Ok(other) => {
                    self.reporter.message(&format!(
                        "{}() did not return an integer (returned {})",
                        entry.handler(),
                        other.type_name()
                    ));
                    consts::PAM_SERVICE_ERR
                }
                Err(err) => self.translate_handler_error(entry, &err),
            }
        })
    }

    /// A raised framework error propagates its attached code; anything else
    /// is logged with a full traceback and mapped to a service/buffer error.
    fn translate_handler_error(&self, entry: Entry, err: &mlua::Error) -> i32 {
        if let Some(pam_err) = error::pam_error(err) {
            self.reporter
                .message(&format!("{}: {}", entry.handler(), pam_err.message));
            return pam_err.code;
        }
        self.reporter.traceback(err)
    }

    /// Framework teardown: run the script's shutdown hook if it has one,
    /// drop the Lua anchors, and release the runtime acquisition.
    pub fn shutdown(&self, txn: Arc<dyn Transaction>) {
        self.bind(txn);
        let guard = lock(&self.guard).take();
        let anchors = lock(&self.anchors).take();
        if let (Some(guard), Some(anchors)) = (guard, anchors) {
            guard.with(|lua| {
                self.run_end_handler(lua, &anchors);
                let _ = lua.remove_registry_value(anchors.namespace);
                let _ = lua.remove_registry_value(anchors.handle);
                lua.expire_registry_values();
            });
            // Dropping the guard may shut the interpreter down.
            drop(guard);
        }
        lock(&self.current).take();
    }

    fn run_end_handler(&self, lua: &mlua::Lua, anchors: &Anchors) {
        let Ok(namespace) = lua.registry_value::<Table>(&anchors.namespace) else {
            return;
        };
        match namespace.raw_get::<_, Value>(dispatch::END_HANDLER) {
            Ok(Value::Function(end_handler)) => {
                let Ok(handle) = lua.registry_value::<AnyUserData>(&anchors.handle) else {
                    return;
                };
                // The hook's return value carries no meaning.
                if let Err(err) = end_handler.call::<_, Value>((handle,)) {
                    self.translate_end_error(&err);
                }
            }
            Ok(Value::Nil) | Err(_) => {}
            Ok(_) => self
                .reporter
                .message(&format!("{} is not a function", dispatch::END_HANDLER)),
        }
    }

    fn translate_end_error(&self, err: &mlua::Error) {
        if let Some(pam_err) = error::pam_error(err) {
            self.reporter
                .message(&format!("{}: {}", dispatch::END_HANDLER, pam_err.message));
        } else {
            self.reporter.traceback(err);
        }
    }

    /// Point the adapter at the transaction for the current framework call.
    pub fn bind(&self, txn: Arc<dyn Transaction>) {
        *lock(&self.current) = Some(txn);
    }

    pub(crate) fn current_txn(&self) -> mlua::Result<Arc<dyn Transaction>> {
        lock(&self.current)
            .clone()
            .ok_or_else(|| mlua::Error::RuntimeError("no PAM transaction is bound".to_owned()))
    }

    pub fn module_path(&self) -> &Path {
        &self.module_path
    }
}

fn report_build_failure(reporter: &Reporter, err: &HostError) -> i32 {
    match err {
        // Script load failures carry a Lua traceback worth keeping whole.
        HostError::Load { source, .. } => {
            reporter.traceback(source);
            err.status()
        }
        HostError::Lua(source) => {
            reporter.failure(Some("building handle surface"), source);
            err.status()
        }
        other => {
            reporter.message(&other.to_string());
            other.status()
        }
    }
}

/// The Lua-visible face of a [`ScriptHost`].  Holds a weak reference so the
/// Lua registry does not keep the adapter (and with it the runtime) alive.
pub(crate) struct HandleRef {
    host: Weak<ScriptHost>,
}

impl HandleRef {
    fn host(&self) -> mlua::Result<Arc<ScriptHost>> {
        self.host
            .upgrade()
            .ok_or_else(|| mlua::Error::RuntimeError("PAM handle is no longer live".to_owned()))
    }

    fn txn(&self) -> mlua::Result<Arc<dyn Transaction>> {
        self.host()?.current_txn()
    }
}

fn pam_lua_err(code: i32) -> mlua::Error {
    PamError::from_code(code).into()
}

fn item_field<'lua, F>(fields: &mut F, name: &'static str, item: Item)
where
    F: UserDataFields<'lua, HandleRef>,
{
    fields.add_field_method_get(name, move |_, this| {
        this.txn()?.item(item).map_err(pam_lua_err)
    });
}

impl UserData for HandleRef {
    fn add_fields<'lua, F: UserDataFields<'lua, Self>>(fields: &mut F) {
        for (name, value) in consts::SCRIPT_CONSTANTS {
            fields.add_field(*name, *value);
        }

        item_field(fields, "user", Item::User);
        item_field(fields, "service", Item::Service);
        item_field(fields, "rhost", Item::Rhost);
        item_field(fields, "ruser", Item::Ruser);
        item_field(fields, "tty", Item::Tty);
        item_field(fields, "authtok", Item::AuthTok);
        item_field(fields, "oldauthtok", Item::OldAuthTok);
        item_field(fields, "user_prompt", Item::UserPrompt);
        item_field(fields, "xdisplay", Item::XDisplay);
        item_field(fields, "authtok_type", Item::AuthTokType);

        fields.add_field_method_get("xauthdata", |lua, this| {
            match this.txn()?.xauth_item().map_err(pam_lua_err)? {
                Some(data) => Ok(Value::UserData(lua.create_userdata(data)?)),
                None => Ok(Value::Nil),
            }
        });

        fields.add_field_method_get("env", |lua, this| {
            lua.create_userdata(EnvMap {
                host: this.host.clone(),
            })
        });

        fields.add_field_method_get("module_path", |_, this| {
            Ok(this.host()?.module_path.display().to_string())
        });

        fields.add_field_method_get("Message", |lua, _| {
            lua.create_function(|_, (style, text): (i32, String)| Ok(Message::new(style, text)?))
        });

        fields.add_field_method_get("Response", |lua, _| {
            lua.create_function(|_, (text, retcode): (Option<String>, i32)| {
                Ok(Response::new(text, retcode)?)
            })
        });

        fields.add_field_method_get("XAuthData", |lua, _| {
            lua.create_function(|_, (name, data): (String, mlua::String)| {
                Ok(XAuthData::new(name, data.as_bytes().to_vec())?)
            })
        });

        // Calling pamh.exception(code [, message]) raises the module's
        // framework error; the dispatcher propagates the attached code.
        fields.add_field_method_get("exception", |lua, _| {
            lua.create_function(
                |_, (code, message): (i32, Option<String>)| -> mlua::Result<()> {
                    Err(match message {
                        Some(message) => PamError::new(code, message),
                        None => PamError::from_code(code),
                    }
                    .into())
                },
            )
        });
    }

    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_method("conversation", |lua, this, prompts: Value| {
            let host = this.host()?;
            conv::conversation(lua, &host, prompts)
        });

        methods.add_method("get_user", |_, this, prompt: Option<String>| {
            this.txn()?.user(prompt.as_deref()).map_err(pam_lua_err)
        });

        methods.add_method("fail_delay", |_, this, micro_sec: i64| {
            let micro_sec = u32::try_from(micro_sec).map_err(|_| {
                mlua::Error::RuntimeError("fail_delay expects a non-negative delay".to_owned())
            })?;
            this.txn()?.fail_delay(micro_sec).map_err(pam_lua_err)
        });

        methods.add_method("strerror", |_, _, errnum: i32| {
            Ok(consts::strerror(errnum).map(str::to_owned))
        });

        // The Lua face of branching on a caught framework error:
        //   local ok, err = pcall(...)
        //   if pamh:error_code(err) == pamh.PAM_USER_UNKNOWN then ...
        methods.add_method("error_code", |_, _, value: Value| {
            Ok(match value {
                Value::Error(err) => error::pam_code(&err),
                _ => None,
            })
        });
    }
}
