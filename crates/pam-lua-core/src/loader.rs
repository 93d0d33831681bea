//! Turning a module-path argument into a loaded script namespace.
//!
//! Each script runs inside a fresh table whose metatable falls back to the
//! interpreter globals, so the usual builtins (`string`, `table`, `os`, ...)
//! are visible while everything the script defines stays local to it.  Two
//! modules loaded into the same interpreter never see each other's globals.

use crate::error::HostError;
use mlua::{Lua, RegistryKey, Table};
use std::fs;
use std::path::{Path, PathBuf};

/// Where relative module names are resolved, per the platform convention
/// for security modules.
pub const DEFAULT_SECURITY_DIR: &str = "/lib/security/";

const SCRIPT_SUFFIX: &str = ".lua";

/// An absolute first argument is used as-is, anything else lives in the
/// security module directory.
pub fn resolve_module_path(arg: &str) -> PathBuf {
    let path = Path::new(arg);
    if path.is_absolute() {
        path.to_owned()
    } else {
        Path::new(DEFAULT_SECURITY_DIR).join(path)
    }
}

/// The namespace name: file base name with a trailing `.lua` stripped.
fn module_name(path: &Path) -> String {
    let base = path
        .file_name()
        .map_or_else(|| path.to_string_lossy(), |name| name.to_string_lossy());
    base.strip_suffix(SCRIPT_SUFFIX).unwrap_or(&base).to_owned()
}

fn fresh_namespace<'lua>(lua: &'lua Lua, path: &Path) -> mlua::Result<Table<'lua>> {
    let namespace = lua.create_table()?;
    let meta = lua.create_table()?;
    meta.set("__index", lua.globals())?;
    namespace.set_metatable(Some(meta));
    namespace.set("_NAME", module_name(path))?;
    namespace.set("_FILE", path.to_string_lossy().into_owned())?;
    Ok(namespace)
}

/// Execute the script file into a fresh namespace and return a registry
/// anchor for it.  The chunk is named after the path so tracebacks point at
/// the script.
pub(crate) fn load_module(lua: &Lua, path: &Path) -> Result<RegistryKey, HostError> {
    let source = fs::read(path).map_err(|source| HostError::Open {
        path: path.to_owned(),
        source,
    })?;
    let namespace = fresh_namespace(lua, path)?;
    lua.load(&source)
        .set_name(format!("@{}", path.display()))
        .set_environment(namespace.clone())
        .exec()
        .map_err(|source| HostError::Load {
            path: path.to_owned(),
            source,
        })?;
    log::debug!("loaded Lua PAM module {}", path.display());
    Ok(lua.create_registry_value(namespace)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_paths_are_used_verbatim() {
        assert_eq!(
            resolve_module_path("/opt/pam/check.lua"),
            PathBuf::from("/opt/pam/check.lua")
        );
    }

    #[test]
    fn relative_names_land_in_the_security_dir() {
        assert_eq!(
            resolve_module_path("check.lua"),
            PathBuf::from("/lib/security/check.lua")
        );
    }

    #[test]
    fn module_name_strips_the_script_suffix() {
        assert_eq!(module_name(Path::new("/lib/security/check.lua")), "check");
        assert_eq!(module_name(Path::new("/lib/security/check")), "check");
        assert_eq!(module_name(Path::new("odd.lua.lua")), "odd.lua");
    }
}
