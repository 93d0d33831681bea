//! Process-wide interpreter lifecycle.
//!
//! A host process can run several authentication transactions, for several
//! script modules, possibly on several threads, over its lifetime.  All of
//! them share one embedded Lua interpreter, created when the first adapter
//! needs it and destroyed when the last one lets go.  This is a strict
//! reference count: shutdown must not happen while any adapter is live, and
//! must happen when the count returns to zero so a long-lived host does not
//! pin the interpreter forever.
//!
//! The same mutex that guards the count also serializes every excursion into
//! script code ([`RuntimeGuard::with`]), which is the embedding's global
//! execution lock.  Callers must not nest `with` calls.

use mlua::Lua;
use std::sync::Mutex;

struct Interp {
    lua: Lua,
    refs: usize,
}

static INTERP: Mutex<Option<Interp>> = Mutex::new(None);

fn slot() -> std::sync::MutexGuard<'static, Option<Interp>> {
    INTERP.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Keeps the interpreter alive.  Dropping the last guard shuts it down.
pub struct RuntimeGuard(());

/// Increment the reference count, starting the interpreter on 0 -> 1.
pub fn acquire() -> RuntimeGuard {
    let mut interp = slot();
    match interp.as_mut() {
        Some(interp) => interp.refs += 1,
        None => {
            log::debug!("starting embedded Lua interpreter");
            *interp = Some(Interp {
                lua: Lua::new(),
                refs: 1,
            });
        }
    }
    RuntimeGuard(())
}

impl RuntimeGuard {
    /// Run `f` against the interpreter, holding the execution lock.
    pub fn with<R>(&self, f: impl FnOnce(&Lua) -> R) -> R {
        let interp = slot();
        let interp = interp
            .as_ref()
            .expect("runtime guard is live, so the interpreter must be");
        f(&interp.lua)
    }
}

impl Drop for RuntimeGuard {
    fn drop(&mut self) {
        let mut interp = slot();
        debug_assert!(interp.is_some(), "guard outlived the interpreter");
        if let Some(live) = interp.as_mut() {
            live.refs -= 1;
            if live.refs == 0 {
                log::debug!("last adapter gone, shutting embedded Lua interpreter down");
                *interp = None;
            }
        }
    }
}

/// Whether the interpreter currently exists.  True iff the count is > 0.
pub fn is_active() -> bool {
    slot().is_some()
}

/// The current reference count (0 when inactive).
pub fn ref_count() -> usize {
    slot().as_ref().map_or(0, |interp| interp.refs)
}
