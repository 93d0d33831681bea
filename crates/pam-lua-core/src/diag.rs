//! Diagnostic reporting.
//!
//! PAM modules have exactly one useful output channel besides their return
//! code: the system log.  The [`Reporter`] funnels every emission shape
//! (plain message, best-effort failure line, full traceback) through a
//! [`LogSink`] so the real module can write syslog while tests capture lines
//! in memory.  Multi-line tracebacks are split so each line lands as its own
//! log entry.

use crate::error;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

/// Destination for diagnostic lines.  One call per log line.
pub trait LogSink: Send + Sync {
    fn emit(&self, tag: &str, line: &str);
}

/// Captures emitted lines; the sink used by the test harness.
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<String> {
        crate::lock(&self.lines).clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        crate::lock(&self.lines).iter().any(|l| l.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn emit(&self, tag: &str, line: &str) {
        crate::lock(&self.lines).push(format!("{tag}: {line}"));
    }
}

/// Stateless front end over a sink, tagged with the module path (or the
/// module's own name before a path has been resolved).
#[derive(Clone)]
pub struct Reporter {
    tag: String,
    sink: Arc<dyn LogSink>,
}

impl Reporter {
    pub fn new(tag: impl Into<String>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            tag: tag.into(),
            sink,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Emit a single formatted message.
    pub fn message(&self, text: &str) {
        self.sink.emit(&self.tag, text);
    }

    /// Best-effort one-line report of an error, usable before a handle
    /// adapter exists.  Returns the derived status code.
    pub fn failure(&self, context: Option<&str>, err: &mlua::Error) -> i32 {
        let summary = err.to_string();
        let first_line = summary.lines().next().unwrap_or("unknown error");
        match context {
            Some(context) => self.message(&format!("{context} - {first_line}")),
            None => self.message(first_line),
        }
        error::status_for(err)
    }

    /// Full report: the error chain plus the script traceback, one log entry
    /// per line.  Returns the derived status code.
    pub fn traceback(&self, err: &mlua::Error) -> i32 {
        let mut rendered = String::new();
        render_chain(err, &mut rendered);
        for line in rendered.lines().filter(|l| !l.trim().is_empty()) {
            self.message(line);
        }
        error::status_for(err)
    }
}

fn render_chain(err: &mlua::Error, out: &mut String) {
    match err {
        mlua::Error::CallbackError { traceback, cause } => {
            render_chain(cause, out);
            let _ = write!(out, "\n{traceback}");
        }
        mlua::Error::WithContext { context, cause } => {
            render_chain(cause, out);
            let _ = write!(out, "\n{context}");
        }
        other => {
            let _ = write!(out, "{other}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts;
    use std::sync::Arc;

    #[test]
    fn message_lines_carry_the_tag() {
        let sink = MemorySink::new();
        let reporter = Reporter::new("/lib/security/test.lua", sink.clone());
        reporter.message("something went sideways");
        assert_eq!(
            sink.lines(),
            vec!["/lib/security/test.lua: something went sideways".to_owned()]
        );
    }

    #[test]
    fn failure_emits_one_line_and_maps_status() {
        let sink = MemorySink::new();
        let reporter = Reporter::new("mod", sink.clone());
        let err = mlua::Error::RuntimeError("first line\nsecond line".to_owned());
        let status = reporter.failure(Some("loading"), &err);
        assert_eq!(status, consts::PAM_SERVICE_ERR);
        assert_eq!(sink.lines().len(), 1);
        assert!(sink.contains("loading - first line"));
        assert!(!sink.contains("second line"));
    }

    #[test]
    fn traceback_splits_lines_into_discrete_entries() {
        let sink = MemorySink::new();
        let reporter = Reporter::new("mod", sink.clone());
        let cause = mlua::Error::RuntimeError("bad credentials".to_owned());
        let err = mlua::Error::CallbackError {
            traceback: "stack traceback:\n\t[C]: in ?".to_owned(),
            cause: Arc::new(cause),
        };
        let status = reporter.traceback(&err);
        assert_eq!(status, consts::PAM_SERVICE_ERR);
        let lines = sink.lines();
        assert!(lines.len() >= 3, "expected one entry per line: {lines:?}");
        assert!(sink.contains("bad credentials"));
        assert!(sink.contains("stack traceback:"));
    }

    #[test]
    fn traceback_of_memory_error_returns_buf_err() {
        let sink = MemorySink::new();
        let reporter = Reporter::new("mod", sink);
        let err = mlua::Error::MemoryError("oom".to_owned());
        assert_eq!(reporter.traceback(&err), consts::PAM_BUF_ERR);
    }
}
