//! Line-oriented audit trail of shadow-namespace mutations.
//!
//! One line per affected path, `+ <path>` on creation and ` - <path>` on
//! removal, written to a diagnostic stream for human inspection. Not a
//! structured log; the daemon's tracing output is separate.

use parking_lot::Mutex;
use std::io::{self, Write};

/// Sink for the mutation trail. Defaults to stderr.
///
/// A failed write is deliberately ignored: diagnostics must never change
/// the outcome of the operation being audited.
pub struct AuditLog {
    sink: Mutex<Box<dyn Write + Send>>,
}

impl AuditLog {
    /// Audit to the process's standard diagnostic stream.
    pub fn stderr() -> Self {
        Self::with_sink(Box::new(io::stderr()))
    }

    /// Audit to an arbitrary sink (tests pass a shared buffer).
    pub fn with_sink(sink: Box<dyn Write + Send>) -> Self {
        AuditLog {
            sink: Mutex::new(sink),
        }
    }

    /// Records that an entry now exists at `path`.
    pub fn created(&self, path: &str) {
        let mut sink = self.sink.lock();
        let _ = writeln!(sink, "+ {path}");
    }

    /// Records that the entry at `path` is gone.
    pub fn removed(&self, path: &str) {
        let mut sink = self.sink.lock();
        let _ = writeln!(sink, " - {path}");
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::stderr()
    }
}
