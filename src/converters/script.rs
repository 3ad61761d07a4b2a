//! Custom code execution boundary
//!
//! Converter definitions may carry transformation code for each direction.
//! The code is schema data, so the library never interprets it itself: a
//! hosting application supplies a [`ScriptEngine`], and every run goes through
//! [`run_script`], which executes the engine on a scoped thread with a
//! timeout and a cancellation flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use crate::error::{ConversionError, ConversionErrorKind, Error, Result};
use crate::store::Document;

/// Handles passed to custom code: the input tree and the tree being built
pub struct ScriptContext<'a> {
    source: &'a Document,
    target: &'a mut Document,
    cancel: &'a AtomicBool,
}

impl<'a> ScriptContext<'a> {
    /// Create a context
    pub fn new(source: &'a Document, target: &'a mut Document, cancel: &'a AtomicBool) -> Self {
        Self {
            source,
            target,
            cancel,
        }
    }

    /// The document being converted (read-only)
    pub fn source(&self) -> &Document {
        self.source
    }

    /// The target as populated by the link phase
    pub fn target(&self) -> &Document {
        self.target
    }

    /// Mutable access to the target
    pub fn target_mut(&mut self) -> &mut Document {
        self.target
    }

    /// Whether the caller has given up waiting; engines should stop promptly
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// Executes custom conversion code
pub trait ScriptEngine: Send + Sync {
    /// Run `code` with access to the source and target trees
    fn execute(&self, code: &str, context: &mut ScriptContext<'_>) -> Result<()>;
}

impl<F> ScriptEngine for F
where
    F: Fn(&str, &mut ScriptContext<'_>) -> Result<()> + Send + Sync,
{
    fn execute(&self, code: &str, context: &mut ScriptContext<'_>) -> Result<()> {
        self(code, context)
    }
}

/// Engine used when the host provides none: any custom code is a failure
#[derive(Debug, Clone, Copy, Default)]
pub struct NoScriptEngine;

impl ScriptEngine for NoScriptEngine {
    fn execute(&self, _code: &str, _context: &mut ScriptContext<'_>) -> Result<()> {
        Err(custom_failure("no script engine is configured to run custom code"))
    }
}

fn custom_failure(message: impl Into<String>) -> Error {
    Error::Conversion(ConversionError::new(ConversionErrorKind::CustomCodeFailure, message))
}

/// Run custom code with a timeout
///
/// Waits at most `timeout` for the engine. On expiry the cancellation flag is
/// raised and the run fails; the call still returns only once the engine
/// thread has stopped. A panicking engine is reported as a failure.
pub fn run_script(
    engine: &dyn ScriptEngine,
    code: &str,
    source: &Document,
    target: &mut Document,
    timeout: Duration,
) -> Result<()> {
    let cancel = AtomicBool::new(false);
    let cancel = &cancel;
    let (sender, receiver) = mpsc::channel();

    thread::scope(|scope| {
        let handle = scope.spawn(move || {
            let mut context = ScriptContext::new(source, target, cancel);
            let result = engine.execute(code, &mut context);
            let _ = sender.send(result);
        });

        let received = receiver.recv_timeout(timeout);
        if let Err(RecvTimeoutError::Timeout) = received {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "custom code timed out, cancelling");
            cancel.store(true, Ordering::SeqCst);
        }

        match (handle.join(), received) {
            (Err(_), _) => Err(custom_failure("custom code panicked")),
            (Ok(()), Ok(Ok(()))) => Ok(()),
            (Ok(()), Ok(Err(Error::Conversion(e)))) if e.kind == ConversionErrorKind::CustomCodeFailure => {
                Err(Error::Conversion(e))
            }
            (Ok(()), Ok(Err(e))) => Err(custom_failure(format!("custom code failed: {}", e))),
            (Ok(()), Err(RecvTimeoutError::Timeout)) => Err(custom_failure(format!(
                "custom code did not finish within {} ms",
                timeout.as_millis()
            ))),
            (Ok(()), Err(RecvTimeoutError::Disconnected)) => {
                Err(custom_failure("custom code ended without a result"))
            }
        }
    })
}
