//! Output capture for `console.log` (§6.1, ambient).
//!
//! Grounded on `ouros::io::PrintWriter`; the redirect-stack machinery the
//! teacher carries for `contextlib.redirect_stdout` has no counterpart here
//! (the dialect has no stream redirection) and is dropped.

use std::borrow::Cow;
use std::cell::RefCell;
use std::io::{self, Write as _};

use crate::exception::RunError;

/// Trait for handling output from the `console.log` built-in.
///
/// Implement this to capture or redirect guest output. `StdPrint` writes to
/// stdout; `CollectStringPrint` is the usual choice for tests.
pub trait PrintWriter {
    /// Writes one formatted argument's text (no separators, no trailing
    /// newline — those are emitted via [`PrintWriter::stdout_push`]).
    fn stdout_write(&mut self, output: Cow<'_, str>) -> Result<(), RunError>;

    /// Pushes a single separator or terminator character (a space between
    /// arguments, a newline at the end of the call).
    fn stdout_push(&mut self, end: char) -> Result<(), RunError>;
}

/// Default `PrintWriter`, buffered and flushed on drop so interleaving with
/// stderr stays predictable.
#[derive(Debug, Default)]
pub struct StdPrint {
    buffer: RefCell<String>,
}

impl PrintWriter for StdPrint {
    fn stdout_write(&mut self, output: Cow<'_, str>) -> Result<(), RunError> {
        self.buffer.borrow_mut().push_str(&output);
        Ok(())
    }

    fn stdout_push(&mut self, end: char) -> Result<(), RunError> {
        self.buffer.borrow_mut().push(end);
        Ok(())
    }
}

impl Drop for StdPrint {
    fn drop(&mut self) {
        let mut buffer = self.buffer.borrow_mut();
        if buffer.is_empty() {
            return;
        }
        let _ = io::stdout().write_all(buffer.as_bytes());
        let _ = io::stdout().flush();
        buffer.clear();
    }
}

/// Collects all output into an owned string. Useful for tests and for
/// embeddings that want to surface `console.log` output programmatically.
#[derive(Debug, Default)]
pub struct CollectStringPrint(String);

impl CollectStringPrint {
    #[must_use]
    pub fn new() -> Self {
        Self(String::new())
    }

    #[must_use]
    pub fn output(&self) -> &str {
        self.0.as_str()
    }

    #[must_use]
    pub fn into_output(self) -> String {
        self.0
    }
}

impl PrintWriter for CollectStringPrint {
    fn stdout_write(&mut self, output: Cow<'_, str>) -> Result<(), RunError> {
        self.0.push_str(&output);
        Ok(())
    }

    fn stdout_push(&mut self, end: char) -> Result<(), RunError> {
        self.0.push(end);
        Ok(())
    }
}

/// Discards all output.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn stdout_write(&mut self, _output: Cow<'_, str>) -> Result<(), RunError> {
        Ok(())
    }

    fn stdout_push(&mut self, _end: char) -> Result<(), RunError> {
        Ok(())
    }
}
