//! Error kinds and propagation (§7).
//!
//! `ExcKind` tags the catchable guest-error hierarchy the way
//! `ouros::exception_private::ExcType` tags CPython's exception hierarchy.
//! `RunError` then splits into `Exc` (catchable by guest `try`/`catch`) and
//! `Uncatchable` (`MemoryLimit`/`TimeLimit`) — mirroring
//! `ResourceError::into_exception`'s precedent that recursion breaches are
//! catchable but memory/time breaches are not, even though nothing else in
//! the error hierarchy is special-cased like this.

use std::fmt;

use strum::{Display, EnumString};

use crate::resource::ResourceError;
use crate::value::Value;

/// Tag for the catchable guest-error hierarchy, plus the two uncatchable
/// sandbox-safety kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum ExcKind {
    Syntax,
    Reference,
    Type,
    Range,
    MemoryLimit,
    TimeLimit,
    /// Guest `throw` of an arbitrary value rather than a built-in error kind.
    Thrown,
}

/// A source location attached to an error for `lineNumber`/`columnNumber`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodeLoc {
    pub line: u32,
    pub column: u32,
}

/// An exception in flight inside the VM: a kind tag, a guest-visible value
/// (usually an `Error`-shaped object, but `throw` accepts anything), and an
/// optional source location.
#[derive(Debug, Clone)]
pub struct Exception {
    pub kind: ExcKind,
    pub value: Value,
    pub loc: Option<CodeLoc>,
}

impl Exception {
    #[must_use]
    pub fn new(kind: ExcKind, value: Value) -> Self {
        Self { kind, value, loc: None }
    }

    #[must_use]
    pub fn with_loc(mut self, loc: CodeLoc) -> Self {
        self.loc = Some(loc);
        self
    }
}

/// Result of any fallible VM operation.
#[derive(Debug, Clone)]
pub enum RunError {
    /// Reaches guest `try`/`catch`.
    Exc(Exception),
    /// Unwinds the whole VM; guest `try`/`catch` cannot intercept it.
    Uncatchable(Exception),
}

impl RunError {
    /// A regex literal that failed to compile (`BUILD_REGEX` is the one
    /// place a `Syntax` error is raised at run time rather than caught
    /// during parsing).
    #[must_use]
    pub fn syntax_error(message: impl Into<String>) -> Self {
        RunError::Exc(Exception::new(ExcKind::Syntax, error_object(ExcKind::Syntax, message.into())))
    }

    #[must_use]
    pub fn type_error(message: impl Into<String>) -> Self {
        RunError::Exc(Exception::new(ExcKind::Type, error_object(ExcKind::Type, message.into())))
    }

    #[must_use]
    pub fn reference_error(message: impl Into<String>) -> Self {
        RunError::Exc(Exception::new(ExcKind::Reference, error_object(ExcKind::Reference, message.into())))
    }

    #[must_use]
    pub fn range_error(message: impl Into<String>) -> Self {
        RunError::Exc(Exception::new(ExcKind::Range, error_object(ExcKind::Range, message.into())))
    }

    #[must_use]
    pub fn thrown(value: Value) -> Self {
        RunError::Exc(Exception::new(ExcKind::Thrown, value))
    }

    #[must_use]
    pub fn is_catchable(&self) -> bool {
        matches!(self, RunError::Exc(_))
    }

    #[must_use]
    pub fn exception(&self) -> &Exception {
        match self {
            RunError::Exc(e) | RunError::Uncatchable(e) => e,
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exc = self.exception();
        write!(f, "{}: {}", exc.kind, exc.value.to_js_string())
    }
}

impl std::error::Error for RunError {}

/// `ResourceError -> RunError`: recursion breaches are ordinary catchable
/// `RangeError`s; memory and time breaches are uncatchable sandbox errors.
impl From<ResourceError> for RunError {
    fn from(err: ResourceError) -> Self {
        match err {
            ResourceError::Recursion { limit, depth } => {
                RunError::range_error(format!("Maximum call stack size exceeded ({depth} > {limit})"))
            }
            ResourceError::Time { .. } => {
                RunError::Uncatchable(Exception::new(ExcKind::TimeLimit, error_object(ExcKind::TimeLimit, "Execution timeout".into())))
            }
            ResourceError::Memory { .. } | ResourceError::Allocation { .. } => RunError::Uncatchable(Exception::new(
                ExcKind::MemoryLimit,
                error_object(ExcKind::MemoryLimit, "Memory limit exceeded".into()),
            )),
            ResourceError::Operation { .. } => {
                RunError::Uncatchable(Exception::new(ExcKind::TimeLimit, error_object(ExcKind::TimeLimit, "Operation limit exceeded".into())))
            }
        }
    }
}

/// Builds the ordinary `{name, message}` guest object used for built-in
/// error kinds. Kept free of VM access by using a bare object with no
/// prototype — the host-facing `JSError` conversion reads `name`/`message`
/// back out of it.
fn error_object(kind: ExcKind, message: String) -> Value {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::object::ObjectData;

    let mut obj = ObjectData::new();
    let name = match kind {
        ExcKind::Syntax => "SyntaxError",
        ExcKind::Reference => "ReferenceError",
        ExcKind::Type => "TypeError",
        ExcKind::Range => "RangeError",
        ExcKind::MemoryLimit => "InternalError",
        ExcKind::TimeLimit => "InternalError",
        ExcKind::Thrown => "Error",
    };
    obj.set_data(Rc::from("name"), Value::String(Rc::from(name)));
    obj.set_data(Rc::from("message"), Value::String(Rc::from(message.as_str())));
    Value::Object(Rc::new(RefCell::new(obj)))
}

/// A parse-time failure. Always a `Syntax` kind; never reaches a VM because
/// compilation happens before execution starts (§7).
#[derive(Debug, Clone)]
pub struct CompileError {
    pub message: String,
    pub loc: CodeLoc,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}: {}", self.loc.line, self.loc.column, self.message)
    }
}

impl std::error::Error for CompileError {}

impl CompileError {
    #[must_use]
    pub fn new(message: impl Into<String>, loc: CodeLoc) -> Self {
        Self { message: message.into(), loc }
    }
}

/// Host-visible error surface exposed at the `Context` boundary (§6).
#[derive(Debug, Clone)]
pub enum JSError {
    Syntax { message: String, line: u32, column: u32 },
    Reference { message: String },
    Type { message: String },
    Range { message: String },
    MemoryLimit { message: String },
    TimeLimit { message: String },
    /// An uncaught guest `throw` of a non-Error value escaped to the host.
    Thrown { message: String },
}

impl fmt::Display for JSError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JSError::Syntax { message, line, column } => write!(f, "SyntaxError: line {line}, column {column}: {message}"),
            JSError::Reference { message } => write!(f, "ReferenceError: {message}"),
            JSError::Type { message } => write!(f, "TypeError: {message}"),
            JSError::Range { message } => write!(f, "RangeError: {message}"),
            JSError::MemoryLimit { message } => write!(f, "MemoryLimit: {message}"),
            JSError::TimeLimit { message } => write!(f, "TimeLimit: {message}"),
            JSError::Thrown { message } => write!(f, "Uncaught: {message}"),
        }
    }
}

impl std::error::Error for JSError {}

impl From<CompileError> for JSError {
    fn from(err: CompileError) -> Self {
        JSError::Syntax { message: err.message, line: err.loc.line, column: err.loc.column }
    }
}

impl From<RunError> for JSError {
    fn from(err: RunError) -> Self {
        let exc = err.exception();
        let message = guest_error_message(&exc.value);
        match exc.kind {
            ExcKind::Syntax => JSError::Syntax { message, line: exc.loc.map_or(0, |l| l.line), column: exc.loc.map_or(0, |l| l.column) },
            ExcKind::Reference => JSError::Reference { message },
            ExcKind::Type => JSError::Type { message },
            ExcKind::Range => JSError::Range { message },
            ExcKind::MemoryLimit => JSError::MemoryLimit { message },
            ExcKind::TimeLimit => JSError::TimeLimit { message },
            ExcKind::Thrown => JSError::Thrown { message },
        }
    }
}

fn guest_error_message(value: &Value) -> String {
    if let Value::Object(obj) = value {
        let obj = obj.borrow();
        if let Some(crate::object::PropertySlot::Value(v)) = obj.get_own("message") {
            return v.to_js_string().to_string();
        }
    }
    value.to_js_string().to_string()
}
