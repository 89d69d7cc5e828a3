//! Error taxonomy.
//!
//! Two layers, matching spec.md §7 "Local recovery vs surfaced":
//!
//! - `JsError` is the engine-internal *throw signal*: it always carries a
//!   `JsValue` (usually an `Error` instance built from the current realm's
//!   constructors, but any value can be thrown in JavaScript).
//! - `JsNativeError` is a Rust-side convenience for constructing the common
//!   well-known error kinds without first having a `Context` in hand; it
//!   converts into a `JsError` by realizing an ordinary object with the
//!   right prototype once a realm is available (see `JsNativeError::into_js_error`).
//! - `EngineError` (via `thiserror`) is reserved for host-observable
//!   embedding failures that are not JavaScript exceptions at all: module
//!   loader failures, the depth guard, and execution timeouts. These still
//!   get turned into a thrown `JsValue` at the task boundary (§7
//!   "Propagation"), but are distinguished internally so host code can
//!   branch on `EngineError` without string-matching a message.

use crate::value::JsValue;
use std::fmt;
use thiserror::Error;

pub type JsResult<T> = Result<T, JsError>;

/// The kind of a well-known JavaScript error constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Type,
    Range,
    Reference,
    Syntax,
    Uri,
    Eval,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Type => "TypeError",
            ErrorKind::Range => "RangeError",
            ErrorKind::Reference => "ReferenceError",
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::Uri => "URIError",
            ErrorKind::Eval => "EvalError",
        }
    }
}

/// A Rust-constructed native error, not yet realized as a `JsObject`.
///
/// Built by host code or the evaluator before a concrete error object has
/// been allocated in a realm; `Context::realize` turns it into a `JsError`
/// carrying a proper `Error.prototype`-derived object (§7 "User-visible
/// failure": cross-realm `instanceof` needs the right prototype chain).
#[derive(Debug, Clone)]
pub struct JsNativeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl JsNativeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
    pub fn typ(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, message)
    }
    pub fn range(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Range, message)
    }
    pub fn reference(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Reference, message)
    }
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, message)
    }
    pub fn uri(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Uri, message)
    }
}

impl fmt::Display for JsNativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.name(), self.message)
    }
}

/// The engine-internal throw signal (spec.md "Throw signal" glossary entry).
///
/// Until a realm has realized it into a concrete `Error` object,
/// `JsError::Native` carries the unrealized description; `Context::run_job`
/// and friends realize it just before it would become host-observable, so
/// that `instanceof` and `.stack`-less `.name`/`.message` reads behave
/// whether the throw originated in native code or user script.
#[derive(Debug, Clone)]
pub enum JsError {
    /// A fully general thrown value (`throw 42`, `throw {custom: true}`, or
    /// an already-realized `Error` instance).
    Value(JsValue),
    /// A native error not yet attached to a realm's `Error.prototype` chain.
    Native(JsNativeError),
    /// Internal-only: a generator body suspending at a `yield` point,
    /// threaded up through the ordinary `?` propagation path rather than a
    /// `Completion` variant so it unwinds through `try`/loops/blocks without
    /// every dispatch site needing to know about it. `crate::cps`'s replay
    /// loop is the only intended catch site; it never reaches script. See
    /// DESIGN.md's generator-lowering entry for why a real coroutine/state
    /// machine wasn't used instead.
    Yield(JsValue),
    /// Internal-only: a `.return(v)` sent to a generator while it's
    /// suspended at a `yield`, or a `yield*` delegate completing because its
    /// inner iterator's `.return()` did. Shares `Yield`'s bypass-everything
    /// unwind path up to `crate::cps`'s replay loop, including skipping
    /// `finally` blocks along the way (see `exec::exec_try`).
    Return(JsValue),
}

impl JsError {
    pub fn from_value(value: JsValue) -> Self {
        JsError::Value(value)
    }

    /// Best-effort human-readable message, used by host-facing `Display`
    /// and by tests; does not require a realm.
    pub fn message(&self) -> String {
        match self {
            JsError::Value(v) => v.to_display_string(),
            JsError::Native(n) => n.message.clone(),
            JsError::Yield(_) => "generator yield escaped the replay loop".to_string(),
            JsError::Return(_) => "generator return escaped the replay loop".to_string(),
        }
    }
}

impl fmt::Display for JsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsError::Value(v) => write!(f, "{}", v.to_display_string()),
            JsError::Native(n) => write!(f, "{n}"),
            JsError::Yield(_) => write!(f, "generator yield escaped the replay loop"),
            JsError::Return(_) => write!(f, "generator return escaped the replay loop"),
        }
    }
}

impl JsError {
    /// A thrown value without involving a realm: `Context::run_job` (§7
    /// "Propagation") replaces this with a properly realized `Error`
    /// instance (right `.prototype`, `instanceof` support) before anything
    /// script-observable happens, but a few internal call sites — the
    /// Promise thenable job's synchronous catch, in particular — need *a*
    /// value to pass to `reject` immediately, before a realm round-trip is
    /// possible. This builds a realm-less ordinary object carrying `name`
    /// and `message` own properties, which stringifies sensibly even though
    /// `instanceof Error` would not hold for it.
    pub fn to_opaque_value(&self) -> JsValue {
        match self {
            JsError::Value(v) => v.clone(),
            JsError::Yield(v) => v.clone(),
            JsError::Return(v) => v.clone(),
            JsError::Native(n) => {
                let obj = crate::object::JsObject::ordinary(JsValue::undefined());
                obj.borrow_mut().properties_mut().insert(
                    crate::property::PropertyKey::from_str("name"),
                    crate::property::PropertyDescriptor::data(JsValue::from(n.kind.name()), true, false, true),
                );
                obj.borrow_mut().properties_mut().insert(
                    crate::property::PropertyKey::from_str("message"),
                    crate::property::PropertyDescriptor::data(JsValue::from(n.message.clone()), true, false, true),
                );
                JsValue::Object(obj)
            }
        }
    }
}

impl From<JsNativeError> for JsError {
    fn from(e: JsNativeError) -> Self {
        JsError::Native(e)
    }
}

impl std::error::Error for JsError {}

/// Host-observable failures that are not JavaScript-level exceptions.
///
/// These still unwind through `JsResult` (surfaced as a `JsError::Native`
/// with `ErrorKind::Range`/`Type` as appropriate, per spec.md §7
/// "Host/internal"), but `EngineError` lets embedding code distinguish "your
/// script threw" from "the engine itself gave up" without string-matching.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("maximum call depth ({0}) exceeded")]
    MaxCallDepthExceeded(u32),
    #[error("execution timed out")]
    ExecutionTimeout,
    #[error("module loader failed to resolve {specifier:?}: {reason}")]
    ModuleLoad { specifier: String, reason: String },
}

impl From<EngineError> for JsError {
    fn from(e: EngineError) -> Self {
        match &e {
            EngineError::MaxCallDepthExceeded(_) => JsNativeError::range(e.to_string()).into(),
            EngineError::ExecutionTimeout => JsNativeError::range(e.to_string()).into(),
            EngineError::ModuleLoad { .. } => JsNativeError::typ(e.to_string()).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_error_display() {
        let e = JsNativeError::typ("not a function");
        assert_eq!(e.to_string(), "TypeError: not a function");
    }

    #[test]
    fn engine_error_converts_to_js_error() {
        let e: JsError = EngineError::MaxCallDepthExceeded(1024).into();
        assert!(e.message().contains("1024"));
    }
}
