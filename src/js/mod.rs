//! JavaScript engine facade: the narrow surface the core depends on.
//!
//! Every core module talks to `dyn JsEngine` / the handle types below, never
//! to `boa_engine` directly. [`boa_backend`] is the one concrete
//! implementation shipped so the core is exercisable end-to-end.

#[cfg(feature = "boa")]
pub mod boa_backend;

use std::fmt;

/// A try/catch boundary error, reduced to a printable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsError(pub String);

impl fmt::Display for JsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for JsError {}

/// Opaque identity for a persistent handle into the engine's heap. Two
/// handles compare equal iff they refer to the same underlying object,
/// regardless of how each was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(pub(crate) u64);

/// A persistent handle to a callable JS value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JsFunction(pub(crate) HandleId);

impl JsFunction {
    pub fn is_same(&self, other: &JsFunction) -> bool {
        self.0 == other.0
    }
}

/// A persistent handle to a JS object (used for `{handleEvent}`-style listeners).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JsObject(pub(crate) HandleId);

impl JsObject {
    pub fn is_same(&self, other: &JsObject) -> bool {
        self.0 == other.0
    }
}

/// A value passed across the facade boundary: either a persistent handle or
/// a small primitive the core needs to construct itself (event arguments).
#[derive(Debug, Clone)]
pub enum JsValue {
    Undefined,
    Bool(bool),
    Number(f64),
    String(String),
    Function(JsFunction),
    Object(JsObject),
}

/// How an event listener's callback is represented: a persistent function
/// handle, an object with a `handleEvent` method, or legacy inline source.
#[derive(Debug, Clone)]
pub enum Callback {
    Function(JsFunction),
    Object(JsObject),
    /// Legacy inline attribute handler (e.g. `onclick="doThing()"`), evaluated
    /// fresh on every invocation in a per-call scope.
    Source(String),
}

impl Callback {
    /// Identity used for listener de-duplication; `Source` callbacks compare
    /// by exact string equality (no persistent handle to compare).
    pub fn identity_eq(&self, other: &Callback) -> bool {
        match (self, other) {
            (Callback::Function(a), Callback::Function(b)) => a.is_same(b),
            (Callback::Object(a), Callback::Object(b)) => a.is_same(b),
            (Callback::Source(a), Callback::Source(b)) => a == b,
            _ => false,
        }
    }
}

/// The narrow engine surface consumed by the rest of the core.
pub trait JsEngine {
    /// Runs a classic script. `url` is used only for error messages / stack traces.
    fn eval(&mut self, source: &[u8], url: &str) -> Result<(), JsError>;

    /// Runs a module script. `cacheable` hints that `source` came from a
    /// remote fetch and its compiled form may be cached by url.
    fn eval_module(&mut self, source: &[u8], url: &str, cacheable: bool) -> Result<(), JsError>;

    /// Drains the microtask queue; called after each listener invocation.
    fn run_microtasks(&mut self);

    /// Calls a persistent function handle with the given `this` and arguments.
    fn call_function(
        &mut self,
        func: &JsFunction,
        this: Option<&JsValue>,
        args: &[JsValue],
    ) -> Result<JsValue, JsError>;

    /// Calls `obj.handleEvent(..args)` for an object-shaped listener.
    fn call_handle_event(&mut self, obj: &JsObject, args: &[JsValue]) -> Result<JsValue, JsError>;

    /// Evaluates a legacy inline handler's source with `this`/`event` bound
    /// in a fresh per-call scope.
    fn eval_handler_source(
        &mut self,
        source: &str,
        this: Option<&JsValue>,
        args: &[JsValue],
    ) -> Result<JsValue, JsError>;
}

/// Invokes whichever shape `callback` is, per the listener invocation rules.
pub fn invoke_callback(
    engine: &mut dyn JsEngine,
    callback: &Callback,
    this: &JsValue,
    args: &[JsValue],
) -> Result<JsValue, JsError> {
    let result = match callback {
        Callback::Function(f) => engine.call_function(f, Some(this), args),
        Callback::Object(o) => engine.call_handle_event(o, args),
        Callback::Source(src) => engine.eval_handler_source(src, Some(this), args),
    };
    if result.is_ok() {
        engine.run_microtasks();
    }
    result
}
