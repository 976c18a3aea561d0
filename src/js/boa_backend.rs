//! `boa_engine`-backed [`JsEngine`] implementation.
//!
//! A single `Context`, `Source::from_bytes` for classic scripts, `js_string!`
//! for interned globals. Runs on the caller's thread rather than a throwaway
//! worker thread, since the core drives the engine cooperatively rather than
//! waiting on a timeout.
//!
//! Module evaluation uses `boa_engine`'s default module loader, so bare and
//! relative `import` specifiers that require a network fetch are not
//! resolved by this backend; `crate::script::ScriptManager::blocking_get`
//! exists for a backend that registers its own loader to call into.

use std::collections::HashMap;

use boa_engine::{Context, JsResult, JsValue as BoaValue, Module, Source};

use super::{Callback, HandleId, JsEngine, JsError, JsFunction, JsObject, JsValue};

/// Backs persistent [`JsFunction`]/[`JsObject`] handles with the underlying
/// `boa_engine` value they were minted from.
pub struct BoaJsEngine {
    ctx: Context,
    handles: HashMap<HandleId, BoaValue>,
    next_handle: u64,
    /// Compiled modules keyed by url, reused when `cacheable` is set.
    module_cache: HashMap<String, Module>,
}

impl BoaJsEngine {
    pub fn new() -> Self {
        Self {
            ctx: Context::default(),
            handles: HashMap::new(),
            next_handle: 0,
            module_cache: HashMap::new(),
        }
    }

    fn mint_handle(&mut self, value: BoaValue) -> HandleId {
        let id = HandleId(self.next_handle);
        self.next_handle += 1;
        self.handles.insert(id, value);
        id
    }

    /// Wraps a raw `boa_engine` evaluation result into a persistent [`JsValue`],
    /// minting a handle for functions/objects so later calls can reference them.
    fn wrap(&mut self, value: BoaValue) -> JsValue {
        if let Some(obj) = value.as_object() {
            if obj.is_callable() {
                let id = self.mint_handle(value);
                return JsValue::Function(JsFunction(id));
            }
            let id = self.mint_handle(value);
            return JsValue::Object(JsObject(id));
        }
        if value.is_undefined() {
            return JsValue::Undefined;
        }
        if let Some(b) = value.as_boolean() {
            return JsValue::Bool(b);
        }
        if let Some(n) = value.as_number() {
            return JsValue::Number(n);
        }
        JsValue::String(value.display().to_string())
    }

    fn to_boa(&self, value: &JsValue) -> BoaValue {
        match value {
            JsValue::Undefined => BoaValue::undefined(),
            JsValue::Bool(b) => BoaValue::from(*b),
            JsValue::Number(n) => BoaValue::from(*n),
            JsValue::String(s) => BoaValue::from(boa_engine::js_string!(s.as_str())),
            JsValue::Function(JsFunction(id)) | JsValue::Object(JsObject(id)) => self
                .handles
                .get(id)
                .cloned()
                .unwrap_or_else(BoaValue::undefined),
        }
    }

    fn run_source(&mut self, source: &[u8], url: &str) -> JsResult<BoaValue> {
        log::debug!("evaluating classic script from {url}");
        self.ctx.eval(Source::from_bytes(source))
    }
}

impl Default for BoaJsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl JsEngine for BoaJsEngine {
    fn eval(&mut self, source: &[u8], url: &str) -> Result<(), JsError> {
        self.run_source(source, url)
            .map(|_| ())
            .map_err(|e| JsError(format!("{url}: {e}")))
    }

    fn eval_module(&mut self, source: &[u8], url: &str, cacheable: bool) -> Result<(), JsError> {
        log::debug!("evaluating module from {url} (cacheable={cacheable})");

        let module = if cacheable {
            if let Some(m) = self.module_cache.get(url) {
                m.clone()
            } else {
                let m = Module::parse(Source::from_bytes(source), None, &mut self.ctx)
                    .map_err(|e| JsError(format!("{url}: {e}")))?;
                self.module_cache.insert(url.to_string(), m.clone());
                m
            }
        } else {
            Module::parse(Source::from_bytes(source), None, &mut self.ctx)
                .map_err(|e| JsError(format!("{url}: {e}")))?
        };

        module
            .load_link_evaluate(&mut self.ctx)
            .await_blocking(&mut self.ctx)
            .map_err(|e| JsError(format!("{url}: {e}")))?;
        Ok(())
    }

    fn run_microtasks(&mut self) {
        self.ctx.run_jobs();
    }

    fn call_function(
        &mut self,
        func: &JsFunction,
        this: Option<&JsValue>,
        args: &[JsValue],
    ) -> Result<JsValue, JsError> {
        let callee = self
            .handles
            .get(&func.0)
            .cloned()
            .ok_or_else(|| JsError("stale function handle".to_string()))?;
        let obj = callee
            .as_object()
            .filter(|o| o.is_callable())
            .ok_or_else(|| JsError("handle is not callable".to_string()))?
            .clone();

        let this_val = this.map(|v| self.to_boa(v)).unwrap_or_else(BoaValue::undefined);
        let boa_args: Vec<BoaValue> = args.iter().map(|a| self.to_boa(a)).collect();

        let result = obj
            .call(&this_val, &boa_args, &mut self.ctx)
            .map_err(|e| JsError(e.to_string()))?;
        Ok(self.wrap(result))
    }

    fn call_handle_event(&mut self, obj: &JsObject, args: &[JsValue]) -> Result<JsValue, JsError> {
        let receiver = self
            .handles
            .get(&obj.0)
            .cloned()
            .ok_or_else(|| JsError("stale object handle".to_string()))?;
        let boa_args: Vec<BoaValue> = args.iter().map(|a| self.to_boa(a)).collect();

        let handle_event = receiver
            .get_v(boa_engine::js_string!("handleEvent"), &mut self.ctx)
            .map_err(|e| JsError(e.to_string()))?;
        let method = handle_event
            .as_object()
            .filter(|o| o.is_callable())
            .ok_or_else(|| JsError("listener object has no callable handleEvent".to_string()))?
            .clone();

        let result = method
            .call(&receiver, &boa_args, &mut self.ctx)
            .map_err(|e| JsError(e.to_string()))?;
        Ok(self.wrap(result))
    }

    fn eval_handler_source(
        &mut self,
        source: &str,
        this: Option<&JsValue>,
        args: &[JsValue],
    ) -> Result<JsValue, JsError> {
        // Legacy attribute handlers run in a fresh function scope with
        // `event` bound as the first argument, matching inline `onclick="..."`.
        let wrapped = format!("(function(event) {{ {source} }})");
        let func_val = self
            .ctx
            .eval(Source::from_bytes(wrapped.as_bytes()))
            .map_err(|e| JsError(e.to_string()))?;
        let func = func_val
            .as_object()
            .filter(|o| o.is_callable())
            .ok_or_else(|| JsError("inline handler did not compile to a function".to_string()))?
            .clone();

        let this_val = this.map(|v| self.to_boa(v)).unwrap_or_else(BoaValue::undefined);
        let boa_args: Vec<BoaValue> = args.iter().map(|a| self.to_boa(a)).collect();
        let result = func
            .call(&this_val, &boa_args, &mut self.ctx)
            .map_err(|e| JsError(e.to_string()))?;
        Ok(self.wrap(result))
    }
}

/// Convenience used by the script manager to build a [`Callback`] from a
/// freshly-evaluated `onload`/`onerror` attribute value.
pub fn callback_from_source(source: impl Into<String>) -> Callback {
    Callback::Source(source.into())
}
