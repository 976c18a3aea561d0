//! Script manager: orders execution of inline, external classic,
//! `defer`, `async` and `module` scripts, and drives the page's
//! `DOMContentLoaded` → `load` progression.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::dom::{Dom, NodeId};
use crate::event::{DefaultActionHost, Event, EventManager, Target};
use crate::http::{HttpClient, RequestParams};
use crate::js::{Callback, JsEngine};

/// `Classic` scripts use `JsEngine::eval`; `Module` scripts use `eval_module`
/// and may trigger synchronous dependency fetches via `blocking_get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    Classic,
    Module,
}

enum ScriptSource {
    Inline(String),
    Remote { url: String },
}

/// Shared state a fetch's callbacks write into; polled by [`ScriptManager::poll`].
#[derive(Default)]
struct FetchState {
    status: Option<u16>,
    buffer: Vec<u8>,
    done: bool,
    error: Option<String>,
}

type SharedFetch = Rc<RefCell<FetchState>>;

struct PendingScript {
    kind: ScriptKind,
    element: NodeId,
    source: ScriptSource,
    is_async: bool,
    is_defer: bool,
    onload: Option<Callback>,
    onerror: Option<Callback>,
    complete: bool,
    fetch: Option<SharedFetch>,
}

/// Hook invoked by the script manager as HTML parsing / script execution
/// progresses the document's readiness state.
pub trait PageLifecycleHooks {
    fn document_is_loaded(&mut self, dom: &mut Dom, js: &mut dyn JsEngine, events: &mut EventManager, host: &mut dyn DefaultActionHost);
    fn document_is_complete(&mut self, dom: &mut Dom, js: &mut dyn JsEngine, events: &mut EventManager, host: &mut dyn DefaultActionHost);
}

/// Orders and drives script execution for one page.
pub struct ScriptManager {
    normal: VecDeque<PendingScript>,
    defer: VecDeque<PendingScript>,
    /// In-flight async scripts, keyed by a synthetic id so `poll` can find
    /// whichever ones just completed.
    async_pending: HashMap<u64, PendingScript>,
    /// Async scripts that finished fetching, in completion order.
    async_ready: VecDeque<PendingScript>,
    static_scripts_done: bool,
    evaluating: bool,
    shutdown: bool,
    next_async_id: u64,
    dispatched_dom_content_loaded: bool,
    dispatched_load: bool,
}

impl Default for ScriptManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptManager {
    pub fn new() -> Self {
        Self {
            normal: VecDeque::new(),
            defer: VecDeque::new(),
            async_pending: HashMap::new(),
            async_ready: VecDeque::new(),
            static_scripts_done: false,
            evaluating: false,
            shutdown: false,
            next_async_id: 0,
            dispatched_dom_content_loaded: false,
            dispatched_load: false,
        }
    }

    /// Queues an inline script. If `normal` is empty, it runs synchronously
    /// right away instead of being queued.
    pub fn queue_inline(
        &mut self,
        dom: &mut Dom,
        js: &mut dyn JsEngine,
        events: &mut EventManager,
        host: &mut dyn DefaultActionHost,
        hooks: &mut dyn PageLifecycleHooks,
        element: NodeId,
        kind: ScriptKind,
        source: String,
        onload: Option<Callback>,
        onerror: Option<Callback>,
    ) {
        let script = PendingScript {
            kind,
            element,
            source: ScriptSource::Inline(source),
            is_async: false,
            is_defer: false,
            onload,
            onerror,
            complete: true,
            fetch: None,
        };
        if self.normal.is_empty() {
            self.run_script(dom, js, events, host, script);
        } else {
            self.normal.push_back(script);
        }
        self.evaluate(dom, js, events, host, hooks);
    }

    /// Queues an external classic/module script and starts its HTTP fetch.
    #[allow(clippy::too_many_arguments)]
    pub fn queue_external(
        &mut self,
        http: &mut dyn HttpClient,
        element: NodeId,
        kind: ScriptKind,
        url: String,
        is_async: bool,
        is_defer: bool,
        onload: Option<Callback>,
        onerror: Option<Callback>,
    ) {
        let fetch: SharedFetch = Rc::new(RefCell::new(FetchState::default()));
        let script = PendingScript {
            kind,
            element,
            source: ScriptSource::Remote { url: url.clone() },
            is_async,
            is_defer,
            onload,
            onerror,
            complete: false,
            fetch: Some(fetch.clone()),
        };

        if is_async {
            let id = self.next_async_id;
            self.next_async_id += 1;
            self.async_pending.insert(id, script);
        } else if is_defer {
            self.defer.push_back(script);
        } else {
            self.normal.push_back(script);
        }

        start_fetch(http, &url, fetch, false);
    }

    pub fn mark_static_scripts_done(
        &mut self,
        dom: &mut Dom,
        js: &mut dyn JsEngine,
        events: &mut EventManager,
        host: &mut dyn DefaultActionHost,
        hooks: &mut dyn PageLifecycleHooks,
    ) {
        self.static_scripts_done = true;
        self.evaluate(dom, js, events, host, hooks);
    }

    /// Called after each `HttpClient::tick` to promote completed fetches
    /// into their queues and re-run `evaluate`.
    pub fn poll(
        &mut self,
        dom: &mut Dom,
        js: &mut dyn JsEngine,
        events: &mut EventManager,
        host: &mut dyn DefaultActionHost,
        hooks: &mut dyn PageLifecycleHooks,
    ) {
        if let Some(failed) = Self::resolve_head_fetch(&mut self.normal) {
            Self::fail_script(dom, js, events, host, failed);
        }
        if let Some(failed) = Self::resolve_head_fetch(&mut self.defer) {
            Self::fail_script(dom, js, events, host, failed);
        }

        let completed_async: Vec<u64> = self
            .async_pending
            .iter()
            .filter(|(_, s)| s.fetch.as_ref().is_some_and(|f| f.borrow().done || f.borrow().error.is_some()))
            .map(|(id, _)| *id)
            .collect();
        for id in completed_async {
            if let Some(mut script) = self.async_pending.remove(&id) {
                if let Some(fetch) = script.fetch.take() {
                    if fetch.borrow().error.is_none() {
                        script.complete = true;
                    }
                }
                self.async_ready.push_back(script);
            }
        }

        self.evaluate(dom, js, events, host, hooks);
    }

    /// If the queue's head has a resolved fetch, marks it complete and
    /// returns `None`, or, on a `NetworkError`, removes it from the queue and
    /// returns it so the caller can fire its `onerror` and an "error" event
    /// (document completion still progresses past the dropped script).
    fn resolve_head_fetch(queue: &mut VecDeque<PendingScript>) -> Option<PendingScript> {
        let resolved = matches!(queue.front(), Some(s) if s.fetch.as_ref().is_some_and(|f| f.borrow().done || f.borrow().error.is_some()));
        if !resolved {
            return None;
        }
        let mut script = queue.pop_front().expect("resolved implies a front element");
        if let Some(fetch) = script.fetch.take() {
            if let Some(err) = &fetch.borrow().error {
                log::warn!("external script fetch failed: {err}");
                return Some(script);
            }
            script.complete = true;
        }
        queue.push_front(script);
        None
    }

    /// Fires a dropped script's `onerror` callback (if any) and dispatches an
    /// "error" event at its element, for a fetch that failed with a
    /// `NetworkError` (including a non-200 response).
    fn fail_script(dom: &mut Dom, js: &mut dyn JsEngine, events: &mut EventManager, host: &mut dyn DefaultActionHost, script: PendingScript) {
        let PendingScript { element, onerror, .. } = script;
        if let Some(cb) = onerror {
            let this_value = crate::js::JsValue::Undefined;
            if let Err(e) = crate::js::invoke_callback(js, &cb, &this_value, &[]) {
                log::error!("onerror handler for failed fetch threw: {e}");
            }
        }
        let mut error_event = Event::new("error", false, false, false);
        events.dispatch(dom, js, host, Target::Node(element), &mut error_event);
    }

    /// Re-entrancy guarded drain: while `normal`'s head is
    /// complete, evaluate it; once drained (and parsing is done), drain
    /// `defer`, fire `DOMContentLoaded`, then drain completed `async`
    /// scripts as they arrive and fire `load` once everything is quiet.
    fn evaluate(
        &mut self,
        dom: &mut Dom,
        js: &mut dyn JsEngine,
        events: &mut EventManager,
        host: &mut dyn DefaultActionHost,
        hooks: &mut dyn PageLifecycleHooks,
    ) {
        if self.evaluating || self.shutdown {
            return;
        }
        self.evaluating = true;

        while matches!(self.normal.front(), Some(s) if s.complete) {
            let script = self.normal.pop_front().expect("front checked Some above");
            self.run_script(dom, js, events, host, script);
        }

        if self.static_scripts_done && self.normal.is_empty() {
            while matches!(self.defer.front(), Some(s) if s.complete) {
                let script = self.defer.pop_front().expect("front checked Some above");
                self.run_script(dom, js, events, host, script);
            }

            if self.defer.is_empty() && !self.dispatched_dom_content_loaded {
                self.dispatched_dom_content_loaded = true;
                hooks.document_is_loaded(dom, js, events, host);
            }
        }

        while let Some(script) = self.async_ready.pop_front() {
            if script.complete {
                self.run_script(dom, js, events, host, script);
            } else {
                Self::fail_script(dom, js, events, host, script);
            }
        }

        let quiet = self.static_scripts_done
            && self.normal.is_empty()
            && self.defer.is_empty()
            && self.async_pending.is_empty()
            && self.async_ready.is_empty();
        if quiet && !self.dispatched_load {
            self.dispatched_load = true;
            hooks.document_is_complete(dom, js, events, host);
        }

        self.evaluating = false;
    }

    fn run_script(&mut self, dom: &mut Dom, js: &mut dyn JsEngine, events: &mut EventManager, host: &mut dyn DefaultActionHost, script: PendingScript) {
        let PendingScript {
            kind,
            element,
            source,
            onload,
            onerror,
            fetch,
            ..
        } = script;

        let (code, url): (Vec<u8>, String) = match source {
            ScriptSource::Inline(text) => (text.into_bytes(), "inline".to_string()),
            ScriptSource::Remote { url } => {
                let buffer = fetch.map(|f| f.borrow().buffer.clone()).unwrap_or_default();
                (buffer, url)
            }
        };

        let result = match kind {
            ScriptKind::Classic => js.eval(&code, &url),
            ScriptKind::Module => js.eval_module(&code, &url, true),
        };

        match result {
            Ok(()) => {
                if let Some(cb) = onload {
                    let this_value = crate::js::JsValue::String(url.clone());
                    if let Err(e) = crate::js::invoke_callback(js, &cb, &this_value, &[]) {
                        log::error!("onload handler for {url} threw: {e}");
                    }
                }
                let mut load_event = Event::new("load", false, false, false);
                events.dispatch_applying_ignore(dom, js, host, Target::Node(element), &mut load_event);
            }
            Err(e) => {
                log::error!("script {url} failed: {e}");
                if let Some(cb) = onerror {
                    let this_value = crate::js::JsValue::String(url.clone());
                    if let Err(e2) = crate::js::invoke_callback(js, &cb, &this_value, &[]) {
                        log::error!("onerror handler for {url} threw: {e2}");
                    }
                }
                let mut error_event = Event::new("error", false, false, false);
                events.dispatch(dom, js, host, Target::Node(element), &mut error_event);
            }
        }
    }

    /// Fetches `url` synchronously via a reserved handle, spin-ticking the
    /// HTTP client every `spin_ms` until it resolves. Exposed for a `JsEngine`
    /// backend's module loader to call back into when a module `import`
    /// specifier needs a dependency fetched; the `JsEngine` trait itself has
    /// no knowledge of `HttpClient`, so a backend must hold its own reference
    /// to reach this. `BoaJsEngine` does not register a module loader and so
    /// never calls this path in production; it is exercised directly below.
    pub fn blocking_get(http: &mut dyn HttpClient, url: &str, spin_ms: u64) -> Result<Vec<u8>, String> {
        let fetch: SharedFetch = Rc::new(RefCell::new(FetchState::default()));
        start_fetch(http, url, fetch.clone(), true);

        loop {
            {
                let state = fetch.borrow();
                if let Some(err) = &state.error {
                    return Err(err.clone());
                }
                if state.done {
                    return Ok(state.buffer.clone());
                }
            }
            http.tick(spin_ms);
        }
    }

    /// True once static scripts are marked done and every queue has drained
    /// — i.e. `document_is_complete` has fired and nothing is in flight.
    pub fn is_quiescent(&self) -> bool {
        self.dispatched_load
            && self.normal.is_empty()
            && self.defer.is_empty()
            && self.async_pending.is_empty()
            && self.async_ready.is_empty()
    }

    pub fn reset(&mut self) {
        self.normal.clear();
        self.defer.clear();
        self.async_pending.clear();
        self.async_ready.clear();
    }

    pub fn shutdown(&mut self) {
        self.shutdown = true;
        self.reset();
    }
}

fn start_fetch(http: &mut dyn HttpClient, url: &str, fetch: SharedFetch, reserved: bool) {
    let header_fetch = fetch.clone();
    let data_fetch = fetch.clone();
    let done_fetch = fetch.clone();
    let error_fetch = fetch.clone();

    let params = RequestParams::get(url).callbacks(
        None,
        Box::new(move |status, _headers| {
            header_fetch.borrow_mut().status = Some(status);
            if status != 200 {
                header_fetch.borrow_mut().error = Some(format!("non-200 status: {status}"));
                return false;
            }
            true
        }),
        Box::new(move |chunk| data_fetch.borrow_mut().buffer.extend_from_slice(chunk)),
        Box::new(move || done_fetch.borrow_mut().done = true),
        Box::new(move |err| error_fetch.borrow_mut().error = Some(err)),
    );

    if reserved {
        http.blocking_request(params);
    } else {
        http.request(params);
    }
}

/// Classifies a `<script>` element's `type` attribute.
pub enum ScriptTypeDecision {
    Classic,
    Module,
    Ignored,
    Unrecognized,
}

pub fn classify_script_type(type_attr: Option<&str>) -> ScriptTypeDecision {
    match type_attr.map(str::trim).filter(|s| !s.is_empty()) {
        None => ScriptTypeDecision::Classic,
        Some(t) => match t.to_ascii_lowercase().as_str() {
            "application/javascript" | "text/javascript" => ScriptTypeDecision::Classic,
            "module" => ScriptTypeDecision::Module,
            "application/json" => ScriptTypeDecision::Ignored,
            _ => ScriptTypeDecision::Unrecognized,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{DefaultActionHost, EventManager};
    use crate::http::reqwest_backend::ReqwestHttpClient;
    use crate::js::{HandleId, JsError, JsFunction, JsObject, JsValue};

    struct NullHost;
    impl DefaultActionHost for NullHost {
        fn handle_click(&mut self, _dom: &mut Dom, _js: &mut dyn JsEngine, _target: NodeId) {}
        fn handle_keydown(&mut self, _dom: &mut Dom, _js: &mut dyn JsEngine, _target: NodeId, _event: &Event) {}
    }

    struct NullEngine {
        evals: Vec<String>,
        onerror_calls: u32,
    }
    impl JsEngine for NullEngine {
        fn eval(&mut self, _source: &[u8], url: &str) -> Result<(), JsError> {
            self.evals.push(url.to_string());
            Ok(())
        }
        fn eval_module(&mut self, _source: &[u8], url: &str, _cacheable: bool) -> Result<(), JsError> {
            self.evals.push(url.to_string());
            Ok(())
        }
        fn run_microtasks(&mut self) {}
        fn call_function(&mut self, _f: &JsFunction, _this: Option<&JsValue>, _args: &[JsValue]) -> Result<JsValue, JsError> {
            self.onerror_calls += 1;
            Ok(JsValue::Undefined)
        }
        fn call_handle_event(&mut self, _o: &JsObject, _args: &[JsValue]) -> Result<JsValue, JsError> {
            Ok(JsValue::Undefined)
        }
        fn eval_handler_source(&mut self, _s: &str, _this: Option<&JsValue>, _args: &[JsValue]) -> Result<JsValue, JsError> {
            Ok(JsValue::Undefined)
        }
    }

    struct RecordingHooks {
        loaded: bool,
        complete: bool,
    }
    impl PageLifecycleHooks for RecordingHooks {
        fn document_is_loaded(&mut self, _dom: &mut Dom, _js: &mut dyn JsEngine, _events: &mut EventManager, _host: &mut dyn DefaultActionHost) {
            self.loaded = true;
        }
        fn document_is_complete(&mut self, _dom: &mut Dom, _js: &mut dyn JsEngine, _events: &mut EventManager, _host: &mut dyn DefaultActionHost) {
            self.complete = true;
        }
    }

    #[test]
    fn classify_script_type_handles_known_and_unknown_values() {
        assert!(matches!(classify_script_type(None), ScriptTypeDecision::Classic));
        assert!(matches!(classify_script_type(Some("text/javascript")), ScriptTypeDecision::Classic));
        assert!(matches!(classify_script_type(Some("module")), ScriptTypeDecision::Module));
        assert!(matches!(classify_script_type(Some("application/json")), ScriptTypeDecision::Ignored));
        assert!(matches!(classify_script_type(Some("text/plain")), ScriptTypeDecision::Unrecognized));
    }

    #[test]
    fn inline_scripts_run_in_order_and_reach_dom_content_loaded() {
        let mut dom = Dom::new();
        let doc = dom.create_document();
        let el1 = dom.create_element("script");
        let el2 = dom.create_element("script");
        dom.append_child(doc, el1);
        dom.append_child(doc, el2);

        let mut mgr = ScriptManager::new();
        let mut engine = NullEngine { evals: Vec::new(), onerror_calls: 0 };
        let mut events = EventManager::new(128);
        let mut host = NullHost;
        let mut hooks = RecordingHooks { loaded: false, complete: false };

        mgr.queue_inline(&mut dom, &mut engine, &mut events, &mut host, &mut hooks, el1, ScriptKind::Classic, "1".into(), None, None);
        mgr.queue_inline(&mut dom, &mut engine, &mut events, &mut host, &mut hooks, el2, ScriptKind::Classic, "2".into(), None, None);
        mgr.mark_static_scripts_done(&mut dom, &mut engine, &mut events, &mut host, &mut hooks);

        assert_eq!(engine.evals, vec!["inline", "inline"]);
        assert!(hooks.loaded);
        assert!(hooks.complete);
    }

    #[test]
    fn head_of_queue_fetch_error_fires_onerror_and_still_reaches_complete() {
        let mut dom = Dom::new();
        let doc = dom.create_document();
        let el = dom.create_element("script");
        dom.append_child(doc, el);

        let mut mgr = ScriptManager::new();
        let fetch: SharedFetch = Rc::new(RefCell::new(FetchState {
            error: Some("non-200 status: 404".to_string()),
            ..Default::default()
        }));
        mgr.normal.push_back(PendingScript {
            kind: ScriptKind::Classic,
            element: el,
            source: ScriptSource::Remote { url: "http://example.test/a.js".to_string() },
            is_async: false,
            is_defer: false,
            onload: None,
            onerror: Some(Callback::Function(JsFunction(HandleId(1)))),
            complete: false,
            fetch: Some(fetch),
        });

        let mut engine = NullEngine { evals: Vec::new(), onerror_calls: 0 };
        let mut events = EventManager::new(128);
        let mut host = NullHost;
        let mut hooks = RecordingHooks { loaded: false, complete: false };

        mgr.mark_static_scripts_done(&mut dom, &mut engine, &mut events, &mut host, &mut hooks);

        assert_eq!(engine.onerror_calls, 1);
        assert!(engine.evals.is_empty(), "errored script must not be evaluated");
        assert!(hooks.loaded);
        assert!(hooks.complete);
    }

    #[test]
    fn async_fetch_error_fires_onerror_and_still_reaches_complete() {
        let mut dom = Dom::new();
        let doc = dom.create_document();
        let el = dom.create_element("script");
        dom.append_child(doc, el);

        let mut mgr = ScriptManager::new();
        mgr.static_scripts_done = true;
        let fetch: SharedFetch = Rc::new(RefCell::new(FetchState {
            error: Some("connection reset".to_string()),
            ..Default::default()
        }));
        mgr.async_pending.insert(
            0,
            PendingScript {
                kind: ScriptKind::Classic,
                element: el,
                source: ScriptSource::Remote { url: "http://example.test/b.js".to_string() },
                is_async: true,
                is_defer: false,
                onload: None,
                onerror: Some(Callback::Function(JsFunction(HandleId(1)))),
                complete: false,
                fetch: Some(fetch),
            },
        );

        let mut engine = NullEngine { evals: Vec::new(), onerror_calls: 0 };
        let mut events = EventManager::new(128);
        let mut host = NullHost;
        let mut hooks = RecordingHooks { loaded: false, complete: false };

        mgr.poll(&mut dom, &mut engine, &mut events, &mut host, &mut hooks);

        assert_eq!(engine.onerror_calls, 1);
        assert!(engine.evals.is_empty(), "errored script must not be evaluated");
        assert!(hooks.complete);
    }

    #[test]
    fn blocking_get_resolves_against_local_fixture_server() {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("bind fixture server");
        let addr = server.server_addr();
        let url = format!("http://{addr}/module.js");

        std::thread::spawn(move || {
            if let Ok(req) = server.recv() {
                let _ = req.respond(tiny_http::Response::from_string("export const x = 1;"));
            }
        });

        let mut http = ReqwestHttpClient::new("test-agent").expect("client init");
        let body = ScriptManager::blocking_get(&mut http, &url, 20).expect("fetch ok");
        assert_eq!(String::from_utf8(body).unwrap(), "export const x = 1;");
    }
}
