//! Page lifecycle: a page owns the event manager, scheduler,
//! script manager, DOM arena and the JS/HTTP façade backends for one
//! navigation's lifetime.

use crate::config::EngineConfig;
use crate::dom::{Dom, NodeId};
use crate::error::Result;
use crate::event::{DefaultActionHost, Event, EventManager, Target};
use crate::factory::Factory;
use crate::http::reqwest_backend::ReqwestHttpClient;
use crate::http::HttpClient;
use crate::js::{Callback, JsEngine};
use crate::scheduler::{Priority, Scheduler, TaskOutcome};
use crate::script::{PageLifecycleHooks, ScriptKind, ScriptManager};

/// Result of one `Page::wait` pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// No pending timers, network I/O, or scripts; the page is idle.
    Done,
    /// Work remains; call `wait` again.
    Pending,
}

/// Stateless default-action delegate; logs rather than performing a real
/// navigation/form-submit, since those live outside this core's scope.
struct PageActionHost;

impl DefaultActionHost for PageActionHost {
    fn handle_click(&mut self, dom: &mut Dom, _js: &mut dyn JsEngine, target: NodeId) {
        log::debug!("default click action on {:?} ({:?})", target, dom.tag_name(target));
    }

    fn handle_keydown(&mut self, _dom: &mut Dom, _js: &mut dyn JsEngine, target: NodeId, event: &Event) {
        log::debug!("default keydown action on {target:?}: type={}", event.type_name);
    }
}

/// Dispatches `DOMContentLoaded`/`load` as the script manager reports
/// readiness milestones.
struct PageHooks {
    document: NodeId,
}

impl PageLifecycleHooks for PageHooks {
    fn document_is_loaded(&mut self, dom: &mut Dom, js: &mut dyn JsEngine, events: &mut EventManager, host: &mut dyn DefaultActionHost) {
        log::debug!("DOMContentLoaded");
        let mut event = Event::new("DOMContentLoaded", false, false, false);
        events.dispatch(dom, js, host, Target::Node(self.document), &mut event);
    }

    fn document_is_complete(&mut self, dom: &mut Dom, js: &mut dyn JsEngine, events: &mut EventManager, host: &mut dyn DefaultActionHost) {
        log::debug!("load");
        let mut event = Event::new("load", false, false, false);
        events.dispatch(dom, js, host, Target::Window, &mut event);
    }
}

#[cfg(feature = "boa")]
fn make_js_engine() -> Box<dyn JsEngine> {
    Box::new(crate::js::boa_backend::BoaJsEngine::new())
}

/// A single page: DOM, scripts, timers and the JS/HTTP backends.
pub struct Page {
    id: u64,
    url: String,
    dom: Dom,
    document: NodeId,
    events: EventManager,
    scheduler: Scheduler<()>,
    scripts: ScriptManager,
    factory: Factory,
    js: Box<dyn JsEngine>,
    http: Box<dyn HttpClient>,
    action_host: PageActionHost,
    hooks: PageHooks,
    config: EngineConfig,
}

impl Page {
    pub fn new(id: u64, url: impl Into<String>, config: EngineConfig) -> Result<Self> {
        let mut dom = Dom::new();
        let document = dom.create_document();
        let http = ReqwestHttpClient::new(&config.user_agent)?;

        Ok(Self {
            id,
            url: url.into(),
            dom,
            document,
            events: EventManager::new(config.max_propagation_path),
            scheduler: Scheduler::new(),
            scripts: ScriptManager::new(),
            factory: Factory::new(),
            js: make_js_engine(),
            http: Box::new(http),
            action_host: PageActionHost,
            hooks: PageHooks { document },
            config,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn document(&self) -> NodeId {
        self.document
    }

    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    pub fn dom_mut(&mut self) -> &mut Dom {
        &mut self.dom
    }

    pub fn factory(&self) -> &Factory {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut Factory {
        &mut self.factory
    }

    /// Dispatches an arbitrary event at `target`, returning it for inspection.
    pub fn dispatch(&mut self, target: Target, mut event: Event) -> Event {
        self.events
            .dispatch(&mut self.dom, &mut *self.js, &mut self.action_host, target, &mut event);
        event
    }

    #[allow(clippy::too_many_arguments)]
    pub fn queue_inline_script(
        &mut self,
        element: NodeId,
        kind: ScriptKind,
        source: String,
        onload: Option<Callback>,
        onerror: Option<Callback>,
    ) {
        self.scripts.queue_inline(
            &mut self.dom,
            &mut *self.js,
            &mut self.events,
            &mut self.action_host,
            &mut self.hooks,
            element,
            kind,
            source,
            onload,
            onerror,
        );
    }

    #[allow(clippy::too_many_arguments)]
    pub fn queue_external_script(
        &mut self,
        element: NodeId,
        kind: ScriptKind,
        url: String,
        is_async: bool,
        is_defer: bool,
        onload: Option<Callback>,
        onerror: Option<Callback>,
    ) {
        self.scripts
            .queue_external(&mut *self.http, element, kind, url, is_async, is_defer, onload, onerror);
    }

    pub fn mark_static_scripts_done(&mut self) {
        self.scripts.mark_static_scripts_done(
            &mut self.dom,
            &mut *self.js,
            &mut self.events,
            &mut self.action_host,
            &mut self.hooks,
        );
    }

    /// Schedules a one-shot timer task that runs `action` after `delay_ms`.
    pub fn set_timeout(&mut self, delay_ms: u64, action: impl FnMut(&mut ()) -> TaskOutcome + 'static) {
        self.scheduler.schedule_after(Priority::High, (), delay_ms, action, None::<fn(&mut ())>);
    }

    /// Schedules a repeating low-priority timer task.
    pub fn set_interval(&mut self, delay_ms: u64, action: impl FnMut(&mut ()) -> TaskOutcome + 'static) {
        self.scheduler.schedule_after(Priority::Low, (), delay_ms, action, None::<fn(&mut ())>);
    }

    /// Cancels all outstanding HTTP requests (called before teardown on a
    /// queued navigation).
    pub fn abort_outstanding(&mut self) {
        self.http.abort();
    }

    /// Pumps network I/O, script completion, and due timers for at most
    /// `timeout_ms`. Returns `Done` when nothing remains to drive forward.
    pub fn wait(&mut self, timeout_ms: u64) -> WaitOutcome {
        let tick = self.config.tick_timeout_ms.min(timeout_ms.max(1));
        self.http.tick(tick);
        self.scripts.poll(
            &mut self.dom,
            &mut *self.js,
            &mut self.events,
            &mut self.action_host,
            &mut self.hooks,
        );
        self.scheduler.run();

        if self.scheduler.is_empty() && self.scripts.is_quiescent() {
            WaitOutcome::Done
        } else {
            WaitOutcome::Pending
        }
    }
}
