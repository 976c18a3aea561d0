//! Event manager: per-page listener registry, capture/target/bubble
//! propagation with shadow-DOM retargeting, and the handful of default
//! actions (click, keydown, checkbox/radio activation) that run when
//! `preventDefault` wasn't called.

use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::dom::{Dom, NodeId};
use crate::js::{invoke_callback, Callback, JsEngine, JsValue};

/// Anything a listener can be registered on. DOM nodes are the common case;
/// `Window` is the synthetic target appended to most propagation paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Node(NodeId),
    Window,
}

/// `(target, event type)` — the registry's lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EventKey(Target, String);

/// Shared abort flag for `AbortController`-style listener removal.
#[derive(Debug, Clone)]
pub struct AbortSignal(std::rc::Rc<std::cell::Cell<bool>>);

impl AbortSignal {
    pub fn new() -> Self {
        Self(std::rc::Rc::new(std::cell::Cell::new(false)))
    }

    pub fn abort(&self) {
        self.0.set(true);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.get()
    }
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Options accepted by [`EventManager::add_event_listener`].
#[derive(Debug, Clone, Default)]
pub struct ListenerOptions {
    pub capture: bool,
    pub once: bool,
    pub passive: bool,
    pub signal: Option<AbortSignal>,
}

struct Listener {
    capture: bool,
    once: bool,
    #[allow(dead_code)]
    passive: bool,
    signal: Option<AbortSignal>,
    callback: Callback,
    removed: bool,
}

/// Propagation phase, mirrored on [`Event`] for listener introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    None,
    Capturing,
    AtTarget,
    Bubbling,
}

/// A single dispatch's state. Created by the issuer, consumed by exactly one
/// `dispatch` call, then discarded.
#[derive(Debug, Clone)]
pub struct Event {
    pub type_name: String,
    pub bubbles: bool,
    pub cancelable: bool,
    pub composed: bool,
    pub phase: Phase,
    pub current_target: Option<Target>,
    pub target: Option<Target>,
    pub original_target: Option<Target>,
    pub stop_propagation: bool,
    pub stop_immediate_propagation: bool,
    pub prevent_default: bool,
    pub needs_retargeting: bool,
    pub time_stamp: u128,
}

impl Event {
    pub fn new(type_name: impl Into<String>, bubbles: bool, cancelable: bool, composed: bool) -> Self {
        Self {
            type_name: type_name.into(),
            bubbles,
            cancelable,
            composed,
            phase: Phase::None,
            current_target: None,
            target: None,
            original_target: None,
            stop_propagation: false,
            stop_immediate_propagation: false,
            prevent_default: false,
            needs_retargeting: false,
            time_stamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or(0),
        }
    }

    pub fn stop_propagation(&mut self) {
        self.stop_propagation = true;
    }

    pub fn stop_immediate_propagation(&mut self) {
        self.stop_propagation = true;
        self.stop_immediate_propagation = true;
    }

    pub fn prevent_default(&mut self) {
        if self.cancelable {
            self.prevent_default = true;
        }
    }
}

/// Hook for the two event types whose default action is page-specific
/// (everything else — checkbox/radio toggling — is handled here directly).
pub trait DefaultActionHost {
    fn handle_click(&mut self, dom: &mut Dom, js: &mut dyn JsEngine, target: NodeId);
    fn handle_keydown(&mut self, dom: &mut Dom, js: &mut dyn JsEngine, target: NodeId, event: &Event);
}

const MAX_PROPAGATION_PATH_DEFAULT: usize = 128;

/// Per-page listener registry and dispatcher.
pub struct EventManager {
    listeners: HashMap<EventKey, Vec<Listener>>,
    dirty_keys: HashSet<EventKey>,
    depth: u32,
    ignore_list: Vec<(Target, Callback)>,
    has_dom_load_listener: bool,
    max_propagation_path: usize,
}

impl EventManager {
    pub fn new(max_propagation_path: usize) -> Self {
        Self {
            listeners: HashMap::new(),
            dirty_keys: HashSet::new(),
            depth: 0,
            ignore_list: Vec::new(),
            has_dom_load_listener: false,
            max_propagation_path,
        }
    }

    pub fn has_dom_load_listener(&self) -> bool {
        self.has_dom_load_listener
    }

    /// Registers a listener not already present at the same
    /// `(target, type, capture)` under the same callback identity.
    pub fn add_event_listener(
        &mut self,
        target: Target,
        type_name: impl Into<String>,
        callback: Callback,
        opts: ListenerOptions,
    ) {
        if opts.signal.as_ref().is_some_and(AbortSignal::is_aborted) {
            return;
        }
        let type_name = type_name.into();
        let key = EventKey(target, type_name.clone());
        let list = self.listeners.entry(key).or_default();
        let duplicate = list
            .iter()
            .any(|l| !l.removed && l.capture == opts.capture && l.callback.identity_eq(&callback));
        if duplicate {
            return;
        }

        if type_name == "load" {
            self.has_dom_load_listener = true;
            self.ignore_list.push((target, callback.clone()));
        }

        list.push(Listener {
            capture: opts.capture,
            once: opts.once,
            passive: opts.passive,
            signal: opts.signal,
            callback,
            removed: false,
        });
    }

    pub fn remove_event_listener(&mut self, target: Target, type_name: &str, callback: &Callback, capture: bool) {
        let key = EventKey(target, type_name.to_string());
        let Some(list) = self.listeners.get_mut(&key) else {
            return;
        };
        let Some(l) = list
            .iter_mut()
            .find(|l| !l.removed && l.capture == capture && l.callback.identity_eq(callback))
        else {
            return;
        };

        l.removed = true;
        if self.depth == 0 {
            self.sweep_key(&key);
        } else {
            self.dirty_keys.insert(key);
        }
    }

    fn sweep_key(&mut self, key: &EventKey) {
        if let Some(list) = self.listeners.get_mut(key) {
            list.retain(|l| !l.removed);
        }
    }

    fn sweep_dirty(&mut self) {
        let keys: Vec<EventKey> = self.dirty_keys.drain().collect();
        for key in keys {
            self.sweep_key(&key);
        }
    }

    /// Builds the propagation path: target first, ancestors outward, with
    /// shadow-root jumps, capped at `max_propagation_path`.
    fn build_path(&self, dom: &Dom, target: Target, event: &mut Event) -> Vec<Target> {
        let mut path = Vec::new();
        let mut needs_retarget = false;
        let mut stopped_at_shadow_boundary = false;

        if let Target::Node(mut cur) = target {
            loop {
                if path.len() >= self.max_propagation_path {
                    break;
                }
                path.push(Target::Node(cur));
                if dom.is_shadow_root(cur) {
                    needs_retarget = true;
                    if !event.composed {
                        stopped_at_shadow_boundary = true;
                        break;
                    }
                    match dom.shadow_host(cur) {
                        Some(host) => {
                            cur = host;
                            continue;
                        }
                        None => break,
                    }
                }
                match dom.parent_of(cur) {
                    Some(p) => cur = p,
                    None => break,
                }
            }
        } else {
            path.push(target);
        }

        event.needs_retargeting = needs_retarget;

        if event.type_name != "load" && !stopped_at_shadow_boundary {
            path.push(Target::Window);
        }
        path
    }

    fn is_ancestor_or_self(&self, dom: &Dom, ancestor: Target, node: Target) -> bool {
        let (Target::Node(anc), Target::Node(mut cur)) = (ancestor, node) else {
            return ancestor == node;
        };
        loop {
            if cur == anc {
                return true;
            }
            match dom.parent_of(cur) {
                Some(p) => cur = p,
                None => return false,
            }
        }
    }

    fn adjusted_target(&self, dom: &Dom, chain: &[Target], current: Target) -> Target {
        chain
            .iter()
            .find(|&&candidate| self.is_ancestor_or_self(dom, candidate, current))
            .copied()
            .unwrap_or(current)
    }

    /// Runs every live listener for `(node, event.type_name, capture)`.
    /// Returns `false` if `stop_immediate_propagation` fired mid-list.
    fn run_listeners(
        &mut self,
        js: &mut dyn JsEngine,
        node: Target,
        capture: bool,
        event: &mut Event,
        apply_ignore: bool,
    ) -> bool {
        let key = EventKey(node, event.type_name.clone());
        let snapshot_len = self.listeners.get(&key).map(Vec::len).unwrap_or(0);

        for i in 0..snapshot_len {
            let (run, once, callback) = {
                let Some(list) = self.listeners.get(&key) else { break };
                let Some(l) = list.get(i) else { break };
                if l.removed || l.capture != capture {
                    (false, false, None)
                } else if l.signal.as_ref().is_some_and(AbortSignal::is_aborted) {
                    (false, false, None)
                } else {
                    (true, l.once, Some(l.callback.clone()))
                }
            };

            if !run {
                continue;
            }
            let callback = callback.expect("run implies callback present");

            if apply_ignore {
                if let Some(pos) = self
                    .ignore_list
                    .iter()
                    .position(|(t, cb)| *t == node && cb.identity_eq(&callback))
                {
                    self.ignore_list.remove(pos);
                    continue;
                }
            }

            if once {
                if let Some(list) = self.listeners.get_mut(&key) {
                    if let Some(l) = list.get_mut(i) {
                        l.removed = true;
                    }
                }
            }

            let this_value = JsValue::String(format!("{node:?}"));
            let event_value = JsValue::String(event.type_name.clone());
            if let Err(e) = invoke_callback(js, &callback, &this_value, &[event_value]) {
                log::error!("listener for {:?} threw: {e}", key);
            }

            if event.stop_immediate_propagation {
                return false;
            }
        }
        true
    }

    /// Dispatches `event` at `target`, running capture, target and bubble
    /// phases followed by default actions (unless `prevent_default` was set).
    pub fn dispatch(
        &mut self,
        dom: &mut Dom,
        js: &mut dyn JsEngine,
        host: &mut dyn DefaultActionHost,
        target: Target,
        event: &mut Event,
    ) {
        self.dispatch_inner(dom, js, host, target, event, None, false);
    }

    /// Like [`EventManager::dispatch`] but also invokes `inline` directly on
    /// the target before its listeners (for `el.onclick`-style properties).
    pub fn dispatch_with_function(
        &mut self,
        dom: &mut Dom,
        js: &mut dyn JsEngine,
        host: &mut dyn DefaultActionHost,
        target: Target,
        event: &mut Event,
        inline: Callback,
    ) {
        self.dispatch_inner(dom, js, host, target, event, Some(inline), false);
    }

    /// Dispatch variant used by the script manager for the `load` event it
    /// fires on a completed `<script>`: its own listener is skipped once.
    pub fn dispatch_applying_ignore(
        &mut self,
        dom: &mut Dom,
        js: &mut dyn JsEngine,
        host: &mut dyn DefaultActionHost,
        target: Target,
        event: &mut Event,
    ) {
        self.dispatch_inner(dom, js, host, target, event, None, true);
    }

    fn dispatch_inner(
        &mut self,
        dom: &mut Dom,
        js: &mut dyn JsEngine,
        host: &mut dyn DefaultActionHost,
        target: Target,
        event: &mut Event,
        inline: Option<Callback>,
        apply_ignore: bool,
    ) {
        self.depth += 1;

        let is_checkbox_radio_click = event.type_name == "click" && matches!(target, Target::Node(id) if is_checkbox_or_radio(dom, id));
        let mut rollback = None;
        if is_checkbox_radio_click {
            if let Target::Node(id) = target {
                rollback = Some(toggle_checked(dom, id));
            }
        }

        event.target = Some(target);
        event.original_target = Some(target);
        let path = self.build_path(dom, target, event);
        let original_chain: Vec<Target> = path.iter().copied().filter(|t| matches!(t, Target::Node(_))).collect();

        event.phase = Phase::Capturing;
        let mut short_circuited = false;
        for &node in path[1..].iter().rev() {
            event.current_target = Some(node);
            if event.needs_retargeting {
                event.target = Some(self.adjusted_target(dom, &original_chain, node));
            }
            if !self.run_listeners(js, node, true, event, apply_ignore) || event.stop_propagation {
                short_circuited = true;
                break;
            }
        }

        if !short_circuited {
            event.phase = Phase::AtTarget;
            event.current_target = Some(target);
            event.target = Some(target);
            if let Some(cb) = &inline {
                let this_value = JsValue::String(format!("{target:?}"));
                if let Err(e) = invoke_callback(js, cb, &this_value, &[JsValue::String(event.type_name.clone())]) {
                    log::error!("inline handler for {:?} threw: {e}", target);
                }
            }
            if !event.stop_propagation {
                self.run_listeners(js, target, true, event, apply_ignore);
            }
            if !event.stop_propagation {
                self.run_listeners(js, target, false, event, apply_ignore);
            }
            if event.stop_propagation {
                short_circuited = true;
            }
        }

        if !short_circuited && event.bubbles {
            event.phase = Phase::Bubbling;
            for &node in path[1..].iter() {
                event.current_target = Some(node);
                if event.needs_retargeting {
                    event.target = Some(self.adjusted_target(dom, &original_chain, node));
                }
                if !self.run_listeners(js, node, false, event, apply_ignore) || event.stop_propagation {
                    break;
                }
            }
        }

        event.phase = Phase::None;
        event.current_target = None;
        event.target = Some(target);
        event.stop_propagation = false;
        event.stop_immediate_propagation = false;

        if !event.prevent_default {
            match event.type_name.as_str() {
                "click" => {
                    if let Target::Node(id) = target {
                        host.handle_click(dom, js, id);
                    }
                }
                "keydown" => {
                    if let Target::Node(id) = target {
                        host.handle_keydown(dom, js, id, event);
                    }
                }
                _ => {}
            }
        }

        if let (true, Some((old_checked, prev_radio))) = (is_checkbox_radio_click, rollback) {
            if let Target::Node(id) = target {
                let new_checked = dom.attr(id, "checked").is_some();
                if event.prevent_default {
                    restore_checked(dom, id, old_checked, prev_radio);
                } else if new_checked != old_checked && dom.is_connected(id) {
                    let mut input_event = Event::new("input", true, false, false);
                    self.dispatch_inner(dom, js, host, target, &mut input_event, None, false);
                    let mut change_event = Event::new("change", true, false, false);
                    self.dispatch_inner(dom, js, host, target, &mut change_event, None, false);
                }
            }
        }

        self.depth -= 1;
        if self.depth == 0 {
            self.sweep_dirty();
        }
    }
}

fn is_checkbox_or_radio(dom: &Dom, id: NodeId) -> bool {
    dom.tag_name(id).map(|t| t.eq_ignore_ascii_case("input")) == Some(true)
        && dom
            .attr(id, "type")
            .map(|t| t.eq_ignore_ascii_case("checkbox") || t.eq_ignore_ascii_case("radio"))
            == Some(true)
}

/// Flips the checked state ahead of dispatch; for radios, also unchecks the
/// previously-checked member of the group. Returns `(old_checked, previous_radio)`.
fn toggle_checked(dom: &mut Dom, id: NodeId) -> (bool, Option<NodeId>) {
    let old_checked = dom.attr(id, "checked").is_some();
    let is_radio = dom.attr(id, "type").map(|t| t.eq_ignore_ascii_case("radio")) == Some(true);

    let mut previous_radio = None;
    if is_radio && !old_checked {
        if let Some(name) = dom.attr(id, "name").map(str::to_string) {
            let form_scope = dom.attr(id, "form").map(str::to_string);
            let root = find_root(dom, id);
            if let Some(prev) = dom.find_checked_radio_in_group(root, &name, form_scope.as_deref(), id) {
                previous_radio = Some(prev);
                remove_attr(dom, prev, "checked");
            }
        }
        dom.set_attr(id, "checked", "");
    } else if !is_radio {
        if old_checked {
            remove_attr(dom, id, "checked");
        } else {
            dom.set_attr(id, "checked", "");
        }
    }
    (old_checked, previous_radio)
}

fn restore_checked(dom: &mut Dom, id: NodeId, old_checked: bool, previous_radio: Option<NodeId>) {
    if old_checked {
        dom.set_attr(id, "checked", "");
    } else {
        remove_attr(dom, id, "checked");
    }
    if let Some(prev) = previous_radio {
        dom.set_attr(prev, "checked", "");
    }
}

fn remove_attr(dom: &mut Dom, id: NodeId, name: &str) -> bool {
    dom.remove_attr(id, name)
}

fn find_root(dom: &Dom, id: NodeId) -> NodeId {
    let mut cur = id;
    while let Some(p) = dom.parent_of(cur) {
        cur = p;
    }
    cur
}
