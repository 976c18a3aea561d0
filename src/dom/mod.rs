//! Minimal in-memory DOM facade: an arena of typed nodes with
//! parent/child indices, attribute storage and shadow-root linkage.
//!
//! Not a CSS/layout-aware DOM. Just enough structure for the event manager,
//! script manager and factory to have something concrete to walk.

use std::collections::HashMap;

/// Stable index into a [`Dom`] arena. Doubles as the `target_identity` half
/// of an event manager `EventKey`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// The payload carried by one arena slot.
#[derive(Debug, Clone)]
pub enum NodeData {
    Document,
    Element { tag: String, attrs: Vec<(String, String)> },
    Text(String),
    Comment(String),
    ShadowRoot { host: NodeId },
}

struct NodeSlot {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An arena-backed node tree. Owned by a `Page`; nodes never outlive it.
#[derive(Default)]
pub struct Dom {
    slots: Vec<Option<NodeSlot>>,
}

impl Dom {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Creates the document root. Should be called at most once per `Dom`.
    pub fn create_document(&mut self) -> NodeId {
        self.alloc(NodeData::Document, None)
    }

    pub fn create_element(&mut self, tag: impl Into<String>) -> NodeId {
        self.alloc(
            NodeData::Element {
                tag: tag.into(),
                attrs: Vec::new(),
            },
            None,
        )
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeData::Text(text.into()), None)
    }

    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeData::Comment(text.into()), None)
    }

    /// Creates a shadow root attached to `host` but not linked as a regular
    /// child — callers reach it only via `shadow_host`/dedicated bookkeeping.
    pub fn create_shadow_root(&mut self, host: NodeId) -> NodeId {
        self.alloc(NodeData::ShadowRoot { host }, None)
    }

    fn alloc(&mut self, data: NodeData, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.slots.len() as u32);
        self.slots.push(Some(NodeSlot {
            data,
            parent,
            children: Vec::new(),
        }));
        id
    }

    fn slot(&self, id: NodeId) -> &NodeSlot {
        self.slots[id.0 as usize]
            .as_ref()
            .expect("dereferencing a freed NodeId")
    }

    fn slot_mut(&mut self, id: NodeId) -> &mut NodeSlot {
        self.slots[id.0 as usize]
            .as_mut()
            .expect("dereferencing a freed NodeId")
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.slot(id).data
    }

    /// Appends `child` to `parent`, detaching it from any previous parent first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.slot_mut(parent).children.push(child);
        self.slot_mut(child).parent = Some(parent);
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(old_parent) = self.slot(id).parent {
            self.slot_mut(old_parent).children.retain(|&c| c != id);
        }
        self.slot_mut(id).parent = None;
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).parent
    }

    pub fn children_of(&self, id: NodeId) -> &[NodeId] {
        &self.slot(id).children
    }

    /// True if `id` can reach a `Document` root by walking parent pointers.
    pub fn is_connected(&self, id: NodeId) -> bool {
        let mut cur = id;
        loop {
            if matches!(self.slot(cur).data, NodeData::Document) {
                return true;
            }
            match self.slot(cur).parent {
                Some(p) => cur = p,
                None => return false,
            }
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.slot(id).data {
            NodeData::Element { attrs, .. } => {
                attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
            }
            _ => None,
        }
    }

    pub fn set_attr(&mut self, id: NodeId, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if let NodeData::Element { attrs, .. } = &mut self.slot_mut(id).data {
            if let Some(entry) = attrs.iter_mut().find(|(k, _)| *k == name) {
                entry.1 = value.into();
            } else {
                attrs.push((name, value.into()));
            }
        }
    }

    /// Removes an attribute; returns true if it was present.
    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> bool {
        if let NodeData::Element { attrs, .. } = &mut self.slot_mut(id).data {
            let before = attrs.len();
            attrs.retain(|(k, _)| k != name);
            attrs.len() != before
        } else {
            false
        }
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        match &self.slot(id).data {
            NodeData::Element { tag, .. } => Some(tag.as_str()),
            _ => None,
        }
    }

    pub fn is_shadow_root(&self, id: NodeId) -> bool {
        matches!(self.slot(id).data, NodeData::ShadowRoot { .. })
    }

    pub fn shadow_host(&self, id: NodeId) -> Option<NodeId> {
        match self.slot(id).data {
            NodeData::ShadowRoot { host } => Some(host),
            _ => None,
        }
    }

    /// Walks the tree rooted at `root`, looking for a checked radio input
    /// sharing `name` and `form_scope` with `exclude`'s group (the default
    /// action for radio activation). Returns the first match other than
    /// `exclude` itself.
    pub fn find_checked_radio_in_group(
        &self,
        root: NodeId,
        name: &str,
        form_scope: Option<&str>,
        exclude: NodeId,
    ) -> Option<NodeId> {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if id != exclude {
                if let NodeData::Element { tag, .. } = &self.slot(id).data {
                    if tag.eq_ignore_ascii_case("input")
                        && self.attr(id, "type").map(|t| t.eq_ignore_ascii_case("radio")) == Some(true)
                        && self.attr(id, "name") == Some(name)
                        && self.attr(id, "checked").is_some()
                        && self.attr(id, "form") == form_scope
                    {
                        return Some(id);
                    }
                }
            }
            stack.extend(self.children_of(id).iter().rev().copied());
        }
        None
    }

    /// Returns `<script>` elements reachable from `root`, in document order.
    pub fn scan_scripts(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        // Visit in document order: push children in reverse, pop from the back.
        while let Some(id) = stack.pop() {
            if let NodeData::Element { tag, .. } = &self.slot(id).data {
                if tag.eq_ignore_ascii_case("script") {
                    out.push(id);
                }
            }
            stack.extend(self.children_of(id).iter().rev().copied());
        }
        out
    }
}

/// Convenience accessor for attribute maps built outside the arena (used by
/// the HTML-adjacent callers that stage attrs before `create_element`).
pub fn attrs_to_map(attrs: &[(String, String)]) -> HashMap<&str, &str> {
    attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_walk_tree() {
        let mut dom = Dom::new();
        let doc = dom.create_document();
        let root = dom.create_element("html");
        let body = dom.create_element("body");
        dom.append_child(doc, root);
        dom.append_child(root, body);

        assert_eq!(dom.parent_of(body), Some(root));
        assert_eq!(dom.children_of(root), &[body]);
        assert!(dom.is_connected(body));
    }

    #[test]
    fn detached_node_is_not_connected() {
        let mut dom = Dom::new();
        let el = dom.create_element("div");
        assert!(!dom.is_connected(el));
    }

    #[test]
    fn attrs_round_trip() {
        let mut dom = Dom::new();
        let el = dom.create_element("input");
        dom.set_attr(el, "type", "checkbox");
        assert_eq!(dom.attr(el, "type"), Some("checkbox"));
        dom.set_attr(el, "type", "radio");
        assert_eq!(dom.attr(el, "type"), Some("radio"));
    }

    #[test]
    fn scan_scripts_finds_document_order() {
        let mut dom = Dom::new();
        let doc = dom.create_document();
        let head = dom.create_element("head");
        let s1 = dom.create_element("script");
        let s2 = dom.create_element("script");
        dom.append_child(doc, head);
        dom.append_child(head, s1);
        dom.append_child(doc, s2);

        assert_eq!(dom.scan_scripts(doc), vec![s1, s2]);
    }

    #[test]
    fn find_checked_radio_in_group_matches_name_and_form_scope() {
        let mut dom = Dom::new();
        let doc = dom.create_document();
        let a = dom.create_element("input");
        dom.set_attr(a, "type", "radio");
        dom.set_attr(a, "name", "color");
        dom.set_attr(a, "checked", "");
        let b = dom.create_element("input");
        dom.set_attr(b, "type", "radio");
        dom.set_attr(b, "name", "color");
        dom.append_child(doc, a);
        dom.append_child(doc, b);

        let found = dom.find_checked_radio_in_group(doc, "color", None, b);
        assert_eq!(found, Some(a));
    }

    #[test]
    fn shadow_root_links_back_to_host() {
        let mut dom = Dom::new();
        let host = dom.create_element("my-widget");
        let shadow = dom.create_shadow_root(host);
        assert!(dom.is_shadow_root(shadow));
        assert_eq!(dom.shadow_host(shadow), Some(host));
    }
}
