//! In-memory element tree
//!
//! An arena of nodes addressed by [`NodeId`]. Detached nodes stay in the
//! arena but are unreachable from the root, which keeps ids stable across
//! mutations.

use super::selector::Selector;
use super::{Flag, Page, BADGE_CLASS};

/// Handle to a node in a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    Root,
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    /// Script/style content, kept verbatim and ignored by text extraction
    RawText(String),
    Comment(String),
    Doctype(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

/// A mutable document tree
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    mutations: u64,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document (just the root)
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Root,
                parent: None,
                children: Vec::new(),
            }],
            mutations: 0,
        }
    }

    /// The document root
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Number of mutations applied since the document was built
    ///
    /// Parsing does not count; every attribute change, insertion and removal
    /// afterwards does.
    pub fn mutation_count(&self) -> u64 {
        self.mutations
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub(crate) fn push(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        NodeId(self.nodes.len() - 1)
    }

    /// Attach without counting a mutation (used while parsing)
    pub(crate) fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Create a detached element
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
        })
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_string()))
    }

    /// Append `child` as the last child of `parent`, detaching it first
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.attach(parent, child);
        self.mutations += 1;
    }

    /// Remove a node from its parent (no-op when already detached)
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != id);
            self.mutations += 1;
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.0].kind, NodeKind::Element { .. })
    }

    /// Tag name (lowercase) of an element
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    /// Parent, if it is an element (the root does not count)
    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent.filter(|p| self.is_element(*p))
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    /// Set an attribute; unchanged values are not counted as mutations
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id.0].kind {
            match attrs.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
                Some((_, v)) if v.as_str() == value => return,
                Some((_, v)) => *v = value.to_string(),
                None => attrs.push((name.to_ascii_lowercase(), value.to_string())),
            }
            self.mutations += 1;
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id.0].kind {
            let before = attrs.len();
            attrs.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
            if attrs.len() != before {
                self.mutations += 1;
            }
        }
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attr(id, "class")
            .is_some_and(|c| c.split_ascii_whitespace().any(|name| name == class))
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if self.has_class(id, class) || !self.is_element(id) {
            return;
        }
        let value = match self.attr(id, "class").map(str::trim) {
            Some(existing) if !existing.is_empty() => format!("{} {}", existing, class),
            _ => class.to_string(),
        };
        self.set_attr(id, "class", &value);
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        if !self.has_class(id, class) {
            return;
        }
        let remaining: Vec<&str> = self
            .attr(id, "class")
            .unwrap_or_default()
            .split_ascii_whitespace()
            .filter(|name| *name != class)
            .collect();
        if remaining.is_empty() {
            self.remove_attr(id, "class");
        } else {
            let value = remaining.join(" ");
            self.set_attr(id, "class", &value);
        }
    }

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out, false);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String, skip_badges: bool) {
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            match &self.nodes[next.0].kind {
                NodeKind::Text(text) => out.push_str(text),
                NodeKind::Element { .. } if skip_badges && self.has_class(next, BADGE_CLASS) => {}
                NodeKind::Root | NodeKind::Element { .. } => {
                    pending.extend(self.nodes[next.0].children.iter().rev().copied());
                }
                NodeKind::RawText(_) | NodeKind::Comment(_) | NodeKind::Doctype(_) => {}
            }
        }
    }

    /// Replace all children of an element with a single text node
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        for child in self.nodes[id.0].children.clone() {
            self.detach(child);
        }
        let node = self.create_text(text);
        self.append_child(id, node);
    }

    /// All descendants of the root matching `selector`, in document order
    pub fn select_all(&self, selector: &Selector) -> Vec<NodeId> {
        let mut found = Vec::new();
        self.walk(self.root(), &mut |id| {
            if selector.matches(self, id) {
                found.push(id);
            }
            true
        });
        found
    }

    /// First descendant of `scope` (excluding `scope` itself) matching `selector`
    pub fn select_first_within(&self, scope: NodeId, selector: &Selector) -> Option<NodeId> {
        self.find_within(scope, |id| selector.matches(self, id))
    }

    fn find_within(&self, scope: NodeId, mut accept: impl FnMut(NodeId) -> bool) -> Option<NodeId> {
        let mut found = None;
        for child in &self.nodes[scope.0].children {
            self.walk(*child, &mut |id| {
                if accept(id) {
                    found = Some(id);
                }
                found.is_none()
            });
            if found.is_some() {
                break;
            }
        }
        found
    }

    /// Pre-order walk; the visitor returns `false` to stop early
    fn walk(&self, id: NodeId, visit: &mut dyn FnMut(NodeId) -> bool) -> bool {
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if !visit(next) {
                return false;
            }
            pending.extend(self.nodes[next.0].children.iter().rev().copied());
        }
        true
    }

    fn find_badge(&self, item: NodeId) -> Option<NodeId> {
        self.find_within(item, |id| self.has_class(id, BADGE_CLASS))
    }
}

impl Page for Document {
    type Item = NodeId;

    fn items(&self, selector: &Selector) -> Vec<NodeId> {
        self.select_all(selector)
    }

    fn text(&self, item: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(item, &mut out, true);
        out
    }

    fn select_text(&self, item: NodeId, selector: &Selector) -> Option<String> {
        self.select_first_within(item, selector)
            .map(|found| self.text_content(found))
    }

    fn has_flag(&self, item: NodeId, flag: Flag) -> bool {
        self.has_class(item, flag.class_name())
    }

    fn set_flag(&mut self, item: NodeId, flag: Flag, on: bool) {
        if on {
            self.add_class(item, flag.class_name());
        } else {
            self.remove_class(item, flag.class_name());
        }
    }

    fn badge(&self, item: NodeId) -> Option<String> {
        self.find_badge(item).map(|b| self.text_content(b))
    }

    fn set_badge(&mut self, item: NodeId, label: &str) {
        let badge = match self.find_badge(item) {
            Some(existing) => existing,
            None => {
                let badge = self.create_element("div");
                self.set_attr(badge, "class", BADGE_CLASS);
                self.append_child(item, badge);
                badge
            }
        };
        self.set_attr(badge, "aria-label", label);
        if self.text_content(badge) != label {
            self.set_text(badge, label);
        }
    }

    fn remove_badge(&mut self, item: NodeId) {
        if let Some(badge) = self.find_badge(item) {
            self.detach(badge);
        }
    }
}
