//! In-memory browser for tests and demos.
//!
//! [`MockDom`] is a small live node tree shared behind a mutex. Tests mutate it
//! from any thread (append late nodes, re-render, hide, disable) while a
//! [`MockDriver`] view of the same tree serves the wait engine.
//!
//! Node ids are never reused: removing or replacing a node makes every
//! [`RawElement`] pointing at it stale, exactly like a re-rendered page.
//!
//! CSS support covers compound selectors (`tag#id.class[attr=value]`) joined by
//! descendant combinators. XPath is not supported.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::driver::{BrowserDriver, RawElement, READY_STATE_COMPLETE, READY_STATE_SCRIPT};
use crate::locator::{Selector, Strategy};
use crate::result::{EsperaError, EsperaResult};

// =============================================================================
// NODE SPEC
// =============================================================================

/// Description of a node to insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    displayed: bool,
    enabled: bool,
}

impl NodeSpec {
    /// Visible, enabled node with the given tag
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attributes: BTreeMap::new(),
            text: String::new(),
            displayed: true,
            enabled: true,
        }
    }

    /// Set the `id` attribute
    #[must_use]
    pub fn id(self, id: impl Into<String>) -> Self {
        self.attr("id", id)
    }

    /// Set the raw `class` attribute
    #[must_use]
    pub fn class(self, classes: impl Into<String>) -> Self {
        self.attr("class", classes)
    }

    /// Set the `name` attribute
    #[must_use]
    pub fn name(self, name: impl Into<String>) -> Self {
        self.attr("name", name)
    }

    /// Set any attribute
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set the node's own text
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Start hidden
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }

    /// Start disabled
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

// =============================================================================
// DOM STATE
// =============================================================================

#[derive(Debug)]
struct Node {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    displayed: bool,
    enabled: bool,
    parent: Option<String>,
    children: Vec<String>,
}

impl Node {
    fn from_spec(spec: NodeSpec, parent: Option<String>, children: Vec<String>) -> Self {
        Self {
            tag: spec.tag,
            attributes: spec.attributes,
            text: spec.text,
            displayed: spec.displayed,
            enabled: spec.enabled,
            parent,
            children,
        }
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    fn has_class(&self, class: &str) -> bool {
        self.attribute("class")
            .is_some_and(|classes| classes.split_ascii_whitespace().any(|c| c == class))
    }
}

#[derive(Debug)]
struct DomState {
    nodes: HashMap<String, Node>,
    roots: Vec<String>,
    next_id: u64,
    ready_state: String,
    scripts: HashMap<String, Value>,
    history: Vec<String>,
}

impl Default for DomState {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            roots: Vec::new(),
            next_id: 0,
            ready_state: READY_STATE_COMPLETE.to_string(),
            scripts: HashMap::new(),
            history: Vec::new(),
        }
    }
}

impl DomState {
    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("node-{}", self.next_id)
    }

    fn node(&self, element: &RawElement) -> EsperaResult<&Node> {
        self.nodes.get(&element.id).ok_or_else(|| stale(element))
    }

    fn node_mut(&mut self, element: &RawElement) -> EsperaResult<&mut Node> {
        self.nodes.get_mut(&element.id).ok_or_else(|| stale(element))
    }

    fn insert(&mut self, parent: Option<&RawElement>, spec: NodeSpec) -> RawElement {
        let id = self.allocate_id();
        match parent {
            None => self.roots.push(id.clone()),
            Some(parent) => match self.nodes.get_mut(&parent.id) {
                Some(node) => node.children.push(id.clone()),
                // detached parent: the new node is born stale
                None => return RawElement::new(id),
            },
        }
        let node = Node::from_spec(spec, parent.map(|p| p.id.clone()), Vec::new());
        self.nodes.insert(id.clone(), node);
        RawElement::new(id)
    }

    fn detach(&mut self, id: &str) {
        let Some(node) = self.nodes.remove(id) else {
            return;
        };
        match &node.parent {
            Some(parent) => {
                if let Some(parent) = self.nodes.get_mut(parent) {
                    parent.children.retain(|c| c != id);
                }
            }
            None => self.roots.retain(|c| c != id),
        }
        let mut pending = node.children;
        while let Some(child) = pending.pop() {
            if let Some(removed) = self.nodes.remove(&child) {
                pending.extend(removed.children);
            }
        }
    }

    fn replace(&mut self, element: &RawElement, spec: NodeSpec) -> RawElement {
        let id = self.allocate_id();
        let Some(old) = self.nodes.remove(&element.id) else {
            return RawElement::new(id);
        };
        for child in &old.children {
            if let Some(child) = self.nodes.get_mut(child) {
                child.parent = Some(id.clone());
            }
        }
        let siblings = match &old.parent {
            Some(parent) => self.nodes.get_mut(parent).map(|p| &mut p.children),
            None => Some(&mut self.roots),
        };
        if let Some(slot) = siblings.and_then(|s| s.iter_mut().find(|s| **s == element.id)) {
            slot.clone_from(&id);
        }
        self.nodes
            .insert(id.clone(), Node::from_spec(spec, old.parent, old.children));
        RawElement::new(id)
    }

    /// Pre-order walk of the subtree below `scope`, or of the whole document
    fn document_order(&self, scope: Option<&RawElement>) -> EsperaResult<Vec<String>> {
        let start = match scope {
            Some(scope) => self.node(scope)?.children.clone(),
            None => self.roots.clone(),
        };
        let mut order = Vec::new();
        let mut stack: Vec<String> = start.into_iter().rev().collect();
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get(&id) {
                stack.extend(node.children.iter().rev().cloned());
                order.push(id);
            }
        }
        Ok(order)
    }

    fn is_visible(&self, id: &str) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            match self.nodes.get(current) {
                Some(node) if node.displayed => cursor = node.parent.as_deref(),
                _ => return false,
            }
        }
        true
    }

    fn search(&self, selector: &Selector, scope: Option<&RawElement>) -> EsperaResult<Vec<String>> {
        let matcher = Matcher::compile(selector)?;
        Ok(self
            .document_order(scope)?
            .into_iter()
            .filter(|id| matcher.matches(self, id))
            .collect())
    }

    fn interactable(&self, element: &RawElement) -> EsperaResult<&Node> {
        let node = self.node(element)?;
        if !self.is_visible(&element.id) || !node.enabled {
            return Err(EsperaError::driver(format!(
                "element {element} is not interactable"
            )));
        }
        Ok(node)
    }

    fn select_option(&mut self, element: &RawElement) {
        let Some(parent) = self.nodes.get(&element.id).and_then(|n| n.parent.clone()) else {
            return;
        };
        let siblings = self
            .nodes
            .get(&parent)
            .map(|p| p.children.clone())
            .unwrap_or_default();
        for sibling in siblings {
            if let Some(node) = self.nodes.get_mut(&sibling) {
                if node.tag == "option" {
                    node.attributes.remove("selected");
                }
            }
        }
        let mut value = None;
        if let Some(option) = self.nodes.get_mut(&element.id) {
            option.attributes.insert("selected".into(), "true".into());
            value = Some(
                option
                    .attribute("value")
                    .map_or_else(|| option.text.clone(), ToString::to_string),
            );
        }
        if let (Some(select), Some(value)) = (self.nodes.get_mut(&parent), value) {
            select.attributes.insert("value".into(), value);
        }
    }
}

fn stale(element: &RawElement) -> EsperaError {
    EsperaError::StaleReference {
        element: element.id.clone(),
    }
}

// =============================================================================
// SELECTOR MATCHING
// =============================================================================

#[derive(Debug, Default)]
struct Compound {
    tag: Option<String>,
    ids: Vec<String>,
    classes: Vec<String>,
    attributes: Vec<(String, Option<String>)>,
}

impl Compound {
    fn parse(text: &str) -> EsperaResult<Self> {
        const MARKERS: [char; 3] = ['.', '#', '['];
        let unsupported = || EsperaError::driver(format!("unsupported css selector {text:?}"));

        let mut compound = Self::default();
        let tag_end = text.find(MARKERS).unwrap_or(text.len());
        let tag = &text[..tag_end];
        if !tag.is_empty() && tag != "*" {
            if !is_ident(tag) {
                return Err(unsupported());
            }
            compound.tag = Some(tag.to_ascii_lowercase());
        }

        let mut rest = &text[tag_end..];
        while let Some(marker) = rest.chars().next() {
            rest = &rest[marker.len_utf8()..];
            match marker {
                '.' | '#' => {
                    let end = rest.find(MARKERS).unwrap_or(rest.len());
                    let name = &rest[..end];
                    if !is_ident(name) {
                        return Err(unsupported());
                    }
                    if marker == '.' {
                        compound.classes.push(name.to_string());
                    } else {
                        compound.ids.push(name.to_string());
                    }
                    rest = &rest[end..];
                }
                '[' => {
                    let end = rest.find(']').ok_or_else(unsupported)?;
                    let body = &rest[..end];
                    rest = &rest[end + 1..];
                    let (name, value) = match body.split_once('=') {
                        Some((name, value)) => (
                            name.trim(),
                            Some(value.trim().trim_matches(|c: char| c == '"' || c == '\'').to_string()),
                        ),
                        None => (body.trim(), None),
                    };
                    if !is_ident(name) {
                        return Err(unsupported());
                    }
                    compound.attributes.push((name.to_string(), value));
                }
                _ => return Err(unsupported()),
            }
        }
        Ok(compound)
    }

    fn matches(&self, node: &Node) -> bool {
        self.tag.as_ref().map_or(true, |tag| *tag == node.tag)
            && self.ids.iter().all(|id| node.attribute("id") == Some(id.as_str()))
            && self.classes.iter().all(|class| node.has_class(class))
            && self
                .attributes
                .iter()
                .all(|(name, expected)| match (node.attribute(name), expected) {
                    (Some(actual), Some(expected)) => actual == expected,
                    (Some(_), None) => true,
                    (None, _) => false,
                })
    }
}

fn is_ident(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

enum Matcher {
    Css(Vec<Compound>),
    Attribute(&'static str, String),
    Class(String),
    Tag(String),
    Link { text: String, partial: bool },
}

impl Matcher {
    fn compile(selector: &Selector) -> EsperaResult<Self> {
        let value = selector.value.trim();
        Ok(match selector.strategy {
            Strategy::Css => Self::Css(
                value
                    .split_ascii_whitespace()
                    .map(Compound::parse)
                    .collect::<EsperaResult<_>>()?,
            ),
            Strategy::Id => Self::Attribute("id", value.to_string()),
            Strategy::Name => Self::Attribute("name", value.to_string()),
            Strategy::ClassName => Self::Class(value.to_string()),
            Strategy::TagName => Self::Tag(value.to_ascii_lowercase()),
            Strategy::LinkText => Self::Link {
                text: value.to_string(),
                partial: false,
            },
            Strategy::PartialLinkText => Self::Link {
                text: value.to_string(),
                partial: true,
            },
            Strategy::XPath => {
                return Err(EsperaError::driver(format!(
                    "mock driver does not evaluate xpath {value:?}"
                )))
            }
        })
    }

    fn matches(&self, state: &DomState, id: &str) -> bool {
        let Some(node) = state.nodes.get(id) else {
            return false;
        };
        match self {
            Self::Css(compounds) => match compounds.split_last() {
                Some((leaf, ancestors)) => {
                    leaf.matches(node) && ancestors_match(state, node, ancestors)
                }
                None => false,
            },
            Self::Attribute(name, expected) => node.attribute(name) == Some(expected.as_str()),
            Self::Class(class) => node.has_class(class),
            Self::Tag(tag) => node.tag == *tag,
            Self::Link { text, partial } => {
                node.tag == "a"
                    && if *partial {
                        node.text.contains(text.as_str())
                    } else {
                        node.text.trim() == text.as_str()
                    }
            }
        }
    }
}

/// Descendant combinator: each compound must match some ancestor, innermost first
fn ancestors_match(state: &DomState, node: &Node, ancestors: &[Compound]) -> bool {
    let mut cursor = node.parent.as_deref();
    for wanted in ancestors.iter().rev() {
        loop {
            let Some(candidate) = cursor.and_then(|id| state.nodes.get(id)) else {
                return false;
            };
            cursor = candidate.parent.as_deref();
            if wanted.matches(candidate) {
                break;
            }
        }
    }
    true
}

// =============================================================================
// MOCK DOM
// =============================================================================

/// Shared, mutable in-memory document
#[derive(Debug, Clone, Default)]
pub struct MockDom {
    inner: Arc<Mutex<DomState>>,
}

impl MockDom {
    /// Empty document whose ready state is `complete`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, DomState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Driver view over this document
    #[must_use]
    pub fn driver(&self) -> MockDriver {
        MockDriver { dom: self.clone() }
    }

    /// Append a node under `parent`, or at the document root
    pub fn append(&self, parent: Option<&RawElement>, spec: NodeSpec) -> RawElement {
        self.state().insert(parent, spec)
    }

    /// Append a node from a background thread after `delay`
    pub fn append_later(
        &self,
        delay: Duration,
        parent: Option<RawElement>,
        spec: NodeSpec,
    ) -> JoinHandle<RawElement> {
        let dom = self.clone();
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            dom.append(parent.as_ref(), spec)
        })
    }

    /// Detach a node and its subtree; every reference into it goes stale
    pub fn remove(&self, element: &RawElement) {
        self.state().detach(&element.id);
    }

    /// Re-render a node in place. The replacement keeps the old position and
    /// children but gets a fresh id.
    pub fn replace(&self, element: &RawElement, spec: NodeSpec) -> RawElement {
        self.state().replace(element, spec)
    }

    /// Whether the node is still attached
    #[must_use]
    pub fn contains(&self, element: &RawElement) -> bool {
        self.state().nodes.contains_key(&element.id)
    }

    /// Current attribute value
    #[must_use]
    pub fn attribute(&self, element: &RawElement, name: &str) -> Option<String> {
        self.state()
            .nodes
            .get(&element.id)
            .and_then(|n| n.attribute(name).map(ToString::to_string))
    }

    /// Set an attribute; no-op on a detached node
    pub fn set_attribute(&self, element: &RawElement, name: &str, value: &str) {
        if let Ok(node) = self.state().node_mut(element) {
            node.attributes.insert(name.to_string(), value.to_string());
        }
    }

    /// Remove an attribute
    pub fn remove_attribute(&self, element: &RawElement, name: &str) {
        if let Ok(node) = self.state().node_mut(element) {
            node.attributes.remove(name);
        }
    }

    /// Replace the node's own text
    pub fn set_text(&self, element: &RawElement, text: &str) {
        if let Ok(node) = self.state().node_mut(element) {
            node.text = text.to_string();
        }
    }

    /// Show or hide the node (and therefore its subtree)
    pub fn set_displayed(&self, element: &RawElement, displayed: bool) {
        if let Ok(node) = self.state().node_mut(element) {
            node.displayed = displayed;
        }
    }

    /// Enable or disable the node
    pub fn set_enabled(&self, element: &RawElement, enabled: bool) {
        if let Ok(node) = self.state().node_mut(element) {
            node.enabled = enabled;
        }
    }

    /// Value returned for the ready-state script
    pub fn set_ready_state(&self, state: &str) {
        self.state().ready_state = state.to_string();
    }

    /// Fixed result for an arbitrary script
    pub fn set_script_result(&self, script: &str, value: Value) {
        self.state().scripts.insert(script.to_string(), value);
    }

    /// Recorded driver calls, oldest first
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.state().history.clone()
    }

    /// Check if a call starting with `prefix` was recorded
    #[must_use]
    pub fn was_called(&self, prefix: &str) -> bool {
        self.call_count(prefix) > 0
    }

    /// Number of recorded calls starting with `prefix`
    #[must_use]
    pub fn call_count(&self, prefix: &str) -> usize {
        self.state()
            .history
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Forget recorded calls
    pub fn clear_history(&self) {
        self.state().history.clear();
    }
}

// =============================================================================
// MOCK DRIVER
// =============================================================================

/// [`BrowserDriver`] over a [`MockDom`]
#[derive(Debug, Clone)]
pub struct MockDriver {
    dom: MockDom,
}

impl MockDriver {
    /// The backing document
    #[must_use]
    pub const fn dom(&self) -> &MockDom {
        &self.dom
    }
}

impl BrowserDriver for MockDriver {
    fn find_element(
        &self,
        selector: &Selector,
        scope: Option<&RawElement>,
    ) -> EsperaResult<RawElement> {
        let mut state = self.dom.state();
        state.history.push(format!("find_element:{selector}"));
        state
            .search(selector, scope)?
            .into_iter()
            .next()
            .map(RawElement::new)
            .ok_or_else(|| EsperaError::NotFound {
                locator: selector.to_string(),
            })
    }

    fn find_elements(
        &self,
        selector: &Selector,
        scope: Option<&RawElement>,
    ) -> EsperaResult<Vec<RawElement>> {
        let mut state = self.dom.state();
        state.history.push(format!("find_elements:{selector}"));
        Ok(state
            .search(selector, scope)?
            .into_iter()
            .map(RawElement::new)
            .collect())
    }

    fn attribute(&self, element: &RawElement, name: &str) -> EsperaResult<Option<String>> {
        let state = self.dom.state();
        Ok(state
            .node(element)?
            .attribute(name)
            .map(ToString::to_string))
    }

    fn text(&self, element: &RawElement) -> EsperaResult<String> {
        Ok(self.dom.state().node(element)?.text.clone())
    }

    fn is_displayed(&self, element: &RawElement) -> EsperaResult<bool> {
        let state = self.dom.state();
        state.node(element)?;
        Ok(state.is_visible(&element.id))
    }

    fn is_enabled(&self, element: &RawElement) -> EsperaResult<bool> {
        Ok(self.dom.state().node(element)?.enabled)
    }

    fn click(&self, element: &RawElement) -> EsperaResult<()> {
        let mut state = self.dom.state();
        let is_option = state.interactable(element)?.tag == "option";
        state.history.push(format!("click:{element}"));
        if is_option {
            state.select_option(element);
        }
        Ok(())
    }

    fn send_keys(&self, element: &RawElement, text: &str) -> EsperaResult<()> {
        let mut state = self.dom.state();
        state.interactable(element)?;
        state.history.push(format!("send_keys:{element}:{text}"));
        let node = state.node_mut(element)?;
        node.attributes
            .entry("value".to_string())
            .or_default()
            .push_str(text);
        Ok(())
    }

    fn clear(&self, element: &RawElement) -> EsperaResult<()> {
        let mut state = self.dom.state();
        state.interactable(element)?;
        state.history.push(format!("clear:{element}"));
        state
            .node_mut(element)?
            .attributes
            .insert("value".to_string(), String::new());
        Ok(())
    }

    fn scroll_into_view(&self, element: &RawElement) -> EsperaResult<()> {
        let mut state = self.dom.state();
        state.node(element)?;
        state.history.push(format!("scroll_into_view:{element}"));
        Ok(())
    }

    fn execute_script(&self, script: &str) -> EsperaResult<Value> {
        let mut state = self.dom.state();
        state.history.push(format!("execute_script:{script}"));
        if let Some(value) = state.scripts.get(script) {
            return Ok(value.clone());
        }
        if script == READY_STATE_SCRIPT {
            return Ok(Value::String(state.ready_state.clone()));
        }
        Err(EsperaError::driver(format!("no scripted result for {script:?}")))
    }
}
