//! Live markup document used both as cleaning input and as the tree the
//! highlighter mutates.
//!
//! Parsing follows HTML5 error recovery through `kuchikikiki`, so stray end
//! tags, bare ampersands, unknown entities and truncated input all end up
//! as ordinary nodes. Text nodes are located across mutations by
//! [`NodePath`], an XPath-like locator such as `/p[2]/b[1]/text()[1]`,
//! relative to the document body. All text offsets are counted in `char`s.

use std::fmt;
use std::rc::Rc;

use kuchikikiki::traits::TendrilSink;
use kuchikikiki::NodeRef;
use serde::{Deserialize, Serialize};

/// Handle to a node of a [`Document`]. Equality is node identity.
#[derive(Clone)]
pub struct NodeId(NodeRef);

impl PartialEq for NodeId {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0 .0, &other.0 .0)
    }
}

impl Eq for NodeId {}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({:p})", Rc::as_ptr(&self.0 .0))
    }
}

impl NodeId {
    /// The underlying DOM node.
    pub fn node(&self) -> &NodeRef {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn downgrade(&self) -> std::rc::Weak<kuchikikiki::Node> {
        Rc::downgrade(&self.0 .0)
    }
}

/// Locator for a text node, recomputed on demand rather than held as a
/// reference so that it survives document mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodePath(String);

impl NodePath {
    /// Synthetic locator for the document title.
    pub const TITLE: &'static str = "#title";

    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn title() -> Self {
        Self(Self::TITLE.to_string())
    }

    pub fn is_title(&self) -> bool {
        self.0 == Self::TITLE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn steps(&self) -> Option<Vec<Step<'_>>> {
        self.0
            .strip_prefix('/')?
            .split('/')
            .map(Step::parse)
            .collect()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step<'a> {
    Element(&'a str, usize),
    Text(usize),
}

impl<'a> Step<'a> {
    fn parse(step: &'a str) -> Option<Self> {
        let (name, rest) = step.split_once('[')?;
        let position: usize = rest.strip_suffix(']')?.parse().ok()?;
        if position == 0 {
            return None;
        }
        match name {
            "text()" => Some(Step::Text(position)),
            "" => None,
            tag => Some(Step::Element(tag, position)),
        }
    }
}

/// A mutable markup document.
///
/// Nodes are reference counted: text merged away and unwrapped markers are
/// freed as soon as no [`NodeId`] refers to them.
pub struct Document {
    /// Keeps the parsed tree alive; `root` is its body.
    _tree: NodeRef,
    root: NodeId,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("markup", &self.to_markup())
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::parse("")
    }

    /// Parse a markup string as the body of an HTML document.
    ///
    /// Parsing never fails; malformed input is recovered the way a browser
    /// would recover it.
    pub fn parse(markup: &str) -> Self {
        let tree = kuchikikiki::parse_html().one(markup);
        let root = match tree.select_first("body") {
            Ok(body) => body.as_node().clone(),
            Err(()) => {
                log::warn!("Parsed document has no body; using the document node");
                tree.clone()
            }
        };
        Self {
            _tree: tree,
            root: NodeId(root),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root.clone()
    }

    pub fn parent(&self, id: &NodeId) -> Option<NodeId> {
        id.0.parent().map(NodeId)
    }

    pub fn children(&self, id: &NodeId) -> Vec<NodeId> {
        id.0.children().map(NodeId).collect()
    }

    /// Lower-case local name of an element.
    pub fn tag(&self, id: &NodeId) -> Option<String> {
        id.0.as_element().map(|e| e.name.local.to_string())
    }

    pub fn attr(&self, id: &NodeId, name: &str) -> Option<String> {
        let element = id.0.as_element()?;
        let attributes = element.attributes.borrow();
        attributes.get(name).map(str::to_string)
    }

    /// Attributes of an element, sorted by name.
    pub fn attrs(&self, id: &NodeId) -> Vec<(String, String)> {
        match id.0.as_element() {
            Some(element) => element
                .attributes
                .borrow()
                .map
                .iter()
                .map(|(name, attr)| (name.local.to_string(), attr.value.clone()))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn has_class(&self, id: &NodeId, class: &str) -> bool {
        self.attr(id, "class")
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn is_text(&self, id: &NodeId) -> bool {
        id.0.as_text().is_some()
    }

    pub fn text(&self, id: &NodeId) -> Option<String> {
        id.0.as_text().map(|t| t.borrow().clone())
    }

    /// Length in chars of a text node.
    pub fn text_len(&self, id: &NodeId) -> Option<usize> {
        id.0.as_text().map(|t| t.borrow().chars().count())
    }

    /// All attached text nodes in document order.
    pub fn text_nodes(&self) -> Vec<NodeId> {
        self.root
            .0
            .descendants()
            .filter(|n| n.as_text().is_some())
            .map(NodeId)
            .collect()
    }

    /// Concatenated text of the whole document.
    pub fn text_content(&self) -> String {
        self.root.0.text_contents()
    }

    /// Serialize the body back to markup.
    pub fn to_markup(&self) -> String {
        self.root.0.children().map(|child| child.to_string()).collect()
    }

    /// Append a new element under `parent`. Returns `None` for a tag name
    /// that cannot be created.
    pub fn append_element(
        &mut self,
        parent: &NodeId,
        tag: &str,
        attrs: &[(&str, &str)],
    ) -> Option<NodeId> {
        let element = new_element(tag)?;
        if let Some(data) = element.as_element() {
            let mut attributes = data.attributes.borrow_mut();
            for (name, value) in attrs {
                attributes.insert(*name, value.to_string());
            }
        }
        parent.0.append(element.clone());
        Some(NodeId(element))
    }

    /// Append text under `parent`, extending the last child if it is
    /// already a text node.
    pub fn append_text(&mut self, parent: &NodeId, text: &str) -> Option<NodeId> {
        if text.is_empty() {
            return None;
        }
        if let Some(last) = parent.0.last_child() {
            if let Some(existing) = last.as_text() {
                existing.borrow_mut().push_str(text);
                return Some(NodeId(last));
            }
        }
        let node = NodeRef::new_text(text);
        parent.0.append(node.clone());
        Some(NodeId(node))
    }

    /// Path of an attached text node.
    pub fn path_of(&self, id: &NodeId) -> Option<NodePath> {
        let mut steps = Vec::new();
        let mut current = id.clone();
        while current != self.root {
            let parent = self.parent(&current)?;
            let step = match self.tag(&current) {
                None if self.is_text(&current) => {
                    let position = current
                        .0
                        .preceding_siblings()
                        .filter(|s| s.as_text().is_some())
                        .count();
                    format!("text()[{}]", position + 1)
                }
                None => return None,
                Some(tag) => {
                    let position = current
                        .0
                        .preceding_siblings()
                        .filter(|s| {
                            s.as_element()
                                .map(|e| *e.name.local == *tag)
                                .unwrap_or(false)
                        })
                        .count();
                    format!("{tag}[{}]", position + 1)
                }
            };
            steps.push(step);
            current = parent;
        }
        if steps.is_empty() {
            return None;
        }
        steps.reverse();
        Some(NodePath(format!("/{}", steps.join("/"))))
    }

    /// Find the text node a path points at in the current tree.
    ///
    /// Returns `None` when the document has changed shape since the path was
    /// recorded.
    pub fn resolve(&self, path: &NodePath) -> Option<NodeId> {
        if path.is_title() {
            return self.resolve_title();
        }
        let mut current = self.root.0.clone();
        for step in path.steps()? {
            current = match step {
                Step::Text(position) => current
                    .children()
                    .filter(|c| c.as_text().is_some())
                    .nth(position - 1)?,
                Step::Element(tag, position) => current
                    .children()
                    .filter(|c| c.as_element().map(|e| &*e.name.local == tag).unwrap_or(false))
                    .nth(position - 1)?,
            };
        }
        if current.as_text().is_some() { Some(NodeId(current)) } else { None }
    }

    /// First text under `id="title"`, else under the first `h1`.
    fn resolve_title(&self) -> Option<NodeId> {
        let element = self
            .root
            .0
            .select_first("#title")
            .or_else(|_| self.root.0.select_first("h1"))
            .ok()?;
        let node = element.as_node().clone();
        let text = node.descendants().find(|n| n.as_text().is_some())?;
        Some(NodeId(text))
    }

    /// Split a text node at a char offset.
    ///
    /// The original node keeps `[..at]`; a new sibling inserted right after
    /// it receives `[at..]` and is returned. Nothing happens (and `None` is
    /// returned) when `at` would leave either side empty.
    pub fn split_text(&mut self, id: &NodeId, at: usize) -> Option<NodeId> {
        id.0.parent()?;
        let cell = id.0.as_text()?;
        if at == 0 {
            return None;
        }
        let tail = {
            let mut text = cell.borrow_mut();
            let byte = text.char_indices().nth(at).map(|(b, _)| b)?;
            text.split_off(byte)
        };
        let node = NodeRef::new_text(tail);
        id.0.insert_after(node.clone());
        Some(NodeId(node))
    }

    /// Append the text of `from` to `into` and detach `from`.
    pub fn merge_text(&mut self, into: &NodeId, from: &NodeId) -> bool {
        if into == from {
            return false;
        }
        let (Some(target), Some(source)) = (into.0.as_text(), from.0.as_text()) else {
            return false;
        };
        target.borrow_mut().push_str(&source.borrow());
        from.0.detach();
        true
    }

    /// Replace `id` in its parent by a new `tag` element with `class` that
    /// holds it.
    pub fn wrap(&mut self, id: &NodeId, tag: &str, class: &str) -> Option<NodeId> {
        id.0.parent()?;
        let wrapper = new_element(tag)?;
        if let Some(data) = wrapper.as_element() {
            data.attributes
                .borrow_mut()
                .insert("class", class.to_string());
        }
        id.0.insert_before(wrapper.clone());
        wrapper.append(id.0.clone());
        Some(NodeId(wrapper))
    }

    /// Replace an element by its children.
    pub fn unwrap(&mut self, wrapper: &NodeId) -> bool {
        if wrapper.0.parent().is_none() || wrapper.0.as_element().is_none() {
            return false;
        }
        let children: Vec<NodeRef> = wrapper.0.children().collect();
        for child in children {
            wrapper.0.insert_before(child);
        }
        wrapper.0.detach();
        true
    }
}

/// Create a detached, attribute-less element.
fn new_element(tag: &str) -> Option<NodeRef> {
    let valid = !tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !valid {
        log::debug!("Refusing to create element {tag:?}");
        return None;
    }
    let tag = tag.to_ascii_lowercase();
    let scratch = kuchikikiki::parse_html().one(format!("<{tag}></{tag}>"));
    let element = scratch
        .descendants()
        .find(|n| n.as_element().map(|e| *e.name.local == *tag).unwrap_or(false))?;
    element.detach();
    Some(element)
}
