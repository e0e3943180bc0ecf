use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::dom::{Document, NodeId, NodePath};
use crate::error::ValidationError;

/// A run of characters taken from exactly one source text node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextItem {
    pub string: String,
    /// Locator of the source text node; `None` for synthetic text.
    pub path: Option<NodePath>,
}

impl TextItem {
    pub fn new(string: impl Into<String>, path: Option<NodePath>) -> Self {
        Self {
            string: string.into(),
            path,
        }
    }
}

/// Elements serialized without an end tag.
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

fn is_void_tag(tag: &str) -> bool {
    VOID_TAGS.contains(&tag)
}

/// Literal start tag for an element, e.g. `<p class="x">`.
fn start_tag_literal(tag: &str, attrs: &[(String, String)]) -> String {
    let mut out = format!("<{tag}");
    for (key, value) in attrs {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&quick_xml::escape::escape(value.as_str()));
        out.push('"');
    }
    out.push('>');
    out
}

/// A kept element boundary, carried for re-serialization only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagMarker {
    pub tag: String,
    pub literal: String,
    pub closing: bool,
}

impl TagMarker {
    fn open(tag: &str, attrs: &[(String, String)]) -> Self {
        Self {
            tag: tag.to_string(),
            literal: start_tag_literal(tag, attrs),
            closing: false,
        }
    }

    fn close(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            literal: format!("</{tag}>"),
            closing: true,
        }
    }
}

/// One element of the cleaned stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Item {
    Text(TextItem),
    Tag(TagMarker),
    /// Hard boundary: the segment being built ends here.
    Break,
}

/// How an element with a given tag name is matched for removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveRule {
    /// Remove every element with the tag.
    Always,
    /// Remove only elements carrying at least one of these classes.
    WithClasses(Vec<String>),
}

/// Table of elements whose whole subtree is dropped while cleaning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveRules {
    rules: BTreeMap<String, RemoveRule>,
}

impl RemoveRules {
    /// A table that removes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every `tag` element.
    pub fn always(mut self, tag: &str) -> Self {
        self.rules
            .insert(tag.to_ascii_lowercase(), RemoveRule::Always);
        self
    }

    /// Remove `tag` elements carrying at least one of `classes`.
    pub fn with_classes<I, S>(mut self, tag: &str, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rules.insert(
            tag.to_ascii_lowercase(),
            RemoveRule::WithClasses(classes.into_iter().map(Into::into).collect()),
        );
        self
    }

    /// Validate a JSON rule table.
    ///
    /// Keys are tag names. A value of `true` removes every such element,
    /// `false` disables the rule, a string or a list of strings removes only
    /// elements carrying one of those classes.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ValidationError> {
        let table = value
            .as_object()
            .ok_or_else(|| ValidationError::NotATable(json_type_name(value).to_string()))?;

        let mut rules = BTreeMap::new();
        for (tag, rule) in table {
            let tag = tag.trim().to_ascii_lowercase();
            if tag.is_empty() {
                return Err(ValidationError::EmptyTagName);
            }
            let rule = match rule {
                serde_json::Value::Bool(true) => RemoveRule::Always,
                serde_json::Value::Bool(false) => continue,
                serde_json::Value::String(class) => RemoveRule::WithClasses(vec![class.clone()]),
                serde_json::Value::Array(classes) => {
                    let classes = classes
                        .iter()
                        .map(|class| {
                            class.as_str().map(str::to_string).ok_or_else(|| {
                                ValidationError::InvalidClass {
                                    tag: tag.clone(),
                                    value: class.to_string(),
                                }
                            })
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    RemoveRule::WithClasses(classes)
                }
                _ => return Err(ValidationError::InvalidRule { tag }),
            };
            rules.insert(tag, rule);
        }
        Ok(Self { rules })
    }

    /// Parse and validate a JSON rule table.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| ValidationError::NotATable(format!("unparseable JSON ({e})")))?;
        Self::from_value(&value)
    }

    /// The rule for a lower-case tag name, if any.
    pub fn get(&self, tag: &str) -> Option<&RemoveRule> {
        self.rules.get(tag)
    }

    /// Whether the element `id` is removed by these rules.
    pub fn matches(&self, doc: &Document, id: &NodeId) -> bool {
        let Some(tag) = doc.tag(id) else {
            return false;
        };
        match self.rules.get(&tag) {
            Some(RemoveRule::Always) => true,
            Some(RemoveRule::WithClasses(classes)) => {
                classes.iter().any(|class| doc.has_class(id, class))
            }
            None => false,
        }
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Set of tag names whose boundaries force a new segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakingTags(BTreeSet<String>);

impl BreakingTags {
    /// Validate and lower-case tag names. Blank names and names with
    /// characters outside `[A-Za-z0-9:-]` are rejected.
    pub fn new<I, S>(tags: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for tag in tags {
            let tag = tag.as_ref().trim();
            let valid = !tag.is_empty()
                && tag
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == ':');
            if !valid {
                return Err(ValidationError::InvalidBreakingTag(tag.to_string()));
            }
            set.insert(tag.to_ascii_lowercase());
        }
        Ok(Self(set))
    }

    /// Whether boundaries of `tag` end a segment.
    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }
}

/// Walk the document and emit its text runs and kept tag boundaries.
///
/// Removed elements are skipped together with their subtree. Every source
/// text node becomes its own [`TextItem`], even when neighbouring text
/// would read as one run, so its path stays exact.
pub fn clean(doc: &Document, rules: &RemoveRules) -> Vec<Item> {
    let mut items = Vec::new();
    walk(doc, &doc.root(), rules, &mut items);
    log::debug!("Cleaned document into {} items", items.len());
    items
}

fn walk(doc: &Document, id: &NodeId, rules: &RemoveRules, items: &mut Vec<Item>) {
    for child in doc.children(id) {
        if let Some(text) = doc.text(&child) {
            if text.is_empty() {
                continue;
            }
            match doc.path_of(&child) {
                Some(path) => items.push(Item::Text(TextItem::new(text, Some(path)))),
                None => log::trace!("Skipping detached text node"),
            }
        } else if let Some(tag) = doc.tag(&child) {
            if rules.matches(doc, &child) {
                log::trace!("Removing <{tag}> subtree");
                continue;
            }
            items.push(Item::Tag(TagMarker::open(&tag, &doc.attrs(&child))));
            walk(doc, &child, rules, items);
            if !is_void_tag(&tag) {
                items.push(Item::Tag(TagMarker::close(&tag)));
            }
        }
    }
}

/// Parse and clean a markup string in one step.
pub fn clean_markup(markup: &str, rules: &RemoveRules) -> (Document, Vec<Item>) {
    let doc = Document::parse(markup);
    let items = clean(&doc, rules);
    (doc, items)
}

/// Insert a [`Item::Break`] after every opening and closing marker of a
/// breaking tag.
pub fn insert_segment_breaks(items: Vec<Item>, breaking: &BreakingTags) -> Vec<Item> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let breaks = matches!(&item, Item::Tag(marker) if breaking.contains(&marker.tag));
        out.push(item);
        if breaks {
            out.push(Item::Break);
        }
    }
    out
}

/// Rebuild markup from the cleaned stream: kept tags and escaped text,
/// with removed subtrees gone.
pub fn reserialize(items: &[Item]) -> String {
    let mut out = String::new();
    for item in items {
        match item {
            Item::Text(text) => out.push_str(&quick_xml::escape::escape(text.string.as_str())),
            Item::Tag(marker) => out.push_str(&marker.literal),
            Item::Break => {}
        }
    }
    out
}
