use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::cleaner::{Item, TextItem};
use crate::dom::NodePath;

/// Joins content strings when hashing a segment.
pub const HASH_SEPARATOR: &str = "\n";

/// A sentence-sized unit of cleaned text; the unit of synthesis and caching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Contributing text runs. Only the first may start mid-node.
    pub content: Vec<TextItem>,
    /// Char offset of the first character within the first item's node.
    pub start_offset: usize,
    /// Char offset of the last character within the last item's node.
    pub end_offset: usize,
    pub hash: String,
}

impl Segment {
    /// The text sent to the synthesizer.
    pub fn text(&self) -> String {
        self.content.iter().map(|item| item.string.as_str()).collect()
    }

    /// Content strings joined by [`HASH_SEPARATOR`].
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|item| item.string.as_str())
            .collect::<Vec<_>>()
            .join(HASH_SEPARATOR)
    }

    pub fn is_title(&self) -> bool {
        self.content
            .first()
            .and_then(|item| item.path.as_ref())
            .map(NodePath::is_title)
            .unwrap_or(false)
    }
}

/// Content-derived cache key. Segments with equal text share a hash.
pub fn content_hash(content: &[TextItem]) -> String {
    let mut hasher = Sha256::new();
    for (idx, item) in content.iter().enumerate() {
        if idx > 0 {
            hasher.update(HASH_SEPARATOR.as_bytes());
        }
        hasher.update(item.string.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Whether the `.` at `idx` ends a sentence.
///
/// It does when it is the last character, when a newline follows, or when a
/// space follows and is itself last or followed by an upper-case letter.
pub fn is_sentence_final(chars: &[char], idx: usize) -> bool {
    if chars.get(idx) != Some(&'.') {
        return false;
    }
    match chars.get(idx + 1) {
        None | Some('\n') => true,
        Some(' ') => match chars.get(idx + 2) {
            None => true,
            Some(next) => next.is_uppercase(),
        },
        _ => false,
    }
}

fn next_sentence_final(chars: &[char], from: usize) -> Option<usize> {
    (from..chars.len()).find(|&idx| is_sentence_final(chars, idx))
}

#[derive(Debug, Default)]
struct SegmentBuilder {
    content: Vec<TextItem>,
    start_offset: usize,
    end_offset: usize,
}

impl SegmentBuilder {
    fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    fn push(&mut self, chars: &[char], path: &Option<NodePath>, node_offset: usize) {
        if chars.is_empty() || chars == ['\n'].as_slice() {
            return;
        }
        if self.content.is_empty() {
            self.start_offset = node_offset;
        }
        self.end_offset = node_offset + chars.len() - 1;
        self.content
            .push(TextItem::new(chars.iter().collect::<String>(), path.clone()));
    }

    fn finish(&mut self) -> Option<Segment> {
        if self.content.is_empty() {
            return None;
        }
        let content = std::mem::take(&mut self.content);
        let hash = content_hash(&content);
        Some(Segment {
            content,
            start_offset: self.start_offset,
            end_offset: self.end_offset,
            hash,
        })
    }
}

/// Partition a cleaned item stream into sentence segments.
///
/// A segment closes at every sentence-final `.` and at every
/// [`Item::Break`]. Leading whitespace of a segment is skipped and not
/// counted in its offsets. Tag markers are ignored.
pub fn segment(items: &[Item]) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current = SegmentBuilder::default();
    for item in items {
        match item {
            Item::Text(text) => segment_text_item(text, &mut current, &mut segments),
            Item::Break => segments.extend(current.finish()),
            Item::Tag(_) => {}
        }
    }
    segments.extend(current.finish());
    log::debug!("Segmented {} items into {} segments", items.len(), segments.len());
    segments
}

/// Like [`segment`], with the document title as a leading segment of its own.
pub fn segment_with_title(title: &str, items: &[Item]) -> Vec<Segment> {
    if title.trim().is_empty() {
        return segment(items);
    }
    let mut with_title = Vec::with_capacity(items.len() + 2);
    with_title.push(Item::Text(TextItem::new(title, Some(NodePath::title()))));
    with_title.push(Item::Break);
    with_title.extend_from_slice(items);
    segment(&with_title)
}

fn segment_text_item(item: &TextItem, current: &mut SegmentBuilder, segments: &mut Vec<Segment>) {
    let chars: Vec<char> = item.string.chars().collect();
    let mut cursor = 0;
    while cursor < chars.len() {
        if current.is_empty() {
            while cursor < chars.len() && chars[cursor].is_whitespace() {
                cursor += 1;
            }
            if cursor == chars.len() {
                break;
            }
        }
        match next_sentence_final(&chars, cursor) {
            Some(end) => {
                current.push(&chars[cursor..=end], &item.path, cursor);
                segments.extend(current.finish());
                cursor = end + 1;
            }
            None => {
                current.push(&chars[cursor..], &item.path, cursor);
                break;
            }
        }
    }
}
