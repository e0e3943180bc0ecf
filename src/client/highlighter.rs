use crate::client::aligner::Token;
use crate::dom::{Document, NodeId};
use crate::pipeline::{Segment, TextItem};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Split {
    kept: NodeId,
    split_off: NodeId,
}

/// A live highlight region. Pass it back to
/// [`Highlighter::remove_highlight`] to restore the document.
#[must_use = "a highlight stays in the document until it is removed"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightHandle {
    class: String,
    wrappers: Vec<NodeId>,
    splits: Vec<Split>,
    /// Per requested item, the text node now inside its wrapper.
    wrapped: Vec<Option<NodeId>>,
}

impl HighlightHandle {
    fn new(class: &str) -> Self {
        Self {
            class: class.to_string(),
            wrappers: Vec::new(),
            splits: Vec::new(),
            wrapped: Vec::new(),
        }
    }

    /// Class set on every marker of this highlight.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Marker elements inserted into the document.
    pub fn wrappers(&self) -> &[NodeId] {
        &self.wrappers
    }

    /// Whether nothing could be highlighted.
    pub fn is_empty(&self) -> bool {
        self.wrappers.is_empty()
    }
}

/// Wraps text ranges of a live document in marker elements.
#[derive(Debug, Clone)]
pub struct Highlighter {
    marker_tag: String,
    sentence_class: String,
    word_class: String,
}

impl Default for Highlighter {
    fn default() -> Self {
        Self::new("span", "highlight-sentence", "highlight-word")
    }
}

impl Highlighter {
    /// Marker elements are `marker_tag` with one of the two classes.
    pub fn new(marker_tag: &str, sentence_class: &str, word_class: &str) -> Self {
        Self {
            marker_tag: marker_tag.to_string(),
            sentence_class: sentence_class.to_string(),
            word_class: word_class.to_string(),
        }
    }

    pub fn from_config(config: &crate::config::ReaderConfig) -> Self {
        Self::new(
            &config.marker_tag,
            &config.sentence_class,
            &config.word_class,
        )
    }

    /// Highlight `[start_offset, end_offset]` across the nodes of `items`.
    ///
    /// `start_offset` is within the first item's node and `end_offset`
    /// (inclusive) within the last one's; items in between are covered
    /// whole. Each covered text piece gets its own marker element. Items
    /// whose path no longer resolves, or whose node is too short for the
    /// requested range, are skipped.
    pub fn highlight_range<'a, I>(
        &self,
        doc: &mut Document,
        class: &str,
        items: I,
        start_offset: usize,
        end_offset: usize,
    ) -> HighlightHandle
    where
        I: IntoIterator<Item = &'a TextItem>,
    {
        let nodes: Vec<Option<NodeId>> = items
            .into_iter()
            .map(|item| {
                let node = item.path.as_ref().and_then(|path| doc.resolve(path));
                if node.is_none() {
                    log::debug!("Highlight target {:?} no longer resolves", item.path);
                }
                node
            })
            .collect();
        self.highlight_nodes(doc, class, &nodes, start_offset, end_offset)
    }

    /// Highlight a whole segment with the sentence class.
    pub fn highlight_segment(&self, doc: &mut Document, segment: &Segment) -> HighlightHandle {
        self.highlight_range(
            doc,
            &self.sentence_class,
            &segment.content,
            segment.start_offset,
            segment.end_offset,
        )
    }

    /// Highlight a token directly in the unhighlighted document.
    pub fn highlight_token(
        &self,
        doc: &mut Document,
        segment: &Segment,
        token: &Token,
    ) -> HighlightHandle {
        let items = token.items.iter().filter_map(|&i| segment.content.get(i));
        self.highlight_range(
            doc,
            &self.word_class,
            items,
            token.start_offset,
            token.end_offset,
        )
    }

    /// Highlight a token inside an active sentence highlight of `segment`.
    ///
    /// The sentence highlight split the segment's first node at the
    /// segment's start offset, so a token in that item is shifted back by
    /// it before splitting the wrapped node again.
    pub fn highlight_token_within(
        &self,
        doc: &mut Document,
        segment: &Segment,
        sentence: &HighlightHandle,
        token: &Token,
    ) -> HighlightHandle {
        let (Some(&first), Some(&last)) = (token.items.first(), token.items.last()) else {
            return HighlightHandle::new(&self.word_class);
        };
        let shift = |item: usize| if item == 0 { segment.start_offset } else { 0 };
        let (Some(start), Some(end)) = (
            token.start_offset.checked_sub(shift(first)),
            token.end_offset.checked_sub(shift(last)),
        ) else {
            log::debug!("Token {:?} lies before its sentence highlight", token.string);
            return HighlightHandle::new(&self.word_class);
        };
        let nodes: Vec<Option<NodeId>> = token
            .items
            .iter()
            .map(|&i| sentence.wrapped.get(i).cloned().flatten())
            .collect();
        self.highlight_nodes(doc, &self.word_class, &nodes, start, end)
    }

    fn highlight_nodes(
        &self,
        doc: &mut Document,
        class: &str,
        nodes: &[Option<NodeId>],
        start_offset: usize,
        end_offset: usize,
    ) -> HighlightHandle {
        let mut handle = HighlightHandle::new(class);
        let count = nodes.len();
        for (index, node) in nodes.iter().enumerate() {
            let target = node.as_ref().and_then(|node| {
                let len = doc.text_len(node)?;
                let from = if index == 0 { start_offset } else { 0 };
                let to = if index + 1 == count {
                    end_offset + 1
                } else {
                    len
                };
                if from >= to || to > len {
                    log::debug!("Range {from}..{to} does not fit a text node of {len} chars");
                    return None;
                }
                self.wrap_range(doc, &mut handle, node, from, to)
            });
            handle.wrapped.push(target);
        }
        handle
    }

    /// Split `node` so that exactly `[from, to)` sits in one node, wrap it.
    fn wrap_range(
        &self,
        doc: &mut Document,
        handle: &mut HighlightHandle,
        node: &NodeId,
        from: usize,
        to: usize,
    ) -> Option<NodeId> {
        let mut target = node.clone();
        if let Some(tail) = doc.split_text(node, from) {
            handle.splits.push(Split {
                kept: node.clone(),
                split_off: tail.clone(),
            });
            target = tail;
        }
        if let Some(rest) = doc.split_text(&target, to - from) {
            handle.splits.push(Split {
                kept: target.clone(),
                split_off: rest,
            });
        }
        let wrapper = doc.wrap(&target, &self.marker_tag, &handle.class)?;
        handle.wrappers.push(wrapper);
        Some(target)
    }

    /// Unwrap the markers of `handle` and merge split text back together.
    ///
    /// Nested highlights must be removed before the one containing them.
    pub fn remove_highlight(&self, doc: &mut Document, handle: HighlightHandle) {
        for wrapper in handle.wrappers.iter().rev() {
            doc.unwrap(wrapper);
        }
        for split in handle.splits.iter().rev() {
            doc.merge_text(&split.kept, &split.split_off);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Highlighter;
    use crate::client::aligner::align;
    use crate::dom::{Document, NodePath};
    use crate::pipeline::{
        segment, segment_with_title, BreakingTags, RemoveRules, SegmentPipeline, TextItem,
    };
    use crate::TimedToken;

    fn snapshot(doc: &Document) -> (usize, String, Vec<String>) {
        let nodes = doc.text_nodes();
        let texts = nodes.iter().filter_map(|id| doc.text(id)).collect();
        (nodes.len(), doc.text_content(), texts)
    }

    fn pipeline() -> SegmentPipeline {
        SegmentPipeline::new(
            RemoveRules::new(),
            BreakingTags::new(["p"]).expect("valid tags"),
        )
    }

    fn timed(words: &[&str]) -> Vec<TimedToken> {
        words
            .iter()
            .enumerate()
            .map(|(i, w)| TimedToken::new(*w, (i as u64 + 1) * 100))
            .collect()
    }

    #[test]
    fn single_node_range_is_split_twice() {
        let mut doc = Document::parse("<p>One two. Three four.</p>");
        let segments = pipeline().segment_document(&doc, None);
        let highlighter = Highlighter::default();

        let handle = highlighter.highlight_segment(&mut doc, &segments[1]);
        assert_eq!(
            doc.to_markup(),
            "<p>One two. <span class=\"highlight-sentence\">Three four.</span></p>"
        );
        highlighter.remove_highlight(&mut doc, handle);
        assert_eq!(doc.to_markup(), "<p>One two. Three four.</p>");
        assert_eq!(doc.text_nodes().len(), 1);
    }

    #[test]
    fn multi_node_range_wraps_each_piece() {
        let source = "<p>Intro. Utterance with divided to<b>k</b>en. Tail</p>";
        let mut doc = Document::parse(source);
        let before = snapshot(&doc);
        let segments = pipeline().segment_document(&doc, None);
        let highlighter = Highlighter::default();

        let handle = highlighter.highlight_segment(&mut doc, &segments[1]);
        assert_eq!(handle.wrappers().len(), 3);
        assert_eq!(
            doc.to_markup(),
            "<p>Intro. <span class=\"highlight-sentence\">Utterance with divided to</span>\
             <b><span class=\"highlight-sentence\">k</span></b>\
             <span class=\"highlight-sentence\">en.</span> Tail</p>"
        );

        highlighter.remove_highlight(&mut doc, handle);
        assert_eq!(snapshot(&doc), before);
        assert_eq!(doc.to_markup(), source);
    }

    #[test]
    fn nested_word_highlight_round_trips() {
        let source = "<p>Intro. Utterance with divided to<b>k</b>en.</p>";
        let mut doc = Document::parse(source);
        let segments = pipeline().segment_document(&doc, None);
        let sentence_segment = &segments[1];
        let tokens = align(
            sentence_segment,
            &timed(&["Utterance", "with", "divided", "token", "."]),
        )
        .expect("aligns");
        let highlighter = Highlighter::default();

        let sentence = highlighter.highlight_segment(&mut doc, sentence_segment);
        let after_sentence = doc.to_markup();

        let word =
            highlighter.highlight_token_within(&mut doc, sentence_segment, &sentence, &tokens[1]);
        assert_eq!(
            doc.to_markup(),
            "<p>Intro. <span class=\"highlight-sentence\">Utterance \
             <span class=\"highlight-word\">with</span> divided to</span>\
             <b><span class=\"highlight-sentence\">k</span></b>\
             <span class=\"highlight-sentence\">en.</span></p>"
        );
        highlighter.remove_highlight(&mut doc, word);
        assert_eq!(doc.to_markup(), after_sentence);

        let word =
            highlighter.highlight_token_within(&mut doc, sentence_segment, &sentence, &tokens[3]);
        assert_eq!(word.wrappers().len(), 3);
        assert_eq!(
            doc.to_markup(),
            "<p>Intro. <span class=\"highlight-sentence\">Utterance with divided \
             <span class=\"highlight-word\">to</span></span>\
             <b><span class=\"highlight-sentence\"><span class=\"highlight-word\">k</span></span></b>\
             <span class=\"highlight-sentence\"><span class=\"highlight-word\">en</span>.</span></p>"
        );
        highlighter.remove_highlight(&mut doc, word);
        highlighter.remove_highlight(&mut doc, sentence);
        assert_eq!(doc.to_markup(), source);
    }

    #[test]
    fn direct_token_highlight_uses_node_offsets() {
        let source = "<p>Intro. Big cats run.</p>";
        let mut doc = Document::parse(source);
        let segments = pipeline().segment_document(&doc, None);
        let tokens = align(&segments[1], &timed(&["Big", "cats", "run", "."])).expect("aligns");
        let highlighter = Highlighter::default();

        let word = highlighter.highlight_token(&mut doc, &segments[1], &tokens[1]);
        assert_eq!(
            doc.to_markup(),
            "<p>Intro. Big <span class=\"highlight-word\">cats</span> run.</p>"
        );
        highlighter.remove_highlight(&mut doc, word);
        assert_eq!(doc.to_markup(), source);
    }

    #[test]
    fn every_segment_round_trips() {
        let source = "<h2>Title here</h2><p>First <i>part</i> one. Second&nbsp;one.\nThird</p>\
                      <ul><li>Item <b>one</b>.</li><li>Item two</li></ul>";
        let mut doc = Document::parse(source);
        let before = snapshot(&doc);
        let markup = doc.to_markup();
        let segments = SegmentPipeline::new(
            RemoveRules::new(),
            BreakingTags::new(["h2", "p", "li"]).expect("valid tags"),
        )
        .segment_document(&doc, None);
        let highlighter = Highlighter::default();

        for segment in &segments {
            let handle = highlighter.highlight_segment(&mut doc, segment);
            assert!(!handle.is_empty(), "segment {:?} highlighted", segment.text());
            highlighter.remove_highlight(&mut doc, handle);
            assert_eq!(snapshot(&doc), before);
            assert_eq!(doc.to_markup(), markup);
        }
    }

    #[test]
    fn removed_highlights_release_their_nodes() {
        let source = "<p>Intro. Utterance with divided to<b>k</b>en.</p>";
        let mut doc = Document::parse(source);
        let segments = pipeline().segment_document(&doc, None);
        let tokens = align(
            &segments[1],
            &timed(&["Utterance", "with", "divided", "token", "."]),
        )
        .expect("aligns");
        let highlighter = Highlighter::default();

        for _ in 0..100 {
            let sentence = highlighter.highlight_segment(&mut doc, &segments[1]);
            for token in &tokens {
                let word =
                    highlighter.highlight_token_within(&mut doc, &segments[1], &sentence, token);
                let released: Vec<_> = word
                    .wrappers
                    .iter()
                    .chain(word.splits.iter().map(|split| &split.split_off))
                    .map(|id| id.downgrade())
                    .collect();
                highlighter.remove_highlight(&mut doc, word);
                assert!(released.iter().all(|weak| weak.upgrade().is_none()));
            }
            highlighter.remove_highlight(&mut doc, sentence);
        }
        assert_eq!(doc.to_markup(), source);
        assert_eq!(doc.text_nodes().len(), 3);
    }

    #[test]
    fn stale_paths_are_skipped() {
        let mut doc = Document::parse("<p>Hello there.</p>");
        let items = vec![
            TextItem::new("gone", Some(NodePath::new("/div[4]/text()[1]"))),
            TextItem::new("Hello there.", Some(NodePath::new("/p[1]/text()[1]"))),
        ];
        let highlighter = Highlighter::default();
        let handle = highlighter.highlight_range(&mut doc, "x", &items, 0, 4);
        assert_eq!(handle.wrappers().len(), 1);
        assert_eq!(doc.to_markup(), "<p><span class=\"x\">Hello</span> there.</p>");
        highlighter.remove_highlight(&mut doc, handle);
        assert_eq!(doc.to_markup(), "<p>Hello there.</p>");
    }

    #[test]
    fn out_of_range_offsets_are_a_no_op() {
        let mut doc = Document::parse("<p>Short.</p>");
        let items = vec![TextItem::new("Short.", Some(NodePath::new("/p[1]/text()[1]")))];
        let highlighter = Highlighter::default();
        let handle = highlighter.highlight_range(&mut doc, "x", &items, 2, 40);
        assert!(handle.is_empty());
        assert_eq!(doc.to_markup(), "<p>Short.</p>");
        highlighter.remove_highlight(&mut doc, handle);
    }

    #[test]
    fn title_segment_highlights_the_heading() {
        let mut doc = Document::parse("<h1>Page name</h1><p>Body.</p>");
        let items = crate::pipeline::clean(&doc, &RemoveRules::new().always("h1"));
        let segments = segment_with_title("Page name", &items);
        let highlighter = Highlighter::default();
        let handle = highlighter.highlight_segment(&mut doc, &segments[0]);
        assert_eq!(
            doc.to_markup(),
            "<h1><span class=\"highlight-sentence\">Page name</span></h1><p>Body.</p>"
        );
        highlighter.remove_highlight(&mut doc, handle);
        assert_eq!(segment(&items).len(), 1);
    }
}
