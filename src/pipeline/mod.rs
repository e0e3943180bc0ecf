//! Server-side preparation of a document for speech.
//!
//! Both stages are pure functions over text:
//!
//! 1. [`cleaner`] walks the markup tree, drops configured subtrees and emits
//!    text runs tagged with the path of their source text node.
//! 2. [`segmenter`] cuts that stream into sentence [`Segment`]s carrying
//!    node offsets and a content hash.
//!
//! [`SegmentPipeline`] wires both to a validated [`ReaderConfig`] and to an
//! optional [`SegmentStore`].
//!
//! # Examples
//!
//! ```rust
//! use tts_highlight::config::ReaderConfig;
//! use tts_highlight::pipeline::SegmentPipeline;
//!
//! let pipeline = SegmentPipeline::from_config(&ReaderConfig::default())?;
//! let (_doc, segments) = pipeline.segment_markup(
//!     "<p>It was 6 p.m. and late. <b>Dylan</b> sat.</p><table><tr><td>skip</td></tr></table>",
//!     Some("Evening"),
//! );
//! let texts: Vec<String> = segments.iter().map(|s| s.text()).collect();
//! assert_eq!(texts, vec!["Evening", "It was 6 p.m. and late.", "Dylan sat."]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cleaner;
pub mod segmenter;

pub use cleaner::{
    clean, clean_markup, insert_segment_breaks, reserialize, BreakingTags, Item, RemoveRule,
    RemoveRules, TagMarker, TextItem,
};
pub use segmenter::{content_hash, segment, segment_with_title, Segment, HASH_SEPARATOR};

use crate::config::ReaderConfig;
use crate::dom::Document;
use crate::error::ValidationError;
use crate::store::SegmentStore;

/// Validated cleaning and segmentation settings.
#[derive(Debug, Clone)]
pub struct SegmentPipeline {
    rules: RemoveRules,
    breaking: BreakingTags,
}

impl SegmentPipeline {
    /// Combine already validated removal rules and breaking tags.
    pub fn new(rules: RemoveRules, breaking: BreakingTags) -> Self {
        Self { rules, breaking }
    }

    /// Validate the rule table and breaking tags of a config.
    pub fn from_config(config: &ReaderConfig) -> Result<Self, ValidationError> {
        let rules = RemoveRules::from_value(&config.remove_tags)?;
        let breaking = BreakingTags::new(&config.segment_breaking_tags)?;
        Ok(Self { rules, breaking })
    }

    /// Cleaned item stream with segment breaks inserted.
    pub fn items(&self, doc: &Document) -> Vec<Item> {
        insert_segment_breaks(clean(doc, &self.rules), &self.breaking)
    }

    /// Clean `doc` and cut it into sentences. A non-blank `title` becomes a
    /// leading segment that highlights the document heading.
    pub fn segment_document(&self, doc: &Document, title: Option<&str>) -> Vec<Segment> {
        let items = self.items(doc);
        match title {
            Some(title) => segment_with_title(title, &items),
            None => segment(&items),
        }
    }

    /// Parse `markup` and segment it. The parsed document is returned
    /// because segment paths only resolve against it.
    pub fn segment_markup(&self, markup: &str, title: Option<&str>) -> (Document, Vec<Segment>) {
        let doc = Document::parse(markup);
        let segments = self.segment_document(&doc, title);
        (doc, segments)
    }

    /// Segments for a revision, computed only when the store has none.
    pub fn segments_for<S: SegmentStore + ?Sized>(
        &self,
        store: &mut S,
        revision: &str,
        doc: &Document,
        title: Option<&str>,
    ) -> Vec<Segment> {
        if let Some(segments) = store.get(revision) {
            log::debug!("Segment cache hit for revision {revision}");
            return segments;
        }
        let segments = self.segment_document(doc, title);
        log::info!(
            "Segmented revision {revision} into {} segments",
            segments.len()
        );
        store.put(revision, segments.clone());
        segments
    }
}
