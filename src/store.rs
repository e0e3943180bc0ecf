use std::collections::HashMap;

use crate::pipeline::Segment;

/// Persistence for segmentation results.
///
/// Whole documents are keyed by revision and single segments by
/// `(revision, hash)`. Implementations live with the host;
/// [`MemorySegmentStore`] is enough for a single process.
pub trait SegmentStore {
    /// Every segment of a revision, in reading order.
    fn get(&self, revision: &str) -> Option<Vec<Segment>>;

    /// Store the segments of a revision. Each one must also become
    /// reachable through [`SegmentStore::get_segment`].
    fn put(&mut self, revision: &str, segments: Vec<Segment>);

    /// Look up one segment by `(revision, hash)`.
    fn get_segment(&self, revision: &str, hash: &str) -> Option<Segment>;

    /// Store one segment under `(revision, segment.hash)`, replacing any
    /// segment already there.
    fn put_segment(&mut self, revision: &str, segment: Segment);
}

type SegmentKey = (String, String);

/// In-process [`SegmentStore`] backed by two hash maps.
#[derive(Debug, Default)]
pub struct MemorySegmentStore {
    documents: HashMap<String, Vec<Segment>>,
    segments: HashMap<SegmentKey, Segment>,
}

impl MemorySegmentStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of segments reachable by `(revision, hash)`.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether nothing has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.segments.is_empty()
    }

    fn key(revision: &str, hash: &str) -> SegmentKey {
        (revision.to_string(), hash.to_string())
    }
}

impl SegmentStore for MemorySegmentStore {
    fn get(&self, revision: &str) -> Option<Vec<Segment>> {
        self.documents.get(revision).cloned()
    }

    fn put(&mut self, revision: &str, segments: Vec<Segment>) {
        for segment in &segments {
            // A title repeats its heading's text; the first one keeps the slot.
            self.segments
                .entry(Self::key(revision, &segment.hash))
                .or_insert_with(|| segment.clone());
        }
        self.documents.insert(revision.to_string(), segments);
    }

    fn get_segment(&self, revision: &str, hash: &str) -> Option<Segment> {
        self.segments.get(&Self::key(revision, hash)).cloned()
    }

    fn put_segment(&mut self, revision: &str, segment: Segment) {
        log::debug!("Storing segment {} for revision {revision}", segment.hash);
        self.segments.insert(Self::key(revision, &segment.hash), segment);
    }
}
