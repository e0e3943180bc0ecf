use serde::{Deserialize, Serialize};

use crate::config::ReaderConfig;
use crate::error::AlignmentError;
use crate::pipeline::Segment;
use crate::TimedToken;

/// One synthesizer word aligned back onto a segment's content items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub string: String,
    /// Milliseconds from the start of the segment audio.
    pub start_time: u64,
    pub end_time: u64,
    /// Indices into [`Segment::content`] of the items the token covers.
    pub items: Vec<usize>,
    /// Char offset of the first character within the first item's node.
    pub start_offset: usize,
    /// Char offset of the last character within the last item's node.
    pub end_offset: usize,
}

impl Token {
    /// Silent tokens are kept in order but skipped during navigation.
    pub fn is_silent(&self) -> bool {
        self.start_time == self.end_time || self.string.is_empty()
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_time.saturating_sub(self.start_time)
    }
}

/// Characters treated as a plain space when matching tokens to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhitespaceEquivalence(Vec<char>);

impl Default for WhitespaceEquivalence {
    fn default() -> Self {
        Self(vec!['\u{a0}'])
    }
}

impl WhitespaceEquivalence {
    pub fn new(chars: impl Into<Vec<char>>) -> Self {
        Self(chars.into())
    }

    fn normalize(&self, ch: char) -> char {
        if self.0.contains(&ch) {
            ' '
        } else {
            ch
        }
    }
}

/// Maps synthesizer tokens onto segment content.
#[derive(Debug, Clone, Default)]
pub struct TokenAligner {
    equivalence: WhitespaceEquivalence,
}

impl TokenAligner {
    pub fn new(equivalence: WhitespaceEquivalence) -> Self {
        Self { equivalence }
    }

    pub fn from_config(config: &ReaderConfig) -> Self {
        Self::new(WhitespaceEquivalence::new(
            config.whitespace_equivalents.clone(),
        ))
    }

    /// Align a token stream with the segment it was synthesized from.
    ///
    /// Tokens are searched for in order, never before the end of the
    /// previous match, so repeated words resolve to successive occurrences.
    /// A token that cannot be found is an [`AlignmentError`].
    pub fn align(
        &self,
        segment: &Segment,
        tokens: &[TimedToken],
    ) -> Result<Vec<Token>, AlignmentError> {
        let mut text: Vec<char> = Vec::new();
        let mut item_starts = Vec::with_capacity(segment.content.len());
        for item in &segment.content {
            item_starts.push(text.len());
            text.extend(item.string.chars().map(|c| self.equivalence.normalize(c)));
        }

        let mut aligned = Vec::with_capacity(tokens.len());
        let mut search_offset = 0;
        let mut previous_end = 0;
        for (index, timed) in tokens.iter().enumerate() {
            let start_time = previous_end;
            let end_time = if timed.end_time_ms < start_time {
                log::warn!(
                    "Token {index} of segment {} ends before it starts ({} < {start_time} ms)",
                    segment.hash,
                    timed.end_time_ms
                );
                start_time
            } else {
                timed.end_time_ms
            };
            previous_end = end_time;

            let needle: Vec<char> = timed
                .string
                .chars()
                .map(|c| self.equivalence.normalize(c))
                .collect();
            if needle.is_empty() {
                aligned.push(Token {
                    string: timed.string.clone(),
                    start_time,
                    end_time,
                    items: Vec::new(),
                    start_offset: 0,
                    end_offset: 0,
                });
                continue;
            }

            let match_start =
                find_from(&text, &needle, search_offset).ok_or_else(|| AlignmentError {
                    segment_hash: segment.hash.clone(),
                    token_index: index,
                    token: timed.string.clone(),
                })?;
            let match_end = match_start + needle.len() - 1;
            search_offset = match_end + 1;

            let first = item_at(&item_starts, match_start);
            let last = item_at(&item_starts, match_end);
            let shift = |item: usize| if item == 0 { segment.start_offset } else { 0 };

            aligned.push(Token {
                string: timed.string.clone(),
                start_time,
                end_time,
                items: (first..=last).collect(),
                start_offset: match_start - item_starts[first] + shift(first),
                end_offset: match_end - item_starts[last] + shift(last),
            });
        }

        log::trace!(
            "Aligned {} tokens to segment {}",
            aligned.len(),
            segment.hash
        );
        Ok(aligned)
    }
}

/// Align with the default whitespace equivalence.
pub fn align(segment: &Segment, tokens: &[TimedToken]) -> Result<Vec<Token>, AlignmentError> {
    TokenAligner::default().align(segment, tokens)
}

fn find_from(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&start| haystack[start..].starts_with(needle))
}

/// Index of the item whose span contains `pos`. Items are never empty.
fn item_at(item_starts: &[usize], pos: usize) -> usize {
    item_starts
        .partition_point(|&start| start <= pos)
        .saturating_sub(1)
}
