use std::time::Duration;

use crate::client::aligner::{Token, TokenAligner};
use crate::client::highlighter::{HighlightHandle, Highlighter};
use crate::dom::Document;
use crate::error::ReaderError;
use crate::pipeline::Segment;
use crate::SynthesisResponse;

/// Which highlights are currently applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    SentenceHighlighted,
    WordHighlighted,
}

/// Synthesis state of one utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UtteranceStatus {
    /// Waiting for the synthesizer.
    Pending,
    Ready,
    /// Audio is usable but the tokens could not be aligned.
    Unsynchronized(String),
}

/// A segment as played: its aligned tokens once synthesis has answered.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub segment: Segment,
    pub tokens: Option<Vec<Token>>,
    pub status: UtteranceStatus,
}

/// A one-shot "advance to the next token" task for the host to run after
/// `delay`, then hand back to [`Player::fire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledAdvance {
    pub generation: u64,
    pub utterance: usize,
    pub token: usize,
    pub delay: Duration,
}

/// Drives sentence and word highlighting from playback events.
///
/// Seeking, pausing and rate changes bump a generation counter; a
/// [`ScheduledAdvance`] from an older generation is ignored when fired.
#[derive(Debug)]
pub struct Player {
    highlighter: Highlighter,
    aligner: TokenAligner,
    utterances: Vec<Utterance>,
    current: Option<usize>,
    token: Option<usize>,
    generation: u64,
    rate: f64,
    paused: bool,
    position_ms: u64,
    sentence: Option<HighlightHandle>,
    word: Option<HighlightHandle>,
}

impl Player {
    /// One pending utterance per segment, in order, with nothing playing.
    pub fn new(segments: Vec<Segment>, highlighter: Highlighter, aligner: TokenAligner) -> Self {
        let utterances = segments
            .into_iter()
            .map(|segment| Utterance {
                segment,
                tokens: None,
                status: UtteranceStatus::Pending,
            })
            .collect();
        Self {
            highlighter,
            aligner,
            utterances,
            current: None,
            token: None,
            generation: 0,
            rate: 1.0,
            paused: false,
            position_ms: 0,
            sentence: None,
            word: None,
        }
    }

    /// Derived from which highlights are live.
    pub fn state(&self) -> PlaybackState {
        match (&self.sentence, &self.word) {
            (_, Some(_)) => PlaybackState::WordHighlighted,
            (Some(_), None) => PlaybackState::SentenceHighlighted,
            (None, None) => PlaybackState::Idle,
        }
    }

    /// Counter that invalidates every [`ScheduledAdvance`] issued before
    /// the last seek, pause, rate change or stop.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Index of the utterance being played, if any.
    pub fn current_utterance(&self) -> Option<usize> {
        self.current
    }

    /// Index of the highlighted token within the current utterance.
    pub fn current_token(&self) -> Option<usize> {
        self.token
    }

    /// Playback rate multiplier, `1.0` by default.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// The utterance at `index` with its tokens and status.
    pub fn utterance(&self, index: usize) -> Option<&Utterance> {
        self.utterances.get(index)
    }

    /// Number of utterances.
    pub fn len(&self) -> usize {
        self.utterances.len()
    }

    /// Whether the document produced no utterances at all.
    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }

    /// Store the synthesizer's answer for an utterance.
    ///
    /// Responses may arrive for utterances other than the current one
    /// (prefetching, or the listener moved on); those are stored but never
    /// touch the highlight state. A token stream that cannot be aligned
    /// leaves the utterance playable without word highlighting.
    pub fn receive_synthesis(
        &mut self,
        doc: &mut Document,
        index: usize,
        response: &SynthesisResponse,
    ) -> Option<ScheduledAdvance> {
        let utterance = self.utterances.get_mut(index)?;
        match self
            .aligner
            .align(&utterance.segment, &response.timed_tokens())
        {
            Ok(tokens) => {
                utterance.tokens = Some(tokens);
                utterance.status = UtteranceStatus::Ready;
            }
            Err(err) => {
                let err = ReaderError::from(err);
                log::warn!("{}: {err}", err.user_message());
                utterance.tokens = None;
                utterance.status = UtteranceStatus::Unsynchronized(err.to_string());
            }
        }

        if self.current != Some(index) || self.sentence.is_none() || self.word.is_some() {
            return None;
        }
        self.highlight_token_at(doc, self.position_ms)
    }

    /// Start playing an utterance from its beginning.
    ///
    /// An index past the last utterance is ignored and leaves the current
    /// playback as it was.
    pub fn play(&mut self, doc: &mut Document, index: usize) -> Option<ScheduledAdvance> {
        if index >= self.utterances.len() {
            log::warn!("Cannot play utterance {index} of {}", self.utterances.len());
            return None;
        }
        self.clear_highlights(doc);
        self.generation += 1;
        let utterance = &self.utterances[index];
        self.current = Some(index);
        self.position_ms = 0;
        self.paused = false;
        self.sentence = Some(self.highlighter.highlight_segment(doc, &utterance.segment));
        self.highlight_token_at(doc, 0)
    }

    /// Handle a scheduled advance. Stale tasks are ignored.
    pub fn fire(
        &mut self,
        doc: &mut Document,
        advance: ScheduledAdvance,
    ) -> Option<ScheduledAdvance> {
        if advance.generation != self.generation
            || self.current != Some(advance.utterance)
            || self.token != Some(advance.token)
            || self.paused
        {
            log::debug!("Dropping stale advance for token {}", advance.token);
            return None;
        }
        let end_time = self
            .current_tokens()?
            .get(advance.token)
            .map(|t| t.end_time)?;
        self.position_ms = end_time;
        self.highlight_token_at(doc, end_time)
    }

    /// Jump to a position within the current utterance.
    pub fn seek(&mut self, doc: &mut Document, position_ms: u64) -> Option<ScheduledAdvance> {
        self.generation += 1;
        self.position_ms = position_ms;
        if self.sentence.is_none() {
            return None;
        }
        self.highlight_token_at(doc, position_ms)
    }

    /// Audio clock update. Only acts when the position has left the
    /// highlighted token.
    pub fn time_update(
        &mut self,
        doc: &mut Document,
        position_ms: u64,
    ) -> Option<ScheduledAdvance> {
        let inside = self
            .token
            .and_then(|i| self.current_tokens()?.get(i))
            .map(|t| t.start_time <= position_ms && position_ms < t.end_time)
            .unwrap_or(false);
        if inside {
            self.position_ms = position_ms;
            return None;
        }
        self.seek(doc, position_ms)
    }

    /// Cancel the scheduled advance and keep the highlights in place.
    pub fn pause(&mut self, position_ms: u64) {
        self.generation += 1;
        self.paused = true;
        self.position_ms = position_ms;
    }

    /// Continue from `position_ms`, rescheduling from there.
    pub fn resume(&mut self, doc: &mut Document, position_ms: u64) -> Option<ScheduledAdvance> {
        self.paused = false;
        self.seek(doc, position_ms)
    }

    /// Change the playback rate multiplier and reschedule.
    pub fn set_rate(
        &mut self,
        doc: &mut Document,
        rate: f64,
        position_ms: u64,
    ) -> Option<ScheduledAdvance> {
        if !rate.is_finite() || rate <= 0.0 {
            log::warn!("Ignoring playback rate {rate}");
            return None;
        }
        self.rate = rate;
        if self.paused {
            self.generation += 1;
            self.position_ms = position_ms;
            return None;
        }
        self.seek(doc, position_ms)
    }

    /// The current utterance's audio finished. Returns the next utterance
    /// to play, if any.
    pub fn ended(&mut self, doc: &mut Document) -> Option<usize> {
        self.generation += 1;
        self.clear_highlights(doc);
        let next = self.current.map(|i| i + 1).filter(|&i| i < self.utterances.len());
        self.current = None;
        next
    }

    /// Remove every highlight and forget the current utterance.
    pub fn stop(&mut self, doc: &mut Document) {
        self.generation += 1;
        self.clear_highlights(doc);
        self.current = None;
        self.position_ms = 0;
        self.paused = false;
    }

    fn current_tokens(&self) -> Option<&[Token]> {
        let index = self.current?;
        self.utterances.get(index)?.tokens.as_deref()
    }

    /// Tear down the word highlight and apply it to the token playing at
    /// `position_ms`.
    fn highlight_token_at(
        &mut self,
        doc: &mut Document,
        position_ms: u64,
    ) -> Option<ScheduledAdvance> {
        if let Some(word) = self.word.take() {
            self.highlighter.remove_highlight(doc, word);
        }
        self.token = None;

        let index = self.current?;
        let utterance = self.utterances.get(index)?;
        let sentence = self.sentence.as_ref()?;
        let tokens = utterance.tokens.as_deref()?;
        let (token_index, token) = tokens
            .iter()
            .enumerate()
            .find(|(_, t)| !t.is_silent() && t.end_time > position_ms)?;

        self.word = Some(self.highlighter.highlight_token_within(
            doc,
            &utterance.segment,
            sentence,
            token,
        ));
        self.token = Some(token_index);

        if self.paused {
            return None;
        }
        let remaining = token.end_time.saturating_sub(position_ms);
        let micros = (remaining as f64 * 1000.0 / self.rate).round() as u64;
        Some(ScheduledAdvance {
            generation: self.generation,
            utterance: index,
            token: token_index,
            delay: Duration::from_micros(micros),
        })
    }

    fn clear_highlights(&mut self, doc: &mut Document) {
        if let Some(word) = self.word.take() {
            self.highlighter.remove_highlight(doc, word);
        }
        if let Some(sentence) = self.sentence.take() {
            self.highlighter.remove_highlight(doc, sentence);
        }
        self.token = None;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{PlaybackState, Player, UtteranceStatus};
    use crate::client::aligner::TokenAligner;
    use crate::client::highlighter::Highlighter;
    use crate::dom::Document;
    use crate::pipeline::{BreakingTags, RemoveRules, SegmentPipeline};
    use crate::{SynthesisResponse, SynthesisToken};

    const SOURCE: &str = "<p>Hello big world. Bye now.</p>";

    fn setup() -> (Document, Player) {
        let doc = Document::parse(SOURCE);
        let segments = SegmentPipeline::new(RemoveRules::new(), BreakingTags::default())
            .segment_document(&doc, None);
        let player = Player::new(segments, Highlighter::default(), TokenAligner::default());
        (doc, player)
    }

    fn response(tokens: &[(&str, f64)]) -> SynthesisResponse {
        SynthesisResponse {
            tokens: tokens
                .iter()
                .map(|(orth, endtime)| SynthesisToken {
                    orth: orth.to_string(),
                    endtime: *endtime,
                })
                .collect(),
            samples: Vec::new(),
            sample_rate: 16000,
        }
    }

    fn first_response() -> SynthesisResponse {
        response(&[("Hello", 0.4), ("", 0.5), ("big", 0.8), ("world", 1.2), (".", 1.2)])
    }

    fn highlighted_word(doc: &Document) -> String {
        let markup = doc.to_markup();
        let open = "<span class=\"highlight-word\">";
        markup
            .find(open)
            .map(|start| {
                let rest = &markup[start + open.len()..];
                rest[..rest.find("</span>").unwrap_or(0)].to_string()
            })
            .unwrap_or_default()
    }

    #[test]
    fn walks_tokens_skipping_silence() {
        let (mut doc, mut player) = setup();
        assert_eq!(player.play(&mut doc, 0), None);
        assert_eq!(player.state(), PlaybackState::SentenceHighlighted);

        let advance = player
            .receive_synthesis(&mut doc, 0, &first_response())
            .expect("word highlight scheduled");
        assert_eq!(player.state(), PlaybackState::WordHighlighted);
        assert_eq!(highlighted_word(&doc), "Hello");
        assert_eq!(advance.delay, Duration::from_millis(400));

        let advance = player.fire(&mut doc, advance).expect("next token");
        assert_eq!(highlighted_word(&doc), "big");
        assert_eq!(advance.token, 2);
        assert_eq!(advance.delay, Duration::from_millis(400));

        let advance = player.fire(&mut doc, advance).expect("next token");
        assert_eq!(highlighted_word(&doc), "world");

        assert_eq!(player.fire(&mut doc, advance), None);
        assert_eq!(player.state(), PlaybackState::SentenceHighlighted);

        assert_eq!(player.ended(&mut doc), Some(1));
        assert_eq!(player.state(), PlaybackState::Idle);
        assert_eq!(doc.to_markup(), SOURCE);
    }

    #[test]
    fn stale_advance_after_seek_is_ignored() {
        let (mut doc, mut player) = setup();
        player.receive_synthesis(&mut doc, 0, &first_response());
        let stale = player.play(&mut doc, 0).expect("tokens ready");

        let fresh = player.seek(&mut doc, 900).expect("rescheduled");
        assert_eq!(highlighted_word(&doc), "world");
        assert_eq!(fresh.delay, Duration::from_millis(300));

        assert_eq!(player.fire(&mut doc, stale), None);
        assert_eq!(highlighted_word(&doc), "world");
        assert_eq!(player.current_token(), Some(3));
    }

    #[test]
    fn rate_change_rescales_the_remaining_time() {
        let (mut doc, mut player) = setup();
        player.receive_synthesis(&mut doc, 0, &first_response());
        let before = player.play(&mut doc, 0).expect("tokens ready");

        let after = player
            .set_rate(&mut doc, 2.0, 100)
            .expect("rescheduled");
        assert!(after.generation > before.generation);
        assert_eq!(after.delay, Duration::from_millis(150));
        assert_eq!(player.set_rate(&mut doc, 0.0, 100), None);
        assert_eq!(player.rate(), 2.0);
    }

    #[test]
    fn pause_cancels_and_resume_reschedules() {
        let (mut doc, mut player) = setup();
        player.receive_synthesis(&mut doc, 0, &first_response());
        let pending = player.play(&mut doc, 0).expect("tokens ready");

        player.pause(200);
        assert_eq!(player.fire(&mut doc, pending), None);
        assert_eq!(highlighted_word(&doc), "Hello");

        let resumed = player.resume(&mut doc, 200).expect("rescheduled");
        assert_eq!(resumed.delay, Duration::from_millis(200));
    }

    #[test]
    fn time_update_only_moves_when_outside_the_token() {
        let (mut doc, mut player) = setup();
        player.receive_synthesis(&mut doc, 0, &first_response());
        let generation = player.play(&mut doc, 0).expect("tokens ready").generation;

        assert_eq!(player.time_update(&mut doc, 300), None);
        assert_eq!(player.generation(), generation);

        let moved = player.time_update(&mut doc, 1000).expect("moved on");
        assert_eq!(highlighted_word(&doc), "world");
        assert!(moved.generation > generation);
    }

    #[test]
    fn prefetched_response_does_not_touch_current_highlight() {
        let (mut doc, mut player) = setup();
        player.receive_synthesis(&mut doc, 0, &first_response());
        player.play(&mut doc, 0);
        let markup = doc.to_markup();

        let scheduled = player.receive_synthesis(
            &mut doc,
            1,
            &response(&[("Bye", 0.3), ("now", 0.6), (".", 0.6)]),
        );
        assert_eq!(scheduled, None);
        assert_eq!(doc.to_markup(), markup);
        assert_eq!(player.utterance(1).map(|u| &u.status), Some(&UtteranceStatus::Ready));
    }

    #[test]
    fn misaligned_tokens_leave_sentence_only_playback() {
        let (mut doc, mut player) = setup();
        player.play(&mut doc, 0);
        let scheduled =
            player.receive_synthesis(&mut doc, 0, &response(&[("Hello", 0.4), ("planet", 0.9)]));
        assert_eq!(scheduled, None);
        assert_eq!(player.state(), PlaybackState::SentenceHighlighted);
        assert!(matches!(
            player.utterance(0).map(|u| &u.status),
            Some(UtteranceStatus::Unsynchronized(_))
        ));
    }

    #[test]
    fn out_of_range_play_keeps_the_current_utterance() {
        let (mut doc, mut player) = setup();
        player.receive_synthesis(&mut doc, 0, &first_response());
        let pending = player.play(&mut doc, 0).expect("tokens ready");
        let highlighted = doc.to_markup();

        assert_eq!(player.play(&mut doc, 9), None);
        assert_eq!(player.current_utterance(), Some(0));
        assert_eq!(player.state(), PlaybackState::WordHighlighted);
        assert_eq!(player.generation(), pending.generation);
        assert_eq!(doc.to_markup(), highlighted);

        let next = player.fire(&mut doc, pending).expect("still scheduled");
        assert_eq!(highlighted_word(&doc), "big");
        assert_eq!(next.utterance, 0);
        assert_eq!(player.ended(&mut doc), Some(1));
        assert_eq!(player.play(&mut doc, 2), None);
        assert_eq!(player.current_utterance(), None);
        assert_eq!(player.ended(&mut doc), None);
        assert_eq!(doc.to_markup(), SOURCE);
    }

    #[test]
    fn stop_restores_the_document() {
        let (mut doc, mut player) = setup();
        player.receive_synthesis(&mut doc, 0, &first_response());
        player.play(&mut doc, 0);
        player.stop(&mut doc);
        assert_eq!(player.state(), PlaybackState::Idle);
        assert_eq!(player.current_utterance(), None);
        assert_eq!(doc.to_markup(), SOURCE);
    }
}
