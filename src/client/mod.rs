//! Client-side read-along: mapping synthesizer timings back onto a live
//! [`Document`](crate::dom::Document) and highlighting them as audio plays.

pub mod aligner;
pub mod highlighter;
pub mod playback;

pub use aligner::{align, Token, TokenAligner, WhitespaceEquivalence};
pub use highlighter::{HighlightHandle, Highlighter};
pub use playback::{PlaybackState, Player, ScheduledAdvance, Utterance, UtteranceStatus};
