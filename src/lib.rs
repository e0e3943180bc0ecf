//! # tts-highlight
//!
//! Read-along speech for marked-up documents: sentences are cut from the
//! cleaned text of a document, sent to a speech synthesizer, and the
//! synthesizer's word timings are mapped back onto the exact text nodes so
//! each word can be highlighted while it plays.
//!
//! ## Pipeline
//!
//! - [`pipeline::cleaner`]: markup tree to text runs tagged with node paths
//! - [`pipeline::segmenter`]: text runs to hashed sentence [`Segment`]s
//! - [`client::aligner`]: synthesizer tokens to node-local character ranges
//! - [`client::highlighter`]: reversible wrapping of those ranges
//! - [`client::playback`]: timer-driven word highlighting during playback
//!
//! ## Quick Start
//!
//! ```rust
//! use tts_highlight::client::{align, Highlighter};
//! use tts_highlight::config::ReaderConfig;
//! use tts_highlight::pipeline::SegmentPipeline;
//! use tts_highlight::TimedToken;
//!
//! let pipeline = SegmentPipeline::from_config(&ReaderConfig::default())?;
//! let (mut doc, segments) = pipeline.segment_markup("<p>Hello <b>big</b> world.</p>", None);
//!
//! let tokens = align(
//!     &segments[0],
//!     &[
//!         TimedToken::new("Hello", 300),
//!         TimedToken::new("big", 600),
//!         TimedToken::new("world", 900),
//!         TimedToken::new(".", 900),
//!     ],
//! )?;
//!
//! let highlighter = Highlighter::default();
//! let word = highlighter.highlight_token(&mut doc, &segments[0], &tokens[1]);
//! assert_eq!(
//!     doc.to_markup(),
//!     "<p>Hello <b><span class=\"highlight-word\">big</span></b> world.</p>"
//! );
//! highlighter.remove_highlight(&mut doc, word);
//! assert_eq!(doc.to_markup(), "<p>Hello <b>big</b> world.</p>");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod client;
pub mod config;
pub mod dom;
pub mod error;
pub mod pipeline;
pub mod store;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use error::{AlignmentError, ReaderError, ValidationError};
pub use pipeline::{Segment, TextItem};

/// Language and voice the caller chooses for a synthesis request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisParams {
    pub language: String,
    pub voice: String,
}

/// One word as reported by the synthesis service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisToken {
    pub orth: String,
    /// Seconds from the start of the audio.
    pub endtime: f64,
}

impl SynthesisToken {
    pub fn end_time_ms(&self) -> u64 {
        if self.endtime.is_finite() && self.endtime > 0.0 {
            (self.endtime * 1000.0).round() as u64
        } else {
            0
        }
    }
}

/// A synthesizer token with its end time in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedToken {
    pub string: String,
    pub end_time_ms: u64,
}

impl TimedToken {
    pub fn new(string: impl Into<String>, end_time_ms: u64) -> Self {
        Self {
            string: string.into(),
            end_time_ms,
        }
    }
}

impl From<&SynthesisToken> for TimedToken {
    fn from(token: &SynthesisToken) -> Self {
        Self::new(token.orth.clone(), token.end_time_ms())
    }
}

/// Parse the token list returned by the synthesis service.
pub fn parse_tokens(json: &str) -> Result<Vec<SynthesisToken>, ReaderError> {
    serde_json::from_str(json).map_err(|e| ReaderError::Synthesis(e.to_string()))
}

/// The result of synthesizing one segment.
///
/// Contains the word timings and raw f32 audio samples.
#[derive(Debug, Clone, Default)]
pub struct SynthesisResponse {
    pub tokens: Vec<SynthesisToken>,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl SynthesisResponse {
    /// Tokens with times converted to milliseconds, ready for alignment.
    pub fn timed_tokens(&self) -> Vec<TimedToken> {
        self.tokens.iter().map(TimedToken::from).collect()
    }

    /// Write the audio to a 32-bit float WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), ReaderError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Common interface for speech synthesis backends.
pub trait Synthesizer {
    /// Synthesize speech for the given text.
    fn synthesize(
        &mut self,
        text: &str,
        params: &SynthesisParams,
    ) -> Result<SynthesisResponse, Box<dyn std::error::Error>>;

    /// Synthesize a segment's concatenated content.
    ///
    /// Default implementation calls `synthesize()` with [`Segment::text`].
    fn synthesize_segment(
        &mut self,
        segment: &Segment,
        params: &SynthesisParams,
    ) -> Result<SynthesisResponse, Box<dyn std::error::Error>> {
        log::debug!("Synthesizing segment {}", segment.hash);
        self.synthesize(&segment.text(), params)
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_tokens, SynthesisResponse, SynthesisToken, TimedToken};
    use crate::error::ReaderError;

    #[test]
    fn service_tokens_convert_to_milliseconds() {
        let tokens =
            parse_tokens(r#"[{"orth": "Hello", "endtime": 0.3125}, {"orth": "", "endtime": 0.5}]"#)
                .expect("valid tokens");
        let timed: Vec<TimedToken> = tokens.iter().map(TimedToken::from).collect();
        assert_eq!(
            timed,
            vec![TimedToken::new("Hello", 313), TimedToken::new("", 500)]
        );
    }

    #[test]
    fn negative_or_nan_end_times_clamp_to_zero() {
        let token = SynthesisToken {
            orth: "x".to_string(),
            endtime: -1.0,
        };
        assert_eq!(token.end_time_ms(), 0);
        let token = SynthesisToken {
            orth: "x".to_string(),
            endtime: f64::NAN,
        };
        assert_eq!(token.end_time_ms(), 0);
    }

    #[test]
    fn malformed_token_list_is_rejected() {
        let err = parse_tokens(r#"[{"orth": 1}]"#).expect_err("orth must be a string");
        assert!(matches!(err, ReaderError::Synthesis(_)));
        assert!(err.to_string().starts_with("Malformed synthesis response: "));
        assert_eq!(err.user_message(), "could not prepare this content for speech");
    }

    #[test]
    fn duration_follows_sample_rate() {
        let response = SynthesisResponse {
            tokens: Vec::new(),
            samples: vec![0.0; 12000],
            sample_rate: 24000,
        };
        assert_eq!(response.duration_secs(), 0.5);
        assert_eq!(SynthesisResponse::default().duration_secs(), 0.0);
    }

    #[test]
    fn wav_round_trips_through_hound() {
        let response = SynthesisResponse {
            tokens: Vec::new(),
            samples: vec![0.0, 0.25, -0.5],
            sample_rate: 16000,
        };
        let path = std::env::temp_dir().join(format!("tts-highlight-{}.wav", std::process::id()));
        response.write_wav(&path).expect("write wav");
        let mut reader = hound::WavReader::open(&path).expect("read wav");
        assert_eq!(reader.spec().sample_rate, 16000);
        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.expect("sample")).collect();
        assert_eq!(samples, vec![0.0, 0.25, -0.5]);
        let _ = std::fs::remove_file(path);
    }
}
